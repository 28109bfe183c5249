pub mod error;
pub mod money;
pub mod types;
pub mod group;
pub mod validation;

pub use error::CoreError;
pub use money::Money;
pub use types::{
    new_id, Balance, Comment, CommentId, Expense, ExpenseId, Group, GroupId, Participant, Payer,
    SplitType, Transaction, User, UserId, PERCENT_SCALE,
};
pub use validation::ExpenseDraft;
