/// Core ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("expense validation failed: {0}")]
    Validation(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("expense not found: {0}")]
    ExpenseNotFound(String),

    #[error("a user named '{0}' already exists")]
    DuplicateUser(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
