//! The replicated ledger data model.
//!
//! Field names serialize in camelCase; the same shapes are used on the wire
//! and in persisted state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

pub type UserId = String;
pub type ExpenseId = String;
pub type GroupId = String;
pub type CommentId = String;

/// Basis points in 100% for `percentage` splits.
pub const PERCENT_SCALE: i64 = 10_000;

/// Generate a fresh, time-ordered identifier.
pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// A member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The portion of an expense paid by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payer {
    pub user_id: UserId,
    pub amount: Money,
}

/// A user sharing the cost of an expense.
///
/// `share` is interpreted according to the expense's [`SplitType`]: ignored
/// for `Equal`, cents for `Amount`, basis points for `Percentage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    #[serde(default)]
    pub share: i64,
}

/// How an expense's amount is divided among its participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitType {
    Equal,
    Amount,
    Percentage,
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "equal"),
            Self::Amount => write!(f, "amount"),
            Self::Percentage => write!(f, "percentage"),
        }
    }
}

/// A comment attached to an expense. Comments are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    /// Author a new comment as `user`, stamped with the current time.
    pub fn new(user: &User, text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A shared expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub title: String,
    pub amount: Money,
    pub payers: Vec<Payer>,
    pub participants: Vec<Participant>,
    pub split_type: SplitType,
    pub date: NaiveDate,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Expense {
    /// Whether a comment with this id is already attached.
    pub fn has_comment(&self, comment_id: &str) -> bool {
        self.comments.iter().any(|c| c.id == comment_id)
    }

    /// Whether `user_id` pays for or participates in this expense.
    pub fn involves(&self, user_id: &str) -> bool {
        self.payers.iter().any(|p| p.user_id == user_id)
            || self.participants.iter().any(|p| p.user_id == user_id)
    }
}

/// The unit of replication: a named set of users and their expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

/// A user's net position. Positive means the user is owed money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user: User,
    pub amount: Money,
}

/// A settlement instruction: `from` pays `amount` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: User,
    pub to: User,
    pub amount: Money,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pays {} {}", self.from.name, self.to.name, self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_expense() -> Expense {
        Expense {
            id: "e1".into(),
            title: "Dinner".into(),
            amount: Money::from_units(100),
            payers: vec![Payer {
                user_id: "a".into(),
                amount: Money::from_units(100),
            }],
            participants: vec![
                Participant {
                    user_id: "a".into(),
                    share: 0,
                },
                Participant {
                    user_id: "b".into(),
                    share: 0,
                },
            ],
            split_type: SplitType::Equal,
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            comments: vec![],
        }
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
        let a = User::new("Alice");
        let b = User::new("Alice");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_expense_wire_shape_is_camel_case() {
        let json = serde_json::to_value(sample_expense()).unwrap();
        assert_eq!(json["splitType"], "equal");
        assert_eq!(json["payers"][0]["userId"], "a");
        assert_eq!(json["payers"][0]["amount"], 10_000);
        assert_eq!(json["date"], "2024-05-01");
        assert!(json["comments"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_expense_without_comments_decodes_empty() {
        let json = r#"{
            "id": "e9",
            "title": "Taxi",
            "amount": 1500,
            "payers": [{"userId": "a", "amount": 1500}],
            "participants": [{"userId": "a", "share": 5000}, {"userId": "b", "share": 5000}],
            "splitType": "percentage",
            "date": "2024-02-29"
        }"#;
        let expense: Expense = serde_json::from_str(json).unwrap();
        assert_eq!(expense.split_type, SplitType::Percentage);
        assert!(expense.comments.is_empty());
        assert_eq!(expense.participants[1].share, 5000);
    }

    #[test]
    fn test_comment_wire_shape() {
        let user = User {
            id: "u1".into(),
            name: "Bob".into(),
        };
        let comment = Comment::new(&user, "looks right");
        let json = serde_json::to_value(&comment).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["userName"], "Bob");
        assert_eq!(json["text"], "looks right");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_involves() {
        let expense = sample_expense();
        assert!(expense.involves("a"));
        assert!(expense.involves("b"));
        assert!(!expense.involves("c"));
    }

    #[test]
    fn test_transaction_display() {
        let tx = Transaction {
            from: User {
                id: "b".into(),
                name: "Bob".into(),
            },
            to: User {
                id: "a".into(),
                name: "Alice".into(),
            },
            amount: Money::from_cents(5000),
        };
        assert_eq!(tx.to_string(), "Bob pays Alice 50.00");
    }
}
