//! Local edits on a group.
//!
//! These helpers produce the next state of a group in place. They never talk
//! to peers; publishing the result is the caller's job.

use crate::error::CoreError;
use crate::types::{new_id, Expense, ExpenseId, Group, User};
use crate::validation::ExpenseDraft;

impl Group {
    /// Create an empty group.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            users: Vec::new(),
            expenses: Vec::new(),
        }
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// Find a user by name, ignoring case and surrounding whitespace.
    pub fn find_user_by_name(&self, name: &str) -> Option<&User> {
        let wanted = name.trim().to_lowercase();
        self.users.iter().find(|u| u.name.to_lowercase() == wanted)
    }

    /// Add a user. Names are unique within a group, case-insensitively.
    pub fn add_user(&mut self, name: &str) -> Result<User, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("user name is required".into()));
        }
        if self.find_user_by_name(name).is_some() {
            return Err(CoreError::DuplicateUser(name.to_string()));
        }

        let user = User::new(name);
        tracing::debug!(group_id = %self.id, user_id = %user.id, name, "user added");
        self.users.push(user.clone());
        Ok(user)
    }

    /// Remove a user and prune every reference to them.
    ///
    /// Expenses the user paid for are dropped entirely. The user is removed
    /// from the participants of the remaining expenses, and expenses left
    /// with nobody to share them are dropped as well.
    pub fn remove_user(&mut self, user_id: &str) -> Result<User, CoreError> {
        let index = self
            .users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
        let removed = self.users.remove(index);

        let before = self.expenses.len();
        self.expenses.retain_mut(|expense| {
            if expense.payers.iter().any(|p| p.user_id == user_id) {
                return false;
            }
            expense.participants.retain(|p| p.user_id != user_id);
            !expense.participants.is_empty()
        });

        tracing::debug!(
            group_id = %self.id,
            user_id,
            dropped_expenses = before - self.expenses.len(),
            "user removed"
        );
        Ok(removed)
    }

    pub fn expense(&self, expense_id: &str) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == expense_id)
    }

    pub fn expense_mut(&mut self, expense_id: &str) -> Option<&mut Expense> {
        self.expenses.iter_mut().find(|e| e.id == expense_id)
    }

    /// Validate and store an expense.
    ///
    /// With `editing` set, the existing expense keeps its id and comments and
    /// takes every other field from the draft. Otherwise a new expense with a
    /// fresh id and no comments is appended.
    pub fn save_expense(
        &mut self,
        draft: ExpenseDraft,
        editing: Option<&str>,
    ) -> Result<ExpenseId, CoreError> {
        draft.validate(self)?;

        match editing {
            Some(expense_id) => {
                let expense = self
                    .expense_mut(expense_id)
                    .ok_or_else(|| CoreError::ExpenseNotFound(expense_id.to_string()))?;
                expense.title = draft.title;
                expense.amount = draft.amount;
                expense.payers = draft.payers;
                expense.participants = draft.participants;
                expense.split_type = draft.split_type;
                expense.date = draft.date;
                Ok(expense.id.clone())
            }
            None => {
                let expense = Expense {
                    id: new_id(),
                    title: draft.title,
                    amount: draft.amount,
                    payers: draft.payers,
                    participants: draft.participants,
                    split_type: draft.split_type,
                    date: draft.date,
                    comments: Vec::new(),
                };
                let id = expense.id.clone();
                self.expenses.push(expense);
                Ok(id)
            }
        }
    }

    pub fn remove_expense(&mut self, expense_id: &str) -> Result<Expense, CoreError> {
        let index = self
            .expenses
            .iter()
            .position(|e| e.id == expense_id)
            .ok_or_else(|| CoreError::ExpenseNotFound(expense_id.to_string()))?;
        Ok(self.expenses.remove(index))
    }
}
