//! Caller-side expense validation.
//!
//! The settlement engine and the replica store assume these invariants hold.
//! Drafts that fail validation never enter a group and are never sent to
//! peers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::money::Money;
use crate::types::{Group, Participant, Payer, SplitType, PERCENT_SCALE};

/// Largest accepted gap between a sum and its target, in minor units.
pub const SUM_TOLERANCE: i64 = 1;

/// An expense as entered by the user, before it gets an id and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDraft {
    pub title: String,
    pub amount: Money,
    pub payers: Vec<Payer>,
    pub participants: Vec<Participant>,
    pub split_type: SplitType,
    pub date: NaiveDate,
}

impl ExpenseDraft {
    /// Check the draft against the group it is about to join.
    pub fn validate(&self, group: &Group) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::Validation("title is required".into()));
        }
        if !self.amount.is_positive() {
            return Err(CoreError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.payers.is_empty() {
            return Err(CoreError::Validation("at least one payer is required".into()));
        }
        if self.participants.is_empty() {
            return Err(CoreError::Validation(
                "at least one participant is required".into(),
            ));
        }

        let referenced = self
            .payers
            .iter()
            .map(|p| &p.user_id)
            .chain(self.participants.iter().map(|p| &p.user_id));
        for user_id in referenced {
            if group.user(user_id).is_none() {
                return Err(CoreError::UserNotFound(user_id.clone()));
            }
        }

        let out_of_range = || CoreError::Validation("amounts are out of range".into());
        let paid =
            Money::checked_sum(self.payers.iter().map(|p| p.amount)).ok_or_else(out_of_range)?;
        let gap = paid.checked_sub(self.amount).ok_or_else(out_of_range)?;
        if gap.abs().cents() > SUM_TOLERANCE {
            return Err(CoreError::Validation(format!(
                "payer amounts must sum to {}, got {}",
                self.amount, paid
            )));
        }

        // Widened so that any number of i64 shares sums without overflow.
        let shares: i128 = self.participants.iter().map(|p| i128::from(p.share)).sum();
        let tolerance = i128::from(SUM_TOLERANCE);
        match self.split_type {
            SplitType::Equal => {}
            SplitType::Amount => {
                if (shares - i128::from(self.amount.cents())).abs() > tolerance {
                    let got = i64::try_from(shares).map_err(|_| out_of_range())?;
                    return Err(CoreError::Validation(format!(
                        "custom amounts must sum to {}, got {}",
                        self.amount,
                        Money::from_cents(got)
                    )));
                }
            }
            SplitType::Percentage => {
                if (shares - i128::from(PERCENT_SCALE)).abs() > tolerance {
                    return Err(CoreError::Validation(format!(
                        "percentages must sum to 100%, got {}.{:02}%",
                        shares / 100,
                        (shares % 100).abs()
                    )));
                }
            }
        }

        Ok(())
    }
}
