use std::collections::HashMap;

use splitter_core::{Balance, Expense, Money, User};

use crate::error::SettlementError;
use crate::split::participant_debits;

/// Compute every user's net balance over `expenses`.
///
/// Payers are credited with what they paid and participants are debited
/// with their share. References to users outside `users` are ignored. The
/// result is sorted by balance, highest first; users with equal balances keep
/// their order from `users`.
///
/// Every running total stays within `-i64::MAX..=i64::MAX`; an expense that
/// would push one outside that range fails the whole computation.
pub fn calculate_balances(
    users: &[User],
    expenses: &[Expense],
) -> Result<Vec<Balance>, SettlementError> {
    if users.is_empty() {
        return Ok(Vec::new());
    }

    let index: HashMap<&str, usize> = users
        .iter()
        .enumerate()
        .map(|(i, u)| (u.id.as_str(), i))
        .collect();
    let mut totals = vec![Money::ZERO; users.len()];

    for expense in expenses {
        let out_of_range = || SettlementError::AmountOutOfRange(expense.id.clone());

        for payer in &expense.payers {
            if let Some(&i) = index.get(payer.user_id.as_str()) {
                totals[i] = totals[i]
                    .checked_add(payer.amount)
                    .filter(|t| t.checked_neg().is_some())
                    .ok_or_else(out_of_range)?;
            }
        }

        let debits = participant_debits(expense)?;
        for (participant, debit) in expense.participants.iter().zip(debits) {
            if let Some(&i) = index.get(participant.user_id.as_str()) {
                totals[i] = totals[i]
                    .checked_sub(debit)
                    .filter(|t| t.checked_neg().is_some())
                    .ok_or_else(out_of_range)?;
            }
        }
    }

    let mut balances: Vec<Balance> = users
        .iter()
        .zip(totals)
        .map(|(user, amount)| Balance {
            user: user.clone(),
            amount,
        })
        .collect();
    // `sort_by` is stable, which keeps ties in user-list order.
    balances.sort_by(|a, b| b.amount.cmp(&a.amount));

    tracing::trace!(
        users = users.len(),
        expenses = expenses.len(),
        "balances calculated"
    );
    Ok(balances)
}
