//! How an expense's amount is charged to each participant.

use splitter_core::{Expense, Money, SplitType, PERCENT_SCALE};

use crate::error::SettlementError;

/// Compute what each participant owes for `expense`, in participant order.
///
/// All results are whole cents and, for `Equal` and `Percentage` splits,
/// add up exactly to the amount being split. Indivisible remainder cents go
/// one at a time to the participants with the largest fractional share, and
/// to earlier participants on ties.
///
/// Fails when an intermediate product or a resulting debit does not fit,
/// which only happens for amounts no validated draft can carry.
pub fn participant_debits(expense: &Expense) -> Result<Vec<Money>, SettlementError> {
    let participants = &expense.participants;
    if participants.is_empty() {
        return Ok(Vec::new());
    }
    let out_of_range = || SettlementError::AmountOutOfRange(expense.id.clone());
    let amount = i128::from(expense.amount.cents());

    let cents: Vec<i128> = match expense.split_type {
        SplitType::Equal => {
            let weights = vec![1i128; participants.len()];
            allocate(amount, &weights)
        }
        SplitType::Amount => participants.iter().map(|p| i128::from(p.share)).collect(),
        SplitType::Percentage => {
            let weights: Vec<i128> = participants.iter().map(|p| i128::from(p.share)).collect();
            let share_total = weights
                .iter()
                .try_fold(0i128, |acc, w| acc.checked_add(*w))
                .ok_or_else(out_of_range)?;
            let charged = amount
                .checked_mul(share_total)
                .map(|n| round_div(n, i128::from(PERCENT_SCALE)))
                .ok_or_else(out_of_range)?;
            let exact = weights
                .iter()
                .map(|w| amount.checked_mul(*w))
                .collect::<Option<Vec<i128>>>()
                .ok_or_else(out_of_range)?;
            largest_remainder(charged, &exact, i128::from(PERCENT_SCALE))
        }
    };

    cents
        .into_iter()
        .map(|c| i64::try_from(c).map(Money::from_cents))
        .collect::<Result<Vec<Money>, _>>()
        .map_err(|_| out_of_range())
}

/// Split `total` cents proportionally to `weights`.
fn allocate(total: i128, weights: &[i128]) -> Vec<i128> {
    let weight_sum: i128 = weights.iter().sum();
    if weight_sum == 0 {
        return vec![0; weights.len()];
    }
    let exact: Vec<i128> = weights.iter().map(|w| total * w).collect();
    largest_remainder(total, &exact, weight_sum)
}

/// Distribute `target` cents given exact shares `numerators / denominator`.
fn largest_remainder(target: i128, numerators: &[i128], denominator: i128) -> Vec<i128> {
    let mut cents: Vec<i128> = numerators
        .iter()
        .map(|n| n.div_euclid(denominator))
        .collect();
    let floor_sum = cents.iter().fold(0i128, |acc, c| acc.saturating_add(*c));
    let deficit = usize::try_from(target.saturating_sub(floor_sum))
        .unwrap_or(0)
        .min(cents.len());

    let mut order: Vec<usize> = (0..numerators.len()).collect();
    // Stable: equal remainders keep participant order.
    order.sort_by(|&a, &b| {
        let ra = numerators[a].rem_euclid(denominator);
        let rb = numerators[b].rem_euclid(denominator);
        rb.cmp(&ra)
    });
    for &index in order.iter().take(deficit) {
        cents[index] += 1;
    }
    cents
}

/// Integer division rounding half away from zero.
fn round_div(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        numerator.saturating_add(half) / denominator
    } else {
        -(numerator.saturating_neg().saturating_add(half) / denominator)
    }
}
