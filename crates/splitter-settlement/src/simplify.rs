use splitter_core::{Balance, Money, Transaction, User};

/// Remaining magnitudes below this are considered settled.
pub const SETTLEMENT_TOLERANCE: Money = Money::from_cents(1);

/// A debtor's or creditor's outstanding amount while matching.
#[derive(Debug, Clone)]
struct Position {
    user: User,
    remaining: Money,
}

/// Reduce `balances` to a short list of transfers using greedy matching.
///
/// Each round pairs the largest remaining debtor with the largest remaining
/// creditor and settles the smaller of the two amounts, so every round
/// retires at least one side. For balances that sum to zero this emits at
/// most one transfer fewer than the number of users with a non-zero balance.
/// The result is a heuristic, not a global minimum.
///
/// Both working lists are re-sorted with a stable sort every round, so users
/// with equal outstanding amounts are matched in their input order.
pub fn simplify_debts(balances: &[Balance]) -> Vec<Transaction> {
    let mut debtors: Vec<Position> = balances
        .iter()
        .filter(|b| b.amount.is_negative())
        .map(|b| Position {
            user: b.user.clone(),
            remaining: b.amount.abs(),
        })
        .collect();
    let mut creditors: Vec<Position> = balances
        .iter()
        .filter(|b| b.amount.is_positive())
        .map(|b| Position {
            user: b.user.clone(),
            remaining: b.amount,
        })
        .collect();

    let mut transactions = Vec::new();

    loop {
        debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
        creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));

        let (Some(debtor), Some(creditor)) = (debtors.first_mut(), creditors.first_mut()) else {
            break;
        };

        let settle = debtor.remaining.min(creditor.remaining);
        transactions.push(Transaction {
            from: debtor.user.clone(),
            to: creditor.user.clone(),
            amount: settle,
        });
        debtor.remaining -= settle;
        creditor.remaining -= settle;

        let debtor_settled = debtor.remaining < SETTLEMENT_TOLERANCE;
        let creditor_settled = creditor.remaining < SETTLEMENT_TOLERANCE;
        if debtor_settled {
            debtors.remove(0);
        }
        if creditor_settled {
            creditors.remove(0);
        }
    }

    tracing::trace!(
        balances = balances.len(),
        transactions = transactions.len(),
        "debts simplified"
    );
    transactions
}
