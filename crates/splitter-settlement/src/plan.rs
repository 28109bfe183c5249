use serde::{Deserialize, Serialize};
use splitter_core::{Balance, Group, Transaction};

use crate::balances::calculate_balances;
use crate::error::SettlementError;
use crate::simplify::simplify_debts;

/// Balances and settlement transfers for one group snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub balances: Vec<Balance>,
    pub transactions: Vec<Transaction>,
}

impl SettlementPlan {
    /// Whether nobody owes anybody anything.
    pub fn is_settled(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Compute the settlement plan for `group`.
pub fn settle(group: &Group) -> Result<SettlementPlan, SettlementError> {
    let balances = calculate_balances(&group.users, &group.expenses)?;
    let transactions = simplify_debts(&balances);
    tracing::debug!(
        group_id = %group.id,
        users = group.users.len(),
        expenses = group.expenses.len(),
        transactions = transactions.len(),
        "settlement computed"
    );
    Ok(SettlementPlan {
        balances,
        transactions,
    })
}
