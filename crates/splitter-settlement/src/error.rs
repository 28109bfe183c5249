use splitter_core::ExpenseId;

/// Settlement errors.
///
/// Locally validated groups never produce one. They come from replicas that
/// peers filled with amounts outside the representable range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettlementError {
    #[error("amounts in expense {0} are out of range")]
    AmountOutOfRange(ExpenseId),
}
