use crate::data::{BlockHeight, TransactionId};

/// The relationship of a mirrored transaction to the remote chain.
///
/// The first observation adopts whatever the remote reports; afterwards the
/// remote stays authoritative with one exception: `Failed` is sticky and
/// survives reorgs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationStatus {
    /// Seen in the mempool, not yet in any block.
    Pending,
    /// Included in a block reachable from the remote's best block.
    Confirmed(BlockHeight),
    /// Explicitly rejected by the remote. Terminal.
    Failed,
    /// Its block is no longer reachable from the remote's best block. May be
    /// re-confirmed by a later pass if the transaction reappears.
    Reorganized,
    /// Evicted from the mempool without a reorg. May reappear later.
    Dropped,
}

impl ConfirmationStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// A live transaction is one the remote currently vouches for: pending or
    /// confirmed. Only live transactions spend outputs.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed(_))
    }

    pub fn is_confirmed_after_or_at(&self, height: &BlockHeight) -> bool {
        match self {
            Self::Confirmed(block_height) => block_height >= height,
            _ => false,
        }
    }

    pub fn is_confirmed_before_or_at(&self, height: &BlockHeight) -> bool {
        match self {
            Self::Confirmed(block_height) => block_height <= height,
            _ => false,
        }
    }

    pub fn get_confirmed_height(&self) -> Option<BlockHeight> {
        match self {
            Self::Confirmed(block_height) => Some(*block_height),
            _ => None,
        }
    }

    /// Applies a freshly observed remote state. The observation wins, except
    /// that `Failed` never reverts.
    pub fn transition(self, observed: ConfirmationStatus) -> ConfirmationStatus {
        match self {
            Self::Failed => Self::Failed,
            _ => observed,
        }
    }

    /// The block range holding this transaction was rolled back.
    pub fn invalidated_by_reorg(self) -> ConfirmationStatus {
        match self {
            Self::Pending | Self::Confirmed(_) => Self::Reorganized,
            other => other,
        }
    }

    /// The transaction vanished from the mempool with no reorg detected.
    pub fn evicted(self) -> ConfirmationStatus {
        match self {
            Self::Pending => Self::Dropped,
            other => other,
        }
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ConfirmationStatus::*;
        match self {
            Pending => write!(f, "Transaction pending in mempool."),
            Confirmed(block_height) => {
                write!(f, "Transaction confirmed at height {}.", block_height)
            }
            Failed => write!(f, "Transaction rejected by the remote."),
            Reorganized => write!(f, "Transaction invalidated by a reorganization."),
            Dropped => write!(f, "Transaction evicted from the mempool."),
        }
    }
}

impl From<ConfirmationStatus> for String {
    fn from(value: ConfirmationStatus) -> Self {
        format!("{value}")
    }
}

/// Whether an output has been consumed, and by which transaction.
///
/// Derived from the input rows referencing the output and the confirmation
/// status of their transactions; recomputed whenever either side changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendStatus {
    /// No live transaction consumes this output.
    Unspent,
    /// Consumed by a transaction that is still pending.
    PendingSpend(TransactionId),
    /// Consumed by a confirmed transaction.
    Spent(TransactionId),
}

impl SpendStatus {
    /// Classifies a spend by the confirmation status of the spender.
    pub fn from_spender(spender: TransactionId, status: ConfirmationStatus) -> Self {
        match status {
            ConfirmationStatus::Pending => Self::PendingSpend(spender),
            ConfirmationStatus::Confirmed(_) => Self::Spent(spender),
            ConfirmationStatus::Failed
            | ConfirmationStatus::Reorganized
            | ConfirmationStatus::Dropped => Self::Unspent,
        }
    }

    pub fn is_unspent(&self) -> bool {
        matches!(self, Self::Unspent)
    }

    pub fn is_pending_spend(&self) -> bool {
        matches!(self, Self::PendingSpend(_))
    }

    pub fn is_spent(&self) -> bool {
        matches!(self, Self::Spent(_))
    }

    pub fn spender(&self) -> Option<TransactionId> {
        match self {
            Self::Unspent => None,
            Self::PendingSpend(spender) | Self::Spent(spender) => Some(*spender),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::ConfirmationStatus::*;
    use super::*;

    #[test_case(Pending, Confirmed(5.into()), Confirmed(5.into()); "pending confirms")]
    #[test_case(Pending, Failed, Failed; "pending fails")]
    #[test_case(Confirmed(5.into()), Failed, Failed; "confirmed fails")]
    #[test_case(Failed, Pending, Failed; "failed never reverts to pending")]
    #[test_case(Failed, Confirmed(9.into()), Failed; "failed never reverts to confirmed")]
    #[test_case(Reorganized, Confirmed(9.into()), Confirmed(9.into()); "reorganized may reconfirm")]
    #[test_case(Dropped, Pending, Pending; "dropped may reappear")]
    fn transition(current: ConfirmationStatus, observed: ConfirmationStatus, expected: ConfirmationStatus) {
        assert_eq!(current.transition(observed), expected);
    }

    #[test_case(Pending, Reorganized; "pending is invalidated")]
    #[test_case(Confirmed(5.into()), Reorganized; "confirmed is invalidated")]
    #[test_case(Failed, Failed; "failed survives reorg")]
    #[test_case(Dropped, Dropped; "dropped untouched by reorg")]
    fn reorg(current: ConfirmationStatus, expected: ConfirmationStatus) {
        assert_eq!(current.invalidated_by_reorg(), expected);
    }

    #[test_case(Pending, Dropped; "pending is evicted")]
    #[test_case(Confirmed(5.into()), Confirmed(5.into()); "confirmed is not evicted")]
    #[test_case(Failed, Failed; "failed is not evicted")]
    fn eviction(current: ConfirmationStatus, expected: ConfirmationStatus) {
        assert_eq!(current.evicted(), expected);
    }

    #[test]
    fn spend_follows_spender_status() {
        let spender = TransactionId::from_u64(7);
        assert_eq!(
            SpendStatus::from_spender(spender, Pending),
            SpendStatus::PendingSpend(spender)
        );
        assert_eq!(
            SpendStatus::from_spender(spender, Confirmed(3.into())),
            SpendStatus::Spent(spender)
        );
        assert_eq!(SpendStatus::from_spender(spender, Reorganized), SpendStatus::Unspent);
        assert_eq!(SpendStatus::from_spender(spender, Failed), SpendStatus::Unspent);
    }
}
