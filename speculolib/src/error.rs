use thiserror::Error;

use crate::data::{AddressId, ChainKind, TransactionId};

/// Failure to reach the remote. Surfaced to the caller unchanged; the pass
/// that hit it commits nothing and is safe to retry.
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote request timed out")]
    Timeout,
    #[error("fetch task is gone")]
    Disconnected,
}

/// Failure inside the ledger store.
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("address {0} not found")]
    AddressNotFound(AddressId),
    #[error("batch conflicts with a write committed since it began: {0}")]
    Conflict(String),
    #[error("batch violates a table invariant: {0}")]
    Inconsistent(String),
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure in the address space manager.
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AddressSpaceError {
    #[error("no unused {0} address remains below the gap frontier")]
    Exhausted(ChainKind),
    #[error("cutoff {requested} is beyond the {generated} generated addresses")]
    CutoffOutOfRange { requested: u32, generated: u32 },
    #[error("this wallet has no {0} chain")]
    NoSuchChain(ChainKind),
    #[error("address derivation failed: {0}")]
    Derivation(String),
}

/// Any way a reconciliation pass can fail. No variant leaves partial state
/// behind; the mirror is exactly as it was before the pass.
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    AddressSpace(#[from] AddressSpaceError),
    #[error("recovery from a remote rollback failed: {0}")]
    RollbackRecovery(String),
}
