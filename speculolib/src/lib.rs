#![forbid(unsafe_code)]
//! Speculo: a local relational mirror of a remote UTXO ledger's transaction
//! history for HD wallet accounts, reconciled under reorganizations, mempool
//! eviction, and gap-limited address discovery.
//!
//! Entrypoint: [`crate::sync::sync`]

pub mod certificates;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod ledger;
pub mod sync;
pub mod utxos;
pub mod wallet;

#[cfg(any(test, feature = "test-features"))]
pub mod test_framework;
