//! The local relational mirror of the remote ledger.
//!
//! [`LedgerStore`] wraps the table set in a lock so that concurrent readers
//! always observe either the pre-pass or the post-pass snapshot of a
//! reconciliation, never an intermediate one.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard};

use crate::data::WalletId;
use crate::error::StoreError;
use crate::ledger::batch::StoreBatch;
use crate::ledger::tables::{LastSyncInfo, Tables};

pub mod batch;
pub mod read_write;
pub mod tables;

/// The shared ledger mirror. Cheap to share by reference between wallets;
/// each wallet's reconciliation serializes on its own wallet handle, while
/// the store only sees whole batches.
#[derive(Debug, Default)]
pub struct LedgerStore {
    tables: RwLock<Tables>,
}

impl LedgerStore {
    pub fn new() -> Self {
        LedgerStore {
            tables: RwLock::new(Tables::new()),
        }
    }

    pub fn from_tables(tables: Tables) -> Self {
        LedgerStore {
            tables: RwLock::new(tables),
        }
    }

    /// Read access to the current snapshot. Holding the guard blocks
    /// commits, so keep it short and never across an await point.
    pub fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("ledger store lock poisoned")
    }

    /// An owned copy of the current snapshot.
    pub fn snapshot(&self) -> Tables {
        self.read().clone()
    }

    /// Begins a batch against the current id counters.
    pub fn begin(&self) -> StoreBatch {
        let tables = self.read();
        StoreBatch::new(tables.next_address_id, tables.next_transaction_id)
    }

    /// Commits a batch atomically. On error nothing was written.
    pub fn commit(&self, batch: StoreBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write().expect("ledger store lock poisoned");
        tables.apply(batch)
    }

    pub fn last_sync(&self, wallet: WalletId) -> Option<LastSyncInfo> {
        self.read().last_sync(wallet).cloned()
    }

    /// Writes the whole mirror to disk in its versioned binary form.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        self.read().write(&mut writer)?;
        Ok(())
    }

    /// Reads a mirror previously written by [`LedgerStore::save`].
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        let tables = Tables::read(&mut reader)?;
        Ok(LedgerStore::from_tables(tables))
    }
}
