//! Staged writes against the ledger mirror.
//!
//! A reconciliation pass accumulates every row it wants to write into a
//! [`StoreBatch`] and commits it in one step. Validation happens before any
//! row is applied, so a rejected batch leaves the tables untouched; an
//! applied batch is visible to readers only in full.

use std::collections::HashSet;

use crate::data::{AddressHash, AddressId, ChainKind, OutputId, TransactionId, WalletId};
use crate::error::StoreError;
use crate::ledger::tables::{
    Address, BlockRecord, CertificateRecord, LastSyncInfo, Tables, TransactionRecord, UtxoInput,
    UtxoOutput,
};

/// A set of staged rows plus the id range they were allocated from. The
/// batch remembers the counters it was begun against; a commit over tables
/// that moved on in the meantime is rejected as a conflict and can be retried
/// from a fresh snapshot.
#[derive(Debug)]
pub struct StoreBatch {
    base_address_id: u64,
    base_transaction_id: u64,
    allocated_addresses: u64,
    allocated_transactions: u64,
    staged_addresses: Vec<Address>,
    staged_mark_used: Vec<AddressId>,
    staged_blocks: Vec<BlockRecord>,
    staged_transactions: Vec<TransactionRecord>,
    staged_outputs: Vec<UtxoOutput>,
    staged_inputs: Vec<UtxoInput>,
    staged_certificates: Vec<CertificateRecord>,
    staged_last_sync: Option<LastSyncInfo>,
}

impl StoreBatch {
    pub(crate) fn new(base_address_id: u64, base_transaction_id: u64) -> Self {
        StoreBatch {
            base_address_id,
            base_transaction_id,
            allocated_addresses: 0,
            allocated_transactions: 0,
            staged_addresses: Vec::new(),
            staged_mark_used: Vec::new(),
            staged_blocks: Vec::new(),
            staged_transactions: Vec::new(),
            staged_outputs: Vec::new(),
            staged_inputs: Vec::new(),
            staged_certificates: Vec::new(),
            staged_last_sync: None,
        }
    }

    pub fn allocate_transaction_id(&mut self) -> TransactionId {
        let id = TransactionId::from_u64(self.base_transaction_id + self.allocated_transactions);
        self.allocated_transactions += 1;
        id
    }

    /// Stages a new address row and returns its id.
    pub fn stage_new_address(
        &mut self,
        wallet: WalletId,
        chain: ChainKind,
        derivation_index: u32,
        hash: AddressHash,
        is_used: bool,
    ) -> AddressId {
        let id = AddressId::from_u64(self.base_address_id + self.allocated_addresses);
        self.allocated_addresses += 1;
        self.staged_addresses.push(Address {
            id,
            hash,
            chain,
            derivation_index,
            is_used,
            wallet,
        });
        id
    }

    pub fn stage_mark_used(&mut self, address: AddressId) {
        self.staged_mark_used.push(address);
    }

    pub fn stage_block(&mut self, block: BlockRecord) {
        self.staged_blocks.push(block);
    }

    /// Stages an insert (freshly allocated id) or an update (existing id).
    pub fn stage_transaction(&mut self, record: TransactionRecord) {
        self.staged_transactions.push(record);
    }

    pub fn stage_output(&mut self, output: UtxoOutput) {
        self.staged_outputs.push(output);
    }

    pub fn stage_input(&mut self, input: UtxoInput) {
        self.staged_inputs.push(input);
    }

    pub fn stage_certificate(&mut self, certificate: CertificateRecord) {
        self.staged_certificates.push(certificate);
    }

    pub fn stage_last_sync(&mut self, info: LastSyncInfo) {
        self.staged_last_sync = Some(info);
    }

    /// Address id of a hash staged in this batch, if any.
    pub fn staged_address_by_hash(&self, hash: &AddressHash) -> Option<&Address> {
        self.staged_addresses.iter().find(|address| &address.hash == hash)
    }

    /// True when nothing beyond a cursor update is staged.
    pub fn is_row_free(&self) -> bool {
        self.staged_addresses.is_empty()
            && self.staged_mark_used.is_empty()
            && self.staged_blocks.is_empty()
            && self.staged_transactions.is_empty()
            && self.staged_outputs.is_empty()
            && self.staged_inputs.is_empty()
            && self.staged_certificates.is_empty()
    }
}

impl Tables {
    /// Validates and applies a batch. Nothing is written unless every check
    /// passes; spend flags of the touched outputs are re-derived before the
    /// write completes.
    pub(crate) fn apply(&mut self, batch: StoreBatch) -> Result<(), StoreError> {
        self.validate(&batch)?;

        let StoreBatch {
            base_address_id: _,
            base_transaction_id: _,
            allocated_addresses,
            allocated_transactions,
            staged_addresses,
            staged_mark_used,
            staged_blocks,
            staged_transactions,
            staged_outputs,
            staged_inputs,
            staged_certificates,
            staged_last_sync,
        } = batch;

        for address in staged_addresses {
            self.address_ids_by_hash.insert(address.hash, address.id);
            self.addresses.insert(address.id, address);
        }
        for id in staged_mark_used {
            if let Some(address) = self.addresses.get_mut(&id) {
                address.is_used = true;
            }
        }
        for block in staged_blocks {
            self.blocks.entry(block.hash).or_insert(block);
        }

        let mut touched_transactions: HashSet<TransactionId> = HashSet::new();
        for record in staged_transactions {
            touched_transactions.insert(record.id);
            self.transaction_ids_by_hash.insert(record.tx_hash, record.id);
            self.transactions.insert(record.id, record);
        }
        for output in staged_outputs {
            touched_transactions.insert(output.output_id.transaction());
            self.utxo_outputs.insert(output.output_id, output);
        }
        for input in staged_inputs {
            touched_transactions.insert(input.transaction);
            self.utxo_inputs.insert((input.transaction, input.index), input);
        }
        for certificate in staged_certificates {
            let rows = self.certificates.entry(certificate.transaction).or_default();
            if !rows.contains(&certificate) {
                rows.push(certificate);
            }
        }

        self.next_address_id += allocated_addresses;
        self.next_transaction_id += allocated_transactions;

        self.recompute_spends_around(&touched_transactions);

        if let Some(info) = staged_last_sync {
            self.last_sync.insert(info.wallet, info);
        }

        Ok(())
    }

    /// Re-derives the spend status of every output either created by or
    /// consumed by the given transactions. Incremental by construction, and
    /// required to agree with a full re-derivation over all outputs.
    fn recompute_spends_around(&mut self, transactions: &HashSet<TransactionId>) {
        let mut touched_outputs: HashSet<OutputId> = HashSet::new();
        for transaction in transactions {
            touched_outputs.extend(self.outputs_of(*transaction).map(|output| output.output_id));
            let spent: Vec<OutputId> = self
                .inputs_of(*transaction)
                .filter_map(|input| self.resolve_outpoint(input.spends))
                .collect();
            touched_outputs.extend(spent);
        }

        let updates: Vec<(OutputId, crate::wallet::confirmation_status::SpendStatus)> =
            touched_outputs
                .into_iter()
                .map(|output_id| (output_id, self.spend_status_of(output_id)))
                .collect();
        for (output_id, spend) in updates {
            if let Some(output) = self.utxo_outputs.get_mut(&output_id) {
                output.spend = spend;
            }
        }
    }

    fn validate(&self, batch: &StoreBatch) -> Result<(), StoreError> {
        if self.next_address_id != batch.base_address_id
            || self.next_transaction_id != batch.base_transaction_id
        {
            return Err(StoreError::Conflict(format!(
                "id counters moved (addresses {} -> {}, transactions {} -> {})",
                batch.base_address_id,
                self.next_address_id,
                batch.base_transaction_id,
                self.next_transaction_id,
            )));
        }

        let staged_address_ids: HashSet<AddressId> =
            batch.staged_addresses.iter().map(|address| address.id).collect();
        for address in &batch.staged_addresses {
            if self.address_ids_by_hash.contains_key(&address.hash) {
                return Err(StoreError::Inconsistent(format!(
                    "address {} already mirrored",
                    address.hash
                )));
            }
        }
        for id in &batch.staged_mark_used {
            if !self.addresses.contains_key(id) && !staged_address_ids.contains(id) {
                return Err(StoreError::AddressNotFound(*id));
            }
        }

        let staged_transaction_ids: HashSet<TransactionId> =
            batch.staged_transactions.iter().map(|record| record.id).collect();
        for record in &batch.staged_transactions {
            let confirmed = record.status.is_confirmed();
            if confirmed != (record.block.is_some() && record.ordinal.is_some()) {
                return Err(StoreError::Inconsistent(format!(
                    "transaction {} block reference does not match status {:?}",
                    record.tx_hash, record.status
                )));
            }
            let is_new = u64::from(record.id) >= batch.base_transaction_id;
            if is_new {
                if self.transaction_ids_by_hash.contains_key(&record.tx_hash) {
                    return Err(StoreError::Inconsistent(format!(
                        "transaction {} already mirrored under another id",
                        record.tx_hash
                    )));
                }
            } else {
                match self.transactions.get(&record.id) {
                    None => return Err(StoreError::TransactionNotFound(record.id)),
                    Some(existing) if existing.tx_hash != record.tx_hash => {
                        return Err(StoreError::Inconsistent(format!(
                            "update of {} changes its hash",
                            record.id
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        for block in &batch.staged_blocks {
            if let Some(existing) = self.blocks.get(&block.hash) {
                if existing != block {
                    return Err(StoreError::Inconsistent(format!(
                        "block {} restaged with different contents",
                        block.hash
                    )));
                }
            }
        }

        for output in &batch.staged_outputs {
            let transaction = output.output_id.transaction();
            if !self.transactions.contains_key(&transaction)
                && !staged_transaction_ids.contains(&transaction)
            {
                return Err(StoreError::TransactionNotFound(transaction));
            }
            if !self.addresses.contains_key(&output.address)
                && !staged_address_ids.contains(&output.address)
            {
                return Err(StoreError::AddressNotFound(output.address));
            }
        }
        for input in &batch.staged_inputs {
            if !self.transactions.contains_key(&input.transaction)
                && !staged_transaction_ids.contains(&input.transaction)
            {
                return Err(StoreError::TransactionNotFound(input.transaction));
            }
        }
        for certificate in &batch.staged_certificates {
            if !self.transactions.contains_key(&certificate.transaction)
                && !staged_transaction_ids.contains(&certificate.transaction)
            {
                return Err(StoreError::TransactionNotFound(certificate.transaction));
            }
            if !self.addresses.contains_key(&certificate.staking_address)
                && !staged_address_ids.contains(&certificate.staking_address)
            {
                return Err(StoreError::AddressNotFound(certificate.staking_address));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Digest, OutPoint};
    use crate::test_framework::mocks::{address_hash, tx_hash};
    use crate::wallet::confirmation_status::{ConfirmationStatus, SpendStatus};

    fn wallet() -> WalletId {
        WalletId::from_u32(1)
    }

    #[test]
    fn rejects_batch_begun_against_stale_counters() {
        let mut tables = Tables::new();
        let mut first = StoreBatch::new(0, 0);
        first.stage_new_address(wallet(), ChainKind::External, 0, address_hash(1), false);
        let mut second = StoreBatch::new(0, 0);
        second.stage_new_address(wallet(), ChainKind::External, 1, address_hash(2), false);

        tables.apply(first).unwrap();
        assert!(matches!(tables.apply(second), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn rejects_confirmed_transaction_without_block_reference() {
        let mut tables = Tables::new();
        let mut batch = StoreBatch::new(0, 0);
        let id = batch.allocate_transaction_id();
        batch.stage_transaction(TransactionRecord {
            id,
            tx_hash: tx_hash(1),
            status: ConfirmationStatus::Confirmed(4.into()),
            block: None,
            ordinal: None,
            digest: Digest::from_bytes([0; 32]),
            last_update_time: 0,
            error_message: None,
        });
        assert!(matches!(tables.apply(batch), Err(StoreError::Inconsistent(_))));
    }

    #[test]
    fn create_and_spend_in_one_batch_marks_the_output_spent() {
        let mut tables = Tables::new();
        let mut batch = StoreBatch::new(0, 0);
        let address = batch.stage_new_address(wallet(), ChainKind::External, 0, address_hash(1), true);

        let creator = batch.allocate_transaction_id();
        batch.stage_transaction(TransactionRecord {
            id: creator,
            tx_hash: tx_hash(1),
            status: ConfirmationStatus::Pending,
            block: None,
            ordinal: None,
            digest: Digest::from_bytes([1; 32]),
            last_update_time: 0,
            error_message: None,
        });
        batch.stage_output(UtxoOutput {
            output_id: OutputId::from_parts(creator, 0),
            address,
            value: 90,
            spend: SpendStatus::Unspent,
        });

        let spender = batch.allocate_transaction_id();
        batch.stage_transaction(TransactionRecord {
            id: spender,
            tx_hash: tx_hash(2),
            status: ConfirmationStatus::Pending,
            block: None,
            ordinal: None,
            digest: Digest::from_bytes([2; 32]),
            last_update_time: 0,
            error_message: None,
        });
        batch.stage_input(UtxoInput {
            transaction: spender,
            index: 0,
            spends: OutPoint::from_parts(tx_hash(1), 0),
        });

        tables.apply(batch).unwrap();
        assert_eq!(
            tables.output(OutputId::from_parts(creator, 0)).unwrap().spend,
            SpendStatus::PendingSpend(spender)
        );
    }
}
