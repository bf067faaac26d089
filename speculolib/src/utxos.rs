//! Projects the spendable output set and balances out of the mirror.
//!
//! An output is spendable exactly when its creating transaction is confirmed
//! and no live transaction consumes it. Spend flags are maintained
//! incrementally at commit time; [`full_spend_recompute`] re-derives every
//! flag from scratch and must always agree with the incremental result.

use getset::CopyGetters;

use crate::data::{AddressHash, OutputId, WalletId};
use crate::ledger::tables::Tables;

/// One spendable output of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct UtxoView {
    /// The paying address.
    address: AddressHash,
    /// Value in the smallest ledger unit.
    value: u64,
    /// Where the output came from.
    provenance: OutputId,
}

/// The wallet's spendable outputs, ordered by provenance for deterministic
/// replay.
pub fn all_utxos(tables: &Tables, wallet: WalletId) -> Vec<UtxoView> {
    collect_utxos(tables, wallet, false)
}

/// The total spendable balance of a wallet.
pub fn balance(tables: &Tables, wallet: WalletId) -> u64 {
    all_utxos(tables, wallet).iter().map(|utxo| utxo.value).sum()
}

/// Balance including outputs of still-pending transactions, for "incoming"
/// display. Never an input to spend selection.
pub fn pending_balance(tables: &Tables, wallet: WalletId) -> u64 {
    collect_utxos(tables, wallet, true)
        .iter()
        .map(|utxo| utxo.value)
        .sum()
}

fn collect_utxos(tables: &Tables, wallet: WalletId, include_pending: bool) -> Vec<UtxoView> {
    tables
        .utxo_outputs
        .values()
        .filter(|output| output.is_unspent())
        .filter(|output| {
            tables
                .address(output.address)
                .map(|address| address.wallet == wallet)
                .unwrap_or(false)
        })
        .filter(|output| {
            let status = match tables.transaction(output.output_id.transaction()) {
                Some(record) => record.status,
                None => return false,
            };
            status.is_confirmed() || (include_pending && status.is_pending())
        })
        .map(|output| UtxoView {
            address: tables
                .address(output.address)
                .map(|address| address.hash)
                .expect("filtered on address presence above"),
            value: output.value,
            provenance: output.output_id,
        })
        .collect()
}

/// Re-derives every output's spend flag from the input and transaction
/// tables. The incremental maintenance done at commit time must produce
/// tables equal to this.
pub fn full_spend_recompute(tables: &mut Tables) {
    let output_ids: Vec<OutputId> = tables.utxo_outputs.keys().copied().collect();
    let updates: Vec<_> = output_ids
        .into_iter()
        .map(|output_id| (output_id, tables.spend_status_of(output_id)))
        .collect();
    for (output_id, spend) in updates {
        if let Some(output) = tables.utxo_outputs.get_mut(&output_id) {
            output.spend = spend;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChainKind, Digest, TransactionId, TxHash};
    use crate::ledger::tables::{TransactionRecord, UtxoOutput};
    use crate::ledger::LedgerStore;
    use crate::test_framework::mocks::{address_hash, block_hash, tx_hash};
    use crate::wallet::confirmation_status::{ConfirmationStatus, SpendStatus};

    fn wallet() -> WalletId {
        WalletId::from_u32(1)
    }

    fn stage_paying_transaction(
        store: &LedgerStore,
        hash: TxHash,
        status: ConfirmationStatus,
        value: u64,
    ) -> TransactionId {
        let mut batch = store.begin();
        let address_id = match store.read().address_by_hash(&address_hash(1)) {
            Some(address) => address.id,
            None => batch.stage_new_address(wallet(), ChainKind::External, 0, address_hash(1), true),
        };
        let id = batch.allocate_transaction_id();
        let (block, ordinal) = match status {
            ConfirmationStatus::Confirmed(height) => (Some(block_hash(u64::from(height) as u8)), Some(0)),
            _ => (None, None),
        };
        if let (Some(block), ConfirmationStatus::Confirmed(height)) = (block, status) {
            batch.stage_block(crate::ledger::tables::BlockRecord {
                hash: block,
                height,
                epoch: 0,
                slot: u64::from(height) * 10,
                time: u64::from(height) * 100,
            });
        }
        batch.stage_transaction(TransactionRecord {
            id,
            tx_hash: hash,
            status,
            block,
            ordinal,
            digest: Digest::from_bytes([0; 32]),
            last_update_time: 0,
            error_message: None,
        });
        batch.stage_output(UtxoOutput {
            output_id: OutputId::from_parts(id, 0),
            address: address_id,
            value,
            spend: SpendStatus::Unspent,
        });
        store.commit(batch).unwrap();
        id
    }

    #[test]
    fn only_confirmed_outputs_are_spendable() {
        let store = LedgerStore::new();
        stage_paying_transaction(&store, tx_hash(1), ConfirmationStatus::Confirmed(4.into()), 100);
        stage_paying_transaction(&store, tx_hash(2), ConfirmationStatus::Pending, 40);
        stage_paying_transaction(&store, tx_hash(3), ConfirmationStatus::Reorganized, 7);

        let tables = store.read();
        assert_eq!(balance(&tables, wallet()), 100);
        assert_eq!(pending_balance(&tables, wallet()), 140);
        assert_eq!(all_utxos(&tables, wallet()).len(), 1);
    }

    #[test]
    fn incremental_flags_match_full_recompute() {
        let store = LedgerStore::new();
        stage_paying_transaction(&store, tx_hash(1), ConfirmationStatus::Confirmed(4.into()), 100);
        stage_paying_transaction(&store, tx_hash(2), ConfirmationStatus::Pending, 40);

        let incremental = store.snapshot();
        let mut recomputed = incremental.clone();
        full_spend_recompute(&mut recomputed);
        assert_eq!(incremental, recomputed);
    }
}
