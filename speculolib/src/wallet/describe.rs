//! Human-facing summaries of a wallet's mirrored history.

use std::collections::HashSet;

use itertools::Itertools;
use serde_json::json;

use crate::data::{AddressId, WalletId};
use crate::ledger::tables::Tables;
use crate::wallet::confirmation_status::ConfirmationStatus;

/// One JSON object per transaction visible to the wallet, oldest first:
/// `{txid, status, block_height?, received, spent, time}`. Amounts are sums
/// over the wallet's own addresses.
pub fn value_transfers(tables: &Tables, wallet: WalletId) -> serde_json::Value {
    let wallet_addresses: HashSet<AddressId> = tables
        .wallet_addresses(wallet)
        .map(|address| address.id)
        .collect();

    let summaries = tables
        .wallet_transaction_ids(wallet)
        .into_iter()
        .filter_map(|id| tables.transaction(id))
        .sorted_by_key(|record| {
            let height = record
                .status
                .get_confirmed_height()
                .map(u64::from)
                .unwrap_or(u64::MAX);
            (height, record.ordinal.unwrap_or(u32::MAX), record.tx_hash)
        })
        .map(|record| {
            let received: u64 = tables
                .outputs_of(record.id)
                .filter(|output| wallet_addresses.contains(&output.address))
                .map(|output| output.value)
                .sum();
            let spent: u64 = tables
                .inputs_of(record.id)
                .filter_map(|input| tables.resolve_outpoint(input.spends))
                .filter_map(|output_id| tables.output(output_id))
                .filter(|output| wallet_addresses.contains(&output.address))
                .map(|output| output.value)
                .sum();

            let mut summary = json!({
                "txid": format!("{}", record.tx_hash),
                "status": status_label(record.status),
                "received": received,
                "spent": spent,
                "time": record.last_update_time,
            });
            if let Some(height) = record.status.get_confirmed_height() {
                summary["block_height"] = json!(u64::from(height));
            }
            if let Some(message) = &record.error_message {
                summary["error"] = json!(message);
            }
            summary
        })
        .collect::<Vec<_>>();

    json!(summaries)
}

fn status_label(status: ConfirmationStatus) -> &'static str {
    match status {
        ConfirmationStatus::Pending => "pending",
        ConfirmationStatus::Confirmed(_) => "confirmed",
        ConfirmationStatus::Failed => "failed",
        ConfirmationStatus::Reorganized => "reorganized",
        ConfirmationStatus::Dropped => "dropped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChainKind, Digest, OutputId, WalletId};
    use crate::ledger::tables::{BlockRecord, TransactionRecord, UtxoOutput};
    use crate::ledger::LedgerStore;
    use crate::test_framework::mocks::{address_hash, block_hash, tx_hash};
    use crate::wallet::confirmation_status::SpendStatus;

    #[test]
    fn summaries_carry_status_height_and_amounts() {
        let store = LedgerStore::new();
        let wallet = WalletId::from_u32(1);
        let mut batch = store.begin();
        let address = batch.stage_new_address(wallet, ChainKind::External, 0, address_hash(1), true);
        batch.stage_block(BlockRecord {
            hash: block_hash(3),
            height: 3.into(),
            epoch: 0,
            slot: 30,
            time: 300,
        });
        let id = batch.allocate_transaction_id();
        batch.stage_transaction(TransactionRecord {
            id,
            tx_hash: tx_hash(1),
            status: ConfirmationStatus::Confirmed(3.into()),
            block: Some(block_hash(3)),
            ordinal: Some(0),
            digest: Digest::from_bytes([0; 32]),
            last_update_time: 42,
            error_message: None,
        });
        batch.stage_output(UtxoOutput {
            output_id: OutputId::from_parts(id, 0),
            address,
            value: 90,
            spend: SpendStatus::Unspent,
        });
        store.commit(batch).unwrap();

        let transfers = value_transfers(&store.read(), wallet);
        let entries = transfers.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["status"], "confirmed");
        assert_eq!(entries[0]["block_height"], 3);
        assert_eq!(entries[0]["received"], 90);
        assert_eq!(entries[0]["spent"], 0);
    }
}
