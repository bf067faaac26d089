//! Queries over the staking certificates attached to mirrored transactions.
//!
//! Certificates enter the store through the same reconciled batches as the
//! transactions that carry them; this module only reads. Only certificates
//! of confirmed transactions count, ordered by block height then ordinal so
//! "which delegation was active at slot S" is answered by the latest
//! certificate at or before S.

use getset::{CopyGetters, Getters};
use itertools::Itertools;

use crate::data::{AddressId, BlockHeight, CertificateKind, TransactionId};
use crate::ledger::tables::Tables;

/// A confirmed certificate joined with its block position.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct CertificateView {
    #[getset(get_copy = "pub")]
    kind: CertificateKind,
    payload: Vec<u8>,
    #[getset(get_copy = "pub")]
    staking_address: AddressId,
    #[getset(get_copy = "pub")]
    transaction: TransactionId,
    #[getset(get_copy = "pub")]
    height: BlockHeight,
    #[getset(get_copy = "pub")]
    ordinal: u32,
    #[getset(get_copy = "pub")]
    slot: u64,
}

impl CertificateView {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// All confirmed certificates referencing the given staking addresses,
/// oldest first by block order.
pub fn certificates_for(tables: &Tables, staking_addresses: &[AddressId]) -> Vec<CertificateView> {
    tables
        .certificates
        .values()
        .flatten()
        .filter(|certificate| staking_addresses.contains(&certificate.staking_address))
        .filter_map(|certificate| {
            let record = tables.transaction(certificate.transaction)?;
            let (block, ordinal) = record.block_position()?;
            let block = tables.block(&block)?;
            Some(CertificateView {
                kind: certificate.kind,
                payload: certificate.payload.clone(),
                staking_address: certificate.staking_address,
                transaction: certificate.transaction,
                height: block.height,
                ordinal,
                slot: block.slot,
            })
        })
        .sorted_by_key(|view| (view.height, view.ordinal, view.transaction))
        .collect()
}

/// The certificate governing a staking address at the given absolute slot:
/// the latest one at or before it.
pub fn delegation_at(
    tables: &Tables,
    staking_address: AddressId,
    slot: u64,
) -> Option<CertificateView> {
    certificates_for(tables, &[staking_address])
        .into_iter()
        .filter(|view| view.slot <= slot)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChainKind, Digest, OutPoint, WalletId};
    use crate::ledger::tables::{BlockRecord, CertificateRecord, TransactionRecord};
    use crate::ledger::LedgerStore;
    use crate::test_framework::mocks::{address_hash, block_hash, tx_hash};
    use crate::wallet::confirmation_status::ConfirmationStatus;

    // no payment flows needed here; certificates ride bare transactions
    fn store_with_delegations() -> (LedgerStore, AddressId) {
        let store = LedgerStore::new();
        let mut batch = store.begin();
        let staking = batch.stage_new_address(
            WalletId::from_u32(1),
            ChainKind::Staking,
            0,
            address_hash(50),
            true,
        );
        for (n, slot) in [(1u8, 100u64), (2, 200), (3, 300)] {
            batch.stage_block(BlockRecord {
                hash: block_hash(n),
                height: (n as u64).into(),
                epoch: 0,
                slot,
                time: slot * 10,
            });
            let id = batch.allocate_transaction_id();
            batch.stage_transaction(TransactionRecord {
                id,
                tx_hash: tx_hash(n),
                status: ConfirmationStatus::Confirmed((n as u64).into()),
                block: Some(block_hash(n)),
                ordinal: Some(0),
                digest: Digest::from_bytes([n; 32]),
                last_update_time: 0,
                error_message: None,
            });
            batch.stage_certificate(CertificateRecord {
                transaction: id,
                kind: CertificateKind::StakeDelegation,
                payload: vec![n],
                staking_address: staking,
            });
        }
        store.commit(batch).unwrap();
        (store, staking)
    }

    #[test]
    fn certificates_come_back_in_block_order() {
        let (store, staking) = store_with_delegations();
        let tables = store.read();
        let views = certificates_for(&tables, &[staking]);
        assert_eq!(views.len(), 3);
        assert_eq!(
            views.iter().map(|view| view.payload()[0]).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn delegation_at_takes_the_latest_at_or_before_the_slot() {
        let (store, staking) = store_with_delegations();
        let tables = store.read();
        assert_eq!(delegation_at(&tables, staking, 250).unwrap().payload(), &[2]);
        assert_eq!(delegation_at(&tables, staking, 300).unwrap().payload(), &[3]);
        assert!(delegation_at(&tables, staking, 50).is_none());
    }

    #[test]
    fn unconfirmed_certificates_are_invisible() {
        let (store, staking) = store_with_delegations();
        let mut batch = store.begin();
        let id = batch.allocate_transaction_id();
        batch.stage_transaction(TransactionRecord {
            id,
            tx_hash: tx_hash(9),
            status: ConfirmationStatus::Pending,
            block: None,
            ordinal: None,
            digest: Digest::from_bytes([9; 32]),
            last_update_time: 0,
            error_message: None,
        });
        batch.stage_input(crate::ledger::tables::UtxoInput {
            transaction: id,
            index: 0,
            spends: OutPoint::from_parts(tx_hash(1), 0),
        });
        batch.stage_certificate(CertificateRecord {
            transaction: id,
            kind: CertificateKind::StakeDeregistration,
            payload: vec![9],
            staking_address: staking,
        });
        store.commit(batch).unwrap();

        let tables = store.read();
        assert_eq!(certificates_for(&tables, &[staking]).len(), 3);
    }
}
