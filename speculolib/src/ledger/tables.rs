//! The seven tables of the ledger mirror.
//!
//! Rows are kept in arenas keyed by integer id with explicit foreign-key
//! fields; relationships are resolved through lookups, never through
//! back-pointers. All mutation funnels through
//! [`crate::ledger::batch::StoreBatch`].

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::data::{
    AddressHash, AddressId, BlockHash, BlockHeight, CertificateKind, ChainKind, Digest, OutPoint,
    OutputId, TransactionId, TxHash, WalletId,
};
use crate::wallet::confirmation_status::{ConfirmationStatus, SpendStatus};

/// One derived address. Immutable once created except for `is_used`, which
/// flips monotonically false to true.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub id: AddressId,
    pub hash: AddressHash,
    pub chain: ChainKind,
    pub derivation_index: u32,
    pub is_used: bool,
    pub wallet: WalletId,
}

/// Everything the mirror knows about a transaction. The row is ledger-wide;
/// wallet visibility is scoped by which addresses reference it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub tx_hash: TxHash,
    pub status: ConfirmationStatus,
    // `block`/`ordinal` are Some exactly when status is Confirmed.
    pub block: Option<BlockHash>,
    pub ordinal: Option<u32>,
    pub digest: Digest,
    pub last_update_time: u64,
    pub error_message: Option<String>,
}

impl TransactionRecord {
    /// Block hash and ordinal, present only for confirmed transactions.
    pub fn block_position(&self) -> Option<(BlockHash, u32)> {
        match (self.block, self.ordinal) {
            (Some(block), Some(ordinal)) => Some((block, ordinal)),
            _ => None,
        }
    }
}

/// A block observed to contain at least one mirrored transaction. Insert-only;
/// a reorg leaves the row behind unreferenced.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub hash: BlockHash,
    pub height: BlockHeight,
    pub epoch: u64,
    pub slot: u64,
    pub time: u64,
}

/// One output of a mirrored transaction paying an address we track.
#[derive(Debug, Clone, PartialEq)]
pub struct UtxoOutput {
    pub output_id: OutputId,
    pub address: AddressId,
    pub value: u64,
    pub spend: SpendStatus,
}

impl UtxoOutput {
    pub fn is_unspent(&self) -> bool {
        self.spend.is_unspent()
    }
}

/// Immutable link from a transaction to the outpoint it consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct UtxoInput {
    pub transaction: TransactionId,
    pub index: u32,
    pub spends: OutPoint,
}

/// A staking certificate carried by a mirrored transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateRecord {
    pub transaction: TransactionId,
    pub kind: CertificateKind,
    pub payload: Vec<u8>,
    pub staking_address: AddressId,
}

/// Per-wallet sync cursor. Written only as the final element of a committed
/// reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSyncInfo {
    pub wallet: WalletId,
    pub block: Option<BlockHash>,
    pub height: BlockHeight,
    pub slot: Option<u64>,
    pub time: Option<u64>,
}

impl LastSyncInfo {
    /// The cursor before any confirmed history exists.
    pub fn genesis(wallet: WalletId, time: Option<u64>) -> Self {
        LastSyncInfo {
            wallet,
            block: None,
            height: BlockHeight::from_u64(0),
            slot: None,
            time,
        }
    }
}

/// The full table set. Readers see either the pre-pass or the post-pass
/// state of these maps, never an intermediate one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tables {
    pub(crate) addresses: BTreeMap<AddressId, Address>,
    pub(crate) address_ids_by_hash: HashMap<AddressHash, AddressId>,
    pub(crate) transactions: BTreeMap<TransactionId, TransactionRecord>,
    pub(crate) transaction_ids_by_hash: HashMap<TxHash, TransactionId>,
    pub(crate) blocks: BTreeMap<BlockHash, BlockRecord>,
    pub(crate) utxo_outputs: BTreeMap<OutputId, UtxoOutput>,
    pub(crate) utxo_inputs: BTreeMap<(TransactionId, u32), UtxoInput>,
    pub(crate) certificates: BTreeMap<TransactionId, Vec<CertificateRecord>>,
    pub(crate) last_sync: BTreeMap<WalletId, LastSyncInfo>,
    pub(crate) next_address_id: u64,
    pub(crate) next_transaction_id: u64,
}

impl Tables {
    pub fn new() -> Self {
        Tables::default()
    }

    pub fn address(&self, id: AddressId) -> Option<&Address> {
        self.addresses.get(&id)
    }

    pub fn address_by_hash(&self, hash: &AddressHash) -> Option<&Address> {
        self.address_ids_by_hash
            .get(hash)
            .and_then(|id| self.addresses.get(id))
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&TransactionRecord> {
        self.transactions.get(&id)
    }

    pub fn transaction_by_hash(&self, hash: &TxHash) -> Option<&TransactionRecord> {
        self.transaction_ids_by_hash
            .get(hash)
            .and_then(|id| self.transactions.get(id))
    }

    pub fn block(&self, hash: &BlockHash) -> Option<&BlockRecord> {
        self.blocks.get(hash)
    }

    pub fn last_sync(&self, wallet: WalletId) -> Option<&LastSyncInfo> {
        self.last_sync.get(&wallet)
    }

    pub fn output(&self, id: OutputId) -> Option<&UtxoOutput> {
        self.utxo_outputs.get(&id)
    }

    pub fn outputs_of(&self, transaction: TransactionId) -> impl Iterator<Item = &UtxoOutput> {
        self.utxo_outputs
            .range(OutputId::from_parts(transaction, 0)..=OutputId::from_parts(transaction, u32::MAX))
            .map(|(_, output)| output)
    }

    pub fn inputs_of(&self, transaction: TransactionId) -> impl Iterator<Item = &UtxoInput> {
        self.utxo_inputs
            .range((transaction, 0)..=(transaction, u32::MAX))
            .map(|(_, input)| input)
    }

    pub fn certificates_of(&self, transaction: TransactionId) -> &[CertificateRecord] {
        self.certificates
            .get(&transaction)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All addresses of one wallet, across chains.
    pub fn wallet_addresses(&self, wallet: WalletId) -> impl Iterator<Item = &Address> {
        self.addresses
            .values()
            .filter(move |address| address.wallet == wallet)
    }

    /// Addresses of one wallet chain, sorted by derivation index.
    pub fn wallet_chain_addresses(&self, wallet: WalletId, chain: ChainKind) -> Vec<&Address> {
        let mut chain_addresses: Vec<&Address> = self
            .addresses
            .values()
            .filter(|address| address.wallet == wallet && address.chain == chain)
            .collect();
        chain_addresses.sort_by_key(|address| address.derivation_index);
        chain_addresses
    }

    /// The outpoint under which other transactions reference this output.
    pub fn outpoint_of(&self, output: &UtxoOutput) -> Option<OutPoint> {
        self.transaction(output.output_id.transaction())
            .map(|record| OutPoint::from_parts(record.tx_hash, output.output_id.index()))
    }

    /// Resolves a remote-form outpoint to a local output row, if mirrored.
    pub fn resolve_outpoint(&self, outpoint: OutPoint) -> Option<OutputId> {
        let transaction = *self.transaction_ids_by_hash.get(&outpoint.tx_hash())?;
        let output_id = OutputId::from_parts(transaction, outpoint.index());
        self.utxo_outputs.contains_key(&output_id).then_some(output_id)
    }

    /// Derives the spend status of an output from the input rows referencing
    /// it. A confirmed spender wins over a pending one; remaining ties break
    /// on spender hash for deterministic replay.
    pub fn spend_status_of(&self, output_id: OutputId) -> SpendStatus {
        let output = match self.utxo_outputs.get(&output_id) {
            Some(output) => output,
            None => return SpendStatus::Unspent,
        };
        let outpoint = match self.outpoint_of(output) {
            Some(outpoint) => outpoint,
            None => return SpendStatus::Unspent,
        };

        let mut spenders: Vec<&TransactionRecord> = self
            .utxo_inputs
            .values()
            .filter(|input| input.spends == outpoint)
            .filter_map(|input| self.transaction(input.transaction))
            .filter(|record| record.status.is_live())
            .collect();
        spenders.sort_by_key(|record| (!record.status.is_confirmed(), record.tx_hash));

        match spenders.first() {
            Some(record) => SpendStatus::from_spender(record.id, record.status),
            None => SpendStatus::Unspent,
        }
    }

    /// Row ids of every transaction visible to a wallet: it pays one of the
    /// wallet's addresses, spends one of its outputs, or certifies one of its
    /// staking addresses.
    pub fn wallet_transaction_ids(&self, wallet: WalletId) -> Vec<TransactionId> {
        let wallet_addresses: HashSet<AddressId> = self
            .wallet_addresses(wallet)
            .map(|address| address.id)
            .collect();

        let mut visible: HashSet<TransactionId> = HashSet::new();
        for output in self.utxo_outputs.values() {
            if wallet_addresses.contains(&output.address) {
                visible.insert(output.output_id.transaction());
            }
        }
        for input in self.utxo_inputs.values() {
            if let Some(spent) = self.resolve_outpoint(input.spends) {
                if let Some(output) = self.utxo_outputs.get(&spent) {
                    if wallet_addresses.contains(&output.address) {
                        visible.insert(input.transaction);
                    }
                }
            }
        }
        for certificate_rows in self.certificates.values() {
            for certificate in certificate_rows {
                if wallet_addresses.contains(&certificate.staking_address) {
                    visible.insert(certificate.transaction);
                }
            }
        }

        let mut ids: Vec<TransactionId> = visible.into_iter().collect();
        ids.sort();
        ids
    }

    /// The highest block holding one of the wallet's confirmed transactions,
    /// the anchor for the wallet's sync cursor.
    pub fn highest_confirmed_block_for(&self, wallet: WalletId) -> Option<&BlockRecord> {
        self.wallet_transaction_ids(wallet)
            .into_iter()
            .filter_map(|id| self.transaction(id))
            .filter_map(|record| record.block.as_ref())
            .filter_map(|hash| self.block(hash))
            .max_by_key(|block| block.height)
    }
}
