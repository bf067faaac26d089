//! Primitive ids, hashes, and the records the remote indexer reports.

use std::fmt;

use getset::{CopyGetters, Getters};
use sha2::{Digest as _, Sha256};

/// Hash identifying a transaction on the remote ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        TxHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

/// Hash identifying a block on the remote ledger.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        BlockHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self)
    }
}

/// Hash form of a payment or staking address, as the remote indexes it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressHash([u8; 32]);

impl AddressHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        AddressHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AddressHash({})", self)
    }
}

/// Height of a block, counted from the genesis block at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub fn from_u64(height: u64) -> Self {
        BlockHeight(height)
    }

    pub fn saturating_sub(self, other: u64) -> Self {
        BlockHeight(self.0.saturating_sub(other))
    }
}

impl From<BlockHeight> for u64 {
    fn from(height: BlockHeight) -> u64 {
        height.0
    }
}

impl From<u64> for BlockHeight {
    fn from(height: u64) -> BlockHeight {
        BlockHeight(height)
    }
}

impl std::ops::Add<u64> for BlockHeight {
    type Output = BlockHeight;

    fn add(self, other: u64) -> BlockHeight {
        BlockHeight(self.0 + other)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one wallet's view over the shared ledger mirror.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalletId(u32);

impl WalletId {
    pub fn from_u32(id: u32) -> Self {
        WalletId(id)
    }
}

impl From<WalletId> for u32 {
    fn from(id: WalletId) -> u32 {
        id.0
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wallet{}", self.0)
    }
}

/// Row id of an address in the mirror. Assigned by the store, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddressId(u64);

impl AddressId {
    pub fn from_u64(id: u64) -> Self {
        AddressId(id)
    }
}

impl From<AddressId> for u64 {
    fn from(id: AddressId) -> u64 {
        id.0
    }
}

impl fmt::Display for AddressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr#{}", self.0)
    }
}

/// Row id of a transaction in the mirror. Assigned by the store, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn from_u64(id: u64) -> Self {
        TransactionId(id)
    }
}

impl From<TransactionId> for u64 {
    fn from(id: TransactionId) -> u64 {
        id.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Output ID addressing one output row of a mirrored transaction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct OutputId {
    /// Row id of the transaction that created the output.
    transaction: TransactionId,
    /// Index of the output within that transaction.
    index: u32,
}

impl OutputId {
    /// Creates new OutputId from parts
    pub fn from_parts(transaction: TransactionId, index: u32) -> Self {
        OutputId { transaction, index }
    }
}

/// Reference to an output by the hash of its creating transaction, the form
/// the remote uses in transaction inputs.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct OutPoint {
    tx_hash: TxHash,
    index: u32,
}

impl OutPoint {
    pub fn from_parts(tx_hash: TxHash, index: u32) -> Self {
        OutPoint { tx_hash, index }
    }
}

/// Sub-branch of an account's address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChainKind {
    /// Receiving addresses, handed out to counterparties.
    External,
    /// Change addresses, only ever paid by the wallet itself.
    Internal,
    /// Staking addresses carrying delegation certificates.
    Staking,
}

impl ChainKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ChainKind::External => 0,
            ChainKind::Internal => 1,
            ChainKind::Staking => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ChainKind::External),
            1 => Some(ChainKind::Internal),
            2 => Some(ChainKind::Staking),
            _ => None,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::External => write!(f, "external"),
            ChainKind::Internal => write!(f, "internal"),
            ChainKind::Staking => write!(f, "staking"),
        }
    }
}

/// Cheap fingerprint of a transaction's normalized content. Detects "same
/// transaction, changed on the remote" without a field-by-field comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Fingerprints the content of a remote transaction record. The
    /// confirmation state is deliberately left out; it is compared separately.
    pub fn of_remote(transaction: &RemoteTransaction) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(transaction.tx_hash().as_bytes());
        for input in transaction.inputs() {
            hasher.update(input.spends().tx_hash().as_bytes());
            hasher.update(input.spends().index().to_le_bytes());
        }
        for output in transaction.outputs() {
            hasher.update(output.address().as_bytes());
            hasher.update(output.value().to_le_bytes());
        }
        for certificate in transaction.certificates() {
            hasher.update([certificate.kind().tag()]);
            hasher.update(certificate.staking_address().as_bytes());
            hasher.update(certificate.payload());
        }
        Digest(hasher.finalize().into())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

/// Position and identity of a block as the remote reports it.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct BlockMeta {
    hash: BlockHash,
    height: BlockHeight,
    epoch: u64,
    slot: u64,
    time: u64,
}

impl BlockMeta {
    pub fn from_parts(hash: BlockHash, height: BlockHeight, epoch: u64, slot: u64, time: u64) -> Self {
        Self {
            hash,
            height,
            epoch,
            slot,
            time,
        }
    }
}

/// Where the remote currently places a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteState {
    /// Sitting in the mempool, not yet in any block.
    Mempool,
    /// Included in a block reachable from the remote's best block.
    InBlock {
        block: BlockMeta,
        /// Position within the block, authoritative for ordering.
        ordinal: u32,
    },
    /// Explicitly rejected by the remote.
    Failed { reason: String },
}

/// One output of a remote transaction.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RemoteOutput {
    address: AddressHash,
    value: u64,
}

impl RemoteOutput {
    pub fn from_parts(address: AddressHash, value: u64) -> Self {
        Self { address, value }
    }
}

/// One input of a remote transaction: the outpoint it consumes.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RemoteInput {
    spends: OutPoint,
}

impl RemoteInput {
    pub fn from_parts(spends: OutPoint) -> Self {
        Self { spends }
    }
}

/// Kind of a staking certificate embedded in a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateKind {
    StakeRegistration,
    StakeDeregistration,
    StakeDelegation,
}

impl CertificateKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            CertificateKind::StakeRegistration => 0,
            CertificateKind::StakeDeregistration => 1,
            CertificateKind::StakeDelegation => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CertificateKind::StakeRegistration),
            1 => Some(CertificateKind::StakeDeregistration),
            2 => Some(CertificateKind::StakeDelegation),
            _ => None,
        }
    }
}

/// A staking certificate as the remote reports it, attached to the
/// transaction that carries it.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct RemoteCertificate {
    #[getset(get_copy = "pub")]
    kind: CertificateKind,
    #[getset(get_copy = "pub")]
    staking_address: AddressHash,
    payload: Vec<u8>,
}

impl RemoteCertificate {
    pub fn from_parts(kind: CertificateKind, staking_address: AddressHash, payload: Vec<u8>) -> Self {
        Self {
            kind,
            staking_address,
            payload,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A transaction as returned by the remote history query, already parsed.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct RemoteTransaction {
    #[getset(get_copy = "pub")]
    tx_hash: TxHash,
    #[getset(get = "pub")]
    state: RemoteState,
    inputs: Vec<RemoteInput>,
    outputs: Vec<RemoteOutput>,
    certificates: Vec<RemoteCertificate>,
    #[getset(get_copy = "pub")]
    time: u64,
}

impl RemoteTransaction {
    pub fn from_parts(
        tx_hash: TxHash,
        state: RemoteState,
        inputs: Vec<RemoteInput>,
        outputs: Vec<RemoteOutput>,
        certificates: Vec<RemoteCertificate>,
        time: u64,
    ) -> Self {
        Self {
            tx_hash,
            state,
            inputs,
            outputs,
            certificates,
            time,
        }
    }

    pub fn inputs(&self) -> &[RemoteInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[RemoteOutput] {
        &self.outputs
    }

    pub fn certificates(&self) -> &[RemoteCertificate] {
        &self.certificates
    }

    /// Sort key for deterministic replay: block position first, then hash.
    pub(crate) fn replay_order(&self) -> (u64, u32, TxHash) {
        match &self.state {
            RemoteState::InBlock { block, ordinal } => {
                (u64::from(block.height()), *ordinal, self.tx_hash)
            }
            RemoteState::Mempool | RemoteState::Failed { .. } => {
                (u64::MAX, u32::MAX, self.tx_hash)
            }
        }
    }
}

/// Query for the remote transaction history of a set of addresses, relative
/// to a sync cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    /// Addresses whose history is requested.
    pub addresses: Vec<AddressHash>,
    /// Fetch history reachable from this block; `None` means from genesis.
    pub until: Option<BlockHash>,
    /// Pagination: return transactions strictly after this one.
    pub after: Option<TxHash>,
    /// Upper bound on the number of transactions per response.
    pub page_size: usize,
}

/// Answer to a [`HistoryQuery`].
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryResponse {
    /// The authoritative tail of history beyond the query cursor.
    Tail(Vec<RemoteTransaction>),
    /// The cursor block is unknown to the chain the remote now serves.
    Rollback,
}
