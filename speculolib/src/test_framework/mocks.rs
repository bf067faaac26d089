//! Tools to facilitate mocks for testing

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use sha2::{Digest as _, Sha256};

use crate::client::{RemoteSource, UsageOracle};
use crate::data::{
    AddressHash, BlockHash, BlockMeta, HistoryQuery, HistoryResponse, RemoteCertificate,
    RemoteInput, RemoteOutput, RemoteState, RemoteTransaction, TxHash,
};
use crate::error::{AddressSpaceError, TransportError};
use crate::data::ChainKind;
use crate::ledger::tables::Tables;
use crate::wallet::keys::KeyDerivation;

macro_rules! build_method {
    ($name:ident, $localtype:ty) => {
        #[doc = "Set the $name field of the builder."]
        pub fn $name(mut self, $name: $localtype) -> Self {
            self.$name = Some($name);
            self
        }
    };
}
pub(crate) use build_method;

/// This is the "all-0" base case!
pub fn default_tx_hash() -> TxHash {
    TxHash::from_bytes([0u8; 32])
}

/// Any old OS randomness
pub fn random_tx_hash() -> TxHash {
    use rand::{rngs::OsRng, Rng};
    let mut rng = OsRng;
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    TxHash::from_bytes(bytes)
}

/// Deterministic one-byte-pattern hashes for readable test fixtures.
pub fn tx_hash(n: u8) -> TxHash {
    TxHash::from_bytes([n; 32])
}

pub fn block_hash(n: u8) -> BlockHash {
    BlockHash::from_bytes([n; 32])
}

pub fn address_hash(n: u8) -> AddressHash {
    AddressHash::from_bytes([n; 32])
}

/// Clears cursor timestamps so two snapshots compare equal when only the
/// sync time differs between them.
pub fn normalize_sync_times(tables: &mut Tables) {
    for info in tables.last_sync.values_mut() {
        info.time = None;
    }
}

/// A block at `height` with hash, slot, and time derived from it.
pub fn block_meta(height: u64) -> BlockMeta {
    BlockMeta::from_parts(
        block_hash(height as u8),
        height.into(),
        height / 10,
        height * 10,
        height * 100,
    )
}

/// Derivation backed by a hash over (seed, chain, index). Pure and
/// collision-free enough for tests.
pub struct MockDerivation {
    seed: [u8; 32],
}

impl MockDerivation {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        MockDerivation { seed }
    }
}

impl KeyDerivation for MockDerivation {
    fn derive(&self, chain: ChainKind, index: u32) -> Result<AddressHash, AddressSpaceError> {
        let mut hasher = Sha256::new();
        hasher.update(self.seed);
        hasher.update([chain.tag()]);
        hasher.update(index.to_le_bytes());
        Ok(AddressHash::from_bytes(hasher.finalize().into()))
    }
}

/// to create a mock RemoteTransaction
pub struct RemoteTransactionBuilder {
    tx_hash: Option<TxHash>,
    state: Option<RemoteState>,
    inputs: Vec<RemoteInput>,
    outputs: Vec<RemoteOutput>,
    certificates: Vec<RemoteCertificate>,
    time: Option<u64>,
}

impl RemoteTransactionBuilder {
    /// blank builder
    pub fn new() -> Self {
        Self {
            tx_hash: None,
            state: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            certificates: Vec::new(),
            time: None,
        }
    }

    // Methods to set each field
    build_method!(tx_hash, TxHash);
    build_method!(state, RemoteState);
    build_method!(time, u64);

    pub fn input(mut self, input: RemoteInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: RemoteOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn certificate(mut self, certificate: RemoteCertificate) -> Self {
        self.certificates.push(certificate);
        self
    }

    /// builds a mock RemoteTransaction, defaulting unset fields
    pub fn build(self) -> RemoteTransaction {
        RemoteTransaction::from_parts(
            self.tx_hash.unwrap_or_else(default_tx_hash),
            self.state.unwrap_or(RemoteState::Mempool),
            self.inputs,
            self.outputs,
            self.certificates,
            self.time.unwrap_or(0),
        )
    }
}

impl Default for RemoteTransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct MockChainState {
    transactions: Vec<RemoteTransaction>,
    known_blocks: HashMap<BlockHash, BlockMeta>,
    best: Option<BlockMeta>,
    unreachable: bool,
}

impl MockChainState {
    fn involves(&self, transaction: &RemoteTransaction, addresses: &HashSet<AddressHash>) -> bool {
        transaction
            .outputs()
            .iter()
            .any(|output| addresses.contains(&output.address()))
            || transaction
                .certificates()
                .iter()
                .any(|certificate| addresses.contains(&certificate.staking_address()))
            || transaction.inputs().iter().any(|input| {
                self.transactions.iter().any(|previous| {
                    previous.tx_hash() == input.spends().tx_hash()
                        && previous
                            .outputs()
                            .get(input.spends().index() as usize)
                            .map(|output| addresses.contains(&output.address()))
                            .unwrap_or(false)
                })
            })
    }
}

/// An in-memory stand-in for the remote indexer: a mutable chain state
/// served through the [`RemoteSource`] contract, with the rollback signal
/// and pagination of the real thing.
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<Mutex<MockChainState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        MockRemote::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockChainState> {
        self.state.lock().expect("mock remote lock poisoned")
    }

    /// Registers a block and makes it the best block when it is the highest.
    pub fn add_block(&self, meta: BlockMeta) {
        let mut state = self.lock();
        state.known_blocks.insert(meta.hash(), meta);
        let is_best = state
            .best
            .map(|best| best.height() < meta.height())
            .unwrap_or(true);
        if is_best {
            state.best = Some(meta);
        }
    }

    /// Adds a transaction; a confirmed one registers its block too.
    pub fn add_transaction(&self, transaction: RemoteTransaction) {
        if let RemoteState::InBlock { block, .. } = transaction.state() {
            self.add_block(*block);
        }
        self.lock().transactions.push(transaction);
    }

    /// Replaces the state of a known transaction, e.g. mempool to block.
    pub fn set_transaction_state(&self, tx_hash: TxHash, new_state: RemoteState) {
        if let RemoteState::InBlock { block, .. } = &new_state {
            self.add_block(*block);
        }
        let mut state = self.lock();
        let replaced: Vec<RemoteTransaction> = state
            .transactions
            .iter()
            .map(|transaction| {
                if transaction.tx_hash() == tx_hash {
                    RemoteTransaction::from_parts(
                        transaction.tx_hash(),
                        new_state.clone(),
                        transaction.inputs().to_vec(),
                        transaction.outputs().to_vec(),
                        transaction.certificates().to_vec(),
                        transaction.time(),
                    )
                } else {
                    transaction.clone()
                }
            })
            .collect();
        state.transactions = replaced;
    }

    /// Evicts a transaction from the served history without any reorg.
    pub fn evict_transaction(&self, tx_hash: TxHash) {
        self.lock()
            .transactions
            .retain(|transaction| transaction.tx_hash() != tx_hash);
    }

    /// Rolls the chain back to `height`: higher blocks become unknown and
    /// the transactions they carried vanish from the served history.
    pub fn rollback_to(&self, height: u64) {
        let mut state = self.lock();
        state
            .known_blocks
            .retain(|_, meta| u64::from(meta.height()) <= height);
        let surviving: HashSet<BlockHash> = state.known_blocks.keys().copied().collect();
        state.transactions.retain(|transaction| match transaction.state() {
            RemoteState::InBlock { block, .. } => surviving.contains(&block.hash()),
            _ => true,
        });
        state.best = state.known_blocks.values().max_by_key(|meta| meta.height()).copied();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    fn history(&self, query: &HistoryQuery) -> Result<HistoryResponse, TransportError> {
        let state = self.lock();
        if state.unreachable {
            return Err(TransportError::Unreachable("mock remote offline".to_string()));
        }
        if let Some(until) = query.until {
            if !state.known_blocks.contains_key(&until) {
                return Ok(HistoryResponse::Rollback);
            }
        }

        let addresses: HashSet<AddressHash> = query.addresses.iter().copied().collect();
        let mut involved: Vec<RemoteTransaction> = state
            .transactions
            .iter()
            .filter(|transaction| state.involves(transaction, &addresses))
            .cloned()
            .collect();
        involved.sort_by_key(|transaction| transaction.replay_order());

        if let Some(after) = query.after {
            if let Some(position) = involved
                .iter()
                .position(|transaction| transaction.tx_hash() == after)
            {
                involved.drain(..=position);
            }
        }
        involved.truncate(query.page_size);
        Ok(HistoryResponse::Tail(involved))
    }

    fn usage(&self, addresses: &[AddressHash]) -> Result<Vec<AddressHash>, TransportError> {
        let state = self.lock();
        if state.unreachable {
            return Err(TransportError::Unreachable("mock remote offline".to_string()));
        }
        let used: Vec<AddressHash> = addresses
            .iter()
            .filter(|address| {
                state.transactions.iter().any(|transaction| {
                    transaction
                        .outputs()
                        .iter()
                        .any(|output| output.address() == **address)
                        || transaction
                            .certificates()
                            .iter()
                            .any(|certificate| certificate.staking_address() == **address)
                })
            })
            .copied()
            .collect();
        Ok(used)
    }
}

impl RemoteSource for MockRemote {
    fn best_block(&self) -> BoxFuture<'_, Result<Option<BlockMeta>, TransportError>> {
        Box::pin(async move {
            let state = self.lock();
            if state.unreachable {
                return Err(TransportError::Unreachable("mock remote offline".to_string()));
            }
            Ok(state.best)
        })
    }

    fn transaction_history(
        &self,
        query: HistoryQuery,
    ) -> BoxFuture<'_, Result<HistoryResponse, TransportError>> {
        Box::pin(async move { self.history(&query) })
    }

    fn used_addresses(
        &self,
        addresses: Vec<AddressHash>,
    ) -> BoxFuture<'_, Result<Vec<AddressHash>, TransportError>> {
        Box::pin(async move { self.usage(&addresses) })
    }
}

impl UsageOracle for MockRemote {
    fn check_used(
        &self,
        addresses: Vec<AddressHash>,
    ) -> BoxFuture<'_, Result<Vec<AddressHash>, TransportError>> {
        Box::pin(async move { self.usage(&addresses) })
    }
}
