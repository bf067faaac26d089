//! Scenario scaffolding: a shared store and mock remote, plus helpers to
//! build wallets and remote transactions with readable values.

use std::sync::Arc;

use speculolib::config::SyncConfig;
use speculolib::data::{
    AddressHash, ChainKind, OutPoint, RemoteInput, RemoteOutput, RemoteState, RemoteTransaction,
    TxHash, WalletId,
};
use speculolib::ledger::LedgerStore;
use speculolib::test_framework::mocks::{
    block_meta, tx_hash, MockDerivation, MockRemote, RemoteTransactionBuilder,
};
use speculolib::wallet::keys::{KeyDerivation, WalletCapability};
use speculolib::wallet::Wallet;

use crate::constants::{GAP_LIMIT, PAGE_SIZE};

/// One store and one remote, shared by every wallet in the scenario.
pub struct Scenario {
    pub store: LedgerStore,
    pub remote: MockRemote,
}

impl Scenario {
    pub fn new() -> Self {
        Scenario {
            store: LedgerStore::new(),
            remote: MockRemote::new(),
        }
    }

    /// Creates a wallet with payment and staking chains from two seeds.
    pub async fn create_wallet(
        &self,
        id: u32,
        payment_seed: [u8; 32],
        staking_seed: [u8; 32],
    ) -> Wallet {
        let capability = WalletCapability::with_staking(
            Arc::new(MockDerivation::from_seed(payment_seed)),
            Arc::new(MockDerivation::from_seed(staking_seed)),
        );
        Wallet::create(
            WalletId::from_u32(id),
            capability,
            SyncConfig::new(GAP_LIMIT, PAGE_SIZE),
            &self.store,
            Some(&self.remote),
        )
        .await
        .expect("wallet creation should succeed")
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// Address hash at `index` of a seed's chain, as the wallet will derive it.
pub fn chain_address(seed: [u8; 32], chain: ChainKind, index: u32) -> AddressHash {
    MockDerivation::from_seed(seed)
        .derive(chain, index)
        .expect("mock derivation is infallible")
}

/// A confirmed placement in the block at `height`.
pub fn confirmed_in(height: u64, ordinal: u32) -> RemoteState {
    RemoteState::InBlock {
        block: block_meta(height),
        ordinal,
    }
}

/// A transaction paying `value` to `address`, in the given remote state.
pub fn payment(n: u8, state: RemoteState, address: AddressHash, value: u64) -> RemoteTransaction {
    RemoteTransactionBuilder::new()
        .tx_hash(tx_hash(n))
        .state(state)
        .output(RemoteOutput::from_parts(address, value))
        .time(1_700_000_000)
        .build()
}

/// A transaction spending output `spent_index` of `spent_tx`, paying the
/// listed outputs.
pub fn spend(
    n: u8,
    state: RemoteState,
    spent_tx: TxHash,
    spent_index: u32,
    outputs: Vec<(AddressHash, u64)>,
) -> RemoteTransaction {
    let mut builder = RemoteTransactionBuilder::new()
        .tx_hash(tx_hash(n))
        .state(state)
        .input(RemoteInput::from_parts(OutPoint::from_parts(
            spent_tx,
            spent_index,
        )))
        .time(1_700_000_000);
    for (address, value) in outputs {
        builder = builder.output(RemoteOutput::from_parts(address, value));
    }
    builder.build()
}
