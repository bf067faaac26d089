//! The per-wallet handle over the shared mirror.

use getset::Getters;

use crate::client::UsageOracle;
use crate::config::SyncConfig;
use crate::data::{ChainKind, WalletId};
use crate::error::{AddressSpaceError, SyncError};
use crate::ledger::tables::Address;
use crate::ledger::LedgerStore;
use crate::utxos::{self, UtxoView};
use crate::wallet::addresses::{discover, AddressChains, ChainView};
use crate::wallet::keys::WalletCapability;

pub mod addresses;
pub mod confirmation_status;
pub mod describe;
pub mod keys;

/// One HD account's view over the ledger mirror.
///
/// Reconciliation takes the wallet mutably, so there is never more than one
/// pass in flight per wallet. The store behind it may be shared with other
/// wallets.
#[derive(Getters)]
pub struct Wallet {
    #[getset(get = "pub")]
    capability: WalletCapability,
    #[getset(get = "pub")]
    config: SyncConfig,
    id: WalletId,
    chains: AddressChains,
}

impl Wallet {
    pub fn id(&self) -> WalletId {
        self.id
    }

    /// Creates a wallet and pre-materializes at least one gap worth of
    /// addresses per chain. An unreachable oracle downgrades discovery to
    /// oracle-free generation rather than failing creation: over-generating
    /// is recoverable, a missing gap run is not.
    pub async fn create<O: UsageOracle>(
        id: WalletId,
        capability: WalletCapability,
        config: SyncConfig,
        store: &LedgerStore,
        oracle: Option<&O>,
    ) -> Result<Self, SyncError> {
        let chains = capability.chains();
        let mut batch = store.begin();

        for chain in &chains {
            let keys = capability.derivation_for(*chain)?.clone();
            let view = ChainView::from_tables(&store.read(), id, *chain, &Default::default());
            let new_addresses = match discover(&view, keys.as_ref(), config.gap_limit, oracle).await
            {
                Ok(new_addresses) => new_addresses,
                Err(SyncError::Transport(error)) => {
                    tracing::warn!(
                        wallet = %id,
                        chain = %chain,
                        %error,
                        "usage oracle unreachable, generating addresses blind"
                    );
                    discover::<O>(&view, keys.as_ref(), config.gap_limit, None).await?
                }
                Err(error) => return Err(error),
            };
            for address in new_addresses {
                batch.stage_new_address(id, *chain, address.index, address.hash, address.is_used);
            }
        }
        store.commit(batch)?;

        Ok(Wallet {
            id,
            chains: AddressChains::new(&chains),
            capability,
            config,
        })
    }

    /// The wallet's spendable outputs.
    pub fn all_utxos(&self, store: &LedgerStore) -> Vec<UtxoView> {
        utxos::all_utxos(&store.read(), self.id)
    }

    /// The wallet's spendable balance.
    pub fn balance(&self, store: &LedgerStore) -> u64 {
        utxos::balance(&store.read(), self.id)
    }

    /// Balance including incoming pending transactions. Display only.
    pub fn pending_balance(&self, store: &LedgerStore) -> u64 {
        utxos::pending_balance(&store.read(), self.id)
    }

    /// JSON summaries of the wallet's history, oldest first.
    pub fn value_transfers(&self, store: &LedgerStore) -> serde_json::Value {
        describe::value_transfers(&store.read(), self.id)
    }

    pub fn cutoff(&self, chain: ChainKind) -> Result<u32, AddressSpaceError> {
        self.chains.cutoff(chain)
    }

    pub fn set_cutoff(
        &mut self,
        store: &LedgerStore,
        chain: ChainKind,
        index: u32,
    ) -> Result<(), AddressSpaceError> {
        self.chains.set_cutoff(&store.read(), self.id, chain, index)
    }

    /// Hands out the next unused address of a chain and marks it presented.
    pub fn pop_next_unused(
        &mut self,
        store: &LedgerStore,
        chain: ChainKind,
    ) -> Result<Address, AddressSpaceError> {
        self.chains
            .pop_next_unused(&store.read(), self.id, chain, self.config.gap_limit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_framework::mocks::{MockDerivation, MockRemote};

    fn capability() -> WalletCapability {
        WalletCapability::with_staking(
            Arc::new(MockDerivation::from_seed([1; 32])),
            Arc::new(MockDerivation::from_seed([2; 32])),
        )
    }

    #[tokio::test]
    async fn creation_materializes_a_gap_run_per_chain() {
        let store = LedgerStore::new();
        let remote = MockRemote::new();
        let wallet = Wallet::create(
            WalletId::from_u32(1),
            capability(),
            SyncConfig::new(5, 10),
            &store,
            Some(&remote),
        )
        .await
        .unwrap();

        let tables = store.read();
        for chain in [ChainKind::External, ChainKind::Internal, ChainKind::Staking] {
            assert_eq!(
                tables.wallet_chain_addresses(wallet.id(), chain).len(),
                5,
                "{chain} chain should hold one gap batch"
            );
        }
    }

    #[tokio::test]
    async fn creation_survives_an_unreachable_oracle() {
        let store = LedgerStore::new();
        let remote = MockRemote::new();
        remote.set_unreachable(true);
        let wallet = Wallet::create(
            WalletId::from_u32(1),
            capability(),
            SyncConfig::new(5, 10),
            &store,
            Some(&remote),
        )
        .await
        .unwrap();

        let tables = store.read();
        assert_eq!(
            tables
                .wallet_chain_addresses(wallet.id(), ChainKind::External)
                .len(),
            5
        );
    }

    #[tokio::test]
    async fn popping_past_the_frontier_is_an_exhaustion_error() {
        let store = LedgerStore::new();
        let remote = MockRemote::new();
        let mut wallet = Wallet::create(
            WalletId::from_u32(1),
            capability(),
            SyncConfig::new(3, 10),
            &store,
            Some(&remote),
        )
        .await
        .unwrap();

        for _ in 0..3 {
            wallet.pop_next_unused(&store, ChainKind::External).unwrap();
        }
        assert!(matches!(
            wallet.pop_next_unused(&store, ChainKind::External),
            Err(AddressSpaceError::Exhausted(ChainKind::External))
        ));
    }
}
