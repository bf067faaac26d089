//! Gap-limited address discovery and the per-chain presentation cutoff.
//!
//! Discovery generates addresses in gap-sized batches, asks the usage oracle
//! which of them the remote has seen, and keeps going until a whole batch
//! comes back unused. The guarantee: every chain always holds at least
//! `gap_limit` contiguous unused addresses beyond its highest used index, so
//! a restored wallet can never scan past its own funds.

use std::collections::HashSet;

use crate::client::UsageOracle;
use crate::data::{AddressHash, ChainKind, WalletId};
use crate::error::{AddressSpaceError, SyncError};
use crate::ledger::tables::{Address, Tables};
use crate::wallet::keys::KeyDerivation;

/// Snapshot of one chain's discovered addresses, taken from the store before
/// discovery runs. Indices are contiguous from zero.
#[derive(Debug, Clone)]
pub struct ChainView {
    chain: ChainKind,
    entries: Vec<(u32, AddressHash, bool)>,
}

impl ChainView {
    /// Builds the view for `(wallet, chain)`, folding in addresses the
    /// current pass has already observed as used but not yet committed.
    pub fn from_tables(
        tables: &Tables,
        wallet: WalletId,
        chain: ChainKind,
        newly_used: &HashSet<AddressHash>,
    ) -> Self {
        let entries = tables
            .wallet_chain_addresses(wallet, chain)
            .into_iter()
            .map(|address| {
                (
                    address.derivation_index,
                    address.hash,
                    address.is_used || newly_used.contains(&address.hash),
                )
            })
            .collect();
        ChainView { chain, entries }
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    fn next_index(&self) -> u32 {
        self.entries
            .last()
            .map(|(index, _, _)| index + 1)
            .unwrap_or(0)
    }

    fn highest_used_index(&self) -> Option<u32> {
        self.entries
            .iter()
            .filter(|(_, _, is_used)| *is_used)
            .map(|(index, _, _)| *index)
            .last()
    }
}

/// An address produced by discovery, not yet in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAddress {
    pub index: u32,
    pub hash: AddressHash,
    pub is_used: bool,
}

/// Extends a chain until it carries at least `gap_limit` contiguous unused
/// addresses beyond its highest used index.
///
/// With no oracle (or when the caller decided to tolerate an unreachable
/// one) every generated address counts as unused: one batch satisfies the
/// gap rule and discovery stops. Over-generating is the safe direction; the
/// gap rule is about never losing track of funds.
pub async fn discover<O: UsageOracle + ?Sized>(
    view: &ChainView,
    keys: &dyn KeyDerivation,
    gap_limit: u32,
    oracle: Option<&O>,
) -> Result<Vec<NewAddress>, SyncError> {
    let mut new_addresses: Vec<NewAddress> = Vec::new();
    let mut next_index = view.next_index();
    let mut highest_used = view.highest_used_index();

    loop {
        let generated = next_index;
        let trailing_unused = generated - highest_used.map(|used| used + 1).unwrap_or(0);
        if trailing_unused >= gap_limit {
            break;
        }

        let mut batch: Vec<(u32, AddressHash)> = Vec::with_capacity(gap_limit as usize);
        for offset in 0..gap_limit {
            let index = next_index + offset;
            batch.push((index, keys.derive(view.chain, index)?));
        }
        next_index += gap_limit;

        let used_in_batch: HashSet<AddressHash> = match oracle {
            Some(oracle) => {
                let hashes = batch.iter().map(|(_, hash)| *hash).collect();
                oracle.check_used(hashes).await?.into_iter().collect()
            }
            None => HashSet::new(),
        };

        for (index, hash) in batch {
            let is_used = used_in_batch.contains(&hash);
            if is_used {
                highest_used = Some(index);
            }
            new_addresses.push(NewAddress {
                index,
                hash,
                is_used,
            });
        }
    }

    if !new_addresses.is_empty() {
        tracing::debug!(
            chain = %view.chain,
            count = new_addresses.len(),
            "extended address chain"
        );
    }
    Ok(new_addresses)
}

/// Presentation state of a wallet's chains: how far each chain has been
/// handed out to the user. Popping an address advances the cutoff only; it
/// never mutates discovery state.
#[derive(Debug, Clone)]
pub struct AddressChains {
    cutoffs: Vec<(ChainKind, u32)>,
}

impl AddressChains {
    pub fn new(chains: &[ChainKind]) -> Self {
        AddressChains {
            cutoffs: chains.iter().map(|chain| (*chain, 0)).collect(),
        }
    }

    pub fn cutoff(&self, chain: ChainKind) -> Result<u32, AddressSpaceError> {
        self.cutoffs
            .iter()
            .find(|(entry_chain, _)| *entry_chain == chain)
            .map(|(_, cutoff)| *cutoff)
            .ok_or(AddressSpaceError::NoSuchChain(chain))
    }

    fn cutoff_mut(&mut self, chain: ChainKind) -> Result<&mut u32, AddressSpaceError> {
        self.cutoffs
            .iter_mut()
            .find(|(entry_chain, _)| *entry_chain == chain)
            .map(|(_, cutoff)| cutoff)
            .ok_or(AddressSpaceError::NoSuchChain(chain))
    }

    /// Marks addresses below `index` as presented to the user.
    pub fn set_cutoff(
        &mut self,
        tables: &Tables,
        wallet: WalletId,
        chain: ChainKind,
        index: u32,
    ) -> Result<(), AddressSpaceError> {
        let generated = tables.wallet_chain_addresses(wallet, chain).len() as u32;
        if index > generated {
            return Err(AddressSpaceError::CutoffOutOfRange {
                requested: index,
                generated,
            });
        }
        *self.cutoff_mut(chain)? = index;
        Ok(())
    }

    /// Hands out the next unused address at or beyond the cutoff, staying
    /// below the gap frontier, and advances the cutoff past it.
    pub fn pop_next_unused(
        &mut self,
        tables: &Tables,
        wallet: WalletId,
        chain: ChainKind,
        gap_limit: u32,
    ) -> Result<Address, AddressSpaceError> {
        let cutoff = self.cutoff(chain)?;
        let chain_addresses = tables.wallet_chain_addresses(wallet, chain);
        let frontier = chain_addresses
            .iter()
            .filter(|address| address.is_used)
            .map(|address| address.derivation_index + 1)
            .last()
            .unwrap_or(0)
            + gap_limit;

        let popped = chain_addresses
            .into_iter()
            .find(|address| {
                !address.is_used && address.derivation_index >= cutoff && address.derivation_index < frontier
            })
            .cloned()
            .ok_or(AddressSpaceError::Exhausted(chain))?;

        *self.cutoff_mut(chain)? = popped.derivation_index + 1;
        Ok(popped)
    }
}
