//! Key capabilities and the derivation seam.
//!
//! Key material and derivation math live outside this crate; a wallet only
//! holds a [`KeyDerivation`] handle per capability, resolved once at load
//! time into a typed [`WalletCapability`].

use std::sync::Arc;

use crate::data::{AddressHash, ChainKind};
use crate::error::AddressSpaceError;

/// Pure HD derivation for one account: chain and index in, address hash out.
/// No network or storage side effects.
pub trait KeyDerivation: Send + Sync {
    fn derive(&self, chain: ChainKind, index: u32) -> Result<AddressHash, AddressSpaceError>;
}

/// What a wallet can do with one branch of its key tree.
#[derive(Clone)]
#[non_exhaustive]
pub enum Capability<K> {
    None,
    View(K),
}

impl<K> Capability<K> {
    pub fn can_view(&self) -> bool {
        matches!(self, Capability::View(_))
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Capability::None => "No key",
            Capability::View(_) => "View only",
        }
    }

    pub fn as_view(&self) -> Option<&K> {
        match self {
            Capability::None => None,
            Capability::View(key) => Some(key),
        }
    }
}

/// The capability set of one wallet, resolved at load time. Payment covers
/// the external and internal chains; staking is optional.
#[derive(Clone)]
pub struct WalletCapability {
    pub payment: Capability<Arc<dyn KeyDerivation>>,
    pub staking: Capability<Arc<dyn KeyDerivation>>,
}

impl WalletCapability {
    pub fn payment_only(payment: Arc<dyn KeyDerivation>) -> Self {
        WalletCapability {
            payment: Capability::View(payment),
            staking: Capability::None,
        }
    }

    pub fn with_staking(payment: Arc<dyn KeyDerivation>, staking: Arc<dyn KeyDerivation>) -> Self {
        WalletCapability {
            payment: Capability::View(payment),
            staking: Capability::View(staking),
        }
    }

    pub fn has_staking_chain(&self) -> bool {
        self.staking.can_view()
    }

    /// The chains this wallet monitors, in derivation order.
    pub fn chains(&self) -> Vec<ChainKind> {
        let mut chains = vec![ChainKind::External, ChainKind::Internal];
        if self.has_staking_chain() {
            chains.push(ChainKind::Staking);
        }
        chains
    }

    /// Resolves the derivation handle for a chain.
    pub fn derivation_for(
        &self,
        chain: ChainKind,
    ) -> Result<&Arc<dyn KeyDerivation>, AddressSpaceError> {
        let capability = match chain {
            ChainKind::External | ChainKind::Internal => &self.payment,
            ChainKind::Staking => &self.staking,
        };
        capability
            .as_view()
            .ok_or(AddressSpaceError::NoSuchChain(chain))
    }
}

impl std::fmt::Debug for WalletCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCapability")
            .field("payment", &self.payment.kind_str())
            .field("staking", &self.staking.kind_str())
            .finish()
    }
}
