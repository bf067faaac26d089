//! Tunables for reconciliation and address discovery.

/// Minimum run of contiguous unused addresses kept beyond the highest used
/// index of every chain (BIP44-style gap rule).
pub const GAP_RULE_UNUSED_ADDRESSES: u32 = 20;

/// Transactions requested per history page.
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 50;

/// Configuration shared by the reconciler and the address space manager.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Gap limit enforced per derivation chain.
    pub gap_limit: u32,
    /// Page size for remote history pagination.
    pub history_page_size: usize,
}

impl SyncConfig {
    pub fn new(gap_limit: u32, history_page_size: usize) -> Self {
        SyncConfig {
            gap_limit,
            history_page_size,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            gap_limit: GAP_RULE_UNUSED_ADDRESSES,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}
