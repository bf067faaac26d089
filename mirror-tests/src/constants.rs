//! Fixed fixtures shared by the scenario tests.

pub const WALLET_ONE_PAYMENT_SEED: [u8; 32] = [1; 32];
pub const WALLET_ONE_STAKING_SEED: [u8; 32] = [101; 32];
pub const WALLET_TWO_PAYMENT_SEED: [u8; 32] = [2; 32];
pub const WALLET_TWO_STAKING_SEED: [u8; 32] = [102; 32];

/// Small gap limit so discovery behaviour is visible in fixtures.
pub const GAP_LIMIT: u32 = 5;

/// Small page size so pagination actually happens in fixtures.
pub const PAGE_SIZE: usize = 4;
