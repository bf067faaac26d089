//! Test infrastructure shared by unit tests and the scenario test crate.

pub mod mocks;
