//! End-to-end test support for the Nodimus memory service
//!
//! - `harness`: isolated repositories in temp directories
//! - `mocks`: test data generation

pub mod harness;

pub use harness::TestDatabaseManager;
pub use mocks::{TestDataFactory, TestScenario};
