pub mod cleanup;
pub mod config;
pub mod error;
pub mod fault_injector;
pub mod generator;
pub mod network;
pub mod reconciler;
pub mod runtime;
pub mod templates;
pub mod topology;
pub mod types;

// Test helpers are exposed for integration tests
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{FleetError, FleetResult};
