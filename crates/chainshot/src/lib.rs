//! Chainshot: scenario recorder for contract tests.
//!
//! While a scenario records, every call submitted through the shared
//! [`provider::SubmitEntrypoint`] is intercepted and, once confirmed,
//! turned into a [`record::LogEntry`]: the decoded call, token balances of
//! every tracked holder at the confirming block, decoded events and any
//! custom state. Raw addresses are replaced by their configured aliases.
//! The finished log is a snapshot value for assertions and feeds a
//! markdown narrative with a sequence diagram.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod abi;
pub mod config;
pub mod diagram;
pub mod error;
pub mod extractor;
pub mod format;
pub mod harness;
pub mod narrative;
pub mod provider;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod scenario;
pub mod types;

pub use config::{ChainshotConfig, MissingReceiptPolicy, RecorderConfig};
pub use error::{AbiError, RecorderError, RpcError, UsageError};
pub use harness::{ScenarioHarness, TestContext};
pub use record::{Arg, LogEntry, RecordedScenario};
pub use scenario::{Scenario, ScenarioConfig, ScenarioState};

#[cfg(test)]
mod tests;
