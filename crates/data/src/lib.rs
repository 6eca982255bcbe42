//! External collaborators reached over HTTP.
//!
//! This crate provides:
//! - `RestStore`: credentials, strategies and the strategy log
//! - `ExecutionClient`: the trade-execution endpoint
//! - `EventForwarder`: posts feed events to a remote account
//! - `StoreError`: typed errors with retry classification

pub mod error;
pub mod execution;
pub mod forwarder;
pub mod rows;
pub mod store;

pub use error::StoreError;
pub use execution::ExecutionClient;
pub use forwarder::EventForwarder;
pub use rows::{CredentialRow, StrategyRow};
pub use store::RestStore;
