//! Configuration management
//!
//! Process-level configuration (data directory) comes from environment
//! variables; ledger-level tunables (reward cap, block batch size) are a
//! plain value handed to the ledger constructor.

pub mod settings;

pub use settings::{Config, Settings, GLOBAL_CONFIG};
