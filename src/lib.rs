//! # Solvechain - a proof-of-solve ledger consistency engine
//!
//! A peer-replicated ledger that records signature-authorized value
//! transfers, where new blocks are admitted not by computational
//! proof-of-work but by humans answering the trivia questions embedded in
//! each transaction. This crate is the consistency core: the entity layer
//! with its verification pipelines, the UTXO ledger that prevents double
//! spending, the chain index with timestamp-based fork resolution, and the
//! two-stage mempool that tracks which questions are still open.
//!
//! ## Layout
//! - `core/`: entities, script machine, protocol constants, ledger facade
//! - `storage/`: sled-backed document stores, UTXO ledger, chain index, pools
//! - `config/`: process configuration and ledger tunables
//! - `error/`: the ledger error taxonomy
//! - `utils/`: hashing, encodings, ECDSA signing, serialization helpers
//! - `cli/`: command definitions for the local binary
//!
//! The HTTP transport and peer-gossip layer is deliberately not here; it
//! drives the facade operations on `core::BlockChain` from outside.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, Settings, GLOBAL_CONFIG};
pub use core::{
    Block, BlockAdmission, BlockChain, Input, Output, OutputRef, Question, RewardTransaction,
    SolvedTransaction, Transaction,
};
pub use error::{LedgerError, Result};
pub use storage::{
    BlockStore, ChainIndexStore, MemoryPool, StoredTransaction, TipRecord, TransactionStore,
    UnspentEntry, UnspentStore,
};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, hash_base58, new_key_pair, public_key_from_pkcs8,
    sha256_digest,
};
