//! Data storage and persistence
//!
//! This module manages data persistence for the ledger: the block and
//! transaction document stores, the UTXO ledger, the chain index, and the
//! in-memory transaction pools. Every persistent store is a thin typed layer
//! over one sled tree; the pools live in memory only.

pub mod block_store;
pub mod chain_index;
pub mod memory_pool;
pub mod transaction_store;
pub mod unspent_store;

pub use block_store::BlockStore;
pub use chain_index::{ChainIndexStore, TipRecord};
pub use memory_pool::MemoryPool;
pub use transaction_store::{StoredTransaction, TransactionStore};
pub use unspent_store::{UnspentEntry, UnspentStore};
