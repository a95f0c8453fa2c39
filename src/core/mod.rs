//! Core ledger functionality
//!
//! This module contains the fundamental ledger components: the entity layer
//! (transactions, questions, blocks), the script machine that gates spending,
//! protocol constants, and the ledger facade that ties the pools, the chain
//! index, and the UTXO ledger together.

pub mod block;
pub mod blockchain;
pub mod protocol;
pub mod script;
pub mod transaction;

pub use block::{Block, SolvedTransaction};
pub use blockchain::{BlockAdmission, BlockChain};
pub use protocol::{MAX_CLOCK_DRIFT_MILLIS, REWARD_VALUE, TRANSACTIONS_PER_BLOCK, VERSION};
pub use transaction::{Input, Output, OutputRef, Question, RewardTransaction, Transaction};
