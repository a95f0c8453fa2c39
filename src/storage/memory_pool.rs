use crate::core::block::SolvedTransaction;
use crate::core::transaction::Transaction;
use std::collections::HashMap;
use std::sync::RwLock;

/// The two mempool stages of a transaction's life before block inclusion.
///
/// Unsolved transactions wait for a human to answer their question and are
/// keyed by id. Solved transactions wait for block inclusion and keep their
/// insertion order, so "oldest N" is well-defined at mining time.
pub struct MemoryPool {
    unsolved: RwLock<HashMap<String, Transaction>>,
    solved: RwLock<Vec<SolvedTransaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            unsolved: RwLock::new(HashMap::new()),
            solved: RwLock::new(Vec::new()),
        }
    }

    pub fn add_unsolved(&self, transaction: Transaction) {
        match self.unsolved.write() {
            Ok(mut pool) => {
                pool.entry(transaction.get_transaction_id().to_string())
                    .or_insert(transaction);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on unsolved pool");
            }
        }
    }

    pub fn contains_unsolved(&self, transaction_id: &str) -> bool {
        match self.unsolved.read() {
            Ok(pool) => pool.contains_key(transaction_id),
            Err(_) => {
                log::error!("Failed to acquire read lock on unsolved pool");
                false
            }
        }
    }

    pub fn get_unsolved(&self, transaction_id: &str) -> Option<Transaction> {
        match self.unsolved.read() {
            Ok(pool) => pool.get(transaction_id).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on unsolved pool");
                None
            }
        }
    }

    pub fn remove_unsolved(&self, transaction_id: &str) {
        match self.unsolved.write() {
            Ok(mut pool) => {
                pool.remove(transaction_id);
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on unsolved pool");
            }
        }
    }

    pub fn unsolved_len(&self) -> usize {
        match self.unsolved.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on unsolved pool");
                0
            }
        }
    }

    /// Check `answer` against the transaction's question and, on a match,
    /// move the transaction from the unsolved to the solved pool. The removal
    /// happens under the unsolved write lock, so concurrent solvers of the
    /// same transaction succeed at most once.
    pub fn promote_solved(&self, transaction_id: &str, answer: &str) -> bool {
        let mut unsolved = match self.unsolved.write() {
            Ok(pool) => pool,
            Err(_) => {
                log::error!("Failed to acquire write lock on unsolved pool");
                return false;
            }
        };

        let matches = match unsolved.get(transaction_id) {
            Some(transaction) => transaction
                .get_question()
                .map(|question| question.matches_answer(answer))
                .unwrap_or(false),
            None => false,
        };
        if !matches {
            return false;
        }

        if let Some(transaction) = unsolved.remove(transaction_id) {
            match self.solved.write() {
                Ok(mut solved) => {
                    solved.push(SolvedTransaction::new(transaction, answer));
                    true
                }
                Err(_) => {
                    log::error!("Failed to acquire write lock on solved pool");
                    false
                }
            }
        } else {
            false
        }
    }

    pub fn contains_solved(&self, transaction_id: &str) -> bool {
        self.get_solved(transaction_id).is_some()
    }

    pub fn get_solved(&self, transaction_id: &str) -> Option<SolvedTransaction> {
        match self.solved.read() {
            Ok(pool) => pool
                .iter()
                .find(|solved| solved.get_transaction().get_transaction_id() == transaction_id)
                .cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on solved pool");
                None
            }
        }
    }

    pub fn solved_len(&self) -> usize {
        match self.solved.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on solved pool");
                0
            }
        }
    }

    /// The oldest `count` solved transactions in insertion order, fewer if
    /// the pool holds fewer. The entries stay pooled; the caller removes them
    /// only once block admission succeeds.
    pub fn oldest_solved(&self, count: usize) -> Vec<SolvedTransaction> {
        match self.solved.read() {
            Ok(pool) => pool.iter().take(count).cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on solved pool");
                Vec::new()
            }
        }
    }

    pub fn remove_solved(&self, transaction_id: &str) {
        match self.solved.write() {
            Ok(mut pool) => {
                pool.retain(|solved| {
                    solved.get_transaction().get_transaction_id() != transaction_id
                });
            }
            Err(_) => {
                log::error!("Failed to acquire write lock on solved pool");
            }
        }
    }
}
