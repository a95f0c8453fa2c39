// The ledger facade. One BlockChain handle owns the pools, the document
// stores, the UTXO ledger, and the chain index; request handlers clone the
// handle and share state through the inner Arcs and sled trees. Chain
// admission and reorganization run under a single write guard so no reader
// ever observes the chain index advanced without its UTXO records.

use crate::config::{Settings, GLOBAL_CONFIG};
use crate::core::block::Block;
use crate::core::transaction::{RewardTransaction, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{BlockStore, ChainIndexStore, MemoryPool, TransactionStore, UnspentStore};
use log::{error, info};
use sled::Db;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Outcome of handing a block to chain admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAdmission {
    /// Appended on top of the current tip
    Extended,
    /// Won a fork comparison; the losing suffix was rolled back
    Reorganized,
    /// Already present in the chain index; nothing changed
    AlreadyCommitted,
    /// previous_block is not a known chain block; the block stays
    /// pool-resident until its parent shows up
    Orphaned,
    /// Lost the fork comparison against the existing occupant; the block
    /// stays pool-resident only
    RejectedFork,
}

#[derive(Clone)]
pub struct BlockChain {
    db: Db,
    db_path: PathBuf,
    blocks: BlockStore,
    transactions: TransactionStore,
    unspent: UnspentStore,
    chain: ChainIndexStore,
    pool: Arc<MemoryPool>,
    // Guards the chain index + UTXO ledger pair as one unit
    chain_guard: Arc<RwLock<()>>,
    settings: Settings,
}

impl BlockChain {
    pub fn open(db_path: &str, settings: Settings) -> Result<BlockChain> {
        let path = PathBuf::from(db_path);
        let db = sled::open(&path)
            .map_err(|e| LedgerError::Database(format!("Failed to open database: {e}")))?;

        Ok(BlockChain {
            blocks: BlockStore::new(&db)?,
            transactions: TransactionStore::new(&db)?,
            unspent: UnspentStore::new(&db)?,
            chain: ChainIndexStore::new(&db)?,
            pool: Arc::new(MemoryPool::new()),
            chain_guard: Arc::new(RwLock::new(())),
            settings,
            db,
            db_path: path,
        })
    }

    /// Open the ledger at the process-configured data directory
    pub fn open_default() -> Result<BlockChain> {
        Self::open(&GLOBAL_CONFIG.get_data_dir(), Settings::default())
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn get_settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get_memory_pool(&self) -> &MemoryPool {
        &self.pool
    }

    /// Verify an inbound transaction document and admit it to the unsolved
    /// pool. Re-delivery of a known transaction is success, not an error.
    pub fn submit_transaction(&self, document: &serde_json::Value) -> Result<()> {
        let transaction = Transaction::from_document(document)?;
        let transaction_id = transaction.get_transaction_id().to_string();

        if self.pool.contains_unsolved(&transaction_id)
            || self.pool.contains_solved(&transaction_id)
        {
            return Ok(());
        }
        if let Some(stored) = self.transactions.get(&transaction_id)? {
            // Known already. A free transaction goes back into the unsolved
            // pool so it can still be solved after a restart or rollback.
            if !stored.is_chain_committed() {
                self.pool.add_unsolved(stored.get_transaction().clone());
            }
            return Ok(());
        }

        // Verification reads UTXO state, so hold the read guard against a
        // concurrent chain mutation
        let _guard = self
            .chain_guard
            .read()
            .expect("Failed to acquire read lock on chain guard - this should never happen");
        if !transaction.verify(&self.transactions, &self.unspent) {
            return Err(LedgerError::Verification(format!(
                "Transaction {transaction_id} failed verification"
            )));
        }

        self.transactions.put_free(&transaction)?;
        self.pool.add_unsolved(transaction);
        info!("Admitted transaction {transaction_id} to the unsolved pool");
        Ok(())
    }

    /// Try an answer against a pooled transaction's question. `Ok(true)`
    /// moves the transaction to the solved pool; a wrong answer or an
    /// already-solved transaction is `Ok(false)` with no state change.
    pub fn solve_transaction(&self, transaction_id: &str, answer: &str) -> Result<bool> {
        if !self.pool.contains_unsolved(transaction_id) {
            if self.pool.contains_solved(transaction_id) {
                return Ok(false);
            }
            return Err(LedgerError::UnknownReference(format!(
                "No unsolved transaction {transaction_id}"
            )));
        }

        let solved = self.pool.promote_solved(transaction_id, answer);
        if solved {
            info!("Transaction {transaction_id} solved, awaiting block inclusion");
        }
        Ok(solved)
    }

    /// Verify an inbound block document, keep it pool-resident, and attempt
    /// chain admission with fork resolution.
    pub fn submit_block(&self, document: &serde_json::Value) -> Result<BlockAdmission> {
        let block = Block::from_document(document)?;
        let block_id = block.get_block_id().to_string();

        let _guard = self
            .chain_guard
            .write()
            .expect("Failed to acquire write lock on chain guard - this should never happen");

        if self.chain.exists(&block_id)? {
            return Ok(BlockAdmission::AlreadyCommitted);
        }

        if !block.verify(&self.transactions, &self.unspent, self.settings.reward_value) {
            return Err(LedgerError::Verification(format!(
                "Block {block_id} failed verification"
            )));
        }

        self.blocks.put(&block)?;
        self.admit_to_chain(&block)
    }

    /// Assemble the oldest solved transactions and a verified reward into a
    /// candidate block on the current tip and run it through chain admission.
    /// `Ok(None)` means the solved pool has not reached the batch size yet.
    pub fn mine_block(
        &self,
        reward_document: &serde_json::Value,
        miner_public_key: &str,
    ) -> Result<Option<Block>> {
        let reward = RewardTransaction::from_document(reward_document)?;
        if !reward.verify(self.settings.reward_value) {
            return Err(LedgerError::Verification(format!(
                "Reward transaction {} failed verification",
                reward.get_transaction_id()
            )));
        }

        let _guard = self
            .chain_guard
            .write()
            .expect("Failed to acquire write lock on chain guard - this should never happen");

        let tip = self.chain.get_tip()?;
        // An empty chain is bootstrapped by a reward-only block: nothing is
        // spendable yet, so the batch requirement cannot apply
        if tip.is_some() && self.pool.solved_len() < self.settings.transactions_per_block {
            return Ok(None);
        }
        let batch = self.pool.oldest_solved(self.settings.transactions_per_block);
        let previous_block = tip.map(|tip| tip.get_last_block_id().to_string());

        let block = Block::assemble(
            self.settings.version,
            previous_block,
            miner_public_key,
            batch,
            reward,
        )?;
        if !block.verify(&self.transactions, &self.unspent, self.settings.reward_value) {
            return Err(LedgerError::Verification(format!(
                "Assembled block {} failed verification",
                block.get_block_id()
            )));
        }

        self.blocks.put(&block)?;
        match self.admit_to_chain(&block)? {
            BlockAdmission::Extended | BlockAdmission::Reorganized => {
                info!("Mined block {}", block.get_block_id());
                Ok(Some(block))
            }
            outcome => {
                // Solved-pool entries stay put for the next attempt
                error!(
                    "Assembled block {} was not admitted: {outcome:?}",
                    block.get_block_id()
                );
                Ok(None)
            }
        }
    }

    // Chain admission with fork resolution. Caller holds the write guard.
    fn admit_to_chain(&self, block: &Block) -> Result<BlockAdmission> {
        let tip = self.chain.get_tip()?;

        let previous_block = match block.get_previous_block() {
            // A block without a parent is only admissible as the genesis of
            // an empty chain
            None => {
                return match tip {
                    None => {
                        self.commit_block(block)?;
                        Ok(BlockAdmission::Extended)
                    }
                    Some(_) => {
                        info!(
                            "Block {} has no previous block but the chain is not empty",
                            block.get_block_id()
                        );
                        Ok(BlockAdmission::Orphaned)
                    }
                };
            }
            Some(previous_block) => previous_block,
        };

        match &tip {
            Some(tip) if tip.get_last_block_id() == previous_block => {
                // Common path: linear extension of the current tip
                self.commit_block(block)?;
                Ok(BlockAdmission::Extended)
            }
            Some(_) => match self.chain.get_block_number(previous_block)? {
                Some(fork_number) => self.resolve_fork(block, fork_number),
                None => {
                    info!(
                        "Block {} references unknown previous block {previous_block}",
                        block.get_block_id()
                    );
                    Ok(BlockAdmission::Orphaned)
                }
            },
            None => Ok(BlockAdmission::Orphaned),
        }
    }

    // A competing block references a committed ancestor. Compare it against
    // the existing occupant of the slot after the fork point: the earlier
    // timestamped branch wins, so the suffix is rolled back only when the
    // occupant is strictly newer than the incoming block.
    fn resolve_fork(&self, block: &Block, fork_number: u64) -> Result<BlockAdmission> {
        let occupant_id = self.chain.get_block_id(fork_number + 1)?.ok_or_else(|| {
            LedgerError::InconsistentState(format!(
                "Chain index has no occupant after fork point {fork_number}"
            ))
        })?;
        let occupant = self.blocks.get(&occupant_id)?.ok_or_else(|| {
            LedgerError::InconsistentState(format!(
                "Chain-committed block {occupant_id} is missing from the block store"
            ))
        })?;

        if occupant.get_timestamp() > block.get_timestamp() {
            self.roll_back_to(fork_number)?;
            self.commit_block(block)?;
            info!(
                "Reorganized: block {} replaced the suffix after number {fork_number}",
                block.get_block_id()
            );
            Ok(BlockAdmission::Reorganized)
        } else {
            info!(
                "Block {} lost the fork comparison against {occupant_id}",
                block.get_block_id()
            );
            Ok(BlockAdmission::RejectedFork)
        }
    }

    // Excise every block above the fork point and restore UTXO state. The
    // excised transactions drop back to pool-resident so they stay queryable
    // and can re-enter a future block.
    fn roll_back_to(&self, fork_number: u64) -> Result<()> {
        let removed = self.chain.remove_until(fork_number)?;
        for removed_id in &removed {
            self.unspent.free_block_transactions(removed_id)?;
            if let Some(removed_block) = self.blocks.get(removed_id)? {
                for solved in removed_block.get_solved_transactions() {
                    self.transactions.put_free(solved.get_transaction())?;
                }
                self.transactions
                    .put_free(removed_block.get_reward_transaction().as_transaction())?;
            }
            info!("Rolled back block {removed_id}");
        }
        Ok(())
    }

    // Append the block to the chain index and commit its transactions to the
    // UTXO ledger. Caller holds the write guard, so the pair is atomic for
    // every reader going through this facade.
    fn commit_block(&self, block: &Block) -> Result<()> {
        let block_id = block.get_block_id();
        let block_number = self.chain.append(block_id)?;

        for solved in block.get_solved_transactions() {
            let transaction = solved.get_transaction();
            let transaction_id = transaction.get_transaction_id();
            for input in transaction.get_inputs() {
                self.unspent.mark_spent(input, block_id, transaction_id)?;
            }
            self.transactions.put_chain(transaction, block_id)?;
            self.unspent
                .record_outputs(transaction_id, transaction.get_outputs(), block_id)?;
            self.pool.remove_unsolved(transaction_id);
            self.pool.remove_solved(transaction_id);
        }

        let reward = block.get_reward_transaction();
        self.transactions.put_chain_reward(reward, block_id)?;
        self.unspent
            .record_outputs(reward.get_transaction_id(), reward.get_outputs(), block_id)?;

        info!("Committed block {block_id} at number {block_number}");
        Ok(())
    }

    /// Fetch a transaction document by id: the store first (which covers
    /// everything ever admitted, with its `block_id` field), then the pools.
    pub fn get_transaction(&self, transaction_id: &str) -> Result<Option<serde_json::Value>> {
        if let Some(stored) = self.transactions.get(transaction_id)? {
            return Ok(Some(stored.to_document()?));
        }
        if let Some(transaction) = self.pool.get_unsolved(transaction_id) {
            return Ok(Some(transaction.to_document()?));
        }
        if let Some(solved) = self.pool.get_solved(transaction_id) {
            return Ok(Some(solved.get_transaction().to_document()?));
        }
        Ok(None)
    }

    /// Fetch a block document by id, chain-committed or pool-resident
    pub fn get_block(&self, block_id: &str) -> Result<Option<serde_json::Value>> {
        match self.blocks.get(block_id)? {
            Some(block) => Ok(Some(block.to_document()?)),
            None => Ok(None),
        }
    }

    /// The current tip as (block number, block id); None while the chain is
    /// empty
    pub fn get_tip(&self) -> Result<Option<(u64, String)>> {
        let _guard = self
            .chain_guard
            .read()
            .expect("Failed to acquire read lock on chain guard - this should never happen");
        Ok(self.chain.get_tip()?.map(|tip| {
            (
                tip.get_last_block_number(),
                tip.get_last_block_id().to_string(),
            )
        }))
    }

    pub fn is_unspent(&self, transaction_id: &str, output_index: u32) -> Result<bool> {
        let _guard = self
            .chain_guard
            .read()
            .expect("Failed to acquire read lock on chain guard - this should never happen");
        self.unspent.is_unspent(transaction_id, output_index)
    }

    /// Sum of all unspent outputs owned by `public_key`
    pub fn get_balance(&self, public_key: &str) -> Result<u64> {
        let _guard = self
            .chain_guard
            .read()
            .expect("Failed to acquire read lock on chain guard - this should never happen");

        let mut balance: u64 = 0;
        for entry in self.unspent.unspent_entries()? {
            let stored = self
                .transactions
                .get(entry.get_transaction_id())?
                .ok_or_else(|| {
                    LedgerError::InconsistentState(format!(
                        "Unspent entry references unknown transaction {}",
                        entry.get_transaction_id()
                    ))
                })?;
            let output = stored
                .get_transaction()
                .get_outputs()
                .get(entry.get_output_index() as usize)
                .ok_or_else(|| {
                    LedgerError::InconsistentState(format!(
                        "Unspent entry references missing output {}:{}",
                        entry.get_transaction_id(),
                        entry.get_output_index()
                    ))
                })?;
            if output.get_public_key() == public_key {
                balance = balance.saturating_add(output.get_value());
            }
        }
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{Output, OutputRef, Question};
    use crate::testnet::test_utils::{create_test_key, create_test_ledger};

    #[test]
    fn test_empty_chain_has_no_tip() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        assert!(ledger.get_tip().unwrap().is_none());
    }

    #[test]
    fn test_reward_only_genesis_extends_empty_chain() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        let miner = create_test_key().unwrap();

        let reward = RewardTransaction::build_signed(
            &miner.pkcs8,
            vec![Output::new(0, 10, &miner.public_key).unwrap()],
            "genesis reward",
        )
        .unwrap();
        let block = ledger
            .mine_block(&reward.to_document().unwrap(), &miner.public_key)
            .unwrap()
            .expect("genesis block should be mined");

        let (number, block_id) = ledger.get_tip().unwrap().unwrap();
        assert_eq!(number, 0);
        assert_eq!(block_id, block.get_block_id());
        assert!(ledger.is_unspent(reward.get_transaction_id(), 0).unwrap());
        assert_eq!(ledger.get_balance(&miner.public_key).unwrap(), 10);
    }

    #[test]
    fn test_transaction_with_unknown_input_is_rejected() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        let key = create_test_key().unwrap();

        let transaction = Transaction::build_signed(
            &key.pkcs8,
            &[OutputRef {
                transaction_id: "no-such-transaction".to_string(),
                index: 0,
                value: 10,
            }],
            vec![Output::new(0, 9, &key.public_key).unwrap()],
            "spend of nothing",
            Question::new("2+2?", "4"),
        )
        .unwrap();

        assert!(matches!(
            ledger.submit_transaction(&transaction.to_document().unwrap()),
            Err(LedgerError::Verification(_))
        ));
        assert_eq!(ledger.get_memory_pool().unsolved_len(), 0);
    }

    #[test]
    fn test_oversized_reward_is_rejected_at_mining() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        let miner = create_test_key().unwrap();
        let cap = ledger.get_settings().reward_value;

        let reward = RewardTransaction::build_signed(
            &miner.pkcs8,
            vec![Output::new(0, cap + 1, &miner.public_key).unwrap()],
            "too generous",
        )
        .unwrap();

        assert!(matches!(
            ledger.mine_block(&reward.to_document().unwrap(), &miner.public_key),
            Err(LedgerError::Verification(_))
        ));
        assert!(ledger.get_tip().unwrap().is_none());
    }
}
