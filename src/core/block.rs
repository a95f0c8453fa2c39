use crate::core::transaction::{RewardTransaction, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{TransactionStore, UnspentStore};
use crate::utils::{current_timestamp, hash_base58};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// A transaction paired with the answer that unlocked it. The pairing is what
// proof-of-solve replaces proof-of-work with: no block carries a transaction
// whose question was never answered.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SolvedTransaction {
    transaction: Transaction,
    solution: String,
}

impl SolvedTransaction {
    pub fn new(transaction: Transaction, solution: &str) -> SolvedTransaction {
        SolvedTransaction {
            transaction,
            solution: solution.to_string(),
        }
    }

    pub fn get_transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn get_solution(&self) -> &str {
        self.solution.as_str()
    }

    /// The recorded solution must still hash to the question's answer hash,
    /// and the wrapped transaction must pass its own full pipeline
    pub fn verify(&self, transactions: &TransactionStore, unspent: &UnspentStore) -> bool {
        match self.transaction.get_question() {
            Some(question) if question.matches_answer(&self.solution) => {}
            _ => {
                error!(
                    "Recorded solution does not match the question for transaction {}",
                    self.transaction.get_transaction_id()
                );
                return false;
            }
        }
        self.transaction.verify(transactions, unspent)
    }
}

// A block of solved transactions plus the miner's reward. Blocks are hash
// chained through previous_block; only the genesis block carries null there.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    block_id: String, // base58(sha256(canonical document without this field))
    version: u32,
    previous_block: Option<String>,
    timestamp: i64,
    miner_public_key: String,
    solved_transactions: Vec<SolvedTransaction>,
    reward_transaction: RewardTransaction,
}

// Canonical view: the block document with block_id dropped
#[derive(Serialize)]
struct BlockDigest<'a> {
    version: u32,
    previous_block: Option<&'a str>,
    timestamp: i64,
    miner_public_key: &'a str,
    solved_transactions: &'a [SolvedTransaction],
    reward_transaction: &'a RewardTransaction,
}

impl Block {
    pub fn assemble(
        version: u32,
        previous_block: Option<String>,
        miner_public_key: &str,
        solved_transactions: Vec<SolvedTransaction>,
        reward_transaction: RewardTransaction,
    ) -> Result<Block> {
        Self::assemble_at(
            current_timestamp()?,
            version,
            previous_block,
            miner_public_key,
            solved_transactions,
            reward_transaction,
        )
    }

    /// Assemble with an explicit timestamp. The timestamp takes part in fork
    /// resolution, so tests exercising competing branches need to pin it.
    pub fn assemble_at(
        timestamp: i64,
        version: u32,
        previous_block: Option<String>,
        miner_public_key: &str,
        solved_transactions: Vec<SolvedTransaction>,
        reward_transaction: RewardTransaction,
    ) -> Result<Block> {
        let mut block = Block {
            block_id: String::new(),
            version,
            previous_block,
            timestamp,
            miner_public_key: miner_public_key.to_string(),
            solved_transactions,
            reward_transaction,
        };
        block.block_id = block.compute_block_id()?;
        Ok(block)
    }

    pub fn from_document(document: &serde_json::Value) -> Result<Block> {
        serde_json::from_value(document.clone())
            .map_err(|e| LedgerError::MalformedDocument(format!("Invalid block document: {e}")))
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| LedgerError::Serialization(format!("Failed to encode block: {e}")))
    }

    fn digest_bytes(&self) -> Result<Vec<u8>> {
        let digest = BlockDigest {
            version: self.version,
            previous_block: self.previous_block.as_deref(),
            timestamp: self.timestamp,
            miner_public_key: &self.miner_public_key,
            solved_transactions: &self.solved_transactions,
            reward_transaction: &self.reward_transaction,
        };
        serde_json::to_vec(&digest).map_err(|e| {
            LedgerError::Serialization(format!("Failed to build canonical block document: {e}"))
        })
    }

    pub fn compute_block_id(&self) -> Result<String> {
        Ok(hash_base58(&self.digest_bytes()?))
    }

    pub fn verify_block_id(&self) -> bool {
        match self.compute_block_id() {
            Ok(computed) => computed == self.block_id,
            Err(_) => false,
        }
    }

    /// Every solved transaction verifies, no output is spent twice across the
    /// block, the reward transaction verifies, and the id recomputes
    pub fn verify(
        &self,
        transactions: &TransactionStore,
        unspent: &UnspentStore,
        reward_value: u64,
    ) -> bool {
        let mut spent: HashSet<(&str, u32)> = HashSet::new();
        for solved in &self.solved_transactions {
            for input in solved.get_transaction().get_inputs() {
                if !spent.insert((input.get_transaction_id(), input.get_index())) {
                    error!(
                        "Block {} spends output {}:{} in two transactions",
                        self.block_id,
                        input.get_transaction_id(),
                        input.get_index()
                    );
                    return false;
                }
            }
            if !solved.verify(transactions, unspent) {
                return false;
            }
        }

        self.reward_transaction.verify(reward_value) && self.verify_block_id()
    }

    pub fn get_block_id(&self) -> &str {
        self.block_id.as_str()
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_previous_block(&self) -> Option<&str> {
        self.previous_block.as_deref()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_miner_public_key(&self) -> &str {
        self.miner_public_key.as_str()
    }

    pub fn get_solved_transactions(&self) -> &[SolvedTransaction] {
        self.solved_transactions.as_slice()
    }

    pub fn get_reward_transaction(&self) -> &RewardTransaction {
        &self.reward_transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::Output;
    use crate::core::protocol::VERSION;
    use crate::utils::{base58_encode, new_key_pair, public_key_from_pkcs8};

    fn test_reward() -> RewardTransaction {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = base58_encode(&public_key_from_pkcs8(&pkcs8).unwrap());
        RewardTransaction::build_signed(
            &pkcs8,
            vec![Output::new(0, 10, &public_key).unwrap()],
            "reward",
        )
        .unwrap()
    }

    #[test]
    fn test_block_id_is_bound_to_content() {
        let mut block =
            Block::assemble(VERSION, None, "miner-key", vec![], test_reward()).unwrap();
        assert!(block.verify_block_id());

        block.timestamp += 1;
        assert!(!block.verify_block_id());
    }

    #[test]
    fn test_block_document_round_trip_preserves_identifier() {
        let block = Block::assemble(
            VERSION,
            Some("parent".to_string()),
            "miner-key",
            vec![],
            test_reward(),
        )
        .unwrap();

        let document = block.to_document().unwrap();
        let parsed = Block::from_document(&document).unwrap();
        assert_eq!(parsed.get_block_id(), block.get_block_id());
        assert!(parsed.verify_block_id());
    }

    #[test]
    fn test_malformed_block_document_is_rejected() {
        let document = serde_json::json!({"block_id": "x", "version": "not a number"});
        assert!(matches!(
            Block::from_document(&document),
            Err(LedgerError::MalformedDocument(_))
        ));
    }
}
