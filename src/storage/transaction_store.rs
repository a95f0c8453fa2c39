use crate::core::transaction::{RewardTransaction, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

const TRANSACTIONS_TREE: &str = "transactions";

/// A transaction as kept on disk: the entity itself plus the block that
/// committed it. `block_id` stays null while the transaction is only
/// pool-resident; inputs may not reference it until it is set.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct StoredTransaction {
    transaction: Transaction,
    block_id: Option<String>,
}

impl StoredTransaction {
    pub fn get_transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn get_block_id(&self) -> Option<&str> {
        self.block_id.as_deref()
    }

    pub fn is_chain_committed(&self) -> bool {
        self.block_id.is_some()
    }

    /// The wire form: the transaction document with a `block_id` field added,
    /// null when the transaction is not chain-committed
    pub fn to_document(&self) -> Result<serde_json::Value> {
        let mut document = self.transaction.to_document()?;
        document["block_id"] = match &self.block_id {
            Some(block_id) => serde_json::Value::String(block_id.clone()),
            None => serde_json::Value::Null,
        };
        Ok(document)
    }
}

/// ( K -> transaction_id, V -> StoredTransaction )
#[derive(Clone)]
pub struct TransactionStore {
    tree: Tree,
}

impl TransactionStore {
    pub fn new(db: &Db) -> Result<TransactionStore> {
        let tree = db.open_tree(TRANSACTIONS_TREE).map_err(|e| {
            LedgerError::Database(format!("Failed to open transactions tree: {e}"))
        })?;
        Ok(TransactionStore { tree })
    }

    /// Store a pool-resident transaction, not yet part of any block
    pub fn put_free(&self, transaction: &Transaction) -> Result<()> {
        self.put(transaction.clone(), None)
    }

    /// Store a transaction committed to the chain inside `block_id`
    pub fn put_chain(&self, transaction: &Transaction, block_id: &str) -> Result<()> {
        self.put(transaction.clone(), Some(block_id.to_string()))
    }

    pub fn put_chain_reward(&self, reward: &RewardTransaction, block_id: &str) -> Result<()> {
        self.put(reward.as_transaction().clone(), Some(block_id.to_string()))
    }

    fn put(&self, transaction: Transaction, block_id: Option<String>) -> Result<()> {
        let key = transaction.get_transaction_id().to_string();
        let stored = StoredTransaction {
            transaction,
            block_id,
        };
        let bytes = serialize(&stored)?;
        self.tree
            .insert(key.as_bytes(), bytes)
            .map_err(|e| LedgerError::Database(format!("Failed to store transaction: {e}")))?;
        Ok(())
    }

    pub fn exists(&self, transaction_id: &str) -> Result<bool> {
        let present = self
            .tree
            .get(transaction_id.as_bytes())
            .map_err(|e| {
                LedgerError::Database(format!("Failed to check transaction existence: {e}"))
            })?
            .is_some();
        Ok(present)
    }

    pub fn get(&self, transaction_id: &str) -> Result<Option<StoredTransaction>> {
        let bytes = self
            .tree
            .get(transaction_id.as_bytes())
            .map_err(|e| LedgerError::Database(format!("Failed to get transaction: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }
}
