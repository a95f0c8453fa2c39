// The chain index: an append-only mapping from block number to block id with
// a reverse index and a tip record, all in one tree so every transition is a
// single sled transaction. Number keys are big-endian so lexicographic order
// is numeric order.

use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

const CHAIN_INDEX_TREE: &str = "chain_index";
const TIP_KEY: &str = "chain_tip";
const NUMBER_PREFIX: &str = "n:";
const ID_PREFIX: &str = "i:";

/// Singleton record naming the current chain tip
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TipRecord {
    last_block_number: u64,
    last_block_id: String,
}

impl TipRecord {
    pub fn get_last_block_number(&self) -> u64 {
        self.last_block_number
    }

    pub fn get_last_block_id(&self) -> &str {
        self.last_block_id.as_str()
    }
}

fn number_key(block_number: u64) -> Vec<u8> {
    let mut key = NUMBER_PREFIX.as_bytes().to_vec();
    key.extend_from_slice(&block_number.to_be_bytes());
    key
}

fn id_key(block_id: &str) -> Vec<u8> {
    format!("{ID_PREFIX}{block_id}").into_bytes()
}

#[derive(Clone)]
pub struct ChainIndexStore {
    tree: Tree,
}

impl ChainIndexStore {
    pub fn new(db: &Db) -> Result<ChainIndexStore> {
        let tree = db
            .open_tree(CHAIN_INDEX_TREE)
            .map_err(|e| LedgerError::Database(format!("Failed to open chain index tree: {e}")))?;
        Ok(ChainIndexStore { tree })
    }

    pub fn get_tip(&self) -> Result<Option<TipRecord>> {
        let bytes = self
            .tree
            .get(TIP_KEY)
            .map_err(|e| LedgerError::Database(format!("Failed to get chain tip: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Append `block_id` at the next block number and advance the tip.
    /// Returns the number the block was placed at.
    pub fn append(&self, block_id: &str) -> Result<u64> {
        let block_number = match self.get_tip()? {
            Some(tip) => tip.last_block_number + 1,
            None => 0,
        };
        let tip_bytes = serialize(&TipRecord {
            last_block_number: block_number,
            last_block_id: block_id.to_string(),
        })?;

        self.tree
            .transaction(|index| {
                index.insert(number_key(block_number), block_id.as_bytes())?;
                index.insert(id_key(block_id), block_number.to_be_bytes().to_vec())?;
                index.insert(TIP_KEY, tip_bytes.as_slice())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                LedgerError::Database(format!("Failed to append to chain index: {e}"))
            })?;

        Ok(block_number)
    }

    /// Remove every block above `fork_number` and reset the tip to the block
    /// at `fork_number`. Returns the removed ids, tip first.
    pub fn remove_until(&self, fork_number: u64) -> Result<Vec<String>> {
        let tip = match self.get_tip()? {
            Some(tip) => tip,
            None => return Ok(Vec::new()),
        };
        if tip.last_block_number <= fork_number {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for block_number in ((fork_number + 1)..=tip.last_block_number).rev() {
            let block_id = self.get_block_id(block_number)?.ok_or_else(|| {
                LedgerError::InconsistentState(format!(
                    "Chain index has no block at number {block_number}"
                ))
            })?;
            removed.push((block_number, block_id));
        }

        let fork_block_id = self.get_block_id(fork_number)?.ok_or_else(|| {
            LedgerError::InconsistentState(format!(
                "Chain index has no block at fork number {fork_number}"
            ))
        })?;
        let tip_bytes = serialize(&TipRecord {
            last_block_number: fork_number,
            last_block_id: fork_block_id,
        })?;

        self.tree
            .transaction(|index| {
                for (block_number, block_id) in &removed {
                    index.remove(number_key(*block_number))?;
                    index.remove(id_key(block_id))?;
                }
                index.insert(TIP_KEY, tip_bytes.as_slice())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                LedgerError::Database(format!("Failed to roll back chain index: {e}"))
            })?;

        Ok(removed.into_iter().map(|(_, block_id)| block_id).collect())
    }

    pub fn get_block_id(&self, block_number: u64) -> Result<Option<String>> {
        let bytes = self
            .tree
            .get(number_key(block_number))
            .map_err(|e| LedgerError::Database(format!("Failed to look up block number: {e}")))?;
        match bytes {
            Some(bytes) => {
                let block_id = String::from_utf8(bytes.to_vec()).map_err(|e| {
                    LedgerError::Database(format!("Invalid block id in chain index: {e}"))
                })?;
                Ok(Some(block_id))
            }
            None => Ok(None),
        }
    }

    pub fn get_block_number(&self, block_id: &str) -> Result<Option<u64>> {
        let bytes = self
            .tree
            .get(id_key(block_id))
            .map_err(|e| LedgerError::Database(format!("Failed to look up block id: {e}")))?;
        match bytes {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    LedgerError::Database("Malformed block number in chain index".to_string())
                })?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    pub fn exists(&self, block_id: &str) -> Result<bool> {
        Ok(self.get_block_number(block_id)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_index() -> (ChainIndexStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("db")).unwrap();
        (ChainIndexStore::new(&db).unwrap(), temp_dir)
    }

    #[test]
    fn test_empty_index_has_no_tip() {
        let (index, _temp_dir) = temp_index();
        assert!(index.get_tip().unwrap().is_none());
        assert!(index.get_block_id(0).unwrap().is_none());
        assert!(!index.exists("block-a").unwrap());
    }

    #[test]
    fn test_append_advances_tip() {
        let (index, _temp_dir) = temp_index();
        assert_eq!(index.append("block-a").unwrap(), 0);
        assert_eq!(index.append("block-b").unwrap(), 1);

        let tip = index.get_tip().unwrap().unwrap();
        assert_eq!(tip.get_last_block_number(), 1);
        assert_eq!(tip.get_last_block_id(), "block-b");

        assert_eq!(index.get_block_id(0).unwrap().unwrap(), "block-a");
        assert_eq!(index.get_block_number("block-b").unwrap().unwrap(), 1);
        assert!(index.exists("block-a").unwrap());
    }

    #[test]
    fn test_remove_until_excises_suffix_tip_first() {
        let (index, _temp_dir) = temp_index();
        for block_id in ["block-a", "block-b", "block-c", "block-d"] {
            index.append(block_id).unwrap();
        }

        let removed = index.remove_until(1).unwrap();
        assert_eq!(removed, vec!["block-d".to_string(), "block-c".to_string()]);

        let tip = index.get_tip().unwrap().unwrap();
        assert_eq!(tip.get_last_block_number(), 1);
        assert_eq!(tip.get_last_block_id(), "block-b");

        assert!(!index.exists("block-c").unwrap());
        assert!(!index.exists("block-d").unwrap());
        assert!(index.get_block_id(2).unwrap().is_none());

        // Appending after a rollback reuses the freed numbers
        assert_eq!(index.append("block-e").unwrap(), 2);
    }

    #[test]
    fn test_remove_until_current_tip_is_a_no_op() {
        let (index, _temp_dir) = temp_index();
        index.append("block-a").unwrap();
        index.append("block-b").unwrap();

        assert!(index.remove_until(1).unwrap().is_empty());
        assert_eq!(
            index.get_tip().unwrap().unwrap().get_last_block_id(),
            "block-b"
        );
    }
}
