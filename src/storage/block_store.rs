use crate::core::block::Block;
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use sled::{Db, Tree};

const BLOCKS_TREE: &str = "blocks";

/// ( K -> block_id, V -> Block )
///
/// Holds every verified block, chain-committed or not. A block that lost a
/// fork or whose parent is unknown stays here as a pool resident; the chain
/// index decides which of these blocks are part of the canonical history.
#[derive(Clone)]
pub struct BlockStore {
    tree: Tree,
}

impl BlockStore {
    pub fn new(db: &Db) -> Result<BlockStore> {
        let tree = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| LedgerError::Database(format!("Failed to open blocks tree: {e}")))?;
        Ok(BlockStore { tree })
    }

    pub fn put(&self, block: &Block) -> Result<()> {
        let bytes = serialize(block)?;
        self.tree
            .insert(block.get_block_id().as_bytes(), bytes)
            .map_err(|e| LedgerError::Database(format!("Failed to store block: {e}")))?;
        Ok(())
    }

    pub fn get(&self, block_id: &str) -> Result<Option<Block>> {
        let bytes = self
            .tree
            .get(block_id.as_bytes())
            .map_err(|e| LedgerError::Database(format!("Failed to get block: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, block_id: &str) -> Result<bool> {
        let present = self
            .tree
            .get(block_id.as_bytes())
            .map_err(|e| LedgerError::Database(format!("Failed to check block existence: {e}")))?
            .is_some();
        Ok(present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::Block;
    use crate::core::protocol::VERSION;
    use crate::core::transaction::{Output, RewardTransaction};
    use crate::utils::{base58_encode, new_key_pair, public_key_from_pkcs8};

    fn test_block() -> Block {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = base58_encode(&public_key_from_pkcs8(&pkcs8).unwrap());
        let reward = RewardTransaction::build_signed(
            &pkcs8,
            vec![Output::new(0, 10, &public_key).unwrap()],
            "reward",
        )
        .unwrap();
        Block::assemble(VERSION, None, &public_key, vec![], reward).unwrap()
    }

    #[test]
    fn test_block_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("db")).unwrap();
        let store = BlockStore::new(&db).unwrap();

        let block = test_block();
        store.put(&block).unwrap();

        assert!(store.exists(block.get_block_id()).unwrap());
        let loaded = store.get(block.get_block_id()).unwrap().unwrap();
        assert_eq!(loaded.get_block_id(), block.get_block_id());
        assert!(loaded.verify_block_id());
    }

    #[test]
    fn test_missing_block_is_absent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("db")).unwrap();
        let store = BlockStore::new(&db).unwrap();

        assert!(store.get("nothing-here").unwrap().is_none());
        assert!(!store.exists("nothing-here").unwrap());
    }
}
