// The UTXO ledger. One entry per output of every chain-committed transaction;
// an entry with empty spending fields is spendable. Entries are never edited
// except to set or clear those fields, and never removed except when the
// block that created them is excised during a reorganization.

use crate::core::transaction::{Input, Output};
use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use log::error;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

const UNSPENT_TREE: &str = "unspent";

/// ( K -> "transaction_id:output_index", V -> UnspentEntry )
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnspentEntry {
    transaction_id: String,
    output_index: u32,
    block_id: String, // Block that committed the creating transaction
    spending_block: Option<String>,
    spending_transaction: Option<String>,
}

impl UnspentEntry {
    pub fn get_transaction_id(&self) -> &str {
        self.transaction_id.as_str()
    }

    pub fn get_output_index(&self) -> u32 {
        self.output_index
    }

    pub fn get_block_id(&self) -> &str {
        self.block_id.as_str()
    }

    pub fn get_spending_block(&self) -> Option<&str> {
        self.spending_block.as_deref()
    }

    pub fn get_spending_transaction(&self) -> Option<&str> {
        self.spending_transaction.as_deref()
    }

    pub fn is_unspent(&self) -> bool {
        self.spending_block.is_none() && self.spending_transaction.is_none()
    }
}

fn entry_key(transaction_id: &str, output_index: u32) -> Vec<u8> {
    // Identifiers are base58 text, so ':' can never occur inside one
    format!("{transaction_id}:{output_index}").into_bytes()
}

#[derive(Clone)]
pub struct UnspentStore {
    tree: Tree,
}

impl UnspentStore {
    pub fn new(db: &Db) -> Result<UnspentStore> {
        let tree = db
            .open_tree(UNSPENT_TREE)
            .map_err(|e| LedgerError::Database(format!("Failed to open unspent tree: {e}")))?;
        Ok(UnspentStore { tree })
    }

    /// Insert one unspent entry per output. Called only when the creating
    /// transaction is committed to the chain inside `block_id`.
    pub fn record_outputs(
        &self,
        transaction_id: &str,
        outputs: &[Output],
        block_id: &str,
    ) -> Result<()> {
        for output in outputs {
            let entry = UnspentEntry {
                transaction_id: transaction_id.to_string(),
                output_index: output.get_index(),
                block_id: block_id.to_string(),
                spending_block: None,
                spending_transaction: None,
            };
            self.tree
                .insert(entry_key(transaction_id, output.get_index()), serialize(&entry)?)
                .map_err(|e| {
                    LedgerError::Database(format!("Failed to record unspent output: {e}"))
                })?;
        }
        Ok(())
    }

    /// Mark the entry matching `input` as consumed. Admission already proved
    /// the entry exists and is spendable, so a missing or spent entry here
    /// means the ledger invariant broke upstream.
    pub fn mark_spent(
        &self,
        input: &Input,
        spending_block: &str,
        spending_transaction: &str,
    ) -> Result<()> {
        let key = entry_key(input.get_transaction_id(), input.get_index());
        let mut entry = match self.get(input.get_transaction_id(), input.get_index())? {
            Some(entry) => entry,
            None => {
                error!(
                    "No unspent entry for output {}:{} while committing transaction {}",
                    input.get_transaction_id(),
                    input.get_index(),
                    spending_transaction
                );
                return Err(LedgerError::InconsistentState(format!(
                    "Missing unspent entry for {}:{}",
                    input.get_transaction_id(),
                    input.get_index()
                )));
            }
        };

        if !entry.is_unspent() {
            error!(
                "Output {}:{} is already spent by transaction {:?} while committing {}",
                input.get_transaction_id(),
                input.get_index(),
                entry.spending_transaction,
                spending_transaction
            );
            return Err(LedgerError::InconsistentState(format!(
                "Output {}:{} already spent",
                input.get_transaction_id(),
                input.get_index()
            )));
        }

        entry.spending_block = Some(spending_block.to_string());
        entry.spending_transaction = Some(spending_transaction.to_string());
        self.tree
            .insert(key, serialize(&entry)?)
            .map_err(|e| LedgerError::Database(format!("Failed to mark output spent: {e}")))?;
        Ok(())
    }

    pub fn is_unspent(&self, transaction_id: &str, output_index: u32) -> Result<bool> {
        match self.get(transaction_id, output_index)? {
            Some(entry) => Ok(entry.is_unspent()),
            None => Ok(false),
        }
    }

    pub fn get(&self, transaction_id: &str, output_index: u32) -> Result<Option<UnspentEntry>> {
        let bytes = self
            .tree
            .get(entry_key(transaction_id, output_index))
            .map_err(|e| LedgerError::Database(format!("Failed to get unspent entry: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Rollback primitive for reorganization. Restores entries spent by
    /// `block_id` to spendable and deletes entries created inside `block_id`
    /// (those outputs no longer exist once the block is excised). Idempotent,
    /// and a no-op for a block that was never committed.
    pub fn free_block_transactions(&self, block_id: &str) -> Result<()> {
        let mut to_remove = Vec::new();
        let mut to_restore = Vec::new();

        for item in self.tree.iter() {
            let (key, value) = item.map_err(|e| {
                LedgerError::Database(format!("Failed to iterate unspent tree: {e}"))
            })?;
            let entry: UnspentEntry = deserialize(value.as_ref())?;
            if entry.block_id == block_id {
                to_remove.push(key);
            } else if entry.spending_block.as_deref() == Some(block_id) {
                let mut restored = entry;
                restored.spending_block = None;
                restored.spending_transaction = None;
                to_restore.push((key, restored));
            }
        }

        for key in to_remove {
            self.tree
                .remove(key)
                .map_err(|e| LedgerError::Database(format!("Failed to remove entry: {e}")))?;
        }
        for (key, entry) in to_restore {
            self.tree
                .insert(key, serialize(&entry)?)
                .map_err(|e| LedgerError::Database(format!("Failed to restore entry: {e}")))?;
        }
        Ok(())
    }

    /// All currently spendable entries, for balance queries
    pub fn unspent_entries(&self) -> Result<Vec<UnspentEntry>> {
        let mut entries = Vec::new();
        for item in self.tree.iter() {
            let (_, value) = item.map_err(|e| {
                LedgerError::Database(format!("Failed to iterate unspent tree: {e}"))
            })?;
            let entry: UnspentEntry = deserialize(value.as_ref())?;
            if entry.is_unspent() {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{Input, Output};

    fn temp_store() -> (UnspentStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("db")).unwrap();
        (UnspentStore::new(&db).unwrap(), temp_dir)
    }

    fn two_outputs() -> Vec<Output> {
        vec![
            Output::new(0, 10, "key-a").unwrap(),
            Output::new(1, 5, "key-a").unwrap(),
        ]
    }

    #[test]
    fn test_recorded_outputs_are_unspent() {
        let (store, _temp_dir) = temp_store();
        store.record_outputs("tx-1", &two_outputs(), "block-1").unwrap();

        assert!(store.is_unspent("tx-1", 0).unwrap());
        assert!(store.is_unspent("tx-1", 1).unwrap());
        assert!(!store.is_unspent("tx-1", 2).unwrap());
        assert!(!store.is_unspent("tx-other", 0).unwrap());
    }

    #[test]
    fn test_mark_spent_consumes_entry() {
        let (store, _temp_dir) = temp_store();
        store.record_outputs("tx-1", &two_outputs(), "block-1").unwrap();

        let input = Input::new("tx-1", 0, 10, "sig");
        store.mark_spent(&input, "block-2", "tx-2").unwrap();

        assert!(!store.is_unspent("tx-1", 0).unwrap());
        assert!(store.is_unspent("tx-1", 1).unwrap());

        let entry = store.get("tx-1", 0).unwrap().unwrap();
        assert_eq!(entry.get_spending_block(), Some("block-2"));
        assert_eq!(entry.get_spending_transaction(), Some("tx-2"));
    }

    #[test]
    fn test_double_mark_spent_is_inconsistent_state() {
        let (store, _temp_dir) = temp_store();
        store.record_outputs("tx-1", &two_outputs(), "block-1").unwrap();

        let input = Input::new("tx-1", 0, 10, "sig");
        store.mark_spent(&input, "block-2", "tx-2").unwrap();
        assert!(matches!(
            store.mark_spent(&input, "block-3", "tx-3"),
            Err(LedgerError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_mark_spent_without_entry_is_inconsistent_state() {
        let (store, _temp_dir) = temp_store();
        let input = Input::new("tx-ghost", 0, 10, "sig");
        assert!(matches!(
            store.mark_spent(&input, "block-2", "tx-2"),
            Err(LedgerError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_free_block_restores_spent_and_removes_created() {
        let (store, _temp_dir) = temp_store();
        store.record_outputs("tx-1", &two_outputs(), "block-1").unwrap();

        // Block 2 spends tx-1:0 and creates tx-2's outputs
        let input = Input::new("tx-1", 0, 10, "sig");
        store.mark_spent(&input, "block-2", "tx-2").unwrap();
        store
            .record_outputs("tx-2", &[Output::new(0, 9, "key-b").unwrap()], "block-2")
            .unwrap();

        store.free_block_transactions("block-2").unwrap();

        // The spent output is spendable again; block 2's own outputs are gone
        assert!(store.is_unspent("tx-1", 0).unwrap());
        assert!(store.get("tx-2", 0).unwrap().is_none());
    }

    #[test]
    fn test_free_block_is_idempotent() {
        let (store, _temp_dir) = temp_store();
        store.record_outputs("tx-1", &two_outputs(), "block-1").unwrap();
        let input = Input::new("tx-1", 0, 10, "sig");
        store.mark_spent(&input, "block-2", "tx-2").unwrap();

        store.free_block_transactions("block-2").unwrap();
        store.free_block_transactions("block-2").unwrap();
        assert!(store.is_unspent("tx-1", 0).unwrap());

        // A block that never committed anything is a no-op
        store.free_block_transactions("block-never").unwrap();
        assert!(store.is_unspent("tx-1", 0).unwrap());
        assert!(store.is_unspent("tx-1", 1).unwrap());
    }

    #[test]
    fn test_unspent_entries_skips_spent() {
        let (store, _temp_dir) = temp_store();
        store.record_outputs("tx-1", &two_outputs(), "block-1").unwrap();
        let input = Input::new("tx-1", 1, 5, "sig");
        store.mark_spent(&input, "block-2", "tx-2").unwrap();

        let entries = store.unspent_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get_output_index(), 0);
    }
}
