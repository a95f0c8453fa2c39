//! Test utilities for ledger testing

use crate::config::Settings;
use crate::core::{BlockChain, Output, OutputRef, Question, RewardTransaction, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{base58_encode, new_key_pair, public_key_from_pkcs8};
use tempfile::TempDir;

/// A generated key pair together with its base58 public key text
pub struct TestKey {
    pub pkcs8: Vec<u8>,
    pub public_key: String,
}

pub fn create_test_key() -> Result<TestKey> {
    let pkcs8 = new_key_pair()?;
    let public_key = base58_encode(&public_key_from_pkcs8(&pkcs8)?);
    Ok(TestKey { pkcs8, public_key })
}

/// Settings shrunk so a single solved transaction fills a block
pub fn test_settings() -> Settings {
    Settings {
        transactions_per_block: 1,
        ..Settings::default()
    }
}

/// Create a ledger on temporary storage
pub fn create_test_ledger() -> Result<(BlockChain, TempDir)> {
    create_test_ledger_with_settings(test_settings())
}

pub fn create_test_ledger_with_settings(settings: Settings) -> Result<(BlockChain, TempDir)> {
    let temp_dir = tempfile::tempdir().map_err(|e| LedgerError::Io(e.to_string()))?;
    let db_path = temp_dir.path().join("test_ledger");
    let ledger = BlockChain::open(db_path.to_str().unwrap(), settings)?;
    Ok((ledger, temp_dir))
}

/// Mine a reward-only genesis block paying `values` to `miner`, one output
/// per value. Returns the reward transaction id whose outputs fund later
/// spends.
pub fn fund_ledger(ledger: &BlockChain, miner: &TestKey, values: &[u64]) -> Result<String> {
    let outputs = values
        .iter()
        .enumerate()
        .map(|(index, value)| Output::new(index as u32, *value, &miner.public_key))
        .collect::<Result<Vec<Output>>>()?;
    let reward = RewardTransaction::build_signed(&miner.pkcs8, outputs, "genesis reward")?;
    let reward_id = reward.get_transaction_id().to_string();

    ledger
        .mine_block(&reward.to_document()?, &miner.public_key)?
        .ok_or_else(|| LedgerError::Verification("Genesis block was not mined".to_string()))?;
    Ok(reward_id)
}

/// Build a signed transaction spending one committed output
pub fn spend_output(
    key: &TestKey,
    transaction_id: &str,
    index: u32,
    value: u64,
    outputs: Vec<Output>,
    question: Question,
) -> Result<Transaction> {
    Transaction::build_signed(
        &key.pkcs8,
        &[OutputRef {
            transaction_id: transaction_id.to_string(),
            index,
            value,
        }],
        outputs,
        "test spend",
        question,
    )
}

/// Admit, solve, and mine a transaction in one step. Returns the id of the
/// block that committed it.
pub fn admit_solve_mine(
    ledger: &BlockChain,
    transaction: &Transaction,
    answer: &str,
    miner: &TestKey,
) -> Result<String> {
    ledger.submit_transaction(&transaction.to_document()?)?;
    if !ledger.solve_transaction(transaction.get_transaction_id(), answer)? {
        return Err(LedgerError::Verification(
            "Test answer did not solve the transaction".to_string(),
        ));
    }

    let reward = RewardTransaction::build_signed(
        &miner.pkcs8,
        vec![Output::new(0, 1, &miner.public_key)?],
        "miner payout",
    )?;
    let block = ledger
        .mine_block(&reward.to_document()?, &miner.public_key)?
        .ok_or_else(|| LedgerError::Verification("Block was not mined".to_string()))?;
    Ok(block.get_block_id().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_ledger() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        assert!(ledger.get_tip().unwrap().is_none());
        assert_eq!(ledger.get_settings().transactions_per_block, 1);
    }

    #[test]
    fn test_fund_ledger_commits_genesis() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        let miner = create_test_key().unwrap();

        let reward_id = fund_ledger(&ledger, &miner, &[10, 5]).unwrap();
        assert_eq!(ledger.get_tip().unwrap().unwrap().0, 0);
        assert!(ledger.is_unspent(&reward_id, 0).unwrap());
        assert!(ledger.is_unspent(&reward_id, 1).unwrap());
        assert_eq!(ledger.get_balance(&miner.public_key).unwrap(), 15);
    }

    #[test]
    fn test_admit_solve_mine_commits_a_spend() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        let miner = create_test_key().unwrap();
        let reward_id = fund_ledger(&ledger, &miner, &[10]).unwrap();

        let transaction = spend_output(
            &miner,
            &reward_id,
            0,
            10,
            vec![Output::new(0, 9, &miner.public_key).unwrap()],
            Question::new("Largest planet?", "Jupiter"),
        )
        .unwrap();
        admit_solve_mine(&ledger, &transaction, "Jupiter", &miner).unwrap();

        assert!(!ledger.is_unspent(&reward_id, 0).unwrap());
        assert!(ledger
            .is_unspent(transaction.get_transaction_id(), 0)
            .unwrap());
    }
}
