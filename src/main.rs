use clap::Parser;
use log::{error, LevelFilter};
use solvechain::utils::{base58_encode, new_key_pair, public_key_from_pkcs8};
use solvechain::{BlockChain, Command, Opt};
use std::fs;
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn read_document(path: &str) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::CreateKeys { key_file } => {
            let pkcs8 = new_key_pair()?;
            fs::write(&key_file, &pkcs8)?;
            let public_key = base58_encode(&public_key_from_pkcs8(&pkcs8)?);
            println!("Private key written to {key_file}");
            println!("Public key: {public_key}");
        }
        Command::SubmitTx { file } => {
            let document = read_document(&file)?;
            let ledger = BlockChain::open_default()?;
            ledger.submit_transaction(&document)?;
            println!("Transaction admitted to the unsolved pool");
        }
        Command::Solve {
            transaction_id,
            answer,
        } => {
            let ledger = BlockChain::open_default()?;
            if ledger.solve_transaction(&transaction_id, &answer)? {
                println!("Correct! Transaction moved to the solved pool");
            } else {
                println!("Wrong answer");
            }
        }
        Command::Mine {
            reward_file,
            miner_public_key,
        } => {
            let document = read_document(&reward_file)?;
            let ledger = BlockChain::open_default()?;
            match ledger.mine_block(&document, &miner_public_key)? {
                Some(block) => println!("Mined block {}", block.get_block_id()),
                None => println!("Not enough solved transactions to fill a block"),
            }
        }
        Command::SubmitBlock { file } => {
            let document = read_document(&file)?;
            let ledger = BlockChain::open_default()?;
            let outcome = ledger.submit_block(&document)?;
            println!("Block admission outcome: {outcome:?}");
        }
        Command::GetTx { transaction_id } => {
            let ledger = BlockChain::open_default()?;
            match ledger.get_transaction(&transaction_id)? {
                Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
                None => println!("Transaction not found"),
            }
        }
        Command::GetBlock { block_id } => {
            let ledger = BlockChain::open_default()?;
            match ledger.get_block(&block_id)? {
                Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
                None => println!("Block not found"),
            }
        }
        Command::Tip => {
            let ledger = BlockChain::open_default()?;
            match ledger.get_tip()? {
                Some((block_number, block_id)) => println!("Block {block_number}: {block_id}"),
                None => println!("The chain is empty"),
            }
        }
        Command::Balance { public_key } => {
            let ledger = BlockChain::open_default()?;
            let balance = ledger.get_balance(&public_key)?;
            println!("Balance of {public_key}: {balance}");
        }
    }
    Ok(())
}
