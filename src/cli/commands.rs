use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "solvechain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createkeys", about = "Generate a new ECDSA key pair")]
    CreateKeys {
        #[arg(help = "File to write the PKCS#8 private key to")]
        key_file: String,
    },
    #[command(name = "submittx", about = "Submit a transaction document to the unsolved pool")]
    SubmitTx {
        #[arg(help = "Path to a JSON transaction document")]
        file: String,
    },
    #[command(name = "solve", about = "Answer a pooled transaction's question")]
    Solve {
        #[arg(help = "Transaction id")]
        transaction_id: String,
        #[arg(help = "Answer to the embedded question")]
        answer: String,
    },
    #[command(name = "mine", about = "Assemble solved transactions into a new block")]
    Mine {
        #[arg(help = "Path to a JSON reward transaction document")]
        reward_file: String,
        #[arg(help = "Base58 public key of the miner")]
        miner_public_key: String,
    },
    #[command(name = "submitblock", about = "Submit a block document for chain admission")]
    SubmitBlock {
        #[arg(help = "Path to a JSON block document")]
        file: String,
    },
    #[command(name = "gettx", about = "Fetch a transaction by id")]
    GetTx {
        #[arg(help = "Transaction id")]
        transaction_id: String,
    },
    #[command(name = "getblock", about = "Fetch a block by id")]
    GetBlock {
        #[arg(help = "Block id")]
        block_id: String,
    },
    #[command(name = "tip", about = "Print the current chain tip")]
    Tip,
    #[command(name = "balance", about = "Sum the unspent outputs owned by a public key")]
    Balance {
        #[arg(help = "Base58 public key")]
        public_key: String,
    },
}
