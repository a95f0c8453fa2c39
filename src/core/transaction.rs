// This file implements the transaction system - how value moves in the ledger.
// Transactions follow the UTXO model: each one consumes previously committed
// outputs and creates new ones. What makes this chain different is the
// admission gate: a normal transaction carries a trivia Question, and the
// transaction cannot enter a block until somebody answers it correctly.

use crate::core::protocol::{MAX_CLOCK_DRIFT_MILLIS, REWARD_VALUE};
use crate::core::script;
use crate::error::{LedgerError, Result};
use crate::storage::{TransactionStore, UnspentStore};
use crate::utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, hash_base58, hex_decode, hex_encode, public_key_from_pkcs8,
};
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// An output is a claim on value, locked to a public key until a later
// transaction presents an unlocking script that satisfies the locking script
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Output {
    index: u32,           // Position inside the owning transaction's output list
    value: u64,           // Value carried, in whole credits
    public_key: String,   // Base58 public key of the recipient
    locking_script: String, // Script a spender must satisfy
}

impl Output {
    pub fn new(index: u32, value: u64, public_key: &str) -> Result<Output> {
        if value == 0 {
            return Err(LedgerError::Verification(
                "Output value must be positive".to_string(),
            ));
        }

        Ok(Output {
            index,
            value,
            public_key: public_key.to_string(),
            locking_script: script::standard_locking_script(public_key),
        })
    }

    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_public_key(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn get_locking_script(&self) -> &str {
        self.locking_script.as_str()
    }
}

// An input references a committed output by (transaction_id, index). It
// carries its own copy of the referenced value so fee arithmetic is
// self-contained; a copy that diverges from the real output fails
// verification, it is never auto-corrected.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Input {
    transaction_id: String, // Id of the transaction that created the output
    index: u32,             // Output index inside that transaction
    value: u64,             // Claimed value of the referenced output
    unlocking_script: String, // Script that satisfies the output's locking script
}

impl Input {
    pub fn new(transaction_id: &str, index: u32, value: u64, unlocking_script: &str) -> Input {
        Input {
            transaction_id: transaction_id.to_string(),
            index,
            value,
            unlocking_script: unlocking_script.to_string(),
        }
    }

    pub fn get_transaction_id(&self) -> &str {
        self.transaction_id.as_str()
    }

    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_unlocking_script(&self) -> &str {
        self.unlocking_script.as_str()
    }
}

// The trivia puzzle embedded in a transaction. The answer is never stored in
// reversible form: only base58(sha256(answer + question_id)) is kept, and a
// candidate answer is hashed the same way at solve time.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Question {
    question: String,
    question_id: String, // base58(sha256(question))
    answer_hash: String, // base58(sha256(answer + question_id))
}

impl Question {
    pub fn new(question: &str, answer: &str) -> Question {
        let question_id = hash_base58(question.as_bytes());
        let answer_hash = Self::hash_answer(answer, &question_id);
        Question {
            question: question.to_string(),
            question_id,
            answer_hash,
        }
    }

    /// One canonical hash-text form, shared by posting and solving. If these
    /// two sides ever disagree, no puzzle can be solved.
    pub fn hash_answer(answer: &str, question_id: &str) -> String {
        hash_base58(format!("{answer}{question_id}").as_bytes())
    }

    pub fn matches_answer(&self, answer: &str) -> bool {
        Self::hash_answer(answer, &self.question_id) == self.answer_hash
    }

    pub fn verify(&self) -> bool {
        !self.question.is_empty()
            && !self.answer_hash.is_empty()
            && hash_base58(self.question.as_bytes()) == self.question_id
    }

    pub fn get_question(&self) -> &str {
        self.question.as_str()
    }

    pub fn get_question_id(&self) -> &str {
        self.question_id.as_str()
    }

    pub fn get_answer_hash(&self) -> &str {
        self.answer_hash.as_str()
    }
}

/// Reference to a spendable output, used when building a new transaction
pub struct OutputRef {
    pub transaction_id: String,
    pub index: u32,
    pub value: u64,
}

// The main transaction structure. Field order here is load-bearing: the
// canonical document that identifiers and signatures are computed over is the
// JSON serialization of these fields in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    public_key: String,       // Base58 public key of the transaction owner
    inputs: Vec<Input>,       // Outputs being consumed
    outputs: Vec<Output>,     // Outputs being created
    timestamp: i64,           // Milliseconds since the Unix epoch
    description: String,      // Free-text details
    question: Option<Question>, // The admission puzzle; null only for rewards
    signature: String,        // Hex ECDSA signature over the signing document
    transaction_id: String,   // base58(sha256(canonical document without this field))
}

// Trimmed view used for both hashing and signing. The identifier document
// keeps the signature; the signing document drops it. Dropping exactly the
// right fields here must stay bit-exact with every wallet that signs.
#[derive(Serialize)]
struct TransactionDigest<'a> {
    public_key: &'a str,
    inputs: &'a [Input],
    outputs: &'a [Output],
    timestamp: i64,
    description: &'a str,
    question: Option<&'a Question>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<&'a str>,
}

impl Transaction {
    /// Build and sign a transaction spending the given committed outputs.
    /// Each input's unlocking script is a signature over the referenced
    /// transaction's id, made with the same key that signs the whole document.
    pub fn build_signed(
        pkcs8: &[u8],
        spends: &[OutputRef],
        outputs: Vec<Output>,
        description: &str,
        question: Question,
    ) -> Result<Transaction> {
        Self::build_internal(pkcs8, spends, outputs, description, Some(question))
    }

    fn build_internal(
        pkcs8: &[u8],
        spends: &[OutputRef],
        outputs: Vec<Output>,
        description: &str,
        question: Option<Question>,
    ) -> Result<Transaction> {
        let public_key = base58_encode(&public_key_from_pkcs8(pkcs8)?);

        let mut inputs = Vec::new();
        for spend in spends {
            let signature =
                ecdsa_p256_sha256_sign_digest(pkcs8, spend.transaction_id.as_bytes())?;
            inputs.push(Input::new(
                &spend.transaction_id,
                spend.index,
                spend.value,
                &script::standard_unlocking_script(&hex_encode(&signature)),
            ));
        }

        let mut transaction = Transaction {
            public_key,
            inputs,
            outputs,
            timestamp: current_timestamp()?,
            description: description.to_string(),
            question,
            signature: String::new(),
            transaction_id: String::new(),
        };

        let signature = ecdsa_p256_sha256_sign_digest(pkcs8, &transaction.signing_message()?)?;
        transaction.signature = hex_encode(&signature);
        transaction.transaction_id = transaction.compute_transaction_id()?;
        Ok(transaction)
    }

    /// Parse a wire document into a typed transaction. Missing or mistyped
    /// keys are rejected before anything is hashed.
    pub fn from_document(document: &serde_json::Value) -> Result<Transaction> {
        serde_json::from_value(document.clone()).map_err(|e| {
            LedgerError::MalformedDocument(format!("Invalid transaction document: {e}"))
        })
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|e| LedgerError::Serialization(format!("Failed to encode transaction: {e}")))
    }

    fn digest_bytes(&self, include_signature: bool) -> Result<Vec<u8>> {
        let digest = TransactionDigest {
            public_key: &self.public_key,
            inputs: &self.inputs,
            outputs: &self.outputs,
            timestamp: self.timestamp,
            description: &self.description,
            question: self.question.as_ref(),
            signature: if include_signature {
                Some(&self.signature)
            } else {
                None
            },
        };
        serde_json::to_vec(&digest).map_err(|e| {
            LedgerError::Serialization(format!("Failed to build canonical document: {e}"))
        })
    }

    /// The canonical bytes the owner signs: everything except `signature`
    /// and `transaction_id`
    pub fn signing_message(&self) -> Result<Vec<u8>> {
        self.digest_bytes(false)
    }

    /// base58(sha256(canonical document without `transaction_id`))
    pub fn compute_transaction_id(&self) -> Result<String> {
        Ok(hash_base58(&self.digest_bytes(true)?))
    }

    pub fn get_transaction_id(&self) -> &str {
        self.transaction_id.as_str()
    }

    pub fn get_public_key(&self) -> &str {
        self.public_key.as_str()
    }

    pub fn get_inputs(&self) -> &[Input] {
        self.inputs.as_slice()
    }

    pub fn get_outputs(&self) -> &[Output] {
        self.outputs.as_slice()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_description(&self) -> &str {
        self.description.as_str()
    }

    pub fn get_question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn get_total_input_value(&self) -> Option<u64> {
        let mut total: u64 = 0;
        for input in &self.inputs {
            total = total.checked_add(input.value)?;
        }
        Some(total)
    }

    pub fn get_total_output_value(&self) -> Option<u64> {
        let mut total: u64 = 0;
        for output in &self.outputs {
            total = total.checked_add(output.value)?;
        }
        Some(total)
    }

    // Each input must resolve to a committed, unspent output whose value and
    // owner match the input's claims, and whose locking script the input can
    // satisfy. One failing input fails the whole transaction.
    pub fn verify_inputs(&self, transactions: &TransactionStore, unspent: &UnspentStore) -> bool {
        if self.inputs.is_empty() {
            error!("Transaction {} has no inputs", self.transaction_id);
            return false;
        }

        // The same output must not be consumed twice within one transaction
        let mut seen: HashSet<(&str, u32)> = HashSet::new();

        for input in &self.inputs {
            if !seen.insert((input.transaction_id.as_str(), input.index)) {
                error!(
                    "Transaction {} spends output {}:{} twice",
                    self.transaction_id, input.transaction_id, input.index
                );
                return false;
            }

            let stored = match transactions.get(&input.transaction_id) {
                Ok(Some(stored)) => stored,
                Ok(None) => {
                    error!(
                        "Input references unknown transaction {}",
                        input.transaction_id
                    );
                    return false;
                }
                Err(e) => {
                    error!("Failed to resolve input transaction: {e}");
                    return false;
                }
            };

            // Pool-resident outputs are not spendable
            if !stored.is_chain_committed() {
                error!(
                    "Input references uncommitted transaction {}",
                    input.transaction_id
                );
                return false;
            }

            let output = match stored
                .get_transaction()
                .get_outputs()
                .get(input.index as usize)
            {
                Some(output) => output,
                None => {
                    error!(
                        "Input references missing output {}:{}",
                        input.transaction_id, input.index
                    );
                    return false;
                }
            };

            // Value and ownership forgery checks
            if output.get_value() != input.value {
                error!(
                    "Input value {} diverges from output value {} at {}:{}",
                    input.value,
                    output.get_value(),
                    input.transaction_id,
                    input.index
                );
                return false;
            }
            if output.get_public_key() != self.public_key {
                error!(
                    "Output {}:{} is not owned by the spending key",
                    input.transaction_id, input.index
                );
                return false;
            }

            // Double-spend check against the UTXO ledger
            match unspent.is_unspent(&input.transaction_id, input.index) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "Output {}:{} is already spent",
                        input.transaction_id, input.index
                    );
                    return false;
                }
                Err(e) => {
                    error!("Failed to check unspent state: {e}");
                    return false;
                }
            }

            // The unlocking script runs against the referenced transaction's id
            if !script::evaluate(
                &input.unlocking_script,
                output.get_locking_script(),
                input.transaction_id.as_bytes(),
            ) {
                error!(
                    "Unlocking script rejected for output {}:{}",
                    input.transaction_id, input.index
                );
                return false;
            }
        }
        true
    }

    // Outputs must be well formed and worth strictly less than the inputs;
    // the difference is the implicit fee, there is no explicit fee field
    pub fn verify_outputs(&self) -> bool {
        if !outputs_well_formed(&self.outputs) {
            return false;
        }

        let total_input = match self.get_total_input_value() {
            Some(total) => total,
            None => return false,
        };
        let total_output = match self.get_total_output_value() {
            Some(total) => total,
            None => return false,
        };
        total_input > total_output
    }

    // A normal transaction must carry a valid question. The reward exemption
    // lives in RewardTransaction, never here.
    pub fn verify_question(&self) -> bool {
        matches!(&self.question, Some(question) if question.verify())
    }

    pub fn verify_timestamp(&self) -> bool {
        if self.timestamp <= 0 {
            return false;
        }
        match current_timestamp() {
            Ok(now) => self.timestamp <= now + MAX_CLOCK_DRIFT_MILLIS,
            Err(_) => false,
        }
    }

    pub fn verify_signature(&self) -> bool {
        let public_key = match base58_decode(&self.public_key) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature = match hex_decode(&self.signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let message = match self.signing_message() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        ecdsa_p256_sha256_sign_verify(&public_key, &signature, &message)
    }

    pub fn verify_transaction_id(&self) -> bool {
        match self.compute_transaction_id() {
            Ok(computed) => computed == self.transaction_id,
            Err(_) => false,
        }
    }

    /// The full verification pipeline: all checks conjunctive, short-circuiting,
    /// never panicking on malformed input
    pub fn verify(&self, transactions: &TransactionStore, unspent: &UnspentStore) -> bool {
        self.verify_inputs(transactions, unspent)
            && self.verify_outputs()
            && self.verify_question()
            && self.verify_timestamp()
            && self.verify_signature()
            && self.verify_transaction_id()
    }
}

fn outputs_well_formed(outputs: &[Output]) -> bool {
    if outputs.is_empty() {
        return false;
    }
    for (position, output) in outputs.iter().enumerate() {
        if output.index as usize != position || output.value == 0 {
            return false;
        }
    }
    true
}

// A reward transaction is the miner's payout. Same document shape as a normal
// transaction so identifiers stay in the shared scheme, but it carries no
// inputs and no question, and its total output is capped instead of being
// backed by spent value.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(transparent)]
pub struct RewardTransaction(Transaction);

impl RewardTransaction {
    pub fn build_signed(
        pkcs8: &[u8],
        outputs: Vec<Output>,
        description: &str,
    ) -> Result<RewardTransaction> {
        Transaction::build_internal(pkcs8, &[], outputs, description, None).map(RewardTransaction)
    }

    pub fn from_document(document: &serde_json::Value) -> Result<RewardTransaction> {
        serde_json::from_value(document.clone()).map_err(|e| {
            LedgerError::MalformedDocument(format!("Invalid reward transaction document: {e}"))
        })
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        self.0.to_document()
    }

    /// Reward rules: no inputs, no question, well-formed outputs worth at
    /// most `reward_value`, and the usual signature and identifier checks
    pub fn verify(&self, reward_value: u64) -> bool {
        let transaction = &self.0;
        if !transaction.inputs.is_empty() {
            error!("Reward transaction {} has inputs", transaction.transaction_id);
            return false;
        }
        if transaction.question.is_some() {
            error!(
                "Reward transaction {} carries a question",
                transaction.transaction_id
            );
            return false;
        }
        if !outputs_well_formed(&transaction.outputs) {
            return false;
        }
        let total = match transaction.get_total_output_value() {
            Some(total) => total,
            None => return false,
        };
        if total > reward_value {
            error!(
                "Reward transaction {} pays {} which exceeds the {} cap",
                transaction.transaction_id, total, reward_value
            );
            return false;
        }
        transaction.verify_timestamp()
            && transaction.verify_signature()
            && transaction.verify_transaction_id()
    }

    /// Convenience form using the protocol's default cap
    pub fn verify_default(&self) -> bool {
        self.verify(REWARD_VALUE)
    }

    pub fn get_transaction_id(&self) -> &str {
        self.0.get_transaction_id()
    }

    pub fn get_public_key(&self) -> &str {
        self.0.get_public_key()
    }

    pub fn get_outputs(&self) -> &[Output] {
        self.0.get_outputs()
    }

    pub fn as_transaction(&self) -> &Transaction {
        &self.0
    }
}
