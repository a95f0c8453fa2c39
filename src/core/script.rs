// This is the script machine that decides whether an input may spend an output.
// Scripts are whitespace-separated token streams: the output carries a locking
// script, the spending input carries an unlocking script, and the two run in
// sequence on one stack. Spending succeeds only when exactly one truthy value
// is left on the stack at the end.

use crate::utils::{base58_decode, ecdsa_p256_sha256_sign_verify, hex_decode};
use log::error;

const OP_DUP: &str = "OP_DUP";
const OP_EQUAL: &str = "OP_EQUAL";
const OP_EQUALVERIFY: &str = "OP_EQUALVERIFY";
const OP_CHECKSIG: &str = "OP_CHECKSIG";

const TRUE: &str = "1";
const FALSE: &str = "0";

/// The locking script a wallet puts on a standard output: the owner's public
/// key followed by a signature check.
pub fn standard_locking_script(public_key: &str) -> String {
    format!("{public_key} {OP_CHECKSIG}")
}

/// The matching unlocking script: a hex signature over the referenced
/// transaction's id, produced with the output owner's key.
pub fn standard_unlocking_script(signature_hex: &str) -> String {
    signature_hex.to_string()
}

/// Run `unlocking` then `locking` against `message` (the referenced
/// transaction's id bytes). Fails closed: unknown opcodes, stack underflow,
/// and malformed key or signature text all evaluate to false.
pub fn evaluate(unlocking: &str, locking: &str, message: &[u8]) -> bool {
    let mut machine = ScriptMachine::new(message);
    machine.run(unlocking) && machine.run(locking) && machine.succeeded()
}

struct ScriptMachine<'a> {
    message: &'a [u8],
    stack: Vec<String>,
}

impl<'a> ScriptMachine<'a> {
    fn new(message: &'a [u8]) -> ScriptMachine<'a> {
        ScriptMachine {
            message,
            stack: Vec::new(),
        }
    }

    fn run(&mut self, script: &str) -> bool {
        for token in script.split_whitespace() {
            if !self.step(token) {
                return false;
            }
        }
        true
    }

    // Exactly one truthy value left on the stack counts as success
    fn succeeded(&self) -> bool {
        self.stack.len() == 1 && self.stack[0] == TRUE
    }

    fn step(&mut self, token: &str) -> bool {
        match token {
            OP_DUP => match self.stack.last().cloned() {
                Some(top) => {
                    self.stack.push(top);
                    true
                }
                None => false,
            },
            OP_EQUAL => match (self.stack.pop(), self.stack.pop()) {
                (Some(a), Some(b)) => {
                    self.stack.push(if a == b { TRUE } else { FALSE }.to_string());
                    true
                }
                _ => false,
            },
            OP_EQUALVERIFY => match (self.stack.pop(), self.stack.pop()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            OP_CHECKSIG => self.check_signature(),
            unknown if unknown.starts_with("OP_") => {
                error!("Unknown opcode in script: {unknown}");
                false
            }
            // Anything else is a data push
            data => {
                self.stack.push(data.to_string());
                true
            }
        }
    }

    // Pops a base58 public key and a hex signature, verifies the signature
    // over the machine's message, and pushes the outcome
    fn check_signature(&mut self) -> bool {
        let (public_key, signature) = match (self.stack.pop(), self.stack.pop()) {
            (Some(k), Some(s)) => (k, s),
            _ => return false,
        };

        let public_key_bytes = match base58_decode(&public_key) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let signature_bytes = match hex_decode(&signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let ok = ecdsa_p256_sha256_sign_verify(&public_key_bytes, &signature_bytes, self.message);
        self.stack
            .push(if ok { TRUE } else { FALSE }.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{
        base58_encode, ecdsa_p256_sha256_sign_digest, hex_encode, new_key_pair,
        public_key_from_pkcs8,
    };

    fn signed_pair(message: &[u8]) -> (String, String) {
        let pkcs8 = new_key_pair().unwrap();
        let public_key = base58_encode(&public_key_from_pkcs8(&pkcs8).unwrap());
        let signature = hex_encode(&ecdsa_p256_sha256_sign_digest(&pkcs8, message).unwrap());
        (public_key, signature)
    }

    #[test]
    fn test_standard_scripts_unlock() {
        let message = b"referenced-transaction-id";
        let (public_key, signature) = signed_pair(message);

        let locking = standard_locking_script(&public_key);
        let unlocking = standard_unlocking_script(&signature);
        assert!(evaluate(&unlocking, &locking, message));
    }

    #[test]
    fn test_wrong_key_fails() {
        let message = b"referenced-transaction-id";
        let (_, signature) = signed_pair(message);
        let (other_key, _) = signed_pair(message);

        let locking = standard_locking_script(&other_key);
        assert!(!evaluate(&standard_unlocking_script(&signature), &locking, message));
    }

    #[test]
    fn test_wrong_message_fails() {
        let (public_key, signature) = signed_pair(b"transaction-a");
        let locking = standard_locking_script(&public_key);
        assert!(!evaluate(
            &standard_unlocking_script(&signature),
            &locking,
            b"transaction-b"
        ));
    }

    #[test]
    fn test_unknown_opcode_fails_closed() {
        assert!(!evaluate("data", "OP_SPLICE", b"m"));
    }

    #[test]
    fn test_empty_scripts_fail() {
        assert!(!evaluate("", "", b"m"));
    }

    #[test]
    fn test_equalverify_gates_execution() {
        assert!(evaluate("abc abc", "OP_EQUALVERIFY 1", b"m"));
        assert!(!evaluate("abc abd", "OP_EQUALVERIFY 1", b"m"));
    }

    #[test]
    fn test_dup_equal() {
        assert!(evaluate("x", "OP_DUP OP_EQUAL", b"m"));
    }

    #[test]
    fn test_leftover_stack_is_not_success() {
        // Two values remain, so the run must not count as success
        assert!(!evaluate("1 1", "", b"m"));
    }

    #[test]
    fn test_garbage_signature_text_fails() {
        let (public_key, _) = signed_pair(b"m");
        let locking = standard_locking_script(&public_key);
        assert!(!evaluate("zz-not-hex", &locking, b"m"));
    }
}
