//! Utility functions and helpers
//!
//! This module contains cryptographic utilities, encoding functions,
//! and other helper functions used throughout the ledger.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, hash_base58, hex_decode, hex_encode, new_key_pair,
    public_key_from_pkcs8, sha256_digest,
};

pub use serialization::{deserialize, serialize};
