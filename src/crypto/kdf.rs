//! Password-to-key derivation
//!
//! The classic OpenSSL `EVP_BytesToKey` construction with MD5 and no salt:
//! `D1 = MD5(password)`, `Di = MD5(D(i-1) || password)`, concatenated until
//! the requested length is covered, then truncated. Both agents must derive
//! the identical key byte-for-byte, so this has no parameters beyond the
//! password and the target length.

use md5::{Digest, Md5};

/// Derive `key_len` bytes of key material from `password`.
pub fn derive_key(password: &str, key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len);
    let mut prev: Vec<u8> = Vec::new();
    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password.as_bytes());
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }
    key.truncate(key_len);
    key
}
