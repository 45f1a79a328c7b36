//! Cipher engine for the encrypted hop
//!
//! Supports AES in CFB mode with full-block (128-bit) feedback, operated as
//! a keystream. A [`CipherTemplate`] is derived once from `(method,
//! password)` and shared read-only across connections; each connection gets
//! its own [`CipherSession`] whose two directions are initialized lazily:
//! the encryptor on the first outbound byte (generating the IV it will
//! prepend), the decryptor on the first inbound byte (after the peer's IV
//! has been read).
//!
//! CFB without a MAC is malleable and provides no integrity. That is
//! inherent to this protocol family; adding authentication would break
//! interoperability with existing peers.

mod kdf;

pub use kdf::derive_key;

use crate::error::GlintError;
use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::KeyIvInit;
use cfb_mode::{BufDecryptor, BufEncryptor};
use rand::rngs::OsRng;
use rand::RngCore;

/// IV length in bytes, shared by every supported method
pub const IV_LEN: usize = 16;

/// Supported cipher methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// AES-128 in CFB mode (16-byte key)
    Aes128Cfb,
    /// AES-192 in CFB mode (24-byte key)
    Aes192Cfb,
    /// AES-256 in CFB mode (32-byte key)
    Aes256Cfb,
}

impl Method {
    /// Look up a method by its configuration name, case-insensitively
    pub fn from_name(name: &str) -> Option<Method> {
        match name.to_lowercase().as_str() {
            "aes-128-cfb" => Some(Method::Aes128Cfb),
            "aes-192-cfb" => Some(Method::Aes192Cfb),
            "aes-256-cfb" => Some(Method::Aes256Cfb),
            _ => None,
        }
    }

    /// Key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            Method::Aes128Cfb => 16,
            Method::Aes192Cfb => 24,
            Method::Aes256Cfb => 32,
        }
    }

    /// IV length in bytes
    pub fn iv_len(self) -> usize {
        IV_LEN
    }

    /// Canonical configuration name
    pub fn name(self) -> &'static str {
        match self {
            Method::Aes128Cfb => "aes-128-cfb",
            Method::Aes192Cfb => "aes-192-cfb",
            Method::Aes256Cfb => "aes-256-cfb",
        }
    }
}

enum CfbEnc {
    Aes128(BufEncryptor<Aes128>),
    Aes192(BufEncryptor<Aes192>),
    Aes256(BufEncryptor<Aes256>),
}

enum CfbDec {
    Aes128(BufDecryptor<Aes128>),
    Aes192(BufDecryptor<Aes192>),
    Aes256(BufDecryptor<Aes256>),
}

fn new_encryptor(method: Method, key: &[u8], iv: &[u8]) -> CfbEnc {
    // key and iv lengths are fixed by the method table
    match method {
        Method::Aes128Cfb => {
            CfbEnc::Aes128(BufEncryptor::new_from_slices(key, iv).expect("aes-128 key/iv length"))
        }
        Method::Aes192Cfb => {
            CfbEnc::Aes192(BufEncryptor::new_from_slices(key, iv).expect("aes-192 key/iv length"))
        }
        Method::Aes256Cfb => {
            CfbEnc::Aes256(BufEncryptor::new_from_slices(key, iv).expect("aes-256 key/iv length"))
        }
    }
}

fn new_decryptor(method: Method, key: &[u8], iv: &[u8]) -> CfbDec {
    match method {
        Method::Aes128Cfb => {
            CfbDec::Aes128(BufDecryptor::new_from_slices(key, iv).expect("aes-128 key/iv length"))
        }
        Method::Aes192Cfb => {
            CfbDec::Aes192(BufDecryptor::new_from_slices(key, iv).expect("aes-192 key/iv length"))
        }
        Method::Aes256Cfb => {
            CfbDec::Aes256(BufDecryptor::new_from_slices(key, iv).expect("aes-256 key/iv length"))
        }
    }
}

/// Frozen `(method, key)` pair shared by every connection.
///
/// The template never encrypts or decrypts itself; call [`session`] to get
/// per-connection stream state.
///
/// [`session`]: CipherTemplate::session
#[derive(Clone)]
pub struct CipherTemplate {
    method: Method,
    key: Vec<u8>,
}

impl CipherTemplate {
    /// Derive a template from a method name and password.
    ///
    /// Fails on an unknown method or an empty password; both are fatal at
    /// startup.
    pub fn new(method: &str, password: &str) -> Result<Self, GlintError> {
        if password.is_empty() {
            return Err(GlintError::Config("empty password".to_string()));
        }
        let method = Method::from_name(method)
            .ok_or_else(|| GlintError::UnsupportedCipher(method.to_string()))?;
        let key = kdf::derive_key(password, method.key_len());
        Ok(CipherTemplate { method, key })
    }

    /// The method this template was built for
    pub fn method(&self) -> Method {
        self.method
    }

    /// Fresh per-connection stream state, both directions uninitialized
    pub fn session(&self) -> CipherSession {
        CipherSession {
            encryptor: StreamEncryptor {
                method: self.method,
                key: self.key.clone(),
                cipher: None,
            },
            decryptor: StreamDecryptor {
                method: self.method,
                key: self.key.clone(),
                cipher: None,
            },
        }
    }
}

impl std::fmt::Debug for CipherTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("CipherTemplate")
            .field("method", &self.method.name())
            .finish_non_exhaustive()
    }
}

/// Per-connection cipher state, one independent stream per direction
#[derive(Debug)]
pub struct CipherSession {
    /// Outbound keystream, initialized on the first write
    pub encryptor: StreamEncryptor,
    /// Inbound keystream, initialized on the first read
    pub decryptor: StreamDecryptor,
}

/// Outbound half of a [`CipherSession`]
pub struct StreamEncryptor {
    method: Method,
    key: Vec<u8>,
    cipher: Option<CfbEnc>,
}

impl std::fmt::Debug for StreamEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("StreamEncryptor")
            .field("method", &self.method.name())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl StreamEncryptor {
    /// Whether the keystream has been seeded with an IV
    pub fn is_started(&self) -> bool {
        self.cipher.is_some()
    }

    /// Seed the keystream with a fresh random IV and return it.
    ///
    /// The returned IV must be transmitted before any ciphertext; it is
    /// generated exactly once per connection direction.
    pub fn start(&mut self) -> [u8; IV_LEN] {
        debug_assert!(self.cipher.is_none(), "encryptor already started");
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        self.cipher = Some(new_encryptor(self.method, &self.key, &iv));
        iv
    }

    #[cfg(test)]
    pub(crate) fn start_with_iv(&mut self, iv: [u8; IV_LEN]) {
        self.cipher = Some(new_encryptor(self.method, &self.key, &iv));
    }

    /// XOR the keystream into `buf` in place, advancing the stream position
    pub fn apply(&mut self, buf: &mut [u8]) {
        match self.cipher.as_mut() {
            Some(CfbEnc::Aes128(c)) => c.encrypt(buf),
            Some(CfbEnc::Aes192(c)) => c.encrypt(buf),
            Some(CfbEnc::Aes256(c)) => c.encrypt(buf),
            None => unreachable!("encryptor used before start"),
        }
    }
}

/// Inbound half of a [`CipherSession`]
pub struct StreamDecryptor {
    method: Method,
    key: Vec<u8>,
    cipher: Option<CfbDec>,
}

impl std::fmt::Debug for StreamDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("StreamDecryptor")
            .field("method", &self.method.name())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl StreamDecryptor {
    /// Whether the keystream has been seeded with the peer's IV
    pub fn is_started(&self) -> bool {
        self.cipher.is_some()
    }

    /// Seed the keystream with the IV received from the peer
    pub fn start(&mut self, iv: &[u8; IV_LEN]) {
        debug_assert!(self.cipher.is_none(), "decryptor already started");
        self.cipher = Some(new_decryptor(self.method, &self.key, iv));
    }

    /// XOR the keystream into `buf` in place, advancing the stream position
    pub fn apply(&mut self, buf: &mut [u8]) {
        match self.cipher.as_mut() {
            Some(CfbDec::Aes128(c)) => c.decrypt(buf),
            Some(CfbDec::Aes192(c)) => c.decrypt(buf),
            Some(CfbDec::Aes256(c)) => c.decrypt(buf),
            None => unreachable!("decryptor used before start"),
        }
    }
}
