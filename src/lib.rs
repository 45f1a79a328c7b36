//! # Glint - Lightweight Encrypted SOCKS5 Tunnel
//!
//! Glint relays arbitrary TCP byte streams between a local SOCKS5 endpoint
//! and any destination reachable from a remote host, encrypting the hop
//! between the two agents with an AES-CFB stream cipher keyed from a shared
//! password.
//!
//! ## Components
//!
//! - **`glint-local`**: accepts SOCKS5 CONNECT requests on `127.0.0.1` and
//!   forwards them over the encrypted channel
//! - **`glint-remote`**: decodes the forwarded target address and dials the
//!   final destination
//!
//! ## Usage
//!
//! ```rust,ignore
//! use glint::config::load_config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.json")?;
//!     config.validate_local()?;
//!     glint::local::run(config).await
//! }
//! ```
//!
//! ## Wire format
//!
//! ```text
//! Client ──SOCKS5── glint-local ══AES-CFB══ glint-remote ──TCP── Target
//! ```
//!
//! Each direction of the encrypted hop starts with a fresh random IV; the
//! local-to-remote plaintext begins with the raw SOCKS address preamble
//! (`ATYP || address || port`), followed by the client's payload bytes.
//! The stream cipher carries no authentication tag; integrity is out of
//! scope for this protocol family.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod addr;
pub mod config;
pub mod crypto;
pub mod error;
pub mod framed;
pub mod local;
pub mod pool;
pub mod relay;
pub mod remote;
pub mod socks;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use crypto::CipherTemplate;
pub use error::{GlintError, SocksError};
pub use framed::EncryptedStream;

/// Version of the Glint library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "glint");
    }
}
