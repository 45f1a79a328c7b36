//! Error types for Glint
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use thiserror::Error;

/// Main error type for Glint operations
#[derive(Error, Debug)]
pub enum GlintError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown cipher method in the configuration
    #[error("Unsupported encryption method: {0}")]
    UnsupportedCipher(String),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks(#[from] SocksError),

    /// The encrypted upstream could not be reached after bounded retries
    #[error("still failed to connect to {dest} after {attempts} attempts")]
    DialFailed {
        /// Destination the dial was ultimately for
        dest: String,
        /// Number of TCP connect attempts made
        attempts: u32,
    },
}

/// SOCKS5 and address-preamble protocol errors
#[derive(Error, Debug)]
pub enum SocksError {
    /// Client sent a SOCKS version other than 5
    #[error("socks version not supported: {0}")]
    Version(u8),

    /// Client sent bytes beyond the declared method list
    #[error("socks authentication get extra data")]
    AuthExtraData,

    /// Client sent bytes beyond the declared request length
    #[error("socks request get extra data")]
    RequestExtraData,

    /// SOCKS command other than CONNECT
    #[error("socks command not supported: {0}")]
    CommandNotSupported(u8),

    /// Unknown address-type byte, on either side of the tunnel
    #[error("socks addr type not supported: {0}")]
    AddrType(u8),

    /// Decoded domain name contains a NUL byte
    #[error("invalid domain name")]
    InvalidHost,
}

impl From<SocksError> for io::Error {
    fn from(err: SocksError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks_error_display() {
        let err = SocksError::Version(4);
        assert_eq!(format!("{}", err), "socks version not supported: 4");

        let err = SocksError::AuthExtraData;
        assert_eq!(format!("{}", err), "socks authentication get extra data");

        let err = SocksError::RequestExtraData;
        assert_eq!(format!("{}", err), "socks request get extra data");

        let err = SocksError::CommandNotSupported(2);
        assert_eq!(format!("{}", err), "socks command not supported: 2");

        let err = SocksError::AddrType(0x99);
        assert_eq!(format!("{}", err), "socks addr type not supported: 153");

        let err = SocksError::InvalidHost;
        assert_eq!(format!("{}", err), "invalid domain name");
    }

    #[test]
    fn test_glint_error_display() {
        let err = GlintError::Config("missing password".to_string());
        assert_eq!(format!("{}", err), "Configuration error: missing password");

        let err = GlintError::UnsupportedCipher("rc4".to_string());
        assert_eq!(format!("{}", err), "Unsupported encryption method: rc4");

        let err = GlintError::DialFailed {
            dest: "example.com:443".to_string(),
            attempts: 3,
        };
        assert_eq!(
            format!("{}", err),
            "still failed to connect to example.com:443 after 3 attempts"
        );
    }

    #[test]
    fn test_glint_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "io error");
        let err: GlintError = io_err.into();
        assert!(matches!(err, GlintError::Io(_)));
    }

    #[test]
    fn test_glint_error_from_socks() {
        let err: GlintError = SocksError::AuthExtraData.into();
        assert!(matches!(err, GlintError::Socks(_)));
    }

    #[test]
    fn test_socks_error_into_io_error() {
        let io_err: io::Error = SocksError::InvalidHost.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
    }
}
