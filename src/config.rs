//! Configuration module for Glint
//!
//! Both agents share one JSON configuration shape. Unknown fields are
//! ignored; `method` is lowercased after parse.

use crate::error::GlintError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_method() -> String {
    "aes-256-cfb".to_string()
}

fn default_timeout() -> u64 {
    15
}

/// Shared configuration for the local and remote agents
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Remote agent host, optionally with an embedded `:port`
    #[serde(default)]
    pub server: String,

    /// Remote agent port, used only when `server` carries no port
    #[serde(default)]
    pub server_port: u16,

    /// Local SOCKS5 listener port (local agent only)
    #[serde(default)]
    pub local_port: u16,

    /// Shared password the stream cipher key is derived from
    #[serde(default)]
    pub password: String,

    /// Cipher method identifier
    #[serde(default = "default_method")]
    pub method: String,

    /// Read deadline in seconds; 0 disables deadlines
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Config {
    /// Read deadline applied before every read, or `None` when disabled
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// The address of the remote agent as a dialable `host:port` string.
    ///
    /// A port embedded in `server` takes precedence over `server_port`.
    pub fn server_addr(&self) -> String {
        if host_has_port(&self.server) {
            self.server.clone()
        } else {
            format!("{}:{}", self.server, self.server_port)
        }
    }

    /// Validate the fields the local agent requires
    pub fn validate_local(&self) -> Result<(), GlintError> {
        if self.server.is_empty() {
            return Err(GlintError::Config("missing server".to_string()));
        }
        if self.server_port == 0 && !host_has_port(&self.server) {
            return Err(GlintError::Config("missing server_port".to_string()));
        }
        if self.local_port == 0 {
            return Err(GlintError::Config("missing local_port".to_string()));
        }
        if self.password.is_empty() {
            return Err(GlintError::Config("missing password".to_string()));
        }
        Ok(())
    }

    /// Validate the fields the remote agent requires
    pub fn validate_remote(&self) -> Result<(), GlintError> {
        if self.server_port == 0 {
            return Err(GlintError::Config("missing server_port".to_string()));
        }
        if self.password.is_empty() {
            return Err(GlintError::Config("missing password".to_string()));
        }
        Ok(())
    }
}

/// Whether `host` already carries a `:port` suffix.
///
/// Bracketed IPv6 literals (`[::1]:443`) and plain `host:port` forms count;
/// a bare unbracketed IPv6 address does not.
pub(crate) fn host_has_port(host: &str) -> bool {
    if let Some(rest) = host.strip_prefix('[') {
        return rest
            .split_once(']')
            .map(|(_, tail)| tail.starts_with(':') && tail.len() > 1)
            .unwrap_or(false);
    }
    match host.rsplit_once(':') {
        // a second colon means an unbracketed IPv6 literal, not host:port
        Some((head, port)) => !head.contains(':') && !port.is_empty(),
        None => false,
    }
}

/// Load configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, GlintError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(GlintError::Config(format!(
            "config file not exist: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from a JSON string
pub fn parse_config(content: &str) -> Result<Config, GlintError> {
    let mut config: Config = serde_json::from_str(content)
        .map_err(|e| GlintError::Config(format!("parse config err: {}", e)))?;
    config.method = config.method.to_lowercase();
    Ok(config)
}
