//! Vault module for vault-cert-sync
//!
//! This module implements the secret-store side of reconciliation: AppRole
//! login, generic `read`/`write` against the Vault HTTP API, and certificate
//! retrieval with per-pass memoization.
//!
//! ## Testing strategy:
//! - Each module contains its own unit tests within a `#[cfg(test)] mod tests` block
//! - HTTP behaviour is exercised against `wiremock` servers
//! - Integration tests in the `tests/` directory run against a Vault dev container

pub mod auth;
pub mod certs;
pub mod client;
pub mod common;
pub mod error;

// Re-export key types for convenience
pub use certs::{CertMaterial, CertificateFetcher};
pub use client::VaultClient;
pub use error::VaultError;

use std::fmt;
use std::time::Duration;

/// Credentials for AppRole authentication.
#[derive(Clone, PartialEq)]
pub struct AppRoleCredentials {
    /// The role_id for AppRole authentication.
    pub role_id: String,
    /// The secret_id for AppRole authentication.
    pub secret_id: String,
}

impl fmt::Debug for AppRoleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRoleCredentials")
            .field("role_id", &self.role_id)
            .field("secret_id", &"<redacted>")
            .finish()
    }
}

/// A short-lived Vault client token.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultToken(String);

impl VaultToken {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VaultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultToken(<redacted>)")
    }
}

/// Vault configuration.
#[derive(Clone, PartialEq)]
pub struct VaultConfig {
    /// Vault API URL, e.g., "http://127.0.0.1:8200".
    pub url: String,
    /// AppRole credentials exchanged for a token at the start of every pass.
    pub approle: Option<AppRoleCredentials>,
    /// Static token. When set, login is skipped entirely.
    pub token: Option<String>,
    /// Mount of the certificate backend (`/v1/<mount>/cert/<domains>`).
    pub cert_mount: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How many times a 502 from Vault is retried.
    pub max_retries: u32,
    /// Delay between 502 retries.
    pub retry_delay: Duration,
}

impl VaultConfig {
    /// Create a new Vault config
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    /// Set AppRole credentials
    pub fn with_approle(mut self, role_id: &str, secret_id: &str) -> Self {
        self.approle = Some(AppRoleCredentials {
            role_id: role_id.to_string(),
            secret_id: secret_id.to_string(),
        });
        self
    }

    /// Set a static token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set the certificate backend mount
    pub fn with_cert_mount(mut self, mount: &str) -> Self {
        self.cert_mount = mount.trim_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("url", &self.url)
            .field("approle", &self.approle)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("cert_mount", &self.cert_mount)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

// Default configuration
impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8200".to_string(),
            approle: None,
            token: None,
            cert_mount: "certs".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 10,
            retry_delay: Duration::from_secs(5),
        }
    }
}
