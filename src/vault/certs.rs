//! Certificate material and the per-pass certificate fetcher.

use crate::binding::DomainSet;
use crate::error::CertSyncError;
use crate::interface::SecretStore;
use crate::vault::{VaultError, VaultToken};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const PEM_PREFIX: &str = "-----BEGIN";

/// A PEM certificate (or chain) and its private key.
#[derive(Clone, PartialEq, Eq)]
pub struct CertMaterial {
    pub cert: String,
    pub key: String,
}

impl CertMaterial {
    /// Rejects content that is obviously not PEM (error pages, empty strings).
    pub fn check_pem(&self) -> Result<(), VaultError> {
        for (name, content) in [("cert", &self.cert), ("key", &self.key)] {
            if !content.trim_start().starts_with(PEM_PREFIX) {
                return Err(VaultError::ParseError(format!(
                    "{} does not look like a PEM block",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CertMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertMaterial")
            .field("cert_len", &self.cert.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Fetches certificate material once per domain set for the lifetime of a
/// single pass. Failures are cached as well, so a broken domain set costs one
/// upstream call no matter how many bindings share it.
pub struct CertificateFetcher<'a, S: ?Sized> {
    store: &'a S,
    token: &'a VaultToken,
    cache: HashMap<String, Result<CertMaterial, CertSyncError>>,
    upstream_calls: usize,
}

impl<'a, S: SecretStore + ?Sized> CertificateFetcher<'a, S> {
    pub fn new(store: &'a S, token: &'a VaultToken) -> Self {
        Self {
            store,
            token,
            cache: HashMap::new(),
            upstream_calls: 0,
        }
    }

    pub async fn fetch(&mut self, domains: &DomainSet) -> Result<CertMaterial, CertSyncError> {
        let key = domains.key();
        if let Some(cached) = self.cache.get(&key) {
            debug!("Certificate cache hit for {}", key);
            return cached.clone();
        }

        self.upstream_calls += 1;
        let result = self.store.get_certificate(self.token, domains).await;
        self.cache.insert(key, result.clone());
        result
    }

    /// Number of requests actually sent to the secret store.
    pub fn upstream_calls(&self) -> usize {
        self.upstream_calls
    }
}
