//! vault-cert-sync - keeps deployed TLS certificates in line with Vault
//!
//! Each pass logs in to Vault once, fetches the certificate for every
//! binding's domain set (once per distinct set), and compares its SHA-256
//! fingerprint with what the destination currently holds. Only destinations
//! that drifted are written.
//!
//! ## Layout
//!
//! - `vault` module - Vault HTTP client, AppRole login, per-pass fetcher
//! - `interface` module - the `SecretStore` seam the reconciler is written against
//! - `binding` module - validated bindings and where they are loaded from
//! - `fingerprint` module - certificate parsing and comparison
//! - `target` module - Kubernetes secrets (via kubectl) and atomic certificate directories
//! - `reconcile` module - the pass itself and the interval loop
//! - `config` / `cli` modules - configuration from flags and environment

pub mod binding;
pub mod cli;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod interface;
pub mod kubectl;
pub mod reconcile;
pub mod target;
pub mod vault;

#[cfg(test)]
mod test_utils;

pub use binding::{BindingSource, CertBinding, Destination, DomainSet};
pub use config::CertSyncConfig;
pub use error::CertSyncError;
pub use interface::SecretStore;
pub use reconcile::{ReconcileReport, Reconciler};
pub use target::{TargetStore, Targets};
pub use vault::{CertMaterial, VaultClient, VaultConfig, VaultError};

/// Initialize logging for tests
#[allow(dead_code)]
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}
