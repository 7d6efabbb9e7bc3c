//! Runtime configuration, assembled once by the CLI and handed down.

use crate::binding::{BindingSource, ClusterBindingSource, FileBindingSource};
use crate::error::CertSyncError;
use crate::kubectl::{Kubectl, KubectlConfig};
use crate::target::{ClusterSecretStore, FileTargetStore, Targets};
use crate::vault::{VaultClient, VaultConfig};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
pub const DEFAULT_BINDING_RESOURCE: &str = "certbindings";

/// Where the list of bindings comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSourceConfig {
    File(PathBuf),
    Cluster { resource: String },
}

#[derive(Debug, Clone)]
pub struct CertSyncConfig {
    pub vault: VaultConfig,
    /// Directory for bindings that name no destination of their own.
    pub cert_dir: Option<PathBuf>,
    pub interval: Duration,
    pub bindings: BindingSourceConfig,
    pub kubectl: KubectlConfig,
}

impl CertSyncConfig {
    pub fn vault_client(&self) -> Result<VaultClient, CertSyncError> {
        VaultClient::new(self.vault.clone())
            .map_err(|e| CertSyncError::Config(format!("cannot build Vault client: {}", e)))
    }

    pub fn binding_source(&self) -> Box<dyn BindingSource> {
        match &self.bindings {
            BindingSourceConfig::File(path) => {
                Box::new(FileBindingSource::new(path.clone(), self.cert_dir.clone()))
            }
            BindingSourceConfig::Cluster { resource } => Box::new(ClusterBindingSource::new(
                Kubectl::new(self.kubectl.clone()),
                resource,
            )),
        }
    }

    /// Both target kinds are always available; a binding picks one by its
    /// destination.
    pub fn targets(&self) -> Targets {
        Targets::new()
            .with_cluster(ClusterSecretStore::new(Kubectl::new(self.kubectl.clone())))
            .with_files(FileTargetStore)
    }
}

/// Parses `12h`, `30m`, `90s`, `2d` or a bare number of seconds.
pub fn parse_interval(value: &str) -> Result<Duration, CertSyncError> {
    let value = value.trim();
    let invalid = || CertSyncError::Config(format!("invalid interval '{}'", value));

    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    if amount == 0 {
        return Err(invalid());
    }
    amount
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
