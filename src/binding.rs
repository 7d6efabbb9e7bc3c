//! Certificate bindings and where they come from.
//!
//! A binding ties a set of domain names to a destination. Bindings are read
//! fresh at the start of every pass, validated once at ingestion and
//! immutable afterwards; invalid entries are skipped with a warning so one
//! bad declaration does not block the rest.

use crate::error::CertSyncError;
use crate::kubectl::Kubectl;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Normalized set of hostnames covered by one certificate: trimmed,
/// lowercased, sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainSet(Vec<String>);

impl DomainSet {
    pub fn new<I, S>(domains: I) -> Result<Self, CertSyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for domain in domains {
            let domain = domain.as_ref().trim().to_ascii_lowercase();
            validate_domain(&domain)?;
            normalized.push(domain);
        }
        if normalized.is_empty() {
            return Err(CertSyncError::Bindings(
                "a binding needs at least one domain".to_string(),
            ));
        }
        normalized.sort();
        normalized.dedup();
        Ok(Self(normalized))
    }

    /// Cache and URL key: the normalized domains joined by commas.
    pub fn key(&self) -> String {
        self.0.join(",")
    }

    pub fn domains(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for DomainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn validate_domain(domain: &str) -> Result<(), CertSyncError> {
    let invalid = |reason: &str| {
        Err(CertSyncError::Bindings(format!(
            "invalid domain {:?}: {}",
            domain, reason
        )))
    };
    if domain.is_empty() {
        return invalid("empty");
    }
    if domain.contains(|c: char| c.is_whitespace() || c == ',' || c == '/') {
        return invalid("contains whitespace, ',' or '/'");
    }
    let host = domain.strip_prefix("*.").unwrap_or(domain);
    if host.is_empty() || host.contains('*') {
        return invalid("wildcards are only allowed as a leading '*.' label");
    }
    if host.split('.').any(str::is_empty) {
        return invalid("empty label");
    }
    Ok(())
}

/// Where a binding's certificate is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A `kubernetes.io/tls` secret.
    ClusterSecret { name: String, namespace: String },
    /// A directory maintained with the `..data` symlink layout.
    Files { dir: PathBuf },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::ClusterSecret { name, namespace } => {
                write!(f, "secret {}/{}", namespace, name)
            }
            Destination::Files { dir } => write!(f, "directory {}", dir.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertBinding {
    pub name: String,
    pub domains: DomainSet,
    pub destination: Destination,
}

/// Reference to a cluster secret as written in a bindings file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretRef {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

/// A binding as declared, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBinding {
    #[serde(default)]
    pub name: Option<String>,
    pub domains: Vec<String>,
    #[serde(default)]
    pub secret: Option<SecretRef>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl RawBinding {
    /// Validates the declaration. `default_dir` is the destination for
    /// bindings that name neither a secret nor a directory.
    pub fn validate(self, default_dir: Option<&Path>) -> Result<CertBinding, CertSyncError> {
        let domains = DomainSet::new(&self.domains)?;
        let destination = match (self.secret, self.directory, default_dir) {
            (Some(_), Some(_), _) => {
                return Err(CertSyncError::Bindings(format!(
                    "binding for {} names both a secret and a directory",
                    domains
                )))
            }
            (Some(secret), None, _) => {
                if secret.name.trim().is_empty() || secret.namespace.trim().is_empty() {
                    return Err(CertSyncError::Bindings(format!(
                        "binding for {} has an empty secret name or namespace",
                        domains
                    )));
                }
                Destination::ClusterSecret {
                    name: secret.name,
                    namespace: secret.namespace,
                }
            }
            (None, Some(dir), _) => Destination::Files { dir },
            (None, None, Some(dir)) => Destination::Files {
                dir: dir.to_path_buf(),
            },
            (None, None, None) => {
                return Err(CertSyncError::Bindings(format!(
                    "binding for {} has no destination and no default certificate directory is configured",
                    domains
                )))
            }
        };
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| destination.to_string());
        Ok(CertBinding {
            name,
            domains,
            destination,
        })
    }
}

/// Validates raw bindings, dropping invalid ones and any later binding that
/// targets a destination already claimed by an earlier one.
pub fn ingest(raw: Vec<RawBinding>, default_dir: Option<&Path>) -> Vec<CertBinding> {
    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(raw.len());
    for entry in raw {
        match entry.validate(default_dir) {
            Ok(binding) => {
                if !seen.insert(binding.destination.clone()) {
                    warn!(
                        "Skipping binding {}: {} is already bound",
                        binding.name, binding.destination
                    );
                    continue;
                }
                bindings.push(binding);
            }
            Err(e) => warn!("Skipping invalid binding: {}", e),
        }
    }
    debug!("Ingested {} bindings", bindings.len());
    bindings
}

#[async_trait]
pub trait BindingSource: Send + Sync {
    async fn load(&self) -> Result<Vec<CertBinding>, CertSyncError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingFile {
    #[serde(default)]
    bindings: Vec<RawBinding>,
}

/// Bindings declared in a YAML (or JSON) file.
pub struct FileBindingSource {
    path: PathBuf,
    default_dir: Option<PathBuf>,
}

impl FileBindingSource {
    pub fn new(path: PathBuf, default_dir: Option<PathBuf>) -> Self {
        Self { path, default_dir }
    }
}

#[async_trait]
impl BindingSource for FileBindingSource {
    async fn load(&self) -> Result<Vec<CertBinding>, CertSyncError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CertSyncError::Bindings(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let file: BindingFile = serde_yaml::from_str(&contents).map_err(|e| {
            CertSyncError::Bindings(format!("cannot parse {}: {}", self.path.display(), e))
        })?;
        Ok(ingest(file.bindings, self.default_dir.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BindingResource {
    metadata: ObjectMeta,
    spec: BindingSpec,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BindingSpec {
    #[serde(default)]
    domains: Vec<String>,
    #[serde(default)]
    secret_name: Option<String>,
}

impl From<BindingResource> for RawBinding {
    fn from(resource: BindingResource) -> Self {
        let namespace = resource
            .metadata
            .namespace
            .unwrap_or_else(default_namespace);
        let secret_name = resource
            .spec
            .secret_name
            .unwrap_or_else(|| resource.metadata.name.clone());
        RawBinding {
            name: Some(format!("{}/{}", namespace, resource.metadata.name)),
            domains: resource.spec.domains,
            secret: Some(SecretRef {
                name: secret_name,
                namespace,
            }),
            directory: None,
        }
    }
}

/// Bindings declared as custom resources, listed across all namespaces.
pub struct ClusterBindingSource {
    kubectl: Kubectl,
    resource: String,
}

impl ClusterBindingSource {
    pub fn new(kubectl: Kubectl, resource: &str) -> Self {
        Self {
            kubectl,
            resource: resource.to_string(),
        }
    }
}

#[async_trait]
impl BindingSource for ClusterBindingSource {
    async fn load(&self) -> Result<Vec<CertBinding>, CertSyncError> {
        let output = self
            .kubectl
            .run(&["get", &self.resource, "--all-namespaces", "-o", "json"], None)
            .await
            .map_err(|e| CertSyncError::Bindings(format!("cannot run kubectl: {}", e)))?;
        if !output.success {
            return Err(CertSyncError::Bindings(format!(
                "listing {} failed: {}",
                self.resource,
                output.stderr.trim()
            )));
        }
        let list: ResourceList = serde_json::from_str(&output.stdout).map_err(|e| {
            CertSyncError::Bindings(format!("cannot parse {} list: {}", self.resource, e))
        })?;
        let raw = list
            .items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<BindingResource>(item) {
                Ok(resource) => Some(RawBinding::from(resource)),
                Err(e) => {
                    warn!("Skipping malformed {} resource: {}", self.resource, e);
                    None
                }
            })
            .collect();
        Ok(ingest(raw, None))
    }
}
