//! Kubernetes TLS secrets as a target, driven through `kubectl`.

use crate::binding::Destination;
use crate::error::CertSyncError;
use crate::kubectl::{is_already_exists, is_not_found, CommandOutput, Kubectl};
use crate::target::{unsupported, TargetStore};
use crate::vault::CertMaterial;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY: &str = "tls.key";
pub const MANAGED_BY: &str = "vault-cert-sync";

#[derive(Debug, Deserialize)]
struct SecretObject {
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

pub struct ClusterSecretStore {
    kubectl: Kubectl,
}

impl ClusterSecretStore {
    pub fn new(kubectl: Kubectl) -> Self {
        Self { kubectl }
    }

    fn secret_ref(destination: &Destination) -> Result<(&str, &str), CertSyncError> {
        match destination {
            Destination::ClusterSecret { name, namespace } => Ok((name.as_str(), namespace.as_str())),
            other => Err(unsupported(other)),
        }
    }

    fn encoded_data(material: &CertMaterial) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        data.insert(TLS_CERT_KEY.to_string(), STANDARD.encode(&material.cert).into());
        data.insert(TLS_PRIVATE_KEY.to_string(), STANDARD.encode(&material.key).into());
        serde_json::Value::Object(data)
    }

    async fn write(
        &self,
        destination: &Destination,
        args: &[&str],
        payload: &serde_json::Value,
    ) -> Result<CommandOutput, CertSyncError> {
        self.kubectl
            .run(args, Some(&payload.to_string()))
            .await
            .map_err(|e| write_error(destination, e.to_string()))
    }
}

fn read_error(destination: &Destination, message: String) -> CertSyncError {
    CertSyncError::TargetRead {
        destination: destination.to_string(),
        message,
    }
}

fn write_error(destination: &Destination, message: String) -> CertSyncError {
    CertSyncError::TargetWrite {
        destination: destination.to_string(),
        message,
    }
}

fn decode_field(
    destination: &Destination,
    data: &BTreeMap<String, String>,
    field: &str,
) -> Result<String, CertSyncError> {
    let Some(encoded) = data.get(field) else {
        return Ok(String::new());
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| read_error(destination, format!("{} is not valid base64: {}", field, e)))?;
    String::from_utf8(bytes)
        .map_err(|e| read_error(destination, format!("{} is not UTF-8: {}", field, e)))
}

#[async_trait]
impl TargetStore for ClusterSecretStore {
    async fn read(&self, destination: &Destination) -> Result<Option<CertMaterial>, CertSyncError> {
        let (name, namespace) = Self::secret_ref(destination)?;
        let output = self
            .kubectl
            .run(&["get", "secret", name, "-n", namespace, "-o", "json"], None)
            .await
            .map_err(|e| read_error(destination, e.to_string()))?;

        if !output.success {
            if is_not_found(&output.stderr) {
                debug!("{} does not exist yet", destination);
                return Ok(None);
            }
            return Err(read_error(destination, output.stderr.trim().to_string()));
        }

        let secret: SecretObject = serde_json::from_str(&output.stdout)
            .map_err(|e| read_error(destination, format!("unexpected kubectl output: {}", e)))?;
        let data = secret.data.unwrap_or_default();
        Ok(Some(CertMaterial {
            cert: decode_field(destination, &data, TLS_CERT_KEY)?,
            key: decode_field(destination, &data, TLS_PRIVATE_KEY)?,
        }))
    }

    async fn create(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError> {
        let (name, namespace) = Self::secret_ref(destination)?;
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "type": "kubernetes.io/tls",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": {"app.kubernetes.io/managed-by": MANAGED_BY},
            },
            "data": Self::encoded_data(material),
        });
        let output = self.write(destination, &["create", "-f", "-"], &manifest).await?;

        if !output.success {
            if is_already_exists(&output.stderr) {
                info!("{} already exists, leaving it for the next pass", destination);
                return Ok(());
            }
            return Err(write_error(destination, output.stderr.trim().to_string()));
        }
        info!("Created {}", destination);
        Ok(())
    }

    async fn patch(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError> {
        let (name, namespace) = Self::secret_ref(destination)?;
        let patch = json!({ "data": Self::encoded_data(material) });
        // The patch carries the private key, so it goes through stdin rather
        // than the command line.
        let output = self
            .write(
                destination,
                &[
                    "patch",
                    "secret",
                    name,
                    "-n",
                    namespace,
                    "--type",
                    "merge",
                    "--patch-file",
                    "/dev/stdin",
                ],
                &patch,
            )
            .await?;

        if !output.success {
            return Err(write_error(destination, output.stderr.trim().to_string()));
        }
        info!("Patched {}", destination);
        Ok(())
    }
}
