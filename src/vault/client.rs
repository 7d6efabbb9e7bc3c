//! Client implementation for Vault API interactions.
//!
//! This module provides a client for making HTTP requests to the Vault API
//! with token authentication, a per-request timeout and the bounded 502
//! retry Vault needs when a third-party backend is slow.

use crate::binding::DomainSet;
use crate::vault::auth::approle_login;
use crate::vault::common::{check_response, string_field};
use crate::vault::{CertMaterial, VaultConfig, VaultError, VaultToken};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Client for interacting with the Vault HTTP API.
pub struct VaultClient {
    /// Base URL of the Vault server, without a trailing slash
    pub addr: String,
    config: VaultConfig,
    /// HTTP client for making requests
    client: Client,
}

impl VaultClient {
    /// Creates a new VaultClient from an explicit configuration.
    pub fn new(config: VaultConfig) -> Result<Self, VaultError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VaultError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            addr: config.url.trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Obtains a token: the static one if configured, otherwise via AppRole.
    pub async fn login(&self) -> Result<VaultToken, VaultError> {
        if let Some(token) = self.config.token.as_deref().filter(|t| !t.is_empty()) {
            debug!("Using static Vault token");
            return Ok(VaultToken::new(token));
        }
        match &self.config.approle {
            Some(creds) => approle_login(&self.client, &self.addr, creds).await,
            None => Err(VaultError::NoCredentials),
        }
    }

    /// Reads `path` (relative to `/v1/`) and returns its `data` object.
    pub async fn read(&self, token: &VaultToken, path: &str) -> Result<Value, VaultError> {
        let body = self.request(Method::GET, token, path, None).await?;
        body.get("data")
            .cloned()
            .ok_or_else(|| VaultError::MissingField("data".to_string()))
    }

    /// Writes `data` to `path` (relative to `/v1/`) and returns the response body.
    pub async fn write(
        &self,
        token: &VaultToken,
        path: &str,
        data: Value,
    ) -> Result<Value, VaultError> {
        self.request(Method::POST, token, path, Some(data)).await
    }

    /// Requests the certificate/key pair covering `domains`.
    pub async fn get_certificate(
        &self,
        token: &VaultToken,
        domains: &DomainSet,
    ) -> Result<CertMaterial, VaultError> {
        let path = format!("{}/cert/{}", self.config.cert_mount, domains.key());
        let data = self.read(token, &path).await?;
        let material = CertMaterial {
            cert: string_field(&data, "cert")?,
            key: string_field(&data, "key")?,
        };
        material.check_pem()?;
        Ok(material)
    }

    /// Makes a request to the Vault API, retrying 502 responses up to the
    /// configured limit.
    async fn request(
        &self,
        method: Method,
        token: &VaultToken,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, VaultError> {
        let url = format!("{}/v1/{}", self.addr, path.trim_start_matches('/'));
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X-Vault-Token", token.as_str());
            if let Some(json_body) = &body {
                request = request.json(json_body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| VaultError::Connection(format!("Request to {} failed: {}", url, e)))?;

            if response.status() == StatusCode::BAD_GATEWAY && attempt < self.config.max_retries {
                attempt += 1;
                warn!(
                    "Vault returned 502 for {} {}, retrying ({}/{})",
                    method, path, attempt, self.config.max_retries
                );
                sleep(self.config.retry_delay).await;
                continue;
            }

            debug!("{} {} -> {}", method, path, response.status());
            return check_response(response).await;
        }
    }
}
