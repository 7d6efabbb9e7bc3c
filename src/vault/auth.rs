//! AppRole login against Vault.

use crate::vault::common::{check_response, string_field};
use crate::vault::{AppRoleCredentials, VaultError, VaultToken};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

/// Exchanges an AppRole role_id/secret_id pair for a client token.
pub async fn approle_login(
    client: &Client,
    addr: &str,
    creds: &AppRoleCredentials,
) -> Result<VaultToken, VaultError> {
    let url = format!("{}/v1/auth/approle/login", addr);
    debug!("Logging in to Vault at {} with role_id {}", addr, creds.role_id);
    let payload = json!({
        "role_id": creds.role_id,
        "secret_id": creds.secret_id,
    });
    let resp = client
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| VaultError::Connection(format!("Login request failed: {}", e)))?;
    let json_resp = check_response(resp).await?;
    let token = string_field(&json_resp, "auth.client_token")?;
    if token.is_empty() {
        return Err(VaultError::MissingField("auth.client_token".to_string()));
    }
    Ok(VaultToken::new(token))
}
