//! Common helper functions for Vault responses.

use crate::vault::VaultError;
use reqwest::{Response, StatusCode};
use serde_json::Value;

/// Checks the HTTP response from Vault. If successful, returns the JSON body;
/// otherwise returns the status code together with Vault's first error
/// message, or the raw body when Vault did not send a structured error.
pub async fn check_response(resp: Response) -> Result<Value, VaultError> {
    let status = resp.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return Ok(serde_json::json!({}));
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(serde_json::json!({}));
        }
        serde_json::from_str(&body)
            .map_err(|e| VaultError::ParseError(format!("Failed to parse response: {}", e)))
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(VaultError::HttpStatus(status.as_u16(), error_message(&body)))
    }
}

/// Pulls `errors[0]` out of a Vault error body, falling back to the body itself.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|val| {
            val.get("errors")
                .and_then(|v| v.as_array())
                .and_then(|errors| errors.first())
                .and_then(|msg| msg.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Walks a dotted path (`auth.client_token`) through a JSON value and
/// returns the string found there.
pub fn string_field(value: &Value, path: &str) -> Result<String, VaultError> {
    path.split('.')
        .try_fold(value, |current, key| current.get(key))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| VaultError::MissingField(path.to_string()))
}
