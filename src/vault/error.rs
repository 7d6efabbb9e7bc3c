#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("HTTP status {0}: {1}")]
    HttpStatus(u16, String),

    #[error("Missing field in Vault response: {0}")]
    MissingField(String),

    #[error("No Vault credentials configured (need a token or an AppRole role_id/secret_id)")]
    NoCredentials,

    #[error("Error from reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl VaultError {
    /// Upstream HTTP status, when the failure came from a Vault response.
    pub fn status(&self) -> Option<u16> {
        match self {
            VaultError::HttpStatus(code, _) => Some(*code),
            VaultError::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The most useful human-readable detail: the response body for HTTP
    /// failures, the display form otherwise.
    pub fn detail(&self) -> String {
        match self {
            VaultError::HttpStatus(_, body) => body.clone(),
            other => other.to_string(),
        }
    }
}
