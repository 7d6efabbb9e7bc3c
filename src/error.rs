//! Pass-level error taxonomy.
//!
//! Only [`CertSyncError::Auth`], [`CertSyncError::Bindings`] and
//! [`CertSyncError::Config`] abort a reconciliation pass. Everything else is
//! recorded against the binding it happened to and the pass moves on.

#[derive(Debug, Clone, thiserror::Error)]
pub enum CertSyncError {
    #[error("Secret store authentication failed: {0}")]
    Auth(String),

    #[error("Failed to fetch certificate for {domains}{}: {message}", status_suffix(.status))]
    Fetch {
        domains: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Certificate parse error: {0}")]
    Parse(String),

    #[error("Failed to read {destination}: {message}")]
    TargetRead {
        destination: String,
        message: String,
    },

    #[error("Failed to write {destination}: {message}")]
    TargetWrite {
        destination: String,
        message: String,
    },

    #[error("Binding error: {0}")]
    Bindings(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CertSyncError {
    /// Whether this error stops the whole pass rather than a single binding.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CertSyncError::Auth(_) | CertSyncError::Bindings(_) | CertSyncError::Config(_)
        )
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}
