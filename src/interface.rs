use crate::binding::DomainSet;
use crate::error::CertSyncError;
use crate::vault::{CertMaterial, VaultClient, VaultToken};
use async_trait::async_trait;

/// Secret store operations the reconciler depends on
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Exchange the configured credentials for a token. Failure is fatal to the pass.
    async fn login(&self) -> Result<VaultToken, CertSyncError>;

    /// Fetch the certificate/key pair covering `domains`
    async fn get_certificate(
        &self,
        token: &VaultToken,
        domains: &DomainSet,
    ) -> Result<CertMaterial, CertSyncError>;
}

#[async_trait]
impl SecretStore for VaultClient {
    async fn login(&self) -> Result<VaultToken, CertSyncError> {
        VaultClient::login(self)
            .await
            .map_err(|e| CertSyncError::Auth(e.to_string()))
    }

    async fn get_certificate(
        &self,
        token: &VaultToken,
        domains: &DomainSet,
    ) -> Result<CertMaterial, CertSyncError> {
        VaultClient::get_certificate(self, token, domains)
            .await
            .map_err(|e| CertSyncError::Fetch {
                domains: domains.key(),
                status: e.status(),
                message: e.detail(),
            })
    }
}
