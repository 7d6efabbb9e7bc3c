//! Target stores: where certificate material ends up.
//!
//! Every destination supports the same three capabilities. `read` returns
//! `None` when nothing is stored yet; `create` is only called in that case,
//! `patch` replaces existing material.

pub mod cluster;
pub mod filesystem;

pub use cluster::ClusterSecretStore;
pub use filesystem::{AtomicCertDir, FileTargetStore};

use crate::binding::Destination;
use crate::error::CertSyncError;
use crate::vault::CertMaterial;
use async_trait::async_trait;

#[async_trait]
pub trait TargetStore: Send + Sync {
    async fn read(&self, destination: &Destination) -> Result<Option<CertMaterial>, CertSyncError>;

    async fn create(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError>;

    async fn patch(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError>;
}

/// Routes each destination kind to the store that handles it.
#[derive(Default)]
pub struct Targets {
    cluster: Option<Box<dyn TargetStore>>,
    files: Option<Box<dyn TargetStore>>,
}

impl Targets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster<T: TargetStore + 'static>(mut self, store: T) -> Self {
        self.cluster = Some(Box::new(store));
        self
    }

    pub fn with_files<T: TargetStore + 'static>(mut self, store: T) -> Self {
        self.files = Some(Box::new(store));
        self
    }

    pub fn for_destination(&self, destination: &Destination) -> Result<&dyn TargetStore, CertSyncError> {
        let store = match destination {
            Destination::ClusterSecret { .. } => self.cluster.as_deref(),
            Destination::Files { .. } => self.files.as_deref(),
        };
        store.ok_or_else(|| CertSyncError::TargetWrite {
            destination: destination.to_string(),
            message: "no target store configured for this kind of destination".to_string(),
        })
    }
}

/// Error for a store handed a destination of the wrong kind.
pub(crate) fn unsupported(destination: &Destination) -> CertSyncError {
    CertSyncError::TargetWrite {
        destination: destination.to_string(),
        message: "destination kind not handled by this store".to_string(),
    }
}
