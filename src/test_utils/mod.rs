//! Shared fixtures for unit tests: OpenSSL-generated certificates and
//! scripted fakes for the secret store, kubectl and target stores.

use crate::binding::{Destination, DomainSet};
use crate::error::CertSyncError;
use crate::interface::SecretStore;
use crate::kubectl::{CommandOutput, CommandRunner};
use crate::target::TargetStore;
use crate::vault::{CertMaterial, VaultToken};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

mod certs;

pub use certs::{self_signed, self_signed_with_validity, self_signed_without_cn};

/// Secret store answering from an in-memory map keyed by domain-set key.
#[derive(Clone, Default)]
pub struct FakeSecretStore {
    certs: Arc<Mutex<HashMap<String, CertMaterial>>>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    logins: Arc<Mutex<usize>>,
    reject_login: bool,
}

impl FakeSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_login() -> Self {
        Self {
            reject_login: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, material: CertMaterial) {
        self.certs.lock().unwrap().insert(key.to_string(), material);
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn logins(&self) -> usize {
        *self.logins.lock().unwrap()
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn login(&self) -> Result<VaultToken, CertSyncError> {
        *self.logins.lock().unwrap() += 1;
        if self.reject_login {
            return Err(CertSyncError::Auth("HTTP status 400: invalid role_id".into()));
        }
        Ok(VaultToken::new("s.fake"))
    }

    async fn get_certificate(
        &self,
        _token: &VaultToken,
        domains: &DomainSet,
    ) -> Result<CertMaterial, CertSyncError> {
        let key = domains.key();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        self.certs
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(CertSyncError::Fetch {
                domains: key,
                status: Some(404),
                message: "no such certificate".into(),
            })
    }
}

/// Target store backed by a map, counting creates and patches.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    stored: Arc<Mutex<HashMap<Destination, CertMaterial>>>,
    creates: Arc<Mutex<usize>>,
    patches: Arc<Mutex<usize>>,
    failing_writes: Arc<Mutex<Vec<Destination>>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, destination: &Destination, material: CertMaterial) {
        self.stored
            .lock()
            .unwrap()
            .insert(destination.clone(), material);
    }

    pub fn get(&self, destination: &Destination) -> Option<CertMaterial> {
        self.stored.lock().unwrap().get(destination).cloned()
    }

    pub fn fail_writes_to(&self, destination: &Destination) {
        self.failing_writes
            .lock()
            .unwrap()
            .push(destination.clone());
    }

    pub fn creates(&self) -> usize {
        *self.creates.lock().unwrap()
    }

    pub fn patches(&self) -> usize {
        *self.patches.lock().unwrap()
    }

    fn check_writable(&self, destination: &Destination) -> Result<(), CertSyncError> {
        if self.failing_writes.lock().unwrap().contains(destination) {
            return Err(CertSyncError::TargetWrite {
                destination: destination.to_string(),
                message: "permission denied".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn read(&self, destination: &Destination) -> Result<Option<CertMaterial>, CertSyncError> {
        Ok(self.get(destination))
    }

    async fn create(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError> {
        self.check_writable(destination)?;
        *self.creates.lock().unwrap() += 1;
        self.put(destination, material.clone());
        Ok(())
    }

    async fn patch(
        &self,
        destination: &Destination,
        material: &CertMaterial,
    ) -> Result<(), CertSyncError> {
        self.check_writable(destination)?;
        *self.patches.lock().unwrap() += 1;
        self.put(destination, material.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

/// Command runner replaying queued outputs in order and recording calls.
#[derive(Default)]
pub struct FakeRunner {
    outputs: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, stdout: &str) {
        self.outputs.lock().unwrap().push_back(CommandOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        });
    }

    pub fn push_err(&self, stderr: &str) {
        self.outputs.lock().unwrap().push_back(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: stderr.to_string(),
        });
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(RecordedCall {
            program: program.to_string(),
            args: args.to_vec(),
            stdin: stdin.map(str::to_string),
        });
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no scripted output left"))
    }
}
