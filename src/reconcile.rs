//! The reconciliation pass.
//!
//! Per binding: fetch desired material (memoized per domain set), read what
//! the destination holds, compare fingerprints and write only on drift:
//!
//! ```text
//! START -> FETCH_DESIRED -> READ_CURRENT -> MATCH    -> DONE
//!                                        -> MISMATCH -> PATCH  -> DONE
//!                                        -> ABSENT   -> CREATE -> DONE
//! ```
//!
//! Any failure along the way marks that binding failed; the pass continues.
//! Only a failed login (or an unreadable binding source) aborts it.

use crate::binding::{BindingSource, CertBinding};
use crate::error::CertSyncError;
use crate::fingerprint::{self, Fingerprint};
use crate::interface::SecretStore;
use crate::target::Targets;
use crate::vault::CertificateFetcher;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A binding that could not be reconciled, with the reason.
#[derive(Debug, Clone)]
pub struct FailedBinding {
    pub binding: CertBinding,
    pub error: CertSyncError,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Destinations written this pass, creates included.
    pub patched: usize,
    pub unchanged: usize,
    pub failed: Vec<FailedBinding>,
    /// Requests sent to the secret store.
    pub fetches: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Unchanged,
    Created,
    Patched,
}

pub struct Reconciler<S> {
    store: S,
    targets: Targets,
}

impl<S: SecretStore> Reconciler<S> {
    pub fn new(store: S, targets: Targets) -> Self {
        Self { store, targets }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs one pass over `bindings`.
    pub async fn reconcile_all(
        &self,
        bindings: &[CertBinding],
    ) -> Result<ReconcileReport, CertSyncError> {
        let token = self.store.login().await?;
        let mut fetcher = CertificateFetcher::new(&self.store, &token);
        let mut report = ReconcileReport::default();

        for binding in bindings {
            match self.reconcile_one(&mut fetcher, binding).await {
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::Created) | Ok(Outcome::Patched) => report.patched += 1,
                Err(error) => {
                    warn!("Binding {} failed: {}", binding.name, error);
                    report.failed.push(FailedBinding {
                        binding: binding.clone(),
                        error,
                    });
                }
            }
        }

        report.fetches = fetcher.upstream_calls();
        info!(
            "Reconciled {} bindings: {} patched, {} unchanged, {} failed ({} fetches)",
            bindings.len(),
            report.patched,
            report.unchanged,
            report.failed.len(),
            report.fetches
        );
        Ok(report)
    }

    async fn reconcile_one(
        &self,
        fetcher: &mut CertificateFetcher<'_, S>,
        binding: &CertBinding,
    ) -> Result<Outcome, CertSyncError> {
        let desired = fetcher.fetch(&binding.domains).await?;
        let summary = fingerprint::inspect(&desired.cert)?;
        if !summary.valid_now {
            warn!(
                "Certificate for {} is outside its validity window ({} - {})",
                binding.domains, summary.not_before, summary.not_after
            );
        }

        let target = self.targets.for_destination(&binding.destination)?;
        let current = match target.read(&binding.destination).await? {
            None => {
                debug!("{}: {} is empty, creating", binding.name, binding.destination);
                target.create(&binding.destination, &desired).await?;
                return Ok(Outcome::Created);
            }
            Some(current) => current,
        };

        match current_fingerprint(binding, &current.cert) {
            Some(found) if found == summary.fingerprint => {
                debug!("{}: up to date ({})", binding.name, found);
                Ok(Outcome::Unchanged)
            }
            found => {
                info!(
                    "{}: certificate changed ({} -> {}), updating {}",
                    binding.name,
                    found.as_ref().map(Fingerprint::as_str).unwrap_or("unreadable"),
                    summary.fingerprint,
                    binding.destination
                );
                target.patch(&binding.destination, &desired).await?;
                Ok(Outcome::Patched)
            }
        }
    }

    /// Loads bindings fresh from `source` and reconciles them.
    pub async fn run_pass(
        &self,
        source: &dyn BindingSource,
    ) -> Result<ReconcileReport, CertSyncError> {
        let bindings = source.load().await?;
        self.reconcile_all(&bindings).await
    }

    /// Runs a pass every `interval` until `shutdown` resolves. A pass that is
    /// already running is allowed to finish.
    pub async fn run_forever<F>(&self, source: &dyn BindingSource, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down reconciliation loop");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_pass(source).await {
                        Ok(report) if report.is_clean() => {}
                        Ok(report) => warn!("{} bindings failed this pass", report.failed.len()),
                        Err(e) => error!("Reconciliation pass aborted: {}", e),
                    }
                }
            }
        }
    }
}

/// The fingerprint of what the destination holds, or `None` when it cannot
/// be parsed and must be overwritten.
fn current_fingerprint(binding: &CertBinding, pem: &str) -> Option<Fingerprint> {
    match fingerprint::fingerprint(pem) {
        Ok(found) => Some(found),
        Err(e) => {
            debug!("{}: stored certificate unreadable: {}", binding.name, e);
            None
        }
    }
}
