use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::{
    parse_interval, BindingSourceConfig, CertSyncConfig, DEFAULT_BINDING_RESOURCE,
};
use crate::error::CertSyncError;
use crate::fingerprint::{self, CertSummary};
use crate::kubectl::KubectlConfig;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::vault::VaultConfig;

#[derive(Parser, Debug)]
#[command(
    name = "vault-cert-sync",
    about = "Keep Kubernetes TLS secrets and certificate directories in sync with Vault",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Vault server address.
    #[arg(
        long,
        global = true,
        default_value = "http://127.0.0.1:8200",
        env = "VAULT_ADDR"
    )]
    pub vault_addr: String,

    /// AppRole role ID.
    #[arg(long, global = true, env = "VAULT_ROLE_ID", hide_env_values = true)]
    pub role_id: Option<String>,

    /// AppRole secret ID.
    #[arg(long, global = true, env = "VAULT_SECRET_ID", hide_env_values = true)]
    pub secret_id: Option<String>,

    /// Static Vault token; skips the AppRole login when set.
    #[arg(long, global = true, env = "VAULT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Mount of the certificate backend.
    #[arg(long, global = true, default_value = "certs", env = "VAULT_CERT_MOUNT")]
    pub cert_mount: String,

    /// Per-request timeout against Vault, in seconds.
    #[arg(long, global = true, default_value_t = 30)]
    pub vault_timeout: u64,

    /// How many times a 502 from Vault is retried.
    #[arg(long, global = true, default_value_t = 10)]
    pub max_retries: u32,

    /// Directory for bindings that do not name a destination.
    #[arg(long, global = true, env = "CERT_DIR")]
    pub cert_dir: Option<PathBuf>,

    /// Time between passes in `run` mode (e.g. 12h, 30m, 90s).
    #[arg(long, global = true, default_value = "12h", env = "RECONCILE_INTERVAL")]
    pub interval: String,

    /// Read bindings from this YAML file instead of the cluster.
    #[arg(long, global = true, env = "CERT_BINDINGS_FILE")]
    pub bindings_file: Option<PathBuf>,

    /// Custom resource listed for bindings when no file is given.
    #[arg(long, global = true, default_value = DEFAULT_BINDING_RESOURCE)]
    pub bindings_resource: String,

    /// kubectl executable.
    #[arg(long, global = true, default_value = "kubectl")]
    pub kubectl: String,

    #[arg(long, global = true, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// kubeconfig context to use.
    #[arg(long, global = true)]
    pub context: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run a single reconciliation pass.
    Reconcile,
    /// Reconcile on a fixed interval until interrupted.
    Run,
    /// Print the bindings as they will be reconciled.
    Bindings,
    /// Print the SHA-256 fingerprint and validity of a PEM certificate.
    Fingerprint {
        file: PathBuf,
    },
    /// Check that the configured Vault credentials work.
    Login,
}

impl GlobalArgs {
    pub fn into_config(self) -> Result<CertSyncConfig, CertSyncError> {
        let mut vault = VaultConfig::new(&self.vault_addr)
            .with_cert_mount(&self.cert_mount)
            .with_timeout(Duration::from_secs(self.vault_timeout))
            .with_retry(self.max_retries, VaultConfig::default().retry_delay);

        match (self.role_id, self.secret_id) {
            (Some(role_id), Some(secret_id)) => vault = vault.with_approle(&role_id, &secret_id),
            (None, None) => {}
            _ => {
                return Err(CertSyncError::Config(
                    "VAULT_ROLE_ID and VAULT_SECRET_ID must be set together".to_string(),
                ))
            }
        }
        if let Some(token) = self.token.filter(|t| !t.is_empty()) {
            vault = vault.with_token(&token);
        }

        let bindings = match self.bindings_file {
            Some(path) => BindingSourceConfig::File(path),
            None => BindingSourceConfig::Cluster {
                resource: self.bindings_resource,
            },
        };

        Ok(CertSyncConfig {
            vault,
            cert_dir: self.cert_dir,
            interval: parse_interval(&self.interval)?,
            bindings,
            kubectl: KubectlConfig {
                binary: self.kubectl,
                kubeconfig: self.kubeconfig,
                context: self.context,
            },
        })
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    execute(cli).await
}

pub async fn execute(cli: Cli) -> Result<()> {
    let Cli { global, command } = cli;
    match command {
        Commands::Fingerprint { file } => print_fingerprint(&file),
        Commands::Reconcile => reconcile_once(global.into_config()?).await,
        Commands::Run => run_daemon(global.into_config()?).await,
        Commands::Bindings => print_bindings(global.into_config()?).await,
        Commands::Login => check_login(global.into_config()?).await,
    }
}

async fn reconcile_once(config: CertSyncConfig) -> Result<()> {
    let reconciler = Reconciler::new(config.vault_client()?, config.targets());
    let source = config.binding_source();
    let report = reconciler.run_pass(source.as_ref()).await?;
    print_report(&report);
    if !report.is_clean() {
        bail!("{} bindings failed", report.failed.len());
    }
    Ok(())
}

async fn run_daemon(config: CertSyncConfig) -> Result<()> {
    let reconciler = Reconciler::new(config.vault_client()?, config.targets());
    let source = config.binding_source();
    info!(
        "Reconciling every {}s against {}",
        config.interval.as_secs(),
        config.vault.url
    );
    reconciler
        .run_forever(source.as_ref(), config.interval, shutdown_signal())
        .await;
    Ok(())
}

async fn print_bindings(config: CertSyncConfig) -> Result<()> {
    let bindings = config.binding_source().load().await?;
    for binding in &bindings {
        println!("{}\t{}\t{}", binding.name, binding.domains, binding.destination);
    }
    info!("{} bindings", bindings.len());
    Ok(())
}

async fn check_login(config: CertSyncConfig) -> Result<()> {
    let client = config.vault_client()?;
    client
        .login()
        .await
        .with_context(|| format!("login to {} failed", client.addr))?;
    println!("Authenticated against {}", client.addr);
    Ok(())
}

fn print_fingerprint(file: &Path) -> Result<()> {
    let pem = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let summary = fingerprint::inspect(&pem)?;
    print!("{}", fingerprint_report(&summary));
    Ok(())
}

fn fingerprint_report(summary: &CertSummary) -> String {
    let mut report = format!(
        "SHA256 Fingerprint={}\nsubject={}\nnotBefore={}\nnotAfter={}\n",
        summary.fingerprint,
        summary.subject.as_deref().unwrap_or("-"),
        summary.not_before,
        summary.not_after
    );
    if !summary.valid_now {
        report.push_str("WARNING: certificate is not currently valid\n");
    }
    report
}

fn print_report(report: &ReconcileReport) {
    println!(
        "patched={} unchanged={} failed={} fetches={}",
        report.patched,
        report.unchanged,
        report.failed.len(),
        report.fetches
    );
    for failed in &report.failed {
        println!("FAILED {}: {}", failed.binding.name, failed.error);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_VARS: &[&str] = &[
        "VAULT_ADDR",
        "VAULT_ROLE_ID",
        "VAULT_SECRET_ID",
        "VAULT_TOKEN",
        "VAULT_CERT_MOUNT",
        "CERT_DIR",
        "RECONCILE_INTERVAL",
        "CERT_BINDINGS_FILE",
        "KUBECONFIG",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    fn config_from(args: &[&str]) -> Result<CertSyncConfig, CertSyncError> {
        let cli = Cli::try_parse_from(args).unwrap();
        cli.global.into_config()
    }

    #[test]
    #[serial]
    fn defaults() {
        clear_env();
        let config = config_from(&["vault-cert-sync", "reconcile"]).unwrap();
        assert_eq!(config.vault.url, "http://127.0.0.1:8200");
        assert_eq!(config.vault.cert_mount, "certs");
        assert_eq!(config.vault.max_retries, 10);
        assert!(config.vault.approle.is_none());
        assert!(config.vault.token.is_none());
        assert_eq!(config.interval, crate::config::DEFAULT_INTERVAL);
        assert_eq!(
            config.bindings,
            BindingSourceConfig::Cluster {
                resource: "certbindings".to_string()
            }
        );
        assert_eq!(config.kubectl.binary, "kubectl");
    }

    #[test]
    #[serial]
    fn reads_environment() {
        clear_env();
        env::set_var("VAULT_ADDR", "https://vault.example.com");
        env::set_var("VAULT_ROLE_ID", "role");
        env::set_var("VAULT_SECRET_ID", "secret");
        env::set_var("VAULT_CERT_MOUNT", "/letsencrypt/");
        env::set_var("CERT_DIR", "/etc/ssl/site");
        env::set_var("RECONCILE_INTERVAL", "30m");
        env::set_var("CERT_BINDINGS_FILE", "/etc/bindings.yaml");

        let config = config_from(&["vault-cert-sync", "run"]);
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.vault.url, "https://vault.example.com");
        let approle = config.vault.approle.unwrap();
        assert_eq!(approle.role_id, "role");
        assert_eq!(approle.secret_id, "secret");
        assert_eq!(config.vault.cert_mount, "letsencrypt");
        assert_eq!(config.cert_dir, Some(PathBuf::from("/etc/ssl/site")));
        assert_eq!(config.interval, Duration::from_secs(1800));
        assert_eq!(
            config.bindings,
            BindingSourceConfig::File(PathBuf::from("/etc/bindings.yaml"))
        );
    }

    #[test]
    #[serial]
    fn flags_override_environment() {
        clear_env();
        env::set_var("VAULT_ADDR", "https://from-env:8200");
        let config = config_from(&[
            "vault-cert-sync",
            "login",
            "--vault-addr",
            "https://from-flag:8200",
            "--token",
            "s.static",
        ]);
        clear_env();
        let config = config.unwrap();
        assert_eq!(config.vault.url, "https://from-flag:8200");
        assert_eq!(config.vault.token.as_deref(), Some("s.static"));
    }

    #[test]
    #[serial]
    fn half_configured_approle_is_rejected() {
        clear_env();
        let err = config_from(&["vault-cert-sync", "reconcile", "--role-id", "r"]).unwrap_err();
        assert!(matches!(err, CertSyncError::Config(_)));
    }

    #[test]
    #[serial]
    fn bad_interval_is_rejected() {
        clear_env();
        let err = config_from(&["vault-cert-sync", "run", "--interval", "soon"]).unwrap_err();
        assert!(matches!(err, CertSyncError::Config(_)));
    }

    #[test]
    fn fingerprint_takes_a_file() {
        let cli = Cli::try_parse_from(["vault-cert-sync", "fingerprint", "/tmp/cert.pem"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Fingerprint {
                file: PathBuf::from("/tmp/cert.pem")
            }
        );
    }

    #[test]
    fn fingerprint_report_without_common_name() {
        let material = crate::test_utils::self_signed_without_cn();
        let summary = fingerprint::inspect(&material.cert).unwrap();

        let report = fingerprint_report(&summary);

        assert!(report.starts_with(&format!("SHA256 Fingerprint={}\n", summary.fingerprint)));
        assert!(report.contains("\nsubject=-\n"));
        assert!(!report.contains("WARNING"));
    }

    #[test]
    fn fingerprint_report_flags_certificates_outside_validity() {
        let material = crate::test_utils::self_signed_with_validity("later.example.com", 10, 20);
        let summary = fingerprint::inspect(&material.cert).unwrap();

        let report = fingerprint_report(&summary);

        assert!(report.contains("\nsubject=later.example.com\n"));
        assert!(report.ends_with("WARNING: certificate is not currently valid\n"));
    }

    #[tokio::test]
    async fn fingerprint_command_reads_pem_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        std::fs::write(&path, crate::test_utils::self_signed("a.com").cert).unwrap();
        let cli = Cli::try_parse_from(["vault-cert-sync", "fingerprint", path.to_str().unwrap()])
            .unwrap();
        execute(cli).await.unwrap();
    }

    #[tokio::test]
    async fn fingerprint_command_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        std::fs::write(&path, "not a certificate").unwrap();
        let cli = Cli::try_parse_from(["vault-cert-sync", "fingerprint", path.to_str().unwrap()])
            .unwrap();
        assert!(execute(cli).await.is_err());
    }
}
