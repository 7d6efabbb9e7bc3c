//! Shared fixtures for integration tests.
//!
//! `VaultFixture` starts a HashiCorp Vault dev server with a fixed root token
//! (`"root"`) on a random host port. Tests using it only run when
//! `CERTSYNC_RUN_INTEGRATION_TESTS=true`.

#![allow(dead_code)]

use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tracing::{debug, info};
use vault_cert_sync::CertMaterial;

pub const ROOT_TOKEN: &str = "root";

pub fn integration_enabled() -> bool {
    std::env::var("CERTSYNC_RUN_INTEGRATION_TESTS").as_deref() == Ok("true")
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

pub struct VaultFixture {
    _container: ContainerAsync<GenericImage>,
    pub addr: String,
}

impl VaultFixture {
    pub async fn new() -> Self {
        let container = GenericImage::new("hashicorp/vault", "1.18.4")
            .with_exposed_port(8200.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
            .with_env_var("VAULT_DEV_ROOT_TOKEN_ID", ROOT_TOKEN)
            .with_env_var("VAULT_DEV_LISTEN_ADDRESS", "0.0.0.0:8200")
            .with_cmd(vec!["server", "-dev", "-dev-root-token-id=root"])
            .start()
            .await
            .expect("Failed to start Vault container");

        let port = container.get_host_port_ipv4(8200).await.unwrap();
        let addr = format!("http://127.0.0.1:{}", port);
        wait_for_vault_ready(&addr, 30, 500).await.unwrap();
        info!("Vault dev server ready at {}", addr);

        VaultFixture {
            _container: container,
            addr,
        }
    }
}

/// Polls `/v1/sys/health` until Vault reports an active or standby node.
pub async fn wait_for_vault_ready(
    vault_addr: &str,
    max_retries: usize,
    retry_delay_ms: u64,
) -> Result<(), String> {
    let client = reqwest::Client::new();
    let health_url = format!("{}/v1/sys/health", vault_addr);

    for attempt in 1..=max_retries {
        match client.get(&health_url).send().await {
            Ok(response) if matches!(response.status().as_u16(), 200 | 429) => return Ok(()),
            Ok(response) => debug!("Vault not ready yet (status: {})", response.status()),
            Err(e) => debug!("Connection to Vault failed (attempt {}): {}", attempt, e),
        }
        tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
    }

    Err(format!("Vault not ready after {} attempts", max_retries))
}

#[path = "../../src/test_utils/certs.rs"]
mod certs;

pub use certs::self_signed;
