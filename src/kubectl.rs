//! Thin wrapper around the `kubectl` executable.
//!
//! Both the cluster-secret target and the cluster binding source talk to
//! Kubernetes through here. The process runner sits behind [`CommandRunner`]
//! so tests can script kubectl's output.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct KubectlConfig {
    /// Executable name or path.
    pub binary: String,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            kubeconfig: None,
            context: None,
        }
    }
}

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> io::Result<CommandOutput>;
}

/// Runs commands as child processes.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
    ) -> io::Result<CommandOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            // Dropping the pipe closes stdin so kubectl sees EOF.
            drop(pipe);
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Clone)]
pub struct Kubectl {
    config: KubectlConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Kubectl {
    pub fn new(config: KubectlConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner))
    }

    pub fn with_runner(config: KubectlConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Runs `kubectl <global flags> <args>`. Payloads that may hold key
    /// material must go through `stdin`, never `args`.
    pub async fn run(&self, args: &[&str], stdin: Option<&str>) -> io::Result<CommandOutput> {
        let mut full_args = Vec::with_capacity(args.len() + 4);
        if let Some(kubeconfig) = &self.config.kubeconfig {
            full_args.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        if let Some(context) = &self.config.context {
            full_args.push(format!("--context={}", context));
        }
        full_args.extend(args.iter().map(|a| a.to_string()));

        debug!("Running {} {}", self.config.binary, args.join(" "));
        self.runner.run(&self.config.binary, &full_args, stdin).await
    }
}

pub fn is_not_found(stderr: &str) -> bool {
    stderr.contains("NotFound") || stderr.contains("not found")
}

pub fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("AlreadyExists") || stderr.contains("already exists")
}
