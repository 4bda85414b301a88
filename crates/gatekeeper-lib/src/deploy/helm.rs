//! `helm` subprocess runner

use super::{ReleaseTool, ToolError, ToolOutput, DEFAULT_TOOL_TIMEOUT};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs the helm binary with a per-invocation timeout
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    /// Arguments placed before the subcommand (e.g. `--kube-context`)
    global_args: Vec<OsString>,
    timeout: Duration,
}

impl HelmCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            global_args: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.global_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, args: Vec<OsString>) -> Result<ToolOutput, ToolError> {
        debug!(binary = ?self.binary, args = ?args, "Invoking release tool");

        let child = Command::new(&self.binary)
            .args(&self.global_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(ToolOutput { stdout, stderr })
        } else {
            Err(ToolError::NonZeroExit {
                code: output.status.code(),
                stderr,
            })
        }
    }
}

impl Default for HelmCli {
    fn default() -> Self {
        Self::new("helm")
    }
}

#[async_trait]
impl ReleaseTool for HelmCli {
    async fn install_or_upgrade(
        &self,
        release: &str,
        chart_path: &Path,
        overrides: &[String],
    ) -> Result<ToolOutput, ToolError> {
        let mut args: Vec<OsString> = vec![
            "upgrade".into(),
            "--install".into(),
            release.into(),
            chart_path.into(),
        ];
        for value in overrides {
            args.push("--set".into());
            args.push(value.into());
        }
        self.run(args).await
    }

    async fn uninstall(&self, release: &str) -> Result<ToolOutput, ToolError> {
        self.run(vec!["uninstall".into(), release.into()]).await
    }

    async fn status(&self, release: &str) -> Result<ToolOutput, ToolError> {
        self.run(vec![
            "status".into(),
            release.into(),
            "--output".into(),
            "json".into(),
        ])
        .await
    }

    async fn probe(&self) -> Result<ToolOutput, ToolError> {
        self.run(vec!["version".into(), "--short".into()]).await
    }
}
