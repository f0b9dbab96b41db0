//! Production executor: spawns the certificate script and classifies its
//! output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;

use super::{
    CredentialBundle, ExecutorError, LifecycleExecutor, DUPLICATE_CN_MARKER, REVOKE_CERT_MARKER,
    REVOKE_DONE_MARKER,
};

// Menu selections written to the script's stdin.
const CREATE_MODE: &str = "1";
const REVOKE_MODE: &str = "2";

pub struct ScriptExecutor {
    script_path: PathBuf,
    working_dir: PathBuf,
    artifact_dir: PathBuf,
    timeout: Duration,
}

struct ScriptOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

impl ScriptExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            script_path: PathBuf::from(&config.script_path),
            working_dir: PathBuf::from(&config.working_dir),
            artifact_dir: PathBuf::from(&config.artifact_dir),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn artifact_path(&self, derived_name: &str) -> PathBuf {
        self.artifact_dir.join(format!("{derived_name}.ovpn"))
    }

    /// Run the script with one mode selector and one argument line on stdin,
    /// bounded by the configured timeout.
    async fn run_script(&self, mode: &str, arg: &str) -> Result<ScriptOutput, ExecutorError> {
        debug!(
            script = %self.script_path.display(),
            mode,
            arg,
            "invoking certificate script"
        );

        let mut child = Command::new(&self.script_path)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutorError::UnexpectedFailure(format!(
                    "failed to spawn {}: {e}",
                    self.script_path.display()
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{mode}\n{arg}\n");
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| ExecutorError::UnexpectedFailure(format!("script stdin: {e}")))?;
            // Dropping stdin closes the pipe so the script's reads terminate.
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ExecutorError::UnexpectedFailure(format!(
                    "script timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ExecutorError::UnexpectedFailure(format!("script wait: {e}")))?;

        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    /// Read the generated bundle and remove the on-disk copy. Removal is
    /// attempted on every exit path once the artifact exists.
    async fn take_artifact(&self, path: &Path, derived_name: &str) -> Result<CredentialBundle, ExecutorError> {
        let read = tokio::fs::read(path).await;

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove credential artifact");
        }

        let bytes = read.map_err(|e| {
            ExecutorError::UnexpectedFailure(format!(
                "generated bundle unreadable at {}: {e}",
                path.display()
            ))
        })?;

        Ok(CredentialBundle {
            filename: format!("{derived_name}.ovpn"),
            bytes,
        })
    }
}

#[async_trait]
impl LifecycleExecutor for ScriptExecutor {
    async fn create(&self, derived_name: &str) -> Result<CredentialBundle, ExecutorError> {
        let output = self.run_script(CREATE_MODE, derived_name).await?;

        // The artifact is the only trustworthy success signal for create.
        let artifact = self.artifact_path(derived_name);
        if tokio::fs::try_exists(&artifact).await.unwrap_or(false) {
            return self.take_artifact(&artifact, derived_name).await;
        }

        if !output.success {
            return Err(ExecutorError::UnexpectedFailure(
                output.stderr.trim().to_string(),
            ));
        }
        if output.stderr.contains(DUPLICATE_CN_MARKER) {
            return Err(ExecutorError::DuplicateName);
        }
        Err(ExecutorError::UnexpectedFailure(format!(
            "no bundle produced for `{derived_name}`: {}",
            output.stderr.trim()
        )))
    }

    async fn revoke(&self, client_name: &str) -> Result<(), ExecutorError> {
        let output = self.run_script(REVOKE_MODE, client_name).await?;

        if !output.success {
            return Err(ExecutorError::UnexpectedFailure(
                output.stderr.trim().to_string(),
            ));
        }
        if output.stdout.contains(REVOKE_CERT_MARKER) && output.stdout.contains(REVOKE_DONE_MARKER)
        {
            return Ok(());
        }
        Err(ExecutorError::UnexpectedFailure(format!(
            "unexpected revoke output: {}",
            output.stdout.trim()
        )))
    }
}
