//! One-shot CLI provider invocation.
//!
//! Unlike `AcpSession`, a `CliInvocation` holds no live process until
//! `run` is called: `Spawn` only records the argv and env it will use,
//! deferring the actual exec to `Prompt`.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{CliError, CliResult};

/// Outcome of a completed (or cancelled) CLI invocation.
#[derive(Debug, Clone)]
pub struct CliOutcome {
    /// `true` iff the process exited with status code zero.
    pub success: bool,
    /// Captured stdout, possibly partial if the process was cancelled.
    pub stdout: String,
    /// Process exit code, if one was observed (`None` on signal kill).
    pub exit_code: Option<i32>,
}

/// A deferred, one-shot CLI provider call.
///
/// Constructing this does not spawn anything; the provider binary is
/// only executed once [`CliInvocation::run`] is called.
pub struct CliInvocation {
    binary: String,
    provider: String,
    model: String,
    config_path: Option<String>,
    credential_envs: Vec<(String, String)>,
    child: AsyncMutex<Option<Child>>,
    executed: std::sync::atomic::AtomicBool,
}

impl CliInvocation {
    /// Records the argv/env this invocation will use; nothing is spawned yet.
    pub fn new(
        binary: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        config_path: Option<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            provider: provider.into(),
            model: model.into(),
            config_path,
            credential_envs: Vec::new(),
            child: AsyncMutex::new(None),
            executed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Adds a credential environment variable passed through to the
    /// subprocess (e.g. an API key the provider binary reads itself).
    #[must_use]
    pub fn with_credential_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credential_envs.push((key.into(), value.into()));
        self
    }

    /// Spawns the provider binary with `run --model <provider/model>
    /// --prompt <text>` and captures its stdout until exit.
    ///
    /// May only be called once per invocation.
    pub async fn run(&self, prompt_text: &str) -> CliResult<CliOutcome> {
        if self
            .executed
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(CliError::AlreadyExecuted);
        }

        let model_arg = format!("{}/{}", self.provider, self.model);

        let mut command = Command::new(&self.binary);
        command
            .arg("run")
            .arg("--model")
            .arg(&model_arg)
            .arg("--prompt")
            .arg(prompt_text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if let Some(config_path) = &self.config_path {
            command.env("OPENCODE_CONFIG", config_path);
        }
        for (key, value) in &self.credential_envs {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| CliError::SpawnFailed(e.to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CliError::SpawnFailed("child stdout not captured".to_string()))?;

        *self.child.lock().await = Some(child);

        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = String::new();
            let _ = reader.read_to_string(&mut buf).await;
            buf
        });

        let status = {
            let mut guard = self.child.lock().await;
            let child = guard.as_mut().expect("child set above");
            child.wait().await?
        };
        *self.child.lock().await = None;

        let stdout = reader_task.await.unwrap_or_default();

        tracing::debug!(
            provider = %self.provider,
            exit_code = ?status.code(),
            "cli invocation completed"
        );

        Ok(CliOutcome {
            success: status.success(),
            stdout,
            exit_code: status.code(),
        })
    }

    /// Sends a termination signal to the running subprocess, if any.
    /// Already-captured stdout is retained by the in-flight `run` call.
    /// Idempotent: a no-op before spawn or after completion.
    pub async fn cancel(&self) -> CliResult<()> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            child.start_kill()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_run_captures_stdout_and_exit_code() {
        let invocation = CliInvocation::new("/bin/echo", "glm", "glm-4", None);
        let outcome = invocation.run("hello").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stdout.contains("run"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_failure_with_partial_output() {
        let invocation = CliInvocation::new("/bin/false", "glm", "glm-4", None);
        let outcome = invocation.run("hello").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let invocation = CliInvocation::new("/bin/echo", "glm", "glm-4", None);
        invocation.run("hello").await.unwrap();
        let second = invocation.run("again").await;
        assert!(matches!(second, Err(CliError::AlreadyExecuted)));
    }

    #[tokio::test]
    async fn cancel_before_run_is_a_no_op() {
        let invocation = CliInvocation::new("/bin/echo", "glm", "glm-4", None);
        invocation.cancel().await.unwrap();
    }
}
