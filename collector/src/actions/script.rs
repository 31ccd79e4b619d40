//! `script` action
//!
//! Runs a shell command or script file on the host. The context input is
//! piped to the process on stdin as JSON and previous action results are
//! exported as environment variables. A non-zero exit reports the status
//! and captured stderr.

use std::process::Stdio;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use virta_core::{scalar_to_string, PluginConfig, PluginError};

use super::{Action, ActionContext};

/// Registry type name
pub const ACTION_TYPE: &str = "script";

const DEFAULT_SHELL: &str = "/bin/bash";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Instance name, required
    name: String,
    /// Inline command; multiple lines are joined with `; `
    command: String,
    /// Script file path, alternative to `command`
    file: String,
    /// Shell binary, defaults to /bin/bash
    shell: String,
}

/// Shell-command action, see the module docs
#[derive(Debug, Default)]
pub struct ScriptAction {
    name: String,
    command: Option<String>,
    file: Option<String>,
    shell: String,
}

/// Environment variable names allow only `[A-Za-z0-9_]`
fn sanitize_env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn spawn_error(err: std::io::Error) -> PluginError {
    PluginError::Process {
        status: -1,
        stderr: err.to_string(),
    }
}

#[async_trait::async_trait]
impl Action for ScriptAction {
    fn init(&mut self, cfg: &PluginConfig) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        if cfg.name.is_empty() {
            return Err(PluginError::Config(
                "script action requires a name".to_string(),
            ));
        }
        if cfg.command.is_empty() == cfg.file.is_empty() {
            return Err(PluginError::Config(
                "script action requires exactly one of command or file".to_string(),
            ));
        }
        self.name = cfg.name;
        self.command = if cfg.command.is_empty() {
            None
        } else {
            Some(
                cfg.command
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };
        self.file = if cfg.file.is_empty() {
            None
        } else {
            Some(cfg.file)
        };
        self.shell = if cfg.shell.is_empty() {
            DEFAULT_SHELL.to_string()
        } else {
            cfg.shell
        };
        Ok(())
    }

    async fn run(&self, ctx: &ActionContext) -> Result<Value, PluginError> {
        let mut cmd = Command::new(&self.shell);
        match (&self.command, &self.file) {
            (Some(command), _) => {
                cmd.arg("-c").arg(command);
            }
            (None, Some(file)) => {
                cmd.arg(file);
            }
            (None, None) => {
                return Err(PluginError::Config(
                    "script action is not initialized".to_string(),
                ))
            }
        }
        for (key, value) in &ctx.env {
            cmd.env(sanitize_env_key(key), scalar_to_string(value));
        }
        for (key, value) in &ctx.vars {
            cmd.env(sanitize_env_key(key), scalar_to_string(value));
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(action = %self.name, shell = %self.shell, "running script");
        let mut child = cmd.spawn().map_err(spawn_error)?;
        if let Some(mut stdin) = child.stdin.take() {
            let input = ctx.input.to_string();
            // A command that exits without reading stdin closes the pipe;
            // that is not a failure of the command itself.
            if let Err(err) = stdin.write_all(input.as_bytes()).await {
                if err.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(spawn_error(err));
                }
            }
            drop(stdin);
        }
        let output = child.wait_with_output().await.map_err(spawn_error)?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(PluginError::Process {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        if !stderr.is_empty() {
            return Ok(json!({ "stderr": stderr }));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(json!({ "stdout": stdout }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
