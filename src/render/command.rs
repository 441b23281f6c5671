//! Render entry backed by an external process.
//!
//! The renderer reads `{"pathname": .., "head": ..}` from stdin and prints
//! its result to stdout: JSON for a structured result, or plain HTML.
//! Stderr is kept as the diagnostic trace when the process fails.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::render::{RenderEntry, RenderError};

#[derive(Serialize)]
struct RenderRequest<'a> {
    pathname: &'a str,
    head: &'a str,
}

/// Spawns one renderer process per request.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    program: String,
    args: Vec<String>,
    current_dir: PathBuf,
}

impl CommandEntry {
    /// `command` is the program followed by its arguments.
    pub fn new(command: &[String], current_dir: impl Into<PathBuf>) -> Result<Self, RenderError> {
        let (program, args) = command.split_first().ok_or(RenderError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            current_dir: current_dir.into(),
        })
    }

    /// Append one more argument, typically the module to load.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    async fn run(&self, pathname: &str, head: &str) -> Result<Value, RenderError> {
        let payload = serde_json::to_vec(&RenderRequest { pathname, head })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.current_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A renderer that ignores stdin may exit before we finish writing.
            match stdin.write_all(&payload).await {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.code(),
                trace: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}

impl RenderEntry for CommandEntry {
    fn render<'a>(
        &'a self,
        pathname: &'a str,
        head: &'a str,
    ) -> BoxFuture<'a, Result<Value, RenderError>> {
        self.run(pathname, head).boxed()
    }
}
