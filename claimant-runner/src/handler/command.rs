//! Command handler
//!
//! Runs an external program once per claimed row. Arguments may reference row
//! fields as `{Field}`; the row itself is also passed as JSON in the
//! `CLAIMANT_ROW` environment variable, and the claim acknowledgement in
//! `CLAIMANT_ACK`.

use async_trait::async_trait;
use claimant_core::domain::JobError;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::JobHandler;
use crate::context::JobContext;

/// Longest stderr excerpt carried in an error message
const STDERR_EXCERPT: usize = 512;

/// Handler running an external program per row
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    success_status: Option<String>,
}

impl CommandHandler {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: None,
            success_status: None,
        }
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Kill the program and fail the row after this long
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Status the handler writes to the row after a successful run
    pub fn success_status(mut self, status: Option<String>) -> Self {
        self.success_status = status;
        self
    }

    /// Substitutes `{Field}` placeholders with row values
    fn render_args(&self, ctx: &JobContext<'_>) -> Result<Vec<String>, JobError> {
        self.args.iter().map(|arg| render(arg, ctx)).collect()
    }
}

/// Expands every `{name}` in `template`; text without a closing brace is kept as is
fn render(template: &str, ctx: &JobContext<'_>) -> Result<String, JobError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) if end > 0 => {
                out.push_str(&ctx.require(&after[..end])?);
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl JobHandler for CommandHandler {
    async fn run(&self, ctx: &JobContext<'_>) -> Result<(), JobError> {
        let args = self.render_args(ctx)?;
        let row_json = serde_json::to_string(ctx.row).map_err(anyhow::Error::from)?;
        let ack_json = serde_json::to_string(ctx.ack).map_err(anyhow::Error::from)?;

        info!(
            unit = %ctx.unit().name(),
            rid = %ctx.display_id(),
            "Running {} {:?}",
            self.program,
            args
        );

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .env("CLAIMANT_ROW", row_json)
            .env("CLAIMANT_ACK", ack_json)
            .env("CLAIMANT_UNIT", ctx.unit().name())
            .env("CLAIMANT_RID", ctx.id().unwrap_or_default())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let run = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                JobError::runtime(format!("{} timed out after {:?}", self.program, limit))
            })?,
            None => run.await,
        }
        .map_err(|e| JobError::runtime(format!("failed to start {}: {}", self.program, e)))?;

        if !output.stdout.is_empty() {
            debug!(rid = %ctx.display_id(), "stdout: {}", excerpt(&output.stdout));
        }

        if !output.status.success() {
            let stderr = excerpt(&output.stderr);
            warn!(rid = %ctx.display_id(), "{} failed: {}", self.program, stderr);
            return Err(JobError::runtime(format!(
                "{} exited with {}: {}",
                self.program, output.status, stderr
            )));
        }

        if let Some(status) = &self.success_status {
            ctx.report_status(status).await.map_err(|e| {
                JobError::runtime(format!("could not record success status: {}", e))
            })?;
        }

        info!(
            unit = %ctx.unit().name(),
            rid = %ctx.display_id(),
            "Finished {}",
            self.program
        );
        Ok(())
    }
}
