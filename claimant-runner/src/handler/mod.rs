//! Job handlers
//!
//! A handler does the actual work for one claimed row. It reports problems
//! through [`JobError`]: the classified variants let the poll cycle carry on,
//! anything else aborts it.
//!
//! Handlers own success reporting. The poller writes a status only when a
//! handler fails.

mod command;

pub use command::CommandHandler;

use async_trait::async_trait;
use claimant_core::domain::JobError;

use crate::context::JobContext;

/// Processes one claimed row
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs the job for `ctx.row`
    ///
    /// Called exactly once per claimed row.
    async fn run(&self, ctx: &JobContext<'_>) -> Result<(), JobError>;
}
