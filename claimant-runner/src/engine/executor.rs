//! Job executor
//!
//! Runs a unit's handler for every row of a claim batch, in batch order, and
//! turns handler errors into failure writes. Classified errors stay inside the
//! batch; an unclassified error is reported and then returned, abandoning the
//! rest of the batch.

use anyhow::Result;
use claimant_client::RemoteStore;
use claimant_core::domain::{ClaimBatch, JobError, JobOutcome, Row};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::context::JobContext;
use crate::registry::WorkUnit;

/// Counts for one executed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Claimed rows left unprocessed because shutdown was requested
    pub abandoned: usize,
}

/// Runs handlers for claimed rows
pub struct JobExecutor {
    store: Arc<dyn RemoteStore>,
    cancel: CancellationToken,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn RemoteStore>, cancel: CancellationToken) -> Self {
        Self { store, cancel }
    }

    /// Processes `batch` for `unit`
    ///
    /// Returns an error only for an unclassified handler failure, after its
    /// failure payload has been written.
    pub async fn run(&self, unit: &WorkUnit, batch: ClaimBatch) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        let total = batch.len();

        for (index, claimed) in batch.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.abandoned = total - index;
                warn!(
                    unit = %unit.name(),
                    "Shutdown requested; leaving {} claimed row(s) unprocessed",
                    report.abandoned
                );
                break;
            }

            let ctx = JobContext::new(&claimed.row, &claimed.ack, unit, self.store.as_ref());
            debug!(unit = %unit.name(), rid = %ctx.display_id(), "Running job");

            let outcome = JobOutcome::from(unit.handler().run(&ctx).await);
            let rid = ctx.display_id();

            match outcome {
                JobOutcome::Success => report.succeeded += 1,
                JobOutcome::RecoverableFailure(e) => {
                    error!(
                        unit = %unit.name(),
                        rid = %rid,
                        "Aborting task on {} error: {}",
                        e.kind(),
                        e
                    );
                    self.report_failure(unit, &claimed.row, &e).await;
                    report.failed += 1;
                }
                JobOutcome::FatalFailure(e) => {
                    error!(
                        unit = %unit.name(),
                        rid = %rid,
                        "Unclassified job error, abandoning batch: {:#}",
                        e
                    );
                    self.report_failure(unit, &claimed.row, &e).await;
                    return Err(anyhow::Error::from(e)
                        .context(format!("unit '{}' row {}", unit.name(), rid)));
                }
            }
        }

        Ok(report)
    }

    /// Writes the unit's failure payload for `row`; errors are logged only
    async fn report_failure(&self, unit: &WorkUnit, row: &Row, error: &JobError) {
        let payload = unit.failure_input(row, error);
        if let Err(e) = self
            .store
            .write(unit.update_target(), std::slice::from_ref(&payload))
            .await
        {
            error!(
                unit = %unit.name(),
                rid = %row.display_id(unit.identifier_field()),
                "Failed to record failure status: {}",
                e
            );
        }
    }
}
