//! Poll scheduler
//!
//! Drives the claim/execute cycle over every registered work unit, then
//! sleeps for the poll interval and starts over. Units are visited one after
//! another in registration order; a cycle finishes (or aborts) before the
//! next one starts.

use anyhow::Result;
use claimant_client::RemoteStore;
use claimant_core::domain::EntityTag;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{ClaimAttempt, ClaimEngine, JobExecutor};
use crate::registry::{Registry, WorkUnit};

/// What the scheduler does when a job fails with an unclassified error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalErrorPolicy {
    /// Return the error from [`PollScheduler::run`]; an external supervisor restarts us
    #[default]
    Exit,
    /// Log it and carry on with the next cycle
    Continue,
}

/// Scheduler settings
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub fatal_error_policy: FatalErrorPolicy,
    pub rescan_on_work: bool,
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            fatal_error_policy: config.fatal_error_policy,
            rescan_on_work: config.rescan_on_work,
        }
    }
}

/// Everything that persists between cycles
///
/// The registry, one cached entity tag per unit (same order), and the store
/// handle every unit shares.
pub struct PollerState {
    registry: Registry,
    tokens: Vec<Option<EntityTag>>,
    store: Arc<dyn RemoteStore>,
}

impl PollerState {
    pub fn new(registry: Registry, store: Arc<dyn RemoteStore>) -> Self {
        let tokens = vec![None; registry.len()];
        Self {
            registry,
            tokens,
            store,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Cached tag of the named unit
    #[cfg(test)]
    pub fn token(&self, unit: &str) -> Option<&EntityTag> {
        self.registry
            .iter()
            .position(|u| u.name() == unit)
            .and_then(|i| self.tokens[i].as_ref())
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = (&Arc<WorkUnit>, &mut Option<EntityTag>)> {
        self.registry.iter().zip(self.tokens.iter_mut())
    }
}

/// Scheduler state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
}

/// Summary of one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// At least one unit claimed at least one row
    pub found_work: bool,
    pub claimed: usize,
    pub failed: usize,
    /// Units whose claim call failed this cycle
    pub skipped_units: usize,
    /// Claimed rows left unprocessed because shutdown was requested
    pub abandoned: usize,
}

/// Repeats poll cycles until cancelled
pub struct PollScheduler {
    state: PollerState,
    engine: ClaimEngine,
    executor: JobExecutor,
    settings: PollSettings,
    cancel: CancellationToken,
    phase: PollPhase,
}

impl PollScheduler {
    pub fn new(state: PollerState, settings: PollSettings, cancel: CancellationToken) -> Self {
        let engine = ClaimEngine::new(Arc::clone(&state.store));
        let executor = JobExecutor::new(Arc::clone(&state.store), cancel.clone());
        Self {
            state,
            engine,
            executor,
            settings,
            cancel,
            phase: PollPhase::Idle,
        }
    }

    pub fn state(&self) -> &PollerState {
        &self.state
    }

    #[cfg(test)]
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Runs poll cycles until the cancellation token fires
    ///
    /// With [`FatalErrorPolicy::Exit`] the first unclassified job error is
    /// returned; with [`FatalErrorPolicy::Continue`] it is logged and the
    /// loop keeps going.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting poller: {} work unit(s), interval {:?}, on fatal error: {:?}",
            self.state.registry.len(),
            self.settings.poll_interval,
            self.settings.fatal_error_policy
        );
        if self.state.registry.is_empty() {
            warn!("No work units registered; every cycle will be empty");
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let found_work = match self.poll_once().await {
                Ok(report) => {
                    if report.found_work {
                        info!(
                            "Cycle complete: {} claimed, {} failed, {} unit(s) skipped",
                            report.claimed, report.failed, report.skipped_units
                        );
                        if report.abandoned > 0 {
                            warn!("{} claimed row(s) left unprocessed", report.abandoned);
                        }
                    } else {
                        debug!("Cycle complete: no work ({} unit(s) skipped)", report.skipped_units);
                    }
                    report.found_work
                }
                Err(e) => match self.settings.fatal_error_policy {
                    FatalErrorPolicy::Exit => {
                        error!("Poll cycle aborted: {:#}", e);
                        return Err(e);
                    }
                    FatalErrorPolicy::Continue => {
                        error!("Poll cycle aborted, continuing with next cycle: {:#}", e);
                        false
                    }
                },
            };

            if found_work && self.settings.rescan_on_work {
                continue;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("Poller stopped");
        Ok(())
    }

    /// Runs exactly one poll cycle
    pub async fn poll_once(&mut self) -> Result<CycleReport> {
        debug!(phase = ?self.phase, "Starting poll cycle");
        self.phase = PollPhase::Polling;
        let result = self.cycle().await;
        self.phase = PollPhase::Idle;
        result
    }

    async fn cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        for (unit, token) in self.state.slots_mut() {
            if self.cancel.is_cancelled() {
                debug!("Shutdown requested, ending cycle early");
                break;
            }

            let batch = match self.engine.try_claim(unit, token).await {
                ClaimAttempt::Claimed(batch) => batch,
                ClaimAttempt::Skipped => {
                    report.skipped_units += 1;
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }
            report.found_work = true;
            report.claimed += batch.len();

            let executed = self.executor.run(unit, batch).await?;
            report.failed += executed.failed;
            report.abandoned += executed.abandoned;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, Script, ScriptedHandler, unit};
    use serde_json::json;

    const TIFF: &str = "Kind=tiff&Processing_Status=new";
    const CZI: &str = "Kind=czi&Processing_Status=new";

    fn settings(policy: FatalErrorPolicy) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_millis(5),
            fatal_error_policy: policy,
            rescan_on_work: false,
        }
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(vec![
            json!({ "RID": "T1", "Kind": "tiff", "Processing_Status": "new" }),
            json!({ "RID": "T2", "Kind": "tiff", "Processing_Status": "new" }),
            json!({ "RID": "C1", "Kind": "czi", "Processing_Status": "new" }),
        ]))
    }

    fn scheduler(
        store: &Arc<MemoryStore>,
        units: Vec<(&str, &str, Arc<ScriptedHandler>)>,
        policy: FatalErrorPolicy,
        cancel: CancellationToken,
    ) -> PollScheduler {
        scheduler_with(store, units, settings(policy), cancel)
    }

    fn scheduler_with(
        store: &Arc<MemoryStore>,
        units: Vec<(&str, &str, Arc<ScriptedHandler>)>,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> PollScheduler {
        let mut registry = Registry::new();
        for (name, query, handler) in units {
            registry.register(unit(name, query, handler)).unwrap();
        }
        let state = PollerState::new(registry, store.clone());
        PollScheduler::new(state, settings, cancel)
    }

    fn rescanning() -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_secs(3600),
            fatal_error_policy: FatalErrorPolicy::Exit,
            rescan_on_work: true,
        }
    }

    /// Cancels `cancel` once the store has seen `calls` claims, or after `limit`
    fn cancel_after_claims(
        store: &Arc<MemoryStore>,
        calls: usize,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = store.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = time::timeout(limit, async {
                while store.claim_calls().len() < calls {
                    time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await;
            cancel.cancel();
        })
    }

    #[tokio::test]
    async fn test_rescan_on_work_skips_the_sleep() {
        let store = store();
        let tiff = ScriptedHandler::new();
        let cancel = CancellationToken::new();
        let mut scheduler = scheduler_with(
            &store,
            vec![("tiff", TIFF, tiff.clone())],
            rescanning(),
            cancel.clone(),
        );
        let stopper = cancel_after_claims(&store, 2, Duration::from_secs(5), &cancel);

        time::timeout(Duration::from_secs(10), scheduler.run())
            .await
            .expect("scheduler stopped")
            .unwrap();
        stopper.await.unwrap();

        // The second claim ran without waiting out the hour-long interval
        assert_eq!(store.claim_calls(), vec![TIFF, TIFF]);
        assert_eq!(tiff.calls(), vec!["T1", "T2"]);
    }

    #[tokio::test]
    async fn test_cycle_without_work_still_sleeps() {
        let store = Arc::new(MemoryStore::new(vec![
            json!({ "RID": "T1", "Kind": "tiff", "Processing_Status": "done" }),
        ]));
        let cancel = CancellationToken::new();
        let mut scheduler = scheduler_with(
            &store,
            vec![("tiff", TIFF, ScriptedHandler::new())],
            rescanning(),
            cancel.clone(),
        );
        let stopper = cancel_after_claims(&store, 2, Duration::from_millis(200), &cancel);

        time::timeout(Duration::from_secs(10), scheduler.run())
            .await
            .expect("scheduler stopped")
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(store.claim_calls(), vec![TIFF]);
    }

    #[tokio::test]
    async fn test_cycle_processes_units_in_order_then_quiesces() {
        let store = store();
        let tiff = ScriptedHandler::new();
        let czi = ScriptedHandler::new();
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, tiff.clone()), ("czi", CZI, czi.clone())],
            FatalErrorPolicy::Exit,
            CancellationToken::new(),
        );

        let report = scheduler.poll_once().await.unwrap();
        assert!(report.found_work);
        assert_eq!(report.claimed, 3);
        assert_eq!(tiff.calls(), vec!["T1", "T2"]);
        assert_eq!(czi.calls(), vec!["C1"]);
        assert_eq!(store.claim_calls(), vec![TIFF, CZI]);
        assert_eq!(scheduler.phase(), PollPhase::Idle);

        let report = scheduler.poll_once().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert_eq!(tiff.calls().len(), 2);
        assert_eq!(czi.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_unit_does_not_block_others() {
        let store = store();
        store.fail_claims(TIFF);
        let tiff = ScriptedHandler::new();
        let czi = ScriptedHandler::new();
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, tiff.clone()), ("czi", CZI, czi.clone())],
            FatalErrorPolicy::Exit,
            CancellationToken::new(),
        );

        let report = scheduler.poll_once().await.unwrap();

        assert_eq!(report.skipped_units, 1);
        assert_eq!(report.claimed, 1);
        assert!(tiff.calls().is_empty());
        assert_eq!(czi.calls(), vec!["C1"]);
        assert!(scheduler.state().token("tiff").is_none());
        assert!(scheduler.state().token("czi").is_some());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_broken_unit_alone_reports_no_work() {
        let store = store();
        store.fail_claims(TIFF);
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, ScriptedHandler::new())],
            FatalErrorPolicy::Exit,
            CancellationToken::new(),
        );

        let report = scheduler.poll_once().await.unwrap();

        assert!(!report.found_work);
        assert_eq!(report.skipped_units, 1);
    }

    #[tokio::test]
    async fn test_unclassified_error_skips_later_units() {
        let store = store();
        let tiff = ScriptedHandler::new().script("T1", Script::Unclassified);
        let czi = ScriptedHandler::new();
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, tiff.clone()), ("czi", CZI, czi.clone())],
            FatalErrorPolicy::Exit,
            CancellationToken::new(),
        );

        assert!(scheduler.poll_once().await.is_err());

        assert_eq!(tiff.calls(), vec!["T1"]);
        assert!(czi.calls().is_empty());
        assert_eq!(store.claim_calls(), vec![TIFF]);
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1[0].text("RID"), Some("T1".to_string()));
        assert_eq!(scheduler.phase(), PollPhase::Idle);
    }

    #[tokio::test]
    async fn test_run_exit_policy_returns_error() {
        let store = store();
        let tiff = ScriptedHandler::new().script("T1", Script::Unclassified);
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, tiff)],
            FatalErrorPolicy::Exit,
            CancellationToken::new(),
        );

        assert!(scheduler.run().await.is_err());
    }

    #[tokio::test]
    async fn test_run_continue_policy_keeps_polling() {
        let store = store();
        let tiff = ScriptedHandler::new().script("T1", Script::Unclassified);
        let czi = ScriptedHandler::new();
        let cancel = CancellationToken::new();
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, tiff.clone()), ("czi", CZI, czi.clone())],
            FatalErrorPolicy::Continue,
            cancel.clone(),
        );

        let stopper = {
            let cancel = cancel.clone();
            let czi = czi.clone();
            tokio::spawn(async move {
                while czi.calls().is_empty() {
                    time::sleep(Duration::from_millis(1)).await;
                }
                cancel.cancel();
            })
        };

        tokio::time::timeout(Duration::from_secs(5), scheduler.run())
            .await
            .expect("scheduler stopped")
            .unwrap();
        stopper.await.unwrap();

        // T2 stays claimed from the aborted cycle; czi ran on a later cycle
        assert_eq!(tiff.calls(), vec!["T1"]);
        assert_eq!(czi.calls(), vec!["C1"]);
        assert_eq!(store.status_of("T1"), Some("error".to_string()));
        assert_eq!(store.status_of("T2"), Some("in progress".to_string()));
    }

    #[tokio::test]
    async fn test_run_returns_when_cancelled() {
        let store = store();
        let tiff = ScriptedHandler::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut scheduler = scheduler(
            &store,
            vec![("tiff", TIFF, tiff.clone())],
            FatalErrorPolicy::Exit,
            cancel,
        );

        scheduler.run().await.unwrap();

        assert!(tiff.calls().is_empty());
        assert!(store.claim_calls().is_empty());
    }

    #[test]
    fn test_policy_parsing() {
        let exit: FatalErrorPolicy = serde_json::from_str("\"exit\"").unwrap();
        let cont: FatalErrorPolicy = serde_json::from_str("\"continue\"").unwrap();
        assert_eq!(exit, FatalErrorPolicy::Exit);
        assert_eq!(cont, FatalErrorPolicy::Continue);
    }
}
