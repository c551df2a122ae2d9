//! Work unit registry
//!
//! A work unit describes one class of claimable work: where to find rows,
//! where to write claims and failures, how to build those payloads, and which
//! handler runs a claimed row. The registry is built once at startup and
//! never changes afterwards; the poller visits units in registration order.

use anyhow::Result;
use claimant_core::domain::{
    ClaimPayload, DEFAULT_IDENTIFIER_FIELD, FailurePayload, JobError, Row, StatusPayload,
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, HandlerConfig, WorkUnitConfig};
use crate::handler::{CommandHandler, JobHandler};

/// One registered class of claimable work
pub struct WorkUnit {
    name: String,
    claimable_query: String,
    claim_target: String,
    update_target: String,
    identifier_field: String,
    status_field: String,
    handler: Arc<dyn JobHandler>,
    claim_payload: ClaimPayload,
    failure_payload: FailurePayload,
}

impl WorkUnit {
    /// Starts building a unit with the default payload strategies
    pub fn builder(
        name: impl Into<String>,
        claimable_query: impl Into<String>,
        claim_target: impl Into<String>,
        update_target: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) -> WorkUnitBuilder {
        WorkUnitBuilder {
            name: name.into(),
            claimable_query: claimable_query.into(),
            claim_target: claim_target.into(),
            update_target: update_target.into(),
            identifier_field: DEFAULT_IDENTIFIER_FIELD.to_string(),
            status_field: "Processing_Status".to_string(),
            handler,
            claim_payload: None,
            failure_payload: None,
            claim_status: None,
            failure_status: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn claimable_query(&self) -> &str {
        &self.claimable_query
    }

    pub fn claim_target(&self) -> &str {
        &self.claim_target
    }

    pub fn update_target(&self) -> &str {
        &self.update_target
    }

    pub fn identifier_field(&self) -> &str {
        &self.identifier_field
    }

    pub fn status_field(&self) -> &str {
        &self.status_field
    }

    pub fn handler(&self) -> &dyn JobHandler {
        self.handler.as_ref()
    }

    pub fn claim_payload(&self) -> &ClaimPayload {
        &self.claim_payload
    }

    /// Failure mutation for `row`
    pub fn failure_input(&self, row: &Row, error: &JobError) -> Row {
        self.failure_payload.build(row, error)
    }
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("name", &self.name)
            .field("claimable_query", &self.claimable_query)
            .field("claim_target", &self.claim_target)
            .field("update_target", &self.update_target)
            .field("claim_payload", &self.claim_payload)
            .field("failure_payload", &self.failure_payload)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkUnit`]
pub struct WorkUnitBuilder {
    name: String,
    claimable_query: String,
    claim_target: String,
    update_target: String,
    identifier_field: String,
    status_field: String,
    handler: Arc<dyn JobHandler>,
    claim_payload: Option<ClaimPayload>,
    failure_payload: Option<FailurePayload>,
    claim_status: Option<String>,
    failure_status: Option<String>,
}

impl WorkUnitBuilder {
    pub fn identifier_field(mut self, field: impl Into<String>) -> Self {
        self.identifier_field = field.into();
        self
    }

    pub fn status_field(mut self, field: impl Into<String>) -> Self {
        self.status_field = field.into();
        self
    }

    /// Keeps the default claim payload but writes `status` instead of "in progress"
    pub fn claim_status(mut self, status: impl Into<String>) -> Self {
        self.claim_status = Some(status.into());
        self
    }

    /// Keeps the default failure payload but writes `status` instead of "error"
    pub fn failure_status(mut self, status: impl Into<String>) -> Self {
        self.failure_status = Some(status.into());
        self
    }

    /// Replaces the claim payload strategy entirely
    #[cfg(test)]
    pub fn claim_payload(mut self, payload: ClaimPayload) -> Self {
        self.claim_payload = Some(payload);
        self
    }

    /// Replaces the failure payload strategy entirely
    #[cfg(test)]
    pub fn failure_payload(mut self, payload: FailurePayload) -> Self {
        self.failure_payload = Some(payload);
        self
    }

    pub fn build(self) -> WorkUnit {
        let claim_payload = self.claim_payload.unwrap_or_else(|| match &self.claim_status {
            Some(status) => ClaimPayload::Status(StatusPayload::new(
                &self.identifier_field,
                &self.status_field,
                status,
            )),
            None => ClaimPayload::in_progress(&self.identifier_field, &self.status_field),
        });

        let failure_payload = self
            .failure_payload
            .unwrap_or_else(|| match &self.failure_status {
                Some(status) => FailurePayload::Status(StatusPayload::new(
                    &self.identifier_field,
                    &self.status_field,
                    status,
                )),
                None => FailurePayload::error(&self.identifier_field, &self.status_field),
            });

        WorkUnit {
            name: self.name,
            claimable_query: self.claimable_query,
            claim_target: self.claim_target,
            update_target: self.update_target,
            identifier_field: self.identifier_field,
            status_field: self.status_field,
            handler: self.handler,
            claim_payload,
            failure_payload,
        }
    }
}

/// Work units in registration order
#[derive(Debug, Default)]
pub struct Registry {
    units: Vec<Arc<WorkUnit>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry described by the configuration file
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        for unit in &config.work_units {
            registry.register(unit_from_config(config, unit))?;
        }
        Ok(registry)
    }

    /// Adds a unit after the ones already registered
    pub fn register(&mut self, unit: WorkUnit) -> Result<()> {
        if self.get(unit.name()).is_some() {
            anyhow::bail!("work unit '{}' is already registered", unit.name());
        }
        self.units.push(Arc::new(unit));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<WorkUnit>> {
        self.units.iter().find(|u| u.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkUnit>> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn unit_from_config(config: &Config, unit: &WorkUnitConfig) -> WorkUnit {
    let HandlerConfig::Command {
        program,
        args,
        working_dir,
        timeout_secs,
        success_status,
    } = &unit.handler;

    let handler = CommandHandler::new(program.clone(), args.clone())
        .working_dir(working_dir.clone())
        .timeout(timeout_secs.map(Duration::from_secs))
        .success_status(success_status.clone());

    let mut builder = WorkUnit::builder(
        &unit.name,
        &unit.claimable_query,
        &unit.claim_target,
        &unit.update_target,
        Arc::new(handler),
    )
    .identifier_field(&config.identifier_field)
    .status_field(&config.status_field);

    if let Some(status) = &unit.claim_status {
        builder = builder.claim_status(status);
    }
    if let Some(status) = &unit.failure_status {
        builder = builder.failure_status(status);
    }

    builder.build()
}
