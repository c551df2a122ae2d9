//! Test doubles: an in-memory row store and a scripted job handler

use async_trait::async_trait;
use claimant_client::{ClaimRequest, RemoteStore, StoreError};
use claimant_core::domain::{ClaimBatch, EntityTag, JobError, Row};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::context::JobContext;
use crate::handler::JobHandler;
use crate::registry::WorkUnit;

pub const STATUS: &str = "Processing_Status";

/// Builds a unit whose query doubles as its name-scoped targets
pub fn unit(name: &str, query: &str, handler: Arc<dyn JobHandler>) -> WorkUnit {
    WorkUnit::builder(
        name,
        query,
        format!("/claim/{}", name),
        format!("/update/{}", name),
        handler,
    )
    .build()
}

/// Single-table store with a global version counter
///
/// Queries are `Field=value` conditions joined by `&`. Every mutation bumps
/// the version; the version doubles as the entity tag.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    rows: Vec<Row>,
    version: u64,
    writes: Vec<(String, Vec<Row>)>,
    claim_calls: Vec<String>,
    failing_queries: HashSet<String>,
    failing_writes: bool,
}

impl MemoryStore {
    pub fn new(rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|v| Row::try_from(v).expect("test rows are objects"))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                rows,
                version: 1,
                writes: Vec::new(),
                claim_calls: Vec::new(),
                failing_queries: HashSet::new(),
                failing_writes: false,
            }),
        }
    }

    /// Claims against `query` fail with a 503 from now on
    pub fn fail_claims(&self, query: &str) {
        self.inner.lock().unwrap().failing_queries.insert(query.to_string());
    }

    pub fn fail_writes(&self) {
        self.inner.lock().unwrap().failing_writes = true;
    }

    /// Inserts a new row, as another client of the store would
    pub fn insert(&self, row: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.rows.push(Row::try_from(row).unwrap());
        inner.version += 1;
    }

    pub fn tag(&self) -> EntityTag {
        Inner::tag(self.inner.lock().unwrap().version)
    }

    pub fn writes(&self) -> Vec<(String, Vec<Row>)> {
        self.inner.lock().unwrap().writes.clone()
    }

    pub fn claim_calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().claim_calls.clone()
    }

    pub fn status_of(&self, rid: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .rows
            .iter()
            .find(|r| r.text("RID").as_deref() == Some(rid))
            .and_then(|r| r.text(STATUS))
    }
}

impl Inner {
    fn tag(version: u64) -> EntityTag {
        EntityTag::new(format!("\"v{}\"", version))
    }

    fn matching(&self, query: &str) -> Vec<Row> {
        let conditions: Vec<(&str, &str)> = query
            .split('&')
            .filter_map(|c| c.split_once('='))
            .collect();
        self.rows
            .iter()
            .filter(|row| {
                conditions
                    .iter()
                    .all(|(field, value)| row.text(field).as_deref() == Some(*value))
            })
            .cloned()
            .collect()
    }

    fn apply(&mut self, payload: &Row) -> Option<Row> {
        let id = payload.identifier("RID")?.clone();
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.identifier("RID") == Some(&id))?;
        row.merge(payload);
        Some(row.clone())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query_claimable(
        &self,
        query: &str,
        token: Option<&EntityTag>,
    ) -> Result<(Vec<Row>, Option<EntityTag>), StoreError> {
        let inner = self.inner.lock().unwrap();
        let current = Inner::tag(inner.version);
        if token == Some(&current) {
            return Ok((Vec::new(), Some(current)));
        }
        Ok((inner.matching(query), Some(current)))
    }

    async fn conditional_claim(
        &self,
        request: ClaimRequest<'_>,
    ) -> Result<(Option<EntityTag>, ClaimBatch), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.claim_calls.push(request.query.to_string());

        if inner.failing_queries.contains(request.query) {
            return Err(StoreError::api_error(503, "catalog unavailable"));
        }

        let current = Inner::tag(inner.version);
        if request.token == Some(&current) {
            return Ok((Some(current), ClaimBatch::empty()));
        }

        let candidates = inner.matching(request.query);
        if candidates.is_empty() {
            return Ok((Some(current), ClaimBatch::empty()));
        }

        let mut batch = ClaimBatch::empty();
        for row in candidates {
            let payload = request.payload.build(&row);
            if let Some(ack) = inner.apply(&payload) {
                batch.push(row, ack);
            }
        }
        inner.version += 1;

        Ok((Some(Inner::tag(inner.version)), batch))
    }

    async fn write(&self, target: &str, payload: &[Row]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.writes.push((target.to_string(), payload.to_vec()));

        if inner.failing_writes {
            return Err(StoreError::api_error(500, "write rejected"));
        }

        for row in payload {
            inner.apply(row);
        }
        inner.version += 1;
        Ok(())
    }
}

/// What the scripted handler does for a given row
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Data,
    Runtime,
    Unclassified,
}

/// Handler whose per-row result is scripted by identifier
#[derive(Default)]
pub struct ScriptedHandler {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(self: &Arc<Self>, rid: &str, script: Script) -> Arc<Self> {
        self.scripts.lock().unwrap().insert(rid.to_string(), script);
        Arc::clone(self)
    }

    /// Identifiers of the rows the handler ran for, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn run(&self, ctx: &JobContext<'_>) -> Result<(), JobError> {
        let rid = ctx.display_id();
        self.calls.lock().unwrap().push(rid.clone());

        let script = self.scripts.lock().unwrap().get(&rid).copied();
        match script {
            None => Ok(()),
            Some(Script::Data) => Err(JobError::data_validation(format!("{} unreadable", rid))),
            Some(Script::Runtime) => Err(JobError::runtime(format!("{} tool exited 1", rid))),
            Some(Script::Unclassified) => Err(anyhow::anyhow!("{} broke an invariant", rid).into()),
        }
    }
}
