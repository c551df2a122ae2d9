//! Execution context for claimed rows
//!
//! Binds one claimed row to the work unit that claimed it and to the shared
//! store, so handlers can read the row and write their own status.

use claimant_client::{RemoteStore, StoreError};
use claimant_core::domain::{JobError, Row};

use crate::registry::WorkUnit;

/// Everything a handler sees while processing one row
pub struct JobContext<'a> {
    /// The row as it looked when it was claimed
    pub row: &'a Row,

    /// The store's acknowledgement of the claim
    pub ack: &'a Row,

    unit: &'a WorkUnit,
    store: &'a dyn RemoteStore,
}

impl<'a> JobContext<'a> {
    pub fn new(row: &'a Row, ack: &'a Row, unit: &'a WorkUnit, store: &'a dyn RemoteStore) -> Self {
        Self {
            row,
            ack,
            unit,
            store,
        }
    }

    pub fn unit(&self) -> &WorkUnit {
        self.unit
    }

    /// Row identifier rendered as text, if present
    pub fn id(&self) -> Option<String> {
        self.row.text(self.unit.identifier_field())
    }

    /// Printable identifier for log lines
    pub fn display_id(&self) -> String {
        self.row
            .display_id(self.unit.identifier_field())
            .to_string()
    }

    /// Reads a required text field; absence is a data error on the row
    pub fn require(&self, field: &str) -> Result<String, JobError> {
        self.row.text(field).ok_or_else(|| {
            JobError::data_validation(format!(
                "row {} has no value for '{}'",
                self.display_id(),
                field
            ))
        })
    }

    /// Writes `payload` to the unit's update target
    pub async fn report(&self, payload: Row) -> Result<(), StoreError> {
        self.store
            .write(self.unit.update_target(), std::slice::from_ref(&payload))
            .await
    }

    /// Writes `{identifier: id, status_field: status}` to the unit's update target
    pub async fn report_status(&self, status: &str) -> Result<(), StoreError> {
        let id = self
            .row
            .identifier(self.unit.identifier_field())
            .cloned()
            .unwrap_or_default();
        let mut payload = Row::with_identifier(self.unit.identifier_field(), id);
        payload.insert(self.unit.status_field(), status);
        self.report(payload).await
    }
}
