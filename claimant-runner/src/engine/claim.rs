//! Claim engine
//!
//! One claim attempt per work unit per poll cycle. The query and the claim
//! travel in a single conditional round-trip keyed by the unit's cached
//! entity tag, so an idle store costs one cheap "not modified" per cycle.

use claimant_client::{ClaimRequest, RemoteStore};
use claimant_core::domain::{ClaimBatch, EntityTag};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::registry::WorkUnit;

/// Result of one claim attempt
#[derive(Debug)]
pub enum ClaimAttempt {
    /// The store answered; the batch may be empty
    Claimed(ClaimBatch),
    /// The store call failed; the unit sits this cycle out
    Skipped,
}

/// Performs conditional claims against the shared store
pub struct ClaimEngine {
    store: Arc<dyn RemoteStore>,
}

impl ClaimEngine {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Attempts to claim the unit's claimable rows
    ///
    /// On success `token` is replaced by whatever the store returned, even
    /// when nothing was claimed. On a store error `token` is left untouched
    /// and the unit is skipped; the error never leaves this method.
    pub async fn try_claim(&self, unit: &WorkUnit, token: &mut Option<EntityTag>) -> ClaimAttempt {
        let request = ClaimRequest {
            query: unit.claimable_query(),
            target: unit.claim_target(),
            identifier_field: unit.identifier_field(),
            payload: unit.claim_payload(),
            token: token.as_ref(),
        };

        match self.store.conditional_claim(request).await {
            Ok((new_token, batch)) => {
                if batch.is_empty() {
                    debug!(unit = %unit.name(), token = ?new_token, "No claimable rows");
                } else {
                    info!(
                        unit = %unit.name(),
                        "Claimed {} row(s)",
                        batch.len()
                    );
                }
                *token = new_token;
                ClaimAttempt::Claimed(batch)
            }
            Err(e) => {
                if e.is_auth_error() {
                    warn!(unit = %unit.name(), "Catalog rejected credentials, skipping unit: {}", e);
                } else {
                    warn!(unit = %unit.name(), "Claim failed, skipping unit this cycle: {}", e);
                }
                ClaimAttempt::Skipped
            }
        }
    }
}
