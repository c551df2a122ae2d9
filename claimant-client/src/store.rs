//! Remote store contract
//!
//! The runner only needs three things from the store: a conditional read of
//! claimable rows, a conditional claim, and an unconditional write for status
//! reporting. The conditional claim is the only mutual-exclusion primitive
//! between competing pollers.

use async_trait::async_trait;
use claimant_core::domain::{ClaimBatch, ClaimPayload, EntityTag, Row};
use tracing::{debug, warn};

use crate::CatalogClient;
use crate::entity::Conditional;
use crate::error::{Result, StoreError};

/// One conditional claim attempt
#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest<'a> {
    /// Query path selecting claimable rows
    pub query: &'a str,
    /// Path the claim payloads are written to
    pub target: &'a str,
    /// Column identifying rows, used to pair acknowledgements with rows
    pub identifier_field: &'a str,
    /// Builds the claim mutation for each candidate row
    pub payload: &'a ClaimPayload,
    /// Tag observed by the previous attempt, if any
    pub token: Option<&'a EntityTag>,
}

/// Operations the poller needs from the shared row store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the claimable rows and the tag describing them
    ///
    /// When nothing changed since `token`, returns no rows and the same token.
    async fn query_claimable(
        &self,
        query: &str,
        token: Option<&EntityTag>,
    ) -> Result<(Vec<Row>, Option<EntityTag>)>;

    /// Finds claimable rows and claims them in one optimistic round-trip
    ///
    /// Returns the new token and the rows this caller actually claimed.
    /// Losing a race to another claimant is not an error: it yields an empty
    /// batch and no token, so the next attempt starts from a fresh read.
    async fn conditional_claim(
        &self,
        request: ClaimRequest<'_>,
    ) -> Result<(Option<EntityTag>, ClaimBatch)>;

    /// Applies `payload` unconditionally
    async fn write(&self, target: &str, payload: &[Row]) -> Result<()>;
}

#[async_trait]
impl RemoteStore for CatalogClient {
    async fn query_claimable(
        &self,
        query: &str,
        token: Option<&EntityTag>,
    ) -> Result<(Vec<Row>, Option<EntityTag>)> {
        match self.get_entities(query, token).await? {
            Conditional::NotModified => Ok((Vec::new(), token.cloned())),
            Conditional::Modified { body, etag } => Ok((body, etag)),
        }
    }

    async fn conditional_claim(
        &self,
        request: ClaimRequest<'_>,
    ) -> Result<(Option<EntityTag>, ClaimBatch)> {
        let (rows, query_tag) = self.query_claimable(request.query, request.token).await?;

        if rows.is_empty() {
            return Ok((query_tag, ClaimBatch::empty()));
        }

        // Without a tag the write below would be unconditional
        let Some(query_tag) = query_tag else {
            return Err(StoreError::ParseError(format!(
                "{} returned rows without an ETag; refusing unconditional claim",
                request.query
            )));
        };

        let payloads: Vec<Row> = rows.iter().map(|row| request.payload.build(row)).collect();

        match self
            .put_entities(request.target, &payloads, Some(&query_tag))
            .await
        {
            Ok((acks, claim_tag)) => {
                let batch = pair_acknowledgements(rows, payloads, acks, request.identifier_field);
                Ok((claim_tag, batch))
            }
            Err(e) if e.is_precondition_failed() => {
                debug!(
                    "Lost claim race on {} at {}; will re-read next cycle",
                    request.target, query_tag
                );
                Ok((None, ClaimBatch::empty()))
            }
            Err(e) => Err(e),
        }
    }

    async fn write(&self, target: &str, payload: &[Row]) -> Result<()> {
        self.put_entities(target, payload, None).await.map(|_| ())
    }
}

/// Pairs each queried row with the store's acknowledgement, in query order
///
/// A successful conditional write applies every payload, so a store that
/// acknowledges with an empty body gets the payloads as acknowledgements.
/// Otherwise rows are matched by identifier and unacknowledged rows dropped.
fn pair_acknowledgements(
    rows: Vec<Row>,
    payloads: Vec<Row>,
    acks: Vec<Row>,
    identifier_field: &str,
) -> ClaimBatch {
    let mut batch = ClaimBatch::empty();

    if acks.is_empty() {
        for (row, payload) in rows.into_iter().zip(payloads) {
            batch.push(row, payload);
        }
        return batch;
    }

    for row in rows {
        let Some(id) = row.identifier(identifier_field) else {
            warn!("Claimed row without {} skipped", identifier_field);
            continue;
        };

        match acks
            .iter()
            .find(|ack| ack.identifier(identifier_field) == Some(id))
        {
            Some(ack) => {
                let ack = ack.clone();
                batch.push(row, ack);
            }
            None => debug!(
                "Row {} was not acknowledged by the claim",
                row.display_id(identifier_field)
            ),
        }
    }

    batch
}
