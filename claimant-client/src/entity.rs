//! Entity endpoints
//!
//! Conditional reads and writes of row sets. Reads honour `If-None-Match`,
//! writes honour `If-Match`; both return the entity tag the store reported.

use crate::CatalogClient;
use crate::error::Result;
use claimant_core::domain::{EntityTag, Row};
use reqwest::StatusCode;
use reqwest::header;
use tracing::debug;

/// Result of a conditional read
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    /// Store answered 304: nothing changed since the submitted tag
    NotModified,
    /// Fresh content and the tag describing it
    Modified { body: T, etag: Option<EntityTag> },
}

impl CatalogClient {
    // =============================================================================
    // Entity Reads
    // =============================================================================

    /// Fetch the rows addressed by `path`
    ///
    /// # Arguments
    /// * `path` - Catalog-relative query path (e.g. "/entity/S:T/Status=new")
    /// * `if_none_match` - Tag from a previous read; unchanged data yields
    ///   [`Conditional::NotModified`] without a body
    pub async fn get_entities(
        &self,
        path: &str,
        if_none_match: Option<&EntityTag>,
    ) -> Result<Conditional<Vec<Row>>> {
        let url = self.url(path);
        let mut request = self.client.get(&url);
        if let Some(tag) = if_none_match {
            request = request.header(header::IF_NONE_MATCH, tag.as_str());
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("GET {} not modified since {:?}", path, if_none_match);
            return Ok(Conditional::NotModified);
        }

        let response = self.check_status(response).await?;
        let etag = Self::entity_tag(&response)?;
        let body = self.read_rows(response).await?;

        debug!("GET {} returned {} row(s), etag {:?}", path, body.len(), etag);
        Ok(Conditional::Modified { body, etag })
    }

    // =============================================================================
    // Entity Writes
    // =============================================================================

    /// Write `rows` to `path`
    ///
    /// # Arguments
    /// * `path` - Catalog-relative update path
    /// * `rows` - Row payloads, each carrying its identifier
    /// * `if_match` - When set, the store applies the write only if the data
    ///   still matches this tag and otherwise answers 412
    ///
    /// # Returns
    /// The rows as the store acknowledged them and the new entity tag
    pub async fn put_entities(
        &self,
        path: &str,
        rows: &[Row],
        if_match: Option<&EntityTag>,
    ) -> Result<(Vec<Row>, Option<EntityTag>)> {
        let url = self.url(path);
        let mut request = self.client.put(&url).json(rows);
        if let Some(tag) = if_match {
            request = request.header(header::IF_MATCH, tag.as_str());
        }

        let response = self.check_status(request.send().await?).await?;
        let etag = Self::entity_tag(&response)?;
        let acks = self.read_rows(response).await?;

        debug!(
            "PUT {} wrote {} row(s), acknowledged {}",
            path,
            rows.len(),
            acks.len()
        );
        Ok((acks, etag))
    }
}
