//! Claimant Store Client
//!
//! A small HTTP client for the shared row store the poller claims work from.
//!
//! The store is an ERMrest-style catalog: rows are JSON objects, queries are
//! URL paths, and every response carries an `ETag` that can be echoed back in
//! `If-None-Match` (skip unchanged results) or `If-Match` (write only if
//! nothing changed since). The [`RemoteStore`] trait is the narrow contract
//! the runner depends on; [`CatalogClient`] implements it over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use claimant_client::{CatalogClient, Conditional};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CatalogClient::new("https://example.org/ermrest/catalog/1");
//!
//!     let page = client
//!         .get_entities("/entity/Imaging:Image/Processing_Status=new", None)
//!         .await?;
//!
//!     if let Conditional::Modified { body, etag } = page {
//!         println!("{} claimable rows at {:?}", body.len(), etag);
//!     }
//!     Ok(())
//! }
//! ```

mod entity;
pub mod error;
pub mod store;

// Re-export commonly used types
pub use claimant_core::domain::{ClaimBatch, EntityTag, Row};
pub use entity::Conditional;
pub use error::{Result, StoreError};
pub use store::{ClaimRequest, RemoteStore};

use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;

/// Header carrying the client context, as understood by DERIVA services
pub const CLIENT_CONTEXT_HEADER: &str = "Deriva-Client-Context";

/// Connection options for [`CatalogClient::with_options`]
#[derive(Default, Clone)]
pub struct ClientOptions {
    /// Session cookie sent with every request (e.g. `webauthn=...`)
    pub cookie: Option<String>,
    /// Client id reported in the client-context header
    pub client_id: Option<String>,
    /// Per-request timeout
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// HTTP client for the row store
///
/// Cheap to clone; all clones share one connection pool, so a single
/// instance serves every work unit of the poller.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    /// Base URL of the catalog (e.g., "https://host/ermrest/catalog/1")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl CatalogClient {
    /// Create a new catalog client with a default HTTP client
    ///
    /// # Example
    /// ```
    /// use claimant_client::CatalogClient;
    ///
    /// let client = CatalogClient::new("https://example.org/ermrest/catalog/1/");
    /// assert_eq!(client.base_url(), "https://example.org/ermrest/catalog/1");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new catalog client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create a catalog client with credentials, client context and timeout
    pub fn with_options(base_url: impl Into<String>, options: ClientOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();

        if let Some(cookie) = &options.cookie {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|e| StoreError::InvalidRequest(format!("Invalid cookie: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(header::COOKIE, value);
        }

        if let Some(client_id) = &options.client_id {
            let context = serde_json::json!({ "cid": client_id }).to_string();
            let value = HeaderValue::from_str(&context)
                .map_err(|e| StoreError::InvalidRequest(format!("Invalid client id: {}", e)))?;
            headers.insert(CLIENT_CONTEXT_HEADER, value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::with_client(base_url, builder.build()?))
    }

    /// Get the base URL of the catalog
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a catalog-relative path against the base URL
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and turn a failure into a [`StoreError::ApiError`]
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Read the `ETag` header of a response, if any
    fn entity_tag(response: &reqwest::Response) -> Result<Option<EntityTag>> {
        response
            .headers()
            .get(header::ETAG)
            .map(|value| {
                value
                    .to_str()
                    .map(EntityTag::from)
                    .map_err(|e| StoreError::ParseError(format!("Invalid ETag header: {}", e)))
            })
            .transpose()
    }

    /// Deserialize a JSON array of rows; an empty body counts as no rows
    async fn read_rows(&self, response: reqwest::Response) -> Result<Vec<Row>> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
