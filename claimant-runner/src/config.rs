//! Runner configuration
//!
//! Loads the JSON configuration file describing the catalog connection,
//! polling behaviour and the work units to register, and validates it.

use anyhow::{Context, Result};
use claimant_core::domain::DEFAULT_IDENTIFIER_FIELD;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::scheduler::FatalErrorPolicy;

/// Default seconds between poll cycles
pub const DEFAULT_POLL_SECONDS: u64 = 300;

const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_STATUS_FIELD: &str = "Processing_Status";

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog base URL (e.g., "https://host/ermrest/catalog/1")
    pub catalog_url: String,

    /// Credentials file named by the configuration
    pub credentials_file: Option<PathBuf>,

    /// Session credentials read from `credentials_file`
    pub credentials: Option<Credentials>,

    /// Identity reported to the catalog in the client-context header
    pub client_id: String,

    /// Fixed wait between poll cycles
    pub poll_interval: Duration,

    /// Timeout applied to every catalog request
    pub request_timeout: Duration,

    /// Column holding the row identifier
    pub identifier_field: String,

    /// Column the default claim/failure payloads write
    pub status_field: String,

    /// What to do when a job fails with an unclassified error
    pub fatal_error_policy: FatalErrorPolicy,

    /// Start the next cycle immediately when the last one found work
    pub rescan_on_work: bool,

    /// Default tracing filter when RUST_LOG is unset (e.g., "info")
    pub log_level: Option<String>,

    /// File receiving a copy of the log output
    pub log_file: Option<PathBuf>,

    /// Work units, in registration order
    pub work_units: Vec<WorkUnitConfig>,
}

/// One work unit as written in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct WorkUnitConfig {
    pub name: String,
    pub claimable_query: String,
    pub claim_target: String,
    pub update_target: String,
    /// Overrides the "in progress" value of the default claim payload
    #[serde(default)]
    pub claim_status: Option<String>,
    /// Overrides the "error" value of the default failure payload
    #[serde(default)]
    pub failure_status: Option<String>,
    pub handler: HandlerConfig,
}

/// Job handler selection
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Run an external program once per row
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
        #[serde(default)]
        timeout_secs: Option<u64>,
        /// Status the handler writes itself after a successful run
        #[serde(default)]
        success_status: Option<String>,
    },
}

/// Layout of the configuration file
#[derive(Debug, Deserialize)]
struct ConfigFile {
    catalog_url: String,
    #[serde(default)]
    credentials_file: Option<PathBuf>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    poll_interval_secs: Option<u64>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    identifier_field: Option<String>,
    #[serde(default)]
    status_field: Option<String>,
    #[serde(default)]
    fatal_error_policy: FatalErrorPolicy,
    #[serde(default)]
    rescan_on_work: bool,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    log_file: Option<PathBuf>,
    #[serde(default)]
    work_units: Vec<WorkUnitConfig>,
}

impl Config {
    /// Loads the configuration file and the credentials it points to
    ///
    /// # Arguments
    /// * `path` - JSON configuration file
    /// * `poll_seconds` - Poll interval override (command line or
    ///   CLAIMANT_POLL_SECONDS); wins over the file
    pub fn load(path: &Path, poll_seconds: Option<u64>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Configuration file {} not readable", path.display()))?;
        let mut config = Self::from_json(&raw)
            .with_context(|| format!("Malformed configuration file {}", path.display()))?;

        if let Some(secs) = poll_seconds {
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(credentials_file) = &config.credentials_file {
            let host = host_of(&config.catalog_url)
                .context("Cannot determine catalog host for credential lookup")?;
            config.credentials = Some(Credentials::load(credentials_file, &host)?);
        }

        Ok(config)
    }

    /// Parses configuration JSON without touching the filesystem
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(raw)?;

        Ok(Self {
            catalog_url: file.catalog_url,
            credentials_file: file.credentials_file,
            credentials: None,
            client_id: file
                .client_id
                .unwrap_or_else(|| format!("claimant-runner/{}", uuid::Uuid::new_v4())),
            poll_interval: Duration::from_secs(
                file.poll_interval_secs.unwrap_or(DEFAULT_POLL_SECONDS),
            ),
            request_timeout: Duration::from_secs(
                file.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            ),
            identifier_field: file
                .identifier_field
                .unwrap_or_else(|| DEFAULT_IDENTIFIER_FIELD.to_string()),
            status_field: file
                .status_field
                .unwrap_or_else(|| DEFAULT_STATUS_FIELD.to_string()),
            fatal_error_policy: file.fatal_error_policy,
            rescan_on_work: file.rescan_on_work,
            log_level: file.log_level,
            log_file: file.log_file,
            work_units: file.work_units,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.catalog_url.is_empty() {
            anyhow::bail!("catalog_url cannot be empty");
        }

        let url = Url::parse(&self.catalog_url)
            .with_context(|| format!("catalog_url '{}' is not a valid URL", self.catalog_url))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            anyhow::bail!("catalog_url must be an http:// or https:// URL with a host");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.request_timeout.as_secs() == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.identifier_field.is_empty() || self.status_field.is_empty() {
            anyhow::bail!("identifier_field and status_field cannot be empty");
        }

        self.log_filter()?;

        if self.work_units.is_empty() {
            anyhow::bail!("at least one work unit must be configured");
        }

        let mut names = HashSet::new();
        for unit in &self.work_units {
            if unit.name.is_empty() {
                anyhow::bail!("work unit name cannot be empty");
            }
            if !names.insert(unit.name.as_str()) {
                anyhow::bail!("duplicate work unit '{}'", unit.name);
            }
            if unit.claimable_query.is_empty()
                || unit.claim_target.is_empty()
                || unit.update_target.is_empty()
            {
                anyhow::bail!(
                    "work unit '{}' needs claimable_query, claim_target and update_target",
                    unit.name
                );
            }
            let HandlerConfig::Command {
                program,
                timeout_secs,
                ..
            } = &unit.handler;
            if program.is_empty() {
                anyhow::bail!("work unit '{}' has an empty handler program", unit.name);
            }
            if *timeout_secs == Some(0) {
                anyhow::bail!("work unit '{}' handler timeout must be > 0", unit.name);
            }
        }

        Ok(())
    }
}

impl Config {
    /// Tracing filter for the configured `log_level`, if any
    pub fn log_filter(&self) -> Result<Option<String>> {
        self.log_level.as_deref().map(log_filter).transpose()
    }
}

/// Maps a level name to a tracing filter
///
/// "warning", "critical" and "fatal" are accepted as aliases; anything
/// containing `=` or `,` is taken as a full filter directive.
fn log_filter(level: &str) -> Result<String> {
    let level = level.trim();
    if level.contains(['=', ',']) {
        return Ok(level.to_string());
    }

    let mapped = match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        "off" => "off",
        _ => anyhow::bail!("unknown log_level '{}'", level),
    };
    Ok(mapped.to_string())
}

/// Server name of a URL, without port; credentials files are keyed by it
fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// Session credentials for the catalog
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub cookie: String,
}

impl Credentials {
    /// Reads a credentials file
    ///
    /// Accepts either `{"cookie": "..."}` or a map keyed by host,
    /// `{"<host>": {"cookie": "..."}}`.
    pub fn load(path: &Path, host: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Credentials file {} not readable", path.display()))?;
        Self::from_json(&raw, host)
            .with_context(|| format!("Malformed credentials file {}", path.display()))
    }

    pub fn from_json(raw: &str, host: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let entry = if value.get("cookie").is_some() {
            &value
        } else {
            value
                .get(host)
                .with_context(|| format!("no credentials for host {}", host))?
        };

        let cookie = entry
            .get("cookie")
            .and_then(|c| c.as_str())
            .context("credentials entry has no string 'cookie'")?;

        Ok(Self {
            cookie: cookie.to_string(),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cookie", &"<redacted>")
            .finish()
    }
}
