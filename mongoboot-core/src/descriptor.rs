//! Connection descriptor parsed from a connection URI.
//!
//! Parsing is delegated to the driver's connection-string parser, so every URI
//! form the driver accepts is accepted here. The descriptor adds one rule on
//! top: the URI must name exactly one target database.

use crate::error::{BootstrapError, redact_database_url};
use crate::Result;
use mongodb::options::ClientOptions;
use std::time::Duration;

/// Seeds, target database and dial timeout of one bootstrap.
///
/// Holds no credentials and may be logged or displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Seed addresses as `host:port`
    pub hosts: Vec<String>,
    /// Target database name
    pub database: String,
    /// Dial timeout for this bootstrap
    pub dial_timeout: Duration,
}

impl std::fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]/{}", self.hosts.join(","), self.database)
    }
}

impl ConnectionDescriptor {
    /// Parses a connection URI into a descriptor and the driver options.
    ///
    /// # Arguments
    /// * `uri` - Connection string (credentials sanitized in errors)
    /// * `dial_timeout` - Explicit timeout override, if any
    ///
    /// # Errors
    /// Returns a parse error if the driver rejects the URI or the URI does not
    /// name a database.
    pub async fn parse(
        uri: &str,
        dial_timeout: Option<Duration>,
    ) -> Result<(Self, ClientOptions)> {
        let options = ClientOptions::parse(uri).await.map_err(|e| {
            BootstrapError::parse_failed(
                format!("parsing connection string {}", redact_database_url(uri)),
                e,
            )
        })?;

        let descriptor = Self::from_options(&options, dial_timeout)?;
        Ok((descriptor, options))
    }

    /// Builds a descriptor from already parsed driver options.
    ///
    /// # Errors
    /// Returns a parse error if the options carry no database name.
    pub fn from_options(options: &ClientOptions, dial_timeout: Option<Duration>) -> Result<Self> {
        let database = options
            .default_database
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                BootstrapError::parse(
                    "connection string must name a target database (mongodb://host:port/database)",
                )
            })?
            .to_string();

        let hosts = options.hosts.iter().map(ToString::to_string).collect();

        Ok(Self {
            hosts,
            database,
            dial_timeout: resolve_dial_timeout(dial_timeout, options.connect_timeout),
        })
    }
}

/// Explicit override wins, then a timeout already set in the URI, then the default.
fn resolve_dial_timeout(explicit: Option<Duration>, from_uri: Option<Duration>) -> Duration {
    explicit
        .or(from_uri)
        .unwrap_or(crate::config::DEFAULT_DIAL_TIMEOUT)
}
