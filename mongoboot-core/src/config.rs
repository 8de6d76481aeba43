//! Bootstrap configuration.
//!
//! `BootstrapConfig` carries everything one `connect` call needs. The dial
//! timeout lives here instead of in process-wide state, so concurrent callers
//! and tests never observe each other's overrides.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Dial timeout applied when the configuration does not set one.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a single bootstrap call.
///
/// # Security
/// The URI may contain credentials. `Display` and `Debug` never print it
/// unredacted.
///
/// # Example
/// ```rust
/// use mongoboot_core::BootstrapConfig;
/// use std::time::Duration;
///
/// let config = BootstrapConfig::new("mongodb://localhost:27017/test")
///     .with_ca_cert("/etc/ssl/mongo/ca.pem")
///     .with_client_cert("/etc/ssl/mongo/client.pem")
///     .with_dial_timeout(Duration::from_secs(5));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.dial_timeout(), Duration::from_secs(5));
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Connection string naming seed addresses and one database
    pub uri: String,
    /// PEM file with one or more CA certificates (enables TLS)
    #[serde(default, deserialize_with = "deserialize_optional_path")]
    pub ca_cert_path: Option<PathBuf>,
    /// PEM file with the client certificate followed by its private key
    #[serde(default, deserialize_with = "deserialize_optional_path")]
    pub client_cert_path: Option<PathBuf>,
    /// Dial timeout override
    #[serde(default)]
    pub dial_timeout: Option<Duration>,
    /// Application name reported to the server
    #[serde(default)]
    pub app_name: Option<String>,
}

impl std::fmt::Debug for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapConfig")
            .field("uri", &crate::error::redact_database_url(&self.uri))
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_cert_path", &self.client_cert_path)
            .field("dial_timeout", &self.dial_timeout())
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl std::fmt::Display for BootstrapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BootstrapConfig({}, tls={}, x509={})",
            crate::error::redact_database_url(&self.uri),
            self.ca_cert().is_some(),
            self.client_cert().is_some()
        )
    }
}

impl BootstrapConfig {
    /// Creates a plain-transport configuration with the default dial timeout.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ca_cert_path: None,
            client_cert_path: None,
            dial_timeout: None,
            app_name: None,
        }
    }

    /// Builds a configuration from the three positional bootstrap inputs.
    ///
    /// Empty path strings mean "not supplied".
    pub fn from_parts(uri: &str, ca_cert_path: &str, client_cert_path: &str) -> Self {
        Self::new(uri)
            .with_ca_cert(ca_cert_path)
            .with_client_cert(client_cert_path)
    }

    /// Builder method to set the CA certificate path.
    pub fn with_ca_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.ca_cert_path = non_empty_path(path.as_ref());
        self
    }

    /// Builder method to set the combined client certificate/key path.
    pub fn with_client_cert(mut self, path: impl AsRef<Path>) -> Self {
        self.client_cert_path = non_empty_path(path.as_ref());
        self
    }

    /// Builder method to override the dial timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    /// Builder method to set the application name.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// CA certificate path, if one was supplied.
    ///
    /// An empty path counts as not supplied.
    pub fn ca_cert(&self) -> Option<&Path> {
        self.ca_cert_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Client certificate path, if one was supplied.
    ///
    /// An empty path counts as not supplied.
    pub fn client_cert(&self) -> Option<&Path> {
        self.client_cert_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Effective dial timeout.
    pub fn dial_timeout(&self) -> Duration {
        self.dial_timeout.unwrap_or(DEFAULT_DIAL_TIMEOUT)
    }

    /// Effective application name.
    pub fn app_name(&self) -> String {
        self.app_name
            .clone()
            .unwrap_or_else(|| format!("mongoboot-{}", env!("CARGO_PKG_VERSION")))
    }

    /// Validates the input combination without touching the filesystem or network.
    ///
    /// # Errors
    /// Returns a configuration error if a client certificate is supplied
    /// without a CA certificate, or if the dial timeout is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.client_cert().is_some() && self.ca_cert().is_none() {
            return Err(crate::error::BootstrapError::configuration(
                "client certificate requires a CA certificate",
            ));
        }

        if self.dial_timeout().is_zero() {
            return Err(crate::error::BootstrapError::configuration(
                "dial_timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn non_empty_path(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path.to_path_buf())
    }
}

fn deserialize_optional_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let path: Option<PathBuf> = Option::deserialize(deserializer)?;
    Ok(path.as_deref().and_then(non_empty_path))
}
