//! Connection bootstrap.
//!
//! Turns a [`BootstrapConfig`] into a live, configured [`Handle`]:
//!
//! 1. Validate the input combination (no I/O)
//! 2. Parse the URI into a [`ConnectionDescriptor`]
//! 3. Load the client certificate/key pair, if any
//! 4. Load the CA trust anchor and switch the cluster to TLS, if any
//! 5. Apply the dial timeout
//! 6. Apply the fixed [`SessionPolicy`]
//! 7. Install the X.509 credential derived from the client certificate
//! 8. Dial, then bind the session to the target database
//!
//! Every failure is returned immediately with the failing step in its context.
//! Nothing is retried.
//!
//! # Security
//! - Connection strings are redacted in every log line and error
//! - Client key bytes are dropped before the dial

use crate::config::BootstrapConfig;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{BootstrapError, redact_database_url};
use crate::handle::Handle;
use crate::policy::SessionPolicy;
use crate::tls::{ClientIdentity, TlsMaterial, TrustAnchor};
use crate::Result;
use mongodb::Client;
use mongodb::error::ErrorKind;
use mongodb::options::{AuthMechanism, ClientOptions, Credential};

/// Authentication source reserved for externally verified principals.
pub const EXTERNAL_AUTH_SOURCE: &str = "$external";

/// Server error code for a rejected authentication.
const AUTHENTICATION_FAILED_CODE: i32 = 18;

/// Everything the bootstrap decided before touching the network.
#[derive(Debug, Clone)]
pub struct PreparedBootstrap {
    /// Parsed connection descriptor
    pub descriptor: ConnectionDescriptor,
    /// Driver options: TLS, timeouts, session policy and credential
    pub options: ClientOptions,
    /// Whether a client certificate is used for authentication
    pub x509: bool,
}

/// Connects using the three positional inputs.
///
/// Empty `ca_cert_path` means plain transport; empty `client_cert_path` means
/// no certificate authentication.
///
/// # Example
/// ```rust,no_run
/// # async fn run() -> mongoboot_core::Result<()> {
/// let handle = mongoboot_core::connect("mongodb://localhost:27017/test", "", "").await?;
/// let request_handle = handle.clone_session()?;
/// // ... serve the request ...
/// request_handle.close().await;
/// handle.close().await;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// See [`connect_with`].
pub async fn connect(uri: &str, ca_cert_path: &str, client_cert_path: &str) -> Result<Handle> {
    connect_with(&BootstrapConfig::from_parts(uri, ca_cert_path, client_cert_path)).await
}

/// Runs the full bootstrap and returns a handle bound to the target database.
///
/// # Errors
/// - `Configuration` if a client certificate is given without a CA certificate
/// - `Parse` if the URI is malformed or names no database
/// - `Certificate` if either PEM file cannot be loaded or parsed
/// - `Connection` if the cluster cannot be reached within the dial timeout
/// - `Auth` if the server rejects the X.509 principal
pub async fn connect_with(config: &BootstrapConfig) -> Result<Handle> {
    let prepared = prepare_options(config).await?;
    let PreparedBootstrap {
        descriptor,
        options,
        x509,
    } = prepared;

    tracing::info!(
        "Dialing {} (tls={}, x509={}, timeout={:?})",
        descriptor,
        options.tls.is_some(),
        x509,
        descriptor.dial_timeout
    );

    let client = Client::with_options(options.clone()).map_err(|e| {
        BootstrapError::connection_failed(format!("creating client for {}", descriptor), e)
    })?;

    let handle = Handle::new(client, options, &descriptor.database);

    if let Err(e) = handle.ping_driver().await {
        let err = classify_dial_error(e, &descriptor, x509);
        tracing::warn!("Bootstrap failed: {}", err);
        handle.close().await;
        return Err(err);
    }

    tracing::info!("Connected to {}", descriptor);
    Ok(handle)
}

/// Performs every bootstrap step that needs no network access.
///
/// The returned options are exactly what the driver will be given, which makes
/// the TLS, timeout, policy and credential decisions inspectable.
///
/// # Errors
/// Same as [`connect_with`] minus the `Connection` and `Auth` kinds.
pub async fn prepare_options(config: &BootstrapConfig) -> Result<PreparedBootstrap> {
    config.validate()?;

    tracing::debug!("Bootstrapping {}", redact_database_url(&config.uri));

    let (descriptor, mut options) =
        ConnectionDescriptor::parse(&config.uri, config.dial_timeout).await?;

    let client_identity = config
        .client_cert()
        .map(ClientIdentity::load)
        .transpose()?;

    let principal = client_identity.as_ref().map(ClientIdentity::principal);

    if let Some(ca_path) = config.ca_cert() {
        let trust_anchor = TrustAnchor::load(ca_path)?;
        let material = TlsMaterial::new(trust_anchor, client_identity);
        options.tls = Some(material.to_driver_tls());
    }

    options.connect_timeout = Some(descriptor.dial_timeout);
    options.server_selection_timeout = Some(descriptor.dial_timeout);
    if config.app_name.is_some() || options.app_name.is_none() {
        options.app_name = Some(config.app_name());
    }

    SessionPolicy.apply(&mut options);

    let x509 = principal.is_some();
    if let Some(principal) = principal {
        tracing::debug!("Authenticating with X.509 principal {}", principal);
        options.credential = Some(x509_credential(principal));
    }

    Ok(PreparedBootstrap {
        descriptor,
        options,
        x509,
    })
}

/// Builds the `MONGODB-X509` credential for a derived principal.
pub fn x509_credential(principal: String) -> Credential {
    Credential::builder()
        .mechanism(AuthMechanism::MongoDbX509)
        .username(principal)
        .source(EXTERNAL_AUTH_SOURCE.to_string())
        .build()
}

/// Separates authentication rejections from transport failures.
fn classify_dial_error(
    error: mongodb::error::Error,
    descriptor: &ConnectionDescriptor,
    x509: bool,
) -> BootstrapError {
    let is_auth = match error.kind.as_ref() {
        ErrorKind::Authentication { .. } => true,
        ErrorKind::Command(command) => command.code == AUTHENTICATION_FAILED_CODE,
        _ => false,
    };

    if is_auth {
        let mechanism = if x509 { "MONGODB-X509" } else { "URI credentials" };
        BootstrapError::auth_failed(
            format!("authenticating to {} with {}", descriptor, mechanism),
            error,
        )
    } else {
        BootstrapError::connection_failed(format!("connecting to {}", descriptor), error)
    }
}
