//! Connection bootstrap and session handles for MongoDB clusters.
//!
//! This crate turns a connection URI plus optional PEM files into a live,
//! authenticated session. It composes the `mongodb` driver with rustls PEM
//! handling and X.509 subject parsing; it implements none of them itself.
//!
//! # Bootstrap
//! - Connection URI parsing with a mandatory target database
//! - Optional TLS with a custom CA trust anchor
//! - Optional mutual TLS with `MONGODB-X509` authentication, using a
//!   principal derived from the client certificate subject
//! - Monotonic reads and majority writes on every session
//!
//! # Security Guarantees
//! - Connection strings are redacted in all logs and errors
//! - Client key material is zeroized after loading and never retained
//! - No retries: every failure surfaces immediately with its bootstrap step

pub mod bootstrap;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod identity;
pub mod logging;
pub mod policy;
pub mod tls;

// Re-export commonly used types
pub use bootstrap::{PreparedBootstrap, connect, connect_with, prepare_options};
pub use config::{BootstrapConfig, DEFAULT_DIAL_TIMEOUT};
pub use descriptor::ConnectionDescriptor;
pub use error::{BootstrapError, Result};
pub use handle::{Handle, IndexTarget, ensure_indexes};
pub use identity::{CertificateSubject, derive_identity, derive_identity_from_pem};
pub use logging::init_logging;
pub use policy::SessionPolicy;
pub use tls::{ClientIdentity, TlsMaterial, TrustAnchor};
