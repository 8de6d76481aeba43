//! TLS material loading for secure cluster connections.
//!
//! This module validates the PEM files a caller supplies and turns them into
//! the driver's TLS options. Trust anchors are checked by loading every
//! certificate into a rustls `RootCertStore`; client identities are checked by
//! locating the certificate and key in the combined file and parsing the
//! leading certificate.
//!
//! # Security
//! Client PEM bytes are read into a zeroizing buffer and the private key is
//! never retained past loading.

use crate::error::BootstrapError;
use crate::Result;
use mongodb::options::{Tls, TlsOptions};
use rustls::RootCertStore;
use rustls_pemfile::Item;
use rustls_pki_types::CertificateDer;
use std::path::{Path, PathBuf};
use x509_certificate::X509Certificate;
use zeroize::Zeroizing;

const CA_CONTEXT: &str = "loading/parsing CA certificate";
const CLIENT_CONTEXT: &str = "loading/parsing client certificate";

/// Validated server trust anchor.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    path: PathBuf,
    certificate_count: usize,
}

impl TrustAnchor {
    /// Loads and validates a PEM file of one or more CA certificates.
    ///
    /// # Errors
    /// Returns a certificate error if the file cannot be read, a PEM section
    /// is malformed, a certificate is rejected as a trust anchor, or the file
    /// holds no certificate at all.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            BootstrapError::certificate_failed(
                format!("{} '{}'", CA_CONTEXT, path.display()),
                e,
            )
        })?;

        let mut reader = std::io::Cursor::new(&data);
        let mut root_store = RootCertStore::empty();
        let mut found_certs: usize = 0;

        loop {
            match rustls_pemfile::read_one(&mut reader) {
                Ok(Some(Item::X509Certificate(cert))) => {
                    root_store.add(cert).map_err(|e| {
                        BootstrapError::certificate_failed(
                            format!("{} '{}'", CA_CONTEXT, path.display()),
                            e,
                        )
                    })?;
                    found_certs = found_certs.saturating_add(1);
                }
                Ok(Some(_)) => {
                    // Keys and CRLs in a CA bundle are ignored
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(BootstrapError::certificate_failed(
                        format!("{} '{}'", CA_CONTEXT, path.display()),
                        e,
                    ));
                }
            }
        }

        if found_certs == 0 {
            return Err(BootstrapError::certificate_failed(
                format!("{} '{}'", CA_CONTEXT, path.display()),
                "no certificates found",
            ));
        }

        tracing::debug!(
            "Loaded {} CA certificate(s) from {}",
            found_certs,
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            certificate_count: found_certs,
        })
    }

    /// Path of the CA file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of certificates accepted into the trust store.
    pub fn certificate_count(&self) -> usize {
        self.certificate_count
    }
}

/// Client certificate and key pair loaded from one combined PEM file.
pub struct ClientIdentity {
    path: PathBuf,
    certificate: X509Certificate,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ClientIdentity {
    /// Loads the combined certificate/key file and parses its leading certificate.
    ///
    /// # Errors
    /// Returns a certificate error if the file cannot be read, contains no
    /// certificate or no private key, or the certificate is not valid X.509.
    pub fn load(path: &Path) -> Result<Self> {
        let context = || format!("{} '{}'", CLIENT_CONTEXT, path.display());

        let data = Zeroizing::new(
            std::fs::read(path).map_err(|e| BootstrapError::certificate_failed(context(), e))?,
        );

        let mut reader = std::io::Cursor::new(data.as_slice());
        let mut leading_cert: Option<CertificateDer<'static>> = None;
        let mut has_key = false;

        loop {
            match rustls_pemfile::read_one(&mut reader) {
                Ok(Some(Item::X509Certificate(cert))) => {
                    if leading_cert.is_none() {
                        leading_cert = Some(cert);
                    }
                }
                Ok(Some(Item::Pkcs1Key(_) | Item::Pkcs8Key(_) | Item::Sec1Key(_))) => {
                    has_key = true;
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => return Err(BootstrapError::certificate_failed(context(), e)),
            }
        }

        let cert = leading_cert
            .ok_or_else(|| BootstrapError::certificate_failed(context(), "no certificate found"))?;

        if !has_key {
            return Err(BootstrapError::certificate_failed(
                context(),
                "no private key found",
            ));
        }

        let certificate = X509Certificate::from_der(cert.as_ref())
            .map_err(|e| BootstrapError::certificate_failed(context(), e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            certificate,
        })
    }

    /// Path of the combined certificate/key file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsed leading certificate.
    pub fn certificate(&self) -> &X509Certificate {
        &self.certificate
    }

    /// Principal identity of the leading certificate.
    pub fn principal(&self) -> String {
        crate::identity::derive_identity(&self.certificate)
    }
}

/// Trust anchor plus optional client identity for one bootstrap.
#[derive(Debug)]
pub struct TlsMaterial {
    trust_anchor: TrustAnchor,
    client: Option<ClientIdentity>,
}

impl TlsMaterial {
    /// Combines a trust anchor and an optional client identity.
    pub fn new(trust_anchor: TrustAnchor, client: Option<ClientIdentity>) -> Self {
        Self {
            trust_anchor,
            client,
        }
    }

    /// Server trust anchor.
    pub fn trust_anchor(&self) -> &TrustAnchor {
        &self.trust_anchor
    }

    /// Client identity, if mutual TLS was requested.
    pub fn client(&self) -> Option<&ClientIdentity> {
        self.client.as_ref()
    }

    /// Converts the material into the driver's TLS settings.
    pub fn to_driver_tls(&self) -> Tls {
        let options = match &self.client {
            Some(client) => TlsOptions::builder()
                .ca_file_path(self.trust_anchor.path.clone())
                .cert_key_file_path(client.path.clone())
                .build(),
            None => TlsOptions::builder()
                .ca_file_path(self.trust_anchor.path.clone())
                .build(),
        };
        Tls::Enabled(options)
    }
}

/// Returns the first certificate of a PEM blob.
pub(crate) fn first_certificate(pem: &[u8], context: &str) -> Result<CertificateDer<'static>> {
    let mut reader = std::io::Cursor::new(pem);
    rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| BootstrapError::certificate_failed(context, "no certificate found"))?
        .map_err(|e| BootstrapError::certificate_failed(context, e))
}
