//! X.509 principal identity derivation.
//!
//! The `MONGODB-X509` mechanism requires the client to present a username
//! equal to the certificate subject rendered in a canonical order. This module
//! produces that string. It performs no certificate verification; the TLS layer
//! has already validated the chain by the time the identity is used.

use x509_certificate::X509Certificate;

/// PKCS#9 emailAddress, 1.2.840.113549.1.9.1
const OID_EMAIL_ADDRESS: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x01];
/// id-at-commonName, 2.5.4.3
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
/// id-at-organizationalUnitName, 2.5.4.11
const OID_ORGANIZATIONAL_UNIT: &[u8] = &[0x55, 0x04, 0x0b];
/// id-at-organizationName, 2.5.4.10
const OID_ORGANIZATION: &[u8] = &[0x55, 0x04, 0x0a];
/// id-at-localityName, 2.5.4.7
const OID_LOCALITY: &[u8] = &[0x55, 0x04, 0x07];
/// id-at-countryName, 2.5.4.6
const OID_COUNTRY: &[u8] = &[0x55, 0x04, 0x06];

/// First value of each subject field that takes part in the identity.
///
/// Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateSubject {
    /// PKCS#9 email address
    pub email: String,
    /// Common name
    pub common_name: String,
    /// First organizational unit
    pub organizational_unit: String,
    /// First organization
    pub organization: String,
    /// First locality
    pub locality: String,
    /// First country
    pub country: String,
}

impl CertificateSubject {
    /// Scans the certificate subject and keeps the first value of each field.
    ///
    /// Attribute values that cannot be decoded as strings count as absent.
    pub fn from_certificate(cert: &X509Certificate) -> Self {
        let mut subject = Self::default();

        for atv in cert.subject_name().iter_attributes() {
            let slot = match atv.typ.as_ref() {
                OID_EMAIL_ADDRESS => &mut subject.email,
                OID_COMMON_NAME => &mut subject.common_name,
                OID_ORGANIZATIONAL_UNIT => &mut subject.organizational_unit,
                OID_ORGANIZATION => &mut subject.organization,
                OID_LOCALITY => &mut subject.locality,
                OID_COUNTRY => &mut subject.country,
                _ => continue,
            };

            if slot.is_empty()
                && let Ok(value) = atv.to_string()
            {
                *slot = value;
            }
        }

        subject
    }

    /// Renders the canonical identity string.
    ///
    /// Key order and key names are fixed by the server's X.509 mechanism.
    pub fn to_identity(&self) -> String {
        format!(
            "emailAddress={},CN={},OU={},O={},L={},C={}",
            self.email,
            self.common_name,
            self.organizational_unit,
            self.organization,
            self.locality,
            self.country
        )
    }
}

/// Derives the principal identity for certificate-based authentication.
pub fn derive_identity(cert: &X509Certificate) -> String {
    CertificateSubject::from_certificate(cert).to_identity()
}

/// Derives the principal identity of the first certificate in a PEM blob.
///
/// # Errors
/// Returns a certificate error if the blob holds no certificate or the
/// certificate cannot be parsed.
pub fn derive_identity_from_pem(pem: &[u8]) -> crate::Result<String> {
    let cert = crate::tls::first_certificate(pem, "parsing certificate")?;
    let parsed = X509Certificate::from_der(cert.as_ref()).map_err(|e| {
        crate::error::BootstrapError::certificate_failed("parsing certificate", e.to_string())
    })?;
    Ok(derive_identity(&parsed))
}
