//! X.509 certificates as the source of recipient and signer selectors and
//! public keys.

use der::{asn1::OctetString, Decode, Encode};
use x509_cert::Certificate;

use crate::content_info::{IssuerAndSerialNumber, KeyIdentifier};
use crate::errors::{Error, Result};
use crate::registry::oids;

/// Decodes a DER certificate.
pub fn certificate_from_der(der: &[u8]) -> Result<Certificate> {
    Ok(Certificate::from_der(der)?)
}

/// Decodes a PEM certificate.
#[cfg(feature = "pem")]
pub fn certificate_from_pem(pem: &str) -> Result<Certificate> {
    use der::DecodePem;
    Ok(Certificate::from_pem(pem)?)
}

/// DER `SubjectPublicKeyInfo` of `cert`.
pub(crate) fn public_key_der(cert: &Certificate) -> Result<Vec<u8>> {
    Ok(cert.tbs_certificate.subject_public_key_info.to_der()?)
}

/// Value of the subject key identifier extension, if the certificate has one.
pub fn subject_key_identifier(cert: &Certificate) -> Result<Option<Vec<u8>>> {
    let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
        return Ok(None);
    };
    extensions
        .iter()
        .find(|ext| ext.extn_id == oids::SUBJECT_KEY_IDENTIFIER)
        .map(|ext| {
            OctetString::from_der(ext.extn_value.as_bytes())
                .map(OctetString::into_bytes)
                .map_err(|_| Error::Malformed("subject key identifier must be an octet string"))
        })
        .transpose()
}

/// Issuer and serial number of `cert`.
pub fn issuer_and_serial(cert: &Certificate) -> IssuerAndSerialNumber {
    IssuerAndSerialNumber {
        issuer: cert.tbs_certificate.issuer.clone(),
        serial_number: cert.tbs_certificate.serial_number.clone(),
    }
}

impl KeyIdentifier {
    /// Selects `cert` by issuer and serial number.
    pub fn issuer_and_serial_of(cert: &Certificate) -> Self {
        KeyIdentifier::IssuerAndSerialNumber(issuer_and_serial(cert))
    }

    /// Selects `cert` by its subject key identifier extension.
    pub fn subject_key_identifier_of(cert: &Certificate) -> Result<Self> {
        subject_key_identifier(cert)?
            .map(KeyIdentifier::SubjectKeyIdentifier)
            .ok_or(Error::Builder("certificate has no subject key identifier"))
    }

    /// `true` if this identifier selects `cert`.
    pub fn matches(&self, cert: &Certificate) -> bool {
        match self {
            KeyIdentifier::IssuerAndSerialNumber(ias) => issuer_and_serial(cert) == *ias,
            KeyIdentifier::SubjectKeyIdentifier(ski) => {
                matches!(subject_key_identifier(cert), Ok(Some(own)) if own == *ski)
            }
        }
    }
}

#[cfg(all(test, feature = "pem"))]
mod tests {
    use super::*;
    use hex_literal::hex;

    const ALICE: &str = include_str!("../tests/examples/keys/rsa-alice.crt");
    const BOB: &str = include_str!("../tests/examples/keys/rsa-bob.crt");

    #[test]
    fn identifiers_from_certificate() {
        let cert = certificate_from_pem(ALICE).expect("failed to parse certificate");
        let ias = issuer_and_serial(&cert);
        assert_eq!(ias.serial_number.as_bytes(), hex!("00a33a216e21756633"));
        assert_eq!(
            subject_key_identifier(&cert).unwrap().unwrap(),
            hex!("eae265e890c25c3baa243739a6943c8cc77bec35")
        );

        let bob = certificate_from_pem(BOB).unwrap();
        let by_serial = KeyIdentifier::issuer_and_serial_of(&cert);
        let by_ski = KeyIdentifier::subject_key_identifier_of(&cert).unwrap();
        assert!(by_serial.matches(&cert));
        assert!(by_ski.matches(&cert));
        assert!(!by_serial.matches(&bob));
        assert!(!by_ski.matches(&bob));
    }

    #[test]
    fn public_key_is_der() {
        let cert = certificate_from_pem(ALICE).unwrap();
        let spki = public_key_der(&cert).unwrap();
        assert_eq!(spki[0], 0x30);
    }
}
