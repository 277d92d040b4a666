//! Key transport: the content key encrypted directly under an RSA public key.

use cms::enveloped_data::KeyTransRecipientInfo;
use der::asn1::OctetString;
use rand_core::CryptoRngCore;
use rsa::{pkcs8::DecodePublicKey, Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::{debug, trace};
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::cert;
use crate::content_info::{CmsVersion, KeyIdentifier};
use crate::crypto::ContentKey;
use crate::errors::{Error, Result};
use crate::registry::{DigestAlgorithm, KeyTransportAlgorithm};

/// Decrypts the content key, blinding with `rng`. Every failure, padding
/// included, is the same [`Error::KeyMismatch`].
pub(crate) fn recover(
    info: &KeyTransRecipientInfo,
    key: &RsaPrivateKey,
    rng: &mut dyn CryptoRngCore,
) -> Result<Zeroizing<Vec<u8>>> {
    let algorithm = KeyTransportAlgorithm::from_identifier(&info.key_enc_alg)?;
    trace!(?algorithm, "decrypting transported key");
    let mut rng = rng;
    let encrypted = info.enc_key.as_bytes();
    let decrypted = match algorithm {
        KeyTransportAlgorithm::RsaPkcs1v15 => key.decrypt_blinded(&mut rng, Pkcs1v15Encrypt, encrypted),
        KeyTransportAlgorithm::RsaOaep { digest, mgf_digest } => {
            key.decrypt_blinded(&mut rng, oaep(digest, mgf_digest), encrypted)
        }
    };
    decrypted.map(Zeroizing::new).map_err(|_| Error::KeyMismatch)
}

fn oaep(digest: DigestAlgorithm, mgf_digest: DigestAlgorithm) -> Oaep {
    Oaep {
        digest: digest.new_hasher(),
        mgf_digest: mgf_digest.new_hasher(),
        label: None,
    }
}

/// Key transport recipient.
///
/// ```no_run
/// # fn main() -> cms_envelope::Result<()> {
/// use cms_envelope::{cert, recipient::KeyTransRecipient, registry::DigestAlgorithm};
///
/// let cert = cert::certificate_from_pem(&std::fs::read_to_string("tests/examples/keys/rsa-alice.crt")?)?;
/// let recipient = KeyTransRecipient::from_certificate(&cert)?.with_oaep(DigestAlgorithm::Sha256);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct KeyTransRecipient {
    id: KeyIdentifier,
    key: RsaPublicKey,
    algorithm: KeyTransportAlgorithm,
}

impl KeyTransRecipient {
    /// PKCS#1 v1.5 recipient selected by `id`.
    pub fn new(id: KeyIdentifier, key: RsaPublicKey) -> Self {
        Self {
            id,
            key,
            algorithm: KeyTransportAlgorithm::RsaPkcs1v15,
        }
    }

    /// Recipient holding `cert`, selected by issuer and serial number.
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        Ok(Self::new(KeyIdentifier::issuer_and_serial_of(cert), certificate_key(cert)?))
    }

    /// Recipient holding `cert`, selected by subject key identifier.
    pub fn from_certificate_with_ski(cert: &Certificate) -> Result<Self> {
        Ok(Self::new(
            KeyIdentifier::subject_key_identifier_of(cert)?,
            certificate_key(cert)?,
        ))
    }

    /// Switches to OAEP with `digest` for both the label hash and MGF1.
    pub fn with_oaep(self, digest: DigestAlgorithm) -> Self {
        self.with_algorithm(KeyTransportAlgorithm::oaep(digest))
    }

    /// Sets the padding scheme.
    pub fn with_algorithm(mut self, algorithm: KeyTransportAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub(crate) fn generate(
        &self,
        cek: &ContentKey,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<KeyTransRecipientInfo> {
        let mut rng = rng;
        let encrypted = match self.algorithm {
            KeyTransportAlgorithm::RsaPkcs1v15 => {
                self.key.encrypt(&mut rng, Pkcs1v15Encrypt, cek.as_bytes())
            }
            KeyTransportAlgorithm::RsaOaep { digest, mgf_digest } => {
                self.key.encrypt(&mut rng, oaep(digest, mgf_digest), cek.as_bytes())
            }
        }
        .map_err(|_| Error::KeyMismatch)?;
        debug!(algorithm = ?self.algorithm, "content key transported");
        let version = if self.id.is_subject_key_identifier() {
            CmsVersion::V2
        } else {
            CmsVersion::V0
        };
        Ok(KeyTransRecipientInfo {
            version,
            rid: self.id.to_recipient_identifier()?,
            key_enc_alg: self.algorithm.identifier()?,
            enc_key: OctetString::new(encrypted)?,
        })
    }
}

fn certificate_key(cert: &Certificate) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(&cert::public_key_der(cert)?)
        .map_err(|_| Error::Malformed("certificate does not hold an RSA public key"))
}
