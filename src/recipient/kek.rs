//! Previously distributed symmetric key-encryption keys.

use std::time::SystemTime;

use cms::enveloped_data::{KekIdentifier, KekRecipientInfo};
use der::asn1::{GeneralizedTime, OctetString};
use rand_core::CryptoRngCore;
use tracing::debug;
use x509_cert::attr::Attribute;
use zeroize::Zeroizing;

use crate::content_info::CmsVersion;
use crate::crypto::{wrap, ContentKey};
use crate::errors::{Error, Result};
use crate::registry::{CipherFamily, KeyWrapAlgorithm};

pub(crate) fn recover(info: &KekRecipientInfo, kek: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let algorithm = KeyWrapAlgorithm::from_identifier(&info.key_enc_alg)?;
    wrap::unwrap(algorithm, kek, info.encrypted_key.as_bytes())
}

/// Recipient sharing a symmetric key-encryption key with the originator.
pub struct KekRecipient {
    id: KekIdentifier,
    algorithm: KeyWrapAlgorithm,
    kek: Zeroizing<Vec<u8>>,
}

impl core::fmt::Debug for KekRecipient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KekRecipient")
            .field("id", &self.id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl KekRecipient {
    /// Picks the wrap of `family` matching the length of `kek`.
    ///
    /// SEED is recognized but reported as [`Error::UnsupportedAlgorithm`].
    pub fn new(key_identifier: Vec<u8>, family: CipherFamily, kek: &[u8]) -> Result<Self> {
        let algorithm = KeyWrapAlgorithm::for_key(family, kek.len())?;
        Self::with_algorithm(key_identifier, algorithm, kek)
    }

    /// Uses `algorithm`, which must accept a key of `kek.len()` bytes.
    pub fn with_algorithm(
        key_identifier: Vec<u8>,
        algorithm: KeyWrapAlgorithm,
        kek: &[u8],
    ) -> Result<Self> {
        if kek.len() != algorithm.key_size() {
            return Err(Error::Builder("key-encryption key length does not fit the wrap"));
        }
        Ok(Self {
            id: KekIdentifier {
                kek_identifier: OctetString::new(key_identifier)?,
                date: None,
                other: None,
            },
            algorithm,
            kek: Zeroizing::new(kek.to_vec()),
        })
    }

    /// Adds the `date` of the key identifier.
    pub fn with_date(mut self, date: SystemTime) -> Result<Self> {
        self.id.date = Some(GeneralizedTime::from_system_time(date)?);
        Ok(self)
    }

    /// Adds the `other` key attribute of the key identifier.
    pub fn with_other_key_attribute(mut self, attribute: Attribute) -> Self {
        self.id.other = Some(attribute);
        self
    }

    pub(crate) fn generate(
        &self,
        cek: &ContentKey,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<KekRecipientInfo> {
        let encrypted_key = wrap::wrap(self.algorithm, &self.kek, cek.as_bytes(), rng)?;
        debug!(algorithm = ?self.algorithm, "content key wrapped");
        Ok(KekRecipientInfo {
            version: CmsVersion::V4,
            kek_id: self.id.clone(),
            key_enc_alg: self.algorithm.identifier(),
            encrypted_key: OctetString::new(encrypted_key)?,
        })
    }
}
