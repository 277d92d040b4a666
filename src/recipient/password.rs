//! Password recipients (RFC 3211): PBKDF2 derives a key-encryption key that
//! wraps the content key with the two-pass CBC wrap.

use cms::enveloped_data::PasswordRecipientInfo;
use der::asn1::OctetString;
use rand_core::CryptoRngCore;
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::content_info::CmsVersion;
use crate::crypto::{kdf, wrap, ContentKey, Password};
use crate::errors::{Error, Result};
use crate::registry::{
    self, identifier_with, oids, AlgorithmIdentifier, ContentEncryption,
    ContentEncryptionAlgorithm, ContentParameters, Pbkdf2Parameters, Pbkdf2Prf,
};

const DEFAULT_ITERATIONS: u32 = 2048;
const DEFAULT_SALT_LEN: usize = 8;

/// Inner cipher of the `id-alg-PWRI-KEK` identifier.
fn key_encryption_cipher(info: &PasswordRecipientInfo) -> Result<ContentEncryption> {
    let id = &info.key_enc_alg;
    if id.oid != oids::PWRI_KEK {
        return Err(Error::UnsupportedAlgorithm(id.oid));
    }
    let inner: AlgorithmIdentifier = registry::parameters(id, "PWRI-KEK requires the inner cipher")?;
    let inner = ContentEncryption::from_identifier(&inner)?;
    match inner.parameters {
        ContentParameters::Iv(_) => Ok(inner),
        _ => Err(Error::UnsupportedAlgorithm(inner.algorithm.oid())),
    }
}

pub(crate) fn recover(info: &PasswordRecipientInfo, password: &Password) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = key_encryption_cipher(info)?;
    let kdf = info
        .key_derivation_alg
        .as_ref()
        .ok_or(Error::Malformed("no key derivation algorithm to apply the password to"))?;
    let params = Pbkdf2Parameters::from_identifier(kdf)?;
    let key_size = cipher.algorithm.key_size();
    if params.key_length.is_some_and(|len| len != key_size) {
        return Err(Error::Malformed("PBKDF2 key length does not fit the key-encryption cipher"));
    }
    trace!(iterations = params.iterations, prf = ?params.prf, "deriving key-encryption key");
    let kek = kdf::pbkdf2(password, &params, key_size);
    unwrap_with(&cipher, &kek, info.enc_key.as_bytes())
}

/// Recovers with an already derived key-encryption key.
pub(crate) fn recover_with_kek(info: &PasswordRecipientInfo, kek: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = key_encryption_cipher(info)?;
    if kek.len() != cipher.algorithm.key_size() {
        return Err(Error::KeyMismatch);
    }
    unwrap_with(&cipher, kek, info.enc_key.as_bytes())
}

fn unwrap_with(cipher: &ContentEncryption, kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let block = wrap::block_cipher(cipher.algorithm.family(), kek)?;
    wrap::pwri_unwrap(block.as_ref(), cipher.iv(), wrapped)
}

/// Recipient knowing a password.
///
/// Defaults to PBKDF2 with HMAC-SHA1, 2048 iterations, a random 8-byte salt
/// and AES-128-CBC as the wrapping cipher.
#[derive(Clone, Debug)]
pub struct PasswordRecipient {
    password: Password,
    salt: Option<Vec<u8>>,
    iterations: u32,
    prf: Pbkdf2Prf,
    cipher: ContentEncryptionAlgorithm,
}

impl PasswordRecipient {
    /// Recipient for `password`.
    pub fn new(password: impl Into<Password>) -> Self {
        Self {
            password: password.into(),
            salt: None,
            iterations: DEFAULT_ITERATIONS,
            prf: Pbkdf2Prf::default(),
            cipher: ContentEncryptionAlgorithm::Aes128Cbc,
        }
    }

    /// Fixed salt instead of a random one.
    pub fn with_salt(mut self, salt: &[u8]) -> Self {
        self.salt = Some(salt.to_vec());
        self
    }

    /// PBKDF2 iteration count.
    pub fn with_iterations(mut self, iterations: u32) -> Result<Self> {
        if iterations == 0 {
            return Err(Error::Builder("PBKDF2 iteration count must be positive"));
        }
        self.iterations = iterations;
        Ok(self)
    }

    /// PBKDF2 pseudo-random function.
    pub fn with_prf(mut self, prf: Pbkdf2Prf) -> Self {
        self.prf = prf;
        self
    }

    /// Block cipher of the RFC 3211 wrap; must be one of the plain CBC ciphers.
    pub fn with_cipher(mut self, cipher: ContentEncryptionAlgorithm) -> Result<Self> {
        if cipher.is_aead() || cipher == ContentEncryptionAlgorithm::Rc2Cbc {
            return Err(Error::UnsupportedAlgorithm(cipher.oid()));
        }
        self.cipher = cipher;
        Ok(self)
    }

    pub(crate) fn generate(
        &self,
        cek: &ContentKey,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<PasswordRecipientInfo> {
        let salt = match &self.salt {
            Some(salt) => salt.clone(),
            None => {
                let mut salt = vec![0u8; DEFAULT_SALT_LEN];
                rng.fill_bytes(&mut salt);
                salt
            }
        };
        let params = Pbkdf2Parameters {
            salt,
            iterations: self.iterations,
            key_length: None,
            prf: self.prf,
        };
        let kek = kdf::pbkdf2(&self.password, &params, self.cipher.key_size());
        let inner = ContentEncryption::generate(self.cipher, rng);
        let block = wrap::block_cipher(self.cipher.family(), &kek)?;
        let encrypted_key = wrap::pwri_wrap(block.as_ref(), inner.iv(), cek.as_bytes(), rng)?;
        debug!(cipher = self.cipher.name(), iterations = self.iterations, "content key wrapped under password");
        Ok(PasswordRecipientInfo {
            version: CmsVersion::V0,
            key_derivation_alg: Some(params.identifier()?),
            key_enc_alg: identifier_with(oids::PWRI_KEK, &inner.identifier()?)?,
            enc_key: OctetString::new(encrypted_key)?,
        })
    }
}
