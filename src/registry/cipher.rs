use const_oid::ObjectIdentifier;
use der::{asn1::OctetString, Sequence, Tag, Tagged};
use rand_core::CryptoRngCore;

use super::{identifier_with, oids, AlgorithmIdentifier};
use crate::errors::{Error, Result};

/// Block cipher families with a registered implementation (or, for SEED,
/// a registered identifier).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CipherFamily {
    Aes,
    DesEde3,
    Rc2,
    Camellia,
    Seed,
}

/// Content-encryption algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ContentEncryptionAlgorithm {
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
    Rc2Cbc,
    Camellia128Cbc,
    Camellia192Cbc,
    Camellia256Cbc,
    Aes128Gcm,
    Aes192Gcm,
    Aes256Gcm,
    Aes128Ccm,
    Aes192Ccm,
    Aes256Ccm,
}

use ContentEncryptionAlgorithm::*;

impl ContentEncryptionAlgorithm {
    /// Every supported content cipher.
    pub const ALL: [ContentEncryptionAlgorithm; 14] = [
        Aes128Cbc,
        Aes192Cbc,
        Aes256Cbc,
        DesEde3Cbc,
        Rc2Cbc,
        Camellia128Cbc,
        Camellia192Cbc,
        Camellia256Cbc,
        Aes128Gcm,
        Aes192Gcm,
        Aes256Gcm,
        Aes128Ccm,
        Aes192Ccm,
        Aes256Ccm,
    ];

    /// Object identifier.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Aes128Cbc => oids::AES128_CBC,
            Aes192Cbc => oids::AES192_CBC,
            Aes256Cbc => oids::AES256_CBC,
            DesEde3Cbc => oids::DES_EDE3_CBC,
            Rc2Cbc => oids::RC2_CBC,
            Camellia128Cbc => oids::CAMELLIA128_CBC,
            Camellia192Cbc => oids::CAMELLIA192_CBC,
            Camellia256Cbc => oids::CAMELLIA256_CBC,
            Aes128Gcm => oids::AES128_GCM,
            Aes192Gcm => oids::AES192_GCM,
            Aes256Gcm => oids::AES256_GCM,
            Aes128Ccm => oids::AES128_CCM,
            Aes192Ccm => oids::AES192_CCM,
            Aes256Ccm => oids::AES256_CCM,
        }
    }

    /// Looks up a content cipher by object identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.oid() == *oid)
            .ok_or(Error::UnsupportedAlgorithm(*oid))
    }

    /// Key length in bytes.
    pub fn key_size(self) -> usize {
        match self {
            Aes128Cbc | Camellia128Cbc | Aes128Gcm | Aes128Ccm | Rc2Cbc => 16,
            Aes192Cbc | Camellia192Cbc | Aes192Gcm | Aes192Ccm | DesEde3Cbc => 24,
            Aes256Cbc | Camellia256Cbc | Aes256Gcm | Aes256Ccm => 32,
        }
    }

    /// Block length in bytes (and CBC IV length).
    pub fn block_size(self) -> usize {
        match self.family() {
            CipherFamily::DesEde3 | CipherFamily::Rc2 => 8,
            _ => 16,
        }
    }

    /// Underlying block cipher family.
    pub fn family(self) -> CipherFamily {
        match self {
            DesEde3Cbc => CipherFamily::DesEde3,
            Rc2Cbc => CipherFamily::Rc2,
            Camellia128Cbc | Camellia192Cbc | Camellia256Cbc => CipherFamily::Camellia,
            _ => CipherFamily::Aes,
        }
    }

    /// `true` for GCM and CCM.
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            Aes128Gcm | Aes192Gcm | Aes256Gcm | Aes128Ccm | Aes192Ccm | Aes256Ccm
        )
    }

    /// Registry name.
    pub fn name(self) -> &'static str {
        super::name_for_oid(&self.oid()).unwrap_or("UNKNOWN")
    }

    /// Default key wrap for agreement recipients of this cipher.
    pub fn default_key_wrap(self) -> KeyWrapAlgorithm {
        match self {
            DesEde3Cbc => KeyWrapAlgorithm::DesEde3,
            Camellia128Cbc => KeyWrapAlgorithm::Camellia128,
            Camellia192Cbc => KeyWrapAlgorithm::Camellia192,
            Camellia256Cbc => KeyWrapAlgorithm::Camellia256,
            Aes192Cbc | Aes192Gcm | Aes192Ccm => KeyWrapAlgorithm::Aes192,
            Aes256Cbc | Aes256Gcm | Aes256Ccm => KeyWrapAlgorithm::Aes256,
            Aes128Cbc | Aes128Gcm | Aes128Ccm | Rc2Cbc => KeyWrapAlgorithm::Aes128,
        }
    }
}

/// Per-message parameters of a content cipher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentParameters {
    /// CBC initialization vector.
    Iv(Vec<u8>),
    /// `RC2-CBC-Parameter`.
    Rc2 {
        /// Effective key bits.
        effective_bits: u16,
        /// Initialization vector.
        iv: Vec<u8>,
    },
    /// `GCMParameters`/`CCMParameters`.
    Aead {
        /// Nonce.
        nonce: Vec<u8>,
        /// Tag length in bytes.
        tag_len: usize,
    },
}

/// A content cipher together with its per-message parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentEncryption {
    /// Cipher.
    pub algorithm: ContentEncryptionAlgorithm,
    /// Parameters carried in the algorithm identifier.
    pub parameters: ContentParameters,
}

/// AEAD nonce length generated and accepted.
pub(crate) const AEAD_NONCE_LEN: usize = 12;

/// AEAD tag length generated.
pub(crate) const AEAD_TAG_LEN: usize = 16;

/// RC2 effective key bits used when generating.
const RC2_DEFAULT_BITS: u16 = 128;

/// Default `aes-ICVlen` of RFC 5084.
const DEFAULT_ICV_LEN: u8 = 12;

fn default_icv_len() -> u8 {
    DEFAULT_ICV_LEN
}

/// `GCMParameters`/`CCMParameters` (RFC 5084 § 3).
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct AeadParameters {
    nonce: OctetString,
    #[asn1(default = "default_icv_len")]
    icv_len: u8,
}

/// `RC2-CBC-Parameter` (RFC 2268 § 6).
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct Rc2Parameters {
    #[asn1(optional = "true")]
    version: Option<u32>,
    iv: OctetString,
}

impl ContentEncryption {
    /// Fresh random parameters for `algorithm`.
    pub fn generate(algorithm: ContentEncryptionAlgorithm, rng: &mut dyn CryptoRngCore) -> Self {
        let parameters = if algorithm.is_aead() {
            let mut nonce = vec![0u8; AEAD_NONCE_LEN];
            rng.fill_bytes(&mut nonce);
            ContentParameters::Aead {
                nonce,
                tag_len: AEAD_TAG_LEN,
            }
        } else {
            let mut iv = vec![0u8; algorithm.block_size()];
            rng.fill_bytes(&mut iv);
            if algorithm == Rc2Cbc {
                ContentParameters::Rc2 {
                    effective_bits: RC2_DEFAULT_BITS,
                    iv,
                }
            } else {
                ContentParameters::Iv(iv)
            }
        };
        Self {
            algorithm,
            parameters,
        }
    }

    /// Initialization vector or nonce.
    pub fn iv(&self) -> &[u8] {
        match &self.parameters {
            ContentParameters::Iv(iv) | ContentParameters::Rc2 { iv, .. } => iv,
            ContentParameters::Aead { nonce, .. } => nonce,
        }
    }

    /// Encodes the algorithm identifier.
    pub fn identifier(&self) -> Result<AlgorithmIdentifier> {
        let oid = self.algorithm.oid();
        match &self.parameters {
            ContentParameters::Iv(iv) => identifier_with(oid, &OctetString::new(iv.as_slice())?),
            ContentParameters::Rc2 { effective_bits, iv } => {
                let params = Rc2Parameters {
                    version: Some(rc2_version(*effective_bits)),
                    iv: OctetString::new(iv.as_slice())?,
                };
                identifier_with(oid, &params)
            }
            ContentParameters::Aead { nonce, tag_len } => {
                let params = AeadParameters {
                    nonce: OctetString::new(nonce.as_slice())?,
                    icv_len: u8::try_from(*tag_len)
                        .map_err(|_| Error::Builder("AEAD tag length out of range"))?,
                };
                identifier_with(oid, &params)
            }
        }
    }

    /// Decodes and validates a content-encryption identifier.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<Self> {
        let algorithm = ContentEncryptionAlgorithm::from_oid(&id.oid)?;
        let tag = id
            .parameters
            .as_ref()
            .ok_or(Error::Malformed("content cipher requires parameters"))?
            .tag();

        let parameters = if algorithm.is_aead() {
            let params: AeadParameters = super::parameters(id, "malformed AEAD parameters")?;
            let tag_len = params.icv_len;
            if params.nonce.as_bytes().len() != AEAD_NONCE_LEN || !(tag_len == 12 || tag_len == 16) {
                return Err(Error::UnsupportedAlgorithm(id.oid));
            }
            ContentParameters::Aead {
                nonce: params.nonce.into_bytes(),
                tag_len: usize::from(tag_len),
            }
        } else if algorithm == Rc2Cbc {
            // a bare IV is the pre-RFC 2268 form with 32 effective bits
            let (effective_bits, iv) = if tag == Tag::OctetString {
                let iv: OctetString = super::parameters(id, "malformed RC2 IV")?;
                (32, iv.into_bytes())
            } else {
                let params: Rc2Parameters = super::parameters(id, "malformed RC2 parameters")?;
                let bits = match params.version {
                    Some(version) => rc2_effective_bits(version)?,
                    None => 32,
                };
                (bits, params.iv.into_bytes())
            };
            ContentParameters::Rc2 { effective_bits, iv }
        } else {
            let iv: OctetString = super::parameters(id, "CBC IV must be an octet string")?;
            ContentParameters::Iv(iv.into_bytes())
        };

        let encryption = Self {
            algorithm,
            parameters,
        };
        if !algorithm.is_aead() && encryption.iv().len() != algorithm.block_size() {
            return Err(Error::Malformed("IV length does not match the block size"));
        }
        Ok(encryption)
    }
}

/// Effective-key-bits to `rc2ParameterVersion` (RFC 2268 § 6).
static RC2_TABLE: [u8; 256] = [
    0xbd, 0x56, 0xea, 0xf2, 0xa2, 0xf1, 0xac, 0x2a, 0xb0, 0x93, 0xd1, 0x9c, 0x1b, 0x33, 0xfd, 0xd0,
    0x30, 0x04, 0xb6, 0xdc, 0x7d, 0xdf, 0x32, 0x4b, 0xf7, 0xcb, 0x45, 0x9b, 0x31, 0xbb, 0x21, 0x5a,
    0x41, 0x9f, 0xe1, 0xd9, 0x4a, 0x4d, 0x9e, 0xda, 0xa0, 0x68, 0x2c, 0xc3, 0x27, 0x5f, 0x80, 0x36,
    0x3e, 0xee, 0xfb, 0x95, 0x1a, 0xfe, 0xce, 0xa8, 0x34, 0xa9, 0x13, 0xf0, 0xa6, 0x3f, 0xd8, 0x0c,
    0x78, 0x24, 0xaf, 0x23, 0x52, 0xc1, 0x67, 0x17, 0xf5, 0x66, 0x90, 0xe7, 0xe8, 0x07, 0xb8, 0x60,
    0x48, 0xe6, 0x1e, 0x53, 0xf3, 0x92, 0xa4, 0x72, 0x8c, 0x08, 0x15, 0x6e, 0x86, 0x00, 0x84, 0xfa,
    0xf4, 0x7f, 0x8a, 0x42, 0x19, 0xf6, 0xdb, 0xcd, 0x14, 0x8d, 0x50, 0x12, 0xba, 0x3c, 0x06, 0x4e,
    0xec, 0xb3, 0x35, 0x11, 0xa1, 0x88, 0x8e, 0x2b, 0x94, 0x99, 0xb7, 0x71, 0x74, 0xd3, 0xe4, 0xbf,
    0x3a, 0xde, 0x96, 0x0e, 0xbc, 0x0a, 0xed, 0x77, 0xfc, 0x37, 0x6b, 0x03, 0x79, 0x89, 0x62, 0xc6,
    0xd7, 0xc0, 0xd2, 0x7c, 0x6a, 0x8b, 0x22, 0xa3, 0x5b, 0x05, 0x5d, 0x02, 0x75, 0xd5, 0x61, 0xe3,
    0x18, 0x8f, 0x55, 0x51, 0xad, 0x1f, 0x0b, 0x5e, 0x85, 0xe5, 0xc2, 0x57, 0x63, 0xca, 0x3d, 0x6c,
    0xb4, 0xc5, 0xcc, 0x70, 0xb2, 0x91, 0x59, 0x0d, 0x47, 0x20, 0xc8, 0x4f, 0x58, 0xe0, 0x01, 0xe2,
    0x16, 0x38, 0xc4, 0x6f, 0x3b, 0x0f, 0x65, 0x46, 0xbe, 0x7e, 0x2d, 0x7b, 0x82, 0xf9, 0x40, 0xb5,
    0x1d, 0x73, 0xf8, 0xeb, 0x26, 0xc7, 0x87, 0x97, 0x25, 0x54, 0xb1, 0x28, 0xaa, 0x98, 0x9d, 0xa5,
    0x64, 0x6d, 0x7a, 0xd4, 0x10, 0x81, 0x44, 0xef, 0x49, 0xd6, 0xae, 0x2e, 0xdd, 0x76, 0x5c, 0x2f,
    0xa7, 0x1c, 0xc9, 0x09, 0x69, 0x9a, 0x83, 0xcf, 0x29, 0x39, 0xb9, 0xe9, 0x4c, 0xff, 0x43, 0xab,
];

/// `rc2ParameterVersion` for an effective key size in bits.
pub(crate) fn rc2_version(effective_bits: u16) -> u32 {
    match usize::from(effective_bits) {
        bits if bits < 256 => u32::from(RC2_TABLE[bits]),
        _ => u32::from(effective_bits),
    }
}

/// Effective key bits for an `rc2ParameterVersion`.
pub(crate) fn rc2_effective_bits(version: u32) -> Result<u16> {
    if version < 256 {
        let bits = RC2_TABLE
            .iter()
            .position(|v| u32::from(*v) == version)
            .ok_or(Error::Malformed("unknown RC2 parameter version"))?;
        return Ok(bits as u16);
    }
    u16::try_from(version).map_err(|_| Error::Malformed("RC2 effective key bits out of range"))
}

/// Key wrap algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum KeyWrapAlgorithm {
    Aes128,
    Aes192,
    Aes256,
    DesEde3,
    Camellia128,
    Camellia192,
    Camellia256,
}

impl KeyWrapAlgorithm {
    /// Every supported wrap.
    pub const ALL: [KeyWrapAlgorithm; 7] = [
        KeyWrapAlgorithm::Aes128,
        KeyWrapAlgorithm::Aes192,
        KeyWrapAlgorithm::Aes256,
        KeyWrapAlgorithm::DesEde3,
        KeyWrapAlgorithm::Camellia128,
        KeyWrapAlgorithm::Camellia192,
        KeyWrapAlgorithm::Camellia256,
    ];

    /// Object identifier.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            KeyWrapAlgorithm::Aes128 => oids::AES128_WRAP,
            KeyWrapAlgorithm::Aes192 => oids::AES192_WRAP,
            KeyWrapAlgorithm::Aes256 => oids::AES256_WRAP,
            KeyWrapAlgorithm::DesEde3 => oids::DES_EDE3_WRAP,
            KeyWrapAlgorithm::Camellia128 => oids::CAMELLIA128_WRAP,
            KeyWrapAlgorithm::Camellia192 => oids::CAMELLIA192_WRAP,
            KeyWrapAlgorithm::Camellia256 => oids::CAMELLIA256_WRAP,
        }
    }

    /// Key-encryption key length in bytes.
    pub fn key_size(self) -> usize {
        match self {
            KeyWrapAlgorithm::Aes128 | KeyWrapAlgorithm::Camellia128 => 16,
            KeyWrapAlgorithm::Aes192 | KeyWrapAlgorithm::Camellia192 | KeyWrapAlgorithm::DesEde3 => 24,
            KeyWrapAlgorithm::Aes256 | KeyWrapAlgorithm::Camellia256 => 32,
        }
    }

    /// Cipher family.
    pub fn family(self) -> CipherFamily {
        match self {
            KeyWrapAlgorithm::Aes128 | KeyWrapAlgorithm::Aes192 | KeyWrapAlgorithm::Aes256 => {
                CipherFamily::Aes
            }
            KeyWrapAlgorithm::DesEde3 => CipherFamily::DesEde3,
            _ => CipherFamily::Camellia,
        }
    }

    /// Selects the wrap for a family and key-encryption key length.
    pub fn for_key(family: CipherFamily, key_len: usize) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.family() == family && alg.key_size() == key_len)
            .ok_or(match family {
                CipherFamily::Seed => Error::UnsupportedAlgorithm(oids::SEED_WRAP),
                _ => Error::Builder("no key wrap for this family and key length"),
            })
    }

    /// Identifier; 3DES wrap carries `NULL` (RFC 3370 § 4.3.1).
    pub fn identifier(self) -> AlgorithmIdentifier {
        match self {
            KeyWrapAlgorithm::DesEde3 => super::null_identifier(self.oid()),
            _ => super::identifier(self.oid()),
        }
    }

    /// Decodes a key wrap identifier.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<Self> {
        let alg = Self::ALL
            .into_iter()
            .find(|alg| alg.oid() == id.oid)
            .ok_or(Error::UnsupportedAlgorithm(id.oid))?;
        super::check_parameters(id)?;
        Ok(alg)
    }
}
