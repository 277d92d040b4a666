use const_oid::ObjectIdentifier;
use der::{
    asn1::{AnyRef, OctetStringRef},
    referenced::RefToOwned,
};
use pkcs1::{RsaOaepParams, RsaPssParams, TrailerField};
use spki::{AlgorithmIdentifier as Identifier, AlgorithmIdentifierRef};

use super::{identifier_with, null_identifier, oids, AlgorithmIdentifier, DigestAlgorithm};
use crate::errors::{Error, Result};

/// `RSASSA-PSS-params` (RFC 8017 appendix A.2.3) with MGF1 and the only
/// defined trailer field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PssParameters {
    /// Message hash.
    pub digest: DigestAlgorithm,
    /// Hash used by MGF1.
    pub mgf_digest: DigestAlgorithm,
    /// Salt length in bytes.
    pub salt_len: usize,
}

impl PssParameters {
    /// Parameters with MGF1 over the same hash and a salt as long as the
    /// digest output.
    pub fn new(digest: DigestAlgorithm) -> Self {
        Self {
            digest,
            mgf_digest: digest,
            salt_len: digest.output_size(),
        }
    }

    /// Same as [`PssParameters::new`] with an explicit salt length.
    pub fn with_salt_len(digest: DigestAlgorithm, salt_len: usize) -> Self {
        Self {
            salt_len,
            ..Self::new(digest)
        }
    }

    /// Wire form; fields equal to their defaults are omitted on encoding.
    fn to_params(self) -> Result<RsaPssParams<'static>> {
        Ok(RsaPssParams {
            hash: hash_identifier(self.digest),
            mask_gen: mgf1_identifier(self.mgf_digest),
            salt_len: u8::try_from(self.salt_len)
                .map_err(|_| Error::Builder("PSS salt length must fit in one byte"))?,
            trailer_field: TrailerField::BC,
        })
    }

    fn from_params(params: &RsaPssParams<'_>) -> Result<Self> {
        Ok(Self {
            digest: hash_digest(&params.hash)?,
            mgf_digest: mgf1_digest(&params.mask_gen)?,
            salt_len: usize::from(params.salt_len),
        })
    }
}

/// Signature algorithms as declared in a `SignerInfo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// `sha*WithRSAEncryption`: PKCS#1 v1.5 over a `DigestInfo`.
    RsaPkcs1v15(DigestAlgorithm),
    /// Bare `rsaEncryption`: PKCS#1 v1.5, digest taken from the signer's
    /// digest algorithm.
    RsaEncryption,
    /// RSASSA-PSS with explicit parameters.
    RsaPss(PssParameters),
    /// `ecdsa-with-*`
    Ecdsa(DigestAlgorithm),
    /// `id-dsa-with-*`; registered, no handler.
    Dsa(DigestAlgorithm),
}

const PKCS1V15: &[(ObjectIdentifier, DigestAlgorithm)] = &[
    (oids::SHA1_WITH_RSA, DigestAlgorithm::Sha1),
    (oids::SHA224_WITH_RSA, DigestAlgorithm::Sha224),
    (oids::SHA256_WITH_RSA, DigestAlgorithm::Sha256),
    (oids::SHA384_WITH_RSA, DigestAlgorithm::Sha384),
    (oids::SHA512_WITH_RSA, DigestAlgorithm::Sha512),
    (oids::SHA512_224_WITH_RSA, DigestAlgorithm::Sha512_224),
    (oids::SHA512_256_WITH_RSA, DigestAlgorithm::Sha512_256),
    (oids::SHA3_224_WITH_RSA, DigestAlgorithm::Sha3_224),
    (oids::SHA3_256_WITH_RSA, DigestAlgorithm::Sha3_256),
    (oids::SHA3_384_WITH_RSA, DigestAlgorithm::Sha3_384),
    (oids::SHA3_512_WITH_RSA, DigestAlgorithm::Sha3_512),
];

const ECDSA: &[(ObjectIdentifier, DigestAlgorithm)] = &[
    (oids::ECDSA_WITH_SHA1, DigestAlgorithm::Sha1),
    (oids::ECDSA_WITH_SHA224, DigestAlgorithm::Sha224),
    (oids::ECDSA_WITH_SHA256, DigestAlgorithm::Sha256),
    (oids::ECDSA_WITH_SHA384, DigestAlgorithm::Sha384),
    (oids::ECDSA_WITH_SHA512, DigestAlgorithm::Sha512),
    (oids::ECDSA_WITH_SHA3_224, DigestAlgorithm::Sha3_224),
    (oids::ECDSA_WITH_SHA3_256, DigestAlgorithm::Sha3_256),
    (oids::ECDSA_WITH_SHA3_384, DigestAlgorithm::Sha3_384),
    (oids::ECDSA_WITH_SHA3_512, DigestAlgorithm::Sha3_512),
];

const DSA: &[(ObjectIdentifier, DigestAlgorithm)] = &[
    (oids::DSA_WITH_SHA1, DigestAlgorithm::Sha1),
    (oids::DSA_WITH_SHA224, DigestAlgorithm::Sha224),
    (oids::DSA_WITH_SHA256, DigestAlgorithm::Sha256),
];

fn lookup(table: &[(ObjectIdentifier, DigestAlgorithm)], oid: &ObjectIdentifier) -> Option<DigestAlgorithm> {
    table.iter().find(|(o, _)| o == oid).map(|(_, d)| *d)
}

fn reverse(table: &[(ObjectIdentifier, DigestAlgorithm)], digest: DigestAlgorithm) -> Option<ObjectIdentifier> {
    table.iter().find(|(_, d)| *d == digest).map(|(o, _)| *o)
}

/// Digest a composite signature algorithm is defined over.
pub fn default_digest_for_signature(oid: &ObjectIdentifier) -> Option<DigestAlgorithm> {
    lookup(PKCS1V15, oid)
        .or_else(|| lookup(ECDSA, oid))
        .or_else(|| lookup(DSA, oid))
}

impl SignatureAlgorithm {
    /// Decodes and validates a signature algorithm identifier.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<Self> {
        super::check_parameters(id)?;
        if id.oid == oids::RSA_ENCRYPTION {
            return Ok(SignatureAlgorithm::RsaEncryption);
        }
        if id.oid == oids::RSASSA_PSS {
            let params: RsaPssParams<'_> =
                super::parameters(id, "malformed RSASSA-PSS parameters")?;
            return Ok(SignatureAlgorithm::RsaPss(PssParameters::from_params(&params)?));
        }
        if let Some(digest) = lookup(PKCS1V15, &id.oid) {
            return Ok(SignatureAlgorithm::RsaPkcs1v15(digest));
        }
        if let Some(digest) = lookup(ECDSA, &id.oid) {
            return Ok(SignatureAlgorithm::Ecdsa(digest));
        }
        if let Some(digest) = lookup(DSA, &id.oid) {
            return Ok(SignatureAlgorithm::Dsa(digest));
        }
        Err(Error::UnsupportedAlgorithm(id.oid))
    }

    /// Identifier with the parameters this family requires.
    pub fn identifier(&self) -> Result<AlgorithmIdentifier> {
        let unregistered = || Error::Builder("no signature algorithm registered for this digest");
        Ok(match self {
            SignatureAlgorithm::RsaPkcs1v15(digest) => {
                null_identifier(reverse(PKCS1V15, *digest).ok_or_else(unregistered)?)
            }
            SignatureAlgorithm::RsaEncryption => null_identifier(oids::RSA_ENCRYPTION),
            SignatureAlgorithm::RsaPss(params) => {
                identifier_with(oids::RSASSA_PSS, &params.to_params()?)?
            }
            SignatureAlgorithm::Ecdsa(digest) => {
                super::identifier(reverse(ECDSA, *digest).ok_or_else(unregistered)?)
            }
            SignatureAlgorithm::Dsa(digest) => {
                super::identifier(reverse(DSA, *digest).ok_or_else(unregistered)?)
            }
        })
    }

    /// Checks the algorithm is consistent with the signer's digest algorithm.
    ///
    /// RSASSA-PSS with a message hash or MGF1 hash other than the declared
    /// digest is a parameter combination without a handler, so it reports
    /// [`Error::UnsupportedAlgorithm`]; the composite families report
    /// [`Error::Malformed`].
    pub fn check_digest(&self, declared: DigestAlgorithm) -> Result<()> {
        let consistent = match self {
            SignatureAlgorithm::RsaEncryption => true,
            SignatureAlgorithm::RsaPkcs1v15(digest)
            | SignatureAlgorithm::Ecdsa(digest)
            | SignatureAlgorithm::Dsa(digest) => *digest == declared,
            SignatureAlgorithm::RsaPss(params) => {
                if params.digest != declared || params.mgf_digest != declared {
                    return Err(Error::UnsupportedAlgorithm(oids::RSASSA_PSS));
                }
                true
            }
        };
        if !consistent {
            return Err(Error::Malformed(
                "signature algorithm does not match the digest algorithm",
            ));
        }
        Ok(())
    }
}

/// Key transport padding of a `KeyTransRecipientInfo`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyTransportAlgorithm {
    /// `rsaEncryption` (PKCS#1 v1.5).
    RsaPkcs1v15,
    /// `id-RSAES-OAEP` with an empty label.
    RsaOaep {
        /// Label hash.
        digest: DigestAlgorithm,
        /// Hash used by MGF1.
        mgf_digest: DigestAlgorithm,
    },
}

impl KeyTransportAlgorithm {
    /// OAEP with the same hash for the label and MGF1.
    pub fn oaep(digest: DigestAlgorithm) -> Self {
        KeyTransportAlgorithm::RsaOaep {
            digest,
            mgf_digest: digest,
        }
    }

    /// Identifier; OAEP fields equal to the SHA-1 defaults are omitted.
    pub fn identifier(&self) -> Result<AlgorithmIdentifier> {
        match self {
            KeyTransportAlgorithm::RsaPkcs1v15 => Ok(null_identifier(oids::RSA_ENCRYPTION)),
            KeyTransportAlgorithm::RsaOaep { digest, mgf_digest } => {
                let params = RsaOaepParams {
                    hash: hash_identifier(*digest),
                    mask_gen: mgf1_identifier(*mgf_digest),
                    ..Default::default()
                };
                identifier_with(oids::RSAES_OAEP, &params)
            }
        }
    }

    /// Decodes a key transport identifier.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<Self> {
        super::check_parameters(id)?;
        if id.oid == oids::RSA_ENCRYPTION {
            return Ok(KeyTransportAlgorithm::RsaPkcs1v15);
        }
        if id.oid != oids::RSAES_OAEP {
            return Err(Error::UnsupportedAlgorithm(id.oid));
        }
        let params: RsaOaepParams<'_> =
            super::parameters(id, "malformed RSAES-OAEP parameters")?;
        let source = params.p_source;
        let label = match source.parameters {
            Some(label) => OctetStringRef::try_from(label)?.as_bytes(),
            None => &[],
        };
        if source.oid != oids::P_SPECIFIED || !label.is_empty() {
            return Err(Error::UnsupportedAlgorithm(source.oid));
        }
        Ok(KeyTransportAlgorithm::RsaOaep {
            digest: hash_digest(&params.hash)?,
            mgf_digest: mgf1_digest(&params.mask_gen)?,
        })
    }
}

fn hash_identifier(digest: DigestAlgorithm) -> AlgorithmIdentifierRef<'static> {
    AlgorithmIdentifierRef {
        oid: digest.oid(),
        parameters: Some(AnyRef::NULL),
    }
}

fn mgf1_identifier(digest: DigestAlgorithm) -> Identifier<AlgorithmIdentifierRef<'static>> {
    Identifier {
        oid: oids::MGF1,
        parameters: Some(hash_identifier(digest)),
    }
}

fn mgf1_digest(mask_gen: &Identifier<AlgorithmIdentifierRef<'_>>) -> Result<DigestAlgorithm> {
    if mask_gen.oid != oids::MGF1 {
        return Err(Error::UnsupportedAlgorithm(mask_gen.oid));
    }
    let hash = mask_gen
        .parameters
        .as_ref()
        .ok_or(Error::Malformed("MGF1 requires a hash parameter"))?;
    hash_digest(hash)
}

fn hash_digest(hash: &AlgorithmIdentifierRef<'_>) -> Result<DigestAlgorithm> {
    DigestAlgorithm::from_identifier(&hash.ref_to_owned())
}
