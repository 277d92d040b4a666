use const_oid::ObjectIdentifier;

use der::{asn1::OctetString, Sequence};

use super::{
    has_null_or_absent_parameters, identifier_with, null_identifier, oids, AlgorithmIdentifier,
    DigestAlgorithm, KeyWrapAlgorithm,
};
use crate::errors::{Error, Result};

/// HMAC pseudo-random functions for PBKDF2.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Pbkdf2Prf {
    #[default]
    HmacSha1,
    HmacSha224,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl Pbkdf2Prf {
    const ALL: [Pbkdf2Prf; 5] = [
        Pbkdf2Prf::HmacSha1,
        Pbkdf2Prf::HmacSha224,
        Pbkdf2Prf::HmacSha256,
        Pbkdf2Prf::HmacSha384,
        Pbkdf2Prf::HmacSha512,
    ];

    /// Object identifier.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Pbkdf2Prf::HmacSha1 => oids::HMAC_WITH_SHA1,
            Pbkdf2Prf::HmacSha224 => oids::HMAC_WITH_SHA224,
            Pbkdf2Prf::HmacSha256 => oids::HMAC_WITH_SHA256,
            Pbkdf2Prf::HmacSha384 => oids::HMAC_WITH_SHA384,
            Pbkdf2Prf::HmacSha512 => oids::HMAC_WITH_SHA512,
        }
    }

    /// Digest underlying the HMAC.
    pub fn digest(self) -> DigestAlgorithm {
        match self {
            Pbkdf2Prf::HmacSha1 => DigestAlgorithm::Sha1,
            Pbkdf2Prf::HmacSha224 => DigestAlgorithm::Sha224,
            Pbkdf2Prf::HmacSha256 => DigestAlgorithm::Sha256,
            Pbkdf2Prf::HmacSha384 => DigestAlgorithm::Sha384,
            Pbkdf2Prf::HmacSha512 => DigestAlgorithm::Sha512,
        }
    }

    fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|prf| prf.oid() == *oid)
            .ok_or(Error::UnsupportedAlgorithm(*oid))
    }
}

/// `PBKDF2-params` (RFC 8018 appendix A.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pbkdf2Parameters {
    /// Salt.
    pub salt: Vec<u8>,
    /// Iteration count.
    pub iterations: u32,
    /// Derived key length, if stated.
    pub key_length: Option<usize>,
    /// Pseudo-random function.
    pub prf: Pbkdf2Prf,
}

/// Wire form of `PBKDF2-params`; only the `specified` salt alternative is
/// supported.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct Pbkdf2Params {
    salt: OctetString,
    iteration_count: u32,
    #[asn1(optional = "true")]
    key_length: Option<u32>,
    #[asn1(optional = "true")]
    prf: Option<AlgorithmIdentifier>,
}

impl Pbkdf2Parameters {
    /// `id-PBKDF2` identifier; the PRF is omitted when it is the SHA-1 default.
    pub fn identifier(&self) -> Result<AlgorithmIdentifier> {
        let key_length = self
            .key_length
            .map(u32::try_from)
            .transpose()
            .map_err(|_| Error::Builder("PBKDF2 key length out of range"))?;
        let params = Pbkdf2Params {
            salt: OctetString::new(self.salt.as_slice())?,
            iteration_count: self.iterations,
            key_length,
            prf: (self.prf != Pbkdf2Prf::HmacSha1).then(|| null_identifier(self.prf.oid())),
        };
        identifier_with(oids::PBKDF2, &params)
    }

    /// Decodes an `id-PBKDF2` identifier.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<Self> {
        if id.oid != oids::PBKDF2 {
            return Err(Error::UnsupportedAlgorithm(id.oid));
        }
        let params: Pbkdf2Params = super::parameters(id, "malformed PBKDF2 parameters")?;
        if params.iteration_count == 0 {
            return Err(Error::Malformed("PBKDF2 iteration count must be positive"));
        }
        let key_length = params
            .key_length
            .map(usize::try_from)
            .transpose()
            .map_err(|_| Error::Malformed("PBKDF2 key length out of range"))?;
        let prf = match &params.prf {
            Some(prf) => {
                if !has_null_or_absent_parameters(prf) {
                    return Err(Error::Malformed("PBKDF2 PRF carries parameters"));
                }
                Pbkdf2Prf::from_oid(&prf.oid)?
            }
            None => Pbkdf2Prf::HmacSha1,
        };
        Ok(Self {
            salt: params.salt.into_bytes(),
            iterations: params.iteration_count,
            key_length,
            prf,
        })
    }
}

/// Elliptic-curve key agreement schemes of RFC 5753.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyAgreementScheme {
    /// `dhSinglePass-stdDH-*kdf-scheme`
    StandardDh,
    /// `dhSinglePass-cofactorDH-*kdf-scheme`
    CofactorDh,
    /// `mqvSinglePass-*kdf-scheme`
    Mqv,
}

/// A key agreement scheme paired with its X9.63 KDF digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyAgreementAlgorithm {
    /// Agreement primitive.
    pub scheme: KeyAgreementScheme,
    /// Digest driving the X9.63 KDF.
    pub kdf: DigestAlgorithm,
}

const AGREEMENTS: &[(ObjectIdentifier, KeyAgreementScheme, DigestAlgorithm)] = &[
    (oids::ECDH_STD_SHA1KDF, KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha1),
    (oids::ECDH_STD_SHA224KDF, KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha224),
    (oids::ECDH_STD_SHA256KDF, KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha256),
    (oids::ECDH_STD_SHA384KDF, KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha384),
    (oids::ECDH_STD_SHA512KDF, KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha512),
    (oids::ECDH_COFACTOR_SHA1KDF, KeyAgreementScheme::CofactorDh, DigestAlgorithm::Sha1),
    (oids::ECDH_COFACTOR_SHA224KDF, KeyAgreementScheme::CofactorDh, DigestAlgorithm::Sha224),
    (oids::ECDH_COFACTOR_SHA256KDF, KeyAgreementScheme::CofactorDh, DigestAlgorithm::Sha256),
    (oids::ECDH_COFACTOR_SHA384KDF, KeyAgreementScheme::CofactorDh, DigestAlgorithm::Sha384),
    (oids::ECDH_COFACTOR_SHA512KDF, KeyAgreementScheme::CofactorDh, DigestAlgorithm::Sha512),
    (oids::ECMQV_SHA1KDF, KeyAgreementScheme::Mqv, DigestAlgorithm::Sha1),
    (oids::ECMQV_SHA224KDF, KeyAgreementScheme::Mqv, DigestAlgorithm::Sha224),
    (oids::ECMQV_SHA256KDF, KeyAgreementScheme::Mqv, DigestAlgorithm::Sha256),
    (oids::ECMQV_SHA384KDF, KeyAgreementScheme::Mqv, DigestAlgorithm::Sha384),
    (oids::ECMQV_SHA512KDF, KeyAgreementScheme::Mqv, DigestAlgorithm::Sha512),
];

impl KeyAgreementAlgorithm {
    /// Scheme with the given KDF digest.
    pub fn new(scheme: KeyAgreementScheme, kdf: DigestAlgorithm) -> Self {
        Self { scheme, kdf }
    }

    /// Object identifier; only SHA-1 and SHA-2 KDFs are registered.
    pub fn oid(self) -> Result<ObjectIdentifier> {
        AGREEMENTS
            .iter()
            .find(|(_, scheme, kdf)| *scheme == self.scheme && *kdf == self.kdf)
            .map(|(oid, _, _)| *oid)
            .ok_or(Error::Builder("no key agreement scheme registered for this KDF"))
    }

    /// Identifier carrying the key wrap algorithm as parameters.
    pub fn identifier(self, wrap: KeyWrapAlgorithm) -> Result<AlgorithmIdentifier> {
        identifier_with(self.oid()?, &wrap.identifier())
    }

    /// Decodes the scheme and the key wrap algorithm in its parameters.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<(Self, KeyWrapAlgorithm)> {
        let (scheme, kdf) = AGREEMENTS
            .iter()
            .find(|(oid, _, _)| *oid == id.oid)
            .map(|(_, scheme, kdf)| (*scheme, *kdf))
            .ok_or(Error::UnsupportedAlgorithm(id.oid))?;
        let wrap: AlgorithmIdentifier =
            super::parameters(id, "key agreement requires a key wrap algorithm")?;
        let wrap = KeyWrapAlgorithm::from_identifier(&wrap)?;
        Ok((Self { scheme, kdf }, wrap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Encode;
    use hex_literal::hex;

    #[test]
    fn pbkdf2_defaults_omit_prf() {
        let params = Pbkdf2Parameters {
            salt: vec![1, 2, 3, 4, 5, 6, 7, 8],
            iterations: 2048,
            key_length: None,
            prf: Pbkdf2Prf::default(),
        };
        let id = params.identifier().unwrap();
        assert_eq!(
            id.to_der().unwrap(),
            hex!("301b 06092a864886f70d01050c 300e 04080102030405060708 02020800")
        );
        assert_eq!(Pbkdf2Parameters::from_identifier(&id).unwrap(), params);
    }

    #[test]
    fn pbkdf2_sha256_prf() {
        let params = Pbkdf2Parameters {
            salt: vec![9; 16],
            iterations: 10_000,
            key_length: Some(16),
            prf: Pbkdf2Prf::HmacSha256,
        };
        let id = params.identifier().unwrap();
        assert_eq!(Pbkdf2Parameters::from_identifier(&id).unwrap(), params);
    }

    #[test]
    fn agreement_identifier_carries_wrap() {
        let alg = KeyAgreementAlgorithm::new(KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha1);
        let id = alg.identifier(KeyWrapAlgorithm::Aes128).unwrap();
        assert_eq!(id.oid, oids::ECDH_STD_SHA1KDF);
        let (decoded, wrap) = KeyAgreementAlgorithm::from_identifier(&id).unwrap();
        assert_eq!(decoded, alg);
        assert_eq!(wrap, KeyWrapAlgorithm::Aes128);
        assert!(
            KeyAgreementAlgorithm::new(KeyAgreementScheme::Mqv, DigestAlgorithm::Sha3_256)
                .oid()
                .is_err()
        );
    }
}
