use const_oid::ObjectIdentifier;
use digest::DynDigest;

use super::{has_null_or_absent_parameters, oids, AlgorithmIdentifier};
use crate::errors::{Error, Result};

/// Message digest algorithms with a registered implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl DigestAlgorithm {
    /// Every supported digest.
    pub const ALL: [DigestAlgorithm; 11] = [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha224,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
        DigestAlgorithm::Sha512_224,
        DigestAlgorithm::Sha512_256,
        DigestAlgorithm::Sha3_224,
        DigestAlgorithm::Sha3_256,
        DigestAlgorithm::Sha3_384,
        DigestAlgorithm::Sha3_512,
    ];

    /// Object identifier.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => oids::SHA1,
            DigestAlgorithm::Sha224 => oids::SHA224,
            DigestAlgorithm::Sha256 => oids::SHA256,
            DigestAlgorithm::Sha384 => oids::SHA384,
            DigestAlgorithm::Sha512 => oids::SHA512,
            DigestAlgorithm::Sha512_224 => oids::SHA512_224,
            DigestAlgorithm::Sha512_256 => oids::SHA512_256,
            DigestAlgorithm::Sha3_224 => oids::SHA3_224,
            DigestAlgorithm::Sha3_256 => oids::SHA3_256,
            DigestAlgorithm::Sha3_384 => oids::SHA3_384,
            DigestAlgorithm::Sha3_512 => oids::SHA3_512,
        }
    }

    /// Looks up a digest by object identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.oid() == *oid)
            .ok_or(Error::UnsupportedAlgorithm(*oid))
    }

    /// Looks up a digest, accepting absent or `NULL` parameters.
    pub fn from_identifier(id: &AlgorithmIdentifier) -> Result<Self> {
        let alg = Self::from_oid(&id.oid)?;
        if !has_null_or_absent_parameters(id) {
            return Err(Error::Malformed("digest algorithm carries parameters"));
        }
        Ok(alg)
    }

    /// Identifier with absent parameters (RFC 5754 § 2).
    pub fn identifier(self) -> AlgorithmIdentifier {
        super::identifier(self.oid())
    }

    /// Canonical registry name.
    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA1",
            DigestAlgorithm::Sha224 => "SHA224",
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha384 => "SHA384",
            DigestAlgorithm::Sha512 => "SHA512",
            DigestAlgorithm::Sha512_224 => "SHA512(224)",
            DigestAlgorithm::Sha512_256 => "SHA512(256)",
            DigestAlgorithm::Sha3_224 => "SHA3-224",
            DigestAlgorithm::Sha3_256 => "SHA3-256",
            DigestAlgorithm::Sha3_384 => "SHA3-384",
            DigestAlgorithm::Sha3_512 => "SHA3-512",
        }
    }

    /// Digest output length in bytes.
    pub fn output_size(self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha224 | DigestAlgorithm::Sha512_224 | DigestAlgorithm::Sha3_224 => 28,
            DigestAlgorithm::Sha256 | DigestAlgorithm::Sha512_256 | DigestAlgorithm::Sha3_256 => 32,
            DigestAlgorithm::Sha384 | DigestAlgorithm::Sha3_384 => 48,
            DigestAlgorithm::Sha512 | DigestAlgorithm::Sha3_512 => 64,
        }
    }

    /// Fresh hasher.
    pub fn new_hasher(self) -> Box<dyn DynDigest + Send + Sync> {
        match self {
            DigestAlgorithm::Sha1 => Box::new(sha1::Sha1::default()),
            DigestAlgorithm::Sha224 => Box::new(sha2::Sha224::default()),
            DigestAlgorithm::Sha256 => Box::new(sha2::Sha256::default()),
            DigestAlgorithm::Sha384 => Box::new(sha2::Sha384::default()),
            DigestAlgorithm::Sha512 => Box::new(sha2::Sha512::default()),
            DigestAlgorithm::Sha512_224 => Box::new(sha2::Sha512_224::default()),
            DigestAlgorithm::Sha512_256 => Box::new(sha2::Sha512_256::default()),
            DigestAlgorithm::Sha3_224 => Box::new(sha3::Sha3_224::default()),
            DigestAlgorithm::Sha3_256 => Box::new(sha3::Sha3_256::default()),
            DigestAlgorithm::Sha3_384 => Box::new(sha3::Sha3_384::default()),
            DigestAlgorithm::Sha3_512 => Box::new(sha3::Sha3_512::default()),
        }
    }

    /// One-shot digest.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.new_hasher();
        hasher.update(data);
        hasher.finalize().into_vec()
    }

    /// DER `DigestInfo` header preceding the digest in a PKCS#1 v1.5 signature.
    ///
    /// prefix = 0x30 <oid_len + 8 + digest_len> 0x30 <oid_len + 4> 0x06 <oid_len> oid 0x05 0x00 0x04 <digest_len>
    pub fn digest_info_prefix(self) -> Vec<u8> {
        let oid = self.oid();
        let oid = oid.as_bytes();
        let oid_len = oid.len() as u8;
        let digest_len = self.output_size() as u8;
        let mut v = vec![
            0x30,
            oid_len + 8 + digest_len,
            0x30,
            oid_len + 4,
            0x6,
            oid_len,
        ];
        v.extend_from_slice(oid);
        v.extend_from_slice(&[0x05, 0x00, 0x04, digest_len]);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_prefix_matches_rfc8017() {
        assert_eq!(
            DigestAlgorithm::Sha256.digest_info_prefix(),
            hex!("3031300d060960864801650304020105000420")
        );
        assert_eq!(
            DigestAlgorithm::Sha1.digest_info_prefix(),
            hex!("3021300906052b0e03021a05000414")
        );
    }

    #[test]
    fn output_sizes_agree_with_hashers() {
        for alg in DigestAlgorithm::ALL {
            assert_eq!(alg.digest(b"abc").len(), alg.output_size(), "{}", alg.name());
        }
    }

    #[test]
    fn lookup_by_oid() {
        assert_eq!(
            DigestAlgorithm::from_oid(&oids::SHA384).unwrap(),
            DigestAlgorithm::Sha384
        );
        assert!(matches!(
            DigestAlgorithm::from_oid(&oids::AES128_CBC),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
