//! Signing and verifying keys, dispatched by key family.

use rand_core::CryptoRngCore;
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use x509_cert::Certificate;

use crate::cert;
use crate::errors::{Error, Result};
use crate::registry::{oids, DigestAlgorithm, PssParameters, SignatureAlgorithm};

/// Private key of a signer.
#[derive(Clone)]
pub enum SigningKey {
    /// RSA key signing PKCS#1 v1.5 by default.
    Rsa(RsaPrivateKey),
    /// RSA key signing RSASSA-PSS by default.
    RsaPss(RsaPrivateKey),
    /// ECDSA over P-256.
    EcdsaP256(p256::ecdsa::SigningKey),
    /// ECDSA over P-384.
    EcdsaP384(p384::ecdsa::SigningKey),
}

impl core::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let family = match self {
            SigningKey::Rsa(_) => "Rsa",
            SigningKey::RsaPss(_) => "RsaPss",
            SigningKey::EcdsaP256(_) => "EcdsaP256",
            SigningKey::EcdsaP384(_) => "EcdsaP384",
        };
        f.debug_tuple("SigningKey").field(&family).finish()
    }
}

impl SigningKey {
    /// Matching public key.
    pub fn verifier_key(&self) -> VerifierKey {
        match self {
            SigningKey::Rsa(key) | SigningKey::RsaPss(key) => VerifierKey::Rsa(key.to_public_key()),
            SigningKey::EcdsaP256(key) => VerifierKey::EcdsaP256(*key.verifying_key()),
            SigningKey::EcdsaP384(key) => VerifierKey::EcdsaP384(*key.verifying_key()),
        }
    }

    pub(crate) fn default_algorithm(&self, digest: DigestAlgorithm) -> SignatureAlgorithm {
        match self {
            SigningKey::Rsa(_) => SignatureAlgorithm::RsaPkcs1v15(digest),
            SigningKey::RsaPss(_) => SignatureAlgorithm::RsaPss(PssParameters::new(digest)),
            SigningKey::EcdsaP256(_) | SigningKey::EcdsaP384(_) => SignatureAlgorithm::Ecdsa(digest),
        }
    }

    /// Whether this key can produce `algorithm`.
    pub(crate) fn check_algorithm(&self, algorithm: &SignatureAlgorithm) -> Result<()> {
        let fits = match (self, algorithm) {
            (_, SignatureAlgorithm::Dsa(_)) => return Err(unsupported(algorithm)),
            (SigningKey::Rsa(_) | SigningKey::RsaPss(_), alg) => is_rsa(alg),
            (SigningKey::EcdsaP256(_) | SigningKey::EcdsaP384(_), alg) => {
                matches!(alg, SignatureAlgorithm::Ecdsa(_))
            }
        };
        if !fits {
            return Err(Error::KeyMismatch);
        }
        Ok(())
    }

    /// Signs the `hashed` input (digest of the signed attributes or of the
    /// content) with `algorithm`.
    pub(crate) fn sign(
        &self,
        algorithm: &SignatureAlgorithm,
        digest: DigestAlgorithm,
        hashed: &[u8],
        rng: &mut dyn CryptoRngCore,
    ) -> Result<Vec<u8>> {
        self.check_algorithm(algorithm)?;
        let mut rng = rng;
        match (self, algorithm) {
            (SigningKey::Rsa(key) | SigningKey::RsaPss(key), SignatureAlgorithm::RsaPss(params)) => {
                key.sign_with_rng(&mut rng, pss(params), hashed)
                    .map_err(|_| Error::KeyMismatch)
            }
            (SigningKey::Rsa(key) | SigningKey::RsaPss(key), _) => key
                .sign_with_rng(&mut rng, pkcs1v15(digest), hashed)
                .map_err(|_| Error::KeyMismatch),
            (SigningKey::EcdsaP256(key), _) => {
                let signature: p256::ecdsa::Signature =
                    key.sign_prehash(hashed).map_err(|_| Error::KeyMismatch)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (SigningKey::EcdsaP384(key), _) => {
                let signature: p384::ecdsa::Signature =
                    key.sign_prehash(hashed).map_err(|_| Error::KeyMismatch)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

/// Public key of a signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifierKey {
    /// RSA public key, for PKCS#1 v1.5 and RSASSA-PSS.
    Rsa(RsaPublicKey),
    /// ECDSA over P-256.
    EcdsaP256(p256::ecdsa::VerifyingKey),
    /// ECDSA over P-384.
    EcdsaP384(p384::ecdsa::VerifyingKey),
}

impl VerifierKey {
    /// Decodes a DER `SubjectPublicKeyInfo`.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self> {
        let spki = spki::SubjectPublicKeyInfoRef::try_from(der)
            .map_err(|_| Error::Malformed("malformed SubjectPublicKeyInfo"))?;
        let malformed = |_| Error::Malformed("public key does not match its algorithm");
        match spki.algorithm.oid {
            oids::RSA_ENCRYPTION => Ok(VerifierKey::Rsa(
                RsaPublicKey::from_public_key_der(der).map_err(|_| Error::Malformed("malformed RSA public key"))?,
            )),
            oids::EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters_oid()
                    .map_err(|_| Error::Malformed("EC public key without a named curve"))?;
                match curve {
                    oids::SECP256R1 => Ok(VerifierKey::EcdsaP256(
                        p256::ecdsa::VerifyingKey::from_public_key_der(der).map_err(malformed)?,
                    )),
                    oids::SECP384R1 => Ok(VerifierKey::EcdsaP384(
                        p384::ecdsa::VerifyingKey::from_public_key_der(der).map_err(malformed)?,
                    )),
                    other => Err(Error::UnsupportedAlgorithm(other)),
                }
            }
            other => Err(Error::UnsupportedAlgorithm(other)),
        }
    }

    /// Subject public key of `cert`.
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        Self::from_public_key_der(&cert::public_key_der(cert)?)
    }

    /// `Ok(false)` for a signature that does not verify; `Err` when this
    /// key cannot check `algorithm` at all.
    pub(crate) fn verify(
        &self,
        algorithm: &SignatureAlgorithm,
        digest: DigestAlgorithm,
        hashed: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        match (self, algorithm) {
            (_, SignatureAlgorithm::Dsa(_)) => Err(unsupported(algorithm)),
            (VerifierKey::Rsa(key), SignatureAlgorithm::RsaPss(params)) => {
                Ok(key.verify(pss(params), hashed, signature).is_ok())
            }
            (VerifierKey::Rsa(key), alg) if is_rsa(alg) => {
                Ok(key.verify(pkcs1v15(digest), hashed, signature).is_ok())
            }
            (VerifierKey::EcdsaP256(key), SignatureAlgorithm::Ecdsa(_)) => {
                Ok(p256::ecdsa::Signature::from_der(signature)
                    .is_ok_and(|sig| key.verify_prehash(hashed, &sig).is_ok()))
            }
            (VerifierKey::EcdsaP384(key), SignatureAlgorithm::Ecdsa(_)) => {
                Ok(p384::ecdsa::Signature::from_der(signature)
                    .is_ok_and(|sig| key.verify_prehash(hashed, &sig).is_ok()))
            }
            _ => Err(Error::KeyMismatch),
        }
    }
}

impl From<RsaPublicKey> for VerifierKey {
    fn from(key: RsaPublicKey) -> Self {
        VerifierKey::Rsa(key)
    }
}

impl From<p256::ecdsa::VerifyingKey> for VerifierKey {
    fn from(key: p256::ecdsa::VerifyingKey) -> Self {
        VerifierKey::EcdsaP256(key)
    }
}

impl From<p384::ecdsa::VerifyingKey> for VerifierKey {
    fn from(key: p384::ecdsa::VerifyingKey) -> Self {
        VerifierKey::EcdsaP384(key)
    }
}

fn is_rsa(algorithm: &SignatureAlgorithm) -> bool {
    matches!(
        algorithm,
        SignatureAlgorithm::RsaPkcs1v15(_)
            | SignatureAlgorithm::RsaEncryption
            | SignatureAlgorithm::RsaPss(_)
    )
}

fn unsupported(algorithm: &SignatureAlgorithm) -> Error {
    match algorithm.identifier() {
        Ok(id) => Error::UnsupportedAlgorithm(id.oid),
        Err(_) => Error::UnsupportedAlgorithm(oids::DSA),
    }
}

fn pkcs1v15(digest: DigestAlgorithm) -> Pkcs1v15Sign {
    Pkcs1v15Sign {
        hash_len: Some(digest.output_size()),
        prefix: digest.digest_info_prefix().into_boxed_slice(),
    }
}

fn pss(params: &PssParameters) -> Pss {
    Pss {
        blinded: true,
        digest: params.digest.new_hasher(),
        salt_len: params.salt_len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
    use rsa::pkcs8::DecodePrivateKey;

    const RSA_ALICE: &str = include_str!("../../tests/examples/keys/rsa-alice.pem");
    const EC_ALICE: &str = include_str!("../../tests/examples/keys/ec-alice.pem");
    const EC384_ALICE: &str = include_str!("../../tests/examples/keys/ec384-alice.pem");

    fn keys() -> Vec<SigningKey> {
        let rsa = RsaPrivateKey::from_pkcs8_pem(RSA_ALICE).expect("failed to parse key");
        vec![
            SigningKey::Rsa(rsa.clone()),
            SigningKey::RsaPss(rsa),
            SigningKey::EcdsaP256(p256::ecdsa::SigningKey::from_pkcs8_pem(EC_ALICE).unwrap()),
            SigningKey::EcdsaP384(p384::ecdsa::SigningKey::from_pkcs8_pem(EC384_ALICE).unwrap()),
        ]
    }

    #[test]
    fn sign_then_verify_each_family() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let digest = DigestAlgorithm::Sha256;
        let hashed = digest.digest(b"attributes");
        for key in keys() {
            let algorithm = key.default_algorithm(digest);
            let signature = key.sign(&algorithm, digest, &hashed, &mut rng).unwrap();
            let verifier = key.verifier_key();
            assert!(verifier.verify(&algorithm, digest, &hashed, &signature).unwrap());

            let mut tampered = hashed.clone();
            tampered[0] ^= 1;
            assert!(!verifier.verify(&algorithm, digest, &tampered, &signature).unwrap());
        }
    }

    #[test]
    fn family_mismatch_is_key_mismatch() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let keys = keys();
        let hashed = DigestAlgorithm::Sha256.digest(b"x");
        let ecdsa = SignatureAlgorithm::Ecdsa(DigestAlgorithm::Sha256);
        assert!(matches!(
            keys[0].sign(&ecdsa, DigestAlgorithm::Sha256, &hashed, &mut rng),
            Err(Error::KeyMismatch)
        ));
        assert!(matches!(
            keys[2].verifier_key().verify(
                &SignatureAlgorithm::RsaPkcs1v15(DigestAlgorithm::Sha256),
                DigestAlgorithm::Sha256,
                &hashed,
                &[0; 64]
            ),
            Err(Error::KeyMismatch)
        ));
        assert!(matches!(
            keys[0].verifier_key().verify(
                &SignatureAlgorithm::Dsa(DigestAlgorithm::Sha256),
                DigestAlgorithm::Sha256,
                &hashed,
                &[0; 64]
            ),
            Err(Error::UnsupportedAlgorithm(oid)) if oid == oids::DSA_WITH_SHA256
        ));
    }

    #[cfg(feature = "pem")]
    #[test]
    fn verifier_from_certificate() {
        let cert = cert::certificate_from_pem(include_str!("../../tests/examples/keys/ec-alice.crt"))
            .unwrap();
        let key = p256::ecdsa::SigningKey::from_pkcs8_pem(EC_ALICE).unwrap();
        assert_eq!(
            VerifierKey::from_certificate(&cert).unwrap(),
            VerifierKey::EcdsaP256(*key.verifying_key())
        );
    }
}
