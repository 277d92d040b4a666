//! Elliptic-curve Diffie-Hellman and one-pass MQV (SEC 1 § 3.4, RFC 5753),
//! generic over [`CurveArithmetic`] and dispatched for P-256 and P-384.

use elliptic_curve::{
    group::{Curve as _, Group},
    ops::Reduce,
    point::AffineCoordinates,
    sec1::ToEncodedPoint,
    AffinePoint, CurveArithmetic, FieldBytes, ProjectivePoint, PublicKey, SecretKey,
};
use pkcs8::{DecodePrivateKey, DecodePublicKey};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::registry::oids;
use const_oid::ObjectIdentifier;

/// Supported named curves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Curve {
    /// NIST P-256 (`secp256r1`).
    P256,
    /// NIST P-384 (`secp384r1`).
    P384,
}

impl Curve {
    /// Named-curve object identifier.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            Curve::P256 => oids::SECP256R1,
            Curve::P384 => oids::SECP384R1,
        }
    }

    /// Curve with this named-curve identifier.
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        [Curve::P256, Curve::P384]
            .into_iter()
            .find(|curve| curve.oid() == *oid)
            .ok_or(Error::UnsupportedAlgorithm(*oid))
    }
}

/// Public key of a key agreement party.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgreementPublicKey {
    /// P-256 point.
    P256(p256::PublicKey),
    /// P-384 point.
    P384(p384::PublicKey),
}

/// Private key of a key agreement party.
#[derive(Clone)]
pub enum AgreementPrivateKey {
    /// P-256 scalar.
    P256(p256::SecretKey),
    /// P-384 scalar.
    P384(p384::SecretKey),
}

impl core::fmt::Debug for AgreementPrivateKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("AgreementPrivateKey").field(&self.curve()).finish()
    }
}

impl AgreementPublicKey {
    /// Decodes a SEC 1 point, inferring the curve from its length.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        let invalid = |_| Error::Malformed("invalid elliptic curve point");
        match bytes.len() {
            33 | 65 => Ok(Self::P256(p256::PublicKey::from_sec1_bytes(bytes).map_err(invalid)?)),
            49 | 97 => Ok(Self::P384(p384::PublicKey::from_sec1_bytes(bytes).map_err(invalid)?)),
            _ => Err(Error::Malformed("elliptic curve point of unsupported length")),
        }
    }

    /// Decodes a DER `SubjectPublicKeyInfo`.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
            return Ok(Self::P256(key));
        }
        p384::PublicKey::from_public_key_der(der)
            .map(Self::P384)
            .map_err(|_| Error::Malformed("not a P-256 or P-384 public key"))
    }

    /// Uncompressed SEC 1 encoding.
    pub fn to_sec1_bytes(&self) -> Vec<u8> {
        match self {
            Self::P256(key) => key.to_encoded_point(false).as_bytes().to_vec(),
            Self::P384(key) => key.to_encoded_point(false).as_bytes().to_vec(),
        }
    }

    /// Curve of this key.
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
        }
    }
}

impl AgreementPrivateKey {
    /// Decodes a DER PKCS#8 private key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_der(der) {
            return Ok(Self::P256(key));
        }
        p384::SecretKey::from_pkcs8_der(der)
            .map(Self::P384)
            .map_err(|_| Error::Malformed("not a P-256 or P-384 private key"))
    }

    /// Decodes a PEM PKCS#8 private key.
    #[cfg(feature = "pem")]
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        if let Ok(key) = p256::SecretKey::from_pkcs8_pem(pem) {
            return Ok(Self::P256(key));
        }
        p384::SecretKey::from_pkcs8_pem(pem)
            .map(Self::P384)
            .map_err(|_| Error::Malformed("not a P-256 or P-384 private key"))
    }

    /// Fresh key on `curve`.
    pub fn random(curve: Curve, rng: &mut dyn CryptoRngCore) -> Self {
        let mut rng = rng;
        match curve {
            Curve::P256 => Self::P256(p256::SecretKey::random(&mut rng)),
            Curve::P384 => Self::P384(p384::SecretKey::random(&mut rng)),
        }
    }

    /// Matching public key.
    pub fn public_key(&self) -> AgreementPublicKey {
        match self {
            Self::P256(key) => AgreementPublicKey::P256(key.public_key()),
            Self::P384(key) => AgreementPublicKey::P384(key.public_key()),
        }
    }

    /// Curve of this key.
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
        }
    }

    /// Shared secret `Z = x(d · Q)`. The cofactor of both curves is 1, so
    /// this also serves the cofactor scheme.
    pub(crate) fn diffie_hellman(&self, public: &AgreementPublicKey) -> Result<Zeroizing<Vec<u8>>> {
        match (self, public) {
            (Self::P256(d), AgreementPublicKey::P256(q)) => Ok(ecdh(d, q)),
            (Self::P384(d), AgreementPublicKey::P384(q)) => Ok(ecdh(d, q)),
            _ => Err(Error::KeyMismatch),
        }
    }

    /// One-pass MQV shared secret from this party's static and ephemeral
    /// keys and the peer's static and ephemeral public keys.
    pub(crate) fn mqv(
        &self,
        own_ephemeral: &AgreementPrivateKey,
        peer_static: &AgreementPublicKey,
        peer_ephemeral: &AgreementPublicKey,
    ) -> Result<Zeroizing<Vec<u8>>> {
        use AgreementPrivateKey as Sk;
        use AgreementPublicKey as Pk;
        match (self, own_ephemeral, peer_static, peer_ephemeral) {
            (Sk::P256(d1), Sk::P256(d2), Pk::P256(q1), Pk::P256(q2)) => mqv(d1, d2, q1, q2),
            (Sk::P384(d1), Sk::P384(d2), Pk::P384(q1), Pk::P384(q2)) => mqv(d1, d2, q1, q2),
            _ => Err(Error::KeyMismatch),
        }
    }
}

fn ecdh<C: CurveArithmetic>(secret: &SecretKey<C>, public: &PublicKey<C>) -> Zeroizing<Vec<u8>> {
    let shared = elliptic_curve::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    Zeroizing::new(shared.raw_secret_bytes().to_vec())
}

/// Associate value `avf(Q) = (x mod 2^⌈f/2⌉) + 2^⌈f/2⌉`, where `f` is the
/// bit length of the group order. The orders of the supported curves fill
/// their field, so `f` is the field size in bits.
fn avf<C: CurveArithmetic>(point: &AffinePoint<C>) -> C::Scalar {
    let x = point.x();
    let size = x.len();
    let half = (size * 8 + 1) / 2 / 8;
    let mut bytes = FieldBytes::<C>::default();
    bytes[size - half..].copy_from_slice(&x[size - half..]);
    bytes[size - half - 1] = 1;
    <C::Scalar as Reduce<C::Uint>>::reduce_bytes(&bytes)
}

fn mqv<C: CurveArithmetic>(
    own_static: &SecretKey<C>,
    own_ephemeral: &SecretKey<C>,
    peer_static: &PublicKey<C>,
    peer_ephemeral: &PublicKey<C>,
) -> Result<Zeroizing<Vec<u8>>> {
    let own_ephemeral_public = own_ephemeral.public_key();
    let implicit = *own_ephemeral.to_nonzero_scalar()
        + avf::<C>(own_ephemeral_public.as_affine()) * *own_static.to_nonzero_scalar();

    let peer = ProjectivePoint::<C>::from(*peer_ephemeral.as_affine())
        + ProjectivePoint::<C>::from(*peer_static.as_affine()) * avf::<C>(peer_ephemeral.as_affine());
    let shared = peer * implicit;
    if bool::from(shared.is_identity()) {
        return Err(Error::KeyMismatch);
    }
    Ok(Zeroizing::new(shared.to_affine().x().to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

    #[test]
    fn ecdh_is_symmetric() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for curve in [Curve::P256, Curve::P384] {
            let a = AgreementPrivateKey::random(curve, &mut rng);
            let b = AgreementPrivateKey::random(curve, &mut rng);
            let ab = a.diffie_hellman(&b.public_key()).unwrap();
            let ba = b.diffie_hellman(&a.public_key()).unwrap();
            assert_eq!(ab, ba);
        }
    }

    #[test]
    fn mqv_one_pass_agrees() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for curve in [Curve::P256, Curve::P384] {
            let sender = AgreementPrivateKey::random(curve, &mut rng);
            let ephemeral = AgreementPrivateKey::random(curve, &mut rng);
            let recipient = AgreementPrivateKey::random(curve, &mut rng);
            let recipient_public = recipient.public_key();

            // the recipient's static key doubles as its ephemeral key
            let at_sender = sender
                .mqv(&ephemeral, &recipient_public, &recipient_public)
                .unwrap();
            let at_recipient = recipient
                .mqv(&recipient, &sender.public_key(), &ephemeral.public_key())
                .unwrap();
            assert_eq!(at_sender, at_recipient);
            assert_ne!(at_sender, sender.diffie_hellman(&recipient_public).unwrap());
        }
    }

    #[test]
    fn mixed_curves_are_key_mismatch() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let a = AgreementPrivateKey::random(Curve::P256, &mut rng);
        let b = AgreementPrivateKey::random(Curve::P384, &mut rng);
        assert!(matches!(a.diffie_hellman(&b.public_key()), Err(Error::KeyMismatch)));
    }

    #[test]
    fn sec1_round_trip_infers_curve() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let key = AgreementPrivateKey::random(Curve::P384, &mut rng).public_key();
        let bytes = key.to_sec1_bytes();
        assert_eq!(bytes.len(), 97);
        assert_eq!(AgreementPublicKey::from_sec1_bytes(&bytes).unwrap(), key);
    }
}
