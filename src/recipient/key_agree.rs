//! Key agreement recipients (RFC 5753): an ephemeral-static ECDH or one-pass
//! ECMQV secret is run through the X9.63 KDF to a key-encryption key, which
//! wraps the content key once per recipient.

use cms::enveloped_data::{
    KeyAgreeRecipientInfo, OriginatorIdentifierOrKey, OriginatorPublicKey, RecipientEncryptedKey,
};
use der::{
    asn1::{BitString, ObjectIdentifier, OctetString},
    Decode, Encode, Sequence,
};
use rand_core::CryptoRngCore;
use tracing::{debug, trace};
use x509_cert::Certificate;
use zeroize::Zeroizing;

use crate::cert;
use crate::content_info::{CmsVersion, KeyIdentifier};
use crate::crypto::{kdf, wrap, AgreementPrivateKey, AgreementPublicKey, ContentKey, Curve};
use crate::errors::{Error, Result};
use crate::registry::{
    self, identifier, oids, AlgorithmIdentifier, DigestAlgorithm, KeyAgreementAlgorithm,
    KeyAgreementScheme, KeyWrapAlgorithm,
};

/// `MQVuserKeyingMaterial ::= SEQUENCE { ephemeralPublicKey OriginatorPublicKey,
/// addedukm [0] EXPLICIT UserKeyingMaterial OPTIONAL }`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct MqvUserKeyingMaterial {
    ephemeral_public_key: OriginatorPublicKey,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    added_ukm: Option<OctetString>,
}

/// KDF input of RFC 5753 section 7.2.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct EccCmsSharedInfo {
    key_info: AlgorithmIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    entity_u_info: Option<OctetString>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT")]
    supp_pub_info: OctetString,
}

fn originator_key(key: &AgreementPublicKey) -> Result<OriginatorPublicKey> {
    Ok(OriginatorPublicKey {
        algorithm: identifier(oids::EC_PUBLIC_KEY),
        public_key: BitString::from_bytes(&key.to_sec1_bytes())?,
    })
}

/// Decodes an elliptic-curve point; named-curve parameters, when present,
/// must agree with the point size.
fn agreement_key(originator: &OriginatorPublicKey) -> Result<AgreementPublicKey> {
    let algorithm = &originator.algorithm;
    if algorithm.oid != oids::EC_PUBLIC_KEY {
        return Err(Error::UnsupportedAlgorithm(algorithm.oid));
    }
    let point = originator
        .public_key
        .as_bytes()
        .ok_or(Error::Malformed("originator key must have no unused bits"))?;
    let key = AgreementPublicKey::from_sec1_bytes(point)?;
    if let Some(params) = algorithm.parameters.as_ref().filter(|p| !p.is_null()) {
        let curve = params
            .decode_as::<ObjectIdentifier>()
            .map_err(|_| Error::Malformed("named curve must be an object identifier"))?;
        if Curve::from_oid(&curve)? != key.curve() {
            return Err(Error::Malformed("originator key does not lie on the named curve"));
        }
    }
    Ok(key)
}

/// Recovers the content key wrapped for the `index`th recipient of `info`.
pub(crate) fn recover(
    info: &KeyAgreeRecipientInfo,
    index: usize,
    key: &AgreementPrivateKey,
) -> Result<Zeroizing<Vec<u8>>> {
    let rek = info
        .recipient_enc_keys
        .get(index)
        .ok_or(Error::Malformed("no such recipient encrypted key"))?;
    let (algorithm, wrap) = KeyAgreementAlgorithm::from_identifier(&info.key_enc_alg)?;
    let wrap_id: AlgorithmIdentifier =
        registry::parameters(&info.key_enc_alg, "key agreement requires a key wrap algorithm")?;

    let OriginatorIdentifierOrKey::OriginatorKey(originator) = &info.originator else {
        return Err(Error::UnsupportedAlgorithm(info.key_enc_alg.oid));
    };
    let originator = agreement_key(originator)?;
    let ukm = info.ukm.as_ref().map(OctetString::as_bytes);

    let (secret, entity_info) = match algorithm.scheme {
        KeyAgreementScheme::StandardDh | KeyAgreementScheme::CofactorDh => {
            (key.diffie_hellman(&originator)?, ukm.map(<[u8]>::to_vec))
        }
        KeyAgreementScheme::Mqv => {
            let ukm = ukm.ok_or(Error::Malformed("MQV requires the originator ephemeral key"))?;
            let material = MqvUserKeyingMaterial::from_der(ukm)?;
            let ephemeral = agreement_key(&material.ephemeral_public_key)?;
            (
                key.mqv(key, &originator, &ephemeral)?,
                material.added_ukm.map(OctetString::into_bytes),
            )
        }
    };
    trace!(scheme = ?algorithm.scheme, kdf = algorithm.kdf.name(), "deriving key-encryption key");
    let kek = derive_kek(algorithm.kdf, wrap, &wrap_id, &secret, entity_info.as_deref())?;
    wrap::unwrap(wrap, &kek, rek.enc_key.as_bytes())
}

fn mqv_keying_material(ephemeral: &AgreementPublicKey, added: Option<&[u8]>) -> Result<Vec<u8>> {
    let material = MqvUserKeyingMaterial {
        ephemeral_public_key: originator_key(ephemeral)?,
        added_ukm: added.map(OctetString::new).transpose()?,
    };
    Ok(material.to_der()?)
}

fn derive_kek(
    kdf_digest: DigestAlgorithm,
    wrap: KeyWrapAlgorithm,
    wrap_id: &AlgorithmIdentifier,
    secret: &[u8],
    entity_info: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    let key_bits = u32::try_from(wrap.key_size() * 8)
        .map_err(|_| Error::Builder("key wrap key too long"))?;
    let shared_info = EccCmsSharedInfo {
        key_info: wrap_id.clone(),
        entity_u_info: entity_info.map(OctetString::new).transpose()?,
        supp_pub_info: OctetString::new(key_bits.to_be_bytes())?,
    }
    .to_der()?;
    kdf::x963_kdf(kdf_digest, secret, &shared_info, wrap.key_size())
}

/// Key agreement recipients sharing one scheme, one key wrap and one
/// ephemeral key.
///
/// ```no_run
/// # fn main() -> cms_envelope::Result<()> {
/// use cms_envelope::{
///     cert,
///     recipient::KeyAgreeRecipients,
///     registry::{DigestAlgorithm, KeyAgreementAlgorithm, KeyAgreementScheme, KeyWrapAlgorithm},
/// };
///
/// let cert = cert::certificate_from_pem(&std::fs::read_to_string("tests/examples/keys/ec-alice.crt")?)?;
/// let recipients = KeyAgreeRecipients::new(
///     KeyAgreementAlgorithm::new(KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha256),
///     KeyWrapAlgorithm::Aes128,
/// )
/// .add_certificate(&cert)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct KeyAgreeRecipients {
    algorithm: KeyAgreementAlgorithm,
    wrap: KeyWrapAlgorithm,
    recipients: Vec<(KeyIdentifier, AgreementPublicKey)>,
    ukm: Option<Vec<u8>>,
    sender: Option<AgreementPrivateKey>,
}

impl KeyAgreeRecipients {
    /// No recipients yet.
    pub fn new(algorithm: KeyAgreementAlgorithm, wrap: KeyWrapAlgorithm) -> Self {
        Self {
            algorithm,
            wrap,
            recipients: Vec::new(),
            ukm: None,
            sender: None,
        }
    }

    /// Adds a recipient static public key.
    pub fn add_recipient(mut self, id: KeyIdentifier, key: AgreementPublicKey) -> Self {
        self.recipients.push((id, key));
        self
    }

    /// Adds the holder of `cert`, selected by issuer and serial number.
    pub fn add_certificate(self, cert: &Certificate) -> Result<Self> {
        let key = AgreementPublicKey::from_public_key_der(&cert::public_key_der(cert)?)?;
        Ok(self.add_recipient(KeyIdentifier::issuer_and_serial_of(cert), key))
    }

    /// User keying material; for MQV it becomes the `addedukm`.
    pub fn with_ukm(mut self, ukm: &[u8]) -> Self {
        self.ukm = Some(ukm.to_vec());
        self
    }

    /// Originator static key, which MQV requires.
    pub fn with_sender(mut self, key: AgreementPrivateKey) -> Self {
        self.sender = Some(key);
        self
    }

    pub(crate) fn generate(
        &self,
        cek: &ContentKey,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<KeyAgreeRecipientInfo> {
        let curve = match self.recipients.first() {
            Some((_, key)) => key.curve(),
            None => return Err(Error::Builder("no key agreement recipients")),
        };
        if self.recipients.iter().any(|(_, key)| key.curve() != curve) {
            return Err(Error::Builder("key agreement recipients must share one curve"));
        }
        let key_enc_alg = self.algorithm.identifier(self.wrap)?;
        let wrap_id = self.wrap.identifier();
        let ephemeral = AgreementPrivateKey::random(curve, rng);

        let (originator, ukm) = match self.algorithm.scheme {
            KeyAgreementScheme::StandardDh | KeyAgreementScheme::CofactorDh => (
                OriginatorIdentifierOrKey::OriginatorKey(originator_key(&ephemeral.public_key())?),
                self.ukm.as_deref().map(OctetString::new).transpose()?,
            ),
            KeyAgreementScheme::Mqv => {
                let sender = self.sender_for(curve)?;
                (
                    OriginatorIdentifierOrKey::OriginatorKey(originator_key(&sender.public_key())?),
                    Some(OctetString::new(mqv_keying_material(
                        &ephemeral.public_key(),
                        self.ukm.as_deref(),
                    )?)?),
                )
            }
        };

        let mut recipient_enc_keys = Vec::with_capacity(self.recipients.len());
        for (rid, key) in &self.recipients {
            let secret = match self.algorithm.scheme {
                KeyAgreementScheme::Mqv => self.sender_for(curve)?.mqv(&ephemeral, key, key)?,
                _ => ephemeral.diffie_hellman(key)?,
            };
            let kek = derive_kek(self.algorithm.kdf, self.wrap, &wrap_id, &secret, self.ukm.as_deref())?;
            recipient_enc_keys.push(RecipientEncryptedKey {
                rid: rid.to_key_agree_identifier()?,
                enc_key: OctetString::new(wrap::wrap(self.wrap, &kek, cek.as_bytes(), rng)?)?,
            });
        }
        debug!(
            scheme = ?self.algorithm.scheme,
            recipients = recipient_enc_keys.len(),
            "content key agreed"
        );
        Ok(KeyAgreeRecipientInfo {
            version: CmsVersion::V3,
            originator,
            ukm,
            key_enc_alg,
            recipient_enc_keys,
        })
    }

    fn sender_for(&self, curve: Curve) -> Result<&AgreementPrivateKey> {
        match &self.sender {
            Some(sender) if sender.curve() == curve => Ok(sender),
            Some(_) => Err(Error::Builder("sender key must be on the recipients' curve")),
            None => Err(Error::Builder("MQV requires the sender static key")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::identifier_with;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

    fn ski(n: u8) -> KeyIdentifier {
        KeyIdentifier::SubjectKeyIdentifier(vec![n])
    }

    fn round_trip(info: &KeyAgreeRecipientInfo) -> KeyAgreeRecipientInfo {
        let decoded = KeyAgreeRecipientInfo::from_der(&info.to_der().unwrap()).unwrap();
        assert_eq!(&decoded, info);
        decoded
    }

    #[test]
    fn ecdh_to_two_recipients() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let alice = AgreementPrivateKey::random(Curve::P256, &mut rng);
        let bob = AgreementPrivateKey::random(Curve::P256, &mut rng);
        let cek = ContentKey::generate(16, &mut rng);
        let recipients = KeyAgreeRecipients::new(
            KeyAgreementAlgorithm::new(KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha256),
            KeyWrapAlgorithm::Aes128,
        )
        .add_recipient(ski(1), alice.public_key())
        .add_recipient(ski(2), bob.public_key())
        .with_ukm(b"ukm");

        let info = round_trip(&recipients.generate(&cek, &mut rng).unwrap());
        assert_eq!(info.recipient_enc_keys.len(), 2);
        assert_eq!(recover(&info, 0, &alice).unwrap().as_slice(), cek.as_bytes());
        assert_eq!(recover(&info, 1, &bob).unwrap().as_slice(), cek.as_bytes());
        assert!(matches!(recover(&info, 0, &bob), Err(Error::KeyMismatch)));
    }

    #[test]
    fn cofactor_on_p384() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let alice = AgreementPrivateKey::random(Curve::P384, &mut rng);
        let other = AgreementPrivateKey::random(Curve::P256, &mut rng);
        let cek = ContentKey::generate(32, &mut rng);
        let info = KeyAgreeRecipients::new(
            KeyAgreementAlgorithm::new(KeyAgreementScheme::CofactorDh, DigestAlgorithm::Sha384),
            KeyWrapAlgorithm::Aes256,
        )
        .add_recipient(ski(1), alice.public_key())
        .generate(&cek, &mut rng)
        .unwrap();
        let info = round_trip(&info);
        assert_eq!(recover(&info, 0, &alice).unwrap().as_slice(), cek.as_bytes());
        assert!(matches!(recover(&info, 0, &other), Err(Error::KeyMismatch)));
    }

    #[test]
    fn mqv_round_trip() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let sender = AgreementPrivateKey::random(Curve::P256, &mut rng);
        let alice = AgreementPrivateKey::random(Curve::P256, &mut rng);
        let cek = ContentKey::generate(16, &mut rng);
        let algorithm = KeyAgreementAlgorithm::new(KeyAgreementScheme::Mqv, DigestAlgorithm::Sha1);
        let recipients = KeyAgreeRecipients::new(algorithm, KeyWrapAlgorithm::Aes128)
            .add_recipient(ski(1), alice.public_key());
        assert!(matches!(
            recipients.generate(&cek, &mut rng),
            Err(Error::Builder(_))
        ));

        let info = recipients
            .with_sender(sender.clone())
            .with_ukm(b"added")
            .generate(&cek, &mut rng)
            .unwrap();
        let info = round_trip(&info);
        assert_eq!(
            info.originator,
            OriginatorIdentifierOrKey::OriginatorKey(originator_key(&sender.public_key()).unwrap())
        );
        assert_eq!(recover(&info, 0, &alice).unwrap().as_slice(), cek.as_bytes());
        assert!(matches!(recover(&info, 0, &sender), Err(Error::KeyMismatch)));
    }

    #[test]
    fn recipients_must_share_a_curve() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let result = KeyAgreeRecipients::new(
            KeyAgreementAlgorithm::new(KeyAgreementScheme::StandardDh, DigestAlgorithm::Sha1),
            KeyWrapAlgorithm::Aes128,
        )
        .add_recipient(ski(1), AgreementPrivateKey::random(Curve::P256, &mut rng).public_key())
        .add_recipient(ski(2), AgreementPrivateKey::random(Curve::P384, &mut rng).public_key())
        .generate(&ContentKey::generate(16, &mut rng), &mut rng);
        assert!(matches!(result, Err(Error::Builder(_))));
    }

    #[test]
    fn named_curve_parameters_are_checked() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let point = originator_key(&AgreementPrivateKey::random(Curve::P256, &mut rng).public_key())
            .unwrap();
        let on = |curve: ObjectIdentifier| OriginatorPublicKey {
            algorithm: identifier_with(oids::EC_PUBLIC_KEY, &curve).unwrap(),
            public_key: point.public_key.clone(),
        };
        assert!(agreement_key(&on(oids::SECP256R1)).is_ok());
        assert!(matches!(agreement_key(&on(oids::SECP384R1)), Err(Error::Malformed(_))));
    }
}
