use const_oid::ObjectIdentifier;
use der::{Any, Encode};
use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;
use tracing::{debug, trace};

use super::generator::check_signed_attributes;
use super::{table, SignerInfo, SignerInfoGenerator, VerifierKey};
use crate::attributes::{attribute, AttributeTable};
use crate::content_info::{CmsVersion, KeyIdentifier, SignerIdentifier};
use crate::errors::{Error, Result};
use crate::registry::{oids, DigestAlgorithm, SignatureAlgorithm};

/// Outcome of a signature check that got as far as the cryptography.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    /// Digest and signature both check out.
    Valid,
    /// The message-digest attribute (or, without signed attributes, the
    /// signed digest) differs from the digest of the content.
    DigestMismatch,
    /// The signature does not verify under the supplied key.
    SignatureMismatch,
}

impl Verification {
    /// `true` for [`Verification::Valid`].
    pub fn is_valid(self) -> bool {
        self == Verification::Valid
    }
}

/// A received `SignerInfo` together with the digest of what it signs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerInformation {
    info: SignerInfo,
    sid: SignerIdentifier,
    signed: Option<AttributeTable>,
    unsigned: Option<AttributeTable>,
    content_type: Option<ObjectIdentifier>,
    content_digest: Option<Vec<u8>>,
}

impl SignerInformation {
    /// `content_type` is `None` for a countersignature; `content_digest` is
    /// `None` for detached content whose digest is not known yet.
    pub(crate) fn new(
        info: SignerInfo,
        content_type: Option<ObjectIdentifier>,
        content_digest: Option<Vec<u8>>,
    ) -> Self {
        Self {
            sid: KeyIdentifier::from(&info.sid),
            signed: table(info.signed_attrs.as_ref()),
            unsigned: table(info.unsigned_attrs.as_ref()),
            info,
            content_type,
            content_digest,
        }
    }

    /// The underlying `SignerInfo`.
    pub fn info(&self) -> &SignerInfo {
        &self.info
    }

    /// Consumes `self`, returning the `SignerInfo`.
    pub fn into_info(self) -> SignerInfo {
        self.info
    }

    /// Signer selector.
    pub fn sid(&self) -> &SignerIdentifier {
        &self.sid
    }

    /// Syntax version.
    pub fn version(&self) -> CmsVersion {
        self.info.version
    }

    /// Content type being signed; `None` for a countersignature.
    pub fn content_type(&self) -> Option<ObjectIdentifier> {
        self.content_type
    }

    /// Digest computed over the content, if known.
    pub fn content_digest(&self) -> Option<&[u8]> {
        self.content_digest.as_deref()
    }

    /// Declared digest algorithm.
    pub fn digest_algorithm(&self) -> Result<DigestAlgorithm> {
        DigestAlgorithm::from_identifier(&self.info.digest_alg)
    }

    /// Signed attributes, if any.
    pub fn signed_attributes(&self) -> Option<&AttributeTable> {
        self.signed.as_ref()
    }

    /// Unsigned attributes, if any.
    pub fn unsigned_attributes(&self) -> Option<&AttributeTable> {
        self.unsigned.as_ref()
    }

    /// Signature value.
    pub fn signature(&self) -> &[u8] {
        self.info.signature.as_bytes()
    }

    /// Checks the signed attributes and the signature.
    ///
    /// Attribute rule violations and algorithms without a handler are
    /// errors, as is a key of the wrong family ([`Error::KeyMismatch`]).
    /// A digest or signature that simply does not match is reported through
    /// the returned [`Verification`].
    pub fn verify(&self, key: &VerifierKey) -> Result<Verification> {
        let digest = self.digest_algorithm()?;
        let algorithm = SignatureAlgorithm::from_identifier(&self.info.signature_algorithm)?;
        if let SignatureAlgorithm::Dsa(_) = algorithm {
            return Err(Error::UnsupportedAlgorithm(self.info.signature_algorithm.oid));
        }
        algorithm.check_digest(digest)?;
        let content_digest = self
            .content_digest
            .as_deref()
            .ok_or(Error::Builder("content digest unknown; supply the detached content first"))?;

        let (hashed, digest_matches) = match (&self.signed, &self.info.signed_attrs) {
            (Some(table), Some(set)) => {
                let message_digest = check_signed_attributes(table, self.content_type)?;
                let matches: bool = message_digest.ct_eq(content_digest).into();
                (digest.digest(&set.to_der()?), matches)
            }
            _ => {
                if self.content_type.is_some_and(|ct| ct != oids::ID_DATA) {
                    return Err(Error::AttributeViolation(
                        "content other than id-data requires signed attributes",
                    ));
                }
                (content_digest.to_vec(), true)
            }
        };
        if !digest_matches {
            debug!(sid = ?self.sid, "message digest mismatch");
            return Ok(Verification::DigestMismatch);
        }
        trace!(?algorithm, "verifying signature");
        if key.verify(&algorithm, digest, &hashed, self.signature())? {
            Ok(Verification::Valid)
        } else {
            debug!(sid = ?self.sid, "signature mismatch");
            Ok(Verification::SignatureMismatch)
        }
    }

    /// Countersignatures found in the unsigned attributes, each paired with
    /// the digest of this signer's signature value.
    pub fn counter_signatures(&self) -> Result<SignerInformationStore> {
        let mut signers = Vec::new();
        let Some(unsigned) = &self.unsigned else {
            return Ok(SignerInformationStore::new(signers));
        };
        for attribute in unsigned.get_all(&oids::ID_COUNTERSIGNATURE) {
            for value in attribute.values.iter() {
                let info = value.decode_as::<SignerInfo>()?;
                let digest = DigestAlgorithm::from_identifier(&info.digest_alg)?
                    .digest(self.signature());
                signers.push(SignerInformation::new(info, None, Some(digest)));
            }
        }
        Ok(SignerInformationStore::new(signers))
    }

    /// Verifies every countersignature, depth first, looking up keys with
    /// `resolver`. A countersigner without a key is [`Error::KeyMismatch`].
    ///
    /// `Ok(false)` as soon as one of them fails to verify.
    pub fn verify_counter_signatures(
        &self,
        mut resolver: impl FnMut(&SignerIdentifier) -> Option<VerifierKey>,
    ) -> Result<bool> {
        self.walk_counter_signatures(&mut resolver)
    }

    fn walk_counter_signatures(
        &self,
        resolver: &mut dyn FnMut(&SignerIdentifier) -> Option<VerifierKey>,
    ) -> Result<bool> {
        for counter in self.counter_signatures()? {
            let key = resolver(counter.sid()).ok_or(Error::KeyMismatch)?;
            if !counter.verify(&key)?.is_valid() || !counter.walk_counter_signatures(resolver)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Copy of this signer with a countersignature by `generator` added.
    pub fn add_counter_signature<R: CryptoRngCore>(
        &self,
        generator: &SignerInfoGenerator,
        rng: &mut R,
    ) -> Result<Self> {
        let digest = generator.digest_algorithm().digest(self.signature());
        let counter = generator.generate_dyn(None, &digest, rng)?;
        let unsigned = self.unsigned.clone().unwrap_or_default();
        let mut values: Vec<Any> = unsigned
            .get(&oids::ID_COUNTERSIGNATURE)
            .map(|attribute| attribute.values.iter().cloned().collect())
            .unwrap_or_default();
        values.push(Any::encode_from(&counter)?);
        let unsigned = unsigned
            .without(&oids::ID_COUNTERSIGNATURE)
            .with(attribute(oids::ID_COUNTERSIGNATURE, values)?);
        debug!(sid = ?generator.signer_identifier(), "countersignature added");
        self.with_unsigned_attributes(Some(unsigned))
    }

    /// Copy of this signer with its unsigned attributes replaced.
    pub fn with_unsigned_attributes(&self, unsigned: Option<AttributeTable>) -> Result<Self> {
        let unsigned = unsigned.filter(|table| !table.is_empty());
        let mut info = self.info.clone();
        info.unsigned_attrs = unsigned.as_ref().map(AttributeTable::to_attributes).transpose()?;
        Ok(Self {
            info,
            sid: self.sid.clone(),
            signed: self.signed.clone(),
            unsigned,
            content_type: self.content_type,
            content_digest: self.content_digest.clone(),
        })
    }
}

/// The signers of one `SignedData`, in encoding order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignerInformationStore {
    signers: Vec<SignerInformation>,
}

impl SignerInformationStore {
    /// Store holding `signers`.
    pub fn new(signers: Vec<SignerInformation>) -> Self {
        Self { signers }
    }

    /// All signers.
    pub fn signers(&self) -> &[SignerInformation] {
        &self.signers
    }

    /// First signer with identifier `sid`.
    pub fn get(&self, sid: &SignerIdentifier) -> Option<&SignerInformation> {
        self.signers.iter().find(|signer| signer.sid() == sid)
    }

    /// Every signer with identifier `sid`.
    pub fn get_all<'a>(
        &'a self,
        sid: &SignerIdentifier,
    ) -> impl Iterator<Item = &'a SignerInformation> + 'a {
        let sid = sid.clone();
        self.signers.iter().filter(move |signer| *signer.sid() == sid)
    }

    /// Number of signers.
    pub fn len(&self) -> usize {
        self.signers.len()
    }

    /// `true` when there are no signers.
    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Iterates the signers.
    pub fn iter(&self) -> core::slice::Iter<'_, SignerInformation> {
        self.signers.iter()
    }
}

impl IntoIterator for SignerInformationStore {
    type Item = SignerInformation;
    type IntoIter = std::vec::IntoIter<SignerInformation>;

    fn into_iter(self) -> Self::IntoIter {
        self.signers.into_iter()
    }
}

impl<'a> IntoIterator for &'a SignerInformationStore {
    type Item = &'a SignerInformation;
    type IntoIter = core::slice::Iter<'a, SignerInformation>;

    fn into_iter(self) -> Self::IntoIter {
        self.signers.iter()
    }
}

impl FromIterator<SignerInformation> for SignerInformationStore {
    fn from_iter<I: IntoIterator<Item = SignerInformation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{
        content_type_attribute, counter_signature_attribute, message_digest_attribute,
        SimpleAttributeTable,
    };
    use crate::registry::identifier;
    use crate::signer::SigningKey;
    use der::{asn1::OctetString, Decode};
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
    use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};

    const RSA_ALICE: &str = include_str!("../../tests/examples/keys/rsa-alice.pem");
    const RSA_BOB: &str = include_str!("../../tests/examples/keys/rsa-bob.pem");
    const EC_ALICE: &str = include_str!("../../tests/examples/keys/ec-alice.pem");
    const EC_BOB: &str = include_str!("../../tests/examples/keys/ec-bob.pem");

    fn rsa(pem: &str) -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(pem).expect("failed to parse key")
    }

    fn ec(pem: &str) -> SigningKey {
        SigningKey::EcdsaP256(p256::ecdsa::SigningKey::from_pkcs8_pem(pem).unwrap())
    }

    fn sid(n: u8) -> SignerIdentifier {
        SignerIdentifier::SubjectKeyIdentifier(vec![n; 20])
    }

    fn signer_key(pem: &str) -> VerifierKey {
        VerifierKey::Rsa(rsa(pem).to_public_key())
    }

    fn signed_by(id: SignerIdentifier, key: SigningKey, content: &[u8]) -> SignerInformation {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let digest = DigestAlgorithm::Sha256.digest(content);
        let info = SignerInfoGenerator::new(id, key, DigestAlgorithm::Sha256)
            .generate(Some(oids::ID_DATA), &digest, &mut rng)
            .unwrap();
        // through the wire encoding
        let info = SignerInfo::from_der(&info.to_der().unwrap()).unwrap();
        SignerInformation::new(info, Some(oids::ID_DATA), Some(digest))
    }

    fn signed(key: SigningKey, content: &[u8]) -> SignerInformation {
        signed_by(sid(1), key, content)
    }

    fn with_signed_attributes(signer: &SignerInformation, table: AttributeTable) -> SignerInformation {
        let mut info = signer.info().clone();
        info.signed_attrs = Some(table.to_attributes().unwrap());
        SignerInformation::new(info, signer.content_type(), signer.content_digest().map(<[u8]>::to_vec))
    }

    #[test]
    fn every_family_verifies() {
        let alice = rsa(RSA_ALICE);
        for key in [
            SigningKey::Rsa(alice.clone()),
            SigningKey::RsaPss(alice),
            ec(EC_ALICE),
        ] {
            let verifier = key.verifier_key();
            let signer = signed(key, b"HelloWorld");
            assert_eq!(signer.version(), CmsVersion::V3);
            assert_eq!(signer.verify(&verifier).unwrap(), Verification::Valid);
        }
    }

    #[test]
    fn mismatches_are_reported() {
        let signer = signed(SigningKey::Rsa(rsa(RSA_ALICE)), b"HelloWorld");
        let other = DigestAlgorithm::Sha256.digest(b"HelloWorlD");
        let relabelled = SignerInformation::new(signer.info().clone(), Some(oids::ID_DATA), Some(other));
        assert_eq!(
            relabelled.verify(&signer_key(RSA_ALICE)).unwrap(),
            Verification::DigestMismatch
        );
        assert_eq!(
            signer.verify(&signer_key(RSA_BOB)).unwrap(),
            Verification::SignatureMismatch
        );
        assert!(matches!(
            signer.verify(&ec(EC_ALICE).verifier_key()),
            Err(Error::KeyMismatch)
        ));
    }

    #[test]
    fn unknown_content_digest_is_an_error() {
        let signer = signed(ec(EC_ALICE), b"HelloWorld");
        let detached = SignerInformation::new(signer.info().clone(), Some(oids::ID_DATA), None);
        assert!(detached.content_digest().is_none());
        assert!(matches!(
            detached.verify(&ec(EC_ALICE).verifier_key()),
            Err(Error::Builder(_))
        ));
    }

    #[test]
    fn missing_message_digest_is_an_attribute_violation() {
        let signer = signed(ec(EC_ALICE), b"HelloWorld");
        let table = signer.signed_attributes().unwrap().without(&oids::ID_MESSAGE_DIGEST);
        assert!(matches!(
            with_signed_attributes(&signer, table).verify(&ec(EC_ALICE).verifier_key()),
            Err(Error::AttributeViolation(_))
        ));
    }

    #[test]
    fn countersignature_among_signed_attributes_is_rejected() {
        let signer = signed(ec(EC_ALICE), b"HelloWorld");
        let counter = signed(ec(EC_BOB), b"other");
        let table = signer
            .signed_attributes()
            .unwrap()
            .with(counter_signature_attribute(counter.info()).unwrap());
        assert!(matches!(
            with_signed_attributes(&signer, table).verify(&ec(EC_ALICE).verifier_key()),
            Err(Error::AttributeViolation(_))
        ));
    }

    #[test]
    fn content_type_must_match() {
        let signer = signed(ec(EC_ALICE), b"HelloWorld");
        let relabelled = SignerInformation::new(
            signer.info.clone(),
            Some(oids::ID_SIGNED_DATA),
            signer.content_digest.clone(),
        );
        assert!(matches!(
            relabelled.verify(&ec(EC_ALICE).verifier_key()),
            Err(Error::AttributeViolation(_))
        ));
    }

    #[test]
    fn dsa_is_unsupported() {
        let mut signer = signed(SigningKey::Rsa(rsa(RSA_ALICE)), b"HelloWorld");
        signer.info.signature_algorithm = identifier(oids::DSA_WITH_SHA256);
        assert!(matches!(
            signer.verify(&signer_key(RSA_ALICE)),
            Err(Error::UnsupportedAlgorithm(oid)) if oid == oids::DSA_WITH_SHA256
        ));
    }

    #[test]
    fn countersignatures_cover_the_signature() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let signer = signed(SigningKey::Rsa(rsa(RSA_ALICE)), b"HelloWorld");
        let counter = SignerInfoGenerator::new(sid(2), ec(EC_BOB), DigestAlgorithm::Sha256);
        let nested = SignerInfoGenerator::new(sid(3), SigningKey::Rsa(rsa(RSA_BOB)), DigestAlgorithm::Sha256);

        let countersigned = signer.add_counter_signature(&counter, &mut rng).unwrap();
        let first = countersigned.counter_signatures().unwrap().into_iter().next().unwrap();
        let first = first.add_counter_signature(&nested, &mut rng).unwrap();
        let countersigned = countersigned
            .with_unsigned_attributes(Some(
                AttributeTable::new().with(counter_signature_attribute(first.info()).unwrap()),
            ))
            .unwrap();
        let countersigned = countersigned.add_counter_signature(&counter, &mut rng).unwrap();

        let counters = countersigned.counter_signatures().unwrap();
        assert_eq!(counters.len(), 2);
        assert!(counters.iter().all(|c| c.content_type().is_none()));
        assert_eq!(
            countersigned
                .unsigned_attributes()
                .unwrap()
                .get_all(&oids::ID_COUNTERSIGNATURE)
                .count(),
            1
        );
        // the wire form carries the same attributes
        let reparsed = SignerInfo::from_der(&countersigned.info().to_der().unwrap()).unwrap();
        assert_eq!(&reparsed, countersigned.info());

        let resolver = |sid: &SignerIdentifier| match sid {
            SignerIdentifier::SubjectKeyIdentifier(ski) if ski[0] == 2 => Some(ec(EC_BOB).verifier_key()),
            SignerIdentifier::SubjectKeyIdentifier(ski) if ski[0] == 3 => Some(signer_key(RSA_BOB)),
            _ => None,
        };
        assert!(countersigned.verify_counter_signatures(resolver).unwrap());
        assert!(countersigned.verify(&signer_key(RSA_ALICE)).unwrap().is_valid());

        let mut tampered = countersigned.clone();
        let mut signature = tampered.signature().to_vec();
        signature[0] ^= 1;
        tampered.info.signature = OctetString::new(signature).unwrap();
        assert!(!tampered.verify_counter_signatures(resolver).unwrap());

        assert!(matches!(
            countersigned.verify_counter_signatures(|_: &SignerIdentifier| None),
            Err(Error::KeyMismatch)
        ));
    }

    #[test]
    fn countersignature_attributes_exclude_content_type() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let signer = signed(ec(EC_ALICE), b"HelloWorld");
        let digest = DigestAlgorithm::Sha256.digest(signer.signature());
        let table = AttributeTable::new()
            .with(content_type_attribute(oids::ID_DATA).unwrap())
            .with(message_digest_attribute(&digest).unwrap());
        let counter = SignerInfoGenerator::new(sid(2), ec(EC_BOB), DigestAlgorithm::Sha256)
            .with_signed_attributes(SimpleAttributeTable(table));
        assert!(matches!(
            signer.add_counter_signature(&counter, &mut rng),
            Err(Error::AttributeViolation(_))
        ));
    }

    #[test]
    fn store_lookup_outlives_the_identifier() {
        let store: SignerInformationStore = [
            signed_by(sid(1), ec(EC_ALICE), b"one"),
            signed_by(sid(2), ec(EC_BOB), b"two"),
            signed_by(sid(1), ec(EC_ALICE), b"three"),
        ]
        .into_iter()
        .collect();
        let matches = {
            let wanted = sid(1);
            store.get_all(&wanted)
        };
        assert_eq!(matches.count(), 2);
        assert!(store.get(&sid(2)).is_some());
        assert!(store.get(&sid(4)).is_none());
    }
}
