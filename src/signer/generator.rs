use const_oid::ObjectIdentifier;
use der::{asn1::OctetString, Encode};
use rand_core::CryptoRngCore;
use tracing::{debug, trace};

use super::{signer_info_version, SignerInfo, SigningKey};
use crate::attributes::{
    AttributeParameters, AttributeTable, AttributeTableGenerator, DefaultSignedAttributes,
};
use crate::content_info::SignerIdentifier;
use crate::errors::{Error, Result};
use crate::registry::{
    oids, signature_algorithm_for_name, DigestAlgorithm, PssParameters, SignatureAlgorithm,
};

/// Produces the `SignerInfo` of one signer.
///
/// By default the standard signed attributes are generated (content type,
/// message digest and signing time) and no unsigned attributes.
///
/// ```no_run
/// # fn main() -> cms_envelope::Result<()> {
/// use cms_envelope::{
///     content_info::SignerIdentifier,
///     signer::{SignerInfoGenerator, SigningKey},
///     RsaPrivateKey,
/// };
/// use rsa::pkcs8::DecodePrivateKey;
///
/// let pem = std::fs::read_to_string("tests/examples/keys/rsa-alice.pem")?;
/// let key = RsaPrivateKey::from_pkcs8_pem(&pem).expect("failed to parse key");
/// let sid = SignerIdentifier::SubjectKeyIdentifier(vec![1, 2, 3, 4]);
/// let signer = SignerInfoGenerator::from_name("SHA256withRSA", sid, SigningKey::Rsa(key))?;
/// # Ok(())
/// # }
/// ```
pub struct SignerInfoGenerator {
    sid: SignerIdentifier,
    key: SigningKey,
    digest: DigestAlgorithm,
    algorithm: SignatureAlgorithm,
    signed: Option<Box<dyn AttributeTableGenerator>>,
    unsigned: Option<Box<dyn AttributeTableGenerator>>,
}

impl core::fmt::Debug for SignerInfoGenerator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignerInfoGenerator")
            .field("sid", &self.sid)
            .field("key", &self.key)
            .field("digest", &self.digest)
            .field("algorithm", &self.algorithm)
            .field("signed_attributes", &self.signed.is_some())
            .field("unsigned_attributes", &self.unsigned.is_some())
            .finish()
    }
}

impl SignerInfoGenerator {
    /// Signer using the key's default scheme over `digest`.
    pub fn new(sid: SignerIdentifier, key: SigningKey, digest: DigestAlgorithm) -> Self {
        let algorithm = key.default_algorithm(digest);
        Self {
            sid,
            key,
            digest,
            algorithm,
            signed: Some(Box::new(DefaultSignedAttributes::new())),
            unsigned: None,
        }
    }

    /// Signer for a named algorithm such as `SHA256withRSA`,
    /// `SHA384withECDSA` or `SHA256withRSAandMGF1`.
    pub fn from_name(name: &str, sid: SignerIdentifier, key: SigningKey) -> Result<Self> {
        let algorithm = signature_algorithm_for_name(name)?;
        let digest = match algorithm {
            SignatureAlgorithm::RsaPkcs1v15(digest)
            | SignatureAlgorithm::Ecdsa(digest)
            | SignatureAlgorithm::Dsa(digest) => digest,
            SignatureAlgorithm::RsaPss(params) => params.digest,
            SignatureAlgorithm::RsaEncryption => {
                return Err(Error::Builder("signature algorithm name does not name a digest"))
            }
        };
        key.check_algorithm(&algorithm)?;
        Ok(Self {
            algorithm,
            ..Self::new(sid, key, digest)
        })
    }

    /// Replaces the signed attribute generator.
    pub fn with_signed_attributes(mut self, generator: impl AttributeTableGenerator + 'static) -> Self {
        self.signed = Some(Box::new(generator));
        self
    }

    /// Signs the content digest directly, with no signed attributes. Only
    /// valid for `id-data` content.
    pub fn without_signed_attributes(mut self) -> Self {
        self.signed = None;
        self
    }

    /// Sets the unsigned attribute generator; it sees the signature value.
    pub fn with_unsigned_attributes(mut self, generator: impl AttributeTableGenerator + 'static) -> Self {
        self.unsigned = Some(Box::new(generator));
        self
    }

    /// Declares the signature as bare `rsaEncryption` instead of
    /// `sha*WithRSAEncryption`, as some older peers expect.
    pub fn with_rsa_encryption_identifier(mut self) -> Result<Self> {
        if !matches!(self.algorithm, SignatureAlgorithm::RsaPkcs1v15(_)) {
            return Err(Error::Builder("rsaEncryption identifier requires a PKCS#1 v1.5 signer"));
        }
        self.algorithm = SignatureAlgorithm::RsaEncryption;
        Ok(self)
    }

    /// Sets the RSASSA-PSS salt length.
    pub fn with_pss_salt_len(mut self, salt_len: usize) -> Result<Self> {
        match self.algorithm {
            SignatureAlgorithm::RsaPss(_) => {
                self.algorithm =
                    SignatureAlgorithm::RsaPss(PssParameters::with_salt_len(self.digest, salt_len));
                Ok(self)
            }
            _ => Err(Error::Builder("salt length only applies to RSASSA-PSS")),
        }
    }

    /// Digest algorithm the content must be hashed with.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest
    }

    /// Identifier placed in the `SignerInfo`.
    pub fn signer_identifier(&self) -> &SignerIdentifier {
        &self.sid
    }

    /// Signs `digest`, the content digest under [`Self::digest_algorithm`].
    ///
    /// `content_type` is `None` when producing a countersignature, in which
    /// case `digest` is the digest of the countersigned signature value.
    pub fn generate<R: CryptoRngCore>(
        &self,
        content_type: Option<ObjectIdentifier>,
        digest: &[u8],
        rng: &mut R,
    ) -> Result<SignerInfo> {
        self.generate_dyn(content_type, digest, rng)
    }

    pub(crate) fn generate_dyn(
        &self,
        content_type: Option<ObjectIdentifier>,
        digest: &[u8],
        rng: &mut dyn CryptoRngCore,
    ) -> Result<SignerInfo> {
        self.algorithm.check_digest(self.digest)?;
        if digest.len() != self.digest.output_size() {
            return Err(Error::Builder("digest length does not match the digest algorithm"));
        }
        let params = AttributeParameters {
            content_type,
            digest_algorithm: self.digest,
            digest,
            signature: None,
        };

        let signed_attributes = match &self.signed {
            Some(generator) => {
                let table = generator.attributes(&params)?;
                if check_signed_attributes(&table, content_type)? != digest {
                    return Err(Error::AttributeViolation(
                        "message-digest attribute does not match the content",
                    ));
                }
                Some(table)
            }
            None => {
                if content_type.is_some_and(|ct| ct != oids::ID_DATA) {
                    return Err(Error::AttributeViolation(
                        "content other than id-data requires signed attributes",
                    ));
                }
                None
            }
        };

        let signed_attrs = signed_attributes
            .as_ref()
            .map(AttributeTable::to_attributes)
            .transpose()?;
        let hashed = match &signed_attrs {
            Some(set) => self.digest.digest(&set.to_der()?),
            None => digest.to_vec(),
        };
        trace!(algorithm = ?self.algorithm, attributes = signed_attributes.is_some(), "signing");
        let signature = self.key.sign(&self.algorithm, self.digest, &hashed, rng)?;

        let unsigned_attrs = match &self.unsigned {
            Some(generator) => Some(generator.attributes(&AttributeParameters {
                signature: Some(&signature),
                ..params
            })?)
            .filter(|table| !table.is_empty())
            .map(|table| table.to_attributes())
            .transpose()?,
            None => None,
        };
        debug!(sid = ?self.sid, digest = self.digest.name(), "signer info generated");

        Ok(SignerInfo {
            version: signer_info_version(&self.sid),
            sid: self.sid.to_signer_identifier()?,
            digest_alg: self.digest.identifier(),
            signed_attrs,
            signature_algorithm: self.algorithm.identifier()?,
            signature: OctetString::new(signature)?,
            unsigned_attrs,
        })
    }
}

/// Mandatory shape of a signed attribute set; returns the message-digest
/// value. Shared with verification.
pub(crate) fn check_signed_attributes(
    table: &AttributeTable,
    content_type: Option<ObjectIdentifier>,
) -> Result<Vec<u8>> {
    if table.get(&oids::ID_COUNTERSIGNATURE).is_some() {
        return Err(Error::AttributeViolation(
            "countersignature cannot be a signed attribute",
        ));
    }
    match (content_type, table.content_type()?) {
        (Some(expected), Some(found)) if expected == found => {}
        (Some(_), Some(_)) => {
            return Err(Error::AttributeViolation(
                "content-type attribute does not match the content",
            ))
        }
        (Some(_), None) => {
            return Err(Error::AttributeViolation("content-type attribute missing"))
        }
        (None, Some(_)) => {
            return Err(Error::AttributeViolation(
                "countersignature cannot carry a content-type attribute",
            ))
        }
        (None, None) => {}
    }
    table.signing_time()?;
    table
        .message_digest()?
        .ok_or(Error::AttributeViolation("message-digest attribute missing"))
}
