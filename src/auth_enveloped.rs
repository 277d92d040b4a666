//! `AuthEnvelopedData` (RFC 5083) with AES-GCM and AES-CCM (RFC 5084).
//!
//! Recipients work exactly as for [`crate::enveloped`]. The authenticated
//! attributes are covered by the AEAD tag as additional data, and the tag
//! travels in the `mac` field. The AEAD primitives are one-shot, so the
//! content is held in memory.

use std::sync::Arc;

use const_oid::ObjectIdentifier;
use der::{asn1::OctetString, Sequence};
use rand_core::CryptoRngCore;
use tracing::debug;
use x509_cert::attr::Attributes;

use crate::asn1::{BerReader, Tag};
use crate::attributes::{content_type_attribute, read_attributes, AttributeTable};
use crate::content_info::{to_content_info_der, CmsVersion, OriginatorInfo};
use crate::crypto::content::{open, seal};
use crate::crypto::ContentKey;
use crate::enveloped::{
    enter_content_info, establish, is_empty_originator, next_required, read_encrypted_content_info,
    EncryptedContentInfo,
};
use crate::errors::{Error, Result};
use crate::recipient::{
    read_recipient_infos, to_recipient_infos, RecipientId, RecipientInfo, RecipientInfoGenerator,
    RecipientInfos, RecipientInformationStore, RecipientKey,
};
use crate::registry::{oids, ContentEncryption, ContentEncryptionAlgorithm, ContentParameters};

/// RFC 5083 `AuthEnvelopedData`, as encoded.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct AuthEnvelopedDataSyntax {
    version: CmsVersion,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    originator_info: Option<OriginatorInfo>,
    recip_infos: RecipientInfos,
    auth_encrypted_content: EncryptedContentInfo,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    auth_attrs: Option<Attributes>,
    mac: OctetString,
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT", optional = "true")]
    unauth_attrs: Option<Attributes>,
}

/// Content-type rule for authenticated attributes: required when the
/// content is not `id-data`, and when present it must name the content.
fn check_content_type(attributes: Option<&AttributeTable>, content_type: ObjectIdentifier) -> Result<()> {
    match attributes {
        Some(table) => match table.content_type()? {
            Some(declared) if declared != content_type => Err(Error::AttributeViolation(
                "content-type attribute does not match the content",
            )),
            None if content_type != oids::ID_DATA => Err(Error::AttributeViolation(
                "authenticated attributes lack a content-type attribute",
            )),
            _ => Ok(()),
        },
        None if content_type != oids::ID_DATA => Err(Error::AttributeViolation(
            "content other than id-data requires authenticated attributes",
        )),
        None => Ok(()),
    }
}

/// The DER `SET OF Attribute` is the additional data; none is empty.
fn additional_data(attributes: Option<&AttributeTable>) -> Result<Vec<u8>> {
    attributes
        .map(AttributeTable::to_der_set)
        .transpose()
        .map(Option::unwrap_or_default)
}

fn aead_cipher(algorithm: ContentEncryptionAlgorithm) -> Result<()> {
    if !algorithm.is_aead() {
        return Err(Error::UnsupportedAlgorithm(algorithm.oid()));
    }
    Ok(())
}

/// Builds `AuthEnvelopedData`.
#[derive(Debug)]
pub struct AuthEnvelopedDataGenerator {
    algorithm: ContentEncryptionAlgorithm,
    content_type: ObjectIdentifier,
    recipients: Vec<RecipientInfoGenerator>,
    originator_info: Option<OriginatorInfo>,
    auth_attributes: Option<AttributeTable>,
    unauth_attributes: Option<AttributeTable>,
}

impl AuthEnvelopedDataGenerator {
    /// Generator for an AEAD content cipher.
    pub fn new(algorithm: ContentEncryptionAlgorithm) -> Result<Self> {
        aead_cipher(algorithm)?;
        Ok(Self {
            algorithm,
            content_type: oids::ID_DATA,
            recipients: Vec::new(),
            originator_info: None,
            auth_attributes: None,
            unauth_attributes: None,
        })
    }

    /// Adds a recipient.
    pub fn add_recipient(mut self, recipient: impl Into<RecipientInfoGenerator>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Type of the plaintext, `id-data` by default. Any other type is
    /// recorded in a content-type authenticated attribute.
    pub fn with_content_type(mut self, content_type: ObjectIdentifier) -> Self {
        self.content_type = content_type;
        self
    }

    /// Certificates and CRLs of the originator.
    pub fn with_originator_info(mut self, originator_info: OriginatorInfo) -> Self {
        self.originator_info = Some(originator_info).filter(|info| !is_empty_originator(info));
        self
    }

    /// Attributes covered by the authentication tag.
    pub fn with_authenticated_attributes(mut self, attributes: AttributeTable) -> Self {
        self.auth_attributes = Some(attributes).filter(|table| !table.is_empty());
        self
    }

    /// Attributes carried outside the authentication.
    pub fn with_unauthenticated_attributes(mut self, attributes: AttributeTable) -> Self {
        self.unauth_attributes = Some(attributes).filter(|table| !table.is_empty());
        self
    }

    /// Encrypts and authenticates `content`, returning the DER `ContentInfo`.
    pub fn generate<R: CryptoRngCore>(&self, content: &[u8], rng: &mut R) -> Result<Vec<u8>> {
        self.build(content, rng)?.to_der()
    }

    fn build(&self, content: &[u8], rng: &mut dyn CryptoRngCore) -> Result<AuthEnvelopedData> {
        let auth_attributes = match &self.auth_attributes {
            Some(table) if table.get(&oids::ID_CONTENT_TYPE).is_none() => {
                Some(table.with(content_type_attribute(self.content_type)?))
            }
            None if self.content_type != oids::ID_DATA => {
                Some(AttributeTable::new().with(content_type_attribute(self.content_type)?))
            }
            other => other.clone(),
        };
        check_content_type(auth_attributes.as_ref(), self.content_type)?;

        let (cek, encryption, recipient_infos) = establish(self.algorithm, &self.recipients, rng)?;
        let aad = additional_data(auth_attributes.as_ref())?;
        let mut buffer = content.to_vec();
        let mac = seal(&encryption, cek.as_bytes(), &aad, &mut buffer)?;
        cek.release();
        debug!(
            recipients = recipient_infos.len(),
            cipher = self.algorithm.name(),
            len = content.len(),
            "generated auth enveloped data"
        );

        Ok(AuthEnvelopedData {
            originator_info: self.originator_info.clone(),
            recipient_infos: recipient_infos.into(),
            auth_encrypted_content_info: Arc::new(EncryptedContentInfo {
                content_type: self.content_type,
                content_enc_alg: encryption.identifier()?,
                encrypted_content: Some(OctetString::new(buffer)?),
            }),
            auth_attributes,
            mac,
            unauth_attributes: self.unauth_attributes.clone(),
        })
    }
}

/// A decoded `AuthEnvelopedData`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEnvelopedData {
    originator_info: Option<OriginatorInfo>,
    recipient_infos: Arc<[RecipientInfo]>,
    auth_encrypted_content_info: Arc<EncryptedContentInfo>,
    auth_attributes: Option<AttributeTable>,
    mac: Vec<u8>,
    unauth_attributes: Option<AttributeTable>,
}

impl AuthEnvelopedData {
    /// Decodes a BER `ContentInfo` holding an `AuthEnvelopedData`.
    pub fn from_ber(bytes: &[u8]) -> Result<Self> {
        let mut reader = BerReader::new(bytes);
        let (outer, explicit) = enter_content_info(&mut reader, oids::ID_CT_AUTH_ENVELOPED_DATA)?;
        let header = reader.expect(&explicit, Tag::Sequence, "AuthEnvelopedData must be a sequence")?;
        let scope = reader.enter(&header)?;
        let version: CmsVersion = reader.next_der(&scope, "AuthEnvelopedData version")?;
        if version != CmsVersion::V0 {
            return Err(Error::Malformed("AuthEnvelopedData version must be 0"));
        }

        let mut header = next_required(&mut reader, &scope)?;
        let originator_info = if header.is_context(0) {
            let info = reader.read_implicit(header, Tag::Sequence)?;
            header = next_required(&mut reader, &scope)?;
            Some(info)
        } else {
            None
        };
        let recipient_infos = read_recipient_infos(&mut reader, header)?;
        let header = next_required(&mut reader, &scope)?;
        let auth_encrypted_content_info = read_encrypted_content_info(&mut reader, header)?;

        let mut header = next_required(&mut reader, &scope)?;
        let auth_attributes = if header.is_context(1) {
            let attributes = read_attributes(&mut reader, header)?;
            header = next_required(&mut reader, &scope)?;
            Some(attributes)
        } else {
            None
        };
        if !header.is(Tag::OctetString) {
            return Err(Error::Malformed("mac must be an octet string"));
        }
        let mac: OctetString = reader.read_der(header)?;
        let unauth_attributes = match reader.next(&scope)? {
            Some(header) if header.is_context(2) => Some(read_attributes(&mut reader, header)?),
            Some(_) => return Err(Error::Malformed("unexpected field in AuthEnvelopedData")),
            None => None,
        };
        for scope in [scope, explicit, outer] {
            if reader.next(&scope)?.is_some() {
                return Err(Error::Malformed("unexpected field in AuthEnvelopedData"));
            }
        }
        if reader.position() != bytes.len() as u64 {
            return Err(Error::Malformed("trailing data after element"));
        }
        debug!(
            recipients = recipient_infos.len(),
            content_type = %auth_encrypted_content_info.content_type,
            "parsed auth enveloped data"
        );

        Ok(Self {
            originator_info,
            recipient_infos: recipient_infos.into(),
            auth_encrypted_content_info: Arc::new(auth_encrypted_content_info),
            auth_attributes,
            mac: mac.into_bytes(),
            unauth_attributes,
        })
    }

    /// DER encoding of the `ContentInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let to_attributes = |table: &Option<AttributeTable>| {
            table.as_ref().map(AttributeTable::to_attributes).transpose()
        };
        let syntax = AuthEnvelopedDataSyntax {
            version: CmsVersion::V0,
            originator_info: self.originator_info.clone(),
            recip_infos: to_recipient_infos(&self.recipient_infos)?,
            auth_encrypted_content: EncryptedContentInfo::clone(&self.auth_encrypted_content_info),
            auth_attrs: to_attributes(&self.auth_attributes)?,
            mac: OctetString::new(self.mac.as_slice())?,
            unauth_attrs: to_attributes(&self.unauth_attributes)?,
        };
        to_content_info_der(oids::ID_CT_AUTH_ENVELOPED_DATA, &syntax)
    }

    /// Always 0.
    pub fn version(&self) -> CmsVersion {
        CmsVersion::V0
    }

    /// Originator certificates and CRLs.
    pub fn originator_info(&self) -> Option<&OriginatorInfo> {
        self.originator_info.as_ref()
    }

    /// Recipient entries as encoded.
    pub fn recipient_infos(&self) -> &[RecipientInfo] {
        &self.recipient_infos
    }

    /// Encrypted content and its cipher.
    pub fn auth_encrypted_content_info(&self) -> &EncryptedContentInfo {
        &self.auth_encrypted_content_info
    }

    /// Type of the plaintext.
    pub fn content_type(&self) -> ObjectIdentifier {
        self.auth_encrypted_content_info.content_type
    }

    /// Authenticated attributes.
    pub fn auth_attributes(&self) -> Option<&AttributeTable> {
        self.auth_attributes.as_ref()
    }

    /// Unauthenticated attributes.
    pub fn unauth_attributes(&self) -> Option<&AttributeTable> {
        self.unauth_attributes.as_ref()
    }

    /// Authentication tag.
    pub fn mac(&self) -> &[u8] {
        &self.mac
    }

    fn content_encryption(&self) -> Result<ContentEncryption> {
        ContentEncryption::from_identifier(&self.auth_encrypted_content_info.content_enc_alg)
    }

    /// Recoverable entries, one per recipient.
    pub fn recipients(&self) -> Result<RecipientInformationStore> {
        let encryption = self.content_encryption()?;
        Ok(RecipientInformationStore::new(&self.recipient_infos, encryption.algorithm))
    }

    /// Recovers the content key through the entry selected by `id`, then
    /// checks the tag and decrypts.
    pub fn decrypt<R: CryptoRngCore>(
        &self,
        id: &RecipientId,
        key: &RecipientKey<'_>,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let cek = self.recipients()?.recover_key(id, key, rng)?;
        self.decrypt_with(&cek)
    }

    /// Checks the tag and decrypts with an already recovered content key.
    /// A tag that does not verify is [`Error::KeyMismatch`].
    pub fn decrypt_with(&self, cek: &ContentKey) -> Result<Vec<u8>> {
        let encryption = self.content_encryption()?;
        aead_cipher(encryption.algorithm)?;
        check_content_type(self.auth_attributes.as_ref(), self.content_type())?;
        if let ContentParameters::Aead { tag_len, .. } = encryption.parameters {
            if self.mac.len() != tag_len {
                return Err(Error::Malformed("mac length does not match the ICV length"));
            }
        }
        let aad = additional_data(self.auth_attributes.as_ref())?;
        let mut buffer = self
            .auth_encrypted_content_info
            .encrypted_content
            .as_ref()
            .map(|content| content.as_bytes().to_vec())
            .ok_or(Error::Malformed("encrypted content is absent"))?;
        open(&encryption, cek.as_bytes(), &aad, &mut buffer, &self.mac)?;
        Ok(buffer)
    }
}
