//! `ContentInfo` and the identifier types shared by signers and recipients.

use cms::{
    cert::CertificateChoices,
    enveloped_data::{KeyAgreeRecipientIdentifier, RecipientIdentifier, RecipientKeyIdentifier},
    revocation::RevocationInfoChoice,
    signed_data::SignerIdentifier as SignerInfoIdentifier,
};
use const_oid::ObjectIdentifier;
use der::{asn1::OctetString, Any, Encode, EncodeValue, Tagged};
use x509_cert::ext::pkix::SubjectKeyIdentifier;

use crate::asn1::{BerReader, Tag};
use crate::auth_enveloped::AuthEnvelopedData;
use crate::enveloped::EnvelopedData;
use crate::errors::{Error, Result};
use crate::registry::oids;
use crate::signed::SignedData;

pub use cms::{
    cert::IssuerAndSerialNumber,
    content_info::{CmsVersion, ContentInfo},
    enveloped_data::OriginatorInfo,
};

/// DER `ContentInfo` wrapping `content` of type `content_type`.
pub fn to_content_info_der(
    content_type: ObjectIdentifier,
    content: &(impl Tagged + EncodeValue),
) -> Result<Vec<u8>> {
    let info = ContentInfo {
        content_type,
        content: Any::encode_from(content)?,
    };
    Ok(info.to_der()?)
}

/// Any of the envelopes, told apart by the `ContentInfo` content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// `id-envelopedData`
    Enveloped(EnvelopedData),
    /// `id-signedData`
    Signed(SignedData),
    /// `id-ct-authEnvelopedData`
    AuthEnveloped(AuthEnvelopedData),
}

impl Envelope {
    /// Decodes a BER `ContentInfo` holding any supported envelope.
    pub fn from_ber(bytes: &[u8]) -> Result<Self> {
        let content_type = peek_content_type(bytes)?;
        match content_type {
            oids::ID_ENVELOPED_DATA => Ok(Envelope::Enveloped(EnvelopedData::from_ber(bytes)?)),
            oids::ID_SIGNED_DATA => Ok(Envelope::Signed(SignedData::from_ber(bytes)?)),
            oids::ID_CT_AUTH_ENVELOPED_DATA => {
                Ok(Envelope::AuthEnveloped(AuthEnvelopedData::from_ber(bytes)?))
            }
            _ => Err(Error::Malformed("content type is not an envelope")),
        }
    }

    /// Content type of the outer `ContentInfo`.
    pub fn content_type(&self) -> ObjectIdentifier {
        match self {
            Envelope::Enveloped(_) => oids::ID_ENVELOPED_DATA,
            Envelope::Signed(_) => oids::ID_SIGNED_DATA,
            Envelope::AuthEnveloped(_) => oids::ID_CT_AUTH_ENVELOPED_DATA,
        }
    }

    /// The `EnvelopedData`, if that is what this is.
    pub fn enveloped_data(&self) -> Option<&EnvelopedData> {
        match self {
            Envelope::Enveloped(enveloped) => Some(enveloped),
            _ => None,
        }
    }

    /// The `SignedData`, if that is what this is.
    pub fn signed_data(&self) -> Option<&SignedData> {
        match self {
            Envelope::Signed(signed) => Some(signed),
            _ => None,
        }
    }

    /// The `AuthEnvelopedData`, if that is what this is.
    pub fn auth_enveloped_data(&self) -> Option<&AuthEnvelopedData> {
        match self {
            Envelope::AuthEnveloped(auth) => Some(auth),
            _ => None,
        }
    }

    /// DER `ContentInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        match self {
            Envelope::Enveloped(enveloped) => enveloped.to_der(),
            Envelope::Signed(signed) => signed.to_der(),
            Envelope::AuthEnveloped(auth) => auth.to_der(),
        }
    }
}

fn peek_content_type(bytes: &[u8]) -> Result<ObjectIdentifier> {
    let mut reader = BerReader::new(bytes);
    let header = reader.read_header()?;
    if !header.is(Tag::Sequence) {
        return Err(Error::Malformed("ContentInfo must be a sequence"));
    }
    let outer = reader.enter(&header)?;
    reader.next_der(&outer, "ContentInfo content type")
}

/// Identifies a certificate (and so a key) by issuer and serial number or by
/// subject key identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyIdentifier {
    /// `issuerAndSerialNumber`
    IssuerAndSerialNumber(IssuerAndSerialNumber),
    /// `subjectKeyIdentifier`
    SubjectKeyIdentifier(Vec<u8>),
}

/// `SignerIdentifier` of a `SignerInfo`.
pub type SignerIdentifier = KeyIdentifier;

fn ski(bytes: &[u8]) -> Result<SubjectKeyIdentifier> {
    Ok(SubjectKeyIdentifier(OctetString::new(bytes)?))
}

impl KeyIdentifier {
    /// `true` for the subject key identifier form.
    pub fn is_subject_key_identifier(&self) -> bool {
        matches!(self, KeyIdentifier::SubjectKeyIdentifier(_))
    }

    /// As the `rid` of a `KeyTransRecipientInfo`.
    pub fn to_recipient_identifier(&self) -> Result<RecipientIdentifier> {
        Ok(match self {
            KeyIdentifier::IssuerAndSerialNumber(ias) => {
                RecipientIdentifier::IssuerAndSerialNumber(ias.clone())
            }
            KeyIdentifier::SubjectKeyIdentifier(id) => {
                RecipientIdentifier::SubjectKeyIdentifier(ski(id)?)
            }
        })
    }

    /// As the `sid` of a `SignerInfo`.
    pub fn to_signer_identifier(&self) -> Result<SignerInfoIdentifier> {
        Ok(match self {
            KeyIdentifier::IssuerAndSerialNumber(ias) => {
                SignerInfoIdentifier::IssuerAndSerialNumber(ias.clone())
            }
            KeyIdentifier::SubjectKeyIdentifier(id) => {
                SignerInfoIdentifier::SubjectKeyIdentifier(ski(id)?)
            }
        })
    }

    /// As the `rid` of a `RecipientEncryptedKey`, without date or other
    /// attribute.
    pub fn to_key_agree_identifier(&self) -> Result<KeyAgreeRecipientIdentifier> {
        Ok(match self {
            KeyIdentifier::IssuerAndSerialNumber(ias) => {
                KeyAgreeRecipientIdentifier::IssuerAndSerialNumber(ias.clone())
            }
            KeyIdentifier::SubjectKeyIdentifier(id) => {
                KeyAgreeRecipientIdentifier::RKeyId(RecipientKeyIdentifier {
                    subject_key_identifier: ski(id)?,
                    date: None,
                    other: None,
                })
            }
        })
    }
}

impl From<&RecipientIdentifier> for KeyIdentifier {
    fn from(rid: &RecipientIdentifier) -> Self {
        match rid {
            RecipientIdentifier::IssuerAndSerialNumber(ias) => {
                KeyIdentifier::IssuerAndSerialNumber(ias.clone())
            }
            RecipientIdentifier::SubjectKeyIdentifier(id) => {
                KeyIdentifier::SubjectKeyIdentifier(id.0.as_bytes().to_vec())
            }
        }
    }
}

impl From<&SignerInfoIdentifier> for KeyIdentifier {
    fn from(sid: &SignerInfoIdentifier) -> Self {
        match sid {
            SignerInfoIdentifier::IssuerAndSerialNumber(ias) => {
                KeyIdentifier::IssuerAndSerialNumber(ias.clone())
            }
            SignerInfoIdentifier::SubjectKeyIdentifier(id) => {
                KeyIdentifier::SubjectKeyIdentifier(id.0.as_bytes().to_vec())
            }
        }
    }
}

/// The optional date and other attribute of a `RecipientKeyIdentifier` are
/// dropped.
impl From<&KeyAgreeRecipientIdentifier> for KeyIdentifier {
    fn from(rid: &KeyAgreeRecipientIdentifier) -> Self {
        match rid {
            KeyAgreeRecipientIdentifier::IssuerAndSerialNumber(ias) => {
                KeyIdentifier::IssuerAndSerialNumber(ias.clone())
            }
            KeyAgreeRecipientIdentifier::RKeyId(id) => {
                KeyIdentifier::SubjectKeyIdentifier(id.subject_key_identifier.0.as_bytes().to_vec())
            }
        }
    }
}

/// Whether a set of certificates and CRLs uses the `other` alternatives of
/// `CertificateChoices` and `RevocationInfoChoice`; these drive the
/// structure versions.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct OtherFormats {
    pub(crate) certificates: bool,
    pub(crate) crls: bool,
}

impl OtherFormats {
    pub(crate) fn of<'a>(
        certificates: impl IntoIterator<Item = &'a CertificateChoices>,
        crls: impl IntoIterator<Item = &'a RevocationInfoChoice>,
    ) -> Self {
        Self {
            certificates: certificates
                .into_iter()
                .any(|c| matches!(c, CertificateChoices::Other(_))),
            crls: crls
                .into_iter()
                .any(|c| matches!(c, RevocationInfoChoice::Other(_))),
        }
    }

    pub(crate) fn of_originator(info: Option<&OriginatorInfo>) -> Self {
        let Some(info) = info else {
            return Self::default();
        };
        Self::of(
            info.certs.iter().flat_map(|set| set.0.iter()),
            info.crls.iter().flat_map(|set| set.0.iter()),
        )
    }

    pub(crate) fn any(self) -> bool {
        self.certificates || self.crls
    }
}
