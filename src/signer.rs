//! Signer engine.
//!
//! A [`SignerInfoGenerator`] turns a content digest into a [`SignerInfo`]:
//! it builds the signed attributes, signs their DER encoding (or the bare
//! digest when there are none) and attaches unsigned attributes. On the
//! receiving side a [`SignerInformation`] pairs a `SignerInfo` with the
//! digest computed over the content and checks both the attribute rules and
//! the signature.
//!
//! Countersignatures are `SignerInfo`s over the signature value of another
//! signer, carried in its unsigned attributes; they are produced and checked
//! by the same machinery with no content type.

mod generator;
mod keys;
mod verify;

pub use self::{
    generator::SignerInfoGenerator,
    keys::{SigningKey, VerifierKey},
    verify::{SignerInformation, SignerInformationStore, Verification},
};
pub use cms::signed_data::{SignerInfo, SignerInfos};

use x509_cert::attr::Attributes;

use crate::attributes::AttributeTable;
use crate::content_info::{CmsVersion, SignerIdentifier};

/// 1 for issuer and serial number, 3 for subject key identifier.
pub fn signer_info_version(sid: &SignerIdentifier) -> CmsVersion {
    if sid.is_subject_key_identifier() {
        CmsVersion::V3
    } else {
        CmsVersion::V1
    }
}

fn table(attributes: Option<&Attributes>) -> Option<AttributeTable> {
    attributes.map(AttributeTable::from_attributes)
}
