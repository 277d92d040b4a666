//! CMS attributes (RFC 5652 § 5.3 and § 11) and attribute table generators.

use std::io::Read;
use std::time::SystemTime;

use const_oid::ObjectIdentifier;
use der::{
    asn1::{Any, OctetString, SetOfVec},
    Decode, Encode, EncodeValue, Tagged,
};
use x509_cert::{attr::Attributes, time::Time};

use crate::asn1::{time_of, BerReader, Header};
use crate::errors::{Error, Result};
use crate::registry::{oids, DigestAlgorithm};

pub use x509_cert::attr::Attribute;

/// Attribute of type `oid` holding `values`.
///
/// Values form a DER `SET OF`, so duplicates are rejected.
pub fn attribute(oid: ObjectIdentifier, values: Vec<Any>) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(values)?,
    })
}

fn single(oid: ObjectIdentifier, value: &(impl Tagged + EncodeValue)) -> Result<Attribute> {
    attribute(oid, vec![Any::encode_from(value)?])
}

/// `id-contentType`
pub fn content_type_attribute(content_type: ObjectIdentifier) -> Result<Attribute> {
    single(oids::ID_CONTENT_TYPE, &content_type)
}

/// `id-messageDigest`
pub fn message_digest_attribute(digest: &[u8]) -> Result<Attribute> {
    single(oids::ID_MESSAGE_DIGEST, &OctetString::new(digest)?)
}

/// `id-signingTime`
pub fn signing_time_attribute(time: SystemTime) -> Result<Attribute> {
    single(oids::ID_SIGNING_TIME, &time_of(time)?)
}

/// `id-countersignature` holding one `SignerInfo`.
pub fn counter_signature_attribute(signer_info: &cms::signed_data::SignerInfo) -> Result<Attribute> {
    single(oids::ID_COUNTERSIGNATURE, signer_info)
}

fn single_value<'a>(attr: &'a Attribute, what: &'static str) -> Result<&'a Any> {
    match attr.values.as_slice() {
        [value] => Ok(value),
        _ => Err(Error::AttributeViolation(what)),
    }
}

/// Ordered collection of attributes.
///
/// Order is kept as given; the DER encoding sorts the set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeTable {
    attributes: Vec<Attribute>,
}

impl AttributeTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `attributes` in order.
    pub fn from_vec(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// Table holding a decoded `SET OF Attribute`.
    pub fn from_attributes(attributes: &Attributes) -> Self {
        Self {
            attributes: attributes.iter().cloned().collect(),
        }
    }

    /// First attribute of type `oid`.
    pub fn get(&self, oid: &ObjectIdentifier) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.oid == *oid)
    }

    /// Every attribute of type `oid`.
    pub fn get_all<'a>(&'a self, oid: &ObjectIdentifier) -> impl Iterator<Item = &'a Attribute> + 'a {
        let oid = *oid;
        self.attributes.iter().filter(move |attr| attr.oid == oid)
    }

    /// Copy of this table with `attribute` appended.
    pub fn with(&self, attribute: Attribute) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.push(attribute);
        Self { attributes }
    }

    /// Copy of this table without any attribute of type `oid`.
    pub fn without(&self, oid: &ObjectIdentifier) -> Self {
        Self {
            attributes: self
                .attributes
                .iter()
                .filter(|attr| attr.oid != *oid)
                .cloned()
                .collect(),
        }
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// `true` when the table holds no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Attributes in order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// `SET OF Attribute` in DER order.
    pub fn to_attributes(&self) -> Result<Attributes> {
        Ok(SetOfVec::try_from(self.attributes.clone())?)
    }

    /// DER encoding of the `SET OF Attribute`, the input to signatures over
    /// signed attributes and the AAD of authenticated attributes.
    pub fn to_der_set(&self) -> Result<Vec<u8>> {
        Ok(self.to_attributes()?.to_der()?)
    }

    fn unique(&self, oid: &ObjectIdentifier, what: &'static str) -> Result<Option<&Any>> {
        let mut all = self.get_all(oid);
        match (all.next(), all.next()) {
            (None, _) => Ok(None),
            (Some(attr), None) => single_value(attr, what).map(Some),
            (Some(_), Some(_)) => Err(Error::AttributeViolation(what)),
        }
    }

    /// Value of the `content-type` attribute, which must be single.
    pub fn content_type(&self) -> Result<Option<ObjectIdentifier>> {
        self.unique(&oids::ID_CONTENT_TYPE, "content-type attribute must be single-valued")?
            .map(|value| {
                value
                    .decode_as::<ObjectIdentifier>()
                    .map_err(|_| Error::AttributeViolation("content-type value is not an OID"))
            })
            .transpose()
    }

    /// Value of the `message-digest` attribute, which must be single.
    pub fn message_digest(&self) -> Result<Option<Vec<u8>>> {
        self.unique(&oids::ID_MESSAGE_DIGEST, "message-digest attribute must be single-valued")?
            .map(|value| {
                value
                    .decode_as::<OctetString>()
                    .map(OctetString::into_bytes)
                    .map_err(|_| Error::AttributeViolation("message-digest value is not an octet string"))
            })
            .transpose()
    }

    /// Value of the `signing-time` attribute, which must be single.
    pub fn signing_time(&self) -> Result<Option<SystemTime>> {
        self.unique(&oids::ID_SIGNING_TIME, "signing-time attribute must be single-valued")?
            .map(|value| {
                value
                    .to_der()
                    .and_then(|der| Time::from_der(&der))
                    .map(|time| time.to_system_time())
                    .map_err(|_| Error::AttributeViolation("signing-time value is not a Time"))
            })
            .transpose()
    }
}

/// Decodes the (usually implicitly tagged) `SET SIZE (1..MAX) OF Attribute`
/// whose header has just been read, keeping the encoded order.
pub(crate) fn read_attributes<R: Read>(reader: &mut BerReader<R>, header: Header) -> Result<AttributeTable> {
    let attributes: Vec<Attribute> = reader.read_members(header)?;
    if attributes.is_empty() {
        return Err(Error::Malformed("attribute set must not be empty"));
    }
    Ok(AttributeTable::from_vec(attributes))
}

impl FromIterator<Attribute> for AttributeTable {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

/// Inputs available to an [`AttributeTableGenerator`].
#[derive(Clone, Copy, Debug)]
pub struct AttributeParameters<'a> {
    /// Content type being signed; `None` for countersignatures.
    pub content_type: Option<ObjectIdentifier>,
    /// Digest algorithm of the signer.
    pub digest_algorithm: DigestAlgorithm,
    /// Digest of the content (or of the countersigned signature).
    pub digest: &'a [u8],
    /// Signature value, for unsigned attribute generators.
    pub signature: Option<&'a [u8]>,
}

/// Produces the signed or unsigned attributes of one `SignerInfo`.
pub trait AttributeTableGenerator: Send + Sync {
    /// Attributes for this signing operation.
    fn attributes(&self, params: &AttributeParameters<'_>) -> Result<AttributeTable>;
}

impl<F> AttributeTableGenerator for F
where
    F: Fn(&AttributeParameters<'_>) -> Result<AttributeTable> + Send + Sync,
{
    fn attributes(&self, params: &AttributeParameters<'_>) -> Result<AttributeTable> {
        self(params)
    }
}

/// The standard signed attributes: content type, message digest and
/// signing time, each added unless the base table already supplies it.
#[derive(Clone, Debug, Default)]
pub struct DefaultSignedAttributes {
    base: AttributeTable,
    signing_time: Option<SystemTime>,
}

impl DefaultSignedAttributes {
    /// Generator with no extra attributes, stamping the current time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator starting from `base`.
    pub fn with_base(base: AttributeTable) -> Self {
        Self {
            base,
            signing_time: None,
        }
    }

    /// Stamps `time` instead of the current time.
    pub fn with_signing_time(mut self, time: SystemTime) -> Self {
        self.signing_time = Some(time);
        self
    }
}

impl AttributeTableGenerator for DefaultSignedAttributes {
    fn attributes(&self, params: &AttributeParameters<'_>) -> Result<AttributeTable> {
        let mut table = self.base.clone();
        if let Some(content_type) = params.content_type {
            if table.get(&oids::ID_CONTENT_TYPE).is_none() {
                table = table.with(content_type_attribute(content_type)?);
            }
        }
        if table.get(&oids::ID_SIGNING_TIME).is_none() {
            let time = self.signing_time.unwrap_or_else(SystemTime::now);
            table = table.with(signing_time_attribute(time)?);
        }
        if table.get(&oids::ID_MESSAGE_DIGEST).is_none() {
            table = table.with(message_digest_attribute(params.digest)?);
        }
        Ok(table)
    }
}

/// Generator returning a fixed table.
#[derive(Clone, Debug, Default)]
pub struct SimpleAttributeTable(pub AttributeTable);

impl AttributeTableGenerator for SimpleAttributeTable {
    fn attributes(&self, _params: &AttributeParameters<'_>) -> Result<AttributeTable> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn params(digest: &[u8]) -> AttributeParameters<'_> {
        AttributeParameters {
            content_type: Some(oids::ID_DATA),
            digest_algorithm: DigestAlgorithm::Sha256,
            digest,
            signature: None,
        }
    }

    #[test]
    fn defaults_are_added_once() {
        let time = UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let generator = DefaultSignedAttributes::new().with_signing_time(time);
        let table = generator.attributes(&params(&[1; 32])).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.content_type().unwrap(), Some(oids::ID_DATA));
        assert_eq!(table.message_digest().unwrap(), Some(vec![1; 32]));
        assert_eq!(table.signing_time().unwrap(), Some(time));

        let base = AttributeTable::new().with(content_type_attribute(oids::ID_SIGNED_DATA).unwrap());
        let table = DefaultSignedAttributes::with_base(base)
            .attributes(&params(&[2; 32]))
            .unwrap();
        assert_eq!(table.get_all(&oids::ID_CONTENT_TYPE).count(), 1);
        assert_eq!(table.content_type().unwrap(), Some(oids::ID_SIGNED_DATA));
    }

    #[test]
    fn countersignature_parameters_skip_content_type() {
        let table = DefaultSignedAttributes::new()
            .attributes(&AttributeParameters {
                content_type: None,
                ..params(&[3; 20])
            })
            .unwrap();
        assert!(table.get(&oids::ID_CONTENT_TYPE).is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_attributes_are_violations() {
        let table = AttributeTable::new()
            .with(message_digest_attribute(&[1]).unwrap())
            .with(message_digest_attribute(&[2]).unwrap());
        assert!(matches!(table.message_digest(), Err(Error::AttributeViolation(_))));

        let times = [UNIX_EPOCH, UNIX_EPOCH + Duration::from_secs(60)]
            .into_iter()
            .map(|time| Any::encode_from(&time_of(time).unwrap()).unwrap())
            .collect();
        let multi = AttributeTable::new().with(attribute(oids::ID_SIGNING_TIME, times).unwrap());
        assert!(matches!(multi.signing_time(), Err(Error::AttributeViolation(_))));
    }

    #[test]
    fn identical_values_rejected() {
        let value = Any::encode_from(&oids::ID_DATA).unwrap();
        assert!(matches!(
            attribute(oids::ID_CONTENT_TYPE, vec![value.clone(), value]),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn set_encoding_is_sorted() {
        let table = AttributeTable::new()
            .with(message_digest_attribute(&[1]).unwrap())
            .with(content_type_attribute(oids::ID_DATA).unwrap());
        assert_eq!(table.iter().next().unwrap().oid, oids::ID_MESSAGE_DIGEST);
        let set = Attributes::from_der(&table.to_der_set().unwrap()).unwrap();
        let decoded = AttributeTable::from_attributes(&set);
        // contentType (…09 03) sorts before messageDigest (…09 04)
        assert_eq!(decoded.iter().next().unwrap().oid, oids::ID_CONTENT_TYPE);
        assert_eq!(decoded.without(&oids::ID_CONTENT_TYPE).len(), 1);
    }

    #[test]
    fn tagged_sets_keep_encoded_order() {
        use hex_literal::hex;
        // [1] (indefinite) { messageDigest { 04 01 01 }, contentType { id-data } }
        let ber = hex!(
            "a180"
            "3010 06092a864886f70d010904 3103 040101"
            "3018 06092a864886f70d010903 310b 06092a864886f70d010701"
            "0000"
        );
        let mut reader = BerReader::new(&ber[..]);
        let header = reader.read_header().unwrap();
        let table = read_attributes(&mut reader, header).unwrap();
        assert_eq!(table.iter().next().unwrap().oid, oids::ID_MESSAGE_DIGEST);
        assert_eq!(table.content_type().unwrap(), Some(oids::ID_DATA));

        let empty = hex!("a100");
        let mut reader = BerReader::new(&empty[..]);
        let header = reader.read_header().unwrap();
        assert!(matches!(read_attributes(&mut reader, header), Err(Error::Malformed(_))));
    }

    #[test]
    fn get_all_outlives_the_searched_oid() {
        let table = AttributeTable::new()
            .with(content_type_attribute(oids::ID_DATA).unwrap())
            .with(message_digest_attribute(&[1]).unwrap());
        let found = {
            let oid = oids::ID_MESSAGE_DIGEST;
            table.get_all(&oid)
        };
        assert_eq!(found.count(), 1);
    }

    #[test]
    fn closures_are_generators() {
        let generator = |p: &AttributeParameters<'_>| -> Result<AttributeTable> {
            Ok(AttributeTable::new().with(message_digest_attribute(p.digest)?))
        };
        let table = generator.attributes(&params(&[5; 4])).unwrap();
        assert_eq!(table.message_digest().unwrap(), Some(vec![5; 4]));
    }
}
