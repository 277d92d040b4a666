//! `EnvelopedData` (RFC 5652 § 6): content encrypted once under a fresh
//! content key, the key wrapped for each recipient.
//!
//! [`EnvelopedDataGenerator::generate`] encrypts a buffer in one call;
//! [`EnvelopedDataStreamGenerator`] returns an [`io::Write`] that encrypts and
//! encodes as the caller writes. On the receiving side [`EnvelopedData`] is
//! the in-memory value and [`EnvelopedDataParser`] reads the recipients before
//! streaming the decrypted content.
//!
//! ```no_run
//! # fn main() -> cms_envelope::Result<()> {
//! use cms_envelope::{
//!     cert,
//!     content_info::KeyIdentifier,
//!     enveloped::EnvelopedDataGenerator,
//!     recipient::{KeyTransRecipient, RecipientId, RecipientKey},
//!     registry::ContentEncryptionAlgorithm,
//!     EnvelopedData, RsaPrivateKey,
//! };
//! use rsa::pkcs8::DecodePrivateKey;
//!
//! let mut rng = rand::thread_rng(); // rand@0.8
//! let cert = cert::certificate_from_pem(&std::fs::read_to_string("tests/examples/keys/rsa-alice.crt")?)?;
//! let recipient = KeyTransRecipient::from_certificate(&cert)?;
//! let der = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc)?
//!     .add_recipient(recipient)
//!     .generate(b"HelloWorld", &mut rng)?;
//!
//! let key = RsaPrivateKey::from_pkcs8_pem(&std::fs::read_to_string("tests/examples/keys/rsa-alice.pem")?)
//!     .expect("failed to parse key");
//! let enveloped = EnvelopedData::from_ber(&der)?;
//! let id = RecipientId::KeyTrans(KeyIdentifier::issuer_and_serial_of(&cert));
//! assert_eq!(enveloped.decrypt(&id, &RecipientKey::Rsa(&key), &mut rng)?, b"HelloWorld");
//! # Ok(())
//! # }
//! ```

use std::io::{self, Read, Write};
use std::sync::Arc;

use const_oid::ObjectIdentifier;
use der::{asn1::OctetString, Any, Encode};
use rand_core::CryptoRngCore;
use tracing::{debug, trace};

use crate::asn1::{
    context, implicit, BerEncoder, BerReader, Encoding, Header, Level, OctetStringProgress,
    OctetStringState, Scope, Tag, DEFAULT_CHUNK_SIZE,
};
use crate::attributes::{read_attributes, AttributeTable};
use crate::content_info::{CmsVersion, ContentInfo, OriginatorInfo, OtherFormats};
use crate::crypto::content::{CbcDecryptor, CbcEncryptor, DecryptingReader};
use crate::crypto::ContentKey;
use crate::errors::{Error, Result};
use crate::recipient::{
    self, read_recipient_infos, to_recipient_infos, RecipientId, RecipientInfo,
    RecipientInfoGenerator, RecipientInformationStore, RecipientKey,
};
use crate::registry::{oids, AlgorithmIdentifier, ContentEncryption, ContentEncryptionAlgorithm};

pub use cms::enveloped_data::EncryptedContentInfo;

/// `CMSVersion` of an `EnvelopedData` (RFC 5652 § 6.1).
pub(crate) fn enveloped_version(
    originator_info: Option<&OriginatorInfo>,
    recipient_infos: &[RecipientInfo],
    unprotected: bool,
) -> CmsVersion {
    if OtherFormats::of_originator(originator_info).any() {
        return CmsVersion::V4;
    }
    let pwri_or_ori = recipient_infos
        .iter()
        .any(|ri| matches!(ri, RecipientInfo::Pwri(_) | RecipientInfo::Ori(_)));
    if pwri_or_ori {
        return CmsVersion::V3;
    }
    if originator_info.is_none()
        && !unprotected
        && recipient_infos
            .iter()
            .all(|ri| recipient::version(ri) == CmsVersion::V0)
    {
        return CmsVersion::V0;
    }
    CmsVersion::V2
}

/// `true` when neither certificates nor CRLs are present.
pub(crate) fn is_empty_originator(info: &OriginatorInfo) -> bool {
    info.certs.as_ref().map_or(true, |set| set.0.as_slice().is_empty())
        && info.crls.as_ref().map_or(true, |set| set.0.as_slice().is_empty())
}

fn cbc_cipher(algorithm: ContentEncryptionAlgorithm) -> Result<()> {
    if algorithm.is_aead() {
        return Err(Error::UnsupportedAlgorithm(algorithm.oid()));
    }
    Ok(())
}

/// Fresh content key, cipher parameters and one `RecipientInfo` per
/// recipient, in order.
pub(crate) fn establish(
    algorithm: ContentEncryptionAlgorithm,
    recipients: &[RecipientInfoGenerator],
    rng: &mut dyn CryptoRngCore,
) -> Result<(ContentKey, ContentEncryption, Vec<RecipientInfo>)> {
    if recipients.is_empty() {
        return Err(Error::Builder("at least one recipient is required"));
    }
    let mut cek = ContentKey::generate(algorithm.key_size(), rng);
    if algorithm == ContentEncryptionAlgorithm::DesEde3Cbc {
        cek.set_odd_parity();
    }
    let encryption = ContentEncryption::generate(algorithm, rng);
    let infos = recipients
        .iter()
        .map(|recipient| recipient.generate_dyn(&cek, &mut *rng))
        .collect::<Result<Vec<_>>>()?;
    Ok((cek, encryption, infos))
}

/// Builds `EnvelopedData` in memory.
#[derive(Debug)]
pub struct EnvelopedDataGenerator {
    algorithm: ContentEncryptionAlgorithm,
    content_type: ObjectIdentifier,
    recipients: Vec<RecipientInfoGenerator>,
    originator_info: Option<OriginatorInfo>,
    unprotected_attributes: Option<AttributeTable>,
}

impl EnvelopedDataGenerator {
    /// Generator for a CBC content cipher. AEAD ciphers belong to
    /// [`crate::auth_enveloped::AuthEnvelopedDataGenerator`].
    pub fn new(algorithm: ContentEncryptionAlgorithm) -> Result<Self> {
        cbc_cipher(algorithm)?;
        Ok(Self {
            algorithm,
            content_type: oids::ID_DATA,
            recipients: Vec::new(),
            originator_info: None,
            unprotected_attributes: None,
        })
    }

    /// Adds a recipient.
    pub fn add_recipient(mut self, recipient: impl Into<RecipientInfoGenerator>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Type of the plaintext, `id-data` by default.
    pub fn with_content_type(mut self, content_type: ObjectIdentifier) -> Self {
        self.content_type = content_type;
        self
    }

    /// Certificates and CRLs of the originator.
    pub fn with_originator_info(mut self, originator_info: OriginatorInfo) -> Self {
        self.originator_info = Some(originator_info).filter(|info| !is_empty_originator(info));
        self
    }

    /// Attributes carried in the clear after the content.
    pub fn with_unprotected_attributes(mut self, attributes: AttributeTable) -> Self {
        self.unprotected_attributes = Some(attributes).filter(|table| !table.is_empty());
        self
    }

    /// Encrypts `content` and returns the DER `ContentInfo`.
    pub fn generate<R: CryptoRngCore>(&self, content: &[u8], rng: &mut R) -> Result<Vec<u8>> {
        let mut stream = self.open_stream(Vec::new(), Encoding::Definite, DEFAULT_CHUNK_SIZE, rng)?;
        stream.write_all(content)?;
        stream.finish()
    }

    fn open_stream<W: Write>(
        &self,
        sink: W,
        encoding: Encoding,
        chunk_size: usize,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<EnvelopedDataStream<W>> {
        let (cek, encryption, infos) = establish(self.algorithm, &self.recipients, rng)?;
        let version = enveloped_version(
            self.originator_info.as_ref(),
            &infos,
            self.unprotected_attributes.is_some(),
        );
        debug!(
            ?version,
            recipients = infos.len(),
            cipher = self.algorithm.name(),
            ?encoding,
            "opening enveloped data"
        );

        let mut encoder = BerEncoder::new(sink, encoding);
        let mut levels = Vec::with_capacity(4);
        levels.push(encoder.open(Tag::Sequence)?);
        encoder.write_der(&oids::ID_ENVELOPED_DATA)?;
        levels.push(encoder.open(context(0))?);
        levels.push(encoder.open(Tag::Sequence)?);
        encoder.write_der(&version)?;
        if let Some(originator) = &self.originator_info {
            encoder.write_der(&implicit(0, originator))?;
        }
        encoder.write_der(&to_recipient_infos(&infos)?)?;
        levels.push(encoder.open(Tag::Sequence)?);
        encoder.write_der(&self.content_type)?;
        encoder.write_der(&encryption.identifier()?)?;

        let octets = OctetStringState::new(context(0), encoder.encoding(), chunk_size);
        let encryptor = CbcEncryptor::new(&encryption, cek.as_bytes())?;
        cek.release();
        Ok(EnvelopedDataStream {
            encoder,
            levels,
            octets: Some(octets),
            encryptor: Some(encryptor),
            buffer: Vec::new(),
            unprotected_attributes: self.unprotected_attributes.clone(),
        })
    }
}

/// Streaming form of [`EnvelopedDataGenerator`].
///
/// Indefinite length by default, so nothing but the ciphertext segments is
/// held in memory.
#[derive(Debug)]
pub struct EnvelopedDataStreamGenerator {
    generator: EnvelopedDataGenerator,
    encoding: Encoding,
    chunk_size: usize,
}

impl EnvelopedDataStreamGenerator {
    /// Streams what `generator` would build.
    pub fn new(generator: EnvelopedDataGenerator) -> Self {
        Self {
            generator,
            encoding: Encoding::Indefinite,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Length encoding of the outer structures.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Segment size of the indefinite length encrypted content.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Writes the header and recipients to `sink` and returns the content
    /// writer.
    pub fn open<W: Write, R: CryptoRngCore>(&self, sink: W, rng: &mut R) -> Result<EnvelopedDataStream<W>> {
        self.generator
            .open_stream(sink, self.encoding, self.chunk_size, rng)
    }
}

/// Plaintext writer of an open `EnvelopedData`.
///
/// [`EnvelopedDataStream::finish`] must be called; a stream dropped before
/// that leaves an incomplete encoding behind.
#[derive(Debug)]
pub struct EnvelopedDataStream<W: Write> {
    encoder: BerEncoder<W>,
    levels: Vec<Level>,
    octets: Option<OctetStringState>,
    encryptor: Option<CbcEncryptor>,
    buffer: Vec<u8>,
    unprotected_attributes: Option<AttributeTable>,
}

impl<W: Write> EnvelopedDataStream<W> {
    fn encrypt(&mut self, data: &[u8]) -> Result<()> {
        let (Some(encryptor), Some(octets)) = (self.encryptor.as_mut(), self.octets.as_mut()) else {
            return Err(Error::Builder("stream already finished"));
        };
        self.buffer.clear();
        encryptor.update(data, &mut self.buffer);
        octets.write(&mut self.encoder, &self.buffer)
    }

    /// Pads the last block and closes every structure.
    pub fn finish(mut self) -> Result<W> {
        let (Some(encryptor), Some(mut octets)) = (self.encryptor.take(), self.octets.take()) else {
            return Err(Error::Builder("stream already finished"));
        };
        self.buffer.clear();
        encryptor.finish(&mut self.buffer);
        octets.write(&mut self.encoder, &self.buffer)?;
        octets.finish(&mut self.encoder)?;

        // EncryptedContentInfo
        let eci = self.levels.pop().ok_or(Error::Builder("no open frame"))?;
        self.encoder.close(eci)?;
        if let Some(attributes) = &self.unprotected_attributes {
            self.encoder.write_der(&implicit(1, &attributes.to_attributes()?))?;
        }
        while let Some(level) = self.levels.pop() {
            self.encoder.close(level)?;
        }
        trace!("enveloped data finished");
        self.encoder.finish()
    }
}

impl<W: Write> Write for EnvelopedDataStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encrypt(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A decoded `EnvelopedData`.
///
/// Values are immutable; [`EnvelopedData::add_recipients`] returns a new
/// value sharing the encrypted content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopedData {
    version: CmsVersion,
    originator_info: Option<OriginatorInfo>,
    recipient_infos: Arc<[RecipientInfo]>,
    encrypted_content_info: Arc<EncryptedContentInfo>,
    unprotected_attributes: Option<AttributeTable>,
}

impl EnvelopedData {
    /// Decodes a BER `ContentInfo` holding an `EnvelopedData`.
    ///
    /// Runs the streaming parser over `bytes`, so indefinite lengths and
    /// segmented ciphertext are accepted.
    pub fn from_ber(bytes: &[u8]) -> Result<Self> {
        let mut parser = EnvelopedDataParser::new(bytes)?;
        let encrypted_content = parser.read_encrypted_content()?;
        let unprotected_attributes = parser.unprotected_attributes()?.cloned();
        if parser.reader.position() != bytes.len() as u64 {
            return Err(Error::Malformed("trailing data after element"));
        }
        Ok(Self {
            version: parser.version,
            originator_info: parser.originator_info,
            recipient_infos: parser.recipient_infos.into(),
            encrypted_content_info: Arc::new(EncryptedContentInfo {
                content_type: parser.content_type,
                content_enc_alg: parser.content_encryption_algorithm,
                encrypted_content: encrypted_content.map(OctetString::new).transpose()?,
            }),
            unprotected_attributes,
        })
    }

    /// As the `cms` structure.
    pub fn to_cms(&self) -> Result<cms::enveloped_data::EnvelopedData> {
        Ok(cms::enveloped_data::EnvelopedData {
            version: self.version,
            originator_info: self.originator_info.clone(),
            recip_infos: to_recipient_infos(&self.recipient_infos)?,
            encrypted_content: EncryptedContentInfo::clone(&self.encrypted_content_info),
            unprotected_attrs: self
                .unprotected_attributes
                .as_ref()
                .map(AttributeTable::to_attributes)
                .transpose()?,
        })
    }

    /// Wraps the value in a `ContentInfo`.
    pub fn to_content_info(&self) -> Result<ContentInfo> {
        Ok(ContentInfo {
            content_type: oids::ID_ENVELOPED_DATA,
            content: Any::encode_from(&self.to_cms()?)?,
        })
    }

    /// DER encoding of the `ContentInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_content_info()?.to_der()?)
    }

    /// Syntax version.
    pub fn version(&self) -> CmsVersion {
        self.version
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
    pub fn encrypted_content_info(&self) -> &EncryptedContentInfo {
        &self.encrypted_content_info
    }

    /// Type of the plaintext.
    pub fn content_type(&self) -> ObjectIdentifier {
        self.encrypted_content_info.content_type
    }

    /// Unprotected attributes.
    pub fn unprotected_attributes(&self) -> Option<&AttributeTable> {
        self.unprotected_attributes.as_ref()
    }

    fn content_encryption(&self) -> Result<ContentEncryption> {
        ContentEncryption::from_identifier(&self.encrypted_content_info.content_enc_alg)
    }

    /// Recoverable entries, one per recipient.
    pub fn recipients(&self) -> Result<RecipientInformationStore> {
        let encryption = self.content_encryption()?;
        Ok(RecipientInformationStore::new(&self.recipient_infos, encryption.algorithm))
    }

    /// Recovers the content key through the entry selected by `id` and
    /// decrypts the content. `rng` blinds RSA private key operations.
    pub fn decrypt<R: CryptoRngCore>(
        &self,
        id: &RecipientId,
        key: &RecipientKey<'_>,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let cek = self.recipients()?.recover_key(id, key, rng)?;
        self.decrypt_with(&cek)
    }

    /// Decrypts the content with an already recovered content key.
    pub fn decrypt_with(&self, cek: &ContentKey) -> Result<Vec<u8>> {
        let encryption = self.content_encryption()?;
        cbc_cipher(encryption.algorithm)?;
        let ciphertext = self
            .encrypted_content_info
            .encrypted_content
            .as_ref()
            .map(OctetString::as_bytes)
            .ok_or(Error::Malformed("encrypted content is absent"))?;
        let mut decryptor = CbcDecryptor::new(&encryption, cek.as_bytes())?;
        let mut plaintext = Vec::with_capacity(ciphertext.len());
        decryptor.update(ciphertext, &mut plaintext);
        decryptor.finish(&mut plaintext)?;
        Ok(plaintext)
    }

    /// New envelope with entries for `recipients` appended, wrapping `cek`
    /// (recovered from an existing entry). The version is recomputed.
    pub fn add_recipients<R: CryptoRngCore>(
        &self,
        cek: &ContentKey,
        recipients: &[RecipientInfoGenerator],
        rng: &mut R,
    ) -> Result<Self> {
        let encryption = self.content_encryption()?;
        if cek.len() != encryption.algorithm.key_size() {
            return Err(Error::KeyMismatch);
        }
        let mut infos = self.recipient_infos.to_vec();
        for recipient in recipients {
            infos.push(recipient.generate_dyn(cek, rng)?);
        }
        let version = enveloped_version(
            self.originator_info.as_ref(),
            &infos,
            self.unprotected_attributes.is_some(),
        );
        Ok(Self {
            version,
            originator_info: self.originator_info.clone(),
            recipient_infos: infos.into(),
            encrypted_content_info: Arc::clone(&self.encrypted_content_info),
            unprotected_attributes: self.unprotected_attributes.clone(),
        })
    }
}

#[derive(Debug)]
enum ParserState {
    Content(Header),
    Reading(OctetStringProgress),
    Detached,
    Consumed,
    Done(Option<AttributeTable>),
}

/// Streaming `EnvelopedData` reader.
///
/// The recipients are decoded on construction; the content is then read
/// through [`EnvelopedDataParser::content`], after which
/// [`EnvelopedDataParser::unprotected_attributes`] becomes available.
#[derive(Debug)]
pub struct EnvelopedDataParser<R> {
    reader: BerReader<R>,
    scopes: [Scope; 4],
    version: CmsVersion,
    originator_info: Option<OriginatorInfo>,
    recipient_infos: Vec<RecipientInfo>,
    content_type: ObjectIdentifier,
    content_encryption_algorithm: AlgorithmIdentifier,
    state: ParserState,
}

impl<R: Read> EnvelopedDataParser<R> {
    /// Reads everything up to the encrypted content.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = BerReader::new(source);
        let (outer, explicit) = enter_content_info(&mut reader, oids::ID_ENVELOPED_DATA)?;
        let header = reader.expect(&explicit, Tag::Sequence, "EnvelopedData must be a sequence")?;
        let enveloped = reader.enter(&header)?;

        let header = reader.expect(&enveloped, Tag::Integer, "EnvelopedData version")?;
        let version: CmsVersion = reader.read_der(header)?;
        let mut header = next_required(&mut reader, &enveloped)?;
        let originator_info = if header.is_context(0) {
            let info = reader.read_implicit(header, Tag::Sequence)?;
            header = next_required(&mut reader, &enveloped)?;
            Some(info)
        } else {
            None
        };
        let recipient_infos = read_recipient_infos(&mut reader, header)?;

        let header = reader.expect(&enveloped, Tag::Sequence, "EncryptedContentInfo must be a sequence")?;
        let eci = reader.enter(&header)?;
        let content_type = reader.next_der(&eci, "EncryptedContentInfo content type")?;
        let content_encryption_algorithm = reader.next_der(&eci, "content encryption algorithm")?;
        let state = match reader.next(&eci)? {
            Some(header) if header.is_context(0) => ParserState::Content(header),
            Some(_) => return Err(Error::Malformed("unexpected field in EncryptedContentInfo")),
            None => ParserState::Detached,
        };
        debug!(?version, recipients = recipient_infos.len(), %content_type, "parsing enveloped data");

        Ok(Self {
            reader,
            scopes: [outer, explicit, enveloped, eci],
            version,
            originator_info,
            recipient_infos,
            content_type,
            content_encryption_algorithm,
            state,
        })
    }

    /// Syntax version.
    pub fn version(&self) -> CmsVersion {
        self.version
    }

    /// Originator certificates and CRLs.
    pub fn originator_info(&self) -> Option<&OriginatorInfo> {
        self.originator_info.as_ref()
    }

    /// Recipient entries as encoded.
    pub fn recipient_infos(&self) -> &[RecipientInfo] {
        &self.recipient_infos
    }

    /// Type of the plaintext.
    pub fn content_type(&self) -> ObjectIdentifier {
        self.content_type
    }

    /// Content cipher identifier.
    pub fn content_encryption_algorithm(&self) -> &AlgorithmIdentifier {
        &self.content_encryption_algorithm
    }

    /// Recoverable entries.
    pub fn recipients(&self) -> Result<RecipientInformationStore> {
        let encryption = ContentEncryption::from_identifier(&self.content_encryption_algorithm)?;
        Ok(RecipientInformationStore::new(&self.recipient_infos, encryption.algorithm))
    }

    /// Plaintext reader, decrypting with `cek`.
    ///
    /// Padding is checked at the end of the ciphertext, so a wrong key
    /// surfaces as a read error at end of stream. Whatever is left unread
    /// is skipped by [`EnvelopedDataParser::unprotected_attributes`].
    pub fn content(&mut self, cek: &ContentKey) -> Result<impl Read + '_> {
        let header = match self.state {
            ParserState::Content(header) => header,
            ParserState::Detached => return Err(Error::Malformed("encrypted content is absent")),
            _ => return Err(Error::Builder("content already read")),
        };
        let encryption = ContentEncryption::from_identifier(&self.content_encryption_algorithm)?;
        cbc_cipher(encryption.algorithm)?;
        let decryptor = CbcDecryptor::new(&encryption, cek.as_bytes())?;
        self.state = ParserState::Reading(self.reader.start_octets(header)?);
        match &mut self.state {
            ParserState::Reading(progress) => Ok(DecryptingReader::new(
                self.reader.resume_octets(progress),
                decryptor,
            )),
            _ => Err(Error::Builder("parser state")),
        }
    }

    /// The ciphertext as encoded, or `None` when it is carried elsewhere.
    pub(crate) fn read_encrypted_content(&mut self) -> Result<Option<Vec<u8>>> {
        let header = match self.state {
            ParserState::Content(header) => header,
            ParserState::Detached => return Ok(None),
            _ => return Err(Error::Builder("content already read")),
        };
        let mut ciphertext = Vec::new();
        self.reader.octets(header)?.read_to_end(&mut ciphertext)?;
        self.state = ParserState::Consumed;
        Ok(Some(ciphertext))
    }

    /// Unprotected attributes. Skips whatever of the content was not read.
    pub fn unprotected_attributes(&mut self) -> Result<Option<&AttributeTable>> {
        match &mut self.state {
            ParserState::Content(header) => {
                let header = *header;
                self.reader.octets(header)?.drain()?;
            }
            ParserState::Reading(progress) => self.reader.resume_octets(progress).drain()?,
            _ => {}
        }
        if !matches!(self.state, ParserState::Done(_)) {
            let [outer, explicit, enveloped, eci] = self.scopes;
            self.reader.finish(&eci)?;
            let attributes = match self.reader.next(&enveloped)? {
                Some(header) if header.is_context(1) => Some(read_attributes(&mut self.reader, header)?),
                Some(_) => return Err(Error::Malformed("unexpected field in EnvelopedData")),
                None => None,
            };
            self.reader.finish(&enveloped)?;
            self.reader.finish(&explicit)?;
            self.reader.finish(&outer)?;
            self.state = ParserState::Done(attributes);
        }
        match &self.state {
            ParserState::Done(attributes) => Ok(attributes.as_ref()),
            _ => Err(Error::Builder("parser state")),
        }
    }
}

/// Decodes the `EncryptedContentInfo` whose header has just been read,
/// collecting a segmented ciphertext into one string.
pub(crate) fn read_encrypted_content_info<R: Read>(
    reader: &mut BerReader<R>,
    header: Header,
) -> Result<EncryptedContentInfo> {
    if !header.is(Tag::Sequence) {
        return Err(Error::Malformed("EncryptedContentInfo must be a sequence"));
    }
    let scope = reader.enter(&header)?;
    let content_type = reader.next_der(&scope, "EncryptedContentInfo content type")?;
    let content_enc_alg = reader.next_der(&scope, "content encryption algorithm")?;
    let encrypted_content = match reader.next(&scope)? {
        Some(header) if header.is_context(0) => {
            let mut content = Vec::new();
            reader.octets(header)?.read_to_end(&mut content)?;
            if reader.next(&scope)?.is_some() {
                return Err(Error::Malformed("unexpected field in EncryptedContentInfo"));
            }
            Some(OctetString::new(content)?)
        }
        Some(_) => return Err(Error::Malformed("unexpected field in EncryptedContentInfo")),
        None => None,
    };
    Ok(EncryptedContentInfo {
        content_type,
        content_enc_alg,
        encrypted_content,
    })
}

/// Enters `ContentInfo` and its `[0]`, checking the content type.
pub(crate) fn enter_content_info<R: Read>(
    reader: &mut BerReader<R>,
    expected: ObjectIdentifier,
) -> Result<(Scope, Scope)> {
    let header = reader.read_header()?;
    if !header.is(Tag::Sequence) {
        return Err(Error::Malformed("ContentInfo must be a sequence"));
    }
    let outer = reader.enter(&header)?;
    let content_type: ObjectIdentifier = reader.next_der(&outer, "ContentInfo content type")?;
    if content_type != expected {
        return Err(Error::Malformed("unexpected content type"));
    }
    let header = reader.expect(&outer, context(0), "ContentInfo without content")?;
    let explicit = reader.enter(&header)?;
    Ok((outer, explicit))
}

pub(crate) fn next_required<R: Read>(reader: &mut BerReader<R>, scope: &Scope) -> Result<Header> {
    reader
        .next(scope)?
        .ok_or(Error::Malformed("structure ends early"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::content_type_attribute;
    use crate::content_info::{IssuerAndSerialNumber, KeyIdentifier};
    use crate::crypto::Password;
    use crate::recipient::{KekRecipient, KeyTransRecipient, PasswordRecipient};
    use crate::registry::CipherFamily;
    use der::Decode;
    use hex_literal::hex;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
    use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};
    use x509_cert::{name::Name, serial_number::SerialNumber};

    const ALICE: &str = include_str!("../tests/examples/keys/rsa-alice.pem");

    fn kek() -> KekRecipient {
        KekRecipient::new(b"kek".to_vec(), CipherFamily::Aes, &[9; 16]).unwrap()
    }

    fn attributes() -> AttributeTable {
        AttributeTable::new().with(content_type_attribute(oids::ID_DATA).unwrap())
    }

    #[test]
    fn version_rules() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let alice = RsaPrivateKey::from_pkcs8_pem(ALICE).expect("failed to parse key");
        let issuer = IssuerAndSerialNumber {
            issuer: Name::from_der(&hex!("3000")).unwrap(),
            serial_number: SerialNumber::new(&[1]).unwrap(),
        };
        let by_serial = KeyTransRecipient::new(
            KeyIdentifier::IssuerAndSerialNumber(issuer),
            alice.to_public_key(),
        );
        let version = |generator: EnvelopedDataGenerator, rng: &mut ChaCha8Rng| {
            let der = generator.generate(b"x", rng).unwrap();
            EnvelopedData::from_ber(&der).unwrap().version()
        };

        let generator = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc).unwrap();
        assert_eq!(version(generator.add_recipient(by_serial.clone()), &mut rng), CmsVersion::V0);
        let generator = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc).unwrap();
        assert_eq!(version(generator.add_recipient(kek()), &mut rng), CmsVersion::V2);
        let generator = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc).unwrap();
        assert_eq!(
            version(generator.add_recipient(PasswordRecipient::new("pw")), &mut rng),
            CmsVersion::V3
        );
        let generator = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc)
            .unwrap()
            .add_recipient(by_serial)
            .with_unprotected_attributes(attributes());
        assert_eq!(version(generator, &mut rng), CmsVersion::V2);
    }

    #[test]
    fn aead_ciphers_are_rejected() {
        assert!(matches!(
            EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Gcm),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc)
                .unwrap()
                .generate(b"x", &mut ChaCha8Rng::from_seed([42; 32])),
            Err(Error::Builder(_))
        ));
    }

    fn streamed(content: &[u8], rng: &mut ChaCha8Rng) -> Vec<u8> {
        let generator = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Camellia128Cbc)
            .unwrap()
            .add_recipient(kek())
            .with_unprotected_attributes(attributes());
        let mut stream = EnvelopedDataStreamGenerator::new(generator)
            .with_chunk_size(64)
            .open(Vec::new(), rng)
            .unwrap();
        for piece in content.chunks(333) {
            stream.write_all(piece).unwrap();
        }
        stream.finish().unwrap()
    }

    fn kek_key<R: Read>(parser: &EnvelopedDataParser<R>, rng: &mut ChaCha8Rng) -> ContentKey {
        parser
            .recipients()
            .unwrap()
            .recover_key(&RecipientId::Kek(b"kek".to_vec()), &RecipientKey::Kek(&[9; 16]), rng)
            .unwrap()
    }

    #[test]
    fn parser_streams_content_and_attributes() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let content = vec![0x42; 5000];
        let ber = streamed(&content, &mut rng);

        let mut parser = EnvelopedDataParser::new(&ber[..]).unwrap();
        assert_eq!(parser.version(), CmsVersion::V2);
        let cek = kek_key(&parser, &mut rng);
        let mut plaintext = Vec::new();
        parser.content(&cek).unwrap().read_to_end(&mut plaintext).unwrap();
        assert_eq!(plaintext, content);
        assert_eq!(parser.unprotected_attributes().unwrap(), Some(&attributes()));
    }

    #[test]
    fn partially_read_content_is_drained() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let ber = streamed(&[0x42; 5000], &mut rng);

        let mut parser = EnvelopedDataParser::new(&ber[..]).unwrap();
        let cek = kek_key(&parser, &mut rng);
        let mut first = [0u8; 1];
        parser.content(&cek).unwrap().read_exact(&mut first).unwrap();
        assert_eq!(first, [0x42]);
        assert_eq!(parser.unprotected_attributes().unwrap(), Some(&attributes()));
        assert!(matches!(parser.content(&cek), Err(Error::Builder(_))));
    }

    #[test]
    fn parser_skips_unread_content() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let der = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::DesEde3Cbc)
            .unwrap()
            .add_recipient(PasswordRecipient::new("pw"))
            .generate(b"HelloWorld", &mut rng)
            .unwrap();
        let mut parser = EnvelopedDataParser::new(&der[..]).unwrap();
        assert_eq!(parser.unprotected_attributes().unwrap(), None);
        assert!(matches!(
            parser.content(&ContentKey::from_bytes(vec![0; 24])),
            Err(Error::Builder(_))
        ));
    }

    #[test]
    fn streamed_envelope_decodes_in_memory() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let content = vec![7u8; 300];
        let ber = streamed(&content, &mut rng);
        let enveloped = EnvelopedData::from_ber(&ber).unwrap();
        assert_eq!(enveloped.unprotected_attributes(), Some(&attributes()));
        let cek = enveloped
            .recipients()
            .unwrap()
            .recover_key(&RecipientId::Kek(b"kek".to_vec()), &RecipientKey::Kek(&[9; 16]), &mut rng)
            .unwrap();
        assert_eq!(enveloped.decrypt_with(&cek).unwrap(), content);

        // re-encoded as DER, the same value comes back
        let der = enveloped.to_der().unwrap();
        assert_eq!(EnvelopedData::from_ber(&der).unwrap(), enveloped);

        let mut trailing = der.clone();
        trailing.push(0);
        assert!(matches!(EnvelopedData::from_ber(&trailing), Err(Error::Malformed(_))));
    }

    #[test]
    fn segmented_ciphertext_is_collected() {
        // SEQUENCE (indefinite) { id-data, { aes128-CBC },
        //   [0] (indefinite) { OCTET STRING 0102, OCTET STRING 03 } }
        let ber = hex!(
            "3080 06092a864886f70d010701 300b 0609608648016503040102"
            "a080 04020102 040103 0000 0000"
        );
        let mut reader = BerReader::new(&ber[..]);
        let header = reader.read_header().unwrap();
        let eci = read_encrypted_content_info(&mut reader, header).unwrap();
        assert_eq!(eci.content_type, oids::ID_DATA);
        assert_eq!(eci.encrypted_content.unwrap().as_bytes(), [1, 2, 3]);
        assert_eq!(reader.position(), ber.len() as u64);
    }

    #[test]
    fn added_recipients_share_the_content() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let der = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes256Cbc)
            .unwrap()
            .add_recipient(kek())
            .generate(b"HelloWorld", &mut rng)
            .unwrap();
        let enveloped = EnvelopedData::from_ber(&der).unwrap();
        let cek = enveloped
            .recipients()
            .unwrap()
            .recover_key(&RecipientId::Kek(b"kek".to_vec()), &RecipientKey::Kek(&[9; 16]), &mut rng)
            .unwrap();
        let extended = enveloped
            .add_recipients(&cek, &[PasswordRecipient::new("pw").into()], &mut rng)
            .unwrap();
        assert_eq!(extended.version(), CmsVersion::V3);
        assert_eq!(extended.recipient_infos().len(), 2);
        assert_eq!(extended.encrypted_content_info(), enveloped.encrypted_content_info());

        let reparsed = EnvelopedData::from_ber(&extended.to_der().unwrap()).unwrap();
        let password = Password::from("pw");
        assert_eq!(
            reparsed
                .decrypt(&RecipientId::Password, &RecipientKey::Password(&password), &mut rng)
                .unwrap(),
            b"HelloWorld"
        );
        assert!(matches!(
            enveloped.add_recipients(&ContentKey::from_bytes(vec![0; 16]), &[], &mut rng),
            Err(Error::KeyMismatch)
        ));
    }
}
