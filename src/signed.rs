//! `SignedData` (RFC 5652 § 5): content, optionally encapsulated, with any
//! number of signers over its digest.
//!
//! Generation digests the content in the same pass that encodes it: the
//! stream writer tees every byte into one hasher per distinct digest
//! algorithm, and the signers run once the content is complete.
//!
//! ```no_run
//! # fn main() -> cms_envelope::Result<()> {
//! use cms_envelope::{
//!     cert, content_info::KeyIdentifier,
//!     registry::{oids, DigestAlgorithm},
//!     signed::SignedDataGenerator,
//!     signer::{SignerInfoGenerator, SigningKey, VerifierKey},
//!     RsaPrivateKey, SignedData,
//! };
//! use rsa::pkcs8::DecodePrivateKey;
//!
//! let cert = cert::certificate_from_pem(&std::fs::read_to_string("tests/examples/keys/rsa-alice.crt")?)?;
//! let key = RsaPrivateKey::from_pkcs8_pem(&std::fs::read_to_string("tests/examples/keys/rsa-alice.pem")?)
//!     .expect("failed to parse key");
//! let signer = SignerInfoGenerator::new(
//!     KeyIdentifier::issuer_and_serial_of(&cert),
//!     SigningKey::Rsa(key),
//!     DigestAlgorithm::Sha256,
//! );
//! let mut generator = SignedDataGenerator::new()
//!     .add_signer(signer)
//!     .add_certificate(&cert);
//! let der = generator.generate(oids::ID_DATA, b"HelloWorld", true, &mut rand_core::OsRng)?;
//!
//! let signed = SignedData::from_ber(&der)?;
//! for signer in signed.signer_infos()? {
//!     let cert = signed.certificate_for(signer.sid()).expect("signer certificate");
//!     assert!(signer.verify(&VerifierKey::from_certificate(&cert)?)?.is_valid());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use cms::{
    cert::{CertificateChoices, OtherCertificateFormat},
    revocation::{RevocationInfoChoice, RevocationInfoChoices},
    signed_data::{CertificateSet, EncapsulatedContentInfo},
};
use const_oid::ObjectIdentifier;
use der::{
    asn1::{OctetString, SetOfVec},
    Any, DerOrd, Encode,
};
use rand_core::CryptoRngCore;
use tracing::{debug, trace, warn};
use x509_cert::{crl::CertificateList, Certificate};

use crate::asn1::{
    context, implicit, BerEncoder, BerReader, Encoding, Header, Level, OctetStringProgress,
    OctetStringState, Scope, Tag, TeeReader, TeeWriter, DEFAULT_CHUNK_SIZE,
};
use crate::content_info::{CmsVersion, ContentInfo, OtherFormats, SignerIdentifier};
use crate::crypto::DigestSet;
use crate::enveloped::{enter_content_info, next_required};
use crate::errors::{Error, Result};
use crate::registry::{oids, AlgorithmIdentifier, DigestAlgorithm};
use crate::signer::{
    signer_info_version, SignerInfo, SignerInfoGenerator, SignerInfos, SignerInformation,
    SignerInformationStore,
};

/// `CMSVersion` of a `SignedData` (RFC 5652 § 5.1).
fn signed_version(
    certificates: &[CertificateChoices],
    crls: &[RevocationInfoChoice],
    content_type: ObjectIdentifier,
    signer_versions: impl IntoIterator<Item = CmsVersion>,
) -> CmsVersion {
    if OtherFormats::of(certificates, crls).any() {
        CmsVersion::V5
    } else if content_type != oids::ID_DATA
        || signer_versions.into_iter().any(|v| v == CmsVersion::V3)
    {
        CmsVersion::V3
    } else {
        CmsVersion::V1
    }
}

/// Distinct digest identifiers by OID, first occurrence wins.
fn merge_digest_algorithms<'a>(
    identifiers: impl IntoIterator<Item = &'a AlgorithmIdentifier>,
) -> Vec<AlgorithmIdentifier> {
    let mut merged: Vec<AlgorithmIdentifier> = Vec::new();
    for id in identifiers {
        if !merged.iter().any(|known| known.oid == id.oid) {
            merged.push(id.clone());
        }
    }
    merged
}

/// Writes `[number] IMPLICIT SET OF`, sorted when `der` is set and in the
/// given order otherwise.
fn write_set<W: Write, T: Encode + DerOrd + Clone + for<'a> der::Decode<'a>>(
    encoder: &mut BerEncoder<W>,
    number: u8,
    members: &[T],
    der: bool,
) -> Result<()> {
    if der {
        return encoder.write_der(&implicit(number, &SetOfVec::try_from(members.to_vec())?));
    }
    let level = encoder.open(context(number))?;
    for member in members {
        encoder.write_der(member)?;
    }
    encoder.close(level)
}

/// Pairs each `SignerInfo` with the digest of the content under its own
/// digest algorithm, when known.
fn signer_store(
    infos: impl IntoIterator<Item = SignerInfo>,
    content_type: ObjectIdentifier,
    digests: Option<&BTreeMap<DigestAlgorithm, Vec<u8>>>,
) -> SignerInformationStore {
    infos
        .into_iter()
        .map(|info| {
            let digest = DigestAlgorithm::from_identifier(&info.digest_alg)
                .ok()
                .and_then(|alg| digests?.get(&alg).cloned());
            SignerInformation::new(info, Some(content_type), digest)
        })
        .collect()
}

/// Distinct supported digest algorithms named by `identifiers`.
fn digest_set<'a>(identifiers: impl IntoIterator<Item = &'a AlgorithmIdentifier>) -> DigestSet {
    DigestSet::new(identifiers.into_iter().filter_map(|id| {
        DigestAlgorithm::from_identifier(id)
            .map_err(|err| warn!(oid = %id.oid, %err, "digest algorithm skipped"))
            .ok()
    }))
}

fn plain_certificates(choices: &[CertificateChoices]) -> Vec<Certificate> {
    choices
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert.clone()),
            CertificateChoices::Other(_) => None,
        })
        .collect()
}

/// Builds `SignedData`.
#[derive(Debug, Default)]
pub struct SignedDataGenerator {
    signers: Vec<SignerInfoGenerator>,
    precomputed: Vec<SignerInfo>,
    certificates: Vec<CertificateChoices>,
    crls: Vec<RevocationInfoChoice>,
    der_certificates: bool,
    der_crls: bool,
    generated_digests: BTreeMap<ObjectIdentifier, Vec<u8>>,
}

impl SignedDataGenerator {
    /// Generator with no signers, certificates or CRLs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signer. Signers sign in the order they were added.
    pub fn add_signer(mut self, signer: SignerInfoGenerator) -> Self {
        self.signers.push(signer);
        self
    }

    /// Adds already computed signers, for instance those of another
    /// `SignedData` over the same content.
    pub fn add_signers(mut self, store: &SignerInformationStore) -> Self {
        self.precomputed
            .extend(store.iter().map(|signer| signer.info().clone()));
        self
    }

    /// Adds a certificate.
    pub fn add_certificate(mut self, cert: &Certificate) -> Self {
        self.certificates
            .push(CertificateChoices::Certificate(cert.clone()));
        self
    }

    /// Adds a certificate in a format other than X.509, which raises the
    /// version to 5.
    pub fn add_other_certificate(mut self, other: OtherCertificateFormat) -> Self {
        self.certificates.push(CertificateChoices::Other(other));
        self
    }

    /// Adds a CRL.
    pub fn add_crl(mut self, crl: &CertificateList) -> Self {
        self.crls.push(RevocationInfoChoice::Crl(crl.clone()));
        self
    }

    /// Sorts the certificate set into DER order instead of keeping the
    /// order of addition.
    pub fn use_der_for_certs(mut self, der: bool) -> Self {
        self.der_certificates = der;
        self
    }

    /// Sorts the CRL set into DER order.
    pub fn use_der_for_crls(mut self, der: bool) -> Self {
        self.der_crls = der;
        self
    }

    /// Content digests computed by the last generation, by digest OID.
    pub fn generated_digests(&self) -> &BTreeMap<ObjectIdentifier, Vec<u8>> {
        &self.generated_digests
    }

    /// Signs `content` and returns the definite length `ContentInfo`. The
    /// content is carried inside when `encapsulate` is set, otherwise the
    /// signature is detached.
    pub fn generate<R: CryptoRngCore>(
        &mut self,
        content_type: ObjectIdentifier,
        content: &[u8],
        encapsulate: bool,
        rng: &mut R,
    ) -> Result<Vec<u8>> {
        let mut stream = self.open_stream(
            Vec::new(),
            content_type,
            encapsulate,
            Encoding::Definite,
            DEFAULT_CHUNK_SIZE,
        )?;
        stream.write_all(content)?;
        stream.finish(rng)
    }

    fn digest_identifiers(&self) -> Vec<AlgorithmIdentifier> {
        let own: Vec<AlgorithmIdentifier> = self
            .signers
            .iter()
            .map(|signer| signer.digest_algorithm().identifier())
            .collect();
        merge_digest_algorithms(
            own.iter()
                .chain(self.precomputed.iter().map(|info| &info.digest_alg)),
        )
    }

    fn open_stream<W: Write>(
        &mut self,
        sink: W,
        content_type: ObjectIdentifier,
        encapsulate: bool,
        encoding: Encoding,
        chunk_size: usize,
    ) -> Result<SignedDataStream<'_, W>> {
        let digest_algorithms = self.digest_identifiers();
        let signer_versions = self
            .signers
            .iter()
            .map(|s| signer_info_version(s.signer_identifier()))
            .chain(self.precomputed.iter().map(|info| info.version));
        let version = signed_version(&self.certificates, &self.crls, content_type, signer_versions);
        debug!(
            ?version,
            signers = self.signers.len() + self.precomputed.len(),
            %content_type,
            encapsulate,
            ?encoding,
            "opening signed data"
        );

        let mut encoder = BerEncoder::new(sink, encoding);
        let mut levels = Vec::with_capacity(4);
        levels.push(encoder.open(Tag::Sequence)?);
        encoder.write_der(&oids::ID_SIGNED_DATA)?;
        levels.push(encoder.open(context(0))?);
        levels.push(encoder.open(Tag::Sequence)?);
        encoder.write_der(&version)?;
        encoder.write_der(&SetOfVec::try_from(digest_algorithms.clone())?)?;
        levels.push(encoder.open(Tag::Sequence)?);
        encoder.write_der(&content_type)?;
        let (econtent, octets) = if encapsulate {
            let level = encoder.open(context(0))?;
            let octets = OctetStringState::new(Tag::OctetString, encoder.encoding(), chunk_size);
            (Some(level), Some(octets))
        } else {
            (None, None)
        };

        let digests = digest_set(&digest_algorithms);
        Ok(SignedDataStream {
            content: TeeWriter::new(EncapsulatedContent { encoder, octets }, digests),
            econtent,
            levels,
            content_type,
            generator: self,
        })
    }
}

/// Streaming form of [`SignedDataGenerator`].
#[derive(Debug)]
pub struct SignedDataStreamGenerator {
    generator: SignedDataGenerator,
    encoding: Encoding,
    chunk_size: usize,
}

impl SignedDataStreamGenerator {
    /// Streams what `generator` would build, indefinite length by default.
    pub fn new(generator: SignedDataGenerator) -> Self {
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

    /// Segment size of indefinite length content.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Content digests computed by the last finished stream.
    pub fn generated_digests(&self) -> &BTreeMap<ObjectIdentifier, Vec<u8>> {
        self.generator.generated_digests()
    }

    /// Writes the header to `sink` and returns the content writer.
    pub fn open<W: Write>(
        &mut self,
        sink: W,
        content_type: ObjectIdentifier,
        encapsulate: bool,
    ) -> Result<SignedDataStream<'_, W>> {
        self.generator
            .open_stream(sink, content_type, encapsulate, self.encoding, self.chunk_size)
    }
}

/// Encoder side of the content tee: the `eContent` octets, or nothing for
/// detached content.
#[derive(Debug)]
struct EncapsulatedContent<W: Write> {
    encoder: BerEncoder<W>,
    octets: Option<OctetStringState>,
}

impl<W: Write> Write for EncapsulatedContent<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(octets) = self.octets.as_mut() {
            octets.write(&mut self.encoder, buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Content writer of an open `SignedData`; [`SignedDataStream::finish`]
/// signs and closes it.
#[derive(Debug)]
pub struct SignedDataStream<'g, W: Write> {
    content: TeeWriter<EncapsulatedContent<W>, DigestSet>,
    econtent: Option<Level>,
    levels: Vec<Level>,
    content_type: ObjectIdentifier,
    generator: &'g mut SignedDataGenerator,
}

impl<'g, W: Write> SignedDataStream<'g, W> {
    /// Closes the content, runs every signer and writes the certificates,
    /// CRLs and `SignerInfo`s.
    pub fn finish<R: CryptoRngCore>(self, rng: &mut R) -> Result<W> {
        let Self {
            content,
            econtent,
            mut levels,
            content_type,
            generator,
        } = self;
        let (EncapsulatedContent { mut encoder, octets }, digests) = content.into_inner();
        if let Some(octets) = octets {
            octets.finish(&mut encoder)?;
        }
        if let Some(level) = econtent {
            encoder.close(level)?;
        }
        // EncapsulatedContentInfo
        let eci = levels.pop().ok_or(Error::Builder("no open frame"))?;
        encoder.close(eci)?;

        let digests = digests.finalize();
        if !generator.certificates.is_empty() {
            write_set(&mut encoder, 0, &generator.certificates, generator.der_certificates)?;
        }
        if !generator.crls.is_empty() {
            write_set(&mut encoder, 1, &generator.crls, generator.der_crls)?;
        }

        let mut infos = Vec::with_capacity(generator.signers.len() + generator.precomputed.len());
        for signer in &generator.signers {
            let digest = digests
                .get(&signer.digest_algorithm())
                .ok_or(Error::Builder("signer digest was not computed"))?;
            infos.push(signer.generate_dyn(Some(content_type), digest, &mut *rng)?);
        }
        infos.extend(generator.precomputed.iter().cloned());
        let count = infos.len();
        encoder.write_der(&SetOfVec::try_from(infos)?)?;
        while let Some(level) = levels.pop() {
            encoder.close(level)?;
        }
        generator.generated_digests = digests
            .into_iter()
            .map(|(alg, digest)| (alg.oid(), digest))
            .collect();
        trace!(signers = count, "signed data finished");
        encoder.finish()
    }
}

impl<'g, W: Write> Write for SignedDataStream<'g, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.content.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A decoded `SignedData`.
///
/// Values are immutable. The replacing operations return a new value that
/// shares the content and the certificate and CRL sets it does not change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedData {
    version: CmsVersion,
    digest_algorithms: Vec<AlgorithmIdentifier>,
    content_type: ObjectIdentifier,
    content: Option<Arc<[u8]>>,
    certificates: Option<Arc<[CertificateChoices]>>,
    crls: Option<Arc<[RevocationInfoChoice]>>,
    signer_infos: Vec<SignerInfo>,
}

impl SignedData {
    /// Decodes a BER `ContentInfo` holding a `SignedData`.
    ///
    /// Runs the streaming parser over `bytes`; sets keep their encoded
    /// order.
    pub fn from_ber(bytes: &[u8]) -> Result<Self> {
        let mut parser = SignedDataParser::new(bytes)?;
        let content = if matches!(parser.state, ParserState::Content(_)) {
            let mut content = Vec::new();
            parser.content()?.read_to_end(&mut content)?;
            Some(Arc::from(content))
        } else {
            None
        };
        let signer_infos = parser.read_trailer()?;
        if parser.reader.position() != bytes.len() as u64 {
            return Err(Error::Malformed("trailing data after element"));
        }
        Ok(Self {
            version: parser.version,
            digest_algorithms: parser.digest_algorithms,
            content_type: parser.content_type,
            content,
            certificates: Some(parser.certificates)
                .filter(|c| !c.is_empty())
                .map(Arc::from),
            crls: Some(parser.crls).filter(|c| !c.is_empty()).map(Arc::from),
            signer_infos,
        })
    }

    /// As the `cms` structure; every set is DER sorted.
    pub fn to_cms(&self) -> Result<cms::signed_data::SignedData> {
        let econtent = match &self.content {
            Some(content) => Some(Any::encode_from(&OctetString::new(&content[..])?)?),
            None => None,
        };
        Ok(cms::signed_data::SignedData {
            version: self.version,
            digest_algorithms: SetOfVec::try_from(self.digest_algorithms.clone())?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: self.content_type,
                econtent,
            },
            certificates: self
                .certificates
                .as_deref()
                .map(|c| SetOfVec::try_from(c.to_vec()).map(CertificateSet))
                .transpose()?,
            crls: self
                .crls
                .as_deref()
                .map(|c| SetOfVec::try_from(c.to_vec()).map(RevocationInfoChoices))
                .transpose()?,
            signer_infos: SignerInfos(SetOfVec::try_from(self.signer_infos.clone())?),
        })
    }

    /// Wraps the value in a `ContentInfo`.
    pub fn to_content_info(&self) -> Result<ContentInfo> {
        Ok(ContentInfo {
            content_type: oids::ID_SIGNED_DATA,
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

    /// Declared digest algorithms.
    pub fn digest_algorithms(&self) -> &[AlgorithmIdentifier] {
        &self.digest_algorithms
    }

    /// Type of the signed content.
    pub fn content_type(&self) -> ObjectIdentifier {
        self.content_type
    }

    /// Encapsulated content; `None` for a detached signature.
    pub fn content(&self) -> Option<&[u8]> {
        self.content.as_deref()
    }

    /// Every `CertificateChoices` member.
    pub fn certificate_choices(&self) -> &[CertificateChoices] {
        self.certificates.as_deref().unwrap_or_default()
    }

    /// Every `RevocationInfoChoice` member.
    pub fn crl_choices(&self) -> &[RevocationInfoChoice] {
        self.crls.as_deref().unwrap_or_default()
    }

    /// Plain X.509 certificates.
    pub fn certificates(&self) -> Vec<Certificate> {
        plain_certificates(self.certificate_choices())
    }

    /// Plain X.509 CRLs.
    pub fn crls(&self) -> Vec<CertificateList> {
        self.crl_choices()
            .iter()
            .filter_map(|choice| match choice {
                RevocationInfoChoice::Crl(crl) => Some(crl.clone()),
                RevocationInfoChoice::Other(_) => None,
            })
            .collect()
    }

    /// The certificate `sid` selects, if carried.
    pub fn certificate_for(&self, sid: &SignerIdentifier) -> Option<Certificate> {
        self.certificates().into_iter().find(|cert| sid.matches(cert))
    }

    /// Signers paired with the digest of the encapsulated content. For a
    /// detached signature use [`SignedData::signer_infos_detached`].
    pub fn signer_infos(&self) -> Result<SignerInformationStore> {
        match &self.content {
            Some(content) => self.signer_infos_detached(content),
            None => Ok(signer_store(self.signer_infos.iter().cloned(), self.content_type, None)),
        }
    }

    /// Signers paired with the digest of `content`.
    pub fn signer_infos_detached(&self, content: &[u8]) -> Result<SignerInformationStore> {
        let mut digests = digest_set(self.signer_infos.iter().map(|info| &info.digest_alg));
        digests.update(content);
        let digests = digests.finalize();
        Ok(signer_store(self.signer_infos.iter().cloned(), self.content_type, Some(&digests)))
    }

    /// New value with the signers of `store`; the digest algorithms become
    /// the union of the current ones and those the new signers use.
    pub fn replace_signers(&self, store: &SignerInformationStore) -> Self {
        let signer_infos: Vec<SignerInfo> = store.iter().map(|signer| signer.info().clone()).collect();
        let digest_algorithms = merge_digest_algorithms(
            self.digest_algorithms
                .iter()
                .chain(signer_infos.iter().map(|info| &info.digest_alg)),
        );
        let version = signed_version(
            self.certificate_choices(),
            self.crl_choices(),
            self.content_type,
            signer_infos.iter().map(|info| info.version),
        );
        Self {
            version,
            digest_algorithms,
            signer_infos,
            ..self.clone()
        }
    }

    /// New value carrying exactly `certificates` and `crls`; empty lists
    /// drop the field.
    pub fn replace_certificates_and_crls(
        &self,
        certificates: &[Certificate],
        crls: &[CertificateList],
    ) -> Self {
        let certificates: Vec<CertificateChoices> = certificates
            .iter()
            .cloned()
            .map(CertificateChoices::Certificate)
            .collect();
        let crls: Vec<RevocationInfoChoice> =
            crls.iter().cloned().map(RevocationInfoChoice::Crl).collect();
        let version = signed_version(
            &certificates,
            &crls,
            self.content_type,
            self.signer_infos.iter().map(|info| info.version),
        );
        Self {
            version,
            certificates: Some(certificates).filter(|c| !c.is_empty()).map(Arc::from),
            crls: Some(crls).filter(|c| !c.is_empty()).map(Arc::from),
            ..self.clone()
        }
    }
}

#[derive(Debug)]
enum ParserState {
    Content(Header),
    Reading(OctetStringProgress),
    Detached,
    Consumed,
    Done,
}

/// Streaming `SignedData` reader.
///
/// The content is read through [`SignedDataParser::content`], which digests
/// it on the way; the signers become available afterwards.
#[derive(Debug)]
pub struct SignedDataParser<R> {
    reader: BerReader<R>,
    scopes: [Scope; 4],
    econtent: Option<Scope>,
    version: CmsVersion,
    digest_algorithms: Vec<AlgorithmIdentifier>,
    content_type: ObjectIdentifier,
    digests: DigestSet,
    state: ParserState,
    certificates: Vec<CertificateChoices>,
    crls: Vec<RevocationInfoChoice>,
}

impl<R: Read> SignedDataParser<R> {
    /// Reads everything up to the content.
    pub fn new(source: R) -> Result<Self> {
        let mut reader = BerReader::new(source);
        let (outer, explicit) = enter_content_info(&mut reader, oids::ID_SIGNED_DATA)?;
        let header = reader.expect(&explicit, Tag::Sequence, "SignedData must be a sequence")?;
        let signed = reader.enter(&header)?;

        let version: CmsVersion = reader.next_der(&signed, "SignedData version")?;
        let header = reader.expect(&signed, Tag::Set, "digestAlgorithms must be a set")?;
        let digest_algorithms: Vec<AlgorithmIdentifier> = reader.read_members(header)?;

        let header = reader.expect(&signed, Tag::Sequence, "EncapsulatedContentInfo must be a sequence")?;
        let encap = reader.enter(&header)?;
        let content_type: ObjectIdentifier = reader.next_der(&encap, "content type")?;
        let (econtent, state) = match reader.next(&encap)? {
            Some(header) if header.is_context(0) => {
                let econtent = reader.enter(&header)?;
                let header =
                    reader.expect(&econtent, Tag::OctetString, "eContent must be an octet string")?;
                (Some(econtent), ParserState::Content(header))
            }
            Some(_) => return Err(Error::Malformed("unexpected field in EncapsulatedContentInfo")),
            None => (None, ParserState::Detached),
        };
        debug!(?version, %content_type, detached = econtent.is_none(), "parsing signed data");

        let digests = digest_set(&digest_algorithms);
        Ok(Self {
            reader,
            scopes: [outer, explicit, signed, encap],
            econtent,
            version,
            digest_algorithms,
            content_type,
            digests,
            state,
            certificates: Vec::new(),
            crls: Vec::new(),
        })
    }

    /// Syntax version.
    pub fn version(&self) -> CmsVersion {
        self.version
    }

    /// Declared digest algorithms.
    pub fn digest_algorithms(&self) -> &[AlgorithmIdentifier] {
        &self.digest_algorithms
    }

    /// Type of the signed content.
    pub fn content_type(&self) -> ObjectIdentifier {
        self.content_type
    }

    /// `true` when the content is not carried.
    pub fn is_detached(&self) -> bool {
        self.econtent.is_none()
    }

    /// Reader over the encapsulated content, digesting every byte read.
    ///
    /// Whatever is left unread is digested by
    /// [`SignedDataParser::signer_infos`].
    pub fn content(&mut self) -> Result<impl Read + '_> {
        let header = match self.state {
            ParserState::Content(header) => header,
            ParserState::Detached => return Err(Error::Builder("content is detached")),
            _ => return Err(Error::Builder("content already read")),
        };
        self.state = ParserState::Reading(self.reader.start_octets(header)?);
        match &mut self.state {
            ParserState::Reading(progress) => Ok(TeeReader::new(
                self.reader.resume_octets(progress),
                &mut self.digests,
            )),
            _ => Err(Error::Builder("parser state")),
        }
    }

    /// Digests detached `content`.
    pub fn detached_content(&mut self, mut content: impl Read) -> Result<()> {
        if !matches!(self.state, ParserState::Detached) {
            return Err(Error::Builder("content is not detached"));
        }
        io::copy(&mut content, &mut self.digests)?;
        self.state = ParserState::Consumed;
        Ok(())
    }

    /// Certificates, once [`SignedDataParser::signer_infos`] has read past
    /// them.
    pub fn certificate_choices(&self) -> &[CertificateChoices] {
        &self.certificates
    }

    /// CRLs, once [`SignedDataParser::signer_infos`] has read past them.
    pub fn crl_choices(&self) -> &[RevocationInfoChoice] {
        &self.crls
    }

    /// Plain X.509 certificates read so far.
    pub fn certificates(&self) -> Vec<Certificate> {
        plain_certificates(&self.certificates)
    }

    /// Reads the rest of the structure and returns the signers paired with
    /// the content digests. Content never read is digested here; for a
    /// detached signature whose content was not supplied the digests are
    /// unknown.
    pub fn signer_infos(&mut self) -> Result<SignerInformationStore> {
        let detached = matches!(self.state, ParserState::Detached);
        match &mut self.state {
            ParserState::Content(header) => {
                let header = *header;
                let octets = self.reader.octets(header)?;
                io::copy(&mut TeeReader::new(octets, &mut self.digests), &mut io::sink())?;
            }
            ParserState::Reading(progress) => {
                let octets = self.reader.resume_octets(progress);
                io::copy(&mut TeeReader::new(octets, &mut self.digests), &mut io::sink())?;
            }
            ParserState::Done => return Err(Error::Builder("signers already read")),
            _ => {}
        }
        let infos = self.read_trailer()?;
        let digests = std::mem::replace(&mut self.digests, DigestSet::new(Vec::new())).finalize();
        Ok(signer_store(
            infos,
            self.content_type,
            (!detached).then_some(&digests),
        ))
    }

    /// Certificates, CRLs and `SignerInfo`s, with the content already
    /// consumed.
    fn read_trailer(&mut self) -> Result<Vec<SignerInfo>> {
        self.state = ParserState::Done;
        let [outer, explicit, signed, encap] = self.scopes;
        if let Some(econtent) = self.econtent {
            self.reader.finish(&econtent)?;
        }
        self.reader.finish(&encap)?;
        let mut header = next_required(&mut self.reader, &signed)?;
        if header.is_context(0) {
            self.certificates = self.reader.read_members(header)?;
            header = next_required(&mut self.reader, &signed)?;
        }
        if header.is_context(1) {
            self.crls = self.reader.read_members(header)?;
            header = next_required(&mut self.reader, &signed)?;
        }
        if !header.is(Tag::Set) {
            return Err(Error::Malformed("signerInfos must be a set"));
        }
        let infos: Vec<SignerInfo> = self.reader.read_members(header)?;
        self.reader.finish(&signed)?;
        self.reader.finish(&explicit)?;
        self.reader.finish(&outer)?;
        trace!(signers = infos.len(), "signed data trailer read");
        Ok(infos)
    }
}

#[cfg(all(test, feature = "pem"))]
mod tests {
    use super::*;
    use crate::attributes::{attribute, AttributeTable, SimpleAttributeTable};
    use crate::content_info::{IssuerAndSerialNumber, KeyIdentifier};
    use crate::signer::{SigningKey, Verification, VerifierKey};
    use der::Decode;
    use hex_literal::hex;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
    use rsa::{pkcs8::DecodePrivateKey, RsaPrivateKey};
    use x509_cert::{name::Name, serial_number::SerialNumber};

    const RSA_ALICE: &str = include_str!("../tests/examples/keys/rsa-alice.pem");
    const RSA_ALICE_CERT: &str = include_str!("../tests/examples/keys/rsa-alice.crt");
    const EC_ALICE: &str = include_str!("../tests/examples/keys/ec-alice.pem");

    fn alice() -> (Certificate, SigningKey) {
        let cert = crate::cert::certificate_from_pem(RSA_ALICE_CERT).unwrap();
        let key = RsaPrivateKey::from_pkcs8_pem(RSA_ALICE).expect("failed to parse key");
        (cert, SigningKey::Rsa(key))
    }

    fn ec_signer() -> SignerInfoGenerator {
        let key = p256::ecdsa::SigningKey::from_pkcs8_pem(EC_ALICE).unwrap();
        SignerInfoGenerator::new(
            KeyIdentifier::SubjectKeyIdentifier(vec![7; 20]),
            SigningKey::EcdsaP256(key),
            DigestAlgorithm::Sha384,
        )
    }

    fn alice_signer() -> (Certificate, SignerInfoGenerator) {
        let (cert, key) = alice();
        let sid = KeyIdentifier::issuer_and_serial_of(&cert);
        (cert, SignerInfoGenerator::new(sid, key, DigestAlgorithm::Sha256))
    }

    fn other_certificate() -> OtherCertificateFormat {
        OtherCertificateFormat {
            other_cert_format: ObjectIdentifier::new_unwrap("1.2.3.4"),
            other_cert: Any::null(),
        }
    }

    #[test]
    fn version_rules() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (_, signer) = alice_signer();
        let der = SignedDataGenerator::new()
            .add_signer(signer)
            .generate(oids::ID_DATA, b"x", true, &mut rng)
            .unwrap();
        assert_eq!(SignedData::from_ber(&der).unwrap().version(), CmsVersion::V1);

        let der = SignedDataGenerator::new()
            .add_signer(ec_signer())
            .generate(oids::ID_DATA, b"x", true, &mut rng)
            .unwrap();
        assert_eq!(SignedData::from_ber(&der).unwrap().version(), CmsVersion::V3);

        let der = SignedDataGenerator::new()
            .generate(oids::ID_ENVELOPED_DATA, b"x", true, &mut rng)
            .unwrap();
        assert_eq!(SignedData::from_ber(&der).unwrap().version(), CmsVersion::V3);

        let der = SignedDataGenerator::new()
            .add_other_certificate(other_certificate())
            .generate(oids::ID_DATA, b"x", true, &mut rng)
            .unwrap();
        let signed = SignedData::from_ber(&der).unwrap();
        assert_eq!(signed.version(), CmsVersion::V5);
        assert!(signed.certificates().is_empty());
        assert_eq!(signed.certificate_choices().len(), 1);
    }

    #[test]
    fn two_signers_verify() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let ec = ec_signer();
        let ec_key =
            SigningKey::EcdsaP256(p256::ecdsa::SigningKey::from_pkcs8_pem(EC_ALICE).unwrap())
                .verifier_key();
        let mut generator = SignedDataGenerator::new()
            .add_signer(signer)
            .add_signer(ec)
            .add_certificate(&cert);
        let der = generator
            .generate(oids::ID_DATA, b"HelloWorld", true, &mut rng)
            .unwrap();
        assert_eq!(
            generator.generated_digests()[&oids::SHA256],
            DigestAlgorithm::Sha256.digest(b"HelloWorld")
        );
        assert_eq!(generator.generated_digests().len(), 2);

        let signed = SignedData::from_ber(&der).unwrap();
        assert_eq!(signed.digest_algorithms().len(), 2);
        assert_eq!(signed.content(), Some(&b"HelloWorld"[..]));
        let store = signed.signer_infos().unwrap();
        assert_eq!(store.len(), 2);
        for signer in &store {
            let key = match signed.certificate_for(signer.sid()) {
                Some(cert) => VerifierKey::from_certificate(&cert).unwrap(),
                None => ec_key.clone(),
            };
            assert_eq!(signer.verify(&key).unwrap(), Verification::Valid);
        }
    }

    #[test]
    fn detached_signatures() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let key = VerifierKey::from_certificate(&cert).unwrap();
        let der = SignedDataGenerator::new()
            .add_signer(signer)
            .generate(oids::ID_DATA, b"HelloWorld", false, &mut rng)
            .unwrap();
        let signed = SignedData::from_ber(&der).unwrap();
        assert_eq!(signed.content(), None);

        let store = signed.signer_infos().unwrap();
        assert!(matches!(
            store.signers()[0].verify(&key),
            Err(Error::Builder(_))
        ));
        let store = signed.signer_infos_detached(b"HelloWorld").unwrap();
        assert!(store.signers()[0].verify(&key).unwrap().is_valid());
        let store = signed.signer_infos_detached(b"HelloWorle").unwrap();
        assert_eq!(store.signers()[0].verify(&key).unwrap(), Verification::DigestMismatch);

        let mut parser = SignedDataParser::new(&der[..]).unwrap();
        assert!(parser.is_detached());
        assert!(parser.content().is_err());
        parser.detached_content(&b"HelloWorld"[..]).unwrap();
        let store = parser.signer_infos().unwrap();
        assert!(store.signers()[0].verify(&key).unwrap().is_valid());
    }

    #[test]
    fn stream_and_parser() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let key = VerifierKey::from_certificate(&cert).unwrap();
        let mut generator = SignedDataStreamGenerator::new(
            SignedDataGenerator::new()
                .add_signer(signer)
                .add_certificate(&cert),
        )
        .with_chunk_size(100);
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut stream = generator.open(Vec::new(), oids::ID_DATA, true).unwrap();
        for piece in content.chunks(777) {
            stream.write_all(piece).unwrap();
        }
        let ber = stream.finish(&mut rng).unwrap();
        // indefinite outer length
        assert_eq!(&ber[..2], &[0x30, 0x80]);

        let mut parser = SignedDataParser::new(&ber[..]).unwrap();
        let mut read = Vec::new();
        parser.content().unwrap().read_to_end(&mut read).unwrap();
        assert_eq!(read, content);
        let store = parser.signer_infos().unwrap();
        assert_eq!(parser.certificates(), vec![cert]);
        assert!(store.signers()[0].verify(&key).unwrap().is_valid());

        // the in-memory decoder accepts the same bytes
        let signed = SignedData::from_ber(&ber).unwrap();
        assert_eq!(signed.content(), Some(&content[..]));
        assert!(signed.signer_infos().unwrap().signers()[0]
            .verify(&key)
            .unwrap()
            .is_valid());
    }

    #[test]
    fn parser_digests_unread_content() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let der = SignedDataGenerator::new()
            .add_signer(signer)
            .generate(oids::ID_DATA, b"HelloWorld", true, &mut rng)
            .unwrap();
        let mut parser = SignedDataParser::new(&der[..]).unwrap();
        let store = parser.signer_infos().unwrap();
        let key = VerifierKey::from_certificate(&cert).unwrap();
        assert!(store.signers()[0].verify(&key).unwrap().is_valid());
        assert!(parser.signer_infos().is_err());
    }

    #[test]
    fn partially_read_content_is_digested_in_full() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let key = VerifierKey::from_certificate(&cert).unwrap();
        let mut generator = SignedDataStreamGenerator::new(SignedDataGenerator::new().add_signer(signer))
            .with_chunk_size(4);
        let mut stream = generator.open(Vec::new(), oids::ID_DATA, true).unwrap();
        stream.write_all(b"HelloWorld").unwrap();
        let ber = stream.finish(&mut rng).unwrap();

        let mut parser = SignedDataParser::new(&ber[..]).unwrap();
        let mut head = [0u8; 6];
        parser.content().unwrap().read_exact(&mut head).unwrap();
        assert_eq!(&head, b"HelloW");
        let store = parser.signer_infos().unwrap();
        assert!(store.signers()[0].verify(&key).unwrap().is_valid());
    }

    #[test]
    fn trailing_data_is_rejected() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let mut der = SignedDataGenerator::new()
            .add_signer(ec_signer())
            .generate(oids::ID_DATA, b"x", true, &mut rng)
            .unwrap();
        assert!(SignedData::from_ber(&der).is_ok());
        der.push(0);
        assert!(matches!(SignedData::from_ber(&der), Err(Error::Malformed(_))));
    }

    #[test]
    fn replacing_signers_and_certificates() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let first = SignedData::from_ber(
            &SignedDataGenerator::new()
                .add_signer(signer)
                .generate(oids::ID_DATA, b"HelloWorld", true, &mut rng)
                .unwrap(),
        )
        .unwrap();
        let second = SignedData::from_ber(
            &SignedDataGenerator::new()
                .add_signer(ec_signer())
                .generate(oids::ID_DATA, b"HelloWorld", true, &mut rng)
                .unwrap(),
        )
        .unwrap();

        let merged: SignerInformationStore = first
            .signer_infos()
            .unwrap()
            .into_iter()
            .chain(second.signer_infos().unwrap())
            .collect();
        let replaced = first.replace_signers(&merged);
        assert_eq!(replaced.version(), CmsVersion::V3);
        assert_eq!(replaced.signer_infos().unwrap().len(), 2);
        let digests: Vec<_> = replaced.digest_algorithms().iter().map(|id| id.oid).collect();
        assert_eq!(digests, [oids::SHA256, oids::SHA384]);
        assert_eq!(first.signer_infos().unwrap().len(), 1);

        let with_cert = replaced.replace_certificates_and_crls(&[cert.clone()], &[]);
        assert_eq!(with_cert.certificates(), vec![cert]);
        let der = with_cert.to_der().unwrap();
        assert_eq!(SignedData::from_ber(&der).unwrap().to_der().unwrap(), der);
        let without = with_cert.replace_certificates_and_crls(&[], &[]);
        assert!(without.certificate_choices().is_empty());
    }

    #[test]
    fn precomputed_signers_are_merged() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let existing = SignedData::from_ber(
            &SignedDataGenerator::new()
                .add_signer(signer)
                .generate(oids::ID_DATA, b"HelloWorld", false, &mut rng)
                .unwrap(),
        )
        .unwrap()
        .signer_infos_detached(b"HelloWorld")
        .unwrap();

        let der = SignedDataGenerator::new()
            .add_signer(ec_signer())
            .add_signers(&existing)
            .generate(oids::ID_DATA, b"HelloWorld", true, &mut rng)
            .unwrap();
        let signed = SignedData::from_ber(&der).unwrap();
        assert_eq!(signed.digest_algorithms().len(), 2);
        let store = signed.signer_infos().unwrap();
        let sid = KeyIdentifier::issuer_and_serial_of(&cert);
        let key = VerifierKey::from_certificate(&cert).unwrap();
        assert!(store.get(&sid).unwrap().verify(&key).unwrap().is_valid());
    }

    #[test]
    fn raw_signature_requires_data() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (_, key) = alice();
        let sid = KeyIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: Name::from_der(&hex!("3000")).unwrap(),
            serial_number: SerialNumber::new(&[1]).unwrap(),
        });
        let signer =
            SignerInfoGenerator::new(sid, key, DigestAlgorithm::Sha256).without_signed_attributes();
        assert!(matches!(
            SignedDataGenerator::new()
                .add_signer(signer)
                .generate(oids::ID_SIGNED_DATA, b"x", true, &mut rng),
            Err(Error::AttributeViolation(_))
        ));
    }

    #[test]
    fn certificate_order_switch() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, _) = alice();
        let generate = |der: bool, rng: &mut ChaCha8Rng| {
            let der = SignedDataGenerator::new()
                .add_other_certificate(other_certificate())
                .add_certificate(&cert)
                .use_der_for_certs(der)
                .generate(oids::ID_DATA, b"", true, rng)
                .unwrap();
            SignedData::from_ber(&der).unwrap()
        };
        let kept = generate(false, &mut rng);
        assert!(matches!(kept.certificate_choices()[0], CertificateChoices::Other(_)));
        // SEQUENCE (0x30) sorts before [3] (0xa3)
        let sorted = generate(true, &mut rng);
        assert!(matches!(sorted.certificate_choices()[0], CertificateChoices::Certificate(_)));
        assert_eq!(sorted.certificates(), vec![cert]);
    }

    #[test]
    fn unsigned_attributes_reach_the_wire() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let (cert, signer) = alice_signer();
        let extra = AttributeTable::new().with(
            attribute(
                ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47"),
                vec![Any::null()],
            )
            .unwrap(),
        );
        let signer = signer.with_unsigned_attributes(SimpleAttributeTable(extra.clone()));
        let der = SignedDataGenerator::new()
            .add_signer(signer)
            .generate(oids::ID_DATA, b"HelloWorld", true, &mut rng)
            .unwrap();
        let store = SignedData::from_ber(&der).unwrap().signer_infos().unwrap();
        let signer = &store.signers()[0];
        assert_eq!(signer.unsigned_attributes(), Some(&extra));
        assert!(signer
            .verify(&VerifierKey::from_certificate(&cert).unwrap())
            .unwrap()
            .is_valid());
    }
}
