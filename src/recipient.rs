//! Recipient key management.
//!
//! Each key-establishment protocol has a generator that wraps the content
//! encryption key for one recipient (or, for key agreement, one group of
//! recipients) and a recovery path that unwraps it again. Both meet in
//! [`RecipientInfo`], the `cms` choice with one case per protocol.
//!
//! Recovery only ever yields a [`ContentKey`] checked against the length the
//! content cipher expects; every failure to unwrap, whatever its cause, is
//! [`Error::KeyMismatch`].

mod kek;
mod key_agree;
mod key_trans;
mod password;

pub use cms::enveloped_data::{
    KekIdentifier, KekRecipientInfo, KeyAgreeRecipientInfo, KeyTransRecipientInfo,
    OriginatorIdentifierOrKey, OtherRecipientInfo, PasswordRecipientInfo, RecipientEncryptedKey,
    RecipientInfo, RecipientInfos,
};

pub use self::{
    kek::KekRecipient, key_agree::KeyAgreeRecipients, key_trans::KeyTransRecipient,
    password::PasswordRecipient,
};

use std::io::Read;

use rand_core::CryptoRngCore;
use rsa::RsaPrivateKey;
use tracing::debug;

use crate::asn1::{BerReader, Header, Tag};
use crate::content_info::{CmsVersion, KeyIdentifier};
use crate::crypto::{AgreementPrivateKey, ContentKey, Password};
use crate::errors::{Error, Result};
use crate::registry::ContentEncryptionAlgorithm;

/// Syntax version of one entry; `OtherRecipientInfo` has none and counts
/// as 0.
pub fn version(info: &RecipientInfo) -> CmsVersion {
    match info {
        RecipientInfo::Ktri(ktri) => ktri.version,
        RecipientInfo::Kari(kari) => kari.version,
        RecipientInfo::Kekri(kekri) => kekri.version,
        RecipientInfo::Pwri(pwri) => pwri.version,
        RecipientInfo::Ori(_) => CmsVersion::V0,
    }
}

/// Short protocol name, for logs.
pub fn kind(info: &RecipientInfo) -> &'static str {
    match info {
        RecipientInfo::Ktri(_) => "ktri",
        RecipientInfo::Kari(_) => "kari",
        RecipientInfo::Kekri(_) => "kekri",
        RecipientInfo::Pwri(_) => "pwri",
        RecipientInfo::Ori(_) => "ori",
    }
}

/// Rejects entries whose version contradicts their form (RFC 5652 § 6.2).
fn check_version(info: &RecipientInfo) -> Result<()> {
    let expected = match info {
        RecipientInfo::Ktri(ktri) => match ktri.rid {
            cms::enveloped_data::RecipientIdentifier::IssuerAndSerialNumber(_) => CmsVersion::V0,
            cms::enveloped_data::RecipientIdentifier::SubjectKeyIdentifier(_) => CmsVersion::V2,
        },
        RecipientInfo::Kari(_) => CmsVersion::V3,
        RecipientInfo::Kekri(_) => CmsVersion::V4,
        RecipientInfo::Pwri(_) => CmsVersion::V0,
        RecipientInfo::Ori(_) => return Ok(()),
    };
    if version(info) != expected {
        return Err(Error::Malformed("RecipientInfo version does not match its form"));
    }
    Ok(())
}

/// Decodes the `SET OF RecipientInfo` whose header has just been read,
/// keeping the encoded order.
pub(crate) fn read_recipient_infos<R: Read>(
    reader: &mut BerReader<R>,
    header: Header,
) -> Result<Vec<RecipientInfo>> {
    if !header.is(Tag::Set) {
        return Err(Error::Malformed("recipientInfos must be a set"));
    }
    let infos: Vec<RecipientInfo> = reader.read_members(header)?;
    if infos.is_empty() {
        return Err(Error::Malformed("recipientInfos must not be empty"));
    }
    infos.iter().try_for_each(check_version)?;
    Ok(infos)
}

/// `SET OF RecipientInfo` in DER order.
pub(crate) fn to_recipient_infos(infos: &[RecipientInfo]) -> Result<RecipientInfos> {
    Ok(RecipientInfos::try_from(infos.to_vec())?)
}

/// Selects one recoverable entry of an envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecipientId {
    /// Key transport recipient.
    KeyTrans(KeyIdentifier),
    /// One recipient of a key agreement entry.
    KeyAgree(KeyIdentifier),
    /// KEK recipient, by key identifier.
    Kek(Vec<u8>),
    /// Password recipient.
    Password,
}

/// Private or secret material able to recover a content key.
#[derive(Clone, Copy, Debug)]
pub enum RecipientKey<'a> {
    /// RSA private key for key transport.
    Rsa(&'a RsaPrivateKey),
    /// Key-encryption key for KEK entries, or an already derived KEK for
    /// password entries.
    Kek(&'a [u8]),
    /// Password for password entries.
    Password(&'a Password),
    /// Static private key for key agreement.
    Agreement(&'a AgreementPrivateKey),
}

impl<'a> From<&'a RsaPrivateKey> for RecipientKey<'a> {
    fn from(key: &'a RsaPrivateKey) -> Self {
        RecipientKey::Rsa(key)
    }
}

impl<'a> From<&'a Password> for RecipientKey<'a> {
    fn from(password: &'a Password) -> Self {
        RecipientKey::Password(password)
    }
}

impl<'a> From<&'a AgreementPrivateKey> for RecipientKey<'a> {
    fn from(key: &'a AgreementPrivateKey) -> Self {
        RecipientKey::Agreement(key)
    }
}

/// One recoverable entry of a parsed envelope.
#[derive(Clone, Debug)]
pub struct RecipientInformation {
    id: RecipientId,
    info: RecipientInfo,
    // position within a key agreement entry's encrypted keys
    index: usize,
    content_cipher: ContentEncryptionAlgorithm,
}

impl RecipientInformation {
    /// Selector of this entry.
    pub fn id(&self) -> &RecipientId {
        &self.id
    }

    /// The `RecipientInfo` this entry belongs to.
    pub fn info(&self) -> &RecipientInfo {
        &self.info
    }

    /// Unwraps the content key with `key`. `rng` blinds RSA decryption.
    ///
    /// A key of the wrong kind, a failed unwrap and an unwrapped key of the
    /// wrong length for the content cipher are all [`Error::KeyMismatch`].
    pub fn recover_key<R: CryptoRngCore>(&self, key: &RecipientKey<'_>, rng: &mut R) -> Result<ContentKey> {
        self.recover_key_dyn(key, rng)
    }

    pub(crate) fn recover_key_dyn(
        &self,
        key: &RecipientKey<'_>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<ContentKey> {
        debug!(kind = kind(&self.info), id = ?self.id, "recovering content key");
        let mut raw = match (&self.info, key) {
            (RecipientInfo::Ktri(info), RecipientKey::Rsa(key)) => key_trans::recover(info, key, rng)?,
            (RecipientInfo::Kari(info), RecipientKey::Agreement(key)) => {
                key_agree::recover(info, self.index, key)?
            }
            (RecipientInfo::Kekri(info), RecipientKey::Kek(kek)) => kek::recover(info, kek)?,
            (RecipientInfo::Pwri(info), RecipientKey::Password(password)) => {
                password::recover(info, password)?
            }
            (RecipientInfo::Pwri(info), RecipientKey::Kek(kek)) => password::recover_with_kek(info, kek)?,
            (RecipientInfo::Ori(_), _) => {
                return Err(Error::Malformed("other recipient info cannot be recovered"))
            }
            _ => return Err(Error::KeyMismatch),
        };
        if raw.len() != self.content_cipher.key_size() {
            debug!(len = raw.len(), "unwrapped key has the wrong length");
            return Err(Error::KeyMismatch);
        }
        Ok(ContentKey::from_bytes(core::mem::take(&mut *raw)))
    }
}

/// The recoverable entries of an envelope, in encoded order.
#[derive(Clone, Debug, Default)]
pub struct RecipientInformationStore {
    recipients: Vec<RecipientInformation>,
}

impl RecipientInformationStore {
    pub(crate) fn new(infos: &[RecipientInfo], content_cipher: ContentEncryptionAlgorithm) -> Self {
        let mut recipients = Vec::with_capacity(infos.len());
        for info in infos {
            let entry = |id, index| RecipientInformation {
                id,
                info: info.clone(),
                index,
                content_cipher,
            };
            match info {
                RecipientInfo::Ktri(ktri) => {
                    recipients.push(entry(RecipientId::KeyTrans(KeyIdentifier::from(&ktri.rid)), 0))
                }
                RecipientInfo::Kari(kari) => {
                    for (index, rek) in kari.recipient_enc_keys.iter().enumerate() {
                        recipients.push(entry(RecipientId::KeyAgree(KeyIdentifier::from(&rek.rid)), index));
                    }
                }
                RecipientInfo::Kekri(kekri) => recipients.push(entry(
                    RecipientId::Kek(kekri.kek_id.kek_identifier.as_bytes().to_vec()),
                    0,
                )),
                RecipientInfo::Pwri(_) => recipients.push(entry(RecipientId::Password, 0)),
                RecipientInfo::Ori(_) => {}
            }
        }
        Self { recipients }
    }

    /// Every entry.
    pub fn recipients(&self) -> &[RecipientInformation] {
        &self.recipients
    }

    /// First entry selected by `id`.
    pub fn get(&self, id: &RecipientId) -> Option<&RecipientInformation> {
        self.recipients.iter().find(|r| r.id == *id)
    }

    /// Every entry selected by `id`.
    pub fn get_all<'a>(&'a self, id: &RecipientId) -> impl Iterator<Item = &'a RecipientInformation> + 'a {
        let id = id.clone();
        self.recipients.iter().filter(move |r| r.id == id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    /// `true` when no entry is recoverable.
    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Recovers the content key through the first entry selected by `id`.
    pub fn recover_key<R: CryptoRngCore>(
        &self,
        id: &RecipientId,
        key: &RecipientKey<'_>,
        rng: &mut R,
    ) -> Result<ContentKey> {
        self.recover_key_dyn(id, key, rng)
    }

    pub(crate) fn recover_key_dyn(
        &self,
        id: &RecipientId,
        key: &RecipientKey<'_>,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<ContentKey> {
        self.get(id).ok_or(Error::KeyMismatch)?.recover_key_dyn(key, rng)
    }
}

/// A configured recipient, ready to wrap content keys.
#[derive(Debug)]
pub enum RecipientInfoGenerator {
    /// Key transport recipient.
    KeyTrans(KeyTransRecipient),
    /// Key agreement recipients sharing one originator key.
    KeyAgree(KeyAgreeRecipients),
    /// KEK recipient.
    Kek(KekRecipient),
    /// Password recipient.
    Password(PasswordRecipient),
}

impl RecipientInfoGenerator {
    /// Wraps `cek` for this recipient.
    pub fn generate<R: CryptoRngCore>(&self, cek: &ContentKey, rng: &mut R) -> Result<RecipientInfo> {
        self.generate_dyn(cek, rng)
    }

    pub(crate) fn generate_dyn(
        &self,
        cek: &ContentKey,
        rng: &mut dyn CryptoRngCore,
    ) -> Result<RecipientInfo> {
        let info = match self {
            RecipientInfoGenerator::KeyTrans(r) => RecipientInfo::Ktri(r.generate(cek, rng)?),
            RecipientInfoGenerator::KeyAgree(r) => RecipientInfo::Kari(r.generate(cek, rng)?),
            RecipientInfoGenerator::Kek(r) => RecipientInfo::Kekri(r.generate(cek, rng)?),
            RecipientInfoGenerator::Password(r) => RecipientInfo::Pwri(r.generate(cek, rng)?),
        };
        debug!(kind = kind(&info), version = ?version(&info), "generated recipient info");
        Ok(info)
    }
}

impl From<KeyTransRecipient> for RecipientInfoGenerator {
    fn from(recipient: KeyTransRecipient) -> Self {
        RecipientInfoGenerator::KeyTrans(recipient)
    }
}

impl From<KeyAgreeRecipients> for RecipientInfoGenerator {
    fn from(recipients: KeyAgreeRecipients) -> Self {
        RecipientInfoGenerator::KeyAgree(recipients)
    }
}

impl From<KekRecipient> for RecipientInfoGenerator {
    fn from(recipient: KekRecipient) -> Self {
        RecipientInfoGenerator::Kek(recipient)
    }
}

impl From<PasswordRecipient> for RecipientInfoGenerator {
    fn from(recipient: PasswordRecipient) -> Self {
        RecipientInfoGenerator::Password(recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{oids, CipherFamily, ContentEncryptionAlgorithm as Cea};
    use der::{Any, Decode, Encode};
    use hex_literal::hex;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

    #[test]
    fn store_selects_by_id_and_checks_kind() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let cek = ContentKey::generate(16, &mut rng);
        let a = KekRecipient::new(b"a".to_vec(), CipherFamily::Aes, &[1; 16]).unwrap();
        let b = KekRecipient::new(b"b".to_vec(), CipherFamily::Aes, &[2; 32]).unwrap();
        let infos = [
            RecipientInfoGenerator::from(a).generate(&cek, &mut rng).unwrap(),
            RecipientInfoGenerator::from(b).generate(&cek, &mut rng).unwrap(),
        ];
        let store = RecipientInformationStore::new(&infos, Cea::Aes128Cbc);
        assert_eq!(store.len(), 2);

        let b_id = RecipientId::Kek(b"b".to_vec());
        let recovered = store.recover_key(&b_id, &RecipientKey::Kek(&[2; 32]), &mut rng).unwrap();
        assert_eq!(recovered.as_bytes(), cek.as_bytes());

        let password = Password::from("pw");
        assert!(matches!(
            store.recover_key(&b_id, &RecipientKey::Password(&password), &mut rng),
            Err(Error::KeyMismatch)
        ));
        // b's key against a's entry
        assert!(matches!(
            store.recover_key(&RecipientId::Kek(b"a".to_vec()), &RecipientKey::Kek(&[2; 16]), &mut rng),
            Err(Error::KeyMismatch)
        ));
        assert!(store.get(&RecipientId::Password).is_none());
        assert_eq!(store.get_all(&b_id).count(), 1);
    }

    #[test]
    fn wrong_content_key_length_is_key_mismatch() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let cek = ContentKey::generate(16, &mut rng);
        let kek = KekRecipient::new(b"k".to_vec(), CipherFamily::Aes, &[7; 16]).unwrap();
        let info = RecipientInfoGenerator::from(kek).generate(&cek, &mut rng).unwrap();
        let store = RecipientInformationStore::new(&[info], Cea::Aes256Cbc);
        assert!(matches!(
            store.recover_key(&RecipientId::Kek(b"k".to_vec()), &RecipientKey::Kek(&[7; 16]), &mut rng),
            Err(Error::KeyMismatch)
        ));
    }

    #[test]
    fn other_recipient_info_round_trips() {
        let info = RecipientInfo::Ori(OtherRecipientInfo {
            ori_type: oids::ID_DATA,
            ori_value: Any::null(),
        });
        let der = info.to_der().unwrap();
        assert_eq!(der, hex!("a40d 06092a864886f70d010701 0500"));
        assert_eq!(RecipientInfo::from_der(&der).unwrap(), info);
        assert_eq!(version(&info), CmsVersion::V0);
        assert!(RecipientInformationStore::new(&[info], Cea::Aes128Cbc).is_empty());
    }

    #[test]
    fn set_members_keep_order_and_versions_are_checked() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let cek = ContentKey::generate(16, &mut rng);
        let infos: Vec<_> = [b"z", b"a"]
            .into_iter()
            .map(|id| {
                let kek = KekRecipient::new(id.to_vec(), CipherFamily::Aes, &[1; 16]).unwrap();
                RecipientInfoGenerator::from(kek).generate(&cek, &mut rng).unwrap()
            })
            .collect();

        let mut ber = vec![0x31, 0x80];
        for info in &infos {
            ber.extend(info.to_der().unwrap());
        }
        ber.extend([0, 0]);
        let mut reader = BerReader::new(&ber[..]);
        let header = reader.read_header().unwrap();
        assert_eq!(read_recipient_infos(&mut reader, header).unwrap(), infos);

        let RecipientInfo::Kekri(mut kekri) = infos[0].clone() else {
            unreachable!()
        };
        kekri.version = CmsVersion::V0;
        let set = to_recipient_infos(&[RecipientInfo::Kekri(kekri)]).unwrap().to_der().unwrap();
        let mut reader = BerReader::new(&set[..]);
        let header = reader.read_header().unwrap();
        assert!(matches!(
            read_recipient_infos(&mut reader, header),
            Err(Error::Malformed(_))
        ));

        let empty = hex!("3100");
        let mut reader = BerReader::new(&empty[..]);
        let header = reader.read_header().unwrap();
        assert!(read_recipient_infos(&mut reader, header).is_err());
    }
}
