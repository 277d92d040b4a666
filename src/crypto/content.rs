//! Content encryption: streaming CBC with PKCS#7 padding, and one-shot AEAD.

use std::fmt;
use std::io::{self, Read};

use aes_gcm::aead::{
    consts::{U12, U16},
    generic_array::{typenum::Unsigned, GenericArray},
    AeadInPlace, KeyInit,
};
use cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyIvInit};
use subtle::{ConstantTimeEq, ConstantTimeLess};

use crate::errors::{Error, Result};
use crate::registry::{ContentEncryption, ContentEncryptionAlgorithm, ContentParameters};

/// One direction of a CBC chain, type-erased over the block cipher.
trait BlockMode: Send {
    fn block_size(&self) -> usize;

    /// `blocks.len()` is a multiple of the block size.
    fn process(&mut self, blocks: &mut [u8]);
}

struct Encrypting<C: BlockEncryptMut + BlockCipher>(cbc::Encryptor<C>);

impl<C: BlockEncryptMut + BlockCipher + Send> BlockMode for Encrypting<C> {
    fn block_size(&self) -> usize {
        C::block_size()
    }

    fn process(&mut self, blocks: &mut [u8]) {
        for block in blocks.chunks_exact_mut(C::block_size()) {
            self.0.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    }
}

struct Decrypting<C: BlockDecryptMut + BlockCipher>(cbc::Decryptor<C>);

impl<C: BlockDecryptMut + BlockCipher + Send> BlockMode for Decrypting<C> {
    fn block_size(&self) -> usize {
        C::block_size()
    }

    fn process(&mut self, blocks: &mut [u8]) {
        for block in blocks.chunks_exact_mut(C::block_size()) {
            self.0.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
    }
}

fn encrypting<C>(key: &[u8], iv: &[u8]) -> Result<Box<dyn BlockMode>>
where
    C: BlockEncryptMut + BlockCipher + KeyInit + Send + 'static,
{
    let mode = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|_| Error::KeyMismatch)?;
    Ok(Box::new(Encrypting(mode)))
}

fn decrypting<C>(key: &[u8], iv: &[u8]) -> Result<Box<dyn BlockMode>>
where
    C: BlockDecryptMut + BlockCipher + KeyInit + Send + 'static,
{
    let mode = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| Error::KeyMismatch)?;
    Ok(Box::new(Decrypting(mode)))
}

fn rc2_cipher(key: &[u8], effective_bits: u16) -> Result<rc2::Rc2> {
    if key.is_empty() || key.len() > 128 || effective_bits == 0 || effective_bits > 1024 {
        return Err(Error::KeyMismatch);
    }
    Ok(rc2::Rc2::new_with_eff_key_len(key, usize::from(effective_bits)))
}

fn cbc_mode(encryption: &ContentEncryption, key: &[u8], encrypt: bool) -> Result<Box<dyn BlockMode>> {
    use ContentEncryptionAlgorithm::*;

    if key.len() != encryption.algorithm.key_size() {
        return Err(Error::KeyMismatch);
    }
    let iv = encryption.iv();
    macro_rules! mode {
        ($cipher:ty) => {
            if encrypt {
                encrypting::<$cipher>(key, iv)
            } else {
                decrypting::<$cipher>(key, iv)
            }
        };
    }
    match (encryption.algorithm, &encryption.parameters) {
        (Aes128Cbc, _) => mode!(aes::Aes128),
        (Aes192Cbc, _) => mode!(aes::Aes192),
        (Aes256Cbc, _) => mode!(aes::Aes256),
        (DesEde3Cbc, _) => mode!(des::TdesEde3),
        (Camellia128Cbc, _) => mode!(camellia::Camellia128),
        (Camellia192Cbc, _) => mode!(camellia::Camellia192),
        (Camellia256Cbc, _) => mode!(camellia::Camellia256),
        (Rc2Cbc, ContentParameters::Rc2 { effective_bits, .. }) => {
            let cipher = rc2_cipher(key, *effective_bits)?;
            if encrypt {
                let mode = cbc::Encryptor::inner_iv_slice_init(cipher, iv)
                    .map_err(|_| Error::Malformed("RC2 IV length"))?;
                Ok(Box::new(Encrypting(mode)))
            } else {
                let mode = cbc::Decryptor::inner_iv_slice_init(cipher, iv)
                    .map_err(|_| Error::Malformed("RC2 IV length"))?;
                Ok(Box::new(Decrypting(mode)))
            }
        }
        (alg, _) => Err(Error::UnsupportedAlgorithm(alg.oid())),
    }
}

/// Streaming CBC encryption with PKCS#7 padding.
pub(crate) struct CbcEncryptor {
    mode: Box<dyn BlockMode>,
    pending: Vec<u8>,
}

impl fmt::Debug for CbcEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbcEncryptor").finish_non_exhaustive()
    }
}

impl CbcEncryptor {
    pub(crate) fn new(encryption: &ContentEncryption, key: &[u8]) -> Result<Self> {
        let mode = cbc_mode(encryption, key, true)?;
        Ok(Self {
            pending: Vec::with_capacity(mode.block_size()),
            mode,
        })
    }

    /// Encrypts every complete block of `pending ‖ input` into `out`.
    pub(crate) fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        let full = self.pending.len() - self.pending.len() % self.mode.block_size();
        if full == 0 {
            return;
        }
        let start = out.len();
        out.extend(self.pending.drain(..full));
        self.mode.process(&mut out[start..]);
    }

    /// Pads and encrypts the final block.
    pub(crate) fn finish(mut self, out: &mut Vec<u8>) {
        let bs = self.mode.block_size();
        let pad = bs - self.pending.len();
        self.pending.resize(bs, pad as u8);
        let start = out.len();
        out.extend_from_slice(&self.pending);
        self.mode.process(&mut out[start..]);
    }
}

/// Streaming CBC decryption; the last block is held back until
/// [`CbcDecryptor::finish`] so the padding can be checked.
pub(crate) struct CbcDecryptor {
    mode: Box<dyn BlockMode>,
    pending: Vec<u8>,
}

impl fmt::Debug for CbcDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CbcDecryptor").finish_non_exhaustive()
    }
}

impl CbcDecryptor {
    pub(crate) fn new(encryption: &ContentEncryption, key: &[u8]) -> Result<Self> {
        let mode = cbc_mode(encryption, key, false)?;
        Ok(Self {
            pending: Vec::with_capacity(2 * mode.block_size()),
            mode,
        })
    }

    pub(crate) fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        let bs = self.mode.block_size();
        if self.pending.len() <= bs {
            return;
        }
        // keep at least one whole block back
        let mut full = self.pending.len() - self.pending.len() % bs;
        if full == self.pending.len() {
            full -= bs;
        }
        let start = out.len();
        out.extend(self.pending.drain(..full));
        self.mode.process(&mut out[start..]);
    }

    /// Decrypts the final block and strips the padding. A bad length or
    /// padding is indistinguishable from a wrong key.
    pub(crate) fn finish(mut self, out: &mut Vec<u8>) -> Result<()> {
        let bs = self.mode.block_size();
        if self.pending.len() != bs {
            return Err(Error::KeyMismatch);
        }
        self.mode.process(&mut self.pending);

        let pad = self.pending[bs - 1];
        let boundary = (bs as u8).wrapping_sub(pad);
        let mut bad = pad.ct_eq(&0) | (bs as u8).ct_lt(&pad);
        for (i, byte) in self.pending.iter().enumerate() {
            let in_pad = !(i as u8).ct_lt(&boundary);
            bad |= in_pad & !byte.ct_eq(&pad);
        }
        if bool::from(bad) {
            return Err(Error::KeyMismatch);
        }
        out.extend_from_slice(&self.pending[..bs - pad as usize]);
        Ok(())
    }
}

/// `io::Read` adapter decrypting a CBC ciphertext stream.
pub(crate) struct DecryptingReader<R> {
    inner: R,
    decryptor: Option<CbcDecryptor>,
    plain: Vec<u8>,
    offset: usize,
}

impl<R: Read> DecryptingReader<R> {
    pub(crate) fn new(inner: R, decryptor: CbcDecryptor) -> Self {
        Self {
            inner,
            decryptor: Some(decryptor),
            plain: Vec::new(),
            offset: 0,
        }
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut chunk = [0u8; 4096];
        while self.offset == self.plain.len() {
            let decryptor = match self.decryptor.as_mut() {
                Some(decryptor) => decryptor,
                None => return Ok(0),
            };
            self.plain.clear();
            self.offset = 0;
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                if let Some(decryptor) = self.decryptor.take() {
                    decryptor.finish(&mut self.plain)?;
                }
            } else {
                decryptor.update(&chunk[..n], &mut self.plain);
            }
        }
        let n = buf.len().min(self.plain.len() - self.offset);
        buf[..n].copy_from_slice(&self.plain[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Encrypts `buffer` in place under an AEAD content cipher and returns the tag.
pub(crate) fn seal(
    encryption: &ContentEncryption,
    key: &[u8],
    aad: &[u8],
    buffer: &mut Vec<u8>,
) -> Result<Vec<u8>> {
    aead(encryption, key, |cipher, nonce| cipher.seal(nonce, aad, buffer))
}

/// Verifies `tag` and decrypts `buffer` in place. Any failure is
/// [`Error::KeyMismatch`].
pub(crate) fn open(
    encryption: &ContentEncryption,
    key: &[u8],
    aad: &[u8],
    buffer: &mut Vec<u8>,
    tag: &[u8],
) -> Result<()> {
    aead(encryption, key, |cipher, nonce| cipher.open(nonce, aad, buffer, tag))
}

/// Object-safe view of an `AeadInPlace` with a 12-byte nonce.
trait DetachedAead {
    fn seal(&self, nonce: &[u8], aad: &[u8], buffer: &mut Vec<u8>) -> Result<Vec<u8>>;
    fn open(&self, nonce: &[u8], aad: &[u8], buffer: &mut Vec<u8>, tag: &[u8]) -> Result<()>;
}

impl<A: AeadInPlace<NonceSize = U12>> DetachedAead for A {
    fn seal(&self, nonce: &[u8], aad: &[u8], buffer: &mut Vec<u8>) -> Result<Vec<u8>> {
        let tag = self
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), aad, buffer)
            .map_err(|_| Error::Builder("content too long for the AEAD cipher"))?;
        Ok(tag.to_vec())
    }

    fn open(&self, nonce: &[u8], aad: &[u8], buffer: &mut Vec<u8>, tag: &[u8]) -> Result<()> {
        if tag.len() != A::TagSize::USIZE {
            return Err(Error::KeyMismatch);
        }
        self.decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            aad,
            buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::KeyMismatch)
    }
}

fn aead<T>(
    encryption: &ContentEncryption,
    key: &[u8],
    f: impl FnOnce(&dyn DetachedAead, &[u8]) -> Result<T>,
) -> Result<T> {
    use ContentEncryptionAlgorithm::*;

    let (nonce, tag_len) = match &encryption.parameters {
        ContentParameters::Aead { nonce, tag_len } => (nonce.as_slice(), *tag_len),
        _ => return Err(Error::UnsupportedAlgorithm(encryption.algorithm.oid())),
    };
    if key.len() != encryption.algorithm.key_size() {
        return Err(Error::KeyMismatch);
    }
    if nonce.len() != 12 {
        return Err(Error::UnsupportedAlgorithm(encryption.algorithm.oid()));
    }
    macro_rules! run {
        ($aead:ty) => {{
            let cipher = <$aead>::new_from_slice(key).map_err(|_| Error::KeyMismatch)?;
            f(&cipher, nonce)
        }};
    }
    type Gcm<C, M> = aes_gcm::AesGcm<C, U12, M>;
    type Ccm<C, M> = ccm::Ccm<C, M, U12>;
    match (encryption.algorithm, tag_len) {
        (Aes128Gcm, 16) => run!(Gcm<aes::Aes128, U16>),
        (Aes192Gcm, 16) => run!(Gcm<aes::Aes192, U16>),
        (Aes256Gcm, 16) => run!(Gcm<aes::Aes256, U16>),
        (Aes128Gcm, 12) => run!(Gcm<aes::Aes128, U12>),
        (Aes192Gcm, 12) => run!(Gcm<aes::Aes192, U12>),
        (Aes256Gcm, 12) => run!(Gcm<aes::Aes256, U12>),
        (Aes128Ccm, 16) => run!(Ccm<aes::Aes128, U16>),
        (Aes192Ccm, 16) => run!(Ccm<aes::Aes192, U16>),
        (Aes256Ccm, 16) => run!(Ccm<aes::Aes256, U16>),
        (Aes128Ccm, 12) => run!(Ccm<aes::Aes128, U12>),
        (Aes192Ccm, 12) => run!(Ccm<aes::Aes192, U12>),
        (Aes256Ccm, 12) => run!(Ccm<aes::Aes256, U12>),
        (alg, _) => Err(Error::UnsupportedAlgorithm(alg.oid())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

    fn aes128_cbc(iv: &[u8]) -> ContentEncryption {
        ContentEncryption {
            algorithm: ContentEncryptionAlgorithm::Aes128Cbc,
            parameters: ContentParameters::Iv(iv.to_vec()),
        }
    }

    #[test]
    fn cbc_matches_sp800_38a() {
        // NIST SP 800-38A F.2.1, first block, plus one block of padding
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex!("000102030405060708090a0b0c0d0e0f");
        let plain = hex!("6bc1bee22e409f96e93d7e117393172a");
        let enc = aes128_cbc(&iv);

        let mut out = Vec::new();
        let mut encryptor = CbcEncryptor::new(&enc, &key).unwrap();
        encryptor.update(&plain[..5], &mut out);
        assert!(out.is_empty());
        encryptor.update(&plain[5..], &mut out);
        encryptor.finish(&mut out);
        assert_eq!(out.len(), 32);
        assert_eq!(out[..16], hex!("7649abac8119b246cee98e9b12e9197d"));

        let mut back = Vec::new();
        let mut decryptor = CbcDecryptor::new(&enc, &key).unwrap();
        for piece in out.chunks(7) {
            decryptor.update(piece, &mut back);
        }
        decryptor.finish(&mut back).unwrap();
        assert_eq!(back, plain);
    }

    #[test]
    fn every_cbc_cipher_round_trips() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for alg in ContentEncryptionAlgorithm::ALL.into_iter().filter(|a| !a.is_aead()) {
            let enc = ContentEncryption::generate(alg, &mut rng);
            let key = vec![0x5a; alg.key_size()];
            for len in [0usize, 1, 8, 17] {
                let plain = vec![0xa5; len];
                let mut ct = Vec::new();
                let mut encryptor = CbcEncryptor::new(&enc, &key).unwrap();
                encryptor.update(&plain, &mut ct);
                encryptor.finish(&mut ct);
                assert_eq!(ct.len() % alg.block_size(), 0);

                let mut reader = DecryptingReader::new(&ct[..], CbcDecryptor::new(&enc, &key).unwrap());
                let mut back = Vec::new();
                reader.read_to_end(&mut back).unwrap();
                assert_eq!(back, plain, "{:?}", alg);
            }
        }
    }

    #[test]
    fn wrong_key_is_key_mismatch() {
        let enc = aes128_cbc(&[0; 16]);
        let mut ct = Vec::new();
        let mut encryptor = CbcEncryptor::new(&enc, &[1; 16]).unwrap();
        encryptor.update(b"attack at dawn", &mut ct);
        encryptor.finish(&mut ct);

        let mut failures = 0;
        for k in 2..40u8 {
            let mut out = Vec::new();
            let mut decryptor = CbcDecryptor::new(&enc, &[k; 16]).unwrap();
            decryptor.update(&ct, &mut out);
            match decryptor.finish(&mut out) {
                Err(Error::KeyMismatch) => failures += 1,
                Err(other) => panic!("unexpected {:?}", other),
                Ok(()) => {}
            }
        }
        // a random final block has valid padding with probability about 1/256
        assert!(failures >= 36);
        assert!(matches!(CbcDecryptor::new(&enc, &[0; 15]), Err(Error::KeyMismatch)));
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let enc = aes128_cbc(&[0; 16]);
        let mut out = Vec::new();
        let mut decryptor = CbcDecryptor::new(&enc, &[1; 16]).unwrap();
        decryptor.update(&[0; 15], &mut out);
        assert!(matches!(decryptor.finish(&mut out), Err(Error::KeyMismatch)));
    }

    #[test]
    fn gcm_matches_known_vector() {
        // McGrew & Viega test case 2 (key and nonce of zeros, one zero block)
        let enc = ContentEncryption {
            algorithm: ContentEncryptionAlgorithm::Aes128Gcm,
            parameters: ContentParameters::Aead {
                nonce: vec![0; 12],
                tag_len: 16,
            },
        };
        let mut buffer = vec![0u8; 16];
        let tag = seal(&enc, &[0; 16], &[], &mut buffer).unwrap();
        assert_eq!(buffer, hex!("0388dace60b6a392f328c2b971b2fe78"));
        assert_eq!(tag, hex!("ab6e47d42cec13bdf53a67b21257bddf"));

        open(&enc, &[0; 16], &[], &mut buffer, &tag).unwrap();
        assert_eq!(buffer, [0u8; 16]);
    }

    #[test]
    fn aead_tampering_is_key_mismatch() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for alg in ContentEncryptionAlgorithm::ALL.into_iter().filter(|a| a.is_aead()) {
            let enc = ContentEncryption::generate(alg, &mut rng);
            let key = vec![3; alg.key_size()];
            let mut buffer = b"HelloWorld".to_vec();
            let tag = seal(&enc, &key, b"attrs", &mut buffer).unwrap();

            let mut copy = buffer.clone();
            assert!(matches!(
                open(&enc, &key, b"other", &mut copy, &tag),
                Err(Error::KeyMismatch)
            ));
            open(&enc, &key, b"attrs", &mut buffer, &tag).unwrap();
            assert_eq!(buffer, b"HelloWorld");
        }
    }
}
