//! Key wrap algorithms: RFC 3394 (AES, and Camellia per RFC 3657),
//! RFC 3217 Triple-DES key wrap and the RFC 3211 password-recipient wrap.
//!
//! Every integrity failure on unwrap is reported as [`Error::KeyMismatch`]
//! and compared in constant time.

use cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, BlockSizeUser, KeyInit};
use rand_core::CryptoRngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};
use crate::registry::{oids, CipherFamily, DigestAlgorithm, KeyWrapAlgorithm};

/// Single-block (ECB) access to a block cipher.
pub(crate) trait RawBlockCipher {
    fn block_size(&self) -> usize;
    fn encrypt_block(&self, block: &mut [u8]);
    fn decrypt_block(&self, block: &mut [u8]);
}

impl<C: BlockEncrypt + BlockDecrypt> RawBlockCipher for C {
    fn block_size(&self) -> usize {
        <C as BlockSizeUser>::block_size()
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        BlockEncrypt::encrypt_block(self, GenericArray::from_mut_slice(block));
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        BlockDecrypt::decrypt_block(self, GenericArray::from_mut_slice(block));
    }
}

/// Instantiates a block cipher of `family` from `key`. A key length the
/// family does not accept is [`Error::KeyMismatch`].
pub(crate) fn block_cipher(family: CipherFamily, key: &[u8]) -> Result<Box<dyn RawBlockCipher>> {
    fn boxed<C: BlockEncrypt + BlockDecrypt + KeyInit + 'static>(
        key: &[u8],
    ) -> Result<Box<dyn RawBlockCipher>> {
        Ok(Box::new(C::new_from_slice(key).map_err(|_| Error::KeyMismatch)?))
    }

    match (family, key.len()) {
        (CipherFamily::Aes, 16) => boxed::<aes::Aes128>(key),
        (CipherFamily::Aes, 24) => boxed::<aes::Aes192>(key),
        (CipherFamily::Aes, 32) => boxed::<aes::Aes256>(key),
        (CipherFamily::Camellia, 16) => boxed::<camellia::Camellia128>(key),
        (CipherFamily::Camellia, 24) => boxed::<camellia::Camellia192>(key),
        (CipherFamily::Camellia, 32) => boxed::<camellia::Camellia256>(key),
        (CipherFamily::DesEde3, 24) => boxed::<des::TdesEde3>(key),
        (CipherFamily::Seed, _) => Err(Error::UnsupportedAlgorithm(oids::SEED_WRAP)),
        (CipherFamily::Rc2, _) => Err(Error::UnsupportedAlgorithm(oids::RC2_CBC)),
        _ => Err(Error::KeyMismatch),
    }
}

fn cbc_encrypt(cipher: &dyn RawBlockCipher, iv: &mut [u8], data: &mut [u8]) {
    let bs = cipher.block_size();
    for block in data.chunks_exact_mut(bs) {
        block.iter_mut().zip(iv.iter()).for_each(|(b, v)| *b ^= v);
        cipher.encrypt_block(block);
        iv.copy_from_slice(block);
    }
}

fn cbc_decrypt(cipher: &dyn RawBlockCipher, iv: &mut [u8], data: &mut [u8]) {
    let bs = cipher.block_size();
    let mut next = vec![0u8; bs];
    for block in data.chunks_exact_mut(bs) {
        next.copy_from_slice(block);
        cipher.decrypt_block(block);
        block.iter_mut().zip(iv.iter()).for_each(|(b, v)| *b ^= v);
        iv.copy_from_slice(&next);
    }
}

/// Wraps `key` under `kek` with `algorithm`.
pub(crate) fn wrap(
    algorithm: KeyWrapAlgorithm,
    kek: &[u8],
    key: &[u8],
    rng: &mut dyn CryptoRngCore,
) -> Result<Vec<u8>> {
    if kek.len() != algorithm.key_size() {
        return Err(Error::KeyMismatch);
    }
    let cipher = block_cipher(algorithm.family(), kek)?;
    match algorithm.family() {
        CipherFamily::DesEde3 => des3_wrap(cipher.as_ref(), key, rng),
        _ => rfc3394_wrap(cipher.as_ref(), key),
    }
}

/// Inverse of [`wrap`].
pub(crate) fn unwrap(
    algorithm: KeyWrapAlgorithm,
    kek: &[u8],
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if kek.len() != algorithm.key_size() {
        return Err(Error::KeyMismatch);
    }
    let cipher = block_cipher(algorithm.family(), kek)?;
    match algorithm.family() {
        CipherFamily::DesEde3 => des3_unwrap(cipher.as_ref(), wrapped),
        _ => rfc3394_unwrap(cipher.as_ref(), wrapped),
    }
}

const RFC3394_IV: [u8; 8] = [0xa6; 8];

fn rfc3394_wrap(cipher: &dyn RawBlockCipher, key: &[u8]) -> Result<Vec<u8>> {
    if cipher.block_size() != 16 || key.len() % 8 != 0 || key.len() < 16 {
        return Err(Error::Builder("RFC 3394 wraps whole 64-bit blocks of at least 128 bits"));
    }
    let n = key.len() / 8;
    let mut out = Vec::with_capacity(key.len() + 8);
    out.extend_from_slice(&RFC3394_IV);
    out.extend_from_slice(key);

    let mut block = [0u8; 16];
    for j in 0..6 {
        for i in 1..=n {
            block[..8].copy_from_slice(&out[..8]);
            block[8..].copy_from_slice(&out[8 * i..8 * i + 8]);
            cipher.encrypt_block(&mut block);
            let t = (n * j + i) as u64;
            out[..8].copy_from_slice(&block[..8]);
            out[..8]
                .iter_mut()
                .zip(t.to_be_bytes())
                .for_each(|(a, t)| *a ^= t);
            out[8 * i..8 * i + 8].copy_from_slice(&block[8..]);
        }
    }
    Ok(out)
}

fn rfc3394_unwrap(cipher: &dyn RawBlockCipher, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if cipher.block_size() != 16 || wrapped.len() % 8 != 0 || wrapped.len() < 24 {
        return Err(Error::KeyMismatch);
    }
    let n = wrapped.len() / 8 - 1;
    let mut a = [0u8; 8];
    a.copy_from_slice(&wrapped[..8]);
    let mut r = Zeroizing::new(wrapped[8..].to_vec());

    let mut block = Zeroizing::new([0u8; 16]);
    for j in (0..6).rev() {
        for i in (1..=n).rev() {
            let t = (n * j + i) as u64;
            a.iter_mut().zip(t.to_be_bytes()).for_each(|(a, t)| *a ^= t);
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(&r[8 * (i - 1)..8 * i]);
            cipher.decrypt_block(&mut block[..]);
            a.copy_from_slice(&block[..8]);
            r[8 * (i - 1)..8 * i].copy_from_slice(&block[8..]);
        }
    }
    if !bool::from(a[..].ct_eq(&RFC3394_IV[..])) {
        return Err(Error::KeyMismatch);
    }
    Ok(r)
}

const RFC3217_IV: [u8; 8] = [0x4a, 0xdd, 0xa2, 0x2c, 0x79, 0xe8, 0x21, 0x05];

/// RFC 3217 wrap. Triple-DES content keys arrive with their parity already
/// set; other keys of whole 64-bit blocks are wrapped the same way.
fn des3_wrap(cipher: &dyn RawBlockCipher, key: &[u8], rng: &mut dyn CryptoRngCore) -> Result<Vec<u8>> {
    if key.is_empty() || key.len() % 8 != 0 {
        return Err(Error::Builder("Triple-DES key wrap takes whole 64-bit blocks"));
    }
    let icv = DigestAlgorithm::Sha1.digest(key);

    let mut iv = [0u8; 8];
    rng.fill_bytes(&mut iv);
    let mut temp = Vec::with_capacity(key.len() + 16);
    temp.extend_from_slice(&iv);
    temp.extend_from_slice(key);
    temp.extend_from_slice(&icv[..8]);
    cbc_encrypt(cipher, &mut iv, &mut temp[8..]);

    temp.reverse();
    cbc_encrypt(cipher, &mut RFC3217_IV.clone(), &mut temp);
    Ok(temp)
}

fn des3_unwrap(cipher: &dyn RawBlockCipher, wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(Error::KeyMismatch);
    }
    let mut temp = Zeroizing::new(wrapped.to_vec());
    cbc_decrypt(cipher, &mut RFC3217_IV.clone(), &mut temp);
    temp.reverse();

    let mut iv = [0u8; 8];
    iv.copy_from_slice(&temp[..8]);
    let cek_icv = &mut temp[8..];
    cbc_decrypt(cipher, &mut iv, cek_icv);

    let (cek, received) = cek_icv.split_at(cek_icv.len() - 8);
    let icv = DigestAlgorithm::Sha1.digest(cek);
    if !bool::from(icv[..8].ct_eq(received)) {
        return Err(Error::KeyMismatch);
    }
    Ok(Zeroizing::new(cek.to_vec()))
}

/// RFC 3211 wrap of `key` under a CBC block cipher keyed by the derived KEK.
pub(crate) fn pwri_wrap(
    cipher: &dyn RawBlockCipher,
    iv: &[u8],
    key: &[u8],
    rng: &mut dyn CryptoRngCore,
) -> Result<Vec<u8>> {
    let bs = cipher.block_size();
    if key.len() < 3 || key.len() > 255 {
        return Err(Error::Builder("password wrap takes a key of 3 to 255 bytes"));
    }
    let len = ((4 + key.len() + bs - 1) / bs * bs).max(2 * bs);

    let mut out = Vec::with_capacity(len);
    out.push(key.len() as u8);
    out.extend(key[..3].iter().map(|b| !b));
    out.extend_from_slice(key);
    let fill = out.len();
    out.resize(len, 0);
    rng.fill_bytes(&mut out[fill..]);

    let mut chain = iv.to_vec();
    cbc_encrypt(cipher, &mut chain, &mut out);
    cbc_encrypt(cipher, &mut chain, &mut out);
    Ok(out)
}

/// Inverse of [`pwri_wrap`]. A wrong password fails the check bytes and
/// yields [`Error::KeyMismatch`].
pub(crate) fn pwri_unwrap(
    cipher: &dyn RawBlockCipher,
    iv: &[u8],
    wrapped: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let bs = cipher.block_size();
    let len = wrapped.len();
    if len < 2 * bs || len % bs != 0 || iv.len() != bs {
        return Err(Error::KeyMismatch);
    }
    let mut tmp = Zeroizing::new(wrapped.to_vec());

    // last block, chained from the one before it
    let mut chain = wrapped[len - 2 * bs..len - bs].to_vec();
    cbc_decrypt(cipher, &mut chain, &mut tmp[len - bs..]);
    // remaining blocks, chained from the recovered last block
    let mut chain = tmp[len - bs..].to_vec();
    cbc_decrypt(cipher, &mut chain, &mut tmp[..len - bs]);
    // inner layer
    let mut chain = iv.to_vec();
    cbc_decrypt(cipher, &mut chain, &mut tmp);

    let key_len = usize::from(tmp[0]);
    let mut check = 0u8;
    for i in 0..3 {
        check |= tmp[1 + i] ^ tmp[4 + i] ^ 0xff;
    }
    let fits = key_len >= 3 && key_len + 4 <= len;
    if !bool::from(check.ct_eq(&0)) || !fits {
        return Err(Error::KeyMismatch);
    }
    Ok(Zeroizing::new(tmp[4..4 + key_len].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

    #[test]
    fn rfc3394_vector() {
        // RFC 3394 § 4.1
        let kek = hex!("000102030405060708090A0B0C0D0E0F");
        let key = hex!("00112233445566778899AABBCCDDEEFF");
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let wrapped = wrap(KeyWrapAlgorithm::Aes128, &kek, &key, &mut rng).unwrap();
        assert_eq!(wrapped, hex!("1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5"));
        assert_eq!(
            unwrap(KeyWrapAlgorithm::Aes128, &kek, &wrapped).unwrap().as_slice(),
            key
        );
    }

    #[test]
    fn rfc3394_256_bit_kek_vector() {
        // RFC 3394 § 4.6
        let kek = hex!("000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F");
        let key = hex!("00112233445566778899AABBCCDDEEFF000102030405060708090A0B0C0D0E0F");
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let wrapped = wrap(KeyWrapAlgorithm::Aes256, &kek, &key, &mut rng).unwrap();
        assert_eq!(
            wrapped,
            hex!("28C9F404C4B810F4CBCCB35CFB87F8263F5786E2D80ED326CBC7F0E71A99F43BFB988B9B7A02DD21")
        );
    }

    #[test]
    fn tampered_wrap_is_key_mismatch() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for alg in KeyWrapAlgorithm::ALL {
            let kek = vec![7u8; alg.key_size()];
            let key = [0x3cu8; 24];
            let mut wrapped = wrap(alg, &kek, &key, &mut rng).unwrap();
            assert_eq!(unwrap(alg, &kek, &wrapped).unwrap().as_slice(), key);
            wrapped[3] ^= 1;
            assert!(matches!(unwrap(alg, &kek, &wrapped), Err(Error::KeyMismatch)), "{:?}", alg);
            let other = vec![8u8; alg.key_size()];
            wrapped[3] ^= 1;
            assert!(matches!(unwrap(alg, &other, &wrapped), Err(Error::KeyMismatch)), "{:?}", alg);
        }
    }

    #[test]
    fn des3_wrap_takes_whole_blocks() {
        let kek = hex!("255e0d1c07b646dfb3134cc843ba8aa71f025b7c0838251f");
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        for len in [16usize, 24, 32] {
            let key = vec![0x5du8; len];
            let wrapped = wrap(KeyWrapAlgorithm::DesEde3, &kek, &key, &mut rng).unwrap();
            assert_eq!(wrapped.len(), len + 16);
            assert_eq!(
                unwrap(KeyWrapAlgorithm::DesEde3, &kek, &wrapped).unwrap().as_slice(),
                key
            );
        }
        assert!(wrap(KeyWrapAlgorithm::DesEde3, &kek, &[1; 12], &mut rng).is_err());
    }

    #[test]
    fn pwri_round_trip_and_wrong_key() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let kek = block_cipher(CipherFamily::Aes, &[1; 16]).unwrap();
        let iv = [9u8; 16];
        for len in [16usize, 24, 32] {
            let key = vec![0x42; len];
            let wrapped = pwri_wrap(kek.as_ref(), &iv, &key, &mut rng).unwrap();
            assert_eq!(wrapped.len() % 16, 0);
            assert!(wrapped.len() >= 32);
            assert_eq!(pwri_unwrap(kek.as_ref(), &iv, &wrapped).unwrap().as_slice(), key);
        }

        let wrapped = pwri_wrap(kek.as_ref(), &iv, &[0x42; 16], &mut rng).unwrap();
        let mut failures = 0;
        for k in 2..34u8 {
            let wrong = block_cipher(CipherFamily::Aes, &[k; 16]).unwrap();
            if matches!(pwri_unwrap(wrong.as_ref(), &iv, &wrapped), Err(Error::KeyMismatch)) {
                failures += 1;
            }
        }
        // three check bytes: a false accept has probability 2^-24 per key
        assert_eq!(failures, 32);
    }

    #[test]
    fn seed_has_no_handler() {
        assert!(matches!(
            block_cipher(CipherFamily::Seed, &[0; 16]),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}
