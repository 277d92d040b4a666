//! Key derivation: the ANSI X9.63 KDF for key agreement and PBKDF2 for
//! password recipients.

use zeroize::Zeroizing;

use crate::crypto::Password;
use crate::errors::{Error, Result};
use crate::registry::{DigestAlgorithm, Pbkdf2Parameters, Pbkdf2Prf};

/// ANSI X9.63 KDF (SEC 1 § 3.6.1): concatenates
/// `Hash(Z ‖ counter ‖ SharedInfo)` for a 32-bit big-endian counter starting
/// at 1, truncated to `key_len` bytes.
pub(crate) fn x963_kdf(
    digest: DigestAlgorithm,
    shared_secret: &[u8],
    shared_info: &[u8],
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let max = (u32::MAX as u64) * digest.output_size() as u64;
    if key_len as u64 > max {
        return Err(Error::Builder("X9.63 KDF output too long"));
    }
    let mut hasher = digest.new_hasher();
    let mut out = Zeroizing::new(Vec::with_capacity(key_len + digest.output_size()));
    let mut counter = 1u32;
    while out.len() < key_len {
        hasher.update(shared_secret);
        hasher.update(&counter.to_be_bytes());
        hasher.update(shared_info);
        out.extend_from_slice(&hasher.finalize_reset());
        counter += 1;
    }
    out.truncate(key_len);
    Ok(out)
}

/// PBKDF2 with the PRF named in `params`, producing `key_len` bytes.
pub(crate) fn pbkdf2(
    password: &Password,
    params: &Pbkdf2Parameters,
    key_len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; key_len]);
    let (pw, salt, rounds) = (password.as_bytes(), params.salt.as_slice(), params.iterations);
    match params.prf {
        Pbkdf2Prf::HmacSha1 => pbkdf2::pbkdf2_hmac::<sha1::Sha1>(pw, salt, rounds, &mut out),
        Pbkdf2Prf::HmacSha224 => pbkdf2::pbkdf2_hmac::<sha2::Sha224>(pw, salt, rounds, &mut out),
        Pbkdf2Prf::HmacSha256 => pbkdf2::pbkdf2_hmac::<sha2::Sha256>(pw, salt, rounds, &mut out),
        Pbkdf2Prf::HmacSha384 => pbkdf2::pbkdf2_hmac::<sha2::Sha384>(pw, salt, rounds, &mut out),
        Pbkdf2Prf::HmacSha512 => pbkdf2::pbkdf2_hmac::<sha2::Sha512>(pw, salt, rounds, &mut out),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn x963_sha256_vector() {
        // NIST CAVS ANSI X9.63 KDF, SHA-256, first test of the 128-bit section
        let z = hex!("96c05619d56c328ab95fe84b18264b08725b85e33fd34f08");
        let out = x963_kdf(DigestAlgorithm::Sha256, &z, &[], 16).unwrap();
        assert_eq!(out.as_slice(), hex!("443024c3dae66b95e6f5670601558f71"));
    }

    #[test]
    fn x963_spans_counter_blocks() {
        let long = x963_kdf(DigestAlgorithm::Sha1, b"z", b"info", 50).unwrap();
        let short = x963_kdf(DigestAlgorithm::Sha1, b"z", b"info", 20).unwrap();
        assert_eq!(long.len(), 50);
        assert_eq!(&long[..20], short.as_slice());
        let mut first = b"z".to_vec();
        first.extend_from_slice(&[0, 0, 0, 1]);
        first.extend_from_slice(b"info");
        assert_eq!(short.as_slice(), DigestAlgorithm::Sha1.digest(&first));
    }

    #[test]
    fn pbkdf2_rfc6070() {
        // RFC 6070 test vector 2
        let params = Pbkdf2Parameters {
            salt: b"salt".to_vec(),
            iterations: 2,
            key_length: None,
            prf: Pbkdf2Prf::HmacSha1,
        };
        let out = pbkdf2(&Password::from("password"), &params, 20);
        assert_eq!(out.as_slice(), hex!("ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957"));
    }
}
