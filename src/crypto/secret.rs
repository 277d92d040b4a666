use core::fmt;

use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

/// Content-encryption key.
///
/// Zeroed when dropped or [released](ContentKey::release).
#[derive(Clone)]
pub struct ContentKey(Zeroizing<Vec<u8>>);

impl ContentKey {
    /// Random key of `len` bytes.
    pub fn generate<R: CryptoRngCore + ?Sized>(len: usize, rng: &mut R) -> Self {
        let mut key = Zeroizing::new(vec![0u8; len]);
        rng.fill_bytes(&mut key);
        Self(key)
    }

    /// Sets odd parity on every byte, as DES keys require.
    pub(crate) fn set_odd_parity(&mut self) {
        for b in self.0.iter_mut() {
            let high = *b & 0xfe;
            *b = high | u8::from(high.count_ones() % 2 == 0);
        }
    }

    /// Takes ownership of existing key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` for a zero-length key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zeroes the key now rather than at the end of scope.
    pub fn release(self) {
        drop(self)
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKey")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

/// Password for [`PasswordRecipient`](crate::recipient::PasswordRecipient)s.
#[derive(Clone)]
pub struct Password(Zeroizing<Vec<u8>>);

impl Password {
    /// Password from raw octets (RFC 8018 leaves the encoding to the caller;
    /// UTF-8 is conventional).
    pub fn new(password: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(password.as_ref().to_vec()))
    }

    /// Password octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Zeroes the password now.
    pub fn release(self) {
        drop(self)
    }
}

impl From<&str> for Password {
    fn from(password: &str) -> Self {
        Self::new(password)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};

    #[test]
    fn debug_is_redacted() {
        let mut rng = ChaCha8Rng::from_seed([42; 32]);
        let key = ContentKey::generate(16, &mut rng);
        let shown = format!("{:?}", key);
        assert!(shown.contains("len: 16"));
        assert!(!shown.contains(&format!("{:?}", key.as_bytes())));
        assert_eq!(format!("{:?}", Password::from("hunter2")), "Password(..)");
    }

    #[test]
    fn odd_parity() {
        let mut key = ContentKey::from_bytes(vec![0x00, 0x01, 0xfe, 0x7f]);
        key.set_odd_parity();
        assert_eq!(key.as_bytes(), [0x01, 0x01, 0xfe, 0x7f]);
        assert!(key.as_bytes().iter().all(|b| b.count_ones() % 2 == 1));
    }
}
