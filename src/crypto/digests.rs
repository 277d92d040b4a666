use std::collections::BTreeMap;
use std::io::{self, Write};

use digest::DynDigest;

use crate::registry::DigestAlgorithm;

/// One running hash per digest algorithm, fed in a single pass.
pub struct DigestSet {
    hashers: BTreeMap<DigestAlgorithm, Box<dyn DynDigest + Send + Sync>>,
}

impl DigestSet {
    /// Starts one hasher for each distinct algorithm.
    pub fn new(algorithms: impl IntoIterator<Item = DigestAlgorithm>) -> Self {
        let hashers = algorithms
            .into_iter()
            .map(|alg| (alg, alg.new_hasher()))
            .collect();
        Self { hashers }
    }

    /// Algorithms being computed, in registry order.
    pub fn algorithms(&self) -> impl Iterator<Item = DigestAlgorithm> + '_ {
        self.hashers.keys().copied()
    }

    /// Feeds `data` to every hasher.
    pub fn update(&mut self, data: &[u8]) {
        for hasher in self.hashers.values_mut() {
            hasher.update(data);
        }
    }

    /// Finishes every hasher.
    pub fn finalize(self) -> BTreeMap<DigestAlgorithm, Vec<u8>> {
        self.hashers
            .into_iter()
            .map(|(alg, hasher)| (alg, hasher.finalize().into_vec()))
            .collect()
    }
}

impl Write for DigestSet {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl core::fmt::Debug for DigestSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.hashers.keys()).finish()
    }
}

/// `io::Write` adapter over a single hasher.
pub struct DigestWriter {
    algorithm: DigestAlgorithm,
    hasher: Box<dyn DynDigest + Send + Sync>,
}

impl DigestWriter {
    /// Fresh hasher for `algorithm`.
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            hasher: algorithm.new_hasher(),
        }
    }

    /// Algorithm being computed.
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Digest of everything written.
    pub fn finalize(self) -> Vec<u8> {
        self.hasher.finalize().into_vec()
    }
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl core::fmt::Debug for DigestWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("DigestWriter").field(&self.algorithm).finish()
    }
}
