//! Primitive services: content ciphers, key wraps, key derivation, digests,
//! elliptic-curve agreement and secret containers.
//!
//! Everything here operates on bytes; the envelope structures that carry the
//! parameters live in [`crate::registry`] and the recipient modules.

pub(crate) mod agreement;
pub(crate) mod content;
pub(crate) mod digests;
pub(crate) mod kdf;
pub(crate) mod secret;
pub(crate) mod wrap;

pub use self::{
    agreement::{AgreementPrivateKey, AgreementPublicKey, Curve},
    digests::{DigestSet, DigestWriter},
    secret::{ContentKey, Password},
};
