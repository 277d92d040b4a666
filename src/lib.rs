#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc = include_str!("../README.md")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/RustCrypto/meta/master/logo_small.png")]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Layout
//!
//! - [`asn1`]: BER streaming on top of `der`: the nested encoder every
//!   envelope is written with and the pull reader their parsers walk.
//! - [`registry`]: names, object identifiers and parameters of every
//!   supported algorithm.
//! - [`recipient`]: the four key establishment protocols behind
//!   `RecipientInfo`.
//! - [`signer`]: `SignerInfo` generation, verification and countersignatures.
//! - [`enveloped`], [`signed`], [`auth_enveloped`]: the envelopes themselves.
//!
//! # Usage
//!
//! ## Encrypting for a password
//! ```
//! use cms_envelope::{
//!     crypto::Password,
//!     enveloped::EnvelopedDataGenerator,
//!     recipient::{PasswordRecipient, RecipientId, RecipientKey},
//!     registry::ContentEncryptionAlgorithm,
//!     EnvelopedData,
//! };
//!
//! let mut rng = rand::thread_rng(); // rand@0.8
//!
//! let der = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes256Cbc)?
//!     .add_recipient(PasswordRecipient::new("correct horse"))
//!     .generate(b"hello world", &mut rng)?;
//!
//! let enveloped = EnvelopedData::from_ber(&der)?;
//! let password = Password::from("correct horse");
//! let plaintext = enveloped.decrypt(&RecipientId::Password, &RecipientKey::Password(&password), &mut rng)?;
//! assert_eq!(plaintext, b"hello world");
//! # Ok::<(), cms_envelope::Error>(())
//! ```
//!
//! ## Streaming
//! ```
//! use std::io::{Read, Write};
//! use cms_envelope::{
//!     enveloped::{EnvelopedDataGenerator, EnvelopedDataParser, EnvelopedDataStreamGenerator},
//!     recipient::{KekRecipient, RecipientId, RecipientKey},
//!     registry::{CipherFamily, ContentEncryptionAlgorithm},
//! };
//!
//! let mut rng = rand::thread_rng(); // rand@0.8
//! let kek = [7u8; 16];
//!
//! let generator = EnvelopedDataGenerator::new(ContentEncryptionAlgorithm::Aes128Cbc)?
//!     .add_recipient(KekRecipient::new(b"backup".to_vec(), CipherFamily::Aes, &kek)?);
//! let mut stream = EnvelopedDataStreamGenerator::new(generator).open(Vec::new(), &mut rng)?;
//! stream.write_all(b"streamed ")?;
//! stream.write_all(b"content")?;
//! let ber = stream.finish()?;
//!
//! let mut parser = EnvelopedDataParser::new(&ber[..])?;
//! let cek = parser
//!     .recipients()?
//!     .recover_key(&RecipientId::Kek(b"backup".to_vec()), &RecipientKey::Kek(&kek), &mut rng)?;
//! let mut plaintext = Vec::new();
//! parser.content(&cek)?.read_to_end(&mut plaintext)?;
//! assert_eq!(plaintext, b"streamed content");
//! # Ok::<(), cms_envelope::Error>(())
//! ```

#[cfg(doctest)]
pub struct ReadmeDoctests;

pub use const_oid::ObjectIdentifier;
pub use rand_core;
pub use rsa::{RsaPrivateKey, RsaPublicKey};
pub use x509_cert::Certificate;

pub mod asn1;
pub mod attributes;
pub mod auth_enveloped;
pub mod cert;
pub mod content_info;
pub mod crypto;
pub mod enveloped;
pub mod errors;
pub mod recipient;
pub mod registry;
pub mod signed;
pub mod signer;

pub use crate::{
    auth_enveloped::AuthEnvelopedData,
    content_info::{ContentInfo, Envelope},
    enveloped::EnvelopedData,
    errors::{Error, Result},
    signed::SignedData,
};
