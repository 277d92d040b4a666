//! Error types.

use const_oid::ObjectIdentifier;
use core::fmt;

/// Alias for [`core::result::Result`] with the `cms-envelope` crate's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Wire bytes do not match the expected ASN.1 shape.
    Malformed(&'static str),

    /// The declared algorithm has no registered handler.
    UnsupportedAlgorithm(ObjectIdentifier),

    /// An algorithm name is not present in the registry.
    UnknownAlgorithmName(String),

    /// The supplied key does not correspond to any entry, or the primitive
    /// rejected the key material.
    KeyMismatch,

    /// A signed attribute set breaks one of the mandatory shape rules.
    AttributeViolation(&'static str),

    /// Underlying stream I/O failed mid-operation.
    Io(std::io::Error),

    /// A generator was misconfigured or used out of order.
    Builder(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed(what) => write!(f, "malformed structure: {}", what),
            Error::UnsupportedAlgorithm(oid) => write!(f, "unsupported algorithm: {}", oid),
            Error::UnknownAlgorithmName(name) => write!(f, "unknown algorithm name: {}", name),
            Error::KeyMismatch => write!(f, "key does not match"),
            Error::AttributeViolation(what) => write!(f, "attribute violation: {}", what),
            Error::Io(err) => write!(f, "I/O failure: {}", err),
            Error::Builder(what) => write!(f, "builder error: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        // errors raised inside our own Read/Write adapters travel wrapped
        if err.get_ref().map_or(false, |inner| inner.is::<Error>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(err) = inner.downcast::<Error>() {
                    return *err;
                }
            }
            return Error::Malformed("lost error inside stream adapter");
        }
        Error::Io(err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

impl From<der::Error> for Error {
    fn from(_: der::Error) -> Self {
        Error::Malformed("DER decoding failed")
    }
}

impl From<const_oid::Error> for Error {
    fn from(_: const_oid::Error) -> Self {
        Error::Malformed("invalid object identifier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_round_trip_keeps_variant() {
        let wrapped: io::Error = Error::KeyMismatch.into();
        assert_eq!(wrapped.kind(), io::ErrorKind::InvalidData);
        assert!(matches!(Error::from(wrapped), Error::KeyMismatch));
    }

    #[test]
    fn plain_io_error_is_io() {
        let err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(Error::from(err), Error::Io(_)));
    }
}
