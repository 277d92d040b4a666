//! BER streaming on top of `der`.
//!
//! Materialized structures (identifiers, attributes, recipient and signer
//! infos) are the `cms`/`der` types themselves. What `der` does not cover is
//! the indefinite length form and constructed string segments, which large
//! envelopes use for their content octets:
//!
//! - [`BerReader`] decodes BER incrementally from any [`std::io::Read`];
//!   content octets are streamed and everything else is normalized to DER
//!   and handed to `der` ([`BerReader::read_der`]).
//! - [`BerEncoder`] is the generator engine: nested definite or indefinite
//!   length frames with content streamed through in a single pass.

mod generator;
mod reader;
mod time;

pub use der::{Tag, TagNumber};

use der::{asn1::ContextSpecificRef, EncodeValue, TagMode, Tagged};

pub use self::{
    generator::{
        BerEncoder, Encoding, Level, OctetStringState, OctetStringWriter, TeeReader, TeeWriter,
        DEFAULT_CHUNK_SIZE,
    },
    reader::{from_ber, BerReader, Header, OctetStringProgress, OctetStringReader, Scope},
    time::time_of,
};

/// Bit 6 of an identifier octet.
const CONSTRUCTED: u8 = 0x20;

/// Context-specific tag `[number]` in its primitive form.
pub const fn context(number: u8) -> Tag {
    Tag::ContextSpecific {
        constructed: false,
        number: TagNumber::new(number),
    }
}

/// `value` under `[number] IMPLICIT`, ready for [`BerEncoder::write_der`].
pub(crate) fn implicit<T: EncodeValue + Tagged>(number: u8, value: &T) -> ContextSpecificRef<'_, T> {
    ContextSpecificRef {
        tag_number: TagNumber::new(number),
        tag_mode: TagMode::Implicit,
        value,
    }
}

/// Identifier octet of `tag` in the requested form.
///
/// `der` fixes the form of universal tags; BER also allows constructed
/// string encodings, so the form is carried separately.
pub(crate) fn identifier(tag: Tag, constructed: bool) -> u8 {
    if constructed {
        tag.octet() | CONSTRUCTED
    } else {
        tag.octet() & !CONSTRUCTED
    }
}

/// Length octets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Length {
    /// Length known up front.
    Definite(usize),
    /// Contents terminated by an end-of-contents marker.
    Indefinite,
}

/// Appends definite length octets in the shortest form.
///
/// Unlike [`der::Length`] this is not capped at 256 MiB, which streamed
/// content may exceed.
pub(crate) fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = (len as u64).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

/// Appends a complete header for `tag` in the given form.
pub(crate) fn encode_header(tag: Tag, constructed: bool, length: Length, out: &mut Vec<u8>) {
    out.push(identifier(tag, constructed));
    match length {
        Length::Definite(len) => encode_length(len, out),
        Length::Indefinite => out.push(0x80),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn identifier_forms() {
        assert_eq!(identifier(Tag::OctetString, true), 0x24);
        assert_eq!(identifier(Tag::Sequence, true), 0x30);
        assert_eq!(identifier(context(0), true), 0xa0);
        assert_eq!(identifier(context(2), false), 0x82);
    }

    #[test]
    fn implicit_keeps_the_constructed_form() {
        use der::{asn1::SetOfVec, Encode};
        let set = SetOfVec::try_from(vec![true]).unwrap();
        assert_eq!(implicit(1, &set).to_der().unwrap(), hex!("a1030101ff"));
        assert_eq!(implicit(0, &true).to_der().unwrap(), hex!("8001ff"));
    }

    #[test]
    fn length_forms() {
        let mut out = Vec::new();
        encode_length(0x7f, &mut out);
        encode_length(0x80, &mut out);
        encode_length(0x1234, &mut out);
        encode_length(0x1_0000_0000, &mut out);
        assert_eq!(out, hex!("7f 8180 821234 850100000000"));
    }
}
