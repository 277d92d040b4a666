//! Incremental BER decoder.

use std::{
    borrow::BorrowMut,
    io::{self, Read},
};

use der::DecodeOwned;

use super::{encode_header, identifier, Length, Tag};
use crate::errors::{Error, Result};

/// Deepest nesting accepted when materializing elements.
pub(crate) const MAX_DEPTH: usize = 64;

/// Identifier and length octets of one element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Element tag, with universal types in their `der` (DER) form.
    pub tag: Tag,
    /// Whether this encoding is constructed.
    pub constructed: bool,
    /// Element length.
    pub length: Length,
}

impl Header {
    /// Compares class and number, ignoring the form.
    ///
    /// BER lets string types arrive in either form, so this is the comparison
    /// every decoder in the crate uses.
    pub fn is(&self, tag: Tag) -> bool {
        self.tag.class() == tag.class() && self.tag.number() == tag.number()
    }

    /// `true` for the context-specific tag `[number]` in either form.
    pub fn is_context(&self, number: u8) -> bool {
        self.tag.is_context_specific() && self.tag.number().value() == number
    }
}

/// Bounds of a constructed element that has been entered.
///
/// A definite container ends at a fixed offset; an indefinite one ends at
/// its end-of-contents marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scope {
    end: Option<u64>,
}

/// Streaming BER decoder over any [`Read`].
///
/// Only what the caller asks for is read, so large `OCTET STRING` contents
/// can be consumed through [`BerReader::octets`] without buffering.
#[derive(Debug)]
pub struct BerReader<R> {
    inner: R,
    position: u64,
}

/// Decodes one complete BER element from `bytes` as `T`.
pub fn from_ber<T: DecodeOwned>(bytes: &[u8]) -> Result<T> {
    let mut reader = BerReader::new(bytes);
    let header = reader.read_header()?;
    let value = reader.read_der(header)?;
    if reader.position() != bytes.len() as u64 {
        return Err(Error::Malformed("trailing data after element"));
    }
    Ok(value)
}

impl<R: Read> BerReader<R> {
    /// Wraps a byte source.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::Malformed("unexpected end of input"),
            _ => Error::from(err),
        })?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Reads identifier and length octets.
    pub fn read_header(&mut self) -> Result<Header> {
        self.read_header_or_end()?
            .ok_or(Error::Malformed("unexpected end-of-contents"))
    }

    /// Like [`BerReader::read_header`], with `None` for an end-of-contents
    /// marker.
    fn read_header_or_end(&mut self) -> Result<Option<Header>> {
        let first = self.read_byte()?;
        if first == 0x00 {
            return match self.read_byte()? {
                0x00 => Ok(None),
                _ => Err(Error::Malformed("end-of-contents with non-zero length")),
            };
        }
        if first & 0x1f == 0x1f {
            return Err(Error::Malformed("high tag numbers are not supported"));
        }

        let constructed = first & 0x20 != 0;
        let universal = first & 0xc0 == 0;
        let number = first & 0x1f;
        let canonical = match (universal, number) {
            (true, 0x10 | 0x11) if !constructed => {
                return Err(Error::Malformed("SEQUENCE and SET must be constructed"))
            }
            (true, 0x10 | 0x11) => first,
            (true, _) => first & !0x20,
            (false, _) => first,
        };
        let tag = Tag::try_from(canonical).map_err(|_| Error::Malformed("unknown tag"))?;

        let length = match self.read_byte()? {
            0x80 if constructed => Length::Indefinite,
            0x80 => return Err(Error::Malformed("indefinite length on primitive element")),
            0xff => return Err(Error::Malformed("reserved length octet")),
            short if short < 0x80 => Length::Definite(usize::from(short)),
            long => {
                let count = usize::from(long & 0x7f);
                if count > 8 {
                    return Err(Error::Malformed("length too large"));
                }
                let mut bytes = [0u8; 8];
                self.read_exact(&mut bytes[8 - count..])?;
                let len = u64::from_be_bytes(bytes);
                Length::Definite(
                    usize::try_from(len).map_err(|_| Error::Malformed("length too large"))?,
                )
            }
        };

        Ok(Some(Header {
            tag,
            constructed,
            length,
        }))
    }

    /// Offset just past `len` more bytes.
    fn end_after(&self, len: usize) -> Result<u64> {
        u64::try_from(len)
            .ok()
            .and_then(|len| self.position.checked_add(len))
            .ok_or(Error::Malformed("length overflows"))
    }

    /// Enters a constructed element whose header has just been read.
    pub fn enter(&mut self, header: &Header) -> Result<Scope> {
        if !header.constructed {
            return Err(Error::Malformed("expected a constructed element"));
        }
        Ok(Scope {
            end: match header.length {
                Length::Definite(len) => Some(self.end_after(len)?),
                Length::Indefinite => None,
            },
        })
    }

    /// Header of the next child in `scope`, or `None` once the container is
    /// exhausted (its end-of-contents marker is consumed).
    ///
    /// A child whose definite length does not fit in the rest of its
    /// container is rejected before any of its contents are read.
    pub fn next(&mut self, scope: &Scope) -> Result<Option<Header>> {
        let Some(end) = scope.end else {
            return self.read_header_or_end();
        };
        if self.position == end {
            return Ok(None);
        }
        if self.position > end {
            return Err(Error::Malformed("element overruns its container"));
        }
        let header = self
            .read_header_or_end()?
            .ok_or(Error::Malformed("end-of-contents inside definite length"))?;
        let child_end = match header.length {
            Length::Definite(len) => self.end_after(len)?,
            Length::Indefinite => self.position,
        };
        if child_end > end {
            return Err(Error::Malformed("element overruns its container"));
        }
        Ok(Some(header))
    }

    /// Header of the next child, which must carry `tag`.
    pub fn expect(&mut self, scope: &Scope, tag: Tag, what: &'static str) -> Result<Header> {
        match self.next(scope)? {
            Some(header) if header.is(tag) => Ok(header),
            _ => Err(Error::Malformed(what)),
        }
    }

    /// Skips the remaining children of `scope`.
    pub fn finish(&mut self, scope: &Scope) -> Result<()> {
        while let Some(header) = self.next(scope)? {
            self.skip(header)?;
        }
        Ok(())
    }

    /// Skips the element whose header has just been read.
    pub fn skip(&mut self, header: Header) -> Result<()> {
        self.normalize(header).map(drop)
    }

    /// Decodes the element whose header has just been read as `T`.
    ///
    /// The element is first re-encoded with definite lengths and primitive
    /// `OCTET STRING`s, which is DER for every structure this crate reads
    /// that was itself written by a DER or BER encoder with sorted sets.
    pub fn read_der<T: DecodeOwned>(&mut self, header: Header) -> Result<T> {
        let der = self.normalize(header)?;
        Ok(T::from_der(&der)?)
    }

    /// Decodes the `[n] IMPLICIT` element whose header has just been read as
    /// `T`, whose own tag is `tag`.
    pub fn read_implicit<T: DecodeOwned>(&mut self, header: Header, tag: Tag) -> Result<T> {
        let mut der = self.normalize(header)?;
        if let Some(first) = der.first_mut() {
            *first = identifier(tag, header.constructed);
        }
        Ok(T::from_der(&der)?)
    }

    /// Reads the next element of `scope` as `T`.
    pub fn next_der<T: DecodeOwned>(&mut self, scope: &Scope, what: &'static str) -> Result<T> {
        let header = self.next(scope)?.ok_or(Error::Malformed(what))?;
        self.read_der(header)
    }

    /// Decodes each member of the `SET OF` or `SEQUENCE OF` whose header has
    /// just been read, in the order they are encoded.
    pub fn read_members<T: DecodeOwned>(&mut self, header: Header) -> Result<Vec<T>> {
        let scope = self.enter(&header)?;
        let mut members = Vec::new();
        while let Some(child) = self.next(&scope)? {
            members.push(self.read_der(child)?);
        }
        Ok(members)
    }

    /// Definite length encoding of the element whose header has just been
    /// read.
    pub fn normalize(&mut self, header: Header) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.normalize_into(header, 0, &mut out)?;
        Ok(out)
    }

    fn normalize_into(&mut self, header: Header, depth: usize, out: &mut Vec<u8>) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::Malformed("elements nested too deeply"));
        }

        if !header.constructed {
            let value = self.read_primitive(header)?;
            encode_header(header.tag, false, Length::Definite(value.len()), out);
            out.extend_from_slice(&value);
            return Ok(());
        }

        if header.tag.is_universal() && !matches!(header.tag, Tag::Sequence | Tag::Set) {
            if header.tag != Tag::OctetString {
                return Err(Error::Malformed("constructed encoding of a primitive type"));
            }
            let mut value = Vec::new();
            self.octets(header)?.read_to_end(&mut value)?;
            encode_header(Tag::OctetString, false, Length::Definite(value.len()), out);
            out.extend_from_slice(&value);
            return Ok(());
        }

        let scope = self.enter(&header)?;
        let mut body = Vec::new();
        while let Some(child) = self.next(&scope)? {
            self.normalize_into(child, depth + 1, &mut body)?;
        }
        encode_header(header.tag, true, Length::Definite(body.len()), out);
        out.extend_from_slice(&body);
        Ok(())
    }

    fn read_primitive(&mut self, header: Header) -> Result<Vec<u8>> {
        let Length::Definite(len) = header.length else {
            return Err(Error::Malformed("indefinite length on primitive element"));
        };
        // grows with what actually arrives, never with the declared length
        let mut value = Vec::new();
        let read = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut value)
            .map_err(Error::from)?;
        self.position += read as u64;
        if read != len {
            return Err(Error::Malformed("unexpected end of input"));
        }
        Ok(value)
    }

    /// Starts streaming the `OCTET STRING` (or implicitly tagged one) whose
    /// header has just been read, keeping the progress outside the reader.
    pub fn start_octets(&mut self, header: Header) -> Result<OctetStringProgress> {
        let mut progress = OctetStringProgress::default();
        if header.constructed {
            progress.scopes.push(self.enter(&header)?);
        } else {
            match header.length {
                Length::Definite(0) => progress.done = true,
                Length::Definite(len) => progress.remaining = len,
                Length::Indefinite => {
                    return Err(Error::Malformed("indefinite length on primitive element"))
                }
            }
        }
        Ok(progress)
    }

    /// Streams the `OCTET STRING` (or implicitly tagged one) whose header has
    /// just been read.
    pub fn octets(&mut self, header: Header) -> Result<OctetStringReader<'_, R>> {
        let progress = self.start_octets(header)?;
        Ok(OctetStringReader {
            reader: self,
            progress,
        })
    }

    /// Continues a string started with [`BerReader::start_octets`].
    pub fn resume_octets<'r>(
        &'r mut self,
        progress: &'r mut OctetStringProgress,
    ) -> OctetStringReader<'r, R, &'r mut OctetStringProgress> {
        OctetStringReader {
            reader: self,
            progress,
        }
    }
}

/// How far a streamed `OCTET STRING` has been read.
///
/// Segment headers are consumed transparently; `remaining` counts what is
/// left of the current primitive segment.
#[derive(Clone, Debug, Default)]
pub struct OctetStringProgress {
    scopes: Vec<Scope>,
    remaining: usize,
    done: bool,
}

impl OctetStringProgress {
    /// `true` once the end of the string has been consumed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn advance<R: Read>(&mut self, reader: &mut BerReader<R>) -> Result<()> {
        while self.remaining == 0 && !self.done {
            let Some(scope) = self.scopes.last().copied() else {
                self.done = true;
                break;
            };
            match reader.next(&scope)? {
                None => {
                    self.scopes.pop();
                    if self.scopes.is_empty() {
                        self.done = true;
                    }
                }
                Some(header) if header.tag != Tag::OctetString => {
                    return Err(Error::Malformed("octet string segment has wrong tag"));
                }
                Some(header) if header.constructed => {
                    if self.scopes.len() > MAX_DEPTH {
                        return Err(Error::Malformed("octet string nested too deeply"));
                    }
                    let nested = reader.enter(&header)?;
                    self.scopes.push(nested);
                }
                Some(Header {
                    length: Length::Definite(len),
                    ..
                }) => self.remaining = len,
                Some(_) => return Err(Error::Malformed("indefinite length on primitive element")),
            }
        }
        Ok(())
    }

    fn read<R: Read>(&mut self, reader: &mut BerReader<R>, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.advance(reader)?;
        if self.done {
            return Ok(0);
        }
        let want = buf.len().min(self.remaining);
        let n = reader.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::Malformed("unexpected end of input"));
        }
        reader.position += n as u64;
        self.remaining -= n;
        if self.remaining == 0 && self.scopes.is_empty() {
            self.done = true;
        }
        Ok(n)
    }
}

/// [`Read`] over the contents of a primitive or constructed `OCTET STRING`.
///
/// End of the string is reported as end of stream.
#[derive(Debug)]
pub struct OctetStringReader<'r, R, P = OctetStringProgress> {
    reader: &'r mut BerReader<R>,
    progress: P,
}

impl<'r, R: Read, P: BorrowMut<OctetStringProgress>> OctetStringReader<'r, R, P> {
    /// Reads and discards whatever is left of the string.
    pub fn drain(&mut self) -> Result<()> {
        io::copy(self, &mut io::sink())?;
        Ok(())
    }
}

impl<'r, R: Read, P: BorrowMut<OctetStringProgress>> Read for OctetStringReader<'r, R, P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.progress.borrow_mut().read(self.reader, buf)?)
    }
}
