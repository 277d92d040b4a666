//! Nested streaming encoder.
//!
//! Frames are opened and closed strictly last-in-first-out. A definite length
//! frame buffers its contents and is emitted with its length on close; an
//! indefinite length frame writes its header immediately and its
//! end-of-contents marker on close, so content of unknown size flows straight
//! to the sink.

use std::io::{self, Read, Write};

use tracing::trace;

use der::Encode;

use super::{encode_header, Length, Tag};
use crate::errors::{Error, Result};

/// Segment size for indefinite length `OCTET STRING`s (the CER segment size).
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Length encoding of a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Buffer, then emit with the length known (DER when every part is DER).
    #[default]
    Definite,
    /// Stream with an indefinite length and an end-of-contents marker.
    Indefinite,
}

/// Handle to an open frame, consumed by [`BerEncoder::close`].
#[must_use = "an open frame must be closed"]
#[derive(Debug, PartialEq, Eq)]
pub struct Level(usize);

#[derive(Debug)]
struct Frame {
    tag: Tag,
    encoding: Encoding,
    buffer: Vec<u8>,
}

/// Streaming BER encoder writing to `W`.
///
/// Any failure inside [`BerEncoder::nested`], or an unfinished
/// [`OctetStringWriter`], poisons the encoder: nothing more is written and
/// [`BerEncoder::finish`] fails. Whatever already reached the sink is a
/// prefix of an indefinite length encoding that no decoder accepts as
/// complete, and buffered definite frames are never emitted.
#[derive(Debug)]
pub struct BerEncoder<W: Write> {
    sink: W,
    frames: Vec<Frame>,
    encoding: Encoding,
    poisoned: bool,
}

impl<W: Write> BerEncoder<W> {
    /// Creates an encoder whose top level frames use `encoding`.
    pub fn new(sink: W, encoding: Encoding) -> Self {
        Self {
            sink,
            frames: Vec::new(),
            encoding,
            poisoned: false,
        }
    }

    /// Encoding a newly opened frame inherits: that of the innermost open
    /// frame, or the root encoding.
    pub fn encoding(&self) -> Encoding {
        self.frames.last().map_or(self.encoding, |frame| frame.encoding)
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Opens a constructed frame with the inherited encoding.
    pub fn open(&mut self, tag: Tag) -> Result<Level> {
        self.open_with(tag, self.encoding())
    }

    /// Opens a constructed frame with an explicit encoding.
    pub fn open_with(&mut self, tag: Tag, encoding: Encoding) -> Result<Level> {
        self.check()?;
        if encoding == Encoding::Indefinite {
            let mut header = Vec::with_capacity(2);
            encode_header(tag, true, Length::Indefinite, &mut header);
            self.emit(&header)?;
        }
        self.frames.push(Frame {
            tag,
            encoding,
            buffer: Vec::new(),
        });
        trace!(depth = self.frames.len(), ?encoding, "frame opened");
        Ok(Level(self.frames.len()))
    }

    /// Closes the innermost frame, which `level` must refer to.
    pub fn close(&mut self, level: Level) -> Result<()> {
        self.check()?;
        if level.0 == 0 || level.0 != self.frames.len() {
            self.poisoned = true;
            return Err(Error::Builder(
                "frames must be closed in reverse order of opening",
            ));
        }
        let Some(frame) = self.frames.pop() else {
            return Err(Error::Builder("no open frame"));
        };
        match frame.encoding {
            Encoding::Definite => {
                let mut out = Vec::with_capacity(frame.buffer.len() + 6);
                encode_header(frame.tag, true, Length::Definite(frame.buffer.len()), &mut out);
                out.extend_from_slice(&frame.buffer);
                self.emit(&out)?;
            }
            Encoding::Indefinite => self.emit(&[0x00, 0x00])?,
        }
        trace!(depth = self.frames.len() + 1, "frame closed");
        Ok(())
    }

    /// Runs `f` inside a frame with the inherited encoding.
    ///
    /// The frame is closed when `f` succeeds. When `f` fails the encoder is
    /// poisoned and the error returned.
    pub fn nested<T>(&mut self, tag: Tag, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let encoding = self.encoding();
        self.nested_with(tag, encoding, f)
    }

    /// [`BerEncoder::nested`] with an explicit encoding.
    pub fn nested_with<T>(
        &mut self,
        tag: Tag,
        encoding: Encoding,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let level = self.open_with(tag, encoding)?;
        match f(self) {
            Ok(value) => {
                self.close(level)?;
                Ok(value)
            }
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    /// Writes pre-encoded bytes into the innermost frame.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.check()?;
        self.emit(bytes)
    }

    /// Writes the DER encoding of `value` into the innermost frame.
    pub fn write_der(&mut self, value: &impl Encode) -> Result<()> {
        self.write_raw(&value.to_der()?)
    }

    /// Streams an `OCTET STRING` (or implicitly tagged one) into the
    /// innermost frame; the form follows the inherited encoding.
    pub fn octet_string(&mut self, tag: Tag, chunk_size: usize) -> OctetStringWriter<'_, W> {
        let state = OctetStringState::new(tag, self.encoding(), chunk_size);
        OctetStringWriter {
            encoder: self,
            state: Some(state),
        }
    }

    /// Checks every frame is closed, flushes and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.check()?;
        if !self.frames.is_empty() {
            return Err(Error::Builder("unclosed frame at finish"));
        }
        self.sink.flush()?;
        Ok(self.sink)
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::Builder("encoder poisoned by an earlier failure"));
        }
        Ok(())
    }

    /// Routes bytes to the nearest buffering frame, or the sink when every
    /// open frame streams.
    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        let buffered = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| frame.encoding == Encoding::Definite);
        match buffered {
            Some(frame) => {
                frame.buffer.extend_from_slice(bytes);
                Ok(())
            }
            None => self.sink.write_all(bytes).map_err(|err| {
                self.poisoned = true;
                Error::from(err)
            }),
        }
    }
}

/// Owned progress of one streamed `OCTET STRING`, for generators that hold
/// their [`BerEncoder`] across caller writes.
#[derive(Debug)]
pub struct OctetStringState {
    tag: Tag,
    encoding: Encoding,
    chunk_size: usize,
    pending: Vec<u8>,
    started: bool,
}

impl OctetStringState {
    /// Starts a string; nothing is written until the first call.
    pub fn new(tag: Tag, encoding: Encoding, chunk_size: usize) -> Self {
        Self {
            tag,
            encoding,
            chunk_size: chunk_size.max(1),
            pending: Vec::new(),
            started: false,
        }
    }

    /// Appends content, emitting every complete segment.
    pub fn write<W: Write>(&mut self, encoder: &mut BerEncoder<W>, data: &[u8]) -> Result<()> {
        encoder.check()?;
        self.pending.extend_from_slice(data);
        if self.encoding == Encoding::Indefinite {
            self.start(encoder)?;
            while self.pending.len() >= self.chunk_size {
                let rest = self.pending.split_off(self.chunk_size);
                let segment = std::mem::replace(&mut self.pending, rest);
                Self::segment(encoder, &segment)?;
            }
        }
        Ok(())
    }

    /// Emits the remaining content and closes the string.
    pub fn finish<W: Write>(mut self, encoder: &mut BerEncoder<W>) -> Result<()> {
        encoder.check()?;
        match self.encoding {
            Encoding::Definite => {
                let mut out = Vec::with_capacity(self.pending.len() + 6);
                encode_header(self.tag, false, Length::Definite(self.pending.len()), &mut out);
                out.extend_from_slice(&self.pending);
                encoder.emit(&out)
            }
            Encoding::Indefinite => {
                self.start(encoder)?;
                if !self.pending.is_empty() {
                    Self::segment(encoder, &self.pending)?;
                }
                encoder.emit(&[0x00, 0x00])
            }
        }
    }

    fn start<W: Write>(&mut self, encoder: &mut BerEncoder<W>) -> Result<()> {
        if !self.started {
            let mut header = Vec::with_capacity(2);
            encode_header(self.tag, true, Length::Indefinite, &mut header);
            encoder.emit(&header)?;
            self.started = true;
        }
        Ok(())
    }

    fn segment<W: Write>(encoder: &mut BerEncoder<W>, bytes: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(bytes.len() + 6);
        encode_header(Tag::OctetString, false, Length::Definite(bytes.len()), &mut out);
        out.extend_from_slice(bytes);
        encoder.emit(&out)
    }
}

/// [`Write`] adapter streaming one `OCTET STRING` into a borrowed encoder.
///
/// Must be closed with [`OctetStringWriter::finish`]; dropping it unfinished
/// poisons the encoder.
#[derive(Debug)]
pub struct OctetStringWriter<'e, W: Write> {
    encoder: &'e mut BerEncoder<W>,
    state: Option<OctetStringState>,
}

impl<'e, W: Write> OctetStringWriter<'e, W> {
    /// Closes the string.
    pub fn finish(mut self) -> Result<()> {
        match self.state.take() {
            Some(state) => state.finish(self.encoder),
            None => Err(Error::Builder("octet string already finished")),
        }
    }
}

impl<'e, W: Write> Write for OctetStringWriter<'e, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let state = self
            .state
            .as_mut()
            .ok_or(Error::Builder("octet string already finished"))?;
        state.write(self.encoder, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'e, W: Write> Drop for OctetStringWriter<'e, W> {
    fn drop(&mut self) {
        if self.state.is_some() {
            self.encoder.poison();
        }
    }
}

/// Writes every byte to both `primary` and `observer`.
#[derive(Debug)]
pub struct TeeWriter<A, B> {
    primary: A,
    observer: B,
}

impl<A: Write, B: Write> TeeWriter<A, B> {
    /// Pairs a destination with an observer of the same bytes.
    pub fn new(primary: A, observer: B) -> Self {
        Self { primary, observer }
    }

    /// Splits the tee back into its halves.
    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.observer)
    }
}

impl<A: Write, B: Write> Write for TeeWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.observer.write_all(buf)?;
        self.primary.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.observer.flush()?;
        self.primary.flush()
    }
}

/// Copies every byte read from `inner` into `observer`.
#[derive(Debug)]
pub struct TeeReader<R, W> {
    inner: R,
    observer: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    /// Pairs a source with an observer of the same bytes.
    pub fn new(inner: R, observer: W) -> Self {
        Self { inner, observer }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.observer.write_all(&buf[..n])?;
        Ok(n)
    }
}
