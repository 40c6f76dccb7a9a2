use crate::error::{FormatReason, Result, StreamError};
use std::io::{self, Read};

/// Result of looking at the next record magic without consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peek {
    /// No bytes left.
    Eof,
    /// Fewer than four bytes left.
    Partial(usize),
    Word(u32),
}

/// Sequential reader over an encoded stream.
///
/// Tracks the logical offset of the next byte it will hand out and keeps a
/// small push-back buffer, which is what lets the decoder peek at record
/// magics and lets the recovery scan rewind on streams that cannot seek.
pub struct StreamReader<R> {
    inner: R,
    // bytes already pulled from `inner` but not yet handed out
    pending: Vec<u8>,
    pos: u64,
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// Offset of the next byte `read` will return.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn peek_u32(&mut self) -> io::Result<Peek> {
        let mut byte = [0u8; 1];
        while self.pending.len() < 4 {
            match self.inner.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => self.pending.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(match self.pending.len() {
            0 => Peek::Eof,
            n if n < 4 => Peek::Partial(n),
            _ => Peek::Word(u32::from_be_bytes([
                self.pending[0],
                self.pending[1],
                self.pending[2],
                self.pending[3],
            ])),
        })
    }

    /// Push bytes back so the next read returns them first.
    pub fn unread(&mut self, bytes: &[u8]) {
        self.pending.splice(0..0, bytes.iter().copied());
        self.pos -= bytes.len() as u64;
    }

    /// `read_exact`, reporting a short stream as a truncated `what` record
    /// starting at `record_offset`.
    pub fn read_record(
        &mut self,
        buf: &mut [u8],
        record_offset: u64,
        what: &'static str,
    ) -> Result<()> {
        match self.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(StreamError::format(
                record_offset,
                FormatReason::Truncated(what),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = if self.pending.is_empty() {
            self.inner.read(buf)?
        } else {
            let n = self.pending.len().min(buf.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            n
        };
        self.pos += n as u64;
        Ok(n)
    }
}
