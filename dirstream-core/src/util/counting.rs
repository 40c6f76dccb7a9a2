use std::io::{self, Write};

/// Write adapter that counts bytes accepted by the inner writer.
pub struct CountingWriter<W: Write> {
    inner: W,
    n: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, n: 0 }
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let k = self.inner.write(buf)?;
        self.n += k as u64;
        Ok(k)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_what_reaches_the_sink() {
        let mut w = CountingWriter::new(Vec::new());
        w.write_all(b"hello").unwrap();
        w.write_all(b" world").unwrap();
        assert_eq!(w.count(), 11);
        assert_eq!(w.into_inner(), b"hello world");
    }
}
