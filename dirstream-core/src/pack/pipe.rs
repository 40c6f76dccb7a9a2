//! Producer/consumer plumbing between the encode thread and the caller.

use crate::error::{Result, StreamError};
use crate::pack::encoder::EncodeSummary;
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// How often a blocked producer re-checks its cancel token.
const SEND_POLL: Duration = Duration::from_millis(20);

/// Shared cancellation flag.
///
/// A child token observes its parent as well as its own flag, so cancelling
/// one stream never poisons the caller's token for later encodes.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(self.flag.clone()),
        }
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(StreamError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// `Write` end of the pipe: every write becomes one buffer on the channel.
pub(crate) struct ChannelWriter {
    tx: Sender<Vec<u8>>,
    cancel: CancelToken,
}

impl ChannelWriter {
    pub(crate) fn new(tx: Sender<Vec<u8>>, cancel: CancelToken) -> Self {
        Self { tx, cancel }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut msg = buf.to_vec();
        loop {
            if self.cancel.is_cancelled() {
                return Err(StreamError::Cancelled.into());
            }
            match self.tx.send_timeout(msg, SEND_POLL) {
                Ok(()) => return Ok(buf.len()),
                Err(SendTimeoutError::Timeout(back)) => msg = back,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "encoded stream reader went away",
                    ));
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Incrementally produced encoder output.
///
/// Reading drains buffers from the producer thread. End of stream is only
/// reported once the producer has finished successfully; a producer error or
/// panic surfaces as an `io::Error` from `read`. Dropping the stream cancels
/// and joins the producer.
pub struct EncodedStream {
    rx: Option<Receiver<Vec<u8>>>,
    current: Vec<u8>,
    offset: usize,
    cancel: CancelToken,
    read_timeout: Option<Duration>,
    producer: Option<JoinHandle<Result<EncodeSummary>>>,
    finished: bool,
    summary: Option<EncodeSummary>,
}

impl EncodedStream {
    pub(crate) fn spawn<F>(
        depth: usize,
        cancel: CancelToken,
        read_timeout: Option<Duration>,
        job: F,
    ) -> Result<Self>
    where
        F: FnOnce(ChannelWriter) -> Result<EncodeSummary> + Send + 'static,
    {
        let (tx, rx) = bounded(depth.max(1));
        let writer = ChannelWriter::new(tx, cancel.clone());
        let producer = thread::Builder::new()
            .name("dirstream-encode".into())
            .spawn(move || job(writer))?;
        Ok(Self {
            rx: Some(rx),
            current: Vec::new(),
            offset: 0,
            cancel,
            read_timeout,
            producer: Some(producer),
            finished: false,
            summary: None,
        })
    }

    /// Totals reported by the producer, available after end of stream.
    pub fn summary(&self) -> Option<&EncodeSummary> {
        self.summary.as_ref()
    }

    /// Token that stops this stream's producer.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    fn next_buffer(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(rx) = self.rx.as_ref() else {
            return Ok(None);
        };
        let received = match self.read_timeout {
            None => rx.recv().ok(),
            Some(limit) => match rx.recv_timeout(limit) {
                Ok(buf) => Some(buf),
                Err(RecvTimeoutError::Disconnected) => None,
                Err(RecvTimeoutError::Timeout) => {
                    self.cancel.cancel();
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "timed out waiting for encoder output",
                    ));
                }
            },
        };
        if received.is_some() {
            return Ok(received);
        }
        // Channel closed: the producer is done, one way or another.
        self.rx = None;
        self.finish()?;
        Ok(None)
    }

    fn finish(&mut self) -> io::Result<()> {
        let Some(handle) = self.producer.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Ok(summary)) => {
                self.summary = Some(summary);
                self.finished = true;
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(io::Error::other("encoder thread panicked")),
        }
    }
}

impl Read for EncodedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.next_buffer()? {
                Some(next) => {
                    self.current = next;
                    self.offset = 0;
                }
                None if self.finished => return Ok(0),
                None => {
                    return Err(io::Error::other("encoded stream already failed"));
                }
            }
        }
        let n = (self.current.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

impl Drop for EncodedStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        // Disconnect first so a producer blocked on send wakes up.
        self.rx = None;
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn run<F>(timeout: Option<Duration>, job: F) -> EncodedStream
    where
        F: FnOnce(ChannelWriter) -> Result<EncodeSummary> + Send + 'static,
    {
        EncodedStream::spawn(2, CancelToken::new(), timeout, job).unwrap()
    }

    #[test]
    fn child_sees_parent_but_not_siblings() {
        let parent = CancelToken::new();
        let a = parent.child();
        let b = parent.child();
        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!parent.is_cancelled());
        parent.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn bytes_flow_through_in_order() {
        let mut s = run(None, |mut w| {
            for i in 0..100u8 {
                w.write_all(&[i; 10])?;
            }
            Ok(EncodeSummary::default())
        });
        let mut out = Vec::new();
        s.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 1000);
        assert_eq!(out[999], 99);
        assert!(s.summary().is_some());
    }

    #[test]
    fn producer_error_is_not_eof() {
        let mut s = run(None, |mut w| {
            w.write_all(b"partial")?;
            Err(StreamError::Setup {
                path: "x".into(),
                reason: "boom".into(),
            })
        });
        let mut out = Vec::new();
        let err = s.read_to_end(&mut out).unwrap_err();
        assert_eq!(StreamError::from(err).kind(), ErrorKind::Setup);
    }

    #[test]
    fn producer_panic_is_an_error() {
        let mut s = run(None, |_w| panic!("producer blew up"));
        let err = s.read_to_end(&mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("panicked"), "{err}");
    }

    #[test]
    fn slow_producer_times_out() {
        let mut s = run(Some(Duration::from_millis(50)), |mut w| {
            thread::sleep(Duration::from_millis(500));
            w.write_all(b"late")?;
            Ok(EncodeSummary::default())
        });
        let err = s.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(s.cancel_token().is_cancelled());
    }

    #[test]
    fn drop_unblocks_a_full_pipe() {
        let s = run(None, |mut w| {
            loop {
                w.write_all(&[0u8; 64])?;
            }
        });
        // The producer is parked on a full channel; dropping must not hang.
        thread::sleep(Duration::from_millis(50));
        drop(s);
    }
}
