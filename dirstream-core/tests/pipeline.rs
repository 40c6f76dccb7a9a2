mod common;

use common::encoder;
use dirstream_core::{CancelToken, EncodeOptions, Encoder, ErrorKind, StreamError};
use std::fs;
use std::io::Read;
use std::time::{Duration, Instant};

#[test]
fn streamed_and_synchronous_output_are_identical() {
    let src = tempfile::tempdir().unwrap();
    fs::create_dir(src.path().join("d")).unwrap();
    fs::write(src.path().join("d/a"), vec![3u8; 70_000]).unwrap();
    let paths = ["d", "d/a"];

    let enc = encoder(src.path(), 1000);
    let mut direct = Vec::new();
    enc.encode_to(&paths, &mut direct).unwrap();

    let mut streamed = Vec::new();
    enc.encode(&paths).unwrap().read_to_end(&mut streamed).unwrap();
    assert_eq!(direct, streamed);
}

#[test]
fn cancelled_parent_token_stops_the_stream() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("f"), b"content").unwrap();
    let cancel = CancelToken::new();
    let opts = EncodeOptions {
        cancel: cancel.clone(),
        ..Default::default()
    };
    let enc = Encoder::new(src.path(), opts).unwrap();
    cancel.cancel();

    let mut out = Vec::new();
    let err = enc.encode(&["f"]).unwrap().read_to_end(&mut out).unwrap_err();
    assert_eq!(StreamError::from(err).kind(), ErrorKind::Cancelled);
}

#[test]
fn one_stream_failing_does_not_poison_the_next() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("f"), b"content").unwrap();
    let enc = encoder(src.path(), 0);

    let first = enc.encode(&["f"]).unwrap();
    first.cancel_token().cancel();
    drop(first);

    let mut out = Vec::new();
    enc.encode(&["f"]).unwrap().read_to_end(&mut out).unwrap();
    assert!(!out.is_empty());
}

#[test]
fn dropping_a_half_read_stream_returns_promptly() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("big"), vec![0u8; 8 * 1024 * 1024]).unwrap();
    let enc = encoder(src.path(), 4096);

    let mut stream = enc.encode(&["big"]).unwrap();
    let mut head = [0u8; 100];
    stream.read_exact(&mut head).unwrap();
    let started = Instant::now();
    drop(stream);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn io_failure_surfaces_through_read() {
    let src = tempfile::tempdir().unwrap();
    let enc = encoder(src.path(), 0);
    let mut out = Vec::new();
    let err = enc
        .encode(&["does-not-exist"])
        .unwrap()
        .read_to_end(&mut out)
        .unwrap_err();
    let err = StreamError::from(err);
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("does-not-exist"), "{err}");
}
