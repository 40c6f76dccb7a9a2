use super::stream::StreamReader;
use crate::error::Result;
use std::io::{self, Read};

/// Where a resynchronization scan landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resync {
    pub magic: u32,
    /// Bytes discarded before the magic.
    pub skipped: u64,
}

/// Scan forward byte by byte for any of `wanted`, examining at most `budget`
/// bytes. On a hit the magic is pushed back so the caller can parse the
/// record it introduces. Returns `None` at end of stream or when the budget
/// runs out.
pub fn scan_for_magic<R: Read>(
    r: &mut StreamReader<R>,
    wanted: &[u32],
    budget: u64,
) -> Result<Option<Resync>> {
    let mut window = 0u32;
    let mut seen = 0u64;
    let mut byte = [0u8; 1];
    while seen < budget {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        seen += 1;
        window = (window << 8) | u32::from(byte[0]);
        if seen >= 4 && wanted.contains(&window) {
            r.unread(&window.to_be_bytes());
            return Ok(Some(Resync {
                magic: window,
                skipped: seen - 4,
            }));
        }
    }
    Ok(None)
}
