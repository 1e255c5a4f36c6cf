//! Content hashing compatible with the object store's ETag
//!
//! Files are hashed in 4MB blocks with SHA-1. A single block yields
//! `0x16 || sha1(block)`; more blocks yield `0x96 || sha1(d1 || d2 || ...)`.
//! The 21-byte result is URL-safe base64 encoded.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Block size used by the ETag scheme (4MB)
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

const SINGLE_BLOCK_PREFIX: u8 = 0x16;
const MULTI_BLOCK_PREFIX: u8 = 0x96;

/// Computes content digests for local files
pub trait ContentHasher: Send + Sync {
    /// Hash the file at `path`
    fn hash_file(&self, path: &Path) -> io::Result<String>;
}

/// ETag-compatible hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Etag;

impl ContentHasher for Etag {
    fn hash_file(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        etag_from_reader(file)
    }
}

/// Compute the ETag of everything `reader` yields
pub fn etag_from_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut block = vec![0u8; BLOCK_SIZE];
    let mut digests: Vec<Vec<u8>> = Vec::new();

    loop {
        let filled = fill_block(&mut reader, &mut block)?;
        if filled == 0 && !digests.is_empty() {
            break;
        }
        digests.push(Sha1::digest(&block[..filled]).to_vec());
        if filled < BLOCK_SIZE {
            break;
        }
    }

    let mut out = Vec::with_capacity(21);
    if digests.len() == 1 {
        out.push(SINGLE_BLOCK_PREFIX);
        out.extend_from_slice(&digests[0]);
    } else {
        let mut hasher = Sha1::new();
        for digest in &digests {
            hasher.update(digest);
        }
        out.push(MULTI_BLOCK_PREFIX);
        out.extend_from_slice(&hasher.finalize());
    }

    Ok(URL_SAFE.encode(out))
}

/// Compute the ETag of an in-memory buffer
pub fn etag_from_bytes(data: &[u8]) -> String {
    // Reading from a slice cannot fail
    etag_from_reader(data).unwrap_or_default()
}

/// Read until `buf` is full or the reader is exhausted
fn fill_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
