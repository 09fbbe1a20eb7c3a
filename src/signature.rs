//! Rsync-compatible signature generation.
//!
//! A signature file is a sequence of fixed-size block fingerprints: a weak
//! rolling checksum (the classic Adler-style two-sum rolling checksum rsync
//! uses, so a delta algorithm could roll a window across a new file and find
//! matching blocks cheaply) plus a strong hash (MD4, truncated to 8 bytes,
//! librsync's default). Block size follows librsync's default heuristic:
//! `sqrt(file_size)` rounded up to the next power of two, clamped to
//! `[MIN_BLOCK_LEN, MAX_BLOCK_LEN]`.
//!
//! The pipeline never produces a delta from this signature (see the Open
//! Question in SPEC_FULL.md §9) — it is generated and uploaded on every
//! version purely because the Service requires one.

use md4::Digest as Md4Digest;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::IoError;

const MIN_BLOCK_LEN: u32 = 512;
const MAX_BLOCK_LEN: u32 = 1 << 17; // 128 KiB
const STRONG_LEN: usize = 8;
const MAGIC: u32 = 0x7273_0136; // "rs" + MD4-signature version tag

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("could not read source file: {0}")]
    Io(#[from] IoError),
    #[error("signature algorithm rejected the stream: {0}")]
    Algorithm(String),
}

/// Block size librsync would pick for a file of this size: sqrt(size)
/// rounded up to the next power of two, clamped to a sane range.
pub fn block_size_for(file_size: u64) -> u32 {
    if file_size == 0 {
        return MIN_BLOCK_LEN;
    }
    let sqrt = (file_size as f64).sqrt().ceil() as u32;
    let pow2 = sqrt.next_power_of_two();
    pow2.clamp(MIN_BLOCK_LEN, MAX_BLOCK_LEN)
}

/// Generate a signature for `source`, writing it to `dest`. By convention
/// the orchestrator invokes this with `dest = "{source}.sig"`.
pub async fn generate_signature(
    source: impl AsRef<Path>,
    dest: impl AsRef<Path>,
) -> Result<(), SignatureError> {
    let source = source.as_ref().to_path_buf();
    let dest = dest.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || generate_signature_blocking(&source, &dest))
        .await
        .expect("signature task panicked")
}

fn generate_signature_blocking(source: &PathBuf, dest: &PathBuf) -> Result<(), SignatureError> {
    let metadata = std::fs::metadata(source).map_err(|e| IoError::at(source, e))?;
    let block_len = block_size_for(metadata.len());

    let mut file = std::fs::File::open(source).map_err(|e| IoError::at(source, e))?;
    let tmp_dest = dest.with_extension("sig.tmp");
    let mut out = std::fs::File::create(&tmp_dest).map_err(|e| IoError::at(&tmp_dest, e))?;

    out.write_all(&MAGIC.to_be_bytes())
        .map_err(|e| IoError::at(&tmp_dest, e))?;
    out.write_all(&block_len.to_be_bytes())
        .map_err(|e| IoError::at(&tmp_dest, e))?;
    out.write_all(&(STRONG_LEN as u32).to_be_bytes())
        .map_err(|e| IoError::at(&tmp_dest, e))?;

    let mut buf = vec![0u8; block_len as usize];
    loop {
        let n = file.read(&mut buf).map_err(|e| IoError::at(source, e))?;
        if n == 0 {
            break;
        }
        let block = &buf[..n];
        let weak = rolling_weak_checksum(block);
        let strong = strong_hash(block);

        out.write_all(&weak.to_be_bytes())
            .map_err(|e| IoError::at(&tmp_dest, e))?;
        out.write_all(&strong)
            .map_err(|e| IoError::at(&tmp_dest, e))?;
    }
    out.flush().map_err(|e| IoError::at(&tmp_dest, e))?;
    drop(out);

    std::fs::rename(&tmp_dest, dest).map_err(|e| IoError::at(dest, e))?;
    Ok(())
}

/// The classic rsync weak rolling checksum: two 16-bit running sums packed
/// into a u32, `(b << 16) | a`.
fn rolling_weak_checksum(block: &[u8]) -> u32 {
    let mut a: u32 = 0;
    let mut b: u32 = 0;
    for (i, &byte) in block.iter().enumerate() {
        a = a.wrapping_add(byte as u32);
        b = b.wrapping_add((block.len() - i) as u32 * byte as u32);
    }
    (b << 16) | (a & 0xffff)
}

fn strong_hash(block: &[u8]) -> [u8; STRONG_LEN] {
    let mut hasher = md4::Md4::new();
    hasher.update(block);
    let full: [u8; 16] = hasher.finalize().into();
    let mut truncated = [0u8; STRONG_LEN];
    truncated.copy_from_slice(&full[..STRONG_LEN]);
    truncated
}

/// One parsed block fingerprint, as read back out of a signature file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    pub weak: u32,
    pub strong: [u8; STRONG_LEN],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    pub block_len: u32,
    pub blocks: Vec<SignatureBlock>,
}

/// Read a signature file back into its block fingerprints. Used by tests to
/// assert self-consistency (invariant 3 in SPEC_FULL.md §8): regenerating a
/// signature for a file whose content matches a given signature produces the
/// same block fingerprints.
pub fn parse_signature(bytes: &[u8]) -> Result<ParsedSignature, SignatureError> {
    if bytes.len() < 12 {
        return Err(SignatureError::Algorithm("signature too short".into()));
    }
    let magic = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(SignatureError::Algorithm("bad magic".into()));
    }
    let block_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    let strong_len = u32::from_be_bytes(bytes[8..12].try_into().unwrap()) as usize;
    if strong_len != STRONG_LEN {
        return Err(SignatureError::Algorithm("unexpected strong length".into()));
    }

    let mut blocks = Vec::new();
    let mut rest = &bytes[12..];
    while !rest.is_empty() {
        if rest.len() < 4 + STRONG_LEN {
            return Err(SignatureError::Algorithm("truncated block record".into()));
        }
        let weak = u32::from_be_bytes(rest[0..4].try_into().unwrap());
        let mut strong = [0u8; STRONG_LEN];
        strong.copy_from_slice(&rest[4..4 + STRONG_LEN]);
        blocks.push(SignatureBlock { weak, strong });
        rest = &rest[4 + STRONG_LEN..];
    }

    Ok(ParsedSignature { block_len, blocks })
}

/// Recompute block fingerprints directly from a source file's bytes and
/// compare against a parsed signature — `librsync_signature_verify` from
/// SPEC_FULL.md §8's invariant 3.
pub fn verify_signature(source_bytes: &[u8], sig: &ParsedSignature) -> bool {
    let block_len = sig.block_len as usize;
    let mut computed = Vec::new();
    for chunk in source_bytes.chunks(block_len.max(1)) {
        computed.push(SignatureBlock {
            weak: rolling_weak_checksum(chunk),
            strong: strong_hash(chunk),
        });
    }
    computed == sig.blocks
}
