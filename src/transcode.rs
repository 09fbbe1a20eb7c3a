//! Asset-bundle transcoder: peels the `.vrcaz` envelope and decompresses the
//! inner stream with the codec the header declares, producing the canonical
//! `.vrca` payload the Service accepts.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::IoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    None,
    Lz4Frame,
    XzLzma,
    Zstandard,
}

impl Codec {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Codec::None),
            0x01 => Some(Codec::Lz4Frame),
            0x02 => Some(Codec::XzLzma),
            0x03 => Some(Codec::Zstandard),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("envelope is too short to contain a codec tag")]
    EnvelopeInvalid,
    #[error("unsupported codec tag: 0x{0:02x}")]
    UnsupportedCodec(u8),
    #[error("codec decompression failed: {0}")]
    CodecFailure(String),
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Transcode a `.vrcaz` envelope at `source` into a canonical `.vrca`
/// payload written to `dest`. The destination is written to `{dest}.tmp`
/// and atomically renamed into place so a crash mid-transcode never leaves
/// a partial canonical file.
pub async fn transcode(source: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<(), CodecError> {
    let source = source.as_ref().to_path_buf();
    let dest = dest.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || transcode_blocking(&source, &dest))
        .await
        .expect("transcode task panicked")
}

fn transcode_blocking(source: &PathBuf, dest: &PathBuf) -> Result<(), CodecError> {
    let mut input = std::fs::File::open(source).map_err(|e| IoError::at(source, e))?;

    let mut tag = [0u8; 1];
    if input.read_exact(&mut tag).is_err() {
        return Err(CodecError::EnvelopeInvalid);
    }
    let codec = Codec::from_tag(tag[0]).ok_or(CodecError::UnsupportedCodec(tag[0]))?;

    let tmp_dest = dest.with_extension("tmp");
    let out = std::fs::File::create(&tmp_dest).map_err(|e| IoError::at(&tmp_dest, e))?;

    decompress(codec, input, out)?;

    std::fs::rename(&tmp_dest, dest).map_err(|e| IoError::at(dest, e))?;
    Ok(())
}

fn decompress(codec: Codec, mut input: impl Read, mut out: impl Write) -> Result<(), CodecError> {
    match codec {
        Codec::None => {
            std::io::copy(&mut input, &mut out).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
        Codec::Lz4Frame => {
            let mut decoder = lz4_flex::frame::FrameDecoder::new(input);
            std::io::copy(&mut decoder, &mut out)
                .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
        Codec::XzLzma => {
            let mut decoder = xz2::read::XzDecoder::new(input);
            std::io::copy(&mut decoder, &mut out)
                .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
        Codec::Zstandard => {
            let mut decoder =
                zstd::stream::read::Decoder::new(&mut input).map_err(|e| CodecError::CodecFailure(e.to_string()))?;
            std::io::copy(&mut decoder, &mut out)
                .map_err(|e| CodecError::CodecFailure(e.to_string()))?;
        }
    }
    out.flush().map_err(|e| CodecError::CodecFailure(e.to_string()))?;
    Ok(())
}

/// Compress `data` with the given codec and prepend the codec tag byte,
/// producing a `.vrcaz`-shaped envelope. Only used by tests to build
/// round-trip fixtures; the pipeline itself never produces envelopes.
#[cfg(test)]
pub fn encode_envelope(codec: Codec, data: &[u8]) -> Vec<u8> {
    let tag: u8 = match codec {
        Codec::None => 0x00,
        Codec::Lz4Frame => 0x01,
        Codec::XzLzma => 0x02,
        Codec::Zstandard => 0x03,
    };
    let mut out = vec![tag];
    match codec {
        Codec::None => out.extend_from_slice(data),
        Codec::Lz4Frame => {
            let mut encoder = lz4_flex::frame::FrameEncoder::new(Vec::new());
            encoder.write_all(data).unwrap();
            out.extend(encoder.finish().unwrap());
        }
        Codec::XzLzma => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data).unwrap();
            out.extend(encoder.finish().unwrap());
        }
        Codec::Zstandard => {
            let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), 0).unwrap();
            encoder.write_all(data).unwrap();
            out.extend(encoder.finish().unwrap());
        }
    }
    out
}
