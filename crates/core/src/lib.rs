//! Core primitives shared by the cartridge filesystem crates.
//!
//! Nothing in here knows about a particular console or title. The system
//! crates build on:
//!
//! - [`Codec`]: the byte-exact compression contract containers rely on
//! - [`mips`]: split-address encoding for the `lui`/`addiu` load idiom
//! - [`bytes`]: bounds-checked big-endian reads and writes
//! - [`logging`]: category/level logging used across the workspace

pub mod bytes;
pub mod logging;
pub mod mips;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Compression algorithm selector stored in an entry header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressionTag(pub u32);

impl CompressionTag {
    /// Stored as-is.
    pub const NONE: Self = Self(0);
    pub const LZSS: Self = Self(1);
    pub const SLIDE: Self = Self(2);
    pub const FSLIDE_ALT: Self = Self(3);
    pub const FSLIDE: Self = Self(4);
    pub const RLE: Self = Self(5);

    pub fn is_raw(self) -> bool {
        self == Self::NONE
    }
}

impl std::fmt::Display for CompressionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::NONE => write!(f, "none"),
            Self::LZSS => write!(f, "lzss"),
            Self::SLIDE => write!(f, "slide"),
            Self::FSLIDE_ALT => write!(f, "fslide-alt"),
            Self::FSLIDE => write!(f, "fslide"),
            Self::RLE => write!(f, "rle"),
            Self(other) => write!(f, "tag {}", other),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unsupported compression: {0}")]
    UnsupportedTag(CompressionTag),
    #[error("Malformed {tag} stream: {reason}")]
    Malformed { tag: CompressionTag, reason: String },
}

/// Result of a decompression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub bytes: Vec<u8>,
    /// Number of compressed input bytes the stream occupied.
    pub consumed: usize,
}

/// Compression algorithms, selected by tag.
///
/// Implementations must be byte-exact: containers keep the compressed
/// blob of every untouched entry and write it back verbatim, so
/// `consumed` has to report exactly how much of `src` belongs to the
/// stream. `src` may extend past the end of the stream.
pub trait Codec: Send + Sync {
    fn decompress(
        &self,
        tag: CompressionTag,
        src: &[u8],
        decompressed_len: usize,
    ) -> Result<Decompressed, CodecError>;

    fn compress(&self, tag: CompressionTag, src: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Codec that only understands uncompressed data.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    fn decompress(
        &self,
        tag: CompressionTag,
        src: &[u8],
        decompressed_len: usize,
    ) -> Result<Decompressed, CodecError> {
        if !tag.is_raw() {
            return Err(CodecError::UnsupportedTag(tag));
        }
        let bytes = src.get(..decompressed_len).ok_or_else(|| CodecError::Malformed {
            tag,
            reason: format!(
                "need {} bytes, only {} available",
                decompressed_len,
                src.len()
            ),
        })?;
        Ok(Decompressed {
            bytes: bytes.to_vec(),
            consumed: decompressed_len,
        })
    }

    fn compress(&self, tag: CompressionTag, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        if !tag.is_raw() {
            return Err(CodecError::UnsupportedTag(tag));
        }
        Ok(src.to_vec())
    }
}

/// Round `value` up to a multiple of `align` (`align` of 0 or 1 is a no-op).
pub fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        return value;
    }
    value.div_ceil(align) * align
}
