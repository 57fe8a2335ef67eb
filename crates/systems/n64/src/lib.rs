//! Container filesystem for Mario Party N64 cartridge images.
//!
//! The cartridge embeds several directory-of-entries regions after its code
//! section. This crate extracts them into memory, lets callers read and
//! replace entries, and rebuilds a bootable image:
//!
//! - **Byte order**: the four cartridge dump formats, normalized to big-endian
//! - **Containers**: main asset store, string table, background store and
//!   animation-tile store, sharing one indexed layout engine
//! - **Overlays**: relocatable code blobs, written back after every container
//! - **Relocation**: `lui`/`addiu` pointer pairs rewritten to new offsets
//! - **Checksum**: CIC header checksum recomputed on every save
//!
//! [`RomHandler`] ties these together.

mod cartridge;
mod catalog;
mod cic;
mod container;
mod game;
mod handler;
mod overlay;
mod patch;
mod plan;
#[cfg(test)]
mod test_support;

pub use cartridge::{normalize, ByteOrder, Header, BOOTCODE_END, HEADER_SIZE, N64_ROM_MAGIC};
pub use catalog::{AssetSlot, Catalog, ContainerConfig, PatchConfig};
pub use cic::{
    calculate as calculate_checksum, identify as identify_cic, update_checksum, ChecksumError,
    CicVariant, Identification, CHECKSUM_END, CHECKSUM_START,
};
pub use container::{
    typed_header_len, ContainerId, ContainerLayout, Entry, EntryFormat, IndexedContainer,
    Nesting, PackOptions,
};
pub use game::{Game, Region};
pub use handler::{BinaryPatch, NoHooks, RomHandler, SaveHooks, SaveOptions};
pub use overlay::{OverlayInfo, OverlaySet, OverlayTableConfig, OVERLAY_RECORD_SIZE};
pub use patch::{PatchOffset, PatchOffsetTable};
pub use plan::{SavePlan, Section};
pub use romfs_core::{Codec, CodecError, CompressionTag, Decompressed, RawCodec};

use thiserror::Error;

/// Failure inside one container, overlay set or patch table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("Entry {dir}/{entry} decompressed to {actual} bytes, header says {expected}")]
    DecompressedSizeMismatch {
        dir: usize,
        entry: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Patch offset {index} loads {found:#X}, first entry loads {expected:#X}")]
    RelocationInconsistent {
        index: usize,
        expected: u32,
        found: u32,
    },
    #[error("Read past end: {needed} bytes at {offset:#X}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("Flat container has no directory {dir}")]
    InvalidSlot { dir: usize },
    #[error("Entries without headers cannot be stored as {tag}")]
    CompressionUnsupported { tag: CompressionTag },
    #[error("Packed {written} bytes, expected {predicted}")]
    LengthMismatch { predicted: usize, written: usize },
    #[error("Patch offset {offset:#X} out of bounds (overlay {overlay:?})")]
    PatchOutOfBounds { offset: u32, overlay: Option<usize> },
    #[error("No patch offsets configured")]
    NoPatchOffsets,
    #[error("No overlay {index}")]
    NoSuchOverlay { index: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Image too small: {len} bytes (need {required})")]
    BufferTooSmall { len: usize, required: usize },
    #[error("Unrecognized image magic {magic:#010X}")]
    Unrecognized { magic: u32 },
    #[error("Unsupported title: {game_id}")]
    Unsupported { game_id: String },
    #[error("Corrupt {container}: {source}")]
    Corrupt {
        container: ContainerId,
        source: ContainerError,
    },
    #[error("Corrupt overlay table: {0}")]
    Overlay(ContainerError),
}

/// Raised by a [`SaveHooks`] implementation to abort a save.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("No image loaded")]
    NotLoaded,
    #[error("Could not allocate {size} bytes")]
    BufferAllocation { size: usize },
    #[error("Rebuilt image too small: {len} bytes (need {required})")]
    BufferTooSmall { len: usize, required: usize },
    #[error("Binary patch of {len} bytes at {offset:#X} lies outside the code section")]
    PatchOutOfBounds { offset: u32, len: usize },
    #[error("Packing {container}: {source}")]
    Container {
        container: ContainerId,
        source: ContainerError,
    },
    #[error("Packing overlays: {0}")]
    Overlay(ContainerError),
    #[error("Hook failed: {0}")]
    Hook(#[from] HookError),
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// Errors from the handler's entry accessors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RomError {
    #[error("No image loaded")]
    NotLoaded,
    #[error("Image has no {0}")]
    NoContainer(ContainerId),
    #[error("Unknown asset slot {0:?}")]
    NoAssetSlot(String),
    #[error(transparent)]
    Container(#[from] ContainerError),
}
