//! On-ROM shape of an indexed container.

use romfs_core::CompressionTag;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nesting {
    /// The region is a single directory; there is no directory table
    Flat,
    /// Directory table followed by one entry table per directory
    Nested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryFormat {
    /// Size/tag header in front of every payload
    Typed,
    /// Raw payload only. Lengths come from the distance between offsets,
    /// so the entry table always carries a trailing end offset.
    Bare,
}

/// Describes how a container is laid out.
///
/// Offsets in a directory table are relative to the region start; offsets
/// in an entry table are relative to the start of their directory. Padding
/// is measured from the region start, which is always 16-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLayout {
    pub nesting: Nesting,
    /// The directory count includes a trailing end-of-region offset.
    #[serde(default)]
    pub dir_sentinel: bool,
    pub entries: EntryFormat,
    pub entry_align: usize,
    pub dir_align: usize,
}

impl ContainerLayout {
    pub fn entry_sentinel(&self) -> bool {
        self.entries == EntryFormat::Bare
    }

    pub(crate) fn dir_table_sentinel(&self) -> bool {
        self.nesting == Nesting::Nested && self.dir_sentinel
    }
}

/// Size of a typed entry header.
///
/// The sliding-window formats repeat the decompressed size after the tag.
pub fn typed_header_len(tag: CompressionTag) -> usize {
    if has_duplicate_size(tag) {
        12
    } else {
        8
    }
}

pub(crate) fn has_duplicate_size(tag: CompressionTag) -> bool {
    matches!(
        tag,
        CompressionTag::SLIDE | CompressionTag::FSLIDE_ALT | CompressionTag::FSLIDE
    )
}

/// Length of a count word plus `count` offsets (and the sentinel, if any).
pub(crate) fn table_len(count: usize, sentinel: bool) -> usize {
    4 + 4 * (count + usize::from(sentinel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_len_by_tag() {
        assert_eq!(typed_header_len(CompressionTag::NONE), 8);
        assert_eq!(typed_header_len(CompressionTag::LZSS), 8);
        assert_eq!(typed_header_len(CompressionTag::SLIDE), 12);
        assert_eq!(typed_header_len(CompressionTag::FSLIDE_ALT), 12);
        assert_eq!(typed_header_len(CompressionTag::FSLIDE), 12);
        assert_eq!(typed_header_len(CompressionTag::RLE), 8);
    }

    #[test]
    fn test_table_len() {
        assert_eq!(table_len(0, false), 4);
        assert_eq!(table_len(0, true), 8);
        assert_eq!(table_len(3, true), 20);
    }

    #[test]
    fn test_layout_serde() {
        let json = r#"{"nesting":"flat","entries":"bare","entry_align":1,"dir_align":16}"#;
        let layout: ContainerLayout = serde_json::from_str(json).unwrap();
        assert_eq!(layout.nesting, Nesting::Flat);
        assert!(!layout.dir_sentinel);
        assert!(layout.entry_sentinel());
        assert!(!layout.dir_table_sentinel());
    }
}
