//! A single container entry, kept decompressed with its original encoding.

use romfs_core::CompressionTag;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stored {
    Raw,
    /// The exact bytes that were on the ROM (or produced by an explicit
    /// re-compression), written back as-is while the entry is untouched.
    Compressed { tag: CompressionTag, blob: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    data: Vec<u8>,
    stored: Stored,
}

impl Entry {
    pub fn raw(data: Vec<u8>) -> Self {
        Self {
            data,
            stored: Stored::Raw,
        }
    }

    /// An entry whose on-ROM form is `blob` compressed with `tag`.
    pub fn compressed(data: Vec<u8>, tag: CompressionTag, blob: Vec<u8>) -> Self {
        if tag.is_raw() {
            return Self::raw(data);
        }
        Self {
            data,
            stored: Stored::Compressed { tag, blob },
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn decompressed_len(&self) -> usize {
        self.data.len()
    }

    pub fn tag(&self) -> CompressionTag {
        match &self.stored {
            Stored::Raw => CompressionTag::NONE,
            Stored::Compressed { tag, .. } => *tag,
        }
    }

    pub fn compressed_blob(&self) -> Option<&[u8]> {
        match &self.stored {
            Stored::Raw => None,
            Stored::Compressed { blob, .. } => Some(blob.as_slice()),
        }
    }

    /// Tag and payload to write; `force_raw` ignores any cached blob.
    pub(crate) fn payload(&self, force_raw: bool) -> (CompressionTag, &[u8]) {
        match &self.stored {
            Stored::Compressed { tag, blob } if !force_raw => (*tag, blob.as_slice()),
            _ => (CompressionTag::NONE, self.data.as_slice()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_entry() {
        let entry = Entry::raw(vec![1, 2, 3]);
        assert_eq!(entry.tag(), CompressionTag::NONE);
        assert_eq!(entry.decompressed_len(), 3);
        assert_eq!(entry.compressed_blob(), None);
        assert_eq!(entry.payload(false), (CompressionTag::NONE, &[1u8, 2, 3][..]));
    }

    #[test]
    fn test_compressed_entry_payload() {
        let entry = Entry::compressed(vec![7; 16], CompressionTag::RLE, vec![16, 7, 0]);
        assert_eq!(entry.tag(), CompressionTag::RLE);
        assert_eq!(entry.payload(false), (CompressionTag::RLE, &[16u8, 7, 0][..]));
        // Forcing raw writes the decompressed bytes
        let (tag, payload) = entry.payload(true);
        assert_eq!(tag, CompressionTag::NONE);
        assert_eq!(payload.len(), 16);
    }

    #[test]
    fn test_compressed_with_raw_tag_is_raw() {
        let entry = Entry::compressed(vec![1], CompressionTag::NONE, vec![1]);
        assert_eq!(entry, Entry::raw(vec![1]));
    }
}
