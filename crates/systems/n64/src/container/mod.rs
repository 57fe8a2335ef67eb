//! Indexed containers: directory-of-entries regions embedded in the ROM.
//!
//! Every container shares one logical shape, `Container = Directory[]`,
//! `Directory = Entry[]`, and differs only in its [`ContainerLayout`].
//! A container is extracted once on load, mutated through `get`/`write`,
//! and rebuilt from scratch on every save.
//!
//! Sizing and packing walk the same placement so that
//! [`IndexedContainer::byte_length`] always equals the number of bytes
//! [`IndexedContainer::pack`] writes.

mod entry;
mod kinds;
mod layout;

pub use entry::Entry;
pub use kinds::ContainerId;
pub use layout::{typed_header_len, ContainerLayout, EntryFormat, Nesting};

use crate::ContainerError;
use layout::{has_duplicate_size, table_len};
use romfs_core::bytes::{read_u32, write_u32};
use romfs_core::logging::{log, LogCategory, LogLevel};
use romfs_core::{align_up, Codec, CompressionTag};

/// Options that change how entries are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackOptions {
    /// Write every entry uncompressed, ignoring cached compressed blobs.
    pub force_decompressed: bool,
}

/// Missing slots are `None` and pack as zero-length raw placeholders.
type Directory = Vec<Option<Entry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedContainer {
    layout: ContainerLayout,
    dirs: Vec<Directory>,
}

/// Region-relative positions of everything `pack` writes.
struct Placement {
    dirs: Vec<DirPlacement>,
    total: usize,
}

struct DirPlacement {
    start: usize,
    /// Entry starts, relative to `start`
    entries: Vec<usize>,
    /// End of the last entry, relative to `start`
    entries_end: usize,
}

fn word(region: &[u8], offset: usize) -> Result<u32, ContainerError> {
    read_u32(region, offset).ok_or(ContainerError::Truncated {
        offset,
        needed: 4,
        available: region.len(),
    })
}

fn slice(region: &[u8], offset: usize, len: usize) -> Result<&[u8], ContainerError> {
    offset
        .checked_add(len)
        .and_then(|end| region.get(offset..end))
        .ok_or(ContainerError::Truncated {
            offset,
            needed: len,
            available: region.len(),
        })
}

/// Read a count word and its offsets, dropping the sentinel from the count.
fn read_table(
    region: &[u8],
    start: usize,
    sentinel: bool,
) -> Result<(usize, Vec<usize>), ContainerError> {
    let raw_count = word(region, start)? as usize;
    let table_bytes = raw_count.checked_mul(4).ok_or(ContainerError::Truncated {
        offset: start,
        needed: usize::MAX,
        available: region.len(),
    })?;
    slice(region, start + 4, table_bytes)?;

    let offsets = (0..raw_count)
        .map(|i| word(region, start + 4 + 4 * i).map(|v| v as usize))
        .collect::<Result<Vec<_>, _>>()?;
    let count = if sentinel {
        raw_count.saturating_sub(1)
    } else {
        raw_count
    };
    Ok((count, offsets))
}

impl IndexedContainer {
    pub fn new(layout: ContainerLayout) -> Self {
        let dirs = match layout.nesting {
            Nesting::Flat => vec![Vec::new()],
            Nesting::Nested => Vec::new(),
        };
        Self { layout, dirs }
    }

    /// Read a container starting at `offset` in `rom`, decompressing every
    /// entry.
    pub fn extract(
        layout: ContainerLayout,
        rom: &[u8],
        offset: usize,
        codec: &dyn Codec,
    ) -> Result<Self, ContainerError> {
        let region = rom.get(offset..).ok_or(ContainerError::Truncated {
            offset,
            needed: 4,
            available: rom.len(),
        })?;

        let dirs = match layout.nesting {
            Nesting::Flat => vec![Self::extract_directory(&layout, region, 0, 0, codec)?],
            Nesting::Nested => {
                let (count, offsets) = read_table(region, 0, layout.dir_table_sentinel())?;
                let mut dirs = Vec::with_capacity(count);
                for (index, &dir_start) in offsets.iter().take(count).enumerate() {
                    dirs.push(Self::extract_directory(
                        &layout, region, dir_start, index, codec,
                    )?);
                }
                dirs
            }
        };

        log(LogCategory::Container, LogLevel::Debug, || {
            format!(
                "Extracted {} directories ({} entries) at {:#X}",
                dirs.len(),
                dirs.iter().map(Vec::len).sum::<usize>(),
                offset
            )
        });

        Ok(Self { layout, dirs })
    }

    fn extract_directory(
        layout: &ContainerLayout,
        region: &[u8],
        dir_start: usize,
        dir: usize,
        codec: &dyn Codec,
    ) -> Result<Directory, ContainerError> {
        let (count, offsets) = read_table(region, dir_start, layout.entry_sentinel())?;
        let mut entries = Vec::with_capacity(count);

        for index in 0..count {
            let start = dir_start + offsets[index];
            let entry = match layout.entries {
                EntryFormat::Typed => Self::extract_typed(region, start, dir, index, codec)?,
                EntryFormat::Bare => {
                    let end = dir_start + offsets[index + 1];
                    let len = end.checked_sub(start).ok_or_else(|| ContainerError::Truncated {
                        offset: start,
                        needed: start - end,
                        available: region.len(),
                    })?;
                    Entry::raw(slice(region, start, len)?.to_vec())
                }
            };
            entries.push(Some(entry));
        }
        Ok(entries)
    }

    fn extract_typed(
        region: &[u8],
        start: usize,
        dir: usize,
        index: usize,
        codec: &dyn Codec,
    ) -> Result<Entry, ContainerError> {
        let size = word(region, start)? as usize;
        let tag = CompressionTag(word(region, start + 4)?);
        let payload_start = start + typed_header_len(tag);

        if tag.is_raw() {
            return Ok(Entry::raw(slice(region, payload_start, size)?.to_vec()));
        }

        let src = region.get(payload_start..).ok_or(ContainerError::Truncated {
            offset: payload_start,
            needed: 1,
            available: region.len(),
        })?;
        let out = codec.decompress(tag, src, size)?;
        if out.bytes.len() != size {
            return Err(ContainerError::DecompressedSizeMismatch {
                dir,
                entry: index,
                expected: size,
                actual: out.bytes.len(),
            });
        }
        let blob = slice(src, 0, out.consumed)?.to_vec();

        log(LogCategory::Container, LogLevel::Trace, || {
            format!(
                "  [{}/{}] {} {} -> {} bytes",
                dir,
                index,
                tag,
                blob.len(),
                size
            )
        });
        Ok(Entry::compressed(out.bytes, tag, blob))
    }

    pub fn layout(&self) -> &ContainerLayout {
        &self.layout
    }

    pub fn directory_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn entry_count(&self, dir: usize) -> Option<usize> {
        self.dirs.get(dir).map(Vec::len)
    }

    pub fn entry(&self, dir: usize, entry: usize) -> Option<&Entry> {
        self.dirs.get(dir)?.get(entry)?.as_ref()
    }

    /// Decompressed bytes of an entry.
    pub fn get(&self, dir: usize, entry: usize) -> Option<&[u8]> {
        self.entry(dir, entry).map(Entry::data)
    }

    /// Iterate directories as slices of optional entries.
    pub fn directories(&self) -> impl Iterator<Item = &[Option<Entry>]> {
        self.dirs.iter().map(Vec::as_slice)
    }

    fn slot_mut(&mut self, dir: usize, entry: usize) -> Result<&mut Option<Entry>, ContainerError> {
        if self.layout.nesting == Nesting::Flat && dir != 0 {
            return Err(ContainerError::InvalidSlot { dir });
        }
        if self.dirs.len() <= dir {
            self.dirs.resize_with(dir + 1, Vec::new);
        }
        let directory = &mut self.dirs[dir];
        if directory.len() <= entry {
            directory.resize(entry + 1, None);
        }
        Ok(&mut directory[entry])
    }

    /// Replace an entry's content, creating the slot if needed.
    ///
    /// The entry becomes raw: any cached compressed form is dropped.
    pub fn write(&mut self, dir: usize, entry: usize, bytes: Vec<u8>) -> Result<(), ContainerError> {
        *self.slot_mut(dir, entry)? = Some(Entry::raw(bytes));
        Ok(())
    }

    /// Replace an entry's content and store it compressed with `tag`.
    pub fn write_compressed(
        &mut self,
        dir: usize,
        entry: usize,
        tag: CompressionTag,
        bytes: Vec<u8>,
        codec: &dyn Codec,
    ) -> Result<(), ContainerError> {
        if self.layout.entries == EntryFormat::Bare && !tag.is_raw() {
            return Err(ContainerError::CompressionUnsupported { tag });
        }
        let blob = codec.compress(tag, &bytes)?;
        *self.slot_mut(dir, entry)? = Some(Entry::compressed(bytes, tag, blob));
        Ok(())
    }

    /// Turn an entry back into a missing placeholder.
    pub fn clear_entry(&mut self, dir: usize, entry: usize) {
        if let Some(slot) = self.dirs.get_mut(dir).and_then(|d| d.get_mut(entry)) {
            *slot = None;
        }
    }

    fn entry_len(&self, entry: Option<&Entry>, options: PackOptions) -> usize {
        match (self.layout.entries, entry) {
            (EntryFormat::Typed, Some(entry)) => {
                let (tag, payload) = entry.payload(options.force_decompressed);
                typed_header_len(tag) + payload.len()
            }
            (EntryFormat::Typed, None) => typed_header_len(CompressionTag::NONE),
            (EntryFormat::Bare, Some(entry)) => entry.decompressed_len(),
            (EntryFormat::Bare, None) => 0,
        }
    }

    fn placement(&self, options: PackOptions) -> Placement {
        let layout = &self.layout;
        let mut pos = match layout.nesting {
            Nesting::Flat => 0,
            Nesting::Nested => table_len(self.dirs.len(), layout.dir_table_sentinel()),
        };

        let mut dirs = Vec::with_capacity(self.dirs.len());
        for directory in &self.dirs {
            let start = pos;
            pos += table_len(directory.len(), layout.entry_sentinel());

            let mut entries = Vec::with_capacity(directory.len());
            for entry in directory {
                entries.push(pos - start);
                pos += self.entry_len(entry.as_ref(), options);
                pos = align_up(pos, layout.entry_align);
            }
            let entries_end = pos - start;
            pos = align_up(pos, layout.dir_align);

            dirs.push(DirPlacement {
                start,
                entries,
                entries_end,
            });
        }

        Placement { dirs, total: pos }
    }

    /// Number of bytes [`pack`](Self::pack) will write. Writes nothing.
    pub fn byte_length(&self, options: PackOptions) -> usize {
        self.placement(options).total
    }

    /// Serialize into `buf` at `offset`; returns the offset just past the
    /// container, which is always `offset + byte_length(options)`.
    pub fn pack(
        &self,
        buf: &mut [u8],
        offset: usize,
        options: PackOptions,
    ) -> Result<usize, ContainerError> {
        let placement = self.placement(options);
        let available = buf.len();
        let out = offset
            .checked_add(placement.total)
            .and_then(|end| buf.get_mut(offset..end))
            .ok_or(ContainerError::Truncated {
                offset,
                needed: placement.total,
                available,
            })?;
        out.fill(0);

        // Offset tables first; every position is already known
        if self.layout.nesting == Nesting::Nested {
            let sentinel = self.layout.dir_table_sentinel();
            put(out, 0, (self.dirs.len() + usize::from(sentinel)) as u32)?;
            for (i, dir) in placement.dirs.iter().enumerate() {
                put(out, 4 + 4 * i, dir.start as u32)?;
            }
            if sentinel {
                put(out, 4 + 4 * self.dirs.len(), placement.total as u32)?;
            }
        }
        for (directory, dir) in self.dirs.iter().zip(&placement.dirs) {
            let sentinel = self.layout.entry_sentinel();
            put(out, dir.start, (directory.len() + usize::from(sentinel)) as u32)?;
            for (i, &entry_start) in dir.entries.iter().enumerate() {
                put(out, dir.start + 4 + 4 * i, entry_start as u32)?;
            }
            if sentinel {
                put(
                    out,
                    dir.start + 4 + 4 * directory.len(),
                    dir.entries_end as u32,
                )?;
            }
        }

        // Then the entries themselves, in the same order
        for (directory, dir) in self.dirs.iter().zip(&placement.dirs) {
            for (entry, &entry_start) in directory.iter().zip(&dir.entries) {
                self.pack_entry(out, dir.start + entry_start, entry.as_ref(), options)?;
            }
        }

        log(LogCategory::Container, LogLevel::Debug, || {
            format!(
                "Packed {} directories into {:#X} bytes at {:#X}",
                self.dirs.len(),
                placement.total,
                offset
            )
        });

        Ok(offset + placement.total)
    }

    fn pack_entry(
        &self,
        out: &mut [u8],
        start: usize,
        entry: Option<&Entry>,
        options: PackOptions,
    ) -> Result<(), ContainerError> {
        match (self.layout.entries, entry) {
            (EntryFormat::Typed, Some(entry)) => {
                let (tag, payload) = entry.payload(options.force_decompressed);
                let size = entry.decompressed_len() as u32;
                put(out, start, size)?;
                put(out, start + 4, tag.0)?;
                if has_duplicate_size(tag) {
                    put(out, start + 8, size)?;
                }
                copy(out, start + typed_header_len(tag), payload)
            }
            (EntryFormat::Typed, None) => {
                put(out, start, 0)?;
                put(out, start + 4, CompressionTag::NONE.0)
            }
            (EntryFormat::Bare, Some(entry)) => copy(out, start, entry.data()),
            (EntryFormat::Bare, None) => Ok(()),
        }
    }
}

fn put(out: &mut [u8], offset: usize, value: u32) -> Result<(), ContainerError> {
    let available = out.len();
    write_u32(out, offset, value).ok_or(ContainerError::Truncated {
        offset,
        needed: 4,
        available,
    })
}

fn copy(out: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), ContainerError> {
    let available = out.len();
    out.get_mut(offset..offset + bytes.len())
        .ok_or(ContainerError::Truncated {
            offset,
            needed: bytes.len(),
            available,
        })?
        .copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests;
