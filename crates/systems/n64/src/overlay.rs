//! Relocatable code overlays.
//!
//! The code section holds a table of overlay records. Each record names a
//! ROM range holding the overlay's code plus the RAM addresses it is
//! linked at. Overlays are cached as separate byte blobs so that several
//! save steps can patch them before they are written back, last.

use crate::ContainerError;
use romfs_core::bytes::{read_u32, write_u32};
use romfs_core::logging::{log, LogCategory, LogLevel};
use romfs_core::align_up;
use serde::{Deserialize, Serialize};

/// Bytes per overlay table record (nine words)
pub const OVERLAY_RECORD_SIZE: usize = 36;
/// Alignment of each overlay blob in the rebuilt image
pub const OVERLAY_ALIGN: usize = 16;

/// Where the overlay table sits in the code section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayTableConfig {
    pub table_offset: u32,
    pub count: u32,
}

/// One overlay table record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlayInfo {
    pub rom_start: u32,
    pub rom_end: u32,
    pub ram_start: u32,
    pub code_start: u32,
    pub code_end: u32,
    pub rodata_start: u32,
    pub rodata_end: u32,
    pub bss_start: u32,
    pub bss_end: u32,
}

impl OverlayInfo {
    fn read(buf: &[u8], offset: usize) -> Option<Self> {
        let w = |i: usize| read_u32(buf, offset + 4 * i);
        Some(Self {
            rom_start: w(0)?,
            rom_end: w(1)?,
            ram_start: w(2)?,
            code_start: w(3)?,
            code_end: w(4)?,
            rodata_start: w(5)?,
            rodata_end: w(6)?,
            bss_start: w(7)?,
            bss_end: w(8)?,
        })
    }

    fn write(&self, buf: &mut [u8], offset: usize) -> Option<()> {
        let words = [
            self.rom_start,
            self.rom_end,
            self.ram_start,
            self.code_start,
            self.code_end,
            self.rodata_start,
            self.rodata_end,
            self.bss_start,
            self.bss_end,
        ];
        for (i, value) in words.into_iter().enumerate() {
            write_u32(buf, offset + 4 * i, value)?;
        }
        Some(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Overlay {
    info: OverlayInfo,
    code: Vec<u8>,
}

/// All overlays of a loaded image plus the location of their table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlaySet {
    table_offset: usize,
    overlays: Vec<Overlay>,
}

impl OverlaySet {
    /// Read the overlay table and copy every overlay out of `rom`.
    pub fn extract(rom: &[u8], config: &OverlayTableConfig) -> Result<Self, ContainerError> {
        let table_offset = config.table_offset as usize;
        let count = config.count as usize;

        let mut overlays = Vec::with_capacity(count);
        for index in 0..count {
            let record = table_offset + index * OVERLAY_RECORD_SIZE;
            let info = OverlayInfo::read(rom, record).ok_or(ContainerError::Truncated {
                offset: record,
                needed: OVERLAY_RECORD_SIZE,
                available: rom.len(),
            })?;
            let (start, end) = (info.rom_start as usize, info.rom_end as usize);
            let code = rom
                .get(start..end.max(start))
                .ok_or(ContainerError::Truncated {
                    offset: start,
                    needed: end.saturating_sub(start),
                    available: rom.len(),
                })?
                .to_vec();
            overlays.push(Overlay { info, code });
        }

        log(LogCategory::Container, LogLevel::Debug, || {
            format!(
                "Extracted {} overlays from table at {:#X}",
                overlays.len(),
                table_offset
            )
        });

        Ok(Self {
            table_offset,
            overlays,
        })
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.overlays.get(index).map(|o| o.code.as_slice())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.overlays.get_mut(index).map(|o| o.code.as_mut_slice())
    }

    /// Replace an overlay's code. RAM-side addresses are left for the
    /// caller to adjust through [`info_mut`](Self::info_mut).
    pub fn write(&mut self, index: usize, code: Vec<u8>) -> Result<(), ContainerError> {
        let overlay = self
            .overlays
            .get_mut(index)
            .ok_or(ContainerError::NoSuchOverlay { index })?;
        overlay.code = code;
        Ok(())
    }

    pub fn info(&self, index: usize) -> Option<&OverlayInfo> {
        self.overlays.get(index).map(|o| &o.info)
    }

    pub fn info_mut(&mut self, index: usize) -> Option<&mut OverlayInfo> {
        self.overlays.get_mut(index).map(|o| &mut o.info)
    }

    /// Lowest ROM offset occupied by a non-empty overlay.
    pub fn rom_start(&self) -> Option<usize> {
        self.overlays
            .iter()
            .filter(|o| !o.code.is_empty())
            .map(|o| o.info.rom_start as usize)
            .min()
    }

    pub fn byte_length(&self) -> usize {
        self.overlays
            .iter()
            .map(|o| align_up(o.code.len(), OVERLAY_ALIGN))
            .sum()
    }

    /// Write every overlay starting at `offset` and point the table in
    /// `rom` at the new locations. Returns the offset past the last one.
    pub fn pack(&self, rom: &mut [u8], offset: usize) -> Result<usize, ContainerError> {
        let available = rom.len();
        let mut cursor = offset;

        for (index, overlay) in self.overlays.iter().enumerate() {
            let end = cursor + overlay.code.len();
            rom.get_mut(cursor..end)
                .ok_or(ContainerError::Truncated {
                    offset: cursor,
                    needed: overlay.code.len(),
                    available,
                })?
                .copy_from_slice(&overlay.code);

            let info = OverlayInfo {
                rom_start: cursor as u32,
                rom_end: end as u32,
                ..overlay.info
            };
            let record = self.table_offset + index * OVERLAY_RECORD_SIZE;
            info.write(rom, record).ok_or(ContainerError::Truncated {
                offset: record,
                needed: OVERLAY_RECORD_SIZE,
                available,
            })?;

            log(LogCategory::Container, LogLevel::Trace, || {
                format!("Overlay {} at {:#X}-{:#X}", index, cursor, end)
            });
            cursor = align_up(end, OVERLAY_ALIGN);
        }
        Ok(cursor)
    }
}
