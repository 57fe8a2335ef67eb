//! Patch-offset tables: compiled-code pointers to a container.
//!
//! Each container's ROM offset is baked into the code as one or more
//! `lui`/`addiu` pairs. A [`PatchOffset`] names the byte offsets of the two
//! 16-bit immediates, either in the code section or inside one overlay.
//! After repacking, every pair is rewritten with the container's new
//! offset.

use crate::overlay::OverlaySet;
use crate::ContainerError;
use romfs_core::bytes::{read_u16, write_u16};
use romfs_core::logging::{log, LogCategory, LogLevel};
use romfs_core::mips::{join_address, split_address};
use serde::{Deserialize, Serialize};

/// Location of one split address pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOffset {
    /// Offset of the upper-half immediate
    pub upper: u32,
    /// Offset of the lower-half immediate
    pub lower: u32,
    /// Overlay whose code holds the pair; `None` for the code section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<usize>,
}

impl PatchOffset {
    pub const fn rom(upper: u32, lower: u32) -> Self {
        Self {
            upper,
            lower,
            overlay: None,
        }
    }

    pub const fn overlay(index: usize, upper: u32, lower: u32) -> Self {
        Self {
            upper,
            lower,
            overlay: Some(index),
        }
    }

    fn buffer<'a>(
        &self,
        code: &'a [u8],
        overlays: &'a OverlaySet,
    ) -> Result<&'a [u8], ContainerError> {
        match self.overlay {
            None => Ok(code),
            Some(index) => overlays
                .get(index)
                .ok_or(ContainerError::NoSuchOverlay { index }),
        }
    }

    fn buffer_mut<'a>(
        &self,
        code: &'a mut [u8],
        overlays: &'a mut OverlaySet,
    ) -> Result<&'a mut [u8], ContainerError> {
        match self.overlay {
            None => Ok(code),
            Some(index) => overlays
                .get_mut(index)
                .ok_or(ContainerError::NoSuchOverlay { index }),
        }
    }

    fn out_of_bounds(&self, offset: u32) -> ContainerError {
        ContainerError::PatchOutOfBounds {
            offset,
            overlay: self.overlay,
        }
    }

    /// Decode the address this pair currently loads.
    pub fn read(&self, code: &[u8], overlays: &OverlaySet) -> Result<u32, ContainerError> {
        let buf = self.buffer(code, overlays)?;
        let upper = read_u16(buf, self.upper as usize).ok_or_else(|| self.out_of_bounds(self.upper))?;
        let lower = read_u16(buf, self.lower as usize).ok_or_else(|| self.out_of_bounds(self.lower))?;
        Ok(join_address(upper, lower))
    }

    fn write(
        &self,
        (upper, lower): (u16, u16),
        code: &mut [u8],
        overlays: &mut OverlaySet,
    ) -> Result<(), ContainerError> {
        let buf = self.buffer_mut(code, overlays)?;
        write_u16(buf, self.upper as usize, upper).ok_or_else(|| self.out_of_bounds(self.upper))?;
        write_u16(buf, self.lower as usize, lower).ok_or_else(|| self.out_of_bounds(self.lower))
    }
}

/// All patch offsets pointing at one container.
#[derive(Debug, Clone, Copy)]
pub struct PatchOffsetTable<'a>(pub &'a [PatchOffset]);

impl PatchOffsetTable<'_> {
    /// Container offset as currently encoded in code.
    ///
    /// Decodes the first entry. With `verify` set, every other entry is
    /// decoded too and must agree with the first.
    pub fn rom_offset(
        &self,
        code: &[u8],
        overlays: &OverlaySet,
        verify: bool,
    ) -> Result<u32, ContainerError> {
        let (first, rest) = self.0.split_first().ok_or(ContainerError::NoPatchOffsets)?;
        let expected = first.read(code, overlays)?;

        if verify {
            for (i, entry) in rest.iter().enumerate() {
                let found = entry.read(code, overlays)?;
                if found != expected {
                    return Err(ContainerError::RelocationInconsistent {
                        index: i + 1,
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(expected)
    }

    /// Point every entry at `value`.
    pub fn set_rom_offset(
        &self,
        value: u32,
        code: &mut [u8],
        overlays: &mut OverlaySet,
    ) -> Result<(), ContainerError> {
        let pair = split_address(value);
        for entry in self.0 {
            entry.write(pair, code, overlays)?;
        }
        log(LogCategory::Relocation, LogLevel::Debug, || {
            format!(
                "Relocated {} pointers to {:#X} ({:#06X}/{:#06X})",
                self.0.len(),
                value,
                pair.0,
                pair.1
            )
        });
        Ok(())
    }
}
