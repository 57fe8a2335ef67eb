//! Section layout of a rebuilt image.
//!
//! Sections are laid out in a fixed order: code, overlays, then every
//! container in [`ContainerId::PACK_ORDER`]. Every section starts on a
//! 16-byte boundary.

use crate::container::ContainerId;
use romfs_core::align_up;
use romfs_core::logging::{log, LogCategory, LogLevel};
use std::fmt;

pub const SECTION_ALIGN: usize = 16;

/// Offset bit that must stay clear in the background store's offset.
pub const HAZARD_BIT: usize = 0x8000;
/// Growth applied to the main asset store per hazard step.
pub const HAZARD_STEP: usize = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub offset: usize,
    /// Reserved length, including padding
    pub len: usize,
}

impl Section {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlan {
    pub code: Section,
    pub overlays: Section,
    containers: [Option<Section>; 4],
    /// Bytes added to the main asset store to keep the background store
    /// offset clear of [`HAZARD_BIT`]
    pub inflation: usize,
}

impl SavePlan {
    /// Lay out sections for the given content lengths. Container lengths
    /// are indexed in pack order; `None` marks an absent container.
    pub fn compute(
        code_len: usize,
        overlay_len: usize,
        container_lens: [Option<usize>; 4],
    ) -> Self {
        let code = Section {
            offset: 0,
            len: align_up(code_len, SECTION_ALIGN),
        };
        let overlays = Section {
            offset: code.end(),
            len: align_up(overlay_len, SECTION_ALIGN),
        };

        let mut inflation = 0;
        loop {
            let containers = Self::place(overlays.end(), container_lens, inflation);
            let hvq = containers[ContainerId::Hvq.index()];
            match hvq {
                Some(section) if section.offset & HAZARD_BIT != 0 => {
                    inflation += HAZARD_STEP;
                }
                _ => {
                    return Self {
                        code,
                        overlays,
                        containers,
                        inflation,
                    }
                }
            }
        }
    }

    fn place(
        start: usize,
        lens: [Option<usize>; 4],
        inflation: usize,
    ) -> [Option<Section>; 4] {
        let mut cursor = start;
        let mut sections = [None; 4];
        for id in ContainerId::PACK_ORDER {
            let mut len = match lens[id.index()] {
                Some(len) => align_up(len, SECTION_ALIGN),
                None if id == ContainerId::MainFs && inflation > 0 => 0,
                None => continue,
            };
            if id == ContainerId::MainFs {
                len += inflation;
            }
            sections[id.index()] = Some(Section {
                offset: cursor,
                len,
            });
            cursor += len;
        }
        sections
    }

    pub fn container(&self, id: ContainerId) -> Option<Section> {
        self.containers[id.index()]
    }

    pub fn total_len(&self) -> usize {
        self.containers
            .iter()
            .flatten()
            .map(Section::end)
            .fold(self.overlays.end(), usize::max)
    }

    pub(crate) fn log(&self) {
        log(LogCategory::Rom, LogLevel::Debug, || format!("Save layout: {}", self));
        if self.inflation > 0 {
            log(LogCategory::Rom, LogLevel::Info, || {
                format!(
                    "Grew {} by {:#X} to keep {} offset clear of bit {:#X}",
                    ContainerId::MainFs,
                    self.inflation,
                    ContainerId::Hvq,
                    HAZARD_BIT
                )
            });
        }
    }
}

impl fmt::Display for SavePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {:#X}+{:#X}", self.code.offset, self.code.len)?;
        write!(f, ", overlays {:#X}+{:#X}", self.overlays.offset, self.overlays.len)?;
        for id in ContainerId::PACK_ORDER {
            if let Some(s) = self.container(id) {
                write!(f, ", {} {:#X}+{:#X}", id, s.offset, s.len)?;
            }
        }
        write!(f, ", total {:#X}", self.total_len())
    }
}
