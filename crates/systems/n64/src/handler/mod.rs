//! Image lifecycle: load, mutate, save.
//!
//! [`RomHandler`] owns everything extracted from a loaded image. On load the
//! image is normalized, identified and split into its code section, its
//! overlays and one [`IndexedContainer`] per configured container. On save
//! a fresh image is laid out from those caches, packed, relocated and
//! checksummed. The live state is replaced only when a load or save fully
//! succeeds.

use crate::cartridge::{self, ByteOrder, Header, BOOTCODE_END};
use crate::catalog::{AssetSlot, Catalog, PatchConfig};
use crate::cic::{self, CHECKSUM_END};
use crate::container::{ContainerId, ContainerLayout, IndexedContainer, PackOptions};
use crate::game::Game;
use crate::overlay::OverlaySet;
use crate::patch::PatchOffsetTable;
use crate::plan::SavePlan;
use crate::{ContainerError, HookError, LoadError, RomError, SaveError};
use romfs_core::bytes::read_u32;
use romfs_core::logging::{log, LogCategory, LogLevel};
use romfs_core::Codec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

/// Raw bytes written over the code section before packing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryPatch {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

/// Per-save settings supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Store every entry uncompressed
    pub force_decompressed: bool,
    /// Applied in order, before `SaveHooks::patch_code`
    pub patches: Vec<BinaryPatch>,
}

/// Title-specific steps run during a save.
///
/// Each hook sees the image being built, never the live state. Returning
/// an error aborts the save and leaves the handler untouched.
pub trait SaveHooks {
    /// Called once the code section is copied and binary patches applied.
    fn patch_code(&mut self, _game: Game, _code: &mut [u8]) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after container `id` is packed at `offset` and its pointers
    /// relocated. Overlays are written after every container, so changes
    /// made to `overlays` here land in the image. Overlays must not grow.
    fn after_pack(
        &mut self,
        _game: Game,
        _id: ContainerId,
        _offset: u32,
        _rom: &mut [u8],
        _overlays: &mut OverlaySet,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called on the complete image, right before the checksum.
    fn finalize(&mut self, _game: Game, _rom: &mut [u8]) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks that do nothing.
pub struct NoHooks;

impl SaveHooks for NoHooks {}

struct LoadedRom {
    game: Game,
    byte_order: ByteOrder,
    header: Header,
    config: PatchConfig,
    /// Everything before the first container or overlay
    code: Arc<[u8]>,
    containers: BTreeMap<ContainerId, IndexedContainer>,
    overlays: OverlaySet,
}

pub struct RomHandler {
    catalog: Arc<Catalog>,
    codec: Arc<dyn Codec>,
    verify: bool,
    loaded: Option<LoadedRom>,
}

impl RomHandler {
    /// Verification defaults to on in debug builds.
    pub fn new(catalog: Arc<Catalog>, codec: Arc<dyn Codec>) -> Self {
        Self {
            catalog,
            codec,
            verify: cfg!(debug_assertions),
            loaded: None,
        }
    }

    /// Cross-check every patch offset on load and after relocation.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    /// Load an image, replacing whatever was loaded before.
    ///
    /// On error the previous state is kept.
    pub fn load(&mut self, mut rom: Vec<u8>) -> Result<(), LoadError> {
        if rom.len() < BOOTCODE_END {
            return Err(LoadError::BufferTooSmall {
                len: rom.len(),
                required: BOOTCODE_END,
            });
        }

        let byte_order = cartridge::normalize(&mut rom).ok_or_else(|| LoadError::Unrecognized {
            magic: read_u32(&rom, 0).unwrap_or_default(),
        })?;
        let header = Header::parse(&rom).ok_or(LoadError::BufferTooSmall {
            len: rom.len(),
            required: BOOTCODE_END,
        })?;
        let unsupported = || LoadError::Unsupported {
            game_id: header.game_id_str(),
        };
        let game = Game::from_id(&header.game_id).ok_or_else(unsupported)?;
        let config = self.catalog.get(game).cloned().ok_or_else(unsupported)?;

        log(LogCategory::Rom, LogLevel::Info, || {
            format!(
                "Loading {} ({:?}, {} bytes) \"{}\" v{}",
                game,
                byte_order,
                rom.len(),
                header.name,
                header.version
            )
        });

        let overlays = match &config.overlays {
            Some(table) => OverlaySet::extract(&rom, table).map_err(LoadError::Overlay)?,
            None => OverlaySet::default(),
        };

        let mut jobs = Vec::with_capacity(config.containers.len());
        for (&id, container) in &config.containers {
            let offset = PatchOffsetTable(&container.offsets)
                .rom_offset(&rom, &overlays, self.verify)
                .map_err(|source| LoadError::Corrupt {
                    container: id,
                    source,
                })? as usize;
            log(LogCategory::Container, LogLevel::Debug, || {
                format!("{} at {:#X}", id, offset)
            });
            jobs.push((id, config.layout_for(id), offset));
        }

        let containers = extract_all(&rom, &jobs, self.codec.as_ref())?;

        let code_len = jobs
            .iter()
            .map(|&(_, _, offset)| offset)
            .chain(overlays.rom_start())
            .min()
            .unwrap_or(rom.len())
            .min(rom.len());
        rom.truncate(code_len);

        for (id, container) in &containers {
            log(LogCategory::Container, LogLevel::Info, || {
                format!(
                    "{}: {} directories, {} entries",
                    id,
                    container.directory_count(),
                    container
                        .directories()
                        .map(<[_]>::len)
                        .sum::<usize>()
                )
            });
        }
        log(LogCategory::Rom, LogLevel::Info, || {
            format!(
                "Loaded {}: code section {:#X} bytes, {} overlays",
                game,
                code_len,
                overlays.len()
            )
        });

        self.loaded = Some(LoadedRom {
            game,
            byte_order,
            header,
            config,
            code: Arc::from(rom),
            containers,
            overlays,
        });
        Ok(())
    }

    /// Rebuild the image from the caches without extra hooks.
    pub fn save(&mut self, options: &SaveOptions) -> Result<Vec<u8>, SaveError> {
        self.save_with_hooks(options, &mut NoHooks)
    }

    /// Rebuild the image. On success the code section and overlays are
    /// replaced by their patched versions and the full image is returned.
    pub fn save_with_hooks(
        &mut self,
        options: &SaveOptions,
        hooks: &mut dyn SaveHooks,
    ) -> Result<Vec<u8>, SaveError> {
        let loaded = self.loaded.as_ref().ok_or(SaveError::NotLoaded)?;
        let (rom, overlays) = build(loaded, options, hooks, self.verify)?;

        if let Some(loaded) = self.loaded.as_mut() {
            loaded.code = Arc::from(&rom[..loaded.code.len()]);
            loaded.overlays = overlays;
        }
        Ok(rom)
    }

    /// Drop the loaded image and every cache. Safe to call at any time.
    pub fn clear(&mut self) {
        if let Some(loaded) = self.loaded.take() {
            log(LogCategory::Rom, LogLevel::Info, || {
                format!("Unloaded {}", loaded.game)
            });
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn game(&self) -> Option<Game> {
        self.loaded.as_ref().map(|l| l.game)
    }

    /// Byte order the loaded image arrived in. Saves are always big-endian.
    pub fn byte_order(&self) -> Option<ByteOrder> {
        self.loaded.as_ref().map(|l| l.byte_order)
    }

    pub fn header(&self) -> Option<&Header> {
        self.loaded.as_ref().map(|l| &l.header)
    }

    /// The live code section. Replaced, never modified, by each save.
    pub fn rom(&self) -> Option<Arc<[u8]>> {
        self.loaded.as_ref().map(|l| Arc::clone(&l.code))
    }

    pub fn container(&self, id: ContainerId) -> Option<&IndexedContainer> {
        self.loaded.as_ref()?.containers.get(&id)
    }

    pub fn container_mut(&mut self, id: ContainerId) -> Result<&mut IndexedContainer, RomError> {
        self.loaded
            .as_mut()
            .ok_or(RomError::NotLoaded)?
            .containers
            .get_mut(&id)
            .ok_or(RomError::NoContainer(id))
    }

    pub fn get(&self, id: ContainerId, dir: usize, entry: usize) -> Option<&[u8]> {
        self.container(id)?.get(dir, entry)
    }

    pub fn write(
        &mut self,
        id: ContainerId,
        dir: usize,
        entry: usize,
        bytes: Vec<u8>,
    ) -> Result<(), RomError> {
        self.container_mut(id)?.write(dir, entry, bytes)?;
        Ok(())
    }

    pub fn directory_count(&self, id: ContainerId) -> Option<usize> {
        self.container(id).map(IndexedContainer::directory_count)
    }

    pub fn entry_count(&self, id: ContainerId, dir: usize) -> Option<usize> {
        self.container(id)?.entry_count(dir)
    }

    pub fn overlays(&self) -> Option<&OverlaySet> {
        self.loaded.as_ref().map(|l| &l.overlays)
    }

    pub fn overlays_mut(&mut self) -> Option<&mut OverlaySet> {
        self.loaded.as_mut().map(|l| &mut l.overlays)
    }

    pub fn asset_slot(&self, name: &str) -> Option<AssetSlot> {
        self.loaded.as_ref()?.config.asset_slots.get(name).copied()
    }

    pub fn get_asset(&self, name: &str) -> Option<&[u8]> {
        let slot = self.asset_slot(name)?;
        self.get(slot.container, slot.dir, slot.entry)
    }

    pub fn write_asset(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), RomError> {
        if !self.is_loaded() {
            return Err(RomError::NotLoaded);
        }
        let slot = self
            .asset_slot(name)
            .ok_or_else(|| RomError::NoAssetSlot(name.to_string()))?;
        self.write(slot.container, slot.dir, slot.entry, bytes)
    }
}

/// Extract every container on its own thread and wait for all of them.
fn extract_all(
    rom: &[u8],
    jobs: &[(ContainerId, ContainerLayout, usize)],
    codec: &dyn Codec,
) -> Result<BTreeMap<ContainerId, IndexedContainer>, LoadError> {
    thread::scope(|s| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|&(id, layout, offset)| {
                (
                    id,
                    s.spawn(move || IndexedContainer::extract(layout, rom, offset, codec)),
                )
            })
            .collect();

        handles
            .into_iter()
            .map(|(id, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                result
                    .map(|container| (id, container))
                    .map_err(|source| LoadError::Corrupt {
                        container: id,
                        source,
                    })
            })
            .collect()
    })
}

/// Lay out, pack, relocate and checksum a new image.
///
/// Returns the image and the overlays as patched during the save.
fn build(
    loaded: &LoadedRom,
    options: &SaveOptions,
    hooks: &mut dyn SaveHooks,
    verify: bool,
) -> Result<(Vec<u8>, OverlaySet), SaveError> {
    let game = loaded.game;
    let pack_options = PackOptions {
        force_decompressed: options.force_decompressed,
    };

    let mut lens = [None; 4];
    for (id, container) in &loaded.containers {
        lens[id.index()] = Some(container.byte_length(pack_options));
    }
    let plan = SavePlan::compute(loaded.code.len(), loaded.overlays.byte_length(), lens);
    plan.log();

    let total = plan.total_len();
    if total < CHECKSUM_END {
        return Err(SaveError::BufferTooSmall {
            len: total,
            required: CHECKSUM_END,
        });
    }

    let mut rom = Vec::new();
    rom.try_reserve_exact(total)
        .map_err(|_| SaveError::BufferAllocation { size: total })?;
    rom.resize(total, 0);

    let code_len = loaded.code.len();
    rom[..code_len].copy_from_slice(&loaded.code);
    apply_patches(&mut rom[..code_len], &options.patches)?;
    hooks.patch_code(game, &mut rom[..code_len])?;

    pack_all(loaded, &plan, &mut rom, &lens, pack_options)?;

    // Containers in pack order, then overlays once nothing else can touch them
    let mut overlays = loaded.overlays.clone();
    for (&id, container) in &loaded.containers {
        let Some(section) = plan.container(id) else {
            continue;
        };
        let offset = section.offset as u32;
        if let Some(config) = loaded.config.containers.get(&id) {
            let table = PatchOffsetTable(&config.offsets);
            relocate(&table, offset, &mut rom[..code_len], &mut overlays, verify).map_err(
                |source| SaveError::Container {
                    container: id,
                    source,
                },
            )?;
        }
        log(LogCategory::Hooks, LogLevel::Trace, || {
            format!("after_pack {} ({} directories)", id, container.directory_count())
        });
        hooks.after_pack(game, id, offset, &mut rom, &mut overlays)?;
    }

    if overlays.byte_length() > plan.overlays.len {
        return Err(SaveError::Overlay(ContainerError::LengthMismatch {
            predicted: plan.overlays.len,
            written: overlays.byte_length(),
        }));
    }
    overlays
        .pack(&mut rom, plan.overlays.offset)
        .map_err(SaveError::Overlay)?;

    hooks.finalize(game, &mut rom)?;
    let identification = cic::update_checksum(&mut rom)?;

    log(LogCategory::Rom, LogLevel::Info, || {
        format!(
            "Saved {}: {:#X} bytes, {}{}",
            game,
            rom.len(),
            identification.variant,
            if identification.matched {
                ""
            } else {
                " (unverified)"
            }
        )
    });
    Ok((rom, overlays))
}

fn apply_patches(code: &mut [u8], patches: &[BinaryPatch]) -> Result<(), SaveError> {
    for patch in patches {
        let start = patch.offset as usize;
        let target = start
            .checked_add(patch.bytes.len())
            .and_then(|end| code.get_mut(start..end))
            .ok_or(SaveError::PatchOutOfBounds {
                offset: patch.offset,
                len: patch.bytes.len(),
            })?;
        target.copy_from_slice(&patch.bytes);
        log(LogCategory::Hooks, LogLevel::Debug, || {
            format!("Patched {} bytes at {:#X}", patch.bytes.len(), patch.offset)
        });
    }
    Ok(())
}

/// Pack every container into its own slice of `rom`, in parallel.
fn pack_all(
    loaded: &LoadedRom,
    plan: &SavePlan,
    rom: &mut [u8],
    lens: &[Option<usize>; 4],
    options: PackOptions,
) -> Result<(), SaveError> {
    let mut base = plan.overlays.end();
    let mut rest = &mut rom[base..];
    let mut slots = Vec::with_capacity(loaded.containers.len());
    for (&id, container) in &loaded.containers {
        let Some(section) = plan.container(id) else {
            continue;
        };
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(section.offset - base);
        let (slot, tail) = tail.split_at_mut(section.len);
        rest = tail;
        base = section.end();
        slots.push((id, container, slot));
    }

    thread::scope(|s| {
        let handles: Vec<_> = slots
            .into_iter()
            .map(|(id, container, slot)| (id, s.spawn(move || container.pack(slot, 0, options))))
            .collect();

        for (id, handle) in handles {
            let written = handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                .map_err(|source| SaveError::Container {
                    container: id,
                    source,
                })?;
            let predicted = lens[id.index()].unwrap_or_default();
            if written != predicted {
                return Err(SaveError::Container {
                    container: id,
                    source: ContainerError::LengthMismatch { predicted, written },
                });
            }
        }
        Ok(())
    })
}

fn relocate(
    table: &PatchOffsetTable<'_>,
    offset: u32,
    code: &mut [u8],
    overlays: &mut OverlaySet,
    verify: bool,
) -> Result<(), ContainerError> {
    table.set_rom_offset(offset, code, overlays)?;
    if verify {
        let found = table.rom_offset(code, overlays, true)?;
        if found != offset {
            return Err(ContainerError::RelocationInconsistent {
                index: 0,
                expected: offset,
                found,
            });
        }
    }
    Ok(())
}
