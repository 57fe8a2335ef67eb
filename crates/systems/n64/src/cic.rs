//! Cartridge checksum (CIC) computation.
//!
//! The boot ROM refuses to start a cartridge whose header checksum does not
//! match what the CIC chip expects. Rebuilding an image therefore always
//! finishes by recomputing the two header words here.
//!
//! Two steps:
//! 1. Identify the CIC variant from a CRC32 of the IPL3 boot code
//!    (`0x40..0x1000`).
//! 2. Run the variant's mixing function over `0x1000..0x101000`.

use crate::cartridge::{BOOTCODE_END, HEADER_SIZE};
use romfs_core::bytes::{read_u32, write_u32};
use romfs_core::logging::{log, LogCategory, LogLevel};
use thiserror::Error;

pub const CHECKSUM_START: usize = 0x1000;
pub const CHECKSUM_LENGTH: usize = 0x10_0000;
pub const CHECKSUM_END: usize = CHECKSUM_START + CHECKSUM_LENGTH;

/// Header offsets of the two checksum words
pub const CRC1_OFFSET: usize = 0x10;
pub const CRC2_OFFSET: usize = 0x14;

/// 6105 mixes in a word from this window of its boot code
const CIC_6105_TABLE: usize = HEADER_SIZE + 0x0710;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("Image too small to checksum: {len} bytes (need {required})")]
    BufferTooSmall { len: usize, required: usize },
}

/// Known CIC chip variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CicVariant {
    Cic6101,
    Cic6102,
    Cic6103,
    Cic6105,
    Cic6106,
}

impl CicVariant {
    /// Variant assumed when the boot code matches no known CRC.
    pub const FALLBACK: CicVariant = CicVariant::Cic6105;

    pub fn from_bootcode_crc(crc: u32) -> Option<Self> {
        match crc {
            0x6170_A4A1 => Some(CicVariant::Cic6101),
            0x90BB_6CB5 => Some(CicVariant::Cic6102),
            0x0B05_0EE0 => Some(CicVariant::Cic6103),
            0x98BC_2C86 => Some(CicVariant::Cic6105),
            0xACC8_580A => Some(CicVariant::Cic6106),
            _ => None,
        }
    }

    pub fn seed(self) -> u32 {
        match self {
            CicVariant::Cic6101 | CicVariant::Cic6102 => 0xF8CA_4DDC,
            CicVariant::Cic6103 => 0xA388_6759,
            CicVariant::Cic6105 => 0xDF26_F436,
            CicVariant::Cic6106 => 0x1FEA_617A,
        }
    }
}

impl std::fmt::Display for CicVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CicVariant::Cic6101 => write!(f, "CIC-6101"),
            CicVariant::Cic6102 => write!(f, "CIC-6102"),
            CicVariant::Cic6103 => write!(f, "CIC-6103"),
            CicVariant::Cic6105 => write!(f, "CIC-6105"),
            CicVariant::Cic6106 => write!(f, "CIC-6106"),
        }
    }
}

/// Outcome of boot code identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identification {
    pub variant: CicVariant,
    pub bootcode_crc: u32,
    /// False when `variant` is the fallback rather than a known match.
    /// The fallback has only been checked against the titles in use.
    pub matched: bool,
}

fn require_len(rom: &[u8], required: usize) -> Result<(), ChecksumError> {
    if rom.len() < required {
        return Err(ChecksumError::BufferTooSmall {
            len: rom.len(),
            required,
        });
    }
    Ok(())
}

/// Identify the CIC variant from the boot code.
pub fn identify(rom: &[u8]) -> Result<Identification, ChecksumError> {
    require_len(rom, BOOTCODE_END)?;
    let bootcode_crc = crc32fast::hash(&rom[HEADER_SIZE..BOOTCODE_END]);

    let identification = match CicVariant::from_bootcode_crc(bootcode_crc) {
        Some(variant) => Identification {
            variant,
            bootcode_crc,
            matched: true,
        },
        None => {
            log(LogCategory::Checksum, LogLevel::Warn, || {
                format!(
                    "Unknown boot code (CRC32 {:08X}), assuming {} (unverified)",
                    bootcode_crc,
                    CicVariant::FALLBACK
                )
            });
            Identification {
                variant: CicVariant::FALLBACK,
                bootcode_crc,
                matched: false,
            }
        }
    };
    Ok(identification)
}

fn word(rom: &[u8], offset: usize) -> u32 {
    // Callers have already checked that `rom` covers the checksum window
    read_u32(rom, offset).unwrap_or(0)
}

/// Compute the two header checksum words for `variant`.
pub fn calculate(rom: &[u8], variant: CicVariant) -> Result<(u32, u32), ChecksumError> {
    require_len(rom, CHECKSUM_END)?;

    let seed = variant.seed();
    let (mut t1, mut t2, mut t3, mut t4, mut t5, mut t6) = (seed, seed, seed, seed, seed, seed);

    for offset in (CHECKSUM_START..CHECKSUM_END).step_by(4) {
        let d = word(rom, offset);

        // Carry out of t6 is tracked in t4
        if t6.wrapping_add(d) < t6 {
            t4 = t4.wrapping_add(1);
        }
        t6 = t6.wrapping_add(d);
        t3 ^= d;

        let r = d.rotate_left(d & 0x1F);
        t5 = t5.wrapping_add(r);

        if t2 > d {
            t2 ^= r;
        } else {
            t2 ^= t6 ^ d;
        }

        if variant == CicVariant::Cic6105 {
            t1 = t1.wrapping_add(word(rom, CIC_6105_TABLE + (offset & 0xFF)) ^ d);
        } else {
            t1 = t1.wrapping_add(t5 ^ d);
        }
    }

    let words = match variant {
        CicVariant::Cic6103 => ((t6 ^ t4).wrapping_add(t3), (t5 ^ t2).wrapping_add(t1)),
        CicVariant::Cic6106 => (
            t6.wrapping_mul(t4).wrapping_add(t3),
            t5.wrapping_mul(t2).wrapping_add(t1),
        ),
        _ => (t6 ^ t4 ^ t3, t5 ^ t2 ^ t1),
    };
    Ok(words)
}

/// Identify the variant, compute the checksum and store it in the header.
pub fn update_checksum(rom: &mut [u8]) -> Result<Identification, ChecksumError> {
    require_len(rom, CHECKSUM_END)?;
    let identification = identify(rom)?;
    let (crc1, crc2) = calculate(rom, identification.variant)?;

    log(LogCategory::Checksum, LogLevel::Debug, || {
        format!(
            "{}: CRC1={:08X} CRC2={:08X}",
            identification.variant, crc1, crc2
        )
    });

    write_u32(rom, CRC1_OFFSET, crc1);
    write_u32(rom, CRC2_OFFSET, crc2);
    Ok(identification)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned_rom() -> Vec<u8> {
        (0..CHECKSUM_END)
            .map(|i| (i.wrapping_mul(7).wrapping_add(3) & 0xFF) as u8)
            .collect()
    }

    #[test]
    fn test_fallback_variant() {
        let rom = vec![0u8; CHECKSUM_END];
        let id = identify(&rom).unwrap();
        assert_eq!(id.variant, CicVariant::Cic6105);
        assert!(!id.matched);
        assert_eq!(id.bootcode_crc, 0xE8B8_467D);
    }

    #[test]
    fn test_known_bootcode_crcs() {
        assert_eq!(
            CicVariant::from_bootcode_crc(0x90BB_6CB5),
            Some(CicVariant::Cic6102)
        );
        assert_eq!(
            CicVariant::from_bootcode_crc(0xACC8_580A),
            Some(CicVariant::Cic6106)
        );
        assert_eq!(CicVariant::from_bootcode_crc(0x1234_5678), None);
    }

    #[test]
    fn test_zero_window() {
        let rom = vec![0u8; CHECKSUM_END];
        // With no data only the seed survives in the XOR combination
        assert_eq!(
            calculate(&rom, CicVariant::Cic6105).unwrap(),
            (0xDF26_F436, 0xDF26_F436)
        );
        assert_eq!(
            calculate(&rom, CicVariant::Cic6102).unwrap(),
            (0xF8CA_4DDC, 0x303A_4DDC)
        );
        assert_eq!(
            calculate(&rom, CicVariant::Cic6103).unwrap(),
            (0xA388_6759, 0x40EC_6759)
        );
        assert_eq!(
            calculate(&rom, CicVariant::Cic6106).unwrap(),
            (0x0410_0F9E, 0x89F8_0F9E)
        );
    }

    #[test]
    fn test_patterned_window() {
        let rom = patterned_rom();
        assert_eq!(identify(&rom).unwrap().bootcode_crc, 0x25E8_1EF4);
        assert_eq!(
            calculate(&rom, CicVariant::Cic6102).unwrap(),
            (0xF6C4_53DE, 0x6D3C_908C)
        );
        assert_eq!(
            calculate(&rom, CicVariant::Cic6103).unwrap(),
            (0xA592_715B, 0x6CC2_672E)
        );
        assert_eq!(
            calculate(&rom, CicVariant::Cic6105).unwrap(),
            (0xDD10_FA38, 0xC11B_9C1E)
        );
        assert_eq!(
            calculate(&rom, CicVariant::Cic6106).unwrap(),
            (0x5141_AE92, 0x66E1_9326)
        );
    }

    #[test]
    fn test_update_writes_header() {
        let mut rom = patterned_rom();
        let id = update_checksum(&mut rom).unwrap();
        assert_eq!(id.variant, CicVariant::Cic6105);
        assert_eq!(read_u32(&rom, CRC1_OFFSET), Some(0xDD10_FA38));
        assert_eq!(read_u32(&rom, CRC2_OFFSET), Some(0xC11B_9C1E));
    }

    #[test]
    fn test_deterministic_and_sensitive() {
        let mut rom = patterned_rom();
        let first = calculate(&rom, CicVariant::Cic6102).unwrap();
        assert_eq!(calculate(&rom, CicVariant::Cic6102).unwrap(), first);

        rom[CHECKSUM_START + 0x1234] ^= 0x01;
        assert_ne!(calculate(&rom, CicVariant::Cic6102).unwrap(), first);
    }

    #[test]
    fn test_bytes_outside_window_ignored() {
        let mut rom = patterned_rom();
        let first = calculate(&rom, CicVariant::Cic6102).unwrap();
        rom[CRC1_OFFSET] ^= 0xFF;
        rom.push(0xAA);
        assert_eq!(calculate(&rom, CicVariant::Cic6102).unwrap(), first);
    }

    #[test]
    fn test_short_buffer() {
        let rom = vec![0u8; CHECKSUM_END - 4];
        assert_eq!(
            calculate(&rom, CicVariant::Cic6102),
            Err(ChecksumError::BufferTooSmall {
                len: CHECKSUM_END - 4,
                required: CHECKSUM_END
            })
        );
        assert!(identify(&rom[..0x800]).is_err());
    }
}
