//! N64 cartridge image: byte order normalization and header fields

use romfs_core::bytes::read_u32;

/// N64 ROM magic number (big-endian format)
pub const N64_ROM_MAGIC: [u8; 4] = [0x80, 0x37, 0x12, 0x40];

pub const HEADER_SIZE: usize = 0x40;
/// End of the IPL3 boot code; the smallest image worth loading
pub const BOOTCODE_END: usize = 0x1000;

const NAME_OFFSET: usize = 0x20;
const NAME_LEN: usize = 20;
const GAME_ID_OFFSET: usize = 0x3B;
const VERSION_OFFSET: usize = 0x3F;

/// N64 ROM byte order formats, keyed by how the magic word reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Native order (.z64), 0x80371240
    BigEndian,
    /// Each 16-bit pair swapped (.v64), 0x37804012
    ByteSwapped,
    /// Each 32-bit word reversed (.n64), 0x40123780
    LittleEndian,
    /// The two halves of each 32-bit word swapped, 0x12408037
    WordSwapped,
}

impl ByteOrder {
    pub fn detect(data: &[u8]) -> Option<Self> {
        match read_u32(data, 0)? {
            0x8037_1240 => Some(ByteOrder::BigEndian),
            0x3780_4012 => Some(ByteOrder::ByteSwapped),
            0x4012_3780 => Some(ByteOrder::LittleEndian),
            0x1240_8037 => Some(ByteOrder::WordSwapped),
            _ => None,
        }
    }

    /// Rewrite `data` in place into big-endian order.
    ///
    /// Works on whole 4-byte groups; a trailing partial group is left alone.
    pub fn normalize(self, data: &mut [u8]) {
        match self {
            ByteOrder::BigEndian => {}
            ByteOrder::ByteSwapped => {
                for chunk in data.chunks_exact_mut(4) {
                    chunk.swap(0, 1);
                    chunk.swap(2, 3);
                }
            }
            ByteOrder::LittleEndian => {
                for chunk in data.chunks_exact_mut(4) {
                    chunk.reverse();
                }
            }
            ByteOrder::WordSwapped => {
                for chunk in data.chunks_exact_mut(4) {
                    chunk.rotate_left(2);
                }
            }
        }
    }
}

/// Detect the byte order of `data` and normalize it to big-endian.
///
/// Returns `None` (leaving `data` untouched) for an unknown magic word.
/// Normalizing an already big-endian image is a no-op.
pub fn normalize(data: &mut [u8]) -> Option<ByteOrder> {
    let order = ByteOrder::detect(data)?;
    order.normalize(data);
    Some(order)
}

/// Fields read from the 64-byte header of a normalized image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub crc1: u32,
    pub crc2: u32,
    pub name: String,
    /// Media type, two-character cartridge id and region, e.g. `NMWE`
    pub game_id: [u8; 4],
    pub version: u8,
}

impl Header {
    pub fn parse(rom: &[u8]) -> Option<Self> {
        let header = rom.get(..HEADER_SIZE)?;
        let name_bytes = &header[NAME_OFFSET..NAME_OFFSET + NAME_LEN];
        let mut game_id = [0u8; 4];
        game_id.copy_from_slice(&header[GAME_ID_OFFSET..GAME_ID_OFFSET + 4]);

        Some(Self {
            crc1: read_u32(header, 0x10)?,
            crc2: read_u32(header, 0x14)?,
            name: String::from_utf8_lossy(name_bytes)
                .trim_end_matches('\0')
                .trim()
                .to_string(),
            game_id,
            version: header[VERSION_OFFSET],
        })
    }

    pub fn game_id_str(&self) -> String {
        String::from_utf8_lossy(&self.game_id).into_owned()
    }
}
