//! Bounds-checked big-endian accessors.
//!
//! Cartridge images are always big-endian once normalized. These helpers
//! return `None` instead of panicking when an access runs off the end of
//! the buffer, so callers can turn a short image into a typed error.

pub fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) -> Option<()> {
    let end = offset.checked_add(2)?;
    buf.get_mut(offset..end)?
        .copy_from_slice(&value.to_be_bytes());
    Some(())
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Option<()> {
    let end = offset.checked_add(4)?;
    buf.get_mut(offset..end)?
        .copy_from_slice(&value.to_be_bytes());
    Some(())
}
