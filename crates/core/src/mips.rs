//! Split-address encoding for the MIPS `lui` + `addiu` idiom.
//!
//! Compiled code loads a 32-bit address in two instructions:
//!
//! ```text
//! lui   $t0, upper        ; $t0 = upper << 16
//! addiu $t0, $t0, lower   ; $t0 += sign_extend(lower)
//! ```
//!
//! `addiu` sign-extends its immediate, so when bit 15 of `lower` is set the
//! add subtracts 0x10000. The encoder pre-increments `upper` to cancel that
//! borrow and the decoder reverses it.

/// Split `addr` into the `(upper, lower)` immediates that reproduce it.
pub fn split_address(addr: u32) -> (u16, u16) {
    let lower = (addr & 0xFFFF) as u16;
    let mut upper = (addr >> 16) as u16;
    if lower & 0x8000 != 0 {
        upper = upper.wrapping_add(1);
    }
    (upper, lower)
}

/// Recover the address a `lui upper` / `addiu lower` pair produces.
pub fn join_address(upper: u16, lower: u16) -> u32 {
    ((upper as u32) << 16).wrapping_add(lower as i16 as i32 as u32)
}
