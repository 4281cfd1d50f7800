//! Memory map constants and the hex-digit font tables.
//!
//! The low 0x200 bytes of the address space belong to the interpreter: the
//! 5-byte low-resolution glyphs sit at the very base of memory (so `FX29`
//! reduces to `I = 5 * VX`) and the 10-byte high-resolution glyphs follow
//! at 0x50. Loaded programs start at 0x200.

pub const MEMORY_SIZE: usize = 4096;

/// All address-bearing operands are masked to 12 bits before use, so no
/// computed address can index outside [`MEMORY_SIZE`].
pub const ADDRESS_MASK: u16 = 0x0FFF;

pub const PROGRAM_STARTING_ADDRESS: u16 = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - PROGRAM_STARTING_ADDRESS as usize;

pub const FONT_STARTING_ADDRESS: u16 = 0x00;
pub const FONT_CHAR_DATA_SIZE: u8 = 5;
pub const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

pub const BIG_FONT_STARTING_ADDRESS: u16 = 0x50;
pub const BIG_FONT_CHAR_DATA_SIZE: u8 = 10;
pub const BIG_FONT: [u8; 100] = [
    0x3C, 0x7E, 0xE7, 0xC3, 0xC3, 0xC3, 0xC3, 0xE7, 0x7E, 0x3C, // 0
    0x18, 0x38, 0x58, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x3C, // 1
    0x3E, 0x7F, 0xC3, 0x06, 0x0C, 0x18, 0x30, 0x60, 0xFF, 0xFF, // 2
    0x3C, 0x7E, 0xC3, 0x03, 0x0E, 0x0E, 0x03, 0xC3, 0x7E, 0x3C, // 3
    0x06, 0x0E, 0x1E, 0x36, 0x66, 0xC6, 0xFF, 0xFF, 0x06, 0x06, // 4
    0xFF, 0xFF, 0xC0, 0xC0, 0xFC, 0xFE, 0x03, 0xC3, 0x7E, 0x3C, // 5
    0x3E, 0x7C, 0xE0, 0xC0, 0xFC, 0xFE, 0xC3, 0xC3, 0x7E, 0x3C, // 6
    0xFF, 0xFF, 0x03, 0x06, 0x0C, 0x18, 0x30, 0x60, 0x60, 0x60, // 7
    0x3C, 0x7E, 0xC3, 0xC3, 0x7E, 0x7E, 0xC3, 0xC3, 0x7E, 0x3C, // 8
    0x3C, 0x7E, 0xC3, 0xC3, 0x7F, 0x3F, 0x03, 0x03, 0x3E, 0x7C, // 9
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_tables_fit_below_the_program_area() {
        assert!(FONT_STARTING_ADDRESS as usize + FONT.len() <= BIG_FONT_STARTING_ADDRESS as usize);
        assert!(
            BIG_FONT_STARTING_ADDRESS as usize + BIG_FONT.len()
                <= PROGRAM_STARTING_ADDRESS as usize
        );
    }
}
