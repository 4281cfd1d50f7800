use std::fmt;

/// Interpreter lineage a ROM was written against.
///
/// Fixed at power-on. The mode never changes behavior directly at dispatch
/// time; it is resolved into a [`Quirks`] record (and a stack capacity) when
/// the machine is powered.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Mode {
    CosmacVip,
    Schip,
    XoChip,
}

impl Mode {
    /// Call-return stack depth for this lineage.
    pub fn stack_capacity(self) -> usize {
        match self {
            Mode::CosmacVip => 12,
            Mode::Schip | Mode::XoChip => 16,
        }
    }

    /// The quirk profile historically observed for this lineage.
    pub fn quirks(self) -> Quirks {
        match self {
            Mode::CosmacVip => Quirks {
                bitwise_resets_flag: true,
                shift_reads_vy: true,
                jump_offset_from_vx: false,
                index_advances: true,
                wrap_sprites: true,
            },
            Mode::Schip => Quirks {
                bitwise_resets_flag: false,
                shift_reads_vy: false,
                jump_offset_from_vx: true,
                index_advances: false,
                wrap_sprites: false,
            },
            Mode::XoChip => Quirks {
                bitwise_resets_flag: false,
                shift_reads_vy: true,
                jump_offset_from_vx: false,
                index_advances: true,
                wrap_sprites: true,
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::CosmacVip => write!(f, "CHIP8 (COSMAC VIP)"),
            Mode::Schip => write!(f, "SCHIP"),
            Mode::XoChip => write!(f, "XO-CHIP"),
        }
    }
}

/// Policy record binding every quirk-sensitive instruction to its behavior.
///
/// Resolved once from [`Mode::quirks`] at power-on so individual handlers
/// never branch on the mode itself. Tests (and embedders chasing a ROM that
/// assumes a nonstandard interpreter) can override single fields.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Quirks {
    /// `8XY1`/`8XY2`/`8XY3` force the flag register to 0 as a side effect.
    pub bitwise_resets_flag: bool,
    /// `8XY6`/`8XYE` read `VY` and leave it unmodified; otherwise they read
    /// and write `VX` alone.
    pub shift_reads_vy: bool,
    /// `BNNN` takes its offset from the register named by the top nibble of
    /// the address operand instead of `V0`.
    pub jump_offset_from_vx: bool,
    /// `FX55`/`FX65` advance `I` past the transferred registers.
    pub index_advances: bool,
    /// Sprite rows/columns past the edge of the grid wrap around instead of
    /// being clipped.
    pub wrap_sprites: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineages_are_ordered_by_extension() {
        assert!(Mode::CosmacVip < Mode::Schip);
        assert!(Mode::Schip < Mode::XoChip);
    }

    #[test]
    fn stack_capacity_per_lineage() {
        assert_eq!(Mode::CosmacVip.stack_capacity(), 12);
        assert_eq!(Mode::Schip.stack_capacity(), 16);
        assert_eq!(Mode::XoChip.stack_capacity(), 16);
    }

    #[test]
    fn only_the_original_interpreter_clobbers_the_flag_on_bitwise_ops() {
        assert!(Mode::CosmacVip.quirks().bitwise_resets_flag);
        assert!(!Mode::Schip.quirks().bitwise_resets_flag);
        assert!(!Mode::XoChip.quirks().bitwise_resets_flag);
    }
}
