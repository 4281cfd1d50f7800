//! The interpreter: machine state plus the fetch-decode-execute engine.
//!
//! One [`Interpreter::cycle`] call is one atomic instruction (or one stalled
//! wait-for-key retry). The host drives it from its own scheduling loop and
//! separately calls [`Interpreter::decrement_timers`] at 60 Hz; nothing in
//! here keeps time. State is never observable mid-mutation: a faulting cycle
//! leaves only the provisional program-counter advance behind.

use crate::{
    disp::Display,
    instruct::{Instruction, InstructionParameters},
    mem::*,
    mode::{Mode, Quirks},
};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use thiserror::Error;

pub const VFLAG: usize = 15;

/// A condition `cycle` (or `power_and_load`) cannot resolve internally.
///
/// Faults are surfaced synchronously to the host, which decides whether to
/// halt, skip, or report; the engine never guesses a fallback behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("illegal opcode {0:#06X}")]
    IllegalOpcode(u16),
    #[error("call at {0:#05X} overflowed the stack")]
    StackOverflow(u16),
    #[error("return at {0:#05X} with an empty stack")]
    StackUnderflow(u16),
    #[error("ROM size ({size}B) exceeds maximum size ({max}B)")]
    RomTooLarge { size: usize, max: usize },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Interpreter {
    memory: [u8; MEMORY_SIZE],
    registers: [u8; 16],
    flags: [u8; 8],
    pc: u16,
    index: u16,
    stack: Vec<u16>,
    stack_capacity: usize,
    delay_timer: u8,
    sound_timer: u8,
    down_keys: u16,
    display: Display,
    mode: Mode,
    quirks: Quirks,
    rng: StdRng,
    powered: bool,
    draw: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// An unpowered machine with an entropy-seeded randomness source.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// An unpowered machine whose random draws are reproducible from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        let mode = Mode::Schip;
        let quirks = mode.quirks();
        Interpreter {
            memory: [0; MEMORY_SIZE],
            registers: [0; 16],
            flags: [0; 8],
            pc: PROGRAM_STARTING_ADDRESS,
            index: 0,
            stack: Vec::with_capacity(mode.stack_capacity()),
            stack_capacity: mode.stack_capacity(),
            delay_timer: 0,
            sound_timer: 0,
            down_keys: 0,
            display: Display::new(quirks.wrap_sprites),
            mode,
            quirks,
            rng,
            powered: false,
            draw: false,
        }
    }

    /// Resets the machine, writes the font tables, copies `rom` to 0x200,
    /// and powers on under the historical quirk profile of `mode`.
    ///
    /// A ROM larger than the program area is rejected before any state is
    /// mutated.
    pub fn power_and_load(&mut self, rom: &[u8], mode: Mode) -> Result<(), Fault> {
        self.power_and_load_with_quirks(rom, mode, mode.quirks())
    }

    /// [`Self::power_and_load`] with an explicit quirk profile, for ROMs
    /// written against an interpreter that deviates from its lineage.
    pub fn power_and_load_with_quirks(
        &mut self,
        rom: &[u8],
        mode: Mode,
        quirks: Quirks,
    ) -> Result<(), Fault> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Fault::RomTooLarge {
                size: rom.len(),
                max: MAX_ROM_SIZE,
            });
        }

        self.memory = [0; MEMORY_SIZE];
        let font_start = FONT_STARTING_ADDRESS as usize;
        self.memory[font_start..font_start + FONT.len()].copy_from_slice(&FONT);
        if mode >= Mode::Schip {
            let big_font_start = BIG_FONT_STARTING_ADDRESS as usize;
            self.memory[big_font_start..big_font_start + BIG_FONT.len()]
                .copy_from_slice(&BIG_FONT);
        }
        let program_start = PROGRAM_STARTING_ADDRESS as usize;
        self.memory[program_start..program_start + rom.len()].copy_from_slice(rom);

        self.registers = [0; 16];
        self.flags = [0; 8];
        self.pc = PROGRAM_STARTING_ADDRESS;
        self.index = 0;
        self.stack = Vec::with_capacity(mode.stack_capacity());
        self.stack_capacity = mode.stack_capacity();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.down_keys = 0;
        self.display = Display::new(quirks.wrap_sprites);
        self.mode = mode;
        self.quirks = quirks;
        self.draw = false;
        self.powered = true;

        log::debug!("powered on as {} with a {}B ROM", mode, rom.len());
        Ok(())
    }

    /// Latches one logical key up or down. Keys outside 0..16 are ignored.
    /// The engine only reads the latch at instruction-dispatch points.
    pub fn set_input(&mut self, key: u8, pressed: bool) {
        if key >= 16 {
            return;
        }
        if pressed {
            self.down_keys |= 1 << key;
        } else {
            self.down_keys &= !(1 << key);
        }
    }

    /// Advances the machine by exactly one instruction, returning whether
    /// this cycle requires a redraw.
    ///
    /// On an unpowered machine this is a no-op. A fault aborts the cycle
    /// with no mutation beyond the provisional program-counter advance.
    pub fn cycle(&mut self) -> Result<bool, Fault> {
        if !self.powered {
            return Ok(false);
        }

        self.draw = false;

        let params = self.fetch();
        self.pc = self.pc.wrapping_add(2) & ADDRESS_MASK;

        let instruction = params.try_decode(self.mode)?;
        self.exec(instruction)?;

        Ok(self.draw)
    }

    /// Decrements the delay and sound timers, each floored at 0. To be
    /// invoked by the host at a fixed 60 Hz cadence, independent of the
    /// instruction rate.
    pub fn decrement_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.registers
    }

    /// The RPL flag save slots (`FX75`/`FX85`).
    pub fn flags(&self) -> &[u8; 8] {
        &self.flags
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    fn fetch(&self) -> InstructionParameters {
        InstructionParameters::from([
            self.memory[self.pc as usize],
            self.memory[(self.pc.wrapping_add(1) & ADDRESS_MASK) as usize],
        ])
    }

    fn exec(&mut self, instruction: Instruction) -> Result<(), Fault> {
        match instruction {
            Instruction::MachineRoutine(address) => {
                // native RCA 1802 routines are not emulated; hold in place
                log::debug!("machine routine {:#05X} ignored, retrying", address);
                self.pc = self.instruction_address();
            }

            Instruction::Exit => {
                log::debug!("exit instruction, powering off");
                self.powered = false;
            }

            Instruction::Jump(address) => self.pc = address,

            Instruction::JumpWithOffset(address, vx) => {
                let offset = if self.quirks.jump_offset_from_vx {
                    self.registers[vx as usize]
                } else {
                    self.registers[0]
                };
                self.pc = address.wrapping_add(offset as u16) & ADDRESS_MASK;
            }

            Instruction::CallSubroutine(address) => {
                if self.stack.len() == self.stack_capacity {
                    return Err(Fault::StackOverflow(self.instruction_address()));
                }
                self.stack.push(self.pc);
                self.pc = address;
            }

            Instruction::SubroutineReturn => {
                let Some(address) = self.stack.pop() else {
                    return Err(Fault::StackUnderflow(self.instruction_address()));
                };
                self.pc = address;
            }

            Instruction::SkipIfEqualsConstant(vx, value) => {
                if self.registers[vx as usize] == value {
                    self.skip();
                }
            }

            Instruction::SkipIfNotEqualsConstant(vx, value) => {
                if self.registers[vx as usize] != value {
                    self.skip();
                }
            }

            Instruction::SkipIfEquals(vx, vy) => {
                if self.registers[vx as usize] == self.registers[vy as usize] {
                    self.skip();
                }
            }

            Instruction::SkipIfNotEquals(vx, vy) => {
                if self.registers[vx as usize] != self.registers[vy as usize] {
                    self.skip();
                }
            }

            Instruction::SkipIfKeyDown(vx) => {
                let key = self.registers[vx as usize];
                if key <= 0xF && self.down_keys >> key & 1 == 1 {
                    self.skip();
                }
            }

            Instruction::SkipIfKeyNotDown(vx) => {
                let key = self.registers[vx as usize];
                if key > 0xF || self.down_keys >> key & 1 == 0 {
                    self.skip();
                }
            }

            Instruction::WaitForKey(vx) => match self.first_down_key() {
                Some(key) => self.registers[vx as usize] = key,
                // rewind to retry the fetch until a key is latched
                None => self.pc = self.instruction_address(),
            },

            Instruction::SetConstant(vx, value) => self.registers[vx as usize] = value,

            Instruction::AddConstant(vx, change) => {
                self.registers[vx as usize] = self.registers[vx as usize].wrapping_add(change)
            }

            Instruction::Set(vx, vy) => self.registers[vx as usize] = self.registers[vy as usize],

            Instruction::Or(vx, vy) => {
                self.registers[vx as usize] |= self.registers[vy as usize];
                if self.quirks.bitwise_resets_flag {
                    self.registers[VFLAG] = 0;
                }
            }

            Instruction::And(vx, vy) => {
                self.registers[vx as usize] &= self.registers[vy as usize];
                if self.quirks.bitwise_resets_flag {
                    self.registers[VFLAG] = 0;
                }
            }

            Instruction::Xor(vx, vy) => {
                self.registers[vx as usize] ^= self.registers[vy as usize];
                if self.quirks.bitwise_resets_flag {
                    self.registers[VFLAG] = 0;
                }
            }

            Instruction::Add(vx, vy) => {
                let (value, overflowed) =
                    self.registers[vx as usize].overflowing_add(self.registers[vy as usize]);
                self.registers[vx as usize] = value;
                self.registers[VFLAG] = overflowed as u8;
            }

            Instruction::Sub(vx, vy, vx_minus_vy) => {
                let (value, overflowed) = if vx_minus_vy {
                    self.registers[vx as usize].overflowing_sub(self.registers[vy as usize])
                } else {
                    self.registers[vy as usize].overflowing_sub(self.registers[vx as usize])
                };
                self.registers[vx as usize] = value;
                self.registers[VFLAG] = !overflowed as u8; // vf is 1 when no borrow occurs
            }

            Instruction::Shift(vx, vy, right) => {
                let bits = if self.quirks.shift_reads_vy {
                    self.registers[vy as usize]
                } else {
                    self.registers[vx as usize]
                };

                if right {
                    self.registers[vx as usize] = bits >> 1;
                    self.registers[VFLAG] = bits & 1;
                } else {
                    self.registers[vx as usize] = bits << 1;
                    self.registers[VFLAG] = bits >> 7;
                }
            }

            Instruction::GetDelayTimer(vx) => self.registers[vx as usize] = self.delay_timer,

            Instruction::SetDelayTimer(vx) => self.delay_timer = self.registers[vx as usize],

            Instruction::SetSoundTimer(vx) => self.sound_timer = self.registers[vx as usize],

            Instruction::SetIndex(address) => self.index = address,

            Instruction::SetIndexToHexChar(vx) => {
                self.index = FONT_STARTING_ADDRESS
                    + FONT_CHAR_DATA_SIZE as u16 * self.registers[vx as usize] as u16;
            }

            Instruction::SetIndexToBigHexChar(vx) => {
                self.index = BIG_FONT_STARTING_ADDRESS
                    + BIG_FONT_CHAR_DATA_SIZE as u16 * self.registers[vx as usize] as u16;
            }

            Instruction::AddToIndex(vx) => {
                let sum = self.index as u32 + self.registers[vx as usize] as u32;
                self.registers[VFLAG] = (sum > ADDRESS_MASK as u32) as u8;
                self.index = sum as u16 & ADDRESS_MASK;
            }

            Instruction::Store(vx) => {
                for i in 0..=vx as u16 {
                    self.memory[self.offset_address(i)] = self.registers[i as usize];
                }
                if self.quirks.index_advances {
                    self.index = self.index.wrapping_add(vx as u16 + 1) & ADDRESS_MASK;
                }
            }

            Instruction::Load(vx) => {
                for i in 0..=vx as u16 {
                    self.registers[i as usize] = self.memory[self.offset_address(i)];
                }
                if self.quirks.index_advances {
                    self.index = self.index.wrapping_add(vx as u16 + 1) & ADDRESS_MASK;
                }
            }

            Instruction::StoreFlags(vx) => {
                let count = (vx as usize).min(self.flags.len() - 1);
                self.flags[..=count].copy_from_slice(&self.registers[..=count]);
            }

            Instruction::LoadFlags(vx) => {
                let count = (vx as usize).min(self.flags.len() - 1);
                self.registers[..=count].copy_from_slice(&self.flags[..=count]);
            }

            Instruction::StoreBinaryCodedDecimal(vx) => {
                let value = self.registers[vx as usize];
                let digits = [value / 100, value / 10 % 10, value % 10];
                for (i, digit) in digits.into_iter().enumerate() {
                    self.memory[self.offset_address(i as u16)] = digit;
                }
            }

            Instruction::GenerateRandom(vx, bound) => {
                self.registers[vx as usize] = (self.rng.next_u32() & bound as u32) as u8;
            }

            Instruction::Draw(vx, vy, height) => self.exec_draw(vx, vy, height),

            Instruction::ScrollUp(n) => {
                self.display.scroll_vertical(n as usize, true);
                self.draw = true;
            }

            Instruction::ScrollDown(n) => {
                self.display.scroll_vertical(n as usize, false);
                self.draw = true;
            }

            Instruction::ScrollLeft => {
                self.display.scroll_left();
                self.draw = true;
            }

            Instruction::ScrollRight => {
                self.display.scroll_right();
                self.draw = true;
            }

            Instruction::LowResolution => {
                self.display.set_hires(false);
                self.draw = true;
            }

            Instruction::HighResolution => {
                self.display.set_hires(true);
                self.draw = true;
            }

            Instruction::ClearScreen => {
                self.display.clear();
                self.draw = true;
            }
        }

        Ok(())
    }

    fn exec_draw(&mut self, vx: u8, vy: u8, height: u8) {
        let x = self.registers[vx as usize] as u16;
        let y = self.registers[vy as usize] as u16;

        if height == 0 && self.mode >= Mode::Schip {
            if self.display.hires() {
                let mut rows = [0u16; 16];
                for (i, row) in rows.iter_mut().enumerate() {
                    *row = u16::from_be_bytes([
                        self.memory[self.offset_address(2 * i as u16)],
                        self.memory[self.offset_address(2 * i as u16 + 1)],
                    ]);
                }
                self.registers[VFLAG] = self.display.draw_big_sprite(x, y, &rows);
            } else {
                // SCHIP 1.1 draws a 16-row narrow sprite in low resolution
                let mut sprite = [0u8; 16];
                for (i, byte) in sprite.iter_mut().enumerate() {
                    *byte = self.memory[self.offset_address(i as u16)];
                }
                self.registers[VFLAG] = self.display.draw_sprite(x, y, &sprite) as u8;
            }
        } else {
            let mut sprite = [0u8; 15];
            let sprite = &mut sprite[..height as usize];
            for (i, byte) in sprite.iter_mut().enumerate() {
                *byte = self.memory[self.offset_address(i as u16)];
            }
            self.registers[VFLAG] = self.display.draw_sprite(x, y, sprite) as u8;
        }

        self.draw = true;
    }

    // address of the instruction currently executing (pc was provisionally
    // advanced at fetch)
    fn instruction_address(&self) -> u16 {
        self.pc.wrapping_sub(2) & ADDRESS_MASK
    }

    fn offset_address(&self, offset: u16) -> usize {
        (self.index.wrapping_add(offset) & ADDRESS_MASK) as usize
    }

    fn skip(&mut self) {
        self.pc = self.pc.wrapping_add(2) & ADDRESS_MASK;
    }

    fn first_down_key(&self) -> Option<u8> {
        (0..16).find(|key| self.down_keys >> key & 1 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn power(mode: Mode, rom: &[u8]) -> Interpreter {
        let mut interp = Interpreter::with_seed(0xC8);
        interp.power_and_load(rom, mode).unwrap();
        interp
    }

    #[test]
    fn set_then_add_constant() {
        // scenario: 6005 (V0 = 5), 7003 (V0 += 3)
        let mut interp = power(Mode::Schip, &[0x60, 0x05, 0x70, 0x03]);
        interp.cycle().unwrap();
        interp.cycle().unwrap();

        assert_eq!(interp.registers()[0], 8);
        assert_eq!(interp.pc(), PROGRAM_STARTING_ADDRESS + 4);
    }

    #[test]
    fn clear_screen_erases_prior_draws_and_requests_redraw() {
        let mut interp = power(Mode::Schip, &[0x00, 0xE0]);
        interp.display.draw_sprite(5, 5, &[0xFF, 0xFF]);

        assert_eq!(interp.cycle(), Ok(true));
        assert!(interp.display().buffer().iter().all(|&row| row == 0));
    }

    #[test]
    fn shift_right_reads_vx_or_vy_per_mode() {
        // 8126 under SCHIP reads and writes V1
        let mut interp = power(Mode::Schip, &[0x81, 0x26]);
        interp.registers[1] = 0b0000_0011;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[1], 1);
        assert_eq!(interp.registers()[VFLAG], 1);

        // the original interpreter reads V2 and leaves it unmodified
        let mut interp = power(Mode::CosmacVip, &[0x81, 0x26]);
        interp.registers[1] = 0;
        interp.registers[2] = 0b0000_0011;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[1], 1);
        assert_eq!(interp.registers()[2], 0b0000_0011);
        assert_eq!(interp.registers()[VFLAG], 1);
    }

    #[test]
    fn shift_left_carries_the_high_bit_out() {
        let mut interp = power(Mode::Schip, &[0x81, 0x2E, 0x81, 0x2E]);
        interp.registers[1] = 0b1100_0000;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[1], 0b1000_0000);
        assert_eq!(interp.registers()[VFLAG], 1);
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[1], 0);
        assert_eq!(interp.registers()[VFLAG], 1);
    }

    #[test]
    fn call_then_return_restores_pc_and_stack() {
        let mut rom = vec![0x22, 0x04, 0x00, 0x00]; // 0x200: CALL 0x204
        rom.extend([0x00, 0xEE]); // 0x204: RET
        let mut interp = power(Mode::Schip, &rom);

        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x204);
        assert_eq!(interp.stack(), &[0x202]);

        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x202);
        assert!(interp.stack().is_empty());
    }

    #[test]
    fn store_registers_advances_index_per_mode() {
        for (mode, expected_index) in [(Mode::Schip, 0x300), (Mode::CosmacVip, 0x304)] {
            let mut interp = power(mode, &[0xF3, 0x55]);
            interp.registers[..4].copy_from_slice(&[9, 8, 7, 6]);
            interp.index = 0x300;
            interp.cycle().unwrap();

            assert_eq!(&interp.memory()[0x300..0x304], &[9, 8, 7, 6]);
            assert_eq!(interp.index(), expected_index, "{mode}");
        }
    }

    #[test]
    fn load_registers_reads_back_from_memory() {
        let mut interp = power(Mode::XoChip, &[0xF2, 0x65]);
        interp.memory[0x400..0x403].copy_from_slice(&[3, 2, 1]);
        interp.index = 0x400;
        interp.cycle().unwrap();

        assert_eq!(&interp.registers()[..3], &[3, 2, 1]);
        assert_eq!(interp.index(), 0x403); // Octo lineage advances I too
    }

    #[test]
    fn add_sets_carry_iff_the_sum_overflows() {
        let mut interp = power(Mode::Schip, &[]);
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                interp.registers[0] = a;
                interp.registers[1] = b;
                interp.exec(Instruction::Add(0, 1)).unwrap();
                assert_eq!(interp.registers[0], a.wrapping_add(b));
                assert_eq!(
                    interp.registers[VFLAG],
                    (a as u16 + b as u16 > 255) as u8,
                    "{a} + {b}"
                );
            }
        }
    }

    #[test]
    fn subtract_flags_are_set_iff_no_borrow_occurs() {
        let mut interp = power(Mode::Schip, &[]);
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                interp.registers[0] = a;
                interp.registers[1] = b;
                interp.exec(Instruction::Sub(0, 1, true)).unwrap();
                assert_eq!(interp.registers[0], a.wrapping_sub(b));
                assert_eq!(interp.registers[VFLAG], (a >= b) as u8, "{a} - {b}");

                interp.registers[0] = a;
                interp.registers[1] = b;
                interp.exec(Instruction::Sub(0, 1, false)).unwrap();
                assert_eq!(interp.registers[0], b.wrapping_sub(a));
                assert_eq!(interp.registers[VFLAG], (b >= a) as u8, "{b} - {a}");
            }
        }
    }

    #[test]
    fn bitwise_ops_reset_the_flag_only_under_the_original_quirk() {
        let mut interp = power(Mode::CosmacVip, &[0x81, 0x21]);
        interp.registers[VFLAG] = 1;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[VFLAG], 0);

        let mut interp = power(Mode::Schip, &[0x81, 0x21]);
        interp.registers[VFLAG] = 1;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[VFLAG], 1);

        // the profile is a configuration, not a hardwired mode check
        let quirks = Quirks {
            bitwise_resets_flag: true,
            ..Mode::Schip.quirks()
        };
        let mut interp = Interpreter::with_seed(0xC8);
        interp
            .power_and_load_with_quirks(&[0x81, 0x21], Mode::Schip, quirks)
            .unwrap();
        interp.registers[VFLAG] = 1;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[VFLAG], 0);
    }

    #[test]
    fn jump_with_offset_source_register_depends_on_mode() {
        let mut interp = power(Mode::Schip, &[0xB2, 0x35]);
        interp.registers[0] = 1;
        interp.registers[2] = 0x10;
        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x245);

        let mut interp = power(Mode::CosmacVip, &[0xB2, 0x35]);
        interp.registers[0] = 1;
        interp.registers[2] = 0x10;
        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x236);
    }

    #[test]
    fn compare_skips_advance_pc_by_four_net() {
        // V0 == 0x05 -> skip taken
        let mut interp = power(Mode::Schip, &[0x30, 0x05]);
        interp.registers[0] = 0x05;
        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x204);

        // skip not taken
        let mut interp = power(Mode::Schip, &[0x30, 0x05]);
        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x202);
    }

    #[test]
    fn key_skips_honor_the_input_latch() {
        let mut interp = power(Mode::Schip, &[0xE0, 0x9E]);
        interp.registers[0] = 0xB;
        interp.set_input(0xB, true);
        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x204);

        let mut interp = power(Mode::Schip, &[0xE0, 0xA1]);
        interp.registers[0] = 0xB;
        interp.cycle().unwrap();
        assert_eq!(interp.pc(), 0x204);
    }

    #[test]
    fn wait_for_key_stalls_until_a_key_is_latched() {
        let mut interp = power(Mode::Schip, &[0xF1, 0x0A]);

        for _ in 0..3 {
            assert_eq!(interp.cycle(), Ok(false));
            assert_eq!(interp.pc(), 0x200);
        }

        interp.set_input(0x7, true);
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[1], 0x7);
        assert_eq!(interp.pc(), 0x202);
    }

    #[test]
    fn timers_tick_down_and_saturate_at_zero() {
        let mut interp = power(Mode::Schip, &[0xF0, 0x15, 0xF1, 0x18]);
        interp.registers[0] = 2;
        interp.registers[1] = 1;
        interp.cycle().unwrap();
        interp.cycle().unwrap();
        assert_eq!(interp.delay_timer(), 2);
        assert_eq!(interp.sound_timer(), 1);

        for _ in 0..4 {
            interp.decrement_timers();
        }
        assert_eq!(interp.delay_timer(), 0);
        assert_eq!(interp.sound_timer(), 0);
    }

    #[test]
    fn delay_timer_reads_back_through_fx07() {
        let mut interp = power(Mode::Schip, &[0xF5, 0x07]);
        interp.delay_timer = 42;
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[5], 42);
    }

    #[test]
    fn bcd_store_writes_hundreds_tens_ones() {
        let mut interp = power(Mode::Schip, &[0xF0, 0x33]);
        interp.registers[0] = 159;
        interp.index = 0x500;
        interp.cycle().unwrap();
        assert_eq!(&interp.memory()[0x500..0x503], &[1, 5, 9]);
    }

    #[test]
    fn font_index_points_at_the_glyph_for_the_digit() {
        let mut interp = power(Mode::Schip, &[0xF0, 0x29]);
        interp.registers[0] = 0xA;
        interp.cycle().unwrap();

        assert_eq!(interp.index(), 5 * 0xA);
        let glyph_start = interp.index() as usize;
        assert_eq!(&interp.memory()[glyph_start..glyph_start + 5], &FONT[50..55]);
    }

    #[test]
    fn big_font_index_points_into_the_big_font_table() {
        let mut interp = power(Mode::Schip, &[0xF0, 0x30]);
        interp.registers[0] = 3;
        interp.cycle().unwrap();

        assert_eq!(interp.index(), BIG_FONT_STARTING_ADDRESS + 30);
        let glyph_start = interp.index() as usize;
        assert_eq!(&interp.memory()[glyph_start..glyph_start + 10], &BIG_FONT[30..40]);
    }

    #[test]
    fn add_to_index_flags_overflow_past_the_address_space() {
        let mut interp = power(Mode::Schip, &[0xF0, 0x1E, 0xF0, 0x1E]);
        interp.registers[0] = 0x10;
        interp.index = 0xFFE;
        interp.cycle().unwrap();
        assert_eq!(interp.index(), 0x00E);
        assert_eq!(interp.registers()[VFLAG], 1);

        interp.cycle().unwrap();
        assert_eq!(interp.index(), 0x01E);
        assert_eq!(interp.registers()[VFLAG], 0);
    }

    #[test]
    fn rpl_flags_save_and_restore_up_to_eight_registers() {
        let mut interp = power(Mode::Schip, &[0xFA, 0x75, 0x6A, 0x00, 0xFA, 0x85]);
        for i in 0..16 {
            interp.registers[i] = i as u8 + 1;
        }
        interp.cycle().unwrap();
        assert_eq!(interp.flags(), &[1, 2, 3, 4, 5, 6, 7, 8]);

        interp.cycle().unwrap(); // clobber VA
        interp.cycle().unwrap();
        assert_eq!(&interp.registers()[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        // registers past the flag storage are untouched by the restore
        assert_eq!(interp.registers()[0xA], 0);
    }

    #[test]
    fn random_draws_are_masked_and_reproducible_from_the_seed() {
        let rom = [0xC0, 0x0F, 0xC1, 0xFF];
        let mut first = Interpreter::with_seed(7);
        first.power_and_load(&rom, Mode::Schip).unwrap();
        let mut second = Interpreter::with_seed(7);
        second.power_and_load(&rom, Mode::Schip).unwrap();

        first.cycle().unwrap();
        first.cycle().unwrap();
        second.cycle().unwrap();
        second.cycle().unwrap();

        assert_eq!(first.registers()[0] & 0xF0, 0);
        assert_eq!(first.registers()[0], second.registers()[0]);
        assert_eq!(first.registers()[1], second.registers()[1]);
    }

    #[test]
    fn draw_sets_the_collision_flag_and_redraw() {
        // draw the 0 glyph twice at the same spot
        let rom = [0xF0, 0x29, 0xD1, 0x25, 0xD1, 0x25];
        let mut interp = power(Mode::CosmacVip, &rom);
        interp.registers[1] = 4;
        interp.registers[2] = 6;

        assert_eq!(interp.cycle(), Ok(false));
        assert_eq!(interp.cycle(), Ok(true));
        assert_eq!(interp.registers()[VFLAG], 0);

        assert_eq!(interp.cycle(), Ok(true));
        assert_eq!(interp.registers()[VFLAG], 1);
        assert!(interp.display().buffer().iter().all(|&row| row == 0));
    }

    #[test]
    fn big_sprite_draw_reports_collided_rows_in_the_flag() {
        // hires on, I = 0x400, draw 16x16 at (V0, V1) twice
        let rom = [0x00, 0xFF, 0xA4, 0x00, 0xD0, 0x10, 0xD0, 0x10];
        let mut interp = power(Mode::Schip, &rom);
        interp.cycle().unwrap();
        interp.cycle().unwrap();
        interp.memory[0x400..0x420].fill(0xFF);

        interp.cycle().unwrap();
        assert_eq!(interp.registers()[VFLAG], 0);
        interp.cycle().unwrap();
        assert_eq!(interp.registers()[VFLAG], 16);
    }

    #[test]
    fn illegal_opcode_fault_carries_the_word_and_keeps_the_pc_advance() {
        let mut interp = power(Mode::Schip, &[0x81, 0x18]);
        assert_eq!(interp.cycle(), Err(Fault::IllegalOpcode(0x8118)));
        assert_eq!(interp.pc(), 0x202);
    }

    #[test]
    fn schip_only_opcodes_fault_under_the_original_mode() {
        let mut interp = power(Mode::CosmacVip, &[0x00, 0xFF]);
        assert_eq!(interp.cycle(), Err(Fault::IllegalOpcode(0x00FF)));
    }

    #[test]
    fn machine_routine_retries_in_place() {
        let mut interp = power(Mode::CosmacVip, &[0x03, 0x45]);
        assert_eq!(interp.cycle(), Ok(false));
        assert_eq!(interp.pc(), 0x200);
    }

    #[test]
    fn exit_powers_the_machine_off() {
        let mut interp = power(Mode::Schip, &[0x00, 0xFD]);
        interp.cycle().unwrap();
        assert!(!interp.powered());

        // cycling an unpowered machine is a no-op
        assert_eq!(interp.cycle(), Ok(false));
        assert_eq!(interp.pc(), 0x202);
    }

    #[test]
    fn oversized_rom_is_rejected_before_any_mutation() {
        let mut interp = Interpreter::with_seed(0);
        let result = interp.power_and_load(&vec![0xAA; MAX_ROM_SIZE + 1], Mode::Schip);
        assert_eq!(
            result,
            Err(Fault::RomTooLarge {
                size: MAX_ROM_SIZE + 1,
                max: MAX_ROM_SIZE
            })
        );
        assert!(!interp.powered());
        assert!(interp.memory().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn a_rom_filling_the_program_area_loads() {
        let mut interp = Interpreter::with_seed(0);
        interp
            .power_and_load(&vec![0xAA; MAX_ROM_SIZE], Mode::Schip)
            .unwrap();
        assert!(interp.powered());
        assert_eq!(interp.memory()[MEMORY_SIZE - 1], 0xAA);
    }

    #[test]
    fn call_stack_depth_is_twelve_under_the_original_mode() {
        // 0x200: CALL 0x200, forever
        let mut interp = power(Mode::CosmacVip, &[0x22, 0x00]);
        for _ in 0..12 {
            interp.cycle().unwrap();
        }
        assert_eq!(interp.cycle(), Err(Fault::StackOverflow(0x200)));
        assert_eq!(interp.stack().len(), 12);
    }

    #[test]
    fn returning_with_an_empty_stack_faults() {
        let mut interp = power(Mode::Schip, &[0x00, 0xEE]);
        assert_eq!(interp.cycle(), Err(Fault::StackUnderflow(0x200)));
    }

    #[test]
    fn power_and_load_fully_resets_prior_state() {
        let mut interp = power(Mode::XoChip, &[0x60, 0xFF, 0xF0, 0x15]);
        interp.cycle().unwrap();
        interp.cycle().unwrap();
        interp.display.draw_sprite(0, 0, &[0xFF]);
        interp.set_input(3, true);

        interp.power_and_load(&[0x00, 0xE0], Mode::Schip).unwrap();
        assert_eq!(interp.registers(), &[0; 16]);
        assert_eq!(interp.delay_timer(), 0);
        assert_eq!(interp.pc(), PROGRAM_STARTING_ADDRESS);
        assert_eq!(interp.mode(), Mode::Schip);
        assert!(interp.display().buffer().iter().all(|&row| row == 0));
        assert!(interp.first_down_key().is_none());
    }

    #[test]
    fn snapshot_replay_reproduces_the_machine_bit_for_bit() {
        // busy loop: random draw, sprite draw, index walk, jump back
        let rom = [
            0x6A, 0x1F, // V10 = 31
            0xC0, 0xFF, // V0 = rand
            0xA0, 0x50, // I = 0x50
            0xD0, 0xA5, // draw 5 rows at (V0, V10)
            0x7A, 0x03, // V10 += 3
            0x12, 0x02, // jump 0x202
        ];
        let mut interp = Interpreter::with_seed(99);
        interp.power_and_load(&rom, Mode::XoChip).unwrap();
        for _ in 0..100 {
            interp.cycle().unwrap();
        }

        let snapshot = interp.clone();
        assert!(snapshot == interp);

        let mut replay = snapshot.clone();
        for _ in 0..100 {
            interp.cycle().unwrap();
            replay.cycle().unwrap();
        }
        assert!(replay == interp);
        assert_eq!(replay.registers(), interp.registers());
        assert_eq!(replay.display().buffer(), interp.display().buffer());
    }

    #[test]
    fn straightline_opcodes_advance_pc_by_two_or_four() {
        for mode in [Mode::CosmacVip, Mode::Schip, Mode::XoChip] {
            for word in (0x1000..=0xBFFF).chain(0xD000..=0xFFFFu16) {
                let Ok(instruction) = InstructionParameters::new(word).try_decode(mode) else {
                    continue;
                };
                match instruction {
                    Instruction::Jump(_)
                    | Instruction::JumpWithOffset(_, _)
                    | Instruction::CallSubroutine(_)
                    | Instruction::SubroutineReturn
                    | Instruction::WaitForKey(_)
                    | Instruction::GenerateRandom(_, _) => continue,
                    _ => (),
                }

                let mut interp = power(mode, &[(word >> 8) as u8, word as u8]);
                interp.index = 0x500;
                interp.cycle().unwrap();
                assert!(
                    interp.pc() == 0x202 || interp.pc() == 0x204,
                    "{word:#06X} under {mode} left pc at {:#05X}",
                    interp.pc()
                );
            }
        }
    }
}
