use crate::{interp::Fault, mode::Mode};

use std::fmt;

// Takes 16 bits (instruction size) and decomposes it into its parts
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InstructionParameters {
    pub bits: u16,
    pub op: u8,
    pub x: u8,
    pub y: u8,
    pub n: u8,
    pub nn: u8,
    pub nnn: u16,
}

impl From<[u8; 2]> for InstructionParameters {
    fn from(bytes: [u8; 2]) -> Self {
        InstructionParameters::new(u16::from_be_bytes(bytes))
    }
}

impl InstructionParameters {
    /// Decomposes a raw instruction word into its addressing-mode fields.
    /// Total over all 16-bit inputs and side-effect free.
    pub fn new(bits: u16) -> Self {
        InstructionParameters {
            bits,
            op: ((bits & 0xF000) >> 4 * 3) as u8,
            x: ((bits & 0x0F00) >> 4 * 2) as u8,
            y: ((bits & 0x00F0) >> 4 * 1) as u8,
            n: ((bits & 0x000F) >> 4 * 0) as u8,
            nn: (bits & 0x00FF) as u8,
            nnn: bits & 0x0FFF,
        }
    }

    /// Resolves the decomposed word against the dispatch tables of the given
    /// interpreter lineage.
    ///
    /// An opcode with no handler in the arithmetic (`8XYN`) or miscellaneous
    /// (`FXNN`) subtables, or one belonging to a later lineage than `mode`,
    /// is an illegal-opcode fault carrying the offending word. The `0NNN`
    /// group never faults: low bytes without a dedicated handler resolve to
    /// [`Instruction::MachineRoutine`].
    pub fn try_decode(&self, mode: Mode) -> Result<Instruction, Fault> {
        let InstructionParameters {
            op,
            x,
            y,
            n,
            nn,
            nnn,
            ..
        } = *self;

        let instruction = match (op, x, y, n) {
            (0x0, 0x0, 0xC, __n) => Instruction::ScrollDown(n),
            (0x0, 0x0, 0xD, __n) => Instruction::ScrollUp(n),
            (0x0, 0x0, 0xE, 0x0) => Instruction::ClearScreen,
            (0x0, 0x0, 0xE, 0xE) => Instruction::SubroutineReturn,
            (0x0, 0x0, 0xF, 0xB) => Instruction::ScrollRight,
            (0x0, 0x0, 0xF, 0xC) => Instruction::ScrollLeft,
            (0x0, 0x0, 0xF, 0xD) => Instruction::Exit,
            (0x0, 0x0, 0xF, 0xE) => Instruction::LowResolution,
            (0x0, 0x0, 0xF, 0xF) => Instruction::HighResolution,
            (0x0, __x, __y, __n) => Instruction::MachineRoutine(nnn),
            (0x1, __x, __y, __n) => Instruction::Jump(nnn),
            (0x2, __x, __y, __n) => Instruction::CallSubroutine(nnn),
            (0x3, __x, __y, __n) => Instruction::SkipIfEqualsConstant(x, nn),
            (0x4, __x, __y, __n) => Instruction::SkipIfNotEqualsConstant(x, nn),
            (0x5, __x, __y, 0x0) => Instruction::SkipIfEquals(x, y),
            (0x6, __x, __y, __n) => Instruction::SetConstant(x, nn),
            (0x7, __x, __y, __n) => Instruction::AddConstant(x, nn),
            (0x8, __x, __y, 0x0) => Instruction::Set(x, y),
            (0x8, __x, __y, 0x1) => Instruction::Or(x, y),
            (0x8, __x, __y, 0x2) => Instruction::And(x, y),
            (0x8, __x, __y, 0x3) => Instruction::Xor(x, y),
            (0x8, __x, __y, 0x4) => Instruction::Add(x, y),
            (0x8, __x, __y, 0x5) => Instruction::Sub(x, y, true),
            (0x8, __x, __y, 0x6) => Instruction::Shift(x, y, true),
            (0x8, __x, __y, 0x7) => Instruction::Sub(x, y, false),
            (0x8, __x, __y, 0xE) => Instruction::Shift(x, y, false),
            (0x9, __x, __y, 0x0) => Instruction::SkipIfNotEquals(x, y),
            (0xA, __x, __y, __n) => Instruction::SetIndex(nnn),
            (0xB, __x, __y, __n) => Instruction::JumpWithOffset(nnn, x),
            (0xC, __x, __y, __n) => Instruction::GenerateRandom(x, nn),
            (0xD, __x, __y, __n) => Instruction::Draw(x, y, n),
            (0xE, __x, 0x9, 0xE) => Instruction::SkipIfKeyDown(x),
            (0xE, __x, 0xA, 0x1) => Instruction::SkipIfKeyNotDown(x),
            (0xF, __x, 0x0, 0x7) => Instruction::GetDelayTimer(x),
            (0xF, __x, 0x0, 0xA) => Instruction::WaitForKey(x),
            (0xF, __x, 0x1, 0x5) => Instruction::SetDelayTimer(x),
            (0xF, __x, 0x1, 0x8) => Instruction::SetSoundTimer(x),
            (0xF, __x, 0x1, 0xE) => Instruction::AddToIndex(x),
            (0xF, __x, 0x2, 0x9) => Instruction::SetIndexToHexChar(x),
            (0xF, __x, 0x3, 0x0) => Instruction::SetIndexToBigHexChar(x),
            (0xF, __x, 0x3, 0x3) => Instruction::StoreBinaryCodedDecimal(x),
            (0xF, __x, 0x5, 0x5) => Instruction::Store(x),
            (0xF, __x, 0x6, 0x5) => Instruction::Load(x),
            (0xF, __x, 0x7, 0x5) => Instruction::StoreFlags(x),
            (0xF, __x, 0x8, 0x5) => Instruction::LoadFlags(x),
            _ => return Err(Fault::IllegalOpcode(self.bits)),
        };

        match instruction {
            Instruction::Exit
            | Instruction::LowResolution
            | Instruction::HighResolution
            | Instruction::ScrollDown(_)
            | Instruction::ScrollRight
            | Instruction::ScrollLeft
            | Instruction::SetIndexToBigHexChar(_)
            | Instruction::StoreFlags(_)
            | Instruction::LoadFlags(_) => {
                if mode < Mode::Schip {
                    return Err(Fault::IllegalOpcode(self.bits));
                }
            }
            Instruction::ScrollUp(_) => {
                if mode < Mode::XoChip {
                    return Err(Fault::IllegalOpcode(self.bits));
                }
            }
            _ => (),
        }

        Ok(instruction)
    }
}

impl fmt::Display for InstructionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04X} (op = {:#X?}, x = {:?}, y = {:?}, n = {:?}, nn = {:?}, nnn = {:?})",
            self.bits, self.op, self.x, self.y, self.n, self.nn, self.nnn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    MachineRoutine(u16),
    Exit,
    Jump(u16),
    JumpWithOffset(u16, u8),
    CallSubroutine(u16),
    SubroutineReturn,
    SkipIfEqualsConstant(u8, u8),
    SkipIfNotEqualsConstant(u8, u8),
    SkipIfEquals(u8, u8),
    SkipIfNotEquals(u8, u8),
    SkipIfKeyDown(u8),
    SkipIfKeyNotDown(u8),
    WaitForKey(u8),
    SetConstant(u8, u8),
    AddConstant(u8, u8),
    Set(u8, u8),
    Or(u8, u8),
    And(u8, u8),
    Xor(u8, u8),
    Add(u8, u8),
    Sub(u8, u8, bool),
    Shift(u8, u8, bool),
    GetDelayTimer(u8),
    SetDelayTimer(u8),
    SetSoundTimer(u8),
    SetIndex(u16),
    SetIndexToHexChar(u8),
    SetIndexToBigHexChar(u8),
    AddToIndex(u8),
    Load(u8),
    Store(u8),
    LoadFlags(u8),
    StoreFlags(u8),
    StoreBinaryCodedDecimal(u8),
    GenerateRandom(u8, u8),
    Draw(u8, u8, u8),
    ScrollUp(u8),
    ScrollDown(u8),
    ScrollLeft,
    ScrollRight,
    LowResolution,
    HighResolution,
    ClearScreen,
}
