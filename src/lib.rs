//! A CHIP-8 virtual machine core covering the COSMAC VIP, SCHIP, and
//! XO-CHIP interpreter lineages.
//!
//! The crate is the machine and nothing else: no window, no audio device,
//! no clock. The host owns scheduling. It calls [`Interpreter::cycle`] for
//! each instruction at whatever rate it likes, calls
//! [`Interpreter::decrement_timers`] at 60 Hz, latches keys through
//! [`Interpreter::set_input`], and reads the [`Display`] buffer back
//! whenever a cycle reports a redraw.
//!
//! Lineage differences (shift source, index advancement, sprite wrapping,
//! and the rest) are resolved into a [`Quirks`] record once at power-on, so
//! the dispatch loop itself is lineage-free.
//!
//! ```
//! use c8_core::{Interpreter, Mode};
//!
//! // V0 = 2, V1 = 3, V0 += V1
//! let rom = [0x60, 0x02, 0x61, 0x03, 0x80, 0x14];
//!
//! let mut interp = Interpreter::new();
//! interp.power_and_load(&rom, Mode::Schip)?;
//! for _ in 0..3 {
//!     interp.cycle()?;
//! }
//!
//! assert_eq!(interp.registers()[0], 5);
//! # Ok::<(), c8_core::Fault>(())
//! ```

pub mod disp;
pub mod instruct;
pub mod interp;
pub mod mem;
pub mod mode;

pub use disp::{Display, DisplayBuffer};
pub use instruct::{Instruction, InstructionParameters};
pub use interp::{Fault, Interpreter, VFLAG};
pub use mode::{Mode, Quirks};
