//! The pixel-addressable display.
//!
//! One physical 128x64 grid backs both resolutions. In low-resolution mode
//! every logical pixel is doubled 2x2 so sprites keep their visual size on
//! the high-resolution grid, and coordinates wrap or clip against the 64x32
//! logical view instead of the physical one.

pub const LORES_WIDTH: u16 = 64;
pub const LORES_HEIGHT: u16 = 32;

pub const HIRES_WIDTH: u16 = 128;
pub const HIRES_HEIGHT: u16 = 64;

const CLEAR_BUFFER: DisplayBuffer = [0; HIRES_HEIGHT as usize];

// Each u128 represents a row of the display with each bit representing whether that pixel is on
// NOTE: The left-most pixel on the row corresponds to the most significant bit
pub type DisplayBuffer = [u128; HIRES_HEIGHT as usize];

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Display {
    buffer: DisplayBuffer,
    hires: bool,
    wrap: bool,
}

impl Display {
    pub fn new(wrap: bool) -> Self {
        Self {
            buffer: CLEAR_BUFFER,
            hires: false,
            wrap,
        }
    }

    pub fn buffer(&self) -> &DisplayBuffer {
        &self.buffer
    }

    pub fn hires(&self) -> bool {
        self.hires
    }

    /// Switches between low- and high-resolution addressing. Does not clear
    /// the buffer; programs that want a blank screen issue a clear themselves.
    pub fn set_hires(&mut self, hires: bool) {
        self.hires = hires;
    }

    pub fn wrap(&self) -> bool {
        self.wrap
    }

    pub fn set_wrap(&mut self, wrap: bool) {
        self.wrap = wrap;
    }

    /// Active (width, height) in logical pixels.
    pub fn dimensions(&self) -> (u16, u16) {
        if self.hires {
            (HIRES_WIDTH, HIRES_HEIGHT)
        } else {
            (LORES_WIDTH, LORES_HEIGHT)
        }
    }

    /// State of one physical pixel. Coordinates are taken modulo the
    /// physical grid.
    pub fn pixel(&self, x: u16, y: u16) -> bool {
        self.buffer[(y % HIRES_HEIGHT) as usize] >> (127 - x % HIRES_WIDTH) & 1 == 1
    }

    pub fn clear(&mut self) {
        self.buffer = CLEAR_BUFFER;
    }

    /// XOR-draws an 8-pixel-wide sprite of up to 16 rows at the given
    /// logical coordinates, returning true if any lit pixel was unset.
    ///
    /// The origin always wraps modulo the active resolution; overflow of
    /// subsequent rows and columns wraps or clips per the wrap flag.
    pub fn draw_sprite(&mut self, x: u16, y: u16, sprite: &[u8]) -> bool {
        let mut collided = false;

        if self.hires {
            let x = x % HIRES_WIDTH;
            let y = y % HIRES_HEIGHT;
            for (i, &byte) in sprite.iter().enumerate() {
                let Some(row) = self.target_row(y, i as u16, HIRES_HEIGHT) else {
                    continue;
                };
                let pattern = self.position_bits((byte as u128) << 120, x);
                collided |= self.buffer[row] & pattern != 0;
                self.buffer[row] ^= pattern;
            }
        } else {
            let x = (x % LORES_WIDTH) * 2;
            let y = y % LORES_HEIGHT;
            for (i, &byte) in sprite.iter().enumerate() {
                let Some(row) = self.target_row(y, i as u16, LORES_HEIGHT) else {
                    continue;
                };
                let row = row * 2;
                let pattern = self.position_bits((double_bits(byte) as u128) << 112, x);
                // both physical rows of a doubled pixel agree, so one carries
                // the collision check
                collided |= self.buffer[row] & pattern != 0;
                self.buffer[row] ^= pattern;
                self.buffer[row + 1] ^= pattern;
            }
        }

        collided
    }

    /// XOR-draws the 16x16 SCHIP big sprite, returning the number of rows
    /// that collided. Only meaningful in high-resolution mode.
    ///
    /// When clipping, rows pushed past the bottom of the grid are not drawn
    /// but still count as collided, per SCHIP 1.1.
    pub fn draw_big_sprite(&mut self, x: u16, y: u16, rows: &[u16; 16]) -> u8 {
        let x = x % HIRES_WIDTH;
        let y = y % HIRES_HEIGHT;
        let mut collided_rows = 0;

        for (i, &bits) in rows.iter().enumerate() {
            let Some(row) = self.target_row(y, i as u16, HIRES_HEIGHT) else {
                collided_rows += 1;
                continue;
            };
            let pattern = self.position_bits((bits as u128) << 112, x);
            if self.buffer[row] & pattern != 0 {
                collided_rows += 1;
            }
            self.buffer[row] ^= pattern;
        }

        collided_rows
    }

    /// Shifts every pixel 4 physical columns (2 logical columns in
    /// low-resolution mode), filling vacated columns with 0.
    pub fn scroll_left(&mut self) {
        for row in self.buffer.iter_mut() {
            *row <<= 4;
        }
    }

    pub fn scroll_right(&mut self) {
        for row in self.buffer.iter_mut() {
            *row >>= 4;
        }
    }

    /// Shifts rows by `count` physical rows, filling vacated rows with 0.
    /// In low-resolution mode the count is rounded down to even so doubled
    /// pixels stay block-aligned (half-pixel scrolls drop).
    pub fn scroll_vertical(&mut self, count: usize, up: bool) {
        let count = if self.hires { count } else { count & !1 };
        let count = count.min(self.buffer.len());
        if count == 0 {
            return;
        }

        let height = self.buffer.len();
        if up {
            self.buffer.copy_within(count.., 0);
            self.buffer[height - count..].fill(0);
        } else {
            self.buffer.copy_within(..height - count, count);
            self.buffer[..count].fill(0);
        }
    }

    fn target_row(&self, y: u16, offset: u16, height: u16) -> Option<usize> {
        let row = y + offset;
        if row < height {
            Some(row as usize)
        } else if self.wrap {
            Some((row % height) as usize)
        } else {
            None
        }
    }

    fn position_bits(&self, left_aligned: u128, x: u16) -> u128 {
        if self.wrap {
            left_aligned.rotate_right(x as u32)
        } else {
            left_aligned >> x
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Display::new(true)
    }
}

// Spreads each bit of a sprite byte into a horizontal pair for the doubled
// low-resolution view, e.g. 0b1010_0001 -> 0b1100110000000011.
fn double_bits(byte: u8) -> u16 {
    (0..8).fold(0, |doubled, bit| {
        if byte >> bit & 1 == 1 {
            doubled | 0b11 << (2 * bit)
        } else {
            doubled
        }
    })
}
