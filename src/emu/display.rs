use super::{DISPLAY_X, DISPLAY_Y, Display};

/// 64x32 monochrome frame buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct DisplayBuffer {
    pixels: Display<bool>,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        Self {
            pixels: [[false; DISPLAY_X]; DISPLAY_Y],
        }
    }

    pub fn clear(&mut self) {
        self.pixels = [[false; DISPLAY_X]; DISPLAY_Y];
    }

    /// XORs `sprite` onto the buffer with its top-left corner at (`x`, `y`).
    ///
    /// The origin wraps around the screen edges, the sprite body does not:
    /// rows below the bottom edge and columns past the right edge are clipped.
    /// Returns true if any lit pixel was switched off.
    pub fn blit(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
        let x_pos = x as usize % DISPLAY_X;
        let y_pos = y as usize % DISPLAY_Y;

        // Don't draw out of bounds
        let row_count = std::cmp::min(sprite.len(), DISPLAY_Y - y_pos);
        let col_count = std::cmp::min(8, DISPLAY_X - x_pos);

        let mut any_erased = false;
        for (row, sprite_byte) in sprite.iter().take(row_count).enumerate() {
            for col in 0..col_count {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let pixel = &mut self.pixels[y_pos + row][x_pos + col];

                    // Flip the pixel
                    *pixel ^= true;

                    if !*pixel {
                        any_erased = true;
                    }
                }
            }
        }

        any_erased
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn pixel(&self, y: usize, x: usize) -> bool {
        self.pixels[y][x]
    }

    pub fn rows(&self) -> &Display<bool> {
        &self.pixels
    }

    /// Row-major iterator over every pixel.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.pixels.iter().flatten().copied()
    }

    pub fn lit_count(&self) -> usize {
        self.iter().filter(|&p| p).count()
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DisplayBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.pixels {
            let line: String = row.iter().map(|&p| if p { '#' } else { '.' }).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_sets_pixels_without_collision() {
        let mut display = DisplayBuffer::new();
        assert!(!display.blit(0, 0, &[0b1010_0000]));
        assert!(display.pixel(0, 0));
        assert!(!display.pixel(0, 1));
        assert!(display.pixel(0, 2));
        assert_eq!(display.lit_count(), 2);
    }

    #[test]
    fn double_blit_restores_and_reports_collision() {
        let mut display = DisplayBuffer::new();
        display.blit(10, 4, &[0x0F]);
        let before = display.clone();

        assert!(!display.blit(3, 7, &[0xFF, 0x81, 0xFF]));
        assert!(display.blit(3, 7, &[0xFF, 0x81, 0xFF]));
        assert_eq!(display, before);
    }

    #[test]
    fn collision_is_tracked_across_whole_sprite() {
        let mut display = DisplayBuffer::new();
        display.blit(0, 0, &[0x80]);
        // First row collides, second row does not; the result must still be true.
        assert!(display.blit(0, 0, &[0x80, 0x80]));
    }

    #[test]
    fn origin_wraps_but_body_is_clipped() {
        let mut display = DisplayBuffer::new();
        // 70 % 64 = 6, 33 % 32 = 1
        display.blit(70, 33, &[0x80]);
        assert!(display.pixel(1, 6));

        display.clear();
        display.blit(62, 30, &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(display.lit_count(), 4);
        assert!(display.pixel(31, 63));
        assert!(!display.pixel(0, 0));
        assert!(!display.pixel(30, 0));
    }
}
