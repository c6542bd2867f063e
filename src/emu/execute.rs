use tracing::{debug, trace};

use super::{
    Chip8, Chip8Error, Chip8Result, DISPLAY_Y, FONT_GLYPH_SIZE, FONT_START_ADDRESS, Opcode,
    OpcodeALU,
};
use crate::u4;

impl Chip8 {
    /// Applies one decoded instruction.
    ///
    /// The program counter is advanced past the instruction before it takes effect.
    pub fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        trace!(pc = self.pc, ?opcode, "execute");
        self.pc = self.pc.wrapping_add(2);

        match opcode {
            Opcode::ClearDisplay => {
                self.display.clear();
                return Ok(Chip8Result::Redraw);
            }
            Opcode::Jump { nnn } => {
                self.pc = nnn.get();
            }
            Opcode::JumpWithOffset { nnn } => {
                self.pc = nnn.get().wrapping_add(self.v[0].into());
            }
            Opcode::Call { nnn } => {
                self.push(self.pc)?;
                self.pc = nnn.get();
            }
            Opcode::Return => {
                self.pc = self.pop()?;
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if self.v[x] == nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if self.v[x] != nn {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if self.v[x] == self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if self.v[x] != self.v[y] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                self.carry_add(x, nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = rand::random();
                self.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn.get();
            }
            Opcode::AddIndexReg { x } => {
                self.i = self.i.wrapping_add(self.v[x].into());
                self.v[0xF] = if self.i > 0x0FFF { 1 } else { 0 };
            }
            Opcode::Draw { x, y, n } => {
                return self.execute_draw(x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                if self.keypad[u4::masked(self.v[x])] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !self.keypad[u4::masked(self.v[x])] {
                    self.pc = self.pc.wrapping_add(2);
                }
            }
            Opcode::WaitForKey { x } => {
                debug!(register = %x, "waiting for key press");
                self.awaiting_key = Some(x);
                return Ok(Chip8Result::AwaitingKey);
            }
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.timers.delay();
            }
            Opcode::SetDelayTimer { x } => {
                self.timers.set_delay(self.v[x]);
            }
            Opcode::SetSoundTimer { x } => {
                self.timers.set_sound(self.v[x]);
            }
            Opcode::FontChar { x } => {
                let digit = self.v[x] & 0x0F;
                self.i = FONT_START_ADDRESS as u16 + digit as u16 * FONT_GLYPH_SIZE;
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                *self.mem_get(self.i)? = value / 100;
                *self.mem_get(self.i.wrapping_add(1))? = (value / 10) % 10;
                *self.mem_get(self.i.wrapping_add(2))? = value % 10;
            }
            Opcode::StoreRegs { x } => {
                for reg_index in 0..=usize::from(x) {
                    *self.mem_get(self.i.wrapping_add(reg_index as u16))? = self.v[reg_index];
                }
            }
            Opcode::LoadRegs { x } => {
                for reg_index in 0..=usize::from(x) {
                    self.v[reg_index] = *self.mem_get(self.i.wrapping_add(reg_index as u16))?;
                }
            }
            Opcode::Unknown(opcode) => {
                return Err(Chip8Error::UnknownOpcode { opcode });
            }
        };

        Ok(Chip8Result::Continue)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => self.v[x] = self.v[y],
            OpcodeALU::Or => self.v[x] |= self.v[y],
            OpcodeALU::And => self.v[x] &= self.v[y],
            OpcodeALU::Xor => self.v[x] ^= self.v[y],
            OpcodeALU::Add => self.carry_add(x, self.v[y]),
            OpcodeALU::Sub => self.borrow_sub(x, self.v[x], self.v[y]),
            OpcodeALU::SubReverse => self.borrow_sub(x, self.v[y], self.v[x]),
            // Flag goes in before the shift, so 8FxN shifts the flag itself
            OpcodeALU::ShiftRight => {
                self.v[0xF] = self.v[x] & 1;
                self.v[x] >>= 1;
            }
            OpcodeALU::ShiftLeft => {
                self.v[0xF] = self.v[x] >> 7;
                self.v[x] <<= 1;
            }
        }
    }

    /// Vx += value, VF = 1 on unsigned overflow.
    ///
    /// The sum is stored after the flag, so it wins when x is VF.
    fn carry_add(&mut self, x: u4, value: u8) {
        let (res, overflow) = self.v[x].overflowing_add(value);
        self.v[0xF] = if overflow { 1 } else { 0 };
        self.v[x] = res;
    }

    /// Vx = lhs - rhs, VF = 1 when no borrow occurred.
    fn borrow_sub(&mut self, x: u4, lhs: u8, rhs: u8) {
        let (res, borrow) = lhs.overflowing_sub(rhs);
        self.v[0xF] = if borrow { 0 } else { 1 }; // Notice that borrow is inverted
        self.v[x] = res;
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<Chip8Result, Chip8Error> {
        // Rows clipped off the bottom are never read
        let y_pos = usize::from(self.v[y]) % DISPLAY_Y;
        let visible = usize::from(n).min(DISPLAY_Y - y_pos);

        let start = self.i as usize;
        let end = start + visible;
        let sprite = self
            .memory
            .get(start..end)
            .ok_or(Chip8Error::MemoryOutOfBounds {
                address: end.saturating_sub(1),
            })?;
        let any_erased = self.display.blit(self.v[x], self.v[y], sprite);

        self.v[0xF] = if any_erased { 1 } else { 0 };
        Ok(Chip8Result::Redraw)
    }
}
