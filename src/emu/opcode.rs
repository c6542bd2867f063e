use crate::{u4, u12};

/// CHIP-8 instruction opcodes.
///
/// The fields (x, y, n, nn, nnn) correspond to the operands encoded in the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// 1nnn - Jump to location nnn.
    Jump { nnn: u12 },
    /// Bnnn - Jump to location nnn + V0.
    JumpWithOffset { nnn: u12 },

    /// 2nnn - Call subroutine at nnn.
    Call { nnn: u12 },
    /// 00EE - Return from a subroutine.
    Return,

    /// 3xnn - Skip next instruction if Vx == nn.
    SkipRegEqualImm { x: u4, nn: u8 },
    /// 4xnn - Skip next instruction if Vx != nn.
    SkipRegNotEqualImm { x: u4, nn: u8 },
    /// 5xy0 - Skip next instruction if Vx == Vy.
    SkipRegEqualReg { x: u4, y: u4 },
    /// 9xy0 - Skip next instruction if Vx != Vy.
    SkipRegNotEqualReg { x: u4, y: u4 },

    /// 6xnn - Set Vx = nn.
    SetRegImm { x: u4, nn: u8 },
    /// 7xnn - Set Vx = Vx + nn, VF = carry.
    AddRegImm { x: u4, nn: u8 },
    /// Annn - Set I = nnn.
    SetIndexImm { nnn: u12 },
    /// Fx1E - Set I = I + Vx.
    AddIndexReg { x: u4 },

    /// 8xyN - ALU operations
    ALU { x: u4, y: u4, op: OpcodeALU },
    /// Cxnn - Set Vx = random byte AND nn.
    Random { x: u4, nn: u8 },

    /// 00E0 - Clear the display.
    ClearDisplay,
    /// Dxyn - Display sprite.
    Draw { x: u4, y: u4, n: u4 },

    /// Ex9E - Skip next instruction if key with the value of Vx is pressed.
    SkipIfPressed { x: u4 },
    /// ExA1 - Skip next instruction if key with the value of Vx is not pressed.
    SkipIfNotPressed { x: u4 },
    /// Fx0A - Wait for a key press, store the value of the key in Vx.
    WaitForKey { x: u4 },

    /// Fx07 - Set Vx = delay timer value.
    ReadDelayTimer { x: u4 },
    /// Fx15 - Set delay timer = Vx.
    SetDelayTimer { x: u4 },
    /// Fx18 - Set sound timer = Vx.
    SetSoundTimer { x: u4 },

    /// Fx29 - Set I = location of sprite for digit Vx.
    FontChar { x: u4 },
    /// Fx33 - Store BCD representation of Vx in memory locations I, I+1, and I+2.
    BCD { x: u4 },

    /// Fx55 - Store registers V0 through Vx in memory starting at location I.
    StoreRegs { x: u4 },
    /// Fx65 - Read registers V0 through Vx from memory starting at location I.
    LoadRegs { x: u4 },

    /// Represents an unknown opcode.
    Unknown(u16),
}

/// ALU operations for the 8xyN instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpcodeALU {
    /// 8xy0 - Vx = Vy
    Set,
    /// 8xy1 - Vx = Vx OR Vy
    Or,
    /// 8xy2 - Vx = Vx AND Vy
    And,
    /// 8xy3 - Vx = Vx XOR Vy
    Xor,
    /// 8xy4 - Vx = Vx + Vy
    Add,
    /// 8xy5 - Vx = Vx - Vy
    Sub,
    /// 8xy6 - Vx = Vx SHR 1
    ShiftRight,
    /// 8xy7 - Vx = Vy - Vx
    SubReverse,
    /// 8xyE - Vx = Vx SHL 1
    ShiftLeft,
}

impl Opcode {
    /// Decode a 16-bit raw opcode into an `Opcode` enum variant.
    ///
    /// The high nibble picks the instruction class; classes with several
    /// forms are told apart by their low byte or low nibble.
    pub fn decode(opcode: u16) -> Self {
        let [high, nn] = opcode.to_be_bytes();
        let x = u4::masked(high);
        let y = u4::masked(nn >> 4);
        let n = u4::masked(nn);
        let nnn = u12::masked(opcode);

        let decoded = match high >> 4 {
            0x0 if x.get() == 0 => Self::decode_system(nn),
            0x1 => Some(Opcode::Jump { nnn }),
            0x2 => Some(Opcode::Call { nnn }),
            0x3 => Some(Opcode::SkipRegEqualImm { x, nn }),
            0x4 => Some(Opcode::SkipRegNotEqualImm { x, nn }),
            0x5 if n.get() == 0 => Some(Opcode::SkipRegEqualReg { x, y }),
            0x6 => Some(Opcode::SetRegImm { x, nn }),
            0x7 => Some(Opcode::AddRegImm { x, nn }),
            0x8 => OpcodeALU::decode(n).map(|op| Opcode::ALU { x, y, op }),
            0x9 if n.get() == 0 => Some(Opcode::SkipRegNotEqualReg { x, y }),
            0xA => Some(Opcode::SetIndexImm { nnn }),
            0xB => Some(Opcode::JumpWithOffset { nnn }),
            0xC => Some(Opcode::Random { x, nn }),
            0xD => Some(Opcode::Draw { x, y, n }),
            0xE => Self::decode_keypad(x, nn),
            0xF => Self::decode_misc(x, nn),
            _ => None,
        };

        decoded.unwrap_or(Opcode::Unknown(opcode))
    }

    /// 00E0 and 00EE. Machine-code calls (0nnn) are not supported.
    fn decode_system(nn: u8) -> Option<Self> {
        match nn {
            0xE0 => Some(Opcode::ClearDisplay),
            0xEE => Some(Opcode::Return),
            _ => None,
        }
    }

    fn decode_keypad(x: u4, nn: u8) -> Option<Self> {
        match nn {
            0x9E => Some(Opcode::SkipIfPressed { x }),
            0xA1 => Some(Opcode::SkipIfNotPressed { x }),
            _ => None,
        }
    }

    fn decode_misc(x: u4, nn: u8) -> Option<Self> {
        let opcode = match nn {
            0x07 => Opcode::ReadDelayTimer { x },
            0x0A => Opcode::WaitForKey { x },
            0x15 => Opcode::SetDelayTimer { x },
            0x18 => Opcode::SetSoundTimer { x },
            0x1E => Opcode::AddIndexReg { x },
            0x29 => Opcode::FontChar { x },
            0x33 => Opcode::BCD { x },
            0x55 => Opcode::StoreRegs { x },
            0x65 => Opcode::LoadRegs { x },
            _ => return None,
        };
        Some(opcode)
    }
}

impl OpcodeALU {
    fn decode(n: u4) -> Option<Self> {
        let op = match n.get() {
            0x0 => OpcodeALU::Set,
            0x1 => OpcodeALU::Or,
            0x2 => OpcodeALU::And,
            0x3 => OpcodeALU::Xor,
            0x4 => OpcodeALU::Add,
            0x5 => OpcodeALU::Sub,
            0x6 => OpcodeALU::ShiftRight,
            0x7 => OpcodeALU::SubReverse,
            0xE => OpcodeALU::ShiftLeft,
            _ => return None,
        };
        Some(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_fields_bitwise() {
        assert_eq!(
            Opcode::decode(0xD12F),
            Opcode::Draw {
                x: u4::new(1),
                y: u4::new(2),
                n: u4::new(0xF)
            }
        );
        assert_eq!(
            Opcode::decode(0x2ABC),
            Opcode::Call {
                nnn: u12::masked(0xABC)
            }
        );
        assert_eq!(
            Opcode::decode(0x73FE),
            Opcode::AddRegImm {
                x: u4::new(3),
                nn: 0xFE
            }
        );
    }

    #[test]
    fn decodes_alu_forms() {
        assert_eq!(
            Opcode::decode(0x8AB7),
            Opcode::ALU {
                x: u4::new(0xA),
                y: u4::new(0xB),
                op: OpcodeALU::SubReverse
            }
        );
        assert_eq!(
            Opcode::decode(0x800E),
            Opcode::ALU {
                x: u4::new(0),
                y: u4::new(0),
                op: OpcodeALU::ShiftLeft
            }
        );
    }

    #[test]
    fn timer_and_memory_forms() {
        assert_eq!(Opcode::decode(0xF507), Opcode::ReadDelayTimer { x: u4::new(5) });
        assert_eq!(Opcode::decode(0xF518), Opcode::SetSoundTimer { x: u4::new(5) });
        assert_eq!(Opcode::decode(0xF00A), Opcode::WaitForKey { x: u4::new(0) });
        assert_eq!(Opcode::decode(0xFF65), Opcode::LoadRegs { x: u4::new(0xF) });
    }

    #[test]
    fn system_and_keypad_forms() {
        assert_eq!(Opcode::decode(0x00E0), Opcode::ClearDisplay);
        assert_eq!(Opcode::decode(0x00EE), Opcode::Return);
        assert_eq!(Opcode::decode(0xE79E), Opcode::SkipIfPressed { x: u4::new(7) });
        assert_eq!(Opcode::decode(0xE7A1), Opcode::SkipIfNotPressed { x: u4::new(7) });
    }

    #[test]
    fn unrecognized_patterns_are_unknown() {
        for word in [
            0x0000, 0x0123, 0x00E1, 0x01E0, 0x5121, 0x9AB3, 0x8008, 0xE09F, 0xF0FF, 0xF123,
        ] {
            assert_eq!(Opcode::decode(word), Opcode::Unknown(word), "{word:#06X}");
        }
    }
}
