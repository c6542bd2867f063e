use std::fmt;

/// CPU state captured when the machine halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDump {
    pub pc: u16,
    pub i: u16,
    /// Number of outstanding calls
    pub sp: usize,
    pub top_of_stack: Option<u16>,
    pub v: [u8; 16],
    pub delay_timer: u8,
    pub sound_timer: u8,
}

impl fmt::Display for StateDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-------- CPU STATE --------")?;
        writeln!(f, "PC: {:03X}", self.pc)?;
        writeln!(f, "I: {:03X}", self.i)?;
        writeln!(f, "SP: {}", self.sp)?;
        match self.top_of_stack {
            Some(addr) => writeln!(f, "Top of stack: {addr:03X}")?,
            None => writeln!(f, "Top of stack: empty")?,
        }
        writeln!(f, "DT: {:02X}   ST: {:02X}", self.delay_timer, self.sound_timer)?;
        writeln!(f, "Registers:")?;
        for (idx, value) in self.v.iter().enumerate() {
            writeln!(f, "  V{idx:X}: {value:02X}")?;
        }
        Ok(())
    }
}
