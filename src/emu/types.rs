// The constants are specified by the CHIP-8 specification
pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;

pub const MEMORY_SIZE: usize = 4096;
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;

/// Call stack region size in 16-bit slots.
pub const STACK_SLOTS: usize = 2048;
/// Return addresses are pushed in 2-slot steps, so only half the slots are usable.
pub const STACK_CAPACITY: usize = STACK_SLOTS / 2;

pub const TIMER_HZ: f32 = 60.0;
pub const TIMER_TIME_STEP: f32 = 1.0 / TIMER_HZ;

/// A type alias for the CHIP-8 display buffer representation
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];

/// Result type for CHIP-8 CPU cycle execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8Result {
    /// Continue executing instructions.
    Continue,
    /// The display buffer changed and should be handed to the presenter.
    Redraw,
    /// A key-wait instruction is pending; no progress until a key goes down.
    AwaitingKey,
}

/// Error types that can occur during CHIP-8 emulation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    Capacity { size: usize, max_size: usize },

    #[error("Address {address:#06X} is outside of the 4 KiB address space")]
    InvalidAddress { address: u16 },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("Stack overflow: call depth of {depth} exceeded")]
    StackOverflow { depth: usize },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Unknown opcode: {opcode:#06X}")]
    UnknownOpcode { opcode: u16 },
}

impl Chip8Error {
    /// Fatal errors are raised while executing and halt the machine.
    /// The rest are reported to whoever called the load or accessor.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Chip8Error::Capacity { .. } | Chip8Error::InvalidAddress { .. }
        )
    }
}
