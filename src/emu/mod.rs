mod chip8;
mod display;
mod dump;
mod execute;
mod font;
mod opcode;
mod runner;
mod timers;
mod types;

pub use chip8::*;
pub use display::*;
pub use dump::*;
pub use font::*;
pub use opcode::*;
pub use runner::*;
pub use timers::*;
pub use types::*;
