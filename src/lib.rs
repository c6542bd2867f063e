pub mod emu;
mod nibble;

pub use nibble::{u4, u12};
