use std::sync::Arc;

use tracing::{debug, info};

use super::{
    Chip8Error, Chip8Result, DisplayBuffer, FONT, FONT_END_ADDRESS, FONT_START_ADDRESS,
    MAX_ROM_SIZE, MEMORY_SIZE, Opcode, ROM_START_ADDRESS, STACK_CAPACITY, StateDump, Timers,
};
use crate::u4;

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: DisplayBuffer,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack for subroutine returns
    pub(crate) stack: Vec<u16>,

    /// Delay and sound timers, shared with the ticker thread
    pub(crate) timers: Arc<Timers>,

    /// Destination register of a pending FX0A instruction
    pub(crate) awaiting_key: Option<u4>,
    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_timers(Arc::new(Timers::new()))
    }

    /// Creates a machine whose timers are shared with the given handle.
    pub fn with_timers(timers: Arc<Timers>) -> Self {
        let mut chip8 = Chip8 {
            memory: [0; MEMORY_SIZE],
            display: DisplayBuffer::new(),
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: Vec::with_capacity(STACK_CAPACITY),
            timers,
            awaiting_key: None,
            keypad: [false; 16],
        };
        chip8.reset();
        chip8
    }

    /// Returns the machine to its power-on state.
    ///
    /// Memory is zeroed and the font set is reinstalled in the reserved region.
    pub fn reset(&mut self) {
        self.memory = [0; MEMORY_SIZE];
        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        self.display.clear();
        self.pc = ROM_START_ADDRESS as u16;
        self.i = 0;
        self.v = [0; 16];
        self.stack.clear();
        self.timers.set_delay(0);
        self.timers.set_sound(0);
        self.awaiting_key = None;
        self.keypad = [false; 16];
    }

    /// Loads a ROM into memory at the program start address.
    ///
    /// Memory is left untouched if the ROM does not fit.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        let rom_end = ROM_START_ADDRESS + rom.len();
        self.memory
            .get_mut(ROM_START_ADDRESS..rom_end)
            .ok_or(Chip8Error::Capacity {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            })?
            .copy_from_slice(rom);

        // Set program counter to start of ROM
        self.pc = ROM_START_ADDRESS as u16;
        info!(size = rom.len(), "loaded ROM");

        Ok(())
    }

    /// Executes a single CPU cycle (fetch, decode, execute).
    ///
    /// While a key-wait is pending no instruction is fetched.
    pub fn cpu_cycle(&mut self) -> Result<Chip8Result, Chip8Error> {
        if self.awaiting_key.is_some() {
            return Ok(Chip8Result::AwaitingKey);
        }

        let opcode = self.fetch()?;
        let decoded_opcode = Opcode::decode(opcode);
        self.execute(decoded_opcode)
    }

    /// Set the state of a key on the keypad.
    ///
    /// A key going down completes a pending key-wait.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;

        if pressed && let Some(x) = self.awaiting_key.take() {
            self.v[x] = key.get();
            debug!(key = %key, register = %x, "key-wait satisfied");
        }
    }

    pub fn is_key_pressed(&self, key: u4) -> bool {
        self.keypad[key]
    }

    pub fn is_awaiting_key(&self) -> bool {
        self.awaiting_key.is_some()
    }

    pub fn display(&self) -> &DisplayBuffer {
        &self.display
    }

    pub fn timers(&self) -> &Arc<Timers> {
        &self.timers
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) -> Result<(), Chip8Error> {
        self.pc = checked_address(pc)?;
        Ok(())
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn set_index(&mut self, i: u16) -> Result<(), Chip8Error> {
        self.i = checked_address(i)?;
        Ok(())
    }

    pub fn register(&self, x: u4) -> u8 {
        self.v[x]
    }

    pub fn set_register(&mut self, x: u4, value: u8) {
        self.v[x] = value;
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn delay_timer(&self) -> u8 {
        self.timers.delay()
    }

    pub fn set_delay_timer(&mut self, value: u8) {
        self.timers.set_delay(value);
    }

    pub fn sound_timer(&self) -> u8 {
        self.timers.sound()
    }

    pub fn set_sound_timer(&mut self, value: u8) {
        self.timers.set_sound(value);
    }

    pub fn read(&self, addr: u16) -> Result<u8, Chip8Error> {
        self.memory
            .get(addr as usize)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds {
                address: addr as usize,
            })
    }

    pub fn write(&mut self, addr: u16, value: u8) -> Result<(), Chip8Error> {
        *self.mem_get(addr)? = value;
        Ok(())
    }

    /// Pushes a return address.
    pub fn push(&mut self, addr: u16) -> Result<(), Chip8Error> {
        if self.stack.len() >= STACK_CAPACITY {
            return Err(Chip8Error::StackOverflow {
                depth: self.stack.len(),
            });
        }
        self.stack.push(addr);
        Ok(())
    }

    /// Pops the most recent return address.
    pub fn pop(&mut self) -> Result<u16, Chip8Error> {
        self.stack.pop().ok_or(Chip8Error::StackUnderflow)
    }

    /// Snapshot of the CPU registers for diagnostics.
    pub fn dump(&self) -> StateDump {
        StateDump {
            pc: self.pc,
            i: self.i,
            sp: self.stack.len(),
            top_of_stack: self.stack.last().copied(),
            v: self.v,
            delay_timer: self.timers.delay(),
            sound_timer: self.timers.sound(),
        }
    }

    /// Fetches the next 16-bit opcode from memory.
    fn fetch(&mut self) -> Result<u16, Chip8Error> {
        let high = *self.mem_get(self.pc)?;
        let low = *self.mem_get(self.pc.wrapping_add(1))?;

        Ok(u16::from_be_bytes([high, low]))
    }

    /// Helper to get a mutable reference to a memory location with bounds checking.
    pub(crate) fn mem_get(&mut self, addr: u16) -> Result<&mut u8, Chip8Error> {
        self.memory
            .get_mut(addr as usize)
            .ok_or(Chip8Error::MemoryOutOfBounds {
                address: addr as usize,
            })
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_address(addr: u16) -> Result<u16, Chip8Error> {
    if (addr as usize) < MEMORY_SIZE {
        Ok(addr)
    } else {
        Err(Chip8Error::InvalidAddress { address: addr })
    }
}
