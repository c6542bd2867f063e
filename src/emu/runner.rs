use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{error, info};

use super::{Beeper, Chip8, Chip8Error, Chip8Result, DisplayBuffer, StateDump, TimerTicker};
use crate::u4;

/// Events produced by the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    KeyDown(u4),
    KeyUp(u4),
    Quit,
}

/// Source of keypad and quit events.
pub trait Input {
    /// Returns the next pending event without blocking.
    fn poll(&mut self) -> Option<InputEvent>;

    /// Blocks for at most `timeout` waiting for an event.
    fn wait(&mut self, timeout: Duration) -> Option<InputEvent> {
        let event = self.poll();
        if event.is_none() {
            thread::sleep(timeout);
        }
        event
    }
}

impl Input for Receiver<InputEvent> {
    fn poll(&mut self) -> Option<InputEvent> {
        match self.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(InputEvent::Quit),
        }
    }

    fn wait(&mut self, timeout: Duration) -> Option<InputEvent> {
        match self.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(InputEvent::Quit),
        }
    }
}

/// Replays a fixed list of events, then reports nothing.
impl Input for VecDeque<InputEvent> {
    fn poll(&mut self) -> Option<InputEvent> {
        self.pop_front()
    }
}

/// Receives the display buffer whenever it changes.
pub trait Presenter {
    fn present(&mut self, display: &DisplayBuffer);
}

/// Timing knobs for the run loop.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    /// Sleep inserted after every instruction
    pub instruction_delay: Duration,
    /// How long a key-wait blocks on the input device per poll
    pub key_poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            instruction_delay: Duration::from_millis(1),
            key_poll_interval: Duration::from_millis(1),
        }
    }
}

/// Why the run loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The input device asked to quit.
    Quit { dump: StateDump },
    /// The program faulted and the machine halted.
    Fault { error: Chip8Error, dump: StateDump },
}

impl Exit {
    pub fn dump(&self) -> &StateDump {
        match self {
            Exit::Quit { dump } | Exit::Fault { dump, .. } => dump,
        }
    }

    /// Process exit status: 0 for a clean quit, 1 for a fault.
    pub fn code(&self) -> i32 {
        match self {
            Exit::Quit { .. } => 0,
            Exit::Fault { .. } => 1,
        }
    }
}

/// High-level emulator runner that owns the machine and its timer thread.
pub struct Chip8Runner {
    chip8: Chip8,
    ticker: Option<TimerTicker>,
    config: RunnerConfig,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8, config: RunnerConfig) -> Self {
        Self {
            chip8,
            ticker: None,
            config,
        }
    }

    /// Starts the 60Hz timer thread for this machine.
    pub fn start_timers(&mut self, beeper: Arc<dyn Beeper>) -> std::io::Result<()> {
        if self.ticker.is_none() {
            self.ticker = Some(TimerTicker::spawn(self.chip8.timers().clone(), beeper)?);
        }
        Ok(())
    }

    /// Runs instructions until the input device quits or the program faults.
    ///
    /// This is the single place where machine faults turn into an exit.
    pub fn run(&mut self, input: &mut dyn Input, presenter: &mut dyn Presenter) -> Exit {
        info!(pc = self.chip8.pc(), "starting chip-8 machine");

        loop {
            if let Some(exit) = self.step(input, presenter) {
                return exit;
            }
            if !self.config.instruction_delay.is_zero() {
                thread::sleep(self.config.instruction_delay);
            }
        }
    }

    /// Drains pending input, then executes one instruction.
    ///
    /// Blocks inside a key-wait until a key goes down or a quit arrives.
    pub fn step(&mut self, input: &mut dyn Input, presenter: &mut dyn Presenter) -> Option<Exit> {
        while let Some(event) = input.poll() {
            if self.handle_event(event) {
                return Some(self.quit());
            }
        }

        match self.chip8.cpu_cycle() {
            Ok(Chip8Result::Continue) => None,
            Ok(Chip8Result::Redraw) => {
                presenter.present(self.chip8.display());
                None
            }
            Ok(Chip8Result::AwaitingKey) => self.wait_for_key(input),
            Err(error) => Some(self.fault(error)),
        }
    }

    fn wait_for_key(&mut self, input: &mut dyn Input) -> Option<Exit> {
        while self.chip8.is_awaiting_key() {
            if let Some(event) = input.wait(self.config.key_poll_interval)
                && self.handle_event(event)
            {
                return Some(self.quit());
            }
        }
        None
    }

    /// Applies an input event, returning true on quit.
    fn handle_event(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::KeyDown(key) => self.chip8.set_key(key, true),
            InputEvent::KeyUp(key) => self.chip8.set_key(key, false),
            InputEvent::Quit => return true,
        }
        false
    }

    fn quit(&mut self) -> Exit {
        info!("quit requested, stopping chip-8 machine");
        Exit::Quit {
            dump: self.chip8.dump(),
        }
    }

    fn fault(&mut self, error: Chip8Error) -> Exit {
        error!(%error, "chip-8 machine halted");
        Exit::Fault {
            error,
            dump: self.chip8.dump(),
        }
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Frames(usize);

    impl Presenter for Frames {
        fn present(&mut self, _display: &DisplayBuffer) {
            self.0 += 1;
        }
    }

    fn runner(rom: &[u8]) -> Chip8Runner {
        let mut chip8 = Chip8::new();
        chip8.load(rom).unwrap();
        Chip8Runner::new(
            chip8,
            RunnerConfig {
                instruction_delay: Duration::ZERO,
                key_poll_interval: Duration::ZERO,
            },
        )
    }

    #[test]
    fn quit_event_stops_with_zero_status() {
        // 1200: jump to self forever
        let mut runner = runner(&[0x12, 0x00]);
        let mut input = VecDeque::from([InputEvent::Quit]);

        let exit = runner.run(&mut input, &mut Frames::default());

        assert_eq!(exit.code(), 0);
        assert_eq!(exit.dump().pc, 0x200);
    }

    #[test]
    fn fault_halts_with_dump() {
        // 6007 then an unknown opcode
        let mut runner = runner(&[0x60, 0x07, 0xFF, 0xFF]);
        let exit = runner.run(&mut VecDeque::<InputEvent>::new(), &mut Frames::default());

        assert_eq!(
            exit,
            Exit::Fault {
                error: Chip8Error::UnknownOpcode { opcode: 0xFFFF },
                dump: runner.chip8_ref().dump(),
            }
        );
        assert_eq!(exit.code(), 1);
        assert_eq!(exit.dump().v[0], 7);
    }

    #[test]
    fn draw_and_clear_are_presented() {
        // A000 (font glyph 0), D005, 00E0, FFFF
        let mut runner = runner(&[0xA0, 0x00, 0xD0, 0x05, 0x00, 0xE0, 0xFF, 0xFF]);
        let mut frames = Frames::default();

        runner.run(&mut VecDeque::<InputEvent>::new(), &mut frames);

        assert_eq!(frames.0, 2);
    }

    /// Delivers events only to a blocking wait, never to the non-blocking drain.
    struct DuringWait(VecDeque<InputEvent>);

    impl Input for DuringWait {
        fn poll(&mut self) -> Option<InputEvent> {
            None
        }

        fn wait(&mut self, _timeout: Duration) -> Option<InputEvent> {
            self.0.pop_front()
        }
    }

    #[test]
    fn key_wait_blocks_until_key_down() {
        // F30A, FFFF
        let mut runner = runner(&[0xF3, 0x0A, 0xFF, 0xFF]);
        let mut input = DuringWait(VecDeque::from([
            InputEvent::KeyUp(u4::new(1)),
            InputEvent::KeyDown(u4::new(0xC)),
        ]));
        let mut frames = Frames::default();

        assert!(runner.step(&mut input, &mut frames).is_none());
        assert!(!runner.chip8_ref().is_awaiting_key());
        assert!(input.0.is_empty());
        assert_eq!(runner.chip8_ref().register(u4::new(3)), 0xC);
        assert_eq!(runner.chip8_ref().pc(), 0x202);

        let exit = runner.step(&mut input, &mut frames);
        assert!(matches!(exit, Some(Exit::Fault { .. })));
    }

    #[test]
    fn quit_is_observed_during_key_wait() {
        let mut runner = runner(&[0xF0, 0x0A]);
        let (tx, mut rx) = std::sync::mpsc::channel::<InputEvent>();
        tx.send(InputEvent::KeyUp(u4::new(2))).unwrap();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            tx.send(InputEvent::Quit).unwrap();
        });

        let exit = runner.run(&mut rx, &mut Frames::default());
        handle.join().unwrap();

        assert_eq!(exit.code(), 0);
        assert!(runner.chip8_ref().is_awaiting_key());
    }

    #[test]
    fn dropped_input_channel_counts_as_quit() {
        let mut runner = runner(&[0x12, 0x00]);
        let (tx, mut rx) = std::sync::mpsc::channel::<InputEvent>();
        drop(tx);

        let exit = runner.run(&mut rx, &mut Frames::default());
        assert!(matches!(exit, Exit::Quit { .. }));
    }
}
