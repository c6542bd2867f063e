use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::TIMER_TIME_STEP;

/// Receives one notification per tick while the sound timer is running.
pub trait Beeper: Send + Sync {
    fn beep(&self);
}

/// A beeper that discards every tick.
pub struct Silent;

impl Beeper for Silent {
    fn beep(&self) {}
}

/// The delay and sound timers.
///
/// These are the only fields shared between the instruction loop and the
/// ticker thread, so each one is an atomic cell of its own.
#[derive(Debug, Default)]
pub struct Timers {
    delay: AtomicU8,
    sound: AtomicU8,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(&self) -> u8 {
        self.delay.load(Ordering::Acquire)
    }

    pub fn set_delay(&self, value: u8) {
        self.delay.store(value, Ordering::Release);
    }

    pub fn sound(&self) -> u8 {
        self.sound.load(Ordering::Acquire)
    }

    pub fn set_sound(&self, value: u8) {
        self.sound.store(value, Ordering::Release);
    }

    /// One 60Hz tick: decrement each non-zero timer.
    ///
    /// Beeps once if the sound timer was decremented.
    pub fn tick(&self, beeper: &dyn Beeper) {
        if decrement_if_positive(&self.sound) {
            beeper.beep();
        }
        decrement_if_positive(&self.delay);
    }
}

/// Atomically decrements `cell` unless it is already zero.
fn decrement_if_positive(cell: &AtomicU8) -> bool {
    cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1))
        .is_ok()
}

/// Background thread that ticks the timers at a fixed rate.
///
/// Dropping the ticker stops the thread.
pub struct TimerTicker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimerTicker {
    pub fn spawn(timers: Arc<Timers>, beeper: Arc<dyn Beeper>) -> std::io::Result<Self> {
        Self::spawn_with_period(timers, beeper, Duration::from_secs_f32(TIMER_TIME_STEP))
    }

    pub fn spawn_with_period(
        timers: Arc<Timers>,
        beeper: Arc<dyn Beeper>,
        period: Duration,
    ) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("chip8-timers".into())
            .spawn(move || {
                debug!(?period, "timer ticker started");
                let mut next = Instant::now() + period;

                while flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                    timers.tick(beeper.as_ref());

                    // Skip ticks we were too late for instead of bursting to catch up
                    next += period;
                    let now = Instant::now();
                    if next < now {
                        next = now + period;
                    }
                }

                debug!("timer ticker stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("timer ticker thread panicked");
        }
    }
}

impl Drop for TimerTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
