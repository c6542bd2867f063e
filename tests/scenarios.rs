use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chip8_vm::emu::{
    Beeper, Chip8, Chip8Error, Chip8Result, Chip8Runner, DisplayBuffer, Exit, InputEvent,
    MAX_ROM_SIZE, Presenter, RunnerConfig, STACK_CAPACITY, Timers,
};
use chip8_vm::u4;

#[derive(Default)]
struct CountingBeeper(AtomicUsize);

impl Beeper for CountingBeeper {
    fn beep(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct LastFrame(Option<DisplayBuffer>);

impl Presenter for LastFrame {
    fn present(&mut self, display: &DisplayBuffer) {
        self.0 = Some(display.clone());
    }
}

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        instruction_delay: Duration::ZERO,
        key_poll_interval: Duration::from_millis(1),
    }
}

#[test]
fn set_register_then_step() {
    let mut chip8 = Chip8::new();
    chip8.reset();
    chip8.load(&[0x60, 0x05]).unwrap();

    assert_eq!(chip8.cpu_cycle(), Ok(Chip8Result::Continue));

    assert_eq!(chip8.register(u4::new(0)), 5);
    assert_eq!(chip8.pc(), 0x202);
}

#[test]
fn add_wraps_and_sets_carry() {
    let mut chip8 = Chip8::new();
    chip8.load(&[0x80, 0x14]).unwrap();
    chip8.set_register(u4::new(0), 5);
    chip8.set_register(u4::new(1), 251);

    chip8.cpu_cycle().unwrap();

    assert_eq!(chip8.register(u4::new(0)), 0);
    assert_eq!(chip8.register(u4::new(0xF)), 1);
}

#[test]
fn oversized_program_is_rejected_untouched() {
    let mut chip8 = Chip8::new();
    chip8.load(&[0xAA; 16]).unwrap();

    let err = chip8.load(&vec![0x55; MAX_ROM_SIZE + 1]).unwrap_err();

    assert!(matches!(err, Chip8Error::Capacity { .. }));
    assert_eq!(chip8.read(0x200).unwrap(), 0xAA);
    assert_eq!(chip8.read(0x210).unwrap(), 0x00);
}

#[test]
fn call_at_max_depth_halts_with_diagnostics() {
    // 2200: call self forever
    let mut chip8 = Chip8::new();
    chip8.load(&[0x22, 0x00]).unwrap();
    let mut runner = Chip8Runner::new(chip8, fast_config());

    let exit = runner.run(&mut VecDeque::<InputEvent>::new(), &mut LastFrame::default());

    match &exit {
        Exit::Fault { error, dump } => {
            assert_eq!(
                *error,
                Chip8Error::StackOverflow {
                    depth: STACK_CAPACITY
                }
            );
            assert_eq!(dump.sp, STACK_CAPACITY);
            assert_eq!(dump.top_of_stack, Some(0x202));
        }
        other => panic!("expected a fault, got {other:?}"),
    }
    assert_eq!(exit.code(), 1);
    assert!(exit.dump().to_string().contains("SP: 1024"));
}

#[test]
fn sound_timer_beeps_once_per_tick() {
    let timers = Timers::new();
    let beeper = CountingBeeper::default();
    timers.set_sound(2);
    timers.set_delay(0);

    timers.tick(&beeper);
    timers.tick(&beeper);

    assert_eq!(timers.sound(), 0);
    assert_eq!(timers.delay(), 0);
    assert_eq!(beeper.0.load(Ordering::SeqCst), 2);
}

#[test]
fn ticker_runs_while_program_waits_for_key() {
    // 6A05 FA15 (delay = 5), F10A (wait), FFFF
    let mut chip8 = Chip8::new();
    chip8
        .load(&[0x6A, 0x05, 0xFA, 0x15, 0xF1, 0x0A, 0xFF, 0xFF])
        .unwrap();
    let timers = chip8.timers().clone();
    let mut runner = Chip8Runner::new(chip8, fast_config());
    runner
        .start_timers(Arc::new(CountingBeeper::default()))
        .unwrap();

    let (tx, mut rx) = std::sync::mpsc::channel::<InputEvent>();
    let watcher = std::thread::spawn(move || {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while timers.delay() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        tx.send(InputEvent::KeyDown(u4::new(9))).unwrap();
        timers.delay()
    });

    let exit = runner.run(&mut rx, &mut LastFrame::default());
    let delay_when_key_sent = watcher.join().unwrap();

    assert_eq!(delay_when_key_sent, 0);
    assert_eq!(exit.dump().v[1], 9);
    assert!(matches!(
        exit,
        Exit::Fault {
            error: Chip8Error::UnknownOpcode { opcode: 0xFFFF },
            ..
        }
    ));
}

#[test]
fn drawn_sprite_reaches_presenter() {
    // 6105 F129 (I = glyph 5), 6200 D225 (draw at 0,0), 1208 (spin)
    let mut chip8 = Chip8::new();
    chip8
        .load(&[0x61, 0x05, 0xF1, 0x29, 0x62, 0x00, 0xD2, 0x25, 0x12, 0x08])
        .unwrap();
    let mut runner = Chip8Runner::new(chip8, fast_config());
    let mut frame = LastFrame::default();
    let mut input = VecDeque::<InputEvent>::new();

    for _ in 0..4 {
        assert!(runner.step(&mut input, &mut frame).is_none());
    }
    input.push_back(InputEvent::Quit);
    let exit = runner.step(&mut input, &mut frame);

    assert!(matches!(exit, Some(Exit::Quit { .. })));
    let frame = frame.0.expect("a frame was presented");
    // Glyph 5: F0 80 F0 10 F0
    assert_eq!(frame.lit_count(), 4 + 1 + 4 + 1 + 4);
    assert!(frame.pixel(1, 0));
    assert!(frame.pixel(3, 3));
    assert_eq!(runner.chip8_ref().register(u4::new(0xF)), 0);
}
