use std::{
    path::PathBuf,
    sync::{Arc, Mutex, mpsc},
    thread,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    keyboard::{Key, KeyCode, NamedKey},
    window::{Window, WindowId},
};

use chip8_vm::{
    emu::{
        Beeper, Chip8, Chip8Runner, DISPLAY_X, DISPLAY_Y, Display, DisplayBuffer, Exit,
        InputEvent, Presenter, RunnerConfig, Silent, TIMER_TIME_STEP,
    },
    u4,
};

/// Mapping from physical keyboard keys to CHIP-8 hex keypad (0x0-0xF).
const KEY_MAP: [KeyCode; 16] = [
    KeyCode::KeyX,   // 0x00
    KeyCode::Digit1, // 0x01
    KeyCode::Digit2, // 0x02
    KeyCode::Digit3, // 0x03
    KeyCode::KeyQ,   // 0x04
    KeyCode::KeyW,   // 0x05
    KeyCode::KeyE,   // 0x06
    KeyCode::KeyA,   // 0x07
    KeyCode::KeyS,   // 0x08
    KeyCode::KeyD,   // 0x09
    KeyCode::KeyZ,   // 0x0A
    KeyCode::KeyC,   // 0x0B
    KeyCode::Digit4, // 0x0C
    KeyCode::KeyR,   // 0x0D
    KeyCode::KeyF,   // 0x0E
    KeyCode::KeyV,   // 0x0F
];

const BEEP_HZ: f32 = 440.0;

/// Messages from the VM thread to the window thread.
#[derive(Debug)]
enum VmEvent {
    FrameReady,
    Exited(Exit),
}

/// Publishes frames to the window thread.
struct SharedFrame {
    frame: Arc<Mutex<Display<bool>>>,
    proxy: EventLoopProxy<VmEvent>,
}

impl Presenter for SharedFrame {
    fn present(&mut self, display: &DisplayBuffer) {
        if publish_frame(&self.frame, display) {
            // The window may already be gone while we are shutting down
            let _ = self.proxy.send_event(VmEvent::FrameReady);
        }
    }
}

/// Copies the display into the shared frame, returning false if the lock is poisoned.
fn publish_frame(frame: &Mutex<Display<bool>>, display: &DisplayBuffer) -> bool {
    match frame.lock() {
        Ok(mut frame) => {
            *frame = *display.rows();
            true
        }
        Err(_) => {
            warn!("frame buffer lock poisoned, dropping frame");
            false
        }
    }
}

/// Plays one timer tick worth of square wave per beep.
struct SquareBeeper {
    sink: Sink,
    volume: f32,
}

impl Beeper for SquareBeeper {
    fn beep(&self) {
        self.sink.append(
            SquareWave::new(BEEP_HZ)
                .take_duration(Duration::from_secs_f32(TIMER_TIME_STEP))
                .amplify(self.volume),
        );
    }
}

struct App {
    pixels: Option<Pixels<'static>>,
    window: Option<Arc<Window>>,
    scale: u32,

    /// Last frame published by the VM thread.
    frame: Arc<Mutex<Display<bool>>>,
    keys: mpsc::Sender<InputEvent>,

    /// Audio output stream (must be kept alive).
    _audio_stream: Option<OutputStream>,

    /// How the VM stopped, once it has.
    exit: Option<Exit>,
    /// Stores the result of the application to be returned from main.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn process_display(&mut self) {
        let Some(pixels) = self.pixels.as_mut() else {
            return;
        };
        let Ok(frame) = self.frame.lock() else {
            warn!("frame buffer lock poisoned, skipping redraw");
            return;
        };

        for (i, pxl) in pixels.frame_mut().chunks_exact_mut(4).enumerate() {
            let x = i % DISPLAY_X;
            let y = i / DISPLAY_X;

            let rgba = if frame[y][x] {
                [0, 0xff, 0, 0xff]
            } else {
                [0, 0, 0, 0xff]
            };
            pxl.copy_from_slice(&rgba);
        }
    }

    fn send_key(&mut self, event: InputEvent, event_loop: &ActiveEventLoop) {
        if self.keys.send(event).is_err() {
            // VM thread is gone and never reported back
            event_loop.exit();
        }
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = {
            let size = LogicalSize::new(
                DISPLAY_X as u32 * self.scale,
                DISPLAY_Y as u32 * self.scale,
            );
            let min_size = LogicalSize::new(DISPLAY_X as u32, DISPLAY_Y as u32);

            Arc::new(
                event_loop
                    .create_window(
                        Window::default_attributes()
                            .with_title("chip8-vm")
                            .with_inner_size(size)
                            .with_min_inner_size(min_size),
                    )
                    .context("Failed to create window")?,
            )
        };

        self.window = Some(window.clone());
        self.pixels = {
            let window_size = window.inner_size();
            let surface_texture =
                SurfaceTexture::new(window_size.width, window_size.height, window.clone());

            let pixels = Pixels::new(DISPLAY_X as u32, DISPLAY_Y as u32, surface_texture)
                .context("Failed to create pixels surface")?;

            window.request_redraw();
            Some(pixels)
        };

        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                self.send_key(InputEvent::Quit, event_loop);
            }

            WindowEvent::Resized(size) => {
                if let Some(pixels) = self.pixels.as_mut() {
                    pixels
                        .resize_surface(size.width, size.height)
                        .context("Failed to resize pixels surface")?;
                }
            }

            WindowEvent::RedrawRequested => {
                self.process_display();

                if let Some(pixels) = self.pixels.as_ref() {
                    pixels.render().context("Pixels render error")?;
                }
            }

            WindowEvent::KeyboardInput { event, .. } if !event.repeat => {
                if let Some(key) = KEY_MAP.iter().position(|&k| k == event.physical_key) {
                    let key = u4::new(key as u8);
                    let input = match event.state {
                        ElementState::Pressed => InputEvent::KeyDown(key),
                        ElementState::Released => InputEvent::KeyUp(key),
                    };
                    self.send_key(input, event_loop);
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler<VmEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.try_resumed(event_loop) {
            self.exit_result = Err(e);
            self.send_key(InputEvent::Quit, event_loop);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.exit_result = Err(e);
            self.send_key(InputEvent::Quit, event_loop);
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: VmEvent) {
        match event {
            VmEvent::FrameReady => {
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            VmEvent::Exited(exit) => {
                self.exit = Some(exit);
                event_loop.exit();
            }
        }
    }
}

/// CHIP-8 virtual machine.
///
/// Keys 1-4, Q-R, A-F, Z-V map to CHIP-8 keys.
/// Escape is used to exit the emulator.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the CHIP-8 ROM file
    rom_path: PathBuf,

    /// Pause after every instruction, in microseconds
    #[arg(long, default_value_t = 1000)]
    instruction_delay_us: u64,

    /// Window scale factor
    #[arg(long, default_value_t = 16)]
    scale: u32,

    /// Beep amplitude (0.0 - 1.0)
    #[arg(long, default_value_t = 0.25)]
    volume: f32,

    /// Disable audio output
    #[arg(long)]
    mute: bool,
}

/// Opens the default audio device, falling back to silence if there is none.
fn open_audio(args: &Args) -> (Option<OutputStream>, Arc<dyn Beeper>) {
    if args.mute {
        return (None, Arc::new(Silent));
    }

    match OutputStreamBuilder::open_default_stream() {
        Ok(mut stream) => {
            stream.log_on_drop(false);
            let sink = Sink::connect_new(stream.mixer());
            let beeper = SquareBeeper {
                sink,
                volume: args.volume.clamp(0.0, 1.0),
            };
            (Some(stream), Arc::new(beeper))
        }
        Err(e) => {
            warn!(error = %e, "no audio output, continuing muted");
            (None, Arc::new(Silent))
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;

    let mut chip8 = Chip8::default();
    chip8
        .load(&rom)
        .context("Failed to load ROM into CHIP-8 memory")?;

    let config = RunnerConfig {
        instruction_delay: Duration::from_micros(args.instruction_delay_us),
        ..RunnerConfig::default()
    };
    let mut runner = Chip8Runner::new(chip8, config);

    let (audio_stream, beeper) = open_audio(&args);
    runner
        .start_timers(beeper)
        .context("Failed to start timer thread")?;

    let event_loop = EventLoop::<VmEvent>::with_user_event()
        .build()
        .context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let frame = Arc::new(Mutex::new([[false; DISPLAY_X]; DISPLAY_Y]));
    let (keys, mut key_events) = mpsc::channel::<InputEvent>();

    let mut presenter = SharedFrame {
        frame: frame.clone(),
        proxy: event_loop.create_proxy(),
    };
    let exit_proxy = event_loop.create_proxy();

    info!(rom = %args.rom_path.display(), "starting");
    let vm = thread::Builder::new()
        .name("chip8-vm".into())
        .spawn(move || {
            let exit = runner.run(&mut key_events, &mut presenter);
            if exit_proxy.send_event(VmEvent::Exited(exit)).is_err() {
                error!("window closed before the machine stopped");
            }
        })
        .context("Failed to start VM thread")?;

    let mut app = App {
        pixels: None,
        window: None,
        scale: args.scale.max(1),
        frame,
        keys,
        _audio_stream: audio_stream,
        exit: None,
        exit_result: Ok(()),
    };
    event_loop
        .run_app(&mut app)
        .context("Error occurred during event loop execution")?;

    // Unblock the VM if the window went away on its own
    let _ = app.keys.send(InputEvent::Quit);
    if vm.join().is_err() {
        error!("VM thread panicked");
    }

    app.exit_result?;

    match app.exit {
        Some(exit) => {
            if let Exit::Fault { error, .. } = &exit {
                error!(%error, "program faulted");
            }
            eprint!("{}", exit.dump());
            std::process::exit(exit.code());
        }
        None => Ok(()),
    }
}
