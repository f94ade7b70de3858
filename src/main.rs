//! cellatlas demo
//!
//! The winit event loop is the producer: it forwards resize, focus and
//! keyboard input through an `EngineHandle`. A presenter thread owns the
//! engine and presents frames back to back, throttled by the swap chain.

mod cli;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cellatlas::config::DEFAULT_DPI;
use cellatlas::{
    Engine, EngineHandle, FontRasterizer, Settings, Size, TextRun, TextStyle, WgpuBackend,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const TICK: Duration = Duration::from_secs(1);

const BANNER: &[&str] = &[
    "cellatlas - glyph atlas renderer",
    "",
    "ASCII   The quick brown fox jumps over the lazy dog 0123456789",
    "Wide    漢字かなカナ 한글",
    "Emoji   😀 🚀 ❤\u{FE0F} ☕",
    "Lines   ─│┌┐└┘├┤┬┴┼ ░▒▓█",
    "",
    "Type to write on the last row.",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cli = cli::Cli::parse()?;
    if cli.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + TICK));

    let mut app = DemoApp {
        cli,
        window: None,
        handle: None,
        fonts: None,
        presenter: None,
        focused: true,
        ticks: 0,
        input: String::new(),
    };
    event_loop.run_app(&mut app)?;
    Ok(())
}

struct DemoApp {
    cli: cli::Cli,
    window: Option<Arc<Window>>,
    handle: Option<EngineHandle>,
    /// Shares the faces of the presenter's rasterizer; used for cell metrics
    fonts: Option<FontRasterizer>,
    presenter: Option<JoinHandle<()>>,
    focused: bool,
    ticks: u64,
    input: String,
}

impl DemoApp {
    fn settings_for(
        &self,
        rasterizer: &FontRasterizer,
        scale_factor: f64,
    ) -> cellatlas::Result<Settings> {
        let mut settings = Settings::default();
        self.cli.apply_to_settings(&mut settings);
        settings.dpi = (scale_factor * DEFAULT_DPI as f64).round().max(1.0) as u32;
        settings.cell_size = rasterizer.cell_size(settings.font_size, settings.dpi)?;
        settings.underline_position = settings.cell_size.height.saturating_sub(2);
        settings.strikethrough_position = settings.cell_size.height / 2;
        settings.line_thickness = (settings.dpi / DEFAULT_DPI).max(1);
        Ok(settings)
    }

    fn start(&mut self, window: Arc<Window>) -> cellatlas::Result<()> {
        let rasterizer = FontRasterizer::from_system(self.cli.font.as_deref())?;
        let settings = self.settings_for(&rasterizer, window.scale_factor())?;
        log::info!(
            "cell {}x{} px at {} dpi",
            settings.cell_size.width,
            settings.cell_size.height,
            settings.dpi
        );

        let backend = WgpuBackend::new(Arc::clone(&window))?;
        self.fonts = Some(rasterizer.clone());
        let (engine, handle) = Engine::new(backend, Box::new(rasterizer), settings)?;

        let size = window.inner_size();
        handle.resize(Size::new(size.width, size.height))?;
        for (row, line) in BANNER.iter().enumerate() {
            handle.paint_row(row as u32, vec![TextRun::new(0, *line, TextStyle::default())])?;
        }
        handle.move_cursor(Some((0, BANNER.len() as u32)))?;

        self.presenter = Some(thread::spawn(move || run_presenter(engine)));
        self.handle = Some(handle);
        self.window = Some(window);
        Ok(())
    }

    fn rescale(&self, scale_factor: f64) -> cellatlas::Result<()> {
        let (Some(handle), Some(fonts)) = (&self.handle, &self.fonts) else {
            return Ok(());
        };
        // Cell metrics depend on the DPI.
        let settings = self.settings_for(fonts, scale_factor)?;
        handle.update_settings(settings)
    }

    fn input_row(&self) -> u32 {
        BANNER.len() as u32
    }

    fn repaint_input(&self) -> cellatlas::Result<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        let style = TextStyle {
            underline: true,
            ..TextStyle::default()
        };
        let line = format!("{:<80}", self.input);
        handle.paint_row(self.input_row(), vec![TextRun::new(0, line, style)])?;
        let column = unicode_width::UnicodeWidthStr::width(self.input.as_str()) as u32;
        handle.move_cursor(self.focused.then_some((column, self.input_row())))
    }

    fn tick(&mut self) -> cellatlas::Result<()> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        self.ticks += 1;
        let style = TextStyle {
            bold: true,
            foreground: 0xFF7F_D7FF,
            ..TextStyle::default()
        };
        let status = format!("uptime {}s", self.ticks);
        handle.paint_row(self.input_row() + 2, vec![TextRun::new(0, status, style)])
    }

    fn shutdown(&mut self) {
        // Dropping the last handle ends the presenter loop.
        self.handle = None;
        if let Some(presenter) = self.presenter.take() {
            if presenter.join().is_err() {
                log::error!("presenter thread panicked");
            }
        }
        self.window = None;
    }
}

fn run_presenter(mut engine: Engine<WgpuBackend>) {
    while engine.handles_connected() {
        match engine.present() {
            Ok(()) => {}
            Err(e) if e.is_surface_lost() => {
                log::warn!("surface lost, reconfiguring");
                let viewport = engine.viewport();
                if let Err(e) = engine.resize(viewport) {
                    log::error!("surface reconfigure failed: {e}");
                    break;
                }
            }
            // Already logged by the engine; try again on the next frame.
            Err(_) => thread::sleep(Duration::from_millis(16)),
        }
    }
    log::info!("presenter stopped: {:?}", engine.stats());
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title("cellatlas")
            .with_inner_size(winit::dpi::LogicalSize::new(960, 540));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };
        if let Err(e) = self.start(window) {
            log::error!("failed to start renderer: {e}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let result = match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
                Ok(())
            }
            WindowEvent::Resized(size) => match &self.handle {
                Some(handle) => handle.resize(Size::new(size.width, size.height)),
                None => Ok(()),
            },
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.rescale(scale_factor)
            }
            WindowEvent::Focused(focused) => {
                self.focused = focused;
                self.repaint_input()
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                use winit::keyboard::{Key, NamedKey};
                match &event.logical_key {
                    Key::Named(NamedKey::Backspace) => {
                        self.input.pop();
                    }
                    Key::Named(NamedKey::Escape) => self.input.clear(),
                    _ => {
                        if let Some(text) = &event.text {
                            self.input.extend(text.chars().filter(|c| !c.is_control()));
                        }
                    }
                }
                self.repaint_input()
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            log::error!("event handling failed: {e}");
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let ControlFlow::WaitUntil(deadline) = event_loop.control_flow() {
            if Instant::now() >= deadline {
                if let Err(e) = self.tick() {
                    log::error!("status repaint failed: {e}");
                }
                event_loop.set_control_flow(ControlFlow::WaitUntil(Instant::now() + TICK));
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
