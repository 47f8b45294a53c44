//! quasimode-osx -- demo launcher shell.
//!
//! Shows a translucent overlay in the middle of the main screen while the
//! quasimode key is held and logs every key typed into it.

use std::process::ExitCode;

use quasimode_osx::graphics::{Color, SurfaceHandle, TransparentWindow};
use quasimode_osx::input::event_loop::LoopProxy;
use quasimode_osx::input::keycodes::{self, KEYCODE_BACK};
use quasimode_osx::input::{InputHandler, KeyEvent, QuasimodeTransition};
use quasimode_osx::{Config, Platform, PlatformError};

const OVERLAY_WIDTH: u32 = 640;
const OVERLAY_HEIGHT: u32 = 96;
const PADDING: u32 = 16;
const GLYPH_WIDTH: u32 = 14;
const GLYPH_GAP: u32 = 4;

const BACKGROUND: Color = Color::rgba(0x20, 0x20, 0x20, 0xc0);
const GLYPH: Color = Color::rgba(0xe8, 0xe8, 0xe8, 0xff);

fn main() -> ExitCode {
    let config = match Config::discover() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log.level);
    log::info!("quasimode-osx v{}", env!("CARGO_PKG_VERSION"));

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// RUST_LOG overrides the configured level.
fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run(config: &Config) -> Result<(), PlatformError> {
    let platform = Platform::load(config)?;
    let graphics = platform.graphics();
    let mut manager = platform.input().input_manager()?;

    let (desktop_width, desktop_height) = graphics.desktop_size();
    let x = (desktop_width.saturating_sub(OVERLAY_WIDTH) / 2) as i32;
    let y = (desktop_height.saturating_sub(OVERLAY_HEIGHT) / 2) as i32;
    let mut overlay = graphics.transparent_window(x, y, OVERLAY_WIDTH, OVERLAY_HEIGHT)?;
    let surface = overlay.create_surface()?;
    overlay.set_opacity(0);

    let mut shell = Shell {
        overlay,
        surface,
        proxy: manager.proxy(),
        typed: String::new(),
        active: false,
    };
    manager.run(&mut shell)
}

struct Shell {
    overlay: TransparentWindow,
    surface: SurfaceHandle,
    proxy: LoopProxy,
    typed: String,
    active: bool,
}

impl Shell {
    fn redraw(&mut self) {
        {
            let mut surface = self.surface.borrow_mut();
            surface.fill(BACKGROUND);
            let glyph_height = OVERLAY_HEIGHT - 2 * PADDING;
            let mut left = PADDING;
            for _ in self.typed.chars() {
                if left + GLYPH_WIDTH > OVERLAY_WIDTH - PADDING {
                    break;
                }
                surface.fill_rect(left, PADDING, GLYPH_WIDTH, glyph_height, GLYPH);
                left += GLYPH_WIDTH + GLYPH_GAP;
            }
        }
        self.overlay.update();
    }

    fn show(&mut self) {
        self.active = true;
        self.typed.clear();
        self.overlay.set_opacity(0xff);
        self.redraw();
    }

    fn hide(&mut self) {
        self.active = false;
        self.overlay.set_opacity(0);
        self.overlay.update();
    }
}

impl InputHandler for Shell {
    fn on_init(&mut self) {
        log::info!("shell: ready, hold the quasimode key to type a command");
    }

    fn on_keypress(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::Quasimode(QuasimodeTransition::Start) => self.show(),
            KeyEvent::Quasimode(QuasimodeTransition::End) => {
                log::info!("shell: command {:?}", self.typed);
                self.hide();
            }
            KeyEvent::Quasimode(QuasimodeTransition::Cancel) => {
                log::info!("shell: cancelled");
                self.hide();
            }
            KeyEvent::Down(code) if self.active => {
                if code == KEYCODE_BACK {
                    self.typed.pop();
                } else if let Some(symbol) = keycodes::symbol_for(code) {
                    log::info!("shell: key {symbol:?}");
                    self.typed.push(symbol);
                } else {
                    log::debug!("shell: key code {code} has no symbol");
                }
                self.redraw();
            }
            KeyEvent::Down(_) | KeyEvent::Up(_) => {}
        }
    }

    fn on_exit_requested(&mut self) {
        log::info!("shell: exit requested");
        self.proxy.stop();
    }
}
