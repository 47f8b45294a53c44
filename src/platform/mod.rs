//! Capability resolver.
//!
//! The launcher asks for providers by name: `"input"`, `"graphics"` and
//! `"selection"`. `Platform::load` refuses to run anywhere but macOS;
//! `Platform::headless` builds the same capabilities over in-process
//! backends and is only ever chosen explicitly.

#[cfg(target_os = "macos")]
mod macos;

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use crate::config::Config;
use crate::error::PlatformError;
use crate::graphics::headless::HeadlessServer;
use crate::graphics::{GraphicsInterface, WindowServer};
use crate::input::event_loop::channel_loop;
use crate::input::InputInterface;
use crate::selection::SelectionInterface;

/// Desktop size reported by the headless window server.
pub const HEADLESS_DESKTOP: (u32, u32) = (1920, 1080);

// ---------------------------------------------------------------------------
// Host classification
// ---------------------------------------------------------------------------

/// Accepts the host only when it is macOS.
///
/// Takes the OS name rather than reading it so it can be tested anywhere.
fn check_host(os: &str) -> Result<(), PlatformError> {
    match os {
        "macos" => Ok(()),
        other => Err(PlatformError::Unsupported {
            os: other.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Input,
    Graphics,
    Selection,
}

impl Capability {
    pub const ALL: [Capability; 3] = [Self::Input, Self::Graphics, Self::Selection];

    /// Looks up a capability by the name the launcher requests it with.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "input" => Some(Self::Input),
            "graphics" => Some(Self::Graphics),
            "selection" => Some(Self::Selection),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Graphics => "graphics",
            Self::Selection => "selection",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved capability provider.
#[derive(Clone)]
pub enum Interface {
    Input(InputInterface),
    Graphics(GraphicsInterface),
    Selection(SelectionInterface),
}

impl Interface {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Input(_) => Capability::Input,
            Self::Graphics(_) => Capability::Graphics,
            Self::Selection(_) => Capability::Selection,
        }
    }

    pub fn into_input(self) -> Option<InputInterface> {
        match self {
            Self::Input(input) => Some(input),
            _ => None,
        }
    }

    pub fn into_graphics(self) -> Option<GraphicsInterface> {
        match self {
            Self::Graphics(graphics) => Some(graphics),
            _ => None,
        }
    }

    pub fn into_selection(self) -> Option<SelectionInterface> {
        match self {
            Self::Selection(selection) => Some(selection),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

enum Backend {
    #[cfg(target_os = "macos")]
    AppKit,
    Headless(Rc<HeadlessServer>),
}

/// Entry point handing out capability providers.
pub struct Platform {
    config: Config,
    backend: Backend,
    window_server: OnceCell<Rc<dyn WindowServer>>,
}

impl Platform {
    /// Loads the native platform, failing with `Unsupported` off macOS.
    pub fn load(config: &Config) -> Result<Self, PlatformError> {
        check_host(std::env::consts::OS)?;
        Self::native(config)
    }

    #[cfg(target_os = "macos")]
    fn native(config: &Config) -> Result<Self, PlatformError> {
        log::info!("platform: loaded AppKit backend");
        Ok(Self::with_backend(config, Backend::AppKit))
    }

    #[cfg(not(target_os = "macos"))]
    fn native(_config: &Config) -> Result<Self, PlatformError> {
        Err(PlatformError::Unsupported {
            os: std::env::consts::OS.to_string(),
        })
    }

    /// In-process backends: a recording window server and a channel loop.
    /// The helper is still launched for real by `InputManager::run`.
    pub fn headless(config: &Config) -> Self {
        let (width, height) = HEADLESS_DESKTOP;
        log::info!("platform: loaded headless backend ({width}x{height})");
        Self::with_backend(
            config,
            Backend::Headless(Rc::new(HeadlessServer::new(width, height))),
        )
    }

    fn with_backend(config: &Config, backend: Backend) -> Self {
        Self {
            config: config.clone(),
            backend,
            window_server: OnceCell::new(),
        }
    }

    /// Resolves a provider by name. Unknown names yield `None`.
    pub fn provide(&self, name: &str) -> Option<Interface> {
        let Some(capability) = Capability::from_name(name) else {
            log::debug!("platform: no provider for {name:?}");
            return None;
        };
        Some(self.provide_capability(capability))
    }

    pub fn provide_capability(&self, capability: Capability) -> Interface {
        match capability {
            Capability::Input => Interface::Input(self.input()),
            Capability::Graphics => Interface::Graphics(self.graphics()),
            Capability::Selection => Interface::Selection(self.selection()),
        }
    }

    /// The headless window server, for inspecting what overlays did.
    pub fn headless_server(&self) -> Option<Rc<HeadlessServer>> {
        match &self.backend {
            Backend::Headless(server) => Some(server.clone()),
            #[cfg(target_os = "macos")]
            Backend::AppKit => None,
        }
    }

    pub fn input(&self) -> InputInterface {
        let input = self.config.input.clone();
        match &self.backend {
            #[cfg(target_os = "macos")]
            Backend::AppKit => InputInterface::new(input, macos::create_event_loop),
            Backend::Headless(_) => InputInterface::new(input, channel_loop),
        }
    }

    pub fn graphics(&self) -> GraphicsInterface {
        GraphicsInterface::new(self.window_server())
    }

    pub fn selection(&self) -> SelectionInterface {
        SelectionInterface::new()
    }

    fn window_server(&self) -> Rc<dyn WindowServer> {
        self.window_server
            .get_or_init(|| match &self.backend {
                #[cfg(target_os = "macos")]
                Backend::AppKit => macos::create_window_server(),
                Backend::Headless(server) => server.clone() as Rc<dyn WindowServer>,
            })
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_macos_is_accepted() {
        assert!(check_host("macos").is_ok());
        for os in ["linux", "windows", "freebsd", ""] {
            match check_host(os) {
                Err(PlatformError::Unsupported { os: reported }) => assert_eq!(reported, os),
                other => panic!("{os:?} accepted: {:?}", other.is_ok()),
            }
        }
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn load_fails_off_macos() {
        assert!(matches!(
            Platform::load(&Config::default()),
            Err(PlatformError::Unsupported { .. })
        ));
    }

    #[test]
    fn capability_names_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_name(capability.name()), Some(capability));
        }
        assert_eq!(Capability::from_name("cairo"), None);
        assert_eq!(Capability::from_name("Input"), None);
        assert_eq!(Capability::Graphics.to_string(), "graphics");
    }

    #[test]
    fn provide_resolves_known_names() {
        let platform = Platform::headless(&Config::default());
        for name in ["input", "graphics", "selection"] {
            let interface = platform.provide(name).unwrap();
            assert_eq!(interface.capability().name(), name);
        }
    }

    #[test]
    fn provide_unknown_name_is_none() {
        let platform = Platform::headless(&Config::default());
        assert!(platform.provide("cairo").is_none());
        assert!(platform.provide("").is_none());
    }

    #[test]
    fn headless_graphics_share_one_server() {
        let platform = Platform::headless(&Config::default());
        let a = platform.provide("graphics").and_then(Interface::into_graphics).unwrap();
        let b = platform.provide("graphics").and_then(Interface::into_graphics).unwrap();
        assert_eq!(a.desktop_size(), HEADLESS_DESKTOP);

        let _window = a.transparent_window(10, 20, 100, 50).unwrap();
        let _other = b.transparent_window(0, 0, 8, 8).unwrap();
        let server = platform.headless_server().unwrap();
        assert_eq!(server.created_frames().len(), 2);
    }

    #[test]
    fn wrong_variant_accessors_return_none() {
        let platform = Platform::headless(&Config::default());
        let selection = platform.provide("selection").unwrap();
        assert!(selection.clone().into_input().is_none());
        assert!(selection.clone().into_graphics().is_none());
        assert!(selection.into_selection().is_some());
    }
}
