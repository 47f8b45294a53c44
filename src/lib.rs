//! quasimode-osx -- macOS platform adapters for a quasimodal launcher.
//!
//! Three capabilities are resolved by name through `Platform::provide`:
//!
//! * `"graphics"`: transparent, borderless overlay windows backed by an
//!   off-screen ARGB32 surface.
//! * `"input"`: global key capture through an external key notifier helper,
//!   delivered to an `InputHandler` on a single event loop thread.
//! * `"selection"`: clipboard-backed read and write of the current selection.

#![cfg_attr(target_os = "macos", allow(unexpected_cfgs))] // objc/cocoa macros

pub mod config;
pub mod error;
pub mod graphics;
pub mod input;
pub mod platform;
pub mod selection;

pub use config::Config;
pub use error::PlatformError;
pub use platform::{Capability, Interface, Platform};
