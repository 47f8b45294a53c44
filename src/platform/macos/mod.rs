//! macOS platform backend.
//!
//! Graphics: borderless AppKit windows via `AppKitServer`.
//! Event loop: the main thread's CFRunLoop via `AppKitLoop`, which also
//! pumps NSEvents and answers quit requests through `AppDelegate`.
//!
//! Both must be used from the main thread. The process runs as an accessory
//! application (no Dock icon, no menu bar) so overlays never steal focus.

mod app_delegate;
mod run_loop;
mod window;

use std::rc::Rc;

use cocoa::appkit::{NSApp, NSApplication, NSApplicationActivationPolicy};

use run_loop::AppKitLoop;
use window::AppKitServer;

use crate::error::PlatformError;
use crate::graphics::WindowServer;
use crate::input::event_loop::EventLoop;

/// Makes sure the shared NSApplication exists and has finished launching.
fn ensure_application() {
    unsafe {
        let app = NSApp();
        app.setActivationPolicy_(
            NSApplicationActivationPolicy::NSApplicationActivationPolicyAccessory,
        );
        app.finishLaunching();
    }
}

// ---------------------------------------------------------------------------
// Factory: window server
// ---------------------------------------------------------------------------

pub fn create_window_server() -> Rc<dyn WindowServer> {
    ensure_application();
    Rc::new(AppKitServer::new())
}

// ---------------------------------------------------------------------------
// Factory: event loop
// ---------------------------------------------------------------------------

/// Claims the main run loop. Fails with `EventLoopInUse` while another
/// `AppKitLoop` is alive.
pub fn create_event_loop() -> Result<Box<dyn EventLoop>, PlatformError> {
    ensure_application();
    Ok(Box::new(AppKitLoop::new()?))
}
