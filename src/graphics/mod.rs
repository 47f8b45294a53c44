//! Transparent overlay windows.
//!
//! A `TransparentWindow` owns one off-screen surface (allocated on demand at
//! the maximum size) and one borderless, always-on-top native window. The
//! application draws into the surface and calls `update()`; the native view
//! then composites the surface onto the desktop.
//!
//! Callers use desktop coordinates with a top-left origin. The native window
//! server uses a bottom-left origin, so every frame sent to it is flipped:
//! `native_y = desktop_height - y - height`.

mod bridge;
pub mod headless;
pub mod registry;
mod surface;

use std::rc::Rc;

pub use registry::OverlayKey;
pub use surface::{Color, Surface, SurfaceHandle};

use crate::error::PlatformError;

/// Opacity value meaning fully opaque.
pub const MAX_OPACITY: u8 = 0xff;

/// A window frame in native (bottom-left origin) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Native window handle driven by a `TransparentWindow`.
pub trait NativeWindow {
    /// Moves and resizes the window. `frame` is in native coordinates.
    fn set_frame(&mut self, frame: Frame);

    /// Whole-window alpha in `0.0..=1.0`.
    fn set_alpha(&mut self, alpha: f64);

    /// Brings the window above all others and shows it.
    fn order_front(&mut self);

    /// Marks the content view as needing a full redraw.
    fn request_redraw(&mut self);
}

/// Creates native overlay windows and reports the desktop geometry.
pub trait WindowServer {
    /// Size of the primary display as `(width, height)`.
    fn desktop_size(&self) -> (u32, u32);

    /// Creates a borderless, clear, always-on-top window at `frame` whose
    /// content view draws the surface registered under `key`.
    ///
    /// `max_size` is the size of the backing image the view composites into.
    fn create_window(
        &self,
        key: OverlayKey,
        frame: Frame,
        max_size: (u32, u32),
    ) -> Result<Box<dyn NativeWindow>, PlatformError>;
}

/// Converts a top-left-origin `y` to the native bottom-left origin.
///
/// Results outside the `i32` range saturate.
pub fn flip_y(desktop_height: u32, y: i32, height: u32) -> i32 {
    let flipped = i64::from(desktop_height) - i64::from(y) - i64::from(height);
    flipped.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Maps an opacity byte onto the native `0.0..=1.0` alpha range.
pub fn opacity_to_alpha(opacity: u8) -> f64 {
    f64::from(opacity) / f64::from(MAX_OPACITY)
}

/// Borderless, transparent, always-on-top overlay window.
pub struct TransparentWindow {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
    opacity: u8,
    key: OverlayKey,
    server: Rc<dyn WindowServer>,
    native: Box<dyn NativeWindow>,
}

impl TransparentWindow {
    /// Creates the native window at `(x, y)` with its initial size equal to
    /// the maximum size. The drawing surface is not allocated until
    /// `create_surface` is called.
    pub fn new(
        server: Rc<dyn WindowServer>,
        x: i32,
        y: i32,
        max_width: u32,
        max_height: u32,
    ) -> Result<Self, PlatformError> {
        if max_width == 0 || max_height == 0 {
            return Err(PlatformError::ResourceCreation {
                resource: "overlay window",
                reason: format!("zero-sized backing store {max_width}x{max_height}"),
            });
        }

        let key = registry::register(max_width, max_height);
        let (_, desktop_height) = server.desktop_size();
        let frame = Frame {
            x,
            y: flip_y(desktop_height, y, max_height),
            width: max_width,
            height: max_height,
        };
        let mut native = match server.create_window(key, frame, (max_width, max_height)) {
            Ok(native) => native,
            Err(e) => {
                registry::unregister(key);
                return Err(e);
            }
        };
        native.set_alpha(1.0);

        log::debug!("graphics: overlay created at ({x}, {y}) max {max_width}x{max_height}");
        Ok(Self {
            x,
            y,
            width: max_width,
            height: max_height,
            max_width,
            max_height,
            opacity: MAX_OPACITY,
            key,
            server,
            native,
        })
    }

    /// Returns the drawing surface, allocating it on first use.
    ///
    /// The surface always spans the maximum size, independent of the
    /// current window size, and every call returns the same handle.
    pub fn create_surface(&mut self) -> Result<SurfaceHandle, PlatformError> {
        registry::ensure_surface(self.key).ok_or(PlatformError::ResourceCreation {
            resource: "drawing surface",
            reason: "overlay is no longer registered".into(),
        })
    }

    /// The surface, if one has been created.
    pub fn surface(&self) -> Option<SurfaceHandle> {
        registry::surface(self.key)
    }

    /// Raises the window and schedules a redraw of the surface.
    ///
    /// Does nothing until a surface exists.
    pub fn update(&mut self) {
        if registry::surface(self.key).is_none() {
            return;
        }
        self.native.order_front();
        self.native.request_redraw();
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity;
        self.native.set_alpha(opacity_to_alpha(opacity));
    }

    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
        self.apply_frame();
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    /// Resizes the visible window within the backing store.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<(), PlatformError> {
        if width > self.max_width || height > self.max_height {
            return Err(PlatformError::SizeExceedsMaximum {
                width,
                height,
                max_width: self.max_width,
                max_height: self.max_height,
            });
        }
        self.width = width;
        self.height = height;
        self.apply_frame();
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    /// Current frame in native coordinates.
    pub fn native_frame(&self) -> Frame {
        let (_, desktop_height) = self.server.desktop_size();
        Frame {
            x: self.x,
            y: flip_y(desktop_height, self.y, self.height),
            width: self.width,
            height: self.height,
        }
    }

    pub fn key(&self) -> OverlayKey {
        self.key
    }

    fn apply_frame(&mut self) {
        let frame = self.native_frame();
        self.native.set_frame(frame);
    }
}

impl Drop for TransparentWindow {
    fn drop(&mut self) {
        registry::unregister(self.key);
    }
}

/// The `"graphics"` capability.
#[derive(Clone)]
pub struct GraphicsInterface {
    server: Rc<dyn WindowServer>,
}

impl GraphicsInterface {
    pub fn new(server: Rc<dyn WindowServer>) -> Self {
        Self { server }
    }

    pub fn transparent_window(
        &self,
        x: i32,
        y: i32,
        max_width: u32,
        max_height: u32,
    ) -> Result<TransparentWindow, PlatformError> {
        TransparentWindow::new(self.server.clone(), x, y, max_width, max_height)
    }

    pub fn desktop_size(&self) -> (u32, u32) {
        self.server.desktop_size()
    }
}
