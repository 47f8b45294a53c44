//! AppKit overlay windows.
//!
//! Each overlay is a borderless, non-opaque NSWindow floating above the
//! Dock and menus, whose content view is an instance of a small NSView
//! subclass registered at runtime. The view keeps two ivars:
//!
//! * `_overlayKey`: the owning overlay's registry key. Never an owning
//!   pointer; a redraw for a key that is gone draws nothing.
//! * `_imageRep`: an NSBitmapImageRep of the overlay's maximum size that the
//!   surface is composed into before drawing.
//!
//! AppKit uses a bottom-left origin. Frames arrive here already flipped; the
//! image is drawn so that its top row sits at the top of the view.

use cocoa::appkit::{
    NSBackingStoreType, NSColor, NSScreen, NSWindow, NSWindowCollectionBehavior, NSWindowStyleMask,
};
use cocoa::base::{id, nil, BOOL, NO, YES};
use cocoa::foundation::{NSPoint, NSRect, NSSize, NSString};
use objc::runtime::{Class, Object, Sel};
use objc::{class, declare::ClassDecl, msg_send, sel, sel_impl};

use crate::error::PlatformError;
use crate::graphics::{registry, Frame, NativeWindow, OverlayKey, WindowServer};

const VIEW_CLASS: &str = "QuasimodeOverlayView";

/// NSPopUpMenuWindowLevel.
const POP_UP_MENU_WINDOW_LEVEL: i64 = 101;

// ---------------------------------------------------------------------------
// Window server
// ---------------------------------------------------------------------------

pub struct AppKitServer;

impl AppKitServer {
    pub fn new() -> Self {
        AppKitServer
    }
}

impl WindowServer for AppKitServer {
    fn desktop_size(&self) -> (u32, u32) {
        unsafe {
            let screen = NSScreen::mainScreen(nil);
            if screen == nil {
                log::warn!("window: no main screen, reporting 0x0 desktop");
                return (0, 0);
            }
            let frame = NSScreen::frame(screen);
            (frame.size.width as u32, frame.size.height as u32)
        }
    }

    fn create_window(
        &self,
        key: OverlayKey,
        frame: Frame,
        max_size: (u32, u32),
    ) -> Result<Box<dyn NativeWindow>, PlatformError> {
        let window = unsafe { AppKitWindow::create(key, frame, max_size)? };
        log::debug!(
            "window: created {}x{} overlay at ({}, {})",
            frame.width,
            frame.height,
            frame.x,
            frame.y
        );
        Ok(Box::new(window))
    }
}

// ---------------------------------------------------------------------------
// Native window
// ---------------------------------------------------------------------------

/// Owns one retained NSWindow, its content view and the view's image rep.
struct AppKitWindow {
    window: id,
    view: id,
    image_rep: id,
}

impl AppKitWindow {
    unsafe fn create(
        key: OverlayKey,
        frame: Frame,
        (max_width, max_height): (u32, u32),
    ) -> Result<Self, PlatformError> {
        let image_rep = new_image_rep(max_width, max_height)?;

        let rect = ns_rect(frame);
        let window = NSWindow::alloc(nil).initWithContentRect_styleMask_backing_defer_(
            rect,
            NSWindowStyleMask::NSBorderlessWindowMask,
            NSBackingStoreType::NSBackingStoreBuffered,
            NO,
        );
        if window == nil {
            let _: () = msg_send![image_rep, release];
            return Err(PlatformError::ResourceCreation {
                resource: "overlay window",
                reason: "NSWindow init returned nil".into(),
            });
        }
        window.setReleasedWhenClosed_(NO);
        window.setOpaque_(NO);
        let _: () = msg_send![window, setHasShadow: NO];
        window.setBackgroundColor_(NSColor::clearColor(nil));
        window.setIgnoresMouseEvents_(YES);
        window.setLevel_(POP_UP_MENU_WINDOW_LEVEL);
        window.setCollectionBehavior_(
            NSWindowCollectionBehavior::NSWindowCollectionBehaviorCanJoinAllSpaces
                | NSWindowCollectionBehavior::NSWindowCollectionBehaviorStationary,
        );

        let view = match overlay_view_class() {
            Ok(class) => {
                let view: id = msg_send![class, alloc];
                let bounds = NSRect::new(NSPoint::new(0.0, 0.0), rect.size);
                let view: id = msg_send![view, initWithFrame: bounds];
                view
            }
            Err(e) => {
                let _: () = msg_send![window, release];
                let _: () = msg_send![image_rep, release];
                return Err(e);
            }
        };
        (*view).set_ivar::<u64>("_overlayKey", key.to_raw());
        (*view).set_ivar::<id>("_imageRep", image_rep);
        (*view).set_ivar::<f64>("_imageHeight", f64::from(max_height));
        window.setContentView_(view);

        Ok(Self {
            window,
            view,
            image_rep,
        })
    }
}

impl NativeWindow for AppKitWindow {
    fn set_frame(&mut self, frame: Frame) {
        unsafe { self.window.setFrame_display_(ns_rect(frame), YES) };
    }

    fn set_alpha(&mut self, alpha: f64) {
        unsafe {
            let _: () = msg_send![self.window, setAlphaValue: alpha];
        }
    }

    fn order_front(&mut self) {
        unsafe {
            let _: () = msg_send![self.window, orderFrontRegardless];
        }
    }

    fn request_redraw(&mut self) {
        unsafe {
            let _: () = msg_send![self.view, setNeedsDisplay: YES];
            let _: () = msg_send![self.window, displayIfNeeded];
        }
    }
}

impl Drop for AppKitWindow {
    fn drop(&mut self) {
        unsafe {
            let _: () = msg_send![self.window, orderOut: nil];
            let _: () = msg_send![self.window, close];
            let _: () = msg_send![self.window, release];
            let _: () = msg_send![self.view, release];
            let _: () = msg_send![self.image_rep, release];
        }
    }
}

fn ns_rect(frame: Frame) -> NSRect {
    NSRect::new(
        NSPoint::new(f64::from(frame.x), f64::from(frame.y)),
        NSSize::new(f64::from(frame.width), f64::from(frame.height)),
    )
}

/// Allocates a premultiplied 8-bit RGBA bitmap of the given size.
unsafe fn new_image_rep(width: u32, height: u32) -> Result<id, PlatformError> {
    let color_space = NSString::alloc(nil).init_str("NSDeviceRGBColorSpace");
    let rep: id = msg_send![class!(NSBitmapImageRep), alloc];
    let rep: id = msg_send![rep,
        initWithBitmapDataPlanes: std::ptr::null_mut::<*mut u8>()
        pixelsWide: width as isize
        pixelsHigh: height as isize
        bitsPerSample: 8isize
        samplesPerPixel: 4isize
        hasAlpha: YES
        isPlanar: NO
        colorSpaceName: color_space
        bytesPerRow: 0isize
        bitsPerPixel: 32isize];
    let _: () = msg_send![color_space, release];
    if rep == nil {
        return Err(PlatformError::ResourceCreation {
            resource: "bitmap image rep",
            reason: format!("NSBitmapImageRep init failed for {width}x{height}"),
        });
    }
    Ok(rep)
}

// ---------------------------------------------------------------------------
// View class
// ---------------------------------------------------------------------------

fn overlay_view_class() -> Result<&'static Class, PlatformError> {
    if let Some(class) = Class::get(VIEW_CLASS) {
        return Ok(class);
    }
    let declare_error = |reason: &str| PlatformError::ResourceCreation {
        resource: "overlay view class",
        reason: reason.to_string(),
    };
    let superclass = Class::get("NSView").ok_or_else(|| declare_error("NSView not found"))?;
    let mut decl = ClassDecl::new(VIEW_CLASS, superclass)
        .ok_or_else(|| declare_error("class name already taken"))?;

    decl.add_ivar::<u64>("_overlayKey");
    decl.add_ivar::<id>("_imageRep");
    decl.add_ivar::<f64>("_imageHeight");

    extern "C" fn draw_rect(this: &Object, _cmd: Sel, _rect: NSRect) {
        unsafe {
            let key = OverlayKey::from_raw(*this.get_ivar::<u64>("_overlayKey"));
            let rep = *this.get_ivar::<id>("_imageRep");
            if rep == nil {
                return;
            }
            let data: *mut u8 = msg_send![rep, bitmapData];
            let stride: isize = msg_send![rep, bytesPerRow];
            let rows: isize = msg_send![rep, pixelsHigh];
            if data.is_null() || stride <= 0 || rows <= 0 {
                return;
            }
            let stride = stride as usize;
            let pixels = std::slice::from_raw_parts_mut(data, stride * rows as usize);
            if !registry::compose(key, pixels, stride) {
                return;
            }

            let bounds: NSRect = msg_send![this, bounds];
            let image_height = *this.get_ivar::<f64>("_imageHeight");
            let origin = NSPoint::new(0.0, bounds.size.height - image_height);
            let _: BOOL = msg_send![rep, drawAtPoint: origin];
        }
    }

    extern "C" fn is_opaque(_this: &Object, _cmd: Sel) -> BOOL {
        NO
    }

    unsafe {
        decl.add_method(sel!(drawRect:), draw_rect as extern "C" fn(&Object, Sel, NSRect));
        decl.add_method(sel!(isOpaque), is_opaque as extern "C" fn(&Object, Sel) -> BOOL);
    }
    Ok(decl.register())
}
