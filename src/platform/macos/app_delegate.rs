//! NSApplication delegate.
//!
//! AppKit asks the delegate before quitting (logout, restart, a quit Apple
//! event). The answer is always "not now": the request is forwarded to the
//! event loop as an exit request followed by a stop, so `InputManager::run`
//! unwinds normally and interrupts the helper on its way out. Replying
//! `NSTerminateNow` instead would end the process inside `terminate:`
//! without any of that.

use std::ffi::c_void;

use cocoa::appkit::NSApp;
use cocoa::base::{id, nil};
use cocoa::foundation::NSUInteger;
use objc::declare::ClassDecl;
use objc::runtime::{Class, Object, Sel};
use objc::{msg_send, sel, sel_impl};

use crate::error::PlatformError;
use crate::input::event_loop::LoopProxy;

const DELEGATE_CLASS: &str = "QuasimodeAppDelegate";

/// NSTerminateCancel.
const TERMINATE_CANCEL: NSUInteger = 0;

/// The installed delegate. Dropping it uninstalls it.
pub struct AppDelegate {
    object: id,
    proxy: *mut LoopProxy,
}

impl AppDelegate {
    /// Sets a new delegate forwarding quit requests to `proxy` on NSApp.
    pub fn install(proxy: LoopProxy) -> Result<Self, PlatformError> {
        let class = app_delegate_class()?;
        let proxy = Box::into_raw(Box::new(proxy));
        unsafe {
            let object: id = msg_send![class, new];
            if object == nil {
                drop(Box::from_raw(proxy));
                return Err(PlatformError::ResourceCreation {
                    resource: "application delegate",
                    reason: format!("{DELEGATE_CLASS} new returned nil"),
                });
            }
            (*object).set_ivar::<*mut c_void>("_loopProxy", proxy.cast());
            let _: () = msg_send![NSApp(), setDelegate: object];
            log::debug!("app delegate: installed");
            Ok(Self { object, proxy })
        }
    }
}

impl Drop for AppDelegate {
    fn drop(&mut self) {
        unsafe {
            let app = NSApp();
            let current: id = msg_send![app, delegate];
            if current == self.object {
                let _: () = msg_send![app, setDelegate: nil];
            }
            (*self.object).set_ivar::<*mut c_void>("_loopProxy", std::ptr::null_mut());
            let _: () = msg_send![self.object, release];
            drop(Box::from_raw(self.proxy));
        }
        log::debug!("app delegate: removed");
    }
}

fn app_delegate_class() -> Result<&'static Class, PlatformError> {
    if let Some(class) = Class::get(DELEGATE_CLASS) {
        return Ok(class);
    }
    let declare_error = |reason: &str| PlatformError::ResourceCreation {
        resource: "application delegate class",
        reason: reason.to_string(),
    };
    let superclass = Class::get("NSObject").ok_or_else(|| declare_error("NSObject not found"))?;
    let mut decl = ClassDecl::new(DELEGATE_CLASS, superclass)
        .ok_or_else(|| declare_error("class name already taken"))?;

    decl.add_ivar::<*mut c_void>("_loopProxy");

    extern "C" fn should_terminate(this: &Object, _cmd: Sel, _sender: id) -> NSUInteger {
        unsafe {
            let proxy = *this.get_ivar::<*mut c_void>("_loopProxy") as *const LoopProxy;
            if let Some(proxy) = proxy.as_ref() {
                log::info!("app delegate: termination requested, shutting down");
                proxy.request_shutdown();
            }
        }
        TERMINATE_CANCEL
    }

    unsafe {
        decl.add_method(
            sel!(applicationShouldTerminate:),
            should_terminate as extern "C" fn(&Object, Sel, id) -> NSUInteger,
        );
    }
    Ok(decl.register())
}
