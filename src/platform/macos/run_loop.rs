//! Event loop on the main CFRunLoop.
//!
//! `AppKitLoop::run` installs a repeating CFRunLoopTimer on the main run
//! loop and blocks in `CFRunLoopRun`. Every timer fire first hands pending
//! NSEvents to AppKit, then drains the message channel (listener
//! notifications, exit requests, stop) and dispatches one tick, all inside a
//! fresh autorelease pool. While running, an `AppDelegate` turns quit
//! requests from the system into an exit request plus stop.
//!
//! `LoopProxy::stop` posts a stop message and calls `CFRunLoopStop`, which
//! is documented as safe from any thread. `CFRunLoopRun` may also return
//! early for reasons of its own, so it is re-entered until a stop message
//! has actually been seen.

use std::ffi::c_void;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use cocoa::appkit::NSApp;
use cocoa::base::{id, nil, YES};
use cocoa::foundation::{NSAutoreleasePool, NSUInteger};
use objc::{class, msg_send, sel, sel_impl};

use super::app_delegate::AppDelegate;

use crate::error::PlatformError;
use crate::input::event_loop::{
    deliver, Dispatch, EventLoop, LoopControl, LoopProxy, Message, NativeLoopClaim,
};

// ---------------------------------------------------------------------------
// Raw FFI types and declarations
// ---------------------------------------------------------------------------

type CFRunLoopRef = *mut c_void;
type CFRunLoopTimerRef = *mut c_void;
type CFStringRef = *const c_void;
type CFAbsoluteTime = f64;
type CFTimeInterval = f64;
type CFIndex = isize;
type CFOptionFlags = usize;

type CFRunLoopTimerCallBack = unsafe extern "C" fn(timer: CFRunLoopTimerRef, info: *mut c_void);

#[repr(C)]
struct CFRunLoopTimerContext {
    version: CFIndex,
    info: *mut c_void,
    retain: Option<unsafe extern "C" fn(info: *const c_void) -> *const c_void>,
    release: Option<unsafe extern "C" fn(info: *const c_void)>,
    copy_description: Option<unsafe extern "C" fn(info: *const c_void) -> CFStringRef>,
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    /// Returns the main thread's CFRunLoop.
    fn CFRunLoopGetMain() -> CFRunLoopRef;

    /// Returns the CFRunLoop for the calling thread.
    fn CFRunLoopGetCurrent() -> CFRunLoopRef;

    /// Runs the current thread's run loop until CFRunLoopStop is called.
    fn CFRunLoopRun();

    /// Stops the specified run loop. Safe from any thread.
    fn CFRunLoopStop(rl: CFRunLoopRef);

    fn CFAbsoluteTimeGetCurrent() -> CFAbsoluteTime;

    fn CFRunLoopTimerCreate(
        allocator: *const c_void,
        fire_date: CFAbsoluteTime,
        interval: CFTimeInterval,
        flags: CFOptionFlags,
        order: CFIndex,
        callout: CFRunLoopTimerCallBack,
        context: *mut CFRunLoopTimerContext,
    ) -> CFRunLoopTimerRef;

    fn CFRunLoopAddTimer(rl: CFRunLoopRef, timer: CFRunLoopTimerRef, mode: CFStringRef);

    fn CFRunLoopTimerInvalidate(timer: CFRunLoopTimerRef);

    /// Releases a Core Foundation object.
    fn CFRelease(cf: *const c_void);

    /// The default run loop mode constant.
    static kCFRunLoopDefaultMode: CFStringRef;
}

// ---------------------------------------------------------------------------
// Thread-safety wrapper
// ---------------------------------------------------------------------------

/// Wraps CFRunLoopRef so proxies on other threads can stop the loop.
///
/// CFRunLoopStop may be called from any thread; the reference itself follows
/// CF thread-safety rules.
struct SendableRunLoop(CFRunLoopRef);
unsafe impl Send for SendableRunLoop {}
unsafe impl Sync for SendableRunLoop {}

// ---------------------------------------------------------------------------
// Timer state
// ---------------------------------------------------------------------------

/// Lives on `run`'s stack for as long as the timer is installed.
struct TickState<'a> {
    rx: &'a Receiver<Message>,
    dispatch: &'a mut dyn FnMut(Dispatch),
    stopped: bool,
}

impl TickState<'_> {
    /// Delivers every queued message. Returns once empty or stopped.
    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(message) => {
                    if deliver(message, &mut *self.dispatch) == LoopControl::Stop {
                        self.stopped = true;
                        return;
                    }
                }
                Err(TryRecvError::Empty) => return,
                // Unreachable while the loop owns a sender.
                Err(TryRecvError::Disconnected) => {
                    self.stopped = true;
                    return;
                }
            }
        }
    }
}

/// NSEventMaskAny.
const ANY_EVENT_MASK: NSUInteger = NSUInteger::MAX;

/// Dispatches every NSEvent already queued, without waiting for more.
unsafe fn pump_events() {
    let app = NSApp();
    // NSDefaultRunLoopMode is toll-free bridged to kCFRunLoopDefaultMode.
    let mode = kCFRunLoopDefaultMode as id;
    loop {
        let until: id = msg_send![class!(NSDate), distantPast];
        let event: id = msg_send![app,
            nextEventMatchingMask: ANY_EVENT_MASK
            untilDate: until
            inMode: mode
            dequeue: YES];
        if event == nil {
            break;
        }
        let _: () = msg_send![app, sendEvent: event];
    }
    let _: () = msg_send![app, updateWindows];
}

unsafe extern "C" fn on_timer(_timer: CFRunLoopTimerRef, info: *mut c_void) {
    let state = &mut *(info as *mut TickState<'_>);
    let pool = NSAutoreleasePool::new(nil);

    pump_events();
    state.drain();
    if state.stopped {
        CFRunLoopStop(CFRunLoopGetCurrent());
    } else {
        (state.dispatch)(Dispatch::Tick);
    }

    let _: () = msg_send![pool, drain];
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// The main-thread application loop.
pub struct AppKitLoop {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    run_loop: Arc<SendableRunLoop>,
    _claim: NativeLoopClaim,
}

impl AppKitLoop {
    pub fn new() -> Result<Self, PlatformError> {
        let claim = NativeLoopClaim::acquire()?;
        let (tx, rx) = mpsc::channel();
        let run_loop = Arc::new(SendableRunLoop(unsafe { CFRunLoopGetMain() }));
        Ok(Self {
            tx,
            rx,
            run_loop,
            _claim: claim,
        })
    }
}

impl EventLoop for AppKitLoop {
    fn proxy(&self) -> LoopProxy {
        let run_loop = self.run_loop.clone();
        LoopProxy::new(
            self.tx.clone(),
            Some(Arc::new(move || unsafe { CFRunLoopStop(run_loop.0) })),
        )
    }

    fn run(
        &mut self,
        interval: Duration,
        dispatch: &mut dyn FnMut(Dispatch),
    ) -> Result<(), PlatformError> {
        let _delegate = AppDelegate::install(self.proxy())?;
        let mut state = TickState {
            rx: &self.rx,
            dispatch,
            stopped: false,
        };
        let seconds = interval.as_secs_f64();
        let mut context = CFRunLoopTimerContext {
            version: 0,
            info: (&mut state as *mut TickState<'_>).cast::<c_void>(),
            retain: None,
            release: None,
            copy_description: None,
        };

        unsafe {
            let timer = CFRunLoopTimerCreate(
                std::ptr::null(),
                CFAbsoluteTimeGetCurrent() + seconds,
                seconds,
                0,
                0,
                on_timer,
                &mut context,
            );
            if timer.is_null() {
                return Err(PlatformError::ResourceCreation {
                    resource: "run loop timer",
                    reason: "CFRunLoopTimerCreate returned null".into(),
                });
            }
            CFRunLoopAddTimer(self.run_loop.0, timer, kCFRunLoopDefaultMode);
            log::info!("run loop: timer installed, tick every {interval:?}");

            loop {
                CFRunLoopRun();
                // Woken by a proxy: pick up the stop message it posted.
                let state = &mut *(context.info as *mut TickState<'_>);
                if !state.stopped {
                    state.drain();
                }
                if state.stopped {
                    break;
                }
            }

            CFRunLoopTimerInvalidate(timer);
            CFRelease(timer.cast_const());
        }
        log::info!("run loop: exited");
        Ok(())
    }
}
