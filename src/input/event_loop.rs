//! The single event loop every input hook runs on.
//!
//! An `EventLoop` blocks in `run` and hands the caller a stream of
//! `Dispatch` values: a tick every interval, each notification posted from
//! the key listener, and exit requests. Other threads talk to a running
//! loop only through a cloneable `LoopProxy`, so hooks are never invoked
//! concurrently and need no locking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::listener::Notification;
use crate::error::PlatformError;

/// What the loop hands to its dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Tick,
    Notification(Notification),
    ExitRequested,
}

/// Messages carried from proxies to the loop.
#[derive(Debug)]
pub(crate) enum Message {
    Notify(Notification),
    ExitRequested,
    Stop,
}

/// Whether the loop keeps running after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopControl {
    Continue,
    Stop,
}

/// Routes one message to `dispatch`.
pub(crate) fn deliver(message: Message, dispatch: &mut dyn FnMut(Dispatch)) -> LoopControl {
    match message {
        Message::Notify(n) => dispatch(Dispatch::Notification(n)),
        Message::ExitRequested => dispatch(Dispatch::ExitRequested),
        Message::Stop => return LoopControl::Stop,
    }
    LoopControl::Continue
}

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Thread-safe handle for posting to a loop and stopping it.
#[derive(Clone)]
pub struct LoopProxy {
    tx: Sender<Message>,
    on_stop: Option<Waker>,
}

impl LoopProxy {
    pub(crate) fn new(tx: Sender<Message>, on_stop: Option<Waker>) -> Self {
        Self { tx, on_stop }
    }

    /// Posts a notification. Returns `false` once the loop has gone away.
    pub fn notify(&self, notification: Notification) -> bool {
        self.tx.send(Message::Notify(notification)).is_ok()
    }

    /// Asks the loop to call `on_exit_requested` on its thread.
    pub fn request_exit(&self) -> bool {
        self.tx.send(Message::ExitRequested).is_ok()
    }

    /// Asks the loop to stop. In-flight callbacks finish first.
    pub fn stop(&self) {
        let _ = self.tx.send(Message::Stop);
        if let Some(wake) = &self.on_stop {
            wake();
        }
    }

    /// Used when the OS asks the application to quit: the handler's
    /// `on_exit_requested` runs, then the loop stops so `run` can unwind.
    pub fn request_shutdown(&self) {
        self.request_exit();
        self.stop();
    }
}

impl std::fmt::Debug for LoopProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopProxy")
            .field("native_waker", &self.on_stop.is_some())
            .finish()
    }
}

pub trait EventLoop {
    /// A handle other threads can use to reach this loop.
    fn proxy(&self) -> LoopProxy;

    /// Blocks the calling thread, dispatching a `Tick` roughly every
    /// `interval` and every posted message, until a proxy calls `stop`.
    fn run(
        &mut self,
        interval: Duration,
        dispatch: &mut dyn FnMut(Dispatch),
    ) -> Result<(), PlatformError>;
}

// ---------------------------------------------------------------------------
// Channel loop
// ---------------------------------------------------------------------------

/// Portable loop driven by a channel with timed receives.
pub struct ChannelLoop {
    tx: Sender<Message>,
    rx: Receiver<Message>,
}

impl ChannelLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for ChannelLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Loop factory for hosts without a native application loop.
pub fn channel_loop() -> Result<Box<dyn EventLoop>, PlatformError> {
    Ok(Box::new(ChannelLoop::new()))
}

impl EventLoop for ChannelLoop {
    fn proxy(&self) -> LoopProxy {
        LoopProxy::new(self.tx.clone(), None)
    }

    fn run(
        &mut self,
        interval: Duration,
        dispatch: &mut dyn FnMut(Dispatch),
    ) -> Result<(), PlatformError> {
        log::debug!("event loop: running, tick every {interval:?}");
        let mut next_tick = Instant::now() + interval;
        loop {
            let wait = next_tick.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(wait) {
                Ok(message) => {
                    if deliver(message, dispatch) == LoopControl::Stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    dispatch(Dispatch::Tick);
                    next_tick += interval;
                    // Best effort: after a slow handler, skip missed ticks.
                    let now = Instant::now();
                    if next_tick < now {
                        next_tick = now + interval;
                    }
                }
                // Unreachable while `self.tx` is alive.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::debug!("event loop: stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Native loop claim
// ---------------------------------------------------------------------------

static NATIVE_LOOP_CLAIMED: AtomicBool = AtomicBool::new(false);

/// Proof that this process owns the native application loop.
///
/// The native toolkit's application object is process-global, so at most one
/// claim exists at a time; it is released on drop.
#[derive(Debug)]
pub struct NativeLoopClaim {
    _private: (),
}

impl NativeLoopClaim {
    pub fn acquire() -> Result<Self, PlatformError> {
        NATIVE_LOOP_CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self { _private: () })
            .map_err(|_| PlatformError::EventLoopInUse)
    }
}

impl Drop for NativeLoopClaim {
    fn drop(&mut self) {
        NATIVE_LOOP_CLAIMED.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::thread;

    use serial_test::serial;

    use super::*;

    #[test]
    fn ticks_until_stopped() {
        let mut event_loop = ChannelLoop::new();
        let proxy = event_loop.proxy();
        let mut ticks = 0;
        event_loop
            .run(Duration::from_millis(1), &mut |event| {
                if event == Dispatch::Tick {
                    ticks += 1;
                    if ticks == 3 {
                        proxy.stop();
                    }
                }
            })
            .unwrap();
        assert_eq!(ticks, 3);
    }

    #[test]
    fn stop_before_run_returns_immediately() {
        let mut event_loop = ChannelLoop::new();
        event_loop.proxy().stop();
        let mut events = Vec::new();
        event_loop
            .run(Duration::from_secs(60), &mut |event| events.push(event))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn messages_are_delivered_in_order_from_other_threads() {
        let mut event_loop = ChannelLoop::new();
        let proxy = event_loop.proxy();
        let poster = proxy.clone();
        thread::spawn(move || {
            assert!(poster.notify(Notification::QuasimodeStart));
            assert!(poster.request_exit());
            assert!(poster.notify(Notification::QuasimodeEnd));
            poster.stop();
        })
        .join()
        .unwrap();

        let mut events = Vec::new();
        event_loop
            .run(Duration::from_secs(60), &mut |event| events.push(event))
            .unwrap();
        assert_eq!(
            events,
            vec![
                Dispatch::Notification(Notification::QuasimodeStart),
                Dispatch::ExitRequested,
                Dispatch::Notification(Notification::QuasimodeEnd),
            ]
        );
    }

    #[test]
    fn shutdown_reports_exit_then_stops() {
        let mut event_loop = ChannelLoop::new();
        let proxy = event_loop.proxy();
        let poster = proxy.clone();
        thread::spawn(move || poster.request_shutdown()).join().unwrap();
        // Anything posted after the stop is left for a later run.
        assert!(proxy.notify(Notification::SomeKey));

        let mut events = Vec::new();
        event_loop
            .run(Duration::from_secs(60), &mut |event| events.push(event))
            .unwrap();
        assert_eq!(events, vec![Dispatch::ExitRequested]);
    }

    #[test]
    fn proxy_reports_dropped_loop() {
        let proxy = ChannelLoop::new().proxy();
        assert!(!proxy.notify(Notification::SomeKey));
        assert!(!proxy.request_exit());
        proxy.stop();
    }

    #[test]
    fn stop_invokes_native_waker() {
        let woken = Arc::new(AtomicBool::new(false));
        let flag = woken.clone();
        let (tx, _rx) = mpsc::channel();
        let proxy = LoopProxy::new(tx, Some(Arc::new(move || flag.store(true, Ordering::SeqCst))));
        proxy.stop();
        assert!(woken.load(Ordering::SeqCst));
    }

    #[test]
    #[serial]
    fn native_loop_is_claimed_once() {
        let claim = NativeLoopClaim::acquire().unwrap();
        assert!(matches!(
            NativeLoopClaim::acquire(),
            Err(PlatformError::EventLoopInUse)
        ));
        drop(claim);
        assert!(NativeLoopClaim::acquire().is_ok());
    }
}
