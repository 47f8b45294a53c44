//! Global keyboard capture.
//!
//! The `InputManager` owns the event loop, the key notifier helper and the
//! key listener endpoint. The embedding application supplies behaviour by
//! implementing `InputHandler`; every hook runs on the thread that called
//! `InputManager::run`.
//!
//! Mouse events, modality and caps-lock mode have no native wiring on this
//! platform yet. Their setters record the requested state so it can be read
//! back, and `InputManager::supports` reports them as unsupported.

pub mod event_loop;
pub mod helper;
pub mod keycodes;
pub mod listener;

use std::path::PathBuf;

use event_loop::{Dispatch, EventLoop, LoopProxy};
use helper::{HelperController, ProcessControl, SystemProcesses};
use listener::{KeyListener, Notification};

use crate::config::InputConfig;
use crate::error::PlatformError;

/// Numeric event type passed alongside a key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    KeyUp = 0,
    KeyDown = 1,
    Quasimode = 2,
}

/// Quasimode transitions, reported with `EventType::Quasimode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QuasimodeTransition {
    Start = 0,
    End = 1,
    Cancel = 2,
}

/// A key transition delivered to `InputHandler::on_keypress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Down(u16),
    Up(u16),
    Quasimode(QuasimodeTransition),
}

impl KeyEvent {
    pub fn event_type(self) -> EventType {
        match self {
            Self::Down(_) => EventType::KeyDown,
            Self::Up(_) => EventType::KeyUp,
            Self::Quasimode(_) => EventType::Quasimode,
        }
    }

    /// Native key code, or the quasimode transition code.
    pub fn code(self) -> u16 {
        match self {
            Self::Down(code) | Self::Up(code) => code,
            Self::Quasimode(t) => t as u16,
        }
    }

    /// The key event a helper notification stands for, if any.
    pub fn from_notification(notification: &Notification) -> Option<Self> {
        match notification {
            Notification::KeyDown { keycode, .. } => Some(Self::Down(*keycode)),
            Notification::KeyUp { keycode, .. } => Some(Self::Up(*keycode)),
            Notification::QuasimodeStart => Some(Self::Quasimode(QuasimodeTransition::Start)),
            Notification::QuasimodeEnd => Some(Self::Quasimode(QuasimodeTransition::End)),
            Notification::QuasimodeCancel => Some(Self::Quasimode(QuasimodeTransition::Cancel)),
            Notification::SomeKey => None,
        }
    }
}

/// Configurable quasimode key slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuasimodeSlot {
    Start = 0,
    End = 1,
    Cancel = 2,
}

/// Adapter features that may lack native wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    MouseEvents,
    Modality,
    CapsLockMode,
}

/// Hooks the application overrides. All default to doing nothing.
pub trait InputHandler {
    fn on_keypress(&mut self, _event: KeyEvent) {}

    /// Fired whenever the helper reports that some key was pressed.
    fn on_some_key(&mut self) {}

    fn on_some_mouse_button(&mut self) {}

    fn on_exit_requested(&mut self) {}

    fn on_mouse_move(&mut self, _x: i32, _y: i32) {}

    /// Called every tick with the configured interval in milliseconds.
    fn on_tick(&mut self, _ms_passed: u64) {}

    /// Called once, after the helper is running and before the loop starts.
    fn on_init(&mut self) {}
}

/// Routes one loop dispatch to the matching hook.
fn dispatch_to(handler: &mut dyn InputHandler, tick_ms: u64, event: Dispatch) {
    match event {
        Dispatch::Tick => handler.on_tick(tick_ms),
        Dispatch::ExitRequested => handler.on_exit_requested(),
        Dispatch::Notification(n) => match KeyEvent::from_notification(&n) {
            Some(key) => handler.on_keypress(key),
            None => handler.on_some_key(),
        },
    }
}

pub struct InputManager {
    config: InputConfig,
    event_loop: Box<dyn EventLoop>,
    helper: HelperController,
    quasimode_keycodes: [u16; 3],
    mouse_events_enabled: bool,
    modal: bool,
    caps_lock_mode: bool,
}

impl InputManager {
    pub fn new(
        config: InputConfig,
        event_loop: Box<dyn EventLoop>,
        processes: Box<dyn ProcessControl>,
    ) -> Self {
        let helper = HelperController::new(
            config.helper_name.clone(),
            config.helper_fallback_dir.clone(),
            processes,
        );
        let keys = config.quasimode_keys;
        Self {
            quasimode_keycodes: [keys.start, keys.end, keys.cancel],
            config,
            event_loop,
            helper,
            mouse_events_enabled: false,
            modal: false,
            caps_lock_mode: false,
        }
    }

    /// Handle for stopping the loop or posting to it from other threads.
    pub fn proxy(&self) -> LoopProxy {
        self.event_loop.proxy()
    }

    /// Path the key listener registers at.
    pub fn listener_path(&self) -> PathBuf {
        self.config.listener_path()
    }

    /// Registers the key listener, (re)starts the helper, calls `on_init`
    /// and blocks in the event loop until `stop` is called.
    ///
    /// When the loop ends the listener is unregistered and the helper is
    /// interrupted.
    pub fn run(&mut self, handler: &mut dyn InputHandler) -> Result<(), PlatformError> {
        log::info!("input: entering run loop");

        let listener = KeyListener::register(&self.config.listener_path(), self.proxy())?;
        self.helper.start()?;

        handler.on_init();

        let tick_ms = self.config.tick_interval_ms.max(1);
        let result = self
            .event_loop
            .run(self.config.tick_interval(), &mut |event| {
                dispatch_to(&mut *handler, tick_ms, event)
            });

        drop(listener);
        let stopped = self.helper.stop();
        log::info!("input: run loop exited");
        result.and(stopped)
    }

    /// Asks the running loop to return from `run`.
    pub fn stop(&self) {
        self.proxy().stop();
    }

    /// Whether `feature` is wired to the OS on this platform.
    pub fn supports(&self, feature: Feature) -> bool {
        match feature {
            Feature::MouseEvents | Feature::Modality | Feature::CapsLockMode => false,
        }
    }

    /// Records the request; mouse events are not delivered on this platform.
    pub fn enable_mouse_events(&mut self, enabled: bool) {
        log::debug!("input: mouse events {enabled} requested, not supported here");
        self.mouse_events_enabled = enabled;
    }

    pub fn mouse_events_enabled(&self) -> bool {
        self.mouse_events_enabled
    }

    /// Records the request; key events are not swallowed in modal state.
    pub fn set_modality(&mut self, modal: bool) {
        log::debug!("input: modality {modal} requested, not supported here");
        self.modal = modal;
    }

    pub fn is_modal(&self) -> bool {
        self.modal
    }

    /// Records the request; caps lock keeps its normal behaviour.
    pub fn set_caps_lock_mode(&mut self, enabled: bool) {
        log::debug!("input: caps lock mode {enabled} requested, not supported here");
        self.caps_lock_mode = enabled;
    }

    pub fn caps_lock_mode(&self) -> bool {
        self.caps_lock_mode
    }

    pub fn quasimode_keycode(&self, slot: QuasimodeSlot) -> u16 {
        self.quasimode_keycodes[slot as usize]
    }

    pub fn set_quasimode_keycode(&mut self, slot: QuasimodeSlot, keycode: u16) {
        self.quasimode_keycodes[slot as usize] = keycode;
    }
}

type LoopFactory = fn() -> Result<Box<dyn EventLoop>, PlatformError>;

/// The `"input"` capability.
#[derive(Clone)]
pub struct InputInterface {
    config: InputConfig,
    new_loop: LoopFactory,
}

impl InputInterface {
    pub fn new(config: InputConfig, new_loop: LoopFactory) -> Self {
        Self { config, new_loop }
    }

    /// Builds an input manager over the platform loop and the real process
    /// table.
    pub fn input_manager(&self) -> Result<InputManager, PlatformError> {
        let event_loop = (self.new_loop)()?;
        Ok(InputManager::new(
            self.config.clone(),
            event_loop,
            Box::new(SystemProcesses::new()),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    use super::event_loop::{channel_loop, ChannelLoop};
    use super::helper::fake::FakeProcesses;
    use super::*;
    use crate::config::QuasimodeKeys;

    fn config(dir: &tempfile::TempDir) -> InputConfig {
        InputConfig {
            helper_fallback_dir: Some(PathBuf::from("/opt/launcher/bin")),
            listener_dir: Some(dir.path().to_path_buf()),
            tick_interval_ms: 2,
            ..InputConfig::default()
        }
    }

    #[derive(Default)]
    struct Recorder {
        keys: Vec<KeyEvent>,
        some_keys: usize,
        ticks: Vec<u64>,
        inits: usize,
        exits: usize,
    }

    impl InputHandler for Recorder {
        fn on_keypress(&mut self, event: KeyEvent) {
            self.keys.push(event);
        }
        fn on_some_key(&mut self) {
            self.some_keys += 1;
        }
        fn on_tick(&mut self, ms_passed: u64) {
            self.ticks.push(ms_passed);
        }
        fn on_init(&mut self) {
            self.inits += 1;
        }
        fn on_exit_requested(&mut self) {
            self.exits += 1;
        }
    }

    #[test]
    fn key_event_pairs() {
        assert_eq!(KeyEvent::Down(12).event_type(), EventType::KeyDown);
        assert_eq!(KeyEvent::Down(12).code(), 12);
        assert_eq!(KeyEvent::Up(53).event_type() as u8, 0);
        let start = KeyEvent::Quasimode(QuasimodeTransition::Start);
        assert_eq!((start.event_type() as u8, start.code()), (2, 0));
        assert_eq!(KeyEvent::Quasimode(QuasimodeTransition::Cancel).code(), 2);
    }

    #[test]
    fn notifications_map_to_key_events() {
        assert_eq!(
            KeyEvent::from_notification(&Notification::KeyUp {
                keycode: 7,
                chars: "x".into()
            }),
            Some(KeyEvent::Up(7))
        );
        assert_eq!(
            KeyEvent::from_notification(&Notification::QuasimodeEnd),
            Some(KeyEvent::Quasimode(QuasimodeTransition::End))
        );
        assert_eq!(KeyEvent::from_notification(&Notification::SomeKey), None);
    }

    #[test]
    fn default_hooks_are_noops() {
        struct Nothing;
        impl InputHandler for Nothing {}
        let mut handler = Nothing;
        dispatch_to(&mut handler, 10, Dispatch::Tick);
        dispatch_to(&mut handler, 10, Dispatch::ExitRequested);
        dispatch_to(
            &mut handler,
            10,
            Dispatch::Notification(Notification::SomeKey),
        );
        handler.on_mouse_move(1, 2);
        handler.on_some_mouse_button();
    }

    #[test]
    fn quasimode_slots_start_from_config_and_are_settable() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(&dir);
        cfg.quasimode_keys = QuasimodeKeys {
            start: 57,
            end: 58,
            cancel: 53,
        };
        let mut manager = InputManager::new(
            cfg,
            Box::new(ChannelLoop::new()),
            Box::new(FakeProcesses::default()),
        );
        assert_eq!(manager.quasimode_keycode(QuasimodeSlot::Start), 57);
        assert_eq!(manager.quasimode_keycode(QuasimodeSlot::End), 58);
        assert_eq!(manager.quasimode_keycode(QuasimodeSlot::Cancel), 53);

        manager.set_quasimode_keycode(QuasimodeSlot::End, 12);
        assert_eq!(manager.quasimode_keycode(QuasimodeSlot::End), 12);
        assert_eq!(manager.quasimode_keycode(QuasimodeSlot::Start), 57);
    }

    #[test]
    fn unwired_features_are_recorded_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = InputManager::new(
            config(&dir),
            Box::new(ChannelLoop::new()),
            Box::new(FakeProcesses::default()),
        );
        manager.enable_mouse_events(true);
        manager.set_modality(true);
        manager.set_caps_lock_mode(true);
        assert!(manager.mouse_events_enabled());
        assert!(manager.is_modal());
        assert!(manager.caps_lock_mode());
        for feature in [Feature::MouseEvents, Feature::Modality, Feature::CapsLockMode] {
            assert!(!manager.supports(feature));
        }
    }

    /// Writes notifications from `on_init` and stops once `someKey` arrives.
    struct Scripted {
        path: PathBuf,
        proxy: LoopProxy,
        client: Option<UnixStream>,
        recorder: Recorder,
    }

    impl InputHandler for Scripted {
        fn on_init(&mut self) {
            self.recorder.on_init();
            let mut client = UnixStream::connect(&self.path).unwrap();
            client
                .write_all(b"keyDown 0 a\nkeyUp 0 a\nquasimodeStart\nquasimodeCancel\nsomeKey\n")
                .unwrap();
            self.client = Some(client);
            self.proxy.request_exit();
        }
        fn on_keypress(&mut self, event: KeyEvent) {
            self.recorder.on_keypress(event);
        }
        fn on_some_key(&mut self) {
            self.recorder.on_some_key();
            self.proxy.stop();
        }
        fn on_tick(&mut self, ms_passed: u64) {
            self.recorder.on_tick(ms_passed);
            // Give up rather than hang if the listener never delivers.
            if self.recorder.ticks.len() > 2_500 {
                self.proxy.stop();
            }
        }
        fn on_exit_requested(&mut self) {
            self.recorder.on_exit_requested();
        }
    }

    #[test]
    fn run_delivers_listener_notifications_on_loop_thread() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProcesses::default();
        let mut manager = InputManager::new(
            config(&dir),
            Box::new(ChannelLoop::new()),
            Box::new(fake.clone()),
        );
        let mut handler = Scripted {
            path: manager.listener_path(),
            proxy: manager.proxy(),
            client: None,
            recorder: Recorder::default(),
        };

        manager.run(&mut handler).unwrap();

        let rec = &handler.recorder;
        assert_eq!(rec.inits, 1);
        assert_eq!(rec.exits, 1);
        assert_eq!(
            rec.keys,
            vec![
                KeyEvent::Down(0),
                KeyEvent::Up(0),
                KeyEvent::Quasimode(QuasimodeTransition::Start),
                KeyEvent::Quasimode(QuasimodeTransition::Cancel),
            ]
        );
        assert_eq!(rec.some_keys, 1);
        assert!(rec.ticks.iter().all(|&ms| ms == 2));

        // Helper launched once and interrupted on exit; listener unregistered.
        let state = fake.0.borrow();
        assert_eq!(state.spawned, vec![PathBuf::from("EnsoKeyNotifier")]);
        assert_eq!(state.signals.len(), 1);
        assert!(state.live.is_empty());
        assert!(!manager.listener_path().exists());
    }

    #[test]
    fn run_fails_before_init_when_helper_cannot_launch() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeProcesses::default();
        {
            let mut state = fake.0.borrow_mut();
            state.missing.insert(PathBuf::from("EnsoKeyNotifier"));
            state
                .missing
                .insert(PathBuf::from("/opt/launcher/bin/EnsoKeyNotifier"));
        }
        let mut manager = InputManager::new(
            config(&dir),
            Box::new(ChannelLoop::new()),
            Box::new(fake),
        );
        let mut recorder = Recorder::default();
        let err = manager.run(&mut recorder).unwrap_err();
        assert!(matches!(err, PlatformError::HelperLaunch { .. }));
        assert_eq!(recorder.inits, 0);
        assert!(!manager.listener_path().exists());
    }

    #[test]
    fn stop_before_run_exits_after_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = InputManager::new(
            config(&dir),
            Box::new(ChannelLoop::new()),
            Box::new(FakeProcesses::default()),
        );
        manager.stop();
        let mut recorder = Recorder::default();
        manager.run(&mut recorder).unwrap();
        assert_eq!(recorder.inits, 1);
        assert!(recorder.keys.is_empty());
    }

    #[test]
    fn interface_builds_manager_from_factory() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputInterface::new(config(&dir), channel_loop);
        let manager = input.input_manager().unwrap();
        assert_eq!(
            manager.listener_path(),
            dir.path().join("ensoKeyListener.sock")
        );
    }
}
