//! In-memory window server.
//!
//! Records every native call per window and composites redraws into an
//! RGBA image the size of the overlay's backing store, exactly as a native
//! view would. Used by the headless platform and by tests.

use std::cell::RefCell;
use std::rc::Rc;

use super::bridge::BYTES_PER_PIXEL;
use super::registry::{self, OverlayKey};
use super::{Frame, NativeWindow, WindowServer};
use crate::error::PlatformError;

/// One native call observed by a headless window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowCall {
    Frame(Frame),
    Alpha(f64),
    OrderFront,
    Redraw,
}

struct WindowRecord {
    key: OverlayKey,
    created: Frame,
    calls: Vec<WindowCall>,
    stride: usize,
    image: Vec<u8>,
}

type Records = Rc<RefCell<Vec<WindowRecord>>>;

pub struct HeadlessServer {
    desktop: (u32, u32),
    fail_creation: bool,
    records: Records,
    attempted: RefCell<Vec<OverlayKey>>,
}

impl HeadlessServer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            desktop: (width, height),
            fail_creation: false,
            records: Rc::default(),
            attempted: RefCell::default(),
        }
    }

    /// A server whose window creation always fails.
    pub fn failing(width: u32, height: u32) -> Self {
        Self {
            fail_creation: true,
            ..Self::new(width, height)
        }
    }

    /// Calls made on the window drawing `key`, oldest first.
    pub fn calls(&self, key: OverlayKey) -> Vec<WindowCall> {
        self.records
            .borrow()
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.calls.clone())
            .unwrap_or_default()
    }

    /// Initial frames of every window created so far.
    pub fn created_frames(&self) -> Vec<Frame> {
        self.records.borrow().iter().map(|r| r.created).collect()
    }

    /// Last composited image of the window drawing `key`.
    pub fn image(&self, key: OverlayKey) -> Option<Vec<u8>> {
        self.records
            .borrow()
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.image.clone())
    }

    /// Keys passed to `create_window`, including failed attempts.
    pub fn attempted_keys(&self) -> Vec<OverlayKey> {
        self.attempted.borrow().clone()
    }
}

impl WindowServer for HeadlessServer {
    fn desktop_size(&self) -> (u32, u32) {
        self.desktop
    }

    fn create_window(
        &self,
        key: OverlayKey,
        frame: Frame,
        max_size: (u32, u32),
    ) -> Result<Box<dyn NativeWindow>, PlatformError> {
        self.attempted.borrow_mut().push(key);
        if self.fail_creation {
            return Err(PlatformError::ResourceCreation {
                resource: "overlay window",
                reason: "headless server configured to fail".into(),
            });
        }

        let stride = max_size.0 as usize * BYTES_PER_PIXEL;
        let mut records = self.records.borrow_mut();
        records.push(WindowRecord {
            key,
            created: frame,
            calls: Vec::new(),
            stride,
            image: vec![0; stride * max_size.1 as usize],
        });
        Ok(Box::new(HeadlessWindow {
            index: records.len() - 1,
            records: self.records.clone(),
        }))
    }
}

struct HeadlessWindow {
    index: usize,
    records: Records,
}

impl HeadlessWindow {
    fn record(&self, call: WindowCall) {
        self.records.borrow_mut()[self.index].calls.push(call);
    }
}

impl NativeWindow for HeadlessWindow {
    fn set_frame(&mut self, frame: Frame) {
        self.record(WindowCall::Frame(frame));
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.record(WindowCall::Alpha(alpha));
    }

    fn order_front(&mut self) {
        self.record(WindowCall::OrderFront);
    }

    fn request_redraw(&mut self) {
        self.record(WindowCall::Redraw);
        let mut records = self.records.borrow_mut();
        let record = &mut records[self.index];
        registry::compose(record.key, &mut record.image, record.stride);
    }
}
