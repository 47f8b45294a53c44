//! Owner table linking native views back to their overlay.
//!
//! A native view only keeps an `OverlayKey`. When it is asked to draw it
//! looks the key up here; a key whose overlay has been dropped, or whose
//! overlay has no surface yet, simply draws nothing. The table is
//! thread-local: overlays live on the UI thread only.

use std::cell::RefCell;
use std::rc::Rc;

use slotmap::{new_key_type, Key, KeyData, SlotMap};

use super::bridge;
use super::surface::{Surface, SurfaceHandle};

new_key_type! {
    /// Non-owning handle from a native view to its overlay.
    pub struct OverlayKey;
}

impl OverlayKey {
    /// Packs the key into a plain integer for storage in a native object.
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    pub fn from_raw(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

struct Entry {
    max_width: u32,
    max_height: u32,
    surface: Option<SurfaceHandle>,
}

thread_local! {
    static OVERLAYS: RefCell<SlotMap<OverlayKey, Entry>> = RefCell::new(SlotMap::with_key());
}

pub(crate) fn register(max_width: u32, max_height: u32) -> OverlayKey {
    OVERLAYS.with(|table| {
        table.borrow_mut().insert(Entry {
            max_width,
            max_height,
            surface: None,
        })
    })
}

pub(crate) fn unregister(key: OverlayKey) {
    OVERLAYS.with(|table| {
        table.borrow_mut().remove(key);
    });
}

/// Returns the overlay's surface, allocating it at the maximum size on the
/// first call. `None` if the overlay no longer exists.
pub(crate) fn ensure_surface(key: OverlayKey) -> Option<SurfaceHandle> {
    OVERLAYS.with(|table| {
        let mut table = table.borrow_mut();
        let entry = table.get_mut(key)?;
        let (width, height) = (entry.max_width, entry.max_height);
        let surface = entry.surface.get_or_insert_with(|| {
            log::debug!("graphics: allocating {width}x{height} surface");
            Rc::new(RefCell::new(Surface::new(width, height)))
        });
        Some(surface.clone())
    })
}

pub fn surface(key: OverlayKey) -> Option<SurfaceHandle> {
    OVERLAYS.with(|table| table.borrow().get(key).and_then(|e| e.surface.clone()))
}

pub fn is_live(key: OverlayKey) -> bool {
    OVERLAYS.with(|table| table.borrow().contains_key(key))
}

/// Renders the overlay's surface into a native RGBA bitmap.
///
/// Returns `false` when there is nothing to draw: the overlay is gone, it
/// has no surface yet, or the surface is currently borrowed for drawing.
pub fn compose(key: OverlayKey, dst: &mut [u8], dst_stride: usize) -> bool {
    let Some(surface) = surface(key) else {
        return false;
    };
    let Ok(surface) = surface.try_borrow() else {
        log::debug!("graphics: surface busy, skipping redraw");
        return false;
    };
    bridge::argb32_to_rgba(&surface, dst, dst_stride);
    true
}
