//! Drag-and-drop enter counter
//!
//! Drag enter/leave events fire for every nested element under the drop
//! panel, so a plain boolean flickers while the pointer crosses children.
//! The counter only clears the "dragging" state when it reaches zero or a
//! terminal drop/cancel event arrives.

use std::sync::atomic::{AtomicU32, Ordering};

/// Nested-enter counter backing the drop panel's visual state.
#[derive(Debug, Default)]
pub struct DragCounter {
    depth: AtomicU32,
}

impl DragCounter {
    pub fn new() -> Self {
        Self {
            depth: AtomicU32::new(0),
        }
    }

    /// Pointer entered the panel or one of its children.
    pub fn enter(&self) {
        self.depth.fetch_add(1, Ordering::AcqRel);
    }

    /// Pointer left the panel or one of its children.
    ///
    /// Returns whether a drag is still in progress. Saturates at zero so an
    /// unbalanced leave (missed enter event) cannot wrap around.
    pub fn leave(&self) -> bool {
        let _ = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        self.is_dragging()
    }

    /// Terminal drop or cancel event: clear the state unconditionally.
    pub fn reset(&self) {
        self.depth.store(0, Ordering::Release);
    }

    pub fn is_dragging(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }
}
