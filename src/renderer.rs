//! Renderer boundary
//!
//! The character-grid renderer (xterm-style) lives outside this crate. The
//! core pushes output bytes and display options through this trait and never
//! assumes anything about how they are drawn.

/// A single renderer option, applied live without reconnecting.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererOption {
    Theme(String),
    FontSize(u16),
    FontFamily(String),
    FontWeight(u16),
    CursorStyle(String),
    CursorBlink(bool),
    LineHeight(f64),
    AutoCopy(bool),
}

/// Live renderer handle owned by the UI layer.
pub trait Renderer: Send + Sync + 'static {
    /// Apply one chunk of terminal output, in arrival order.
    fn apply_output(&self, data: &[u8]);

    /// Apply a display option to the live terminal.
    fn set_option(&self, option: RendererOption);

    /// Schedule a re-fit/resize pass on the next frame (geometry changed).
    fn schedule_refit(&self);

    /// Refocus the terminal (after unlock recovery or reconnect).
    fn focus(&self);
}
