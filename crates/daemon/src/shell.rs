// Window host boundary. The event loop drives windows only through
// `WindowHost`; whatever the toolkit reports back comes in as `ShellEvent`s.

use tracing::debug;

use crate::store::metadata::Geometry;

pub type WindowId = u64;

/// Toolkit side of the coordinator. Called only from the event loop.
pub trait WindowHost: Send {
    /// A new, hidden top-level window for one editor.
    fn create_window(&mut self) -> WindowId;

    /// Socket an editor can embed itself into, if the toolkit offers one.
    fn embed_socket(&self, _window: WindowId) -> Option<u64> {
        None
    }

    fn set_title(&mut self, window: WindowId, title: &str);

    fn apply_geometry(&mut self, window: WindowId, geometry: Geometry);

    /// Show and raise `window`. `timestamp` is the startup-notification
    /// time, 0 when unknown.
    fn present(&mut self, window: WindowId, timestamp: u32);

    fn destroy(&mut self, window: WindowId);

    /// Show the main (note list / search) window.
    fn present_main(&mut self, timestamp: u32);
}

/// Toolkit input to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// The window was moved or resized.
    Configured { window: WindowId, geometry: Geometry },
    /// The user asked to close the window.
    CloseRequested { window: WindowId },
    /// An editor embedded itself into the window.
    EmbedAttached { window: WindowId },
}

/// Host without a toolkit: editors run as their own top-level windows.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    next_window: WindowId,
}

impl WindowHost for HeadlessHost {
    fn create_window(&mut self) -> WindowId {
        self.next_window += 1;
        debug!(window = self.next_window, "window created");
        self.next_window
    }

    fn set_title(&mut self, window: WindowId, title: &str) {
        debug!(window, title, "window title");
    }

    fn apply_geometry(&mut self, window: WindowId, geometry: Geometry) {
        debug!(window, ?geometry, "window geometry");
    }

    fn present(&mut self, window: WindowId, timestamp: u32) {
        debug!(window, timestamp, "window presented");
    }

    fn destroy(&mut self, window: WindowId) {
        debug!(window, "window destroyed");
    }

    fn present_main(&mut self, timestamp: u32) {
        debug!(timestamp, "main window presented");
    }
}
