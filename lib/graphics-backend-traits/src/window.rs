use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Keyboard/mouse/window events the core forwards to UI input and nothing
/// else — the core itself never branches on a specific key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    Resized { width: u32, height: u32 },
    CloseRequested,
    Key { code: u32, pressed: bool },
    MouseButton { button: u8, pressed: bool },
    MouseMoved { x: f64, y: f64 },
    Scrolled { dx: f64, dy: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Normal,
    Hidden,
    Locked,
}

/// The windowing layer contract (§6 "Window layer"). Consumed by swapchain
/// creation (needs the raw handles), renderer resize (needs the pixel
/// size), and UI input.
pub trait Window: HasWindowHandle + HasDisplayHandle {
    /// Current window size in physical pixels.
    fn pixel_size(&self) -> (u32, u32);

    fn aspect_ratio(&self) -> f32 {
        let (w, h) = self.pixel_size();
        if h == 0 {
            1.0
        } else {
            w as f32 / h as f32
        }
    }

    fn set_cursor_mode(&mut self, mode: CursorMode);

    /// Pump the platform event loop, draining events produced since the
    /// last call.
    fn poll_events(&mut self) -> Vec<WindowEvent>;
}

/// A headless window used by tests and by `app`'s scaffold mode. Reports a
/// fixed size and never produces a live `raw-window-handle`; surface
/// creation against it is expected to be skipped by the caller.
#[cfg(any(test, feature = "test-utils"))]
pub struct HeadlessWindow {
    pub width: u32,
    pub height: u32,
    pending: Vec<WindowEvent>,
}

#[cfg(any(test, feature = "test-utils"))]
impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        HeadlessWindow { width, height, pending: Vec::new() }
    }

    pub fn push_event(&mut self, event: WindowEvent) {
        self.pending.push(event);
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Window for HeadlessWindow {
    fn pixel_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_cursor_mode(&mut self, _mode: CursorMode) {}

    fn poll_events(&mut self) -> Vec<WindowEvent> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl HasWindowHandle for HeadlessWindow {
    fn window_handle(
        &self,
    ) -> Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        Err(raw_window_handle::HandleError::NotSupported)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl HasDisplayHandle for HeadlessWindow {
    fn display_handle(
        &self,
    ) -> Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        Err(raw_window_handle::HandleError::NotSupported)
    }
}
