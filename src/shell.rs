//! Toplevel configure/acknowledge handshake
//!
//! ```text
//!  Unconfigured ──initial commit──► AwaitingAck ──configure+ack──► Configured
//!        │                               │                            │
//!        └───────────────close───────────┴────────────close───────────┴──► Closed
//! ```
//!
//! Only a `Configured` surface may have buffers attached. Later configures
//! keep it `Configured` and may carry a new size. `Closed` is terminal.

use log::debug;

/// Where the surface is in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Unconfigured,
    AwaitingAck,
    Configured,
    Closed,
}

/// Surface size in buffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Outcome of an acknowledged configure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acked {
    pub serial: u32,
    /// New framebuffer size, when the compositor asked for a different one
    pub resize: Option<Size>,
}

/// Handshake state of one xdg toplevel
#[derive(Debug, Clone)]
pub struct ShellSurface {
    state: ShellState,
    size: Size,
    pending: Option<Size>,
}

impl ShellSurface {
    pub fn new(initial: Size) -> Self {
        Self {
            state: ShellState::Unconfigured,
            size: initial,
            pending: None,
        }
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn is_configured(&self) -> bool {
        self.state == ShellState::Configured
    }

    pub fn is_closed(&self) -> bool {
        self.state == ShellState::Closed
    }

    /// The bufferless first commit has been sent
    pub fn initial_commit(&mut self) {
        if self.state == ShellState::Unconfigured {
            self.state = ShellState::AwaitingAck;
        }
    }

    /// Toplevel suggested a size; `0×0` (or any zero side) means no preference
    pub fn suggest_size(&mut self, width: i32, height: i32) {
        if width > 0 && height > 0 {
            self.pending = Some(Size::new(width as u32, height as u32));
        }
    }

    /// Surface configure arrived. Returns what to acknowledge, or `None` once
    /// closed.
    pub fn configure(&mut self, serial: u32) -> Option<Acked> {
        if self.state == ShellState::Closed {
            return None;
        }

        let resize = self.pending.take().filter(|&size| size != self.size);
        if let Some(size) = resize {
            debug!(
                "Configure {} resizes {}x{} -> {}x{}",
                serial, self.size.width, self.size.height, size.width, size.height
            );
        }
        self.state = ShellState::Configured;

        Some(Acked { serial, resize })
    }

    /// The framebuffer now has this size
    pub fn resized(&mut self, size: Size) {
        self.size = size;
    }

    pub fn close(&mut self) {
        self.state = ShellState::Closed;
    }
}
