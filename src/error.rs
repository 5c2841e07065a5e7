//! Error types shared across the client
//!
//! Setup failures are fatal and bubble up to `main`, which prints a single
//! diagnostic line and exits non-zero. Buffer and render failures have their
//! own enums so callers can decide between failing fast and keeping stale
//! state (see `window::Window::resize`).

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use wayland_client::{ConnectError, DispatchError};

/// Failure while creating a shared-memory framebuffer
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("XDG_RUNTIME_DIR is not set")]
    RuntimeDirUnset,

    #[error("XDG_RUNTIME_DIR does not name an existing directory: {0}")]
    RuntimeDirMissing(PathBuf),

    #[error("runtime directory path is too long ({len} bytes with the temp file suffix)")]
    PathTooLong { len: usize },

    #[error("framebuffer dimensions must be non-zero (got {width}x{height})")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("framebuffer {width}x{height} exceeds the shm pool size limit")]
    TooLarge { width: u32, height: u32 },

    #[error("failed to create shared memory file: {0}")]
    CreateFile(#[source] io::Error),

    #[error("failed to resize shared memory file: {0}")]
    Truncate(#[source] io::Error),

    #[error("failed to map shared memory file: {0}")]
    Map(#[source] io::Error),
}

/// Failure inside a compute queue
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("frame target holds {actual} pixels, expected {expected}")]
    TargetMismatch { expected: usize, actual: usize },

    #[error("invalid colour: {0}")]
    InvalidColor(String),

    #[error("no anchors to render around")]
    NoAnchors,

    #[error("compute backend `{0}` is not available in this build")]
    BackendUnavailable(String),

    #[error("GPU compute failed: {0}")]
    Gpu(String),
}

/// Fatal failure while bringing the window up or keeping it alive
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to connect to the Wayland display: {0}")]
    Connect(#[from] ConnectError),

    #[error("Wayland roundtrip failed: {0}")]
    Roundtrip(#[source] DispatchError),

    #[error("frame rendering failed: {0}")]
    Frame(#[source] RenderError),

    #[error("required global `{0}` was not advertised by the compositor")]
    MissingGlobal(&'static str),

    #[error("required global `{0}` was removed by the compositor")]
    GlobalRemoved(&'static str),

    #[error("cannot create shm buffer: {0}")]
    Buffer(#[from] ShmError),

    #[error("cannot start renderer: {0}")]
    Render(#[from] RenderError),
}
