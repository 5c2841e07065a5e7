//! # Phyllo
//!
//! A Wayland client that paints phyllotaxis spirals around the pointer.
//!
//! ## Architecture
//!
//! - `registry`: Global discovery and binding
//! - `shm`: Shared-memory framebuffers in `$XDG_RUNTIME_DIR`
//! - `shell`: xdg-shell configure/acknowledge handshake
//! - `window`: The toplevel surface and its framebuffer
//! - `input`: Keyboard and pointer routing into anchors
//! - `renderer`: The spiral pattern and its CPU/GPU compute queues
//! - `client`: Protocol event handlers
//! - `event_loop`: Setup and the frame loop
//! - `config`: Configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use phyllo::{event_loop, PhylloConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = PhylloConfig::default();
//!     event_loop::run(config)?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod input;
pub mod registry;
pub mod renderer;
pub mod resource;
pub mod shell;
pub mod shm;
pub mod window;

// Re-export main types for easy access
pub use client::PhylloClient;
pub use config::PhylloConfig;
pub use error::{RenderError, SetupError, ShmError};
pub use input::{Anchor, AnchorList, InputRouter};
pub use renderer::{ComputeQueue, CpuQueue, FrameTarget, RenderEngine};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Phyllo
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
