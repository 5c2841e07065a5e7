//! Configuration management for Phyllo
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It covers the initial window geometry, the renderer
//! (sample count, colours, pixel format, compute backend) and the input
//! bindings that quit the client and commit anchors.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration struct containing all Phyllo settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PhylloConfig {
    /// Initial window geometry and identity
    #[serde(default)]
    pub window: WindowConfig,

    /// Spiral rendering settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Quit key and commit button
    #[serde(default)]
    pub input: InputConfig,
}

/// Window configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Width of the framebuffer before the compositor suggests a size (pixels)
    pub width: u32,

    /// Height of the framebuffer before the compositor suggests a size (pixels)
    pub height: u32,

    /// Toplevel title
    pub title: String,

    /// Toplevel application id
    pub app_id: String,
}

/// Shared-memory pixel layout
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit pixels with an ignored padding byte
    #[default]
    Xrgb8888,
    /// 32-bit pixels with alpha
    Argb8888,
}

/// Where the per-pixel kernels execute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// Band-parallel worker threads
    #[default]
    Cpu,
    /// wgpu compute pipelines (requires the `gpu-compute` feature)
    Gpu,
}

/// Rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Spiral samples painted around every anchor
    pub samples: u32,

    /// Clear colour (hex: #RRGGBB or #AARRGGBB)
    pub background: String,

    /// Spiral colour at full intensity (hex: #RRGGBB or #AARRGGBB)
    pub foreground: String,

    /// Pixel format of the shm buffers
    pub pixel_format: PixelFormat,

    /// Compute backend for the pixel kernels
    pub compute: ComputeBackend,

    /// CPU worker count (0 = available parallelism)
    pub workers: usize,
}

/// Input configuration (Linux input-event codes)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Key whose release quits the client (KEY_ESC by default)
    pub quit_key: u32,

    /// Pointer button whose release commits the current anchor (BTN_RIGHT by default)
    pub commit_button: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 960,
            title: "phyllo".to_string(),
            app_id: "phyllo".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            samples: 256 * 256,
            background: "#000000".to_string(),
            foreground: "#FFFFFF".to_string(),
            pixel_format: PixelFormat::Xrgb8888,
            compute: ComputeBackend::Cpu,
            workers: 0,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            quit_key: 1,
            commit_button: 0x111,
        }
    }
}

/// Parse a `#RRGGBB` or `#AARRGGBB` colour into a packed ARGB value.
///
/// Six-digit colours are fully opaque.
pub fn parse_color(color: &str) -> Result<u32> {
    let hex = color
        .strip_prefix('#')
        .with_context(|| format!("Colour must start with '#': {}", color))?;

    let value = u32::from_str_radix(hex, 16)
        .with_context(|| format!("Colour is not hexadecimal: {}", color))?;

    match hex.len() {
        6 => Ok(0xff00_0000 | value),
        8 => Ok(value),
        _ => anyhow::bail!("Colour must be #RRGGBB or #AARRGGBB: {}", color),
    }
}

impl PhylloConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let rest = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(rest)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: PhylloConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            anyhow::bail!(
                "Invalid window size {}x{}: both dimensions must be non-zero",
                self.window.width,
                self.window.height
            );
        }

        if self.render.samples == 0 {
            anyhow::bail!("Invalid samples: must be at least 1");
        }

        parse_color(&self.render.background).context("Invalid background colour")?;
        parse_color(&self.render.foreground).context("Invalid foreground colour")?;

        if self.render.compute == ComputeBackend::Gpu && !cfg!(feature = "gpu-compute") {
            anyhow::bail!("The gpu compute backend requires building with --features gpu-compute");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
