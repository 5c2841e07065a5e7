//! # Phyllo - phyllotaxis spirals on a Wayland surface
//!
//! Opens one xdg toplevel and repaints a sunflower-seed spiral around the
//! pointer every frame. Releasing the right mouse button leaves a copy of the
//! spiral behind; releasing Escape quits.

use clap::Parser;
use log::{error, info};
use phyllo::config::ComputeBackend;
use phyllo::{event_loop, PhylloConfig};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "phyllo")]
#[command(about = "Paint phyllotaxis spirals around the pointer on a Wayland surface")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/phyllo/phyllo.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Initial window width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Initial window height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Samples per spiral
    #[arg(short, long)]
    samples: Option<u32>,

    /// Select compute backend: cpu, gpu
    #[arg(long)]
    compute: Option<String>,
}

/// Fold CLI flags over the loaded configuration
fn apply_overrides(cli: &Cli, config: &mut PhylloConfig) -> anyhow::Result<()> {
    if let Some(width) = cli.width {
        config.window.width = width;
    }
    if let Some(height) = cli.height {
        config.window.height = height;
    }
    if let Some(samples) = cli.samples {
        config.render.samples = samples;
    }
    if let Some(compute) = &cli.compute {
        config.render.compute = match compute.as_str() {
            "cpu" => ComputeBackend::Cpu,
            "gpu" => ComputeBackend::Gpu,
            other => anyhow::bail!("Unknown compute backend '{}': expected cpu or gpu", other),
        };
        info!("🎛️ Compute backend selection: {}", compute);
    }
    config.validate()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🌻 Starting Phyllo");
    info!("📄 Version: {}", phyllo::VERSION);

    // Load configuration
    let mut config = match PhylloConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            PhylloConfig::default()
        }
    };

    if let Err(e) = apply_overrides(&cli, &mut config) {
        eprintln!("phyllo: {:#}", e);
        return ExitCode::FAILURE;
    }

    match event_loop::run(config) {
        Ok(()) => {
            info!("✅ Phyllo shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("phyllo: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("phyllo").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.config, "~/.config/phyllo/phyllo.toml");
        assert!(!cli.debug);
        assert!(cli.width.is_none());
        assert!(cli.compute.is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let cli = parse(&["--width", "640", "--height", "480", "-s", "1024", "--compute", "cpu"]);
        let mut config = PhylloConfig::default();
        apply_overrides(&cli, &mut config).unwrap();

        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.render.samples, 1024);
        assert_eq!(config.render.compute, ComputeBackend::Cpu);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let cli = parse(&["--compute", "quantum"]);
        let mut config = PhylloConfig::default();
        assert!(apply_overrides(&cli, &mut config).is_err());
    }

    #[test]
    fn test_zero_width_rejected() {
        let cli = parse(&["--width", "0"]);
        let mut config = PhylloConfig::default();
        assert!(apply_overrides(&cli, &mut config).is_err());
    }
}
