//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Crystal field simulation arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "crystals", about = "Headless crystal field rendering optimizer")]
pub struct CliArgs {
    /// Number of crystals to generate.
    #[arg(long)]
    pub crystals: Option<usize>,

    /// Number of frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Target frame rate for auto-tuning.
    #[arg(long)]
    pub target_fps: Option<f32>,

    /// Initial culling draw distance.
    #[arg(long)]
    pub max_distance: Option<f32>,

    /// Disable frustum culling.
    #[arg(long)]
    pub no_culling: bool,

    /// Disable instanced rendering.
    #[arg(long)]
    pub no_instancing: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write the final report as JSON to this file.
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(n) = args.crystals {
            self.simulation.crystal_count = n;
        }
        if let Some(frames) = args.frames {
            self.simulation.frames = frames;
        }
        if let Some(fps) = args.target_fps {
            self.optimizer.target_fps = fps;
        }
        if let Some(d) = args.max_distance {
            self.culling.max_distance = d;
        }
        if args.no_culling {
            self.optimizer.enable_frustum_culling = false;
        }
        if args.no_instancing {
            self.optimizer.enable_instanced_rendering = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(ref path) = args.report_json {
            self.debug.report_json = Some(path.display().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            crystals: None,
            frames: None,
            target_fps: None,
            max_distance: None,
            no_culling: false,
            no_instancing: false,
            log_level: None,
            report_json: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            crystals: Some(5000),
            target_fps: Some(120.0),
            no_culling: true,
            ..empty_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.simulation.crystal_count, 5000);
        assert_eq!(config.optimizer.target_fps, 120.0);
        assert!(!config.optimizer.enable_frustum_culling);
        // Non-overridden fields retain defaults
        assert!(config.optimizer.enable_instanced_rendering);
        assert_eq!(config.culling.max_distance, 2500.0);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "crystals",
            "--crystals",
            "10",
            "--no-instancing",
            "--report-json",
            "out.json",
        ]);
        assert_eq!(args.crystals, Some(10));
        assert!(args.no_instancing);
        assert_eq!(args.report_json, Some(PathBuf::from("out.json")));
    }
}
