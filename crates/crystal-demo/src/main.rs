//! Headless crystal field simulation driven through the performance optimizer.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p crystal-demo -- --crystals 5000 --frames 3600`.

mod director;
mod field;
mod renderer;

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use clap::Parser;
use crystal_config::{CliArgs, Config};
use crystal_optimizer::PerformanceOptimizer;
use crystal_scene::{FocusFlags, NodeArena};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{error, info, warn};

use crate::director::{Director, DirectorEvent};

/// Frame at which the scripted focus transition starts, as a share of the run.
const FOCUS_START_FRACTION: u32 = 3;
/// Length of the scripted focus transition in frames.
const FOCUS_FRAMES: u32 = 120;
/// Frames between progress log lines.
const PROGRESS_EVERY: u32 = 600;

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("crystals")));

    let mut config = match &config_dir {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);
    let config = config.sanitized();

    let log_dir = config
        .debug
        .log_dir
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| config_dir.as_ref().map(|dir| dir.join("logs")));
    crystal_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    run(&config);
}

fn run(config: &Config) {
    let mut arena = NodeArena::new();
    let records = field::generate(&config.simulation, &mut arena);
    let Some(focus_target) = records.iter().max_by(|a, b| a.importance.total_cmp(&b.importance)) else {
        warn!("empty crystal field, nothing to simulate");
        return;
    };

    let flags = Rc::new(FocusFlags::new());
    let mut optimizer = PerformanceOptimizer::new(config, flags.clone());

    let setup = Instant::now();
    optimizer.initialize_optimization(&records, &mut arena);
    info!(
        crystals = records.len(),
        elapsed_ms = setup.elapsed().as_secs_f64() * 1000.0,
        "crystal field ready"
    );

    let frames = config.simulation.frames;
    let mut director = Director::new(
        config.simulation.orbit_radius,
        focus_target.id.clone(),
        focus_target.position,
        frames / FOCUS_START_FRACTION,
        FOCUS_FRAMES,
    );
    let mut rng = Xoshiro256StarStar::seed_from_u64(config.simulation.seed.wrapping_add(1));
    let triangles_per_crystal = u64::from(config.batch.crystal_sides) * 2;

    let mut delta_ms = 1000.0 / f64::from(config.optimizer.target_fps);
    let mut time_s = 0.0f64;
    let mut uploaded_slots = 0usize;
    let wall = Instant::now();

    for frame in 0..frames {
        let (camera, event) = director.step(frame, time_s as f32, &flags);
        match event {
            Some(DirectorEvent::FocusStarted(id)) => {
                info!(%id, frame, "focus transition started");
                optimizer.update_track_highlight(&id, true);
            }
            Some(DirectorEvent::FocusEnded(id)) => {
                info!(%id, frame, "focus transition ended");
                optimizer.update_track_highlight(&id, false);
                optimizer.mark_focus_end();
            }
            None => {}
        }

        let counters = renderer::counters(&arena, optimizer.batches(), triangles_per_crystal);
        optimizer.update(delta_ms, &camera, &mut arena, &counters);
        uploaded_slots += optimizer
            .batches_mut()
            .drain_dirty()
            .iter()
            .map(|range| range.slots.len())
            .sum::<usize>();

        let batch_stats = optimizer.batches().stats();
        let visible = if batch_stats.instances > 0 {
            batch_stats.visible_instances
        } else {
            arena.visible_count()
        };
        delta_ms = renderer::frame_time_ms(visible, counters.draw_calls, &mut rng);
        time_s += delta_ms / 1000.0;

        if frame % PROGRESS_EVERY == 0 {
            let stats = optimizer.get_stats();
            info!(
                frame,
                fps = ?stats.fps,
                visible = stats.visible_objects,
                culled = stats.culled_objects,
                max_distance = stats.max_distance,
                guarded = stats.focus_guarded,
                "progress"
            );
        }
    }

    info!(
        frames,
        simulated_s = time_s,
        wall_ms = wall.elapsed().as_secs_f64() * 1000.0,
        uploaded_slots,
        "simulation finished"
    );
    println!("{}", optimizer.generate_report());

    if let Some(path) = &config.debug.report_json
        && let Err(e) = optimizer.export_report_json(Path::new(path))
    {
        error!("Failed to export report: {e}");
    }
    optimizer.dispose(&mut arena);
}
