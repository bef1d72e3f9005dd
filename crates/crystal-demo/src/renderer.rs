//! Stand-in renderer: derives counters from what would be drawn and a frame
//! time from a simple cost model, so the optimizer has something to react to.

use crystal_batch::BatchManager;
use crystal_scene::{NodeArena, RenderCounters};
use rand::Rng;

/// Fixed per-frame cost in milliseconds.
const BASE_FRAME_MS: f64 = 4.0;
/// Cost per visible crystal in milliseconds.
const PER_CRYSTAL_MS: f64 = 0.012;
/// Cost per draw call in milliseconds.
const PER_DRAW_CALL_MS: f64 = 0.02;
/// Relative frame time noise.
const JITTER: f64 = 0.1;

/// Counters for one simulated frame.
pub fn counters(arena: &NodeArena, batches: &BatchManager, triangles_per_crystal: u64) -> RenderCounters {
    let stats = batches.stats();
    if stats.instances > 0 {
        RenderCounters {
            draw_calls: stats.draw_calls as u32,
            triangles: stats.triangles,
            geometries: stats.resources.geometries.entries as u32,
            materials: stats.resources.materials.entries as u32,
            programs: 1,
            heap_bytes: None,
        }
    } else {
        let visible = arena.visible_count() as u64;
        RenderCounters {
            draw_calls: visible as u32,
            triangles: visible * triangles_per_crystal,
            geometries: stats.resources.geometries.entries as u32,
            materials: stats.resources.materials.entries as u32,
            programs: 1,
            heap_bytes: None,
        }
    }
}

/// Simulated frame time for the given visible crystal count and draw calls.
pub fn frame_time_ms(visible: usize, draw_calls: u32, rng: &mut impl Rng) -> f64 {
    let cost = BASE_FRAME_MS + visible as f64 * PER_CRYSTAL_MS + f64::from(draw_calls) * PER_DRAW_CALL_MS;
    cost * (1.0 + rng.gen_range(-JITTER..=JITTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_config::BatchConfig;
    use glam::Vec3;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    #[test]
    fn test_more_work_costs_more() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let light = frame_time_ms(100, 10, &mut rng);
        let heavy = frame_time_ms(3000, 3000, &mut rng);
        assert!(heavy > light);
        assert!(light >= BASE_FRAME_MS * (1.0 - JITTER));
    }

    #[test]
    fn test_counters_without_instances_follow_nodes() {
        let mut arena = NodeArena::new();
        arena.spawn_at(Vec3::ZERO, 1.0);
        arena.spawn_at(Vec3::X, 1.0);
        let batches = BatchManager::new(BatchConfig::default());
        let c = counters(&arena, &batches, 12);
        assert_eq!(c.draw_calls, 2);
        assert_eq!(c.triangles, 24);
        assert_eq!(c.heap_bytes, None);
    }
}
