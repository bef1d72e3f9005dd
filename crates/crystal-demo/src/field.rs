//! Seeded crystal field generation.

use crystal_config::SimulationConfig;
use crystal_math::BoundingSphere;
use crystal_scene::{CrystalRecord, NodeArena, NodeBounds, ObjectId};
use glam::{Mat4, Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Spawn `config.crystal_count` crystals uniformly inside a sphere of
/// `config.field_radius`, one scene node each.
pub fn generate(config: &SimulationConfig, arena: &mut NodeArena) -> Vec<CrystalRecord> {
    let mut rng = Xoshiro256StarStar::seed_from_u64(config.seed);
    let categories: Vec<&str> = if config.categories.is_empty() {
        vec!["unknown"]
    } else {
        config.categories.iter().map(String::as_str).collect()
    };

    (0..config.crystal_count)
        .map(|i| {
            let category_index = rng.gen_range(0..categories.len());
            let position = random_in_sphere(&mut rng) * config.field_radius;
            let rotation = Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU));
            let size: f32 = rng.gen_range(0.5..3.0);
            let importance: f32 = rng.r#gen();

            // Unit crystal: tips at +-1, so the local bounding sphere has radius 1.
            let world = Mat4::from_scale_rotation_translation(Vec3::splat(size), rotation, position);
            let node = arena.spawn(world, NodeBounds::sphere(BoundingSphere::new(Vec3::ZERO, 1.0)));

            CrystalRecord {
                id: ObjectId::new(format!("track-{i:05}")),
                node,
                category: categories[category_index].to_string(),
                position,
                rotation,
                size,
                color: category_color(category_index, categories.len()),
                importance,
            }
        })
        .collect()
}

fn random_in_sphere(rng: &mut impl Rng) -> Vec3 {
    loop {
        let p = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if p.length_squared() <= 1.0 {
            return p;
        }
    }
}

/// Evenly spaced, fully saturated hues.
fn category_color(index: usize, count: usize) -> [f32; 3] {
    let hue = index as f32 / count.max(1) as f32 * 6.0;
    let x = 1.0 - (hue % 2.0 - 1.0).abs();
    match hue as u32 {
        0 => [1.0, x, 0.0],
        1 => [x, 1.0, 0.0],
        2 => [0.0, 1.0, x],
        3 => [0.0, x, 1.0],
        4 => [x, 0.0, 1.0],
        _ => [1.0, 0.0, x],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crystal_scene::SceneGraph;

    fn config(count: usize) -> SimulationConfig {
        SimulationConfig {
            crystal_count: count,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_field_is_deterministic() {
        let a = generate(&config(50), &mut NodeArena::new());
        let b = generate(&config(50), &mut NodeArena::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_field_stays_inside_radius() {
        let cfg = config(500);
        let mut arena = NodeArena::new();
        let records = generate(&cfg, &mut arena);
        assert_eq!(arena.len(), 500);
        for r in &records {
            assert!(r.position.length() <= cfg.field_radius + 1e-3);
            assert!(cfg.categories.contains(&r.category));
            assert!(arena.world_matrix(r.node).is_some());
        }
    }

    #[test]
    fn test_category_colors_differ() {
        assert_ne!(category_color(0, 7), category_color(1, 7));
        assert_eq!(category_color(0, 7), [1.0, 0.0, 0.0]);
    }
}
