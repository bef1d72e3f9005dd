//! Pool keys and the shared crystal geometry/material resources.

use std::f32::consts::TAU;

use crystal_math::{Aabb, BoundingSphere};
use glam::Vec3;
use serde::Serialize;

/// Geometry pool key: category plus quantized size.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GeometryKey {
    pub category: String,
    /// Size expressed in multiples of the size quantum (at least 1).
    pub size_bucket: u32,
}

impl GeometryKey {
    pub fn quantized(category: &str, size: f32, quantum: f32) -> Self {
        let bucket = if size.is_finite() && quantum > 0.0 {
            (size / quantum).round().max(1.0) as u32
        } else {
            1
        };
        Self {
            category: category.to_string(),
            size_bucket: bucket,
        }
    }

    /// The size this key's geometry is built at.
    pub fn size(&self, quantum: f32) -> f32 {
        self.size_bucket as f32 * quantum
    }
}

/// Material pool key: category, 8-bit color, and importance bucket.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MaterialKey {
    pub category: String,
    pub color: [u8; 3],
    pub importance_bucket: u8,
}

impl MaterialKey {
    pub fn quantized(category: &str, color: [f32; 3], importance: f32, buckets: u8) -> Self {
        let buckets = buckets.max(1);
        let importance = if importance.is_finite() {
            importance.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            category: category.to_string(),
            color: color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8),
            importance_bucket: (importance * f32::from(buckets - 1)).round() as u8,
        }
    }
}

/// Key of an instanced batch: everything sharing it is drawn in one call.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BatchKey {
    pub geometry: GeometryKey,
    pub material: MaterialKey,
}

/// CPU-side crystal mesh: a bipyramid with `sides` faces around its waist.
#[derive(Clone, Debug)]
pub struct CrystalGeometry {
    pub key: GeometryKey,
    /// Tip-to-center height the mesh was built at.
    pub size: f32,
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
    pub bounding_sphere: BoundingSphere,
}

impl CrystalGeometry {
    /// Build a bipyramid whose tips sit at `±size` and whose waist radius is `size / 2`.
    pub fn bipyramid(key: GeometryKey, size: f32, sides: u32) -> Self {
        let sides = sides.max(3);
        let waist = size * 0.5;
        let mut positions = Vec::with_capacity(sides as usize + 2);
        positions.push([0.0, size, 0.0]);
        positions.push([0.0, -size, 0.0]);
        for i in 0..sides {
            let angle = i as f32 / sides as f32 * TAU;
            positions.push([waist * angle.cos(), 0.0, waist * angle.sin()]);
        }

        let mut indices = Vec::with_capacity(sides as usize * 6);
        for i in 0..sides {
            let a = 2 + i;
            let b = 2 + (i + 1) % sides;
            indices.extend_from_slice(&[0, b, a]);
            indices.extend_from_slice(&[1, a, b]);
        }

        let bounds = Aabb::from_points(positions.iter().map(|p| Vec3::from_array(*p)))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
        Self {
            key,
            size,
            positions,
            indices,
            bounds,
            bounding_sphere: BoundingSphere::new(Vec3::ZERO, size.max(waist)),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Approximate GPU footprint of vertex and index data, in bytes.
    pub fn byte_size(&self) -> usize {
        self.positions.len() * std::mem::size_of::<[f32; 3]>()
            + self.indices.len() * std::mem::size_of::<u32>()
    }
}

/// Shared crystal material.
#[derive(Clone, Debug, PartialEq)]
pub struct CrystalMaterial {
    pub key: MaterialKey,
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub opacity: f32,
}

impl CrystalMaterial {
    /// More important crystals glow brighter.
    pub fn from_key(key: MaterialKey, buckets: u8) -> Self {
        let rgb = key.color.map(|c| f32::from(c) / 255.0);
        let level = if buckets > 1 {
            f32::from(key.importance_bucket) / f32::from(buckets - 1)
        } else {
            1.0
        };
        Self {
            base_color: [rgb[0], rgb[1], rgb[2], 1.0],
            emissive: rgb.map(|c| c * (0.2 + 0.8 * level)),
            emissive_intensity: 0.3 + 0.7 * level,
            opacity: 0.85,
            key,
        }
    }
}
