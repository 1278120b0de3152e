//! Cursor picking against world-space bounding boxes.

use crate::scene::Aabb;
use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or(Vec3::NEG_Z),
        }
    }
}

/// Distance along the ray to the box entry point (0 if the origin is inside).
pub fn ray_aabb(ray: &Ray, bounds: &Aabb) -> Option<f32> {
    if bounds.is_empty() {
        return None;
    }
    let mut t_min = 0.0_f32;
    let mut t_max = f32::INFINITY;
    for axis in 0..3 {
        let origin = ray.origin[axis];
        let dir = ray.direction[axis];
        let (lo, hi) = (bounds.min[axis], bounds.max[axis]);
        // Parallel to this slab: inside it or a miss.
        if dir.abs() < 1e-8 {
            if origin < lo || origin > hi {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir;
        let (mut t0, mut t1) = ((lo - origin) * inv, (hi - origin) * inv);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

/// Closest candidate hit by the ray.
pub fn pick_nearest<K>(ray: &Ray, candidates: impl IntoIterator<Item = (K, Aabb)>) -> Option<(K, f32)> {
    candidates
        .into_iter()
        .filter_map(|(key, bounds)| ray_aabb(ray, &bounds).map(|t| (key, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
