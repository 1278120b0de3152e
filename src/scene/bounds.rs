use super::ModelScene;
use glam::{Mat4, Vec3};

/// Axis-aligned bounding box. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand(&mut self, point: Vec3) {
        // One NaN vertex would otherwise poison the whole box.
        if !point.is_finite() {
            return;
        }
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// World-space bounds of every vertex the model draws.
pub fn model_bounds(model: &ModelScene) -> Aabb {
    bounds_with_placement(model, model.placement())
}

/// Bounds of the model's content with root and pivot ignored.
pub fn content_bounds(model: &ModelScene) -> Aabb {
    bounds_with_placement(model, Mat4::IDENTITY)
}

fn bounds_with_placement(model: &ModelScene, placement: Mat4) -> Aabb {
    let globals = model.node_globals();
    let mut bounds = Aabb::EMPTY;
    for instance in model.surface_instances() {
        // Posed vertices are already in model space.
        let world = if instance.skinned {
            placement
        } else {
            placement * globals[instance.node]
        };
        for group in &model.surfaces[instance.surface].groups {
            let positions = group
                .pose
                .as_ref()
                .map(|pose| pose.positions.as_slice())
                .unwrap_or(group.positions.as_slice());
            for position in positions {
                bounds.expand(world.transform_point3(Vec3::from(*position)));
            }
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_reports_zero_size() {
        let bounds = Aabb::EMPTY;
        assert!(bounds.is_empty());
        assert_eq!(bounds.size(), Vec3::ZERO);
        assert_eq!(bounds.max_dimension(), 0.0);
        assert_eq!(bounds.center(), Vec3::ZERO);
    }

    #[test]
    fn expand_ignores_non_finite_points() {
        let mut bounds = Aabb::EMPTY;
        bounds.expand(Vec3::new(1.0, 2.0, 3.0));
        bounds.expand(Vec3::new(f32::NAN, 0.0, 0.0));
        assert_eq!(bounds.min, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));
    }
}
