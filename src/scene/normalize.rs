use super::bounds::content_bounds;
use super::{ModelScene, Transform};
use glam::{Quat, Vec3};

pub const DEFAULT_TARGET_SIZE: f32 = 1.8;
pub const DEFAULT_BASELINE: f32 = 0.0;

/// Result of [`center_and_scale`], mostly for logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub pivot: Vec3,
    pub original_size: Vec3,
}

/// Rescale the model so its largest dimension equals `target_size`, center it
/// horizontally on the origin and rest its lowest point on `baseline`.
///
/// The root rotation is reset; degenerate and empty models get scale 1.
pub fn center_and_scale(model: &mut ModelScene, target_size: f32, baseline: f32) -> Normalization {
    let bounds = content_bounds(model);
    let size = bounds.size();
    let max_dim = bounds.max_dimension();
    let scale = if max_dim > 0.0 && max_dim.is_finite() && target_size > 0.0 {
        target_size / max_dim
    } else {
        1.0
    };

    let pivot = if bounds.is_empty() {
        Vec3::ZERO
    } else {
        let center = bounds.center();
        Vec3::new(-center.x, -bounds.min.y, -center.z)
    };

    model.pivot = pivot;
    model.root = Transform {
        translation: Vec3::new(0.0, baseline, 0.0),
        rotation: Quat::IDENTITY,
        scale: Vec3::splat(scale),
    };

    log::debug!(
        "normalized '{}': size {:?} -> scale {:.4}",
        model.name,
        size,
        scale
    );

    Normalization {
        scale,
        pivot,
        original_size: size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::bounds::model_bounds;
    use crate::scene::primitives::box_model;
    use crate::scene::{ModelScene, Node};

    fn offset_box(size: Vec3, offset: Vec3) -> ModelScene {
        let mut model = box_model("offset", size, [1.0; 4]);
        model.nodes[0].local.translation = offset;
        model
    }

    #[test]
    fn largest_dimension_matches_target() {
        let mut model = offset_box(Vec3::new(4.0, 2.0, 1.0), Vec3::new(10.0, -3.0, 7.0));
        let result = center_and_scale(&mut model, DEFAULT_TARGET_SIZE, DEFAULT_BASELINE);

        let bounds = model_bounds(&model);
        assert!((result.scale - 0.45).abs() < 1e-5);
        assert!((bounds.max_dimension() - 1.8).abs() < 1e-4);
        assert!(bounds.center().x.abs() < 1e-4);
        assert!(bounds.center().z.abs() < 1e-4);
        assert!(bounds.min.y.abs() < 1e-4);
    }

    #[test]
    fn baseline_offsets_lowest_point() {
        let mut model = offset_box(Vec3::splat(2.0), Vec3::ZERO);
        center_and_scale(&mut model, 1.0, 0.5);
        let bounds = model_bounds(&model);
        assert!((bounds.min.y - 0.5).abs() < 1e-5);
        assert!((bounds.max.y - 1.5).abs() < 1e-5);
    }

    #[test]
    fn zero_size_model_keeps_unit_scale() {
        let mut model = offset_box(Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0));
        let result = center_and_scale(&mut model, DEFAULT_TARGET_SIZE, DEFAULT_BASELINE);
        assert_eq!(result.scale, 1.0);
        assert!(model.root.scale.is_finite());
        assert!(model.pivot.is_finite());
    }

    #[test]
    fn empty_model_is_left_at_origin() {
        let mut model = ModelScene::new("empty");
        model.add_node(Node::new("lonely"), None);
        let result = center_and_scale(&mut model, DEFAULT_TARGET_SIZE, DEFAULT_BASELINE);
        assert_eq!(result.scale, 1.0);
        assert_eq!(model.pivot, Vec3::ZERO);
    }

    #[test]
    fn renormalizing_is_stable() {
        let mut model = offset_box(Vec3::new(3.0, 1.0, 2.0), Vec3::new(-5.0, 4.0, 1.0));
        let first = center_and_scale(&mut model, DEFAULT_TARGET_SIZE, DEFAULT_BASELINE);
        model.root.rotation = Quat::from_rotation_y(1.0);
        let second = center_and_scale(&mut model, DEFAULT_TARGET_SIZE, DEFAULT_BASELINE);
        assert_eq!(first, second);
    }
}
