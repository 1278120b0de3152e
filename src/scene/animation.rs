//! Keyframe clips, a looping mixer, and CPU skinning of posed meshes.

use super::{ModelScene, Pose, Transform};
use glam::{Mat4, Quat, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Values are stored as (in-tangent, value, out-tangent) triplets.
    CubicSpline,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub node: usize,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    pub values: ChannelValues,
}

impl Channel {
    fn apply(&self, time: f32, target: &mut Transform) {
        match &self.values {
            ChannelValues::Translation(values) => {
                if let Some(v) = sample(&self.times, values, self.interpolation, time) {
                    target.translation = v;
                }
            }
            ChannelValues::Rotation(values) => {
                if let Some(q) = sample(&self.times, values, self.interpolation, time) {
                    target.rotation = q.normalize();
                }
            }
            ChannelValues::Scale(values) => {
                if let Some(v) = sample(&self.times, values, self.interpolation, time) {
                    target.scale = v;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|channel| channel.times.last().copied())
            .fold(0.0_f32, f32::max);
        Self {
            name: name.into(),
            duration,
            channels,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub joints: Vec<usize>,
    pub inverse_bind: Vec<Mat4>,
}

trait Keyframe: Copy {
    fn lerp_to(self, other: Self, t: f32) -> Self;
    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, s: f32) -> Self;
}

impl Keyframe for Vec3 {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        self.lerp(other, t)
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, s: f32) -> Self {
        let (h00, h10, h01, h11) = hermite_basis(s);
        p0 * h00 + m0 * h10 + p1 * h01 + m1 * h11
    }
}

impl Keyframe for Quat {
    fn lerp_to(self, other: Self, t: f32) -> Self {
        self.slerp(other, t)
    }

    fn hermite(p0: Self, m0: Self, p1: Self, m1: Self, s: f32) -> Self {
        let (h00, h10, h01, h11) = hermite_basis(s);
        // Blend componentwise, then renormalize back onto the unit sphere.
        let v = Vec4::from(p0) * h00 + Vec4::from(m0) * h10 + Vec4::from(p1) * h01 + Vec4::from(m1) * h11;
        Quat::from_vec4(v).normalize()
    }
}

fn hermite_basis(s: f32) -> (f32, f32, f32, f32) {
    let s2 = s * s;
    let s3 = s2 * s;
    (
        2.0 * s3 - 3.0 * s2 + 1.0,
        s3 - 2.0 * s2 + s,
        -2.0 * s3 + 3.0 * s2,
        s3 - s2,
    )
}

trait Scaled {
    fn scaled(self, k: f32) -> Self;
}

impl Scaled for Vec3 {
    fn scaled(self, k: f32) -> Self {
        self * k
    }
}

impl Scaled for Quat {
    fn scaled(self, k: f32) -> Self {
        Quat::from_vec4(Vec4::from(self) * k)
    }
}

fn sample<T: Keyframe + Scaled>(
    times: &[f32],
    values: &[T],
    interpolation: Interpolation,
    time: f32,
) -> Option<T> {
    let count = times.len();
    if count == 0 {
        return None;
    }
    let value_at = |key: usize| -> Option<T> {
        match interpolation {
            Interpolation::CubicSpline => values.get(key * 3 + 1).copied(),
            _ => values.get(key).copied(),
        }
    };
    if count == 1 || time <= times[0] {
        return value_at(0);
    }
    if time >= times[count - 1] {
        return value_at(count - 1);
    }

    // Last key at or before `time`, so the segment is [i, i + 1].
    let i = times.partition_point(|&t| t <= time).saturating_sub(1).min(count - 2);
    let (t0, t1) = (times[i], times[i + 1]);
    let span = t1 - t0;
    let s = if span > 0.0 { (time - t0) / span } else { 0.0 };

    match interpolation {
        Interpolation::Step => value_at(i),
        Interpolation::Linear => Some(value_at(i)?.lerp_to(value_at(i + 1)?, s)),
        Interpolation::CubicSpline => {
            // Stored tangents are per unit time; hermite wants them per segment.
            let p0 = value_at(i)?;
            let p1 = value_at(i + 1)?;
            let m0 = values.get(i * 3 + 2)?.scaled(span);
            let m1 = values.get((i + 1) * 3)?.scaled(span);
            Some(T::hermite(p0, m0, p1, m1, s))
        }
    }
}

/// Playback cursor of one clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipAction {
    pub clip: usize,
    pub time: f32,
    pub playing: bool,
}

/// Drives every clip of one model; clips loop and are applied in order.
#[derive(Debug, Clone)]
pub struct AnimationMixer {
    actions: Vec<ClipAction>,
    rest: Vec<Transform>,
    animated: Vec<usize>,
}

impl AnimationMixer {
    /// `None` when the model carries no clips.
    pub fn new(model: &ModelScene) -> Option<Self> {
        if model.animations.is_empty() {
            return None;
        }
        let actions = (0..model.animations.len())
            .map(|clip| ClipAction {
                clip,
                time: 0.0,
                playing: false,
            })
            .collect();
        let mut animated: Vec<usize> = model
            .animations
            .iter()
            .flat_map(|clip| clip.channels.iter().map(|channel| channel.node))
            .filter(|&node| node < model.nodes.len())
            .collect();
        animated.sort_unstable();
        animated.dedup();
        Some(Self {
            actions,
            rest: model.nodes.iter().map(|node| node.local).collect(),
            animated,
        })
    }

    pub fn play_all(&mut self) {
        for action in &mut self.actions {
            action.playing = true;
        }
    }

    pub fn actions(&self) -> &[ClipAction] {
        &self.actions
    }

    pub fn is_playing(&self) -> bool {
        self.actions.iter().any(|action| action.playing)
    }

    pub fn update(&mut self, model: &mut ModelScene, dt: f32) {
        if !self.is_playing() {
            return;
        }
        for action in self.actions.iter_mut().filter(|action| action.playing) {
            let duration = model
                .animations
                .get(action.clip)
                .map(|clip| clip.duration)
                .unwrap_or(0.0);
            action.time += dt.max(0.0);
            if duration > 0.0 {
                action.time %= duration;
            }
        }

        // Channels write absolute values, so start every animated node from rest.
        for &node in &self.animated {
            if let (Some(target), Some(rest)) = (model.nodes.get_mut(node), self.rest.get(node)) {
                target.local = *rest;
            }
        }

        for action in self.actions.iter().filter(|action| action.playing) {
            let Some(clip) = model.animations.get(action.clip) else {
                continue;
            };
            for channel in &clip.channels {
                if let Some(node) = model.nodes.get_mut(channel.node) {
                    channel.apply(action.time, &mut node.local);
                }
            }
        }

        pose_skins(model);
    }
}

/// Deform every skinned surface with its joint palette (`global * inverse_bind`).
pub fn pose_skins(model: &mut ModelScene) {
    if model.skins.is_empty() {
        return;
    }
    let globals = model.node_globals();
    let mut palettes = Vec::new();
    for node in &model.nodes {
        let (Some(skin_index), Some(surface)) = (node.skin, node.surface) else {
            continue;
        };
        let Some(skin) = model.skins.get(skin_index) else {
            continue;
        };
        let palette: Vec<Mat4> = skin
            .joints
            .iter()
            .enumerate()
            .map(|(i, &joint)| {
                let global = globals.get(joint).copied().unwrap_or(Mat4::IDENTITY);
                let inverse_bind = skin.inverse_bind.get(i).copied().unwrap_or(Mat4::IDENTITY);
                // Bind space to joint space, then joint to model space.
                global * inverse_bind
            })
            .collect();
        palettes.push((surface, palette));
    }

    for (surface, palette) in palettes {
        let Some(surface) = model.surfaces.get_mut(surface) else {
            continue;
        };
        for geometry in &mut surface.groups {
            let Some(weights) = geometry.skin.as_ref() else {
                continue;
            };
            let mut positions = Vec::with_capacity(geometry.positions.len());
            let mut normals = Vec::with_capacity(geometry.positions.len());
            for (i, position) in geometry.positions.iter().enumerate() {
                let joints = weights.joints.get(i).copied().unwrap_or([0; 4]);
                let w = weights.weights.get(i).copied().unwrap_or([1.0, 0.0, 0.0, 0.0]);
                let mut skin_matrix = Mat4::ZERO;
                let mut total = 0.0;
                for k in 0..4 {
                    if w[k] == 0.0 {
                        continue;
                    }
                    if let Some(joint) = palette.get(joints[k] as usize) {
                        skin_matrix += *joint * w[k];
                        total += w[k];
                    }
                }
                // Unweighted vertices stay at rest.
                if total <= 0.0 {
                    skin_matrix = Mat4::IDENTITY;
                }
                let normal = geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);
                positions.push(skin_matrix.transform_point3(Vec3::from(*position)).to_array());
                normals.push(
                    skin_matrix
                        .transform_vector3(Vec3::from(normal))
                        .try_normalize()
                        .unwrap_or(Vec3::Y)
                        .to_array(),
                );
            }
            geometry.pose = Some(Pose { positions, normals });
            geometry.pose_dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::primitives::box_model;
    use crate::scene::{Node, SkinWeights};

    fn linear_translation(node: usize) -> Channel {
        Channel {
            node,
            interpolation: Interpolation::Linear,
            times: vec![0.0, 1.0, 2.0],
            values: ChannelValues::Translation(vec![
                Vec3::ZERO,
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(2.0, 4.0, 0.0),
            ]),
        }
    }

    #[test]
    fn clip_duration_is_last_keyframe() {
        let clip = AnimationClip::new("walk", vec![linear_translation(0)]);
        assert_eq!(clip.duration, 2.0);
    }

    #[test]
    fn linear_sampling_interpolates_and_clamps() {
        let channel = linear_translation(0);
        let ChannelValues::Translation(values) = &channel.values else {
            panic!("translation channel expected");
        };
        let mid = sample(&channel.times, values, Interpolation::Linear, 0.5);
        assert_eq!(mid, Some(Vec3::new(1.0, 0.0, 0.0)));
        let late = sample(&channel.times, values, Interpolation::Linear, 9.0);
        assert_eq!(late, Some(Vec3::new(2.0, 4.0, 0.0)));
        let step = sample(&channel.times, values, Interpolation::Step, 1.5);
        assert_eq!(step, Some(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn cubic_spline_hits_keyframe_values() {
        let times = [0.0, 1.0];
        let values = [
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::X,
            Vec3::X,
            Vec3::splat(3.0),
            Vec3::ZERO,
        ];
        let at_end = sample(&times, &values, Interpolation::CubicSpline, 1.0);
        assert_eq!(at_end, Some(Vec3::splat(3.0)));
        let start = sample(&times, &values, Interpolation::CubicSpline, 0.0);
        assert_eq!(start, Some(Vec3::ZERO));
    }

    #[test]
    fn mixer_loops_and_moves_nodes() {
        let mut model = box_model("mover", Vec3::ONE, [1.0; 4]);
        model.animations.push(AnimationClip::new("slide", vec![linear_translation(0)]));
        let mut mixer = AnimationMixer::new(&model).expect("clip present");
        mixer.play_all();

        mixer.update(&mut model, 0.5);
        assert!((model.nodes[0].local.translation.x - 1.0).abs() < 1e-5);

        mixer.update(&mut model, 2.0);
        assert!((mixer.actions()[0].time - 0.5).abs() < 1e-5);
    }

    #[test]
    fn mixer_absent_without_clips() {
        let model = box_model("still", Vec3::ONE, [1.0; 4]);
        assert!(AnimationMixer::new(&model).is_none());
    }

    #[test]
    fn skinned_vertices_follow_joint() {
        let mut model = box_model("skinned", Vec3::ONE, [1.0; 4]);
        let joint = model.add_node(Node::new("bone"), None);
        model.nodes[joint].local.translation = Vec3::new(0.0, 5.0, 0.0);
        model.skins.push(Skin {
            joints: vec![joint],
            inverse_bind: vec![Mat4::IDENTITY],
        });
        model.nodes[0].skin = Some(0);
        let vertex_count = model.surfaces[0].groups[0].vertex_count();
        model.surfaces[0].groups[0].skin = Some(SkinWeights {
            joints: vec![[0; 4]; vertex_count],
            weights: vec![[1.0, 0.0, 0.0, 0.0]; vertex_count],
        });

        pose_skins(&mut model);

        let geometry = &model.surfaces[0].groups[0];
        let pose = geometry.pose.as_ref().expect("posed");
        assert!(geometry.pose_dirty);
        for (rest, posed) in geometry.positions.iter().zip(&pose.positions) {
            assert!((posed[1] - rest[1] - 5.0).abs() < 1e-5);
        }
    }
}
