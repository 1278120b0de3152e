use super::pick::Ray;
use crate::config::CameraConfig;
use crate::ui::camera_hud::CameraPose;
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

const MIN_DISTANCE: f32 = 0.05;
const MAX_DISTANCE: f32 = 90.0;
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 1e-3;
const ZOOM_STEP: f32 = 0.95;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PendingMotion {
    yaw: f32,
    pitch: f32,
    pan: Vec3,
}

/// Damped orbit camera around a target point.
///
/// `yaw` is the azimuth about +Y (0 looks down -Z from +Z), `pitch` the
/// elevation above the target's horizontal plane.
#[derive(Debug, Clone, Copy)]
pub struct CameraController {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    damping: f32,
    rotate_speed: f32,
    pan_speed: f32,
    zoom_speed: f32,
    pending: PendingMotion,
}

impl CameraController {
    pub fn new(config: &CameraConfig) -> Self {
        let target = Vec3::from(config.target);
        let offset = Vec3::from(config.position) - target;
        let distance = offset.length().clamp(MIN_DISTANCE, MAX_DISTANCE);
        let (yaw, pitch) = offset_to_yaw_pitch(offset);
        Self {
            target,
            distance,
            yaw,
            pitch,
            fov_y: config.fov_deg.to_radians(),
            near: config.near,
            far: config.far,
            damping: config.damping.clamp(0.0, 1.0),
            rotate_speed: config.rotate_speed,
            pan_speed: config.pan_speed,
            zoom_speed: config.zoom_speed,
            pending: PendingMotion::default(),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.target + yaw_pitch_to_offset(self.yaw, self.pitch) * self.distance
    }

    /// Camera right, up and forward axes.
    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = (self.target - self.position()).normalize_or(Vec3::NEG_Z);
        let right = forward.cross(Vec3::Y).normalize_or(Vec3::X);
        let up = right.cross(forward);
        (right, up, forward)
    }

    /// Drag in pixels; a drag across the full viewport height turns once.
    pub fn rotate(&mut self, delta_px: Vec2, viewport_height: f32) {
        let h = viewport_height.max(1.0);
        let turn = std::f32::consts::TAU * self.rotate_speed / h;
        self.pending.yaw -= delta_px.x * turn;
        self.pending.pitch += delta_px.y * turn;
    }

    pub fn pan(&mut self, delta_px: Vec2, viewport_height: f32) {
        let h = viewport_height.max(1.0);
        // Height of the view frustum at the target, spread over the viewport.
        let world_per_px = 2.0 * self.distance * (self.fov_y * 0.5).tan() / h * self.pan_speed;
        let (right, up, _) = self.basis();
        self.pending.pan += -right * (delta_px.x * world_per_px) + up * (delta_px.y * world_per_px);
    }

    /// Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        let scale = ZOOM_STEP.powf(steps * self.zoom_speed);
        self.distance = (self.distance * scale).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Apply a damped share of the pending motion. Returns true while moving.
    pub fn update(&mut self) -> bool {
        // Zero damping means motion applies in one frame.
        let factor = if self.damping > 0.0 { self.damping } else { 1.0 };
        self.yaw += self.pending.yaw * factor;
        self.pitch = (self.pitch + self.pending.pitch * factor).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.target += self.pending.pan * factor;

        let keep = 1.0 - factor;
        self.pending.yaw *= keep;
        self.pending.pitch *= keep;
        self.pending.pan *= keep;
        let moving = self.pending.yaw.abs() > 1e-5
            || self.pending.pitch.abs() > 1e-5
            || self.pending.pan.length_squared() > 1e-10;
        if !moving {
            self.pending = PendingMotion::default();
        }
        moving
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect.max(1e-3), self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view_matrix()
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_mat4(&self.view_matrix().inverse())
    }

    pub fn pose(&self) -> CameraPose {
        let (x, y, z) = self.orientation().to_euler(EulerRot::XYZ);
        CameraPose {
            position: self.position(),
            pitch_deg: x.to_degrees(),
            yaw_deg: y.to_degrees(),
            roll_deg: z.to_degrees(),
        }
    }

    /// World ray through a cursor position given in physical pixels.
    pub fn cursor_ray(&self, cursor: Vec2, viewport: Vec2) -> Ray {
        let size = viewport.max(Vec2::ONE);
        // Window y grows downward, NDC y upward.
        let ndc = Vec2::new(cursor.x / size.x * 2.0 - 1.0, 1.0 - cursor.y / size.y * 2.0);
        let inverse = self.view_proj(size.x / size.y).inverse();
        let near = inverse.project_point3(ndc.extend(0.0));
        let far = inverse.project_point3(ndc.extend(1.0));
        Ray::new(near, far - near)
    }
}

fn yaw_pitch_to_offset(yaw: f32, pitch: f32) -> Vec3 {
    let cos_pitch = pitch.cos();
    Vec3::new(yaw.sin() * cos_pitch, pitch.sin(), yaw.cos() * cos_pitch)
}

fn offset_to_yaw_pitch(offset: Vec3) -> (f32, f32) {
    let dir = offset.normalize_or(Vec3::Z);
    let yaw = dir.x.atan2(dir.z);
    let pitch = dir.y.clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
    (yaw, pitch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraController {
        CameraController::new(&CameraConfig::default())
    }

    #[test]
    fn starts_at_configured_position() {
        let camera = camera();
        assert!((camera.position() - Vec3::new(2.8, 1.6, 3.2)).length() < 1e-4);
        let pose = camera.pose();
        assert!((pose.position.x - 2.8).abs() < 1e-4);
        assert!(pose.pitch_deg.is_finite() && pose.yaw_deg.is_finite());
    }

    #[test]
    fn rotation_is_damped_over_frames() {
        let mut camera = camera();
        let start = camera.yaw;
        camera.rotate(Vec2::new(-100.0, 0.0), 600.0);
        camera.update();
        let first_step = camera.yaw - start;
        let total = std::f32::consts::TAU * 0.5 * 100.0 / 600.0;
        assert!((first_step - total * 0.06).abs() < 1e-5);
        for _ in 0..400 {
            camera.update();
        }
        assert!((camera.yaw - start - total).abs() < 1e-3);
        assert!(!camera.update());
    }

    #[test]
    fn pitch_never_flips_over_the_pole() {
        let mut camera = camera();
        camera.rotate(Vec2::new(0.0, 100_000.0), 600.0);
        for _ in 0..200 {
            camera.update();
        }
        assert!(camera.pitch <= PITCH_LIMIT);
        assert!(camera.position().is_finite());
    }

    #[test]
    fn zoom_is_bounded() {
        let mut camera = camera();
        camera.zoom(10_000.0);
        assert!((camera.distance - MIN_DISTANCE).abs() < 1e-6);
        camera.zoom(-10_000.0);
        assert!((camera.distance - MAX_DISTANCE).abs() < 1e-3);
    }

    #[test]
    fn pan_moves_target_sideways() {
        let mut camera = camera();
        let (right, _, _) = camera.basis();
        camera.pan(Vec2::new(50.0, 0.0), 600.0);
        for _ in 0..400 {
            camera.update();
        }
        assert!(camera.target.dot(right) < 0.0);
    }

    #[test]
    fn centre_ray_points_at_target() {
        let camera = camera();
        let ray = camera.cursor_ray(Vec2::new(400.0, 300.0), Vec2::new(800.0, 600.0));
        let to_target = (camera.target - camera.position()).normalize();
        assert!(ray.direction.dot(to_target) > 0.9999);
    }
}
