use glam::Vec3;
use std::time::{Duration, Instant};

/// Camera position and Euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub pitch_deg: f32,
    pub yaw_deg: f32,
    pub roll_deg: f32,
}

pub fn format_readout(pose: &CameraPose) -> [String; 2] {
    let p = pose.position;
    [
        format!("pos  x:{:.2}  y:{:.2}  z:{:.2}", p.x, p.y, p.z),
        format!(
            "rot  pitch:{:.1}  yaw:{:.1}  roll:{:.1}",
            pose.pitch_deg, pose.yaw_deg, pose.roll_deg
        ),
    ]
}

/// Top-left camera readout, refreshed at most once per throttle interval.
#[derive(Debug, Clone)]
pub struct CameraHud {
    enabled: bool,
    throttle: Duration,
    last_refresh: Option<Instant>,
    lines: [String; 2],
}

impl CameraHud {
    pub fn new(enabled: bool, throttle: Duration) -> Self {
        Self {
            enabled,
            throttle,
            last_refresh: None,
            lines: [String::new(), String::new()],
        }
    }

    pub fn is_visible(&self) -> bool {
        self.enabled
    }

    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        // Refresh on the next tick instead of waiting out the throttle.
        self.last_refresh = None;
        self.enabled
    }

    /// Refresh the text if enabled and the throttle has elapsed.
    pub fn tick(&mut self, now: Instant, pose: &CameraPose) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(last) = self.last_refresh {
            if now.saturating_duration_since(last) < self.throttle {
                return false;
            }
        }
        self.last_refresh = Some(now);
        self.lines = format_readout(pose);
        true
    }

    pub fn lines(&self) -> &[String; 2] {
        &self.lines
    }

    pub fn show(&self, ctx: &egui::Context) {
        if !self.is_visible() {
            return;
        }
        egui::Area::new(egui::Id::new("camera_hud"))
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(10.0, 10.0))
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::new()
                    .fill(egui::Color32::from_rgba_unmultiplied(12, 14, 20, 191))
                    .stroke(egui::Stroke::new(1.0, egui::Color32::from_rgb(0x20, 0x24, 0x2f)))
                    .corner_radius(6.0)
                    .inner_margin(egui::Margin::symmetric(8, 6))
                    .show(ui, |ui| {
                        for line in &self.lines {
                            ui.label(
                                egui::RichText::new(line)
                                    .monospace()
                                    .size(12.0)
                                    .color(egui::Color32::from_rgb(0xcd, 0xd3, 0xe1)),
                            );
                        }
                    });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose() -> CameraPose {
        CameraPose {
            position: Vec3::new(2.8, 1.6, 3.2),
            pitch_deg: -12.345,
            yaw_deg: 41.0,
            roll_deg: 0.0,
        }
    }

    #[test]
    fn readout_uses_fixed_precision() {
        let [pos, rot] = format_readout(&pose());
        assert_eq!(pos, "pos  x:2.80  y:1.60  z:3.20");
        assert_eq!(rot, "rot  pitch:-12.3  yaw:41.0  roll:0.0");
    }

    #[test]
    fn toggling_twice_restores_visibility() {
        let mut hud = CameraHud::new(true, Duration::from_millis(100));
        assert!(!hud.toggle());
        assert!(hud.toggle());
        assert!(hud.is_visible());
    }

    #[test]
    fn refresh_is_throttled() {
        let mut hud = CameraHud::new(true, Duration::from_millis(100));
        let start = Instant::now();
        assert!(hud.tick(start, &pose()));
        assert!(!hud.tick(start + Duration::from_millis(50), &pose()));
        assert!(hud.tick(start + Duration::from_millis(120), &pose()));
    }

    #[test]
    fn hidden_hud_does_not_refresh() {
        let mut hud = CameraHud::new(false, Duration::from_millis(100));
        assert!(!hud.tick(Instant::now(), &pose()));
        assert!(hud.lines()[0].is_empty());
    }
}
