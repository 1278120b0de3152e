use glam::Vec2;
use winit::event::MouseButton;
use winit::keyboard::{Key, NamedKey};

/// Cursor travel (physical pixels) below which a press and release count as a click.
const CLICK_SLOP: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    None,
    ToggleHud,
    CloseOverlays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Orbit,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    mode: DragMode,
    travel: f32,
}

#[derive(Default, Debug, Clone, Copy)]
pub struct InputState {
    cursor: Option<Vec2>,
    drag: Option<Drag>,
}

impl InputState {
    /// Keyboard shortcuts. `text_focus` is true while a text field wants keys.
    pub fn handle_key(&self, key: &Key, pressed: bool, repeat: bool, text_focus: bool) -> InputAction {
        if !pressed || repeat {
            return InputAction::None;
        }
        match key {
            Key::Named(NamedKey::Escape) => InputAction::CloseOverlays,
            Key::Character(c) if !text_focus && c.eq_ignore_ascii_case("c") => InputAction::ToggleHud,
            _ => InputAction::None,
        }
    }

    /// Record a cursor move; returns the drag delta while a button is held.
    pub fn cursor_moved(&mut self, position: Vec2) -> Option<(DragMode, Vec2)> {
        let previous = self.cursor.replace(position);
        let drag = self.drag.as_mut()?;
        // No delta on the first move after the cursor re-enters.
        let delta = position - previous?;
        drag.travel += delta.length();
        Some((drag.mode, delta))
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
        self.drag = None;
    }

    pub fn button_pressed(&mut self, button: MouseButton) {
        let mode = match button {
            MouseButton::Left => DragMode::Orbit,
            MouseButton::Right | MouseButton::Middle => DragMode::Pan,
            _ => return,
        };
        // The first button held decides the drag mode.
        if self.drag.is_none() {
            self.drag = Some(Drag { mode, travel: 0.0 });
        }
    }

    /// Ends a drag. Returns the cursor position when it was a left click.
    pub fn button_released(&mut self, button: MouseButton) -> Option<Vec2> {
        let drag = self.drag.take()?;
        let clicked = button == MouseButton::Left
            && drag.mode == DragMode::Orbit
            && drag.travel < CLICK_SLOP;
        if clicked {
            self.cursor
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c_toggles_hud_in_either_case_unless_typing() {
        let input = InputState::default();
        let lower = Key::Character("c".into());
        let upper = Key::Character("C".into());
        assert_eq!(input.handle_key(&lower, true, false, false), InputAction::ToggleHud);
        assert_eq!(input.handle_key(&upper, true, false, false), InputAction::ToggleHud);
        assert_eq!(input.handle_key(&lower, true, false, true), InputAction::None);
        assert_eq!(input.handle_key(&lower, false, false, false), InputAction::None);
        assert_eq!(input.handle_key(&lower, true, true, false), InputAction::None);
    }

    #[test]
    fn escape_closes_overlays_even_while_typing() {
        let input = InputState::default();
        let escape = Key::Named(NamedKey::Escape);
        assert_eq!(input.handle_key(&escape, true, false, true), InputAction::CloseOverlays);
    }

    #[test]
    fn short_press_is_a_click() {
        let mut input = InputState::default();
        input.cursor_moved(Vec2::new(100.0, 100.0));
        input.button_pressed(MouseButton::Left);
        input.cursor_moved(Vec2::new(101.0, 101.0));
        assert_eq!(input.button_released(MouseButton::Left), Some(Vec2::new(101.0, 101.0)));
    }

    #[test]
    fn drag_reports_deltas_and_is_not_a_click() {
        let mut input = InputState::default();
        input.cursor_moved(Vec2::new(10.0, 10.0));
        input.button_pressed(MouseButton::Right);
        let (mode, delta) = input.cursor_moved(Vec2::new(30.0, 5.0)).unwrap();
        assert_eq!(mode, DragMode::Pan);
        assert_eq!(delta, Vec2::new(20.0, -5.0));
        assert_eq!(input.button_released(MouseButton::Right), None);
        assert!(input.drag.is_none());

        input.button_pressed(MouseButton::Left);
        input.cursor_moved(Vec2::new(60.0, 5.0));
        assert_eq!(input.button_released(MouseButton::Left), None);
    }

    #[test]
    fn moves_without_buttons_only_track_cursor() {
        let mut input = InputState::default();
        assert!(input.cursor_moved(Vec2::new(1.0, 2.0)).is_none());
        assert_eq!(input.cursor, Some(Vec2::new(1.0, 2.0)));
        input.cursor_left();
        assert!(input.cursor.is_none());
    }
}
