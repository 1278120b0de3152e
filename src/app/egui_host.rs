use egui_winit::winit::event::WindowEvent;
use winit::window::Window;

/// Tessellated UI for one frame, ready for the overlay pass.
pub struct EguiFrameOutput {
    pub clipped_primitives: Vec<egui::ClippedPrimitive>,
    pub textures_delta: egui::TexturesDelta,
    pub pixels_per_point: f32,
    pub screen_size_px: [u32; 2],
}

/// egui context plus its winit glue. Panels read pointer and keyboard
/// capture from here so scene input can yield to them.
pub struct EguiHost {
    context: egui::Context,
    platform: egui_winit::State,
}

impl EguiHost {
    pub fn new(window: &Window, max_texture_side: usize) -> Self {
        let context = egui::Context::default();
        context.set_visuals(viewer_visuals());
        let platform = egui_winit::State::new(
            context.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(max_texture_side),
        );
        Self { context, platform }
    }

    /// Feed a window event to egui. Returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.platform.on_window_event(window, event).consumed
    }

    /// Pointer is over a panel or dragging one of its widgets.
    pub fn wants_pointer(&self) -> bool {
        self.context.is_pointer_over_area() || self.context.wants_pointer_input()
    }

    /// A text field has focus.
    pub fn wants_keyboard(&self) -> bool {
        self.context.wants_keyboard_input()
    }

    pub fn run_ui<F>(&mut self, window: &Window, build: F) -> EguiFrameOutput
    where
        F: FnMut(&egui::Context),
    {
        let input = self.platform.take_egui_input(window);
        let egui::FullOutput {
            platform_output,
            textures_delta,
            shapes,
            pixels_per_point,
            ..
        } = self.context.run(input, build);
        self.platform.handle_platform_output(window, platform_output);

        // A minimized window reports zero, which the overlay pass cannot size a viewport from.
        let size = window.inner_size();
        EguiFrameOutput {
            clipped_primitives: self.context.tessellate(shapes, pixels_per_point),
            textures_delta,
            pixels_per_point,
            screen_size_px: [size.width.max(1), size.height.max(1)],
        }
    }
}

/// Dark translucent panels over the #0f1117 backdrop.
fn viewer_visuals() -> egui::Visuals {
    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(18, 20, 28, 235);
    visuals.window_fill = egui::Color32::from_rgba_unmultiplied(18, 20, 28, 245);
    visuals.window_stroke = egui::Stroke::new(1.0, egui::Color32::from_rgb(0x20, 0x24, 0x2f));
    visuals.override_text_color = Some(egui::Color32::from_rgb(0xcd, 0xd3, 0xe1));
    visuals
}
