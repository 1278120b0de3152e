use crate::app::egui_host::EguiFrameOutput;

/// Draws tessellated egui output on top of the scene.
pub struct EguiOverlay {
    renderer: egui_wgpu::Renderer,
}

impl EguiOverlay {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        Self {
            // No depth, no MSAA, no dithering.
            renderer: egui_wgpu::Renderer::new(device, format, None, 1, false),
        }
    }

    /// Upload texture deltas and vertex data ahead of the pass.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame: &EguiFrameOutput,
    ) -> egui_wgpu::ScreenDescriptor {
        for (id, delta) in &frame.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: frame.screen_size_px,
            pixels_per_point: frame.pixels_per_point,
        };
        // Extra command buffers from paint callbacks; none are registered.
        let _ = self.renderer.update_buffers(
            device,
            queue,
            encoder,
            &frame.clipped_primitives,
            &screen,
        );
        screen
    }

    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'static>,
        frame: &EguiFrameOutput,
        screen: &egui_wgpu::ScreenDescriptor,
    ) {
        self.renderer.render(pass, &frame.clipped_primitives, screen);
    }

    /// Free textures egui released this frame; call after submission.
    pub fn finish(&mut self, frame: &EguiFrameOutput) {
        for id in &frame.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}
