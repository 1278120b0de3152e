//! vitrine - native glTF showcase viewer.
//!
//! Opens a window with an orbit camera around a gallery of glTF models,
//! with environment reflections, wireframe and auto-rotate toggles, a
//! camera readout and clickable props that open music, shop and sky panes.

mod app;
mod assets;
mod config;
mod render;
mod scene;
mod ui;
mod viewer;

fn main() {
    app::run();
}
