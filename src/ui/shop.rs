use crate::config::ShopItem;

const COLUMNS: usize = 4;
const THUMB_SIZE: egui::Vec2 = egui::vec2(96.0, 96.0);

/// Grid of merchandise cards. Returns true when the close button was used.
pub fn show_shop_pane(ctx: &egui::Context, items: &[ShopItem]) -> bool {
    let mut open = true;
    egui::Window::new("Shop")
        .id(egui::Id::new("shop_pane"))
        .open(&mut open)
        .collapsible(false)
        .default_width(480.0)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            if items.is_empty() {
                ui.weak("Nothing for sale yet.");
                return;
            }
            egui::Grid::new("shop_grid")
                .num_columns(COLUMNS)
                .spacing(egui::vec2(12.0, 12.0))
                .show(ui, |ui| {
                    for row in grid_rows(items, COLUMNS) {
                        for item in row {
                            shop_card(ui, item);
                        }
                        ui.end_row();
                    }
                });
        });
    !open
}

fn shop_card(ui: &mut egui::Ui, item: &ShopItem) {
    ui.vertical(|ui| {
        // Placeholder tile; the image locator shows on hover.
        let (rect, response) = ui.allocate_exact_size(THUMB_SIZE, egui::Sense::hover());
        ui.painter()
            .rect_filled(rect, 4.0, egui::Color32::from_rgb(0x2a, 0x2f, 0x3a));
        if let Some(image) = &item.image {
            response.on_hover_text(image);
        }
        ui.label(egui::RichText::new(&item.name).strong());
        ui.label(&item.price);
    });
}

fn grid_rows(items: &[ShopItem], columns: usize) -> impl Iterator<Item = &[ShopItem]> {
    items.chunks(columns.max(1))
}
