use egui::DragValue;
use egui::Slider;

use crate::app::TourStudioTabViewer;
use crate::icons;

pub const DEFAULT_ZOOM_FACTOR: f32 = 1.15;

impl TourStudioTabViewer<'_> {
    pub fn build_settings_tab(&mut self, ui: &mut egui::Ui) {
        let mut reconnect = false;
        let mut reload = false;

        ui.vertical(|ui| {
            ui.label("Application Settings");
            ui.group(|ui| {
                ui.checkbox(&mut self.tab_state.settings.show_labels, "Show hotspot titles in the viewer");
                ui.horizontal(|ui| {
                    let mut zoom = ui.ctx().zoom_factor();
                    if ui.add(Slider::new(&mut zoom, 0.5..=2.0).text("Zoom Factor (Ctrl + and Ctrl - also changes this)")).changed() {
                        ui.ctx().set_zoom_factor(zoom);
                    }
                    if ui.button("Reset").clicked() {
                        ui.ctx().set_zoom_factor(DEFAULT_ZOOM_FACTOR);
                    }
                });
            });

            ui.label("Server");
            ui.group(|ui| {
                egui::Grid::new("server_settings_grid").num_columns(2).spacing([12.0, 6.0]).show(ui, |ui| {
                    ui.label("API URL");
                    let response = ui.add(egui::TextEdit::singleline(&mut self.tab_state.settings.api_url).hint_text("https://sekolah.example/api").desired_width(320.0));
                    if response.lost_focus() {
                        reconnect = true;
                        reload = true;
                    }
                    ui.end_row();

                    ui.label("Storage URL").on_hover_text("Prefix for panorama images stored as relative paths");
                    let response = ui.add(egui::TextEdit::singleline(&mut self.tab_state.settings.storage_url).desired_width(320.0));
                    if response.lost_focus() {
                        reconnect = true;
                        reload = true;
                    }
                    ui.end_row();

                    ui.label("Request timeout");
                    if ui.add(DragValue::new(&mut self.tab_state.settings.request_timeout_secs).range(1..=600).suffix(" s")).changed() {
                        reconnect = true;
                    }
                    ui.end_row();
                });
                if ui.button(format!("{} Reconnect and reload", icons::ARROWS_CLOCKWISE)).clicked() {
                    reconnect = true;
                    reload = true;
                }
            });

            ui.label("Viewer");
            ui.group(|ui| {
                egui::Grid::new("viewer_settings_grid").num_columns(2).spacing([12.0, 6.0]).show(ui, |ui| {
                    ui.label("Camera readout interval");
                    if ui.add(DragValue::new(&mut self.tab_state.settings.orientation_poll_interval_ms).range(16..=2_000).suffix(" ms")).changed() {
                        reconnect = true;
                    }
                    ui.end_row();

                    ui.label("Hotspot dialog settle delay").on_hover_text("How long the dialog waits for the camera before reading its position");
                    if ui.add(DragValue::new(&mut self.tab_state.settings.dialog_settle_delay_ms).range(0..=2_000).suffix(" ms")).changed() {
                        reconnect = true;
                    }
                    ui.end_row();

                    ui.label("Look-at animation");
                    ui.add(DragValue::new(&mut self.tab_state.settings.look_at_duration_ms).range(0..=5_000).suffix(" ms"));
                    ui.end_row();
                });
            });
        });

        if reconnect {
            self.tab_state.reconnect(self.runtime);
        }
        if reload {
            self.tab_state.manager.load_tour();
        }
    }
}
