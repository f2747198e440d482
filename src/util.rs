use egui::Color32;

pub fn format_degrees(value: f64) -> String {
    format!("{value:.1}°")
}

/// Colour used for the backend connection indicator.
pub fn status_color(ok: bool, is_dark_mode: bool) -> Color32 {
    match (ok, is_dark_mode) {
        (true, true) => Color32::LIGHT_GREEN,
        (true, false) => Color32::DARK_GREEN,
        (false, true) => Color32::LIGHT_RED,
        (false, false) => Color32::DARK_RED,
    }
}
