#![warn(clippy::all, rust_2018_idioms)]
mod api;
mod app;
mod error;
mod session;
mod settings;
mod tab_state;
mod task;
#[cfg(test)]
mod testing;
mod tour;
mod ui;
mod util;
mod viewer;
pub use app::TourStudioApp;
pub const APP_NAME: &str = "Tour Studio";
pub(crate) use egui_phosphor::regular as icons;

/// Concatenate an icon const with a string literal at compile time (zero allocation).
/// Usage: `icon_str!(icons::GEAR_FINE, "Settings")` => `&'static str`
macro_rules! icon_str {
    ($icon:expr, $text:expr) => {
        const_format::concatcp!($icon, " ", $text)
    };
}
pub(crate) use icon_str;
