pub mod hotspot_editor;
pub mod preview_pane;
pub mod settings_tab;
pub mod tour_editor;
pub mod tour_preview;
