//! Contract between the tour editor and whatever draws the 360° panorama.
//!
//! A viewer is bound to exactly one image for its whole lifetime. Switching
//! images means destroying the viewer and creating a new one, see
//! [`crate::ui::preview_pane::PreviewPane`].

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

pub mod camera;
pub mod sphere;

/// Snapshot of a viewer camera, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    pub hfov: f64,
}

impl Orientation {
    pub fn new(pitch: f64, yaw: f64) -> Self {
        Self { pitch, yaw, hfov: camera::DEFAULT_HFOV }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

/// Draws one marker at its projected screen position.
pub type MarkerRenderer = fn(&egui::Painter, egui::Pos2, &MarkerSpec, MarkerState);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkerState {
    pub hovered: bool,
    pub dragging: bool,
}

#[derive(Debug, Clone)]
pub struct MarkerSpec {
    pub id: MarkerId,
    pub pitch: f64,
    pub yaw: f64,
    pub label: Option<String>,
    /// Marker is the one currently open in the hotspot editor.
    pub active: bool,
    /// Marker navigates somewhere when clicked.
    pub linked: bool,
    pub renderer: Option<MarkerRenderer>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Loaded,
    Error(String),
    MarkerClicked(MarkerId),
    MarkerMoved { id: MarkerId, pitch: f64, yaw: f64 },
}

/// Camera instructions issued by the tour manager and applied by whichever
/// pane currently owns the editing viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerCommand {
    LookAt { yaw: f64, pitch: f64 },
}

pub trait PanoramaViewer {
    /// The image has been decoded and the camera can be queried.
    fn is_ready(&self) -> bool;

    fn orientation(&self) -> Option<Orientation>;

    fn look_at(&mut self, yaw: f64, pitch: f64, duration: Duration);

    fn add_hotspot(&mut self, spec: MarkerSpec);

    fn remove_hotspot(&mut self, id: MarkerId);

    /// Markers may be dragged to new coordinates.
    fn set_markers_draggable(&mut self, draggable: bool);

    /// Releases every resource held by the viewer. Calling this more than once is allowed.
    fn destroy(&mut self);

    fn take_events(&mut self) -> Vec<ViewerEvent>;

    fn show(&mut self, ui: &mut egui::Ui);
}
