//! egui implementation of [`PanoramaViewer`]: an equirectangular texture
//! panned and zoomed under a [`Camera`], with markers drawn on top.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::TryRecvError;
use std::time::Duration;
use std::time::Instant;

use egui::Color32;
use egui::Pos2;
use egui::Rect;
use egui::Sense;
use egui::TextureOptions;
use egui::Vec2;
use reqwest::blocking::Client;
use tracing::debug;
use tracing::warn;

use super::MarkerId;
use super::MarkerSpec;
use super::MarkerState;
use super::Orientation;
use super::PanoramaViewer;
use super::ViewerEvent;
use super::camera::Camera;
use super::camera::CameraAnimation;
use crate::error::TourError;
use crate::task::spawn_image_load;
use crate::tour::model::PanoramaImage;
use crate::ui::preview_pane::draw_hotspot_marker;

const MARKER_HIT_RADIUS: f32 = 12.0;

static NEXT_VIEWER: AtomicU64 = AtomicU64::new(0);

enum ImageState {
    Loading(mpsc::Receiver<Result<egui::ColorImage, TourError>>),
    Ready(egui::TextureHandle),
    Failed(String),
    Destroyed,
}

pub struct SphereViewer {
    name: String,
    state: ImageState,
    camera: Camera,
    animation: Option<CameraAnimation>,
    markers: BTreeMap<MarkerId, MarkerSpec>,
    draggable: bool,
    dragging: Option<MarkerId>,
    events: Vec<ViewerEvent>,
}

impl SphereViewer {
    /// Starts decoding `image` in the background. Remote images are fetched with `client`.
    pub fn new(image: &PanoramaImage, client: &Client) -> Self {
        let name = format!("panorama-{}", NEXT_VIEWER.fetch_add(1, Ordering::Relaxed));
        Self {
            name,
            state: ImageState::Loading(spawn_image_load(image.clone(), client.clone())),
            camera: Camera::default(),
            animation: None,
            markers: BTreeMap::new(),
            draggable: false,
            dragging: None,
            events: Vec::new(),
        }
    }

    fn poll_load(&mut self, ctx: &egui::Context) {
        let ImageState::Loading(receiver) = &self.state else {
            return;
        };

        match receiver.try_recv() {
            Ok(Ok(image)) => {
                debug!("{}: decoded {}x{}", self.name, image.size[0], image.size[1]);
                self.state = ImageState::Ready(ctx.load_texture(self.name.clone(), image, TextureOptions::LINEAR_REPEAT));
                self.events.push(ViewerEvent::Loaded);
            }
            Ok(Err(err)) => {
                warn!("{}: failed to load panorama: {err}", self.name);
                self.events.push(ViewerEvent::Error(err.to_string()));
                self.state = ImageState::Failed(err.to_string());
            }
            Err(TryRecvError::Empty) => ctx.request_repaint_after(Duration::from_millis(100)),
            Err(TryRecvError::Disconnected) => {
                let message = TourError::BackgroundTaskCompleted.to_string();
                self.events.push(ViewerEvent::Error(message.clone()));
                self.state = ImageState::Failed(message);
            }
        }
    }

    fn marker_under(&self, pos: Pos2, view: Rect) -> Option<MarkerId> {
        self.markers
            .values()
            .filter_map(|marker| self.camera.project(marker.pitch, marker.yaw, view).map(|screen| (marker.id, screen.distance(pos))))
            .filter(|(_, distance)| *distance <= MARKER_HIT_RADIUS)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn handle_input(&mut self, ui: &egui::Ui, response: &egui::Response, view: Rect) {
        if response.drag_started() {
            let origin = ui.input(|input| input.pointer.press_origin());
            self.dragging = origin.filter(|_| self.draggable).and_then(|origin| self.marker_under(origin, view));
        }

        if response.dragged() {
            match self.dragging {
                Some(id) => {
                    if let Some(pointer) = response.interact_pointer_pos()
                        && let Some(marker) = self.markers.get_mut(&id)
                    {
                        let (pitch, yaw) = self.camera.unproject(pointer, view);
                        marker.pitch = pitch;
                        marker.yaw = yaw;
                    }
                }
                None => {
                    self.animation = None;
                    self.camera.drag(response.drag_delta(), view);
                }
            }
        }

        if response.drag_stopped()
            && let Some(id) = self.dragging.take()
            && let Some(marker) = self.markers.get(&id)
        {
            self.events.push(ViewerEvent::MarkerMoved { id, pitch: marker.pitch, yaw: marker.yaw });
        }

        if response.clicked()
            && let Some(pos) = response.interact_pointer_pos()
            && let Some(id) = self.marker_under(pos, view)
        {
            self.events.push(ViewerEvent::MarkerClicked(id));
        }

        if response.hovered() {
            let scroll = ui.input(|input| input.smooth_scroll_delta.y);
            if scroll != 0.0 {
                self.camera.zoom(scroll, view);
            }
        }
    }
}

impl PanoramaViewer for SphereViewer {
    fn is_ready(&self) -> bool {
        matches!(self.state, ImageState::Ready(_))
    }

    fn orientation(&self) -> Option<Orientation> {
        self.is_ready().then(|| self.camera.orientation())
    }

    fn look_at(&mut self, yaw: f64, pitch: f64, duration: Duration) {
        if matches!(self.state, ImageState::Destroyed) {
            debug!("{}: look_at on a destroyed viewer", self.name);
            return;
        }
        self.animation = Some(CameraAnimation::new(&self.camera, yaw, pitch, Instant::now(), duration));
    }

    fn add_hotspot(&mut self, spec: MarkerSpec) {
        self.markers.insert(spec.id, spec);
    }

    fn remove_hotspot(&mut self, id: MarkerId) {
        self.markers.remove(&id);
        if self.dragging == Some(id) {
            self.dragging = None;
        }
    }

    fn set_markers_draggable(&mut self, draggable: bool) {
        self.draggable = draggable;
        if !draggable {
            self.dragging = None;
        }
    }

    fn destroy(&mut self) {
        if matches!(self.state, ImageState::Destroyed) {
            return;
        }
        debug!("{}: destroyed", self.name);
        // Dropping the texture handle frees the GPU texture; a pending load
        // finds its receiver gone and is discarded.
        self.state = ImageState::Destroyed;
        self.markers.clear();
        self.animation = None;
        self.dragging = None;
        self.events.clear();
    }

    fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    fn show(&mut self, ui: &mut egui::Ui) {
        self.poll_load(ui.ctx());

        let (view, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(view);
        painter.rect_filled(view, 0.0, Color32::BLACK);

        let texture = match &self.state {
            ImageState::Ready(texture) => texture.id(),
            ImageState::Loading(_) => {
                ui.put(Rect::from_center_size(view.center(), Vec2::splat(32.0)), egui::Spinner::new().size(32.0));
                return;
            }
            ImageState::Failed(message) => {
                painter.text(view.center(), egui::Align2::CENTER_CENTER, message, egui::FontId::proportional(14.0), Color32::LIGHT_RED);
                return;
            }
            ImageState::Destroyed => return,
        };

        if let Some(animation) = self.animation {
            let (yaw, pitch, done) = animation.sample(Instant::now());
            self.camera.yaw = yaw;
            self.camera.pitch = pitch;
            if done {
                self.animation = None;
            } else {
                ui.ctx().request_repaint();
            }
        }
        self.camera.keep_in_bounds(view);

        self.handle_input(ui, &response, view);

        painter.image(texture, view, self.camera.uv_rect(view), Color32::WHITE);

        let hovered = response.hover_pos().and_then(|pos| self.marker_under(pos, view));
        for marker in self.markers.values() {
            let Some(pos) = self.camera.project(marker.pitch, marker.yaw, view) else {
                continue;
            };
            let state = MarkerState { hovered: hovered == Some(marker.id), dragging: self.dragging == Some(marker.id) };
            let renderer = marker.renderer.unwrap_or(draw_hotspot_marker);
            renderer(&painter, pos, marker, state);
        }

        if hovered.is_some() {
            ui.ctx().set_cursor_icon(if self.draggable { egui::CursorIcon::Grab } else { egui::CursorIcon::PointingHand });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::thread;

    use super::*;

    fn wait_for_load(viewer: &mut SphereViewer, ctx: &egui::Context) {
        for _ in 0..500 {
            viewer.poll_load(ctx);
            if !matches!(viewer.state, ImageState::Loading(_)) {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("panorama never finished loading");
    }

    fn local_png() -> PanoramaImage {
        let image = image::RgbaImage::from_pixel(16, 8, image::Rgba([200, 200, 200, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        PanoramaImage::local("aula.png", bytes.into_inner())
    }

    #[test]
    fn loads_local_image_then_destroys_idempotently() {
        let ctx = egui::Context::default();
        let mut viewer = SphereViewer::new(&local_png(), &Client::new());
        assert!(!viewer.is_ready());
        assert_eq!(viewer.orientation(), None);

        wait_for_load(&mut viewer, &ctx);
        assert!(viewer.is_ready());
        assert!(viewer.orientation().is_some());
        assert_eq!(viewer.take_events(), vec![ViewerEvent::Loaded]);

        viewer.destroy();
        viewer.destroy();
        assert!(!viewer.is_ready());
        assert_eq!(viewer.orientation(), None);
    }

    #[test]
    fn broken_image_reports_an_error_event() {
        let ctx = egui::Context::default();
        let mut viewer = SphereViewer::new(&PanoramaImage::local("rusak.jpg", b"bukan gambar".to_vec()), &Client::new());

        wait_for_load(&mut viewer, &ctx);
        assert!(!viewer.is_ready());
        assert!(matches!(viewer.take_events().as_slice(), [ViewerEvent::Error(_)]));
    }
}
