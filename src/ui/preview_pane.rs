//! A pane showing one panorama through its own viewer instance.
//!
//! The pane owns the viewer handle. When the image changes the old viewer is
//! destroyed and a fresh one is created through the pane's factory; a viewer
//! is never repointed at a different image. The same goes for markers: any
//! change to the hotspot list removes every marker and adds the whole set
//! again.

use std::time::Duration;
use std::time::Instant;

use egui::Align2;
use egui::Color32;
use egui::FontId;
use egui::Stroke;
use egui::UiBuilder;
use egui::Vec2;
use tracing::debug;

use crate::icons;
use crate::tour::model::DraftHotspot;
use crate::tour::model::DraftKey;
use crate::tour::model::Panorama;
use crate::tour::model::PanoramaId;
use crate::tour::model::PanoramaImage;
use crate::util::format_degrees;
use crate::viewer::MarkerSpec;
use crate::viewer::MarkerState;
use crate::viewer::Orientation;
use crate::viewer::PanoramaViewer;
use crate::viewer::ViewerCommand;
use crate::viewer::ViewerEvent;

pub type ViewerFactory = Box<dyn Fn(&PanoramaImage) -> Box<dyn PanoramaViewer>>;

/// What the pane should show this frame.
pub struct PaneProps<'a> {
    pub image: &'a PanoramaImage,
    pub hotspots: &'a [DraftHotspot],
    pub edit_mode: bool,
    pub panoramas: &'a [Panorama],
    pub show_labels: bool,
    pub active_hotspot: Option<DraftKey>,
    /// Someone is listening for [`PaneEvent::AddHotspot`].
    pub accepts_new_hotspots: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaneEvent {
    AddHotspot(Orientation),
    SelectPanorama(PanoramaId),
    HotspotClicked(DraftKey),
    HotspotMoved { key: DraftKey, pitch: f64, yaw: f64 },
    ViewerError(String),
}

/// Everything the rendered markers depend on.
#[derive(Debug, PartialEq)]
struct MarkerSet {
    hotspots: Vec<DraftHotspot>,
    targets: Vec<Option<PanoramaId>>,
    active: Option<DraftKey>,
    show_labels: bool,
}

impl MarkerSet {
    fn new(props: &PaneProps<'_>) -> Self {
        let targets = props
            .hotspots
            .iter()
            .map(|draft| draft.hotspot.target_panorama_id.filter(|target| props.panoramas.iter().any(|panorama| panorama.id == Some(*target))))
            .collect();
        Self { hotspots: props.hotspots.to_vec(), targets, active: props.active_hotspot, show_labels: props.show_labels }
    }

    fn target_of(&self, key: DraftKey) -> Option<PanoramaId> {
        let index = self.hotspots.iter().position(|draft| draft.key == key)?;
        self.targets[index]
    }

    fn specs(&self) -> impl Iterator<Item = MarkerSpec> + '_ {
        self.hotspots.iter().zip(&self.targets).map(|(draft, target)| MarkerSpec {
            id: draft.key.into(),
            pitch: draft.hotspot.pitch,
            yaw: draft.hotspot.yaw,
            label: self.show_labels.then(|| draft.hotspot.text.clone()).filter(|text| !text.trim().is_empty()),
            active: self.active == Some(draft.key),
            linked: target.is_some(),
            renderer: Some(draw_hotspot_marker),
        })
    }
}

pub struct PreviewPane {
    name: &'static str,
    factory: ViewerFactory,
    viewer: Option<Box<dyn PanoramaViewer>>,
    image: PanoramaImage,
    markers: Option<MarkerSet>,
    draggable: Option<bool>,
    edit_mode: bool,
    accepts_new_hotspots: bool,
    poll_interval: Duration,
    next_poll: Option<Instant>,
    live_orientation: Option<Orientation>,
    events: Vec<PaneEvent>,
}

impl PreviewPane {
    pub fn new(name: &'static str, factory: ViewerFactory, poll_interval: Duration) -> Self {
        Self {
            name,
            factory,
            viewer: None,
            image: PanoramaImage::None,
            markers: None,
            draggable: None,
            edit_mode: false,
            accepts_new_hotspots: false,
            poll_interval,
            next_poll: None,
            live_orientation: None,
            events: Vec::new(),
        }
    }

    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    pub fn has_viewer(&self) -> bool {
        self.viewer.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.viewer.as_ref().is_some_and(|viewer| viewer.is_ready())
    }

    /// Camera orientation as of the last poll.
    pub fn live_orientation(&self) -> Option<Orientation> {
        self.live_orientation
    }

    /// Camera orientation read from the viewer right now.
    pub fn current_orientation(&self) -> Option<Orientation> {
        self.viewer.as_ref().and_then(|viewer| viewer.orientation())
    }

    pub fn take_events(&mut self) -> Vec<PaneEvent> {
        std::mem::take(&mut self.events)
    }

    /// Brings the viewer in line with `props`.
    pub fn sync(&mut self, props: &PaneProps<'_>, now: Instant) {
        if props.image != &self.image {
            self.rebind(props.image.clone(), now);
        }
        self.edit_mode = props.edit_mode;
        self.accepts_new_hotspots = props.accepts_new_hotspots;

        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        if self.draggable != Some(props.edit_mode) {
            viewer.set_markers_draggable(props.edit_mode);
            self.draggable = Some(props.edit_mode);
        }

        let desired = MarkerSet::new(props);
        if self.markers.as_ref() != Some(&desired) {
            if let Some(previous) = &self.markers {
                for draft in &previous.hotspots {
                    viewer.remove_hotspot(draft.key.into());
                }
            }
            for spec in desired.specs() {
                viewer.add_hotspot(spec);
            }
            self.markers = Some(desired);
        }

        if self.next_poll.is_some_and(|deadline| now >= deadline) {
            self.live_orientation = viewer.orientation();
            self.next_poll = Some(now + self.poll_interval);
        }

        self.drain_viewer_events();
    }

    fn rebind(&mut self, image: PanoramaImage, now: Instant) {
        self.release();
        if image.is_present() {
            debug!("{}: creating viewer for {:?}", self.name, image.file_name());
            self.viewer = Some((self.factory)(&image));
            self.next_poll = Some(now);
        }
        self.image = image;
    }

    /// Destroys the viewer and stops polling. The pane can be synced again afterwards.
    pub fn release(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            debug!("{}: destroying viewer", self.name);
            viewer.destroy();
        }
        self.image = PanoramaImage::None;
        self.markers = None;
        self.draggable = None;
        self.next_poll = None;
        self.live_orientation = None;
    }

    /// Emits [`PaneEvent::AddHotspot`] at the current camera centre.
    pub fn add_hotspot_here(&mut self) -> Option<Orientation> {
        if !self.edit_mode || !self.accepts_new_hotspots {
            debug!("{}: add hotspot ignored outside edit mode", self.name);
            return None;
        }
        let Some(orientation) = self.viewer.as_ref().filter(|viewer| viewer.is_ready()).and_then(|viewer| viewer.orientation()) else {
            debug!("{}: viewer is not ready, add hotspot ignored", self.name);
            return None;
        };

        self.events.push(PaneEvent::AddHotspot(orientation));
        Some(orientation)
    }

    pub fn apply(&mut self, command: ViewerCommand, duration: Duration) {
        let Some(viewer) = self.viewer.as_mut() else {
            debug!("{}: no viewer for {command:?}", self.name);
            return;
        };
        match command {
            ViewerCommand::LookAt { yaw, pitch } => viewer.look_at(yaw, pitch, duration),
        }
    }

    fn drain_viewer_events(&mut self) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };

        for event in viewer.take_events() {
            match event {
                ViewerEvent::Loaded => debug!("{}: panorama loaded", self.name),
                ViewerEvent::Error(message) => self.events.push(PaneEvent::ViewerError(message)),
                ViewerEvent::MarkerClicked(id) => {
                    let key = DraftKey::from(id);
                    if self.edit_mode {
                        self.events.push(PaneEvent::HotspotClicked(key));
                    } else if let Some(target) = self.markers.as_ref().and_then(|markers| markers.target_of(key)) {
                        self.events.push(PaneEvent::SelectPanorama(target));
                    } else {
                        debug!("{}: hotspot {key:?} has no reachable target", self.name);
                    }
                }
                ViewerEvent::MarkerMoved { id, pitch, yaw } if self.edit_mode => {
                    self.events.push(PaneEvent::HotspotMoved { key: id.into(), pitch, yaw });
                }
                ViewerEvent::MarkerMoved { .. } => {}
            }
        }
    }

    pub fn ui(&mut self, ui: &mut egui::Ui) {
        let rect = ui.available_rect_before_wrap();
        let Some(viewer) = self.viewer.as_mut() else {
            ui.allocate_rect(rect, egui::Sense::hover());
            ui.painter().rect_filled(rect, 4.0, ui.visuals().extreme_bg_color);
            ui.painter().text(
                rect.center(),
                Align2::CENTER_CENTER,
                format!("{} No panorama image", icons::IMAGE),
                FontId::proportional(16.0),
                ui.visuals().weak_text_color(),
            );
            return;
        };

        ui.scope_builder(UiBuilder::new().max_rect(rect), |ui| viewer.show(ui));

        if self.edit_mode {
            let center = rect.center();
            let stroke = Stroke::new(1.5, Color32::from_white_alpha(200));
            ui.painter().circle_stroke(center, 6.0, stroke);
            ui.painter().line_segment([center - Vec2::X * 14.0, center - Vec2::X * 8.0], stroke);
            ui.painter().line_segment([center + Vec2::X * 8.0, center + Vec2::X * 14.0], stroke);

            if let Some(orientation) = self.live_orientation {
                ui.painter().text(
                    rect.left_top() + Vec2::splat(8.0),
                    Align2::LEFT_TOP,
                    format!("yaw {}  pitch {}", format_degrees(orientation.yaw), format_degrees(orientation.pitch)),
                    FontId::monospace(12.0),
                    Color32::WHITE,
                );
            }

            if self.accepts_new_hotspots {
                let button_rect = egui::Rect::from_center_size(egui::pos2(center.x, rect.bottom() - 28.0), Vec2::new(180.0, 28.0));
                let ready = self.is_ready();
                let clicked = ui
                    .scope_builder(UiBuilder::new().max_rect(button_rect), |ui| {
                        ui.add_enabled(ready, egui::Button::new(format!("{} Add hotspot here", icons::PLUS_CIRCLE)).min_size(button_rect.size()))
                            .on_disabled_hover_text("Panorama is still loading")
                            .clicked()
                    })
                    .inner;
                if clicked {
                    self.add_hotspot_here();
                }
            }
        }

        self.drain_viewer_events();
    }
}

impl Drop for PreviewPane {
    fn drop(&mut self) {
        self.release();
    }
}

/// Default marker look: a dot, highlighted when active, with an optional caption.
pub fn draw_hotspot_marker(painter: &egui::Painter, pos: egui::Pos2, spec: &MarkerSpec, state: MarkerState) {
    let fill = if spec.active {
        Color32::from_rgb(0xF5, 0x9E, 0x0B)
    } else if spec.linked {
        Color32::from_rgb(0x25, 0x63, 0xEB)
    } else {
        Color32::from_rgb(0xE5, 0xE7, 0xEB)
    };
    let radius = if state.hovered || state.dragging { 11.0 } else { 9.0 };

    painter.circle(pos, radius, fill, Stroke::new(2.0, Color32::WHITE));
    if spec.linked {
        painter.text(pos, Align2::CENTER_CENTER, icons::ARROW_UP, FontId::proportional(11.0), Color32::WHITE);
    }

    if let Some(label) = &spec.label {
        let galley = painter.layout_no_wrap(label.clone(), FontId::proportional(13.0), Color32::WHITE);
        let text_pos = pos + Vec2::new(-galley.size().x / 2.0, radius + 4.0);
        let background = egui::Rect::from_min_size(text_pos, galley.size()).expand(3.0);
        painter.rect_filled(background, 3.0, Color32::from_black_alpha(170));
        painter.galley(text_pos, galley, Color32::WHITE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_viewer_factory;
    use crate::tour::model::Hotspot;
    use crate::tour::model::HotspotId;
    use crate::viewer::MarkerId;

    fn panorama(id: u64) -> Panorama {
        Panorama { id: Some(PanoramaId(id)), room_name: format!("Room {id}"), ..Default::default() }
    }

    fn draft(key: u64, target: Option<u64>) -> DraftHotspot {
        DraftHotspot {
            key: DraftKey(key),
            hotspot: Hotspot {
                id: Some(HotspotId(key)),
                origin_panorama_id: Some(PanoramaId(1)),
                text: format!("Hotspot {key}"),
                target_panorama_id: target.map(PanoramaId),
                ..Default::default()
            },
        }
    }

    fn props<'a>(image: &'a PanoramaImage, hotspots: &'a [DraftHotspot], panoramas: &'a [Panorama], edit_mode: bool) -> PaneProps<'a> {
        PaneProps { image, hotspots, edit_mode, panoramas, show_labels: true, active_hotspot: None, accepts_new_hotspots: true }
    }

    #[test]
    fn image_change_recreates_the_viewer() {
        let (factory, log) = mock_viewer_factory();
        let mut pane = PreviewPane::new("test", factory, Duration::from_millis(100));
        let now = Instant::now();
        let aula = PanoramaImage::Remote("http://x/aula.jpg".into());
        let kelas = PanoramaImage::Remote("http://x/kelas.jpg".into());

        pane.sync(&props(&aula, &[], &[], false), now);
        pane.sync(&props(&aula, &[], &[], false), now);
        assert_eq!(log.borrow().created.len(), 1);
        assert_eq!(log.borrow().destroyed, 0);

        pane.sync(&props(&kelas, &[], &[], false), now);
        assert_eq!(log.borrow().created, vec![aula, kelas]);
        assert_eq!(log.borrow().destroyed, 1);

        pane.sync(&props(&PanoramaImage::None, &[], &[], false), now);
        assert!(!pane.has_viewer());
        assert_eq!(log.borrow().destroyed, 2);
    }

    #[test]
    fn marker_changes_replace_the_whole_set() {
        let (factory, log) = mock_viewer_factory();
        let mut pane = PreviewPane::new("test", factory, Duration::from_millis(100));
        let now = Instant::now();
        let image = PanoramaImage::Remote("http://x/aula.jpg".into());
        let hotspots = vec![draft(1, None), draft(2, Some(2))];
        let panoramas = vec![panorama(1), panorama(2)];

        pane.sync(&props(&image, &hotspots, &panoramas, true), now);
        pane.sync(&props(&image, &hotspots, &panoramas, true), now);
        assert_eq!(log.borrow().marker_adds, 2);
        assert!(log.borrow().markers[&MarkerId(2)].linked);

        let mut with_active = props(&image, &hotspots, &panoramas, true);
        with_active.active_hotspot = Some(DraftKey(1));
        pane.sync(&with_active, now);
        assert_eq!(log.borrow().marker_adds, 4);
        assert_eq!(log.borrow().markers.len(), 2);
        assert!(log.borrow().markers[&MarkerId(1)].active);

        pane.sync(&props(&image, &hotspots[..1], &panoramas, true), now);
        assert_eq!(log.borrow().markers.keys().copied().collect::<Vec<_>>(), vec![MarkerId(1)]);
    }

    #[test]
    fn add_hotspot_here_is_guarded() {
        let (factory, log) = mock_viewer_factory();
        let mut pane = PreviewPane::new("test", factory, Duration::from_millis(100));
        let now = Instant::now();
        let image = PanoramaImage::Remote("http://x/aula.jpg".into());

        pane.sync(&props(&image, &[], &[], true), now);
        assert_eq!(pane.add_hotspot_here(), None);

        log.borrow_mut().ready = true;
        log.borrow_mut().orientation = Some(Orientation::new(-2.1, 42.0));
        pane.sync(&props(&image, &[], &[], false), now);
        assert_eq!(pane.add_hotspot_here(), None);

        let mut no_handler = props(&image, &[], &[], true);
        no_handler.accepts_new_hotspots = false;
        pane.sync(&no_handler, now);
        assert_eq!(pane.add_hotspot_here(), None);
        assert!(pane.take_events().is_empty());

        pane.sync(&props(&image, &[], &[], true), now);
        assert_eq!(pane.add_hotspot_here(), Some(Orientation::new(-2.1, 42.0)));
        assert_eq!(pane.take_events(), vec![PaneEvent::AddHotspot(Orientation::new(-2.1, 42.0))]);
    }

    #[test]
    fn marker_clicks_navigate_only_to_loaded_targets() {
        let (factory, log) = mock_viewer_factory();
        let mut pane = PreviewPane::new("test", factory, Duration::from_millis(100));
        let now = Instant::now();
        let image = PanoramaImage::Remote("http://x/aula.jpg".into());
        let hotspots = vec![draft(1, Some(2)), draft(2, Some(99)), draft(3, None)];
        let panoramas = vec![panorama(1), panorama(2)];

        pane.sync(&props(&image, &hotspots, &panoramas, false), now);
        log.borrow_mut().pending_events =
            vec![ViewerEvent::MarkerClicked(MarkerId(1)), ViewerEvent::MarkerClicked(MarkerId(2)), ViewerEvent::MarkerClicked(MarkerId(3))];
        pane.sync(&props(&image, &hotspots, &panoramas, false), now);
        assert_eq!(pane.take_events(), vec![PaneEvent::SelectPanorama(PanoramaId(2))]);

        log.borrow_mut().pending_events = vec![ViewerEvent::MarkerClicked(MarkerId(3)), ViewerEvent::MarkerMoved { id: MarkerId(3), pitch: 1.0, yaw: 2.0 }];
        pane.sync(&props(&image, &hotspots, &panoramas, true), now);
        assert_eq!(pane.take_events(), vec![
            PaneEvent::HotspotClicked(DraftKey(3)),
            PaneEvent::HotspotMoved { key: DraftKey(3), pitch: 1.0, yaw: 2.0 }
        ]);
    }

    #[test]
    fn orientation_is_polled_on_the_interval() {
        let (factory, log) = mock_viewer_factory();
        let mut pane = PreviewPane::new("test", factory, Duration::from_millis(100));
        let start = Instant::now();
        let image = PanoramaImage::Remote("http://x/aula.jpg".into());
        log.borrow_mut().ready = true;
        log.borrow_mut().orientation = Some(Orientation::new(0.0, 10.0));

        pane.sync(&props(&image, &[], &[], false), start);
        assert_eq!(pane.live_orientation(), Some(Orientation::new(0.0, 10.0)));

        log.borrow_mut().orientation = Some(Orientation::new(0.0, 20.0));
        pane.sync(&props(&image, &[], &[], false), start + Duration::from_millis(50));
        assert_eq!(pane.live_orientation(), Some(Orientation::new(0.0, 10.0)));
        pane.sync(&props(&image, &[], &[], false), start + Duration::from_millis(100));
        assert_eq!(pane.live_orientation(), Some(Orientation::new(0.0, 20.0)));

        pane.release();
        assert_eq!(pane.live_orientation(), None);
    }

    #[test]
    fn dropping_the_pane_destroys_its_viewer() {
        let (factory, log) = mock_viewer_factory();
        let mut pane = PreviewPane::new("test", factory, Duration::from_millis(100));
        pane.sync(&props(&PanoramaImage::Remote("http://x/aula.jpg".into()), &[], &[], false), Instant::now());
        drop(pane);
        assert_eq!(log.borrow().destroyed, 1);
    }
}
