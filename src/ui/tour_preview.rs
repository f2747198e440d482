use std::time::Instant;

use egui::RichText;
use tracing::debug;

use crate::app::TourStudioTabViewer;
use crate::icons;
use crate::tour::model::DraftHotspot;
use crate::tour::model::DraftKey;
use crate::tour::model::Panorama;
use crate::tour::model::PanoramaId;
use crate::ui::preview_pane::PaneEvent;
use crate::ui::preview_pane::PaneProps;
use crate::ui::preview_pane::PreviewPane;

/// Read-only hotspots for a saved panorama. Keys only need to be unique within it.
pub fn view_drafts(panorama: &Panorama) -> Vec<DraftHotspot> {
    panorama.hotspots.iter().enumerate().map(|(index, hotspot)| DraftHotspot { key: DraftKey(index as u64), hotspot: hotspot.clone() }).collect()
}

/// Where a visitor standing on `position` actually is. Falls back to the first
/// panorama when `position` was never set or has since been deleted.
pub fn resolve_position(panoramas: &[Panorama], position: Option<PanoramaId>) -> Option<PanoramaId> {
    position.filter(|id| panoramas.iter().any(|panorama| panorama.id == Some(*id))).or_else(|| panoramas.iter().find_map(|panorama| panorama.id))
}

/// Shows `panorama` the way a visitor sees it and returns the panorama they walked to, if any.
pub fn show_visitor_view(ui: &mut egui::Ui, pane: &mut PreviewPane, panorama: &Panorama, panoramas: &[Panorama], show_labels: bool) -> (Option<PanoramaId>, Vec<String>) {
    let hotspots = view_drafts(panorama);
    let props = PaneProps {
        image: &panorama.image,
        hotspots: &hotspots,
        edit_mode: false,
        panoramas,
        show_labels,
        active_hotspot: None,
        accepts_new_hotspots: false,
    };
    pane.sync(&props, Instant::now());
    pane.ui(ui);

    let mut destination = None;
    let mut errors = Vec::new();
    for event in pane.take_events() {
        match event {
            PaneEvent::SelectPanorama(target) => destination = Some(target),
            PaneEvent::ViewerError(message) => errors.push(message),
            other => debug!("visitor view ignored {other:?}"),
        }
    }
    (destination, errors)
}

impl TourStudioTabViewer<'_> {
    pub fn build_tour_preview_tab(&mut self, ui: &mut egui::Ui) {
        let state = &mut *self.tab_state;
        let panoramas = state.manager.panoramas();

        let Some(position) = resolve_position(panoramas, state.tour_position) else {
            ui.label(RichText::new("The tour has no saved panoramas yet.").weak());
            return;
        };
        let Some(panorama) = panoramas.iter().find(|panorama| panorama.id == Some(position)) else {
            return;
        };

        let graph = state.manager.graph();
        let mut jump_to = None;
        ui.horizontal(|ui| {
            ui.label(format!("{} You are in", icons::PERSON_SIMPLE_WALK));
            egui::ComboBox::from_id_salt("tour_position_combobox").selected_text(panorama.display_name()).show_ui(ui, |ui| {
                for candidate in panoramas {
                    if let Some(id) = candidate.id
                        && ui.selectable_label(id == position, candidate.display_name()).clicked()
                    {
                        jump_to = Some(id);
                    }
                }
            });
            let reachable = graph.reachable_from(position).len().saturating_sub(1);
            ui.label(RichText::new(format!("{reachable} other room(s) reachable from here")).weak());
        });
        ui.separator();

        let Some(panes) = state.panes.as_mut() else {
            ui.label("Not connected");
            return;
        };
        let (walked_to, errors) = show_visitor_view(ui, &mut panes.tour, panorama, panoramas, state.settings.show_labels);

        for message in errors {
            state.toasts.error(format!("Could not show panorama: {message}"));
        }
        if let Some(target) = jump_to.or(walked_to) {
            state.tour_position = Some(target);
        }
    }
}
