use std::time::Instant;

use egui::Color32;
use egui::RichText;
use egui_extras::Column;
use egui_extras::TableBuilder;
use humansize::DECIMAL;
use humansize::format_size;
use itertools::Itertools;
use tracing::debug;

use crate::app::TourStudioTabViewer;
use crate::icons;
use crate::tab_state::TabState;
use crate::tour::manager::ActionKey;
use crate::tour::model::DraftKey;
use crate::tour::model::PanoramaId;
use crate::tour::model::PanoramaImage;
use crate::ui::hotspot_editor::EditorAction;
use crate::ui::hotspot_editor::EditorPhase;
use crate::ui::preview_pane::PaneEvent;
use crate::ui::preview_pane::PaneProps;
use crate::util::format_degrees;

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

enum RowAction {
    Edit(DraftKey),
    Delete(DraftKey),
}

impl TourStudioTabViewer<'_> {
    pub fn build_tour_editor_tab(&mut self, ui: &mut egui::Ui) {
        egui::SidePanel::left("panorama_list_panel").default_width(260.0).show_inside(ui, |ui| {
            self.build_panorama_list(ui);
        });

        egui::CentralPanel::default().show_inside(ui, |ui| {
            self.build_form_toolbar(ui);
            ui.separator();

            egui::TopBottomPanel::bottom("hotspot_list_panel").resizable(true).default_height(180.0).show_inside(ui, |ui| {
                self.build_hotspot_table(ui);
            });

            egui::CentralPanel::default().show_inside(ui, |ui| {
                self.build_editor_pane(ui);
            });
        });

        let ctx = ui.ctx().clone();
        self.show_hotspot_dialog(&ctx);
        self.show_clear_confirmation(&ctx);
        self.show_delete_confirmation(&ctx);
    }

    fn build_panorama_list(&mut self, ui: &mut egui::Ui) {
        let state = &mut *self.tab_state;
        let can_edit = state.can_edit();

        ui.heading("Panoramas");
        ui.horizontal(|ui| {
            let mut search = state.manager.search().to_string();
            let response = ui.add(egui::TextEdit::singleline(&mut search).hint_text(format!("{} Search rooms", icons::MAGNIFYING_GLASS)).desired_width(160.0));
            if response.changed() {
                state.manager.set_search(search.clone());
            }
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if submitted || ui.button(icons::ARROWS_CLOCKWISE).on_hover_text("Reload tour").clicked() {
                state.settings.last_search = search;
                state.manager.load_tour();
            }
        });

        if ui.add_enabled(can_edit, egui::Button::new(format!("{} New panorama", icons::PLUS))).on_disabled_hover_text("Sign in to edit the tour").clicked() {
            state.manager.start_new_panorama();
        }
        ui.separator();

        if state.manager.is_loading() {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading tour...");
            });
        }

        if let Some(error) = state.manager.load_error().map(str::to_string) {
            ui.label(RichText::new(format!("{} {error}", icons::WARNING)).color(ui.visuals().error_fg_color));
            if ui.button("Retry").clicked() {
                state.manager.load_tour();
            }
            return;
        }

        if state.manager.panoramas().is_empty() && !state.manager.is_loading() {
            ui.label(RichText::new("No panoramas yet").weak());
            return;
        }

        let selected = state.manager.selected();
        let rows: Vec<(PanoramaId, String, usize)> = state
            .manager
            .panoramas()
            .iter()
            .filter_map(|panorama| panorama.id.map(|id| (id, panorama.display_name().to_string(), panorama.hotspots.len())))
            .collect();

        let mut select = None;
        egui::ScrollArea::vertical().id_salt("panorama_list_scroll_area").show(ui, |ui| {
            for (id, name, hotspot_count) in rows {
                ui.horizontal(|ui| {
                    if ui.selectable_label(selected == Some(id), &name).on_hover_text(format!("{hotspot_count} hotspot(s)")).clicked() {
                        select = Some(id);
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let deleting = state.manager.is_in_flight(ActionKey::DeletePanorama(id));
                        if deleting {
                            ui.spinner();
                        } else if can_edit && ui.small_button(icons::TRASH).on_hover_text("Delete panorama").clicked() {
                            state.pending_panorama_delete = Some(id);
                        }
                        if ui.small_button(icons::EYE).on_hover_text("Preview").clicked() {
                            state.modal_preview = Some(id);
                        }
                    });
                });
            }
        });

        if let Some(id) = select
            && Some(id) != selected
        {
            state.manager.select_panorama(id);
        }
    }

    fn build_form_toolbar(&mut self, ui: &mut egui::Ui) {
        let state = &mut *self.tab_state;
        let editing = state.manager.is_editing();

        if !editing && state.manager.selected().is_none() {
            ui.label(RichText::new("Select a panorama on the left or create a new one.").weak());
            return;
        }

        ui.horizontal(|ui| {
            if editing {
                ui.label("Room name");
                ui.add(egui::TextEdit::singleline(state.manager.room_name_mut()).hint_text("Aula").desired_width(200.0));

                if ui.button(format!("{} Choose image...", icons::FOLDER_OPEN)).clicked()
                    && let Some(path) = rfd::FileDialog::new().add_filter("Panorama image", &IMAGE_EXTENSIONS).pick_file()
                    && let Err(err) = state.manager.choose_image(&path)
                {
                    state.report_error(&err);
                }
                ui.label(image_summary(&state.manager.form().image));
            } else {
                ui.heading(state.manager.form().room_name.as_str());
            }
        });

        ui.horizontal(|ui| {
            if editing {
                let uploading = state.manager.is_uploading();
                if ui.add_enabled(!uploading, egui::Button::new(format!("{} Save panorama", icons::FLOPPY_DISK))).clicked()
                    && let Err(err) = state.manager.save_panorama()
                {
                    state.report_error(&err);
                }
                if uploading {
                    ui.spinner();
                }
                if ui.button(format!("{} Cancel", icons::X)).clicked() {
                    state.manager.cancel_edit();
                }
                ui.separator();
                if ui.button(format!("{} Add hotspot", icons::MAP_PIN)).on_hover_text("Opens the hotspot dialog at the current camera position").clicked() {
                    state.manager.open_new_hotspot(Instant::now());
                }
                let has_hotspots = !state.manager.form().hotspots.is_empty();
                if ui.add_enabled(has_hotspots, egui::Button::new(format!("{} Clear hotspots", icons::BROOM))).clicked() {
                    state.manager.request_clear_hotspots();
                }
            } else if ui
                .add_enabled(state.can_edit(), egui::Button::new(format!("{} Edit", icons::PENCIL_SIMPLE)))
                .on_disabled_hover_text("Sign in to edit the tour")
                .clicked()
            {
                state.manager.edit_selected();
            }
        });

        let Some(id) = state.manager.form().id else {
            return;
        };
        let graph = state.manager.graph();

        let linked_from = graph.incoming(id).filter_map(|edge| graph.name(edge.from)).unique().join(", ");
        if !linked_from.is_empty() {
            ui.label(RichText::new(format!("{} Linked from: {linked_from}", icons::ARROW_BEND_DOWN_RIGHT)).weak());
        }
        let leads_to = graph.outgoing(id).filter_map(|edge| graph.name(edge.to)).unique().join(", ");
        if !leads_to.is_empty() {
            ui.label(RichText::new(format!("{} Leads to: {leads_to}", icons::ARROW_BEND_UP_RIGHT)).weak());
        }
        let dangling = graph.dangling_edges().into_iter().filter(|edge| edge.from == id).count();
        if dangling > 0 {
            ui.label(
                RichText::new(format!("{} {dangling} hotspot(s) lead to a panorama that no longer exists", icons::WARNING))
                    .color(ui.visuals().warn_fg_color),
            );
        }
    }

    fn build_hotspot_table(&mut self, ui: &mut egui::Ui) {
        let state = &mut *self.tab_state;
        let editing = state.manager.is_editing();
        let mut actions = Vec::new();

        ui.strong(format!("Hotspots ({})", state.manager.form().hotspots.len()));

        let table = TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
            .column(Column::initial(160.0).clip(true))
            .column(Column::initial(70.0))
            .column(Column::initial(70.0))
            .column(Column::initial(160.0).clip(true))
            .column(Column::initial(110.0))
            .column(Column::remainder())
            .min_scrolled_height(0.0)
            .id_salt("hotspot_table");

        let table = table.header(20.0, |mut header| {
            for title in ["Title", "Pitch", "Yaw", "Leads to", "Status", ""] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        });

        let manager = &state.manager;
        table.body(|mut body| {
            for draft in &manager.form().hotspots {
                let hotspot = &draft.hotspot;
                let active = manager.active_hotspot() == Some(draft.key);
                body.row(26.0, |mut row| {
                    row.set_selected(active);
                    row.col(|ui| {
                        if hotspot.text.trim().is_empty() {
                            ui.label(RichText::new("Untitled").italics().weak());
                        } else {
                            ui.label(&hotspot.text).on_hover_text(hotspot.description.as_deref().unwrap_or_default());
                        }
                    });
                    row.col(|ui| {
                        ui.label(format_degrees(hotspot.pitch));
                    });
                    row.col(|ui| {
                        ui.label(format_degrees(hotspot.yaw));
                    });
                    row.col(|ui| match hotspot.target_panorama_id {
                        None => {
                            ui.label(RichText::new("Nowhere").weak());
                        }
                        Some(target) => match manager.panorama(target) {
                            Some(panorama) => {
                                ui.label(panorama.display_name());
                            }
                            None => {
                                ui.label(RichText::new(format!("{} Missing #{target}", icons::WARNING)).color(Color32::LIGHT_RED));
                            }
                        },
                    });
                    row.col(|ui| {
                        if manager.is_in_flight(ActionKey::SaveHotspot(draft.key)) || manager.is_in_flight(ActionKey::DeleteHotspot(draft.key)) {
                            ui.spinner();
                        } else if manager.pending_hotspots().contains(&draft.key) {
                            ui.label(format!("{} Waiting", icons::CLOCK)).on_hover_text("Saved once the panorama has been created");
                        } else if hotspot.is_persisted() {
                            ui.label(format!("{} Saved", icons::CHECK_CIRCLE));
                        } else {
                            ui.label(RichText::new("Unsaved").weak());
                        }
                    });
                    row.col(|ui| {
                        if !editing {
                            return;
                        }
                        if ui.small_button(icons::PENCIL_SIMPLE).on_hover_text("Edit hotspot").clicked() {
                            actions.push(RowAction::Edit(draft.key));
                        }
                        let deleting = manager.is_in_flight(ActionKey::DeleteHotspot(draft.key));
                        if ui.add_enabled(!deleting, egui::Button::new(icons::TRASH).small()).on_hover_text("Delete hotspot").clicked() {
                            actions.push(RowAction::Delete(draft.key));
                        }
                    });
                });
            }
        });

        for action in actions {
            match action {
                RowAction::Edit(key) => {
                    state.manager.open_hotspot(key);
                }
                RowAction::Delete(key) => {
                    if let Err(err) = state.manager.delete_hotspot(key) {
                        state.report_error(&err);
                    }
                }
            }
        }
    }

    fn build_editor_pane(&mut self, ui: &mut egui::Ui) {
        let TabState { manager, panes, settings, toasts, .. } = &mut *self.tab_state;
        let Some(panes) = panes.as_mut() else {
            ui.label("Not connected");
            return;
        };
        let pane = &mut panes.editor;
        let now = Instant::now();

        let editing = manager.is_editing();
        let props = PaneProps {
            image: &manager.form().image,
            hotspots: &manager.form().hotspots,
            edit_mode: editing,
            panoramas: manager.panoramas(),
            show_labels: settings.show_labels,
            active_hotspot: manager.active_hotspot(),
            accepts_new_hotspots: editing,
        };
        pane.sync(&props, now);

        for command in manager.take_viewer_commands() {
            pane.apply(command, settings.look_at_duration());
        }

        pane.ui(ui);

        for event in pane.take_events() {
            match event {
                PaneEvent::AddHotspot(orientation) => {
                    manager.add_hotspot(orientation);
                }
                PaneEvent::SelectPanorama(target) => {
                    if !manager.navigate(target) {
                        debug!("hotspot target {target} is not part of the loaded tour");
                    }
                }
                PaneEvent::HotspotClicked(key) => {
                    manager.open_hotspot(key);
                }
                PaneEvent::HotspotMoved { key, pitch, yaw } => manager.move_hotspot(key, pitch, yaw),
                PaneEvent::ViewerError(message) => {
                    toasts.error(format!("Could not show panorama: {message}"));
                }
            }
        }

        manager.tick_editor(now, pane.current_orientation());
        if manager.editor().phase() == EditorPhase::Opening {
            ui.ctx().request_repaint_after(settings.dialog_settle_delay());
        }
        if editing {
            ui.ctx().request_repaint_after(settings.orientation_poll_interval());
        }
    }

    fn show_hotspot_dialog(&mut self, ctx: &egui::Context) {
        let state = &mut *self.tab_state;
        match state.manager.show_hotspot_editor(ctx) {
            Some(EditorAction::Save(submission)) => {
                // Validation problems are shown inside the dialog
                if let Err(err) = state.manager.save_hotspot(submission) {
                    debug!("hotspot not saved: {err}");
                }
            }
            Some(EditorAction::Delete(key)) => {
                if let Err(err) = state.manager.delete_hotspot(key) {
                    state.report_error(&err);
                }
            }
            Some(EditorAction::Cancel) => state.manager.close_hotspot_editor(),
            None => {}
        }
    }

    fn show_clear_confirmation(&mut self, ctx: &egui::Context) {
        let manager = &mut self.tab_state.manager;
        if !manager.is_clear_confirmation_open() {
            return;
        }

        let count = manager.form().hotspots.len();
        let saved = manager.form().hotspots.iter().filter(|draft| draft.hotspot.is_persisted()).count();
        let mut confirmed = None;
        egui::Window::new(format!("{} Remove all hotspots?", icons::WARNING)).collapsible(false).resizable(false).show(ctx, |ui| {
            ui.label(format!("This removes all {count} hotspot(s) from this panorama."));
            if saved > 0 {
                ui.label(format!("{saved} of them are already saved and will be deleted on the server."));
            }
            ui.horizontal(|ui| {
                if ui.button(RichText::new("Remove all").color(Color32::LIGHT_RED)).clicked() {
                    confirmed = Some(true);
                }
                if ui.button("Keep them").clicked() {
                    confirmed = Some(false);
                }
            });
        });

        match confirmed {
            Some(true) => manager.confirm_clear_hotspots(),
            Some(false) => manager.cancel_clear_hotspots(),
            None => {}
        }
    }

    fn show_delete_confirmation(&mut self, ctx: &egui::Context) {
        let state = &mut *self.tab_state;
        let Some(id) = state.pending_panorama_delete else {
            return;
        };
        let Some(name) = state.manager.panorama(id).map(|panorama| panorama.display_name().to_string()) else {
            state.pending_panorama_delete = None;
            return;
        };

        let referrers = state.manager.graph().referrers(id);
        let mut open = true;
        let mut confirmed = false;
        egui::Window::new(format!("{} Delete panorama", icons::TRASH)).collapsible(false).resizable(false).open(&mut open).show(ctx, |ui| {
            ui.label(format!("Delete \"{name}\" and all of its hotspots?"));
            if !referrers.is_empty() {
                ui.label(
                    RichText::new(format!("{} Still linked from {}. Remove those hotspots first.", icons::WARNING, referrers.join(", ")))
                        .color(ui.visuals().warn_fg_color),
                );
            }
            ui.horizontal(|ui| {
                if ui.add_enabled(referrers.is_empty(), egui::Button::new(RichText::new("Delete").color(Color32::LIGHT_RED))).clicked() {
                    confirmed = true;
                }
                if ui.button("Cancel").clicked() {
                    state.pending_panorama_delete = None;
                }
            });
        });

        if confirmed {
            state.pending_panorama_delete = None;
            if let Err(err) = state.manager.delete_panorama(id) {
                state.report_error(&err);
            }
        }
        if !open {
            state.pending_panorama_delete = None;
        }
    }
}

fn image_summary(image: &PanoramaImage) -> String {
    match image {
        PanoramaImage::None => "No image selected".to_string(),
        PanoramaImage::Remote(_) => format!("{} {}", icons::CLOUD_CHECK, image.file_name().unwrap_or_default()),
        PanoramaImage::Local { bytes, .. } => {
            format!("{} {} ({}, not uploaded yet)", icons::IMAGE, image.file_name().unwrap_or_default(), format_size(bytes.len(), DECIMAL))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_summary_reports_local_size() {
        let image = PanoramaImage::local("/tmp/aula.jpg", vec![0u8; 2_500]);
        let summary = image_summary(&image);
        assert!(summary.contains("aula.jpg"));
        assert!(summary.contains("2.50 kB"));
        assert_eq!(image_summary(&PanoramaImage::None), "No image selected");
    }
}
