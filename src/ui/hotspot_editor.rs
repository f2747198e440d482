use std::time::Duration;
use std::time::Instant;

use egui::Color32;
use egui::DragValue;
use egui::RichText;
use tracing::debug;

use crate::error::ValidationError;
use crate::icons;
use crate::tour::model::DraftHotspot;
use crate::tour::model::DraftKey;
use crate::tour::model::Hotspot;
use crate::tour::model::Panorama;
use crate::tour::model::PanoramaId;
use crate::viewer::Orientation;
use crate::viewer::ViewerCommand;
use crate::viewer::camera::normalize_yaw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorPhase {
    Closed,
    /// Waiting for the camera to settle before reading default coordinates.
    Opening,
    Editing,
    Submitting,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorFields {
    pub title: String,
    pub description: String,
    /// `None` until the camera position has been read.
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub target_panorama_id: Option<PanoramaId>,
}

/// Original hotspot with the dialog's edits applied.
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotSubmission {
    /// `None` when the dialog was opened without a provisional hotspot.
    pub key: Option<DraftKey>,
    pub hotspot: Hotspot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    Save(HotspotSubmission),
    Delete(DraftKey),
    Cancel,
}

pub struct HotspotEditor {
    phase: EditorPhase,
    ready_at: Option<Instant>,
    key: Option<DraftKey>,
    original: Hotspot,
    fields: EditorFields,
    warning: Option<String>,
    settle_delay: Duration,
}

impl HotspotEditor {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            phase: EditorPhase::Closed,
            ready_at: None,
            key: None,
            original: Hotspot::default(),
            fields: EditorFields::default(),
            warning: None,
            settle_delay,
        }
    }

    pub fn set_settle_delay(&mut self, settle_delay: Duration) {
        self.settle_delay = settle_delay;
    }

    pub fn phase(&self) -> EditorPhase {
        self.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase != EditorPhase::Closed
    }

    pub fn key(&self) -> Option<DraftKey> {
        self.key
    }

    pub fn fields(&self) -> &EditorFields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut EditorFields {
        &mut self.fields
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Opens an empty dialog. Coordinates are taken from the camera once it settles.
    pub fn open_new(&mut self, origin: Option<PanoramaId>, now: Instant) {
        self.phase = EditorPhase::Opening;
        self.ready_at = Some(now + self.settle_delay);
        self.key = None;
        self.original = Hotspot { origin_panorama_id: origin, ..Default::default() };
        self.fields = EditorFields::default();
        self.warning = None;
    }

    /// Opens the dialog on a hotspot that already has coordinates. The stored
    /// values win over the live camera; the returned command points the camera
    /// at the hotspot so both agree.
    pub fn open_existing(&mut self, draft: &DraftHotspot) -> ViewerCommand {
        let hotspot = &draft.hotspot;
        self.phase = EditorPhase::Editing;
        self.ready_at = None;
        self.key = Some(draft.key);
        self.original = hotspot.clone();
        self.fields = EditorFields {
            title: hotspot.text.clone(),
            description: hotspot.description.clone().unwrap_or_default(),
            pitch: Some(hotspot.pitch),
            yaw: Some(normalize_yaw(hotspot.yaw)),
            target_panorama_id: hotspot.target_panorama_id,
        };
        self.warning = None;

        ViewerCommand::LookAt { yaw: hotspot.yaw, pitch: hotspot.pitch }
    }

    pub fn tick(&mut self, now: Instant, camera: Option<Orientation>) {
        if self.phase != EditorPhase::Opening || self.ready_at.is_some_and(|ready_at| now < ready_at) {
            return;
        }

        let orientation = camera.unwrap_or_else(|| {
            debug!("viewer not ready while opening hotspot editor, defaulting coordinates");
            Orientation::new(0.0, 0.0)
        });
        self.fields.pitch = Some(orientation.pitch);
        self.fields.yaw = Some(normalize_yaw(orientation.yaw));
        self.ready_at = None;
        self.phase = EditorPhase::Editing;
    }

    /// The draft created for a keyless submission.
    pub fn bind(&mut self, key: DraftKey) {
        if self.is_open() && self.key.is_none() {
            self.key = Some(key);
        }
    }

    pub fn submit(&mut self) -> Result<HotspotSubmission, ValidationError> {
        let result = self.build_submission();
        match &result {
            Ok(_) => {
                self.phase = EditorPhase::Submitting;
                self.warning = None;
            }
            Err(err) => self.warning = Some(err.to_string()),
        }
        result
    }

    fn build_submission(&self) -> Result<HotspotSubmission, ValidationError> {
        if self.phase == EditorPhase::Opening {
            return Err(ValidationError::CoordinatesPending);
        }

        let description = self.fields.description.trim();
        let hotspot = Hotspot {
            text: self.fields.title.trim().to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            pitch: self.fields.pitch.ok_or(ValidationError::CoordinatesPending)?,
            yaw: self.fields.yaw.ok_or(ValidationError::CoordinatesPending)?,
            target_panorama_id: self.fields.target_panorama_id,
            ..self.original.clone()
        };
        hotspot.validate()?;

        Ok(HotspotSubmission { key: self.key, hotspot })
    }

    pub fn save_failed(&mut self, message: impl Into<String>) {
        if self.is_open() {
            self.phase = EditorPhase::Editing;
            self.warning = Some(message.into());
        }
    }

    pub fn close(&mut self) {
        self.phase = EditorPhase::Closed;
        self.ready_at = None;
        self.key = None;
        self.warning = None;
    }

    pub fn show(&mut self, ctx: &egui::Context, panoramas: &[Panorama], current: Option<PanoramaId>, saving: bool) -> Option<EditorAction> {
        if !self.is_open() {
            return None;
        }

        let title = if self.original.is_persisted() { "Edit Hotspot" } else { "New Hotspot" };
        let mut open = true;
        let mut action = None;
        egui::Window::new(format!("{} {title}", icons::MAP_PIN)).collapsible(false).resizable(false).open(&mut open).show(ctx, |ui| {
            if self.phase == EditorPhase::Opening {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Reading camera position...");
                });
                return;
            }

            egui::Grid::new("hotspot_editor_grid").num_columns(2).spacing([12.0, 6.0]).show(ui, |ui| {
                ui.label("Title");
                ui.add(egui::TextEdit::singleline(&mut self.fields.title).hint_text("Pintu Masuk"));
                ui.end_row();

                ui.label("Description");
                ui.add(egui::TextEdit::multiline(&mut self.fields.description).desired_rows(3));
                ui.end_row();

                ui.label("Pitch");
                if let Some(pitch) = self.fields.pitch.as_mut() {
                    ui.add(DragValue::new(pitch).speed(0.1).range(-90.0..=90.0).clamp_existing_to_range(false).suffix("°"));
                }
                ui.end_row();

                ui.label("Yaw");
                if let Some(yaw) = self.fields.yaw.as_mut() {
                    ui.add(DragValue::new(yaw).speed(0.1).range(-180.0..=180.0).clamp_existing_to_range(false).suffix("°"));
                }
                ui.end_row();

                ui.label("Leads to");
                let choices = target_choices(panoramas, current);
                let selected_text = self
                    .fields
                    .target_panorama_id
                    .and_then(|id| choices.iter().find(|(choice, _)| *choice == id).map(|(_, name)| name.clone()))
                    .unwrap_or_else(|| "Nowhere".to_string());
                egui::ComboBox::from_id_salt("hotspot_target_combobox").selected_text(selected_text).show_ui(ui, |ui| {
                    ui.selectable_value(&mut self.fields.target_panorama_id, None, "Nowhere");
                    for (id, name) in &choices {
                        ui.selectable_value(&mut self.fields.target_panorama_id, Some(*id), name);
                    }
                });
                ui.end_row();
            });

            if let Some(warning) = &self.warning {
                ui.label(RichText::new(format!("{} {warning}", icons::WARNING)).color(Color32::LIGHT_RED));
            }

            ui.separator();
            ui.horizontal(|ui| {
                let can_save = self.phase == EditorPhase::Editing && !saving;
                if ui.add_enabled(can_save, egui::Button::new(format!("{} Save", icons::FLOPPY_DISK))).clicked() {
                    match self.submit() {
                        Ok(submission) => action = Some(EditorAction::Save(submission)),
                        Err(err) => debug!("hotspot rejected locally: {err}"),
                    }
                }
                if self.phase == EditorPhase::Submitting {
                    ui.spinner();
                }
                if let Some(key) = self.key
                    && ui.add_enabled(!saving, egui::Button::new(format!("{} Delete", icons::TRASH))).clicked()
                {
                    action = Some(EditorAction::Delete(key));
                }
                if ui.button("Cancel").clicked() {
                    action = Some(EditorAction::Cancel);
                }
            });
        });

        if !open {
            action = Some(EditorAction::Cancel);
        }
        action
    }
}

/// Panoramas a hotspot may lead to. The panorama the hotspot sits on is left
/// out, as are panoramas that have not been saved yet.
pub fn target_choices(panoramas: &[Panorama], current: Option<PanoramaId>) -> Vec<(PanoramaId, String)> {
    panoramas
        .iter()
        .filter_map(|panorama| panorama.id.map(|id| (id, panorama.display_name().to_string())))
        .filter(|(id, _)| Some(*id) != current)
        .collect()
}
