//! Orchestrates one virtual tour editing session.
//!
//! The manager never touches the network. Operations queue [`TourRequest`]s
//! in an outbox; the host drains it with [`TourManager::take_requests`], runs
//! the requests wherever it likes and reports back through
//! [`TourManager::complete`]. Every request carries an [`ActionKey`] so the
//! same logical action is never in flight twice.
//!
//! Hotspots are always persisted after the panorama they sit on. A hotspot
//! saved on a panorama without an id is parked in `pending_hotspots`, the
//! panorama is created first, and the parked hotspots are replayed against
//! the new id.

use std::collections::HashMap;
use std::collections::HashSet;
use std::mem;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::api::HotspotPayload;
use crate::api::ImageUpload;
use crate::api::PanoramaUpload;
use crate::api::TourRequest;
use crate::api::TourResponse;
use crate::error::TourError;
use crate::error::ValidationError;
use crate::tour::graph::TourGraph;
use crate::tour::model::DraftHotspot;
use crate::tour::model::DraftKey;
use crate::tour::model::Hotspot;
use crate::tour::model::HotspotId;
use crate::tour::model::Panorama;
use crate::tour::model::PanoramaId;
use crate::tour::model::PanoramaImage;
use crate::ui::hotspot_editor::EditorAction;
use crate::ui::hotspot_editor::HotspotEditor;
use crate::ui::hotspot_editor::HotspotSubmission;
use crate::viewer::Orientation;
use crate::viewer::ViewerCommand;

/// Working copy of the panorama being shown or edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanoramaForm {
    pub id: Option<PanoramaId>,
    pub room_name: String,
    pub image: PanoramaImage,
    pub hotspots: Vec<DraftHotspot>,
}

impl PanoramaForm {
    pub fn find(&self, key: DraftKey) -> Option<&DraftHotspot> {
        self.hotspots.iter().find(|draft| draft.key == key)
    }

    fn find_mut(&mut self, key: DraftKey) -> Option<&mut DraftHotspot> {
        self.hotspots.iter_mut().find(|draft| draft.key == key)
    }

    fn remove(&mut self, key: DraftKey) -> Option<DraftHotspot> {
        let index = self.hotspots.iter().position(|draft| draft.key == key)?;
        Some(self.hotspots.remove(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Viewing,
    Editing,
}

/// Logical action a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKey {
    LoadTour,
    SavePanorama,
    DeletePanorama(PanoramaId),
    SaveHotspot(DraftKey),
    DeleteHotspot(DraftKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub ticket: Ticket,
    pub request: TourRequest,
}

#[derive(Debug, Clone, Copy)]
enum Purpose {
    Load,
    SavePanorama { generation: u64, explicit: bool },
    DeletePanorama(PanoramaId),
    SaveHotspot { generation: u64, key: DraftKey, panorama_id: PanoramaId },
    DeleteHotspot { generation: u64, key: DraftKey, panorama_id: PanoramaId, hotspot_id: HotspotId },
}

impl Purpose {
    fn action(&self) -> ActionKey {
        match self {
            Purpose::Load => ActionKey::LoadTour,
            Purpose::SavePanorama { .. } => ActionKey::SavePanorama,
            Purpose::DeletePanorama(id) => ActionKey::DeletePanorama(*id),
            Purpose::SaveHotspot { key, .. } => ActionKey::SaveHotspot(*key),
            Purpose::DeleteHotspot { key, .. } => ActionKey::DeleteHotspot(*key),
        }
    }
}

/// Outcome of a background request worth telling the user about.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Info(String),
    Error(String),
}

pub struct TourManager {
    panoramas: Vec<Panorama>,
    search: String,
    load_error: Option<String>,

    selected: Option<PanoramaId>,
    mode: EditorMode,
    form: PanoramaForm,
    /// Bumped whenever `form` starts describing a different panorama, so late
    /// responses can tell whether they still apply to it.
    generation: u64,
    active_hotspot: Option<DraftKey>,
    pending_hotspots: Vec<DraftKey>,
    /// Drafts edited locally since the server last confirmed them.
    dirty_hotspots: HashSet<DraftKey>,
    /// Drafts the user deleted while their save was still in flight.
    delete_after_save: HashSet<DraftKey>,
    confirm_clear: bool,
    editor: HotspotEditor,

    in_flight: HashMap<Ticket, Purpose>,
    outbox: Vec<OutboundRequest>,
    next_ticket: u64,
    next_draft: u64,

    viewer_commands: Vec<ViewerCommand>,
    notices: Vec<Notice>,
    session_expired: bool,
}

impl TourManager {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            panoramas: Vec::new(),
            search: String::new(),
            load_error: None,
            selected: None,
            mode: EditorMode::Viewing,
            form: PanoramaForm::default(),
            generation: 0,
            active_hotspot: None,
            pending_hotspots: Vec::new(),
            dirty_hotspots: HashSet::new(),
            delete_after_save: HashSet::new(),
            confirm_clear: false,
            editor: HotspotEditor::new(settle_delay),
            in_flight: HashMap::new(),
            outbox: Vec::new(),
            next_ticket: 0,
            next_draft: 0,
            viewer_commands: Vec::new(),
            notices: Vec::new(),
            session_expired: false,
        }
    }

    pub fn panoramas(&self) -> &[Panorama] {
        &self.panoramas
    }

    pub fn panorama(&self, id: PanoramaId) -> Option<&Panorama> {
        self.panoramas.iter().find(|panorama| panorama.id == Some(id))
    }

    pub fn graph(&self) -> TourGraph {
        TourGraph::build(&self.panoramas)
    }

    pub fn selected(&self) -> Option<PanoramaId> {
        self.selected
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        self.mode == EditorMode::Editing
    }

    pub fn form(&self) -> &PanoramaForm {
        &self.form
    }

    pub fn room_name_mut(&mut self) -> &mut String {
        &mut self.form.room_name
    }

    pub fn active_hotspot(&self) -> Option<DraftKey> {
        self.active_hotspot
    }

    pub fn pending_hotspots(&self) -> &[DraftKey] {
        &self.pending_hotspots
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    pub fn editor(&self) -> &HotspotEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut HotspotEditor {
        &mut self.editor
    }

    pub fn is_clear_confirmation_open(&self) -> bool {
        self.confirm_clear
    }

    pub fn is_in_flight(&self, action: ActionKey) -> bool {
        self.in_flight.values().any(|purpose| purpose.action() == action)
    }

    pub fn is_loading(&self) -> bool {
        self.is_in_flight(ActionKey::LoadTour)
    }

    /// Only uploads for the panorama currently in the form count. A save
    /// started for a form the user has since left must not hold this one up.
    pub fn is_uploading(&self) -> bool {
        self.in_flight.values().any(|purpose| matches!(purpose, Purpose::SavePanorama { generation, .. } if *generation == self.generation))
    }

    pub fn is_saving_hotspot(&self) -> bool {
        self.in_flight.values().any(|purpose| matches!(purpose, Purpose::SaveHotspot { .. }))
    }

    pub fn has_work_in_flight(&self) -> bool {
        !self.in_flight.is_empty() || !self.outbox.is_empty()
    }

    pub fn take_requests(&mut self) -> Vec<OutboundRequest> {
        mem::take(&mut self.outbox)
    }

    pub fn take_viewer_commands(&mut self) -> Vec<ViewerCommand> {
        mem::take(&mut self.viewer_commands)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        mem::take(&mut self.notices)
    }

    /// Returns `true` once after the backend rejected the session token.
    pub fn take_session_expired(&mut self) -> bool {
        mem::take(&mut self.session_expired)
    }

    fn enqueue(&mut self, purpose: Purpose, request: TourRequest) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        debug!("queueing {} as {ticket:?}", request.describe());
        self.in_flight.insert(ticket, purpose);
        self.outbox.push(OutboundRequest { ticket, request });
        ticket
    }

    fn next_draft_key(&mut self) -> DraftKey {
        let key = DraftKey(self.next_draft);
        self.next_draft += 1;
        key
    }

    fn drafts_for(&mut self, panorama: &Panorama) -> Vec<DraftHotspot> {
        panorama.hotspots.iter().map(|hotspot| DraftHotspot { key: self.next_draft_key(), hotspot: hotspot.clone() }).collect()
    }

    fn reset_session(&mut self) {
        self.generation += 1;
        self.active_hotspot = None;
        self.pending_hotspots.clear();
        self.dirty_hotspots.clear();
        self.confirm_clear = false;
        self.editor.close();
    }

    fn error_message(&mut self, err: &TourError) -> String {
        if matches!(err, TourError::Unauthorized) {
            self.session_expired = true;
        }
        err.user_message()
    }

    fn notify_error(&mut self, message: String) {
        warn!("{message}");
        self.notices.push(Notice::Error(message));
    }

    fn notify_info(&mut self, message: String) {
        info!("{message}");
        self.notices.push(Notice::Info(message));
    }

    // --- Panoramas -------------------------------------------------------

    pub fn load_tour(&mut self) {
        if self.is_loading() {
            debug!("tour list already loading");
            return;
        }
        let search = self.search.trim().to_string();
        self.enqueue(Purpose::Load, TourRequest::ListPanoramas { search });
    }

    /// Shows a loaded panorama. Unknown ids are ignored and `false` is returned.
    pub fn select_panorama(&mut self, id: PanoramaId) -> bool {
        let Some(panorama) = self.panorama(id).cloned() else {
            debug!("panorama {id} is not loaded, selection unchanged");
            return false;
        };

        self.reset_session();
        self.selected = Some(id);
        let hotspots = self.drafts_for(&panorama);
        self.form = PanoramaForm { id: panorama.id, room_name: panorama.room_name, image: panorama.image, hotspots };
        self.mode = EditorMode::Viewing;
        true
    }

    /// Follows a hotspot link. Targets that are not loaded leave the current selection untouched.
    pub fn navigate(&mut self, target: PanoramaId) -> bool {
        self.select_panorama(target)
    }

    pub fn start_new_panorama(&mut self) {
        self.reset_session();
        self.selected = None;
        self.form = PanoramaForm::default();
        self.mode = EditorMode::Editing;
    }

    pub fn edit_selected(&mut self) -> bool {
        if self.selected.is_none() {
            return false;
        }
        self.mode = EditorMode::Editing;
        true
    }

    /// Drops local edits and goes back to showing the last saved state.
    pub fn cancel_edit(&mut self) {
        if let Some(id) = self.form.id
            && self.select_panorama(id)
        {
            return;
        }

        self.reset_session();
        self.selected = None;
        self.form = PanoramaForm::default();
        self.mode = EditorMode::Viewing;
    }

    pub fn choose_image(&mut self, path: &Path) -> Result<(), TourError> {
        let bytes = std::fs::read(path)?;
        self.set_local_image(path.to_path_buf(), bytes);
        Ok(())
    }

    /// Holds a picked image in memory; nothing is uploaded until the panorama is saved.
    pub fn set_local_image(&mut self, path: PathBuf, bytes: Vec<u8>) {
        if !self.is_editing() {
            debug!("image change ignored outside edit mode");
            return;
        }
        self.form.image = PanoramaImage::Local { path, bytes: bytes.into() };
    }

    fn panorama_upload(&self) -> Result<PanoramaUpload, ValidationError> {
        let room_name = self.form.room_name.trim();
        if room_name.is_empty() {
            return Err(ValidationError::MissingRoomName);
        }

        let image = match &self.form.image {
            PanoramaImage::None => return Err(ValidationError::MissingImage),
            PanoramaImage::Remote(_) if self.form.id.is_none() => return Err(ValidationError::MissingImage),
            PanoramaImage::Remote(_) => None,
            PanoramaImage::Local { path, bytes } => Some(ImageUpload {
                file_name: path.file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_else(|| "panorama.jpg".to_string()),
                bytes: bytes.clone(),
            }),
        };

        Ok(PanoramaUpload { room_name: room_name.to_string(), image })
    }

    pub fn save_panorama(&mut self) -> Result<(), TourError> {
        if self.is_uploading() {
            debug!("panorama save already in flight");
            return Ok(());
        }

        let upload = self.panorama_upload()?;
        let request = match self.form.id {
            Some(id) => TourRequest::UpdatePanorama { id, upload },
            None => TourRequest::CreatePanorama(upload),
        };
        self.enqueue(Purpose::SavePanorama { generation: self.generation, explicit: true }, request);
        Ok(())
    }

    /// Panoramas still targeted by hotspots elsewhere are refused before any request is made.
    pub fn delete_panorama(&mut self, id: PanoramaId) -> Result<(), TourError> {
        let graph = self.graph();
        if !graph.can_delete(id) {
            return Err(ValidationError::PanoramaReferenced { id, referrers: graph.referrers(id) }.into());
        }
        if self.is_in_flight(ActionKey::DeletePanorama(id)) {
            debug!("panorama {id} delete already in flight");
            return Ok(());
        }

        self.enqueue(Purpose::DeletePanorama(id), TourRequest::DeletePanorama { id });
        Ok(())
    }

    // --- Hotspots --------------------------------------------------------

    /// Captures a provisional hotspot at `position` and opens the editor on it.
    pub fn add_hotspot(&mut self, position: Orientation) -> Option<DraftKey> {
        if !self.is_editing() {
            debug!("add hotspot ignored outside edit mode");
            return None;
        }

        let key = self.next_draft_key();
        let draft = DraftHotspot { key, hotspot: Hotspot::at(self.form.id, position.pitch, position.yaw) };
        let command = self.editor.open_existing(&draft);
        self.form.hotspots.push(draft);
        self.active_hotspot = Some(key);
        self.viewer_commands.push(command);
        Some(key)
    }

    /// Opens the editor with coordinates read from the camera once it settles.
    pub fn open_new_hotspot(&mut self, now: Instant) {
        if !self.is_editing() {
            return;
        }
        self.active_hotspot = None;
        self.editor.open_new(self.form.id, now);
    }

    pub fn open_hotspot(&mut self, key: DraftKey) -> bool {
        if !self.is_editing() {
            return false;
        }
        let Some(draft) = self.form.find(key) else {
            return false;
        };
        let command = self.editor.open_existing(draft);
        self.active_hotspot = Some(key);
        self.viewer_commands.push(command);
        true
    }

    pub fn tick_editor(&mut self, now: Instant, camera: Option<Orientation>) {
        self.editor.tick(now, camera);
    }

    pub fn show_hotspot_editor(&mut self, ctx: &egui::Context) -> Option<EditorAction> {
        let saving = self.editor.key().is_some_and(|key| self.is_in_flight(ActionKey::SaveHotspot(key)));
        self.editor.show(ctx, &self.panoramas, self.form.id, saving)
    }

    /// Closes the dialog. A freshly captured hotspot that was never saved is discarded.
    pub fn close_hotspot_editor(&mut self) {
        if let Some(key) = self.editor.key()
            && !self.pending_hotspots.contains(&key)
            && !self.is_in_flight(ActionKey::SaveHotspot(key))
            && self.form.find(key).is_some_and(|draft| !draft.hotspot.is_persisted() && draft.hotspot.text.trim().is_empty())
        {
            self.form.remove(key);
        }
        self.editor.close();
        self.active_hotspot = None;
    }

    pub fn move_hotspot(&mut self, key: DraftKey, pitch: f64, yaw: f64) {
        if !self.is_editing() {
            return;
        }
        if let Some(draft) = self.form.find_mut(key) {
            draft.hotspot.pitch = pitch;
            draft.hotspot.yaw = yaw;
            self.dirty_hotspots.insert(key);
        }
        if self.editor.key() == Some(key) {
            let fields = self.editor.fields_mut();
            fields.pitch = Some(pitch);
            fields.yaw = Some(yaw);
        }
    }

    pub fn save_hotspot(&mut self, submission: HotspotSubmission) -> Result<(), TourError> {
        if let Err(err) = submission.hotspot.validate() {
            self.editor.save_failed(err.to_string());
            return Err(err.into());
        }

        let key = match submission.key.filter(|key| self.form.find(*key).is_some()) {
            Some(key) => key,
            None => {
                let key = self.next_draft_key();
                self.form.hotspots.push(DraftHotspot { key, hotspot: submission.hotspot.clone() });
                self.editor.bind(key);
                key
            }
        };

        if self.is_in_flight(ActionKey::SaveHotspot(key)) {
            debug!("hotspot {key:?} save already in flight, ignoring duplicate");
            return Ok(());
        }

        let origin = self.form.id;
        if let Some(draft) = self.form.find_mut(key) {
            draft.hotspot = Hotspot { origin_panorama_id: origin.or(submission.hotspot.origin_panorama_id), ..submission.hotspot };
            self.dirty_hotspots.insert(key);
        }
        self.active_hotspot = Some(key);

        match origin {
            Some(panorama_id) => self.dispatch_hotspot_save(key, panorama_id),
            None => self.defer_hotspot(key),
        }
        Ok(())
    }

    fn dispatch_hotspot_save(&mut self, key: DraftKey, panorama_id: PanoramaId) {
        let Some(draft) = self.form.find(key) else {
            debug!("hotspot {key:?} disappeared before it could be saved");
            return;
        };

        let payload = HotspotPayload::new(&draft.hotspot, panorama_id);
        let request = match draft.hotspot.id {
            Some(hotspot_id) => TourRequest::UpdateHotspot { panorama_id, hotspot_id, payload },
            None => TourRequest::CreateHotspot { panorama_id, payload },
        };
        self.enqueue(Purpose::SaveHotspot { generation: self.generation, key, panorama_id }, request);
    }

    /// Parks a hotspot until its panorama has an id, creating the panorama if possible.
    fn defer_hotspot(&mut self, key: DraftKey) {
        if !self.pending_hotspots.contains(&key) {
            self.pending_hotspots.push(key);
        }
        if self.is_uploading() {
            debug!("panorama create in flight, hotspot {key:?} queued behind it");
            return;
        }

        match self.panorama_upload() {
            Ok(upload) => {
                debug!("creating panorama before hotspot {key:?}");
                self.enqueue(Purpose::SavePanorama { generation: self.generation, explicit: false }, TourRequest::CreatePanorama(upload));
            }
            Err(err) => {
                debug!("hotspot {key:?} waits for the panorama: {err}");
                if self.editor.key() == Some(key) {
                    self.editor.close();
                }
                self.notify_info("Hotspot will be saved together with the panorama".to_string());
            }
        }
    }

    pub fn delete_hotspot(&mut self, key: DraftKey) -> Result<(), TourError> {
        let Some(draft) = self.form.find(key) else {
            return Ok(());
        };
        let hotspot_id = draft.hotspot.id;

        self.pending_hotspots.retain(|pending| *pending != key);
        if self.editor.key() == Some(key) {
            self.editor.close();
        }

        if self.is_in_flight(ActionKey::SaveHotspot(key)) {
            // The id the save returns is deleted as soon as it arrives
            debug!("hotspot {key:?} deleted while saving, deleting once saved");
            self.delete_after_save.insert(key);
            return Ok(());
        }

        match (hotspot_id, self.form.id) {
            (Some(hotspot_id), Some(panorama_id)) => {
                if self.is_in_flight(ActionKey::DeleteHotspot(key)) {
                    return Ok(());
                }
                // Removed locally only once the server agrees
                self.enqueue(
                    Purpose::DeleteHotspot { generation: self.generation, key, panorama_id, hotspot_id },
                    TourRequest::DeleteHotspot { panorama_id, hotspot_id },
                );
            }
            _ => {
                self.form.remove(key);
                if self.active_hotspot == Some(key) {
                    self.active_hotspot = None;
                }
            }
        }
        Ok(())
    }

    pub fn request_clear_hotspots(&mut self) {
        if self.is_editing() && !self.form.hotspots.is_empty() {
            self.confirm_clear = true;
        }
    }

    pub fn cancel_clear_hotspots(&mut self) {
        self.confirm_clear = false;
    }

    /// Removes every hotspot of the form, deleting persisted ones on the server.
    pub fn confirm_clear_hotspots(&mut self) {
        self.confirm_clear = false;
        let keys: Vec<DraftKey> = self.form.hotspots.iter().map(|draft| draft.key).collect();
        for key in keys {
            // Only fails on unknown keys, which cannot happen here
            let _ = self.delete_hotspot(key);
        }
        self.active_hotspot = None;
    }

    // --- Completions -----------------------------------------------------

    pub fn complete(&mut self, ticket: Ticket, result: Result<TourResponse, TourError>) {
        let Some(purpose) = self.in_flight.remove(&ticket) else {
            warn!("completion for unknown request {ticket:?}");
            return;
        };

        match (purpose, result) {
            (Purpose::Load, Ok(TourResponse::Panoramas(panoramas))) => self.finish_load(panoramas),
            (Purpose::Load, Err(err)) => {
                let message = self.error_message(&err);
                warn!("failed to load tour: {message}");
                self.panoramas.clear();
                self.load_error = Some(message);
            }
            (Purpose::SavePanorama { generation, explicit }, Ok(TourResponse::Panorama(panorama))) => {
                self.finish_panorama_save(panorama, generation, explicit)
            }
            (Purpose::SavePanorama { generation, .. }, Err(err)) => {
                let message = self.error_message(&err);
                if generation == self.generation
                    && let Some(key) = self.editor.key()
                    && self.pending_hotspots.contains(&key)
                {
                    self.editor.save_failed(message.clone());
                }
                self.notify_error(format!("Could not save panorama: {message}"));
            }
            (Purpose::DeletePanorama(id), Ok(_)) => self.finish_panorama_delete(id),
            (Purpose::DeletePanorama(_), Err(err)) => {
                let message = self.error_message(&err);
                self.notify_error(format!("Could not delete panorama: {message}"));
            }
            (Purpose::SaveHotspot { generation, key, panorama_id }, Ok(TourResponse::Hotspot(hotspot))) => {
                self.finish_hotspot_save(hotspot, generation, key, panorama_id)
            }
            (Purpose::SaveHotspot { generation, key, .. }, Err(err)) => {
                let message = self.error_message(&err);
                if self.delete_after_save.remove(&key) {
                    debug!("save of deleted hotspot {key:?} failed: {message}");
                    if generation == self.generation
                        && let Err(err) = self.delete_hotspot(key)
                    {
                        warn!("could not delete hotspot {key:?} after its save failed: {err}");
                    }
                } else if self.editor.key() == Some(key) {
                    self.editor.save_failed(message);
                } else {
                    self.notify_error(format!("Could not save hotspot: {message}"));
                }
            }
            (Purpose::DeleteHotspot { generation, key, panorama_id, hotspot_id }, Ok(_)) => {
                self.finish_hotspot_delete(generation, key, panorama_id, hotspot_id)
            }
            (Purpose::DeleteHotspot { .. }, Err(err)) => {
                let message = self.error_message(&err);
                self.notify_error(format!("Could not delete hotspot: {message}"));
            }
            (purpose, Ok(response)) => warn!("unexpected response {response:?} for {purpose:?}"),
        }
    }

    fn finish_load(&mut self, panoramas: Vec<Panorama>) {
        self.panoramas = panoramas.into_iter().map(Panorama::canonicalize).collect();
        self.load_error = None;

        if self.mode != EditorMode::Viewing {
            return;
        }
        let Some(id) = self.selected else {
            return;
        };
        match self.panorama(id).cloned() {
            Some(panorama) => self.rebuild_form(&panorama),
            None => {
                debug!("selected panorama {id} no longer exists");
                self.reset_session();
                self.selected = None;
                self.form = PanoramaForm::default();
            }
        }
    }

    /// Refreshes the form from server data. Drafts keep their keys, and
    /// drafts whose save is still outstanding keep their local contents.
    fn rebuild_form(&mut self, panorama: &Panorama) {
        let old = mem::take(&mut self.form.hotspots);
        let mut hotspots = Vec::with_capacity(panorama.hotspots.len());

        for hotspot in &panorama.hotspots {
            match old.iter().find(|draft| draft.hotspot.id.is_some() && draft.hotspot.id == hotspot.id) {
                Some(draft) if self.has_outstanding_save(draft.key) || self.dirty_hotspots.contains(&draft.key) => hotspots.push(draft.clone()),
                Some(draft) => hotspots.push(DraftHotspot { key: draft.key, hotspot: hotspot.clone() }),
                None => {
                    let key = self.next_draft_key();
                    hotspots.push(DraftHotspot { key, hotspot: hotspot.clone() });
                }
            }
        }
        for draft in old {
            let kept = hotspots.iter().any(|hotspot| hotspot.key == draft.key);
            if !kept && (!draft.hotspot.is_persisted() || self.has_outstanding_save(draft.key)) {
                hotspots.push(draft);
            }
        }

        self.form.id = panorama.id;
        self.form.room_name = panorama.room_name.clone();
        self.form.image = panorama.image.clone();
        self.form.hotspots = hotspots;
    }

    fn has_outstanding_save(&self, key: DraftKey) -> bool {
        self.pending_hotspots.contains(&key) || self.is_in_flight(ActionKey::SaveHotspot(key))
    }

    fn upsert_panorama(&mut self, panorama: Panorama) {
        match self.panoramas.iter_mut().find(|existing| existing.id == panorama.id) {
            Some(existing) => *existing = panorama,
            None => self.panoramas.push(panorama),
        }
    }

    fn finish_panorama_save(&mut self, panorama: Panorama, generation: u64, explicit: bool) {
        let mut panorama = panorama.canonicalize();
        let Some(id) = panorama.id else {
            self.notify_error("The server returned a panorama without an id".to_string());
            return;
        };
        // Save responses may leave out the hotspot list
        if panorama.hotspots.is_empty()
            && let Some(known) = self.panorama(id)
        {
            panorama.hotspots = known.hotspots.clone();
        }
        self.upsert_panorama(panorama.clone());

        if generation != self.generation {
            debug!("panorama {id} saved after the form moved on");
            self.load_tour();
            return;
        }

        self.selected = Some(id);
        self.form.id = Some(id);
        for draft in &mut self.form.hotspots {
            draft.hotspot.origin_panorama_id = Some(id);
        }

        if explicit {
            // Local hotspot changes ride along with an explicit save
            let mut discarded = Vec::new();
            let changed: Vec<(DraftKey, bool)> = self
                .form
                .hotspots
                .iter()
                .filter(|draft| !draft.hotspot.is_persisted() || self.dirty_hotspots.contains(&draft.key))
                .map(|draft| (draft.key, draft.hotspot.validate().is_ok()))
                .collect();
            for (key, valid) in changed {
                if valid {
                    if !self.has_outstanding_save(key) {
                        self.pending_hotspots.push(key);
                    }
                } else if self.form.find(key).is_some_and(|draft| !draft.hotspot.is_persisted()) {
                    discarded.push(key);
                }
            }
            for key in &discarded {
                self.form.remove(*key);
            }
            if !discarded.is_empty() {
                self.notify_info(format!("Discarded {} untitled hotspot(s)", discarded.len()));
            }
        }

        self.rebuild_form(&panorama);

        if explicit {
            self.mode = EditorMode::Viewing;
            self.notify_info(format!("Saved {}", panorama.display_name()));
        }

        for key in mem::take(&mut self.pending_hotspots) {
            self.dispatch_hotspot_save(key, id);
        }
        self.load_tour();
    }

    fn finish_panorama_delete(&mut self, id: PanoramaId) {
        self.panoramas.retain(|panorama| panorama.id != Some(id));
        if self.selected == Some(id) || self.form.id == Some(id) {
            self.reset_session();
            self.selected = None;
            self.form = PanoramaForm::default();
            self.mode = EditorMode::Viewing;
        }
        self.notify_info("Panorama deleted".to_string());
        self.load_tour();
    }

    fn finish_hotspot_save(&mut self, mut hotspot: Hotspot, generation: u64, key: DraftKey, panorama_id: PanoramaId) {
        hotspot.origin_panorama_id.get_or_insert(panorama_id);
        if self.delete_after_save.remove(&key) {
            match hotspot.id {
                Some(hotspot_id) => {
                    self.enqueue(
                        Purpose::DeleteHotspot { generation, key, panorama_id, hotspot_id },
                        TourRequest::DeleteHotspot { panorama_id, hotspot_id },
                    );
                }
                None => warn!("server saved deleted hotspot {key:?} without an id"),
            }
            return;
        }
        if hotspot.origin_panorama_id != Some(panorama_id) {
            warn!("server placed hotspot {:?} on panorama {:?}, expected {panorama_id}", hotspot.id, hotspot.origin_panorama_id);
            return;
        }

        if let Some(panorama) = self.panoramas.iter_mut().find(|panorama| panorama.id == Some(panorama_id)) {
            match panorama.hotspots.iter_mut().find(|existing| existing.id.is_some() && existing.id == hotspot.id) {
                Some(existing) => *existing = hotspot.clone(),
                None => panorama.hotspots.push(hotspot.clone()),
            }
        }

        if generation != self.generation || self.form.id != Some(panorama_id) {
            return;
        }
        self.dirty_hotspots.remove(&key);
        match self.form.find_mut(key) {
            Some(draft) => draft.hotspot = hotspot,
            None => self.form.hotspots.push(DraftHotspot { key, hotspot }),
        }
        if self.editor.key() == Some(key) {
            self.editor.close();
        }
    }

    fn finish_hotspot_delete(&mut self, generation: u64, key: DraftKey, panorama_id: PanoramaId, hotspot_id: HotspotId) {
        if let Some(panorama) = self.panoramas.iter_mut().find(|panorama| panorama.id == Some(panorama_id)) {
            panorama.hotspots.retain(|hotspot| hotspot.id != Some(hotspot_id));
        }
        if generation == self.generation {
            self.form.remove(key);
            self.dirty_hotspots.remove(&key);
            if self.active_hotspot == Some(key) {
                self.active_hotspot = None;
            }
        }
    }
}
