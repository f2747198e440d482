//! In-memory stand-ins for the REST backend and the panorama viewer.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::api::HotspotPayload;
use crate::api::PanoramaUpload;
use crate::api::TourBackend;
use crate::error::TourError;
use crate::tour::manager::TourManager;
use crate::tour::model::Hotspot;
use crate::tour::model::HotspotId;
use crate::tour::model::Panorama;
use crate::tour::model::PanoramaId;
use crate::tour::model::PanoramaImage;
use crate::ui::preview_pane::ViewerFactory;
use crate::viewer::MarkerId;
use crate::viewer::MarkerSpec;
use crate::viewer::Orientation;
use crate::viewer::PanoramaViewer;
use crate::viewer::ViewerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    List,
    CreatePanorama,
    UpdatePanorama,
    DeletePanorama,
    CreateHotspot,
    UpdateHotspot,
    DeleteHotspot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String),
    CreatePanorama(String),
    UpdatePanorama(PanoramaId),
    DeletePanorama(PanoramaId),
    CreateHotspot { panorama_id: PanoramaId, origin: PanoramaId, text: String },
    UpdateHotspot { panorama_id: PanoramaId, hotspot_id: HotspotId },
    DeleteHotspot { panorama_id: PanoramaId, hotspot_id: HotspotId },
}

enum Failure {
    Api(u16, String),
    Unauthorized,
}

#[derive(Default)]
struct Store {
    panoramas: BTreeMap<PanoramaId, Panorama>,
    next_id: u64,
    calls: Vec<Call>,
    failures: HashMap<CallKind, Failure>,
    omit_origin: bool,
    bare_panoramas: bool,
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, kind: CallKind, call: Call) -> Result<(), TourError> {
        self.calls.push(call);
        match self.failures.remove(&kind) {
            Some(Failure::Api(status, message)) => Err(TourError::Api { status, message }),
            Some(Failure::Unauthorized) => Err(TourError::Unauthorized),
            None => Ok(()),
        }
    }

    fn respond(&self, mut hotspot: Hotspot) -> Hotspot {
        if self.omit_origin {
            hotspot.origin_panorama_id = None;
        }
        hotspot
    }

    /// Panorama save responses without their hotspots, like a backend that does not eager-load them.
    fn respond_panorama(&self, panorama: &Panorama) -> Panorama {
        if self.bare_panoramas { Panorama { hotspots: Vec::new(), ..panorama.clone() } } else { panorama.clone() }
    }

    fn not_found(what: &str) -> TourError {
        TourError::Api { status: 404, message: format!("{what} tidak ditemukan") }
    }
}

/// Behaves like the school website's `/virtualtour` endpoints.
#[derive(Default)]
pub struct MockBackend {
    store: Mutex<Store>,
}

impl MockBackend {
    /// Inserts a panorama with hotspots given as `(title, target)`.
    pub fn seed(&self, room_name: &str, hotspots: &[(&str, Option<PanoramaId>)]) -> PanoramaId {
        let mut store = self.store.lock();
        let id = PanoramaId(store.next_id());
        let hotspots = hotspots
            .iter()
            .enumerate()
            .map(|(index, (text, target))| Hotspot {
                id: Some(HotspotId(store.next_id())),
                origin_panorama_id: Some(id),
                pitch: 0.0,
                yaw: index as f64 * 30.0,
                text: text.to_string(),
                description: None,
                target_panorama_id: *target,
            })
            .collect();
        let image = PanoramaImage::Remote(format!("http://localhost/storage/panorama/{}.jpg", room_name.to_lowercase()));
        store.panoramas.insert(id, Panorama { id: Some(id), room_name: room_name.to_string(), image, hotspots });
        id
    }

    /// Copies the first hotspot of `from` into the list of `into` without changing its origin.
    pub fn leak_hotspot(&self, from: PanoramaId, into: PanoramaId) {
        let mut store = self.store.lock();
        let Some(hotspot) = store.panoramas.get(&from).and_then(|panorama| panorama.hotspots.first().cloned()) else {
            return;
        };
        if let Some(panorama) = store.panoramas.get_mut(&into) {
            panorama.hotspots.push(hotspot);
        }
    }

    pub fn set_omit_origin(&self, omit: bool) {
        self.store.lock().omit_origin = omit;
    }

    pub fn set_bare_panorama_responses(&self, bare: bool) {
        self.store.lock().bare_panoramas = bare;
    }

    pub fn fail_next(&self, kind: CallKind, status: u16, message: &str) {
        self.store.lock().failures.insert(kind, Failure::Api(status, message.to_string()));
    }

    pub fn fail_unauthorized(&self, kind: CallKind) {
        self.store.lock().failures.insert(kind, Failure::Unauthorized);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.store.lock().calls.clone()
    }
}

impl TourBackend for MockBackend {
    fn list_panoramas(&self, search: &str) -> Result<Vec<Panorama>, TourError> {
        let mut store = self.store.lock();
        store.record(CallKind::List, Call::List(search.to_string()))?;
        let needle = search.to_lowercase();
        Ok(store
            .panoramas
            .values()
            .filter(|panorama| panorama.room_name.to_lowercase().contains(&needle))
            .map(|panorama| Panorama { hotspots: panorama.hotspots.iter().map(|hotspot| store.respond(hotspot.clone())).collect(), ..panorama.clone() })
            .collect())
    }

    fn create_panorama(&self, upload: &PanoramaUpload) -> Result<Panorama, TourError> {
        let mut store = self.store.lock();
        store.record(CallKind::CreatePanorama, Call::CreatePanorama(upload.room_name.clone()))?;
        let Some(image) = &upload.image else {
            return Err(TourError::Api { status: 422, message: "Gambar panorama wajib diisi".to_string() });
        };
        let id = PanoramaId(store.next_id());
        let panorama = Panorama {
            id: Some(id),
            room_name: upload.room_name.clone(),
            image: PanoramaImage::Remote(format!("http://localhost/storage/panorama/{}", image.file_name)),
            hotspots: Vec::new(),
        };
        store.panoramas.insert(id, panorama.clone());
        Ok(store.respond_panorama(&panorama))
    }

    fn update_panorama(&self, id: PanoramaId, upload: &PanoramaUpload) -> Result<Panorama, TourError> {
        let mut store = self.store.lock();
        store.record(CallKind::UpdatePanorama, Call::UpdatePanorama(id))?;
        let panorama = store.panoramas.get_mut(&id).ok_or_else(|| Store::not_found("Panorama"))?;
        panorama.room_name = upload.room_name.clone();
        if let Some(image) = &upload.image {
            panorama.image = PanoramaImage::Remote(format!("http://localhost/storage/panorama/{}", image.file_name));
        }
        let panorama = panorama.clone();
        Ok(store.respond_panorama(&panorama))
    }

    fn delete_panorama(&self, id: PanoramaId) -> Result<(), TourError> {
        let mut store = self.store.lock();
        store.record(CallKind::DeletePanorama, Call::DeletePanorama(id))?;
        store.panoramas.remove(&id).map(|_| ()).ok_or_else(|| Store::not_found("Panorama"))
    }

    fn create_hotspot(&self, panorama_id: PanoramaId, payload: &HotspotPayload) -> Result<Hotspot, TourError> {
        let mut store = self.store.lock();
        store.record(
            CallKind::CreateHotspot,
            Call::CreateHotspot { panorama_id, origin: payload.origin_panorama_id, text: payload.text.clone() },
        )?;
        let id = HotspotId(store.next_id());
        let hotspot = Hotspot {
            id: Some(id),
            origin_panorama_id: Some(payload.origin_panorama_id),
            pitch: payload.pitch,
            yaw: payload.yaw,
            text: payload.text.clone(),
            description: payload.description.clone(),
            target_panorama_id: payload.target_panorama_id,
        };
        let panorama = store.panoramas.get_mut(&panorama_id).ok_or_else(|| Store::not_found("Panorama"))?;
        panorama.hotspots.push(hotspot.clone());
        Ok(store.respond(hotspot))
    }

    fn update_hotspot(&self, panorama_id: PanoramaId, hotspot_id: HotspotId, payload: &HotspotPayload) -> Result<Hotspot, TourError> {
        let mut store = self.store.lock();
        store.record(CallKind::UpdateHotspot, Call::UpdateHotspot { panorama_id, hotspot_id })?;
        let hotspot = store
            .panoramas
            .get_mut(&panorama_id)
            .and_then(|panorama| panorama.hotspots.iter_mut().find(|hotspot| hotspot.id == Some(hotspot_id)))
            .ok_or_else(|| Store::not_found("Hotspot"))?;
        hotspot.pitch = payload.pitch;
        hotspot.yaw = payload.yaw;
        hotspot.text = payload.text.clone();
        hotspot.description = payload.description.clone();
        hotspot.target_panorama_id = payload.target_panorama_id;
        let hotspot = hotspot.clone();
        Ok(store.respond(hotspot))
    }

    fn delete_hotspot(&self, panorama_id: PanoramaId, hotspot_id: HotspotId) -> Result<(), TourError> {
        let mut store = self.store.lock();
        store.record(CallKind::DeleteHotspot, Call::DeleteHotspot { panorama_id, hotspot_id })?;
        let panorama = store.panoramas.get_mut(&panorama_id).ok_or_else(|| Store::not_found("Panorama"))?;
        let before = panorama.hotspots.len();
        panorama.hotspots.retain(|hotspot| hotspot.id != Some(hotspot_id));
        if panorama.hotspots.len() == before {
            return Err(Store::not_found("Hotspot"));
        }
        Ok(())
    }
}

/// Runs queued requests in order until the manager stops producing new ones.
pub fn drive(manager: &mut TourManager, backend: &MockBackend) {
    loop {
        let requests = manager.take_requests();
        if requests.is_empty() {
            return;
        }
        for outbound in requests {
            let result = outbound.request.execute(backend);
            manager.complete(outbound.ticket, result);
        }
    }
}

#[derive(Debug, Default)]
pub struct ViewerLog {
    pub created: Vec<PanoramaImage>,
    pub destroyed: usize,
    pub look_at: Vec<(f64, f64, Duration)>,
    pub markers: BTreeMap<MarkerId, MarkerSpec>,
    pub marker_adds: usize,
    pub draggable: bool,
    pub ready: bool,
    pub orientation: Option<Orientation>,
    pub pending_events: Vec<ViewerEvent>,
}

pub type SharedViewerLog = Rc<RefCell<ViewerLog>>;

/// Records every call instead of drawing anything.
pub struct MockViewer {
    log: SharedViewerLog,
    destroyed: bool,
}

impl PanoramaViewer for MockViewer {
    fn is_ready(&self) -> bool {
        !self.destroyed && self.log.borrow().ready
    }

    fn orientation(&self) -> Option<Orientation> {
        if self.is_ready() { self.log.borrow().orientation } else { None }
    }

    fn look_at(&mut self, yaw: f64, pitch: f64, duration: Duration) {
        self.log.borrow_mut().look_at.push((yaw, pitch, duration));
    }

    fn add_hotspot(&mut self, spec: MarkerSpec) {
        let mut log = self.log.borrow_mut();
        log.marker_adds += 1;
        log.markers.insert(spec.id, spec);
    }

    fn remove_hotspot(&mut self, id: MarkerId) {
        self.log.borrow_mut().markers.remove(&id);
    }

    fn set_markers_draggable(&mut self, draggable: bool) {
        self.log.borrow_mut().draggable = draggable;
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            let mut log = self.log.borrow_mut();
            log.destroyed += 1;
            log.markers.clear();
        }
    }

    fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.log.borrow_mut().pending_events)
    }

    fn show(&mut self, _ui: &mut egui::Ui) {}
}

/// Factory producing [`MockViewer`]s that all write to the returned log.
pub fn mock_viewer_factory() -> (ViewerFactory, SharedViewerLog) {
    let log = SharedViewerLog::default();
    let shared = Rc::clone(&log);
    let factory: ViewerFactory = Box::new(move |image: &PanoramaImage| {
        shared.borrow_mut().created.push(image.clone());
        Box::new(MockViewer { log: Rc::clone(&shared), destroyed: false }) as Box<dyn PanoramaViewer>
    });
    (factory, log)
}
