//! REST client for the school website's virtual tour endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::RequestBuilder;
use reqwest::blocking::multipart::Form;
use reqwest::blocking::multipart::Part;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::error::TourError;
use crate::settings::default_bool;
use crate::tour::model::Hotspot;
use crate::tour::model::HotspotId;
use crate::tour::model::Panorama;
use crate::tour::model::PanoramaId;
use crate::tour::model::PanoramaImage;

/// Image bytes sent as the `gambar_panorama` multipart field.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl ImageUpload {
    fn mime_type(&self) -> &'static str {
        let lower = self.file_name.to_ascii_lowercase();
        if lower.ends_with(".png") { "image/png" } else { "image/jpeg" }
    }
}

#[derive(Debug, Clone)]
pub struct PanoramaUpload {
    pub room_name: String,
    /// `None` keeps the image already stored on the server.
    pub image: Option<ImageUpload>,
}

/// Body of a hotspot create/update. The origin is not optional: a hotspot
/// request cannot be built before its panorama exists on the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotspotPayload {
    #[serde(rename = "id_panorama_asal")]
    pub origin_panorama_id: PanoramaId,
    pub pitch: f64,
    pub yaw: f64,
    pub text: String,
    pub description: Option<String>,
    #[serde(rename = "targetPanoramaId")]
    pub target_panorama_id: Option<PanoramaId>,
}

impl HotspotPayload {
    pub fn new(hotspot: &Hotspot, origin_panorama_id: PanoramaId) -> Self {
        Self {
            origin_panorama_id,
            pitch: hotspot.pitch,
            yaw: hotspot.yaw,
            text: hotspot.text.trim().to_string(),
            description: hotspot.description.as_ref().map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            target_panorama_id: hotspot.target_panorama_id,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TourRequest {
    ListPanoramas { search: String },
    CreatePanorama(PanoramaUpload),
    UpdatePanorama { id: PanoramaId, upload: PanoramaUpload },
    DeletePanorama { id: PanoramaId },
    CreateHotspot { panorama_id: PanoramaId, payload: HotspotPayload },
    UpdateHotspot { panorama_id: PanoramaId, hotspot_id: HotspotId, payload: HotspotPayload },
    DeleteHotspot { panorama_id: PanoramaId, hotspot_id: HotspotId },
}

#[derive(Debug, Clone)]
pub enum TourResponse {
    Panoramas(Vec<Panorama>),
    Panorama(Panorama),
    Hotspot(Hotspot),
    Deleted,
}

impl TourRequest {
    pub fn execute(&self, backend: &dyn TourBackend) -> Result<TourResponse, TourError> {
        match self {
            TourRequest::ListPanoramas { search } => backend.list_panoramas(search).map(TourResponse::Panoramas),
            TourRequest::CreatePanorama(upload) => backend.create_panorama(upload).map(TourResponse::Panorama),
            TourRequest::UpdatePanorama { id, upload } => backend.update_panorama(*id, upload).map(TourResponse::Panorama),
            TourRequest::DeletePanorama { id } => backend.delete_panorama(*id).map(|_| TourResponse::Deleted),
            TourRequest::CreateHotspot { panorama_id, payload } => backend.create_hotspot(*panorama_id, payload).map(TourResponse::Hotspot),
            TourRequest::UpdateHotspot { panorama_id, hotspot_id, payload } => {
                backend.update_hotspot(*panorama_id, *hotspot_id, payload).map(TourResponse::Hotspot)
            }
            TourRequest::DeleteHotspot { panorama_id, hotspot_id } => backend.delete_hotspot(*panorama_id, *hotspot_id).map(|_| TourResponse::Deleted),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TourRequest::ListPanoramas { .. } => "GET /virtualtour".to_string(),
            TourRequest::CreatePanorama(_) => "POST /virtualtour".to_string(),
            TourRequest::UpdatePanorama { id, .. } => format!("PUT /virtualtour/{id}"),
            TourRequest::DeletePanorama { id } => format!("DELETE /virtualtour/{id}"),
            TourRequest::CreateHotspot { panorama_id, .. } => format!("POST /virtualtour/{panorama_id}/hotspots"),
            TourRequest::UpdateHotspot { panorama_id, hotspot_id, .. } => format!("PUT /virtualtour/{panorama_id}/hotspots/{hotspot_id}"),
            TourRequest::DeleteHotspot { panorama_id, hotspot_id } => format!("DELETE /virtualtour/{panorama_id}/hotspots/{hotspot_id}"),
        }
    }
}

/// The CRUD surface the tour editor needs. Implementations block; callers
/// run them off the UI thread.
pub trait TourBackend: Send + Sync {
    fn list_panoramas(&self, search: &str) -> Result<Vec<Panorama>, TourError>;
    fn create_panorama(&self, upload: &PanoramaUpload) -> Result<Panorama, TourError>;
    fn update_panorama(&self, id: PanoramaId, upload: &PanoramaUpload) -> Result<Panorama, TourError>;
    fn delete_panorama(&self, id: PanoramaId) -> Result<(), TourError>;
    fn create_hotspot(&self, panorama_id: PanoramaId, payload: &HotspotPayload) -> Result<Hotspot, TourError>;
    fn update_hotspot(&self, panorama_id: PanoramaId, hotspot_id: HotspotId, payload: &HotspotPayload) -> Result<Hotspot, TourError>;
    fn delete_hotspot(&self, panorama_id: PanoramaId, hotspot_id: HotspotId) -> Result<(), TourError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_bool::<true>")]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PanoramaDto {
    #[serde(deserialize_with = "de_id")]
    id: u64,
    #[serde(alias = "roomName")]
    nama_ruangan: String,
    #[serde(default, alias = "image")]
    gambar_panorama: Option<String>,
    #[serde(default)]
    hotspots: Vec<HotspotDto>,
}

#[derive(Debug, Deserialize)]
struct HotspotDto {
    #[serde(deserialize_with = "de_id")]
    id: u64,
    #[serde(default, deserialize_with = "de_opt_id", alias = "originPanoramaId")]
    id_panorama_asal: Option<u64>,
    #[serde(deserialize_with = "de_number")]
    pitch: f64,
    #[serde(deserialize_with = "de_number")]
    yaw: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id", rename = "targetPanoramaId", alias = "id_panorama_tujuan")]
    target_panorama_id: Option<u64>,
}

impl HotspotDto {
    fn into_model(self) -> Hotspot {
        Hotspot {
            id: Some(HotspotId(self.id)),
            origin_panorama_id: self.id_panorama_asal.map(PanoramaId),
            pitch: self.pitch,
            yaw: self.yaw,
            text: self.text,
            description: self.description.filter(|d| !d.is_empty()),
            target_panorama_id: self.target_panorama_id.map(PanoramaId),
        }
    }
}

/// Decimal columns arrive as strings from some backends.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(text) => text.trim().parse().map_err(|_| E::custom(format!("invalid number {text:?}"))),
        }
    }

    /// Ids must be whole, non-negative numbers that fit a `u64`.
    fn into_id<E: serde::de::Error>(self) -> Result<u64, E> {
        let value = self.into_f64::<E>()?;
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= u64::MAX as f64 {
            return Err(E::custom(format!("invalid id {value}")));
        }
        Ok(value as u64)
    }
}

fn de_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_f64()
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_id()
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(value) => value.into_id().map(Some),
        None => Ok(None),
    }
}

/// Pulls a human readable message out of an error body, falling back to the status text.
fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

pub struct ApiClient {
    client: Client,
    api_url: String,
    storage_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(client: Client, api_url: &str, storage_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            storage_url: storage_url.trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.is_empty()),
        }
    }

    pub fn http_client(timeout: Duration) -> Result<Client, TourError> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, format!("{}/{}", self.api_url, path)).header(ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn send<T: DeserializeOwned>(&self, what: &'static str, builder: RequestBuilder) -> Result<Option<T>, TourError> {
        let response = builder.send()?;
        let status = response.status();
        let body = response.text()?;
        debug!("{what}: {status}");

        if status == StatusCode::UNAUTHORIZED {
            return Err(TourError::Unauthorized);
        }
        if !status.is_success() {
            let message = error_message(status, &body);
            warn!("{what} failed with {status}: {message}");
            return Err(TourError::Api { status: status.as_u16(), message });
        }
        if body.trim().is_empty() {
            return Ok(None);
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(TourError::Api { status: status.as_u16(), message: envelope.message.unwrap_or_else(|| format!("{what} was rejected")) });
        }
        Ok(envelope.data)
    }

    fn resolve_image(&self, path: Option<String>) -> PanoramaImage {
        match path {
            None => PanoramaImage::None,
            Some(path) if path.is_empty() => PanoramaImage::None,
            Some(path) if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("data:") => PanoramaImage::Remote(path),
            Some(path) => PanoramaImage::Remote(format!("{}/{}", self.storage_url, path.trim_start_matches('/'))),
        }
    }

    fn panorama_from_dto(&self, dto: PanoramaDto) -> Panorama {
        Panorama {
            id: Some(PanoramaId(dto.id)),
            room_name: dto.nama_ruangan,
            image: self.resolve_image(dto.gambar_panorama),
            hotspots: dto.hotspots.into_iter().map(HotspotDto::into_model).collect(),
        }
        .canonicalize()
    }

    fn panorama_form(upload: &PanoramaUpload) -> Result<Form, TourError> {
        let mut form = Form::new().text("nama_ruangan", upload.room_name.trim().to_string());
        if let Some(image) = &upload.image {
            let part = Part::bytes(image.bytes.to_vec()).file_name(image.file_name.clone()).mime_str(image.mime_type())?;
            form = form.part("gambar_panorama", part);
        }
        Ok(form)
    }
}

impl TourBackend for ApiClient {
    fn list_panoramas(&self, search: &str) -> Result<Vec<Panorama>, TourError> {
        let builder = self.request(Method::GET, "virtualtour").query(&[("search", search)]);
        let panoramas: Vec<PanoramaDto> = self.send("list panoramas", builder)?.unwrap_or_default();
        Ok(panoramas.into_iter().map(|dto| self.panorama_from_dto(dto)).collect())
    }

    fn create_panorama(&self, upload: &PanoramaUpload) -> Result<Panorama, TourError> {
        let builder = self.request(Method::POST, "virtualtour").multipart(Self::panorama_form(upload)?);
        let dto: PanoramaDto = self.send("create panorama", builder)?.ok_or(TourError::EmptyResponse("create panorama"))?;
        Ok(self.panorama_from_dto(dto))
    }

    fn update_panorama(&self, id: PanoramaId, upload: &PanoramaUpload) -> Result<Panorama, TourError> {
        let builder = self.request(Method::PUT, &format!("virtualtour/{id}")).multipart(Self::panorama_form(upload)?);
        let dto: PanoramaDto = self.send("update panorama", builder)?.ok_or(TourError::EmptyResponse("update panorama"))?;
        Ok(self.panorama_from_dto(dto))
    }

    fn delete_panorama(&self, id: PanoramaId) -> Result<(), TourError> {
        self.send::<serde_json::Value>("delete panorama", self.request(Method::DELETE, &format!("virtualtour/{id}")))?;
        Ok(())
    }

    fn create_hotspot(&self, panorama_id: PanoramaId, payload: &HotspotPayload) -> Result<Hotspot, TourError> {
        let builder = self.request(Method::POST, &format!("virtualtour/{panorama_id}/hotspots")).json(payload);
        let dto: HotspotDto = self.send("create hotspot", builder)?.ok_or(TourError::EmptyResponse("create hotspot"))?;
        Ok(dto.into_model())
    }

    fn update_hotspot(&self, panorama_id: PanoramaId, hotspot_id: HotspotId, payload: &HotspotPayload) -> Result<Hotspot, TourError> {
        let builder = self.request(Method::PUT, &format!("virtualtour/{panorama_id}/hotspots/{hotspot_id}")).json(payload);
        let dto: HotspotDto = self.send("update hotspot", builder)?.ok_or(TourError::EmptyResponse("update hotspot"))?;
        Ok(dto.into_model())
    }

    fn delete_hotspot(&self, panorama_id: PanoramaId, hotspot_id: HotspotId) -> Result<(), TourError> {
        self.send::<serde_json::Value>("delete hotspot", self.request(Method::DELETE, &format!("virtualtour/{panorama_id}/hotspots/{hotspot_id}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(Client::new(), "http://localhost:8000/api/", "http://localhost:8000/storage/", None)
    }

    #[test]
    fn list_response_accepts_string_numbers_and_missing_origins() {
        let body = r#"{
            "success": true,
            "data": [{
                "id": 3,
                "nama_ruangan": "Aula",
                "gambar_panorama": "panorama/aula.jpg",
                "hotspots": [
                    {"id": 1, "pitch": "-2.1", "yaw": "42.0", "text": "Pintu Masuk", "targetPanoramaId": "4"},
                    {"id": 2, "id_panorama_asal": 3, "pitch": 5, "yaw": -10, "text": "Panggung", "description": null, "targetPanoramaId": null},
                    {"id": 9, "id_panorama_asal": "8", "pitch": 0, "yaw": 0, "text": "Salah tempat"}
                ]
            }]
        }"#;

        let envelope: Envelope<Vec<PanoramaDto>> = serde_json::from_str(body).unwrap();
        let client = client();
        let panoramas: Vec<Panorama> = envelope.data.unwrap().into_iter().map(|dto| client.panorama_from_dto(dto)).collect();

        assert_eq!(panoramas.len(), 1);
        let aula = &panoramas[0];
        assert_eq!(aula.image, PanoramaImage::Remote("http://localhost:8000/storage/panorama/aula.jpg".into()));
        assert_eq!(aula.hotspots.len(), 2);
        let entrance = &aula.hotspots[0];
        assert_eq!(entrance.origin_panorama_id, Some(PanoramaId(3)));
        assert!((entrance.pitch - -2.1).abs() < 1e-9);
        assert_eq!(entrance.target_panorama_id, Some(PanoramaId(4)));
        assert_eq!(aula.hotspots[1].target_panorama_id, None);
    }

    #[test]
    fn envelope_without_data_is_empty() {
        let envelope: Envelope<Vec<PanoramaDto>> = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(envelope.success);
        assert!(envelope.data.is_none());

        let envelope: Envelope<PanoramaDto> = serde_json::from_str(r#"{"success": false, "message": "Panorama tidak ditemukan"}"#).unwrap();
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.message.as_deref(), Some("Panorama tidak ditemukan"));
    }

    #[test]
    fn ids_must_be_whole_and_non_negative() {
        let hotspot = |id: &str, target: &str| format!(r#"{{"id": {id}, "pitch": 0, "yaw": 0, "text": "Pintu", "targetPanoramaId": {target}}}"#);

        let parsed: HotspotDto = serde_json::from_str(&hotspot(r#""12""#, "4.0")).unwrap();
        assert_eq!(parsed.id, 12);
        assert_eq!(parsed.target_panorama_id, Some(4));

        for (id, target) in [("-1", "null"), ("3.7", "null"), (r#""-5""#, "null"), ("1", "-4"), ("1", r#""2.5""#)] {
            assert!(serde_json::from_str::<HotspotDto>(&hotspot(id, target)).is_err(), "id {id} target {target} should be rejected");
        }
    }

    #[test]
    fn absolute_image_urls_are_kept() {
        assert_eq!(client().resolve_image(Some("https://cdn.example/aula.jpg".into())), PanoramaImage::Remote("https://cdn.example/aula.jpg".into()));
        assert_eq!(client().resolve_image(Some(String::new())), PanoramaImage::None);
    }

    #[test]
    fn hotspot_payload_uses_backend_field_names() {
        let hotspot = Hotspot { pitch: -2.1, yaw: 42.0, text: " Pintu Masuk ".into(), description: Some(String::new()), ..Default::default() };
        let payload = HotspotPayload::new(&hotspot, PanoramaId(3));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["id_panorama_asal"], 3);
        assert_eq!(json["text"], "Pintu Masuk");
        assert!(json["description"].is_null());
        assert!(json["targetPanoramaId"].is_null());
    }

    #[test]
    fn error_bodies_surface_the_backend_message() {
        let message = error_message(StatusCode::CONFLICT, r#"{"success": false, "message": "Panorama masih digunakan"}"#);
        assert_eq!(message, "Panorama masih digunakan");
        assert_eq!(error_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>"), "Internal Server Error");
    }
}
