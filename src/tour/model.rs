use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::ValidationError;
use crate::viewer::MarkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanoramaId(pub u64);

impl fmt::Display for PanoramaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HotspotId(pub u64);

impl fmt::Display for HotspotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identity of a hotspot inside an edit session. Persisted and unsaved
/// hotspots both get one, so the viewer and the editor dialog can refer to
/// hotspots that have no server id yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DraftKey(pub u64);

impl From<DraftKey> for MarkerId {
    fn from(key: DraftKey) -> Self {
        MarkerId(key.0)
    }
}

impl From<MarkerId> for DraftKey {
    fn from(id: MarkerId) -> Self {
        DraftKey(id.0)
    }
}

/// Where the pixels of a panorama come from.
#[derive(Debug, Clone, Default)]
pub enum PanoramaImage {
    #[default]
    None,
    /// Already uploaded, fetched from the storage server.
    Remote(String),
    /// Picked from disk and held in memory until the panorama is saved.
    Local { path: PathBuf, bytes: Arc<[u8]> },
}

impl PartialEq for PanoramaImage {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PanoramaImage::None, PanoramaImage::None) => true,
            (PanoramaImage::Remote(a), PanoramaImage::Remote(b)) => a == b,
            // Comparing the buffers themselves would touch megabytes every frame
            (PanoramaImage::Local { path: a, bytes: a_bytes }, PanoramaImage::Local { path: b, bytes: b_bytes }) => {
                a == b && Arc::ptr_eq(a_bytes, b_bytes)
            }
            _ => false,
        }
    }
}

impl PanoramaImage {
    pub fn is_present(&self) -> bool {
        !matches!(self, PanoramaImage::None)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, PanoramaImage::Local { .. })
    }

    pub fn file_name(&self) -> Option<String> {
        match self {
            PanoramaImage::None => None,
            PanoramaImage::Remote(url) => url.rsplit('/').next().map(str::to_string),
            PanoramaImage::Local { path, .. } => path.file_name().map(|name| name.to_string_lossy().to_string()),
        }
    }

    pub fn local(path: impl AsRef<Path>, bytes: impl Into<Arc<[u8]>>) -> Self {
        PanoramaImage::Local { path: path.as_ref().to_path_buf(), bytes: bytes.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hotspot {
    pub id: Option<HotspotId>,
    /// Panorama whose sphere this marker is drawn on.
    pub origin_panorama_id: Option<PanoramaId>,
    pub pitch: f64,
    pub yaw: f64,
    pub text: String,
    pub description: Option<String>,
    pub target_panorama_id: Option<PanoramaId>,
}

impl Hotspot {
    pub fn at(origin: Option<PanoramaId>, pitch: f64, yaw: f64) -> Self {
        Self { origin_panorama_id: origin, pitch, yaw, ..Default::default() }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if !self.pitch.is_finite() {
            return Err(ValidationError::InvalidCoordinate("pitch"));
        }
        if !self.yaw.is_finite() {
            return Err(ValidationError::InvalidCoordinate("yaw"));
        }
        Ok(())
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// One scene of the tour.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Panorama {
    pub id: Option<PanoramaId>,
    pub room_name: String,
    pub image: PanoramaImage,
    pub hotspots: Vec<Hotspot>,
}

impl Panorama {
    /// The single place where backend data is made consistent: hotspots
    /// without an origin inherit the panorama id, and hotspots that belong to
    /// a different panorama are dropped.
    pub fn canonicalize(mut self) -> Self {
        let Some(id) = self.id else {
            return self;
        };

        let before = self.hotspots.len();
        self.hotspots.retain_mut(|hotspot| *hotspot.origin_panorama_id.get_or_insert(id) == id);
        let dropped = before - self.hotspots.len();
        if dropped > 0 {
            warn!("dropped {dropped} hotspot(s) attached to panorama {id} that belong to another panorama");
        }

        self
    }

    pub fn display_name(&self) -> &str {
        if self.room_name.trim().is_empty() { "Untitled panorama" } else { &self.room_name }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftHotspot {
    pub key: DraftKey,
    pub hotspot: Hotspot,
}
