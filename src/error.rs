use std::io;

use thiserror::Error;

use crate::tour::model::PanoramaId;

#[derive(Error, Debug)]
pub enum TourError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("The server rejected the session token. Sign in again from the Session window.")]
    Unauthorized,

    #[error("The server returned an error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("A network error occurred: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] io::Error),

    #[error("Could not decode panorama image: {0}")]
    Image(#[from] image::ImageError),

    #[error("The server response for {0} did not contain any data")]
    EmptyResponse(&'static str),

    #[error("Background task completed")]
    BackgroundTaskCompleted,
}

/// Problems caught locally before any request is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Room name is required")]
    MissingRoomName,

    #[error("Choose a panorama image before saving")]
    MissingImage,

    #[error("Hotspot title is required")]
    MissingTitle,

    #[error("Hotspot {0} must be a finite number")]
    InvalidCoordinate(&'static str),

    #[error("Hotspot coordinates are not available yet")]
    CoordinatesPending,

    #[error("Panorama is still linked from {}", format_referrers(.referrers))]
    PanoramaReferenced { id: PanoramaId, referrers: Vec<String> },
}

fn format_referrers(referrers: &[String]) -> String {
    referrers.join(", ")
}

impl TourError {
    /// Message suitable for a toast or inline label.
    pub fn user_message(&self) -> String {
        match self {
            TourError::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
