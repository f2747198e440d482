use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::session::Session;

/// Overrides `api_url` at start-up, handy when pointing at a staging server.
pub const API_URL_ENV: &str = "TOUR_STUDIO_API_URL";

pub const fn default_bool<const V: bool>() -> bool {
    V
}

fn default_api_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_storage_url() -> String {
    "http://localhost:8000/storage".to_string()
}

fn default_orientation_poll_interval_ms() -> u64 {
    100
}

fn default_dialog_settle_delay_ms() -> u64 {
    150
}

fn default_look_at_duration_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Global application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base for relative `gambar_panorama` paths.
    #[serde(default = "default_storage_url")]
    pub storage_url: String,
    #[serde(default)]
    pub session: Session,
    #[serde(default = "default_bool::<true>")]
    pub show_labels: bool,
    #[serde(default = "default_orientation_poll_interval_ms")]
    pub orientation_poll_interval_ms: u64,
    /// How long the hotspot dialog waits for the camera before reading it.
    #[serde(default = "default_dialog_settle_delay_ms")]
    pub dialog_settle_delay_ms: u64,
    #[serde(default = "default_look_at_duration_ms")]
    pub look_at_duration_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub last_search: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            storage_url: default_storage_url(),
            session: Session::default(),
            show_labels: true,
            orientation_poll_interval_ms: default_orientation_poll_interval_ms(),
            dialog_settle_delay_ms: default_dialog_settle_delay_ms(),
            look_at_duration_ms: default_look_at_duration_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            last_search: String::new(),
        }
    }
}

impl Settings {
    /// Applies [`API_URL_ENV`] when it is set to something non-empty.
    pub fn apply_env_override(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|url| url.trim().to_string()).filter(|url| !url.is_empty()) {
            self.api_url = url;
        }
    }

    pub fn orientation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.orientation_poll_interval_ms.max(16))
    }

    pub fn dialog_settle_delay(&self) -> Duration {
        Duration::from_millis(self.dialog_settle_delay_ms)
    }

    pub fn look_at_duration(&self) -> Duration {
        Duration::from_millis(self.look_at_duration_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"api_url": "https://sekolah.example/api", "show_labels": false}"#).unwrap();
        assert_eq!(settings.api_url, "https://sekolah.example/api");
        assert!(!settings.show_labels);
        assert_eq!(settings.storage_url, default_storage_url());
        assert_eq!(settings.dialog_settle_delay(), Duration::from_millis(150));
        assert_eq!(settings.session, Session::default());
    }

    #[test]
    fn env_override_ignores_blank_values() {
        let mut settings = Settings::default();
        settings.apply_env_override(Some("   ".into()));
        assert_eq!(settings.api_url, default_api_url());
        settings.apply_env_override(Some("http://staging/api".into()));
        assert_eq!(settings.api_url, "http://staging/api");
    }
}
