use std::sync::Arc;
use std::time::Duration;

use egui_notify::Toasts;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::debug;
use tracing::info;

use crate::api::ApiClient;
use crate::api::TourBackend;
use crate::error::TourError;
use crate::settings::Settings;
use crate::task::RequestDispatcher;
use crate::tour::manager::Notice;
use crate::tour::manager::TourManager;
use crate::tour::model::PanoramaId;
use crate::ui::preview_pane::PreviewPane;
use crate::ui::preview_pane::ViewerFactory;
use crate::viewer::PanoramaViewer;
use crate::viewer::sphere::SphereViewer;

const TOAST_DURATION: Duration = Duration::from_secs(5);

fn sphere_factory(client: Client) -> ViewerFactory {
    Box::new(move |image| Box::new(SphereViewer::new(image, &client)) as Box<dyn PanoramaViewer>)
}

/// The three independent viewers of the app. Each owns its own viewer handle.
pub struct Panes {
    pub editor: PreviewPane,
    pub tour: PreviewPane,
    pub modal: PreviewPane,
}

impl Panes {
    fn new(client: &Client, poll_interval: Duration) -> Self {
        Self {
            editor: PreviewPane::new("editor", sphere_factory(client.clone()), poll_interval),
            tour: PreviewPane::new("tour preview", sphere_factory(client.clone()), poll_interval),
            modal: PreviewPane::new("modal preview", sphere_factory(client.clone()), poll_interval),
        }
    }

    fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.editor.set_poll_interval(poll_interval);
        self.tour.set_poll_interval(poll_interval);
        self.modal.set_poll_interval(poll_interval);
    }
}

/// Main application state container
#[derive(Serialize, Deserialize)]
#[serde(default)]
pub struct TabState {
    pub settings: Settings,

    #[serde(skip)]
    pub manager: TourManager,

    #[serde(skip)]
    pub dispatcher: Option<RequestDispatcher>,

    #[serde(skip)]
    pub panes: Option<Panes>,

    #[serde(skip)]
    pub toasts: Toasts,

    /// Panorama shown in the "Tour Preview" tab, independent of the editor selection.
    #[serde(skip)]
    pub tour_position: Option<PanoramaId>,

    #[serde(skip)]
    pub modal_preview: Option<PanoramaId>,

    #[serde(skip)]
    pub pending_panorama_delete: Option<PanoramaId>,

    #[serde(skip)]
    pub session_window_open: bool,

    #[serde(skip)]
    pub token_input: String,
}

impl Default for TabState {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            manager: TourManager::new(settings.dialog_settle_delay()),
            settings,
            dispatcher: None,
            panes: None,
            toasts: Toasts::default(),
            tour_position: None,
            modal_preview: None,
            pending_panorama_delete: None,
            session_window_open: false,
            token_input: String::new(),
        }
    }
}

impl TabState {
    /// Builds the HTTP stack from the current settings. Safe to call again after settings change.
    pub fn connect(&mut self, runtime: &Arc<Runtime>) -> Result<(), TourError> {
        let client = ApiClient::http_client(self.settings.request_timeout())?;
        let backend: Arc<dyn TourBackend> = Arc::new(ApiClient::new(
            client.clone(),
            &self.settings.api_url,
            &self.settings.storage_url,
            self.settings.session.token().map(str::to_string),
        ));

        match &self.dispatcher {
            Some(dispatcher) => dispatcher.set_backend(backend),
            None => self.dispatcher = Some(RequestDispatcher::new(Arc::clone(runtime), backend)),
        }

        match &mut self.panes {
            Some(panes) => panes.set_poll_interval(self.settings.orientation_poll_interval()),
            None => self.panes = Some(Panes::new(&client, self.settings.orientation_poll_interval())),
        }

        self.manager.editor_mut().set_settle_delay(self.settings.dialog_settle_delay());
        info!("using tour backend at {}", self.settings.api_url);
        Ok(())
    }

    pub fn reconnect(&mut self, runtime: &Arc<Runtime>) {
        if let Err(err) = self.connect(runtime) {
            self.toasts.error(format!("Could not configure the HTTP client: {err}")).duration(Some(TOAST_DURATION));
        }
    }

    pub fn can_edit(&self) -> bool {
        self.settings.session.can_edit()
    }

    /// Applies finished requests, starts queued ones and surfaces their outcome.
    pub fn pump_requests(&mut self, ctx: &egui::Context, runtime: &Arc<Runtime>) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.pump(&mut self.manager, ctx);
        }

        for notice in self.manager.take_notices() {
            match notice {
                Notice::Info(message) => {
                    self.toasts.info(message).duration(Some(TOAST_DURATION));
                }
                Notice::Error(message) => {
                    self.toasts.error(message).duration(Some(TOAST_DURATION));
                }
            }
        }

        if self.manager.take_session_expired() {
            debug!("session token rejected, signing out");
            self.settings.session.sign_out();
            self.session_window_open = true;
            self.toasts.warning("Your session has expired. Sign in again to keep editing.").duration(Some(TOAST_DURATION));
            if self.manager.is_editing() {
                self.manager.cancel_edit();
            }
            self.reconnect(runtime);
        }
    }

    pub fn report_error(&mut self, err: &TourError) {
        self.toasts.error(err.user_message()).duration(Some(TOAST_DURATION));
    }
}
