use std::sync::Arc;

use eframe::APP_KEY;
use egui::RichText;
use egui::Ui;
use egui::UiKind;
use egui::WidgetText;
use egui_dock::DockArea;
use egui_dock::DockState;
use egui_dock::Style;
use egui_dock::TabViewer;
use serde::Deserialize;
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::debug;
use tracing::error;

use crate::icon_str;
use crate::icons;
use crate::session::Role;
use crate::settings::API_URL_ENV;
use crate::tab_state::TabState;
use crate::ui::settings_tab::DEFAULT_ZOOM_FACTOR;
use crate::ui::tour_preview::show_visitor_view;
use crate::util::status_color;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    TourEditor,
    TourPreview,
    Settings,
}

impl Tab {
    fn title(&self) -> &'static str {
        match self {
            Tab::TourEditor => icon_str!(icons::MAP_TRIFOLD, "Tour Editor"),
            Tab::TourPreview => icon_str!(icons::PERSON_SIMPLE_WALK, "Tour Preview"),
            Tab::Settings => icon_str!(icons::GEAR_FINE, "Settings"),
        }
    }
}

pub struct TourStudioTabViewer<'a> {
    pub tab_state: &'a mut TabState,
    pub runtime: &'a Arc<Runtime>,
}

impl TabViewer for TourStudioTabViewer<'_> {
    type Tab = Tab;

    fn title(&mut self, tab: &mut Self::Tab) -> WidgetText {
        tab.title().into()
    }

    fn ui(&mut self, ui: &mut egui::Ui, tab: &mut Self::Tab) {
        match tab {
            Tab::TourEditor => self.build_tour_editor_tab(ui),
            Tab::TourPreview => self.build_tour_preview_tab(ui),
            Tab::Settings => self.build_settings_tab(ui),
        }
    }
}

/// We derive Deserialize/Serialize so we can persist app state on shutdown.
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct TourStudioApp {
    #[serde(skip)]
    show_about_window: bool,

    pub(crate) tab_state: TabState,
    #[serde(skip)]
    dock_state: DockState<Tab>,

    #[serde(skip)]
    pub(crate) runtime: Arc<Runtime>,
}

impl Default for TourStudioApp {
    fn default() -> Self {
        Self {
            show_about_window: false,
            tab_state: Default::default(),
            dock_state: DockState::new([Tab::TourEditor, Tab::TourPreview, Tab::Settings].to_vec()),
            runtime: Arc::new(Runtime::new().expect("failed to create tokio runtime")),
        }
    }
}

impl TourStudioApp {
    /// Called once before the first frame.
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        // Include phosphor icons
        let mut fonts = egui::FontDefinitions::default();
        egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
        egui_extras::install_image_loaders(&cc.egui_ctx);

        cc.egui_ctx.set_fonts(fonts);
        cc.egui_ctx.set_theme(egui::Theme::Dark);

        // Load previous app state (if any).
        let saved_state: Option<Self> = cc.storage.and_then(|storage| {
            storage.get_string(APP_KEY)?;
            let state = eframe::get_value(storage, APP_KEY);
            if state.is_none() {
                error!("saved app state could not be read, starting with defaults");
            }
            state
        });

        let mut state = match saved_state {
            Some(state) => state,
            None => {
                // We don't persist the zoom factor because it's persisted with the application window instead.
                cc.egui_ctx.set_zoom_factor(DEFAULT_ZOOM_FACTOR);
                Self::default()
            }
        };

        state.tab_state.settings.apply_env_override(std::env::var(API_URL_ENV).ok());
        state.tab_state.reconnect(&state.runtime);

        let search = state.tab_state.settings.last_search.clone();
        state.tab_state.manager.set_search(search);
        state.tab_state.manager.load_tour();

        state
    }

    fn update_impl(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tab_state.pump_requests(ctx, &self.runtime);

        if self.show_about_window {
            egui::Window::new("About").open(&mut self.show_about_window).show(ctx, |ui| {
                build_about_window(ui);
            });
        }

        self.show_session_window(ctx);
        self.show_modal_preview(ctx);

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::MenuBar::new().ui(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button(format!("{} Reload tour", icons::ARROWS_CLOCKWISE)).clicked() {
                        self.tab_state.manager.load_tour();
                        ui.close_kind(UiKind::Menu);
                    }
                    if ui.button(format!("{} Session...", icons::USER_CIRCLE)).clicked() {
                        self.tab_state.session_window_open = true;
                        ui.close_kind(UiKind::Menu);
                    }
                    if ui.button("About").clicked() {
                        self.show_about_window = true;
                        ui.close_kind(UiKind::Menu);
                    }
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
            });
        });

        egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
            self.build_bottom_panel(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            DockArea::new(&mut self.dock_state)
                .style(Style::from_egui(ui.style().as_ref()))
                .allowed_splits(egui_dock::AllowedSplits::None)
                .show_leaf_collapse_buttons(false)
                .show_leaf_close_all_buttons(false)
                .show_close_buttons(false)
                .show_inside(ui, &mut TourStudioTabViewer { tab_state: &mut self.tab_state, runtime: &self.runtime });
        });

        // Start whatever the UI queued this frame
        self.tab_state.pump_requests(ctx, &self.runtime);
        self.tab_state.toasts.show(ctx);

        ctx.request_repaint_after_secs(1.0);
    }

    fn build_bottom_panel(&mut self, ui: &mut Ui) {
        let state = &self.tab_state;
        ui.horizontal(|ui| {
            let connected = state.manager.load_error().is_none();
            let color = status_color(connected, ui.visuals().dark_mode);
            ui.label(RichText::new(icons::CIRCLE).color(color)).on_hover_text(&state.settings.api_url);

            let session = &state.settings.session;
            let session_text = RichText::new(format!("{} {}", icons::USER_CIRCLE, session.describe()));
            let session_text = match session.role.filter(|_| session.is_signed_in()) {
                Some(role) => session_text.color(role.color()),
                None => session_text.weak(),
            };
            ui.label(session_text);

            ui.separator();
            let manager = &state.manager;
            for (busy, text) in [
                (manager.is_loading(), "Loading tour..."),
                (manager.is_uploading(), "Uploading panorama..."),
                (manager.is_saving_hotspot(), "Saving hotspot..."),
            ] {
                if busy {
                    ui.spinner();
                    ui.label(text);
                }
            }
            if !manager.has_work_in_flight() {
                ui.label(RichText::new(format!("{} panorama(s)", manager.panoramas().len())).weak());
            }
        });
    }

    fn show_session_window(&mut self, ctx: &egui::Context) {
        let state = &mut self.tab_state;
        if !state.session_window_open {
            return;
        }

        let mut open = true;
        let mut changed = false;
        egui::Window::new(format!("{} Session", icons::USER_CIRCLE)).collapsible(false).resizable(false).open(&mut open).show(ctx, |ui| {
            ui.label(state.settings.session.describe());
            ui.separator();

            egui::Grid::new("session_grid").num_columns(2).spacing([12.0, 6.0]).show(ui, |ui| {
                ui.label("Name");
                ui.text_edit_singleline(&mut state.settings.session.user_name);
                ui.end_row();

                ui.label("Role");
                let role = &mut state.settings.session.role;
                egui::ComboBox::from_id_salt("session_role_combobox").selected_text(role.map(|role| role.label()).unwrap_or("None")).show_ui(ui, |ui| {
                    for candidate in Role::ALL {
                        ui.selectable_value(role, Some(candidate), candidate.label());
                    }
                });
                ui.end_row();

                ui.label("Token");
                ui.add(egui::TextEdit::singleline(&mut state.token_input).password(true).hint_text("Paste the token from the website login"));
                ui.end_row();
            });

            ui.horizontal(|ui| {
                let has_token = !state.token_input.trim().is_empty();
                if ui.add_enabled(has_token, egui::Button::new(format!("{} Sign in", icons::SIGN_IN))).clicked() {
                    state.settings.session.token = Some(state.token_input.trim().to_string());
                    state.token_input.clear();
                    changed = true;
                }
                if ui.add_enabled(state.settings.session.is_signed_in(), egui::Button::new(format!("{} Sign out", icons::SIGN_OUT))).clicked() {
                    state.settings.session.sign_out();
                    if state.manager.is_editing() {
                        state.manager.cancel_edit();
                    }
                    changed = true;
                }
            });
        });

        if changed {
            debug!("session changed: {}", state.settings.session.describe());
            state.reconnect(&self.runtime);
        }
        state.session_window_open = open;
    }

    fn show_modal_preview(&mut self, ctx: &egui::Context) {
        let state = &mut self.tab_state;
        let Some(id) = state.modal_preview else {
            return;
        };
        let Some(panes) = state.panes.as_mut() else {
            return;
        };
        let Some(panorama) = state.manager.panorama(id) else {
            panes.modal.release();
            state.modal_preview = None;
            return;
        };

        let mut open = true;
        let mut walked_to = None;
        let mut errors = Vec::new();
        egui::Window::new(format!("{} {}", icons::EYE, panorama.display_name()))
            .id(egui::Id::new("modal_preview_window"))
            .default_size([720.0, 420.0])
            .open(&mut open)
            .show(ctx, |ui| {
                (walked_to, errors) = show_visitor_view(ui, &mut panes.modal, panorama, state.manager.panoramas(), state.settings.show_labels);
            });

        for message in errors {
            state.toasts.error(format!("Could not show panorama: {message}"));
        }
        if !open {
            panes.modal.release();
            state.modal_preview = None;
        } else if walked_to.is_some() {
            state.modal_preview = walked_to;
        }
    }
}

impl eframe::App for TourStudioApp {
    /// Called by the frame work to save state before shutdown.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        self.tab_state.settings.last_search = self.tab_state.manager.search().to_string();
        eframe::set_value(storage, eframe::APP_KEY, self);
    }

    /// Called each time the UI needs repainting, which may be many times per second.
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        self.update_impl(ctx, frame);
    }
}

fn build_about_window(ui: &mut egui::Ui) {
    ui.vertical(|ui| {
        ui.label(format!("{} v{}", crate::APP_NAME, env!("CARGO_PKG_VERSION")));
        ui.label("Authoring tool for the school's 360° virtual tour.");

        ui.horizontal(|ui| {
            ui.spacing_mut().item_spacing.x = 0.0;
            ui.label("Powered by ");
            ui.hyperlink_to("egui", "https://github.com/emilk/egui");
            ui.label(" and ");
            ui.hyperlink_to("eframe", "https://github.com/emilk/egui/tree/master/crates/eframe");
            ui.label(".");
        });
    });
}
