#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

fn main() -> eframe::Result<()> {
    #[cfg(feature = "logging")]
    let _guard = {
        use tracing_appender::rolling::Rotation;
        use tracing_subscriber::Layer;
        use tracing_subscriber::filter::LevelFilter;
        use tracing_subscriber::fmt;
        use tracing_subscriber::fmt::time::LocalTime;
        use tracing_subscriber::layer::SubscriberExt;

        let file_appender = tracing_appender::rolling::Builder::new()
            .rotation(Rotation::HOURLY)
            .max_log_files(1)
            .filename_prefix("tour_studio.log")
            .build(".")
            .expect("failed to build file appender");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let level = if cfg!(debug_assertions) { LevelFilter::DEBUG } else { LevelFilter::INFO };
        let subscriber = tracing_subscriber::registry()
            .with(fmt::Layer::new().pretty().with_ansi(true).with_filter(level))
            .with(fmt::Layer::new().with_writer(non_blocking).with_timer(LocalTime::rfc_3339()).with_ansi(false).with_filter(level));
        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
        guard
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 500.0])
            .with_title(format!("{} v{}", tour_studio::APP_NAME, env!("CARGO_PKG_VERSION"))),
        ..Default::default()
    };

    eframe::run_native(tour_studio::APP_NAME, native_options, Box::new(|cc| Ok(Box::new(tour_studio::TourStudioApp::new(cc)))))
}
