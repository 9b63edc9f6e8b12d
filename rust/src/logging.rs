/// Logging initialization.
///
/// - `RUST_LOG` wins when set
/// - otherwise `roomsync_core=debug,info`
/// - with a `data_dir`, a plain-text copy is appended to `<data_dir>/roomsync.log`
///
/// Called once at the start of `ChatApp::new()`. Safe to call again; later
/// calls are ignored by `try_init`.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "roomsync_core=debug,info".into())
    };

    let log_path = std::path::Path::new(data_dir).join("roomsync.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}
