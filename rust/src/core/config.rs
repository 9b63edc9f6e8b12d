use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_TYPING_EXPIRY_MS: u64 = 3_000;
const DEFAULT_TYPING_IDLE_MS: u64 = 1_000;
const DEFAULT_ECHO_MATCH_WINDOW_MS: i64 = 10_000;
const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1_024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct AppConfig {
    pub(super) page_size: Option<usize>,
    pub(super) typing_expiry_ms: Option<u64>,
    pub(super) typing_idle_ms: Option<u64>,
    // How far apart an own insert echo and its pending send may be and still match.
    pub(super) echo_match_window_ms: Option<i64>,
    pub(super) event_queue_capacity: Option<usize>,
}

pub(super) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("roomsync_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), %e, "ignoring malformed config");
            AppConfig::default()
        }
    }
}

impl AppConfig {
    pub(super) fn page_size(&self) -> usize {
        // Used to keep pagination tests small.
        if let Some(size) = std::env::var("ROOMSYNC_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            return size.max(1);
        }
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1)
    }

    pub(super) fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms.unwrap_or(DEFAULT_TYPING_EXPIRY_MS))
    }

    pub(super) fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms.unwrap_or(DEFAULT_TYPING_IDLE_MS))
    }

    pub(super) fn echo_match_window_ms(&self) -> i64 {
        self.echo_match_window_ms
            .unwrap_or(DEFAULT_ECHO_MATCH_WINDOW_MS)
            .max(0)
    }

    pub(super) fn event_queue_capacity(&self) -> usize {
        self.event_queue_capacity
            .unwrap_or(DEFAULT_EVENT_QUEUE_CAPACITY)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(config.typing_expiry(), Duration::from_secs(3));
        assert_eq!(config.typing_idle(), Duration::from_secs(1));
        assert_eq!(config.echo_match_window_ms(), 10_000);
        assert_eq!(config.event_queue_capacity(), 1_024);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("roomsync_config.json"),
            r#"{"typing_expiry_ms": 250, "event_queue_capacity": 0}"#,
        )
        .unwrap();
        let config = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(config.typing_expiry(), Duration::from_millis(250));
        assert_eq!(config.typing_idle(), Duration::from_secs(1));
        // Zero-capacity channels would block every send.
        assert_eq!(config.event_queue_capacity(), 1);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roomsync_config.json"), "{not json").unwrap();
        let config = load_app_config(&dir.path().to_string_lossy());
        assert_eq!(config.echo_match_window_ms(), 10_000);
    }
}
