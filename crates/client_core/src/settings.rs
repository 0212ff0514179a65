use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "inventory.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_root: String,
    pub login_url: String,
    pub logout_url: String,
    pub request_timeout_secs: u64,
    pub csrf_cookie_name: String,
    pub csrf_header_name: String,
    pub templates_path: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_root: "http://127.0.0.1:8000/api/".into(),
            login_url: "http://127.0.0.1:8000/api/accounts/login/".into(),
            logout_url: "http://127.0.0.1:8000/api/accounts/logout/".into(),
            request_timeout_secs: 15,
            csrf_cookie_name: "csrftoken".into(),
            csrf_header_name: "X-CSRFToken".into(),
            templates_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_root: Option<String>,
    login_url: Option<String>,
    logout_url: Option<String>,
    request_timeout_secs: Option<u64>,
    csrf_cookie_name: Option<String>,
    csrf_header_name: Option<String>,
    templates_path: Option<String>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it exists and parses, then `APP__*` variables
/// looked up through `env`.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => settings.apply_file(file_cfg),
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    if let Some(v) = env("APP__API_ROOT") {
        settings.api_root = v;
    }
    if let Some(v) = env("APP__LOGIN_URL") {
        settings.login_url = v;
    }
    if let Some(v) = env("APP__LOGOUT_URL") {
        settings.logout_url = v;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) if parsed > 0 => settings.request_timeout_secs = parsed,
            _ => warn!(value = %v, "ignoring invalid APP__REQUEST_TIMEOUT_SECS"),
        }
    }
    if let Some(v) = env("APP__TEMPLATES_PATH") {
        settings.templates_path = Some(v);
    }

    settings
}

impl ClientSettings {
    fn apply_file(&mut self, file_cfg: FileSettings) {
        if let Some(v) = file_cfg.api_root {
            self.api_root = v;
        }
        if let Some(v) = file_cfg.login_url {
            self.login_url = v;
        }
        if let Some(v) = file_cfg.logout_url {
            self.logout_url = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs.filter(|secs| *secs > 0) {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file_cfg.csrf_cookie_name {
            self.csrf_cookie_name = v;
        }
        if let Some(v) = file_cfg.csrf_header_name {
            self.csrf_header_name = v;
        }
        if file_cfg.templates_path.is_some() {
            self.templates_path = file_cfg.templates_path;
        }
    }
}
