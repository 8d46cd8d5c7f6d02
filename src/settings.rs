use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const GALLERY_ENDPOINT_ENV: &str = "DOCSNAP_GALLERY_ENDPOINT";
pub const UPLOAD_ENDPOINT_ENV: &str = "DOCSNAP_UPLOAD_ENDPOINT";

fn default_input_folder() -> String {
    "input".to_string()
}

fn default_output_folder() -> String {
    "output".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub gallery_endpoint: String,
    #[serde(default)]
    pub upload_endpoint: String,
    #[serde(default = "default_input_folder")]
    pub input_folder: String,
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            gallery_endpoint: String::new(),
            upload_endpoint: String::new(),
            input_folder: default_input_folder(),
            output_folder: default_output_folder(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Environment variables win over the settings file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(GALLERY_ENDPOINT_ENV).ok(),
            std::env::var(UPLOAD_ENDPOINT_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, gallery: Option<String>, upload: Option<String>) {
        if let Some(gallery) = gallery.filter(|v| !v.trim().is_empty()) {
            self.gallery_endpoint = gallery;
        }
        if let Some(upload) = upload.filter(|v| !v.trim().is_empty()) {
            self.upload_endpoint = upload;
        }
    }
}

fn settings_dir() -> Option<PathBuf> {
    // On macOS: ~/Library/Application Support/docsnap
    // On Linux: ~/.config/docsnap (via dirs crate)
    dirs::config_dir().map(|d| d.join("docsnap"))
}

pub fn settings_path() -> Option<PathBuf> {
    settings_dir().map(|d| d.join("settings.json"))
}

/// Load settings from the platform config directory.
/// Returns default settings if file is missing or invalid.
pub fn load_settings() -> AppSettings {
    match settings_path() {
        Some(path) => load_settings_from(&path),
        None => {
            tracing::warn!("settings: cannot determine config path");
            AppSettings::default()
        }
    }
}

pub fn load_settings_from(path: &Path) -> AppSettings {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(_) => {
            tracing::info!("settings: no settings file at {}", path.display());
            return AppSettings::default();
        }
    };

    match serde_json::from_str(&data) {
        Ok(s) => {
            tracing::info!("settings: loaded from {}", path.display());
            s
        }
        Err(e) => {
            tracing::warn!("settings: failed to parse {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

/// Save settings to the platform config directory.
/// Creates directory if needed.
pub fn save_settings(settings: &AppSettings) -> crate::error::Result<PathBuf> {
    let path = settings_path().ok_or_else(|| {
        crate::error::DocsnapError::Config("cannot determine config directory".to_string())
    })?;
    save_settings_to(settings, &path)?;
    Ok(path)
}

pub fn save_settings_to(settings: &AppSettings, path: &Path) -> crate::error::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    tracing::info!("settings: saved to {}", path.display());
    Ok(())
}
