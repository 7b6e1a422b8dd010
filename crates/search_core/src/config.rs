use std::{collections::HashMap, fs, time::Duration};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.flickr.com/services/rest/";
pub const DEFAULT_IMAGE_HOST: &str = "https://live.staticflickr.com";
pub const DEFAULT_PER_PAGE: u32 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Search credential. `None` is a valid loaded state; the provider
    /// reports it as a terminal error on first use instead of crashing at
    /// startup.
    pub api_key: Option<String>,
    pub api_endpoint: String,
    pub image_host: String,
    pub per_page: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_endpoint: DEFAULT_API_ENDPOINT.into(),
            image_host: DEFAULT_IMAGE_HOST.into(),
            per_page: DEFAULT_PER_PAGE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ProviderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Defaults, then `photoscope.toml` in the working directory, then
/// environment overrides. File values are written as strings.
pub fn load_settings() -> ProviderSettings {
    let mut settings = ProviderSettings::default();

    if let Ok(raw) = fs::read_to_string("photoscope.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("api_key") {
                settings.api_key = Some(v.clone());
            }
            if let Some(v) = file_cfg.get("api_endpoint") {
                settings.api_endpoint = v.clone();
            }
            if let Some(v) = file_cfg.get("image_host") {
                settings.image_host = v.clone();
            }
            if let Some(v) = file_cfg.get("per_page") {
                if let Ok(parsed) = v.parse::<u32>() {
                    settings.per_page = parsed;
                }
            }
            if let Some(v) = file_cfg.get("request_timeout_secs") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.request_timeout_secs = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("FLICKR_API_KEY") {
        settings.api_key = Some(v);
    }
    if let Ok(v) = std::env::var("APP__FLICKR_API_KEY") {
        settings.api_key = Some(v);
    }

    if let Ok(v) = std::env::var("APP__API_ENDPOINT") {
        settings.api_endpoint = v;
    }
    if let Ok(v) = std::env::var("APP__IMAGE_HOST") {
        settings.image_host = v;
    }

    if let Ok(v) = std::env::var("APP__PER_PAGE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.per_page = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    settings
}
