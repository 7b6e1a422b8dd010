//! Events delivered from the search worker to the UI thread, plus error
//! classification for status and banner text.

use search_core::SearchSnapshot;
use shared::domain::PhotoId;

/// Decoded pixels ready for texture upload on the UI thread.
#[derive(Clone)]
pub struct PreviewImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

pub enum UiEvent {
    /// Worker runtime is up; carries the image host used for photo URLs.
    WorkerReady {
        image_host: String,
    },
    SearchState(SearchSnapshot),
    Info(String),
    Error(UiError),
    ThumbnailLoaded {
        photo_id: PhotoId,
        image: PreviewImage,
    },
    ThumbnailFailed {
        photo_id: PhotoId,
        reason: String,
    },
    OriginalLoaded {
        photo_id: PhotoId,
        image: PreviewImage,
    },
    OriginalFailed {
        photo_id: PhotoId,
        reason: String,
    },
    /// A save could not complete; the UI should open this URL in the
    /// system browser so the user can download the image there.
    SaveFellBack {
        url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Credential,
    Transport,
    Provider,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    WorkerStartup,
    Search,
    FetchImage,
    SaveImage,
    General,
}

pub fn classify_search_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("worker startup failure") {
        "Search worker startup failure; restart the app and check the log.".to_string()
    } else if lower.contains("api key") {
        "API key missing or rejected. Set FLICKR_API_KEY in your environment and restart."
            .to_string()
    } else if lower.contains("failed to fetch")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("dns")
    {
        "Photo service unreachable; check your network and search again.".to_string()
    } else {
        format!("Search error: {message}")
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("api key")
            || message_lower.contains("credential")
            || message_lower.contains("flickr_api_key")
        {
            UiErrorCategory::Credential
        } else if message_lower.contains("provider")
            || message_lower.contains("rejected the request")
            || message_lower.contains("stat ")
        {
            UiErrorCategory::Provider
        } else if message_lower.contains("timed out")
            || message_lower.contains("timeout")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("unreachable")
            || message_lower.contains("failed to fetch")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("malformed")
            || message_lower.contains("unreadable")
        {
            UiErrorCategory::Validation
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// True when the only way forward is fixing the configured API key.
    pub fn requires_credential_setup(&self) -> bool {
        self.category == UiErrorCategory::Credential
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
