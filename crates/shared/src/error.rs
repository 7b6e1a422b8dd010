use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes the search pipeline reports. Every class is terminal for
/// the active query: paging stops until the user submits a new search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchErrorKind {
    MissingCredential,
    TransportFailure,
    ProviderError,
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// No API key was configured. Detected before any request is issued.
    #[error("API key not found: set FLICKR_API_KEY in the environment")]
    MissingCredential,
    /// The request never produced a usable reply: connect or DNS failure,
    /// timeout, a non-success HTTP status, or an unreadable body.
    #[error("failed to fetch photos: {0}")]
    Transport(String),
    /// The provider answered with a well-formed body that signals failure.
    #[error("photo provider rejected the request: {0}")]
    Provider(String),
}

impl SearchError {
    pub fn kind(&self) -> SearchErrorKind {
        match self {
            SearchError::MissingCredential => SearchErrorKind::MissingCredential,
            SearchError::Transport(_) => SearchErrorKind::TransportFailure,
            SearchError::Provider(_) => SearchErrorKind::ProviderError,
        }
    }
}
