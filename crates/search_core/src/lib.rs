//! Search session core: a paginated photo search controller plus the HTTP
//! provider it talks to. UI layers subscribe to state broadcasts and issue
//! commands; they never mutate search state directly.

pub mod config;
pub mod scroll;

use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{Photo, PhotoId},
    error::SearchError,
    protocol::SearchEnvelope,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::config::ProviderSettings;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const SEARCH_METHOD: &str = "flickr.photos.search";
const SORT_ORDER: &str = "relevance";

/// Immutable copy of the search session state, emitted after every mutation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchSnapshot {
    pub query: String,
    pub results: Vec<Photo>,
    pub page: u32,
    pub total_available: u64,
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub has_more: bool,
    pub has_searched_once: bool,
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    StateChanged(SearchSnapshot),
}

/// One page of results as returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoBatch {
    pub page: u32,
    pub total_available: u64,
    pub photos: Vec<Photo>,
}

#[async_trait]
pub trait PhotoProvider: Send + Sync {
    async fn search(&self, query: &str, page: u32) -> std::result::Result<PhotoBatch, SearchError>;
    async fn fetch_image(&self, url: &str) -> std::result::Result<Vec<u8>, SearchError>;
    fn image_host(&self) -> &str;
}

#[derive(Debug, Default)]
struct ControllerState {
    query: String,
    results: Vec<Photo>,
    page: u32,
    total_available: u64,
    is_loading: bool,
    error_message: Option<String>,
    has_more: bool,
    has_searched_once: bool,
    /// Bumped on every new search submission. Fetches remember the value they
    /// started under and their outcome is dropped if it has moved on.
    generation: u64,
}

impl ControllerState {
    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            query: self.query.clone(),
            results: self.results.clone(),
            page: self.page,
            total_available: self.total_available,
            is_loading: self.is_loading,
            error_message: self.error_message.clone(),
            has_more: self.has_more,
            has_searched_once: self.has_searched_once,
        }
    }
}

/// Owns the search session state. All mutations happen under one lock, held
/// only for the duration of the mutation, never across a fetch.
pub struct SearchController {
    provider: Arc<dyn PhotoProvider>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<SearchEvent>,
}

impl SearchController {
    pub fn new(provider: Arc<dyn PhotoProvider>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            provider,
            inner: Mutex::new(ControllerState::default()),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SearchSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Start a fresh search for `raw_query`. Whitespace-only input is
    /// ignored without touching any state. A submission supersedes any fetch
    /// still in flight; the stale fetch's outcome is discarded when it lands.
    pub async fn submit_search(&self, raw_query: &str) -> SearchSnapshot {
        let trimmed = raw_query.trim();
        if trimmed.is_empty() {
            debug!("ignoring empty search submission");
            return self.snapshot().await;
        }

        let (generation, snapshot) = {
            let mut state = self.inner.lock().await;
            state.generation = state.generation.wrapping_add(1);
            state.query = trimmed.to_string();
            state.results.clear();
            state.page = 1;
            state.has_more = true;
            state.has_searched_once = true;
            (state.generation, state.snapshot())
        };
        self.emit_state(&snapshot);

        self.fetch_page(generation, 1).await
    }

    /// Fetch the page after the current one and append its photos. Ignored
    /// while a fetch is in flight, once the result set is exhausted or
    /// errored, and before the first submission.
    pub async fn load_next_page(&self) -> SearchSnapshot {
        let reservation = {
            let mut state = self.inner.lock().await;
            let blocked = state.is_loading
                || !state.has_more
                || !state.has_searched_once
                || state.query.is_empty();
            if blocked {
                None
            } else {
                state.page += 1;
                Some((state.generation, state.page))
            }
        };

        let Some((generation, page)) = reservation else {
            debug!("ignoring load_next_page while blocked");
            return self.snapshot().await;
        };

        self.fetch_page(generation, page).await
    }

    async fn fetch_page(&self, generation: u64, page: u32) -> SearchSnapshot {
        let (query, snapshot) = {
            let mut state = self.inner.lock().await;
            if state.generation != generation {
                return state.snapshot();
            }
            state.is_loading = true;
            state.error_message = None;
            (state.query.clone(), state.snapshot())
        };
        self.emit_state(&snapshot);

        debug!(%query, page, "fetching results page");
        let outcome = self.provider.search(&query, page).await;
        self.apply_fetch_outcome(generation, page, outcome).await
    }

    async fn apply_fetch_outcome(
        &self,
        generation: u64,
        page: u32,
        outcome: std::result::Result<PhotoBatch, SearchError>,
    ) -> SearchSnapshot {
        let mut state = self.inner.lock().await;
        if state.generation != generation {
            debug!(page, "discarding superseded page fetch");
            return state.snapshot();
        }

        match outcome {
            Ok(batch) => {
                let added = merge_unique(&mut state.results, batch.photos);
                state.total_available = batch.total_available;
                // Exhaustion is judged against the merged length, not a
                // length captured before the fetch resolved.
                state.has_more = (state.results.len() as u64) < batch.total_available;
                state.is_loading = false;
                debug!(page, added, total = batch.total_available, "merged results page");
            }
            Err(err) => {
                warn!(page, kind = ?err.kind(), "page fetch failed: {err}");
                state.error_message = Some(err.to_string());
                state.has_more = false;
                state.is_loading = false;
            }
        }

        let snapshot = state.snapshot();
        drop(state);
        self.emit_state(&snapshot);
        snapshot
    }

    fn emit_state(&self, snapshot: &SearchSnapshot) {
        let _ = self.events.send(SearchEvent::StateChanged(snapshot.clone()));
    }
}

/// Append `incoming` to `existing`, skipping photos whose id is already
/// present. Providers occasionally return an item on two adjacent pages;
/// duplicated ids would otherwise collide in keyed UI lists.
fn merge_unique(existing: &mut Vec<Photo>, incoming: Vec<Photo>) -> usize {
    let mut seen: HashSet<PhotoId> = existing.iter().map(|photo| photo.id.clone()).collect();
    let mut added = 0;
    for photo in incoming {
        if seen.insert(photo.id.clone()) {
            existing.push(photo);
            added += 1;
        }
    }
    added
}

/// Photo search backed by the Flickr REST endpoint.
pub struct FlickrProvider {
    http: Client,
    settings: ProviderSettings,
}

impl FlickrProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

#[async_trait]
impl PhotoProvider for FlickrProvider {
    async fn search(&self, query: &str, page: u32) -> std::result::Result<PhotoBatch, SearchError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(SearchError::MissingCredential)?;

        let reply = self
            .http
            .get(&self.settings.api_endpoint)
            .query(&[
                ("method", SEARCH_METHOD.to_string()),
                ("api_key", api_key.to_string()),
                ("text", query.to_string()),
                ("page", page.to_string()),
                ("per_page", self.settings.per_page.to_string()),
                ("sort", SORT_ORDER.to_string()),
                ("format", "json".to_string()),
                ("nojsoncallback", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|err| SearchError::Transport(transport_reason(&err)))?
            .error_for_status()
            .map_err(|err| SearchError::Transport(transport_reason(&err)))?;

        let envelope: SearchEnvelope = reply
            .json()
            .await
            .map_err(|err| SearchError::Transport(transport_reason(&err)))?;

        if !envelope.is_ok() {
            return Err(SearchError::Provider(provider_reason(&envelope)));
        }
        let page_data = envelope
            .photos
            .ok_or_else(|| SearchError::Provider("reply is missing the photos payload".into()))?;

        let total_available = page_data.parse_total().map_err(|err| {
            SearchError::Provider(format!(
                "unreadable total count {:?}: {err}",
                page_data.total
            ))
        })?;

        let photos = page_data.photo.into_iter().map(Photo::from).collect();
        Ok(PhotoBatch {
            page: page_data.page,
            total_available,
            photos,
        })
    }

    async fn fetch_image(&self, url: &str) -> std::result::Result<Vec<u8>, SearchError> {
        let reply = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| SearchError::Transport(transport_reason(&err)))?
            .error_for_status()
            .map_err(|err| SearchError::Transport(transport_reason(&err)))?;

        let bytes = reply
            .bytes()
            .await
            .map_err(|err| SearchError::Transport(transport_reason(&err)))?;
        Ok(bytes.to_vec())
    }

    fn image_host(&self) -> &str {
        &self.settings.image_host
    }
}

fn transport_reason(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection refused: {err}")
    } else {
        err.to_string()
    }
}

fn provider_reason(envelope: &SearchEnvelope) -> String {
    match (&envelope.message, envelope.code) {
        (Some(message), Some(code)) => format!("{message} (code {code})"),
        (Some(message), None) => message.clone(),
        (None, Some(code)) => format!("status {:?} (code {code})", envelope.stat),
        (None, None) => format!("status {:?}", envelope.stat),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
