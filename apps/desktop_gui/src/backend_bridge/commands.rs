//! Commands queued from the UI thread to the search worker.

use shared::domain::Photo;

pub enum BackendCommand {
    Search {
        query: String,
    },
    LoadNextPage,
    FetchThumbnail {
        photo: Photo,
    },
    FetchOriginal {
        photo: Photo,
    },
    /// Download the full-size image and offer a save dialog. When the
    /// download cannot complete the worker reports a browser fallback URL
    /// instead of failing silently.
    SaveOriginal {
        photo: Photo,
    },
}
