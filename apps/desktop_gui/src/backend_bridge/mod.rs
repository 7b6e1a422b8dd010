//! Bridge between the UI thread and the tokio search worker.

pub mod commands;
pub mod runtime;
