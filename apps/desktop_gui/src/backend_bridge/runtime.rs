//! Search worker: owns the tokio runtime, the search controller, and all
//! image fetching. The UI thread talks to it over bounded channels only.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use search_core::{
    config::load_settings, FlickrProvider, PhotoProvider, SearchController, SearchEvent,
};
use tokio::sync::Semaphore;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{PreviewImage, UiError, UiErrorContext, UiEvent};

const THUMBNAIL_FETCH_CONCURRENCY: usize = 8;

pub fn spawn_backend_thread(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::WorkerStartup,
                    format!("search worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build worker runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let settings = load_settings();
            let provider = match FlickrProvider::new(settings) {
                Ok(provider) => Arc::new(provider),
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::WorkerStartup,
                        format!("search worker startup failure: {err:#}"),
                    )));
                    tracing::error!("failed to build photo provider: {err:#}");
                    return;
                }
            };
            let controller = SearchController::new(provider.clone());
            let _ = ui_tx.try_send(UiEvent::WorkerReady {
                image_host: provider.image_host().to_string(),
            });

            // Forward controller state broadcasts to the UI thread.
            let mut events = controller.subscribe();
            let ui_tx_clone = ui_tx.clone();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    let SearchEvent::StateChanged(snapshot) = event;
                    let _ = ui_tx_clone.try_send(UiEvent::SearchState(snapshot));
                }
            });

            let thumbnail_permits = Arc::new(Semaphore::new(THUMBNAIL_FETCH_CONCURRENCY));
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::Search { query } => {
                        controller.submit_search(&query).await;
                    }
                    BackendCommand::LoadNextPage => {
                        controller.load_next_page().await;
                    }
                    BackendCommand::FetchThumbnail { photo } => {
                        let provider = provider.clone();
                        let permits = thumbnail_permits.clone();
                        let ui_tx = ui_tx.clone();
                        tokio::spawn(async move {
                            let _permit = match permits.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => return,
                            };
                            let url = photo.thumbnail_url(provider.image_host());
                            let event = match fetch_preview(provider.as_ref(), &url).await {
                                Ok(image) => UiEvent::ThumbnailLoaded {
                                    photo_id: photo.id,
                                    image,
                                },
                                Err(reason) => UiEvent::ThumbnailFailed {
                                    photo_id: photo.id,
                                    reason,
                                },
                            };
                            let _ = ui_tx.try_send(event);
                        });
                    }
                    BackendCommand::FetchOriginal { photo } => {
                        let provider = provider.clone();
                        let ui_tx = ui_tx.clone();
                        tokio::spawn(async move {
                            let url = photo.original_url(provider.image_host());
                            let event = match provider.fetch_image(&url).await {
                                Ok(bytes) => match decode_preview_image(&bytes) {
                                    Ok(image) => UiEvent::OriginalLoaded {
                                        photo_id: photo.id,
                                        image,
                                    },
                                    Err(reason) => UiEvent::OriginalFailed {
                                        photo_id: photo.id,
                                        reason,
                                    },
                                },
                                Err(err) => UiEvent::OriginalFailed {
                                    photo_id: photo.id,
                                    reason: err.to_string(),
                                },
                            };
                            let _ = ui_tx.try_send(event);
                        });
                    }
                    BackendCommand::SaveOriginal { photo } => {
                        let url = photo.original_url(provider.image_host());
                        match provider.fetch_image(&url).await {
                            Ok(bytes) => {
                                let save_path = rfd::FileDialog::new()
                                    .set_file_name(photo.download_filename())
                                    .save_file();
                                if let Some(path) = save_path {
                                    match tokio::fs::write(&path, &bytes).await {
                                        Ok(()) => {
                                            let _ = ui_tx.try_send(UiEvent::Info(format!(
                                                "Saved {} ({})",
                                                path.display(),
                                                human_readable_bytes(bytes.len() as u64)
                                            )));
                                        }
                                        Err(err) => {
                                            tracing::warn!(
                                                "failed to write {}: {err}",
                                                path.display()
                                            );
                                            let _ =
                                                ui_tx.try_send(UiEvent::SaveFellBack { url });
                                        }
                                    }
                                }
                            }
                            Err(err) => {
                                tracing::warn!(
                                    "full-size download failed, falling back to browser: {err}"
                                );
                                let _ = ui_tx.try_send(UiEvent::SaveFellBack { url });
                            }
                        }
                    }
                }
            }
        });
    });
}

async fn fetch_preview(provider: &FlickrProvider, url: &str) -> Result<PreviewImage, String> {
    let bytes = provider
        .fetch_image(url)
        .await
        .map_err(|err| err.to_string())?;
    decode_preview_image(&bytes)
}

fn decode_preview_image(bytes: &[u8]) -> Result<PreviewImage, String> {
    let dynamic = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let resized = dynamic.thumbnail(1024, 1024).to_rgba8();
    let width = resized.width() as usize;
    let height = resized.height() as usize;
    Ok(PreviewImage {
        width,
        height,
        rgba: resized.into_raw(),
    })
}

pub fn human_readable_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        return format!("{bytes} B");
    }
    if bytes < MB {
        return format_scaled_unit(bytes, KB, "KB");
    }
    if bytes < GB {
        return format_scaled_unit(bytes, MB, "MB");
    }
    format_scaled_unit(bytes, GB, "GB")
}

fn format_scaled_unit(bytes: u64, unit_size: u64, unit_label: &str) -> String {
    let value = bytes as f64 / unit_size as f64;
    let value_text = format!("{value:.1}");
    let compact_value = value_text.strip_suffix(".0").unwrap_or(&value_text);
    format!("{compact_value} {unit_label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_download_sizes_readably() {
        assert_eq!(human_readable_bytes(0), "0 B");
        assert_eq!(human_readable_bytes(1023), "1023 B");
        assert_eq!(human_readable_bytes(1024), "1 KB");
        assert_eq!(human_readable_bytes(1536), "1.5 KB");
        assert_eq!(human_readable_bytes(2 * 1024 * 1024), "2 MB");
        assert_eq!(human_readable_bytes(1572864), "1.5 MB");
    }

    #[test]
    fn decodes_preview_pixels() {
        let mut png = std::io::Cursor::new(Vec::new());
        let buffer = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(buffer)
            .write_to(&mut png, image::ImageFormat::Png)
            .expect("encode test png");

        let preview = decode_preview_image(png.get_ref()).expect("decode");
        assert_eq!(preview.width, 2);
        assert_eq!(preview.height, 2);
        assert_eq!(preview.rgba.len(), 16);
    }

    #[test]
    fn rejects_undecodable_bytes() {
        assert!(decode_preview_image(b"not an image").is_err());
    }
}
