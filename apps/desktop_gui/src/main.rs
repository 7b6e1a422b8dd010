//! Photoscope desktop GUI: a thumbnail grid over the Flickr search worker.
//!
//! The UI thread never touches the network. It queues [`BackendCommand`]s to
//! the worker thread and drains [`UiEvent`]s each frame; decoded pixels are
//! uploaded as egui textures lazily, the first frame they are drawn.

use std::collections::{BTreeMap, HashMap};

mod backend_bridge;
mod controller;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use eframe::egui;
use egui::TextureHandle;
use serde::{Deserialize, Serialize};
use shared::domain::{Photo, PhotoId};

use search_core::config::DEFAULT_IMAGE_HOST;
use search_core::scroll::{ScrollAction, ScrollTriggerAdapter, SentinelHandle, ViewportSample};
use search_core::SearchSnapshot;

use crate::backend_bridge::commands::BackendCommand;
use crate::backend_bridge::runtime::spawn_backend_thread;
use crate::controller::events::{
    classify_search_failure, PreviewImage, UiError, UiErrorCategory, UiErrorContext, UiEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusBannerSeverity {
    Info,
    Error,
}

/// Persistent notice shown above the results until dismissed. The one-line
/// status bar is too transient for things like a missing API key.
#[derive(Debug, Clone)]
struct StatusBanner {
    severity: StatusBannerSeverity,
    message: String,
}

fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Credential => "Credential problem",
        UiErrorCategory::Transport => "Network problem",
        UiErrorCategory::Provider => "Provider problem",
        UiErrorCategory::Validation => "Invalid reply",
        UiErrorCategory::Unknown => "Unexpected problem",
    }
}

fn banner_for(err: &UiError, fallback: &str) -> StatusBanner {
    let message = if err.requires_credential_setup() {
        "No usable API key. Set FLICKR_API_KEY in your environment and restart Photoscope."
            .to_string()
    } else {
        fallback.to_string()
    };
    StatusBanner {
        severity: StatusBannerSeverity::Error,
        message,
    }
}

/// Per-photo thumbnail lifecycle. Pixels arrive from the worker; the texture
/// slot is filled on the UI thread the first time the card is painted.
enum ThumbnailState {
    NotRequested,
    Loading,
    Ready {
        image: PreviewImage,
        texture: Option<TextureHandle>,
    },
    Failed(String),
}

enum OriginalState {
    Loading,
    Ready {
        image: PreviewImage,
        texture: Option<TextureHandle>,
    },
    Failed(String),
}

struct ModalState {
    photo: Photo,
    original: OriginalState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ThemePreset {
    Dark,
    Light,
}

impl ThemePreset {
    fn label(self) -> &'static str {
        match self {
            ThemePreset::Dark => "Dark",
            ThemePreset::Light => "Light",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ThemeSettings {
    preset: ThemePreset,
    accent_color: egui::Color32,
    panel_rounding: u8,
}

impl ThemeSettings {
    fn dark_default() -> Self {
        Self {
            preset: ThemePreset::Dark,
            accent_color: egui::Color32::from_rgb(64, 140, 255),
            panel_rounding: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct UiReadabilitySettings {
    text_scale: f32,
    compact_density: bool,
}

impl UiReadabilitySettings {
    fn defaults() -> Self {
        Self {
            text_scale: 1.0,
            compact_density: false,
        }
    }
}

const MIN_TEXT_SCALE: f32 = 0.8;
const MAX_TEXT_SCALE: f32 = 1.4;
const MAX_PANEL_ROUNDING: u8 = 16;
const DEFAULT_THUMBNAIL_COLUMN_WIDTH: f32 = 220.0;
const MIN_THUMBNAIL_COLUMN_WIDTH: f32 = 140.0;
const MAX_THUMBNAIL_COLUMN_WIDTH: f32 = 340.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum PersistedThemePreset {
    Dark,
    Light,
}

impl From<ThemePreset> for PersistedThemePreset {
    fn from(value: ThemePreset) -> Self {
        match value {
            ThemePreset::Dark => PersistedThemePreset::Dark,
            ThemePreset::Light => PersistedThemePreset::Light,
        }
    }
}

impl From<PersistedThemePreset> for ThemePreset {
    fn from(value: PersistedThemePreset) -> Self {
        match value {
            PersistedThemePreset::Dark => ThemePreset::Dark,
            PersistedThemePreset::Light => ThemePreset::Light,
        }
    }
}

/// Subset of app state persisted through eframe storage. Unknown or missing
/// fields fall back to defaults so older settings blobs keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct PersistedAppSettings {
    theme_preset: PersistedThemePreset,
    accent_color: [u8; 3],
    panel_rounding: u8,
    text_scale: f32,
    compact_density: bool,
    thumbnail_column_width: f32,
}

impl Default for PersistedAppSettings {
    fn default() -> Self {
        Self::from_runtime(
            ThemeSettings::dark_default(),
            UiReadabilitySettings::defaults(),
            DEFAULT_THUMBNAIL_COLUMN_WIDTH,
        )
    }
}

impl PersistedAppSettings {
    fn from_runtime(
        theme: ThemeSettings,
        readability: UiReadabilitySettings,
        thumbnail_column_width: f32,
    ) -> Self {
        Self {
            theme_preset: theme.preset.into(),
            accent_color: [
                theme.accent_color.r(),
                theme.accent_color.g(),
                theme.accent_color.b(),
            ],
            panel_rounding: theme.panel_rounding.min(MAX_PANEL_ROUNDING),
            text_scale: readability.text_scale.clamp(MIN_TEXT_SCALE, MAX_TEXT_SCALE),
            compact_density: readability.compact_density,
            thumbnail_column_width: thumbnail_column_width
                .clamp(MIN_THUMBNAIL_COLUMN_WIDTH, MAX_THUMBNAIL_COLUMN_WIDTH),
        }
    }

    fn into_runtime(self) -> (ThemeSettings, UiReadabilitySettings, f32) {
        let [r, g, b] = self.accent_color;
        let theme = ThemeSettings {
            preset: self.theme_preset.into(),
            accent_color: egui::Color32::from_rgb(r, g, b),
            panel_rounding: self.panel_rounding.min(MAX_PANEL_ROUNDING),
        };
        let readability = UiReadabilitySettings {
            text_scale: self.text_scale.clamp(MIN_TEXT_SCALE, MAX_TEXT_SCALE),
            compact_density: self.compact_density,
        };
        let thumbnail_column_width = self
            .thumbnail_column_width
            .clamp(MIN_THUMBNAIL_COLUMN_WIDTH, MAX_THUMBNAIL_COLUMN_WIDTH);
        (theme, readability, thumbnail_column_width)
    }
}

struct PhotoscopeApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    query_input: String,
    search: SearchSnapshot,
    image_host: String,

    thumbnails: HashMap<PhotoId, ThumbnailState>,
    modal: Option<ModalState>,
    scroll_trigger: ScrollTriggerAdapter,
    /// Bumped on every new submission so the scroll trigger re-arms against a
    /// fresh sentinel instead of reusing edge state from the previous grid.
    sentinel_serial: u64,
    pending_browser_open: Option<String>,

    status: String,
    status_banner: Option<StatusBanner>,

    settings_open: bool,
    theme: ThemeSettings,
    applied_theme: Option<ThemeSettings>,
    readability: UiReadabilitySettings,
    applied_readability: Option<UiReadabilitySettings>,
    thumbnail_column_width: f32,
}

impl PhotoscopeApp {
    fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        persisted_settings: Option<PersistedAppSettings>,
    ) -> Self {
        let (theme, readability, thumbnail_column_width) =
            persisted_settings.unwrap_or_default().into_runtime();
        Self {
            cmd_tx,
            ui_rx,
            query_input: String::new(),
            search: SearchSnapshot::default(),
            image_host: DEFAULT_IMAGE_HOST.to_string(),
            thumbnails: HashMap::new(),
            modal: None,
            scroll_trigger: ScrollTriggerAdapter::new(),
            sentinel_serial: 0,
            pending_browser_open: None,
            status: "Starting search worker...".to_string(),
            status_banner: None,
            settings_open: false,
            theme,
            applied_theme: None,
            readability,
            applied_readability: None,
            thumbnail_column_width,
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::WorkerReady { image_host } => {
                    self.image_host = image_host;
                    self.status = "Ready to search".to_string();
                }
                UiEvent::SearchState(snapshot) => self.apply_search_state(snapshot),
                UiEvent::Info(message) => {
                    self.status = message;
                }
                UiEvent::Error(err) => {
                    let status_text = match err.context() {
                        UiErrorContext::Search => classify_search_failure(err.message()),
                        UiErrorContext::SaveImage => {
                            format!("Could not save the image: {}", err.message())
                        }
                        _ => format!("{}: {}", err_label(err.category()), err.message()),
                    };
                    if err.requires_credential_setup()
                        || err.context() == UiErrorContext::WorkerStartup
                    {
                        self.status_banner = Some(banner_for(&err, &status_text));
                    }
                    self.status = status_text;
                }
                UiEvent::ThumbnailLoaded { photo_id, image } => {
                    self.thumbnails.insert(
                        photo_id,
                        ThumbnailState::Ready {
                            image,
                            texture: None,
                        },
                    );
                }
                UiEvent::ThumbnailFailed { photo_id, reason } => {
                    tracing::debug!(photo = photo_id.as_str(), %reason, "thumbnail fetch failed");
                    self.thumbnails.insert(photo_id, ThumbnailState::Failed(reason));
                }
                UiEvent::OriginalLoaded { photo_id, image } => {
                    if let Some(modal) = &mut self.modal {
                        if modal.photo.id == photo_id {
                            modal.original = OriginalState::Ready {
                                image,
                                texture: None,
                            };
                            self.status = format!("Viewing \"{}\"", card_title(&modal.photo));
                        }
                    }
                }
                UiEvent::OriginalFailed { photo_id, reason } => {
                    if let Some(modal) = &mut self.modal {
                        if modal.photo.id == photo_id {
                            modal.original = OriginalState::Failed(reason);
                        }
                    }
                }
                UiEvent::SaveFellBack { url } => {
                    self.status_banner = Some(StatusBanner {
                        severity: StatusBannerSeverity::Info,
                        message:
                            "Direct download unavailable; the image was opened in your browser instead."
                                .to_string(),
                    });
                    self.pending_browser_open = Some(url);
                }
            }
        }
    }

    fn apply_search_state(&mut self, snapshot: SearchSnapshot) {
        // A superseding search may settle before the UI saw its reset event.
        if snapshot.query != self.search.query {
            self.thumbnails.clear();
            self.modal = None;
        }

        if let Some(message) = snapshot.error_message.clone() {
            let err = UiError::from_message(UiErrorContext::Search, message);
            let status_text = classify_search_failure(err.message());
            self.status_banner = Some(banner_for(&err, &status_text));
            self.status = status_text;
        } else if snapshot.is_loading {
            self.status = if snapshot.page <= 1 {
                format!("Searching for \"{}\"...", snapshot.query)
            } else {
                format!("Loading page {}...", snapshot.page)
            };
        } else if snapshot.has_searched_once {
            if matches!(
                self.status_banner,
                Some(StatusBanner {
                    severity: StatusBannerSeverity::Error,
                    ..
                })
            ) {
                self.status_banner = None;
            }
            self.status = if snapshot.results.is_empty() {
                format!("No photos found for \"{}\"", snapshot.query)
            } else {
                format!(
                    "Showing {} of {} photos for \"{}\"",
                    snapshot.results.len(),
                    snapshot.total_available,
                    snapshot.query
                )
            };
        }

        self.search = snapshot;
    }

    fn start_search(&mut self, raw_query: &str) {
        let trimmed = raw_query.trim();
        if trimmed.is_empty() {
            return;
        }
        self.sentinel_serial = self.sentinel_serial.wrapping_add(1);
        self.thumbnails.clear();
        self.modal = None;
        self.status = format!("Searching for \"{trimmed}\"...");
        queue_command(
            &self.cmd_tx,
            BackendCommand::Search {
                query: trimmed.to_string(),
            },
            &mut self.status,
        );
    }

    fn open_photo(&mut self, photo: Photo) {
        self.status = format!("Opening \"{}\"...", card_title(&photo));
        queue_command(
            &self.cmd_tx,
            BackendCommand::FetchOriginal {
                photo: photo.clone(),
            },
            &mut self.status,
        );
        self.modal = Some(ModalState {
            photo,
            original: OriginalState::Loading,
        });
    }

    fn apply_theme_if_needed(&mut self, ctx: &egui::Context) {
        if self.applied_theme == Some(self.theme)
            && self.applied_readability == Some(self.readability)
        {
            return;
        }

        let mut style = (*ctx.style()).clone();
        style.visuals = visuals_for_theme(self.theme);
        style.text_styles = scaled_text_styles(self.readability.text_scale);

        // Keep text inputs visibly outlined on both presets.
        style.visuals.widgets.inactive.bg_stroke =
            egui::Stroke::new(1.0, style.visuals.widgets.noninteractive.bg_stroke.color);
        style.visuals.widgets.hovered.bg_stroke =
            egui::Stroke::new(1.0, style.visuals.widgets.hovered.bg_stroke.color);
        style.visuals.widgets.active.bg_stroke =
            egui::Stroke::new(1.2, style.visuals.selection.bg_fill.gamma_multiply(0.9));

        if self.readability.compact_density {
            style.spacing.item_spacing = egui::vec2(6.0, 4.0);
            style.spacing.button_padding = egui::vec2(8.0, 5.0);
            style.spacing.interact_size = egui::vec2(40.0, 24.0);
        } else {
            style.spacing.item_spacing = egui::vec2(8.0, 6.0);
            style.spacing.button_padding = egui::vec2(10.0, 6.0);
            style.spacing.interact_size = egui::vec2(40.0, 30.0);
        }
        ctx.set_style(style);
        self.applied_theme = Some(self.theme);
        self.applied_readability = Some(self.readability);
    }

    fn show_search_screen(&mut self, ctx: &egui::Context) {
        let mut submitted: Option<String> = None;

        egui::TopBottomPanel::top("search_bar").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                ui.heading("Photoscope");
                ui.add_space(12.0);

                let input = ui.add(
                    egui::TextEdit::singleline(&mut self.query_input)
                        .hint_text("Search photos, e.g. \"mountain lake\"")
                        .desired_width(320.0),
                );
                let pressed_enter =
                    input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                let can_search = !self.query_input.trim().is_empty();
                let clicked = ui
                    .add_enabled(can_search, egui::Button::new("Search"))
                    .clicked();
                if can_search && (pressed_enter || clicked) {
                    submitted = Some(self.query_input.clone());
                    input.request_focus();
                }
                let can_clear = !self.query_input.is_empty();
                if ui
                    .add_enabled(can_clear, egui::Button::new("Clear"))
                    .clicked()
                {
                    self.query_input.clear();
                    input.request_focus();
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Settings").clicked() {
                        self.settings_open = !self.settings_open;
                    }
                });
            });
            ui.add_space(6.0);
        });

        if let Some(query) = submitted {
            self.start_search(&query);
        }

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.small(self.status.as_str());
                if self.search.has_searched_once && !self.search.results.is_empty() {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.small(format!(
                            "{} / {}",
                            self.search.results.len(),
                            self.search.total_available
                        ));
                    });
                }
            });
        });

        let mut scroll_sample: Option<ViewportSample> = None;
        let mut clicked_photo: Option<Photo> = None;
        let mut thumb_requests: Vec<Photo> = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_status_banner(ui);

            if !self.search.has_searched_once {
                ui.add_space(ui.available_height() * 0.3);
                ui.vertical_centered(|ui| {
                    ui.heading("Search the photo library");
                    ui.add_space(4.0);
                    ui.weak("Type a keyword above and press Enter.");
                });
            } else if self.search.results.is_empty() {
                ui.add_space(ui.available_height() * 0.3);
                ui.vertical_centered(|ui| {
                    if self.search.is_loading {
                        ui.spinner();
                        ui.add_space(6.0);
                        ui.weak(format!("Searching for \"{}\"...", self.search.query));
                    } else if self.search.error_message.is_some() {
                        ui.weak("The search could not be completed.");
                    } else {
                        ui.weak(format!(
                            "No photos found for \"{}\". Try a different keyword.",
                            self.search.query
                        ));
                    }
                });
            } else {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        let available = ui.available_width();
                        let columns = grid_column_count(available, self.thumbnail_column_width);
                        let spacing = ui.spacing().item_spacing.x;
                        let cell_width = ((available - spacing * columns.saturating_sub(1) as f32)
                            / columns as f32)
                            .max(80.0);
                        let cell = egui::vec2(cell_width, cell_width * 0.85);

                        for row in self.search.results.chunks(columns) {
                            ui.horizontal(|ui| {
                                for photo in row {
                                    let entry = self
                                        .thumbnails
                                        .entry(photo.id.clone())
                                        .or_insert(ThumbnailState::NotRequested);
                                    if matches!(entry, ThumbnailState::NotRequested) {
                                        *entry = ThumbnailState::Loading;
                                        thumb_requests.push(photo.clone());
                                    }

                                    let (rect, response) =
                                        ui.allocate_exact_size(cell, egui::Sense::click());
                                    if ui.is_rect_visible(rect) {
                                        let rounding = egui::CornerRadius::same(6);
                                        ui.painter().rect_filled(
                                            rect,
                                            rounding,
                                            ui.visuals().extreme_bg_color,
                                        );

                                        let title_height = 20.0;
                                        let image_rect = egui::Rect::from_min_max(
                                            rect.min,
                                            egui::pos2(rect.max.x, rect.max.y - title_height),
                                        );

                                        match entry {
                                            ThumbnailState::Ready { image, texture } => {
                                                let name =
                                                    format!("thumb-{}", photo.id.as_str());
                                                if let Some(texture) = ensure_texture(
                                                    ui.ctx(),
                                                    texture,
                                                    image,
                                                    &name,
                                                ) {
                                                    let size = fit_size(
                                                        egui::vec2(
                                                            image.width as f32,
                                                            image.height as f32,
                                                        ),
                                                        image_rect.size() - egui::vec2(8.0, 8.0),
                                                    );
                                                    let draw_rect = egui::Rect::from_center_size(
                                                        image_rect.center(),
                                                        size,
                                                    );
                                                    let uv = egui::Rect::from_min_max(
                                                        egui::pos2(0.0, 0.0),
                                                        egui::pos2(1.0, 1.0),
                                                    );
                                                    ui.painter().image(
                                                        texture.id(),
                                                        draw_rect,
                                                        uv,
                                                        egui::Color32::WHITE,
                                                    );
                                                }
                                            }
                                            ThumbnailState::Loading
                                            | ThumbnailState::NotRequested => {
                                                ui.painter().rect_filled(
                                                    image_rect.shrink(16.0),
                                                    egui::CornerRadius::same(4),
                                                    ui.visuals().faint_bg_color,
                                                );
                                            }
                                            ThumbnailState::Failed(_) => {
                                                ui.painter().text(
                                                    image_rect.center(),
                                                    egui::Align2::CENTER_CENTER,
                                                    "image unavailable",
                                                    egui::FontId::proportional(12.0),
                                                    ui.visuals().weak_text_color(),
                                                );
                                            }
                                        }

                                        ui.painter().text(
                                            egui::pos2(
                                                rect.center().x,
                                                rect.max.y - title_height / 2.0,
                                            ),
                                            egui::Align2::CENTER_CENTER,
                                            truncated_title(card_title(photo), 30),
                                            egui::FontId::proportional(12.0),
                                            ui.visuals().text_color(),
                                        );

                                        if response.hovered() {
                                            ui.painter().rect_stroke(
                                                rect,
                                                rounding,
                                                egui::Stroke::new(
                                                    1.5,
                                                    lighten_color(self.theme.accent_color, 0.3),
                                                ),
                                                egui::StrokeKind::Middle,
                                            );
                                        }
                                    }
                                    if response.clicked() {
                                        clicked_photo = Some(photo.clone());
                                    }
                                }
                            });
                        }

                        if self.search.is_loading {
                            ui.add_space(8.0);
                            ui.horizontal(|ui| {
                                ui.spinner();
                                ui.label("Loading more photos...");
                            });
                        }

                        // Trigger strip at the very bottom of the scrolled
                        // content, mirroring a sentinel element after the grid.
                        let (sentinel_rect, _) = ui.allocate_exact_size(
                            egui::vec2(ui.available_width(), 24.0),
                            egui::Sense::hover(),
                        );
                        scroll_sample = Some(ViewportSample {
                            sentinel: SentinelHandle(self.sentinel_serial),
                            visible_ratio: visible_fraction(sentinel_rect, ui.clip_rect()),
                            has_more: self.search.has_more,
                            is_loading: self.search.is_loading,
                        });

                        if !self.search.has_more && self.search.error_message.is_none() {
                            ui.vertical_centered(|ui| {
                                ui.weak(format!(
                                    "End of results ({} photos)",
                                    self.search.results.len()
                                ));
                            });
                        }
                    });
            }
        });

        for photo in thumb_requests {
            queue_command(
                &self.cmd_tx,
                BackendCommand::FetchThumbnail { photo },
                &mut self.status,
            );
        }
        if let Some(photo) = clicked_photo {
            self.open_photo(photo);
        }
        if let ScrollAction::LoadNextPage = self.scroll_trigger.observe(scroll_sample) {
            queue_command(&self.cmd_tx, BackendCommand::LoadNextPage, &mut self.status);
        }
    }

    fn show_status_banner(&mut self, ui: &mut egui::Ui) {
        let Some(banner) = self.status_banner.clone() else {
            return;
        };
        let (fill, text_color) = match banner.severity {
            StatusBannerSeverity::Info => (
                egui::Color32::from_rgb(24, 48, 74),
                egui::Color32::from_rgb(190, 220, 255),
            ),
            StatusBannerSeverity::Error => (
                egui::Color32::from_rgb(84, 26, 26),
                egui::Color32::from_rgb(255, 200, 200),
            ),
        };
        egui::Frame::NONE
            .fill(fill)
            .corner_radius(egui::CornerRadius::same(6))
            .inner_margin(egui::Margin::symmetric(10, 8))
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(text_color, &banner.message);
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("Dismiss").clicked() {
                            self.status_banner = None;
                        }
                    });
                });
            });
        ui.add_space(8.0);
    }

    fn show_settings_window(&mut self, ctx: &egui::Context) {
        if !self.settings_open {
            return;
        }

        let mut settings_open = self.settings_open;
        egui::Window::new("Settings")
            .open(&mut settings_open)
            .resizable(false)
            .default_width(300.0)
            .show(ctx, |ui| {
                ui.label("Theme preset");
                egui::ComboBox::from_id_salt("theme_preset")
                    .selected_text(self.theme.preset.label())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(
                            &mut self.theme.preset,
                            ThemePreset::Dark,
                            ThemePreset::Dark.label(),
                        );
                        ui.selectable_value(
                            &mut self.theme.preset,
                            ThemePreset::Light,
                            ThemePreset::Light.label(),
                        );
                    });

                ui.separator();
                ui.label("Accent color");
                ui.color_edit_button_srgba(&mut self.theme.accent_color);
                ui.small("Used for hover outlines and selected controls.");
                ui.add(
                    egui::Slider::new(&mut self.theme.panel_rounding, 0..=MAX_PANEL_ROUNDING)
                        .text("Panel rounding"),
                );

                ui.separator();
                ui.label("Readability");
                ui.add(
                    egui::Slider::new(
                        &mut self.readability.text_scale,
                        MIN_TEXT_SCALE..=MAX_TEXT_SCALE,
                    )
                    .step_by(0.05)
                    .text("Text scale"),
                );
                ui.checkbox(&mut self.readability.compact_density, "Compact UI density");
                ui.add(
                    egui::Slider::new(
                        &mut self.thumbnail_column_width,
                        MIN_THUMBNAIL_COLUMN_WIDTH..=MAX_THUMBNAIL_COLUMN_WIDTH,
                    )
                    .text("Thumbnail size"),
                );

                ui.separator();
                if ui.button("Reset to defaults").clicked() {
                    self.theme = ThemeSettings::dark_default();
                    self.readability = UiReadabilitySettings::defaults();
                    self.thumbnail_column_width = DEFAULT_THUMBNAIL_COLUMN_WIDTH;
                }
            });
        self.settings_open = settings_open;
    }

    fn show_photo_modal(&mut self, ctx: &egui::Context) {
        let Some(mut modal) = self.modal.take() else {
            return;
        };

        let mut open = true;
        let mut save_requested = false;
        let mut copy_requested = false;
        let mut open_in_browser = false;
        let window_title = truncated_title(card_title(&modal.photo), 48);

        egui::Window::new(window_title)
            .id(egui::Id::new("photo_modal"))
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .default_size([760.0, 560.0])
            .show(ctx, |ui| {
                match &mut modal.original {
                    OriginalState::Loading => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Fetching full-size image...");
                        });
                        // Keep the grid thumbnail on screen while the full
                        // image streams in.
                        if let Some(ThumbnailState::Ready { image, texture }) =
                            self.thumbnails.get_mut(&modal.photo.id)
                        {
                            let name = format!("thumb-{}", modal.photo.id.as_str());
                            if let Some(texture) = ensure_texture(ui.ctx(), texture, image, &name) {
                                let size = fit_size(
                                    egui::vec2(image.width as f32, image.height as f32),
                                    ui.available_size() - egui::vec2(0.0, 48.0),
                                );
                                ui.vertical_centered(|ui| {
                                    ui.add(egui::Image::new(&texture).fit_to_exact_size(size));
                                });
                            }
                        }
                    }
                    OriginalState::Ready { image, texture } => {
                        let name = format!("full-{}", modal.photo.id.as_str());
                        if let Some(texture) = ensure_texture(ui.ctx(), texture, image, &name) {
                            let size = fit_size(
                                egui::vec2(image.width as f32, image.height as f32),
                                ui.available_size() - egui::vec2(0.0, 48.0),
                            );
                            ui.vertical_centered(|ui| {
                                ui.add(egui::Image::new(&texture).fit_to_exact_size(size));
                            });
                        }
                    }
                    OriginalState::Failed(reason) => {
                        ui.colored_label(
                            ui.visuals().error_fg_color,
                            format!("Could not load the full-size image: {reason}"),
                        );
                        ui.label("You can still open it in your browser.");
                    }
                }

                ui.separator();
                ui.horizontal(|ui| {
                    let can_copy = matches!(modal.original, OriginalState::Ready { .. });
                    if ui.button("Save image...").clicked() {
                        save_requested = true;
                    }
                    if ui
                        .add_enabled(can_copy, egui::Button::new("Copy to clipboard"))
                        .clicked()
                    {
                        copy_requested = true;
                    }
                    if ui.button("Open in browser").clicked() {
                        open_in_browser = true;
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.weak(format!("by {}", modal.photo.owner.as_str()));
                    });
                });
            });

        if save_requested {
            self.status = "Downloading full-size image...".to_string();
            queue_command(
                &self.cmd_tx,
                BackendCommand::SaveOriginal {
                    photo: modal.photo.clone(),
                },
                &mut self.status,
            );
        }
        if copy_requested {
            if let OriginalState::Ready { image, .. } = &modal.original {
                match write_clipboard_image(&image.rgba, image.width, image.height) {
                    Ok(()) => self.status = "Image copied to clipboard".to_string(),
                    Err(err) => self.status = format!("Clipboard copy failed: {err}"),
                }
            }
        }
        if open_in_browser {
            ctx.open_url(egui::OpenUrl::new_tab(
                modal.photo.original_url(&self.image_host),
            ));
        }

        if open {
            self.modal = Some(modal);
        }
    }

    fn is_actively_loading(&self) -> bool {
        self.search.is_loading
            || self
                .thumbnails
                .values()
                .any(|state| matches!(state, ThumbnailState::Loading))
            || matches!(
                &self.modal,
                Some(modal) if matches!(modal.original, OriginalState::Loading)
            )
    }
}

impl eframe::App for PhotoscopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        self.apply_theme_if_needed(ctx);

        if let Some(url) = self.pending_browser_open.take() {
            ctx.open_url(egui::OpenUrl::new_tab(url));
        }

        self.show_search_screen(ctx);
        self.show_settings_window(ctx);
        self.show_photo_modal(ctx);

        if self.is_actively_loading() {
            ctx.request_repaint_after(std::time::Duration::from_millis(16));
        } else {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let settings = PersistedAppSettings::from_runtime(
            self.theme,
            self.readability,
            self.thumbnail_column_width,
        );
        if let Ok(serialized) = serde_json::to_string(&settings) {
            storage.set_string(SETTINGS_STORAGE_KEY, serialized);
        }
    }
}

fn queue_command(cmd_tx: &Sender<BackendCommand>, cmd: BackendCommand, status: &mut String) {
    let cmd_name = match &cmd {
        BackendCommand::Search { .. } => "search",
        BackendCommand::LoadNextPage => "load_next_page",
        BackendCommand::FetchThumbnail { .. } => "fetch_thumbnail",
        BackendCommand::FetchOriginal { .. } => "fetch_original",
        BackendCommand::SaveOriginal { .. } => "save_original",
    };
    tracing::debug!(command = cmd_name, "queueing ui->worker command");
    match cmd_tx.try_send(cmd) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            *status = "Worker queue is full; please retry".to_string();
            tracing::warn!(command = cmd_name, "ui->worker command queue is full");
        }
        Err(TrySendError::Disconnected(_)) => {
            let preserving_startup_error = status
                .to_ascii_lowercase()
                .contains("worker startup failure");
            if !preserving_startup_error {
                *status =
                    "Search worker disconnected (possible startup failure); restart the app"
                        .to_string();
            }
            tracing::error!(command = cmd_name, "ui->worker command queue disconnected");
        }
    }
}

/// Uploads decoded pixels as a texture the first time a slot is drawn and
/// hands back a cheap clone of the handle on every call after that.
fn ensure_texture(
    ctx: &egui::Context,
    slot: &mut Option<TextureHandle>,
    image: &PreviewImage,
    name: &str,
) -> Option<TextureHandle> {
    if slot.is_none() {
        let color_image =
            egui::ColorImage::from_rgba_unmultiplied([image.width, image.height], &image.rgba);
        *slot = Some(ctx.load_texture(name.to_string(), color_image, egui::TextureOptions::LINEAR));
    }
    slot.clone()
}

fn write_clipboard_image(rgba: &[u8], width: usize, height: usize) -> Result<(), String> {
    let mut clipboard = arboard::Clipboard::new().map_err(|err| err.to_string())?;
    clipboard
        .set_image(arboard::ImageData {
            width,
            height,
            bytes: std::borrow::Cow::Owned(rgba.to_vec()),
        })
        .map_err(|err| err.to_string())
}

fn visuals_for_theme(theme: ThemeSettings) -> egui::Visuals {
    let mut visuals = match theme.preset {
        ThemePreset::Dark => egui::Visuals::dark(),
        ThemePreset::Light => egui::Visuals::light(),
    };

    visuals.hyperlink_color = theme.accent_color;
    visuals.selection.bg_fill = theme.accent_color;
    visuals.widgets.active.bg_fill = theme.accent_color;
    visuals.widgets.hovered.bg_fill = theme.accent_color.gamma_multiply(0.85);

    let radius = egui::CornerRadius::same(theme.panel_rounding);
    visuals.widgets.noninteractive.corner_radius = radius;
    visuals.widgets.inactive.corner_radius = radius;
    visuals.widgets.hovered.corner_radius = radius;
    visuals.widgets.active.corner_radius = radius;
    visuals.widgets.open.corner_radius = radius;
    visuals.window_corner_radius =
        egui::CornerRadius::same(theme.panel_rounding.saturating_add(2));
    visuals.menu_corner_radius = radius;

    visuals
}

fn scaled_text_styles(text_scale: f32) -> BTreeMap<egui::TextStyle, egui::FontId> {
    let mut styles = egui::Style::default().text_styles;
    for font in styles.values_mut() {
        font.size *= text_scale;
    }
    styles
}

fn lighten_color(color: egui::Color32, amount: f32) -> egui::Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let lift = |channel: u8| -> u8 {
        let base = f32::from(channel);
        (base + (255.0 - base) * amount).round() as u8
    };
    egui::Color32::from_rgb(lift(color.r()), lift(color.g()), lift(color.b()))
}

fn grid_column_count(available_width: f32, column_width: f32) -> usize {
    if available_width <= 0.0 || column_width <= 0.0 {
        return 1;
    }
    ((available_width / column_width).floor() as usize).max(1)
}

/// Fraction of the rect's height inside the clip region, 0.0 when disjoint.
fn visible_fraction(rect: egui::Rect, clip: egui::Rect) -> f32 {
    if rect.height() <= 0.0 {
        return 0.0;
    }
    let overlap = rect.intersect(clip);
    if overlap.width() <= 0.0 || overlap.height() <= 0.0 {
        return 0.0;
    }
    (overlap.height() / rect.height()).clamp(0.0, 1.0)
}

fn card_title(photo: &Photo) -> &str {
    let trimmed = photo.title.trim();
    if trimmed.is_empty() {
        "(untitled)"
    } else {
        trimmed
    }
}

fn truncated_title(title: &str, max_chars: usize) -> String {
    if title.chars().count() <= max_chars {
        return title.to_string();
    }
    let cut: String = title.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

fn fit_size(source: egui::Vec2, bounds: egui::Vec2) -> egui::Vec2 {
    if source.x <= 0.0 || source.y <= 0.0 || bounds.x <= 0.0 || bounds.y <= 0.0 {
        return egui::Vec2::ZERO;
    }
    let scale = (bounds.x / source.x).min(bounds.y / source.y).min(1.0);
    source * scale
}

const SETTINGS_STORAGE_KEY: &str = "photoscope.settings";

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    spawn_backend_thread(cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Photoscope")
            .with_inner_size([1180.0, 820.0])
            .with_min_inner_size([760.0, 560.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Photoscope",
        options,
        Box::new(|cc| {
            let persisted_settings = cc.storage.and_then(|storage| {
                storage
                    .get_string(SETTINGS_STORAGE_KEY)
                    .and_then(|text| serde_json::from_str::<PersistedAppSettings>(&text).ok())
            });
            Ok(Box::new(PhotoscopeApp::new(cmd_tx, ui_rx, persisted_settings)))
        }),
    )
}
