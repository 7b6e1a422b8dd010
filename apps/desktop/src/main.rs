use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use search_core::{config::load_settings, FlickrProvider, PhotoProvider, SearchController};

#[derive(Parser, Debug)]
#[command(name = "photoscope-cli", about = "Search Flickr photos from the terminal")]
struct Args {
    /// Search text, for example "mountain lake".
    query: String,
    /// How many result pages to fetch before printing.
    #[arg(long, default_value_t = 1)]
    pages: u32,
    /// Print results as JSON instead of a listing.
    #[arg(long)]
    json: bool,
    /// Download the full-size image at this listing index.
    #[arg(long)]
    save: Option<usize>,
    /// Directory for downloaded images.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    if args.query.trim().is_empty() {
        bail!("query must not be blank");
    }

    let settings = load_settings();
    let provider = Arc::new(FlickrProvider::new(settings)?);
    let controller = SearchController::new(provider.clone());

    let mut snapshot = controller.submit_search(&args.query).await;
    if let Some(message) = &snapshot.error_message {
        bail!("search failed: {message}");
    }

    while snapshot.page < args.pages && snapshot.has_more {
        snapshot = controller.load_next_page().await;
        if let Some(message) = &snapshot.error_message {
            bail!("page {} failed: {message}", snapshot.page);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot.results)?);
    } else {
        for (index, photo) in snapshot.results.iter().enumerate() {
            let title = if photo.title.trim().is_empty() {
                "(untitled)"
            } else {
                photo.title.as_str()
            };
            println!("{index:>4}  {}  {title}", photo.id.as_str());
        }
        println!(
            "{} of {} results for {:?}{}",
            snapshot.results.len(),
            snapshot.total_available,
            snapshot.query,
            if snapshot.has_more { " (more available)" } else { "" }
        );
    }

    if let Some(index) = args.save {
        let photo = snapshot
            .results
            .get(index)
            .with_context(|| format!("no result at index {index}"))?;
        let url = photo.original_url(provider.image_host());
        let bytes = provider.fetch_image(&url).await?;
        let path = args.out.join(photo.download_filename());
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved {} ({} bytes)", path.display(), bytes.len());
    }

    Ok(())
}
