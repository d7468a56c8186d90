//! Basic HTTP download example
//!
//! Downloads a file into the current directory with lifecycle hooks attached.
//!
//! Usage: cargo run --example http_download -- [url] [file_name]

use fetchq::{DownloadCallbacks, DownloadEvent, Downloader, DownloaderConfig};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let url = env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/bytes/1024".to_string());
    let file_name = env::args().nth(2).unwrap_or_else(|| "download.bin".to_string());

    println!("Downloading: {url}");

    let config = DownloaderConfig::default().download_dir(".");
    let downloader = Downloader::new(config)?;

    let request = downloader
        .new_request_in_default_dir(&url, &file_name)
        .tag("demo")
        .build()?;

    let callbacks = DownloadCallbacks::new()
        .on_start(|| println!("started"))
        .on_progress(|pct| println!("{pct}%"))
        .on_completed(|| println!("completed"))
        .on_error(|msg| eprintln!("error: {msg}"));

    let id = downloader.enqueue(request, callbacks);
    println!("Download added: {id}");

    // Hooks have already run by the time an event arrives here
    let mut events = downloader.subscribe();
    loop {
        match events.recv().await {
            Ok(event) if event.id() == id && event.is_terminal() => {
                if let DownloadEvent::Completed { path, .. } = &event {
                    println!("Saved to {}", path.display());
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Event error: {e}");
                break;
            }
        }
    }

    if let Some(info) = downloader.status(id) {
        println!(
            "Final: {} ({:?}, {} bytes)",
            info.path.display(),
            info.status,
            info.progress.downloaded_bytes
        );
    }

    Ok(())
}
