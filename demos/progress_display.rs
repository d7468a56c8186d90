//! Progress display example
//!
//! Polls request snapshots for a human-readable progress display.
//!
//! Usage: cargo run --example progress_display -- [url1] [url2] ...

use fetchq::{Downloader, DownloaderConfig};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let urls: Vec<String> = env::args().skip(1).collect();
    let urls = if urls.is_empty() {
        vec![
            "https://httpbin.org/bytes/4096".to_string(),
            "https://httpbin.org/bytes/8192".to_string(),
        ]
    } else {
        urls
    };

    let dir = env::temp_dir().join("fetchq-progress");
    let config = DownloaderConfig::default()
        .download_dir(&dir)
        .max_concurrent_downloads(Some(2));
    let downloader = Downloader::new(config)?;

    let mut ids = Vec::new();
    for (i, url) in urls.iter().enumerate() {
        let request = downloader
            .new_request_in_default_dir(url, format!("file-{i}.bin"))
            .build()?;
        let id = downloader.enqueue(request, Default::default());
        println!("Added: {id} - {url}");
        ids.push(id);
    }

    // Poll progress until all finish
    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        let mut all_done = true;
        println!("\n--- Status ---");

        for &id in &ids {
            if let Some(info) = downloader.status(id) {
                println!(
                    "  {} | {:10} | {:>3}% | {}",
                    &id.to_string()[..8],
                    info.status.to_string(),
                    info.progress.percent(),
                    format_bytes(info.progress.downloaded_bytes),
                );

                if !info.status.is_finished() {
                    all_done = false;
                }
            }
        }

        if all_done {
            println!("\nAll downloads finished in {}", dir.display());
            break;
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
