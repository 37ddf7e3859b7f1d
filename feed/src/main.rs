//! Headless terminal viewer for a live narrative feed.
//!
//! Connects to a story stream, prints each new event as it is accepted and
//! the world state whenever it changes, and exits when the session ends.
//!
//! ```bash
//! cargo run -p feed -- http://localhost:8000/stream-story
//! ```
//!
//! The endpoint defaults to `NARRATIVE_STREAM_URL` (or the local backend).
//! The exit status is non-zero if the session ended without the stream's
//! end sentinel.

mod view;

use anyhow::Context;
use feed_core::{spawn_feed_worker, FeedConfig, FeedRequest, SessionStatus, StreamIngestor};
use std::io::{self, Write};
use tracing::info;
use view::FeedView;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let mut config = FeedConfig::from_env().context("invalid feed configuration")?;
    if let Some(endpoint) = args.get(1) {
        config = config.with_endpoint(endpoint.clone());
    }

    let ingestor = StreamIngestor::from_config(&config).context("failed to build stream client")?;
    let (request_tx, mut update_rx, worker) = spawn_feed_worker(ingestor);

    info!(endpoint = %config.endpoint, "starting narrative feed");
    request_tx
        .send(FeedRequest::Start(config.endpoint.clone()))
        .await
        .context("feed worker stopped unexpectedly")?;

    let mut view = FeedView::new();
    let mut stdout = io::stdout();

    loop {
        tokio::select! {
            update = update_rx.recv() => {
                let Some(snapshot) = update else { break };
                view.apply(&snapshot, &mut stdout)?;
                stdout.flush()?;
                if snapshot.status.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing session");
                let _ = request_tx.send(FeedRequest::Stop).await;
            }
        }
    }

    let _ = request_tx.send(FeedRequest::Shutdown).await;
    worker.await.context("feed worker panicked")?;

    if view.status() != SessionStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn print_help() {
    println!("feed - live narrative feed viewer");
    println!();
    println!("USAGE:");
    println!("  feed [ENDPOINT]");
    println!();
    println!("ENVIRONMENT:");
    println!("  NARRATIVE_STREAM_URL           Stream endpoint (default: http://localhost:8000/stream-story)");
    println!("  NARRATIVE_FINGERPRINT_PREFIX   Payload characters used for deduplication, or \"full\" (default: 30)");
    println!("  RUST_LOG                       Log filter (default: info)");
}
