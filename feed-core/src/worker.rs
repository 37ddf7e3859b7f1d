//! Background feed worker.
//!
//! Runs a [`StreamIngestor`] on a tokio task so a front end never blocks on
//! the stream. The front end sends [`FeedRequest`]s and receives a
//! [`FeedSnapshot`] after every change it would render.

use crate::session::{Connector, FeedSnapshot, StreamIngestor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Request sent from the front end to the feed worker.
#[derive(Debug, Clone)]
pub enum FeedRequest {
    /// Start a new session against the endpoint, replacing any current one.
    Start(String),
    /// Close the current session.
    Stop,
    /// Shut the worker down.
    Shutdown,
}

/// Spawn a worker owning `ingestor`.
///
/// Must be called from within a tokio runtime. The worker exits on
/// `Shutdown`, when the request sender is dropped, or when the update
/// receiver is dropped.
pub fn spawn_feed_worker<C: Connector + 'static>(
    ingestor: StreamIngestor<C>,
) -> (
    mpsc::Sender<FeedRequest>,
    mpsc::Receiver<FeedSnapshot>,
    JoinHandle<StreamIngestor<C>>,
) {
    let (request_tx, request_rx) = mpsc::channel(8);
    let (update_tx, update_rx) = mpsc::channel(64);

    let handle = tokio::spawn(worker_loop(ingestor, request_rx, update_tx));

    (request_tx, update_rx, handle)
}

/// The main worker loop.
///
/// Requests take priority over stream items, so a restart drops the old
/// connection before another of its messages is read. A request arriving
/// while a connection is being opened abandons the attempt.
async fn worker_loop<C: Connector>(
    mut ingestor: StreamIngestor<C>,
    mut request_rx: mpsc::Receiver<FeedRequest>,
    update_tx: mpsc::Sender<FeedSnapshot>,
) -> StreamIngestor<C> {
    let mut pending = None;

    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => {
                let connected = ingestor.is_connected();

                tokio::select! {
                    biased;

                    request = request_rx.recv() => request.unwrap_or(FeedRequest::Shutdown),

                    outcome = ingestor.next_message(), if connected => {
                        let changed = outcome.is_some_and(|o| o.changes_state());
                        if changed && update_tx.send(ingestor.snapshot()).await.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }
        };

        match request {
            FeedRequest::Start(endpoint) => {
                ingestor.reset_session(&endpoint);
                if update_tx.send(ingestor.snapshot()).await.is_err() {
                    break;
                }

                tokio::select! {
                    biased;

                    request = request_rx.recv() => {
                        tracing::debug!(%endpoint, "connect abandoned");
                        pending = Some(request.unwrap_or(FeedRequest::Shutdown));
                    }

                    // Failure is recorded as Disconnected on the ingestor
                    _ = ingestor.open() => {
                        if !ingestor.is_connected() && update_tx.send(ingestor.snapshot()).await.is_err() {
                            break;
                        }
                    }
                }
            }
            FeedRequest::Stop => {
                ingestor.close();
                if update_tx.send(ingestor.snapshot()).await.is_err() {
                    break;
                }
            }
            FeedRequest::Shutdown => break,
        }
    }

    ingestor.close();
    ingestor
}
