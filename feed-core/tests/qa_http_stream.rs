//! QA tests running whole sessions over real HTTP.
//!
//! Each test serves a canned `text/event-stream` response from a local TCP
//! listener and points a StreamIngestor at it.
//! Run with: `cargo test -p feed-core --test qa_http_stream`

use feed_core::{FeedConfig, SessionError, SessionStatus, StreamIngestor};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const SSE_HEADERS: &str = "HTTP/1.1 200 OK\r\n\
    content-type: text/event-stream\r\n\
    cache-control: no-cache\r\n\
    connection: close\r\n\r\n";

/// Read the request head so the client sees a well-behaved server.
async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let Ok(n) = socket.read(&mut buf).await else {
            return;
        };
        if n == 0 {
            return;
        }
        request.extend_from_slice(&buf[..n]);
        if request.windows(4).any(|w| w == b"\r\n\r\n") {
            return;
        }
    }
}

/// Serve one connection: write `head`, then each chunk with a short pause.
async fn serve_once(head: &'static str, chunks: Vec<&'static str>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        // The client may hang up after the sentinel; write errors are expected
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for chunk in chunks {
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = socket.shutdown().await;
    });

    (format!("http://{addr}/stream-story"), handle)
}

fn ingestor() -> StreamIngestor {
    let config = FeedConfig::new().with_connect_timeout(Duration::from_secs(5));
    StreamIngestor::from_config(&config).expect("Failed to build ingestor")
}

#[tokio::test]
async fn test_full_session_over_http() {
    let (endpoint, server) = serve_once(
        SSE_HEADERS,
        vec![
            ": connected\n\n",
            "data: {\"turn\": 1, \"type\": \"action\", \"character\": \"Alice\",",
            " \"action\": \"pick up lantern\", \"entity_updates\": {\"items\": {\"lantern\": {\"owner\": \"Alice\", \"status\": \"carried\"}}}}\n\n",
            // replayed by the backend
            "data: {\"turn\": 1, \"type\": \"action\", \"character\": \"Alice\", \"action\": \"pick up lantern\"}\n\n",
            "event: heartbeat\ndata: {\"turn\": 99, \"type\": \"action\"}\n\n",
            "data: not json at all\n\n",
            "data: {\"turn\": 2, \"type\": \"dialogue\", \"speaker\": \"Bob\", \"content\": \"Who's there?\"}\r\n\r\n",
            "data: {\"type\": \"end\", \"message\": \"Simulation Complete\"}\n\n",
            "data: {\"turn\": 3, \"type\": \"dialogue\", \"content\": \"never seen\"}\n\n",
        ],
    )
    .await;

    let mut ingestor = ingestor();
    ingestor.start_session(&endpoint).await.expect("Failed to connect");
    let status = ingestor.run().await;

    assert_eq!(status, SessionStatus::Completed);
    let payloads: Vec<_> = ingestor.log().events().map(|e| e.payload_text()).collect();
    assert_eq!(payloads, vec!["pick up lantern", "Who's there?"]);
    assert_eq!(ingestor.engine().duplicates(), 1);
    assert_eq!(ingestor.world().names().collect::<Vec<_>>(), vec!["lantern"]);
    assert!(!ingestor.is_connected());

    server.abort();
}

#[tokio::test]
async fn test_server_close_without_sentinel_disconnects() {
    let (endpoint, server) = serve_once(
        SSE_HEADERS,
        vec!["data: {\"turn\": 1, \"type\": \"director_note\", \"content\": \"Night falls\"}\n\n"],
    )
    .await;

    let mut ingestor = ingestor();
    ingestor.start_session(&endpoint).await.expect("Failed to connect");

    assert_eq!(ingestor.run().await, SessionStatus::Disconnected);
    assert_eq!(ingestor.log().len(), 1);
    assert!(ingestor.last_error().is_some());

    server.await.unwrap();
}

#[tokio::test]
async fn test_error_status_disconnects() {
    let (endpoint, server) = serve_once(
        "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 4\r\nconnection: close\r\n\r\nbusy",
        vec![],
    )
    .await;

    let mut ingestor = ingestor();
    let err = ingestor.start_session(&endpoint).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Stream(story_stream::Error::Api { status: 503, .. })
    ));
    assert_eq!(ingestor.status(), SessionStatus::Disconnected);
    assert!(ingestor.log().is_empty());

    server.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_endpoint_disconnects() {
    // Bind and release a port so nothing is listening on it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut ingestor = ingestor();
    let result = ingestor
        .start_session(&format!("http://{addr}/stream-story"))
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Stream(story_stream::Error::Network(_)))
    ));
    assert_eq!(ingestor.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_restart_replaces_previous_session() {
    let (first, first_server) = serve_once(
        SSE_HEADERS,
        vec![
            "data: {\"turn\": 1, \"type\": \"action\", \"action\": \"first run\", \"entity_updates\": {\"items\": {\"map\": {\"status\": \"unrolled\"}}}}\n\n",
            "data: {\"type\": \"end\"}\n\n",
        ],
    )
    .await;
    let (second, second_server) = serve_once(
        SSE_HEADERS,
        vec![
            "data: {\"turn\": 1, \"type\": \"action\", \"action\": \"first run\"}\n\n",
            "data: {\"type\": \"end\"}\n\n",
        ],
    )
    .await;

    let mut ingestor = ingestor();
    ingestor.start_session(&first).await.unwrap();
    assert_eq!(ingestor.run().await, SessionStatus::Completed);
    let first_id = ingestor.session_id();

    ingestor.start_session(&second).await.unwrap();
    assert_eq!(ingestor.status(), SessionStatus::Running);
    assert!(ingestor.log().is_empty());
    assert!(ingestor.world().is_empty());

    assert_eq!(ingestor.run().await, SessionStatus::Completed);
    assert_ne!(ingestor.session_id(), first_id);
    // Same fingerprint as the first session, but accepted again
    assert_eq!(ingestor.log().len(), 1);
    assert!(ingestor.world().is_empty());

    first_server.abort();
    second_server.abort();
}
