//! Ingestion and reconciliation core for live narrative feeds.
//!
//! This crate provides:
//! - Parsing of narrative events from a story stream
//! - Fingerprint-based deduplication into an append-only event log
//! - A world-state registry replaced by each snapshot the stream sends
//! - Session lifecycle management over a server-sent-events connection
//!
//! # Quick Start
//!
//! ```ignore
//! use feed_core::{FeedConfig, StreamIngestor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FeedConfig::new().with_endpoint("http://localhost:8000/stream-story");
//!
//!     let mut ingestor = StreamIngestor::from_config(&config)?;
//!     ingestor.start_session(&config.endpoint).await?;
//!
//!     let status = ingestor.run().await;
//!     println!("{status}: {} events", ingestor.log().len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod event;
pub mod fingerprint;
pub mod render;
pub mod session;
pub mod testing;
pub mod world;
pub mod worker;

// Primary public API
pub use config::FeedConfig;
pub use engine::{EventLog, IngestResult, LogEntry, ReconciliationEngine};
pub use event::{EventKind, NarrativeEvent};
pub use fingerprint::FingerprintPolicy;
pub use session::{
    Connector, FeedSnapshot, MessageOutcome, SessionError, SessionStatus, StreamIngestor,
};
pub use testing::{ScriptedConnector, ScriptedItem, TestHarness};
pub use worker::{spawn_feed_worker, FeedRequest};
pub use world::{EntityInfo, WorldState};
