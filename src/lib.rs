//! Synheart Sync - On-device health record sync engine
//!
//! Sync reads raw records from a health platform, normalizes them into a small
//! set of canonical resource payloads and hands those to an uploader, either as
//! a full backfill over a window or incrementally from the platform change feed:
//! record source → reader / change reconciler → processor → uploader.
//!
//! ## Modules
//!
//! - **Sources**: The capability interface records are read and aggregated through
//! - **Pipeline**: Per-resource read, aggregation and normalization shared by both sync paths
//! - **Orchestrator**: Sync attempts with status events and change token persistence

pub mod aggregator;
pub mod config;
pub mod encoder;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod processor;
pub mod reader;
pub mod reconciler;
pub mod schema;
pub mod source;
pub mod status;
pub mod token;
pub mod types;
pub mod uploader;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use orchestrator::{BackfillRequest, IncrementalRequest, SyncOrchestrator, SyncReport};
pub use pipeline::ResourcePipeline;
pub use reconciler::ChangeReconciler;
pub use source::{MemorySource, RecordSource};
pub use status::StatusSink;
pub use token::ChangeTokenStore;
pub use types::{ProcessedResourceData, Resource, StatusEvent, SyncStatus, TimeWindow};
pub use uploader::{UploadContext, Uploader};

/// Sync version embedded in all upload envelopes
pub const SYNC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for upload envelopes
pub const PRODUCER_NAME: &str = "synheart-sync";
