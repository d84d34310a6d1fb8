//! HTTP gateway for the Cask object store.
//!
//! Serves stored files with RFC-faithful byte-range and conditional-GET
//! semantics, and ingests multi-file uploads as new immutable object
//! versions, surfacing the store's concurrency and fixity rejections as
//! HTTP conflicts.
//!
//! # Request Flows
//!
//! - Download: [`router`] → [`resolve`] (content type) → [`range`] (plan) →
//!   [`stream`] (chunked span copy)
//! - Upload: [`router`] → [`ingest`] (multipart → staged sources) →
//!   [`coordinator`] (create/update legality, commit, refusal
//!   classification) → the injected [`ObjectStore`](cask_store::ObjectStore)

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod ingest;
pub mod range;
pub mod resolve;
pub mod router;
pub mod server;
pub mod stream;

pub use config::{GatewayConfig, DEFAULT_CHUNK_SIZE};
pub use coordinator::{CommitOutcome, IngestionRequest, WriteMethod};
pub use error::{GatewayError, GatewayResult};
pub use handler::AppState;
pub use range::{plan, CachingContext, Plan, RequestConditions};
pub use resolve::resolve_content_type;
pub use server::GatewayServer;
pub use stream::{copy_span, SpanChunks};
