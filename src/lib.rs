//! Ultrahuman Flux - Daily Ultrahuman ring metrics as typed, named readings
//!
//! Flux polls the Ultrahuman partner API and turns each day's nested metrics
//! payload into flat readings a monitoring host can expose as entities:
//! fetch → extraction → schema inference → entity projection.
//!
//! ## Modules
//!
//! - **Extraction**: flatten the raw payload into a canonical mapping
//! - **Inference / Schema**: static and inferred semantics for metric names
//! - **Projection**: build the entity set from a mapping
//! - **Client / Coordinator**: fetch on an interval and publish mappings

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extractor;
pub mod inference;
pub mod pipeline;
pub mod projector;
pub mod schema;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use client::{DateQuery, MetricsSource, UltrahumanClient};
pub use config::ClientConfig;
pub use coordinator::{Coordinator, RefreshOutcome, RefreshStatus};
pub use error::{ComputeError, FetchError};
pub use extractor::{extract, extract_str};
pub use inference::infer;
pub use pipeline::{process_daily_payload, DailySnapshot};
pub use projector::{build_entities, Projector};
pub use types::{CanonicalMapping, EntityDescriptor, EntityState, MetricSchema, MetricValue};

/// Flux version
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");
