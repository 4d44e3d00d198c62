//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via `tracing` with an `RUST_LOG` driven filter
pub mod tracing;
