//! Archiport - Resilient media archive export
//!
//! This library exports media archives from a remote photo-management server
//! to local disk or to cloud object storage, resiliently against interrupted
//! network transfers. The core pieces:
//!
//! - Resumable, integrity-checked archive downloads (`export`)
//! - Streaming cloud uploads to WebDAV and S3-compatible targets (`cloud`)
//! - Encrypted at-rest storage of cloud credentials (`vault`)
//! - A top-level transfer coordinator (`orchestrator`)
//!
//! The remote server is only ever touched through the trait seams in `api`,
//! which keeps the engines testable without a network.

pub mod api;
pub mod cloud;
pub mod export;
pub mod orchestrator;
pub mod vault;

/// Library version, from the workspace manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
