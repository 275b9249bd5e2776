//! # derivo
//!
//! Derived-image asset pipeline for a portfolio catalog. Every uploaded
//! image (project photo, album image, service icon) gets a canonical WebP
//! re-encode plus three resized WebP thumbnails, stored in a `webp/` folder
//! next to the original. Pages ask for the best available rendition and
//! always get a usable path back. When an entity is renamed or deleted, its
//! derived files follow.
//!
//! # Architecture: Three Paths
//!
//! ```text
//! write   lifecycle event → hooks → optimizer → codec → webp/
//! read    page render     → resolver → derived | original | placeholder
//! delete  lifecycle event → hooks → cleanup → filesystem
//! ```
//!
//! The read path never triggers generation. A missing variant is a degraded
//! state the resolver works around, not an error.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Codec (sniff, decode with limits, encode) and bounding-box resize |
//! | [`paths`] | The `webp/` folder convention: source path → four derived paths |
//! | [`optimize`] | Orchestrator: read once, decode once, write four variants atomically |
//! | [`flight`] | Per-path single-flight table shared by optimizer and cleanup |
//! | [`cleanup`] | Purge one derived set or a whole asset directory |
//! | [`resolve`] | Fallback chain and URL mapping for the read path |
//! | [`lifecycle`] | The five entity hooks and the matching event enum |
//! | [`entity`] | Entity kinds, roles, and the `HasSourceImage` capability |
//! | [`batch`] | Discovery over the media root and parallel optimization |
//! | [`config`] | `derivo.toml` loading, validation, and merging |
//! | [`naming`] | Entity name → asset directory name |
//! | [`error`] | Crate-level filesystem and codec error |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Convention Over Storage
//!
//! Derived paths are a pure function of the source path. Nothing records
//! which variants exist: the optimizer writes to the computed paths and the
//! resolver probes them. There is no index to drift out of sync with the
//! filesystem.
//!
//! ## Staleness by Modification Time
//!
//! A variant is regenerated when it is missing or older than its source.
//! Checking mtimes costs one `stat` per file, so a batch re-run over an
//! unchanged tree reads no image bytes at all.
//!
//! ## Keyed Locking
//!
//! Concurrent requests for the same source share one run through
//! [`flight::FlightTable`]. Different sources never wait on each other.

pub mod batch;
pub mod cleanup;
pub mod config;
pub mod entity;
pub mod error;
pub mod flight;
pub mod imaging;
pub mod lifecycle;
pub mod naming;
pub mod optimize;
pub mod output;
pub mod paths;
pub mod resolve;

#[cfg(test)]
pub(crate) mod test_helpers;
