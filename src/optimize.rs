//! Optimization orchestrator: one source in, four derived WebP variants out.
//!
//! ## Run states
//!
//! ```text
//! Pending → Reading → Transcoding → Writing → Done
//!                                           ↘ PartiallyFailed
//!                                           ↘ Failed
//! ```
//!
//! The source is read once and decoded once. Each variant is then resized
//! (canonical keeps the source resolution), encoded and written on its own.
//! A failure in one variant is recorded in the report and the others carry
//! on. The source file is only ever read.
//!
//! ## Staleness
//!
//! A derived file is fresh when it exists and its modification time is not
//! older than the source's. With `force = false` fresh variants are skipped,
//! and when all four are fresh the source is not opened at all. With
//! `force = true` all four are regenerated.
//!
//! Equal timestamps count as fresh. On a filesystem with coarse mtimes
//! (one or two seconds), a source rewritten within the same tick its
//! variants were produced in is therefore not picked up; pass `force` or
//! touch the source again.
//!
//! ## Writes
//!
//! Every variant goes through a [`NamedTempFile`] in the target directory and
//! is moved into place with a rename, so a reader sees either the previous
//! file or the complete new one.
//!
//! ## Concurrency
//!
//! Runs are keyed by the canonical source path in a [`FlightTable`]. A second
//! request for a path with a run in flight blocks until it ends and gets that
//! run's report back with `coalesced = true`.

use crate::config::PipelineConfig;
use crate::entity::AssetRole;
use crate::error::{AssetError, FailureKind};
use crate::flight::{Flight, FlightTable, lock_key};
use crate::imaging::{
    CodecError, ImageCodec, RustCodec, SizeClass, TargetFormat, resize_to_bounding_box,
};
use crate::paths::{DerivedPaths, derived_paths_for_role};
use image::DynamicImage;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

/// Where a run is, or how it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationState {
    Pending,
    Reading,
    Transcoding,
    Writing,
    /// Every variant written or skipped.
    Done,
    /// At least one variant failed and at least one did not.
    PartiallyFailed,
    /// No variant could be produced.
    Failed,
}

impl fmt::Display for OptimizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizationState::Pending => "pending",
            OptimizationState::Reading => "reading",
            OptimizationState::Transcoding => "transcoding",
            OptimizationState::Writing => "writing",
            OptimizationState::Done => "done",
            OptimizationState::PartiallyFailed => "partially failed",
            OptimizationState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariantStatus {
    Written {
        bytes: u64,
        width: u32,
        height: u32,
        generated_at: SystemTime,
        /// Hex SHA-256 of the written file.
        sha256: String,
    },
    /// Derived file already fresh.
    Skipped,
    Failed {
        kind: FailureKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantOutcome {
    pub size: SizeClass,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: VariantStatus,
}

impl VariantOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, VariantStatus::Failed { .. })
    }
}

/// Result of one `optimize` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub source: PathBuf,
    pub outcome: OptimizationState,
    /// One entry per size class, in [`SizeClass::ALL`] order.
    pub variants: Vec<VariantOutcome>,
    pub elapsed: Duration,
    /// The caller joined another caller's in-flight run.
    pub coalesced: bool,
}

impl OptimizationReport {
    pub fn variant(&self, size: SizeClass) -> Option<&VariantOutcome> {
        self.variants.iter().find(|v| v.size == size)
    }

    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, VariantStatus::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, VariantStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, VariantStatus::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.outcome == OptimizationState::Done
    }

    fn count(&self, pred: impl Fn(&VariantStatus) -> bool) -> usize {
        self.variants.iter().filter(|v| pred(&v.status)).count()
    }
}

impl fmt::Display for OptimizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} written, {} skipped, {} failed",
            self.written(),
            self.skipped(),
            self.failed()
        )
    }
}

fn outcome_of(variants: &[VariantOutcome]) -> OptimizationState {
    let failed = variants.iter().filter(|v| v.is_failed()).count();
    match failed {
        0 => OptimizationState::Done,
        n if n == variants.len() => OptimizationState::Failed,
        _ => OptimizationState::PartiallyFailed,
    }
}

/// Produces the derived variant set for source images.
///
/// Cheap to share across threads. Clones share the same flight table, so
/// clones coalesce with each other.
#[derive(Debug, Clone)]
pub struct Optimizer<C: ImageCodec = RustCodec> {
    config: Arc<PipelineConfig>,
    codec: Arc<C>,
    flights: Arc<FlightTable<OptimizationReport>>,
}

impl Optimizer<RustCodec> {
    pub fn new(config: PipelineConfig) -> Self {
        let codec = RustCodec::new(config.decode_limits());
        Self::with_codec(config, codec)
    }
}

impl<C: ImageCodec> Optimizer<C> {
    pub fn with_codec(config: PipelineConfig, codec: C) -> Self {
        Self {
            config: Arc::new(config),
            codec: Arc::new(codec),
            flights: Arc::new(FlightTable::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The per-path table runs are serialized on. Shared with
    /// [`Cleanup`](crate::cleanup::Cleanup) so purges wait for runs.
    pub fn flights(&self) -> Arc<FlightTable<OptimizationReport>> {
        Arc::clone(&self.flights)
    }

    /// Optimize `source`, inferring its role from its location.
    pub fn optimize(&self, source: &Path, force: bool) -> OptimizationReport {
        self.optimize_as(source, AssetRole::infer(source), force)
    }

    pub fn optimize_as(&self, source: &Path, role: AssetRole, force: bool) -> OptimizationReport {
        let key = lock_key(source);
        match self.flights.run(&key, || self.run(source, role, force)) {
            Flight::Led(report) => report,
            Flight::Joined(mut report) => {
                debug!(source = %source.display(), "joined in-flight run");
                report.coalesced = true;
                report
            }
        }
    }

    fn run(&self, source: &Path, role: AssetRole, force: bool) -> OptimizationReport {
        let started = Instant::now();
        let paths = derived_paths_for_role(source, role);
        let mut run = Run::new(source);

        let source_mtime = match fs::metadata(source) {
            Ok(meta) if meta.is_file() => {
                if meta.len() > self.config.limits.max_input_bytes {
                    let err = CodecError::InputTooLarge(format!(
                        "{} bytes exceeds {} byte limit",
                        meta.len(),
                        self.config.limits.max_input_bytes
                    ));
                    return run.fail_all(&paths, &err.into(), started);
                }
                meta.modified().ok()
            }
            Ok(_) => {
                return run.fail_all(&paths, &AssetError::SourceMissing(source.into()), started);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return run.fail_all(&paths, &AssetError::SourceMissing(source.into()), started);
            }
            Err(e) => return run.fail_all(&paths, &AssetError::fs(source, e), started),
        };

        let stale: Vec<SizeClass> = SizeClass::ALL
            .into_iter()
            .filter(|&size| force || !is_fresh(paths.get(size), source_mtime))
            .collect();

        if stale.is_empty() {
            debug!(source = %source.display(), "all variants fresh");
            let variants = paths
                .iter()
                .map(|(size, path)| VariantOutcome {
                    size,
                    path: path.to_path_buf(),
                    status: VariantStatus::Skipped,
                })
                .collect();
            return run.finish(variants, started);
        }

        run.advance(OptimizationState::Reading);
        let bytes = match fs::read(source) {
            Ok(bytes) => bytes,
            Err(e) => return run.fail_all(&paths, &AssetError::fs(source, e), started),
        };

        run.advance(OptimizationState::Transcoding);
        let decoded = match self.codec.decode(&bytes) {
            Ok(image) => image,
            Err(e) => return run.fail_all(&paths, &e.into(), started),
        };
        drop(bytes);

        run.advance(OptimizationState::Writing);
        let dir_error = fs::create_dir_all(paths.dir())
            .err()
            .map(|e| AssetError::fs(paths.dir(), e));

        let variants = paths
            .iter()
            .map(|(size, path)| {
                let status = if !stale.contains(&size) {
                    VariantStatus::Skipped
                } else if let Some(err) = &dir_error {
                    failed_variant(source, size, err)
                } else {
                    self.produce(size, &decoded, path)
                        .unwrap_or_else(|e| failed_variant(source, size, &e))
                };
                VariantOutcome {
                    size,
                    path: path.to_path_buf(),
                    status,
                }
            })
            .collect();

        run.finish(variants, started)
    }

    /// Resize, encode and write one variant.
    fn produce(
        &self,
        size: SizeClass,
        decoded: &DynamicImage,
        target: &Path,
    ) -> Result<VariantStatus, AssetError> {
        let image = match self.config.bounding_box(size) {
            Some(bbox) => Cow::Owned(resize_to_bounding_box(
                decoded,
                bbox.max_width,
                bbox.max_height,
            )),
            None => Cow::Borrowed(decoded),
        };
        let encoded = self
            .codec
            .encode(&image, TargetFormat::WebP, self.config.webp_quality())?;
        write_atomic(target, &encoded)?;
        trace!(path = %target.display(), bytes = encoded.len(), "variant written");

        Ok(VariantStatus::Written {
            bytes: encoded.len() as u64,
            width: image.width(),
            height: image.height(),
            generated_at: SystemTime::now(),
            sha256: format!("{:x}", Sha256::digest(&encoded)),
        })
    }
}

/// Logging for one run's state transitions.
struct Run<'a> {
    source: &'a Path,
    state: OptimizationState,
}

impl<'a> Run<'a> {
    fn new(source: &'a Path) -> Self {
        trace!(source = %source.display(), state = %OptimizationState::Pending, "optimize");
        Self {
            source,
            state: OptimizationState::Pending,
        }
    }

    fn advance(&mut self, next: OptimizationState) {
        trace!(source = %self.source.display(), from = %self.state, to = %next, "optimize");
        self.state = next;
    }

    fn fail_all(self, paths: &DerivedPaths, err: &AssetError, started: Instant) -> OptimizationReport {
        warn!(source = %self.source.display(), state = %self.state, error = %err, "optimize failed");
        let variants = paths
            .iter()
            .map(|(size, path)| VariantOutcome {
                size,
                path: path.to_path_buf(),
                status: VariantStatus::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                },
            })
            .collect();
        self.finish(variants, started)
    }

    fn finish(self, variants: Vec<VariantOutcome>, started: Instant) -> OptimizationReport {
        let report = OptimizationReport {
            source: self.source.to_path_buf(),
            outcome: outcome_of(&variants),
            variants,
            elapsed: started.elapsed(),
            coalesced: false,
        };
        info!(
            source = %self.source.display(),
            outcome = %report.outcome,
            written = report.written(),
            skipped = report.skipped(),
            failed = report.failed(),
            "optimized"
        );
        report
    }
}

fn failed_variant(source: &Path, size: SizeClass, err: &AssetError) -> VariantStatus {
    warn!(source = %source.display(), size = %size, error = %err, "variant failed");
    VariantStatus::Failed {
        kind: err.kind(),
        message: err.to_string(),
    }
}

fn is_fresh(derived: &Path, source_mtime: Option<SystemTime>) -> bool {
    let Some(source_mtime) = source_mtime else {
        return false;
    };
    fs::metadata(derived)
        .and_then(|m| m.modified())
        .is_ok_and(|derived_mtime| derived_mtime >= source_mtime)
}

/// Write `bytes` to `target` through a temp file in the same directory.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), AssetError> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| AssetError::fs(dir, e))?;
    tmp.write_all(bytes).map_err(|e| AssetError::fs(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| AssetError::fs(tmp.path(), e))?;
    tmp.persist(target).map_err(|e| AssetError::fs(target, e.error))?;
    Ok(())
}
