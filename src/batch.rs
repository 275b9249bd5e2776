//! Operator batch driver: find every source image under the media root and
//! optimize them in parallel.
//!
//! Discovery only looks where the folder convention puts originals:
//!
//! ```text
//! <media_root>/<kind folder>/<entity>/<file>          primary / icon
//! <media_root>/<kind folder>/<entity>/album/<file>    album
//! ```
//!
//! `webp/` trees are never descended into, and only files with a supported
//! image extension are picked up. Results are sorted by path so summaries
//! are stable between runs.
//!
//! Sources are distributed over the global rayon pool. Distinct sources never
//! contend; the same source listed twice would coalesce in the optimizer.

use crate::entity::{AssetRole, EntityKind, EntityRef, SourceAsset};
use crate::imaging::{ImageCodec, supported_input_extensions};
use crate::naming::entity_dir_name;
use crate::optimize::{OptimizationReport, Optimizer};
use crate::paths::{ALBUM_DIR, AssetLayout};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Narrows discovery to one kind and/or one entity directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    pub kind: Option<EntityKind>,
    /// Entity name, matched against the asset directory name.
    pub entity: Option<String>,
}

impl BatchFilter {
    fn kinds(&self) -> Vec<EntityKind> {
        match self.kind {
            Some(kind) => vec![kind],
            None => EntityKind::ALL.to_vec(),
        }
    }

    fn matches_entity(&self, dir_name: &str) -> bool {
        match &self.entity {
            Some(wanted) => entity_dir_name(wanted).as_deref() == Some(dir_name),
            None => true,
        }
    }
}

/// Every source image under `layout`'s media root matching `filter`.
pub fn discover(layout: &AssetLayout, filter: &BatchFilter) -> Vec<SourceAsset> {
    let mut assets = Vec::new();
    for kind in filter.kinds() {
        let kind_root = layout.kind_root(kind);
        if !kind_root.is_dir() {
            debug!(dir = %kind_root.display(), "no asset directories for kind");
            continue;
        }

        let entity_dirs = WalkDir::new(&kind_root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_dir() => Some(entry),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            });

        for entity_dir in entity_dirs {
            let name = entity_dir.file_name().to_string_lossy().into_owned();
            if !filter.matches_entity(&name) {
                continue;
            }
            let entity = EntityRef::new(kind, 0, name);
            discover_entity(entity_dir.path(), &entity, &mut assets);
        }
    }
    assets
}

fn discover_entity(dir: &Path, entity: &EntityRef, out: &mut Vec<SourceAsset>) {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !e.file_type().is_dir() || e.file_name() == ALBUM_DIR);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(entity = %entity, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() || !has_supported_extension(entry.path()) {
            continue;
        }
        let role = if entry.depth() == 2 {
            AssetRole::Album
        } else {
            entity.kind.primary_role()
        };
        out.push(SourceAsset {
            path: entry.path().to_path_buf(),
            entity: entity.clone(),
            role,
        });
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub asset: SourceAsset,
    pub report: OptimizationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub items: Vec<BatchItem>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn sources(&self) -> usize {
        self.items.len()
    }

    pub fn written(&self) -> usize {
        self.items.iter().map(|i| i.report.written()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.items.iter().map(|i| i.report.skipped()).sum()
    }

    pub fn failed(&self) -> usize {
        self.items.iter().map(|i| i.report.failed()).sum()
    }

    /// Sources with at least one failed variant.
    pub fn failed_sources(&self) -> impl Iterator<Item = &BatchItem> {
        self.items.iter().filter(|i| !i.report.is_success())
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources = self.sources();
        write!(
            f,
            "{} source{}: {} written, {} skipped, {} failed",
            sources,
            if sources == 1 { "" } else { "s" },
            self.written(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Optimize `assets` in parallel, preserving their order in the summary.
pub fn run_batch<C: ImageCodec>(
    optimizer: &Optimizer<C>,
    assets: Vec<SourceAsset>,
    force: bool,
) -> BatchSummary {
    let started = Instant::now();
    info!(sources = assets.len(), force, "batch started");
    let items: Vec<BatchItem> = assets
        .into_par_iter()
        .map(|asset| {
            let report = optimizer.optimize_as(&asset.path, asset.role, force);
            BatchItem { asset, report }
        })
        .collect();

    let summary = BatchSummary {
        items,
        elapsed: started.elapsed(),
    };
    info!(
        sources = summary.sources(),
        written = summary.written(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "batch finished"
    );
    summary
}

/// Discover then optimize everything under the optimizer's media root.
pub fn optimize_all<C: ImageCodec>(
    optimizer: &Optimizer<C>,
    filter: &BatchFilter,
    force: bool,
) -> BatchSummary {
    let layout = AssetLayout::new(optimizer.config().storage.media_root.clone());
    let assets = discover(&layout, filter);
    run_batch(optimizer, assets, force)
}
