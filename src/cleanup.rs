//! Removal of derived assets.
//!
//! Two scopes:
//!
//! | Scope | Removes |
//! |---|---|
//! | [`PurgeScope::Asset`] | the 0–4 derived files of one source, then `webp/album/` and `webp/` if left empty |
//! | [`PurgeScope::Directory`] | a whole asset directory: `webp/` first, then everything else, the root last |
//!
//! Paths that are already gone count as done. A failure on one entry is
//! recorded in the [`PurgeReport`] and the walk moves on, so a retry only
//! has the leftovers to deal with. The one exception is a directory purge
//! whose `webp/` tree could not be removed completely: the originals stay
//! in place until a later attempt gets rid of every derived file.

use crate::entity::AssetRole;
use crate::flight::{FlightTable, lock_key};
use crate::imaging::ImageCodec;
use crate::optimize::{OptimizationReport, Optimizer};
use crate::paths::{WEBP_DIR, derived_paths_for_role};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "path", rename_all = "snake_case")]
pub enum PurgeScope {
    /// The derived set of one source image. The role is inferred from the
    /// source's location.
    Asset(PathBuf),
    /// An entire asset directory, originals included.
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub scope: PurgeScope,
    /// Files and directories actually removed by this call.
    pub removed: Vec<PathBuf>,
    pub errors: Vec<PurgeFailure>,
}

impl PurgeReport {
    fn new(scope: PurgeScope) -> Self {
        Self {
            scope,
            removed: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record_error(&mut self, path: &Path, err: &io::Error) {
        warn!(path = %path.display(), error = %err, "purge failed");
        self.errors.push(PurgeFailure {
            path: path.to_path_buf(),
            message: err.to_string(),
        });
    }
}

/// Deletes derived sets and asset directories.
#[derive(Debug, Clone, Default)]
pub struct Cleanup {
    flights: Arc<FlightTable<OptimizationReport>>,
}

impl Cleanup {
    /// A cleanup with its own lock table. Use [`Cleanup::sharing`] when an
    /// optimizer runs in the same process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize single-asset purges against `optimizer`'s runs.
    pub fn sharing<C: ImageCodec>(optimizer: &Optimizer<C>) -> Self {
        Self {
            flights: optimizer.flights(),
        }
    }

    pub fn purge(&self, scope: PurgeScope) -> PurgeReport {
        match scope {
            PurgeScope::Asset(source) => {
                let role = AssetRole::infer(&source);
                self.purge_asset_as(&source, role)
            }
            PurgeScope::Directory(dir) => self.purge_directory(&dir),
        }
    }

    /// Remove the derived set of `source`, treating it as `role`.
    ///
    /// Waits for an in-flight optimization of the same source to finish.
    pub fn purge_asset_as(&self, source: &Path, role: AssetRole) -> PurgeReport {
        let key = lock_key(source);
        self.flights.exclusive(&key, || {
            let mut report = PurgeReport::new(PurgeScope::Asset(source.to_path_buf()));
            let paths = derived_paths_for_role(source, role);

            for (_, path) in paths.iter() {
                match fs::remove_file(path) {
                    Ok(()) => report.removed.push(path.to_path_buf()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => report.record_error(path, &e),
                }
            }

            let dir = paths.dir();
            remove_if_empty(dir, &mut report);
            if role == AssetRole::Album
                && let Some(webp) = dir.parent()
            {
                remove_if_empty(webp, &mut report);
            }

            info!(
                source = %source.display(),
                removed = report.removed.len(),
                errors = report.errors.len(),
                "purged derived set"
            );
            report
        })
    }

    /// Remove an asset directory and everything in it.
    pub fn purge_directory(&self, dir: &Path) -> PurgeReport {
        self.purge_directory_with(dir, remove_entry)
    }

    fn purge_directory_with(&self, dir: &Path, remove: Remover) -> PurgeReport {
        let mut report = PurgeReport::new(PurgeScope::Directory(dir.to_path_buf()));
        if dir.parent().is_none() || dir.as_os_str().is_empty() {
            report.record_error(
                dir,
                &io::Error::new(io::ErrorKind::InvalidInput, "refusing to purge a root"),
            );
            return report;
        }

        let key = lock_key(dir);
        self.flights.exclusive(&key, || {
            if fs::symlink_metadata(dir).is_err() {
                debug!(dir = %dir.display(), "asset directory already gone");
                return;
            }
            let webp = dir.join(WEBP_DIR);
            remove_tree(&webp, &mut report, remove);
            if !report.is_clean() || fs::symlink_metadata(&webp).is_ok() {
                warn!(dir = %dir.display(), "derived tree not fully removed, keeping originals");
                return;
            }
            remove_tree(dir, &mut report, remove);
        });

        info!(
            dir = %dir.display(),
            removed = report.removed.len(),
            errors = report.errors.len(),
            "purged asset directory"
        );
        report
    }
}

/// Deletes one walked entry. `true` marks a directory.
type Remover = fn(&Path, bool) -> io::Result<()>;

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Depth-first delete of `root`, `root` itself last.
fn remove_tree(root: &Path, report: &mut PurgeReport, remove: Remover) {
    for entry in WalkDir::new(root).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                match e.into_io_error() {
                    Some(io) if io.kind() == io::ErrorKind::NotFound => {}
                    Some(io) => report.record_error(&path, &io),
                    None => report.record_error(&path, &io::Error::other("filesystem loop")),
                }
                continue;
            }
        };
        let path = entry.path();
        match remove(path, entry.file_type().is_dir()) {
            Ok(()) => report.removed.push(path.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => report.record_error(path, &e),
        }
    }
}

fn remove_if_empty(dir: &Path, report: &mut PurgeReport) {
    let empty = match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => false,
    };
    if !empty {
        return;
    }
    match fs::remove_dir(dir) {
        Ok(()) => report.removed.push(dir.to_path_buf()),
        // Raced with a writer recreating the directory.
        Err(e) => debug!(dir = %dir.display(), error = %e, "left derived directory in place"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::test_helpers::{list_files, media_fixture, write_jpeg};
    use tempfile::TempDir;

    fn optimizer() -> Optimizer {
        Optimizer::new(PipelineConfig::default())
    }

    #[test]
    fn asset_purge_removes_all_four_and_empty_webp() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("projects/X/facade.jpg");
        write_jpeg(&source, 400, 300);
        let opt = optimizer();
        opt.optimize(&source, false);

        let report = Cleanup::sharing(&opt).purge(PurgeScope::Asset(source.clone()));

        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 5); // four files + webp/
        assert_eq!(list_files(tmp.path()), vec!["projects/X/facade.jpg"]);
        assert!(!tmp.path().join("projects/X/webp").exists());
    }

    #[test]
    fn asset_purge_leaves_sibling_assets() {
        let media = media_fixture();
        let villa = media.path().join("projects/Villa Project");
        let opt = optimizer();
        opt.optimize(&villa.join("facade.jpg"), false);
        opt.optimize(&villa.join("album/pool.jpg"), false);
        opt.optimize(&villa.join("album/hall.png"), false);

        Cleanup::sharing(&opt).purge(PurgeScope::Asset(villa.join("album/pool.jpg")));

        let files = list_files(&villa);
        assert!(files.iter().all(|f| !f.starts_with("webp/album/pool")));
        assert!(files.contains(&"webp/album/hall.webp".to_string()));
        assert!(files.contains(&"webp/facade_small.webp".to_string()));
        assert!(files.contains(&"album/pool.jpg".to_string()));
    }

    #[test]
    fn album_purge_prunes_both_levels_when_empty() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("projects/X/album/pool.jpg");
        write_jpeg(&source, 200, 200);
        let opt = optimizer();
        opt.optimize(&source, false);

        let report = Cleanup::sharing(&opt).purge(PurgeScope::Asset(source));

        assert!(report.is_clean());
        assert!(!tmp.path().join("projects/X/webp").exists());
        assert!(tmp.path().join("projects/X/album/pool.jpg").exists());
    }

    #[test]
    fn asset_purge_with_nothing_derived_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let report = Cleanup::new().purge(PurgeScope::Asset(tmp.path().join("never.jpg")));
        assert!(report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[test]
    fn asset_purge_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("projects/X/facade.jpg");
        write_jpeg(&source, 100, 100);
        let opt = optimizer();
        opt.optimize(&source, false);
        let cleanup = Cleanup::sharing(&opt);

        cleanup.purge(PurgeScope::Asset(source.clone()));
        let again = cleanup.purge(PurgeScope::Asset(source));
        assert!(again.is_clean());
        assert!(again.removed.is_empty());
    }

    #[test]
    fn directory_purge_removes_everything() {
        let media = media_fixture();
        let villa = media.path().join("projects/Villa Project");
        let opt = optimizer();
        opt.optimize(&villa.join("facade.jpg"), false);
        opt.optimize(&villa.join("album/pool.jpg"), false);

        let report = Cleanup::sharing(&opt).purge(PurgeScope::Directory(villa.clone()));

        assert!(report.is_clean());
        assert!(!villa.exists());
        assert_eq!(report.removed.last(), Some(&villa));
        // The rest of the media root is untouched.
        assert_eq!(list_files(media.path()), vec!["services/Lighting/icon.png"]);
    }

    #[test]
    fn directory_purge_removes_derived_tree_first() {
        let media = media_fixture();
        let villa = media.path().join("projects/Villa Project");
        optimizer().optimize(&villa.join("facade.jpg"), false);

        let report = Cleanup::new().purge_directory(&villa);

        let first_original = report
            .removed
            .iter()
            .position(|p| p.ends_with("facade.jpg"))
            .unwrap();
        let last_derived = report
            .removed
            .iter()
            .rposition(|p| p.components().any(|c| c.as_os_str() == WEBP_DIR))
            .unwrap();
        assert!(last_derived < first_original);
    }

    #[test]
    fn directory_purge_keeps_originals_when_derived_file_survives() {
        let media = media_fixture();
        let villa = media.path().join("projects/Villa Project");
        let opt = optimizer();
        opt.optimize(&villa.join("facade.jpg"), false);

        fn stuck(path: &Path, is_dir: bool) -> io::Result<()> {
            if path.ends_with("webp/facade_medium.webp") {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
            } else {
                remove_entry(path, is_dir)
            }
        }
        let report = Cleanup::sharing(&opt).purge_directory_with(&villa, stuck);

        // The medium file, then webp/ itself, each reported once.
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].path.ends_with("facade_medium.webp"));
        assert!(villa.join("webp/facade_medium.webp").is_file());
        assert!(!villa.join("webp/facade_small.webp").exists());
        assert!(villa.join("facade.jpg").is_file());
        assert!(villa.join("album/pool.jpg").is_file());
        assert!(report.removed.iter().all(|p| p.starts_with(villa.join(WEBP_DIR))));

        // A retry once the file can go finishes the job.
        let retry = Cleanup::sharing(&opt).purge_directory(&villa);
        assert!(retry.is_clean());
        assert!(!villa.exists());
    }

    #[test]
    fn directory_purge_of_missing_dir_is_satisfied() {
        let tmp = TempDir::new().unwrap();
        let report = Cleanup::new().purge_directory(&tmp.path().join("projects/Gone"));
        assert!(report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[test]
    fn directory_purge_refuses_filesystem_root() {
        let report = Cleanup::new().purge_directory(Path::new("/"));
        assert!(!report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[test]
    fn purge_scope_serializes_tagged() {
        let json = serde_json::to_value(PurgeScope::Directory("/m/projects/X".into())).unwrap();
        assert_eq!(json["scope"], "directory");
        assert_eq!(json["path"], "/m/projects/X");
    }
}
