//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output leads with the entity, not the file. Each asset directory is a
//! header line, its sources are numbered beneath it, and per-variant status
//! follows as indented context. Paths are shown relative to the media root.
//!
//! # Output Format
//!
//! ## Optimize
//!
//! ```text
//! project Villa Project (3 images)
//!     001 facade.jpg
//!         canonical: written 2000×1500, 412.0 KB
//!         small: written 300×225, 14.2 KB
//!         medium: skipped
//!         large: failed (encode failed: out of memory)
//!     002 album/pool.jpg
//!         ...
//!
//! 3 sources: 10 written, 1 skipped, 1 failed
//! ```
//!
//! ## Resolve
//!
//! ```text
//! derived (medium) → projects/Villa Project/webp/facade_medium.webp
//!     URL: /media/projects/Villa%20Project/webp/facade_medium.webp
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::BatchSummary;
use crate::cleanup::PurgeReport;
use crate::entity::EntityRef;
use crate::lifecycle::HookOutcome;
use crate::optimize::{OptimizationReport, VariantOutcome, VariantStatus};
use crate::resolve::Resolved;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count.
fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

/// `path` relative to `root` when it lies below it, else as given.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Entity header with image count.
///
/// ```text
/// project Villa Project (3 images)
/// service Lighting (1 image)
/// ```
fn entity_header(entity: &EntityRef, count: usize) -> String {
    let noun = if count == 1 { "image" } else { "images" };
    format!("{} {} ({} {})", entity.kind, entity.name, count, noun)
}

fn variant_line(variant: &VariantOutcome) -> String {
    let status = match &variant.status {
        VariantStatus::Written {
            bytes,
            width,
            height,
            ..
        } => format!("written {}×{}, {}", width, height, format_bytes(*bytes)),
        VariantStatus::Skipped => "skipped".to_string(),
        VariantStatus::Failed { message, .. } => format!("failed ({})", message),
    };
    format!("{}: {}", variant.size, status)
}

// ============================================================================
// Optimize output
// ============================================================================

/// Format one optimization report: the source line plus one line per variant.
pub fn format_report(report: &OptimizationReport, root: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({})",
        display_path(&report.source, root),
        report.outcome
    )];
    if report.coalesced {
        lines.push(format!("{}joined an in-flight run", indent(1)));
    }
    for variant in &report.variants {
        lines.push(format!("{}{}", indent(1), variant_line(variant)));
    }
    lines
}

pub fn print_report(report: &OptimizationReport, root: &Path) {
    for line in format_report(report, root) {
        println!("{}", line);
    }
}

/// Format a batch run grouped by entity, followed by a totals line.
///
/// Items sharing an entity are expected to be adjacent, which discovery
/// guarantees.
pub fn format_batch_summary(summary: &BatchSummary, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < summary.items.len() {
        let entity = &summary.items[i].asset.entity;
        let group: Vec<_> = summary.items[i..]
            .iter()
            .take_while(|item| &item.asset.entity == entity)
            .collect();

        lines.push(entity_header(entity, group.len()));
        let entity_dir = summary.items[i]
            .asset
            .path
            .ancestors()
            .find(|a| a.file_name().is_some_and(|n| n.to_string_lossy() == entity.name))
            .unwrap_or(root);

        for (pos, item) in group.iter().enumerate() {
            lines.push(format!(
                "{}{} {}",
                indent(1),
                format_index(pos + 1),
                display_path(&item.asset.path, entity_dir)
            ));
            for variant in &item.report.variants {
                lines.push(format!("{}{}", indent(2), variant_line(variant)));
            }
        }
        i += group.len();
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(summary.to_string());
    lines
}

pub fn print_batch_summary(summary: &BatchSummary, root: &Path) {
    for line in format_batch_summary(summary, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve output
// ============================================================================

pub fn format_resolved(resolved: &Resolved, url: &str, root: &Path) -> Vec<String> {
    vec![
        format!(
            "{} \u{2192} {}",
            resolved.from,
            display_path(&resolved.path, root)
        ),
        format!("{}URL: {}", indent(1), url),
    ]
}

pub fn print_resolved(resolved: &Resolved, url: &str, root: &Path) {
    for line in format_resolved(resolved, url, root) {
        println!("{}", line);
    }
}

// ============================================================================
// Purge and rename output
// ============================================================================

pub fn format_purge_report(report: &PurgeReport, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let n = report.removed.len();
    lines.push(format!(
        "Removed {} entr{}",
        n,
        if n == 1 { "y" } else { "ies" }
    ));
    for path in &report.removed {
        lines.push(format!("{}{}", indent(1), display_path(path, root)));
    }
    for err in &report.errors {
        lines.push(format!(
            "{}failed: {} ({})",
            indent(1),
            display_path(&err.path, root),
            err.message
        ));
    }
    lines
}

pub fn print_purge_report(report: &PurgeReport, root: &Path) {
    for line in format_purge_report(report, root) {
        println!("{}", line);
    }
}

pub fn format_hook_outcome(outcome: &HookOutcome, root: &Path) -> Vec<String> {
    match outcome {
        HookOutcome::Optimized(report) => format_report(report, root),
        HookOutcome::Replaced { purged, optimized } => {
            let mut lines = purged
                .as_ref()
                .map(|p| format_purge_report(p, root))
                .unwrap_or_default();
            lines.extend(format_report(optimized, root));
            lines
        }
        HookOutcome::Purged(report) => format_purge_report(report, root),
        HookOutcome::Moved { from, to } => vec![format!(
            "Moved {} \u{2192} {}",
            display_path(from, root),
            display_path(to, root)
        )],
        HookOutcome::AlreadyMoved { to } => {
            vec![format!("Already at {}", display_path(to, root))]
        }
        HookOutcome::Skipped { reason } => vec![format!("Nothing to do: {}", reason)],
        HookOutcome::Failed { reason } => vec![format!("Failed: {}", reason)],
    }
}

pub fn print_hook_outcome(outcome: &HookOutcome, root: &Path) {
    for line in format_hook_outcome(outcome, root) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchItem;
    use crate::cleanup::{PurgeFailure, PurgeScope};
    use crate::entity::{AssetRole, EntityKind, SourceAsset};
    use crate::error::FailureKind;
    use crate::imaging::SizeClass;
    use crate::optimize::OptimizationState;
    use crate::resolve::ResolvedFrom;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn written(size: SizeClass, path: &str, w: u32, h: u32, bytes: u64) -> VariantOutcome {
        VariantOutcome {
            size,
            path: PathBuf::from(path),
            status: VariantStatus::Written {
                bytes,
                width: w,
                height: h,
                generated_at: SystemTime::UNIX_EPOCH,
                sha256: String::new(),
            },
        }
    }

    fn report(source: &str, variants: Vec<VariantOutcome>) -> OptimizationReport {
        let outcome = if variants.iter().any(|v| v.is_failed()) {
            OptimizationState::PartiallyFailed
        } else {
            OptimizationState::Done
        };
        OptimizationReport {
            source: PathBuf::from(source),
            outcome,
            variants,
            elapsed: Duration::from_millis(5),
            coalesced: false,
        }
    }

    fn villa_facade() -> OptimizationReport {
        report(
            "/m/projects/Villa Project/facade.jpg",
            vec![
                written(SizeClass::Canonical, "/m/projects/Villa Project/webp/facade.webp", 2000, 1500, 421_888),
                written(SizeClass::Small, "/m/projects/Villa Project/webp/facade_small.webp", 300, 225, 14_540),
                VariantOutcome {
                    size: SizeClass::Medium,
                    path: PathBuf::from("/m/projects/Villa Project/webp/facade_medium.webp"),
                    status: VariantStatus::Skipped,
                },
                VariantOutcome {
                    size: SizeClass::Large,
                    path: PathBuf::from("/m/projects/Villa Project/webp/facade_large.webp"),
                    status: VariantStatus::Failed {
                        kind: FailureKind::EncodeFailure,
                        message: "encode failed: injected".into(),
                    },
                },
            ],
        )
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(14_540), "14.2 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn display_path_strips_root() {
        assert_eq!(
            display_path(Path::new("/m/projects/X/a.jpg"), Path::new("/m")),
            "projects/X/a.jpg"
        );
        assert_eq!(display_path(Path::new("static/p.png"), Path::new("/m")), "static/p.png");
    }

    #[test]
    fn entity_header_pluralizes() {
        let e = EntityRef::new(EntityKind::Service, 0, "Lighting");
        assert_eq!(entity_header(&e, 1), "service Lighting (1 image)");
        assert_eq!(entity_header(&e, 2), "service Lighting (2 images)");
    }

    // =========================================================================
    // Optimize output tests
    // =========================================================================

    #[test]
    fn format_single_report() {
        let lines = format_report(&villa_facade(), Path::new("/m"));
        assert_eq!(
            lines,
            vec![
                "projects/Villa Project/facade.jpg (partially failed)",
                "    canonical: written 2000×1500, 412.0 KB",
                "    small: written 300×225, 14.2 KB",
                "    medium: skipped",
                "    large: failed (encode failed: injected)",
            ]
        );
    }

    #[test]
    fn format_coalesced_report_says_so() {
        let mut r = villa_facade();
        r.coalesced = true;
        let lines = format_report(&r, Path::new("/m"));
        assert_eq!(lines[1], "    joined an in-flight run");
    }

    #[test]
    fn format_batch_groups_by_entity() {
        let villa = EntityRef::new(EntityKind::Project, 0, "Villa Project");
        let lighting = EntityRef::new(EntityKind::Service, 0, "Lighting");
        let item = |entity: &EntityRef, path: &str, role, r: OptimizationReport| BatchItem {
            asset: SourceAsset {
                path: PathBuf::from(path),
                entity: entity.clone(),
                role,
            },
            report: r,
        };
        let summary = BatchSummary {
            items: vec![
                item(&villa, "/m/projects/Villa Project/album/pool.jpg", AssetRole::Album,
                    report("/m/projects/Villa Project/album/pool.jpg", vec![])),
                item(&villa, "/m/projects/Villa Project/facade.jpg", AssetRole::Primary, villa_facade()),
                item(&lighting, "/m/services/Lighting/icon.png", AssetRole::Icon,
                    report("/m/services/Lighting/icon.png", vec![])),
            ],
            elapsed: Duration::from_secs(1),
        };

        let lines = format_batch_summary(&summary, Path::new("/m"));

        assert_eq!(lines[0], "project Villa Project (2 images)");
        assert_eq!(lines[1], "    001 album/pool.jpg");
        assert_eq!(lines[2], "    002 facade.jpg");
        assert_eq!(lines[3], "        canonical: written 2000×1500, 412.0 KB");
        assert_eq!(lines[7], "service Lighting (1 image)");
        assert_eq!(lines[8], "    001 icon.png");
        assert_eq!(lines[9], "");
        assert_eq!(lines[10], "3 sources: 2 written, 1 skipped, 1 failed");
    }

    #[test]
    fn format_empty_batch_is_totals_only() {
        let summary = BatchSummary {
            items: vec![],
            elapsed: Duration::ZERO,
        };
        assert_eq!(
            format_batch_summary(&summary, Path::new("/m")),
            vec!["0 sources: 0 written, 0 skipped, 0 failed"]
        );
    }

    // =========================================================================
    // Resolve / purge / hook output tests
    // =========================================================================

    #[test]
    fn format_resolved_lines() {
        let resolved = Resolved {
            path: PathBuf::from("/m/projects/Villa Project/webp/facade_medium.webp"),
            from: ResolvedFrom::Derived(SizeClass::Medium),
        };
        let lines = format_resolved(&resolved, "/media/x", Path::new("/m"));
        assert_eq!(
            lines,
            vec![
                "derived (medium) \u{2192} projects/Villa Project/webp/facade_medium.webp",
                "    URL: /media/x",
            ]
        );
    }

    #[test]
    fn format_purge_with_errors() {
        let report = PurgeReport {
            scope: PurgeScope::Directory(PathBuf::from("/m/projects/X")),
            removed: vec![PathBuf::from("/m/projects/X/a.jpg")],
            errors: vec![PurgeFailure {
                path: PathBuf::from("/m/projects/X/locked"),
                message: "permission denied".into(),
            }],
        };
        let lines = format_purge_report(&report, Path::new("/m"));
        assert_eq!(
            lines,
            vec![
                "Removed 1 entry",
                "    projects/X/a.jpg",
                "    failed: projects/X/locked (permission denied)",
            ]
        );
    }

    #[test]
    fn format_moved_outcome() {
        let outcome = HookOutcome::Moved {
            from: PathBuf::from("/m/projects/Villa Project"),
            to: PathBuf::from("/m/projects/Villa Estate"),
        };
        assert_eq!(
            format_hook_outcome(&outcome, Path::new("/m")),
            vec!["Moved projects/Villa Project \u{2192} projects/Villa Estate"]
        );
    }

    #[test]
    fn format_failed_outcome() {
        let outcome = HookOutcome::Failed {
            reason: "destination already exists".into(),
        };
        assert_eq!(
            format_hook_outcome(&outcome, Path::new("/m")),
            vec!["Failed: destination already exists"]
        );
    }
}
