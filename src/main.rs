use clap::{Parser, Subcommand};
use derivo::batch::{self, BatchFilter};
use derivo::cleanup::{Cleanup, PurgeScope};
use derivo::config::{self, PipelineConfig};
use derivo::entity::{EntityKind, EntityRef};
use derivo::imaging::{
    ImageCodec, Quality, RustCodec, SizeClass, TargetFormat, preserving_target, sniff_format,
};
use derivo::lifecycle::{AssetLifecycle, LifecycleHooks};
use derivo::optimize::Optimizer;
use derivo::output;
use derivo::resolve::{PreferredFormat, Resolver};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Shared flag for commands that can print machine-readable results.
#[derive(clap::Args, Clone)]
struct JsonArgs {
    /// Print the result as JSON instead of a tree
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
#[command(name = "derivo")]
#[command(about = "Derived WebP renditions for catalog media")]
#[command(long_about = "\
Derived WebP renditions for catalog media

Every source image gets a canonical WebP plus three resized thumbnails,
written next to it under webp/:

  media/
  ├── projects/
  │   └── Villa Project/
  │       ├── facade.jpg               # Primary image (never modified)
  │       ├── album/
  │       │   └── pool.jpg             # Album image
  │       └── webp/
  │           ├── facade.webp          # Canonical, original resolution
  │           ├── facade_small.webp    # ≤ 300×300
  │           ├── facade_medium.webp   # ≤ 600×600
  │           ├── facade_large.webp    # ≤ 1200×1200
  │           └── album/
  │               └── pool*.webp
  └── services/
      └── Lighting/
          └── icon.png                 # Service icon

Variants newer than their source are skipped unless --force is given.

Run 'derivo gen-config' to generate a documented derivo.toml.")]
#[command(version)]
struct Cli {
    /// Config file (optional; stock defaults apply when absent)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Override storage.media_root
    #[arg(long, global = true)]
    media_root: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize every source image under the media root
    Optimize {
        /// Regenerate variants even when they are fresh
        #[arg(long)]
        force: bool,
        /// Only this entity kind (project, service)
        #[arg(long)]
        kind: Option<EntityKind>,
        /// Only this entity, by name
        #[arg(long)]
        entity: Option<String>,
        #[command(flatten)]
        out: JsonArgs,
    },
    /// Optimize a single source image
    File {
        source: PathBuf,
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        out: JsonArgs,
    },
    /// Show which file would be served for a source image
    Resolve {
        source: PathBuf,
        /// small, medium, large, canonical
        #[arg(long, default_value = "medium")]
        size: SizeClass,
        /// webp or original
        #[arg(long, default_value = "webp")]
        format: PreferredFormat,
        #[command(flatten)]
        out: JsonArgs,
    },
    /// Remove derived files for one source, or a whole asset directory
    Purge {
        #[arg(required_unless_present = "dir")]
        source: Option<PathBuf>,
        /// Remove this asset directory and everything in it
        #[arg(long, conflicts_with = "source")]
        dir: Option<PathBuf>,
        #[command(flatten)]
        out: JsonArgs,
    },
    /// Move an asset directory after an entity rename
    Rename { old: PathBuf, new: PathBuf },
    /// Re-encode one image; the target format follows the output extension
    Transcode {
        input: PathBuf,
        output: PathBuf,
        /// 1-100; defaults to quality.preserve for same-format output,
        /// quality.webp otherwise
        #[arg(long)]
        quality: Option<u32>,
    },
    /// Print a stock derivo.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut config = config::load_config(&cli.config)?;
    if let Some(root) = cli.media_root {
        config.storage.media_root = root;
    }
    let media_root = config.storage.media_root.clone();

    match cli.command {
        Command::Optimize {
            force,
            kind,
            entity,
            out,
        } => {
            init_thread_pool(&config.processing);
            let optimizer = Optimizer::new(config);
            let summary = batch::optimize_all(&optimizer, &BatchFilter { kind, entity }, force);
            emit(out.json, &summary, || {
                output::print_batch_summary(&summary, &media_root)
            })?;
            if summary.failed() > 0 {
                return Err(format!("{} variant(s) failed", summary.failed()).into());
            }
        }
        Command::File { source, force, out } => {
            let report = Optimizer::new(config).optimize(&source, force);
            emit(out.json, &report, || output::print_report(&report, &media_root))?;
            if !report.is_success() {
                return Err(format!("{}: {}", source.display(), report.outcome).into());
            }
        }
        Command::Resolve {
            source,
            size,
            format,
            out,
        } => {
            let resolver = Resolver::new(&config);
            let resolved = resolver.resolve(&source, size, format);
            let url = resolver.url(&resolved);
            #[derive(Serialize)]
            struct ResolveOutput<'a> {
                #[serde(flatten)]
                resolved: &'a derivo::resolve::Resolved,
                url: &'a str,
            }
            let payload = ResolveOutput {
                resolved: &resolved,
                url: &url,
            };
            emit(out.json, &payload, || {
                output::print_resolved(&resolved, &url, &media_root)
            })?;
        }
        Command::Purge { source, dir, out } => {
            let scope = match (source, dir) {
                (_, Some(dir)) => PurgeScope::Directory(dir),
                (Some(source), None) => PurgeScope::Asset(source),
                (None, None) => return Err("nothing to purge".into()),
            };
            let report = Cleanup::new().purge(scope);
            emit(out.json, &report, || {
                output::print_purge_report(&report, &media_root)
            })?;
            if !report.is_clean() {
                return Err(format!("{} entr(ies) could not be removed", report.errors.len()).into());
            }
        }
        Command::Rename { old, new } => {
            let hooks = LifecycleHooks::new(config);
            let outcome = hooks.on_entity_renamed(&entity_for_dir(&old), &old, &new);
            output::print_hook_outcome(&outcome, &media_root);
            if outcome.is_failure() {
                return Err("rename failed".into());
            }
        }
        Command::Transcode {
            input,
            output: target,
            quality,
        } => {
            transcode_file(&config, &input, &target, quality)?;
            println!("{} \u{2192} {}", input.display(), target.display());
        }
        // Printed before config loading.
        Command::GenConfig => {}
    }

    Ok(())
}

/// Print `value` as JSON, or run the tree printer.
fn emit<T: Serialize>(
    json: bool,
    value: &T,
    print_tree: impl FnOnce(),
) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print_tree();
    }
    Ok(())
}

fn transcode_file(
    config: &PipelineConfig,
    input: &Path,
    target: &Path,
    quality: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = target
        .extension()
        .and_then(|e| e.to_str())
        .and_then(TargetFormat::from_extension)
        .ok_or_else(|| format!("cannot infer output format from {}", target.display()))?;

    let bytes = std::fs::read(input)?;
    let quality = match quality {
        Some(q) => Quality::new(q),
        None if preserving_target(sniff_format(&bytes)?) == Some(format) => {
            config.preserve_quality()
        }
        None => config.webp_quality(),
    };

    let encoded = RustCodec::new(config.decode_limits()).transcode(&bytes, format, quality)?;
    std::fs::write(target, encoded)?;
    Ok(())
}

/// Entity for a bare directory path: kind from the parent folder name.
fn entity_for_dir(dir: &Path) -> EntityRef {
    let kind = dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse().ok())
        .unwrap_or(EntityKind::Project);
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    EntityRef::new(kind, 0, name)
}

/// Logs go to stderr so tree and JSON output on stdout stay clean.
///
/// `RUST_LOG` wins over `-v` when set.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("derivo={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: the user can constrain down,
/// not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
