//! Read path: pick the best existing file for a source image.
//!
//! The resolver only probes the filesystem. It never generates anything and
//! never fails: when neither a derived variant nor the original exists, it
//! hands back the configured placeholder.
//!
//! ## Fallback order
//!
//! For a WebP request of size `S`:
//!
//! 1. `S` itself
//! 2. smaller sizes, largest first
//! 3. larger sizes, smallest first (canonical is the largest)
//! 4. the original source
//! 5. the placeholder
//!
//! ```text
//! medium → medium, small, large, canonical, original, placeholder
//! ```
//!
//! An `Original` request skips straight to step 4.

use crate::config::PipelineConfig;
use crate::entity::AssetRole;
use crate::imaging::SizeClass;
use crate::paths::derived_paths_for_role;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::trace;

/// Characters left unescaped in URL paths.
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Smallest to largest.
const LADDER: [SizeClass; 4] = [
    SizeClass::Small,
    SizeClass::Medium,
    SizeClass::Large,
    SizeClass::Canonical,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredFormat {
    #[default]
    WebP,
    Original,
}

impl FromStr for PreferredFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "webp" => Ok(PreferredFormat::WebP),
            "original" => Ok(PreferredFormat::Original),
            other => Err(format!("unknown format preference: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "size", rename_all = "lowercase")]
pub enum ResolvedFrom {
    Derived(SizeClass),
    Original,
    Placeholder,
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFrom::Derived(size) => write!(f, "derived ({size})"),
            ResolvedFrom::Original => f.write_str("original"),
            ResolvedFrom::Placeholder => f.write_str("placeholder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub path: PathBuf,
    pub from: ResolvedFrom,
}

/// Sizes to try for `requested`, in order.
pub fn fallback_order(requested: SizeClass) -> Vec<SizeClass> {
    let ix = LADDER.iter().position(|&s| s == requested).unwrap_or(0);
    std::iter::once(requested)
        .chain(LADDER[..ix].iter().rev().copied())
        .chain(LADDER[ix + 1..].iter().copied())
        .collect()
}

#[derive(Debug, Clone)]
pub struct Resolver {
    media_root: PathBuf,
    media_url: String,
    placeholder: PathBuf,
}

impl Resolver {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            media_root: config.storage.media_root.clone(),
            media_url: config.storage.media_url.clone(),
            placeholder: config.storage.placeholder.clone(),
        }
    }

    /// Best existing file for `source` at `size`.
    pub fn resolve(&self, source: &Path, size: SizeClass, format: PreferredFormat) -> Resolved {
        self.resolve_as(source, AssetRole::infer(source), size, format)
    }

    pub fn resolve_as(
        &self,
        source: &Path,
        role: AssetRole,
        size: SizeClass,
        format: PreferredFormat,
    ) -> Resolved {
        if format == PreferredFormat::WebP {
            let paths = derived_paths_for_role(source, role);
            for candidate in fallback_order(size) {
                let path = paths.get(candidate);
                if path.is_file() {
                    trace!(source = %source.display(), requested = %size, served = %candidate, "resolved");
                    return Resolved {
                        path: path.to_path_buf(),
                        from: ResolvedFrom::Derived(candidate),
                    };
                }
            }
        }

        if source.is_file() {
            return Resolved {
                path: source.to_path_buf(),
                from: ResolvedFrom::Original,
            };
        }

        trace!(source = %source.display(), "falling back to placeholder");
        Resolved {
            path: self.placeholder.clone(),
            from: ResolvedFrom::Placeholder,
        }
    }

    /// Public URL for a resolved path.
    ///
    /// Paths under the media root map onto `media_url`. Anything else (the
    /// placeholder, typically) is served from the site root.
    pub fn url(&self, resolved: &Resolved) -> String {
        match resolved.path.strip_prefix(&self.media_root) {
            Ok(rel) => {
                let base = self.media_url.trim_end_matches('/');
                format!("{base}/{}", encode_path(rel))
            }
            Err(_) => format!("/{}", encode_path(&resolved.path)),
        }
    }

    /// Resolve then map to a URL.
    pub fn resolve_url(&self, source: &Path, size: SizeClass, format: PreferredFormat) -> String {
        self.url(&self.resolve(source, size, format))
    }
}

/// Percent-encode each normal component and join with `/`.
fn encode_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .map(|part| utf8_percent_encode(&part, PATH_SET).to_string())
        .collect::<Vec<_>>()
        .join("/")
}
