//! Folder convention for derived assets.
//!
//! Every function here is a pure function of path strings: no filesystem
//! access. The same paths are used as write targets by the
//! [`optimize`](crate::optimize) stage and as existence probes by the
//! [`resolve`](crate::resolve) stage, so the two can never disagree.
//!
//! ## Layout
//!
//! ```text
//! <media_root>/<kind folder>/<entity name>/
//! ├── facade.jpg                  # primary original, untouched
//! ├── album/
//! │   └── pool.jpg                # album originals, untouched
//! └── webp/
//!     ├── facade.webp             # canonical
//!     ├── facade_small.webp
//!     ├── facade_medium.webp
//!     ├── facade_large.webp
//!     └── album/
//!         ├── pool.webp
//!         ├── pool_small.webp
//!         ├── pool_medium.webp
//!         └── pool_large.webp
//! ```
//!
//! Album sources nest one level deeper so a primary `facade.jpg` and an
//! album `facade.jpg` never map to the same derived file.

use crate::entity::{AssetRole, EntityKind};
use crate::imaging::SizeClass;
use crate::naming::entity_dir_name;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Directory holding derived variants, next to the originals.
pub const WEBP_DIR: &str = "webp";
/// Directory holding album originals inside an asset directory.
pub const ALBUM_DIR: &str = "album";
/// Extension of every derived file.
pub const DERIVED_EXTENSION: &str = "webp";

/// The four derived paths for one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPaths {
    pub canonical: PathBuf,
    pub small: PathBuf,
    pub medium: PathBuf,
    pub large: PathBuf,
}

impl DerivedPaths {
    pub fn get(&self, size: SizeClass) -> &Path {
        match size {
            SizeClass::Canonical => &self.canonical,
            SizeClass::Small => &self.small,
            SizeClass::Medium => &self.medium,
            SizeClass::Large => &self.large,
        }
    }

    /// All four paths in [`SizeClass::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (SizeClass, &Path)> {
        SizeClass::ALL.into_iter().map(move |size| (size, self.get(size)))
    }

    /// Directory the variants are written into.
    pub fn dir(&self) -> &Path {
        self.canonical.parent().unwrap_or(Path::new(""))
    }
}

impl AssetRole {
    /// Infer the role from where the file sits: `album/` means album.
    pub fn infer(source: &Path) -> AssetRole {
        if parent_is_album(source) {
            AssetRole::Album
        } else {
            AssetRole::Primary
        }
    }
}

fn parent_is_album(source: &Path) -> bool {
    source
        .parent()
        .and_then(|p| p.file_name())
        .is_some_and(|name| name == ALBUM_DIR)
}

/// Derived paths for `source`, with the role inferred from its location.
pub fn derived_paths_for(source: &Path) -> DerivedPaths {
    derived_paths_for_role(source, AssetRole::infer(source))
}

/// Derived paths for `source` with an explicit role.
pub fn derived_paths_for_role(source: &Path, role: AssetRole) -> DerivedPaths {
    let dir = derived_dir(source, role);
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();

    let variant = |size: SizeClass| {
        let mut name = OsString::from(&stem);
        if let Some(suffix) = size.suffix() {
            name.push("_");
            name.push(suffix);
        }
        name.push(".");
        name.push(DERIVED_EXTENSION);
        dir.join(name)
    };

    DerivedPaths {
        canonical: variant(SizeClass::Canonical),
        small: variant(SizeClass::Small),
        medium: variant(SizeClass::Medium),
        large: variant(SizeClass::Large),
    }
}

fn derived_dir(source: &Path, role: AssetRole) -> PathBuf {
    let parent = source.parent().unwrap_or(Path::new(""));
    match role {
        AssetRole::Album => entity_dir_of(source, role).join(WEBP_DIR).join(ALBUM_DIR),
        AssetRole::Primary | AssetRole::Icon => parent.join(WEBP_DIR),
    }
}

/// The asset directory a source belongs to.
///
/// For album sources stored under `album/` this is the grandparent.
pub fn entity_dir_of(source: &Path, role: AssetRole) -> PathBuf {
    let parent = source.parent().unwrap_or(Path::new(""));
    if role == AssetRole::Album && parent_is_album(source) {
        parent.parent().unwrap_or(Path::new("")).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Maps entities onto asset directories under a media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    media_root: PathBuf,
}

impl AssetLayout {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// `<media_root>/<kind folder>`.
    pub fn kind_root(&self, kind: EntityKind) -> PathBuf {
        self.media_root.join(kind.folder())
    }

    /// `<media_root>/<kind folder>/<entity name>`. `None` if the name has
    /// nothing usable in it.
    pub fn entity_dir(&self, kind: EntityKind, name: &str) -> Option<PathBuf> {
        entity_dir_name(name).map(|dir| self.kind_root(kind).join(dir))
    }
}
