//! Catalog entities as seen by the asset pipeline.
//!
//! The relational model lives with the entity-management collaborator. The
//! pipeline only needs to know, for any entity, who owns an image and where
//! its source file is. That is the [`HasSourceImage`] capability, implemented
//! here for the two catalog kinds that carry images.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The catalog entity kinds that own images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Portfolio project: a primary photo plus an album of images.
    Project,
    /// Offered service: a single icon.
    Service,
}

impl EntityKind {
    pub const ALL: [EntityKind; 2] = [EntityKind::Project, EntityKind::Service];

    /// Folder under the media root holding this kind's asset directories.
    pub fn folder(self) -> &'static str {
        match self {
            EntityKind::Project => "projects",
            EntityKind::Service => "services",
        }
    }

    /// Role of an image stored directly in this kind's asset directory.
    pub fn primary_role(self) -> AssetRole {
        match self {
            EntityKind::Project => AssetRole::Primary,
            EntityKind::Service => AssetRole::Icon,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Project => f.write_str("project"),
            EntityKind::Service => f.write_str("service"),
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "project" | "projects" => Ok(EntityKind::Project),
            "service" | "services" => Ok(EntityKind::Service),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Logical role of a source image within its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRole {
    Primary,
    /// Image stored under the entity's `album/` folder.
    Album,
    Icon,
}

/// Identity of an entity that owns images.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    /// Collaborator's primary key. `0` when unknown (e.g. filesystem scans).
    pub id: u64,
    /// Human-readable name the asset directory is derived from.
    pub name: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: u64, name: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{} \"{}\"", self.kind, self.id, self.name)
    }
}

/// An originally-uploaded image. Owned by the entity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAsset {
    pub path: PathBuf,
    pub entity: EntityRef,
    pub role: AssetRole,
}

/// Capability: "this entity has image files the pipeline can derive from".
pub trait HasSourceImage {
    fn entity_ref(&self) -> EntityRef;

    /// The entity's main image, if one has been uploaded.
    fn source_path(&self) -> Option<&Path>;

    fn primary_role(&self) -> AssetRole {
        self.entity_ref().kind.primary_role()
    }

    /// Secondary images (album items). Empty by default.
    fn album_paths(&self) -> &[PathBuf] {
        &[]
    }

    /// Every source image the entity owns, primary first.
    fn source_assets(&self) -> Vec<SourceAsset> {
        let entity = self.entity_ref();
        let primary = self.source_path().map(|path| SourceAsset {
            path: path.to_path_buf(),
            entity: entity.clone(),
            role: self.primary_role(),
        });
        primary
            .into_iter()
            .chain(self.album_paths().iter().map(|path| SourceAsset {
                path: path.clone(),
                entity: entity.clone(),
                role: AssetRole::Album,
            }))
            .collect()
    }
}

/// A portfolio project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub title: String,
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub album: Vec<PathBuf>,
}

impl HasSourceImage for Project {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Project, self.id, &self.title)
    }

    fn source_path(&self) -> Option<&Path> {
        self.image.as_deref()
    }

    fn album_paths(&self) -> &[PathBuf] {
        &self.album
    }
}

/// A service offered in the catalog, displayed with an icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: u64,
    pub name: String,
    pub icon: Option<PathBuf>,
}

impl HasSourceImage for Service {
    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(EntityKind::Service, self.id, &self.name)
    }

    fn source_path(&self) -> Option<&Path> {
        self.icon.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_lists_primary_then_album() {
        let project = Project {
            id: 7,
            title: "Villa Project".into(),
            image: Some("media/projects/Villa Project/facade.jpg".into()),
            album: vec![
                "media/projects/Villa Project/album/pool.jpg".into(),
                "media/projects/Villa Project/album/hall.jpg".into(),
            ],
        };
        let assets = project.source_assets();
        assert_eq!(assets.len(), 3);
        assert_eq!(assets[0].role, AssetRole::Primary);
        assert_eq!(assets[1].role, AssetRole::Album);
        assert_eq!(assets[2].path, PathBuf::from("media/projects/Villa Project/album/hall.jpg"));
        assert!(assets.iter().all(|a| a.entity.id == 7));
    }

    #[test]
    fn project_without_image_only_lists_album() {
        let project = Project {
            id: 1,
            title: "Draft".into(),
            image: None,
            album: vec!["media/projects/Draft/album/a.png".into()],
        };
        let assets = project.source_assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].role, AssetRole::Album);
    }

    #[test]
    fn service_icon_role() {
        let service = Service {
            id: 3,
            name: "Interior Design".into(),
            icon: Some("media/services/Interior Design/icon.png".into()),
        };
        let assets = service.source_assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].role, AssetRole::Icon);
        assert_eq!(assets[0].entity.kind, EntityKind::Service);
    }

    #[test]
    fn entity_kind_parses_folder_and_singular() {
        assert_eq!("projects".parse::<EntityKind>(), Ok(EntityKind::Project));
        assert_eq!("Service".parse::<EntityKind>(), Ok(EntityKind::Service));
        assert!("booking".parse::<EntityKind>().is_err());
    }

    #[test]
    fn entity_ref_display() {
        let e = EntityRef::new(EntityKind::Project, 42, "Villa Estate");
        assert_eq!(e.to_string(), "project #42 \"Villa Estate\"");
    }
}
