//! Entity lifecycle hooks.
//!
//! The entity collaborator calls one of five hooks after it has committed a
//! change:
//!
//! | Event | Effect |
//! |---|---|
//! | image created | optimize the new source, `force = true` |
//! | image replaced | purge the old source's derived set, optimize the new one |
//! | entity renamed | move the asset directory in one `rename`, no regeneration |
//! | image deleted | purge that source's derived set |
//! | entity deleted | purge the whole asset directory |
//!
//! Hooks never return an error. Whatever happened is described by the
//! returned [`HookOutcome`] and logged; a missing source or directory is a
//! logged no-op. Every hook is safe to call again after a partial failure.
//!
//! [`AssetEvent`] carries the same five events as values, for callers that
//! queue or fan them out in-process.

use crate::cleanup::{Cleanup, PurgeReport};
use crate::config::PipelineConfig;
use crate::entity::{AssetRole, EntityRef, HasSourceImage};
use crate::flight::lock_key;
use crate::imaging::{ImageCodec, RustCodec};
use crate::optimize::{OptimizationReport, Optimizer};
use crate::paths::AssetLayout;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What a hook did.
///
/// Serialized with a `hook` tag. The inline reports keep their own
/// `outcome` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum HookOutcome {
    Optimized(OptimizationReport),
    Replaced {
        /// `None` when old and new are the same file.
        purged: Option<PurgeReport>,
        optimized: OptimizationReport,
    },
    Purged(PurgeReport),
    Moved {
        from: PathBuf,
        to: PathBuf,
    },
    /// A previous attempt already moved the directory.
    AlreadyMoved {
        to: PathBuf,
    },
    /// Nothing to do.
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl HookOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            HookOutcome::Failed { .. } => true,
            HookOutcome::Optimized(report) => !report.is_success(),
            HookOutcome::Replaced { purged, optimized } => {
                !optimized.is_success() || purged.as_ref().is_some_and(|p| !p.is_clean())
            }
            HookOutcome::Purged(report) => !report.is_clean(),
            _ => false,
        }
    }
}

/// Callbacks the entity collaborator invokes.
pub trait AssetLifecycle {
    fn on_image_created(&self, entity: &EntityRef, source: &Path) -> HookOutcome;

    fn on_image_replaced(&self, entity: &EntityRef, old: &Path, new: &Path) -> HookOutcome;

    fn on_entity_renamed(&self, entity: &EntityRef, old_dir: &Path, new_dir: &Path)
    -> HookOutcome;

    fn on_image_deleted(&self, entity: &EntityRef, source: &Path) -> HookOutcome;

    fn on_entity_deleted(&self, entity: &EntityRef, dir: &Path) -> HookOutcome;
}

/// The five lifecycle events as values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AssetEvent {
    ImageCreated {
        entity: EntityRef,
        source: PathBuf,
    },
    ImageReplaced {
        entity: EntityRef,
        old: PathBuf,
        new: PathBuf,
    },
    EntityRenamed {
        entity: EntityRef,
        old_dir: PathBuf,
        new_dir: PathBuf,
    },
    ImageDeleted {
        entity: EntityRef,
        source: PathBuf,
    },
    EntityDeleted {
        entity: EntityRef,
        dir: PathBuf,
    },
}

impl AssetEvent {
    pub fn entity(&self) -> &EntityRef {
        match self {
            AssetEvent::ImageCreated { entity, .. }
            | AssetEvent::ImageReplaced { entity, .. }
            | AssetEvent::EntityRenamed { entity, .. }
            | AssetEvent::ImageDeleted { entity, .. }
            | AssetEvent::EntityDeleted { entity, .. } => entity,
        }
    }
}

/// Route `event` to the matching hook.
pub fn dispatch<H: AssetLifecycle + ?Sized>(hooks: &H, event: &AssetEvent) -> HookOutcome {
    match event {
        AssetEvent::ImageCreated { entity, source } => hooks.on_image_created(entity, source),
        AssetEvent::ImageReplaced { entity, old, new } => {
            hooks.on_image_replaced(entity, old, new)
        }
        AssetEvent::EntityRenamed {
            entity,
            old_dir,
            new_dir,
        } => hooks.on_entity_renamed(entity, old_dir, new_dir),
        AssetEvent::ImageDeleted { entity, source } => hooks.on_image_deleted(entity, source),
        AssetEvent::EntityDeleted { entity, dir } => hooks.on_entity_deleted(entity, dir),
    }
}

/// Hook implementation backed by an [`Optimizer`] and a [`Cleanup`] that
/// share one lock table.
#[derive(Debug, Clone)]
pub struct LifecycleHooks<C: ImageCodec = RustCodec> {
    optimizer: Optimizer<C>,
    cleanup: Cleanup,
    layout: AssetLayout,
}

impl LifecycleHooks<RustCodec> {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_optimizer(Optimizer::new(config))
    }
}

impl<C: ImageCodec> LifecycleHooks<C> {
    pub fn with_optimizer(optimizer: Optimizer<C>) -> Self {
        let cleanup = Cleanup::sharing(&optimizer);
        let layout = AssetLayout::new(optimizer.config().storage.media_root.clone());
        Self {
            optimizer,
            cleanup,
            layout,
        }
    }

    pub fn optimizer(&self) -> &Optimizer<C> {
        &self.optimizer
    }

    /// Optimize every source image an entity owns.
    pub fn on_entity_saved<E: HasSourceImage>(&self, entity: &E) -> Vec<HookOutcome> {
        let entity_ref = entity.entity_ref();
        entity
            .source_assets()
            .iter()
            .map(|asset| self.created_as(&entity_ref, &asset.path, asset.role))
            .collect()
    }

    /// Move an entity's asset directory after its name changed.
    pub fn rename_entity(&self, entity: &EntityRef, new_name: &str) -> HookOutcome {
        let (Some(old_dir), Some(new_dir)) = (
            self.layout.entity_dir(entity.kind, &entity.name),
            self.layout.entity_dir(entity.kind, new_name),
        ) else {
            warn!(entity = %entity, new_name, "name has no usable directory form");
            return HookOutcome::Failed {
                reason: "entity name has no usable directory form".into(),
            };
        };
        self.on_entity_renamed(entity, &old_dir, &new_dir)
    }

    /// Remove an entity's whole asset directory.
    pub fn delete_entity(&self, entity: &EntityRef) -> HookOutcome {
        match self.layout.entity_dir(entity.kind, &entity.name) {
            Some(dir) => self.on_entity_deleted(entity, &dir),
            None => HookOutcome::Skipped {
                reason: "entity name has no usable directory form".into(),
            },
        }
    }

    fn role_for(entity: &EntityRef, source: &Path) -> AssetRole {
        match AssetRole::infer(source) {
            AssetRole::Album => AssetRole::Album,
            _ => entity.kind.primary_role(),
        }
    }

    fn created_as(&self, entity: &EntityRef, source: &Path, role: AssetRole) -> HookOutcome {
        if !source.is_file() {
            warn!(entity = %entity, source = %source.display(), "image created but source is missing");
            return HookOutcome::Skipped {
                reason: format!("source not found: {}", source.display()),
            };
        }
        let report = self.optimizer.optimize_as(source, role, true);
        HookOutcome::Optimized(report)
    }
}

impl<C: ImageCodec> AssetLifecycle for LifecycleHooks<C> {
    fn on_image_created(&self, entity: &EntityRef, source: &Path) -> HookOutcome {
        info!(entity = %entity, source = %source.display(), "image created");
        self.created_as(entity, source, Self::role_for(entity, source))
    }

    fn on_image_replaced(&self, entity: &EntityRef, old: &Path, new: &Path) -> HookOutcome {
        info!(entity = %entity, old = %old.display(), new = %new.display(), "image replaced");

        // Forced regeneration overwrites the same targets, so an in-place
        // replacement needs no purge.
        let purged = (lock_key(old) != lock_key(new))
            .then(|| self.cleanup.purge_asset_as(old, Self::role_for(entity, old)));

        if !new.is_file() {
            warn!(entity = %entity, source = %new.display(), "replacement source is missing");
            return match purged {
                Some(report) => HookOutcome::Purged(report),
                None => HookOutcome::Skipped {
                    reason: format!("source not found: {}", new.display()),
                },
            };
        }

        let optimized = self
            .optimizer
            .optimize_as(new, Self::role_for(entity, new), true);
        HookOutcome::Replaced { purged, optimized }
    }

    fn on_entity_renamed(
        &self,
        entity: &EntityRef,
        old_dir: &Path,
        new_dir: &Path,
    ) -> HookOutcome {
        info!(entity = %entity, from = %old_dir.display(), to = %new_dir.display(), "entity renamed");
        if lock_key(old_dir) == lock_key(new_dir) {
            return HookOutcome::Skipped {
                reason: "asset directory name unchanged".into(),
            };
        }

        self.optimizer.flights().exclusive(&lock_key(old_dir), || {
            let old_exists = fs::symlink_metadata(old_dir).is_ok();
            let new_exists = fs::symlink_metadata(new_dir).is_ok();
            match (old_exists, new_exists) {
                (false, true) => {
                    info!(to = %new_dir.display(), "asset directory already moved");
                    HookOutcome::AlreadyMoved {
                        to: new_dir.to_path_buf(),
                    }
                }
                (false, false) => {
                    warn!(from = %old_dir.display(), "asset directory missing, nothing to move");
                    HookOutcome::Skipped {
                        reason: format!("asset directory not found: {}", old_dir.display()),
                    }
                }
                (true, true) => {
                    warn!(to = %new_dir.display(), "rename target already exists, refusing to merge");
                    HookOutcome::Failed {
                        reason: format!("destination already exists: {}", new_dir.display()),
                    }
                }
                (true, false) => move_dir(old_dir, new_dir),
            }
        })
    }

    fn on_image_deleted(&self, entity: &EntityRef, source: &Path) -> HookOutcome {
        info!(entity = %entity, source = %source.display(), "image deleted");
        HookOutcome::Purged(
            self.cleanup
                .purge_asset_as(source, Self::role_for(entity, source)),
        )
    }

    fn on_entity_deleted(&self, entity: &EntityRef, dir: &Path) -> HookOutcome {
        info!(entity = %entity, dir = %dir.display(), "entity deleted");
        HookOutcome::Purged(self.cleanup.purge_directory(dir))
    }
}

fn move_dir(from: &Path, to: &Path) -> HookOutcome {
    if let Some(parent) = to.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(dir = %parent.display(), error = %e, "cannot create rename target parent");
        return HookOutcome::Failed {
            reason: format!("{}: {e}", parent.display()),
        };
    }
    match fs::rename(from, to) {
        Ok(()) => HookOutcome::Moved {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        },
        Err(e) => {
            warn!(from = %from.display(), to = %to.display(), error = %e, "rename failed");
            HookOutcome::Failed {
                reason: format!("{} -> {}: {e}", from.display(), to.display()),
            }
        }
    }
}
