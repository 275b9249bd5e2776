//! Crate-level error type for filesystem and codec failures.

use crate::imaging::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("{}: {source}", path.display())]
    Filesystem { path: PathBuf, source: io::Error },
    #[error("source not found: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl AssetError {
    pub fn fs(path: impl AsRef<Path>, source: io::Error) -> Self {
        AssetError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AssetError::Filesystem { .. } => FailureKind::Filesystem,
            AssetError::SourceMissing(_) => FailureKind::SourceMissing,
            AssetError::Codec(CodecError::UnsupportedInputFormat(_)) => {
                FailureKind::UnsupportedInputFormat
            }
            AssetError::Codec(CodecError::CorruptInput(_)) => FailureKind::CorruptInput,
            AssetError::Codec(CodecError::InputTooLarge(_)) => FailureKind::InputTooLarge,
            AssetError::Codec(CodecError::EncodeFailure(_)) => FailureKind::EncodeFailure,
        }
    }
}

/// Serializable classification of an [`AssetError`], kept in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceMissing,
    Filesystem,
    UnsupportedInputFormat,
    CorruptInput,
    InputTooLarge,
    EncodeFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::SourceMissing => "source missing",
            FailureKind::Filesystem => "filesystem",
            FailureKind::UnsupportedInputFormat => "unsupported format",
            FailureKind::CorruptInput => "corrupt input",
            FailureKind::InputTooLarge => "input too large",
            FailureKind::EncodeFailure => "encode failed",
        })
    }
}
