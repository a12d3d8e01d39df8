use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, SoundEngineError};

const ASSETS_PREFIX: &str = "assets/";

/// A resolved sound resource. Owned by whoever resolved it; sessions only keep a copy of the
/// location so the backend can open it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle {
    path: PathBuf,
}

impl AssetHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resolves asset paths for newly created sessions.
pub trait AssetSource: Send + Sync {
    fn resolve(&self, path: &str) -> Result<AssetHandle>;
}

/// Resolves assets on the filesystem. Absolute paths are taken as they are, relative ones are
/// looked up under `root` with a leading `assets/` segment dropped.
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn locate(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        self.root.join(path.strip_prefix(ASSETS_PREFIX).unwrap_or(path))
    }
}

impl AssetSource for DirAssetSource {
    fn resolve(&self, path: &str) -> Result<AssetHandle> {
        let located = self.locate(path);
        if located.is_file() {
            Ok(AssetHandle::new(located))
        } else {
            Err(SoundEngineError::AssetNotFound {
                path: PathBuf::from(path),
            })
        }
    }
}

/// Fixed set of known asset names. Useful with the headless backend where nothing is read.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetSource {
    names: HashSet<String>,
}

impl StaticAssetSource {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl AssetSource for StaticAssetSource {
    fn resolve(&self, path: &str) -> Result<AssetHandle> {
        if self.names.contains(path) {
            Ok(AssetHandle::new(path))
        } else {
            Err(SoundEngineError::AssetNotFound {
                path: PathBuf::from(path),
            })
        }
    }
}
