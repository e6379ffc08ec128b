// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Asset Lookup
//!
//! `AssetDirs` is a set of realized directories where lookups may search.  Hold onto it for many
//! lookups and re-create it when the environment may have changed.
//!
//! ## Precedence Rules
//!
//! - On **debug builds**:
//!
//!   1. `PIXEL_ASSETS_DIR` enabling overrides for any purpose.
//!   2. The source tree's assets folder, below `CARGO_MANIFEST_DIR`.
//!
//! - On **release builds**:
//!
//!   1. `PIXEL_ASSETS_DIR`
//!   2. The user's local data directory
//!   3. The packaged directory set by `PIXEL_BUILD_ASSETS_DIR` or
//!      `package.metadata.pixel.asset_dir` at build time.
//!   4. The system data directory as a backup.
//!
//! `PIXEL_ASSETS_DIR` and `PIXEL_BUILD_ASSETS_DIR` point directly at an assets root, a folder
//! containing a `shaders` directory.

use std::path::{Path, PathBuf};

use crate::prelude::*;

pub struct AssetDirs {
    search_paths: Vec<PathBuf>,
}

/// Packaging default written by the build script.  Only consulted in release builds.
const DEFAULT_ASSET_DIR: Option<&str> = option_env!("PIXEL_BUILD_ASSETS_DIR");

fn as_assets_root(p: PathBuf) -> Option<PathBuf> {
    p.canonicalize().ok().filter(|p| p.is_dir())
}

/// Treat `p` as a parent containing an `assets/` subdir.
fn with_assets_subdir(p: PathBuf) -> Option<PathBuf> {
    as_assets_root(p.join("assets"))
}

impl AssetDirs {
    /// Checks asset search directories once on construction.
    pub fn new() -> Self {
        let mut search_paths = Vec::with_capacity(4);

        if let Ok(raw) = std::env::var("PIXEL_ASSETS_DIR") {
            match as_assets_root(PathBuf::from(&raw)) {
                Some(path) => search_paths.push(path),
                None => tracing::warn!("invalid PIXEL_ASSETS_DIR (path not found): {raw}"),
            }
        }

        if cfg!(debug_assertions) {
            search_paths.extend(
                std::env::var("CARGO_MANIFEST_DIR")
                    .ok()
                    .map(PathBuf::from)
                    .and_then(with_assets_subdir),
            );
        } else {
            search_paths.extend(dirs::data_local_dir().and_then(with_assets_subdir));
            search_paths.extend(DEFAULT_ASSET_DIR.map(PathBuf::from).and_then(as_assets_root));
            search_paths.extend(dirs::data_dir().and_then(with_assets_subdir));
        }

        Self::with_paths(search_paths)
    }

    /// Search exactly `search_paths`, in order.
    pub fn with_paths(search_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let search_paths: Vec<PathBuf> = search_paths.into_iter().collect();
        tracing::debug!(?search_paths, "asset search paths");
        AssetDirs { search_paths }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First existing `<root>/<subdir>/<name>.<ext>`.
    pub fn find(&self, name: &str, kind: AssetKind) -> Option<PathBuf> {
        let mut file = Path::new(kind.subdir()).join(name);
        file.set_extension(kind.ext());

        let found = self
            .search_paths
            .iter()
            .map(|root| root.join(&file))
            .find(|candidate| candidate.is_file());

        if found.is_none() {
            tracing::warn!(?kind, name, searched = ?self.search_paths, "asset not found");
        }
        found
    }

    pub fn find_bytes(&self, name: &str, kind: AssetKind) -> Result<Vec<u8>, AssetError> {
        let found = self
            .find(name, kind)
            .ok_or_else(|| AssetError::NotFound(name.to_owned()))?;
        Ok(std::fs::read(found)?)
    }

    /// Path of a compiled shader, such as `triangle/vertex`.
    pub fn find_shader(&self, name: &str) -> Result<PathBuf, AssetError> {
        self.find(name, AssetKind::Shader)
            .ok_or_else(|| AssetError::NotFound(name.to_owned()))
    }
}

impl Default for AssetDirs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pixel-assets-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("shaders/triangle")).unwrap();
        dir
    }

    #[test]
    fn test_first_root_wins() {
        let first = scratch("first");
        let second = scratch("second");
        std::fs::write(second.join("shaders/triangle/vertex.spv"), [0u8; 4]).unwrap();

        let dirs = AssetDirs::with_paths([first.clone(), second.clone()]);
        assert_eq!(
            dirs.find_shader("triangle/vertex").unwrap(),
            second.join("shaders/triangle/vertex.spv")
        );

        std::fs::write(first.join("shaders/triangle/vertex.spv"), [1u8; 4]).unwrap();
        assert_eq!(
            dirs.find_shader("triangle/vertex").unwrap(),
            first.join("shaders/triangle/vertex.spv")
        );
        assert_eq!(
            dirs.find_bytes("triangle/vertex", AssetKind::Shader).unwrap(),
            [1u8; 4]
        );

        std::fs::remove_dir_all(first).unwrap();
        std::fs::remove_dir_all(second).unwrap();
    }

    #[test]
    fn test_missing_shader() {
        let root = scratch("missing");
        let dirs = AssetDirs::with_paths([root.clone()]);
        assert!(matches!(
            dirs.find_shader("triangle/fragment"),
            Err(AssetError::NotFound(_))
        ));

        // Directories are not assets.
        std::fs::create_dir_all(root.join("shaders/triangle/fragment.spv")).unwrap();
        assert!(dirs.find("triangle/fragment", AssetKind::Shader).is_none());
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_no_search_paths() {
        let dirs = AssetDirs::with_paths(Vec::new());
        assert!(dirs.search_paths().is_empty());
        assert!(dirs.find("anything", AssetKind::Shader).is_none());
    }
}
