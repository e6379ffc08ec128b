// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Build Support
//!
//! Functions for build scripts.  Output goes to cargo through `cargo:` lines on stdout.

use std::{ffi::OsStr, fs, path::Path, process};

use crate::prelude::*;

fn manifest_dir() -> Result<std::path::PathBuf, AssetError> {
    std::env::var("CARGO_MANIFEST_DIR")
        .map(Into::into)
        .map_err(|_| AssetError::Manifest("CARGO_MANIFEST_DIR is not set".into()))
}

/// Use slangc to recursively compile `shaders/**/*.slang` into `assets/shaders/**/*.spv`.  Without
/// slangc, cargo is warned and previously compiled shaders are left as they are.
pub fn build_shaders() -> Result<(), AssetError> {
    let crate_root = manifest_dir()?;
    let src_root = crate_root.join("shaders");
    let dest_root = crate_root.join("assets").join(AssetKind::Shader.subdir());

    println!("cargo:rerun-if-changed=shaders");

    if !src_root.is_dir() {
        return Ok(());
    }
    if process::Command::new("slangc").arg("-v").output().is_err() {
        println!("cargo:warning={}", missing_compiler_warning(&dest_root));
        return Ok(());
    }

    compile_dir(&src_root, &src_root, &dest_root, OsStr::new("slang"))
}

fn missing_compiler_warning(dest_root: &Path) -> String {
    let ext = AssetKind::Shader.ext();
    if has_file_with_ext(dest_root, ext) {
        format!("slangc not found, shaders in {dest_root:?} were not rebuilt and may be stale")
    } else {
        format!(
            "slangc not found and {dest_root:?} has no compiled shaders, this package will fail \
             at startup until slangc is installed and it is rebuilt"
        )
    }
}

fn has_file_with_ext(dir: &Path, ext: &OsStr) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let path = entry.path();
        if path.is_dir() {
            has_file_with_ext(&path, ext)
        } else {
            path.extension() == Some(ext)
        }
    })
}

fn compile_dir(dir: &Path, src_root: &Path, dest_root: &Path, ext: &OsStr) -> Result<(), AssetError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            compile_dir(&path, src_root, dest_root, ext)?;
            continue;
        }
        if path.extension() != Some(ext) {
            continue;
        }

        let relative = path
            .strip_prefix(src_root)
            .map_err(|e| AssetError::Compile(e.to_string()))?;
        let out = dest_root.join(relative).with_extension(AssetKind::Shader.ext());
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }

        // `slangc <input> -target spirv -entry main -o <out>`
        let status = process::Command::new("slangc")
            .arg(&path)
            .args(["-target", "spirv", "-entry", "main"])
            .arg("-o")
            .arg(&out)
            .status()?;

        if !status.success() {
            return Err(AssetError::Compile(format!("slangc failed for {path:?}")));
        }
    }
    Ok(())
}

/// Bake the packaged asset directory into the binary as `PIXEL_BUILD_ASSETS_DIR`, from
/// `package.metadata.pixel.asset_dir` or `assets` when unset.
pub fn set_asset_default_dir() -> Result<(), AssetError> {
    let manifest = manifest_dir()?.join("Cargo.toml");
    println!("cargo:rerun-if-changed=Cargo.toml");

    let cargo = fs::read_to_string(&manifest)?;
    let dir = asset_dir_from_manifest(&cargo)?;
    println!("cargo:rustc-env=PIXEL_BUILD_ASSETS_DIR={dir}");
    Ok(())
}

fn asset_dir_from_manifest(cargo: &str) -> Result<String, AssetError> {
    let parsed: toml::Value =
        toml::from_str(cargo).map_err(|e| AssetError::Manifest(e.to_string()))?;

    let dir = parsed
        .get("package")
        .and_then(|p| p.get("metadata"))
        .and_then(|m| m.get("pixel"))
        .and_then(|p| p.get("asset_dir"))
        .and_then(|d| d.as_str())
        .unwrap_or("assets");
    Ok(dir.to_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_asset_dir_metadata() {
        let cargo = r#"
            [package]
            name = "demo"

            [package.metadata.pixel]
            asset_dir = "/usr/share/pixel-demo"
        "#;
        assert_eq!(
            asset_dir_from_manifest(cargo).unwrap(),
            "/usr/share/pixel-demo"
        );
    }

    #[test]
    fn test_asset_dir_default() {
        let cargo = "[package]\nname = \"demo\"\n";
        assert_eq!(asset_dir_from_manifest(cargo).unwrap(), "assets");
    }

    #[test]
    fn test_missing_compiler_warning() {
        let root = std::env::temp_dir().join(format!("pixel-build-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);

        // No output directory at all.
        assert!(missing_compiler_warning(&root).contains("will fail at startup"));

        fs::create_dir_all(root.join("triangle")).unwrap();
        assert!(missing_compiler_warning(&root).contains("will fail at startup"));

        fs::write(root.join("triangle/vertex.spv"), [0u8; 4]).unwrap();
        assert!(missing_compiler_warning(&root).contains("may be stale"));

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_bad_manifest() {
        assert!(matches!(
            asset_dir_from_manifest("[package"),
            Err(AssetError::Manifest(_))
        ));
    }
}
