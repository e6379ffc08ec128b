// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Assets
//!
//! Shaders are compiled to SPIR-V ahead of time and looked up on disk when a program is created.
//!
//! Both halves are feature gated.  The `build` feature is for build scripts: it compiles the crate's
//! `shaders/` tree into `assets/shaders/` and records where packaged assets will be installed.  The
//! `runtime` feature finds those files again.  Use `build` in build-dependencies and `runtime` in
//! normal dependencies.

#[cfg(feature = "runtime")]
pub mod assets;
#[cfg(feature = "build")]
pub mod build;
#[cfg(feature = "runtime")]
pub use assets::*;

use std::ffi::OsStr;

mod prelude {
    pub use super::AssetError;
    pub use super::AssetKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Shader,
}

impl AssetKind {
    pub fn ext(&self) -> &'static OsStr {
        match self {
            AssetKind::Shader => OsStr::new("spv"),
        }
    }

    pub fn subdir(&self) -> &'static OsStr {
        match self {
            AssetKind::Shader => OsStr::new("shaders"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("read failed: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("{0:?} not found")]
    NotFound(String),
    #[error("shader compilation failed: {0}")]
    Compile(String),
    #[error("bad manifest: {0}")]
    Manifest(String),
}
