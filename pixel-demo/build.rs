// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use pixel_assets::build;

fn main() -> Result<(), pixel_assets::AssetError> {
    build::set_asset_default_dir()?;
    build::build_shaders()
}
