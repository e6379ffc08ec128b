// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `info` unless `RUST_LOG` says otherwise.  Validation layer output uses the `vulkan` target.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
