// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Config
//!
//! Everything a `RenderContext` needs to know before it touches the driver.  Build one with
//! `ContextConfig::builder()`, or start from `ContextConfig::from_env()` to honor:
//!
//! - `PIXEL_VALIDATION`: any non-empty value other than `0` enables the Khronos validation layer.
//! - `PIXEL_ADAPTER`: index of the preferred adapter.  Other adapters are tried after it.

use std::time::Duration;

use ash::vk;

#[derive(Debug, Clone, bon::Builder)]
pub struct ContextConfig {
    /// Reported to the driver in `VkApplicationInfo`.
    #[builder(default = String::from("PixelMachine"), into)]
    pub app_name: String,

    #[builder(default = cfg!(debug_assertions))]
    pub validation: bool,

    /// Adapter tried first.  When unset, adapters are tried in enumeration order.
    pub adapter: Option<usize>,

    #[builder(default = vk::PresentModeKHR::FIFO)]
    pub present_mode: vk::PresentModeKHR,

    #[builder(default = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    })]
    pub surface_format: vk::SurfaceFormatKHR,

    /// Used when the surface leaves the extent up to the swapchain.
    #[builder(default = vk::Extent2D { width: 1280, height: 720 })]
    pub fallback_extent: vk::Extent2D,

    /// Bound on each host to device staging copy.
    #[builder(default = Duration::from_secs(1))]
    pub upload_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig::builder().build()
    }
}

impl ContextConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(
            std::env::var("PIXEL_VALIDATION").ok().as_deref(),
            std::env::var("PIXEL_ADAPTER").ok().as_deref(),
        );
        config
    }

    fn apply_env(&mut self, validation: Option<&str>, adapter: Option<&str>) {
        if let Some(raw) = validation {
            self.validation = !raw.is_empty() && raw != "0";
        }
        if let Some(raw) = adapter {
            match raw.trim().parse::<usize>() {
                Ok(index) => self.adapter = Some(index),
                Err(_) => tracing::warn!("ignoring PIXEL_ADAPTER={raw:?}, expected an index"),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.adapter, None);
        assert_eq!(config.upload_timeout, Duration::from_secs(1));
        assert_eq!(config.app_name, "PixelMachine");
    }

    #[test]
    fn test_builder_overrides() {
        let config = ContextConfig::builder()
            .app_name("triangle")
            .validation(true)
            .adapter(1)
            .build();
        assert_eq!(config.app_name, "triangle");
        assert!(config.validation);
        assert_eq!(config.adapter, Some(1));
    }

    #[test]
    fn test_env_values() {
        let mut config = ContextConfig::builder().validation(false).build();
        config.apply_env(Some("1"), Some(" 2 "));
        assert!(config.validation);
        assert_eq!(config.adapter, Some(2));

        config.apply_env(Some("0"), Some("discrete"));
        assert!(!config.validation);
        assert_eq!(config.adapter, Some(2));

        config.apply_env(Some(""), None);
        assert!(!config.validation);
    }
}
