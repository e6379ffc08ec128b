// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Adapter
//!
//! One physical device.  Adapters are queried, never owned: the driver hands them out for the
//! lifetime of the instance, which each adapter keeps alive.

use std::rc::Rc;

use ash::vk;

use crate::instance::Instance;
use crate::prelude::*;

/// What a surface-presenting adapter must offer.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceRequirements {
    pub surface: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

#[derive(Clone)]
pub struct Adapter {
    physical_device: vk::PhysicalDevice,
    instance: Rc<Instance>,
}

impl Adapter {
    pub(crate) fn new(instance: Rc<Instance>, physical_device: vk::PhysicalDevice) -> Self {
        Self {
            physical_device,
            instance,
        }
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub(crate) fn instance(&self) -> &Rc<Instance> {
        &self.instance
    }

    pub fn properties(&self) -> vk::PhysicalDeviceProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_properties(self.physical_device)
        }
    }

    pub fn name(&self) -> String {
        let props = self.properties();
        props
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unnamed>"))
    }

    pub fn features(&self) -> vk::PhysicalDeviceFeatures {
        unsafe {
            self.instance
                .instance
                .get_physical_device_features(self.physical_device)
        }
    }

    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_memory_properties(self.physical_device)
        }
    }

    pub fn queue_families(&self) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .instance
                .get_physical_device_queue_family_properties(self.physical_device)
        }
    }

    pub fn supports_present(
        &self,
        queue_family_index: u32,
        surface: vk::SurfaceKHR,
    ) -> Result<bool, VulkanError> {
        Ok(unsafe {
            self.instance.surface_loader.get_physical_device_surface_support(
                self.physical_device,
                queue_family_index,
                surface,
            )?
        })
    }

    pub fn surface_formats(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, VulkanError> {
        Ok(unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)?
        })
    }

    pub fn present_modes(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<Vec<vk::PresentModeKHR>, VulkanError> {
        Ok(unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)?
        })
    }

    pub fn surface_capabilities(
        &self,
        surface: vk::SurfaceKHR,
    ) -> Result<vk::SurfaceCapabilitiesKHR, VulkanError> {
        Ok(unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, surface)?
        })
    }

    /// Both the surface format and the present mode must be reported for the surface.
    pub fn satisfies(&self, req: &SurfaceRequirements) -> Result<bool, VulkanError> {
        Ok(surface_supported(
            &self.surface_formats(req.surface)?,
            &self.present_modes(req.surface)?,
            req,
        ))
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("physical_device", &self.physical_device)
            .finish()
    }
}

fn format_listed(formats: &[vk::SurfaceFormatKHR], wanted: vk::SurfaceFormatKHR) -> bool {
    formats
        .iter()
        .any(|f| f.format == wanted.format && f.color_space == wanted.color_space)
}

pub(crate) fn surface_supported(
    formats: &[vk::SurfaceFormatKHR],
    modes: &[vk::PresentModeKHR],
    req: &SurfaceRequirements,
) -> bool {
    format_listed(formats, req.format) && modes.contains(&req.present_mode)
}

#[cfg(test)]
mod test {
    use super::*;

    fn req() -> SurfaceRequirements {
        SurfaceRequirements {
            surface: vk::SurfaceKHR::null(),
            format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::FIFO,
        }
    }

    #[test]
    fn test_surface_requires_format_and_mode() {
        let req = req();
        let good = [req.format];
        let wrong_space = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        }];
        let fifo = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        let no_fifo = [vk::PresentModeKHR::IMMEDIATE];

        assert!(surface_supported(&good, &fifo, &req));
        assert!(!surface_supported(&good, &no_fifo, &req));
        assert!(!surface_supported(&wrong_space, &fifo, &req));
        assert!(!surface_supported(&[], &[], &req));
    }
}
