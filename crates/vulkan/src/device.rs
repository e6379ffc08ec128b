// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Device
//!
//! `GraphicsDevice` owns the instance and the list of adapters, and selects one of them to back a
//! `LogicalDevice`.  Initializing an adapter for use results in the logical `ash::Device`, which is
//! used in most calls to Vulkan.
//!
//! The logical device is reference counted.  Buffers, shader programs, swapchains and pipelines
//! each hold a clone, so the device outlives everything created from it no matter which order the
//! application drops things in.

use std::rc::Rc;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::adapter::{Adapter, SurfaceRequirements};
use crate::config::ContextConfig;
use crate::instance::Instance;
use crate::prelude::*;
use crate::queue::{self, Queue};

pub struct LogicalDevice {
    pub device: ash::Device,
    /// Graphics queue.  Also used for transfers and, when created for a surface, presentation.
    pub queue: Queue,
    pub adapter: Adapter,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    wide_lines: bool,
    line_width_range: [f32; 2],
}

impl LogicalDevice {
    fn new(adapter: Adapter, family_index: u32, presentable: bool) -> Result<Self, VulkanError> {
        let supported = adapter.features();
        let wide_lines = supported.wide_lines == vk::TRUE;
        let features = vk::PhysicalDeviceFeatures::default().wide_lines(wide_lines);

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family_index)
            .queue_priorities(&priorities)];

        let mut extensions = Vec::new();
        if presentable {
            extensions.push(vk::KHR_SWAPCHAIN_NAME.as_ptr());
        }

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe {
            adapter
                .instance()
                .instance
                .create_device(adapter.handle(), &device_info, None)?
        };
        let queue = Queue::new(&device, family_index);

        Ok(Self {
            device,
            queue,
            memory_properties: adapter.memory_properties(),
            wide_lines,
            line_width_range: adapter.properties().limits.line_width_range,
            adapter,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &Instance {
        self.adapter.instance()
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn wait_idle(&self) -> Result<(), VulkanError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Largest usable approximation of `width` on this device.
    pub fn line_width(&self, width: f32) -> f32 {
        clamp_line_width(width, self.wide_lines, self.line_width_range)
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("device wait before destruction failed: {e}");
            }
            self.device.destroy_device(None);
        }
        tracing::debug!("logical device destroyed");
    }
}

fn clamp_line_width(width: f32, wide_lines: bool, range: [f32; 2]) -> f32 {
    if !wide_lines {
        return 1.0;
    }
    width.clamp(range[0], range[1].max(range[0]))
}

pub struct GraphicsDevice {
    // Declared first so it drops before the adapters and instance.
    logical: Option<Rc<LogicalDevice>>,
    adapters: Vec<Adapter>,
    active: usize,
    instance: Rc<Instance>,
}

impl GraphicsDevice {
    /// Create the instance and enumerate adapters.  No logical device exists until an adapter is
    /// selected.
    pub fn new(
        config: &ContextConfig,
        display: Option<RawDisplayHandle>,
    ) -> Result<Self, VulkanError> {
        let instance = Rc::new(Instance::new(config, display)?);

        let physical_devices = unsafe { instance.instance.enumerate_physical_devices()? };
        if physical_devices.is_empty() {
            return Err(VulkanError::NoAdapters);
        }

        let adapters: Vec<Adapter> = physical_devices
            .into_iter()
            .map(|pd| Adapter::new(instance.clone(), pd))
            .collect();

        for (i, adapter) in adapters.iter().enumerate() {
            tracing::info!(
                index = i,
                kind = ?adapter.properties().device_type,
                "adapter: {}",
                adapter.name()
            );
        }

        Ok(Self {
            logical: None,
            adapters,
            active: 0,
            instance,
        })
    }

    pub fn instance(&self) -> &Rc<Instance> {
        &self.instance
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn adapter(&self, index: usize) -> Result<&Adapter, VulkanError> {
        self.adapters
            .get(index)
            .ok_or(VulkanError::AdapterOutOfRange {
                index,
                count: self.adapters.len(),
            })
    }

    pub fn active_adapter(&self) -> &Adapter {
        &self.adapters[self.active]
    }

    /// The logical device of the selected adapter.
    pub fn logical(&self) -> Result<&Rc<LogicalDevice>, VulkanError> {
        self.logical.as_ref().ok_or(VulkanError::NoDevice)
    }

    /// Create a logical device and queue on adapter `index`, replacing any previous one.
    ///
    /// With `surface`, the adapter must report the surface format and present mode and must have a
    /// graphics queue family that can present to the surface.  Without it, any graphics family
    /// will do.  Nothing changes when the adapter is rejected.
    pub fn select_adapter(
        &mut self,
        index: usize,
        surface: Option<&SurfaceRequirements>,
    ) -> Result<(), VulkanError> {
        let adapter = self.adapter(index)?.clone();

        if let Some(req) = surface {
            if !adapter.satisfies(req)? {
                return Err(VulkanError::NoSuitableAdapter);
            }
        }

        let family = queue::first_queue_family(
            &adapter.queue_families(),
            vk::QueueFlags::GRAPHICS,
            |i| match surface {
                Some(req) => adapter.supports_present(i, req.surface),
                None => Ok(true),
            },
        )?
        .ok_or(VulkanError::NoSuitableAdapter)?;

        if let Some(previous) = self.logical.take() {
            if Rc::strong_count(&previous) > 1 {
                tracing::warn!("previous logical device is still referenced and stays alive");
            }
        }

        let logical = LogicalDevice::new(adapter, family, surface.is_some())?;
        self.logical = Some(Rc::new(logical));
        self.active = index;

        tracing::info!(
            index,
            queue_family = family,
            "selected adapter {}",
            self.active_adapter().name()
        );
        Ok(())
    }

    /// Select `preferred` if it qualifies, otherwise the first adapter that does.
    pub fn select_first_suitable(
        &mut self,
        preferred: Option<usize>,
        surface: Option<&SurfaceRequirements>,
    ) -> Result<usize, VulkanError> {
        let order = preferred
            .into_iter()
            .chain((0..self.adapters.len()).filter(|i| Some(*i) != preferred));

        for index in order {
            match self.select_adapter(index, surface) {
                Ok(()) => return Ok(index),
                Err(e @ VulkanError::Ash(_)) => return Err(e),
                Err(e) => tracing::debug!(index, "adapter rejected: {e}"),
            }
        }
        Err(VulkanError::NoSuitableAdapter)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_width_without_wide_lines() {
        assert_eq!(clamp_line_width(0.5, false, [1.0, 8.0]), 1.0);
        assert_eq!(clamp_line_width(4.0, false, [1.0, 8.0]), 1.0);
    }

    #[test]
    fn test_line_width_clamped_to_range() {
        assert_eq!(clamp_line_width(0.5, true, [1.0, 8.0]), 1.0);
        assert_eq!(clamp_line_width(3.0, true, [1.0, 8.0]), 3.0);
        assert_eq!(clamp_line_width(10.0, true, [1.0, 8.0]), 8.0);
    }
}
