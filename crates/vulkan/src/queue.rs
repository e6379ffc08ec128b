// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Queue
//!
//! One queue per logical device does graphics, transfer, and presentation.  All Vulkan devices must
//! expose at least a graphics capable queue family, but presentation support is per surface.
//!

use ash::vk;

use crate::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct Queue {
    pub queue: vk::Queue,
    pub family_index: u32,
}

impl Queue {
    pub fn new(device: &ash::Device, family_index: u32) -> Self {
        // Queues are destroyed with their device.
        let queue = unsafe { device.get_device_queue(family_index, 0) };
        Self {
            queue,
            family_index,
        }
    }
}

/// Index of the first family whose flags contain all of `flags` and that `present` accepts.  No
/// scoring: the first match wins.
pub fn first_queue_family(
    qfps: &[vk::QueueFamilyProperties],
    flags: vk::QueueFlags,
    mut present: impl FnMut(u32) -> Result<bool, VulkanError>,
) -> Result<Option<u32>, VulkanError> {
    for (i, qf) in qfps.iter().enumerate() {
        let index = i as u32;
        if qf.queue_count > 0 && qf.queue_flags.contains(flags) && present(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_superset_match_wins() {
        let qfps = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let found = first_queue_family(&qfps, vk::QueueFlags::GRAPHICS, |_| Ok(true)).unwrap();
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_presentation_constraint_skips_families() {
        let qfps = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let found = first_queue_family(&qfps, vk::QueueFlags::GRAPHICS, |i| Ok(i == 1)).unwrap();
        assert_eq!(found, Some(1));

        let found = first_queue_family(&qfps, vk::QueueFlags::GRAPHICS, |_| Ok(false)).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_no_capable_family() {
        let qfps = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        let found = first_queue_family(&qfps, vk::QueueFlags::GRAPHICS, |_| Ok(true)).unwrap();
        assert_eq!(found, None);
        assert_eq!(
            first_queue_family(&[], vk::QueueFlags::GRAPHICS, |_| Ok(true)).unwrap(),
            None
        );
    }

    #[test]
    fn test_presentation_query_errors_propagate() {
        let qfps = [family(vk::QueueFlags::GRAPHICS)];
        let found = first_queue_family(&qfps, vk::QueueFlags::GRAPHICS, |_| {
            Err(VulkanError::Ash(vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert!(found.is_err());
    }
}
