// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Vulkan Utils
//!
//! Junk drawer.  Move things out when there is a place for them to belong.
//!

use ash::vk;

use crate::VulkanError;

/// First memory type allowed by `mem_req` whose properties contain all of `required`.
pub fn find_memory_type_index(
    mem_req: &vk::MemoryRequirements,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, VulkanError> {
    (0..mem_props.memory_type_count)
        .find(|&i| {
            let type_supported = (mem_req.memory_type_bits & (1 << i)) != 0;
            let props = mem_props.memory_types[i as usize].property_flags;
            type_supported && props.contains(required)
        })
        .ok_or(VulkanError::NoMemoryType(required))
}

/// Whole-image color subresource, one mip, one layer.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn test_memory_type_requires_all_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let mem_props = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host,
        ]);
        let mem_req = vk::MemoryRequirements {
            memory_type_bits: 0b111,
            ..Default::default()
        };

        assert_eq!(find_memory_type_index(&mem_req, &mem_props, host).unwrap(), 2);
        assert_eq!(
            find_memory_type_index(&mem_req, &mem_props, vk::MemoryPropertyFlags::DEVICE_LOCAL)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_memory_type_respects_requirement_bits() {
        let mem_props = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);
        let mem_req = vk::MemoryRequirements {
            memory_type_bits: 0b10,
            ..Default::default()
        };
        assert_eq!(
            find_memory_type_index(&mem_req, &mem_props, vk::MemoryPropertyFlags::DEVICE_LOCAL)
                .unwrap(),
            1
        );

        let mem_req = vk::MemoryRequirements {
            memory_type_bits: 0,
            ..Default::default()
        };
        assert!(matches!(
            find_memory_type_index(&mem_req, &mem_props, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Err(VulkanError::NoMemoryType(_))
        ));
    }
}
