// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Buffer Layout
//!
//! Describes one element of a buffer as an ordered list of named attributes.  Offsets are packed in
//! declaration order with no padding, so a layout matches a `#[repr(C)]` struct of `f32`, `i32` and
//! `u32` arrays.  Vertex buffers turn their layout into a single per-vertex binding.

use ash::vk;
use smallvec::SmallVec;

/// Element types an attribute can hold.  Components are always 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferDataType {
    Int2,
    Int3,
    Int4,
    UInt2,
    UInt3,
    UInt4,
    Float2,
    Float3,
    Float4,
    Matrix3,
    Matrix4,
}

impl BufferDataType {
    /// Size in bytes.
    pub fn size(self) -> u32 {
        4 * self.components()
    }

    pub fn components(self) -> u32 {
        match self {
            Self::Int2 | Self::UInt2 | Self::Float2 => 2,
            Self::Int3 | Self::UInt3 | Self::Float3 => 3,
            Self::Int4 | Self::UInt4 | Self::Float4 => 4,
            Self::Matrix3 => 9,
            Self::Matrix4 => 16,
        }
    }

    /// Shader input locations consumed.  Matrices take one per column.
    pub fn locations(self) -> u32 {
        match self {
            Self::Matrix3 => 3,
            Self::Matrix4 => 4,
            _ => 1,
        }
    }

    /// Format of one location.  For matrices this is the format of a column.
    pub fn format(self) -> vk::Format {
        match self {
            Self::Int2 => vk::Format::R32G32_SINT,
            Self::Int3 => vk::Format::R32G32B32_SINT,
            Self::Int4 => vk::Format::R32G32B32A32_SINT,
            Self::UInt2 => vk::Format::R32G32_UINT,
            Self::UInt3 => vk::Format::R32G32B32_UINT,
            Self::UInt4 => vk::Format::R32G32B32A32_UINT,
            Self::Float2 => vk::Format::R32G32_SFLOAT,
            Self::Float3 | Self::Matrix3 => vk::Format::R32G32B32_SFLOAT,
            Self::Float4 | Self::Matrix4 => vk::Format::R32G32B32A32_SFLOAT,
        }
    }

    fn location_stride(self) -> u32 {
        self.size() / self.locations()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferAttribute {
    pub name: String,
    pub data_type: BufferDataType,
    pub size: u32,
    /// Filled in by `BufferLayout::new`.
    pub offset: u32,
}

impl BufferAttribute {
    pub fn new(data_type: BufferDataType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
            size: data_type.size(),
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLayout {
    attributes: Vec<BufferAttribute>,
    size: u32,
}

/// Vertex input state derived from a layout.
#[derive(Debug, Clone)]
pub struct VertexInput {
    pub binding: vk::VertexInputBindingDescription,
    pub attributes: SmallVec<vk::VertexInputAttributeDescription, 8>,
}

impl BufferLayout {
    pub fn new(attributes: impl IntoIterator<Item = BufferAttribute>) -> Self {
        let mut attributes: Vec<BufferAttribute> = attributes.into_iter().collect();
        let mut offset = 0;
        for attribute in &mut attributes {
            attribute.offset = offset;
            offset += attribute.size;
        }
        Self {
            attributes,
            size: offset,
        }
    }

    /// Bytes per element.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn attributes(&self) -> &[BufferAttribute] {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// One per-vertex binding with stride equal to the layout size.  Locations are assigned from 0
    /// in declaration order.
    pub fn vertex_input(&self, binding: u32) -> VertexInput {
        let mut attributes = SmallVec::new();
        let mut location = 0;
        for attribute in &self.attributes {
            let data_type = attribute.data_type;
            for column in 0..data_type.locations() {
                attributes.push(vk::VertexInputAttributeDescription {
                    location,
                    binding,
                    format: data_type.format(),
                    offset: attribute.offset + column * data_type.location_stride(),
                });
                location += 1;
            }
        }

        VertexInput {
            binding: vk::VertexInputBindingDescription {
                binding,
                stride: self.size,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            attributes,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_offsets_follow_declaration_order() {
        let layout = BufferLayout::new([
            BufferAttribute::new(BufferDataType::Float3, "position"),
            BufferAttribute::new(BufferDataType::Float4, "color"),
        ]);
        let offsets: Vec<u32> = layout.attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 12]);
        assert_eq!(layout.size(), 28);
    }

    #[test]
    fn test_type_sizes() {
        use BufferDataType::*;
        for (ty, size) in [
            (Int2, 8),
            (UInt3, 12),
            (Float4, 16),
            (Matrix3, 36),
            (Matrix4, 64),
        ] {
            assert_eq!(ty.size(), size, "{ty:?}");
        }
    }

    #[test]
    fn test_layout_size_is_sum() {
        use BufferDataType::*;
        let types = [Float2, Int4, Matrix3, UInt2];
        let layout = BufferLayout::new(types.iter().map(|&t| BufferAttribute::new(t, "a")));
        assert_eq!(layout.size(), types.iter().map(|t| t.size()).sum::<u32>());
        assert_eq!(layout.attributes()[3].offset, 8 + 16 + 36);
    }

    #[test]
    fn test_matrix_takes_a_location_per_column() {
        let layout = BufferLayout::new([
            BufferAttribute::new(BufferDataType::Matrix4, "model"),
            BufferAttribute::new(BufferDataType::Float2, "uv"),
        ]);
        let input = layout.vertex_input(0);

        assert_eq!(input.binding.stride, 72);
        assert_eq!(input.binding.input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(input.attributes.len(), 5);

        let offsets: Vec<u32> = input.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 16, 32, 48, 64]);
        let locations: Vec<u32> = input.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, [0, 1, 2, 3, 4]);
        assert_eq!(input.attributes[4].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_empty_layout() {
        let layout = BufferLayout::new(Vec::<BufferAttribute>::new());
        assert!(layout.is_empty());
        assert_eq!(layout.size(), 0);
        assert!(layout.vertex_input(0).attributes.is_empty());
    }
}
