// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! These need a Vulkan driver.  Run with `cargo test -- --ignored`.

use std::rc::Rc;
use std::time::Duration;

use pixel_vulkan::buffer::Residency;
use pixel_vulkan::prelude::*;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

fn headless() -> GraphicsDevice {
    let config = ContextConfig::builder().validation(false).build();
    let mut graphics = GraphicsDevice::new(&config, None).unwrap();
    graphics.select_first_suitable(None, None).unwrap();
    graphics
}

fn vertex_layout() -> BufferLayout {
    BufferLayout::new([
        BufferAttribute::new(BufferDataType::Float2, "position"),
        BufferAttribute::new(BufferDataType::Float3, "color"),
    ])
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn headless_device_selection() {
    let graphics = headless();
    assert!(graphics.adapter_count() > 0);
    assert!(graphics.logical().is_ok());
    assert!(!graphics.active_adapter().name().is_empty());

    let count = graphics.adapter_count();
    assert!(matches!(
        graphics.adapter(count),
        Err(VulkanError::AdapterOutOfRange { .. })
    ));
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn staged_vertex_upload() {
    let graphics = headless();
    let device = graphics.logical().unwrap().clone();

    let buffer = Buffer::new(
        device,
        BufferType::Vertex,
        ShaderStage::Fragment,
        vertex_layout(),
        3,
        Duration::from_secs(1),
    )
    .unwrap();
    assert_eq!(buffer.size(), 60);
    assert_eq!(buffer.bind_stage(), ShaderStage::Vertex);
    assert!(matches!(
        buffer.residency(),
        Residency::StagedDeviceLocal { .. }
    ));

    let vertices = [
        Vertex {
            position: [0.0, -0.5],
            color: [1.0, 0.0, 0.0],
        },
        Vertex {
            position: [0.5, 0.5],
            color: [0.0, 1.0, 0.0],
        },
        Vertex {
            position: [-0.5, 0.5],
            color: [0.0, 0.0, 1.0],
        },
    ];
    buffer.set_data(&vertices).unwrap();
    // Uploads are repeatable.
    buffer.set_data(&vertices).unwrap();

    assert!(matches!(
        buffer.set_data(&vertices[..2]),
        Err(VulkanError::SizeMismatch {
            expected: 60,
            actual: 40
        })
    ));
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn uniform_buffer_is_host_mapped() {
    let graphics = headless();
    let device = graphics.logical().unwrap().clone();

    let layout = BufferLayout::new([BufferAttribute::new(BufferDataType::Matrix4, "mvp")]);
    let buffer = Buffer::new(
        device,
        BufferType::Uniform,
        ShaderStage::Vertex,
        layout,
        1,
        Duration::from_secs(1),
    )
    .unwrap();
    assert!(matches!(buffer.residency(), Residency::HostMapped(_)));
    buffer.set_data(&[0.0f32; 16]).unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn buffers_outlive_their_device_owner() {
    let graphics = headless();
    let device = graphics.logical().unwrap().clone();
    let buffer = Rc::new(
        Buffer::new(
            device,
            BufferType::Index,
            ShaderStage::Vertex,
            BufferLayout::new([BufferAttribute::new(BufferDataType::UInt3, "indices")]),
            4,
            Duration::from_secs(1),
        )
        .unwrap(),
    );
    drop(graphics);
    buffer.set_data(&[0u32; 12]).unwrap();
}

#[test]
#[ignore = "requires a Vulkan driver"]
fn missing_shader_file() {
    let graphics = headless();
    let device = graphics.logical().unwrap().clone();
    let result = ShaderProgram::from_file(
        device,
        "missing",
        "does/not/exist.spv",
        ShaderStage::Vertex,
    );
    assert!(matches!(result, Err(VulkanError::Io(_))));
}
