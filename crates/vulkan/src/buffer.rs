// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Buffer
//!
//! Buffers come in two residencies:
//!
//! - `HostMapped`: host visible, host coherent memory mapped once for the life of the buffer.
//!   Writes are visible to the device without a flush.  Uniform buffers live here.
//! - `StagedDeviceLocal`: a mapped staging buffer plus a device local buffer and a private command
//!   buffer that copies one into the other.  Every `set_data` pays a full round trip to the GPU.
//!   Vertex and index buffers live here.
//!
//! The size is fixed at construction: layout size times element count.

use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

use ash::vk;
use bytemuck::NoUninit;

use crate::context::PassRecorder;
use crate::device::LogicalDevice;
use crate::layout::BufferLayout;
use crate::prelude::*;
use crate::util;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Vertex,
    Index,
    Uniform,
}

impl BufferType {
    pub fn usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferType::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferType::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferType::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        }
    }

    /// Uniforms favor cheap updates.  Everything else favors GPU reads.
    pub fn staged(self) -> bool {
        !matches!(self, BufferType::Uniform)
    }
}

/// One `vk::Buffer` bound to its own memory, mapped when host visible.
pub struct Allocation {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: Option<NonNull<u8>>,
    size: vk::DeviceSize,
    device: Rc<LogicalDevice>,
}

impl Allocation {
    fn new(
        device: &Rc<LogicalDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self, VulkanError> {
        let raw = device.device();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { raw.create_buffer(&buffer_info, None)? };

        // From here on, drop releases whatever has been created.
        let mut allocation = Self {
            buffer,
            memory: vk::DeviceMemory::null(),
            mapped: None,
            size,
            device: device.clone(),
        };

        let mem_req = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            util::find_memory_type_index(&mem_req, device.memory_properties(), properties)?;
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(mem_req.size)
            .memory_type_index(memory_type_index);
        allocation.memory = unsafe { raw.allocate_memory(&alloc_info, None)? };
        unsafe { raw.bind_buffer_memory(buffer, allocation.memory, 0)? };

        if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            let ptr = unsafe {
                raw.map_memory(
                    allocation.memory,
                    0,
                    vk::WHOLE_SIZE,
                    vk::MemoryMapFlags::empty(),
                )?
            };
            allocation.mapped = NonNull::new(ptr.cast::<u8>());
        }

        Ok(allocation)
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    fn write(&self, bytes: &[u8]) -> Result<(), VulkanError> {
        let ptr = self
            .mapped
            .ok_or(VulkanError::Unsupported("writing unmapped memory"))?;
        check_size(self.size as usize, bytes.len())?;
        // SAFETY the mapping spans the whole allocation, which is at least `size` bytes.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) };
        Ok(())
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        let device = self.device.device();
        unsafe {
            if self.mapped.take().is_some() {
                device.unmap_memory(self.memory);
            }
            device.destroy_buffer(self.buffer, None);
            if self.memory != vk::DeviceMemory::null() {
                device.free_memory(self.memory, None);
            }
        }
    }
}

/// Private command objects of a staged buffer.  The copy is recorded once and resubmitted.
pub struct Upload {
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    device: Rc<LogicalDevice>,
}

impl Upload {
    fn new(
        device: &Rc<LogicalDevice>,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<Self, VulkanError> {
        let raw = device.device();
        let pool_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(device.queue.family_index);
        let pool = unsafe { raw.create_command_pool(&pool_info, None)? };

        let mut upload = Self {
            pool,
            command_buffer: vk::CommandBuffer::null(),
            fence: vk::Fence::null(),
            device: device.clone(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        upload.command_buffer = unsafe { raw.allocate_command_buffers(&alloc_info)?[0] };

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            raw.begin_command_buffer(
                upload.command_buffer,
                &vk::CommandBufferBeginInfo::default(),
            )?;
            raw.cmd_copy_buffer(upload.command_buffer, src, dst, &[region]);
            raw.end_command_buffer(upload.command_buffer)?;
        }

        upload.fence = unsafe { raw.create_fence(&vk::FenceCreateInfo::default(), None)? };
        Ok(upload)
    }

    fn submit(&self) -> Result<(), VulkanError> {
        let raw = self.device.device();
        let command_buffers = [self.command_buffer];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe {
            raw.reset_fences(&[self.fence])?;
            raw.queue_submit(self.device.queue.queue, &[submit], self.fence)?;
        }
        Ok(())
    }

    fn wait(&self, timeout: Duration) -> Result<(), VulkanError> {
        let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe {
            self.device
                .device()
                .wait_for_fences(&[self.fence], true, nanos)
        } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::Timeout("staging upload")),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        let device = self.device.device();
        unsafe {
            if self.fence != vk::Fence::null() {
                device.destroy_fence(self.fence, None);
            }
            if self.command_buffer != vk::CommandBuffer::null() {
                device.free_command_buffers(self.pool, &[self.command_buffer]);
            }
            device.destroy_command_pool(self.pool, None);
        }
    }
}

pub enum Residency {
    HostMapped(Allocation),
    // Field order is drop order: command objects before either buffer.
    StagedDeviceLocal {
        upload: Upload,
        local: Allocation,
        staging: Allocation,
    },
}

pub struct Buffer {
    residency: Residency,
    buffer_type: BufferType,
    bind_stage: ShaderStage,
    layout: BufferLayout,
    count: usize,
    size: usize,
    upload_timeout: Duration,
    upload_pending: Cell<bool>,
    device: Rc<LogicalDevice>,
}

impl Buffer {
    /// Allocate a buffer of `layout.size() * count` bytes.  Vertex and index buffers are always
    /// bound for the vertex stage.
    pub fn new(
        device: Rc<LogicalDevice>,
        buffer_type: BufferType,
        bind_stage: ShaderStage,
        layout: BufferLayout,
        count: usize,
        upload_timeout: Duration,
    ) -> Result<Self, VulkanError> {
        let size = buffer_size(layout.size(), count)?;
        let device_size = size as vk::DeviceSize;

        let bind_stage = match buffer_type {
            BufferType::Vertex | BufferType::Index if bind_stage != ShaderStage::Vertex => {
                tracing::debug!(?buffer_type, ?bind_stage, "binding for the vertex stage");
                ShaderStage::Vertex
            }
            _ => bind_stage,
        };

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let residency = if buffer_type.staged() {
            let staging = Allocation::new(
                &device,
                device_size,
                vk::BufferUsageFlags::TRANSFER_SRC,
                host,
            )?;
            let local = Allocation::new(
                &device,
                device_size,
                buffer_type.usage() | vk::BufferUsageFlags::TRANSFER_DST,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            let upload = Upload::new(&device, staging.buffer, local.buffer, device_size)?;
            Residency::StagedDeviceLocal {
                upload,
                local,
                staging,
            }
        } else {
            Residency::HostMapped(Allocation::new(
                &device,
                device_size,
                buffer_type.usage(),
                host,
            )?)
        };

        tracing::debug!(?buffer_type, size, count, "buffer created");
        Ok(Self {
            residency,
            buffer_type,
            bind_stage,
            layout,
            count,
            size,
            upload_timeout,
            upload_pending: Cell::new(false),
            device,
        })
    }

    /// Replace the whole contents.  `data` must be exactly `size()` bytes.  For staged buffers this
    /// blocks until the copy to device local memory completes or the upload timeout expires.
    pub fn set_data<T: NoUninit>(&self, data: &[T]) -> Result<(), VulkanError> {
        let bytes: &[u8] =
            bytemuck::try_cast_slice(data).map_err(|_| VulkanError::SizeMismatch {
                expected: self.size,
                actual: std::mem::size_of_val(data),
            })?;
        check_size(self.size, bytes.len())?;

        match &self.residency {
            Residency::HostMapped(allocation) => allocation.write(bytes),
            Residency::StagedDeviceLocal {
                upload, staging, ..
            } => {
                // A timed out copy may still be reading the staging memory.
                if self.upload_pending.get() {
                    upload.wait(self.upload_timeout)?;
                    self.upload_pending.set(false);
                }
                staging.write(bytes)?;
                upload.submit()?;
                self.upload_pending.set(true);
                upload.wait(self.upload_timeout)?;
                self.upload_pending.set(false);
                Ok(())
            }
        }
    }

    /// The buffer shaders read from.
    pub fn handle(&self) -> vk::Buffer {
        match &self.residency {
            Residency::HostMapped(allocation) => allocation.buffer,
            Residency::StagedDeviceLocal { local, .. } => local.buffer,
        }
    }

    pub fn residency(&self) -> &Residency {
        &self.residency
    }

    /// Bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn element_count(&self) -> usize {
        self.count
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    pub fn bind_stage(&self) -> ShaderStage {
        self.bind_stage
    }

    /// Bind into the recorder's open pass.  Ignored when no pass is open.
    pub fn bind(self: &Rc<Self>, recorder: &mut impl PassRecorder) {
        recorder.bind_buffer(self.clone());
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("device wait before buffer destruction failed: {e}");
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("buffer_type", &self.buffer_type)
            .field("size", &self.size)
            .field("count", &self.count)
            .finish()
    }
}

fn buffer_size(layout_size: u32, count: usize) -> Result<usize, VulkanError> {
    let size = (layout_size as usize)
        .checked_mul(count)
        .ok_or(VulkanError::Unsupported("buffer size overflow"))?;
    if size == 0 {
        return Err(VulkanError::Unsupported("zero sized buffer"));
    }
    Ok(size)
}

fn check_size(expected: usize, actual: usize) -> Result<(), VulkanError> {
    if expected != actual {
        return Err(VulkanError::SizeMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_payload_must_match_size() {
        assert!(check_size(28, 28).is_ok());
        assert!(matches!(
            check_size(28, 24),
            Err(VulkanError::SizeMismatch {
                expected: 28,
                actual: 24
            })
        ));
    }

    #[test]
    fn test_buffer_size() {
        assert_eq!(buffer_size(20, 3).unwrap(), 60);
        assert!(matches!(
            buffer_size(0, 3),
            Err(VulkanError::Unsupported("zero sized buffer"))
        ));
        assert!(matches!(
            buffer_size(20, 0),
            Err(VulkanError::Unsupported("zero sized buffer"))
        ));
        assert!(matches!(
            buffer_size(64, usize::MAX / 2),
            Err(VulkanError::Unsupported("buffer size overflow"))
        ));
    }

    #[test]
    fn test_residency_by_type() {
        assert!(BufferType::Vertex.staged());
        assert!(BufferType::Index.staged());
        assert!(!BufferType::Uniform.staged());
        assert_eq!(
            BufferType::Uniform.usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
    }
}
