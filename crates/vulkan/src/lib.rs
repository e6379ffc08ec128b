// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Vulkan
//!
//! A thin render context over one Vulkan device and one presentable surface.  Applications open a
//! pass, bind shader programs and buffers into it, close it (which compiles a pipeline), and then
//! run and present passes by index.
//!
//! Core types:
//!
//! - `RenderContext`
//!   * `GraphicsDevice`
//!     + `Adapter`
//!   * `Swapchain`
//!   * `Pass` / `Pipeline`
//! - **Pass inputs**
//!   * `ShaderProgram`
//!   * `Buffer` with a `BufferLayout`
//!
//! Everything that holds a native handle also holds the `LogicalDevice` it was created from, so
//! teardown order falls out of ownership.  Dropping the last owner of a device waits for the GPU to
//! go idle before anything is released.

pub mod adapter;
pub mod buffer;
pub mod config;
pub mod context;
pub mod device;
pub mod global;
pub mod instance;
pub mod layout;
pub mod pass;
pub mod pipeline;
pub mod queue;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod util;

use ash::vk;

pub mod prelude {
    pub use super::VulkanError;
    pub use crate::buffer::{Buffer, BufferType};
    pub use crate::config::ContextConfig;
    pub use crate::context::{PassRecorder, RenderContext};
    pub use crate::device::{GraphicsDevice, LogicalDevice};
    pub use crate::layout::{BufferAttribute, BufferDataType, BufferLayout};
    pub use crate::pass::{PrimitiveTopology, ViewportRect};
    pub use crate::shader::{ShaderProgram, ShaderStage};
}

#[derive(thiserror::Error, Debug)]
pub enum VulkanError {
    #[error("Ash: {0}")]
    Ash(#[from] vk::Result),

    #[error("failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle: {0:?}")]
    WindowHandle(raw_window_handle::HandleError),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no Vulkan devices")]
    NoAdapters,

    #[error("adapter index {index} out of range ({count} adapters)")]
    AdapterOutOfRange { index: usize, count: usize },

    #[error("no adapter supports the requested surface format, present mode, and queue")]
    NoSuitableAdapter,

    #[error("no logical device, select an adapter first")]
    NoDevice,

    #[error("no memory type with {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("data is {actual} bytes but the buffer holds {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Timeout: {0}")]
    Timeout(&'static str),

    #[error("pass {0} does not exist")]
    PassOutOfRange(usize),

    #[error("pass {0} has no pipeline")]
    PassNotBuilt(usize),

    #[error("graphics pipeline needs a vertex stage")]
    MissingVertexStage,

    #[error("compute stage bound into a graphics pass")]
    ComputeStageInGraphicsPass,

    #[error("no swapchain image acquired")]
    NoFrameAcquired,

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    #[error("render context not initialized")]
    NotInitialized,
}

// `HandleError` only implements `std::error::Error` with the `std` feature of raw-window-handle.
impl From<raw_window_handle::HandleError> for VulkanError {
    fn from(e: raw_window_handle::HandleError) -> Self {
        VulkanError::WindowHandle(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_window_handle_error_converts() {
        fn handle() -> Result<(), raw_window_handle::HandleError> {
            Err(raw_window_handle::HandleError::Unavailable)
        }
        fn surface() -> Result<(), VulkanError> {
            handle()?;
            Ok(())
        }
        let err = surface().unwrap_err();
        assert!(matches!(
            err,
            VulkanError::WindowHandle(raw_window_handle::HandleError::Unavailable)
        ));
        assert_eq!(err.to_string(), "window handle: Unavailable");
    }
}
