// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Shader Program
//!
//! A compiled SPIR-V module and the stage it runs in.  Programs are immutable once created.  Every
//! program enters at `main`.

use std::path::Path;
use std::rc::Rc;

use ash::vk;

use crate::context::PassRecorder;
use crate::device::LogicalDevice;
use crate::prelude::*;

pub const ENTRY_POINT: &std::ffi::CStr = c"main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}

pub struct ShaderProgram {
    name: String,
    stage: ShaderStage,
    module: vk::ShaderModule,
    device: Rc<LogicalDevice>,
}

impl ShaderProgram {
    /// Read a whole SPIR-V file.  The file must hold a whole number of 32-bit words.
    pub fn from_file(
        device: Rc<LogicalDevice>,
        name: impl Into<String>,
        path: impl AsRef<Path>,
        stage: ShaderStage,
    ) -> Result<Self, VulkanError> {
        let path = path.as_ref();
        let mut file = std::fs::File::open(path)?;
        let words = ash::util::read_spv(&mut file)?;
        tracing::debug!(path = %path.display(), words = words.len(), "read shader");
        Self::from_words(device, name, &words, stage)
    }

    pub fn from_words(
        device: Rc<LogicalDevice>,
        name: impl Into<String>,
        words: &[u32],
        stage: ShaderStage,
    ) -> Result<Self, VulkanError> {
        let module_info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { device.device().create_shader_module(&module_info, None)? };
        Ok(Self {
            name: name.into(),
            stage,
            module,
            device,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn module(&self) -> vk::ShaderModule {
        self.module
    }

    /// Append this program's stage to the recorder's open pass.  Ignored when no pass is open.
    pub fn bind(self: &Rc<Self>, recorder: &mut impl PassRecorder) {
        recorder.bind_shader_program(self.clone());
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device()
                .destroy_shader_module(self.module, None);
        }
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(ShaderStage::Compute.flags(), vk::ShaderStageFlags::COMPUTE);
    }
}
