// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pipeline
//!
//! Compiles a closed pass into a graphics pipeline against the swapchain's render pass, subpass 0.
//! Viewport, scissor and line width are dynamic and set while recording.  There are no descriptor
//! sets or push constants, so the layout is empty.

use std::rc::Rc;

use ash::vk;

use crate::device::LogicalDevice;
use crate::pass::{PassState, StageBinding};
use crate::prelude::*;
use crate::shader::ENTRY_POINT;

pub const DYNAMIC_STATES: [vk::DynamicState; 3] = [
    vk::DynamicState::LINE_WIDTH,
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
];

pub struct Pipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Rc<LogicalDevice>,
}

impl Pipeline {
    pub fn new(
        device: Rc<LogicalDevice>,
        state: &PassState,
        render_pass: vk::RenderPass,
    ) -> Result<Self, VulkanError> {
        validate_stages(&state.stages)?;

        if state.samples > 1 {
            tracing::warn!(
                samples = state.samples,
                "render pass is single sampled, multisampling ignored"
            );
        }
        if state.depth_testing {
            tracing::warn!("render pass has no depth attachment, depth testing ignored");
        }

        let raw = device.device();
        let layout = unsafe {
            raw.create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)?
        };

        // Owns the layout from here.
        let mut pipeline = Self {
            pipeline: vk::Pipeline::null(),
            layout,
            device: device.clone(),
        };

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = state
            .stages
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage.flags())
                    .module(s.module)
                    .name(ENTRY_POINT)
            })
            .collect();

        let bindings;
        let vertex_input = match &state.vertex {
            Some(vertex) => {
                bindings = [vertex.input.binding];
                vk::PipelineVertexInputStateCreateInfo::default()
                    .vertex_binding_descriptions(&bindings)
                    .vertex_attribute_descriptions(&vertex.input.attributes)
            }
            None => vk::PipelineVertexInputStateCreateInfo::default(),
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(state.topology.into())
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(device.line_width(state.line_width))
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            raw.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, e)| e)?
        };
        pipeline.pipeline = pipelines
            .into_iter()
            .next()
            .ok_or(VulkanError::Ash(vk::Result::ERROR_UNKNOWN))?;

        tracing::debug!(
            stages = stages.len(),
            topology = ?state.topology,
            "pipeline built"
        );
        Ok(pipeline)
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("device wait before pipeline destruction failed: {e}");
        }
        let raw = self.device.device();
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                raw.destroy_pipeline(self.pipeline, None);
            }
            raw.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// A graphics pipeline needs a vertex stage and cannot take a compute stage.
pub fn validate_stages(stages: &[StageBinding]) -> Result<(), VulkanError> {
    if stages.iter().any(|s| s.stage == ShaderStage::Compute) {
        return Err(VulkanError::ComputeStageInGraphicsPass);
    }
    if !stages.iter().any(|s| s.stage == ShaderStage::Vertex) {
        return Err(VulkanError::MissingVertexStage);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn stage(stage: ShaderStage) -> StageBinding {
        StageBinding {
            stage,
            module: vk::ShaderModule::null(),
        }
    }

    #[test]
    fn test_empty_pass_is_rejected() {
        assert!(matches!(
            validate_stages(&[]),
            Err(VulkanError::MissingVertexStage)
        ));
        assert!(matches!(
            validate_stages(&[stage(ShaderStage::Fragment)]),
            Err(VulkanError::MissingVertexStage)
        ));
    }

    #[test]
    fn test_compute_is_rejected() {
        assert!(matches!(
            validate_stages(&[stage(ShaderStage::Vertex), stage(ShaderStage::Compute)]),
            Err(VulkanError::ComputeStageInGraphicsPass)
        ));
    }

    #[test]
    fn test_vertex_alone_or_with_fragment() {
        assert!(validate_stages(&[stage(ShaderStage::Vertex)]).is_ok());
        assert!(validate_stages(&[stage(ShaderStage::Fragment), stage(ShaderStage::Vertex)]).is_ok());
    }

    #[test]
    fn test_dynamic_states() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::LINE_WIDTH));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
    }
}
