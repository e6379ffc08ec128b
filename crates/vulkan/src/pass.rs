// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pass
//!
//! State accumulated between `begin_pass` and `end_pass`.  Nothing in here touches the driver: the
//! state only refers to handles, and the context keeps the objects behind them alive.
//!
//! Passes are append-only.  The most recently begun pass receives bindings until it is ended, after
//! which it is only ever run by index.

use ash::vk;
use smallvec::SmallVec;

use crate::VulkanError;
use crate::buffer::BufferType;
use crate::layout::VertexInput;
use crate::shader::ShaderStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl From<PrimitiveTopology> for vk::PrimitiveTopology {
    fn from(topology: PrimitiveTopology) -> Self {
        match topology {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

/// Viewport in framebuffer pixels.  An empty rectangle means the whole render area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn resolve(&self, extent: vk::Extent2D) -> vk::Viewport {
        let rect = if self.is_empty() {
            ViewportRect::new(0.0, 0.0, extent.width as f32, extent.height as f32)
        } else {
            *self
        };
        vk::Viewport {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBinding {
    pub stage: ShaderStage,
    pub module: vk::ShaderModule,
}

#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub buffer: vk::Buffer,
    pub input: VertexInput,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct PassState {
    pub stages: SmallVec<StageBinding, 3>,
    pub vertex: Option<VertexBinding>,
    pub topology: PrimitiveTopology,
    pub line_width: f32,
    pub samples: u32,
    pub render_to_screen: bool,
    pub depth_testing: bool,
    pub clear_color: [f32; 3],
    pub viewport: ViewportRect,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            stages: SmallVec::new(),
            vertex: None,
            topology: PrimitiveTopology::TriangleList,
            line_width: 0.5,
            samples: 1,
            render_to_screen: true,
            depth_testing: false,
            clear_color: [0.0; 3],
            viewport: ViewportRect::default(),
        }
    }
}

impl PassState {
    /// Vertices per draw.  Without a vertex buffer this is a fixed 3, for shaders that generate a
    /// triangle.  A bound vertex buffer replaces the fixed count with its element count.
    pub fn vertex_count(&self) -> u32 {
        self.vertex.as_ref().map_or(3, |v| v.count)
    }

    pub fn clear_value(&self) -> vk::ClearValue {
        let [r, g, b] = self.clear_color;
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [r, g, b, 1.0],
            },
        }
    }
}

/// Pass state plus the objects its handles came from.  `S` is a shader program, `B` a buffer and `P`
/// the pipeline built at `end_pass`.
#[derive(Debug)]
pub struct Pass<P, S, B> {
    // Dropped before the programs and buffer it was built from.
    pub pipeline: Option<P>,
    pub state: PassState,
    programs: SmallVec<S, 3>,
    buffer: Option<B>,
}

impl<P, S, B> Default for Pass<P, S, B> {
    fn default() -> Self {
        Self {
            pipeline: None,
            state: PassState::default(),
            programs: SmallVec::new(),
            buffer: None,
        }
    }
}

impl<P, S, B> Pass<P, S, B> {
    /// One program per stage.  The later binding wins, and `programs` stays index aligned with
    /// `state.stages`.
    pub fn bind_program(&mut self, binding: StageBinding, program: S) {
        match self.state.stages.iter().position(|s| s.stage == binding.stage) {
            Some(i) => {
                self.state.stages[i] = binding;
                self.programs[i] = program;
            }
            None => {
                self.state.stages.push(binding);
                self.programs.push(program);
            }
        }
    }

    /// Only the vertex binding point is wired.  Returns whether `buffer` was kept.
    pub fn bind_buffer(
        &mut self,
        buffer_type: BufferType,
        binding: VertexBinding,
        buffer: B,
    ) -> bool {
        match buffer_type {
            BufferType::Vertex => {
                self.state.vertex = Some(binding);
                self.buffer = Some(buffer);
                true
            }
            BufferType::Index | BufferType::Uniform => false,
        }
    }

    pub fn programs(&self) -> &[S] {
        &self.programs
    }

    pub fn buffer(&self) -> Option<&B> {
        self.buffer.as_ref()
    }
}

impl<P, S, B> PassSequence<Pass<P, S, B>> {
    /// Close the open pass and build its pipeline.  A pass that fails to build is removed, so the
    /// indexes of built passes never change.  `Ok(None)` when no pass was open.
    pub fn end_with(
        &mut self,
        build: impl FnOnce(&PassState) -> Result<P, VulkanError>,
    ) -> Result<Option<usize>, VulkanError> {
        let Some((index, pass)) = self.close() else {
            return Ok(None);
        };
        match build(&pass.state) {
            Ok(pipeline) => {
                pass.pipeline = Some(pipeline);
                Ok(Some(index))
            }
            Err(e) => {
                self.discard(index);
                Err(e)
            }
        }
    }

    /// A pass that can be run.
    pub fn built(&self, index: usize) -> Result<(&P, &PassState), VulkanError> {
        let pass = self.get(index).ok_or(VulkanError::PassOutOfRange(index))?;
        let pipeline = pass
            .pipeline
            .as_ref()
            .ok_or(VulkanError::PassNotBuilt(index))?;
        Ok((pipeline, &pass.state))
    }
}

/// Append-only sequence with at most one open entry, always the most recently begun.
#[derive(Debug)]
pub struct PassSequence<T> {
    passes: Vec<T>,
    open: Option<usize>,
}

impl<T> Default for PassSequence<T> {
    fn default() -> Self {
        Self {
            passes: Vec::new(),
            open: None,
        }
    }
}

impl<T> PassSequence<T> {
    /// Push `pass` and make it the open pass.  A pass left open is abandoned and never built.
    pub fn begin(&mut self, pass: T) -> usize {
        if let Some(abandoned) = self.open {
            tracing::warn!(abandoned, "pass begun before the previous one ended");
        }
        self.passes.push(pass);
        let index = self.passes.len() - 1;
        self.open = Some(index);
        index
    }

    pub fn open_mut(&mut self) -> Option<&mut T> {
        self.open.map(|i| &mut self.passes[i])
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Stop accepting bindings.  Returns the index and entry that was open.
    pub fn close(&mut self) -> Option<(usize, &mut T)> {
        let index = self.open.take()?;
        Some((index, &mut self.passes[index]))
    }

    /// Remove the last entry, if it is `index`.
    pub fn discard(&mut self, index: usize) -> Option<T> {
        if index + 1 != self.passes.len() {
            return None;
        }
        if self.open == Some(index) {
            self.open = None;
        }
        self.passes.pop()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.passes.get(index)
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn clear(&mut self) {
        self.open = None;
        self.passes.clear();
    }
}
