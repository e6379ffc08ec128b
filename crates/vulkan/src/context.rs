// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Render Context
//!
//! Owns the device, the surface, the swapchain and the sequence of passes.  A pass is opened with
//! `begin_pass`, receives shader programs, buffers and fixed function settings, and is compiled
//! into a pipeline by `end_pass`.  Built passes are run by index:
//!
//! ```text
//! run_pass(i) -> wait for the previous submission -> acquire -> record -> submit
//! present_frame() -> present the acquired image
//! ```
//!
//! There is one command buffer and one fence, so at most one submission is in flight.  Advisory
//! calls (`bind_*`, `set_*`, and `end_pass`) made with no open pass are ignored.

use std::rc::Rc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::adapter::SurfaceRequirements;
use crate::device::{GraphicsDevice, LogicalDevice};
use crate::pass::{Pass, PassSequence, PassState, StageBinding, VertexBinding, ViewportRect};
use crate::pipeline::Pipeline;
use crate::prelude::*;
use crate::surface::Surface;
use crate::swapchain::Swapchain;

/// Binding target for shader programs, buffers, and pass settings.
pub trait PassRecorder {
    fn begin_pass(&mut self);

    /// The pass receiving bindings, if one is open.
    fn open_pass(&mut self) -> Option<&mut PassState>;

    fn bind_shader_program(&mut self, program: Rc<ShaderProgram>);

    fn bind_buffer(&mut self, buffer: Rc<Buffer>);

    /// Compile the open pass.  A pass that fails to build is removed.
    fn end_pass(&mut self) -> Result<(), VulkanError>;

    fn set_primitive_type(&mut self, topology: PrimitiveTopology) {
        if let Some(pass) = self.open_pass() {
            pass.topology = topology;
        }
    }

    fn set_line_width(&mut self, width: f32) {
        if let Some(pass) = self.open_pass() {
            pass.line_width = width;
        }
    }

    fn set_multisampling(&mut self, samples: u32) {
        if let Some(pass) = self.open_pass() {
            pass.samples = samples.max(1);
        }
    }

    fn set_depth_testing(&mut self, enabled: bool) {
        if let Some(pass) = self.open_pass() {
            pass.depth_testing = enabled;
        }
    }

    fn set_clear_color(&mut self, rgb: [f32; 3]) {
        if let Some(pass) = self.open_pass() {
            pass.clear_color = rgb;
        }
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        if let Some(pass) = self.open_pass() {
            pass.viewport = viewport;
        }
    }

    fn set_render_to_screen(&mut self, enabled: bool) {
        if let Some(pass) = self.open_pass() {
            pass.render_to_screen = enabled;
        }
    }
}

type ContextPass = Pass<Pipeline, Rc<ShaderProgram>, Rc<Buffer>>;

/// Everything `run_pass` needs, copied out of a pass.
#[derive(Clone, Copy)]
struct DrawCommand {
    pipeline: vk::Pipeline,
    vertex_buffer: Option<vk::Buffer>,
    vertex_count: u32,
    line_width: f32,
    viewport: ViewportRect,
    clear: vk::ClearValue,
    render_to_screen: bool,
}

/// A swapchain image held between acquisition and presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Acquired {
    image: u32,
    /// Work targeting the image has been submitted and signals its render finished semaphore.
    submitted: bool,
}

/// Which swapchain image is held, and what the next submission must wait on.
#[derive(Debug, Default)]
struct FrameState {
    acquired: Option<Acquired>,
}

impl FrameState {
    /// The held image, or a new one from `acquire`.
    fn target(
        &mut self,
        acquire: impl FnOnce() -> Result<u32, VulkanError>,
    ) -> Result<Acquired, VulkanError> {
        let acquired = match self.acquired {
            Some(acquired) => acquired,
            None => Acquired {
                image: acquire()?,
                submitted: false,
            },
        };
        self.acquired = Some(acquired);
        Ok(acquired)
    }

    /// The first submission for an image waits for it to become available.  A re-run consumes and
    /// re-signals the render finished semaphore of the earlier submission instead.
    fn wait_semaphore(
        acquired: Acquired,
        image_available: vk::Semaphore,
        render_finished: vk::Semaphore,
    ) -> vk::Semaphore {
        if acquired.submitted {
            render_finished
        } else {
            image_available
        }
    }

    fn submitted(&mut self, image: u32) {
        self.acquired = Some(Acquired {
            image,
            submitted: true,
        });
    }

    /// Release the image for presentation.  Only submitted images can be presented.
    fn present(&mut self) -> Result<u32, VulkanError> {
        match self.acquired {
            Some(Acquired {
                image,
                submitted: true,
            }) => {
                self.acquired = None;
                Ok(image)
            }
            _ => Err(VulkanError::NoFrameAcquired),
        }
    }

    fn is_held(&self) -> bool {
        self.acquired.is_some()
    }
}

/// Reset the fence and submit.  When submission fails the fence is renewed in the signaled state,
/// since nothing would ever signal the reset one.
fn fenced_submit(
    reset: impl FnOnce() -> Result<(), vk::Result>,
    submit: impl FnOnce() -> Result<(), vk::Result>,
    renew: impl FnOnce() -> Result<(), VulkanError>,
) -> Result<(), VulkanError> {
    reset()?;
    if let Err(e) = submit() {
        renew()?;
        return Err(e.into());
    }
    Ok(())
}

/// The single command buffer and its completion fence.
struct Frame {
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    device: Rc<LogicalDevice>,
}

impl Frame {
    fn new(device: &Rc<LogicalDevice>) -> Result<Self, VulkanError> {
        let raw = device.device();
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue.family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { raw.create_command_pool(&pool_info, None)? };

        let mut frame = Self {
            pool,
            command_buffer: vk::CommandBuffer::null(),
            fence: vk::Fence::null(),
            device: device.clone(),
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        frame.command_buffer = unsafe { raw.allocate_command_buffers(&alloc_info)?[0] };

        frame.fence = Self::signaled_fence(raw)?;
        Ok(frame)
    }

    // Signaled so the first wait returns immediately.
    fn signaled_fence(raw: &ash::Device) -> Result<vk::Fence, VulkanError> {
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        Ok(unsafe { raw.create_fence(&fence_info, None)? })
    }

    /// Swap in a signaled fence for one that was reset but never submitted.
    fn renew_fence(&mut self) -> Result<(), VulkanError> {
        let raw = self.device.device();
        let fence = Self::signaled_fence(raw)?;
        unsafe { raw.destroy_fence(self.fence, None) };
        self.fence = fence;
        Ok(())
    }

    fn wait(&self) -> Result<(), VulkanError> {
        unsafe {
            self.device
                .device()
                .wait_for_fences(&[self.fence], true, u64::MAX)?
        };
        Ok(())
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let raw = self.device.device();
        unsafe {
            if self.fence != vk::Fence::null() {
                raw.destroy_fence(self.fence, None);
            }
            if self.command_buffer != vk::CommandBuffer::null() {
                raw.free_command_buffers(self.pool, &[self.command_buffer]);
            }
            raw.destroy_command_pool(self.pool, None);
        }
    }
}

pub struct RenderContext {
    // Field order is teardown order.
    passes: PassSequence<ContextPass>,
    frame: Frame,
    swapchain: Swapchain,
    surface: Surface,
    device: Rc<LogicalDevice>,
    graphics: GraphicsDevice,

    frame_state: FrameState,
    /// Recreate the swapchain at the next opportunity.
    stale: bool,
    extent_hint: vk::Extent2D,
    config: ContextConfig,
}

impl RenderContext {
    /// Create the instance, a surface for `window`, a logical device on the first adapter that can
    /// present to it, and the swapchain.
    pub fn new<W>(window: &W, config: ContextConfig) -> Result<Self, VulkanError>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window.display_handle()?.as_raw();
        let mut graphics = GraphicsDevice::new(&config, Some(display))?;
        let surface = Surface::new(graphics.instance().clone(), window)?;

        let requirements = SurfaceRequirements {
            surface: surface.surface,
            format: config.surface_format,
            present_mode: config.present_mode,
        };
        graphics.select_first_suitable(config.adapter, Some(&requirements))?;
        let device = graphics.logical()?.clone();

        let swapchain = Swapchain::new(
            device.clone(),
            surface.surface,
            config.surface_format,
            config.present_mode,
            config.fallback_extent,
        )?;
        let frame = Frame::new(&device)?;

        Ok(Self {
            passes: PassSequence::default(),
            frame,
            swapchain,
            surface,
            device,
            graphics,
            frame_state: FrameState::default(),
            stale: false,
            extent_hint: config.fallback_extent,
            config,
        })
    }

    pub fn device(&self) -> &Rc<LogicalDevice> {
        &self.device
    }

    /// Adapter enumeration and introspection.
    pub fn graphics(&self) -> &GraphicsDevice {
        &self.graphics
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Create a buffer on this context's device with the configured upload timeout.
    pub fn create_buffer(
        &self,
        buffer_type: BufferType,
        bind_stage: ShaderStage,
        layout: BufferLayout,
        count: usize,
    ) -> Result<Rc<Buffer>, VulkanError> {
        Ok(Rc::new(Buffer::new(
            self.device.clone(),
            buffer_type,
            bind_stage,
            layout,
            count,
            self.config.upload_timeout,
        )?))
    }

    /// Load a SPIR-V file as a program on this context's device.
    pub fn load_shader(
        &self,
        name: &str,
        path: impl AsRef<std::path::Path>,
        stage: ShaderStage,
    ) -> Result<Rc<ShaderProgram>, VulkanError> {
        Ok(Rc::new(ShaderProgram::from_file(
            self.device.clone(),
            name,
            path,
            stage,
        )?))
    }

    /// Record, submit, and leave the target image acquired for `present_frame`.  Blocks until the
    /// previous submission completes and an image is available.
    pub fn run_pass(&mut self, index: usize) -> Result<(), VulkanError> {
        let command = self.draw_command(index)?;
        if !command.render_to_screen {
            return Err(VulkanError::Unsupported("offscreen pass targets"));
        }

        self.frame.wait()?;

        let mut frame_state = std::mem::take(&mut self.frame_state);
        let target = frame_state.target(|| self.acquire());
        self.frame_state = frame_state;
        let acquired = target?;
        let image = acquired.image;

        self.record(&command, image)?;

        let render_finished = self.swapchain.render_finished(image);
        let wait = [FrameState::wait_semaphore(
            acquired,
            self.swapchain.image_available(),
            render_finished,
        )];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal = [render_finished];
        let command_buffers = [self.frame.command_buffer];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal);

        let raw = self.device.device();
        let queue = self.device.queue.queue;
        let fence = self.frame.fence;
        let frame = &mut self.frame;
        fenced_submit(
            || unsafe { raw.reset_fences(&[fence]) },
            || unsafe { raw.queue_submit(queue, &[submit], fence) },
            || frame.renew_fence(),
        )?;
        self.frame_state.submitted(image);
        tracing::trace!(pass = index, image, "submitted");
        Ok(())
    }

    /// Present the image `run_pass` rendered to.
    pub fn present_frame(&mut self) -> Result<(), VulkanError> {
        let image = self.frame_state.present()?;
        let stale = self.swapchain.present(self.device.queue.queue, image)?;
        if stale || self.stale {
            self.stale = true;
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// The surface changed size.  Recreation waits until no image is acquired.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), VulkanError> {
        self.extent_hint = vk::Extent2D { width, height };
        self.stale = true;
        if !self.frame_state.is_held() {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    fn recreate_swapchain(&mut self) -> Result<(), VulkanError> {
        if self.swapchain.recreate(self.extent_hint)? {
            self.stale = false;
        }
        Ok(())
    }

    fn acquire(&mut self) -> Result<u32, VulkanError> {
        if self.stale {
            self.recreate_swapchain()?;
        }
        for _ in 0..2 {
            match self.swapchain.acquire_image()? {
                Some(acquired) => {
                    if acquired.suboptimal {
                        self.stale = true;
                    }
                    return Ok(acquired.index);
                }
                None => {
                    self.stale = true;
                    self.recreate_swapchain()?;
                }
            }
        }
        Err(VulkanError::Ash(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }

    fn draw_command(&self, index: usize) -> Result<DrawCommand, VulkanError> {
        let (pipeline, state) = self.passes.built(index)?;

        Ok(DrawCommand {
            pipeline: pipeline.handle(),
            vertex_buffer: state.vertex.as_ref().map(|v| v.buffer),
            vertex_count: state.vertex_count(),
            line_width: self.device.line_width(state.line_width),
            viewport: state.viewport,
            clear: state.clear_value(),
            render_to_screen: state.render_to_screen,
        })
    }

    fn record(&self, command: &DrawCommand, image: u32) -> Result<(), VulkanError> {
        let raw = self.device.device();
        let cb = self.frame.command_buffer;
        let extent = self.swapchain.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let clear_values = [command.clear];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(self.swapchain.framebuffer(image))
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            raw.reset_command_buffer(cb, vk::CommandBufferResetFlags::empty())?;
            raw.begin_command_buffer(cb, &begin_info)?;
            raw.cmd_begin_render_pass(cb, &render_pass_info, vk::SubpassContents::INLINE);
            raw.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, command.pipeline);
            if let Some(buffer) = command.vertex_buffer {
                raw.cmd_bind_vertex_buffers(cb, 0, &[buffer], &[0]);
            }
            raw.cmd_set_viewport(cb, 0, &[command.viewport.resolve(extent)]);
            raw.cmd_set_scissor(cb, 0, &[render_area]);
            raw.cmd_set_line_width(cb, command.line_width);
            raw.cmd_draw(cb, command.vertex_count, 1, 0, 0);
            raw.cmd_end_render_pass(cb);
            raw.end_command_buffer(cb)?;
        }
        Ok(())
    }
}

impl PassRecorder for RenderContext {
    fn begin_pass(&mut self) {
        let index = self.passes.begin(Pass::default());
        tracing::debug!(pass = index, "pass begun");
    }

    fn open_pass(&mut self) -> Option<&mut PassState> {
        self.passes.open_mut().map(|pass| &mut pass.state)
    }

    fn bind_shader_program(&mut self, program: Rc<ShaderProgram>) {
        let Some(pass) = self.passes.open_mut() else {
            tracing::debug!(program = program.name(), "no open pass, program ignored");
            return;
        };
        let binding = StageBinding {
            stage: program.stage(),
            module: program.module(),
        };
        pass.bind_program(binding, program);
    }

    fn bind_buffer(&mut self, buffer: Rc<Buffer>) {
        let Some(pass) = self.passes.open_mut() else {
            tracing::debug!("no open pass, buffer ignored");
            return;
        };
        let buffer_type = buffer.buffer_type();
        let binding = VertexBinding {
            buffer: buffer.handle(),
            input: buffer.layout().vertex_input(0),
            count: buffer.element_count() as u32,
        };
        if !pass.bind_buffer(buffer_type, binding, buffer) {
            tracing::debug!(?buffer_type, "binding point not wired, buffer ignored");
        }
    }

    fn end_pass(&mut self) -> Result<(), VulkanError> {
        let device = self.device.clone();
        let render_pass = self.swapchain.render_pass();
        let built = self.passes.end_with(|state: &PassState| {
            if !state.render_to_screen {
                return Err(VulkanError::Unsupported("offscreen pass targets"));
            }
            Pipeline::new(device, state, render_pass)
        })?;
        match built {
            Some(index) => tracing::debug!(pass = index, "pass built"),
            None => tracing::debug!("no open pass to end"),
        }
        Ok(())
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("device wait before context destruction failed: {e}");
        }
        self.passes.clear();
        tracing::debug!("render context destroyed");
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use ash::vk::Handle;

    use super::*;

    fn semaphore(raw: u64) -> vk::Semaphore {
        vk::Semaphore::from_raw(raw)
    }

    #[test]
    fn test_rerun_waits_on_render_finished() {
        let available = semaphore(1);
        let finished = semaphore(2);
        let mut state = FrameState::default();

        let first = state.target(|| Ok(4)).unwrap();
        assert_eq!(FrameState::wait_semaphore(first, available, finished), available);
        state.submitted(first.image);

        // Re-running before present keeps the image and never acquires again.
        let again = state
            .target(|| panic!("image acquired twice"))
            .unwrap();
        assert_eq!(again.image, 4);
        assert_eq!(FrameState::wait_semaphore(again, available, finished), finished);
    }

    #[test]
    fn test_present_requires_submission() {
        let mut state = FrameState::default();
        assert!(matches!(state.present(), Err(VulkanError::NoFrameAcquired)));

        state.target(|| Ok(0)).unwrap();
        assert!(matches!(state.present(), Err(VulkanError::NoFrameAcquired)));
        assert!(state.is_held());

        state.submitted(0);
        assert_eq!(state.present().unwrap(), 0);
        assert!(!state.is_held());
    }

    #[test]
    fn test_failed_acquire_holds_nothing() {
        let mut state = FrameState::default();
        let result = state.target(|| Err(VulkanError::Ash(vk::Result::ERROR_OUT_OF_DATE_KHR)));
        assert!(result.is_err());
        assert!(!state.is_held());
    }

    #[test]
    fn test_frame_cycles_reuse_sync_objects() {
        let available = semaphore(1);
        let finished = [semaphore(10), semaphore(11), semaphore(12)];
        let acquires = Cell::new(0u32);
        let mut state = FrameState::default();
        let mut waited = Vec::new();

        for cycle in 0..30u32 {
            let runs = 1 + cycle % 3;
            for _ in 0..runs {
                let target = state
                    .target(|| {
                        acquires.set(acquires.get() + 1);
                        Ok(cycle % 3)
                    })
                    .unwrap();
                let image = target.image as usize;
                waited.push(FrameState::wait_semaphore(target, available, finished[image]));
                state.submitted(target.image);
            }
            assert_eq!(state.present().unwrap(), cycle % 3);
        }

        // One acquisition per presented frame, and only semaphores made with the swapchain.
        assert_eq!(acquires.get(), 30);
        assert!(!state.is_held());
        assert!(
            waited
                .iter()
                .all(|s| *s == available || finished.contains(s))
        );
        assert_eq!(waited.iter().filter(|s| **s == available).count(), 30);
    }

    #[test]
    fn test_failed_submit_renews_fence() {
        let renewed = Cell::new(false);
        let result = fenced_submit(
            || Ok(()),
            || Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            || {
                renewed.set(true);
                Ok(())
            },
        );
        assert!(matches!(
            result,
            Err(VulkanError::Ash(vk::Result::ERROR_OUT_OF_HOST_MEMORY))
        ));
        assert!(renewed.get());
    }

    #[test]
    fn test_submit_keeps_fence() {
        let renewed = Cell::new(false);
        fenced_submit(
            || Ok(()),
            || Ok(()),
            || {
                renewed.set(true);
                Ok(())
            },
        )
        .unwrap();
        assert!(!renewed.get());

        // A failed reset never reaches submission.
        let result = fenced_submit(
            || Err(vk::Result::ERROR_DEVICE_LOST),
            || panic!("submitted after a failed reset"),
            || Ok(()),
        );
        assert!(matches!(result, Err(VulkanError::Ash(vk::Result::ERROR_DEVICE_LOST))));
    }
}
