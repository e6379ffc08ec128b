// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Swapchain
//!
//! A swapchain exists when we are presenting to a surface.  It owns the render pass every pipeline
//! is built against, one view and one framebuffer per presentable image, the semaphore signaled
//! when an acquired image becomes available, and one "render finished" semaphore per image.
//!
//! Recreation (after a resize or an out-of-date report) replaces the images, views, framebuffers
//! and per-image semaphores but keeps the render pass, so pipelines built earlier stay valid.

use std::rc::Rc;

use ash::vk;

use crate::device::LogicalDevice;
use crate::prelude::*;
use crate::util;

/// An image handed out by `Swapchain::acquire_image`.
#[derive(Debug, Clone, Copy)]
pub struct AcquiredImage {
    pub index: u32,
    pub framebuffer: vk::Framebuffer,
    /// The image is usable, but the swapchain should be recreated after presenting it.
    pub suboptimal: bool,
}

pub struct Swapchain {
    loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    render_pass: vk::RenderPass,
    image_available: vk::Semaphore,
    images: SwapchainImages,
    device: Rc<LogicalDevice>,
}

/// Everything rebuilt on recreation.
struct SwapchainImages {
    swapchain: vk::SwapchainKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    render_finished: Vec<vk::Semaphore>,
}

impl Swapchain {
    /// Creates the render pass first, then the swapchain and its per-image objects.
    pub fn new(
        device: Rc<LogicalDevice>,
        surface: vk::SurfaceKHR,
        format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        fallback_extent: vk::Extent2D,
    ) -> Result<Self, VulkanError> {
        let loader = ash::khr::swapchain::Device::new(&device.instance().instance, device.device());
        let render_pass = create_render_pass(device.device(), format.format)?;

        let image_available = match unsafe {
            device
                .device()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        } {
            Ok(s) => s,
            Err(e) => {
                unsafe { device.device().destroy_render_pass(render_pass, None) };
                return Err(e.into());
            }
        };

        let mut swapchain = Self {
            loader,
            surface,
            format,
            present_mode,
            render_pass,
            image_available,
            images: SwapchainImages::empty(),
            device,
        };
        let caps = swapchain.device.adapter.surface_capabilities(surface)?;
        let extent = choose_extent(&caps, fallback_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::Unsupported("zero sized surface"));
        }
        // On error, drop releases whatever was created.
        swapchain.images = swapchain.create_images(&caps, extent, vk::SwapchainKHR::null())?;

        tracing::info!(
            images = swapchain.images.images.len(),
            width = swapchain.images.extent.width,
            height = swapchain.images.extent.height,
            format = ?format.format,
            "swapchain created"
        );
        Ok(swapchain)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.images.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn image_count(&self) -> usize {
        self.images.images.len()
    }

    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available
    }

    pub fn render_finished(&self, index: u32) -> vk::Semaphore {
        self.images.render_finished[index as usize]
    }

    pub fn framebuffer(&self, index: u32) -> vk::Framebuffer {
        self.images.framebuffers[index as usize]
    }

    /// Block until an image is available.  `None` means the swapchain is out of date and must be
    /// recreated before anything can be acquired.
    pub fn acquire_image(&self) -> Result<Option<AcquiredImage>, VulkanError> {
        // A failed recreation leaves nothing to acquire from.
        if self.images.swapchain == vk::SwapchainKHR::null() {
            return Ok(None);
        }
        let acquired = unsafe {
            self.loader.acquire_next_image(
                self.images.swapchain,
                u64::MAX,
                self.image_available,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, suboptimal)) => Ok(Some(AcquiredImage {
                index,
                framebuffer: self.images.framebuffers[index as usize],
                suboptimal,
            })),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue image `index` for presentation after its render finished semaphore.  Returns `true`
    /// when the swapchain should be recreated.
    pub fn present(&self, queue: vk::Queue, index: u32) -> Result<bool, VulkanError> {
        let wait = [self.render_finished(index)];
        let swapchains = [self.images.swapchain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild images, views, framebuffers and per-image semaphores for the current surface size.
    /// Returns `false` and keeps the current swapchain while the surface has no area.
    pub fn recreate(&mut self, fallback_extent: vk::Extent2D) -> Result<bool, VulkanError> {
        let caps = self.device.adapter.surface_capabilities(self.surface)?;
        let extent = choose_extent(&caps, fallback_extent);
        if extent.width == 0 || extent.height == 0 {
            tracing::debug!("surface has no area, keeping swapchain");
            return Ok(false);
        }

        self.device.wait_idle()?;
        let mut old = std::mem::replace(&mut self.images, SwapchainImages::empty());
        let created = self.create_images(&caps, extent, old.swapchain);
        old.destroy(self.device.device(), &self.loader);

        self.images = created?;
        tracing::info!(
            width = extent.width,
            height = extent.height,
            "swapchain recreated"
        );
        Ok(true)
    }

    fn create_images(
        &self,
        caps: &vk::SurfaceCapabilitiesKHR,
        extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<SwapchainImages, VulkanError> {
        let mut images = SwapchainImages::empty();
        images.extent = extent;
        if let Err(e) = images.create(self, caps, old_swapchain) {
            images.destroy(self.device.device(), &self.loader);
            return Err(e);
        }
        Ok(images)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let device = self.device.device();
        unsafe {
            if let Err(e) = device.device_wait_idle() {
                tracing::error!("device wait before swapchain destruction failed: {e}");
            }
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
            }
        }
        self.images.destroy(device, &self.loader);
        unsafe {
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
            }
        }
    }
}

impl SwapchainImages {
    fn empty() -> Self {
        Self {
            swapchain: vk::SwapchainKHR::null(),
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            render_finished: Vec::new(),
        }
    }

    fn create(
        &mut self,
        owner: &Swapchain,
        caps: &vk::SurfaceCapabilitiesKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<(), VulkanError> {
        let device = owner.device.device();

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(owner.surface)
            .min_image_count(image_count(caps))
            .image_format(owner.format.format)
            .image_color_space(owner.format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(pick_alpha(caps))
            .present_mode(owner.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        self.swapchain = unsafe { owner.loader.create_swapchain(&swapchain_info, None)? };
        self.images = unsafe { owner.loader.get_swapchain_images(self.swapchain)? };

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(owner.format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(util::color_subresource_range());
            self.views
                .push(unsafe { device.create_image_view(&view_info, None)? });
        }

        for &view in &self.views {
            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(owner.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            self.framebuffers
                .push(unsafe { device.create_framebuffer(&framebuffer_info, None)? });
        }

        for _ in &self.images {
            self.render_finished.push(unsafe {
                device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            });
        }
        Ok(())
    }

    /// Semaphores, framebuffers, views, then the swapchain.  Null handles are skipped.
    fn destroy(&mut self, device: &ash::Device, loader: &ash::khr::swapchain::Device) {
        unsafe {
            for semaphore in self.render_finished.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            for view in self.views.drain(..) {
                device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
        }
        self.images.clear();
    }
}

/// Single color attachment cleared on load and stored, transitioned from undefined to present,
/// one subpass, and one external dependency on color attachment output.
fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass, VulkanError> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];

    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    Ok(unsafe { device.create_render_pass(&render_pass_info, None)? })
}

/// One more than the minimum, within the maximum when the surface has one.
fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, fallback: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: fallback
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: fallback
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn pick_alpha(surface_caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|alpha| surface_caps.supported_composite_alpha.contains(*alpha))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

#[cfg(test)]
mod test {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_image_count_is_min_plus_one() {
        assert_eq!(image_count(&caps(2, 8)), 3);
        assert_eq!(image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn test_image_count_clamped_to_max() {
        assert_eq!(image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn test_extent_prefers_surface() {
        let fallback = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(
            choose_extent(&caps(2, 3), fallback),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn test_extent_fallback_clamped() {
        let mut caps = caps(2, 3);
        caps.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        let fallback = vk::Extent2D {
            width: 10_000,
            height: 720,
        };
        assert_eq!(
            choose_extent(&caps, fallback),
            vk::Extent2D {
                width: 4096,
                height: 720
            }
        );
    }

    #[test]
    fn test_alpha_preference() {
        let mut caps = caps(2, 3);
        caps.supported_composite_alpha =
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(pick_alpha(&caps), vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED);

        caps.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::empty();
        assert_eq!(pick_alpha(&caps), vk::CompositeAlphaFlagsKHR::INHERIT);
    }
}
