// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Surface
//!
//! The presentable side of a window.  The window itself is opaque here: only its raw handles are
//! used, once, to create the surface.

use std::rc::Rc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::instance::Instance;
use crate::prelude::*;

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    instance: Rc<Instance>,
}

impl Surface {
    pub fn new<W>(instance: Rc<Instance>, window: &W) -> Result<Self, VulkanError>
    where
        W: HasWindowHandle + HasDisplayHandle,
    {
        let display = window.display_handle()?.as_raw();
        let handle = window.window_handle()?.as_raw();

        let surface = unsafe {
            ash_window::create_surface(&instance.entry, &instance.instance, display, handle, None)?
        };

        Ok(Self { surface, instance })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.instance
                .surface_loader
                .destroy_surface(self.surface, None);
        }
    }
}
