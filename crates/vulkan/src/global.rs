// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Global Context
//!
//! A per-thread slot for applications that want `initialize` / `get` / `destroy` instead of passing
//! a `RenderContext` around.  The context is still an ordinary owned value: the slot only decides
//! where it lives.  Vulkan objects here are not `Send`, so one slot per thread is the honest scope.

use std::cell::RefCell;
use std::rc::Rc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::prelude::*;

thread_local! {
    static CONTEXT: RefCell<Option<RenderContext>> = const { RefCell::new(None) };
}

/// Create the context for `window`.  Does nothing if one already exists.
pub fn initialize<W>(window: &W, config: ContextConfig) -> Result<(), VulkanError>
where
    W: HasWindowHandle + HasDisplayHandle,
{
    if is_initialized() {
        tracing::warn!("render context already initialized");
        return Ok(());
    }
    let context = RenderContext::new(window, config)?;
    CONTEXT.with(|slot| *slot.borrow_mut() = Some(context));
    Ok(())
}

pub fn is_initialized() -> bool {
    CONTEXT.with(|slot| slot.borrow().is_some())
}

/// Run `f` on the context.  Calls must not nest.
pub fn with<R>(f: impl FnOnce(&mut RenderContext) -> R) -> Result<R, VulkanError> {
    CONTEXT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let context = slot.as_mut().ok_or(VulkanError::NotInitialized)?;
        Ok(f(context))
    })
}

/// The context's logical device.
pub fn device() -> Result<Rc<LogicalDevice>, VulkanError> {
    with(|context| context.device().clone())
}

/// Drop the context, releasing passes, swapchain, surface, and device in that order.
pub fn destroy() {
    // Take first so the context drops outside the borrow.
    let context = CONTEXT.with(|slot| slot.borrow_mut().take());
    if context.is_none() {
        tracing::debug!("no render context to destroy");
    }
}
