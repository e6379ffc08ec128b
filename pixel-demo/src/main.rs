// Copyright 2026 The PixelMachine Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opens a window and draws one colored triangle through a single render pass every frame.

mod logging;

use ash::vk;
use clap::Parser;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard as kb,
    window::{Fullscreen, Window},
};

use pixel_assets::{AssetDirs, AssetError};
use pixel_vulkan::{global, prelude::*};

#[derive(Parser, Debug)]
struct Args {
    /// Run in fullscreen mode
    #[arg(short = 'f', long = "fullscreen")]
    fullscreen: bool,

    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,

    /// Adapter to try first
    #[arg(short = 'a', long)]
    adapter: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Vulkan(#[from] VulkanError),
    #[error(transparent)]
    Assets(#[from] AssetError),
    #[error("window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

// Clockwise on screen.
const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [0.2, 0.2, 1.0],
    },
];

struct App {
    args: Args,
    window: Option<Window>,
    minimized: bool,
    error: Option<DemoError>,
}

impl App {
    fn setup(&mut self, event_loop: &ActiveEventLoop) -> Result<(), DemoError> {
        let mut attrs = Window::default_attributes().with_title("PixelMachine");
        if self.args.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        // Held by the app before any surface exists, so it outlives the context on every path.
        let window = self.window.insert(event_loop.create_window(attrs)?);
        if self.args.fullscreen {
            window.set_cursor_visible(false);
        }

        let mut config = ContextConfig::from_env();
        config.validation |= self.args.validation;
        if self.args.adapter.is_some() {
            config.adapter = self.args.adapter;
        }
        let size = window.inner_size();
        config.fallback_extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };
        global::initialize(&*window, config)?;

        let assets = AssetDirs::new();
        let vertex_path = assets.find_shader("triangle/vertex")?;
        let fragment_path = assets.find_shader("triangle/fragment")?;

        global::with(|ctx| -> Result<(), VulkanError> {
            let vs = ctx.load_shader("triangle/vertex", &vertex_path, ShaderStage::Vertex)?;
            let fs = ctx.load_shader("triangle/fragment", &fragment_path, ShaderStage::Fragment)?;

            let layout = BufferLayout::new([
                BufferAttribute::new(BufferDataType::Float2, "position"),
                BufferAttribute::new(BufferDataType::Float3, "color"),
            ]);
            let vertices =
                ctx.create_buffer(BufferType::Vertex, ShaderStage::Vertex, layout, TRIANGLE.len())?;
            vertices.set_data(&TRIANGLE)?;

            ctx.begin_pass();
            ctx.set_clear_color([0.02, 0.02, 0.03]);
            ctx.set_line_width(1.0);
            vertices.bind(ctx);
            vs.bind(ctx);
            fs.bind(ctx);
            ctx.end_pass()
        })??;
        Ok(())
    }

    fn draw_frame(&mut self) -> Result<(), VulkanError> {
        global::with(|ctx| {
            ctx.run_pass(0)?;
            ctx.present_frame()
        })?
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: DemoError) {
        tracing::error!("{error}");
        self.error.get_or_insert(error);
        event_loop.exit();
    }

    fn toggle_fullscreen(&self) {
        let Some(win) = self.window.as_ref() else {
            return;
        };
        match win.fullscreen() {
            Some(Fullscreen::Borderless(None)) => {
                win.set_fullscreen(None);
                win.set_cursor_visible(true);
            }
            _ => {
                win.set_fullscreen(Some(Fullscreen::Borderless(None)));
                win.set_cursor_visible(false);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.setup(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if !event.repeat && event.state == winit::event::ElementState::Pressed {
                    match event.physical_key {
                        kb::PhysicalKey::Code(kb::KeyCode::KeyF) => self.toggle_fullscreen(),
                        kb::PhysicalKey::Code(kb::KeyCode::KeyQ)
                        | kb::PhysicalKey::Code(kb::KeyCode::Escape) => event_loop.exit(),
                        _ => {}
                    }
                }
            }
            WindowEvent::Resized(size) => {
                self.minimized = size.width == 0 || size.height == 0;
                if !global::is_initialized() {
                    return;
                }
                if let Err(e) =
                    global::with(|ctx| ctx.resize(size.width, size.height)).and_then(|r| r)
                {
                    self.fail(event_loop, e.into());
                }
            }
            WindowEvent::RedrawRequested => {
                if !self.minimized {
                    if let Err(e) = self.draw_frame() {
                        self.fail(event_loop, e.into());
                        return;
                    }
                }
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            WindowEvent::CloseRequested => event_loop.exit(),
            _ => (),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // The surface must go before the window it was created from.
        global::destroy();
        self.window = None;
    }
}

fn main() -> Result<(), DemoError> {
    logging::init();
    let args = Args::parse();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App {
        args,
        window: None,
        minimized: false,
        error: None,
    };
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
