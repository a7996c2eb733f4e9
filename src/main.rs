// Vulkan bring-up demo
//
// Creates a window, boots a Vulkan instance (with validation when enabled),
// selects a device and queue families against the window surface, negotiates
// and creates a swapchain, and builds a minimal graphics pipeline. The
// program then waits for window close or Escape and tears down in reverse
// order. No frames are submitted.

mod backend;
mod config;

use anyhow::Result;
use ash::vk;
use backend::{pipeline, shader, Swapchain, VulkanDevice};
use config::Config;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes},
};

const VERT_SHADER_PATH: &str = "shaders/shader.vert.spv";
const FRAG_SHADER_PATH: &str = "shaders/shader.frag.spv";

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = Config::load();
    log::info!("Starting {}", config.window.title);
    log::info!(
        "Window: {}x{}, validation: {}",
        config.window.width,
        config.window.height,
        config.debug.validation
    );

    let event_loop = EventLoop::new()?;
    // Setup only, no rendering: block until an event arrives
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Application state.
///
/// Field order matters for Drop: the pipeline objects are destroyed
/// explicitly first, then the swapchain, then the device wrapper (logical
/// device, surface, debug messenger, instance).
struct App {
    config: Config,

    window: Option<Arc<Window>>,
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,

    render_pass: Option<vk::RenderPass>,
    pipeline_layout: Option<vk::PipelineLayout>,
    pipeline: Option<vk::Pipeline>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            device: None,
            swapchain: None,
            render_pass: None,
            pipeline_layout: None,
            pipeline: None,
        }
    }

    /// Run the full setup sequence against a freshly created window.
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let device = VulkanDevice::new(window, &self.config.window.title, self.config.debug.validation)?;

        let swapchain = Swapchain::new(device.clone())?;

        let render_pass = pipeline::create_render_pass(&device, swapchain.format)?;

        let vert_shader = shader::load_shader_module(&device, VERT_SHADER_PATH)?;
        let frag_shader = shader::load_shader_module(&device, FRAG_SHADER_PATH)?;

        let pipeline_result = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            swapchain.extent,
            vert_shader,
            frag_shader,
        );

        // Modules are baked into the pipeline; they are not needed afterward
        unsafe {
            device.device.destroy_shader_module(vert_shader, None);
            device.device.destroy_shader_module(frag_shader, None);
        }

        let (graphics_pipeline, pipeline_layout) = pipeline_result?;

        self.device = Some(device);
        self.swapchain = Some(swapchain);
        self.render_pass = Some(render_pass);
        self.pipeline_layout = Some(pipeline_layout);
        self.pipeline = Some(graphics_pipeline);

        log::info!("Vulkan initialized successfully");
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        log::info!("ESC pressed, exiting...");
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(ref device) = self.device {
            let _ = device.wait_idle();

            // Destroy in reverse order of creation
            unsafe {
                if let Some(pipeline) = self.pipeline.take() {
                    device.device.destroy_pipeline(pipeline, None);
                }
                if let Some(layout) = self.pipeline_layout.take() {
                    device.device.destroy_pipeline_layout(layout, None);
                }
                if let Some(render_pass) = self.render_pass.take() {
                    device.device.destroy_render_pass(render_pass, None);
                }
            }

            // Swapchain and device are dropped automatically, in field order
        }

        log::info!("Cleanup complete");
    }
}
