// =============================================================================
// FRAME PACER - Vulkan presentation loop driven by the frame pacing core
// =============================================================================
//
// The window, device and the fixed draw callback live here. Everything that
// has state across frames (frame slots, semaphore recycling, surface
// recreation) lives in the library's PresentationCycle.
//
// FRAME FLOW (one tick per redraw):
// ┌──────────────────────────────────────────────────────────────────────┐
// │  acquire ─> wait slot fence ─> record clear ─> submit ─> present     │
// │                                                                      │
// │  (rebuild surface first if the last frame reported it stale)         │
// └──────────────────────────────────────────────────────────────────────┘
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use frame_pacer::backend::{Swapchain, VulkanDevice};
use frame_pacer::config::Config;
use frame_pacer::{FrameContext, FrameResult, PresentationCycle, TickOutcome};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml; report where it came from once
    // the logger exists
    let (config, source) = Config::load();

    init_logging(&config);
    log::info!("Starting frame pacer");
    source.log();
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Present mode: {}, buffering: {}",
        config.graphics.present_mode,
        config.graphics.buffering
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging at the configured level; RUST_LOG still wins
fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: Field order matters for Drop! The presentation cycle holds the
/// only long-lived reference to the device, whose window surface must be
/// destroyed before the window it was created from.
struct App {
    config: Config,

    cycle: Option<PresentationCycle<VulkanDevice>>,

    window: Option<Arc<Window>>,
    is_fullscreen: bool,
    /// Set when the window has zero area - skip rendering
    is_minimized: bool,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            cycle: None,
            window: None,
            is_fullscreen,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    /// Create the device for this window and the presentation cycle on top
    /// of it. Called once, when the window is created.
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(
            &self.config.window.title,
            enable_validation,
            window,
            self.config.get_present_mode(),
        )?;

        let size = window.inner_size();
        let request = self.config.surface_request(size.width, size.height);
        let cycle = PresentationCycle::new(device, request)
            .context("Failed to create presentation cycle")?;

        self.cycle = Some(cycle);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. Returns whether anything was presented.
    ///
    /// A fatal error has already destroyed the cycle when it gets here.
    fn render_frame(&mut self) -> FrameResult<bool> {
        if self.is_minimized {
            return Ok(false);
        }

        let Some(cycle) = self.cycle.as_mut() else {
            return Ok(false);
        };

        let clear_color = self.config.graphics.clear_color;
        let outcome = cycle.tick(|device, frame| record_clear(device, frame, clear_color))?;

        Ok(outcome != TickOutcome::Skipped)
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(cycle) = self.cycle.as_mut() {
                cycle.request_recreation();
            }
        }
    }

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }

    fn shutdown(&mut self) {
        if let Some(cycle) = self.cycle.as_mut() {
            if let Err(e) = cycle.shutdown() {
                log::error!("Shutdown error: {}", e);
            }
        }
    }
}

// =============================================================================
// DRAW CALLBACK
// =============================================================================

/// Clear the acquired image to a fixed colour and leave it ready to present.
fn record_clear(
    device: &VulkanDevice,
    frame: &FrameContext<'_, Swapchain>,
    color: [f32; 4],
) -> FrameResult<()> {
    let device = &device.device;
    let cmd = frame.command_buffer;
    let image = frame.surface.images[frame.slot];

    let clear_color = vk::ClearColorValue { float32: color };

    // Which parts of the image to affect (all of it)
    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    unsafe {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device.begin_command_buffer(cmd, &begin_info)?;

        // UNDEFINED -> TRANSFER_DST: old contents are discarded
        let barrier_to_transfer = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range);

        // The acquire wait is gated at COLOR_ATTACHMENT_OUTPUT, so the
        // transition has to chain off that stage.
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_transfer],
        );

        device.cmd_clear_color_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &clear_color,
            &[subresource_range],
        );

        // TRANSFER_DST -> PRESENT_SRC
        let barrier_to_present = vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range);

        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier_to_present],
        );

        device.end_command_buffer(cmd)?;
    }

    Ok(())
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

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
                self.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    if let Some(cycle) = self.cycle.as_mut() {
                        cycle.resize(size.width, size.height);
                    }
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) if e.is_transient() => log::warn!("Frame dropped: {}", e),
                Err(e) => {
                    log::error!("Render error, exiting: {}", e);
                    self.shutdown();
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown();
                                event_loop.exit();
                            }
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws; pacing comes from the slot fences.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
