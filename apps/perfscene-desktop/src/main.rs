use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use egui::Context as EguiContext;
use glam::Vec3;
use perfscene_frame::{FrameDriver, FrameScheduler, RenderContext, Spin};
use perfscene_instancing::ScatterPolicy;
use perfscene_render::RenderInfo;
use perfscene_render_wgpu::{OrbitCamera, SurfaceFrame, WgpuRenderer};
use perfscene_scene::{DemoConfig, DemoScene, DrawStrategy, RendererConfig, build_demo_scene};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Rotation rate of the reference torus knot, radians per second.
const KNOT_SPIN_RATE: f32 = 0.1;

#[derive(Parser)]
#[command(name = "perfscene-desktop", about = "Instanced rendering performance demo")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML demo configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// How the boxes are drawn: naive, shared, merged or instanced
    #[arg(long)]
    strategy: Option<DrawStrategy>,

    /// Number of boxes
    #[arg(long)]
    count: Option<usize>,

    /// Scatter seed; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Add the cube, torus knot, sphere and floor
    #[arg(long)]
    reference_meshes: bool,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Add the vertex-displaced plane
    #[arg(long)]
    displaced_plane: bool,

    /// MSAA samples per pixel; 1 turns antialiasing off
    #[arg(long)]
    msaa: Option<u32>,
}

impl Cli {
    fn demo_config(&self) -> Result<DemoConfig> {
        let mut config = match &self.config {
            Some(path) => DemoConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => DemoConfig::default(),
        };
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(count) = self.count {
            config.batch.count = count;
        }
        if self.seed.is_some() {
            config.batch.seed = self.seed;
        }
        config.show_reference_meshes |= self.reference_meshes;
        config.renderer.vsync &= !self.no_vsync;
        config.displaced_plane.enabled |= self.displaced_plane;
        if let Some(samples) = self.msaa {
            config.renderer.msaa_samples = samples;
        }
        Ok(config)
    }
}

/// Schedules the next tick as a window redraw.
struct WindowScheduler<'a>(&'a Window);

impl FrameScheduler for WindowScheduler<'_> {
    fn request_next_frame(&mut self) {
        self.0.request_redraw();
    }
}

/// What the window must do after a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    None,
    Redraw,
    Exit,
}

/// Application state.
struct AppState {
    config: DemoConfig,
    demo: DemoScene,
    camera: OrbitCamera,
    driver: FrameDriver,
    last_info: Option<RenderInfo>,
    show_overlay: bool,
    dragging: bool,
}

impl AppState {
    fn new(config: DemoConfig) -> Result<Self> {
        let demo = build_demo_scene(&config)?;
        let camera = OrbitCamera::from_config(&config.camera, 16.0 / 9.0);

        let mut driver = FrameDriver::default();
        if let Some(knot) = demo.spinner {
            driver.add_spin(Spin::object(knot, Vec3::Y, KNOT_SPIN_RATE));
        }
        if let Some(batch) = demo.population.batch {
            if config.batch.spin_rate != 0.0 {
                driver.add_spin(Spin::batch(batch, Vec3::Y, config.batch.spin_rate));
            }
        }

        tracing::info!(
            strategy = %config.strategy,
            objects = demo.scene.object_count(),
            batches = demo.scene.batch_count(),
            instances = demo.scene.instance_count(),
            "scene ready"
        );

        Ok(Self {
            config,
            demo,
            camera,
            driver,
            last_info: None,
            show_overlay: true,
            dragging: false,
        })
    }

    /// Apply a key press. Anything that changes the picture asks for a
    /// redraw, so it shows even while the driver is halted.
    fn handle_key(&mut self, key: KeyCode) -> KeyAction {
        match key {
            KeyCode::F1 => {
                self.show_overlay = !self.show_overlay;
                KeyAction::Redraw
            }
            KeyCode::F3 => {
                match &self.last_info {
                    Some(info) => tracing::info!(%info, fps = self.driver.stats().fps(), "renderer info"),
                    None => tracing::info!("no frame rendered yet"),
                }
                KeyAction::None
            }
            KeyCode::Space => {
                if self.driver.is_halted() {
                    self.driver.resume();
                    KeyAction::Redraw
                } else {
                    self.driver.halt();
                    KeyAction::None
                }
            }
            KeyCode::KeyR => {
                self.rescatter();
                KeyAction::Redraw
            }
            KeyCode::KeyU => {
                self.demo.scene.request_shadow_update();
                KeyAction::Redraw
            }
            KeyCode::Escape => {
                self.driver.halt();
                KeyAction::Exit
            }
            _ => KeyAction::None,
        }
    }

    /// Move every instance of the batch to a fresh random spot.
    fn rescatter(&mut self) {
        let Some(id) = self.demo.population.batch else {
            tracing::info!(strategy = %self.config.strategy, "only instanced boxes can be rescattered");
            return;
        };
        let policy = ScatterPolicy::cube(self.config.batch.extent);
        if let Some(batch) = self.demo.scene.batch_mut(id) {
            match batch.rescatter(&policy, None) {
                Ok(()) => tracing::info!(instances = batch.len(), "boxes rescattered"),
                Err(e) => tracing::error!("rescatter failed: {e}"),
            }
        }
    }

    fn draw_ui(&self, ctx: &EguiContext) {
        if !self.show_overlay {
            return;
        }
        let stats = self.driver.stats();

        egui::Window::new("Performance")
            .anchor(egui::Align2::LEFT_TOP, [8.0, 8.0])
            .resizable(false)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.heading(format!("{:.0} FPS", stats.fps()));
                ui.label(format!(
                    "Frame: {}  CPU: {:.2} ms",
                    stats.frames(),
                    stats.frame_time().as_secs_f64() * 1000.0
                ));
                ui.separator();
                ui.label(format!(
                    "Strategy: {}  Boxes: {}",
                    self.config.strategy, self.config.batch.count
                ));
                if let Some(info) = &self.last_info {
                    ui.label(format!(
                        "Draw calls: {} (+{} shadow)",
                        info.draw_calls, info.shadow_draw_calls
                    ));
                    ui.label(format!("Triangles: {}", info.triangles));
                    ui.label(format!("Instances: {}", info.instances));
                    ui.label(format!(
                        "Geometries: {}  Materials: {}",
                        info.geometries, info.materials
                    ));
                }
                if self.driver.is_halted() {
                    ui.colored_label(egui::Color32::YELLOW, "Paused");
                }
                ui.separator();
                ui.small("Drag: orbit | Wheel: zoom | Space: pause | R: rescatter");
                ui.small("U: redraw shadows | F1: overlay | F3: log info");
            });
    }
}

/// Window-bound GPU state, created on resume.
struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    renderer: WgpuRenderer,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Gpu {
    fn new(window: Arc<Window>, egui_ctx: &EguiContext, settings: &RendererConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("create surface")?;

        let power_preference = if settings.high_performance {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::LowPower
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow!("no suitable GPU adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("perfscene_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("create device")?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if settings.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut renderer = WgpuRenderer::new(
            &device,
            surface_format,
            config.width,
            config.height,
            settings.msaa_samples,
        );
        renderer.set_clear_color(settings.clear_color);

        let egui_winit = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        tracing::info!(
            backend = adapter.get_info().backend.to_str(),
            adapter = %adapter.get_info().name,
            vsync = settings.vsync,
            msaa = renderer.sample_count(),
            "GPU initialized"
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            renderer,
            egui_winit,
            egui_renderer,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.renderer
            .resize(&self.device, self.config.width, self.config.height);
    }

    /// Paint the overlay on top of the frame already in `view`.
    fn paint_overlay(&mut self, egui_ctx: &EguiContext, full_output: egui::FullOutput, view: &wgpu::TextureView) {
        let paint_jobs = egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, image_delta);
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });
        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    ..Default::default()
                })
                .forget_lifetime();
            self.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }
    }
}

struct GpuApp {
    state: AppState,
    window: Option<Arc<Window>>,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
}

impl GpuApp {
    fn new(state: AppState) -> Self {
        Self {
            state,
            window: None,
            gpu: None,
            egui_ctx: EguiContext::default(),
        }
    }

    /// One frame driver tick plus the overlay.
    fn redraw(&mut self) {
        let (Some(window), Some(gpu)) = (&self.window, &mut self.gpu) else {
            return;
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(e) => {
                if matches!(e, wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) {
                    gpu.surface.configure(&gpu.device, &gpu.config);
                } else {
                    tracing::error!("surface error: {e}");
                }
                // The skipped frame still owes the loop its next tick.
                if !self.state.driver.is_halted() {
                    window.request_redraw();
                }
                return;
            }
        };

        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let tick = {
            let mut target = SurfaceFrame {
                renderer: &mut gpu.renderer,
                device: &gpu.device,
                queue: &gpu.queue,
                target: &view,
            };
            let ctx = RenderContext::new(&mut self.state.demo.scene, &mut target, &mut self.state.camera);
            self.state.driver.tick(ctx, &mut WindowScheduler(window))
        };
        if tick.frame == 0 {
            tracing::info!(info = %tick.output, "first frame");
        }
        self.state.last_info = Some(tick.output);

        let raw_input = gpu.egui_winit.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            self.state.draw_ui(ctx);
        });
        gpu.egui_winit
            .handle_platform_output(window, full_output.platform_output.clone());
        gpu.paint_overlay(&self.egui_ctx, full_output, &view);

        output.present();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("perfscene")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        match Gpu::new(window.clone(), &self.egui_ctx, &self.state.config.renderer) {
            Ok(gpu) => {
                self.state
                    .camera
                    .set_aspect(gpu.config.width, gpu.config.height);
                self.gpu = Some(gpu);
            }
            Err(e) => {
                tracing::error!("failed to initialize GPU: {e:#}");
                event_loop.exit();
                return;
            }
        }

        // First tick; every later one is requested by the frame driver.
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.clone() else {
            return;
        };
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                self.state.driver.halt();
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                    self.state
                        .camera
                        .set_aspect(gpu.config.width, gpu.config.height);
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => match self.state.handle_key(key) {
                KeyAction::Redraw => window.request_redraw(),
                KeyAction::Exit => event_loop.exit(),
                KeyAction::None => {}
            },
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state: btn_state,
                ..
            } => {
                self.state.dragging = btn_state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                self.state.camera.zoom(lines);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            if self.state.dragging {
                self.state.camera.rotate(delta.0 as f32, delta.1 as f32);
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("perfscene-desktop starting");

    let config = cli.demo_config()?;
    let state = AppState::new(config)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = GpuApp::new(state);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "perfscene-desktop",
            "--strategy",
            "naive",
            "--count",
            "200",
            "--seed",
            "5",
            "--no-vsync",
        ]);
        let config = cli.demo_config().unwrap();
        assert_eq!(config.strategy, DrawStrategy::Separate);
        assert_eq!(config.batch.count, 200);
        assert_eq!(config.batch.seed, Some(5));
        assert!(!config.renderer.vsync);
        assert!(!config.show_reference_meshes);
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::parse_from(["perfscene-desktop"]);
        assert_eq!(cli.demo_config().unwrap(), DemoConfig::default());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!(Cli::try_parse_from(["perfscene-desktop", "--strategy", "batched"]).is_err());
    }

    #[test]
    fn displaced_plane_and_msaa_flags() {
        let cli = Cli::parse_from(["perfscene-desktop", "--displaced-plane", "--msaa", "1"]);
        let config = cli.demo_config().unwrap();
        assert!(config.displaced_plane.enabled);
        assert_eq!(config.renderer.msaa_samples, 1);
    }

    #[test]
    fn rescatter_while_halted_asks_for_a_redraw() {
        let mut state = AppState::new(DemoConfig::default()).unwrap();
        let id = state.demo.population.batch.unwrap();
        state.demo.scene.batch_mut(id).unwrap().buffer_mut().mark_clean();
        state.driver.halt();

        assert_eq!(state.handle_key(KeyCode::KeyR), KeyAction::Redraw);
        assert!(state.demo.scene.batch(id).unwrap().buffer().is_dirty());
        assert!(state.driver.is_halted());
        assert_eq!(state.handle_key(KeyCode::KeyU), KeyAction::Redraw);
        assert_eq!(state.handle_key(KeyCode::Escape), KeyAction::Exit);
    }

    #[test]
    fn space_toggles_halt() {
        let mut state = AppState::new(DemoConfig::default()).unwrap();
        assert_eq!(state.handle_key(KeyCode::Space), KeyAction::None);
        assert!(state.driver.is_halted());
        assert_eq!(state.handle_key(KeyCode::Space), KeyAction::Redraw);
        assert!(!state.driver.is_halted());
    }

    #[test]
    fn state_spins_the_knot() {
        let config = DemoConfig {
            show_reference_meshes: true,
            ..DemoConfig::default()
        };
        let state = AppState::new(config).unwrap();
        assert_eq!(state.driver.spins().len(), 1);
    }
}
