use anyhow::{Context, Result};
use clap::Parser;
use egui::Context as EguiContext;
use glam::{Mat4, Vec2};
use hotshade_camera::{CameraConfig, Direction, OrientationCamera, Projection};
use hotshade_program::{ProgramError, ShaderProgram};
use hotshade_render_wgpu::{
    GpuMesh, WORLD_FRAG_FILE, WORLD_FRAG_WGSL, WORLD_VERT_FILE, WORLD_VERT_WGSL, WgpuDevice,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "hotshade-viewer", about = "Fly around a mesh drawn with hot-reloaded WGSL")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Vertex stage source (built-in shader when omitted)
    #[arg(long, requires = "fragment")]
    vertex: Option<PathBuf>,

    /// Fragment stage source (built-in shader when omitted)
    #[arg(long, requires = "vertex")]
    fragment: Option<PathBuf>,

    /// Camera config (YAML); F5 writes the current camera back to it
    #[arg(long)]
    camera: Option<PathBuf>,
}

const MOVE_KEYS: [(KeyCode, Direction); 6] = [
    (KeyCode::KeyW, Direction::Forward),
    (KeyCode::KeyS, Direction::Backward),
    (KeyCode::KeyA, Direction::Left),
    (KeyCode::KeyD, Direction::Right),
    (KeyCode::Space, Direction::Upward),
    (KeyCode::ControlLeft, Direction::Downward),
];

/// Apply one frame of input. Every held movement key moves the camera; the
/// look delta is applied exactly once.
fn drive_camera(camera: &mut OrientationCamera, keys: &HashSet<KeyCode>, dt: f32, look: Vec2) {
    let mut look = Some(look);
    for (key, direction) in MOVE_KEYS {
        if keys.contains(&key) {
            let Vec2 { x, y } = look.take().unwrap_or(Vec2::ZERO);
            camera.update(direction, dt, x, y);
        }
    }
    if let Some(Vec2 { x, y }) = look {
        camera.update(Direction::Nowhere, dt, x, y);
    }
}

/// Application state independent of the GPU.
struct AppState {
    camera: OrientationCamera,
    projection: Projection,
    camera_path: Option<PathBuf>,
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    show_overlay: bool,
    keys_held: HashSet<KeyCode>,
    mouse_captured: bool,
    look_delta: Vec2,
    started: Instant,
    last_frame: Instant,
    last_io_error: Option<String>,
    // Keeps the built-in sources alive when no paths were given.
    _scratch: Option<tempfile::TempDir>,
}

impl AppState {
    fn new(cli: Cli) -> Result<Self> {
        let config = match &cli.camera {
            Some(path) if path.exists() => CameraConfig::load(path)
                .with_context(|| format!("loading camera config {}", path.display()))?,
            _ => CameraConfig::default(),
        };

        let (vertex_path, fragment_path, scratch) = match (cli.vertex, cli.fragment) {
            (Some(vertex), Some(fragment)) => (vertex, fragment, None),
            _ => {
                let dir = tempfile::tempdir().context("creating scratch shader directory")?;
                let vertex = dir.path().join(WORLD_VERT_FILE);
                let fragment = dir.path().join(WORLD_FRAG_FILE);
                std::fs::write(&vertex, WORLD_VERT_WGSL.trim_start())?;
                std::fs::write(&fragment, WORLD_FRAG_WGSL.trim_start())?;
                tracing::info!("built-in shaders written to {}", dir.path().display());
                (vertex, fragment, Some(dir))
            }
        };

        let now = Instant::now();
        Ok(Self {
            camera: OrientationCamera::from_config(&config),
            projection: Projection::default(),
            camera_path: cli.camera,
            vertex_path,
            fragment_path,
            show_overlay: true,
            keys_held: HashSet::new(),
            mouse_captured: false,
            look_delta: Vec2::ZERO,
            started: now,
            last_frame: now,
            last_io_error: None,
            _scratch: scratch,
        })
    }

    fn update(&mut self, dt: f32) {
        let speed_mult = if self.keys_held.contains(&KeyCode::ShiftLeft) {
            3.0
        } else {
            1.0
        };
        let look = std::mem::take(&mut self.look_delta);
        drive_camera(&mut self.camera, &self.keys_held, dt * speed_mult, look);
    }

    fn handle_key(&mut self, key: KeyCode, pressed: bool) {
        if pressed {
            self.keys_held.insert(key);
        } else {
            self.keys_held.remove(&key);
        }

        if !pressed {
            return;
        }

        match key {
            KeyCode::F1 => self.show_overlay = !self.show_overlay,
            KeyCode::F5 => self.save_camera(),
            _ => {}
        }
    }

    fn save_camera(&self) {
        let path = self
            .camera_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("camera.yaml"));
        match self.camera.config().save(&path) {
            Ok(()) => tracing::info!("camera saved to {}", path.display()),
            Err(e) => tracing::error!("failed to save camera to {}: {e}", path.display()),
        }
    }

    /// Poll the sources and upload this frame's matrices.
    fn prepare_program(&mut self, program: &mut ShaderProgram, device: &mut WgpuDevice) {
        match program.check_for_changes(device) {
            Ok(_) => self.last_io_error = None,
            Err(err @ ProgramError::Io { .. }) => {
                let message = err.to_string();
                if self.last_io_error.as_ref() != Some(&message) {
                    tracing::warn!("{message}");
                    self.last_io_error = Some(message);
                }
            }
            // Build failures are logged by the program itself.
            Err(_) => {}
        }

        let spin = self.started.elapsed().as_secs_f32() * 0.5;
        program.use_program(device);
        program.set_mat4(device, "model", &Mat4::from_rotation_y(spin));
        program.set_mat4(device, "view", &self.camera.view_matrix());
        program.set_mat4(device, "projection", &self.projection.matrix());
    }

    fn draw_ui(&self, ctx: &EguiContext, program: &ShaderProgram) {
        if !self.show_overlay {
            return;
        }

        let status = program.status();
        egui::Window::new("hotshade")
            .default_pos([12.0, 12.0])
            .resizable(false)
            .show(ctx, |ui| {
                let p = self.camera.position();
                ui.label(format!("Camera: ({:.2}, {:.2}, {:.2})", p.x, p.y, p.z));
                ui.label(format!(
                    "Yaw: {:.1}  Pitch: {:.1}",
                    self.camera.yaw(),
                    self.camera.pitch()
                ));
                ui.separator();
                ui.label(format!("Program: {}  generation {}", status.program, status.generation));
                ui.label(format!("Vertex: {}", status.vertex_path.display()));
                ui.label(format!("Fragment: {}", status.fragment_path.display()));
                if let Some(error) = &status.last_error {
                    ui.separator();
                    ui.colored_label(egui::Color32::LIGHT_RED, "Reload rejected:");
                    ui.monospace(error);
                }
                if let Some(error) = &self.last_io_error {
                    ui.colored_label(egui::Color32::YELLOW, error);
                }
                ui.separator();
                ui.small("F1: Overlay | F5: Save camera | RMB: Look | WASD/Space/Ctrl: Move");
            });
    }
}

/// Window-bound GPU resources, created on first resume.
struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    device: WgpuDevice,
    mesh: GpuMesh,
    program: ShaderProgram,
    egui_winit: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

struct GpuApp {
    state: AppState,
    gpu: Option<Gpu>,
    egui_ctx: EguiContext,
    fatal: Option<anyhow::Error>,
}

impl GpuApp {
    fn new(state: AppState) -> Self {
        Self {
            state,
            gpu: None,
            egui_ctx: EguiContext::default(),
            fatal: None,
        }
    }

    fn init_gpu(&mut self, event_loop: &ActiveEventLoop) -> Result<Gpu> {
        let attrs = Window::default_attributes()
            .with_title("hotshade")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = Arc::new(event_loop.create_window(attrs).context("creating window")?);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("creating surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("hotshade_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .context("creating device")?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or(surface_caps.formats.first())
            .copied()
            .context("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        self.state.projection.set_viewport(size.width, size.height);

        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );

        let mut device = WgpuDevice::new(device, queue, surface_format, size.width, size.height);
        let mesh = GpuMesh::cube(device.device());
        let program =
            ShaderProgram::create(&mut device, &self.state.vertex_path, &self.state.fragment_path)
                .context("building initial shader program")?;

        let egui_winit = egui_winit::State::new(
            self.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );
        let egui_renderer =
            egui_wgpu::Renderer::new(device.device(), surface_format, None, 1, false);

        Ok(Gpu {
            window,
            surface,
            config,
            device,
            mesh,
            program,
            egui_winit,
            egui_renderer,
        })
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = (now - self.state.last_frame).as_secs_f32().min(0.1);
        self.state.last_frame = now;
        self.state.update(dt);

        let Some(gpu) = &mut self.gpu else {
            return;
        };
        self.state.prepare_program(&mut gpu.program, &mut gpu.device);

        let output = match gpu.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(gpu.device.device(), &gpu.config);
                return;
            }
            Err(e) => {
                tracing::error!("surface error: {e}");
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        gpu.device.render(&view, &gpu.mesh);

        let raw_input = gpu.egui_winit.take_egui_input(&gpu.window);
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            self.state.draw_ui(ctx, &gpu.program);
        });
        gpu.egui_winit
            .handle_platform_output(&gpu.window, full_output.platform_output);

        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);
        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gpu.config.width, gpu.config.height],
            pixels_per_point: full_output.pixels_per_point,
        };

        let device = gpu.device.device();
        let queue = gpu.device.queue();
        for (id, image_delta) in &full_output.textures_delta.set {
            gpu.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("egui_encoder"),
        });
        gpu.egui_renderer.update_buffers(
            device,
            queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("egui_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
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
            gpu.egui_renderer
                .render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        queue.submit(std::iter::once(encoder.finish()));
        for id in &full_output.textures_delta.free {
            gpu.egui_renderer.free_texture(id);
        }

        output.present();
        gpu.window.request_redraw();
    }
}

impl ApplicationHandler for GpuApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.gpu.is_some() {
            return;
        }
        match self.init_gpu(event_loop) {
            Ok(gpu) => self.gpu = Some(gpu),
            Err(e) => {
                tracing::error!("{e:#}");
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(gpu) = &mut self.gpu {
            let response = gpu.egui_winit.on_window_event(&gpu.window, &event);
            if response.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                if let Some(gpu) = self.gpu.take() {
                    let Gpu {
                        mut device, program, ..
                    } = gpu;
                    program.release(&mut device);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.config.width = new_size.width.max(1);
                    gpu.config.height = new_size.height.max(1);
                    gpu.surface.configure(gpu.device.device(), &gpu.config);
                    gpu.device.resize(gpu.config.width, gpu.config.height);
                    self.state
                        .projection
                        .set_viewport(new_size.width, new_size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: key_state,
                        ..
                    },
                ..
            } => {
                self.state
                    .handle_key(key, key_state == ElementState::Pressed);
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state: btn_state,
                ..
            } => {
                self.state.mouse_captured = btn_state == ElementState::Pressed;
                if let Some(gpu) = &self.gpu {
                    gpu.window.set_cursor_visible(!self.state.mouse_captured);
                }
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
            if self.state.mouse_captured {
                // Screen y grows downwards; pitch grows upwards.
                self.state.look_delta += Vec2::new(delta.0 as f32, -delta.1 as f32);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gpu) = &self.gpu {
            gpu.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("hotshade-viewer starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = GpuApp::new(AppState::new(cli)?);
    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
