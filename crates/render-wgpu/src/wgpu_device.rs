use crate::mesh::{GpuMesh, Vertex};
use crate::naga_device::{LinkedProgram, NagaDevice};
use glam::Mat4;
use hotshade_common::{ProgramId, ShaderId, ShaderStage, UniformLocation};
use hotshade_program::{DiagnosticLog, GraphicsDevice};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU64;
use wgpu::util::DeviceExt;

const MAT4_SIZE: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.15,
    a: 1.0,
};

/// Pipeline and uniform storage of one linked program.
struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    /// One 64-byte buffer per `@binding`.
    buffers: BTreeMap<u32, wgpu::Buffer>,
}

/// [`GraphicsDevice`] that turns linked WGSL programs into wgpu render
/// pipelines and draws with the bound one.
///
/// Compile and link checks run on a [`NagaDevice`]; a program that passes
/// them still fails to link if wgpu rejects its pipeline. Every uniform gets
/// its own buffer in bind group 0, so uploads are plain queue writes.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    front: NagaDevice,
    programs: HashMap<ProgramId, GpuProgram>,
    surface_format: wgpu::TextureFormat,
    depth_texture: wgpu::TextureView,
}

impl WgpuDevice {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let depth_texture = create_depth_texture(&device, width, height);
        Self {
            device,
            queue,
            front: NagaDevice::new(),
            programs: HashMap::new(),
            surface_format,
            depth_texture,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.depth_texture = create_depth_texture(&self.device, width, height);
    }

    /// Clear `target` and draw `mesh` with the bound program, if any.
    pub fn render(&self, target: &wgpu::TextureView, mesh: &GpuMesh) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            let bound = self
                .front
                .current_program()
                .and_then(|id| self.programs.get(&id));
            if let Some(program) = bound {
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, &program.bind_group, &[]);
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn build_pipeline(&self, linked: &LinkedProgram) -> Result<GpuProgram, DiagnosticLog> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("vertex_stage"),
                source: wgpu::ShaderSource::Wgsl(linked.vertex_source.as_str().into()),
            });
        let fragment_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("fragment_stage"),
                source: wgpu::ShaderSource::Wgsl(linked.fragment_source.as_str().into()),
            });

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = linked
            .uniforms
            .values()
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding: *binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(MAT4_SIZE),
                },
                count: None,
            })
            .collect();
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("uniform_bind_group_layout"),
                entries: &layout_entries,
            });

        let buffers: BTreeMap<u32, wgpu::Buffer> = linked
            .uniforms
            .iter()
            .map(|(name, binding)| {
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(name.as_str()),
                        contents: bytemuck::bytes_of(&Mat4::IDENTITY.to_cols_array_2d()),
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    });
                (*binding, buffer)
            })
            .collect();
        let bind_entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform_bind_group"),
            layout: &bind_group_layout,
            entries: &bind_entries,
        });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("program_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("program_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some(linked.vertex_entry.as_str()),
                    compilation_options: Default::default(),
                    buffers: &[Vertex::layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some(linked.fragment_entry.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            });

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(DiagnosticLog(error.to_string())),
            None => Ok(GpuProgram {
                pipeline,
                bind_group,
                buffers,
            }),
        }
    }

    /// Drop GPU state of programs the front end has released.
    fn prune(&mut self) {
        let front = &self.front;
        self.programs.retain(|id, _| front.contains_program(*id));
    }
}

impl GraphicsDevice for WgpuDevice {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, DiagnosticLog> {
        self.front.compile_shader(stage, source)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.front.delete_shader(shader);
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, DiagnosticLog> {
        let id = self.front.link_program(vertex, fragment)?;
        let built = match self.front.program(id) {
            Some(linked) => self.build_pipeline(linked),
            None => Err(DiagnosticLog(format!("{id} vanished during link"))),
        };
        match built {
            Ok(program) => {
                tracing::debug!("created pipeline for {id}");
                self.programs.insert(id, program);
                Ok(id)
            }
            Err(log) => {
                self.front.delete_program(id);
                Err(log)
            }
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.front.delete_program(program);
        self.prune();
    }

    fn use_program(&mut self, program: ProgramId) {
        self.front.use_program(program);
        self.prune();
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.front.uniform_location(program, name)
    }

    fn uniform_mat4(&mut self, program: ProgramId, location: UniformLocation, value: &Mat4) {
        let Some(buffer) = self
            .programs
            .get(&program)
            .and_then(|p| p.buffers.get(&location.0))
        else {
            return;
        };
        self.queue
            .write_buffer(buffer, 0, bytemuck::bytes_of(&value.to_cols_array_2d()));
        self.front.uniform_mat4(program, location, value);
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&Default::default())
}
