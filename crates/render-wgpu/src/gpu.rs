use std::collections::{BTreeMap, HashMap};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use perfscene_assets::{MaterialDesc, MeshData, ShaderPrecision, build_mesh};
use perfscene_common::{BatchId, GeometryHandle, ObjectId};
use perfscene_instancing::InstanceBatch;
use perfscene_render::{DrawSource, DrawSubmission, FramePlan, RenderInfo, RenderView, Renderer};
use perfscene_scene::Scene;
use wgpu::util::DeviceExt;

use crate::shaders;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Dynamic uniform offsets must be aligned to this.
const DRAW_PARAMS_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    light_view_proj: [[f32; 4]; 4],
    light_dir: [f32; 4],
    light_color: [f32; 4],
    shadow: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct DrawParams {
    color: [f32; 4],
    flags: [u32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
}

/// One column-major model matrix per instance.
type InstanceData = [[f32; 4]; 4];

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![2 => Float32x4, 3 => Float32x4, 4 => Float32x4, 5 => Float32x4];

fn vertex_layouts() -> [wgpu::VertexBufferLayout<'static>; 2] {
    [
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        },
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &INSTANCE_ATTRIBUTES,
        },
    ]
}

/// Pipeline variant of a displaced material: one per strength and precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct DisplacedKey {
    strength_bits: u32,
    precision: ShaderPrecision,
}

impl DisplacedKey {
    fn of(material: Option<&MaterialDesc>) -> Option<Self> {
        match material {
            Some(MaterialDesc::Displaced { strength, precision }) => Some(Self {
                strength_bits: strength.to_bits(),
                precision: *precision,
            }),
            _ => None,
        }
    }

    /// Values for the shader's overridable constants.
    fn constants(&self) -> HashMap<String, f64> {
        HashMap::from([
            (
                "DISPLACEMENT_STRENGTH".to_string(),
                f64::from(f32::from_bits(self.strength_bits)),
            ),
            ("HEIGHT_QUANTUM".to_string(), f64::from(self.precision.quantum())),
        ])
    }
}

/// Sample counts every WebGPU adapter supports for render targets.
fn supported_sample_count(requested: u32) -> u32 {
    if requested >= 4 { 4 } else { 1 }
}

fn vertices(mesh: &MeshData) -> Vec<Vertex> {
    mesh.positions
        .iter()
        .zip(&mesh.normals)
        .map(|(&position, &normal)| Vertex { position, normal })
        .collect()
}

fn draw_params(material: Option<&MaterialDesc>, receive_shadow: bool) -> DrawParams {
    let receive = receive_shadow as u32;
    match material {
        Some(MaterialDesc::Standard { color }) => DrawParams {
            color: *color,
            flags: [0, receive, 0, 0],
        },
        Some(MaterialDesc::Normal) => DrawParams {
            color: [1.0; 4],
            flags: [1, receive, 0, 0],
        },
        Some(MaterialDesc::Displaced { .. }) => DrawParams {
            color: [1.0; 4],
            flags: [2, receive, 0, 0],
        },
        None => DrawParams {
            color: [1.0, 0.0, 1.0, 1.0],
            flags: [0, receive, 0, 0],
        },
    }
}

/// Smallest power-of-two capacity holding `needed`, never shrinking.
fn grown_capacity(current: u64, needed: u64) -> u64 {
    if needed <= current {
        current
    } else {
        needed.next_power_of_two()
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

/// Vertex buffer of model matrices, regrown when it runs out of room.
struct InstanceBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: u64,
    len: u32,
}

impl InstanceBuffer {
    fn new(device: &wgpu::Device, label: &'static str, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            label,
            buffer: Self::allocate(device, label, capacity),
            capacity,
            len: 0,
        }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity * std::mem::size_of::<InstanceData>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[InstanceData]) {
        let capacity = grown_capacity(self.capacity, data.len() as u64);
        if capacity != self.capacity {
            tracing::debug!(label = self.label, from = self.capacity, to = capacity, "growing instance buffer");
            self.buffer = Self::allocate(device, self.label, capacity);
            self.capacity = capacity;
        }
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
        self.len = data.len() as u32;
    }
}

/// wgpu backend drawing a [`FramePlan`]: an optional shadow depth pass, then
/// the main pass with one draw per submission.
pub struct WgpuRenderer {
    main_pipeline: wgpu::RenderPipeline,
    main_layout: wgpu::PipelineLayout,
    displaced_shader: wgpu::ShaderModule,
    displaced_pipelines: BTreeMap<DisplacedKey, wgpu::RenderPipeline>,
    shadow_pipeline: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    frame_layout: wgpu::BindGroupLayout,
    frame_bind_group: wgpu::BindGroup,
    shadow_bind_group: wgpu::BindGroup,
    draw_layout: wgpu::BindGroupLayout,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
    draw_capacity: u64,
    shadow_map: wgpu::TextureView,
    shadow_map_size: u32,
    shadow_sampler: wgpu::Sampler,
    /// The shadow map holds a rendered depth image.
    shadow_ready: bool,
    depth_texture: wgpu::TextureView,
    /// Multisampled colour target resolved into the surface; `None` at one sample.
    msaa_target: Option<wgpu::TextureView>,
    sample_count: u32,
    surface_format: wgpu::TextureFormat,
    clear_color: wgpu::Color,
    meshes: BTreeMap<GeometryHandle, GpuMesh>,
    batches: BTreeMap<BatchId, InstanceBuffer>,
    objects: InstanceBuffer,
    frame: u64,
    pending_uploads: u32,
}

impl WgpuRenderer {
    /// `sample_count` above one enables multisampling; it is rounded to a
    /// count every adapter supports.
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Self {
        let requested = sample_count;
        let sample_count = supported_sample_count(requested);
        if sample_count != requested.max(1) {
            tracing::warn!(requested, used = sample_count, "unsupported MSAA sample count");
        }

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals_buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawParams>() as u64),
                },
                count: None,
            }],
        });

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let shadow_map_size = 1024;
        let shadow_map = Self::create_shadow_map(device, shadow_map_size);
        let frame_bind_group =
            Self::create_frame_bind_group(device, &frame_layout, &globals_buffer, &shadow_map, &shadow_sampler);

        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_bind_group"),
            layout: &shadow_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let draw_capacity = 64;
        let draw_buffer = Self::create_draw_buffer(device, draw_capacity);
        let draw_bind_group = Self::create_draw_bind_group(device, &draw_layout, &draw_buffer);

        let vertex_layouts = vertex_layouts();

        let main_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("main_pipeline_layout"),
            bind_group_layouts: &[&frame_layout, &draw_layout],
            push_constant_ranges: &[],
        });

        let mesh_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mesh_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::MESH_SHADER.into()),
        });
        let displaced_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("displaced_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::DISPLACED_SHADER.into()),
        });

        let main_pipeline = Self::create_color_pipeline(
            device,
            ColorPipeline {
                label: "main_pipeline",
                layout: &main_layout,
                module: &mesh_shader,
                entry_points: ("vs_main", "fs_main"),
                format: surface_format,
                sample_count,
                constants: &HashMap::new(),
                cull_mode: Some(wgpu::Face::Back),
            },
        );

        let shadow_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow_pipeline_layout"),
            bind_group_layouts: &[&shadow_layout],
            push_constant_ranges: &[],
        });

        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::SHADOW_SHADER.into()),
        });

        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shadow_pipeline"),
            layout: Some(&shadow_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shadow_shader,
                entry_point: Some("vs_shadow"),
                compilation_options: Default::default(),
                buffers: &vertex_layouts,
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        let depth_texture = Self::create_depth_texture(device, width, height, sample_count);
        let msaa_target = Self::create_msaa_target(device, surface_format, width, height, sample_count);
        let objects = InstanceBuffer::new(device, "object_instance_buffer", 16);

        Self {
            main_pipeline,
            main_layout,
            displaced_shader,
            displaced_pipelines: BTreeMap::new(),
            shadow_pipeline,
            globals_buffer,
            frame_layout,
            frame_bind_group,
            shadow_bind_group,
            draw_layout,
            draw_buffer,
            draw_bind_group,
            draw_capacity,
            shadow_map,
            shadow_map_size,
            shadow_sampler,
            shadow_ready: false,
            depth_texture,
            msaa_target,
            sample_count,
            surface_format,
            clear_color: wgpu::Color::BLACK,
            meshes: BTreeMap::new(),
            batches: BTreeMap::new(),
            objects,
            frame: 0,
            pending_uploads: 0,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_texture = Self::create_depth_texture(device, width, height, self.sample_count);
        self.msaa_target =
            Self::create_msaa_target(device, self.surface_format, width, height, self.sample_count);
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Pipelines built for distinct displaced materials.
    pub fn displaced_pipeline_count(&self) -> usize {
        self.displaced_pipelines.len()
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        let [r, g, b, a] = rgba.map(f64::from);
        self.clear_color = wgpu::Color { r, g, b, a };
    }

    /// Geometries currently resident on the GPU.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Copy a batch's transforms into its instance buffer.
    pub fn upload_batch(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        id: BatchId,
        batch: &InstanceBatch,
    ) {
        let data = batch.buffer().to_raw();
        self.batches
            .entry(id)
            .or_insert_with(|| InstanceBuffer::new(device, "batch_instance_buffer", data.len() as u64))
            .write(device, queue, &data);
        self.pending_uploads += 1;
    }

    /// Render one frame of the scene into `target`.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        scene: &Scene,
        view: &RenderView,
    ) -> RenderInfo {
        let plan = FramePlan::build(scene);

        self.sync_meshes(device, scene, &plan);
        self.sync_displaced_pipelines(device, scene, &plan);
        self.batches.retain(|id, _| scene.batch(*id).is_some());
        let object_slots = self.write_object_instances(device, queue, scene, &plan);
        self.write_globals(device, queue, scene, &plan, view);
        self.write_draw_params(device, queue, scene, &plan);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

        if let Some(shadow) = &plan.shadow {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_map,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
            pass.set_pipeline(&self.shadow_pipeline);
            pass.set_bind_group(0, &self.shadow_bind_group, &[]);
            for submission in &shadow.submissions {
                self.draw_submission(&mut pass, submission, &object_slots);
            }
        }

        {
            let (view, resolve_target, store) = match &self.msaa_target {
                Some(msaa) => (msaa, Some(target), wgpu::StoreOp::Discard),
                None => (target, None, wgpu::StoreOp::Store),
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store,
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
            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            let mut bound = None;
            for (i, submission) in plan.main.iter().enumerate() {
                let key = DisplacedKey::of(scene.resources().material(submission.material));
                if bound != Some(key) {
                    let pipeline = match key {
                        Some(key) => match self.displaced_pipelines.get(&key) {
                            Some(pipeline) => pipeline,
                            None => continue,
                        },
                        None => &self.main_pipeline,
                    };
                    pass.set_pipeline(pipeline);
                    bound = Some(key);
                }
                let offset = (i as u64 * DRAW_PARAMS_STRIDE) as u32;
                pass.set_bind_group(1, &self.draw_bind_group, &[offset]);
                self.draw_submission(&mut pass, submission, &object_slots);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));

        if plan.shadow.is_some() {
            self.shadow_ready = true;
        }
        let info = plan.info(self.frame, scene, self.pending_uploads);
        self.frame += 1;
        self.pending_uploads = 0;
        info
    }

    fn draw_submission(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        submission: &DrawSubmission,
        object_slots: &BTreeMap<ObjectId, u32>,
    ) {
        let Some(mesh) = self.meshes.get(&submission.geometry) else {
            return;
        };
        let (buffer, instances) = match submission.source {
            DrawSource::Object(id) => match object_slots.get(&id) {
                Some(&slot) => (&self.objects.buffer, slot..slot + 1),
                None => return,
            },
            DrawSource::Batch(id) => match self.batches.get(&id) {
                Some(gpu) => (&gpu.buffer, 0..submission.instance_count.min(gpu.len)),
                None => return,
            },
        };
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_vertex_buffer(1, buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, instances);
    }

    /// Build GPU meshes for newly referenced geometries and drop disposed ones.
    fn sync_meshes(&mut self, device: &wgpu::Device, scene: &Scene, plan: &FramePlan) {
        let resources = scene.resources();
        self.meshes.retain(|handle, _| resources.contains_geometry(*handle));

        for submission in &plan.main {
            if self.meshes.contains_key(&submission.geometry) {
                continue;
            }
            let Some(entry) = resources.geometry(submission.geometry) else {
                continue;
            };
            let mesh = match build_mesh(&entry.desc) {
                Ok(mesh) => mesh,
                Err(e) => {
                    tracing::error!(geometry = submission.geometry.0, "mesh build failed: {e}");
                    continue;
                }
            };
            let verts = vertices(&mesh);
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_vertex_buffer"),
                contents: bytemuck::cast_slice(&verts),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh_index_buffer"),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            tracing::debug!(
                geometry = submission.geometry.0,
                vertices = mesh.vertex_count(),
                triangles = mesh.triangle_count(),
                "mesh uploaded"
            );
            self.meshes.insert(
                submission.geometry,
                GpuMesh {
                    vertex_buffer,
                    index_buffer,
                    index_count: mesh.indices.len() as u32,
                },
            );
        }
    }

    /// Build a pipeline for every displaced material variant drawn this frame.
    fn sync_displaced_pipelines(&mut self, device: &wgpu::Device, scene: &Scene, plan: &FramePlan) {
        for submission in &plan.main {
            let Some(key) = DisplacedKey::of(scene.resources().material(submission.material)) else {
                continue;
            };
            if self.displaced_pipelines.contains_key(&key) {
                continue;
            }
            tracing::debug!(?key, "building displaced pipeline");
            let pipeline = Self::create_color_pipeline(
                device,
                ColorPipeline {
                    label: "displaced_pipeline",
                    layout: &self.main_layout,
                    module: &self.displaced_shader,
                    entry_points: ("vs_displaced", "fs_displaced"),
                    format: self.surface_format,
                    sample_count: self.sample_count,
                    constants: &key.constants(),
                    cull_mode: None,
                },
            );
            self.displaced_pipelines.insert(key, pipeline);
        }
    }

    fn create_color_pipeline(device: &wgpu::Device, desc: ColorPipeline<'_>) -> wgpu::RenderPipeline {
        let vertex_layouts = vertex_layouts();
        let (vs, fs) = desc.entry_points;
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(desc.layout),
            vertex: wgpu::VertexState {
                module: desc.module,
                entry_point: Some(vs),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: desc.constants,
                    ..Default::default()
                },
                buffers: &vertex_layouts,
            },
            fragment: Some(wgpu::FragmentState {
                module: desc.module,
                entry_point: Some(fs),
                compilation_options: wgpu::PipelineCompilationOptions {
                    constants: desc.constants,
                    ..Default::default()
                },
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: desc.cull_mode,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: desc.sample_count,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        })
    }

    /// Write one model matrix per drawn object. Returns each object's slot.
    fn write_object_instances(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &Scene,
        plan: &FramePlan,
    ) -> BTreeMap<ObjectId, u32> {
        let mut slots = BTreeMap::new();
        let mut matrices: Vec<InstanceData> = Vec::new();
        for submission in &plan.main {
            let DrawSource::Object(id) = submission.source else {
                continue;
            };
            if let Some(object) = scene.get(id) {
                slots.insert(id, matrices.len() as u32);
                matrices.push(object.transform.matrix().to_cols_array_2d());
            }
        }
        self.objects.write(device, queue, &matrices);
        slots
    }

    fn write_globals(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &Scene,
        plan: &FramePlan,
        view: &RenderView,
    ) {
        let lights = scene.lights();
        let light = plan
            .shadow
            .as_ref()
            .map(|s| s.light)
            .or_else(|| lights.iter().position(|l| l.cast_shadow))
            .and_then(|i| lights.get(i))
            .or(lights.first());

        let mut globals = Globals {
            view_proj: view.view_projection().to_cols_array_2d(),
            view: view.view_matrix().to_cols_array_2d(),
            light_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            light_dir: Vec3::new(0.3, 1.0, 0.5).normalize().extend(0.0).to_array(),
            light_color: [1.0; 4],
            shadow: [0.0; 4],
        };

        if let Some(light) = light {
            let [r, g, b] = light.color.map(|c| c * light.intensity);
            globals.light_dir = light.direction().extend(0.0).to_array();
            globals.light_color = [r, g, b, 1.0];
            globals.light_view_proj = light.shadow_view_projection().to_cols_array_2d();

            let max = device.limits().max_texture_dimension_2d;
            let size = light.shadow.map_size.clamp(1, max);
            if size != light.shadow.map_size && plan.shadow.is_some() {
                tracing::warn!(requested = light.shadow.map_size, max, "shadow map size clamped");
            }
            if plan.shadow.is_some() && size != self.shadow_map_size {
                tracing::debug!(from = self.shadow_map_size, to = size, "resizing shadow map");
                self.shadow_map = Self::create_shadow_map(device, size);
                self.shadow_map_size = size;
                self.shadow_ready = false;
                self.frame_bind_group = Self::create_frame_bind_group(
                    device,
                    &self.frame_layout,
                    &self.globals_buffer,
                    &self.shadow_map,
                    &self.shadow_sampler,
                );
            }
            let sampled = light.cast_shadow && (self.shadow_ready || plan.shadow.is_some());
            globals.shadow = [
                if sampled { 1.0 } else { 0.0 },
                light.shadow.normal_bias,
                1.0 / self.shadow_map_size as f32,
                0.0,
            ];
        }

        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));
    }

    fn write_draw_params(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, scene: &Scene, plan: &FramePlan) {
        let count = plan.main.len() as u64;
        if count == 0 {
            return;
        }
        let capacity = grown_capacity(self.draw_capacity, count);
        if capacity != self.draw_capacity {
            self.draw_buffer = Self::create_draw_buffer(device, capacity);
            self.draw_bind_group = Self::create_draw_bind_group(device, &self.draw_layout, &self.draw_buffer);
            self.draw_capacity = capacity;
        }

        let stride = DRAW_PARAMS_STRIDE as usize;
        let mut bytes = vec![0u8; count as usize * stride];
        for (i, submission) in plan.main.iter().enumerate() {
            let params = draw_params(scene.resources().material(submission.material), submission.receive_shadow);
            let raw = bytemuck::bytes_of(&params);
            bytes[i * stride..i * stride + raw.len()].copy_from_slice(raw);
        }
        queue.write_buffer(&self.draw_buffer, 0, &bytes);
    }

    fn create_frame_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        globals: &wgpu::Buffer,
        shadow_map: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: globals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(shadow_map),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    fn create_draw_buffer(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw_params_buffer"),
            size: capacity * DRAW_PARAMS_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_draw_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawParams>() as u64),
                }),
            }],
        })
    }

    fn create_shadow_map(device: &wgpu::Device, size: u32) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow_map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }

    fn create_msaa_target(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Option<wgpu::TextureView> {
        if sample_count == 1 {
            return None;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa_target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Some(texture.create_view(&Default::default()))
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}

/// Inputs of [`WgpuRenderer::create_color_pipeline`].
struct ColorPipeline<'a> {
    label: &'static str,
    layout: &'a wgpu::PipelineLayout,
    module: &'a wgpu::ShaderModule,
    entry_points: (&'static str, &'static str),
    format: wgpu::TextureFormat,
    sample_count: u32,
    constants: &'a HashMap<String, f64>,
    cull_mode: Option<wgpu::Face>,
}

/// One frame's GPU handles, so the frame driver can treat the wgpu backend
/// like any other [`Renderer`].
pub struct SurfaceFrame<'a> {
    pub renderer: &'a mut WgpuRenderer,
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub target: &'a wgpu::TextureView,
}

impl Renderer for SurfaceFrame<'_> {
    type Output = RenderInfo;

    fn upload_batch(&mut self, id: BatchId, batch: &InstanceBatch) {
        self.renderer.upload_batch(self.device, self.queue, id, batch);
    }

    fn render(&mut self, scene: &Scene, view: &RenderView) -> RenderInfo {
        self.renderer.render(self.device, self.queue, self.target, scene, view)
    }
}
