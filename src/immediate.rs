//! The immediate backend.
//!
//! Built on wgpu's GL adapter by default. Nothing is pre-recorded: every
//! frame rewrites each object's uniforms, opens a single render pass and
//! issues the draws directly, which mirrors how a fixed-function style API
//! is driven.

use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    config::RendererConfig,
    context::Context,
    data_structures::{model::Model, scene::Scene, shader::Shader},
    error::{RenderError, Result},
    pipelines::{self, ObjectUniform},
    renderer::{
        Operation, Renderer, RendererState, ResourceCounter, ResourceCounts, ResourceKind,
        release_scene_slots, upload_once,
    },
    resources::shader::{self, Interface},
};

#[derive(Debug, Clone)]
pub struct ImmediateModelData {
    pub positions: wgpu::Buffer,
    pub normals: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub index_count: u32,
}

#[derive(Debug, Clone)]
pub struct ImmediateShaderData {
    pub module: wgpu::ShaderModule,
    pub interface: Interface,
}

#[derive(Debug, Clone)]
pub struct ImmediateObjectData {
    pub uniform: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub pipeline: wgpu::RenderPipeline,
}

struct Gpu {
    ctx: Context,
    bind_group_layout: wgpu::BindGroupLayout,
}

pub struct ImmediateRenderer {
    config: RendererConfig,
    state: RendererState,
    gpu: Option<Gpu>,
    frames: u64,
    counts: ResourceCounter,
}

impl ImmediateRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            state: RendererState::Uninitialized,
            gpu: None,
            frames: 0,
            counts: ResourceCounter::default(),
        }
    }

    /// The device context, once `initialize` succeeded.
    pub fn context(&self) -> Option<&Context> {
        self.gpu.as_ref().map(|gpu| &gpu.ctx)
    }

    fn gpu(&self, op: Operation) -> Result<&Gpu> {
        self.gpu.as_ref().ok_or(RenderError::InvalidState {
            operation: op,
            state: self.state,
        })
    }
}

impl Renderer for ImmediateRenderer {
    fn name(&self) -> &'static str {
        "immediate"
    }

    fn state(&self) -> RendererState {
        self.state
    }

    fn initialize(&mut self, window: Arc<Window>) -> Result<()> {
        self.state.check(Operation::Initialize)?;
        let ctx = Context::new(window, &self.config)?;
        let bind_group_layout = pipelines::immediate::mk_bind_group_layout(&ctx.device);
        self.gpu = Some(Gpu {
            ctx,
            bind_group_layout,
        });
        self.state = self.state.after(Operation::Initialize);
        Ok(())
    }

    fn bind_scene_resources(&mut self, scene: &mut Scene) -> Result<()> {
        self.state.check(Operation::BindScene)?;
        let gpu = self.gpu(Operation::BindScene)?;

        for index in 0..scene.objects.len() {
            match build_object(gpu, &self.counts, scene, index) {
                Ok(data) => {
                    scene.objects[index].backend_data.set(data);
                    self.counts.created(ResourceKind::Object);
                }
                Err(err) => {
                    if let Err(release_err) = release_scene(gpu, &self.counts, scene) {
                        log::warn!("Cleaning up the failed bind: {release_err}");
                    }
                    return Err(err);
                }
            }
        }
        log::info!("Bound {} to the immediate backend", self.counts.get());
        self.state = self.state.after(Operation::BindScene);
        Ok(())
    }

    fn render_frame(&mut self, scene: &Scene) -> Result<()> {
        self.state.check(Operation::RenderFrame)?;
        let gpu = self.gpu(Operation::RenderFrame)?;
        draw_frame(gpu, scene, self.config.clear_colour)?;
        self.frames += 1;
        self.state = self.state.after(Operation::RenderFrame);
        Ok(())
    }

    fn release_resources(&mut self, scene: &mut Scene) -> Result<()> {
        self.state.check(Operation::Release)?;
        let mut outcome = Ok(());
        if self.state.holds_scene() {
            if let Some(gpu) = &self.gpu {
                outcome = release_scene(gpu, &self.counts, scene);
            }
        }
        if self.state.holds_resources() {
            if let Some(gpu) = self.gpu.take() {
                outcome = outcome.and(gpu.ctx.wait_idle());
            }
            log::debug!("Immediate context released");
        }
        self.state = self.state.after(Operation::Release);
        outcome
    }

    fn frames_presented(&self) -> u64 {
        self.frames
    }

    fn resource_counts(&self) -> ResourceCounts {
        self.counts.get()
    }
}

impl Drop for ImmediateRenderer {
    fn drop(&mut self) {
        if self.state.holds_scene() {
            log::warn!("Immediate renderer dropped without release_resources");
        }
    }
}

fn build_object(
    gpu: &Gpu,
    counts: &ResourceCounter,
    scene: &Scene,
    index: usize,
) -> Result<ImmediateObjectData> {
    let object = &scene.objects[index];
    let device = &gpu.ctx.device;

    let vertex = prepare_shader(device, counts, &object.vertex_shader)?;
    let fragment = prepare_shader(device, counts, &object.fragment_shader)?;
    shader::link(&vertex.interface, &fragment.interface)?;

    if upload_once(&object.model.backend_data, || upload_model(device, &object.model))? {
        counts.created(ResourceKind::Model);
    }
    // fails early if the slot holds another backend's data
    object
        .model
        .backend_data
        .borrow()
        .get::<ImmediateModelData>()?;

    let uniform = pipelines::immediate::mk_uniform_buffer(device);
    gpu.ctx
        .queue
        .write_buffer(&uniform, 0, ObjectUniform::new(scene, object).as_bytes());
    let bind_group = pipelines::immediate::mk_bind_group(device, &gpu.bind_group_layout, &uniform);
    let pipeline = pipelines::immediate::mk_render_pipeline(
        device,
        &gpu.bind_group_layout,
        gpu.ctx.config.format,
        &vertex.module,
        &fragment.module,
    );
    log::debug!("Object {index} ({}) ready", object.model.name);
    Ok(ImmediateObjectData {
        uniform,
        bind_group,
        pipeline,
    })
}

fn prepare_shader(
    device: &wgpu::Device,
    counts: &ResourceCounter,
    shader: &Shader,
) -> Result<ImmediateShaderData> {
    let fresh = upload_once(&shader.backend_data, || {
        let compiled = shader::load_and_compile(shader)?;
        let label = shader.path.to_string_lossy();
        let module = pipelines::immediate::mk_shader_module(
            device,
            &label,
            compiled.stage,
            &compiled.source,
        );
        log::debug!("Compiled {} shader {}", shader.stage, shader.path.display());
        Ok(ImmediateShaderData {
            module,
            interface: compiled.interface(),
        })
    })?;
    if fresh {
        counts.created(ResourceKind::Shader);
    }
    Ok(shader
        .backend_data
        .borrow()
        .get::<ImmediateShaderData>()?
        .clone())
}

fn upload_model(device: &wgpu::Device, model: &Model) -> Result<ImmediateModelData> {
    if model.positions.is_empty() || model.indices.is_empty() {
        return Err(RenderError::resource(
            "vertex buffer",
            format!("model {} has no geometry", model.name),
        ));
    }
    if model.normals.len() != model.positions.len() {
        return Err(RenderError::resource(
            "normal buffer",
            format!(
                "model {} has {} normals for {} positions",
                model.name,
                model.normals.len(),
                model.positions.len()
            ),
        ));
    }

    let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{} Vertex Buffer", model.name)),
        contents: bytemuck::cast_slice(&model.positions),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let normals = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{} Normal Buffer", model.name)),
        contents: bytemuck::cast_slice(&model.normals),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{} Index Buffer", model.name)),
        contents: bytemuck::cast_slice(&model.indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    log::debug!(
        "Uploaded model {} ({} vertices, {} indices)",
        model.name,
        model.vertex_count(),
        model.index_count()
    );
    Ok(ImmediateModelData {
        positions,
        normals,
        indices,
        index_count: model.index_count(),
    })
}

fn draw_frame(gpu: &Gpu, scene: &Scene, clear_colour: wgpu::Color) -> Result<()> {
    let ctx = &gpu.ctx;

    let mut draws = Vec::with_capacity(scene.objects.len());
    for object in &scene.objects {
        let data = object.backend_data.get::<ImmediateObjectData>()?;
        let model = object
            .model
            .backend_data
            .borrow()
            .get::<ImmediateModelData>()?
            .clone();
        ctx.queue
            .write_buffer(&data.uniform, 0, ObjectUniform::new(scene, object).as_bytes());
        draws.push((data, model));
    }

    let output = ctx
        .surface
        .get_current_texture()
        .map_err(|e| RenderError::sync("acquiring a surface texture", e))?;
    if output.suboptimal {
        log::warn!("Surface is suboptimal");
    }
    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Object Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear_colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &ctx.depth_texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
            multiview_mask: None,
        });

        for (data, model) in &draws {
            render_pass.set_pipeline(&data.pipeline);
            render_pass.set_bind_group(0, &data.bind_group, &[]);
            render_pass.set_vertex_buffer(0, model.positions.slice(..));
            render_pass.set_vertex_buffer(1, model.normals.slice(..));
            render_pass.set_index_buffer(model.indices.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..model.index_count, 0, 0..1);
        }
    }

    ctx.queue.submit(std::iter::once(encoder.finish()));
    ctx.window.pre_present_notify();
    output.present();
    Ok(())
}

/// Drops per-object bundles, then per-model buffers, then shader modules,
/// newest first. Slots holding another backend's data are left alone.
fn release_scene(gpu: &Gpu, counts: &ResourceCounter, scene: &mut Scene) -> Result<()> {
    release_scene_slots(
        scene,
        || gpu.ctx.wait_idle(),
        |_, data: ImmediateObjectData| {
            data.uniform.destroy();
            counts.freed(ResourceKind::Object);
        },
        |_, data: ImmediateModelData| {
            data.indices.destroy();
            data.normals.destroy();
            data.positions.destroy();
            counts.freed(ResourceKind::Model);
        },
        |_, _: ImmediateShaderData| counts.freed(ResourceKind::Shader),
    )
}
