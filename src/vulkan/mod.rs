//! The explicit-API backend.
//!
//! Everything is prepared up front: `bind_scene_resources` compiles shaders,
//! uploads geometry and records one command buffer per swapchain image for
//! every object. A frame then only acquires an image, submits that image's
//! buffers in scene order and presents.

use std::{rc::Rc, sync::Arc};

use ash::vk;
use winit::window::Window;

use crate::{
    config::RendererConfig,
    data_structures::{model::Model, object::Object, scene::Scene, shader::Shader},
    error::{RenderError, Result},
    pipelines::{self, ObjectUniform},
    renderer::{
        Operation, Renderer, RendererState, ResourceCounter, ResourceCounts, ResourceKind,
        release_scene_slots, upload_once,
    },
    resources::shader::{self, Interface},
};

use env::{Environment, GpuBuffer};

pub mod debug;
pub mod env;
pub mod select;
pub mod teardown;

// The bundles below own raw handles and are not `Clone`. Slots store them
// behind an `Rc`, so a cloned slot shares the bundle and only the last owner
// destroys it (see `last_owner`).

/// Geometry of one [`Model`], stored in its backend slot.
#[derive(Debug, Default)]
pub struct VulkanModelData {
    pub positions: GpuBuffer,
    pub normals: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

/// A compiled [`Shader`], stored in its backend slot.
#[derive(Debug)]
pub struct VulkanShaderData {
    pub module: vk::ShaderModule,
    pub interface: Interface,
}

/// Everything built for one object. Null handles mark steps not reached yet.
#[derive(Debug, Default)]
pub struct VulkanObjectData {
    pub uniform: GpuBuffer,
    pub descriptor_set: vk::DescriptorSet,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    /// Indexed by swapchain image.
    pub command_buffers: Vec<vk::CommandBuffer>,
}

/// Scene-wide state. Only used when there is nothing to draw: the buffers
/// then just clear the frame.
#[derive(Debug, Default)]
pub struct VulkanSceneData {
    pub clear_only: Vec<vk::CommandBuffer>,
}

/// Unwraps a bundle taken out of a slot. While a cloned slot still shares
/// it, nothing is returned and the handles stay alive for that owner.
pub fn last_owner<T>(bundle: Rc<T>) -> Option<T> {
    match Rc::try_unwrap(bundle) {
        Ok(bundle) => Some(bundle),
        Err(shared) => {
            log::warn!(
                "{} is still shared by {} other slot(s), leaving it to them",
                std::any::type_name::<T>(),
                Rc::strong_count(&shared) - 1
            );
            None
        }
    }
}

/// Fails when `objects` would need more descriptor sets than the pool holds.
pub fn ensure_capacity(objects: usize, capacity: u32) -> Result<()> {
    if objects > capacity as usize {
        return Err(RenderError::resource(
            "descriptor set",
            format!("{objects} objects exceed the pool capacity of {capacity}"),
        ));
    }
    Ok(())
}

pub struct VulkanRenderer {
    config: RendererConfig,
    state: RendererState,
    env: Option<Environment>,
    frames: u64,
    counts: ResourceCounter,
}

impl VulkanRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            state: RendererState::Uninitialized,
            env: None,
            frames: 0,
            counts: ResourceCounter::default(),
        }
    }

    /// The environment, once `initialize` succeeded.
    pub fn environment(&self) -> Option<&Environment> {
        self.env.as_ref()
    }

    fn env(&self, op: Operation) -> Result<&Environment> {
        self.env.as_ref().ok_or(RenderError::InvalidState {
            operation: op,
            state: self.state,
        })
    }
}

impl Renderer for VulkanRenderer {
    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn state(&self) -> RendererState {
        self.state
    }

    fn initialize(&mut self, window: Arc<Window>) -> Result<()> {
        self.state.check(Operation::Initialize)?;
        let env = Environment::new(window, &self.config)?;
        log::debug!("Vulkan environment holds {:?}", env.created_objects());
        self.env = Some(env);
        self.state = self.state.after(Operation::Initialize);
        Ok(())
    }

    fn bind_scene_resources(&mut self, scene: &mut Scene) -> Result<()> {
        self.state.check(Operation::BindScene)?;
        let env = self.env(Operation::BindScene)?;

        if let Err(err) = bind_scene(env, &self.counts, scene) {
            // leave nothing half-built behind; the state stays Initialized
            if let Err(release_err) = release_scene(env, &self.counts, scene) {
                log::warn!("Cleaning up the failed bind: {release_err}");
            }
            return Err(err);
        }
        log::info!("Bound {} to the Vulkan backend", self.counts.get());
        self.state = self.state.after(Operation::BindScene);
        Ok(())
    }

    fn render_frame(&mut self, scene: &Scene) -> Result<()> {
        self.state.check(Operation::RenderFrame)?;
        let env = self.env(Operation::RenderFrame)?;
        draw_frame(env, scene)?;
        self.frames += 1;
        self.state = self.state.after(Operation::RenderFrame);
        Ok(())
    }

    fn release_resources(&mut self, scene: &mut Scene) -> Result<()> {
        self.state.check(Operation::Release)?;
        let mut outcome = Ok(());
        if self.state.holds_scene() {
            if let Some(env) = &self.env {
                outcome = release_scene(env, &self.counts, scene);
            }
        }
        if self.state.holds_resources() {
            if let Some(env) = self.env.take() {
                let idle = env.wait_idle();
                // unwinds the environment
                drop(env);
                outcome = outcome.and(idle);
            }
            log::debug!("Vulkan environment released");
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

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if self.state.holds_scene() {
            log::warn!("Vulkan renderer dropped without release_resources; scene resources leak");
        }
    }
}

fn bind_scene(env: &Environment, counts: &ResourceCounter, scene: &mut Scene) -> Result<()> {
    ensure_capacity(scene.objects.len(), env.object_capacity)?;

    if scene.objects.is_empty() {
        let clear_only = env.allocate_command_buffers()?;
        scene.backend_data.set(Rc::new(VulkanSceneData {
            clear_only: clear_only.clone(),
        }));
        record_clear_only(env, &clear_only)?;
        return Ok(());
    }

    for index in 0..scene.objects.len() {
        let data = build_object(env, counts, scene, index)?;
        scene.objects[index].backend_data.set(Rc::new(data));
        counts.created(ResourceKind::Object);
    }
    Ok(())
}

fn build_object(
    env: &Environment,
    counts: &ResourceCounter,
    scene: &Scene,
    index: usize,
) -> Result<VulkanObjectData> {
    let mut data = VulkanObjectData::default();
    match fill_object(env, counts, scene, index, &mut data) {
        Ok(()) => Ok(data),
        Err(err) => {
            destroy_object_data(env, &data);
            Err(err)
        }
    }
}

fn fill_object(
    env: &Environment,
    counts: &ResourceCounter,
    scene: &Scene,
    index: usize,
    data: &mut VulkanObjectData,
) -> Result<()> {
    let object = &scene.objects[index];

    let vertex = prepare_shader(env, counts, &object.vertex_shader)?;
    let fragment = prepare_shader(env, counts, &object.fragment_shader)?;
    shader::link(&vertex.interface, &fragment.interface)?;

    if upload_once(&object.model.backend_data, || {
        upload_model(env, &object.model).map(Rc::new)
    })? {
        counts.created(ResourceKind::Model);
    }
    let model = object
        .model
        .backend_data
        .borrow()
        .get::<Rc<VulkanModelData>>()?
        .clone();

    data.uniform = env.create_buffer(
        "uniform buffer",
        ObjectUniform::new(scene, object).as_bytes(),
        vk::BufferUsageFlags::UNIFORM_BUFFER,
    )?;
    data.descriptor_set = env.allocate_descriptor_set(&data.uniform)?;
    data.pipeline_layout = pipelines::vulkan::mk_pipeline_layout(env)?;
    data.pipeline = pipelines::vulkan::mk_render_pipeline(
        env,
        data.pipeline_layout,
        vertex.module,
        fragment.module,
    )?;
    data.command_buffers = env.allocate_command_buffers()?;
    record_object(env, object, data, &model, index == 0)?;
    log::debug!("Object {index} ({}) ready", object.model.name);
    Ok(())
}

fn prepare_shader(
    env: &Environment,
    counts: &ResourceCounter,
    shader: &Shader,
) -> Result<Rc<VulkanShaderData>> {
    let fresh = upload_once(&shader.backend_data, || {
        let compiled = shader::load_and_compile(shader)?;
        let words = shader::to_spirv(&compiled)?;
        let module = env.create_shader_module(&words)?;
        log::debug!("Compiled {} shader {}", shader.stage, shader.path.display());
        Ok(Rc::new(VulkanShaderData {
            module,
            interface: compiled.interface(),
        }))
    })?;
    if fresh {
        counts.created(ResourceKind::Shader);
    }
    Ok(shader
        .backend_data
        .borrow()
        .get::<Rc<VulkanShaderData>>()?
        .clone())
}

fn upload_model(env: &Environment, model: &Model) -> Result<VulkanModelData> {
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

    let mut data = VulkanModelData {
        index_count: model.index_count(),
        ..Default::default()
    };
    let uploaded: Result<()> = (|| {
        data.positions = env.create_buffer(
            "vertex buffer",
            bytemuck::cast_slice(&model.positions),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        data.normals = env.create_buffer(
            "normal buffer",
            bytemuck::cast_slice(&model.normals),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        data.indices = env.create_buffer(
            "index buffer",
            bytemuck::cast_slice(&model.indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        Ok(())
    })();
    if let Err(err) = uploaded {
        destroy_model_data(env, &data);
        return Err(err);
    }
    log::debug!(
        "Uploaded model {} ({} vertices, {} indices)",
        model.name,
        model.vertex_count(),
        data.index_count
    );
    Ok(data)
}

fn begin(env: &Environment, cmd: vk::CommandBuffer) -> Result<()> {
    // SIMULTANEOUS_USE: the same buffers are resubmitted every frame
    let info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
    unsafe { env.device.begin_command_buffer(cmd, &info) }
        .map_err(|e| RenderError::resource("command buffer recording", e))
}

fn begin_pass(env: &Environment, cmd: vk::CommandBuffer, image: usize, clear: bool) {
    let [r, g, b, a] = env.clear_colour;
    let clear_values = [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [r, g, b, a],
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ];
    let info = vk::RenderPassBeginInfo::default()
        .render_pass(if clear {
            env.render_pass
        } else {
            env.load_render_pass
        })
        .framebuffer(env.framebuffers[image])
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: env.extent,
        })
        .clear_values(&clear_values);
    unsafe {
        env.device
            .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
    };
}

fn end(env: &Environment, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe {
        env.device.cmd_end_render_pass(cmd);
        env.device.end_command_buffer(cmd)
    }
    .map_err(|e| RenderError::resource("command buffer recording", e))
}

fn record_object(
    env: &Environment,
    object: &Object,
    data: &VulkanObjectData,
    model: &VulkanModelData,
    first: bool,
) -> Result<()> {
    for (image, &cmd) in data.command_buffers.iter().enumerate() {
        begin(env, cmd)?;
        begin_pass(env, cmd, image, first);
        unsafe {
            let device = &env.device;
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, data.pipeline);
            device.cmd_bind_vertex_buffers(
                cmd,
                0,
                &[model.positions.buffer, model.normals.buffer],
                &[0, 0],
            );
            device.cmd_bind_index_buffer(cmd, model.indices.buffer, 0, vk::IndexType::UINT32);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                data.pipeline_layout,
                0,
                &[data.descriptor_set],
                &[],
            );
            device.cmd_draw_indexed(cmd, model.index_count, 1, 0, 0, 0);
        }
        end(env, cmd)?;
    }
    log::trace!(
        "Recorded {} command buffer(s) for {}",
        data.command_buffers.len(),
        object.model.name
    );
    Ok(())
}

fn record_clear_only(env: &Environment, buffers: &[vk::CommandBuffer]) -> Result<()> {
    for (image, &cmd) in buffers.iter().enumerate() {
        begin(env, cmd)?;
        begin_pass(env, cmd, image, true);
        end(env, cmd)?;
    }
    Ok(())
}

fn draw_frame(env: &Environment, scene: &Scene) -> Result<()> {
    let (image_index, suboptimal) = unsafe {
        env.swapchain_loader.acquire_next_image(
            env.swapchain,
            env.acquire_timeout,
            env.image_available,
            vk::Fence::null(),
        )
    }
    .map_err(|e| RenderError::sync("acquiring a swapchain image", e))?;
    if suboptimal {
        log::warn!("Swapchain is suboptimal for the surface");
    }
    let image = image_index as usize;

    let command_buffers = if scene.objects.is_empty() {
        let data = scene.backend_data.get::<Rc<VulkanSceneData>>()?;
        vec![data.clear_only[image]]
    } else {
        scene
            .objects
            .iter()
            .map(|object| {
                let data = object.backend_data.get::<Rc<VulkanObjectData>>()?;
                Ok(data.command_buffers[image])
            })
            .collect::<Result<Vec<_>>>()?
    };

    let wait = [env.image_available];
    let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
    let signal = [env.render_finished];
    let submit = vk::SubmitInfo::default()
        .wait_semaphores(&wait)
        .wait_dst_stage_mask(&wait_stages)
        .command_buffers(&command_buffers)
        .signal_semaphores(&signal);
    unsafe {
        env.device
            .queue_submit(env.graphics_queue, &[submit], vk::Fence::null())
    }
    .map_err(|e| RenderError::sync("submitting draw commands", e))?;

    let swapchains = [env.swapchain];
    let indices = [image_index];
    let present = vk::PresentInfoKHR::default()
        .wait_semaphores(&signal)
        .swapchains(&swapchains)
        .image_indices(&indices);
    let suboptimal = unsafe { env.swapchain_loader.queue_present(env.present_queue, &present) }
        .map_err(|e| RenderError::sync("presenting", e))?;
    if suboptimal {
        log::warn!("Swapchain is suboptimal for the surface");
    }

    // one frame in flight: the semaphores and command buffers are reused next frame
    unsafe { env.device.queue_wait_idle(env.present_queue) }
        .map_err(|e| RenderError::sync("waiting for presentation", e))
}

fn destroy_object_data(env: &Environment, data: &VulkanObjectData) {
    env.free_command_buffers(&data.command_buffers);
    unsafe {
        env.device.destroy_pipeline(data.pipeline, None);
        env.device.destroy_pipeline_layout(data.pipeline_layout, None);
    }
    if data.descriptor_set != vk::DescriptorSet::null() {
        env.free_descriptor_set(data.descriptor_set);
    }
    env.destroy_buffer(&data.uniform);
}

fn destroy_model_data(env: &Environment, data: &VulkanModelData) {
    env.destroy_buffer(&data.indices);
    env.destroy_buffer(&data.normals);
    env.destroy_buffer(&data.positions);
}

/// Frees everything `bind_scene` created, newest first. Slots that hold
/// nothing, or something another backend put there, are skipped.
fn release_scene(env: &Environment, counts: &ResourceCounter, scene: &mut Scene) -> Result<()> {
    let waited = release_scene_slots(
        scene,
        || env.wait_idle(),
        |_, data: Rc<VulkanObjectData>| {
            if let Some(data) = last_owner(data) {
                destroy_object_data(env, &data);
                counts.freed(ResourceKind::Object);
            }
        },
        |_, data: Rc<VulkanModelData>| {
            if let Some(data) = last_owner(data) {
                destroy_model_data(env, &data);
                counts.freed(ResourceKind::Model);
            }
        },
        |_, data: Rc<VulkanShaderData>| {
            if let Some(data) = last_owner(data) {
                unsafe { env.device.destroy_shader_module(data.module, None) };
                counts.freed(ResourceKind::Shader);
            }
        },
    );

    if let Ok(data) = scene.backend_data.take::<Rc<VulkanSceneData>>() {
        if let Some(data) = last_owner(data) {
            env.free_command_buffers(&data.clear_only);
        }
    }
    waited
}
