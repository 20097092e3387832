//! Everything the Vulkan backend needs before it can draw anything.
//!
//! [`Environment::new`] walks the usual bring-up sequence: instance, debug
//! messenger, surface, physical device, logical device, swapchain, image views,
//! depth buffer, render passes, framebuffers, pools and semaphores. Each object
//! registers its destruction on a [`TeardownStack`] as soon as it exists.

use std::{ffi::CString, sync::Arc};

use ash::{
    ext::debug_utils,
    khr::{surface, swapchain},
    vk,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

use crate::{
    config::RendererConfig,
    error::{RenderError, Result},
    vulkan::{
        debug,
        select::{self, QueueFamilies},
        teardown::TeardownStack,
    },
};

/// A buffer together with its host-visible memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
}

pub struct Environment {
    // Dropped first: unwinds every Vulkan object below in reverse order.
    teardown: TeardownStack,

    pub instance: ash::Instance,
    pub surface_loader: surface::Instance,
    pub swapchain_loader: swapchain::Device,
    pub device: ash::Device,

    pub physical_device: vk::PhysicalDevice,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub surface: vk::SurfaceKHR,
    pub swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub depth: GpuImage,

    /// Clears colour and depth. Used by the first object of a frame.
    pub render_pass: vk::RenderPass,
    /// Same attachments as `render_pass` but loads them.
    pub load_render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,

    pub command_pool: vk::CommandPool,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    /// Descriptor sets the pool can hand out, one per object.
    pub object_capacity: u32,

    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,

    pub clear_colour: [f32; 4],
    pub acquire_timeout: u64,

    // Kept alive for the lifetime of the surface and the loader.
    _window: Arc<Window>,
    _entry: ash::Entry,
}

impl Environment {
    pub fn new(window: Arc<Window>, config: &RendererConfig) -> Result<Self> {
        let mut teardown = TeardownStack::new();

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RenderError::setup("loading the Vulkan library", e))?;

        let display = window
            .display_handle()
            .map_err(|e| RenderError::setup("querying the display handle", e))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| RenderError::setup("querying the window handle", e))?
            .as_raw();

        // 1. instance
        let debug = config.debug && debug::validation_available(&entry);
        if config.debug && !debug {
            log::warn!("Validation requested but {:?} is not installed.", debug::VALIDATION_LAYER);
        }
        let instance = create_instance(&entry, display, debug, &config.app_name)?;
        {
            let instance = instance.clone();
            teardown.push("instance", move || unsafe { instance.destroy_instance(None) });
        }

        if debug {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let messenger = debug::create_messenger(&loader)
                .map_err(|e| RenderError::setup("creating the debug messenger", e))?;
            teardown.push("debug messenger", move || unsafe {
                loader.destroy_debug_utils_messenger(messenger, None)
            });
        }

        // 2. surface
        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(&entry, &instance, display, window_handle, None)
        }
        .map_err(|e| RenderError::setup("creating the window surface", e))?;
        {
            let loader = surface_loader.clone();
            teardown.push("surface", move || unsafe { loader.destroy_surface(surface, None) });
        }

        // 3. physical device
        let (physical_device, queue_families) =
            pick_physical_device(&instance, &surface_loader, surface)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Using {:?} ({:?})",
            properties.device_name_as_c_str().unwrap_or(c"unknown device"),
            properties.device_type
        );
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        // 4. logical device
        let device = create_device(&instance, physical_device, queue_families)?;
        {
            let device = device.clone();
            teardown.push("device", move || unsafe { device.destroy_device(None) });
        }
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        // 5. swapchain
        let caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
        }
        .map_err(|e| RenderError::setup("querying surface capabilities", e))?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)
        }
        .map_err(|e| RenderError::setup("querying surface formats", e))?;
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)
        }
        .map_err(|e| RenderError::setup("querying present modes", e))?;

        let size = window.inner_size();
        let extent = select::choose_extent(&caps, [size.width, size.height]);
        let present_mode = select::choose_present_mode(&present_modes);
        let surface_format = select::choose_surface_format(&formats)
            .ok_or_else(|| RenderError::setup("choosing a surface format", "none reported"))?;
        log::info!(
            "Swapchain {}x{} {:?} {:?} {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode
        );

        let swapchain_loader = swapchain::Device::new(&instance, &device);
        let family_indices = queue_families.unique();
        let composite_alpha = if caps
            .supported_composite_alpha
            .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
        {
            vk::CompositeAlphaFlagsKHR::OPAQUE
        } else {
            vk::CompositeAlphaFlagsKHR::INHERIT
        };
        let mut swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(select::choose_image_count(&caps))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode)
            .clipped(true);
        swapchain_info = if queue_families.is_shared() {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };
        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_info, None) }
            .map_err(|e| RenderError::setup("creating the swapchain", e))?;
        {
            let loader = swapchain_loader.clone();
            teardown.push("swapchain", move || unsafe { loader.destroy_swapchain(swapchain, None) });
        }
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| RenderError::setup("fetching swapchain images", e))?;

        // 6. image views and depth buffer
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = create_image_view(
                &device,
                image,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            let device = device.clone();
            teardown.push("swapchain image view", move || unsafe {
                device.destroy_image_view(view, None)
            });
            image_views.push(view);
        }

        let depth_format = select::choose_depth_format(&select::DEPTH_FORMAT_CANDIDATES, |f| unsafe {
            instance
                .get_physical_device_format_properties(physical_device, f)
                .optimal_tiling_features
        })
        .ok_or_else(|| RenderError::setup("choosing a depth format", "no candidate supported"))?;
        let depth = create_image(
            &device,
            &memory_properties,
            "depth image",
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_aspect(depth_format),
        )?;
        {
            let device = device.clone();
            teardown.push("depth image", move || unsafe {
                device.destroy_image_view(depth.view, None);
                device.destroy_image(depth.image, None);
                device.free_memory(depth.memory, None);
            });
        }

        // 7. render passes
        let render_pass = create_render_pass(&device, surface_format.format, depth_format, true)?;
        {
            let device = device.clone();
            teardown.push("render pass", move || unsafe {
                device.destroy_render_pass(render_pass, None)
            });
        }
        let load_render_pass =
            create_render_pass(&device, surface_format.format, depth_format, false)?;
        {
            let device = device.clone();
            teardown.push("load render pass", move || unsafe {
                device.destroy_render_pass(load_render_pass, None)
            });
        }

        // 8. framebuffers
        let mut framebuffers = Vec::with_capacity(image_views.len());
        for &view in &image_views {
            let attachments = [view, depth.view];
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { device.create_framebuffer(&info, None) }
                .map_err(|e| RenderError::resource("framebuffer", e))?;
            let device = device.clone();
            teardown.push("framebuffer", move || unsafe {
                device.destroy_framebuffer(framebuffer, None)
            });
            framebuffers.push(framebuffer);
        }

        // 9. pools and the shared descriptor set layout
        let pool_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(queue_families.graphics);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| RenderError::resource("command pool", e))?;
        {
            let device = device.clone();
            teardown.push("command pool", move || unsafe {
                device.destroy_command_pool(command_pool, None)
            });
        }

        let object_capacity = config.object_capacity();
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(object_capacity)];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(object_capacity)
            .pool_sizes(&pool_sizes);
        let descriptor_pool =
            unsafe { device.create_descriptor_pool(&descriptor_pool_info, None) }
                .map_err(|e| RenderError::resource("descriptor pool", e))?;
        {
            let device = device.clone();
            teardown.push("descriptor pool", move || unsafe {
                device.destroy_descriptor_pool(descriptor_pool, None)
            });
        }

        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let descriptor_set_layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }
                .map_err(|e| RenderError::resource("descriptor set layout", e))?;
        {
            let device = device.clone();
            teardown.push("descriptor set layout", move || unsafe {
                device.destroy_descriptor_set_layout(descriptor_set_layout, None)
            });
        }

        // 10. semaphores
        let image_available = create_semaphore(&device, &mut teardown, "image-available semaphore")?;
        let render_finished = create_semaphore(&device, &mut teardown, "render-finished semaphore")?;

        log::debug!("Vulkan environment ready: {teardown:?}");

        Ok(Self {
            teardown,
            instance,
            surface_loader,
            swapchain_loader,
            device,
            physical_device,
            memory_properties,
            queue_families,
            graphics_queue,
            present_queue,
            surface,
            swapchain,
            surface_format,
            present_mode,
            extent,
            images,
            image_views,
            depth,
            render_pass,
            load_render_pass,
            framebuffers,
            command_pool,
            descriptor_pool,
            descriptor_set_layout,
            object_capacity,
            image_available,
            render_finished,
            clear_colour: config.clear_colour_f32(),
            acquire_timeout: config.acquire_timeout_nanos(),
            _window: window,
            _entry: entry,
        })
    }

    /// Objects created by `new`, in creation order.
    pub fn created_objects(&self) -> Vec<&'static str> {
        self.teardown.labels()
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| RenderError::sync("waiting for the device to idle", e))
    }

    /// Creates a 2D image in device-local memory together with a view of it.
    pub fn create_image(
        &self,
        resource: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<GpuImage> {
        create_image(
            &self.device,
            &self.memory_properties,
            resource,
            extent,
            format,
            usage,
            aspect,
        )
    }

    pub fn destroy_image(&self, image: &GpuImage) {
        unsafe {
            self.device.destroy_image_view(image.view, None);
            self.device.destroy_image(image.image, None);
            self.device.free_memory(image.memory, None);
        }
    }

    /// Creates a host-visible buffer holding `data`.
    pub fn create_buffer(
        &self,
        resource: &'static str,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer> {
        if data.is_empty() {
            return Err(RenderError::resource(resource, "no data to upload"));
        }
        let size = data.len() as vk::DeviceSize;
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&info, None) }
            .map_err(|e| RenderError::resource(resource, e))?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = match self.allocate(
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            resource,
        ) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };
        let gpu = GpuBuffer {
            buffer,
            memory,
            size,
        };
        let bound = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }
            .map_err(|e| RenderError::resource(resource, e))
            .and_then(|()| self.write_buffer(&gpu, data, resource));
        if let Err(err) = bound {
            self.destroy_buffer(&gpu);
            return Err(err);
        }
        log::trace!("created {resource} ({size} bytes)");
        Ok(gpu)
    }

    /// Copies `data` to the start of `buffer` through a mapped pointer.
    pub fn write_buffer(&self, buffer: &GpuBuffer, data: &[u8], resource: &'static str) -> Result<()> {
        let len = (data.len() as vk::DeviceSize).min(buffer.size);
        unsafe {
            let ptr = self
                .device
                .map_memory(buffer.memory, 0, len, vk::MemoryMapFlags::empty())
                .map_err(|e| RenderError::resource(resource, e))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), len as usize);
            self.device.unmap_memory(buffer.memory);
        }
        Ok(())
    }

    pub fn destroy_buffer(&self, buffer: &GpuBuffer) {
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
            self.device.free_memory(buffer.memory, None);
        }
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
        resource: &'static str,
    ) -> Result<vk::DeviceMemory> {
        allocate_memory(&self.device, &self.memory_properties, requirements, flags)
            .map_err(|reason| RenderError::resource(resource, reason))
    }

    pub fn create_shader_module(&self, words: &[u32]) -> Result<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::default().code(words);
        unsafe { self.device.create_shader_module(&info, None) }
            .map_err(|e| RenderError::resource("shader module", e))
    }

    /// One primary command buffer per swapchain image.
    pub fn allocate_command_buffers(&self) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.framebuffers.len() as u32);
        unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| RenderError::resource("command buffers", e))
    }

    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe { self.device.free_command_buffers(self.command_pool, buffers) };
        }
    }

    /// Allocates a descriptor set pointing binding 0 at `uniform`.
    pub fn allocate_descriptor_set(&self, uniform: &GpuBuffer) -> Result<vk::DescriptorSet> {
        let layouts = [self.descriptor_set_layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&info) }
            .map_err(|e| RenderError::resource("descriptor set", e))?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::resource("descriptor set", "driver returned none"))?;

        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(uniform.buffer)
            .offset(0)
            .range(uniform.size)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(set)
    }

    pub fn free_descriptor_set(&self, set: vk::DescriptorSet) {
        if let Err(err) = unsafe { self.device.free_descriptor_sets(self.descriptor_pool, &[set]) } {
            log::warn!("Freeing a descriptor set failed: {err}");
        }
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::warn!("Tearing down without an idle device: {err}");
        }
        self.teardown.unwind();
    }
}

fn create_instance(
    entry: &ash::Entry,
    display: raw_window_handle::RawDisplayHandle,
    debug: bool,
    app_name: &str,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| RenderError::setup("creating the instance", e))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&app_name)
        .api_version(vk::API_VERSION_1_0);

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| RenderError::setup("listing the window system extensions", e))?
        .to_vec();
    let mut layers = Vec::new();
    if debug {
        extensions.push(debug_utils::NAME.as_ptr());
        layers.push(debug::VALIDATION_LAYER.as_ptr());
    }

    let info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);
    unsafe { entry.create_instance(&info, None) }
        .map_err(|e| RenderError::setup("creating the instance", e))
}

fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| RenderError::setup("enumerating physical devices", e))?;

    let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilies)> = None;
    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .unwrap_or(c"unknown device")
            .to_string_lossy()
            .into_owned();

        if !supports_swapchain(instance, device) {
            log::debug!("Skipping {name}: no swapchain extension");
            continue;
        }
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let Some(queues) = select::find_queue_families(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        }) else {
            log::debug!("Skipping {name}: no graphics and present queues");
            continue;
        };
        let has_formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device, surface)
        }
        .is_ok_and(|formats| !formats.is_empty());
        if !has_formats {
            log::debug!("Skipping {name}: no surface formats");
            continue;
        }

        let score = select::score_device(properties.device_type);
        log::debug!("Candidate {name} scores {score}");
        if best.is_none_or(|(best_score, _, _)| score > best_score) {
            best = Some((score, device, queues));
        }
    }

    best.map(|(_, device, queues)| (device, queues))
        .ok_or_else(|| RenderError::setup("choosing a physical device", "no suitable GPU found"))
}

fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    unsafe { instance.enumerate_device_extension_properties(device) }
        .map(|extensions| {
            extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str() == Ok(swapchain::NAME))
        })
        .unwrap_or(false)
}

fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
) -> Result<ash::Device> {
    let priorities = [1.0];
    let queue_infos: Vec<_> = families
        .unique()
        .into_iter()
        .map(|index| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(index)
                .queue_priorities(&priorities)
        })
        .collect();
    let extensions = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);
    unsafe { instance.create_device(physical_device, &info, None) }
        .map_err(|e| RenderError::setup("creating the logical device", e))
}

fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );
    unsafe { device.create_image_view(&info, None) }
        .map_err(|e| RenderError::resource("image view", e))
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if select::has_stencil(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

fn allocate_memory(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> std::result::Result<vk::DeviceMemory, String> {
    let type_index =
        select::find_memory_type(memory_properties, requirements.memory_type_bits, flags)
            .ok_or_else(|| format!("no memory type with {flags:?}"))?;
    let info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(type_index);
    unsafe { device.allocate_memory(&info, None) }.map_err(|e| e.to_string())
}

/// Creates a 2D image backed by device-local memory, plus a view of it.
fn create_image(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    resource: &'static str,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
) -> Result<GpuImage> {
    let info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&info, None) }
        .map_err(|e| RenderError::resource(resource, e))?;

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory = match allocate_memory(
        device,
        memory_properties,
        requirements,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    ) {
        Ok(memory) => memory,
        Err(reason) => {
            unsafe { device.destroy_image(image, None) };
            return Err(RenderError::resource(resource, reason));
        }
    };
    let view = unsafe { device.bind_image_memory(image, memory, 0) }
        .map_err(|e| RenderError::resource(resource, e))
        .and_then(|()| create_image_view(device, image, format, aspect));
    match view {
        Ok(view) => Ok(GpuImage {
            image,
            memory,
            view,
            format,
        }),
        Err(err) => {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            Err(err)
        }
    }
}

/// Colour + depth render pass. `clear` selects the first-object variant; the
/// other one loads what earlier passes left in both attachments.
fn create_render_pass(
    device: &ash::Device,
    colour_format: vk::Format,
    depth_format: vk::Format,
    clear: bool,
) -> Result<vk::RenderPass> {
    let (load_op, colour_initial, depth_initial) = if clear {
        (
            vk::AttachmentLoadOp::CLEAR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::UNDEFINED,
        )
    } else {
        (
            vk::AttachmentLoadOp::LOAD,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
    };

    let attachments = [
        vk::AttachmentDescription::default()
            .format(colour_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(colour_initial)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(depth_initial)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];
    let colour_ref = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let depth_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&colour_ref)
        .depth_stencil_attachment(&depth_ref)];

    // attachment writes wait for the presentation engine and for earlier passes
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ
                | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe { device.create_render_pass(&info, None) }
        .map_err(|e| RenderError::resource("render pass", e))
}

fn create_semaphore(
    device: &ash::Device,
    teardown: &mut TeardownStack,
    label: &'static str,
) -> Result<vk::Semaphore> {
    let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
        .map_err(|e| RenderError::resource(label, e))?;
    let device = device.clone();
    teardown.push(label, move || unsafe { device.destroy_semaphore(semaphore, None) });
    Ok(semaphore)
}
