use ash::vk;

use crate::{
    error::{RenderError, Result},
    pipelines::{NORMAL_LOCATION, POSITION_LOCATION, VEC3_STRIDE},
    vulkan::env::Environment,
};

/// Positions come from binding 0 and normals from binding 1, one `vec3` each.
fn vertex_bindings() -> [vk::VertexInputBindingDescription; 2] {
    [
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(VEC3_STRIDE as u32)
            .input_rate(vk::VertexInputRate::VERTEX),
        vk::VertexInputBindingDescription::default()
            .binding(1)
            .stride(VEC3_STRIDE as u32)
            .input_rate(vk::VertexInputRate::VERTEX),
    ]
}

fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription::default()
            .binding(0)
            .location(POSITION_LOCATION)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0),
        vk::VertexInputAttributeDescription::default()
            .binding(1)
            .location(NORMAL_LOCATION)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0),
    ]
}

pub fn mk_pipeline_layout(env: &Environment) -> Result<vk::PipelineLayout> {
    let set_layouts = [env.descriptor_set_layout];
    let info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
    unsafe { env.device.create_pipeline_layout(&info, None) }
        .map_err(|e| RenderError::resource("pipeline layout", e))
}

/// Builds the graphics pipeline for one object.
///
/// Viewport and scissor are baked in from the swapchain extent, the window
/// is not resizable. Rasterization fills without culling so both faces of
/// open geometry are visible; depth test is LESS with writes, blending off.
pub fn mk_render_pipeline(
    env: &Environment,
    layout: vk::PipelineLayout,
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let entry_point = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex)
            .name(entry_point),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment)
            .name(entry_point),
    ];

    let bindings = vertex_bindings();
    let attributes = vertex_attributes();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: env.extent.width as f32,
        height: env.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: env.extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let colour_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&colour_blend)
        .layout(layout)
        .render_pass(env.render_pass)
        .subpass(0);

    let pipelines = unsafe {
        env.device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
    }
    .map_err(|(_, e)| RenderError::resource("graphics pipeline", e))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RenderError::resource("graphics pipeline", "driver returned none"))
}
