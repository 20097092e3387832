//! Pure selection logic for device, queue and swapchain setup.
//!
//! Nothing here touches a live Vulkan object, so every rule can be tested
//! without a GPU.

use ash::vk;

/// Ranks a physical device by its type. Higher wins.
pub fn score_device(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    }
}

/// Queue family indices used for drawing and presenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Picks a graphics and a present family.
///
/// A single family doing both is preferred. Otherwise the first graphics
/// family is paired with the first family that can present.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let is_graphics = |props: &vk::QueueFamilyProperties| {
        props.queue_count > 0 && props.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    let mut graphics = None;
    let mut present = None;
    for (index, props) in families.iter().enumerate() {
        let index = index as u32;
        let can_draw = is_graphics(props);
        let can_present = props.queue_count > 0 && supports_present(index);
        if can_draw && can_present {
            return Some(QueueFamilies {
                graphics: index,
                present: index,
            });
        }
        if can_draw && graphics.is_none() {
            graphics = Some(index);
        }
        if can_present && present.is_none() {
            present = Some(index);
        }
    }
    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

/// Window size clamped per axis to what the surface accepts.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_size: [u32; 2]) -> vk::Extent2D {
    // max before min so a bogus min > max report cannot panic
    let clamp = |value: u32, min: u32, max: u32| value.min(max).max(min);
    vk::Extent2D {
        width: clamp(
            window_size[0],
            caps.min_image_extent.width,
            caps.max_image_extent.width,
        ),
        height: clamp(
            window_size[1],
            caps.min_image_extent.height,
            caps.max_image_extent.height,
        ),
    }
}

/// MAILBOX when offered, FIFO otherwise. FIFO is always available.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if formats.is_empty() {
        return None;
    }

    let preferred = formats.iter().copied().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB
            && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    Some(preferred.unwrap_or(formats[0]))
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        wanted.min(caps.max_image_count)
    } else {
        wanted
    }
}

pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate the device can use as an optimally tiled depth attachment.
pub fn choose_depth_format(
    candidates: &[vk::Format],
    optimal_features: impl Fn(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        optimal_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Index of a memory type allowed by `type_bits` that has all of `flags`.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory.memory_types[..memory.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, ty)| type_bits & (1 << index) != 0 && ty.property_flags.contains(flags))
        .map(|(index, _)| index as u32)
}
