use instant::Duration;

/// Knobs shared by both backends. The binary fills this from its command line.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Enables the Vulkan validation layer and routes its messages to `log`.
    pub debug: bool,
    pub clear_colour: wgpu::Color,
    /// Upper bound for a single swapchain image acquisition.
    pub acquire_timeout: Duration,
    /// Capacity of the Vulkan descriptor pool, one uniform buffer per object.
    pub max_objects: u32,
    /// Adapters the immediate backend may pick from.
    pub immediate_backends: wgpu::Backends,
    pub app_name: String,
    pub window_title: String,
    pub window_size: [u32; 2],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            debug: false,
            clear_colour: wgpu::Color {
                r: 0.05,
                g: 0.05,
                b: 0.08,
                a: 1.0,
            },
            acquire_timeout: Duration::from_secs(10),
            max_objects: 16,
            immediate_backends: wgpu::Backends::from_env().unwrap_or(wgpu::Backends::GL),
            app_name: "dual-render".to_string(),
            window_title: "dual-render".to_string(),
            window_size: [800, 800],
        }
    }
}

impl RendererConfig {
    pub fn clear_colour_f32(&self) -> [f32; 4] {
        let c = self.clear_colour;
        [c.r as f32, c.g as f32, c.b as f32, c.a as f32]
    }

    /// How many objects one scene may hold on the Vulkan backend. Never zero,
    /// the descriptor pool needs room for at least one set.
    pub fn object_capacity(&self) -> u32 {
        self.max_objects.max(1)
    }

    pub fn acquire_timeout_nanos(&self) -> u64 {
        u64::try_from(self.acquire_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}
