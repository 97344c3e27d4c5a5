use serde::{Deserialize, Serialize};

/// Renderer-recognized configuration (§6 "Configuration recognized by the
/// renderer"). Parsed from TOML by the application; this crate only
/// describes the shape so both the backend and its collaborators agree on
/// field names and defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Sample count for offscreen color/depth (1, 2, 4, 8, ... <= device max).
    pub msaa: u32,
    /// Offscreen render target size fraction, `0 < s <= 1`.
    pub resolution_scale: f32,
    /// Swapchain present mode preference.
    pub vsync: bool,
    /// Clear color for `ClearPass`.
    pub clear_color: [f32; 4],
    /// If false, the frame result is written to `final_image` instead of
    /// the swapchain, for consumption as a texture (e.g. editor viewport).
    pub present_to_swapchain: bool,
    /// `"auto"` or a substring match against the device name, mirroring
    /// the teacher's `options.gl.gpu` selector.
    pub gpu: String,
    /// Directory pipeline cache files are read from / written to.
    pub pipeline_cache_dir: String,
    /// Allocations at or below this size (bytes) are routed to a
    /// per-memory-type sub-pool instead of a dedicated driver allocation
    /// (§4.1).
    pub small_allocation_threshold: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            msaa: 1,
            resolution_scale: 1.0,
            vsync: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_to_swapchain: true,
            gpu: "auto".to_string(),
            pipeline_cache_dir: ".cache/pipelines".to_string(),
            small_allocation_threshold: 4096,
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
