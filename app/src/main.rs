//! Scaffold entrypoint (§6 "Entrypoint", §1 "CLI surface"): wires a headless
//! `Window` and an in-memory `Scene` to the backend for smoke-level
//! exercising. A real windowed application — one that can actually build a
//! `Renderer` against a live surface — is a downstream collaborator's job;
//! this binary only proves the resource manager and its collaborator
//! contracts are wired together correctly.

use anyhow::{Context as _, Result};
use graphics_backend::context::Context;
use graphics_backend::device::LogicalDevice;
use graphics_backend::instance::Instance;
use graphics_backend::phy_device::PhyDevice;
use graphics_backend_traits::asset::{AssetSystem, FsAssetSystem};
use graphics_backend_traits::scene::{Camera, InMemoryScene, Mat4, Scene};
use graphics_backend_traits::window::HeadlessWindow;
use graphics_types::{BufferUsage, Format, ImageUsage, MemoryLocation, RendererConfig};
use raw_window_handle::HasWindowHandle;

const IDENTITY: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// `res://renderer.toml` if present, else the built-in default (§6
/// "configuration table").
fn load_config(assets: &FsAssetSystem) -> RendererConfig {
    let text = assets
        .get_absolute_path("res://renderer.toml")
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok());
    match text {
        Some(text) => RendererConfig::from_toml_str(&text).unwrap_or_else(|e| {
            log::warn!("ignoring invalid res://renderer.toml: {e}");
            RendererConfig::default()
        }),
        None => RendererConfig::default(),
    }
}

/// Exercises buffer/image creation and teardown against a real device
/// without needing a swapchain, which a `HeadlessWindow` cannot provide a
/// surface for.
fn run_resource_smoke_pass(ctx: &mut Context) -> Result<()> {
    let uniform = ctx
        .buffer_create(256, BufferUsage::UNIFORM, MemoryLocation::CpuVisible)
        .context("smoke-pass uniform buffer")?;
    ctx.buffer_free(uniform);

    let pixels = [0u8; 4 * 4 * 4];
    let image = ctx
        .image_create(4, 4, Format::R8G8B8A8Unorm, ImageUsage::SAMPLED, 1, false, Some(&pixels))
        .context("smoke-pass staged image upload")?;
    ctx.image_free(image);

    log::info!("resource manager smoke pass complete");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let assets = FsAssetSystem::new();
    let config = load_config(&assets);

    let instance = Instance::new("app", &[], cfg!(debug_assertions)).context("Vulkan instance bring-up")?;
    let phy_device = PhyDevice::select(&instance.raw, &config.gpu, true).context("physical device selection")?;
    log::info!(
        "selected {} ({:?}, {} driver {})",
        phy_device.renderer_name,
        phy_device.gpu_type,
        phy_device.vendor_name,
        phy_device.driver_version_string
    );
    let device = LogicalDevice::new(&instance.raw, &phy_device).context("logical device bring-up")?;
    let mut ctx = Context::new(instance, phy_device, device, config).context("context bring-up")?;

    let window = HeadlessWindow::new(1280, 720);
    if window.window_handle().is_err() {
        log::info!("no live window backend wired in; skipping swapchain/renderer bring-up");
        run_resource_smoke_pass(&mut ctx)?;
    }

    let scene = InMemoryScene {
        camera: Some(Camera { view: IDENTITY, proj: IDENTITY, position: [0.0, 0.0, 0.0], enabled: true }),
        instances: Vec::new(),
    };
    log::info!(
        "scene wired: active_camera={}, mesh_instances={}",
        scene.active_camera().is_some(),
        scene.mesh_instances().len()
    );

    ctx.device_wait_idle().context("final device wait idle")?;
    Ok(())
}
