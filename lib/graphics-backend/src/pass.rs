//! Pass pipeline (C10, §4.9): user-extensible render passes executed in
//! priority order against the renderer's named render images.

use ash::vk;
use graphics_backend_traits::scene::{Mat4, MeshPrimitiveId, Scene};

use crate::context::Context;
use crate::error::Result;
use crate::material::MaterialInstance;
use crate::renderer::Renderer;

/// Resolves the scene-owned GPU data a mesh draw needs that the core has
/// no business knowing the shape of (§6 "the scene owns the mapping from
/// id to GPU buffer handles").
pub struct MeshPrimitiveBuffers {
    pub vertex_buffer_address: vk::DeviceAddress,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// What `MeshPass` needs from its caller each frame: material instances by
/// id, and per-primitive GPU buffers (§6 Scene/asset-system boundary).
pub trait MeshPassResources {
    fn material_mut(&mut self, id: graphics_backend_traits::scene::MaterialInstanceId) -> Option<&mut MaterialInstance>;
    fn primitive(&self, id: MeshPrimitiveId) -> Option<MeshPrimitiveBuffers>;
    /// Buffer device address of the scene-wide data SSBO, if the active
    /// material layout wants one (§4.9 push-constant layout A).
    fn scene_buffer_address(&self) -> Option<vk::DeviceAddress>;
}

/// A registered render pass (§4.9). `setup` runs once at registration and
/// may declare named render images through `renderer.create_render_image`;
/// `execute` runs every frame in ascending priority order.
pub trait Pass: Send {
    fn priority(&self) -> i32;

    fn setup(&mut self, _ctx: &mut Context, _renderer: &mut Renderer) -> Result<()> {
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut Context,
        renderer: &Renderer,
        cmd: vk::CommandBuffer,
        scene: &dyn Scene,
        resources: &mut dyn MeshPassResources,
    ) -> Result<()>;
}

/// Clears `geo_albedo`/`geo_depth` at the start of the frame (§4.9
/// "begins/ends an empty render to clear both"). Priority −10 so it runs
/// before every other built-in or user pass.
pub struct ClearPass;

impl Pass for ClearPass {
    fn priority(&self) -> i32 {
        -10
    }

    fn setup(&mut self, ctx: &mut Context, renderer: &mut Renderer) -> Result<()> {
        let msaa = renderer.msaa();
        renderer.create_render_image(
            ctx,
            "geo_albedo",
            graphics_types::Format::R8G8B8A8Unorm,
            graphics_types::ImageUsage::COLOR_ATTACHMENT | graphics_types::ImageUsage::SAMPLED,
            msaa,
        )?;
        renderer.create_render_image(
            ctx,
            "geo_depth",
            graphics_types::Format::DEFAULT_DEPTH,
            graphics_types::ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            msaa,
        )?;
        Ok(())
    }

    fn execute(
        &mut self,
        ctx: &mut Context,
        renderer: &Renderer,
        cmd: vk::CommandBuffer,
        _scene: &dyn Scene,
        _resources: &mut dyn MeshPassResources,
    ) -> Result<()> {
        let color = ctx.image(renderer.color_image()).expect("geo_albedo must exist");
        let depth = ctx.image(renderer.depth_image()).expect("geo_depth must exist");

        let color_attachment = crate::commands::ColorAttachment {
            image_view: color.view,
            layout: graphics_types::ImageLayout::ColorAttachmentOptimal,
            load_op: graphics_types::AttachmentLoadOp::Clear,
            store_op: graphics_types::AttachmentStoreOp::Store,
            clear_color: Some(renderer.clear_color()),
            resolve: None,
        };
        let depth_attachment = crate::commands::DepthAttachment {
            image_view: depth.view,
            layout: graphics_types::ImageLayout::DepthAttachmentOptimal,
            load_op: graphics_types::AttachmentLoadOp::Clear,
            store_op: graphics_types::AttachmentStoreOp::Store,
            clear_depth: 1.0,
        };
        crate::commands::begin_rendering(
            &ctx.device.raw,
            cmd,
            renderer.render_extent_vk(),
            &[color_attachment],
            Some(&depth_attachment),
        );
        crate::commands::end_rendering(&ctx.device.raw, cmd);
        Ok(())
    }
}

fn mat4_mul(a: Mat4, b: Mat4) -> Mat4 {
    let mut out = [[0.0f32; 4]; 4];
    for row in 0..4 {
        for col in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[row][k] * b[k][col];
            }
            out[row][col] = sum;
        }
    }
    out
}

/// The six frustum planes in `ax + by + cz + d >= 0` form, extracted from
/// a combined view-projection matrix (Gribb/Hartmann method).
struct Frustum {
    planes: [[f32; 4]; 6],
}

impl Frustum {
    fn from_view_proj(m: Mat4) -> Frustum {
        let row = |i: usize| [m[0][i], m[1][i], m[2][i], m[3][i]];
        let r0 = row(0);
        let r1 = row(1);
        let r2 = row(2);
        let r3 = row(3);
        let add = |a: [f32; 4], b: [f32; 4]| [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]];
        let sub = |a: [f32; 4], b: [f32; 4]| [a[0] - b[0], a[1] - b[1], a[2] - b[2], a[3] - b[3]];
        let planes = [
            add(r3, r0),
            sub(r3, r0),
            add(r3, r1),
            sub(r3, r1),
            add(r3, r2),
            sub(r3, r2),
        ];
        Frustum { planes }
    }

    /// Conservative outside test: the AABB is entirely outside if every
    /// corner is on the negative side of some plane.
    fn aabb_entirely_outside(&self, aabb: &graphics_backend_traits::scene::Aabb) -> bool {
        for plane in &self.planes {
            let positive = [
                if plane[0] >= 0.0 { aabb.max[0] } else { aabb.min[0] },
                if plane[1] >= 0.0 { aabb.max[1] } else { aabb.min[1] },
                if plane[2] >= 0.0 { aabb.max[2] } else { aabb.min[2] },
            ];
            let d = plane[0] * positive[0] + plane[1] * positive[1] + plane[2] * positive[2] + plane[3];
            if d < 0.0 {
                return true;
            }
        }
        false
    }
}

/// Draws the scene's mesh instances into `geo_albedo`/`geo_depth` (§4.9).
/// Priority 0, runs after `ClearPass`.
pub struct MeshPass;

impl Pass for MeshPass {
    fn priority(&self) -> i32 {
        0
    }

    fn execute(
        &mut self,
        ctx: &mut Context,
        renderer: &Renderer,
        cmd: vk::CommandBuffer,
        scene: &dyn Scene,
        resources: &mut dyn MeshPassResources,
    ) -> Result<()> {
        let Some(camera) = scene.active_camera() else { return Ok(()) };
        if !camera.enabled {
            return Ok(());
        }

        let color = ctx.image(renderer.color_image()).expect("geo_albedo must exist");
        let depth = ctx.image(renderer.depth_image()).expect("geo_depth must exist");
        // With MSAA the renderer skips its own copy/blit step (§4.8): this,
        // the last pass in the built-in ordering, resolves straight into
        // the frame's present target instead.
        let resolve = if renderer.msaa() > 1 {
            renderer.current_resolve_target().map(|view| crate::commands::ResolveAttachment {
                image_view: view,
                layout: graphics_types::ImageLayout::ColorAttachmentOptimal,
                mode: graphics_types::ResolveMode::Average,
            })
        } else {
            None
        };
        let color_attachment = crate::commands::ColorAttachment {
            image_view: color.view,
            layout: graphics_types::ImageLayout::ColorAttachmentOptimal,
            load_op: graphics_types::AttachmentLoadOp::Load,
            store_op: graphics_types::AttachmentStoreOp::Store,
            clear_color: None,
            resolve,
        };
        let depth_attachment = crate::commands::DepthAttachment {
            image_view: depth.view,
            layout: graphics_types::ImageLayout::DepthAttachmentOptimal,
            load_op: graphics_types::AttachmentLoadOp::Load,
            store_op: graphics_types::AttachmentStoreOp::Store,
            clear_depth: 1.0,
        };
        crate::commands::begin_rendering(&ctx.device.raw, cmd, renderer.render_extent_vk(), &[color_attachment], Some(&depth_attachment));
        crate::commands::set_viewport_scissor(&ctx.device.raw, cmd, renderer.render_extent().0, renderer.render_extent().1);

        let view_proj = mat4_mul(camera.proj, camera.view);
        let frustum = Frustum::from_view_proj(view_proj);
        let scene_address = resources.scene_buffer_address();

        let mut bound_pipeline: Option<crate::handles::PipelineHandle> = None;
        for instance in scene.mesh_instances() {
            if frustum.aabb_entirely_outside(&instance.world_aabb) {
                continue;
            }
            let Some(material) = resources.material_mut(instance.material) else { continue };
            let Some(primitive) = resources.primitive(instance.primitive) else { continue };
            let shader_handle = material.shader();
            let pipeline_handle = material.pipeline_hint();
            if ctx.shader(shader_handle).is_none() {
                continue;
            }
            let Some(pipeline) = ctx.pipeline(pipeline_handle) else { continue };

            if bound_pipeline != Some(pipeline_handle) {
                crate::commands::bind_pipeline(&ctx.device.raw, cmd, pipeline.raw, pipeline.kind);
                bound_pipeline = Some(pipeline_handle);
            }

            material.upload(ctx)?;
            let set = ctx.uniform_set(material.uniform_set).map(|s| s.raw);
            if let Some(set) = set {
                let shader = ctx.shader(shader_handle).expect("shader checked above");
                crate::commands::bind_uniform_sets(&ctx.device.raw, cmd, shader, 1, &[set], graphics_types::PipelineKind::Graphics);
            }

            let shader = ctx.shader(shader_handle).expect("shader checked above");
            let push = build_push_constants(shader.push_constant_size, &instance.transform, &view_proj, &camera.position, primitive.vertex_buffer_address, scene_address);
            if !push.is_empty() {
                crate::commands::push_constants(&ctx.device.raw, cmd, shader, 0, &push);
            }

            unsafe {
                ctx.device.raw.cmd_bind_index_buffer(cmd, primitive.index_buffer, 0, vk::IndexType::UINT32);
            }
            crate::commands::draw_indexed(&ctx.device.raw, cmd, primitive.index_count, 1);
        }

        crate::commands::end_rendering(&ctx.device.raw, cmd);
        Ok(())
    }
}

/// Packs push constants per §4.9's two layouts, truncated to the shader's
/// reflected `push_constant_size`. Layout A (view_proj + camera position +
/// both buffer addresses) is used when the shader declares enough room
/// for it; otherwise layout B (transform + vertex address) is used.
fn build_push_constants(
    push_constant_size: u32,
    transform: &Mat4,
    view_proj: &Mat4,
    camera_pos: &[f32; 3],
    vertex_buffer_address: vk::DeviceAddress,
    scene_buffer_address: Option<vk::DeviceAddress>,
) -> Vec<u8> {
    const LAYOUT_A_SIZE: u32 = 64 + 16 + 8 + 8;
    if push_constant_size == 0 {
        return Vec::new();
    }
    let mut bytes = Vec::with_capacity(push_constant_size as usize);
    if push_constant_size >= LAYOUT_A_SIZE {
        for row in view_proj {
            for v in row {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        for v in camera_pos {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&0f32.to_le_bytes());
        bytes.extend_from_slice(&vertex_buffer_address.to_le_bytes());
        bytes.extend_from_slice(&scene_buffer_address.unwrap_or(0).to_le_bytes());
    } else {
        for row in transform {
            for v in row {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&vertex_buffer_address.to_le_bytes());
    }
    bytes.truncate(push_constant_size as usize);
    bytes
}

/// Example user pass reusing the built-in named images (§4.9 "the grid
/// pass ... is an example that reuses `geo_albedo` and `geo_depth`").
/// Draws a ground-plane grid with a fixed line-list pipeline supplied by
/// the caller at registration.
pub struct GridPass {
    pipeline: crate::handles::PipelineHandle,
    shader: crate::handles::ShaderHandle,
    vertex_count: u32,
}

impl GridPass {
    pub fn new(pipeline: crate::handles::PipelineHandle, shader: crate::handles::ShaderHandle, vertex_count: u32) -> GridPass {
        GridPass { pipeline, shader, vertex_count }
    }
}

impl Pass for GridPass {
    fn priority(&self) -> i32 {
        -5
    }

    fn execute(
        &mut self,
        ctx: &mut Context,
        renderer: &Renderer,
        cmd: vk::CommandBuffer,
        scene: &dyn Scene,
        _resources: &mut dyn MeshPassResources,
    ) -> Result<()> {
        let Some(camera) = scene.active_camera() else { return Ok(()) };
        let color = ctx.image(renderer.color_image()).expect("geo_albedo must exist");
        let depth = ctx.image(renderer.depth_image()).expect("geo_depth must exist");
        let color_attachment = crate::commands::ColorAttachment {
            image_view: color.view,
            layout: graphics_types::ImageLayout::ColorAttachmentOptimal,
            load_op: graphics_types::AttachmentLoadOp::Load,
            store_op: graphics_types::AttachmentStoreOp::Store,
            clear_color: None,
            resolve: None,
        };
        let depth_attachment = crate::commands::DepthAttachment {
            image_view: depth.view,
            layout: graphics_types::ImageLayout::DepthAttachmentOptimal,
            load_op: graphics_types::AttachmentLoadOp::Load,
            store_op: graphics_types::AttachmentStoreOp::Store,
            clear_depth: 1.0,
        };
        crate::commands::begin_rendering(&ctx.device.raw, cmd, renderer.render_extent_vk(), &[color_attachment], Some(&depth_attachment));

        let Some(pipeline) = ctx.pipeline(self.pipeline) else {
            crate::commands::end_rendering(&ctx.device.raw, cmd);
            return Ok(());
        };
        crate::commands::bind_pipeline(&ctx.device.raw, cmd, pipeline.raw, pipeline.kind);
        if let Some(shader) = ctx.shader(self.shader) {
            let view_proj = mat4_mul(camera.proj, camera.view);
            let mut bytes = Vec::with_capacity(64);
            for row in &view_proj {
                for v in row {
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
            }
            bytes.truncate(shader.push_constant_size as usize);
            if !bytes.is_empty() {
                crate::commands::push_constants(&ctx.device.raw, cmd, shader, 0, &bytes);
            }
        }
        crate::commands::draw(&ctx.device.raw, cmd, self.vertex_count, 1);
        crate::commands::end_rendering(&ctx.device.raw, cmd);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphics_backend_traits::scene::Aabb;

    fn identity() -> Mat4 {
        [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]]
    }

    #[test]
    fn identity_frustum_keeps_origin_box() {
        let frustum = Frustum::from_view_proj(identity());
        let aabb = Aabb { min: [-0.1, -0.1, -0.1], max: [0.1, 0.1, 0.1] };
        assert!(!frustum.aabb_entirely_outside(&aabb));
    }

    #[test]
    fn far_away_box_culled() {
        let frustum = Frustum::from_view_proj(identity());
        let aabb = Aabb { min: [100.0, 100.0, 100.0], max: [101.0, 101.0, 101.0] };
        assert!(frustum.aabb_entirely_outside(&aabb));
    }

    #[test]
    fn push_constants_pick_layout_a_when_room() {
        let bytes = build_push_constants(96, &identity(), &identity(), &[0.0, 0.0, 0.0], 0x1000, Some(0x2000));
        assert_eq!(bytes.len(), 96);
    }

    #[test]
    fn push_constants_pick_layout_b_when_tight() {
        let bytes = build_push_constants(72, &identity(), &identity(), &[0.0, 0.0, 0.0], 0x1000, None);
        assert_eq!(bytes.len(), 72);
    }
}
