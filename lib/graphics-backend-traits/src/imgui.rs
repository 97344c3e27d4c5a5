/// ImGui integration contract (§6). The backend implements this using the
/// driver's own ImGui integration; the core drives it from the renderer's
/// per-frame algorithm (§4.8 "if imgui_used: run imgui pass on swap image").
///
/// Associated types let the backend plug in its own command buffer/image/
/// sampler handle kinds without this crate depending on `ash`.
pub trait ImguiIntegration {
    type CommandBuffer;
    type Image;
    type Sampler;
    type TextureId: Copy;

    fn imgui_init_for_platform(&mut self);
    fn imgui_new_frame_for_platform(&mut self);
    fn imgui_render_for_platform(&mut self, cmd: &Self::CommandBuffer);
    fn imgui_image_upload(&mut self, image: Self::Image, sampler: Self::Sampler) -> Self::TextureId;
    fn imgui_image_free(&mut self, id: Self::TextureId);
}
