/// Column-major 4x4 transform, as consumed by the mesh pass for culling and
/// per-draw push constants.
pub type Mat4 = [[f32; 4]; 4];

#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub view: Mat4,
    pub proj: Mat4,
    pub position: [f32; 3],
    pub enabled: bool,
}

/// Opaque identifier for a loaded mesh primitive's vertex/index buffers;
/// the scene owns the mapping from id to GPU buffer handles via the asset
/// system, the backend only ever receives ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshPrimitiveId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialInstanceId(pub u64);

/// One drawable instance as the mesh pass sees it: a primitive, the
/// material to draw it with, its world transform, and a precomputed
/// world-space bounding box for frustum culling.
#[derive(Debug, Clone, Copy)]
pub struct MeshInstance {
    pub primitive: MeshPrimitiveId,
    pub material: MaterialInstanceId,
    pub transform: Mat4,
    pub world_aabb: Aabb,
}

/// The scene contract (§6 "Scene"). The core only ever reads: the active
/// camera and a flat list of drawable mesh instances. Everything else
/// (component storage, entity hierarchy, scripting) is the scene crate's
/// business, not the renderer's.
pub trait Scene {
    /// The first enabled camera, if any (§4.9 MeshPass: "finds the first
    /// enabled camera").
    fn active_camera(&self) -> Option<Camera>;

    fn mesh_instances(&self) -> Vec<MeshInstance>;
}

#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct InMemoryScene {
    pub camera: Option<Camera>,
    pub instances: Vec<MeshInstance>,
}

#[cfg(any(test, feature = "test-utils"))]
impl Scene for InMemoryScene {
    fn active_camera(&self) -> Option<Camera> {
        self.camera
    }

    fn mesh_instances(&self) -> Vec<MeshInstance> {
        self.instances.clone()
    }
}
