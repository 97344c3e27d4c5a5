//! Collaborator contracts (§6): the seams the core is called through.
//!
//! Nothing in the backend crate depends on a concrete window toolkit, scene
//! representation, or asset pipeline — it only depends on these traits.
//! Each module also carries a minimal in-memory implementation gated behind
//! `test-utils`/`test`, used by the backend's own test suite and by `app`
//! as a headless fallback.

pub mod asset;
pub mod imgui;
pub mod scene;
pub mod window;

pub use asset::AssetSystem;
pub use imgui::ImguiIntegration;
pub use scene::Scene;
pub use window::Window;
