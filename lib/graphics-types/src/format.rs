use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

/// Pixel / vertex-attribute data format.
///
/// Variant order and grouping follows the original engine's `DataFormat`
/// enum (colors, then depth/stencil, then compressed, then per-channel
/// vertex formats) rather than the raw numeric order of the underlying
/// driver enum, which makes the "is this a depth format" style of query
/// read naturally as a range check in the original source. Here that
/// query is instead an explicit predicate (see [`Format::is_depth`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr, Serialize, Deserialize)]
pub enum Format {
    R8Unorm,
    R8G8Unorm,
    R8G8B8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16G16B16A16Sfloat,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

impl Format {
    /// Size in bytes of one texel / one vertex attribute value of this format.
    pub fn size_bytes(self) -> u32 {
        match self {
            Format::R8Unorm => 1,
            Format::R8G8Unorm => 2,
            Format::R8G8B8Unorm => 3,
            Format::R8G8B8A8Unorm
            | Format::R8G8B8A8Srgb
            | Format::B8G8R8A8Unorm
            | Format::B8G8R8A8Srgb
            | Format::R32Sfloat
            | Format::D32Sfloat => 4,
            Format::R16G16B16A16Sfloat | Format::R32G32Sfloat | Format::D24UnormS8Uint => 8,
            Format::R32G32B32Sfloat => 12,
            Format::R32G32B32A32Sfloat | Format::D32SfloatS8Uint => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D32Sfloat | Format::D24UnormS8Uint | Format::D32SfloatS8Uint
        )
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32SfloatS8Uint)
    }

    /// The format used for the renderer's depth image (§4.8).
    pub const DEFAULT_DEPTH: Format = Format::D32Sfloat;
}
