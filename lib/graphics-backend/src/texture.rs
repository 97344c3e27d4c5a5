//! Thin typed wrapper pairing an image with its sampler (C11, §3 "Texture
//! ... derived entities, not separate slot-map kinds").

use graphics_types::{Format, ImageFiltering, ImageUsage, ImageWrappingMode};

use crate::context::Context;
use crate::error::Result;
use crate::handles::{ImageHandle, SamplerHandle};

/// A `(image, sampler)` pair, the unit most material bindings deal in.
/// Not its own slot-map kind: both handles it wraps already live in
/// `Context`'s image/sampler maps, so a `Texture` is freed by freeing each
/// handle individually rather than through a dedicated `texture_free`.
#[derive(Debug, Clone, Copy)]
pub struct Texture {
    pub image: ImageHandle,
    pub sampler: SamplerHandle,
}

impl Texture {
    /// Creates a 2D texture from raw pixel data, mipmapped by default, with
    /// a linear-filtering repeat sampler (the common case for material
    /// textures; callers needing other filtering build the pair by hand
    /// from `Context::image_create`/`Context::sampler_create`).
    pub fn create_from_bytes(
        ctx: &mut Context,
        width: u32,
        height: u32,
        format: Format,
        data: &[u8],
        mipmapped: bool,
    ) -> Result<Texture> {
        let image = ctx.image_create(width, height, format, ImageUsage::SAMPLED, 1, mipmapped, Some(data))?;
        let sampler = ctx.sampler_create(
            ImageFiltering::Linear,
            ImageFiltering::Linear,
            ImageWrappingMode::Repeat,
            ImageWrappingMode::Repeat,
        )?;
        Ok(Texture { image, sampler })
    }

    pub fn free(self, ctx: &mut Context) {
        ctx.image_free(self.image);
        ctx.sampler_free(self.sampler);
    }
}
