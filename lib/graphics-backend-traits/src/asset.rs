use std::path::PathBuf;

/// Error surfaced while resolving or loading an asset path (§7 `FileError`
/// at this collaborator boundary).
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("unknown scheme in path {0:?}")]
    UnknownScheme(String),
    #[error("asset not found: {0:?}")]
    NotFound(String),
    #[error("io error resolving {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves `res://`, `mem://`, and bare paths to an absolute filesystem
/// path (§6 "Asset system", §6 "the only widely honored environment
/// variable", `GL_WORKING_DIR`).
pub trait AssetSystem {
    fn get_absolute_path(&self, path_with_scheme: &str) -> Result<PathBuf, AssetError>;

    /// Load raw bytes for a SPIR-V bundle or blob. The core only ever asks
    /// this system for bytes; it has no notion of GLTF or texture assets.
    fn load_bytes(&self, path_with_scheme: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.get_absolute_path(path_with_scheme)?;
        std::fs::read(&path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Resolves `res://` against `GL_WORKING_DIR` (falling back to the current
/// directory), passes `mem://` through unresolved-by-filesystem (callers
/// of `load_bytes` on a `mem://` path should keep their own in-memory
/// table; this default impl only knows the filesystem), and treats bare
/// paths as already-relative-to-cwd.
#[derive(Debug, Default)]
pub struct FsAssetSystem {
    pub working_dir_override: Option<PathBuf>,
}

impl FsAssetSystem {
    pub fn new() -> Self {
        FsAssetSystem { working_dir_override: None }
    }

    fn working_dir(&self) -> PathBuf {
        if let Some(dir) = &self.working_dir_override {
            return dir.clone();
        }
        std::env::var_os("GL_WORKING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl AssetSystem for FsAssetSystem {
    fn get_absolute_path(&self, path_with_scheme: &str) -> Result<PathBuf, AssetError> {
        if let Some(rest) = path_with_scheme.strip_prefix("res://") {
            return Ok(self.working_dir().join(rest));
        }
        if let Some(rest) = path_with_scheme.strip_prefix("mem://") {
            return Err(AssetError::UnknownScheme(format!("mem://{rest}")));
        }
        Ok(PathBuf::from(path_with_scheme))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn res_scheme_joins_working_dir() {
        let fs = FsAssetSystem { working_dir_override: Some(PathBuf::from("/assets")) };
        assert_eq!(
            fs.get_absolute_path("res://shaders/a.spv").unwrap(),
            PathBuf::from("/assets/shaders/a.spv")
        );
    }

    #[test]
    fn bare_path_passes_through() {
        let fs = FsAssetSystem::new();
        assert_eq!(fs.get_absolute_path("a.spv").unwrap(), PathBuf::from("a.spv"));
    }
}
