use thiserror::Error;

/// The error taxonomy (§7) flattened into one enum. Creation errors on the
/// backend otherwise return a null/invalid handle per §7's propagation
/// policy; this type is for the errors that do surface to the caller.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("swapchain out of date")]
    OutOfDate,

    #[error("allocation failed: {0}")]
    AllocationFailed(String),

    #[error("descriptor pool capacity exceeded for shape {0:?}")]
    CapacityExceeded(graphics_types::PoolShapeKey),

    #[error("shader reflection error: {0}")]
    ShaderReflectionError(String),

    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    #[error("file error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

impl BackendError {
    pub fn vk(context: &str, result: ash::vk::Result) -> BackendError {
        match result {
            ash::vk::Result::ERROR_OUT_OF_DATE_KHR => BackendError::OutOfDate,
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                BackendError::AllocationFailed(format!("{context}: {result}"))
            }
            ash::vk::Result::ERROR_DEVICE_LOST => {
                BackendError::Fatal(format!("device lost during {context}"))
            }
            other => BackendError::Fatal(format!("{context}: {other}")),
        }
    }
}
