// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use lumen_core::FailureClass;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VkError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("no Vulkan physical devices enumerated")]
    NoPhysicalDevice,

    #[error("no physical device offers graphics, present and swapchain support")]
    NoSuitableDevice,

    #[error("shader binary {path:?} could not be loaded: {reason}")]
    ShaderMissing { path: PathBuf, reason: String },

    #[error("no memory type matches bits {type_bits:#x} with {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("buffer is not host visible; use a staged upload")]
    NotHostVisible,

    #[error("{len} bytes do not fit a buffer of {capacity} bytes")]
    UploadTooLarge { len: u64, capacity: u64 },

    #[error("fence for {what} did not signal after {timeouts} waits of {slice_ms} ms")]
    DeviceHang {
        what: &'static str,
        timeouts: u32,
        slice_ms: u64,
    },

    #[error("the window surface has no area; a swapchain cannot be created")]
    SurfaceHidden,

    #[error("draw covers indices {first}..{end} but only {resident} are resident")]
    DrawOutOfRange { first: u32, end: u64, resident: u64 },

    #[error("draw uses material {material} but only {resident} are resident")]
    MaterialNotResident { material: usize, resident: usize },

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("{call} failed: {result}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

impl VkError {
    pub fn class(&self) -> FailureClass {
        match self {
            VkError::Loading(_) | VkError::NoPhysicalDevice | VkError::NoSuitableDevice => {
                FailureClass::Device
            }
            VkError::ShaderMissing { .. } => FailureClass::Shader,
            VkError::DrawOutOfRange { .. } | VkError::MaterialNotResident { .. } => {
                FailureClass::Scene
            }
            VkError::WindowHandle(_) | VkError::SurfaceHidden => FailureClass::Window,
            VkError::NoMemoryType { .. }
            | VkError::NotHostVisible
            | VkError::UploadTooLarge { .. }
            | VkError::DeviceHang { .. }
            | VkError::Vulkan { .. } => FailureClass::Gpu,
        }
    }
}

/// Tag a raw `vk::Result` with the call that produced it.
pub(crate) trait VkResultExt<T> {
    fn call(self, call: &'static str) -> Result<T, VkError>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn call(self, call: &'static str) -> Result<T, VkError> {
        self.map_err(|result| VkError::Vulkan { call, result })
    }
}

/// Probe for `lumen_core::classify`.
pub fn failure_class(err: &(dyn std::error::Error + 'static)) -> Option<FailureClass> {
    err.downcast_ref::<VkError>().map(VkError::class)
}
