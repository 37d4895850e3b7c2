// Frame errors
//
// Every failure the presentation cycle can report, classified so the update
// loop knows whether to skip a frame or tear the cycle down.

use ash::vk;
use thiserror::Error;

/// How a caller is expected to react to a [`FrameError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stale or unusable surface. Retry once, then skip the frame.
    Transient,
    /// Device lost, allocation failure. No local recovery.
    Fatal,
    /// The caller drove the cycle in a way it must never be driven.
    ProgrammerError,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("presentation surface is out of date")]
    SurfaceStale,

    #[error("presentation surface has zero area")]
    Minimized,

    #[error("presentation surface was lost")]
    SurfaceLost,

    #[error("graphics device was lost")]
    DeviceLost,

    #[error("out of {0} memory")]
    OutOfMemory(&'static str),

    #[error("failed to create presentation surface: {0}")]
    SurfaceCreation(String),

    #[error("vulkan call failed: {0}")]
    Vulkan(vk::Result),

    #[error("presentation cycle has been destroyed")]
    Destroyed,
}

pub type FrameResult<T> = Result<T, FrameError>;

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::SurfaceStale | FrameError::Minimized => ErrorKind::Transient,
            FrameError::Destroyed => ErrorKind::ProgrammerError,
            FrameError::SurfaceLost
            | FrameError::DeviceLost
            | FrameError::OutOfMemory(_)
            | FrameError::SurfaceCreation(_)
            | FrameError::Vulkan(_) => ErrorKind::Fatal,
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<vk::Result> for FrameError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => FrameError::SurfaceStale,
            vk::Result::ERROR_SURFACE_LOST_KHR => FrameError::SurfaceLost,
            vk::Result::ERROR_DEVICE_LOST => FrameError::DeviceLost,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => FrameError::OutOfMemory("host"),
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => FrameError::OutOfMemory("device"),
            other => FrameError::Vulkan(other),
        }
    }
}
