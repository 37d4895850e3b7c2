// Frame pacing core
//
// Cycles through the presentation surface's images, orders CPU and GPU work
// with fences and semaphores, and recycles per-image recording resources.
//
// The core never talks to Vulkan directly. It drives a `FrameDevice`, which
// the backend implements over ash and the tests implement with a fake.

pub mod cycle;
pub mod signal_pool;
pub mod slot;
pub mod tick;

#[cfg(test)]
pub(crate) mod fake;

pub use cycle::{CycleState, PresentationCycle};
pub use signal_pool::OrderingSignalPool;
pub use slot::{CommandAllocator, FrameSlot, SlotPhase};
pub use tick::{FrameContext, TickOutcome};

use ash::vk;

use crate::error::FrameResult;

/// Timeout used for every wait in the cycle: wait forever for the next slot.
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Result of asking the surface for its next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image was handed out and the ordering signal will be signaled.
    /// `suboptimal` images are usable but the surface should be rebuilt.
    Acquired { index: u32, suboptimal: bool },
    /// Out of date. No image was acquired and the signal is untouched.
    Stale,
    /// The surface is gone. No image was acquired.
    Lost,
}

/// Result of a present request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Ok,
    /// Shown (possibly degraded), but the surface must be rebuilt next cycle.
    Stale,
    /// Nothing more can be presented until the surface is rebuilt.
    Lost,
}

/// One queue submission: the recorded work plus its synchronization.
#[derive(Debug, Clone, Copy)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal: vk::Semaphore,
    pub fence: vk::Fence,
}

/// What the cycle asks the surface factory for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub extent: vk::Extent2D,
    /// Requested image count. A request, not a guarantee.
    pub buffering: u32,
}

impl SurfaceRequest {
    pub fn new(width: u32, height: u32, buffering: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            buffering,
        }
    }

    #[inline]
    pub fn is_zero_area(&self) -> bool {
        self.extent.width == 0 || self.extent.height == 0
    }
}

/// The rotating image set a display consumes.
pub trait PresentSurface {
    fn image_count(&self) -> usize;
    fn format(&self) -> vk::Format;
    fn extent(&self) -> vk::Extent2D;
}

/// Device and queue boundary consumed by the presentation cycle.
///
/// All destroy calls receive non-null handles; the cycle null-checks before
/// calling them.
pub trait FrameDevice {
    type Surface: PresentSurface;

    /// Create an unsignaled ordering signal.
    fn create_signal(&self) -> FrameResult<vk::Semaphore>;
    fn destroy_signal(&self, signal: vk::Semaphore);

    /// Create a completion signal, optionally already complete.
    fn create_fence(&self, signaled: bool) -> FrameResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Block the calling thread until `fence` is complete.
    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> FrameResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> FrameResult<()>;

    fn create_command_allocator(&self) -> FrameResult<CommandAllocator>;
    fn reset_command_allocator(&self, allocator: &CommandAllocator) -> FrameResult<()>;
    fn destroy_command_allocator(&self, allocator: &CommandAllocator);

    /// Queue work for asynchronous execution. Never blocks on the GPU.
    fn submit(&self, submission: &Submission) -> FrameResult<()>;

    fn acquire_image(
        &self,
        surface: &Self::Surface,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> FrameResult<AcquireStatus>;

    fn present(
        &self,
        surface: &Self::Surface,
        index: u32,
        waits: &[vk::Semaphore],
    ) -> FrameResult<PresentStatus>;

    /// Wait until the queue has retired all submitted work.
    fn wait_idle(&self) -> FrameResult<()>;
}

/// Creates and destroys presentation surfaces for a device.
pub trait SurfaceFactory: FrameDevice {
    fn create_surface(&self, request: &SurfaceRequest) -> FrameResult<Self::Surface>;
    fn destroy_surface(&self, surface: Self::Surface);
}
