// Frame pacing and presentation synchronization over Vulkan.
//
// `frame` is the core: the presentation cycle, its frame slots and the
// ordering signal pool, written against the `FrameDevice` boundary.
// `backend` implements that boundary with ash.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;

pub use error::{ErrorKind, FrameError, FrameResult};
pub use frame::{
    AcquireStatus, CycleState, FrameContext, FrameDevice, PresentStatus, PresentSurface,
    PresentationCycle, SurfaceFactory, SurfaceRequest, TickOutcome,
};
