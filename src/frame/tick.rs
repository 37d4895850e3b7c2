// Update loop
//
// One tick = acquire → record → submit → present. Transient failures skip the
// frame instead of spinning; degraded presents are logged, never fatal. A fatal
// error shuts the cycle down before it is returned, so a host loop cannot keep
// ticking a cycle that will never recover.

use ash::vk;

use super::{PresentStatus, PresentationCycle, SurfaceFactory};
use crate::error::{ErrorKind, FrameResult};

/// What the draw callback gets to record into.
pub struct FrameContext<'a, S> {
    pub slot: usize,
    pub command_buffer: vk::CommandBuffer,
    pub surface: &'a S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Presented,
    /// Submitted and presented, but the surface needs rebuilding.
    PresentedDegraded(PresentStatus),
    /// No image could be acquired this tick; nothing was drawn.
    Skipped,
}

impl<D: SurfaceFactory> PresentationCycle<D> {
    /// Run one frame, calling `draw` to record into the acquired slot.
    ///
    /// A transient acquire failure is retried once (the retry rebuilds the
    /// surface), then the tick is skipped. Fatal errors destroy the cycle and
    /// are returned; every later tick fails with `FrameError::Destroyed`.
    pub fn tick<F>(&mut self, draw: F) -> FrameResult<TickOutcome>
    where
        F: FnMut(&D, &FrameContext<'_, D::Surface>) -> FrameResult<()>,
    {
        let result = self.run_frame(draw);

        if let Err(err) = &result {
            if err.kind() == ErrorKind::Fatal {
                log::error!("Fatal frame error ({}), shutting down presentation cycle", err);
                if let Err(shutdown_err) = self.shutdown() {
                    log::error!("Presentation cycle shutdown failed: {}", shutdown_err);
                }
            }
        }

        result
    }

    fn run_frame<F>(&mut self, mut draw: F) -> FrameResult<TickOutcome>
    where
        F: FnMut(&D, &FrameContext<'_, D::Surface>) -> FrameResult<()>,
    {
        let slot = match self.acquire() {
            Ok(slot) => slot,
            Err(err) if err.is_transient() => {
                log::warn!("Could not acquire next image ({}), retrying", err);
                match self.acquire() {
                    Ok(slot) => slot,
                    Err(err) if err.is_transient() => {
                        log::warn!("Could not acquire next image ({}), skipping frame", err);
                        return Ok(TickOutcome::Skipped);
                    }
                    Err(err) => return Err(err),
                }
            }
            Err(err) => return Err(err),
        };

        let command_buffer = self
            .slot(slot)
            .expect("acquired slot index is in range")
            .command_buffer();
        let drawn = {
            let context = FrameContext {
                slot,
                command_buffer,
                surface: self
                    .surface()
                    .expect("acquired slot without a presentation surface"),
            };
            draw(&**self.device(), &context)
        };

        if let Err(err) = drawn {
            self.abandon_frame(slot);
            return Err(err);
        }

        self.submit(slot, command_buffer)?;

        match self.present(slot)? {
            PresentStatus::Ok => Ok(TickOutcome::Presented),
            PresentStatus::Stale => {
                log::warn!("Presentation surface suboptimal or out of date on present");
                Ok(TickOutcome::PresentedDegraded(PresentStatus::Stale))
            }
            PresentStatus::Lost => {
                log::error!("Presentation surface lost on present");
                Ok(TickOutcome::PresentedDegraded(PresentStatus::Lost))
            }
        }
    }
}
