// Presentation cycle
//
// Owns the surface, one FrameSlot per surface image, and the ordering signal
// pool. Drives acquire → record → submit → present.
//
// STATE MACHINE:
// ┌──────┐  stale / suboptimal / lost / resize   ┌─────────────────┐
// │ Live │ ────────────────────────────────────> │ NeedsRecreation │
// │      │ <──────────────────────────────────── │                 │
// └──┬───┘        idle + rebuild surface         └────────┬────────┘
//    │                                                    │
//    └──────────────── shutdown ──> Destroyed <───────────┘

use std::sync::Arc;

use ash::vk;

use super::{
    AcquireStatus, FrameSlot, OrderingSignalPool, PresentStatus, PresentSurface, SlotPhase,
    Submission, SurfaceFactory, SurfaceRequest, WAIT_FOREVER,
};
use crate::error::{FrameError, FrameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Live,
    NeedsRecreation,
    Destroyed,
}

pub struct PresentationCycle<D: SurfaceFactory> {
    device: Arc<D>,
    request: SurfaceRequest,
    surface: Option<D::Surface>,
    slots: Vec<FrameSlot>,
    signal_pool: OrderingSignalPool,
    /// Acquire semaphores whose image was handed out but whose slot could not
    /// take them. Destroyed once the device is idle.
    stranded: Vec<vk::Semaphore>,
    state: CycleState,
    surface_lost: bool,
    recreations: u64,
}

impl<D: SurfaceFactory> PresentationCycle<D> {
    /// Create the surface and its frame slots together.
    pub fn new(device: Arc<D>, request: SurfaceRequest) -> FrameResult<Self> {
        let mut cycle = Self {
            device,
            request,
            surface: None,
            slots: Vec::new(),
            signal_pool: OrderingSignalPool::new(),
            stranded: Vec::new(),
            state: CycleState::NeedsRecreation,
            surface_lost: false,
            recreations: 0,
        };

        cycle.build()?;
        Ok(cycle)
    }

    fn build(&mut self) -> FrameResult<()> {
        assert!(self.surface.is_none() && self.slots.is_empty());

        if self.request.is_zero_area() {
            return Err(FrameError::Minimized);
        }

        let surface = self.device.create_surface(&self.request)?;
        let image_count = surface.image_count();
        let extent = surface.extent();
        let format = surface.format();
        assert!(image_count > 0, "presentation surface has no images");
        self.surface = Some(surface);

        self.slots.reserve_exact(image_count);
        for index in 0..image_count {
            match FrameSlot::new(&*self.device, index) {
                Ok(slot) => self.slots.push(slot),
                Err(err) => {
                    self.destroy_frame_resources();
                    return Err(err);
                }
            }
        }

        self.state = CycleState::Live;
        self.surface_lost = false;
        log::info!(
            "Presentation cycle live: {} images, {}x{}, {:?}",
            image_count,
            extent.width,
            extent.height,
            format
        );
        Ok(())
    }

    /// Destroy slots and surface. The device must be idle.
    fn destroy_frame_resources(&mut self) {
        for mut slot in self.slots.drain(..) {
            slot.destroy(&*self.device);
        }

        for signal in self.stranded.drain(..) {
            self.device.destroy_signal(signal);
        }

        if let Some(surface) = self.surface.take() {
            self.device.destroy_surface(surface);
        }
    }

    /// Idle the device and rebuild the surface and its slots from the
    /// current request.
    pub fn recreate(&mut self) -> FrameResult<()> {
        if self.state == CycleState::Destroyed {
            return Err(FrameError::Destroyed);
        }

        if self.request.is_zero_area() {
            self.state = CycleState::NeedsRecreation;
            return Err(FrameError::Minimized);
        }

        log::info!(
            "Recreating presentation surface at {}x{}",
            self.request.extent.width,
            self.request.extent.height
        );

        self.device.wait_idle()?;
        self.destroy_frame_resources();
        self.state = CycleState::NeedsRecreation;

        self.build()?;
        self.recreations += 1;
        Ok(())
    }

    /// Hand out the slot for the next presentable image.
    ///
    /// Rebuilds the surface first if the previous cycle left it stale. Blocks
    /// until the GPU has finished the slot's previous frame, which bounds the
    /// frames in flight to the image count.
    pub fn acquire(&mut self) -> FrameResult<usize> {
        match self.state {
            CycleState::Destroyed => return Err(FrameError::Destroyed),
            CycleState::NeedsRecreation => self.recreate()?,
            CycleState::Live => {}
        }

        let signal = self.signal_pool.acquire(&*self.device)?;
        let surface = self
            .surface
            .as_ref()
            .expect("live presentation cycle owns a surface");

        let status = match self.device.acquire_image(surface, WAIT_FOREVER, signal) {
            Ok(status) => status,
            Err(err) => {
                self.signal_pool.release(signal);
                self.state = CycleState::NeedsRecreation;
                return Err(err);
            }
        };

        let (index, suboptimal) = match status {
            AcquireStatus::Acquired { index, suboptimal } => (index as usize, suboptimal),
            AcquireStatus::Stale => {
                self.signal_pool.release(signal);
                self.state = CycleState::NeedsRecreation;
                log::warn!("Presentation surface out of date on acquire");
                return Err(FrameError::SurfaceStale);
            }
            AcquireStatus::Lost => {
                self.signal_pool.release(signal);
                self.state = CycleState::NeedsRecreation;
                self.surface_lost = true;
                log::error!("Presentation surface lost on acquire");
                return Err(FrameError::SurfaceLost);
            }
        };

        assert!(
            index < self.slots.len(),
            "image index {} out of range for {} frame slots",
            index,
            self.slots.len()
        );

        let slot = &mut self.slots[index];
        assert!(
            slot.phase() != SlotPhase::Recording,
            "image {} handed out again while still being recorded",
            index
        );

        if let Err(err) = slot.recycle(&*self.device) {
            self.stranded.push(signal);
            self.state = CycleState::NeedsRecreation;
            return Err(err);
        }

        // The submission that waited on the old semaphore is now known to be
        // complete, so it can be reused.
        if let Some(previous) = slot.replace_acquire_signal(signal) {
            self.signal_pool.release(previous);
        }
        slot.set_phase(SlotPhase::Recording);

        if suboptimal {
            log::debug!("Acquired suboptimal image {}, recreating next frame", index);
            self.state = CycleState::NeedsRecreation;
        }

        Ok(index)
    }

    /// Queue the recorded work for `index`. Does not block.
    ///
    /// The work waits for the image at color output, signals the slot's
    /// release semaphore, and completes the slot's fence.
    pub fn submit(&mut self, index: usize, commands: vk::CommandBuffer) -> FrameResult<()> {
        self.ensure_usable()?;

        let slot = &mut self.slots[index];
        assert_eq!(
            slot.phase(),
            SlotPhase::Recording,
            "frame slot {} submitted without being acquired",
            index
        );

        let submission = Submission {
            command_buffer: commands,
            wait: slot.acquire_signal(),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal: slot.release_signal(),
            fence: slot.completion(),
        };

        if let Err(err) = self.device.submit(&submission) {
            // The fence was reset and will never complete; only a full rebuild
            // after idling brings the slot back.
            self.state = CycleState::NeedsRecreation;
            return Err(err);
        }

        slot.set_phase(SlotPhase::Submitted);
        Ok(())
    }

    /// Present the image for `index` once its rendering is done.
    pub fn present(&mut self, index: usize) -> FrameResult<PresentStatus> {
        self.ensure_usable()?;

        let surface = self
            .surface
            .as_ref()
            .expect("live presentation cycle owns a surface");
        let slot = &mut self.slots[index];
        assert_eq!(
            slot.phase(),
            SlotPhase::Submitted,
            "frame slot {} presented without being submitted",
            index
        );

        let waits = [slot.release_signal()];
        let status = match self.device.present(surface, index as u32, &waits) {
            Ok(status) => status,
            Err(err) => {
                self.state = CycleState::NeedsRecreation;
                return Err(err);
            }
        };
        slot.set_phase(SlotPhase::Idle);

        match status {
            PresentStatus::Ok => {}
            PresentStatus::Stale => {
                self.state = CycleState::NeedsRecreation;
            }
            PresentStatus::Lost => {
                self.state = CycleState::NeedsRecreation;
                self.surface_lost = true;
            }
        }

        Ok(status)
    }

    /// Give up on a slot that was acquired but will not be submitted. The
    /// image is only returned by rebuilding the surface.
    pub fn abandon_frame(&mut self, index: usize) {
        log::warn!("Abandoning frame in slot {}", index);
        if self.state != CycleState::Destroyed {
            self.state = CycleState::NeedsRecreation;
        }
    }

    fn ensure_usable(&self) -> FrameResult<()> {
        if self.state == CycleState::Destroyed {
            return Err(FrameError::Destroyed);
        }
        if self.surface_lost {
            return Err(FrameError::SurfaceLost);
        }
        Ok(())
    }

    /// Rebuild at a new extent before the next acquire.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.request.extent = vk::Extent2D { width, height };
        self.request_recreation();
    }

    /// Mark the surface as needing a rebuild before the next acquire.
    pub fn request_recreation(&mut self) {
        if self.state == CycleState::Live {
            self.state = CycleState::NeedsRecreation;
        }
    }

    /// Idle the device and destroy everything the cycle owns.
    ///
    /// Calling this again, or dropping the cycle afterwards, does nothing.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        if self.state == CycleState::Destroyed {
            return Ok(());
        }

        let idle = self.device.wait_idle();

        self.destroy_frame_resources();
        self.signal_pool.destroy(&*self.device);
        self.state = CycleState::Destroyed;

        log::info!(
            "Presentation cycle destroyed after {} recreations",
            self.recreations
        );
        idle
    }

    #[inline]
    pub fn state(&self) -> CycleState {
        self.state
    }

    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    #[inline]
    pub fn request(&self) -> &SurfaceRequest {
        &self.request
    }

    #[inline]
    pub fn surface(&self) -> Option<&D::Surface> {
        self.surface.as_ref()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    #[inline]
    pub fn pool_len(&self) -> usize {
        self.signal_pool.len()
    }

    /// Ordering signals created over the cycle's lifetime.
    #[inline]
    pub fn signals_created(&self) -> usize {
        self.signal_pool.created()
    }

    #[inline]
    pub fn recreations(&self) -> u64 {
        self.recreations
    }
}

impl<D: SurfaceFactory> Drop for PresentationCycle<D> {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::error!("Presentation cycle shutdown failed: {}", err);
        }
    }
}
