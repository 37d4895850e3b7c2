// Frame slots
//
// One slot per presentable image, index-stable for the lifetime of the
// surface. A slot's recording resources are only touched again after its
// fence confirms the GPU finished the previous use.

use ash::vk;

use super::{FrameDevice, WAIT_FOREVER};
use crate::error::FrameResult;

/// Command pool plus the single primary buffer recorded from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandAllocator {
    pub pool: vk::CommandPool,
    pub buffer: vk::CommandBuffer,
}

impl CommandAllocator {
    #[inline]
    pub fn is_null(&self) -> bool {
        self.pool == vk::CommandPool::null()
    }
}

/// Where a slot is in its acquire → submit → present round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotPhase {
    /// Not handed out, or presented.
    #[default]
    Idle,
    /// Acquired; the caller is recording into it.
    Recording,
    /// Recorded work is queued on the GPU.
    Submitted,
}

/// Per-image bundle of recording and synchronization resources.
///
/// Null handles mean "not created" or "already destroyed", which makes
/// [`FrameSlot::destroy`] safe to call any number of times.
#[derive(Debug, Default)]
pub struct FrameSlot {
    index: usize,
    completion: vk::Fence,
    allocator: CommandAllocator,
    acquire_signal: vk::Semaphore,
    release_signal: vk::Semaphore,
    phase: SlotPhase,
}

impl FrameSlot {
    /// Create the slot's fence (already complete), allocator and release
    /// semaphore. Nothing is leaked if any of them fails.
    pub fn new<D: FrameDevice + ?Sized>(device: &D, index: usize) -> FrameResult<Self> {
        let mut slot = FrameSlot {
            index,
            ..Default::default()
        };

        if let Err(err) = slot.create_resources(device) {
            slot.destroy(device);
            return Err(err);
        }

        log::debug!("Created frame slot {}", index);
        Ok(slot)
    }

    fn create_resources<D: FrameDevice + ?Sized>(&mut self, device: &D) -> FrameResult<()> {
        self.completion = device.create_fence(true)?;
        self.allocator = device.create_command_allocator()?;
        self.release_signal = device.create_signal()?;
        Ok(())
    }

    /// Wait for the previous use of this slot to finish on the GPU, then
    /// reset its fence and command allocator for the next recording.
    ///
    /// This is the only place the cycle blocks.
    pub fn recycle<D: FrameDevice + ?Sized>(&mut self, device: &D) -> FrameResult<()> {
        if self.completion != vk::Fence::null() {
            device.wait_fence(self.completion, WAIT_FOREVER)?;
            device.reset_fence(self.completion)?;
        }

        if !self.allocator.is_null() {
            device.reset_command_allocator(&self.allocator)?;
        }

        Ok(())
    }

    /// Install the semaphore for this round's image, returning the previous
    /// one. Only call after [`FrameSlot::recycle`] succeeded.
    pub fn replace_acquire_signal(&mut self, signal: vk::Semaphore) -> Option<vk::Semaphore> {
        let previous = std::mem::replace(&mut self.acquire_signal, signal);
        (previous != vk::Semaphore::null()).then_some(previous)
    }

    /// Destroy every handle the slot still owns.
    pub fn destroy<D: FrameDevice + ?Sized>(&mut self, device: &D) {
        if self.completion != vk::Fence::null() {
            device.destroy_fence(self.completion);
            self.completion = vk::Fence::null();
        }

        if !self.allocator.is_null() {
            device.destroy_command_allocator(&self.allocator);
            self.allocator = CommandAllocator::default();
        }

        if self.acquire_signal != vk::Semaphore::null() {
            device.destroy_signal(self.acquire_signal);
            self.acquire_signal = vk::Semaphore::null();
        }

        if self.release_signal != vk::Semaphore::null() {
            device.destroy_signal(self.release_signal);
            self.release_signal = vk::Semaphore::null();
        }

        self.phase = SlotPhase::Idle;
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn completion(&self) -> vk::Fence {
        self.completion
    }

    #[inline]
    pub fn allocator(&self) -> &CommandAllocator {
        &self.allocator
    }

    #[inline]
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.allocator.buffer
    }

    #[inline]
    pub fn acquire_signal(&self) -> vk::Semaphore {
        self.acquire_signal
    }

    #[inline]
    pub fn release_signal(&self) -> vk::Semaphore {
        self.release_signal
    }

    #[inline]
    pub fn phase(&self) -> SlotPhase {
        self.phase
    }

    #[inline]
    pub(crate) fn set_phase(&mut self, phase: SlotPhase) {
        self.phase = phase;
    }
}
