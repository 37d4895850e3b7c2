// Ordering signal pool
//
// Acquire semaphores are needed every frame; recycling them avoids a
// create/destroy pair per frame. A semaphore may only be released here once
// the submission that waited on it has been retired.

use std::collections::VecDeque;

use ash::vk;

use super::FrameDevice;
use crate::error::FrameResult;

#[derive(Debug, Default)]
pub struct OrderingSignalPool {
    free: VecDeque<vk::Semaphore>,
    created: usize,
}

impl OrderingSignalPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a recycled semaphore, or create one if none is free.
    pub fn acquire<D: FrameDevice + ?Sized>(&mut self, device: &D) -> FrameResult<vk::Semaphore> {
        if let Some(signal) = self.free.pop_front() {
            return Ok(signal);
        }

        let signal = device.create_signal()?;
        self.created += 1;
        log::debug!("Created ordering signal #{} ({:?})", self.created, signal);
        Ok(signal)
    }

    /// Return a semaphore for reuse. It must be unsignaled with no pending wait.
    pub fn release(&mut self, signal: vk::Semaphore) {
        debug_assert!(signal != vk::Semaphore::null());
        debug_assert!(
            !self.free.contains(&signal),
            "ordering signal {:?} released twice",
            signal
        );
        self.free.push_back(signal);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Total number of semaphores this pool has ever created.
    #[inline]
    pub fn created(&self) -> usize {
        self.created
    }

    /// Destroy every pooled semaphore. Safe to call repeatedly.
    pub fn destroy<D: FrameDevice + ?Sized>(&mut self, device: &D) {
        for signal in self.free.drain(..) {
            device.destroy_signal(signal);
        }
    }
}
