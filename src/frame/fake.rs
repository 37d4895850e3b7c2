// Scriptable in-memory device for exercising the presentation cycle.
//
// Handles are minted with `vk::Handle::from_raw`. The fake panics on anything
// a validation layer would reject: destroying twice, reusing an acquire
// semaphore while a wait on it is pending, resetting a command pool whose
// work has not been observed complete, or waiting on a fence nothing will
// ever complete.
//
// Failure switches make individual device calls fail so error paths can be
// driven without a GPU.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use ash::vk::{self, Handle};
use parking_lot::{Condvar, Mutex};

use super::{
    AcquireStatus, CommandAllocator, FrameDevice, PresentStatus, PresentSurface, Submission,
    SurfaceFactory, SurfaceRequest,
};
use crate::error::{FrameError, FrameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Debug)]
pub(crate) struct FakeSurface {
    pub id: u64,
    pub image_count: usize,
    pub extent: vk::Extent2D,
}

impl PresentSurface for FakeSurface {
    fn image_count(&self) -> usize {
        self.image_count
    }

    fn format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_SRGB
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

#[derive(Default)]
struct FakeState {
    next_handle: u64,
    image_count: usize,
    auto_complete: bool,

    /// Live semaphores and whether they are currently signaled.
    signals: HashMap<u64, bool>,
    fences: HashMap<u64, FenceState>,
    /// Live command pools, with the fence of their in-flight submission.
    pools: HashMap<u64, Option<u64>>,
    buffers: HashMap<u64, u64>,
    surfaces: HashSet<u64>,

    /// Acquire semaphores waited on by a submission whose fence has not yet
    /// been observed complete.
    in_flight_waits: HashMap<u64, u64>,
    /// Pending fences in submission order.
    queue: VecDeque<u64>,
    waiting_on: Option<u64>,

    next_image: usize,
    acquire_script: VecDeque<AcquireStatus>,
    present_script: VecDeque<PresentStatus>,
    fail_signals: bool,
    allocators_before_failure: Option<usize>,
    surface_error: Option<FrameError>,
    idle_error: Option<FrameError>,
    acquire_error: Option<FrameError>,
    wait_error: Option<FrameError>,
    fence_reset_error: Option<FrameError>,
    allocator_reset_error: Option<FrameError>,
    submit_error: Option<FrameError>,

    surfaces_created: usize,
    last_surface: u64,
    last_acquire_surface: Option<u64>,
    acquires: usize,
    submissions: usize,
    presents: usize,
    allocator_resets: usize,
}

impl FakeState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn observe_complete(&mut self, fence: u64) {
        self.in_flight_waits.retain(|_, waited_by| *waited_by != fence);
        for in_flight in self.pools.values_mut() {
            if *in_flight == Some(fence) {
                *in_flight = None;
            }
        }
    }
}

pub(crate) struct FakeDevice {
    state: Mutex<FakeState>,
    fence_completed: Condvar,
}

impl FakeDevice {
    /// A device whose surfaces have `image_count` images and whose GPU
    /// finishes work as soon as it is submitted.
    pub fn new(image_count: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                image_count,
                auto_complete: true,
                ..Default::default()
            }),
            fence_completed: Condvar::new(),
        })
    }

    /// When off, submitted fences stay pending until completed by the test.
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.state.lock().auto_complete = auto_complete;
    }

    /// Image count for surfaces created from now on.
    pub fn set_image_count(&self, image_count: usize) {
        self.state.lock().image_count = image_count;
    }

    pub fn script_acquire(&self, status: AcquireStatus) {
        self.state.lock().acquire_script.push_back(status);
    }

    pub fn script_present(&self, status: PresentStatus) {
        self.state.lock().present_script.push_back(status);
    }

    pub fn fail_signal_creation(&self) {
        self.state.lock().fail_signals = true;
    }

    pub fn fail_allocator_creation_after(&self, successes: usize) {
        self.state.lock().allocators_before_failure = Some(successes);
    }

    /// Every surface creation from now on fails with `error`.
    pub fn fail_surface_creation(&self, error: FrameError) {
        self.state.lock().surface_error = Some(error);
    }

    /// Every idle wait from now on fails, as on a lost device. Outstanding
    /// work is still dropped so teardown can proceed.
    pub fn fail_wait_idle(&self, error: FrameError) {
        self.state.lock().idle_error = Some(error);
    }

    // One-shot failures: the next call of the named operation fails.

    pub fn fail_next_acquire(&self, error: FrameError) {
        self.state.lock().acquire_error = Some(error);
    }

    pub fn fail_next_wait(&self, error: FrameError) {
        self.state.lock().wait_error = Some(error);
    }

    pub fn fail_next_fence_reset(&self, error: FrameError) {
        self.state.lock().fence_reset_error = Some(error);
    }

    pub fn fail_next_allocator_reset(&self, error: FrameError) {
        self.state.lock().allocator_reset_error = Some(error);
    }

    pub fn fail_next_submit(&self, error: FrameError) {
        self.state.lock().submit_error = Some(error);
    }

    pub fn complete_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        let raw = fence.as_raw();
        assert_eq!(state.fences.get(&raw), Some(&FenceState::Pending));
        state.fences.insert(raw, FenceState::Signaled);
        state.queue.retain(|&queued| queued != raw);
        self.fence_completed.notify_all();
    }

    /// Complete the oldest pending submission, like an in-order queue.
    pub fn complete_oldest(&self) {
        let mut state = self.state.lock();
        if let Some(raw) = state.queue.pop_front() {
            state.fences.insert(raw, FenceState::Signaled);
            self.fence_completed.notify_all();
        }
    }

    pub fn is_pending(&self, fence: vk::Fence) -> bool {
        self.state.lock().fences.get(&fence.as_raw()) == Some(&FenceState::Pending)
    }

    pub fn is_waiting_on(&self, fence: vk::Fence) -> bool {
        self.state.lock().waiting_on == Some(fence.as_raw())
    }

    pub fn live_signals(&self) -> usize {
        self.state.lock().signals.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn live_allocators(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    pub fn surfaces_created(&self) -> usize {
        self.state.lock().surfaces_created
    }

    pub fn last_surface_id(&self) -> u64 {
        self.state.lock().last_surface
    }

    pub fn last_acquire_surface(&self) -> Option<u64> {
        self.state.lock().last_acquire_surface
    }

    pub fn acquires(&self) -> usize {
        self.state.lock().acquires
    }

    pub fn submissions(&self) -> usize {
        self.state.lock().submissions
    }

    pub fn presents(&self) -> usize {
        self.state.lock().presents
    }

    pub fn allocator_resets(&self) -> usize {
        self.state.lock().allocator_resets
    }
}

impl FrameDevice for FakeDevice {
    type Surface = FakeSurface;

    fn create_signal(&self) -> FrameResult<vk::Semaphore> {
        let mut state = self.state.lock();
        if state.fail_signals {
            return Err(FrameError::OutOfMemory("device"));
        }
        let raw = state.mint();
        state.signals.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_signal(&self, signal: vk::Semaphore) {
        let mut state = self.state.lock();
        let raw = signal.as_raw();
        assert!(
            state.signals.remove(&raw).is_some(),
            "semaphore {:?} destroyed twice or never created",
            signal
        );
        assert!(
            !state.in_flight_waits.contains_key(&raw),
            "semaphore {:?} destroyed while a wait on it is in flight",
            signal
        );
    }

    fn create_fence(&self, signaled: bool) -> FrameResult<vk::Fence> {
        let mut state = self.state.lock();
        let raw = state.mint();
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(raw, initial);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        let removed = state.fences.remove(&fence.as_raw());
        assert!(
            removed.is_some(),
            "fence {:?} destroyed twice or never created",
            fence
        );
        assert_ne!(
            removed,
            Some(FenceState::Pending),
            "fence {:?} destroyed while in flight",
            fence
        );
    }

    fn wait_fence(&self, fence: vk::Fence, _timeout: u64) -> FrameResult<()> {
        let raw = fence.as_raw();
        let mut state = self.state.lock();
        if let Some(err) = state.wait_error.take() {
            return Err(err);
        }
        loop {
            match state.fences.get(&raw).copied() {
                Some(FenceState::Signaled) => break,
                Some(FenceState::Pending) => {
                    state.waiting_on = Some(raw);
                    self.fence_completed.wait(&mut state);
                }
                Some(FenceState::Unsignaled) => {
                    panic!("waiting on fence {:?} with no submission would block forever", fence)
                }
                None => panic!("waiting on unknown fence {:?}", fence),
            }
        }
        state.waiting_on = None;
        state.observe_complete(raw);
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> FrameResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.fence_reset_error.take() {
            return Err(err);
        }
        let raw = fence.as_raw();
        assert_ne!(state.fences.get(&raw), Some(&FenceState::Pending));
        state.fences.insert(raw, FenceState::Unsignaled);
        Ok(())
    }

    fn create_command_allocator(&self) -> FrameResult<CommandAllocator> {
        let mut state = self.state.lock();
        if let Some(remaining) = state.allocators_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(FrameError::OutOfMemory("host"));
            }
            *remaining -= 1;
        }
        let pool = state.mint();
        let buffer = state.mint();
        state.pools.insert(pool, None);
        state.buffers.insert(buffer, pool);
        Ok(CommandAllocator {
            pool: vk::CommandPool::from_raw(pool),
            buffer: vk::CommandBuffer::from_raw(buffer),
        })
    }

    fn reset_command_allocator(&self, allocator: &CommandAllocator) -> FrameResult<()> {
        let mut state = self.state.lock();
        let in_flight = state
            .pools
            .get(&allocator.pool.as_raw())
            .copied()
            .expect("reset of unknown command pool");
        assert_eq!(
            in_flight, None,
            "command pool {:?} reset before its submission was observed complete",
            allocator.pool
        );
        if let Some(err) = state.allocator_reset_error.take() {
            return Err(err);
        }
        state.allocator_resets += 1;
        Ok(())
    }

    fn destroy_command_allocator(&self, allocator: &CommandAllocator) {
        let mut state = self.state.lock();
        assert!(
            state.pools.remove(&allocator.pool.as_raw()).is_some(),
            "command pool {:?} destroyed twice or never created",
            allocator.pool
        );
        state.buffers.remove(&allocator.buffer.as_raw());
    }

    fn submit(&self, submission: &Submission) -> FrameResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.submit_error.take() {
            return Err(err);
        }
        let wait = submission.wait.as_raw();
        let signal = submission.signal.as_raw();
        let fence = submission.fence.as_raw();

        assert_eq!(
            submission.wait_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            state.signals.get(&wait),
            Some(&true),
            "submission waits on a semaphore that will never be signaled"
        );
        assert_eq!(
            state.signals.get(&signal),
            Some(&false),
            "submission signals a semaphore that is already signaled"
        );
        assert_eq!(state.fences.get(&fence), Some(&FenceState::Unsignaled));

        let pool = *state
            .buffers
            .get(&submission.command_buffer.as_raw())
            .expect("submission of unknown command buffer");

        state.signals.insert(wait, false);
        state.signals.insert(signal, true);
        state.in_flight_waits.insert(wait, fence);
        state.pools.insert(pool, Some(fence));
        state.submissions += 1;

        if state.auto_complete {
            state.fences.insert(fence, FenceState::Signaled);
        } else {
            state.fences.insert(fence, FenceState::Pending);
            state.queue.push_back(fence);
        }
        Ok(())
    }

    fn acquire_image(
        &self,
        surface: &FakeSurface,
        _timeout: u64,
        signal: vk::Semaphore,
    ) -> FrameResult<AcquireStatus> {
        let mut state = self.state.lock();
        let raw = signal.as_raw();

        assert!(state.surfaces.contains(&surface.id), "acquire on destroyed surface");
        if let Some(err) = state.acquire_error.take() {
            return Err(err);
        }
        assert!(
            !state.in_flight_waits.contains_key(&raw),
            "semaphore {:?} reused while a wait on it may be pending",
            signal
        );
        assert_eq!(
            state.signals.get(&raw),
            Some(&false),
            "acquire with a semaphore that is signaled or destroyed"
        );

        state.acquires += 1;
        state.last_acquire_surface = Some(surface.id);

        let (index, suboptimal) = match state.acquire_script.pop_front() {
            Some(AcquireStatus::Acquired { index, suboptimal }) => (index as usize, suboptimal),
            Some(status) => return Ok(status),
            None => (state.next_image % surface.image_count, false),
        };

        state.next_image = index + 1;
        state.signals.insert(raw, true);
        Ok(AcquireStatus::Acquired {
            index: index as u32,
            suboptimal,
        })
    }

    fn present(
        &self,
        surface: &FakeSurface,
        _index: u32,
        waits: &[vk::Semaphore],
    ) -> FrameResult<PresentStatus> {
        let mut state = self.state.lock();
        assert!(state.surfaces.contains(&surface.id), "present on destroyed surface");

        for wait in waits {
            assert_eq!(
                state.signals.get(&wait.as_raw()),
                Some(&true),
                "present waits on a semaphore that will never be signaled"
            );
            state.signals.insert(wait.as_raw(), false);
        }

        state.presents += 1;
        Ok(state.present_script.pop_front().unwrap_or(PresentStatus::Ok))
    }

    fn wait_idle(&self) -> FrameResult<()> {
        let mut state = self.state.lock();
        let pending: Vec<u64> = state.queue.drain(..).collect();
        for fence in pending {
            state.fences.insert(fence, FenceState::Signaled);
        }
        state.in_flight_waits.clear();
        for in_flight in state.pools.values_mut() {
            *in_flight = None;
        }
        self.fence_completed.notify_all();
        match state.idle_error.as_ref() {
            Some(err) => Err(same_kind(err)),
            None => Ok(()),
        }
    }
}

impl SurfaceFactory for FakeDevice {
    fn create_surface(&self, request: &SurfaceRequest) -> FrameResult<FakeSurface> {
        let mut state = self.state.lock();
        if let Some(err) = state.surface_error.as_ref() {
            return Err(same_kind(err));
        }
        let id = state.mint();
        state.surfaces.insert(id);
        state.surfaces_created += 1;
        state.last_surface = id;
        state.next_image = 0;
        Ok(FakeSurface {
            id,
            image_count: state.image_count,
            extent: request.extent,
        })
    }

    fn destroy_surface(&self, surface: FakeSurface) {
        assert!(
            self.state.lock().surfaces.remove(&surface.id),
            "surface {} destroyed twice",
            surface.id
        );
    }
}

/// Rebuild a persistent failure for each call; `FrameError` is not `Clone`.
fn same_kind(err: &FrameError) -> FrameError {
    match err {
        FrameError::SurfaceStale => FrameError::SurfaceStale,
        FrameError::Minimized => FrameError::Minimized,
        FrameError::SurfaceLost => FrameError::SurfaceLost,
        FrameError::DeviceLost => FrameError::DeviceLost,
        FrameError::OutOfMemory(what) => FrameError::OutOfMemory(what),
        FrameError::SurfaceCreation(reason) => FrameError::SurfaceCreation(reason.clone()),
        FrameError::Vulkan(result) => FrameError::Vulkan(*result),
        FrameError::Destroyed => FrameError::Destroyed,
    }
}
