// Synchronization primitives
//
// Fences, semaphores and per-slot command pools for GPU-CPU and GPU-GPU sync.
// This is the ash side of the `FrameDevice` boundary; ordering between CPU
// submission and GPU execution only exists through these objects.

use ash::vk;

use super::{Swapchain, VulkanDevice};
use crate::error::FrameResult;
use crate::frame::{AcquireStatus, CommandAllocator, FrameDevice, PresentStatus, Submission};

impl FrameDevice for VulkanDevice {
    type Surface = Swapchain;

    fn create_signal(&self) -> FrameResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&semaphore_info, None) }?;
        Ok(semaphore)
    }

    fn destroy_signal(&self, signal: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(signal, None) };
    }

    fn create_fence(&self, signaled: bool) -> FrameResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED // First wait returns immediately
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device.create_fence(&fence_info, None) }?;
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_fence(&self, fence: vk::Fence, timeout: u64) -> FrameResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout) }?;
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> FrameResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }?;
        Ok(())
    }

    fn create_command_allocator(&self) -> FrameResult<CommandAllocator> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.graphics_queue_family)
            // TRANSIENT: re-recorded every time the slot comes around
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { self.device.create_command_pool(&pool_info, None) }?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = match unsafe { self.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers,
            Err(err) => {
                unsafe { self.device.destroy_command_pool(pool, None) };
                return Err(err.into());
            }
        };

        Ok(CommandAllocator {
            pool,
            buffer: buffers[0],
        })
    }

    fn reset_command_allocator(&self, allocator: &CommandAllocator) -> FrameResult<()> {
        unsafe {
            self.device
                .reset_command_pool(allocator.pool, vk::CommandPoolResetFlags::empty())
        }?;
        Ok(())
    }

    fn destroy_command_allocator(&self, allocator: &CommandAllocator) {
        unsafe {
            if allocator.buffer != vk::CommandBuffer::null() {
                self.device
                    .free_command_buffers(allocator.pool, &[allocator.buffer]);
            }
            self.device.destroy_command_pool(allocator.pool, None);
        }
    }

    fn submit(&self, submission: &Submission) -> FrameResult<()> {
        let wait_semaphores = [submission.wait];
        let wait_stages = [submission.wait_stage];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.signal];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores) // Wait for image to be available
            .wait_dst_stage_mask(&wait_stages) // Which stage waits
            .command_buffers(&command_buffers) // Commands to execute
            .signal_semaphores(&signal_semaphores); // Signal when done

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], submission.fence)
        }?;
        Ok(())
    }

    fn acquire_image(
        &self,
        surface: &Swapchain,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> FrameResult<AcquireStatus> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                surface.swapchain,
                timeout,
                signal,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireStatus::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::Stale),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(AcquireStatus::Lost),
            Err(e) => Err(e.into()),
        }
    }

    fn present(
        &self,
        surface: &Swapchain,
        index: u32,
        waits: &[vk::Semaphore],
    ) -> FrameResult<PresentStatus> {
        let swapchains = [surface.swapchain];
        let image_indices = [index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(waits)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.graphics_queue, &present_info)
        };

        match result {
            Ok(false) => Ok(PresentStatus::Ok),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::Stale),
            Err(vk::Result::ERROR_SURFACE_LOST_KHR) => Ok(PresentStatus::Lost),
            Err(e) => Err(e.into()),
        }
    }

    fn wait_idle(&self) -> FrameResult<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}
