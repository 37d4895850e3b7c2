// Swapchain - Window presentation
//
// The Vulkan presentation surface: the chain of images we render to and
// present to the screen. Created and destroyed as a unit by the presentation
// cycle through `SurfaceFactory`; never resized in place.

use ash::vk;

use super::VulkanDevice;
use crate::error::{FrameError, FrameResult};
use crate::frame::{PresentSurface, SurfaceFactory, SurfaceRequest};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    pub fn new(device: &VulkanDevice, request: &SurfaceRequest) -> FrameResult<Self> {
        let surface_loader = &device.surface_loader;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, device.surface)
        }?;

        // Query supported formats
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device, device.surface)
        }?;

        // Query supported present modes
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, device.surface)
        }?;

        if !surface_caps
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST)
        {
            return Err(FrameError::SurfaceCreation(
                "surface images cannot be cleared (no TRANSFER_DST usage)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&formats).ok_or_else(|| {
            FrameError::SurfaceCreation("surface advertises no formats".to_string())
        })?;

        // Configured mode if available, FIFO otherwise (always supported)
        let present_mode = if present_modes.contains(&device.present_mode) {
            device.present_mode
        } else {
            vk::PresentModeKHR::FIFO
        };

        let extent = choose_extent(&surface_caps, request.extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(FrameError::Minimized);
        }

        let image_count = choose_image_count(&surface_caps, request.buffering);

        log::info!(
            "Creating swapchain: {}x{}, {} images requested, {:?}",
            extent.width,
            extent.height,
            image_count,
            present_mode
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }?;

        let images = match unsafe { device.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(err) => {
                unsafe { device.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(err.into());
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        Ok(Self {
            swapchain,
            images,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    pub fn destroy(self, device: &VulkanDevice) {
        unsafe {
            device
                .swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

impl PresentSurface for Swapchain {
    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn format(&self) -> vk::Format {
        self.format
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl SurfaceFactory for VulkanDevice {
    fn create_surface(&self, request: &SurfaceRequest) -> FrameResult<Swapchain> {
        Swapchain::new(self, request)
    }

    fn destroy_surface(&self, surface: Swapchain) {
        surface.destroy(self);
    }
}

/// Prefer 8-bit SRGB with a nonlinear colour space, else whatever comes first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            matches!(
                f.format,
                vk::Format::B8G8R8A8_SRGB | vk::Format::R8G8B8A8_SRGB
            ) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: requested
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Requested depth (at least double buffering) clamped to what the surface
/// allows. A max of 0 means unbounded.
fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut image_count = requested.max(2).max(caps.min_image_count);
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        image_count = caps.max_image_count;
    }
    image_count
}
