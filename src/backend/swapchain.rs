// Swapchain - Window presentation
//
// Negotiates a swapchain configuration from the driver's reported surface
// capabilities, then creates the swapchain and its image views.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::error::BackendError;
use super::VulkanDevice;

/// Swapchain parameters negotiated from one snapshot of the surface state.
///
/// Derived once, immutable afterward, consumed by swapchain creation.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceNegotiation {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub extent: vk::Extent2D,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Negotiate swapchain parameters from the queried surface state.
///
/// - Format: prefer 8-bit BGRA sRGB with the non-linear sRGB color space,
///   otherwise the first format the driver reports.
/// - Present mode: FIFO, the vsync-throttled mode every driver must support.
/// - Image count: one above the minimum, clamped to the maximum when the
///   driver declares one (zero means unbounded).
/// - Extent: the driver's current extent. The all-bits-set sentinel means
///   the window manager decides the extent; that is unsupported here.
pub fn negotiate_surface(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    present_modes: &[vk::PresentModeKHR],
) -> Result<SurfaceNegotiation, BackendError> {
    if formats.is_empty() || present_modes.is_empty() {
        return Err(BackendError::InsufficientSurfaceSupport);
    }

    let format = formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0]);

    if capabilities.current_extent.width == u32::MAX {
        return Err(BackendError::UnresolvedExtent);
    }

    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }

    Ok(SurfaceNegotiation {
        format,
        present_mode: vk::PresentModeKHR::FIFO,
        image_count,
        extent: capabilities.current_extent,
        pre_transform: capabilities.current_transform,
    })
}

/// Image sharing across the two selected queue families.
///
/// Exclusive when graphics and present coincide; concurrent across exactly
/// the two distinct families otherwise.
pub fn sharing_mode(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family == present_family {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![graphics_family, present_family],
        )
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let capabilities = unsafe {
            device
                .surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, device.surface)
        }?;
        let formats = unsafe {
            device
                .surface_loader
                .get_physical_device_surface_formats(device.physical_device, device.surface)
        }?;
        let present_modes = unsafe {
            device
                .surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, device.surface)
        }?;

        let negotiated = negotiate_surface(&capabilities, &formats, &present_modes)?;
        log::info!(
            "Swapchain: {}x{}, {:?}/{:?}, {} images, {:?}",
            negotiated.extent.width,
            negotiated.extent.height,
            negotiated.format.format,
            negotiated.format.color_space,
            negotiated.image_count,
            negotiated.present_mode,
        );

        let (image_sharing_mode, queue_family_indices) =
            sharing_mode(device.graphics_family, device.present_family);

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(negotiated.image_count)
            .image_format(negotiated.format.format)
            .image_color_space(negotiated.format.color_space)
            .image_extent(negotiated.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(image_sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(negotiated.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(negotiated.present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }?;
        log::info!("Created swapchain with {} images", images.len());

        let image_views: Result<Vec<_>> = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(negotiated.format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe {
                    device
                        .device
                        .create_image_view(&create_info, None)
                        .context("Failed to create image view")
                }
            })
            .collect();

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views: image_views?,
            format: negotiated.format.format,
            extent: negotiated.extent,
            device,
        })
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    const FIFO: &[vk::PresentModeKHR] = &[vk::PresentModeKHR::FIFO];

    #[test]
    fn prefers_bgra_srgb_regardless_of_order() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let negotiated = negotiate_surface(&capabilities(2, 0), &formats, FIFO).unwrap();
        assert_eq!(negotiated.format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(
            negotiated.format.color_space,
            vk::ColorSpaceKHR::SRGB_NONLINEAR
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let formats = [format(
            vk::Format::R8G8B8A8_UNORM,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let negotiated = negotiate_surface(&capabilities(2, 0), &formats, FIFO).unwrap();
        assert_eq!(negotiated.format.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn empty_formats_fail() {
        assert!(matches!(
            negotiate_surface(&capabilities(2, 0), &[], FIFO),
            Err(BackendError::InsufficientSurfaceSupport)
        ));
    }

    #[test]
    fn empty_present_modes_fail() {
        let formats = [format(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        assert!(matches!(
            negotiate_surface(&capabilities(2, 0), &formats, &[]),
            Err(BackendError::InsufficientSurfaceSupport)
        ));
    }

    #[test]
    fn image_count_is_min_plus_one_when_unbounded() {
        let formats = [format(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let negotiated = negotiate_surface(&capabilities(2, 0), &formats, FIFO).unwrap();
        assert_eq!(negotiated.image_count, 3);
    }

    #[test]
    fn image_count_clamps_to_maximum() {
        let formats = [format(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let negotiated = negotiate_surface(&capabilities(2, 2), &formats, FIFO).unwrap();
        assert_eq!(negotiated.image_count, 2);

        let negotiated = negotiate_surface(&capabilities(2, 3), &formats, FIFO).unwrap();
        assert_eq!(negotiated.image_count, 3);
    }

    #[test]
    fn extent_passes_through_and_present_mode_is_fifo() {
        let formats = [format(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let negotiated = negotiate_surface(&capabilities(2, 0), &formats, FIFO).unwrap();
        assert_eq!(negotiated.extent.width, 800);
        assert_eq!(negotiated.extent.height, 600);
        assert_eq!(negotiated.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn sentinel_extent_fails() {
        let formats = [format(
            vk::Format::B8G8R8A8_SRGB,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )];
        let mut caps = capabilities(2, 0);
        caps.current_extent.width = u32::MAX;
        caps.current_extent.height = u32::MAX;
        assert!(matches!(
            negotiate_surface(&caps, &formats, FIFO),
            Err(BackendError::UnresolvedExtent)
        ));
    }

    #[test]
    fn same_family_is_exclusive() {
        let (mode, indices) = sharing_mode(1, 1);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());
    }

    #[test]
    fn distinct_families_are_concurrent() {
        let (mode, indices) = sharing_mode(0, 2);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }
}
