//! Swap chain, its render pass and per-image framebuffers.
//!
//! [`Swapchain`] owns everything whose lifetime follows the presentable images:
//! one color view, one depth image and one framebuffer per image. The default
//! render pass is created once and survives recreation, which is why a format
//! change on recreate is reported as [`RhiError::SwapchainFormatChanged`].
//!
//! Acquire and present report staleness as a [`SwapStatus`] instead of an
//! error so the caller can decide when to recreate.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, find_depth_format};
use crate::instance::Instance;
use crate::render_pass::{Framebuffer, RenderPass, RenderPassKind};

/// Result of an acquire or present call that did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapStatus {
    Optimal,
    /// Still usable for this frame; recreate afterwards.
    Suboptimal,
    /// Unusable; recreate before rendering.
    OutOfDate,
}

impl SwapStatus {
    fn from_suboptimal(suboptimal: bool) -> Self {
        if suboptimal {
            SwapStatus::Suboptimal
        } else {
            SwapStatus::Optimal
        }
    }

    pub fn needs_recreate(self) -> bool {
        self != SwapStatus::Optimal
    }
}

/// Map the raw result of `vkAcquireNextImageKHR`.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<(u32, SwapStatus)> {
    match result {
        Ok((index, suboptimal)) => Ok((index, SwapStatus::from_suboptimal(suboptimal))),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((0, SwapStatus::OutOfDate)),
        Err(e) => Err(e.into()),
    }
}

/// Map the raw result of `vkQueuePresentKHR`.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SwapStatus> {
    match result {
        Ok(suboptimal) => Ok(SwapStatus::from_suboptimal(suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapStatus::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// What a surface supports on a physical device.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count {}..{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Color view, depth buffer and framebuffer of one swap image.
///
/// Field order is drop order: the framebuffer goes before the views it references.
struct SwapTarget {
    framebuffer: Framebuffer,
    _depth: Image,
    _view: SwapImageView,
}

struct SwapImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl Drop for SwapImageView {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_image_view(self.view, None) };
    }
}

/// Vulkan swap chain wrapper.
///
/// Not thread-safe; the frame loop owns it.
pub struct Swapchain {
    targets: Vec<SwapTarget>,
    render_pass: RenderPass,
    device: Arc<Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Create the swap chain for `surface`. `extent` is used when the surface
    /// leaves the size to the application.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let support =
            SwapchainSupportDetails::query(&surface_loader, device.physical_device(), surface)?;
        let created = create_handle(
            &device,
            &swapchain_loader,
            &support,
            surface,
            extent,
            vk::SwapchainKHR::null(),
        )?;

        let depth_format = find_depth_format(&device)?;
        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassKind::Present,
            created.surface_format.format,
            depth_format,
        )?;

        let images = unsafe { swapchain_loader.get_swapchain_images(created.swapchain)? };
        let targets = create_targets(
            &device,
            &render_pass,
            &images,
            created.surface_format.format,
            depth_format,
            created.extent,
        )?;

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} image(s)",
            created.extent.width,
            created.extent.height,
            created.surface_format.format,
            created.present_mode,
            images.len()
        );

        Ok(Self {
            targets,
            render_pass,
            device,
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: created.swapchain,
            images,
            surface_format: created.surface_format,
            depth_format,
            extent: created.extent,
            present_mode: created.present_mode,
        })
    }

    /// Rebuild against the surface's current size.
    ///
    /// Waits for the device to go idle first. The render pass is kept, so the
    /// color and depth formats must not change.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.device.wait_idle()?;

        let support = SwapchainSupportDetails::query(
            &self.surface_loader,
            self.device.physical_device(),
            self.surface,
        )?;
        let new_format = choose_surface_format(&support.formats)?.format;
        if new_format != self.surface_format.format {
            return Err(RhiError::SwapchainFormatChanged {
                old: self.surface_format.format,
                new: new_format,
            });
        }
        let new_depth = find_depth_format(&self.device)?;
        if new_depth != self.depth_format {
            return Err(RhiError::SwapchainFormatChanged {
                old: self.depth_format,
                new: new_depth,
            });
        }

        self.targets.clear();

        let old_swapchain = self.swapchain;
        let created = create_handle(
            &self.device,
            &self.swapchain_loader,
            &support,
            self.surface,
            extent,
            old_swapchain,
        )?;
        unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        self.swapchain = created.swapchain;

        let old_count = self.images.len();
        self.images = unsafe { self.swapchain_loader.get_swapchain_images(self.swapchain)? };
        if self.images.len() != old_count {
            debug!(
                "Swap image count changed from {} to {}",
                old_count,
                self.images.len()
            );
        }

        self.extent = created.extent;
        self.present_mode = created.present_mode;
        self.targets = create_targets(
            &self.device,
            &self.render_pass,
            &self.images,
            self.surface_format.format,
            self.depth_format,
            self.extent,
        )?;

        info!(
            "Swapchain recreated: {}x{}, {} image(s)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
        Ok(())
    }

    /// Acquire the next image, signalling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<(u32, SwapStatus)> {
        classify_acquire(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Queue `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<SwapStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    /// Raw swap chain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Color format of the swap images, also the render pass attachment format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Format of the depth attachment shared by every framebuffer.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Size of the swap images, clamped to the surface limits.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of swap images. May change across recreation.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Render pass every framebuffer was created against.
    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Framebuffer for the image at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid swap image index.
    #[inline]
    pub fn framebuffer(&self, index: u32) -> vk::Framebuffer {
        self.targets[index as usize].framebuffer.handle()
    }

    /// Width over height of the current extent.
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.targets.clear();
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

struct CreatedSwapchain {
    swapchain: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

fn create_handle(
    device: &Device,
    loader: &ash::khr::swapchain::Device,
    support: &SwapchainSupportDetails,
    surface: vk::SurfaceKHR,
    requested: vk::Extent2D,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<CreatedSwapchain> {
    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "surface reports no formats or present modes".into(),
        ));
    }

    let surface_format = choose_surface_format(&support.formats)?;
    let present_mode = choose_present_mode(&support.present_modes);
    let extent = choose_extent(&support.capabilities, requested.width, requested.height);
    let image_count = determine_image_count(&support.capabilities);

    let families = device.queue_families();
    let family_indices = [families.graphics, families.present];
    let (sharing_mode, shared_families) = if families.is_split() {
        (vk::SharingMode::CONCURRENT, family_indices.as_slice())
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(shared_families)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
    Ok(CreatedSwapchain {
        swapchain,
        surface_format,
        extent,
        present_mode,
    })
}

fn create_targets(
    device: &Arc<Device>,
    render_pass: &RenderPass,
    images: &[vk::Image],
    format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
) -> RhiResult<Vec<SwapTarget>> {
    images
        .iter()
        .map(|&image| {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            let view = SwapImageView {
                device: device.clone(),
                view: unsafe { device.handle().create_image_view(&view_info, None)? },
            };
            let depth = Image::new(device.clone(), ImageDesc::depth(extent, depth_format))?;
            let framebuffer = Framebuffer::new(
                device.clone(),
                render_pass,
                &[view.view, depth.view()],
                extent,
            )?;
            Ok(SwapTarget {
                framebuffer,
                _depth: depth,
                _view: view,
            })
        })
        .collect()
}

/// B8G8R8A8_SRGB with SRGB_NONLINEAR when offered, else the first format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });
    if let Some(&format) = preferred {
        return Ok(format);
    }

    let first = formats
        .first()
        .copied()
        .ok_or_else(|| RhiError::SwapchainError("surface reports no formats".into()))?;
    warn!("Preferred surface format unavailable, using {:?}", first.format);
    Ok(first)
}

/// MAILBOX when offered, else FIFO (always supported).
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent, or the requested size clamped to its limits
/// when the surface leaves it undefined.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped at the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = [
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_choose_present_mode() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);

        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 4);
    }

    #[test]
    fn test_support_details_is_adequate() {
        let mut support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(support.is_adequate());

        support.present_modes.clear();
        assert!(!support.is_adequate());
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            (2, SwapStatus::Optimal)
        );
        assert_eq!(
            classify_acquire(Ok((1, true))).unwrap(),
            (1, SwapStatus::Suboptimal)
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR))
                .unwrap()
                .1,
            SwapStatus::OutOfDate
        );
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn test_classify_present() {
        assert_eq!(classify_present(Ok(false)).unwrap(), SwapStatus::Optimal);
        assert_eq!(classify_present(Ok(true)).unwrap(), SwapStatus::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SwapStatus::OutOfDate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_status_needs_recreate() {
        assert!(!SwapStatus::Optimal.needs_recreate());
        assert!(SwapStatus::Suboptimal.needs_recreate());
        assert!(SwapStatus::OutOfDate.needs_recreate());
    }
}
