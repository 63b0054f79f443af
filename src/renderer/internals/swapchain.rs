use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, Surface};
use crate::renderer::internals::barrier::subresource_range;
use crate::renderer::resources::image::{ImageTransition, LayoutTracker};

/// A presentable image owned by the swapchain
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    layout: LayoutTracker,
}

impl SwapchainImage {
    /// Contents of an acquired image are never preserved
    pub fn discard_contents(&mut self) {
        self.layout.discard();
    }

    pub fn transition(&mut self, new_layout: vk::ImageLayout) -> Option<ImageTransition> {
        self.layout.transition(self.image, vk::ImageAspectFlags::COLOR, new_layout)
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<SwapchainImage>,
    pub image_extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(
        surface: &Surface,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let surface_capabilities = unsafe {
            surface.loader
                .get_physical_device_surface_capabilities(dev.physical, surface.handle)?
        };

        let image_extent = choose_extent(&surface_capabilities, window_extent);

        let min_image_count = {
            let min = surface_capabilities.min_image_count;
            let max = surface_capabilities.max_image_count;
            // Recommended to request at least one more image than the minimum
            // to prevent having to wait on driver to complete internal operations
            // before another image can be acquired
            if max > 0 && min + 1 > max {
                max
            } else {
                min + 1
            }
        };
        let pre_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };
        // Blit destination and UI overlay target
        let image_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST;

        let swapchain_loader = ash::khr::swapchain::Device::new(
            &ins.instance,
            &dev.logical,
        );
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(image_extent)
            .image_usage(image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        let images = match Self::create_swapchain_images(
            swapchain,
            &swapchain_loader,
            surface_format.format,
            dev,
        ) {
            Ok(images) => images,
            Err(err) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(err);
            }
        };
        log::debug!(
            "Swapchain created: {}x{}, {} images, {:?}",
            image_extent.width,
            image_extent.height,
            images.len(),
            present_mode,
        );

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_extent,
        })
    }

    fn create_swapchain_images(
        swapchain: vk::SwapchainKHR,
        swapchain_loader: &ash::khr::swapchain::Device,
        format: vk::Format,
        dev: &RenderDevice,
    ) -> Result<Vec<SwapchainImage>> {
        let swapchain_images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)?
        };
        let views = swapchain_images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::R,
                        g: vk::ComponentSwizzle::G,
                        b: vk::ComponentSwizzle::B,
                        a: vk::ComponentSwizzle::A,
                    })
                    .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
                    .image(*image);
                unsafe {
                    dev.logical.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok(swapchain_images
            .into_iter()
            .zip(views)
            .map(|(image, view)| SwapchainImage {
                image,
                view,
                layout: LayoutTracker::new(vk::ImageLayout::UNDEFINED),
            })
            .collect())
    }

    pub fn image_mut(&mut self, index: u32) -> Result<&mut SwapchainImage> {
        self.images
            .get_mut(index as usize)
            .ok_or_eyre("Swapchain image index out of range")
    }

    /// `Ok(None)` when the swapchain no longer matches the surface
    pub fn acquire_next_image(&self, present_semaphore: vk::Semaphore) -> Result<Option<u32>> {
        let acquired = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                present_semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            // A suboptimal image can still be presented, rebuild after this frame
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns whether the swapchain should be rebuilt
    pub fn present(
        &self,
        queue: vk::Queue,
        render_semaphore: vk::Semaphore,
        image_index: u32,
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let wait_semaphores = [render_semaphore];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    /// The device must be idle
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for image in self.images.drain(..) {
                device.destroy_image_view(image.view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        self.swapchain = vk::SwapchainKHR::null();
    }
}

/// The surface's fixed extent, or the window size clamped to what it supports
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}
