use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::resource_ctx::write_draw_image_descriptor;
use crate::renderer::deletion_queue::{GpuResource, ResourceDestroyer};
use crate::renderer::resources::allocator::ResourceAllocator;
use crate::renderer::resources::image::{AllocatedImage, ImageCreateInfo};

/// The HDR colour and depth images a frame is rendered into before being blitted to the swapchain
pub struct DrawTargets {
    pub color: AllocatedImage,
    pub depth: AllocatedImage,
    /// Storage image binding of `color` for the compute effects
    pub color_set: vk::DescriptorSet,
}

impl DrawTargets {
    pub fn new(
        dev: &RenderDevice,
        extent: vk::Extent2D,
        color_set: vk::DescriptorSet,
    ) -> Result<Self> {
        let (color, depth) = create_images(dev, extent)?;
        write_draw_image_descriptor(&dev.logical, color_set, color.view);
        Ok(Self {
            color,
            depth,
            color_set,
        })
    }

    pub fn color_format(&self) -> vk::Format {
        self.color.format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth.format
    }

    /// Replaces both images with ones of `extent` and repoints the storage descriptor.
    /// The device must be idle.
    pub fn recreate(&mut self, dev: &RenderDevice, extent: vk::Extent2D) -> Result<()> {
        let (color, depth) = create_images(dev, extent)?;
        write_draw_image_descriptor(&dev.logical, self.color_set, color.view);
        let old_color = std::mem::replace(&mut self.color, color);
        let old_depth = std::mem::replace(&mut self.depth, depth);
        dev.destroy(GpuResource::Image(old_depth));
        dev.destroy(GpuResource::Image(old_color));
        Ok(())
    }

    /// The device must be idle
    pub fn destroy(self, destroyer: &impl ResourceDestroyer) {
        destroyer.destroy(GpuResource::Image(self.depth));
        destroyer.destroy(GpuResource::Image(self.color));
    }
}

fn create_images(dev: &RenderDevice, extent: vk::Extent2D) -> Result<(AllocatedImage, AllocatedImage)> {
    let color = dev.create_image(&ImageCreateInfo::draw_target(extent))?;
    let depth = match dev.create_image(&ImageCreateInfo::depth_target(extent)) {
        Ok(depth) => depth,
        Err(err) => {
            dev.destroy(GpuResource::Image(color));
            return Err(err);
        }
    };
    log::debug!("Draw targets created: {}x{}", extent.width, extent.height);
    Ok((color, depth))
}

/// The region rendered this frame: the part of the draw image that fits the swapchain
pub fn draw_extent(draw_image: vk::Extent2D, swapchain: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: draw_image.width.min(swapchain.width),
        height: draw_image.height.min(swapchain.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_extent_never_exceeds_either_image() {
        let draw = vk::Extent2D { width: 1700, height: 900 };
        let smaller = vk::Extent2D { width: 800, height: 1200 };
        assert_eq!(draw_extent(draw, smaller), vk::Extent2D { width: 800, height: 900 });
        assert_eq!(draw_extent(draw, draw), draw);
    }
}
