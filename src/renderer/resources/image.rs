use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use crate::renderer::internals::barrier;

pub struct ImageCreateInfo<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub location: MemoryLocation,
    pub name: &'a str,
}

impl<'a> ImageCreateInfo<'a> {
    /// Sampled RGBA8 image filled through a staging copy
    pub fn texture(extent: vk::Extent2D, name: &'a str) -> Self {
        Self {
            format: vk::Format::R8G8B8A8_SRGB,
            extent: extent_3d(extent),
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: vk::ImageAspectFlags::COLOR,
            location: MemoryLocation::GpuOnly,
            name,
        }
    }

    /// Offscreen HDR target written by compute, rendered into, then blitted out
    pub fn draw_target(extent: vk::Extent2D) -> Self {
        Self {
            format: vk::Format::R16G16B16A16_SFLOAT,
            extent: extent_3d(extent),
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            aspect: vk::ImageAspectFlags::COLOR,
            location: MemoryLocation::GpuOnly,
            name: "Draw image",
        }
    }

    pub fn depth_target(extent: vk::Extent2D) -> Self {
        Self {
            format: vk::Format::D32_SFLOAT,
            extent: extent_3d(extent),
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect: vk::ImageAspectFlags::DEPTH,
            location: MemoryLocation::GpuOnly,
            name: "Depth image",
        }
    }
}

fn extent_3d(extent: vk::Extent2D) -> vk::Extent3D {
    vk::Extent3D {
        width: extent.width,
        height: extent.height,
        depth: 1,
    }
}

/// A layout change to record as a pipeline barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

impl ImageTransition {
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        barrier::transition_image_layout(
            cmd,
            self.image,
            self.aspect,
            self.old_layout,
            self.new_layout,
            device,
        );
    }
}

/// The layout an image will be in once all recorded commands have executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTracker {
    current: vk::ImageLayout,
}

impl LayoutTracker {
    pub fn new(initial: vk::ImageLayout) -> Self {
        Self { current: initial }
    }

    #[cfg(test)]
    pub fn current(&self) -> vk::ImageLayout {
        self.current
    }

    /// Moves to `new_layout` from wherever the image is. `None` when it is already there.
    pub fn transition(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        new_layout: vk::ImageLayout,
    ) -> Option<ImageTransition> {
        let old_layout = self.current;
        if old_layout == new_layout {
            return None;
        }
        self.current = new_layout;
        Some(ImageTransition {
            image,
            aspect,
            old_layout,
            new_layout,
        })
    }

    /// Like [`transition`](Self::transition), but the image must currently be in `expected`
    pub fn transition_from(
        &mut self,
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        expected: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<Option<ImageTransition>> {
        if self.current != expected {
            return Err(eyre!(
                "Image {:?} is in layout {:?}, expected {:?} before moving to {:?}",
                image,
                self.current,
                expected,
                new_layout,
            ));
        }
        Ok(self.transition(image, aspect, new_layout))
    }

    /// Forget the contents; the next transition starts from `UNDEFINED`
    pub fn discard(&mut self) {
        self.current = vk::ImageLayout::UNDEFINED;
    }
}

/// A device image, its default view and the memory backing it.
///
/// Plain data: destruction goes through a deletion queue, never `Drop`.
#[derive(Debug)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub aspect: vk::ImageAspectFlags,

    layout: LayoutTracker,
    pub(crate) allocation: Option<Allocation>,
}

impl AllocatedImage {
    pub fn new(
        image: vk::Image,
        view: vk::ImageView,
        info: &ImageCreateInfo,
        allocation: Option<Allocation>,
    ) -> Self {
        Self {
            image,
            view,
            format: info.format,
            extent: info.extent,
            aspect: info.aspect,
            layout: LayoutTracker::new(vk::ImageLayout::UNDEFINED),
            allocation,
        }
    }

    #[cfg(test)]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout.current()
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub fn transition(&mut self, new_layout: vk::ImageLayout) -> Option<ImageTransition> {
        self.layout.transition(self.image, self.aspect, new_layout)
    }

    pub fn transition_from(
        &mut self,
        expected: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<Option<ImageTransition>> {
        self.layout.transition_from(self.image, self.aspect, expected, new_layout)
    }

    pub fn discard_contents(&mut self) {
        self.layout.discard();
    }

    /// Records the barrier for `new_layout` straight into `cmd`
    pub fn record_transition(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
    ) {
        if let Some(transition) = self.transition(new_layout) {
            transition.record(device, cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image() -> AllocatedImage {
        let info = ImageCreateInfo::texture(vk::Extent2D { width: 4, height: 4 }, "test");
        AllocatedImage::new(vk::Image::null(), vk::ImageView::null(), &info, None)
    }

    #[test]
    fn new_images_start_undefined() {
        assert_eq!(test_image().layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn transitions_carry_the_tracked_old_layout() {
        let mut image = test_image();
        let first = image.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(first.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let second = image.transition(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(second.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(image.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn transition_to_current_layout_is_skipped() {
        let mut image = test_image();
        image.transition(vk::ImageLayout::GENERAL);
        assert!(image.transition(vk::ImageLayout::GENERAL).is_none());
    }

    #[test]
    fn unexpected_prior_layout_is_rejected() {
        let mut image = test_image();
        image.transition(vk::ImageLayout::GENERAL);
        let result = image.transition_from(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(result.is_err());
        // A rejected transition leaves the tracked layout alone
        assert_eq!(image.layout(), vk::ImageLayout::GENERAL);
    }

    #[test]
    fn discarding_restarts_from_undefined() {
        let mut image = test_image();
        image.transition(vk::ImageLayout::PRESENT_SRC_KHR);
        image.discard_contents();
        let transition = image.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(transition.old_layout, vk::ImageLayout::UNDEFINED);
    }
}
