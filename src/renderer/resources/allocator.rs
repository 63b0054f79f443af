use ash::vk;
use bytemuck::Pod;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::deletion_queue::ResourceDestroyer;
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::resources::image::{AllocatedImage, ImageCreateInfo, ImageTransition};

/// One step of a synchronous upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCommand {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: u64,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        aspect: vk::ImageAspectFlags,
        extent: vk::Extent3D,
    },
    Transition(ImageTransition),
}

impl TransferCommand {
    pub fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        match *self {
            TransferCommand::CopyBuffer { src, dst, size } => {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                unsafe {
                    device.cmd_copy_buffer(cmd, src, dst, &[region]);
                }
            }
            TransferCommand::CopyBufferToImage { src, dst, aspect, extent } => {
                let copy_region = vk::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    image_extent: extent,
                    ..Default::default()
                };
                unsafe {
                    // Copy staging buffer into image
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        src,
                        dst,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[copy_region],
                    );
                }
            }
            TransferCommand::Transition(transition) => transition.record(device, cmd),
        }
    }
}

/// Creates device buffers and images and moves bytes into them.
///
/// Failures are returned to the caller; during init they propagate to `main` and end the process.
pub trait ResourceAllocator: ResourceDestroyer {
    /// `size` must be non-zero
    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedBuffer>;

    fn create_image(&self, info: &ImageCreateInfo) -> Result<AllocatedImage>;

    /// Copies `data` into a host-visible buffer at byte `offset`
    fn write_buffer(
        &self,
        buffer: &mut AllocatedBuffer,
        offset: usize,
        data: &[u8],
    ) -> Result<()>;

    /// Records `commands` into a one-shot command buffer, submits it and blocks until it completes
    fn submit_transfer(&self, commands: &[TransferCommand]) -> Result<()>;

    fn write_pod<T: Pod>(
        &self,
        buffer: &mut AllocatedBuffer,
        offset: usize,
        data: &[T],
    ) -> Result<()> {
        self.write_buffer(buffer, offset, bytemuck::cast_slice(data))
    }
}
