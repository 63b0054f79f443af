//! Host-memory stand-in for the device, used by unit tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use ash::vk;
use ash::vk::Handle;
use color_eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};
use gpu_allocator::MemoryLocation;
use crate::renderer::deletion_queue::{GpuResource, ResourceDestroyer};
use crate::renderer::resources::allocator::{ResourceAllocator, TransferCommand};
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::resources::image::{AllocatedImage, ImageCreateInfo};

struct MockImage {
    bytes: Vec<u8>,
    layout: vk::ImageLayout,
}

#[derive(Default)]
pub struct MockAllocator {
    next_handle: Cell<u64>,
    buffers: RefCell<HashMap<u64, Vec<u8>>>,
    images: RefCell<HashMap<u64, MockImage>>,
    destroyed: RefCell<Vec<&'static str>>,
    fail_next_submit: Cell<bool>,
}

impl MockAllocator {
    fn next_handle(&self) -> u64 {
        let handle = self.next_handle.get() + 1;
        self.next_handle.set(handle);
        handle
    }

    pub fn fail_next_submit(&self) {
        self.fail_next_submit.set(true);
    }

    pub fn read_buffer(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        self.buffers.borrow().get(&buffer.as_raw()).cloned()
    }

    pub fn read_image(&self, image: vk::Image) -> Option<Vec<u8>> {
        self.images.borrow().get(&image.as_raw()).map(|image| image.bytes.clone())
    }

    pub fn image_layout(&self, image: vk::Image) -> Option<vk::ImageLayout> {
        self.images.borrow().get(&image.as_raw()).map(|image| image.layout)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    /// Kinds of every destroyed resource, in destruction order
    pub fn destroyed(&self) -> Vec<&'static str> {
        self.destroyed.borrow().clone()
    }

    fn execute(&self, command: &TransferCommand) -> Result<()> {
        let mut buffers = self.buffers.borrow_mut();
        let mut images = self.images.borrow_mut();
        match *command {
            TransferCommand::CopyBuffer { src, dst, size } => {
                let data = buffers
                    .get(&src.as_raw())
                    .ok_or_eyre("Copy from unknown buffer")?
                    .get(..size as usize)
                    .ok_or_eyre("Copy reads past the source buffer")?
                    .to_vec();
                let target = buffers
                    .get_mut(&dst.as_raw())
                    .ok_or_eyre("Copy into unknown buffer")?
                    .get_mut(..size as usize)
                    .ok_or_eyre("Copy writes past the destination buffer")?;
                target.copy_from_slice(&data);
            }
            TransferCommand::CopyBufferToImage { src, dst, .. } => {
                let image = images.get_mut(&dst.as_raw()).ok_or_eyre("Copy into unknown image")?;
                if image.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
                    return Err(eyre!("Copy into image in layout {:?}", image.layout));
                }
                let data = buffers.get(&src.as_raw()).ok_or_eyre("Copy from unknown buffer")?;
                let len = image.bytes.len();
                let source = data.get(..len).ok_or_eyre("Staging buffer smaller than image")?;
                image.bytes.copy_from_slice(source);
            }
            TransferCommand::Transition(transition) => {
                let image = images
                    .get_mut(&transition.image.as_raw())
                    .ok_or_eyre("Transition of unknown image")?;
                if transition.old_layout != vk::ImageLayout::UNDEFINED
                    && transition.old_layout != image.layout
                {
                    return Err(eyre!(
                        "Barrier claims {:?} but image is in {:?}",
                        transition.old_layout,
                        image.layout,
                    ));
                }
                image.layout = transition.new_layout;
            }
        }
        Ok(())
    }
}

impl ResourceDestroyer for MockAllocator {
    fn destroy(&self, resource: GpuResource) {
        match &resource {
            GpuResource::Buffer(buffer) => {
                self.buffers.borrow_mut().remove(&buffer.buffer.as_raw());
            }
            GpuResource::Image(image) => {
                self.images.borrow_mut().remove(&image.image.as_raw());
            }
            _ => {}
        }
        self.destroyed.borrow_mut().push(resource.kind());
    }
}

impl ResourceAllocator for MockAllocator {
    fn create_buffer(
        &self,
        size: u64,
        _usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        _name: &str,
    ) -> Result<AllocatedBuffer> {
        if size == 0 {
            return Err(eyre!("Buffer size must be non-zero"));
        }
        let handle = self.next_handle();
        self.buffers.borrow_mut().insert(handle, vec![0; size as usize]);
        Ok(AllocatedBuffer::new(vk::Buffer::from_raw(handle), size, location, None))
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<AllocatedImage> {
        let handle = self.next_handle();
        let len = (info.extent.width * info.extent.height * info.extent.depth * 4) as usize;
        self.images.borrow_mut().insert(
            handle,
            MockImage {
                bytes: vec![0; len],
                layout: vk::ImageLayout::UNDEFINED,
            },
        );
        let view = vk::ImageView::from_raw(self.next_handle());
        Ok(AllocatedImage::new(vk::Image::from_raw(handle), view, info, None))
    }

    fn write_buffer(
        &self,
        buffer: &mut AllocatedBuffer,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        if !buffer.is_host_visible() {
            return Err(eyre!("GPU-only buffer cannot be mapped"));
        }
        buffer.check_write_range(offset, data.len())?;
        let mut buffers = self.buffers.borrow_mut();
        let bytes = buffers
            .get_mut(&buffer.buffer.as_raw())
            .ok_or_eyre("Write to unknown buffer")?;
        bytes
            .get_mut(offset..offset + data.len())
            .ok_or_eyre("Write past the end of the buffer")?
            .copy_from_slice(data);
        Ok(())
    }

    fn submit_transfer(&self, commands: &[TransferCommand]) -> Result<()> {
        if self.fail_next_submit.replace(false) {
            return Err(eyre!("Simulated queue submission failure"));
        }
        commands.iter().try_for_each(|command| self.execute(command))
    }
}
