use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::{FrameFence, FrameSlot};
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::contexts::resource_ctx::descriptor_allocator::write_buffer_descriptor;
use crate::renderer::deletion_queue::{DeletionQueue, GpuResource, ResourceDestroyer};
use crate::renderer::resources::allocator::ResourceAllocator;
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::shader_data::{GpuCameraData, GpuObjectData, GpuSceneData};

/// A `vk::Fence` created signaled, so the first wait on a fresh frame returns at once
pub struct DeviceFence {
    pub handle: vk::Fence,
    device: Arc<ash::Device>,
}

impl DeviceFence {
    fn new(device: Arc<ash::Device>) -> Result<Self> {
        let handle = unsafe {
            device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };
        Ok(Self { handle, device })
    }
}

impl FrameFence for DeviceFence {
    fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.device.wait_for_fences(&[self.handle], true, timeout_ns)?;
        }
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        unsafe {
            self.device.reset_fences(&[self.handle])?;
        }
        Ok(())
    }
}

/// Everything one in-flight frame owns
pub struct Frame {
    // Signals when the swapchain image is ready to be rendered to.
    pub present_semaphore: vk::Semaphore,

    // Signals when rendering commands have finished and the image can be presented.
    pub render_semaphore: vk::Semaphore,

    // Signals when all rendering commands have finished execution.
    pub render_fence: DeviceFence,

    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,

    pub camera_buffer: AllocatedBuffer,
    pub object_buffer: AllocatedBuffer,
    pub global_descriptor: vk::DescriptorSet,
    pub object_descriptor: vk::DescriptorSet,

    /// Resources only this frame's last submission may still reference
    pub deletion_queue: DeletionQueue,
}

impl Frame {
    pub fn new(
        dev: &RenderDevice,
        res: &mut RenderResourceContext,
        max_objects: usize,
    ) -> Result<Self> {
        let device = &dev.logical;

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(dev.graphics_queue.family.index);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };

        // Sync objects created so far, destroyed if a later step fails
        let mut pending = DeletionQueue::new();
        pending.push(GpuResource::CommandPool(command_pool));

        match Self::create_contents(dev, res, max_objects, command_pool, &mut pending) {
            Ok(frame) => {
                // Handles are now owned by the frame
                pending.flush(|_| {});
                Ok(frame)
            }
            Err(err) => {
                pending.flush_with(dev);
                Err(err)
            }
        }
    }

    fn create_contents(
        dev: &RenderDevice,
        res: &mut RenderResourceContext,
        max_objects: usize,
        command_pool: vk::CommandPool,
        pending: &mut DeletionQueue,
    ) -> Result<Self> {
        let device = &dev.logical;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info)?[0] };

        let present_semaphore = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        pending.push(GpuResource::Semaphore(present_semaphore));
        let render_semaphore = unsafe {
            device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        pending.push(GpuResource::Semaphore(render_semaphore));
        let render_fence = DeviceFence::new(device.clone())?;
        pending.push(GpuResource::Fence(render_fence.handle));

        let camera_size = size_of::<GpuCameraData>() as u64;
        let camera_buffer = dev.create_buffer(
            camera_size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "Camera buffer",
        )?;
        let object_size = (max_objects.max(1) * size_of::<GpuObjectData>()) as u64;
        let object_buffer = match dev.create_buffer(
            object_size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            "Object buffer",
        ) {
            Ok(buffer) => buffer,
            Err(err) => {
                dev.destroy(GpuResource::Buffer(camera_buffer));
                return Err(err);
            }
        };

        let descriptors = res
            .allocate_global_set()
            .and_then(|global| Ok((global, res.allocate_object_set()?)));
        let (global_descriptor, object_descriptor) = match descriptors {
            Ok(sets) => sets,
            Err(err) => {
                dev.destroy(GpuResource::Buffer(object_buffer));
                dev.destroy(GpuResource::Buffer(camera_buffer));
                return Err(err);
            }
        };

        write_buffer_descriptor(
            device,
            global_descriptor,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            camera_buffer.buffer,
            camera_size,
        );
        // Dynamic: the per-frame offset into the shared buffer is supplied at bind time
        write_buffer_descriptor(
            device,
            global_descriptor,
            1,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            res.scene_buffer.buffer,
            size_of::<GpuSceneData>() as u64,
        );
        write_buffer_descriptor(
            device,
            object_descriptor,
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            object_buffer.buffer,
            object_size,
        );

        Ok(Self {
            present_semaphore,
            render_semaphore,
            render_fence,
            command_pool,
            command_buffer,
            camera_buffer,
            object_buffer,
            global_descriptor,
            object_descriptor,
            deletion_queue: DeletionQueue::new(),
        })
    }

    /// Writes the camera and per-object data for this frame. The frame's fence must have been waited on.
    pub fn write_frame_data(
        &mut self,
        allocator: &impl ResourceAllocator,
        camera: &GpuCameraData,
        objects: &[GpuObjectData],
    ) -> Result<()> {
        allocator.write_pod(&mut self.camera_buffer, 0, std::slice::from_ref(camera))?;
        if !objects.is_empty() {
            allocator.write_pod(&mut self.object_buffer, 0, objects)?;
        }
        Ok(())
    }

    /// Destroys the frame's resources. The device must be idle.
    pub fn release(mut self, destroyer: &impl ResourceDestroyer) {
        self.deletion_queue.flush_with(destroyer);
        destroyer.destroy(GpuResource::Buffer(self.object_buffer));
        destroyer.destroy(GpuResource::Buffer(self.camera_buffer));
        destroyer.destroy(GpuResource::Fence(self.render_fence.handle));
        destroyer.destroy(GpuResource::Semaphore(self.render_semaphore));
        destroyer.destroy(GpuResource::Semaphore(self.present_semaphore));
        // Frees the command buffer with it
        destroyer.destroy(GpuResource::CommandPool(self.command_pool));
    }
}

impl FrameSlot for Frame {
    type Fence = DeviceFence;

    fn render_fence(&self) -> &DeviceFence {
        &self.render_fence
    }
}
