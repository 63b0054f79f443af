use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, Surface};
use crate::renderer::contexts::device_ctx::queue::{self, Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::deletion_queue::{GpuResource, ResourceDestroyer};
use crate::renderer::internals::barrier::subresource_range;
use crate::renderer::resources::allocator::{ResourceAllocator, TransferCommand};
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::resources::image::{AllocatedImage, ImageCreateInfo};

/// Logical device, its graphics queue and the memory allocator
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    // Graphics, compute and present all go through this queue
    pub graphics_queue: Queue,

    memory_allocator: ManuallyDrop<Mutex<Allocator>>,
    transfer_context: TransferContext,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &Surface,
    ) -> Result<Self> {
        let (
            physical_device,
            graphics_queue_family,
        ) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;
        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        log::info!(
            "Selected GPU: {:?}",
            properties.device_name_as_c_str().unwrap_or(c"<unknown>"),
        );

        let (
            logical_device,
            graphics_queue,
        ) = Self::create_logical_device(
            &instance.instance,
            &physical_device,
            graphics_queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: true,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let logical_device = Arc::new(logical_device);

        let transfer_context = TransferContext::new(
            graphics_queue.handle,
            graphics_queue.family.index,
            logical_device.clone(),
        )?;

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            properties,

            graphics_queue,

            memory_allocator: ManuallyDrop::new(Mutex::new(memory_allocator)),
            transfer_context,
        })
    }

    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context.immediate_submit(func)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn lock_allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let req_device_exts = Self::get_required_device_extensions();

        Ok(unsafe {
            instance
                .enumerate_physical_devices()?
                .into_iter()
                // Filter out devices that do not contain the required device extensions
                .filter(|device| {
                    let supported_extensions = instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default();

                    req_device_exts.iter().all(|req_ext| {
                        let req_ext_supported = supported_extensions
                            .iter()
                            .filter_map(|sup_ext| sup_ext.extension_name_as_c_str().ok())
                            .any(|sup_ext| sup_ext == *req_ext);
                        if !req_ext_supported {
                            log::warn!("Device extension not supported: {:?}", req_ext);
                        }
                        req_ext_supported
                    })
                })
                // Dynamic rendering and synchronization2 are core in 1.3
                .filter(|device| {
                    let props = instance.get_physical_device_properties(*device);
                    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
                    let mut features = vk::PhysicalDeviceFeatures2::default()
                        .push_next(&mut features13);
                    instance.get_physical_device_features2(*device, &mut features);

                    props.api_version >= vk::API_VERSION_1_3
                        && features13.dynamic_rendering == vk::TRUE
                        && features13.synchronization2 == vk::TRUE
                })
                // Filter out devices without a queue that can draw and present
                .filter_map(|device| {
                    let props = instance
                        .get_physical_device_queue_family_properties(device);
                    queue::find_graphics_family(&props, |index| {
                        surface.supports_present(device, index)
                    })
                    .map(|family| (device, family))
                })
                .min_by_key(|(device, _)| {
                    let props = instance.get_physical_device_properties(*device);
                    match props.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                        vk::PhysicalDeviceType::CPU => 3,
                        vk::PhysicalDeviceType::OTHER => 4,
                        _ => 5,
                    }
                })
                .ok_or_eyre("No suitable physical device found")?
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let device = {
            let enabled_extension_names = Self::get_required_device_extensions()
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();
            let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
                .dynamic_rendering(true)
                .synchronization2(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .push_next(&mut features13);

            unsafe {
                instance.create_device(*physical_device, &device_create_info, None)?
            }
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl ResourceAllocator for RenderDevice {
    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<AllocatedBuffer> {
        if size == 0 {
            return Err(eyre!("Buffer \"{}\" must have a non-zero size", name));
        }

        let buffer = {
            let buffer_info = vk::BufferCreateInfo {
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            unsafe { self.logical.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            self.logical.get_buffer_memory_requirements(buffer)
        };
        let allocation = self.lock_allocator().and_then(|mut allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            })?)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.logical.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let allocated = AllocatedBuffer::new(buffer, size, location, Some(allocation));
        let bound = unsafe {
            match allocated.allocation.as_ref() {
                Some(allocation) => self.logical.bind_buffer_memory(
                    buffer,
                    allocation.memory(),
                    allocation.offset(),
                ),
                None => Err(vk::Result::ERROR_UNKNOWN),
            }
        };
        if let Err(err) = bound {
            self.destroy(GpuResource::Buffer(allocated));
            return Err(err.into());
        }

        Ok(allocated)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<AllocatedImage> {
        let image = {
            let image_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(info.format)
                .extent(info.extent)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(info.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { self.logical.create_image(&image_info, None)? }
        };

        let requirements = unsafe {
            self.logical.get_image_memory_requirements(image)
        };
        let allocation = self.lock_allocator().and_then(|mut allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: info.name,
                requirements,
                location: info.location,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            })?)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.logical.destroy_image(image, None) };
                return Err(err);
            }
        };

        let mut allocated = AllocatedImage::new(image, vk::ImageView::null(), info, Some(allocation));
        let view = unsafe {
            let bound = match allocated.allocation.as_ref() {
                Some(allocation) => self.logical.bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                ),
                None => Err(vk::Result::ERROR_UNKNOWN),
            };
            bound.and_then(|_| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .image(image)
                    .format(info.format)
                    .subresource_range(subresource_range(info.aspect));
                self.logical.create_image_view(&view_info, None)
            })
        };
        match view {
            Ok(view) => {
                allocated.view = view;
                Ok(allocated)
            }
            Err(err) => {
                self.destroy(GpuResource::Image(allocated));
                Err(err.into())
            }
        }
    }

    fn write_buffer(
        &self,
        buffer: &mut AllocatedBuffer,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        if !buffer.is_host_visible() {
            return Err(eyre!("Buffer {:?} lives in GPU-only memory and cannot be mapped", buffer.buffer));
        }
        buffer.check_write_range(offset, data.len())?;
        let mut slab = buffer
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.try_as_mapped_slab())
            .ok_or_eyre("Buffer memory is not host mapped")?;
        presser::copy_from_slice_to_offset(data, &mut slab, offset)?;
        Ok(())
    }

    fn submit_transfer(&self, commands: &[TransferCommand]) -> Result<()> {
        self.immediate_submit(|cmd, device| {
            for command in commands {
                command.record(device, cmd);
            }
            Ok(())
        })
    }
}

impl ResourceDestroyer for RenderDevice {
    fn destroy(&self, resource: GpuResource) {
        let device = &self.logical;
        unsafe {
            match resource {
                GpuResource::Buffer(mut buffer) => {
                    if let Some(allocation) = buffer.allocation.take() {
                        match self.lock_allocator() {
                            Ok(mut allocator) => {
                                if let Err(err) = allocator.free(allocation) {
                                    log::error!("Failed to free buffer memory: {}", err);
                                }
                            }
                            Err(err) => log::error!("Failed to free buffer memory: {}", err),
                        }
                    }
                    device.destroy_buffer(buffer.buffer, None);
                }
                GpuResource::Image(mut image) => {
                    // The view goes first, it refers to the image
                    if image.view != vk::ImageView::null() {
                        device.destroy_image_view(image.view, None);
                    }
                    if let Some(allocation) = image.allocation.take() {
                        match self.lock_allocator() {
                            Ok(mut allocator) => {
                                if let Err(err) = allocator.free(allocation) {
                                    log::error!("Failed to free image memory: {}", err);
                                }
                            }
                            Err(err) => log::error!("Failed to free image memory: {}", err),
                        }
                    }
                    device.destroy_image(image.image, None);
                }
                GpuResource::ImageView(view) => device.destroy_image_view(view, None),
                GpuResource::Sampler(sampler) => device.destroy_sampler(sampler, None),
                GpuResource::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
                GpuResource::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
                GpuResource::DescriptorSetLayout(layout) => {
                    device.destroy_descriptor_set_layout(layout, None)
                }
                GpuResource::DescriptorPool(pool) => device.destroy_descriptor_pool(pool, None),
                GpuResource::CommandPool(pool) => device.destroy_command_pool(pool, None),
                GpuResource::Fence(fence) => device.destroy_fence(fence, None),
                GpuResource::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
                GpuResource::ShaderModule(module) => device.destroy_shader_module(module, None),
            }
        }
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle: {}", err);
            }
            self.transfer_context.destroy();
            // Every allocation has been freed by now; the allocator must go before the device
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}
