pub mod descriptor_allocator;
pub mod descriptor_count;
pub mod descriptor_set_layout_builder;
pub mod upload;

use std::path::Path;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::FRAME_OVERLAP;
use crate::renderer::contexts::resource_ctx::descriptor_allocator::{
    write_image_descriptor, write_sampler_descriptor, DescriptorAllocator, PoolSizeRatio,
};
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::{
    DescriptorLayout, DescriptorSetLayoutBuilder,
};
use crate::renderer::deletion_queue::{DeletionQueue, GpuResource, ResourceDestroyer};
use crate::renderer::registry::{Handle, Registry};
use crate::renderer::resources::allocator::ResourceAllocator;
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::texture::Texture;
use crate::renderer::shader_data::GpuSceneData;
use crate::renderer::util::pad_uniform_buffer_size;

const GLOBAL_POOL_MAX_SETS: u32 = 10;

const GLOBAL_POOL_RATIOS: [PoolSizeRatio; 6] = [
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::SAMPLED_IMAGE, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
];

/// Byte offset of `frame_index`'s slot in the shared scene buffer
pub fn scene_offset(frame_index: usize, stride: u64) -> u32 {
    (stride * frame_index as u64) as u32
}

/// The layouts every material and effect pipeline is built against
#[derive(Debug, Clone, Copy)]
pub struct DescriptorLayouts {
    /// Set 0: camera and scene parameters
    pub global: DescriptorLayout,
    /// Set 1: per-object transforms
    pub object: DescriptorLayout,
    /// Set 2: sampled image and sampler for textured materials
    pub texture: DescriptorLayout,
    /// The compute effects' storage image
    pub draw_image: DescriptorLayout,
}

impl DescriptorLayouts {
    fn new(device: &ash::Device, deletion_queue: &mut DeletionQueue) -> Result<Self> {
        let mut build = |builder: DescriptorSetLayoutBuilder| -> Result<DescriptorLayout> {
            let layout = builder.build(device)?;
            deletion_queue.push(GpuResource::DescriptorSetLayout(layout.handle));
            Ok(layout)
        };

        let global = build(
            DescriptorSetLayoutBuilder::new()
                .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
                .add_binding(
                    1,
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                ),
        )?;
        let object = build(
            DescriptorSetLayoutBuilder::new()
                .add_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX),
        )?;
        let texture = build(
            DescriptorSetLayoutBuilder::new()
                .add_binding(0, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT)
                .add_binding(1, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT),
        )?;
        let draw_image = build(
            DescriptorSetLayoutBuilder::new()
                .add_binding(0, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE),
        )?;

        Ok(Self {
            global,
            object,
            texture,
            draw_image,
        })
    }
}

/// Responsibilities:
/// - Own the descriptor layouts and the global descriptor pool
/// - Own the shared scene parameter buffer
/// - Keep meshes and textures in name-keyed registries
/// - Track long-lived resource lifetimes in the main deletion queue
pub struct RenderResourceContext {
    pub layouts: DescriptorLayouts,
    pub descriptor_allocator: DescriptorAllocator,

    /// One `scene_stride`-sized slot per frame, bound with a dynamic offset
    pub scene_buffer: AllocatedBuffer,
    scene_stride: u64,

    pub meshes: Registry<Mesh>,
    pub textures: Registry<Texture>,
    pub sampler: vk::Sampler,

    /// Released at shutdown, after every frame has retired
    pub deletion_queue: DeletionQueue,
}

impl RenderResourceContext {
    pub fn new(dev: &RenderDevice) -> Result<Self> {
        let mut deletion_queue = DeletionQueue::new();
        match Self::create(dev, &mut deletion_queue) {
            Ok((layouts, sampler, scene_buffer, scene_stride, descriptor_allocator)) => Ok(Self {
                layouts,
                descriptor_allocator,
                scene_buffer,
                scene_stride,
                meshes: Registry::new(),
                textures: Registry::new(),
                sampler,
                deletion_queue,
            }),
            Err(err) => {
                deletion_queue.flush_with(dev);
                Err(err)
            }
        }
    }

    fn create(
        dev: &RenderDevice,
        deletion_queue: &mut DeletionQueue,
    ) -> Result<(DescriptorLayouts, vk::Sampler, AllocatedBuffer, u64, DescriptorAllocator)> {
        let layouts = DescriptorLayouts::new(&dev.logical, deletion_queue)?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT);
        let sampler = unsafe { dev.logical.create_sampler(&sampler_info, None)? };
        deletion_queue.push(GpuResource::Sampler(sampler));

        let scene_stride = pad_uniform_buffer_size(
            size_of::<GpuSceneData>() as u64,
            dev.min_uniform_buffer_offset_alignment(),
        );
        let scene_buffer = dev.create_buffer(
            scene_stride * FRAME_OVERLAP as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "Scene buffer",
        )?;

        let descriptor_allocator = match DescriptorAllocator::init_pool(
            dev.logical.clone(),
            GLOBAL_POOL_MAX_SETS,
            &GLOBAL_POOL_RATIOS,
            vk::DescriptorPoolCreateFlags::empty(),
        ) {
            Ok(allocator) => allocator,
            Err(err) => {
                dev.destroy(GpuResource::Buffer(scene_buffer));
                return Err(err);
            }
        };
        log::debug!("Resource context created, scene stride {} bytes", scene_stride);

        Ok((layouts, sampler, scene_buffer, scene_stride, descriptor_allocator))
    }

    pub fn scene_offset(&self, frame_index: usize) -> u32 {
        scene_offset(frame_index, self.scene_stride)
    }

    /// Only the slot of a frame whose fence has been waited on may be written
    pub fn write_scene_data(
        &mut self,
        allocator: &impl ResourceAllocator,
        frame_index: usize,
        data: &GpuSceneData,
    ) -> Result<()> {
        let offset = self.scene_offset(frame_index) as usize;
        allocator.write_pod(&mut self.scene_buffer, offset, std::slice::from_ref(data))
    }

    pub fn allocate_global_set(&mut self) -> Result<vk::DescriptorSet> {
        self.descriptor_allocator.allocate(&self.layouts.global)
    }

    pub fn allocate_object_set(&mut self) -> Result<vk::DescriptorSet> {
        self.descriptor_allocator.allocate(&self.layouts.object)
    }

    /// A set 2 descriptor sampling `texture` with the shared sampler
    pub fn allocate_texture_set(
        &mut self,
        device: &ash::Device,
        texture: Handle<Texture>,
    ) -> Result<vk::DescriptorSet> {
        let view = self
            .textures
            .get(texture)
            .map(|texture| texture.view)
            .ok_or_else(|| eyre!("Texture {:?} is not loaded", texture))?;
        let set = self.descriptor_allocator.allocate(&self.layouts.texture)?;
        write_image_descriptor(
            device,
            set,
            0,
            vk::DescriptorType::SAMPLED_IMAGE,
            view,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        write_sampler_descriptor(device, set, 1, self.sampler);
        Ok(set)
    }

    /// Written by the draw targets whenever the draw image is (re)created
    pub fn allocate_draw_image_set(&mut self) -> Result<vk::DescriptorSet> {
        self.descriptor_allocator.allocate(&self.layouts.draw_image)
    }

    /// Uploads `mesh` and registers it under `name`
    pub fn upload_mesh(
        &mut self,
        allocator: &impl ResourceAllocator,
        name: &str,
        mut mesh: Mesh,
    ) -> Result<Handle<Mesh>> {
        upload::upload_mesh(allocator, &mut self.deletion_queue, &mut mesh)?;
        Ok(self.meshes.insert(name, mesh))
    }

    /// Loads an OBJ file and registers it under `name`.
    ///
    /// `None` when the file is missing or undecodable. Upload failures are errors.
    pub fn load_mesh(
        &mut self,
        allocator: &impl ResourceAllocator,
        name: &str,
        path: &Path,
    ) -> Result<Option<Handle<Mesh>>> {
        let Some(mesh) = upload::load_mesh(allocator, &mut self.deletion_queue, path)? else {
            return Ok(None);
        };
        Ok(Some(self.meshes.insert(name, mesh)))
    }

    /// Same contract as [`load_mesh`](Self::load_mesh)
    pub fn load_texture(
        &mut self,
        allocator: &impl ResourceAllocator,
        name: &str,
        path: &Path,
    ) -> Result<Option<Handle<Texture>>> {
        let Some(texture) = upload::load_image(allocator, &mut self.deletion_queue, path)? else {
            return Ok(None);
        };
        Ok(Some(self.textures.insert(name, texture)))
    }

    /// The device must be idle
    pub fn destroy(mut self, dev: &RenderDevice) {
        self.descriptor_allocator.destroy_pool();
        dev.destroy(GpuResource::Buffer(self.scene_buffer));
        self.deletion_queue.flush_with(dev);
    }
}

/// Points the compute effects' storage image binding at `view`
pub fn write_draw_image_descriptor(device: &ash::Device, set: vk::DescriptorSet, view: vk::ImageView) {
    write_image_descriptor(
        device,
        set,
        0,
        vk::DescriptorType::STORAGE_IMAGE,
        view,
        vk::ImageLayout::GENERAL,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::resource_ctx::descriptor_allocator::PoolBudget;
    use gpu_descriptor::DescriptorTotalCount;

    #[test]
    fn scene_slots_respect_offset_alignment() {
        for alignment in [16u64, 64, 256] {
            let stride = pad_uniform_buffer_size(size_of::<GpuSceneData>() as u64, alignment);
            for frame in 0..FRAME_OVERLAP {
                let offset = scene_offset(frame, stride) as u64;
                assert_eq!(offset % alignment, 0);
                assert!(offset + size_of::<GpuSceneData>() as u64 <= stride * FRAME_OVERLAP as u64);
            }
        }
    }

    #[test]
    fn global_pool_fits_every_startup_set() {
        let mut budget = PoolBudget::new(GLOBAL_POOL_MAX_SETS, &GLOBAL_POOL_RATIOS).unwrap();
        let global = DescriptorTotalCount {
            uniform_buffer: 1,
            uniform_buffer_dynamic: 1,
            ..Default::default()
        };
        let object = DescriptorTotalCount {
            storage_buffer: 1,
            ..Default::default()
        };
        for _ in 0..FRAME_OVERLAP {
            budget.reserve(&global).unwrap();
            budget.reserve(&object).unwrap();
        }
        let texture = DescriptorTotalCount {
            sampled_image: 1,
            sampler: 1,
            ..Default::default()
        };
        budget.reserve(&texture).unwrap();
        let draw_image = DescriptorTotalCount {
            storage_image: 1,
            ..Default::default()
        };
        budget.reserve(&draw_image).unwrap();
        assert_eq!(budget.allocated_sets(), 2 * FRAME_OVERLAP as u32 + 2);
    }
}
