use std::path::Path;
use ash::vk;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::deletion_queue::{DeletionQueue, GpuResource};
use crate::renderer::resources::allocator::{ResourceAllocator, TransferCommand};
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::resources::image::{AllocatedImage, ImageCreateInfo};
use crate::renderer::resources::mesh::{Mesh, MeshBuffer};
use crate::renderer::resources::texture::{DecodedImage, Texture};

/// Host-visible copy source holding `data`
fn create_staging_buffer(
    allocator: &impl ResourceAllocator,
    data: &[u8],
    name: &str,
) -> Result<AllocatedBuffer> {
    let mut staging = allocator.create_buffer(
        data.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        name,
    )?;
    if let Err(err) = allocator.write_buffer(&mut staging, 0, data) {
        allocator.destroy(GpuResource::Buffer(staging));
        return Err(err);
    }
    Ok(staging)
}

/// Copies the mesh's vertices into a device-local vertex buffer and records it on `mesh`.
///
/// The staging buffer is gone when this returns; the vertex buffer is released by `deletion_queue`.
pub fn upload_mesh(
    allocator: &impl ResourceAllocator,
    deletion_queue: &mut DeletionQueue,
    mesh: &mut Mesh,
) -> Result<()> {
    let data: &[u8] = bytemuck::cast_slice(&mesh.vertices);
    let size = data.len() as u64;
    let staging = create_staging_buffer(allocator, data, "Mesh staging buffer")?;

    let vertex_buffer = match allocator.create_buffer(
        size,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        "Mesh vertex buffer",
    ) {
        Ok(buffer) => buffer,
        Err(err) => {
            allocator.destroy(GpuResource::Buffer(staging));
            return Err(err);
        }
    };

    let result = allocator.submit_transfer(&[TransferCommand::CopyBuffer {
        src: staging.buffer,
        dst: vertex_buffer.buffer,
        size,
    }]);
    allocator.destroy(GpuResource::Buffer(staging));
    if let Err(err) = result {
        allocator.destroy(GpuResource::Buffer(vertex_buffer));
        return Err(err);
    }

    mesh.vertex_buffer = Some(MeshBuffer {
        buffer: vertex_buffer.buffer,
        size,
    });
    deletion_queue.push(GpuResource::Buffer(vertex_buffer));
    Ok(())
}

/// Undefined -> transfer dst, copy, transfer dst -> shader read
fn image_upload_commands(
    image: &mut AllocatedImage,
    staging: vk::Buffer,
) -> Result<Vec<TransferCommand>> {
    let mut commands = Vec::with_capacity(3);
    let to_transfer = image.transition_from(
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    commands.extend(to_transfer.map(TransferCommand::Transition));
    commands.push(TransferCommand::CopyBufferToImage {
        src: staging,
        dst: image.image,
        aspect: image.aspect,
        extent: image.extent,
    });
    let to_shader_read = image.transition_from(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;
    commands.extend(to_shader_read.map(TransferCommand::Transition));
    Ok(commands)
}

/// Stages RGBA8 pixels into a sampled image left in `SHADER_READ_ONLY_OPTIMAL`
pub fn upload_image(
    allocator: &impl ResourceAllocator,
    deletion_queue: &mut DeletionQueue,
    decoded: &DecodedImage,
    name: &str,
) -> Result<Texture> {
    let staging = create_staging_buffer(allocator, &decoded.pixels, "Image staging buffer")?;

    let mut image = match allocator.create_image(&ImageCreateInfo::texture(decoded.extent(), name)) {
        Ok(image) => image,
        Err(err) => {
            allocator.destroy(GpuResource::Buffer(staging));
            return Err(err);
        }
    };

    let result = image_upload_commands(&mut image, staging.buffer)
        .and_then(|commands| allocator.submit_transfer(&commands));

    allocator.destroy(GpuResource::Buffer(staging));
    if let Err(err) = result {
        allocator.destroy(GpuResource::Image(image));
        return Err(err);
    }

    let texture = Texture {
        image: image.image,
        view: image.view,
        format: image.format,
        extent: image.extent,
    };
    deletion_queue.push(GpuResource::Image(image));
    Ok(texture)
}

/// Decodes and uploads an OBJ file.
///
/// A missing or undecodable file is logged and yields `None`. Device-side failures are returned.
pub fn load_mesh(
    allocator: &impl ResourceAllocator,
    deletion_queue: &mut DeletionQueue,
    path: &Path,
) -> Result<Option<Mesh>> {
    let mut mesh = match Mesh::load_obj(path) {
        Ok(mesh) => mesh,
        Err(err) => {
            log::warn!("Failed to load mesh file {:?}: {}", path, err);
            return Ok(None);
        }
    };
    upload_mesh(allocator, deletion_queue, &mut mesh)?;
    log::info!("Mesh loaded successfully {:?}", path);
    Ok(Some(mesh))
}

/// Decodes and uploads an image file. Same failure split as [`load_mesh`].
pub fn load_image(
    allocator: &impl ResourceAllocator,
    deletion_queue: &mut DeletionQueue,
    path: &Path,
) -> Result<Option<Texture>> {
    let decoded = match DecodedImage::open(path) {
        Ok(decoded) => decoded,
        Err(err) => {
            log::warn!("Failed to load texture file {:?}: {}", path, err);
            return Ok(None);
        }
    };
    let name = path.to_string_lossy();
    let texture = upload_image(allocator, deletion_queue, &decoded, &name)?;
    log::info!("Texture loaded successfully {:?}", path);
    Ok(Some(texture))
}
