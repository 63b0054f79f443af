use ash::vk;
use crate::renderer::resources::buffer::AllocatedBuffer;
use crate::renderer::resources::image::AllocatedImage;

/// Every kind of GPU object the renderer creates and later destroys
#[derive(Debug)]
pub enum GpuResource {
    Buffer(AllocatedBuffer),
    Image(AllocatedImage),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    ShaderModule(vk::ShaderModule),
}

impl GpuResource {
    #[cfg(test)]
    pub fn kind(&self) -> &'static str {
        match self {
            GpuResource::Buffer(_) => "buffer",
            GpuResource::Image(_) => "image",
            GpuResource::ImageView(_) => "image view",
            GpuResource::Sampler(_) => "sampler",
            GpuResource::Pipeline(_) => "pipeline",
            GpuResource::PipelineLayout(_) => "pipeline layout",
            GpuResource::DescriptorSetLayout(_) => "descriptor set layout",
            GpuResource::DescriptorPool(_) => "descriptor pool",
            GpuResource::CommandPool(_) => "command pool",
            GpuResource::Fence(_) => "fence",
            GpuResource::Semaphore(_) => "semaphore",
            GpuResource::ShaderModule(_) => "shader module",
        }
    }
}

/// Anything able to release GPU resources. Destruction failures are logged, never returned.
pub trait ResourceDestroyer {
    fn destroy(&self, resource: GpuResource);
}

/// Resources waiting to be destroyed, released in reverse order of registration.
///
/// Pushing a view after the image it was created from guarantees the view goes first.
pub struct DeletionQueue<R = GpuResource> {
    pending: Vec<R>,
}

impl<R> DeletionQueue<R> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn push(&mut self, resource: R) {
        self.pending.push(resource);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Hands every pending resource to `destroy`, newest first, leaving the queue empty
    pub fn flush(&mut self, mut destroy: impl FnMut(R)) {
        while let Some(resource) = self.pending.pop() {
            destroy(resource);
        }
    }
}

impl DeletionQueue<GpuResource> {
    pub fn flush_with(&mut self, destroyer: &impl ResourceDestroyer) {
        if !self.is_empty() {
            log::debug!("Flushing {} GPU resources", self.len());
        }
        self.flush(|resource| destroyer.destroy(resource));
    }
}

impl<R> Default for DeletionQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for DeletionQueue<R> {
    fn drop(&mut self) {
        if !self.is_empty() {
            log::warn!("Deletion queue dropped with {} resources never destroyed", self.len());
        }
    }
}
