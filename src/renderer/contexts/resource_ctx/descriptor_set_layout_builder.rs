use color_eyre::Result;
use color_eyre::eyre::eyre;
use ash::vk;
use gpu_descriptor::DescriptorTotalCount;
use crate::renderer::contexts::resource_ctx::descriptor_count;

/// A created set layout together with how many descriptors of each type one set consumes
#[derive(Debug, Clone, Copy)]
pub struct DescriptorLayout {
    pub handle: vk::DescriptorSetLayout,
    pub counts: DescriptorTotalCount,
}

/// Accumulates bindings; `build` snapshots them, so the builder can be reused afterwards
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stages);

        self.bindings.push(binding);
        self
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Duplicate binding numbers and types no pool can hold are rejected
    pub fn descriptor_counts(&self) -> Result<DescriptorTotalCount> {
        let mut counts = DescriptorTotalCount::default();
        for (i, binding) in self.bindings.iter().enumerate() {
            if self.bindings[..i].iter().any(|b| b.binding == binding.binding) {
                return Err(eyre!("Binding {} declared twice", binding.binding));
            }
            let count = descriptor_count::count_mut(&mut counts, binding.descriptor_type)
                .ok_or_else(|| eyre!("Unsupported descriptor type {:?}", binding.descriptor_type))?;
            *count += binding.descriptor_count;
        }
        Ok(counts)
    }

    pub fn build(&self, device: &ash::Device) -> Result<DescriptorLayout> {
        let counts = self.descriptor_counts()?;

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings)
            .flags(vk::DescriptorSetLayoutCreateFlags::empty());

        let handle = unsafe {
            device.create_descriptor_set_layout(&layout_info, None)?
        };
        Ok(DescriptorLayout { handle, counts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
            .add_binding(
                1,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            );
        let counts = builder.descriptor_counts().unwrap();
        assert_eq!(counts.uniform_buffer, 1);
        assert_eq!(counts.uniform_buffer_dynamic, 1);
        assert_eq!(counts.storage_buffer, 0);
        assert_eq!(builder.bindings()[1].descriptor_count, 1);
    }

    #[test]
    fn duplicate_bindings_are_rejected() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT)
            .add_binding(0, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT);
        assert!(builder.descriptor_counts().is_err());
    }

    #[test]
    fn clear_allows_reuse() {
        let mut builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE);
        builder.clear();
        assert!(builder.bindings().is_empty());

        let builder = builder
            .add_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX);
        let counts = builder.descriptor_counts().unwrap();
        assert_eq!(counts.storage_image, 0);
        assert_eq!(counts.storage_buffer, 1);
    }
}
