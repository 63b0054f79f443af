use ash::vk;
use gpu_descriptor::DescriptorTotalCount;
use smallvec::SmallVec;

/// Every descriptor type a pool can be sized for
pub const POOLED_DESCRIPTOR_TYPES: [vk::DescriptorType; 12] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
    vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
];

pub type PoolSizes = SmallVec<[vk::DescriptorPoolSize; 12]>;

/// The counter in `total` tracking descriptors of type `ty`, `None` for inline uniform blocks
pub fn count_mut(total: &mut DescriptorTotalCount, ty: vk::DescriptorType) -> Option<&mut u32> {
    let count = match ty {
        vk::DescriptorType::SAMPLER => &mut total.sampler,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER => &mut total.combined_image_sampler,
        vk::DescriptorType::SAMPLED_IMAGE => &mut total.sampled_image,
        vk::DescriptorType::STORAGE_IMAGE => &mut total.storage_image,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER => &mut total.uniform_texel_buffer,
        vk::DescriptorType::STORAGE_TEXEL_BUFFER => &mut total.storage_texel_buffer,
        vk::DescriptorType::UNIFORM_BUFFER => &mut total.uniform_buffer,
        vk::DescriptorType::STORAGE_BUFFER => &mut total.storage_buffer,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => &mut total.uniform_buffer_dynamic,
        vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => &mut total.storage_buffer_dynamic,
        vk::DescriptorType::INPUT_ATTACHMENT => &mut total.input_attachment,
        vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => &mut total.acceleration_structure,
        _ => return None,
    };
    Some(count)
}

pub fn count(total: &DescriptorTotalCount, ty: vk::DescriptorType) -> u32 {
    let mut total = *total;
    count_mut(&mut total, ty).map_or(0, |count| *count)
}

/// Non-zero entries of `total` as pool sizes
pub fn pool_sizes(total: &DescriptorTotalCount) -> PoolSizes {
    POOLED_DESCRIPTOR_TYPES
        .iter()
        .map(|&ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: count(total, ty),
        })
        .filter(|size| size.descriptor_count != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_nonzero_types_become_pool_sizes() {
        let mut total = DescriptorTotalCount::default();
        *count_mut(&mut total, vk::DescriptorType::STORAGE_BUFFER).unwrap() = 4;
        *count_mut(&mut total, vk::DescriptorType::SAMPLER).unwrap() = 1;

        let sizes = pool_sizes(&total);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::SAMPLER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 4);
    }

    #[test]
    fn inline_uniform_blocks_have_no_counter() {
        let mut total = DescriptorTotalCount::default();
        assert!(count_mut(&mut total, vk::DescriptorType::INLINE_UNIFORM_BLOCK).is_none());
        assert_eq!(count(&total, vk::DescriptorType::INLINE_UNIFORM_BLOCK), 0);
    }
}
