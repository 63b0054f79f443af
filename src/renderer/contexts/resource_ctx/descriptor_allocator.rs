use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_descriptor::DescriptorTotalCount;
use crate::renderer::contexts::resource_ctx::descriptor_count::{self, PoolSizes};
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::DescriptorLayout;

/// Descriptors of `ty` reserved per set the pool can hold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(ty: vk::DescriptorType, ratio: f32) -> Self {
        Self { ty, ratio }
    }
}

/// Host-side mirror of a fixed-size pool's capacity.
///
/// Drivers are allowed to keep handing out sets past `max_sets`, so the limit is enforced here.
#[derive(Debug, Clone)]
pub struct PoolBudget {
    max_sets: u32,
    capacity: DescriptorTotalCount,
    allocated_sets: u32,
    used: DescriptorTotalCount,
}

impl PoolBudget {
    pub fn new(max_sets: u32, ratios: &[PoolSizeRatio]) -> Result<Self> {
        if max_sets == 0 {
            return Err(eyre!("A descriptor pool needs room for at least one set"));
        }
        let mut capacity = DescriptorTotalCount::default();
        for ratio in ratios {
            let count = descriptor_count::count_mut(&mut capacity, ratio.ty)
                .ok_or_else(|| eyre!("Unsupported descriptor type {:?}", ratio.ty))?;
            *count += (ratio.ratio * max_sets as f32) as u32;
        }

        Ok(Self {
            max_sets,
            capacity,
            allocated_sets: 0,
            used: DescriptorTotalCount::default(),
        })
    }

    #[cfg(test)]
    pub fn allocated_sets(&self) -> u32 {
        self.allocated_sets
    }

    pub fn pool_sizes(&self) -> PoolSizes {
        descriptor_count::pool_sizes(&self.capacity)
    }

    /// Claims room for one set with `counts` descriptors, leaving the budget untouched on failure
    pub fn reserve(&mut self, counts: &DescriptorTotalCount) -> Result<()> {
        if self.allocated_sets >= self.max_sets {
            return Err(eyre!(
                "Descriptor pool exhausted: all {} sets are allocated",
                self.max_sets,
            ));
        }

        let mut used = self.used;
        for ty in descriptor_count::POOLED_DESCRIPTOR_TYPES {
            let requested = descriptor_count::count(counts, ty);
            if requested == 0 {
                continue;
            }
            let available = descriptor_count::count(&self.capacity, ty);
            let slot = descriptor_count::count_mut(&mut used, ty)
                .ok_or_else(|| eyre!("Unsupported descriptor type {:?}", ty))?;
            if *slot + requested > available {
                return Err(eyre!(
                    "Descriptor pool exhausted: {:?} needs {} more but only {} of {} remain",
                    ty,
                    requested,
                    available - *slot,
                    available,
                ));
            }
            *slot += requested;
        }

        self.used = used;
        self.allocated_sets += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.allocated_sets = 0;
        self.used = DescriptorTotalCount::default();
    }
}

/// A single fixed-capacity descriptor pool. It never grows; running out is an error.
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
    budget: PoolBudget,
    device: Arc<ash::Device>,
}

impl DescriptorAllocator {
    pub fn init_pool(
        device: Arc<ash::Device>,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> Result<Self> {
        let budget = PoolBudget::new(max_sets, ratios)?;
        let pool_sizes = budget.pool_sizes();

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes)
            .flags(flags);

        let pool = unsafe {
            device.create_descriptor_pool(&pool_info, None)?
        };
        log::debug!("Created descriptor pool for {} sets ({} types)", max_sets, pool_sizes.len());

        Ok(Self {
            pool,
            budget,
            device,
        })
    }

    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    pub fn allocate(&mut self, layout: &DescriptorLayout) -> Result<vk::DescriptorSet> {
        self.budget.reserve(&layout.counts)?;

        let set_layouts = [layout.handle];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&set_layouts);

        let sets = unsafe {
            self.device.allocate_descriptor_sets(&alloc_info)
        }
        .map_err(|err| eyre!("Failed to allocate descriptor set: {}", err))?;

        sets.into_iter()
            .next()
            .ok_or_else(|| eyre!("Driver returned no descriptor set"))
    }

    /// Returns every set to the pool. Previously allocated sets must no longer be used.
    pub fn clear_descriptors(&mut self) -> Result<()> {
        unsafe {
            self.device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        self.budget.reset();
        Ok(())
    }

    pub fn destroy_pool(self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

pub fn write_buffer_descriptor(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    buffer: vk::Buffer,
    range: u64,
) {
    let buffer_info = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
        .buffer_info(&buffer_info);

    unsafe {
        device.update_descriptor_sets(&[write], &[]);
    }
}

pub fn write_image_descriptor(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let image_info = [vk::DescriptorImageInfo::default()
        .image_view(view)
        .image_layout(layout)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
        .image_info(&image_info);

    unsafe {
        device.update_descriptor_sets(&[write], &[]);
    }
}

pub fn write_sampler_descriptor(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    sampler: vk::Sampler,
) {
    let image_info = [vk::DescriptorImageInfo::default().sampler(sampler)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::SAMPLER)
        .image_info(&image_info);

    unsafe {
        device.update_descriptor_sets(&[write], &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_uniform_buffer() -> DescriptorTotalCount {
        DescriptorTotalCount {
            uniform_buffer: 1,
            ..Default::default()
        }
    }

    #[test]
    fn allocation_past_max_sets_fails() {
        for max_sets in 1..8 {
            let ratios = [PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 4.0)];
            let mut budget = PoolBudget::new(max_sets, &ratios).unwrap();
            for _ in 0..max_sets {
                budget.reserve(&one_uniform_buffer()).unwrap();
            }
            assert!(budget.reserve(&one_uniform_buffer()).is_err());
            assert_eq!(budget.allocated_sets(), max_sets);
        }
    }

    #[test]
    fn per_type_capacity_is_enforced() {
        let ratios = [PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 0.5)];
        let mut budget = PoolBudget::new(4, &ratios).unwrap();
        let storage = DescriptorTotalCount {
            storage_buffer: 1,
            ..Default::default()
        };
        budget.reserve(&storage).unwrap();
        budget.reserve(&storage).unwrap();
        assert!(budget.reserve(&storage).is_err());
        // A type the pool was never sized for is exhausted immediately
        assert!(budget.reserve(&one_uniform_buffer()).is_err());
    }

    #[test]
    fn reset_reclaims_capacity() {
        let ratios = [PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0)];
        let mut budget = PoolBudget::new(1, &ratios).unwrap();
        budget.reserve(&one_uniform_buffer()).unwrap();
        assert!(budget.reserve(&one_uniform_buffer()).is_err());
        budget.reset();
        assert!(budget.reserve(&one_uniform_buffer()).is_ok());
    }

    #[test]
    fn pool_sizes_scale_with_max_sets() {
        let ratios = [
            PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 2.0),
            PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 0.5),
        ];
        let budget = PoolBudget::new(10, &ratios).unwrap();
        let sizes = budget.pool_sizes();
        assert_eq!(sizes.len(), 2);
        assert!(sizes.iter().any(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER && s.descriptor_count == 20));
        assert!(sizes.iter().any(|s| s.ty == vk::DescriptorType::SAMPLER && s.descriptor_count == 5));
    }

    #[test]
    fn zero_sets_is_rejected() {
        assert!(PoolBudget::new(0, &[]).is_err());
    }
}
