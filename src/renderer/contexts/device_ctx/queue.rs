use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl QueueFamily {
    pub fn new(
        index: u32,
        properties: vk::QueueFamilyProperties,
    ) -> Self {
        Self {
            index,
            properties,
        }
    }

    pub fn supports_graphics(&self) -> bool {
        self.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    }

    /// Compute background effects run on the graphics queue
    pub fn supports_compute(&self) -> bool {
        self.properties.queue_flags.contains(vk::QueueFlags::COMPUTE)
    }
}

/// Index of the first family that can do graphics and compute and pass `presents`
pub fn find_graphics_family(
    families: &[vk::QueueFamilyProperties],
    presents: impl Fn(u32) -> bool,
) -> Option<QueueFamily> {
    families
        .iter()
        .enumerate()
        .map(|(i, props)| QueueFamily::new(i as u32, *props))
        .find(|family| {
            family.supports_graphics() && family.supports_compute() && presents(family.index)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_presentable_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        let found = find_graphics_family(&families, |_| true).unwrap();
        assert_eq!(found.index, 1);

        let found = find_graphics_family(&families, |i| i == 2).unwrap();
        assert_eq!(found.index, 2);
    }

    #[test]
    fn no_family_without_graphics() {
        let families = [family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        assert!(find_graphics_family(&families, |_| true).is_none());
    }
}
