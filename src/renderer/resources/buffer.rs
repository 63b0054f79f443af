use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use color_eyre::Result;
use color_eyre::eyre::eyre;

/// A device buffer together with the memory block backing it.
///
/// Plain data: destruction goes through a deletion queue, never `Drop`.
#[derive(Debug)]
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub location: MemoryLocation,

    pub(crate) allocation: Option<Allocation>,
}

impl AllocatedBuffer {
    pub fn new(
        buffer: vk::Buffer,
        size: u64,
        location: MemoryLocation,
        allocation: Option<Allocation>,
    ) -> Self {
        Self {
            buffer,
            size,
            location,
            allocation,
        }
    }

    /// GPU-only memory is never mapped
    pub fn is_host_visible(&self) -> bool {
        self.location != MemoryLocation::GpuOnly
    }

    /// Allocations may be larger than requested, so writes are bounded by `size` instead
    pub fn check_write_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| eyre!("Write range overflows"))?;
        if end as u64 > self.size {
            return Err(eyre!(
                "Write of {} bytes at offset {} exceeds buffer {:?} of {} bytes",
                len,
                offset,
                self.buffer,
                self.size,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_buffer(size: u64) -> AllocatedBuffer {
        AllocatedBuffer::new(vk::Buffer::null(), size, MemoryLocation::CpuToGpu, None)
    }

    #[test]
    fn writes_must_stay_inside_the_requested_size() {
        let buffer = host_buffer(64);
        assert!(buffer.check_write_range(0, 64).is_ok());
        assert!(buffer.check_write_range(60, 4).is_ok());
        assert!(buffer.check_write_range(60, 8).is_err());
        assert!(buffer.check_write_range(usize::MAX, 1).is_err());
    }

    #[test]
    fn gpu_only_buffers_are_not_host_visible() {
        let buffer = AllocatedBuffer::new(vk::Buffer::null(), 16, MemoryLocation::GpuOnly, None);
        assert!(!buffer.is_host_visible());
        assert!(host_buffer(16).is_host_visible());
    }
}
