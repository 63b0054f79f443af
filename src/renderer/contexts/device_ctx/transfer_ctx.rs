use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, Result};

/// How long an upload may take before it is treated as a device hang
const UPLOAD_FENCE_TIMEOUT_NS: u64 = 9_999_999_999;

/// The steps of one blocking upload
trait UploadQueue {
    fn reset_pool(&self) -> Result<()>;
    fn begin(&self) -> Result<vk::CommandBuffer>;
    fn end(&self, cmd: vk::CommandBuffer) -> Result<()>;
    fn submit_and_wait(&self, cmd: vk::CommandBuffer) -> Result<()>;
}

/// The pool is reset first, so a submission that failed halfway never leaves
/// the command buffer recording or pending for the next upload.
fn submit_upload(
    queue: &impl UploadQueue,
    record: impl FnOnce(vk::CommandBuffer) -> Result<()>,
) -> Result<()> {
    queue.reset_pool()?;
    let cmd = queue.begin()?;
    record(cmd)?;
    queue.end(cmd)?;
    queue.submit_and_wait(cmd)
}

/// Dedicated pool, command buffer and fence for one-shot uploads on the graphics queue
pub struct TransferContext {
    upload_fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,

    queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(
        queue: vk::Queue,
        queue_family_index: u32,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let upload_fence_info = vk::FenceCreateInfo::default();
        let upload_fence =
            unsafe { device.create_fence(&upload_fence_info, None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe {
            device.allocate_command_buffers(&command_buffer_info)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| eyre!("No upload command buffer allocated"))?;

        Ok(Self {
            upload_fence,
            command_pool,
            command_buffer,
            queue,
            device,
        })
    }

    /// Records `func` into a one-shot command buffer, submits it and blocks until the GPU is done
    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        submit_upload(self, |cmd| func(cmd, &self.device))
    }

    /// The device must be idle
    pub fn destroy(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_fence(self.upload_fence, None);
        }
        self.command_pool = vk::CommandPool::null();
        self.upload_fence = vk::Fence::null();
    }
}

impl UploadQueue for TransferContext {
    fn reset_pool(&self) -> Result<()> {
        unsafe {
            self.device.reset_command_pool(
                self.command_pool,
                vk::CommandPoolResetFlags::empty(),
            )?;
        }
        Ok(())
    }

    fn begin(&self) -> Result<vk::CommandBuffer> {
        // This command buffer will be used exactly once before resetting
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(self.command_buffer, &cmd_begin_info)?;
        }
        Ok(self.command_buffer)
    }

    fn end(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.device.end_command_buffer(cmd)?;
        }
        Ok(())
    }

    fn submit_and_wait(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let cmd_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd)];
        let submit = vk::SubmitInfo2::default()
            .command_buffer_infos(&cmd_infos);
        unsafe {
            self.device.queue_submit2(
                self.queue,
                &[submit],
                self.upload_fence,
            )?;
            // `upload_fence` will now block until the commands finish execution
            self.device.wait_for_fences(&[self.upload_fence], true, UPLOAD_FENCE_TIMEOUT_NS)?;
            self.device.reset_fences(&[self.upload_fence])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingQueue {
        calls: RefCell<Vec<&'static str>>,
        fail_next_submit: Cell<bool>,
    }

    impl UploadQueue for RecordingQueue {
        fn reset_pool(&self) -> Result<()> {
            self.calls.borrow_mut().push("reset");
            Ok(())
        }

        fn begin(&self) -> Result<vk::CommandBuffer> {
            self.calls.borrow_mut().push("begin");
            Ok(vk::CommandBuffer::null())
        }

        fn end(&self, _cmd: vk::CommandBuffer) -> Result<()> {
            self.calls.borrow_mut().push("end");
            Ok(())
        }

        fn submit_and_wait(&self, _cmd: vk::CommandBuffer) -> Result<()> {
            self.calls.borrow_mut().push("submit");
            if self.fail_next_submit.replace(false) {
                return Err(eyre!("Simulated queue submission failure"));
            }
            Ok(())
        }
    }

    #[test]
    fn every_upload_starts_from_a_reset_pool() {
        let queue = RecordingQueue::default();
        queue.fail_next_submit.set(true);

        assert!(submit_upload(&queue, |_| Ok(())).is_err());
        submit_upload(&queue, |_| Ok(())).unwrap();

        assert_eq!(
            *queue.calls.borrow(),
            vec!["reset", "begin", "end", "submit", "reset", "begin", "end", "submit"],
        );
    }

    #[test]
    fn failed_recording_is_not_submitted() {
        let queue = RecordingQueue::default();

        let result = submit_upload(&queue, |_| Err(eyre!("bad copy")));
        assert!(result.is_err());
        assert_eq!(*queue.calls.borrow(), vec!["reset", "begin"]);

        submit_upload(&queue, |_| Ok(())).unwrap();
        assert_eq!(queue.calls.borrow()[2], "reset");
    }
}
