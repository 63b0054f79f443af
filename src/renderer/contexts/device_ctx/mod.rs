pub mod instance;
pub mod device;
pub mod queue;
pub mod target;
pub mod transfer_ctx;

use std::sync::Arc;
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, Surface};
use crate::renderer::contexts::device_ctx::target::RenderTarget;

/// Responsibilities:
/// - Manage the Vulkan instance, device, and queue
/// - Own the surface and swapchain
///
/// Field order is destruction order: target, device, instance.
pub struct RenderDeviceContext {
    pub target: RenderTarget,
    pub device: RenderDevice,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(
        window: Arc<winit::window::Window>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(&window, config.validation)?;
        let surface = Surface::new(&instance, &window)?;
        let device = match RenderDevice::new(&instance, &surface) {
            Ok(device) => device,
            Err(err) => {
                surface.destroy();
                return Err(err);
            }
        };
        let target = RenderTarget::new(window, surface, config.vsync, &instance, &device)?;

        Ok(Self {
            target,
            device,
            instance,
        })
    }

    pub fn resize(&mut self) -> Result<()> {
        self.target.resize(&self.instance, &self.device)
    }
}

impl Drop for RenderDeviceContext {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", err);
        }
        // Swapchain and surface before the device and instance drop
        self.target.destroy(&self.device);
    }
}
