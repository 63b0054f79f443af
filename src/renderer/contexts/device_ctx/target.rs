use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, Surface};
use crate::renderer::internals::swapchain::Swapchain;

/// Presentation target of the renderer, encapsulating the window, surface, and swapchain
pub struct RenderTarget {
    pub window: Arc<Window>,

    pub surface: Surface,
    pub surface_format: vk::SurfaceFormatKHR,
    pub surface_present_mode: vk::PresentModeKHR,

    pub swapchain: Swapchain,
}

impl RenderTarget {
    pub fn new(
        window: Arc<Window>,
        surface: Surface,
        vsync: bool,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let surface_formats = unsafe {
            surface.loader
                .get_physical_device_surface_formats(dev.physical, surface.handle)?
        };

        let surface_present_modes = unsafe {
            surface.loader
                .get_physical_device_surface_present_modes(dev.physical, surface.handle)?
        };

        let surface_format = surface_formats
            .iter()
            .find(|format| {
                format.format == vk::Format::B8G8R8A8_UNORM
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| surface_formats.first())
            .copied()
            .ok_or_eyre("No suitable surface format found")?;

        let surface_present_mode = choose_present_mode(&surface_present_modes, vsync);

        let swapchain = Swapchain::new(
            &surface,
            surface_format,
            surface_present_mode,
            window_extent(&window),
            vk::SwapchainKHR::null(),
            ins,
            dev,
        )?;

        Ok(Self {
            window,
            surface,
            surface_format,
            surface_present_mode,
            swapchain,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.image_extent
    }

    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Rebuilds the swapchain at the window's current size. Waits for the device to go idle.
    pub fn resize(
        &mut self,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<()> {
        dev.wait_idle()?;

        let swapchain = Swapchain::new(
            &self.surface,
            self.surface_format,
            self.surface_present_mode,
            window_extent(&self.window),
            self.swapchain.swapchain,
            ins,
            dev,
        )?;
        let mut old = std::mem::replace(&mut self.swapchain, swapchain);
        old.destroy(&dev.logical);
        log::info!(
            "Swapchain resized to {}x{}",
            self.swapchain.image_extent.width,
            self.swapchain.image_extent.height,
        );

        Ok(())
    }

    /// The device must be idle
    pub fn destroy(&mut self, dev: &RenderDevice) {
        self.swapchain.destroy(&dev.logical);
        self.surface.destroy();
    }
}

fn window_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

/// FIFO is always available and is the only vsync mode
pub fn choose_present_mode(supported: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    supported
        .iter()
        .copied()
        .find(|mode| *mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_forces_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO], false), vk::PresentModeKHR::FIFO);
    }
}
