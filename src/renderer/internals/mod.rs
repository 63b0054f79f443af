/// "Internals" refers to low-level Vulkan plumbing used by the contexts.
/// They should not be used directly by the application.

pub mod barrier;
pub mod swapchain;
