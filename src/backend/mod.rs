// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics

pub mod device;
pub mod error;
pub mod pipeline;
pub mod shader;
pub mod swapchain;

pub use device::VulkanDevice;
pub use error::BackendError;
pub use swapchain::Swapchain;
