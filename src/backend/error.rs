// Typed failures for Vulkan setup
//
// Every one of these is fatal: setup has no retry or partial-failure path.
// They exist as a typed enum (rather than ad-hoc anyhow strings) so the
// negotiation logic can be unit tested against specific failure cases.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no Vulkan device with both a graphics and a presentation queue family")]
    NoSuitableDevice,

    #[error("surface reports no formats or no present modes")]
    InsufficientSurfaceSupport,

    #[error("surface did not report a fixed extent; window-manager-driven sizing is unsupported")]
    UnresolvedExtent,

    #[error("instance layer {0} is not available")]
    MissingLayer(&'static str),

    #[error("optional capability {0} was requested but is not supported")]
    CapabilityUnavailable(&'static str),

    #[error(transparent)]
    Vk(#[from] vk::Result),
}
