// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Surface creation from the window handles
// - Physical device selection (prefer discrete GPU, require present support)
// - Logical device + queue creation

use anyhow::{Context, Result};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use winit::window::Window;

use super::error::BackendError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Debug-utils entry points, resolved once at startup.
///
/// Present only when validation was requested and the extension is supported;
/// requesting it against a driver without the extension is a typed
/// `CapabilityUnavailable` error rather than a crash at first use.
struct DebugMessenger {
    loader: ash::extensions::ext::DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Per-device capability snapshot gathered during enumeration.
///
/// A family index is recorded only when the corresponding capability was
/// confirmed against the live device and surface. Discarded once the final
/// device is chosen.
#[derive(Debug, Clone, Copy)]
pub struct DeviceCandidate {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
    pub discrete: bool,
}

impl DeviceCandidate {
    fn queue_families(&self) -> Option<(u32, u32)> {
        Some((self.graphics_family?, self.present_family?))
    }
}

/// Pick a device from the probed candidates.
///
/// Policy: among all suitable candidates (both queue families confirmed),
/// prefer any discrete GPU; if none is discrete, take the first suitable
/// candidate in enumeration order.
///
/// Returns the candidate's position plus its (graphics, present) families.
fn choose_candidate(candidates: &[DeviceCandidate]) -> Result<(usize, u32, u32), BackendError> {
    let mut suitable = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.queue_families().map(|(g, p)| (i, g, p)));

    let first = suitable.next().ok_or(BackendError::NoSuitableDevice)?;

    Ok(std::iter::once(first)
        .chain(suitable)
        .find(|&(i, _, _)| candidates[i].discrete)
        .unwrap_or(first))
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub graphics_family: u32,
    pub present_family: u32,

    // Debug utils (if validation enabled)
    debug: Option<DebugMessenger>,

    pub properties: vk::PhysicalDeviceProperties,
}

impl VulkanDevice {
    /// Create the instance, surface, and logical device for a window.
    ///
    /// `enable_validation` turns on the Khronos validation layer and routes
    /// its messages through `log`. It is an explicit argument (not a
    /// compile-time constant) so both paths stay reachable.
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let instance = Self::create_instance(&entry, window, app_name, enable_validation)?;

        let debug = if enable_validation {
            Some(Self::create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = ash::extensions::khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        let (physical_device, graphics_family, present_family) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let device = Self::create_logical_device(
            &instance,
            physical_device,
            graphics_family,
            present_family,
        )?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
            _entry: entry,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
            debug,
            properties,
        }))
    }

    fn create_instance(
        entry: &Entry,
        window: &Window,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        // Surface extensions for this platform, per the windowing library
        let mut extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .context("No Vulkan surface support for this display")?
            .to_vec();

        let layer_names = if enable_validation {
            Self::check_validation_support(entry)?;
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    /// Confirm the validation layer and debug-utils extension are installed
    /// before asking the driver for them.
    fn check_validation_support(entry: &Entry) -> Result<()> {
        let layers = entry
            .enumerate_instance_layer_properties()
            .context("Failed to enumerate instance layers")?;
        let found = layers
            .iter()
            .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER);
        if !found {
            return Err(BackendError::MissingLayer("VK_LAYER_KHRONOS_validation").into());
        }

        let extensions = entry
            .enumerate_instance_extension_properties(None)
            .context("Failed to enumerate instance extensions")?;
        let found = extensions.iter().any(|e| {
            (unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
                == ash::extensions::ext::DebugUtils::name()
        });
        if !found {
            return Err(BackendError::CapabilityUnavailable("VK_EXT_debug_utils").into());
        }

        Ok(())
    }

    fn create_debug_messenger(entry: &Entry, instance: &ash::Instance) -> Result<DebugMessenger> {
        let loader = ash::extensions::ext::DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok(DebugMessenger { loader, messenger })
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        let mut candidates = Vec::with_capacity(devices.len());
        for &device in &devices {
            candidates.push(Self::probe_device(instance, surface_loader, surface, device)?);
        }

        let (index, graphics_family, present_family) = choose_candidate(&candidates)?;
        Ok((devices[index], graphics_family, present_family))
    }

    /// Snapshot one device's queue-family capabilities against the surface.
    fn probe_device(
        instance: &ash::Instance,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<DeviceCandidate> {
        let props = unsafe { instance.get_physical_device_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        // First qualifying family wins in both scans
        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;
            if graphics_family.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics_family = Some(index);
            }
            if present_family.is_none() {
                let supported = unsafe {
                    surface_loader.get_physical_device_surface_support(device, index, surface)
                }?;
                if supported {
                    present_family = Some(index);
                }
            }
        }

        Ok(DeviceCandidate {
            graphics_family,
            present_family,
            discrete: props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        present_family: u32,
    ) -> Result<ash::Device> {
        let mut families = vec![graphics_family];
        if present_family != graphics_family {
            families.push(present_family);
        }

        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some(debug) = self.debug.take() {
                debug.loader.destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(graphics: Option<u32>, present: Option<u32>, discrete: bool) -> DeviceCandidate {
        DeviceCandidate {
            graphics_family: graphics,
            present_family: present,
            discrete,
        }
    }

    #[test]
    fn prefers_discrete_over_earlier_integrated() {
        let candidates = [
            candidate(Some(0), Some(0), false),
            candidate(Some(1), Some(2), true),
        ];
        let (index, graphics, present) = choose_candidate(&candidates).unwrap();
        assert_eq!(index, 1);
        assert_eq!((graphics, present), (1, 2));
    }

    #[test]
    fn prefers_discrete_regardless_of_order() {
        let candidates = [
            candidate(Some(0), Some(0), true),
            candidate(Some(0), Some(0), false),
        ];
        let (index, _, _) = choose_candidate(&candidates).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn falls_back_to_first_suitable_integrated() {
        let candidates = [
            candidate(Some(0), None, true),
            candidate(Some(0), Some(1), false),
            candidate(Some(0), Some(0), false),
        ];
        let (index, graphics, present) = choose_candidate(&candidates).unwrap();
        assert_eq!(index, 1);
        assert_eq!((graphics, present), (0, 1));
    }

    #[test]
    fn unsuitable_discrete_never_wins() {
        // The discrete device lacks a present family; the integrated one is complete
        let candidates = [
            candidate(Some(0), Some(0), false),
            candidate(Some(0), None, true),
        ];
        let (index, _, _) = choose_candidate(&candidates).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn empty_device_list_fails() {
        assert!(matches!(
            choose_candidate(&[]),
            Err(BackendError::NoSuitableDevice)
        ));
    }

    #[test]
    fn no_suitable_device_fails() {
        let candidates = [
            candidate(Some(0), None, true),
            candidate(None, Some(0), false),
        ];
        assert!(matches!(
            choose_candidate(&candidates),
            Err(BackendError::NoSuitableDevice)
        ));
    }
}
