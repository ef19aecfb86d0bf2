use std::{
    ffi::{CStr, CString},
    sync::{Mutex, MutexGuard, PoisonError},
};

use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;

use super::debugger::Debugger;
use crate::error::InstanceError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

///Instance configuration as well as the source entry point. Usually this struct is created via [Instance::load].
pub struct InstanceBuilder {
    pub entry: ash::Entry,
    pub application_name: CString,
    pub application_version: u32,
    ///If set, the validation layer and a debug messenger are enabled, if available.
    pub request_debug: bool,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
    available_layers: Vec<vk::LayerProperties>,
    available_extensions: Vec<vk::ExtensionProperties>,
}

impl InstanceBuilder {
    ///Sets name and version of the application. Reported to the driver.
    pub fn with_application(
        mut self,
        name: &str,
        major: u32,
        minor: u32,
        patch: u32,
    ) -> Result<Self, InstanceError> {
        self.application_name =
            CString::new(name).map_err(|_| InstanceError::InvalidApplicationName)?;
        self.application_version = vk::make_api_version(0, major, minor, patch);
        Ok(self)
    }

    ///Builds the instance from the current information and selects the physical device every [Device](crate::context::Device) of this instance is created on.
    pub fn build(mut self) -> Result<Arc<Instance>, InstanceError> {
        let mut debug = false;
        if self.request_debug {
            if self.is_layer_available(VALIDATION_LAYER)
                && self.is_extension_available(ash::ext::debug_utils::NAME)
            {
                self = self.with_layer(VALIDATION_LAYER.to_owned())?;
                self = self.with_extension(ash::ext::debug_utils::NAME.to_owned())?;
                debug = true;
            } else {
                #[cfg(feature = "logging")]
                log::warn!("Debugging was requested, but the validation layer is not available");
            }
        }

        let InstanceBuilder {
            entry,
            application_name,
            application_version,
            request_debug: _,
            enabled_layers,
            enabled_extensions,
            available_layers: _,
            available_extensions: _,
        } = self;

        let app_desc = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(application_version)
            .engine_name(c"tessera")
            .api_version(vk::make_api_version(
                0,
                Instance::API_VERSION_MAJOR,
                Instance::API_VERSION_MINOR,
                Instance::API_VERSION_PATCH,
            ));

        //at this point, if we are logging, write out instance creation data
        #[cfg(feature = "logging")]
        {
            log::info!("Instance creation for {:?}:", application_name);
            log::info!("  Layers:");
            for l in &enabled_layers {
                log::info!("    {:?}", l);
            }
            log::info!("  Extensions:");
            for e in &enabled_extensions {
                log::info!("    {:?}", e);
            }
        }

        let extension_ptrs = enabled_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();
        let layer_ptrs = enabled_layers
            .iter()
            .map(|l| l.as_ptr())
            .collect::<Vec<_>>();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_desc)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debugger = if debug {
            match Debugger::new(&entry, &instance) {
                Ok(d) => Some(d),
                Err(e) => {
                    #[cfg(feature = "logging")]
                    log::error!("Failed to create debug messenger: {}", e);
                    let _ = e;
                    None
                }
            }
        } else {
            None
        };

        let physical_device = match unsafe { instance.enumerate_physical_devices() } {
            Ok(devices) => {
                let properties = devices
                    .iter()
                    .map(|pd| unsafe { instance.get_physical_device_properties(*pd) }.device_type)
                    .collect::<Vec<_>>();
                pick_physical_device(&properties).map(|idx| devices[idx])
            }
            Err(e) => {
                drop(debugger);
                unsafe { instance.destroy_instance(None) };
                return Err(e.into());
            }
        };

        let Some(physical_device) = physical_device else {
            drop(debugger);
            unsafe { instance.destroy_instance(None) };
            return Err(InstanceError::NoPhysicalDevice);
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        #[cfg(feature = "logging")]
        log::info!(
            "Selected physical device {:?} ({:?}) with {} queue families",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
            properties.device_type,
            queue_families.len()
        );

        Ok(Arc::new(Instance {
            occupation: Mutex::new(vec![0; queue_families.len()]),
            entry,
            inner: instance,
            physical_device,
            properties,
            memory_properties,
            queue_families,
            validation_enabled: debugger.is_some(),
            debugger,
        }))
    }

    pub fn is_layer_available(&self, name: &CStr) -> bool {
        self.available_layers
            .iter()
            .any(|l| l.layer_name_as_c_str().map(|n| n == name).unwrap_or(false))
    }

    ///Returns true if a instance-extension with the given name was found
    pub fn is_extension_available(&self, extension_name: &CStr) -> bool {
        self.available_extensions.iter().any(|e| {
            e.extension_name_as_c_str()
                .map(|n| n == extension_name)
                .unwrap_or(false)
        })
    }

    ///adds an extensions with the given name, if it was not added yet.
    pub fn with_extension(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_extension_available(&name) {
            return Err(InstanceError::MissingExtension(name));
        }

        if self.enabled_extensions.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable extension twice: {:?}", name);
            return Ok(self);
        }

        #[cfg(feature = "logging")]
        log::info!("Enabling instance-extension: {:?}", name);
        self.enabled_extensions.push(name);

        Ok(self)
    }

    ///adds an layer with the given name to the list of layers
    pub fn with_layer(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_layer_available(&name) {
            return Err(InstanceError::MissingLayer(name));
        }

        if self.enabled_layers.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable layer twice: {:?}", name);
            return Ok(self);
        }

        self.enabled_layers.push(name);

        Ok(self)
    }

    ///Enables all extensions that are needed for the surface behind `handle` to work.
    pub fn for_surface(mut self, handle: &dyn HasDisplayHandle) -> Result<Self, InstanceError> {
        let display = handle
            .display_handle()
            .map_err(|e| InstanceError::WindowHandle(e.to_string()))?;
        let required_extensions = ash_window::enumerate_required_extensions(display.as_raw())?;
        for r in required_extensions {
            let st = unsafe { CStr::from_ptr(*r).to_owned() };
            self = self.with_extension(st)?;
        }

        Ok(self)
    }

    ///Enables the extensions a [headless surface](crate::surface::Surface::headless) needs. Those surfaces have
    /// no window and are mostly useful for testing the swapchain.
    pub fn headless_surface(self) -> Result<Self, InstanceError> {
        self.with_extension(ash::khr::surface::NAME.to_owned())?
            .with_extension(ash::ext::headless_surface::NAME.to_owned())
    }

    ///Requests validation layers and a debug messenger that prints either via [println](println), or via the log crate if the `logging` feature is enabled.
    pub fn request_debug(mut self) -> Self {
        self.request_debug = true;
        self
    }
}

///Ranks a physical device type. Lower is better.
fn device_type_rank(ty: vk::PhysicalDeviceType) -> u8 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

///Picks the *best* physical device. Discrete GPUs are preferred over integrated ones, everything else comes last.
/// The first device wins on equal rank.
pub(crate) fn pick_physical_device(types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    types
        .iter()
        .enumerate()
        .min_by_key(|(idx, ty)| (device_type_rank(**ty), *idx))
        .map(|(idx, _)| idx)
}

///tessera instance. Wraps the entry point, the created instance and the selected physical device into one object.
///
/// Also tracks how many queues of each family are already handed out to devices.
///
/// # Safety
///
/// This struct is un-clonable for a reason. It implements [Drop] which takes care of destroying the vulkan instance, as well as the debug
/// messenger if it was loaded.
pub struct Instance {
    pub entry: ash::Entry,
    pub inner: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub validation_enabled: bool,
    occupation: Mutex<Vec<u32>>,
    debugger: Option<Debugger>,
}

impl Instance {
    ///The major version of Vulkan loaded.
    pub const API_VERSION_MAJOR: u32 = 1;
    ///The minor version of Vulkan loaded.
    pub const API_VERSION_MINOR: u32 = 2;
    ///The patch version of Vulkan loaded.
    pub const API_VERSION_PATCH: u32 = 0;

    ///Creates instance loaded by using [Entry::load](ash::Entry::load)
    pub fn load() -> Result<InstanceBuilder, InstanceError> {
        let entry = unsafe { ash::Entry::load()? };

        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };

        Ok(InstanceBuilder {
            entry,
            application_name: c"tessera application".to_owned(),
            application_version: vk::make_api_version(0, 0, 1, 0),
            request_debug: false,
            enabled_extensions: Vec::new(),
            enabled_layers: Vec::new(),
            available_layers,
            available_extensions,
        })
    }

    ///Number of queues per family that are currently in use by devices of this instance.
    pub fn queue_family_occupation(&self) -> Vec<u32> {
        self.occupation().clone()
    }

    pub(crate) fn occupation(&self) -> MutexGuard<'_, Vec<u32>> {
        self.occupation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    ///Returns the feature list of the selected physical device
    pub fn supported_features(&self) -> vk::PhysicalDeviceFeatures {
        unsafe { self.inner.get_physical_device_features(self.physical_device) }
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.inner
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }

    ///Returns true if the selected physical device supports the device extension `name`.
    pub fn is_device_extension_supported(&self, name: &CStr) -> Result<bool, vk::Result> {
        let supported = unsafe {
            self.inner
                .enumerate_device_extension_properties(self.physical_device)?
        };
        Ok(supported.iter().any(|ext| {
            ext.extension_name_as_c_str()
                .map(|n| n == name)
                .unwrap_or(false)
        }))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        //messenger has to go before the instance
        drop(self.debugger.take());
        unsafe {
            self.inner.destroy_instance(None);
        }
    }
}
