use ash::vk;
use const_cstr::const_cstr;

const_cstr! {
    UNKNOWNID = "unknown id";
    NOMSG = "no message";
}

///The external callback print function for debugging
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    #[allow(unused)] message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut core::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        #[cfg(feature = "logging")]
        log::error!("TesseraDebugMsg: Got Msg, but no data!");
        return vk::FALSE;
    }

    //Safety: checked for null above, the layer keeps the data alive for the duration of the call.
    let data = unsafe { &*p_callback_data };

    let idname = if !data.p_message_id_name.is_null() {
        unsafe { std::ffi::CStr::from_ptr(data.p_message_id_name) }
    } else {
        UNKNOWNID.as_cstr()
    };
    let msg = if !data.p_message.is_null() {
        unsafe { std::ffi::CStr::from_ptr(data.p_message) }
    } else {
        NOMSG.as_cstr()
    };

    #[cfg(feature = "logging")]
    {
        let id = data.message_id_number;
        if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            log::error!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            log::warn!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            log::info!("[{}: {:?}]: {:?}", id, idname, msg);
        } else {
            log::trace!("[{}: {:?}]: {:?}", id, idname, msg);
        }
    }

    #[cfg(not(feature = "logging"))]
    {
        println!(
            "TesseraDebugMsg: Level: {:?}, Type: {:?}\nId[{:?}]: {:?}\nMsg: {:?}",
            message_severity, message_types, data.message_id_number, idname, msg
        );
    }

    vk::FALSE
}

///Debug messenger that routes validation layer messages into [vulkan_debug_callback]. Created
/// by the instance builder when validation is enabled.
pub struct Debugger {
    pub debug_instance: ash::ext::debug_utils::Instance,
    pub debug_messenger: vk::DebugUtilsMessengerEXT,
}

impl Debugger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self, vk::Result> {
        let debug_instance = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let debug_messenger =
            unsafe { debug_instance.create_debug_utils_messenger(&create_info, None)? };

        Ok(Debugger {
            debug_instance,
            debug_messenger,
        })
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        unsafe {
            self.debug_instance
                .destroy_debug_utils_messenger(self.debug_messenger, None)
        };
    }
}
