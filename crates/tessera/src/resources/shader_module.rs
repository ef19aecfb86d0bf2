use std::{ffi::CStr, io::Cursor, path::Path, sync::Arc};

use ash::vk;

use super::DeviceResource;
use crate::{context::Device, error::ShaderError, flags::ShaderStage};

///Single SPIR-V shader module. Compilation happens outside of tessera, the module only wraps the bytecode.
pub struct ShaderModule {
    pub device: Arc<Device>,
    pub inner: vk::ShaderModule,
}

impl ShaderModule {
    pub fn new(device: &Arc<Device>, code: &[u32]) -> Result<Self, ShaderError> {
        if code.is_empty() {
            return Err(ShaderError::EmptyCode);
        }
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let inner = unsafe { device.inner.create_shader_module(&create_info, None)? };

        Ok(ShaderModule {
            device: device.clone(),
            inner,
        })
    }

    ///Creates the module from SPIR-V bytes. Fails if the length of `bytes` is not a multiple of four. Byte swapped
    /// code is swapped back.
    pub fn from_bytes(device: &Arc<Device>, bytes: &[u8]) -> Result<Self, ShaderError> {
        let code = ash::util::read_spv(&mut Cursor::new(bytes))?;
        Self::new(device, &code)
    }

    ///Reads file at `path`, checks that it is a spirv file and, if so, tries to create the shader module from it.
    pub fn from_file(device: &Arc<Device>, path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let mut file = std::fs::File::open(path)?;
        let code = ash::util::read_spv(&mut file)?;
        Self::new(device, &code)
    }

    ///Stage description that uses this module as `stage`, starting at `entry`.
    pub fn as_stage<'a>(&'a self, stage: ShaderStage, entry: &'a CStr) -> super::ShaderStageDesc<'a> {
        super::ShaderStageDesc {
            module: self,
            stage,
            entry,
        }
    }
}

impl DeviceResource for ShaderModule {
    type Raw = vk::ShaderModule;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ShaderModule: Send, Sync);
    }

    #[test]
    fn misaligned_spirv_is_rejected() {
        //read_spv is what from_bytes relies on, this runs without a device
        let bytes = [0x03u8, 0x02, 0x23];
        assert!(ash::util::read_spv(&mut Cursor::new(&bytes[..])).is_err());
    }
}
