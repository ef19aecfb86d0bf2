use std::sync::Arc;

use tessera::{
    context::{Device, Instance, QueueSpec},
    flags::QueueFlags,
};

///Device with one graphics and transfer capable queue, no surface.
pub fn headless_device() -> anyhow::Result<Arc<Device>> {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .init();
    let instance = Instance::load()?
        .with_application("tessera-test", 0, 1, 0)?
        .request_debug()
        .build()?;
    Ok(Device::new(
        &instance,
        &[QueueSpec::headless(QueueFlags::GRAPHICS | QueueFlags::TRANSFER)],
    )?)
}
