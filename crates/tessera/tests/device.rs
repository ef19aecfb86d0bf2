//! Tests that need a Vulkan driver. Run with `cargo test -- --ignored` on a machine with a GPU (or lavapipe).

use std::sync::Arc;

use tessera::{
    CommandBufferError, DescriptorError, ResourceError, SubmitError,
    context::SubmitInfo,
    flags::{BufferUsage, DescriptorKind, FenceFlags, MemoryType, ShaderStages},
    resources::{
        Buffer, BufferBinding, BufferDesc, CommandPool, DescriptorBinding, DescriptorPool,
        DescriptorResources, DescriptorSetLayout, DescriptorWrite, RecordingState, SharingMode,
    },
    sync::Fence,
};

mod common;
use common::headless_device;

#[test]
#[ignore = "requires a Vulkan capable device"]
fn unsignalled_fence_times_out() -> anyhow::Result<()> {
    let device = headless_device()?;
    let fence = Fence::new(&device, FenceFlags::empty())?;
    assert!(!fence.signalled());
    assert!(!fence.wait(0)?);

    let signalled = Fence::new(&device, FenceFlags::START_SIGNALLED)?;
    assert!(signalled.wait(0)?);
    device.reset_fences(&[&signalled])?;
    assert!(!signalled.signalled());
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan capable device"]
fn submission_signals_fence() -> anyhow::Result<()> {
    let device = headless_device()?;
    let queue = device.queue(0).ok_or(anyhow::anyhow!("no queue"))?.clone();
    let mut pool = CommandPool::new(&device, &queue)?;
    let keys = pool.allocate_command_buffers(2)?;
    let fence = Fence::new(&device, FenceFlags::empty())?;

    //recorded but never ended
    pool.get_mut(keys[1])?.begin_capture()?;
    let err = queue
        .submit(&SubmitInfo {
            command_buffers: &[pool.get(keys[0])?, pool.get(keys[1])?],
            waits: &[],
            signals: &[],
            fence: &fence,
        })
        .unwrap_err();
    assert_eq!(err, SubmitError::NotExecutable { index: 0 });

    for key in &keys {
        let cb = pool.get_mut(*key)?;
        if !cb.is_capturing() {
            cb.begin_capture()?;
        }
        cb.end_capture()?;
    }
    queue.submit(&SubmitInfo {
        command_buffers: &[pool.get(keys[0])?, pool.get(keys[1])?],
        waits: &[],
        signals: &[],
        fence: &fence,
    })?;
    assert!(fence.wait(u64::MAX)?);

    device.reset_fences(&[&fence])?;
    assert!(!fence.signalled());

    pool.destroy_command_buffers(&keys)?;
    assert!(pool.is_empty());
    device.wait_idle()?;
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan capable device"]
fn reset_buffer_can_be_captured_again() -> anyhow::Result<()> {
    let device = headless_device()?;
    let queue = device.queue(0).ok_or(anyhow::anyhow!("no queue"))?.clone();
    let mut pool = CommandPool::new(&device, &queue)?;
    let key = pool.allocate_command_buffers(1)?[0];
    let fence = Fence::new(&device, FenceFlags::empty())?;

    let cb = pool.get_mut(key)?;
    cb.begin_capture()?;
    cb.end_capture()?;
    queue.submit(&SubmitInfo {
        command_buffers: &[pool.get(key)?],
        waits: &[],
        signals: &[],
        fence: &fence,
    })?;
    assert!(fence.wait(u64::MAX)?);

    let cb = pool.get_mut(key)?;
    cb.reset()?;
    assert_eq!(cb.state(), RecordingState::Initial);
    assert_eq!(cb.end_capture(), Err(CommandBufferError::NotCapturing));
    cb.begin_capture()?;
    assert!(cb.is_capturing());
    assert_eq!(cb.begin_capture(), Err(CommandBufferError::AlreadyCapturing));
    cb.end_capture()?;
    assert!(cb.is_executable());

    //reset of the whole pool
    pool.reset_all_command_buffers()?;
    assert_eq!(pool.get(key)?.state(), RecordingState::Initial);
    pool.get_mut(key)?.begin_capture()?;
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan capable device"]
fn device_local_buffer_is_not_mappable() -> anyhow::Result<()> {
    let device = headless_device()?;
    let mut buffer = Buffer::new(
        &device,
        BufferDesc {
            memory: MemoryType::DeviceLocal,
            usage: BufferUsage::STORAGE,
            size: 256,
            sharing: SharingMode::Exclusive,
        },
        Some("device-local"),
    )?;
    assert!(!buffer.can_be_mapped());
    assert!(matches!(buffer.map(16, 0), Err(ResourceError::NotMappable)));
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan capable device"]
fn copy_between_staging_buffers() -> anyhow::Result<()> {
    let device = headless_device()?;
    let queue = device.queue(0).ok_or(anyhow::anyhow!("no queue"))?.clone();

    let data = (0..=255u8).collect::<Vec<_>>();
    let mut src = Buffer::new(&device, BufferDesc::staging(256), Some("src"))?;
    let mut dst = Buffer::new(&device, BufferDesc::staging(256), Some("dst"))?;
    src.write(0, &data)?;

    let mut pool = CommandPool::new(&device, &queue)?;
    let key = pool.allocate_command_buffers(1)?[0];
    {
        let cb = pool.get_mut(key)?;
        cb.begin_capture()?;
        cb.copy_buffer(&src, 64, &dst, 0, 128)?;
        assert!(cb.copy_buffer(&src, 200, &dst, 0, 128).is_err());
        cb.end_capture()?;
    }

    let fence = Fence::new(&device, FenceFlags::empty())?;
    queue.submit(&SubmitInfo {
        command_buffers: &[pool.get(key)?],
        waits: &[],
        signals: &[],
        fence: &fence,
    })?;
    assert!(fence.wait(u64::MAX)?);

    assert_eq!(dst.read(0, 128)?, &data[64..192]);
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan capable device"]
fn descriptor_updates_are_checked_against_layout() -> anyhow::Result<()> {
    let device = headless_device()?;
    let layout = Arc::new(DescriptorSetLayout::new(
        &device,
        &[DescriptorBinding::new(
            0,
            DescriptorKind::UniformBuffer,
            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        )],
    )?);
    let mut pool = DescriptorPool::for_layouts(&device, &[layout.as_ref()], 2)?;
    assert_eq!(pool.capacity(DescriptorKind::UniformBuffer), 2);
    let keys = pool.allocate(&[&layout, &layout])?;

    let uniform = Buffer::new(
        &device,
        BufferDesc {
            memory: MemoryType::HostVisible,
            usage: BufferUsage::UNIFORM,
            size: 64,
            sharing: SharingMode::Exclusive,
        },
        Some("uniform"),
    )?;
    let binding = [BufferBinding::whole(&uniform)];

    pool.get_mut(keys[0])?.update(&[DescriptorWrite {
        binding: 0,
        array_element: 0,
        resources: DescriptorResources::Buffers(&binding),
    }])?;

    let missing = pool.get_mut(keys[1])?.update(&[DescriptorWrite {
        binding: 3,
        array_element: 0,
        resources: DescriptorResources::Buffers(&binding),
    }]);
    assert!(missing.is_err());

    pool.free(&keys[..1])?;
    assert!(matches!(pool.get(keys[0]), Err(DescriptorError::StaleHandle)));
    assert!(pool.get(keys[1]).is_ok());
    Ok(())
}
