//! Renders a single point through a descriptor set and reads the pixel back. Needs a Vulkan driver, run with
//! `cargo test -- --ignored`.

use std::sync::Arc;

use tessera::{
    ash::vk,
    context::{Device, SubmitInfo},
    flags::{
        Access, BindPoint, BufferUsage, DescriptorKind, FenceFlags, ImageFormat, ImageLayout,
        ImageUsage, MemoryType, PipelineStages, ShaderStage, ShaderStages, StencilFaces, Topology,
    },
    resources::{
        Buffer, BufferBinding, BufferDesc, BufferImageCopy, ColourAttachment, CommandBuffer,
        CommandPool, DescriptorBinding, DescriptorPool, DescriptorResources, DescriptorSet,
        DescriptorSetLayout, DescriptorWrite, Framebuffer, GraphicsPipeline, GraphicsPipelineDesc,
        Image, ImageDesc, ImageView, PipelineLayout, RenderPass, RenderPassBeginInfo,
        RenderPassDesc, ShaderModule, SharingMode, SubpassDependency, SubpassDesc,
    },
    sync::Fence,
};

mod common;
use common::headless_device;

///`gl_Position = vec4(0, 0, 0, 1)` with a point size of 1.
const POINT_VERT: &[u32] = &[
    0x07230203, 0x00010000, 0x00000000, 0x00000014, 0x00000000, 0x00020011,
    0x00000001, 0x0003000e, 0x00000000, 0x00000001, 0x0006000f, 0x00000000,
    0x00000001, 0x6e69616d, 0x00000000, 0x00000003, 0x00030047, 0x00000002,
    0x00000002, 0x00050048, 0x00000002, 0x00000000, 0x0000000b, 0x00000000,
    0x00050048, 0x00000002, 0x00000001, 0x0000000b, 0x00000001, 0x00020013,
    0x00000004, 0x00030021, 0x00000005, 0x00000004, 0x00030016, 0x00000006,
    0x00000020, 0x00040017, 0x00000007, 0x00000006, 0x00000004, 0x0004001e,
    0x00000002, 0x00000007, 0x00000006, 0x00040020, 0x00000008, 0x00000003,
    0x00000002, 0x0004003b, 0x00000008, 0x00000003, 0x00000003, 0x00040015,
    0x00000009, 0x00000020, 0x00000001, 0x0004002b, 0x00000009, 0x0000000a,
    0x00000000, 0x0004002b, 0x00000009, 0x0000000b, 0x00000001, 0x0004002b,
    0x00000006, 0x0000000c, 0x00000000, 0x0004002b, 0x00000006, 0x0000000d,
    0x3f800000, 0x0007002c, 0x00000007, 0x0000000e, 0x0000000c, 0x0000000c,
    0x0000000c, 0x0000000d, 0x00040020, 0x0000000f, 0x00000003, 0x00000007,
    0x00040020, 0x00000010, 0x00000003, 0x00000006, 0x00050036, 0x00000004,
    0x00000001, 0x00000000, 0x00000005, 0x000200f8, 0x00000011, 0x00050041,
    0x0000000f, 0x00000012, 0x00000003, 0x0000000a, 0x0003003e, 0x00000012,
    0x0000000e, 0x00050041, 0x00000010, 0x00000013, 0x00000003, 0x0000000b,
    0x0003003e, 0x00000013, 0x0000000d, 0x000100fd, 0x00010038,
];

///Writes the `vec4` uniform at set 0, binding 0 to colour output 0.
const UNIFORM_COLOUR_FRAG: &[u32] = &[
    0x07230203, 0x00010000, 0x00000000, 0x00000011, 0x00000000, 0x00020011,
    0x00000001, 0x0003000e, 0x00000000, 0x00000001, 0x0006000f, 0x00000004,
    0x00000001, 0x6e69616d, 0x00000000, 0x00000002, 0x00030010, 0x00000001,
    0x00000007, 0x00040047, 0x00000002, 0x0000001e, 0x00000000, 0x00030047,
    0x00000003, 0x00000002, 0x00050048, 0x00000003, 0x00000000, 0x00000023,
    0x00000000, 0x00040047, 0x00000004, 0x00000022, 0x00000000, 0x00040047,
    0x00000004, 0x00000021, 0x00000000, 0x00020013, 0x00000005, 0x00030021,
    0x00000006, 0x00000005, 0x00030016, 0x00000007, 0x00000020, 0x00040017,
    0x00000008, 0x00000007, 0x00000004, 0x00040020, 0x00000009, 0x00000003,
    0x00000008, 0x0004003b, 0x00000009, 0x00000002, 0x00000003, 0x0003001e,
    0x00000003, 0x00000008, 0x00040020, 0x0000000a, 0x00000002, 0x00000003,
    0x0004003b, 0x0000000a, 0x00000004, 0x00000002, 0x00040015, 0x0000000b,
    0x00000020, 0x00000001, 0x0004002b, 0x0000000b, 0x0000000c, 0x00000000,
    0x00040020, 0x0000000d, 0x00000002, 0x00000008, 0x00050036, 0x00000005,
    0x00000001, 0x00000000, 0x00000006, 0x000200f8, 0x0000000e, 0x00050041,
    0x0000000d, 0x0000000f, 0x00000004, 0x0000000c, 0x0004003d, 0x00000008,
    0x00000010, 0x0000000f, 0x0003003e, 0x00000002, 0x00000010, 0x000100fd,
    0x00010038,
];

const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
const MAGENTA: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

fn uniform_colour(device: &Arc<Device>, colour: [f32; 4]) -> anyhow::Result<Buffer> {
    let mut buffer = Buffer::new(
        device,
        BufferDesc {
            memory: MemoryType::HostVisible,
            usage: BufferUsage::UNIFORM,
            size: 16,
            sharing: SharingMode::Exclusive,
        },
        Some("colour"),
    )?;
    buffer.write(0, bytemuck::cast_slice(&colour))?;
    Ok(buffer)
}

///Single subpass that leaves its colour attachment ready to be copied.
fn readback_pass() -> RenderPassDesc {
    RenderPassDesc {
        colour_attachments: vec![ColourAttachment::new(
            ImageFormat::R8G8B8A8Unorm,
            ImageLayout::TransferSourceOptimal,
        )],
        depth_stencil: None,
        subpasses: vec![SubpassDesc {
            colour_inputs: Vec::new(),
            colour_outputs: vec![0],
            uses_depth: false,
        }],
        dependencies: vec![
            SubpassDependency {
                src_subpass: None,
                dst_subpass: Some(0),
                src_stages: PipelineStages::COLOUR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::COLOUR_ATTACHMENT_OUTPUT,
                src_access: Access::empty(),
                dst_access: Access::COLOUR_ATTACHMENT_WRITE,
            },
            SubpassDependency {
                src_subpass: Some(0),
                dst_subpass: None,
                src_stages: PipelineStages::COLOUR_ATTACHMENT_OUTPUT,
                dst_stages: PipelineStages::TRANSFER,
                src_access: Access::COLOUR_ATTACHMENT_WRITE,
                dst_access: Access::TRANSFER_READ,
            },
        ],
    }
}

struct Frame<'a> {
    render_pass: &'a RenderPass,
    framebuffer: &'a Framebuffer,
    pipeline: &'a GraphicsPipeline,
    layout: &'a PipelineLayout,
    target: &'a Image,
    readback: &'a Buffer,
}

fn record(cb: &mut CommandBuffer, frame: &Frame, set: &DescriptorSet) -> anyhow::Result<()> {
    let full = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: frame.framebuffer.extent,
    };
    let faces = StencilFaces::FRONT | StencilFaces::BACK;

    cb.begin_capture()?;
    cb.begin_render_pass(&RenderPassBeginInfo::new(
        frame.render_pass,
        frame.framebuffer,
        &[[0.0; 4]],
    ))?;
    cb.bind_pipeline(frame.pipeline)?;
    cb.bind_descriptor_sets(BindPoint::Graphics, frame.layout, 0, &[set])?;
    //every dynamic state of the pipeline has to be set before drawing
    cb.set_viewports(
        0,
        &[vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: full.extent.width as f32,
            height: full.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }],
    )?;
    cb.set_scissors(0, &[full])?;
    cb.set_line_width(1.0)?;
    cb.set_depth_bias(0.0, 0.0, 0.0)?;
    cb.set_blend_constants([0.0; 4])?;
    cb.set_depth_bounds(0.0, 1.0)?;
    cb.set_stencil_compare_mask(faces, 0xff)?;
    cb.set_stencil_write_mask(faces, 0xff)?;
    cb.set_stencil_reference(faces, 0)?;
    cb.draw(1, 1, 0, 0)?;
    cb.end_render_pass()?;

    cb.copy_image_to_buffer(
        frame.target,
        ImageLayout::TransferSourceOptimal,
        frame.readback,
        &[BufferImageCopy::whole(frame.target)],
    )?;
    cb.memory_barrier(
        PipelineStages::TRANSFER,
        Access::TRANSFER_WRITE,
        PipelineStages::HOST,
        Access::HOST_READ,
    )?;
    cb.end_capture()?;
    Ok(())
}

#[test]
#[ignore = "requires a Vulkan capable device"]
fn descriptor_update_is_visible_to_the_next_draw() -> anyhow::Result<()> {
    let device = headless_device()?;
    let queue = device.queue(0).ok_or(anyhow::anyhow!("no queue"))?.clone();

    let set_layout = Arc::new(DescriptorSetLayout::new(
        &device,
        &[DescriptorBinding::new(
            0,
            DescriptorKind::UniformBuffer,
            ShaderStages::FRAGMENT,
        )],
    )?);
    let layout = Arc::new(PipelineLayout::new(&device, &[&set_layout], &[])?);
    let mut descriptors = DescriptorPool::for_layouts(&device, &[set_layout.as_ref()], 1)?;
    let set = descriptors.allocate(&[&set_layout])?[0];

    let render_pass = Arc::new(RenderPass::new(&device, readback_pass())?);
    let target = Arc::new(Image::new(
        &device,
        ImageDesc::colour_attachment_2d(1, 1, ImageFormat::R8G8B8A8Unorm)
            .add_usage(ImageUsage::TRANSFER_SOURCE),
        Some("target"),
    )?);
    let view = Arc::new(ImageView::full(&target)?);
    let framebuffer = Framebuffer::new(
        &render_pass,
        &[&view],
        vk::Extent2D {
            width: 1,
            height: 1,
        },
        1,
    )?;

    let vertex = ShaderModule::new(&device, POINT_VERT)?;
    let fragment = ShaderModule::new(&device, UNIFORM_COLOUR_FRAG)?;
    let stages = [
        vertex.as_stage(ShaderStage::Vertex, c"main"),
        fragment.as_stage(ShaderStage::Fragment, c"main"),
    ];
    let pipeline = GraphicsPipeline::new(
        &device,
        &GraphicsPipelineDesc {
            topology: Topology::PointList,
            ..GraphicsPipelineDesc::new(&render_pass, &layout, &stages)
        },
    )?;

    let green = uniform_colour(&device, GREEN)?;
    let magenta = uniform_colour(&device, MAGENTA)?;
    let mut readback = Buffer::new(&device, BufferDesc::staging(4), Some("readback"))?;

    let mut pool = CommandPool::new(&device, &queue)?;
    let key = pool.allocate_command_buffers(1)?[0];
    let fence = Fence::new(&device, FenceFlags::empty())?;

    for (colour, expected) in [(&green, [0u8, 255, 0, 255]), (&magenta, [255, 0, 255, 255])] {
        let binding = [BufferBinding::whole(colour)];
        descriptors.get_mut(set)?.update(&[DescriptorWrite {
            binding: 0,
            array_element: 0,
            resources: DescriptorResources::Buffers(&binding),
        }])?;

        let frame = Frame {
            render_pass: &render_pass,
            framebuffer: &framebuffer,
            pipeline: &pipeline,
            layout: &layout,
            target: &target,
            readback: &readback,
        };
        let cb = pool.get_mut(key)?;
        cb.reset()?;
        record(cb, &frame, descriptors.get(set)?)?;

        queue.submit(&SubmitInfo {
            command_buffers: &[pool.get(key)?],
            waits: &[],
            signals: &[],
            fence: &fence,
        })?;
        assert!(fence.wait(u64::MAX)?);
        device.reset_fences(&[&fence])?;

        assert_eq!(readback.read(0, 4)?, expected);
    }
    Ok(())
}
