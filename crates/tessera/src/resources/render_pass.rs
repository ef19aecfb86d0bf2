use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use super::{DeviceResource, ImageView};
use crate::{
    context::Device,
    error::PipelineError,
    flags::{Access, ImageFormat, ImageLayout, LoadOp, PipelineStages, SampleCount, StoreOp},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColourAttachment {
    pub format: ImageFormat,
    pub samples: SampleCount,
    pub load: LoadOp,
    pub store: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

impl ColourAttachment {
    ///Cleared and stored attachment that ends up in `final_layout`.
    pub fn new(format: ImageFormat, final_layout: ImageLayout) -> Self {
        ColourAttachment {
            format,
            samples: SampleCount::X1,
            load: LoadOp::Clear,
            store: StoreOp::Store,
            initial_layout: ImageLayout::Undefined,
            final_layout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilAttachment {
    ///One of the depth or stencil formats. Resolved against device support when the pass is created.
    pub format: ImageFormat,
    pub samples: SampleCount,
    pub depth_load: LoadOp,
    pub depth_store: StoreOp,
    pub stencil_load: LoadOp,
    pub stencil_store: StoreOp,
    pub initial_layout: ImageLayout,
    pub final_layout: ImageLayout,
}

impl DepthStencilAttachment {
    ///Depth buffer that is cleared at the start of the pass and discarded at the end.
    pub fn transient(format: ImageFormat) -> Self {
        DepthStencilAttachment {
            format,
            samples: SampleCount::X1,
            depth_load: LoadOp::Clear,
            depth_store: StoreOp::DontCare,
            stencil_load: LoadOp::DontCare,
            stencil_store: StoreOp::DontCare,
            initial_layout: ImageLayout::Undefined,
            final_layout: ImageLayout::DepthStencilAttachmentOptimal,
        }
    }
}

///Single subpass. Indices refer to the colour attachments of the [RenderPassDesc].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct SubpassDesc {
    ///Colour attachments read as input attachments.
    pub colour_inputs: Vec<u32>,
    ///Colour attachments written by the subpass.
    pub colour_outputs: Vec<u32>,
    ///True if the subpass uses the depth-stencil attachment.
    pub uses_depth: bool,
}

///Execution and memory dependency between two subpasses. `None` refers to commands outside the render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub src_subpass: Option<u32>,
    pub dst_subpass: Option<u32>,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub src_access: Access,
    pub dst_access: Access,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct RenderPassDesc {
    ///Colour attachments get the indices `0..n`. The depth-stencil attachment, if any, comes last.
    pub colour_attachments: Vec<ColourAttachment>,
    pub depth_stencil: Option<DepthStencilAttachment>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependency>,
}

impl RenderPassDesc {
    ///Single subpass that renders into one colour attachment which is presented afterwards. Optionally with a
    /// depth attachment.
    pub fn presentable(format: ImageFormat, depth: Option<ImageFormat>) -> Self {
        let mut dst_stages = PipelineStages::COLOUR_ATTACHMENT_OUTPUT;
        let mut dst_access = Access::COLOUR_ATTACHMENT_WRITE;
        if depth.is_some() {
            dst_stages |= PipelineStages::EARLY_FRAGMENT_TESTS;
            dst_access |= Access::DEPTH_STENCIL_ATTACHMENT_WRITE;
        }

        RenderPassDesc {
            colour_attachments: vec![ColourAttachment::new(format, ImageLayout::PresentSource)],
            depth_stencil: depth.map(DepthStencilAttachment::transient),
            subpasses: vec![SubpassDesc {
                colour_inputs: Vec::new(),
                colour_outputs: vec![0],
                uses_depth: depth.is_some(),
            }],
            dependencies: vec![SubpassDependency {
                src_subpass: None,
                dst_subpass: Some(0),
                src_stages: dst_stages,
                dst_stages,
                src_access: Access::empty(),
                dst_access,
            }],
        }
    }

    ///Checks that every index of the description is in range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.subpasses.is_empty() {
            return Err(PipelineError::NoSubpass);
        }
        let count = self.colour_attachments.len();
        for (subpass, desc) in self.subpasses.iter().enumerate() {
            if let Some(index) = desc
                .colour_inputs
                .iter()
                .chain(desc.colour_outputs.iter())
                .find(|idx| **idx as usize >= count)
            {
                return Err(PipelineError::InvalidAttachmentIndex {
                    subpass,
                    index: *index,
                    count,
                });
            }
            if desc.uses_depth && self.depth_stencil.is_none() {
                return Err(PipelineError::MissingDepthAttachment(subpass));
            }
        }
        for dependency in &self.dependencies {
            for subpass in [dependency.src_subpass, dependency.dst_subpass]
                .into_iter()
                .flatten()
            {
                if subpass as usize >= self.subpasses.len() {
                    return Err(PipelineError::InvalidSubpass(subpass));
                }
            }
        }
        Ok(())
    }
}

fn subpass_index(subpass: Option<u32>) -> u32 {
    subpass.unwrap_or(vk::SUBPASS_EXTERNAL)
}

///Immutable render pass.
pub struct RenderPass {
    pub inner: vk::RenderPass,
    pub device: Arc<Device>,
    pub desc: RenderPassDesc,
    ///Concrete format of each attachment, depth-stencil last.
    formats: Vec<vk::Format>,
}

impl RenderPass {
    pub fn new(device: &Arc<Device>, desc: RenderPassDesc) -> Result<Self, PipelineError> {
        desc.validate()?;

        let mut formats = Vec::with_capacity(desc.colour_attachments.len() + 1);
        let mut attachments = SmallVec::<[vk::AttachmentDescription; 8]>::new();
        for colour in &desc.colour_attachments {
            let format = device
                .resolve_format(colour.format)
                .map_err(|_| PipelineError::UnsupportedFormat(colour.format))?;
            formats.push(format);
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(colour.samples.to_vk())
                    .load_op(colour.load.to_vk())
                    .store_op(colour.store.to_vk())
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(colour.initial_layout.to_vk())
                    .final_layout(colour.final_layout.to_vk()),
            );
        }
        if let Some(depth) = &desc.depth_stencil {
            let format = device
                .resolve_format(depth.format)
                .map_err(|_| PipelineError::UnsupportedFormat(depth.format))?;
            formats.push(format);
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(depth.samples.to_vk())
                    .load_op(depth.depth_load.to_vk())
                    .store_op(depth.depth_store.to_vk())
                    .stencil_load_op(depth.stencil_load.to_vk())
                    .stencil_store_op(depth.stencil_store.to_vk())
                    .initial_layout(depth.initial_layout.to_vk())
                    .final_layout(depth.final_layout.to_vk()),
            );
        }

        let depth_ref = vk::AttachmentReference::default()
            .attachment(desc.colour_attachments.len() as u32)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let references = desc
            .subpasses
            .iter()
            .map(|subpass| {
                let inputs = subpass
                    .colour_inputs
                    .iter()
                    .map(|idx| {
                        vk::AttachmentReference::default()
                            .attachment(*idx)
                            .layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    })
                    .collect::<SmallVec<[vk::AttachmentReference; 4]>>();
                let outputs = subpass
                    .colour_outputs
                    .iter()
                    .map(|idx| {
                        vk::AttachmentReference::default()
                            .attachment(*idx)
                            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    })
                    .collect::<SmallVec<[vk::AttachmentReference; 4]>>();
                (inputs, outputs)
            })
            .collect::<Vec<_>>();

        let subpasses = desc
            .subpasses
            .iter()
            .zip(references.iter())
            .map(|(subpass, (inputs, outputs))| {
                let description = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(inputs)
                    .color_attachments(outputs);
                if subpass.uses_depth {
                    description.depth_stencil_attachment(&depth_ref)
                } else {
                    description
                }
            })
            .collect::<SmallVec<[vk::SubpassDescription; 4]>>();

        let dependencies = desc
            .dependencies
            .iter()
            .map(|dep| {
                vk::SubpassDependency::default()
                    .src_subpass(subpass_index(dep.src_subpass))
                    .dst_subpass(subpass_index(dep.dst_subpass))
                    .src_stage_mask(dep.src_stages.to_vk())
                    .dst_stage_mask(dep.dst_stages.to_vk())
                    .src_access_mask(dep.src_access.to_vk())
                    .dst_access_mask(dep.dst_access.to_vk())
            })
            .collect::<SmallVec<[vk::SubpassDependency; 4]>>();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let inner = unsafe { device.inner.create_render_pass(&create_info, None)? };

        Ok(RenderPass {
            inner,
            device: device.clone(),
            desc,
            formats,
        })
    }

    pub fn colour_attachment_count(&self) -> usize {
        self.desc.colour_attachments.len()
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.desc.depth_stencil.is_some()
    }

    ///All attachments, including the depth-stencil attachment.
    pub fn attachment_count(&self) -> usize {
        self.formats.len()
    }

    ///Concrete format of attachment `index`.
    pub fn attachment_format(&self, index: usize) -> Option<vk::Format> {
        self.formats.get(index).copied()
    }

    pub fn subpass_count(&self) -> usize {
        self.desc.subpasses.len()
    }

    pub fn subpass(&self, index: u32) -> Option<&SubpassDesc> {
        self.desc.subpasses.get(index as usize)
    }
}

impl DeviceResource for RenderPass {
    type Raw = vk::RenderPass;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_render_pass(self.inner, None) }
    }
}

///Binds image views to the attachments of a [RenderPass]. Keeps the views and the pass alive.
///
/// Framebuffers over swapchain images have to be recreated together with the swapchain.
pub struct Framebuffer {
    pub inner: vk::Framebuffer,
    pub render_pass: Arc<RenderPass>,
    pub attachments: Vec<Arc<ImageView>>,
    pub extent: vk::Extent2D,
    pub layers: u32,
}

impl Framebuffer {
    ///Creates a framebuffer for `render_pass`. `attachments` must be given in attachment order, depth-stencil last.
    pub fn new(
        render_pass: &Arc<RenderPass>,
        attachments: &[&Arc<ImageView>],
        extent: vk::Extent2D,
        layers: u32,
    ) -> Result<Self, PipelineError> {
        if attachments.len() != render_pass.attachment_count() {
            return Err(PipelineError::AttachmentCountMismatch {
                got: attachments.len(),
                expected: render_pass.attachment_count(),
            });
        }

        let views = attachments
            .iter()
            .map(|view| view.inner)
            .collect::<SmallVec<[vk::ImageView; 8]>>();
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.inner)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(layers);
        let inner = unsafe {
            render_pass
                .device
                .inner
                .create_framebuffer(&create_info, None)?
        };

        Ok(Framebuffer {
            inner,
            render_pass: render_pass.clone(),
            attachments: attachments.iter().map(|view| (*view).clone()).collect(),
            extent,
            layers,
        })
    }
}

impl DeviceResource for Framebuffer {
    type Raw = vk::Framebuffer;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.render_pass
                .device
                .inner
                .destroy_framebuffer(self.inner, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(RenderPass: Send, Sync);
        assert_impl_all!(Framebuffer: Send, Sync);
    }

    #[test]
    fn presentable_pass_is_valid() {
        let desc = RenderPassDesc::presentable(ImageFormat::B8G8R8A8Srgb, None);
        assert!(desc.validate().is_ok());
        assert_eq!(
            desc.colour_attachments[0].final_layout,
            ImageLayout::PresentSource
        );

        let with_depth =
            RenderPassDesc::presentable(ImageFormat::B8G8R8A8Srgb, Some(ImageFormat::DepthOnly));
        assert!(with_depth.validate().is_ok());
        assert!(with_depth.subpasses[0].uses_depth);
    }

    #[test]
    fn pass_without_subpass_is_rejected() {
        let desc = RenderPassDesc {
            colour_attachments: vec![ColourAttachment::new(
                ImageFormat::R8G8B8A8Unorm,
                ImageLayout::ShaderReadOnlyOptimal,
            )],
            ..Default::default()
        };
        assert_eq!(desc.validate(), Err(PipelineError::NoSubpass));
    }

    #[test]
    fn attachment_indices_are_checked() {
        let mut desc = RenderPassDesc::presentable(ImageFormat::B8G8R8A8Unorm, None);
        desc.subpasses.push(SubpassDesc {
            colour_inputs: vec![0],
            colour_outputs: vec![1],
            uses_depth: false,
        });
        assert_eq!(
            desc.validate(),
            Err(PipelineError::InvalidAttachmentIndex {
                subpass: 1,
                index: 1,
                count: 1
            })
        );

        desc.subpasses[1].colour_outputs = vec![0];
        desc.subpasses[1].uses_depth = true;
        assert_eq!(
            desc.validate(),
            Err(PipelineError::MissingDepthAttachment(1))
        );
    }

    #[test]
    fn dependencies_must_reference_existing_subpasses() {
        let mut desc = RenderPassDesc::presentable(ImageFormat::B8G8R8A8Unorm, None);
        desc.dependencies[0].dst_subpass = Some(3);
        assert_eq!(desc.validate(), Err(PipelineError::InvalidSubpass(3)));
    }
}
