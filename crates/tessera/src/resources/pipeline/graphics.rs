use std::{ffi::CStr, sync::Arc};

use ash::vk;
use smallvec::SmallVec;

use super::PipelineLayout;
use crate::{
    context::Device,
    error::PipelineError,
    flags::{
        BlendFactor, BlendOp, ColourComponents, CompareOp, CullMode, FrontFace, SampleCount,
        ShaderStage, StencilOp, Topology, VertexFormat, VertexInputRate,
    },
    resources::{DeviceResource, RenderPass, ShaderModule},
};

///Every state a command buffer can set is dynamic. Viewport and scissor counts are fixed per pipeline.
const DYNAMIC_STATES: [vk::DynamicState; 9] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::LINE_WIDTH,
    vk::DynamicState::DEPTH_BIAS,
    vk::DynamicState::BLEND_CONSTANTS,
    vk::DynamicState::DEPTH_BOUNDS,
    vk::DynamicState::STENCIL_COMPARE_MASK,
    vk::DynamicState::STENCIL_WRITE_MASK,
    vk::DynamicState::STENCIL_REFERENCE,
];

#[derive(Clone, Copy)]
pub struct ShaderStageDesc<'a> {
    pub module: &'a ShaderModule,
    pub stage: ShaderStage,
    ///Name of the entry point, usually `main`.
    pub entry: &'a CStr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    ///Distance between two elements in bytes.
    pub stride: u32,
    pub rate: VertexInputRate,
}

///Vertex attribute. Attributes of one binding are packed in declaration order, so the offset of an attribute is
/// the size of all attributes of the same binding declared before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VertexFormat,
}

///Offset of each attribute within its binding.
pub(crate) fn attribute_offsets(attributes: &[VertexAttribute]) -> SmallVec<[u32; 8]> {
    attributes
        .iter()
        .enumerate()
        .map(|(idx, attribute)| {
            attributes[..idx]
                .iter()
                .filter(|a| a.binding == attribute.binding)
                .map(|a| a.format.size())
                .sum()
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterisationState {
    pub depth_clamp: bool,
    pub discard: bool,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    ///Enables depth bias. The values are set on the command buffer.
    pub depth_bias: bool,
}

impl Default for RasterisationState {
    fn default() -> Self {
        RasterisationState {
            depth_clamp: false,
            discard: false,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_bias: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct MultisampleState {
    pub samples: SampleCount,
    ///Minimum fraction for sample shading. `None` disables sample shading.
    pub sample_shading: Option<f32>,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct StencilOpState {
    pub fail: StencilOp,
    pub pass: StencilOp,
    pub depth_fail: StencilOp,
    pub compare: CompareOp,
}

impl StencilOpState {
    fn to_vk(self) -> vk::StencilOpState {
        vk::StencilOpState::default()
            .fail_op(self.fail.to_vk())
            .pass_op(self.pass.to_vk())
            .depth_fail_op(self.depth_fail.to_vk())
            .compare_op(self.compare.to_vk())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    ///Bounds are set on the command buffer.
    pub depth_bounds_test: bool,
    ///Masks and reference are set on the command buffer.
    pub stencil_test: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test: true,
            depth_write: true,
            depth_compare: CompareOp::Less,
            depth_bounds_test: false,
            stencil_test: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendAttachment {
    pub enabled: bool,
    pub src_colour: BlendFactor,
    pub dst_colour: BlendFactor,
    pub colour_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColourComponents,
}

impl BlendAttachment {
    ///No blending, all components are written.
    pub fn opaque() -> Self {
        BlendAttachment {
            enabled: false,
            src_colour: BlendFactor::One,
            dst_colour: BlendFactor::Zero,
            colour_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColourComponents::default(),
        }
    }

    ///Classic `src * alpha + dst * (1 - alpha)` blending.
    pub fn alpha_blend() -> Self {
        BlendAttachment {
            enabled: true,
            src_colour: BlendFactor::SrcAlpha,
            dst_colour: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Self::opaque()
        }
    }

    fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.enabled)
            .src_color_blend_factor(self.src_colour.to_vk())
            .dst_color_blend_factor(self.dst_colour.to_vk())
            .color_blend_op(self.colour_op.to_vk())
            .src_alpha_blend_factor(self.src_alpha.to_vk())
            .dst_alpha_blend_factor(self.dst_alpha.to_vk())
            .alpha_blend_op(self.alpha_op.to_vk())
            .color_write_mask(self.write_mask.to_vk())
    }
}

impl Default for BlendAttachment {
    fn default() -> Self {
        Self::opaque()
    }
}

///Blend state per colour output of the subpass. If `attachments` is empty, every output is written opaque.
/// Blend constants are set on the command buffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ColourBlendState {
    pub attachments: Vec<BlendAttachment>,
}

///Full description of a graphics pipeline.
pub struct GraphicsPipelineDesc<'a> {
    pub render_pass: &'a Arc<RenderPass>,
    pub subpass: u32,
    pub layout: &'a Arc<PipelineLayout>,
    pub stages: &'a [ShaderStageDesc<'a>],
    pub vertex_bindings: &'a [VertexBinding],
    pub vertex_attributes: &'a [VertexAttribute],
    pub topology: Topology,
    pub primitive_restart: bool,
    pub viewport_count: u32,
    pub scissor_count: u32,
    pub rasterisation: RasterisationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub colour_blend: ColourBlendState,
}

impl<'a> GraphicsPipelineDesc<'a> {
    ///Pipeline for subpass 0 without vertex input, drawing triangle lists with default state.
    pub fn new(
        render_pass: &'a Arc<RenderPass>,
        layout: &'a Arc<PipelineLayout>,
        stages: &'a [ShaderStageDesc<'a>],
    ) -> Self {
        GraphicsPipelineDesc {
            render_pass,
            subpass: 0,
            layout,
            stages,
            vertex_bindings: &[],
            vertex_attributes: &[],
            topology: Topology::TriangleList,
            primitive_restart: false,
            viewport_count: 1,
            scissor_count: 1,
            rasterisation: RasterisationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            colour_blend: ColourBlendState::default(),
        }
    }

    ///Checks the description against its render pass. Returns the number of colour outputs of the subpass.
    pub fn validate(&self) -> Result<usize, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoShaderStage);
        }
        let subpass = self
            .render_pass
            .subpass(self.subpass)
            .ok_or(PipelineError::InvalidSubpass(self.subpass))?;
        check_blend_count(
            self.colour_blend.attachments.len(),
            subpass.colour_outputs.len(),
        )?;
        Ok(subpass.colour_outputs.len())
    }
}

fn check_blend_count(got: usize, outputs: usize) -> Result<(), PipelineError> {
    if got != 0 && got != outputs {
        return Err(PipelineError::BlendAttachmentMismatch {
            got,
            expected: outputs,
        });
    }
    Ok(())
}

///Arrays referenced by the create infos of one pipeline.
struct Scratch {
    stages: SmallVec<[vk::PipelineShaderStageCreateInfo<'static>; 2]>,
    bindings: SmallVec<[vk::VertexInputBindingDescription; 4]>,
    attributes: SmallVec<[vk::VertexInputAttributeDescription; 8]>,
    blend: SmallVec<[vk::PipelineColorBlendAttachmentState; 4]>,
}

///Fixed function state of one pipeline, references its [Scratch].
struct States<'a> {
    vertex_input: vk::PipelineVertexInputStateCreateInfo<'a>,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'a>,
    viewport: vk::PipelineViewportStateCreateInfo<'a>,
    rasterisation: vk::PipelineRasterizationStateCreateInfo<'a>,
    multisample: vk::PipelineMultisampleStateCreateInfo<'a>,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'a>,
    colour_blend: vk::PipelineColorBlendStateCreateInfo<'a>,
}

///Pipeline that keeps its layout and render pass alive.
pub struct GraphicsPipeline {
    pub inner: vk::Pipeline,
    pub device: Arc<Device>,
    pub layout: Arc<PipelineLayout>,
    pub render_pass: Arc<RenderPass>,
    pub subpass: u32,
}

impl GraphicsPipeline {
    pub fn new(device: &Arc<Device>, desc: &GraphicsPipelineDesc) -> Result<Self, PipelineError> {
        let mut pipelines = Self::new_batch(device, core::slice::from_ref(desc))?;
        pipelines.pop().ok_or(PipelineError::Allocation)
    }

    ///Creates all pipelines in one call. Either all pipelines are created, or none.
    pub fn new_batch(
        device: &Arc<Device>,
        descs: &[GraphicsPipelineDesc],
    ) -> Result<Vec<Self>, PipelineError> {
        if descs.is_empty() {
            return Ok(Vec::new());
        }

        let outputs = descs
            .iter()
            .map(|d| d.validate())
            .collect::<Result<SmallVec<[usize; 4]>, _>>()?;

        let scratch = descs
            .iter()
            .zip(outputs.iter())
            .map(|(desc, outputs)| {
                let stages = desc
                    .stages
                    .iter()
                    .map(|s| vk::PipelineShaderStageCreateInfo {
                        stage: s.stage.to_vk(),
                        module: s.module.inner,
                        p_name: s.entry.as_ptr(),
                        ..Default::default()
                    })
                    .collect();
                let bindings = desc
                    .vertex_bindings
                    .iter()
                    .map(|b| {
                        vk::VertexInputBindingDescription::default()
                            .binding(b.binding)
                            .stride(b.stride)
                            .input_rate(b.rate.to_vk())
                    })
                    .collect();
                let attributes = desc
                    .vertex_attributes
                    .iter()
                    .zip(attribute_offsets(desc.vertex_attributes))
                    .map(|(a, offset)| {
                        vk::VertexInputAttributeDescription::default()
                            .location(a.location)
                            .binding(a.binding)
                            .format(a.format.to_vk())
                            .offset(offset)
                    })
                    .collect();
                let blend = if desc.colour_blend.attachments.is_empty() {
                    (0..*outputs)
                        .map(|_| BlendAttachment::opaque().to_vk())
                        .collect()
                } else {
                    desc.colour_blend
                        .attachments
                        .iter()
                        .map(|a| a.to_vk())
                        .collect()
                };
                Scratch {
                    stages,
                    bindings,
                    attributes,
                    blend,
                }
            })
            .collect::<SmallVec<[Scratch; 4]>>();

        let states = descs
            .iter()
            .zip(scratch.iter())
            .map(|(desc, scratch)| States {
                vertex_input: vk::PipelineVertexInputStateCreateInfo::default()
                    .vertex_binding_descriptions(&scratch.bindings)
                    .vertex_attribute_descriptions(&scratch.attributes),
                input_assembly: vk::PipelineInputAssemblyStateCreateInfo::default()
                    .topology(desc.topology.to_vk())
                    .primitive_restart_enable(desc.primitive_restart),
                viewport: vk::PipelineViewportStateCreateInfo::default()
                    .viewport_count(desc.viewport_count)
                    .scissor_count(desc.scissor_count),
                rasterisation: vk::PipelineRasterizationStateCreateInfo::default()
                    .depth_clamp_enable(desc.rasterisation.depth_clamp)
                    .rasterizer_discard_enable(desc.rasterisation.discard)
                    .polygon_mode(vk::PolygonMode::FILL)
                    .cull_mode(desc.rasterisation.cull_mode.to_vk())
                    .front_face(desc.rasterisation.front_face.to_vk())
                    .depth_bias_enable(desc.rasterisation.depth_bias)
                    .line_width(1.0),
                multisample: vk::PipelineMultisampleStateCreateInfo::default()
                    .rasterization_samples(desc.multisample.samples.to_vk())
                    .sample_shading_enable(desc.multisample.sample_shading.is_some())
                    .min_sample_shading(desc.multisample.sample_shading.unwrap_or(0.0))
                    .alpha_to_coverage_enable(desc.multisample.alpha_to_coverage)
                    .alpha_to_one_enable(desc.multisample.alpha_to_one),
                depth_stencil: vk::PipelineDepthStencilStateCreateInfo::default()
                    .depth_test_enable(desc.depth_stencil.depth_test)
                    .depth_write_enable(desc.depth_stencil.depth_write)
                    .depth_compare_op(desc.depth_stencil.depth_compare.to_vk())
                    .depth_bounds_test_enable(desc.depth_stencil.depth_bounds_test)
                    .stencil_test_enable(desc.depth_stencil.stencil_test)
                    .front(desc.depth_stencil.front.to_vk())
                    .back(desc.depth_stencil.back.to_vk())
                    .min_depth_bounds(0.0)
                    .max_depth_bounds(1.0),
                colour_blend: vk::PipelineColorBlendStateCreateInfo::default()
                    .logic_op_enable(false)
                    .attachments(&scratch.blend),
            })
            .collect::<SmallVec<[States; 4]>>();

        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_infos = descs
            .iter()
            .zip(scratch.iter())
            .zip(states.iter())
            .map(|((desc, scratch), states)| {
                vk::GraphicsPipelineCreateInfo::default()
                    .stages(&scratch.stages)
                    .vertex_input_state(&states.vertex_input)
                    .input_assembly_state(&states.input_assembly)
                    .viewport_state(&states.viewport)
                    .rasterization_state(&states.rasterisation)
                    .multisample_state(&states.multisample)
                    .depth_stencil_state(&states.depth_stencil)
                    .color_blend_state(&states.colour_blend)
                    .dynamic_state(&dynamic)
                    .layout(desc.layout.inner)
                    .render_pass(desc.render_pass.inner)
                    .subpass(desc.subpass)
            })
            .collect::<SmallVec<[vk::GraphicsPipelineCreateInfo; 4]>>();

        let pipelines = match unsafe {
            device
                .inner
                .create_graphics_pipelines(vk::PipelineCache::null(), &create_infos, None)
        } {
            Ok(p) => p,
            Err((partial, err)) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to create {} graphics pipelines: {}", descs.len(), err);
                for pipeline in partial.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe { device.inner.destroy_pipeline(pipeline, None) };
                }
                return Err(err.into());
            }
        };

        if pipelines.len() != descs.len() {
            for pipeline in pipelines {
                unsafe { device.inner.destroy_pipeline(pipeline, None) };
            }
            return Err(PipelineError::Allocation);
        }

        Ok(pipelines
            .into_iter()
            .zip(descs.iter())
            .map(|(inner, desc)| GraphicsPipeline {
                inner,
                device: device.clone(),
                layout: desc.layout.clone(),
                render_pass: desc.render_pass.clone(),
                subpass: desc.subpass,
            })
            .collect())
    }
}

impl DeviceResource for GraphicsPipeline {
    type Raw = vk::Pipeline;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(GraphicsPipeline: Send, Sync);
    }

    #[test]
    fn attribute_offsets_accumulate_per_binding() {
        let attributes = [
            VertexAttribute {
                location: 0,
                binding: 0,
                format: VertexFormat::Float3,
            },
            VertexAttribute {
                location: 1,
                binding: 1,
                format: VertexFormat::Float4,
            },
            VertexAttribute {
                location: 2,
                binding: 0,
                format: VertexFormat::Float2,
            },
            VertexAttribute {
                location: 3,
                binding: 0,
                format: VertexFormat::Uint1,
            },
        ];
        assert_eq!(attribute_offsets(&attributes).as_slice(), &[0, 0, 12, 20]);
        assert!(attribute_offsets(&[]).is_empty());
    }

    #[test]
    fn blend_states_match_outputs() {
        assert!(check_blend_count(0, 3).is_ok());
        assert!(check_blend_count(2, 2).is_ok());
        assert_eq!(
            check_blend_count(1, 2),
            Err(PipelineError::BlendAttachmentMismatch {
                got: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn all_command_buffer_states_are_dynamic() {
        assert_eq!(DYNAMIC_STATES.len(), 9);
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::STENCIL_REFERENCE));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::LINE_WIDTH));
    }
}
