use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use super::{DescriptorSetLayout, DeviceResource};
use crate::{context::Device, error::PipelineError, flags::ShaderStages};

mod graphics;
pub use graphics::{
    BlendAttachment, ColourBlendState, DepthStencilState, GraphicsPipeline, GraphicsPipelineDesc,
    MultisampleState, RasterisationState, ShaderStageDesc, StencilOpState, VertexAttribute,
    VertexBinding,
};

///Push constant range of a [PipelineLayout]. Ranges are laid out one after another in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    ///Size in bytes, a non-zero multiple of 4.
    pub size: u32,
    pub stages: ShaderStages,
}

///Assigns each range an offset right after the previous one. Returns the ranges and the total size.
pub(crate) fn push_constant_offsets(
    ranges: &[PushConstantRange],
) -> Result<(Vec<vk::PushConstantRange>, u32), PipelineError> {
    let mut offset = 0u32;
    let mut out = Vec::with_capacity(ranges.len());
    for (idx, range) in ranges.iter().enumerate() {
        if range.size == 0 || range.size % 4 != 0 {
            return Err(PipelineError::InvalidPushRange(idx));
        }
        out.push(
            vk::PushConstantRange::default()
                .stage_flags(range.stages.to_vk())
                .offset(offset)
                .size(range.size),
        );
        offset = offset
            .checked_add(range.size)
            .ok_or(PipelineError::InvalidPushRange(idx))?;
    }
    Ok((out, offset))
}

///Immutable interface of a pipeline: its descriptor set layouts and push constant ranges.
pub struct PipelineLayout {
    pub inner: vk::PipelineLayout,
    pub device: Arc<Device>,
    ///Kept alive for as long as the layout exists.
    pub set_layouts: Vec<Arc<DescriptorSetLayout>>,
    push_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<Device>,
        set_layouts: &[&Arc<DescriptorSetLayout>],
        push_constant_ranges: &[PushConstantRange],
    ) -> Result<Self, PipelineError> {
        let (push_ranges, size) = push_constant_offsets(push_constant_ranges)?;
        let max = device.limits().max_push_constants_size;
        if size > max {
            return Err(PipelineError::PushConstantsTooLarge { size, max });
        }

        let raw_layouts = set_layouts
            .iter()
            .map(|l| l.inner)
            .collect::<SmallVec<[vk::DescriptorSetLayout; 4]>>();
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&raw_layouts)
            .push_constant_ranges(&push_ranges);
        let inner = unsafe { device.inner.create_pipeline_layout(&create_info, None)? };

        Ok(PipelineLayout {
            inner,
            device: device.clone(),
            set_layouts: set_layouts.iter().map(|l| (*l).clone()).collect(),
            push_ranges,
        })
    }

    ///Offset, size and stages of push constant range `index`.
    pub fn push_constant_range(&self, index: usize) -> Option<vk::PushConstantRange> {
        self.push_ranges.get(index).copied()
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_ranges
    }
}

impl DeviceResource for PipelineLayout {
    type Raw = vk::PipelineLayout;
    fn raw(&self) -> Self::Raw {
        self.inner
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline_layout(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(PipelineLayout: Send, Sync);
    }

    #[test]
    fn push_ranges_are_packed_in_order() {
        let (ranges, size) = push_constant_offsets(&[
            PushConstantRange {
                size: 16,
                stages: ShaderStages::VERTEX,
            },
            PushConstantRange {
                size: 8,
                stages: ShaderStages::FRAGMENT,
            },
            PushConstantRange {
                size: 64,
                stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
            },
        ])
        .unwrap();

        assert_eq!(size, 88);
        assert_eq!(
            ranges.iter().map(|r| r.offset).collect::<Vec<_>>(),
            vec![0, 16, 24]
        );
        assert_eq!(ranges[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn push_ranges_must_be_word_sized() {
        let valid = PushConstantRange {
            size: 4,
            stages: ShaderStages::VERTEX,
        };
        assert_eq!(
            push_constant_offsets(&[
                valid,
                PushConstantRange {
                    size: 6,
                    ..valid
                }
            ])
            .err(),
            Some(PipelineError::InvalidPushRange(1))
        );
        assert_eq!(
            push_constant_offsets(&[PushConstantRange { size: 0, ..valid }]).err(),
            Some(PipelineError::InvalidPushRange(0))
        );
        let (ranges, size) = push_constant_offsets(&[]).unwrap();
        assert!(ranges.is_empty());
        assert_eq!(size, 0);
    }
}
