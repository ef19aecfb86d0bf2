//! Configuration flags and enums.
//!
//! All of tessera's configuration is expressed through the types in this module. They never carry Vulkan's
//! numeric values. The translation into [ash::vk] types happens exclusively through the `to_vk` functions below.

use ash::vk;
use bitflags::bitflags;

///Collects every `flag => vk` pair that is set in `value` into a new `target` flag set.
macro_rules! translate_bits {
    ($value:expr, $target:ty, { $($flag:expr => $vk:expr),* $(,)? }) => {{
        let mut out = <$target>::empty();
        $(
            if $value.contains($flag) {
                out |= $vk;
            }
        )*
        out
    }};
}

bitflags! {
    ///Capabilities a queue has to provide.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueFlags: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE = 0x2;
        const TRANSFER = 0x4;
        ///Queue must be able to present to the surface it was requested for.
        const PRESENT = 0x8;
    }
}

impl QueueFlags {
    ///Translates the capabilities of a queue family. Graphics and compute families implicitly support transfer
    /// operations, so those get `TRANSFER` as well. `PRESENT` is never set, since it depends on a surface.
    pub fn from_family(flags: vk::QueueFlags) -> Self {
        let mut out = QueueFlags::empty();
        if flags.contains(vk::QueueFlags::GRAPHICS) {
            out |= QueueFlags::GRAPHICS | QueueFlags::TRANSFER;
        }
        if flags.contains(vk::QueueFlags::COMPUTE) {
            out |= QueueFlags::COMPUTE | QueueFlags::TRANSFER;
        }
        if flags.contains(vk::QueueFlags::TRANSFER) {
            out |= QueueFlags::TRANSFER;
        }
        out
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 0x1;
        const INDEX = 0x2;
        const UNIFORM = 0x4;
        const STORAGE = 0x8;
        const TRANSFER_SOURCE = 0x10;
        const TRANSFER_DESTINATION = 0x20;
    }
}

impl BufferUsage {
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        translate_bits!(self, vk::BufferUsageFlags, {
            BufferUsage::VERTEX => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::INDEX => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::UNIFORM => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::STORAGE => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::TRANSFER_SOURCE => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::TRANSFER_DESTINATION => vk::BufferUsageFlags::TRANSFER_DST,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const TRANSFER_SOURCE = 0x1;
        const TRANSFER_DESTINATION = 0x2;
        const SAMPLED = 0x4;
        const STORAGE = 0x8;
        const COLOUR_ATTACHMENT = 0x10;
        const DEPTH_STENCIL_ATTACHMENT = 0x20;
        const INPUT_ATTACHMENT = 0x40;
    }
}

impl ImageUsage {
    pub fn to_vk(self) -> vk::ImageUsageFlags {
        translate_bits!(self, vk::ImageUsageFlags, {
            ImageUsage::TRANSFER_SOURCE => vk::ImageUsageFlags::TRANSFER_SRC,
            ImageUsage::TRANSFER_DESTINATION => vk::ImageUsageFlags::TRANSFER_DST,
            ImageUsage::SAMPLED => vk::ImageUsageFlags::SAMPLED,
            ImageUsage::STORAGE => vk::ImageUsageFlags::STORAGE,
            ImageUsage::COLOUR_ATTACHMENT => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ImageUsage::DEPTH_STENCIL_ATTACHMENT => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ImageUsage::INPUT_ATTACHMENT => vk::ImageUsageFlags::INPUT_ATTACHMENT,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspect: u32 {
        const COLOUR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

impl ImageAspect {
    pub fn to_vk(self) -> vk::ImageAspectFlags {
        translate_bits!(self, vk::ImageAspectFlags, {
            ImageAspect::COLOUR => vk::ImageAspectFlags::COLOR,
            ImageAspect::DEPTH => vk::ImageAspectFlags::DEPTH,
            ImageAspect::STENCIL => vk::ImageAspectFlags::STENCIL,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 0x1;
        const DRAW_INDIRECT = 0x2;
        const VERTEX_INPUT = 0x4;
        const VERTEX_SHADER = 0x8;
        const FRAGMENT_SHADER = 0x10;
        const EARLY_FRAGMENT_TESTS = 0x20;
        const LATE_FRAGMENT_TESTS = 0x40;
        const COLOUR_ATTACHMENT_OUTPUT = 0x80;
        const COMPUTE_SHADER = 0x100;
        const TRANSFER = 0x200;
        const BOTTOM_OF_PIPE = 0x400;
        const HOST = 0x800;
        const ALL_GRAPHICS = 0x1000;
        const ALL_COMMANDS = 0x2000;
    }
}

impl PipelineStages {
    pub fn to_vk(self) -> vk::PipelineStageFlags {
        translate_bits!(self, vk::PipelineStageFlags, {
            PipelineStages::TOP_OF_PIPE => vk::PipelineStageFlags::TOP_OF_PIPE,
            PipelineStages::DRAW_INDIRECT => vk::PipelineStageFlags::DRAW_INDIRECT,
            PipelineStages::VERTEX_INPUT => vk::PipelineStageFlags::VERTEX_INPUT,
            PipelineStages::VERTEX_SHADER => vk::PipelineStageFlags::VERTEX_SHADER,
            PipelineStages::FRAGMENT_SHADER => vk::PipelineStageFlags::FRAGMENT_SHADER,
            PipelineStages::EARLY_FRAGMENT_TESTS => vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            PipelineStages::LATE_FRAGMENT_TESTS => vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            PipelineStages::COLOUR_ATTACHMENT_OUTPUT => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            PipelineStages::COMPUTE_SHADER => vk::PipelineStageFlags::COMPUTE_SHADER,
            PipelineStages::TRANSFER => vk::PipelineStageFlags::TRANSFER,
            PipelineStages::BOTTOM_OF_PIPE => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            PipelineStages::HOST => vk::PipelineStageFlags::HOST,
            PipelineStages::ALL_GRAPHICS => vk::PipelineStageFlags::ALL_GRAPHICS,
            PipelineStages::ALL_COMMANDS => vk::PipelineStageFlags::ALL_COMMANDS,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const INDIRECT_COMMAND_READ = 0x1;
        const INDEX_READ = 0x2;
        const VERTEX_ATTRIBUTE_READ = 0x4;
        const UNIFORM_READ = 0x8;
        const INPUT_ATTACHMENT_READ = 0x10;
        const SHADER_READ = 0x20;
        const SHADER_WRITE = 0x40;
        const COLOUR_ATTACHMENT_READ = 0x80;
        const COLOUR_ATTACHMENT_WRITE = 0x100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400;
        const TRANSFER_READ = 0x800;
        const TRANSFER_WRITE = 0x1000;
        const HOST_READ = 0x2000;
        const HOST_WRITE = 0x4000;
        const MEMORY_READ = 0x8000;
        const MEMORY_WRITE = 0x10000;
    }
}

impl Access {
    pub fn to_vk(self) -> vk::AccessFlags {
        translate_bits!(self, vk::AccessFlags, {
            Access::INDIRECT_COMMAND_READ => vk::AccessFlags::INDIRECT_COMMAND_READ,
            Access::INDEX_READ => vk::AccessFlags::INDEX_READ,
            Access::VERTEX_ATTRIBUTE_READ => vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            Access::UNIFORM_READ => vk::AccessFlags::UNIFORM_READ,
            Access::INPUT_ATTACHMENT_READ => vk::AccessFlags::INPUT_ATTACHMENT_READ,
            Access::SHADER_READ => vk::AccessFlags::SHADER_READ,
            Access::SHADER_WRITE => vk::AccessFlags::SHADER_WRITE,
            Access::COLOUR_ATTACHMENT_READ => vk::AccessFlags::COLOR_ATTACHMENT_READ,
            Access::COLOUR_ATTACHMENT_WRITE => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            Access::DEPTH_STENCIL_ATTACHMENT_READ => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
            Access::DEPTH_STENCIL_ATTACHMENT_WRITE => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            Access::TRANSFER_READ => vk::AccessFlags::TRANSFER_READ,
            Access::TRANSFER_WRITE => vk::AccessFlags::TRANSFER_WRITE,
            Access::HOST_READ => vk::AccessFlags::HOST_READ,
            Access::HOST_WRITE => vk::AccessFlags::HOST_WRITE,
            Access::MEMORY_READ => vk::AccessFlags::MEMORY_READ,
            Access::MEMORY_WRITE => vk::AccessFlags::MEMORY_WRITE,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 0x1;
        const FRAGMENT = 0x2;
        const COMPUTE = 0x4;
    }
}

impl ShaderStages {
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        translate_bits!(self, vk::ShaderStageFlags, {
            ShaderStages::VERTEX => vk::ShaderStageFlags::VERTEX,
            ShaderStages::FRAGMENT => vk::ShaderStageFlags::FRAGMENT,
            ShaderStages::COMPUTE => vk::ShaderStageFlags::COMPUTE,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StencilFaces: u32 {
        const FRONT = 0x1;
        const BACK = 0x2;
    }
}

impl StencilFaces {
    pub fn to_vk(self) -> vk::StencilFaceFlags {
        translate_bits!(self, vk::StencilFaceFlags, {
            StencilFaces::FRONT => vk::StencilFaceFlags::FRONT,
            StencilFaces::BACK => vk::StencilFaceFlags::BACK,
        })
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColourComponents: u32 {
        const R = 0x1;
        const G = 0x2;
        const B = 0x4;
        const A = 0x8;
    }
}

impl Default for ColourComponents {
    fn default() -> Self {
        ColourComponents::all()
    }
}

impl ColourComponents {
    pub fn to_vk(self) -> vk::ColorComponentFlags {
        translate_bits!(self, vk::ColorComponentFlags, {
            ColourComponents::R => vk::ColorComponentFlags::R,
            ColourComponents::G => vk::ColorComponentFlags::G,
            ColourComponents::B => vk::ColorComponentFlags::B,
            ColourComponents::A => vk::ColorComponentFlags::A,
        })
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FenceFlags: u32 {
        ///Fence starts out in the signalled state.
        const START_SIGNALLED = 0x1;
    }
}

impl FenceFlags {
    pub fn to_vk(self) -> vk::FenceCreateFlags {
        translate_bits!(self, vk::FenceCreateFlags, {
            FenceFlags::START_SIGNALLED => vk::FenceCreateFlags::SIGNALED,
        })
    }
}

///Memory intent of a buffer or image. The allocator picks a concrete memory type satisfying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryType {
    ///Host visible memory, can be mapped.
    HostVisible,
    ///Device local memory. Can't be mapped.
    DeviceLocal,
}

impl MemoryType {
    pub fn to_location(self) -> gpu_allocator::MemoryLocation {
        match self {
            MemoryType::HostVisible => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryType::DeviceLocal => gpu_allocator::MemoryLocation::GpuOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Tex1d,
    Tex2d,
    Tex3d,
}

impl ImageType {
    pub fn to_vk(self) -> vk::ImageType {
        match self {
            ImageType::Tex1d => vk::ImageType::TYPE_1D,
            ImageType::Tex2d => vk::ImageType::TYPE_2D,
            ImageType::Tex3d => vk::ImageType::TYPE_3D,
        }
    }

    ///Modifies `extent` based on `self` to be valid. For instance sets height and depth to 1 for a 1d image
    pub fn valid_extent(self, extent: vk::Extent3D) -> vk::Extent3D {
        match self {
            ImageType::Tex1d => vk::Extent3D {
                width: extent.width,
                height: 1,
                depth: 1,
            },
            ImageType::Tex2d => vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            ImageType::Tex3d => extent,
        }
    }

    ///The view type that covers the whole image.
    pub fn default_view_type(self) -> ImageViewType {
        match self {
            ImageType::Tex1d => ImageViewType::Tex1d,
            ImageType::Tex2d => ImageViewType::Tex2d,
            ImageType::Tex3d => ImageViewType::Tex3d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageViewType {
    Tex1d,
    Tex2d,
    Tex3d,
}

impl ImageViewType {
    pub fn to_vk(self) -> vk::ImageViewType {
        match self {
            ImageViewType::Tex1d => vk::ImageViewType::TYPE_1D,
            ImageViewType::Tex2d => vk::ImageViewType::TYPE_2D,
            ImageViewType::Tex3d => vk::ImageViewType::TYPE_3D,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    Preinitialized,
    General,
    ColourAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    ShaderReadOnlyOptimal,
    TransferSourceOptimal,
    TransferDestinationOptimal,
    PresentSource,
}

impl ImageLayout {
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColourAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachmentOptimal => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSourceOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDestinationOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::PresentSource => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

///Image formats. The depth and stencil variants are abstract, the device picks the first supported
/// concrete format from [ImageFormat::candidates].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    R8Unorm,
    R8G8Unorm,
    R8G8B8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16G16B16A16Sfloat,
    R32G32B32A32Sfloat,
    DepthStencil,
    DepthOnly,
    StencilOnly,
}

impl ImageFormat {
    ///Concrete formats that can back `self`, in order of preference.
    pub fn candidates(self) -> &'static [vk::Format] {
        match self {
            ImageFormat::R8Unorm => &[vk::Format::R8_UNORM],
            ImageFormat::R8G8Unorm => &[vk::Format::R8G8_UNORM],
            ImageFormat::R8G8B8Unorm => &[vk::Format::R8G8B8_UNORM],
            ImageFormat::R8G8B8A8Unorm => &[vk::Format::R8G8B8A8_UNORM],
            ImageFormat::R8G8B8A8Srgb => &[vk::Format::R8G8B8A8_SRGB],
            ImageFormat::B8G8R8A8Unorm => &[vk::Format::B8G8R8A8_UNORM],
            ImageFormat::B8G8R8A8Srgb => &[vk::Format::B8G8R8A8_SRGB],
            ImageFormat::R16G16B16A16Sfloat => &[vk::Format::R16G16B16A16_SFLOAT],
            ImageFormat::R32G32B32A32Sfloat => &[vk::Format::R32G32B32A32_SFLOAT],
            ImageFormat::DepthStencil => &[
                vk::Format::D24_UNORM_S8_UINT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D16_UNORM_S8_UINT,
            ],
            ImageFormat::DepthOnly => &[
                vk::Format::D32_SFLOAT,
                vk::Format::X8_D24_UNORM_PACK32,
                vk::Format::D16_UNORM,
            ],
            ImageFormat::StencilOnly => &[
                vk::Format::S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
                vk::Format::D32_SFLOAT_S8_UINT,
            ],
        }
    }

    ///Reverse lookup for the colour formats. Abstract depth/stencil formats are never returned.
    pub fn from_vk(format: vk::Format) -> Option<Self> {
        match format {
            vk::Format::R8_UNORM => Some(ImageFormat::R8Unorm),
            vk::Format::R8G8_UNORM => Some(ImageFormat::R8G8Unorm),
            vk::Format::R8G8B8_UNORM => Some(ImageFormat::R8G8B8Unorm),
            vk::Format::R8G8B8A8_UNORM => Some(ImageFormat::R8G8B8A8Unorm),
            vk::Format::R8G8B8A8_SRGB => Some(ImageFormat::R8G8B8A8Srgb),
            vk::Format::B8G8R8A8_UNORM => Some(ImageFormat::B8G8R8A8Unorm),
            vk::Format::B8G8R8A8_SRGB => Some(ImageFormat::B8G8R8A8Srgb),
            vk::Format::R16G16B16A16_SFLOAT => Some(ImageFormat::R16G16B16A16Sfloat),
            vk::Format::R32G32B32A32_SFLOAT => Some(ImageFormat::R32G32B32A32Sfloat),
            _ => None,
        }
    }

    ///Bytes per texel of the colour formats. `None` for the abstract depth/stencil formats, whose size depends on
    /// the concrete format the device picked.
    pub fn texel_size(self) -> Option<u64> {
        match self {
            ImageFormat::R8Unorm => Some(1),
            ImageFormat::R8G8Unorm => Some(2),
            ImageFormat::R8G8B8Unorm => Some(3),
            ImageFormat::R8G8B8A8Unorm
            | ImageFormat::R8G8B8A8Srgb
            | ImageFormat::B8G8R8A8Unorm
            | ImageFormat::B8G8R8A8Srgb => Some(4),
            ImageFormat::R16G16B16A16Sfloat => Some(8),
            ImageFormat::R32G32B32A32Sfloat => Some(16),
            ImageFormat::DepthStencil | ImageFormat::DepthOnly | ImageFormat::StencilOnly => None,
        }
    }

    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            ImageFormat::DepthStencil | ImageFormat::DepthOnly | ImageFormat::StencilOnly
        )
    }

    ///Aspect a view over the whole image of this format uses.
    pub fn aspect(self) -> ImageAspect {
        match self {
            ImageFormat::DepthStencil => ImageAspect::DEPTH | ImageAspect::STENCIL,
            ImageFormat::DepthOnly => ImageAspect::DEPTH,
            ImageFormat::StencilOnly => ImageAspect::STENCIL,
            _ => ImageAspect::COLOUR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleCount {
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
}

impl SampleCount {
    pub fn to_vk(self) -> vk::SampleCountFlags {
        match self {
            SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
            SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
            SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
            SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
            SampleCount::X16 => vk::SampleCountFlags::TYPE_16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

impl Filter {
    pub fn to_vk(self) -> vk::Filter {
        match self {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MipmapMode {
    Nearest,
    #[default]
    Linear,
}

impl MipmapMode {
    pub fn to_vk(self) -> vk::SamplerMipmapMode {
        match self {
            MipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
            MipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

impl AddressMode {
    pub fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BorderColour {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

impl BorderColour {
    pub fn to_vk(self) -> vk::BorderColor {
        match self {
            BorderColour::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            BorderColour::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
            BorderColour::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    Load,
    #[default]
    Clear,
    DontCare,
}

impl LoadOp {
    pub fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            LoadOp::Load => vk::AttachmentLoadOp::LOAD,
            LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    #[default]
    Store,
    DontCare,
}

impl StoreOp {
    pub fn to_vk(self) -> vk::AttachmentStoreOp {
        match self {
            StoreOp::Store => vk::AttachmentStoreOp::STORE,
            StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

impl IndexType {
    pub fn to_vk(self) -> vk::IndexType {
        match self {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

///Kind of resource a descriptor binding points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    ///Image view combined with a sampler.
    ImageSampler,
}

impl DescriptorKind {
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::ImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            DescriptorKind::UniformBuffer | DescriptorKind::StorageBuffer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColour,
    OneMinusSrcColour,
    DstColour,
    OneMinusDstColour,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColour,
    OneMinusConstantColour,
}

impl BlendFactor {
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcColour => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrcColour => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::DstColour => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDstColour => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
            BlendFactor::ConstantColour => vk::BlendFactor::CONSTANT_COLOR,
            BlendFactor::OneMinusConstantColour => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendOp {
    pub fn to_vk(self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

///Which faces are culled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    ///Nothing is culled.
    #[default]
    Never,
    Front,
    Back,
    ///Front and back faces are culled.
    Always,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::Never => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::Always => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

///Operation applied to a stencil value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

impl StencilOp {
    pub fn to_vk(self) -> vk::StencilOp {
        match self {
            StencilOp::Keep => vk::StencilOp::KEEP,
            StencilOp::Zero => vk::StencilOp::ZERO,
            StencilOp::Replace => vk::StencilOp::REPLACE,
            StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            StencilOp::Invert => vk::StencilOp::INVERT,
            StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
            StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl Topology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Topology::PointList => vk::PrimitiveTopology::POINT_LIST,
            Topology::LineList => vk::PrimitiveTopology::LINE_LIST,
            Topology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Topology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            Topology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

///32bit vertex attribute formats with one to four components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float1,
    Float2,
    Float3,
    Float4,
    Int1,
    Int2,
    Int3,
    Int4,
    Uint1,
    Uint2,
    Uint3,
    Uint4,
}

impl VertexFormat {
    pub fn to_vk(self) -> vk::Format {
        match self {
            VertexFormat::Float1 => vk::Format::R32_SFLOAT,
            VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
            VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
            VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
            VertexFormat::Int1 => vk::Format::R32_SINT,
            VertexFormat::Int2 => vk::Format::R32G32_SINT,
            VertexFormat::Int3 => vk::Format::R32G32B32_SINT,
            VertexFormat::Int4 => vk::Format::R32G32B32A32_SINT,
            VertexFormat::Uint1 => vk::Format::R32_UINT,
            VertexFormat::Uint2 => vk::Format::R32G32_UINT,
            VertexFormat::Uint3 => vk::Format::R32G32B32_UINT,
            VertexFormat::Uint4 => vk::Format::R32G32B32A32_UINT,
        }
    }

    ///Size of one attribute in bytes.
    pub fn size(self) -> u32 {
        let components = match self {
            VertexFormat::Float1 | VertexFormat::Int1 | VertexFormat::Uint1 => 1,
            VertexFormat::Float2 | VertexFormat::Int2 | VertexFormat::Uint2 => 2,
            VertexFormat::Float3 | VertexFormat::Int3 | VertexFormat::Uint3 => 3,
            VertexFormat::Float4 | VertexFormat::Int4 | VertexFormat::Uint4 => 4,
        };
        components * 4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

impl VertexInputRate {
    pub fn to_vk(self) -> vk::VertexInputRate {
        match self {
            VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
            VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
        }
    }
}

///Pipeline kind a descriptor set is bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindPoint {
    Graphics,
    Compute,
}

impl BindPoint {
    pub fn to_vk(self) -> vk::PipelineBindPoint {
        match self {
            BindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            BindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

///Single programmable stage of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_usage_translates_every_bit() {
        let usage = BufferUsage::all().to_vk();
        assert_eq!(
            usage,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER
                | vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(BufferUsage::empty().to_vk(), vk::BufferUsageFlags::empty());
    }

    #[test]
    fn family_flags_imply_transfer() {
        assert_eq!(
            QueueFlags::from_family(vk::QueueFlags::GRAPHICS),
            QueueFlags::GRAPHICS | QueueFlags::TRANSFER
        );
        assert_eq!(
            QueueFlags::from_family(vk::QueueFlags::COMPUTE | vk::QueueFlags::SPARSE_BINDING),
            QueueFlags::COMPUTE | QueueFlags::TRANSFER
        );
        assert_eq!(
            QueueFlags::from_family(vk::QueueFlags::TRANSFER),
            QueueFlags::TRANSFER
        );
        assert!(!QueueFlags::from_family(vk::QueueFlags::GRAPHICS).contains(QueueFlags::PRESENT));
    }

    #[test]
    fn stages_translate_partially() {
        let stages = PipelineStages::TRANSFER | PipelineStages::COLOUR_ATTACHMENT_OUTPUT;
        assert_eq!(
            stages.to_vk(),
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            (ShaderStages::VERTEX | ShaderStages::FRAGMENT).to_vk(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn colour_formats_round_trip_through_lookup() {
        for format in [
            ImageFormat::R8Unorm,
            ImageFormat::R8G8B8A8Unorm,
            ImageFormat::B8G8R8A8Srgb,
            ImageFormat::R32G32B32A32Sfloat,
        ] {
            assert_eq!(ImageFormat::from_vk(format.candidates()[0]), Some(format));
            assert_eq!(format.aspect(), ImageAspect::COLOUR);
        }
        assert_eq!(ImageFormat::from_vk(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn depth_formats_are_abstract() {
        assert!(ImageFormat::DepthStencil.is_depth_stencil());
        assert_eq!(
            ImageFormat::DepthStencil.aspect(),
            ImageAspect::DEPTH | ImageAspect::STENCIL
        );
        assert!(ImageFormat::DepthOnly.candidates().len() > 1);
        assert!(!ImageFormat::B8G8R8A8Unorm.is_depth_stencil());
    }

    #[test]
    fn vertex_format_sizes() {
        assert_eq!(VertexFormat::Float1.size(), 4);
        assert_eq!(VertexFormat::Float3.size(), 12);
        assert_eq!(VertexFormat::Uint4.size(), 16);
    }

    #[test]
    fn cull_mode_never_culls_nothing() {
        assert_eq!(CullMode::Never.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Always.to_vk(), vk::CullModeFlags::FRONT_AND_BACK);
    }
}
