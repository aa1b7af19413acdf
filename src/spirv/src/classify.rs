//! Maps resource shapes to descriptor types.
use spirv_headers as spv;

use crate::*;

/// What a resource variable holds once arrays are peeled away.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Shape {
    Sampler,
    SampledImage,
    Image,
    TexelBuffer,
    SubpassData,
    Struct,
    AccelerationStructure,
    Other,
}

/// Refines a shape where the storage class alone is ambiguous.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Qualifier {
    Any,
    /// Image used with a sampler, or whose usage is known at run time.
    Sampled,
    /// Image declared with `Sampled = 2`.
    Storage,
    Block,
    BufferBlock,
}

type Row = (Shape, spv::StorageClass, Qualifier, DescriptorType);

const DESCRIPTOR_TABLE: &[Row] = {
    use spv::StorageClass::*;
    use DescriptorType as D;
    &[
        (Shape::Sampler, UniformConstant, Qualifier::Any, D::Sampler),
        (Shape::SampledImage, UniformConstant, Qualifier::Any, D::CombinedImageSampler),
        (Shape::SubpassData, UniformConstant, Qualifier::Any, D::InputAttachment),
        (Shape::TexelBuffer, UniformConstant, Qualifier::Sampled, D::UniformTexelBuffer),
        (Shape::TexelBuffer, UniformConstant, Qualifier::Storage, D::StorageTexelBuffer),
        (Shape::Image, UniformConstant, Qualifier::Sampled, D::SampledImage),
        (Shape::Image, UniformConstant, Qualifier::Storage, D::StorageImage),
        (Shape::Struct, Uniform, Qualifier::Block, D::UniformBuffer),
        (Shape::Struct, Uniform, Qualifier::BufferBlock, D::StorageBuffer),
        (Shape::Struct, StorageBuffer, Qualifier::Any, D::StorageBuffer),
        (Shape::AccelerationStructure, UniformConstant, Qualifier::Any,
            D::AccelerationStructure),
    ]
};

pub(crate) fn classify(shape: Shape, storage: spv::StorageClass, qualifier: Qualifier)
    -> Option<DescriptorType>
{
    DESCRIPTOR_TABLE.iter()
        .find(|&&(s, sc, q, _)| {
            s == shape && sc == storage && (q == Qualifier::Any || q == qualifier)
        })
        .map(|&(.., ty)| ty)
}

/// Determines the shape of a peeled resource type.
pub(crate) fn shape_of(graph: &Graph, ty: Id) -> Result<(Shape, Qualifier)> {
    Ok(match graph.resolve_type(ty)? {
        TypeNode::Sampler => (Shape::Sampler, Qualifier::Any),
        TypeNode::SampledImage { .. } => (Shape::SampledImage, Qualifier::Any),
        TypeNode::Image(image) => {
            let qualifier = if image.sampled == 2 {
                Qualifier::Storage
            } else {
                Qualifier::Sampled
            };
            let shape = match image.dim() {
                Some(spv::Dim::DimBuffer) => Shape::TexelBuffer,
                Some(spv::Dim::DimSubpassData) => Shape::SubpassData,
                _ => Shape::Image,
            };
            (shape, qualifier)
        },
        TypeNode::Struct { .. } => {
            let qualifier = if graph.decorations(ty).has(spv::Decoration::BufferBlock) {
                Qualifier::BufferBlock
            } else {
                Qualifier::Block
            };
            (Shape::Struct, qualifier)
        },
        TypeNode::AccelerationStructure => (Shape::AccelerationStructure, Qualifier::Any),
        _ => (Shape::Other, Qualifier::Any),
    })
}

/// Storage classes whose variables are bound through descriptor sets.
pub(crate) fn is_descriptor_storage(class: spv::StorageClass) -> bool {
    [
        spv::StorageClass::UniformConstant,
        spv::StorageClass::Uniform,
        spv::StorageClass::StorageBuffer,
    ].contains(&class)
}
