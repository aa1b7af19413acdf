//! Reflected records handed out by `Module`.
use derivative::Derivative;
use num_traits::FromPrimitive;
use spirv_headers as spv;

use crate::*;

/// Descriptor count reported for runtime-sized arrays.
pub const UNBOUNDED_COUNT: u32 = 0;

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ImageTraits {
    pub sampled_type: Id,
    /// Raw `Dim` enumerant.
    pub dim: u32,
    /// 0: not depth, 1: depth, 2: unknown.
    pub depth: u32,
    pub arrayed: bool,
    pub multisampled: bool,
    /// 0: known at run time, 1: used with a sampler, 2: storage image.
    pub sampled: u32,
    pub format: u32,
    pub access_qualifier: Option<u32>,
}

impl ImageTraits {
    pub fn dim(&self) -> Option<spv::Dim> {
        spv::Dim::from_u32(self.dim)
    }

    pub fn image_format(&self) -> Option<spv::ImageFormat> {
        spv::ImageFormat::from_u32(self.format)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ScalarTraits {
    /// Bit width; zero for non-numeric types.
    pub width: u32,
    pub signed: bool,
    pub float: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct NumericTraits {
    pub scalar: ScalarTraits,
    /// Components of a vector, or of each column of a matrix.
    pub component_count: u32,
    /// Zero unless the type is a matrix.
    pub column_count: u32,
    pub row_count: u32,
    pub matrix_stride: Option<u32>,
}

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ArrayTraits {
    /// Outermost dimension first. Runtime arrays contribute
    /// `UNBOUNDED_COUNT`.
    pub dims: Vec<u32>,
    pub stride: Option<u32>,
}

impl ArrayTraits {
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    pub fn is_unbounded(&self) -> bool {
        self.dims.contains(&UNBOUNDED_COUNT)
    }

    /// Total element count, or `UNBOUNDED_COUNT` if any dimension is
    /// runtime-sized. `None` if the product does not fit in a `u32`.
    pub fn element_count(&self) -> Option<u32> {
        if self.is_unbounded() {
            return Some(UNBOUNDED_COUNT);
        }
        self.dims.iter().try_fold(1u32, |count, &dim| count.checked_mul(dim))
    }
}

/// A member of a buffer block, recursively.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlockVariable {
    pub name: Option<String>,
    pub ty: Id,
    /// Offset relative to the enclosing struct.
    pub offset: u32,
    /// Offset relative to the outermost block.
    pub absolute_offset: u32,
    pub size: u32,
    /// Size up to the start of the next member.
    pub padded_size: u32,
    pub numeric: NumericTraits,
    pub array: ArrayTraits,
    pub row_major: bool,
    pub members: Vec<BlockVariable>,
}

#[derive(Clone, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub struct DescriptorBinding {
    pub set: u32,
    pub binding: u32,
    #[derivative(Default(value = "DescriptorType::UniformBuffer"))]
    pub descriptor_type: DescriptorType,
    /// Number of descriptors; `UNBOUNDED_COUNT` for runtime arrays.
    pub count: u32,
    pub name: Option<String>,
    /// Debug name of the resource's element type, e.g. the block name.
    pub type_name: Option<String>,
    pub variable: Id,
    pub storage_class: u32,
    pub array: ArrayTraits,
    /// Layout of uniform and storage buffers.
    pub block: Option<BlockVariable>,
    pub image: Option<ImageTraits>,
    pub input_attachment_index: Option<u32>,
    /// Statically used by some entry point.
    pub accessed: bool,
}

impl DescriptorBinding {
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn is_unbounded(&self) -> bool {
        self.count == UNBOUNDED_COUNT
    }

    pub fn storage_class(&self) -> Option<spv::StorageClass> {
        spv::StorageClass::from_u32(self.storage_class)
    }
}

/// Bindings sharing a descriptor set, in binding order.
#[derive(Clone, Debug)]
pub struct DescriptorSet<'m> {
    pub set: u32,
    pub bindings: Vec<&'m DescriptorBinding>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PushConstantMember {
    pub name: Option<String>,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PushConstantBlock {
    pub name: Option<String>,
    pub type_name: Option<String>,
    pub variable: Id,
    /// Smallest member offset.
    pub offset: u32,
    /// Extent from `offset` to the end of the last member.
    pub size: u32,
    pub members: Vec<PushConstantMember>,
    pub accessed: bool,
}

#[derive(Clone, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub struct InterfaceVariable {
    pub variable: Id,
    pub name: Option<String>,
    pub ty: Id,
    #[derivative(Default(value = "spv::StorageClass::Input"))]
    pub storage_class: spv::StorageClass,
    pub location: Option<u32>,
    pub component: Option<u32>,
    pub built_in: Option<u32>,
    pub numeric: NumericTraits,
    pub array: ArrayTraits,
}

impl InterfaceVariable {
    pub fn built_in(&self) -> Option<spv::BuiltIn> {
        self.built_in.and_then(spv::BuiltIn::from_u32)
    }

    pub fn is_built_in(&self) -> bool {
        self.built_in.is_some()
    }
}

#[derive(Clone, Debug, Derivative, Eq, PartialEq)]
#[derivative(Default)]
pub struct EntryPoint {
    pub name: String,
    #[derivative(Default(value = "spv::ExecutionModel::Vertex as u32"))]
    pub execution_model: u32,
    pub stage: ShaderStage,
    pub function: Id,
    /// Interface ids exactly as listed by the entry point.
    pub interface: Vec<Id>,
    pub inputs: Vec<InterfaceVariable>,
    pub outputs: Vec<InterfaceVariable>,
    /// Compute workgroup size from `LocalSize` or `LocalSizeId`.
    pub local_size: Option<[u32; 3]>,
    /// Raw execution modes with their literal operands.
    pub execution_modes: Vec<(u32, Vec<u32>)>,
    /// Global variables reachable from the entry function, ascending.
    pub used_variables: Vec<Id>,
}

impl EntryPoint {
    pub fn execution_model(&self) -> Option<spv::ExecutionModel> {
        spv::ExecutionModel::from_u32(self.execution_model)
    }

    pub fn uses(&self, variable: Id) -> bool {
        self.used_variables.binary_search(&variable).is_ok()
    }
}
