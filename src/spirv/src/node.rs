//! Typed decoding of the instructions the graph builder understands.
use derive_more::Display;
use spirv_headers as spv;

use crate::*;
use crate::decoder::{Instruction, Operands};

pub(crate) trait Parse: Sized {
    fn parse(operands: &mut Operands<'_>) -> Result<Self>;
}

impl Parse for u32 {
    fn parse(operands: &mut Operands<'_>) -> Result<Self> {
        operands.consume()
    }
}

impl Parse for bool {
    fn parse(operands: &mut Operands<'_>) -> Result<Self> {
        Ok(operands.consume()? != 0)
    }
}

impl Parse for String {
    fn parse(operands: &mut Operands<'_>) -> Result<Self> {
        operands.parse_string()
    }
}

impl<T: Parse> Parse for Vec<T> {
    fn parse(operands: &mut Operands<'_>) -> Result<Self> {
        operands.parse_many()
    }
}

impl<T: Parse> Parse for Option<T> {
    fn parse(operands: &mut Operands<'_>) -> Result<Self> {
        operands.parse_option()
    }
}

macro_rules! impl_parseable {
    (
        $name:ident {
            $($member:ident: $type:ty),*$(,)?
        }
    ) => {
        #[allow(dead_code)]
        #[derive(Clone, Debug, Default, Eq, PartialEq)]
        pub(crate) struct $name {
            $(pub(crate) $member: $type,)*
        }

        impl Parse for $name {
            #[allow(unused_variables)]
            fn parse(operands: &mut Operands<'_>) -> Result<Self> {
                Ok($name {
                    $($member: operands.parse()?,)*
                })
            }
        }
    };
}

macro_rules! impl_parseables {
    (
        $(
            $name:ident {
                $($member:ident: $type:ty),*$(,)?
            }
        )*
    ) => {
        $(
            impl_parseable! {
                $name { $($member: $type),* }
            }
        )*
    }
}

// Enumerant operands (storage classes, decorations, dims, ...) are kept
// as raw words so values newer than the bundled grammar survive decoding.
impl_parseables! {
    Source {
        language: u32,
        version: u32,
        file: Option<Id>,
        source: Option<String>,
    }
    SourceExtension {
        extension: String,
    }
    Name {
        target: Id,
        name: String,
    }
    MemberName {
        ty: Id,
        member: u32,
        name: String,
    }
    SpvString {
        result: Id,
        value: String,
    }
    Extension {
        name: String,
    }
    ExtInstImport {
        result: Id,
        name: String,
    }
    MemoryModel {
        addressing_model: u32,
        memory_model: u32,
    }
    EntryPoint {
        execution_model: u32,
        function: Id,
        name: String,
        interface: Vec<Id>,
    }
    ExecutionMode {
        entry_point: Id,
        mode: u32,
        operands: Vec<u32>,
    }
    Capability {
        capability: u32,
    }
    TypeVoid {
        result: Id,
    }
    TypeBool {
        result: Id,
    }
    TypeInt {
        result: Id,
        width: u32,
        signed: bool,
    }
    TypeFloat {
        result: Id,
        width: u32,
    }
    TypeVector {
        result: Id,
        component_type: Id,
        component_count: u32,
    }
    TypeMatrix {
        result: Id,
        column_type: Id,
        column_count: u32,
    }
    TypeImage {
        result: Id,
        sampled_type: Id,
        dim: u32,
        depth: u32,
        arrayed: bool,
        multisampled: bool,
        sampled: u32,
        format: u32,
        access_qualifier: Option<u32>,
    }
    TypeSampler {
        result: Id,
    }
    TypeSampledImage {
        result: Id,
        image: Id,
    }
    TypeArray {
        result: Id,
        elem: Id,
        length: Id,
    }
    TypeRuntimeArray {
        result: Id,
        elem: Id,
    }
    TypeStruct {
        result: Id,
        members: Vec<Id>,
    }
    TypeOpaque {
        result: Id,
        name: String,
    }
    TypeAccelerationStructure {
        result: Id,
    }
    TypeRayQuery {
        result: Id,
    }
    TypePointer {
        result: Id,
        storage_class: u32,
        target: Id,
    }
    TypeForwardPointer {
        pointer: Id,
        storage_class: u32,
    }
    TypeFunction {
        result: Id,
        ret: Id,
        params: Vec<Id>,
    }
    ConstantBool {
        ty: Id,
        result: Id,
    }
    Constant {
        ty: Id,
        result: Id,
        value: Vec<u32>,
    }
    ConstantComposite {
        ty: Id,
        result: Id,
        constituents: Vec<Id>,
    }
    ConstantOther {
        ty: Id,
        result: Id,
        operands: Vec<u32>,
    }
    Variable {
        ty: Id,
        result: Id,
        storage_class: u32,
        initializer: Option<Id>,
    }
    Function {
        ty: Id,
        result: Id,
        control: u32,
        function_type: Id,
    }
    FunctionEnd {}
    FunctionCall {
        ty: Id,
        result: Id,
        function: Id,
        arguments: Vec<Id>,
    }
    Decorate {
        target: Id,
        decoration: u32,
        operands: Vec<u32>,
    }
    MemberDecorate {
        ty: Id,
        member: u32,
        decoration: u32,
        operands: Vec<u32>,
    }
    DecorationGroup {
        result: Id,
    }
    GroupDecorate {
        group: Id,
        targets: Vec<Id>,
    }
    GroupMemberDecorate {
        group: Id,
        targets: Vec<u32>,
    }
}

macro_rules! impl_any_node {
    (
        $($op:ident => $node:ident,)*
        $(@box $box_op:ident => $box_node:ident,)*
    ) => {
        /// Tagged variant over every instruction the builder models.
        /// Several opcodes share a node shape; the opcode is kept
        /// alongside where the distinction matters.
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub(crate) enum AnyNode {
            $($op($node),)*
            $($box_op(Box<$box_node>),)*
        }

        impl AnyNode {
            /// Returns `Ok(None)` for opcodes without a node.
            pub(crate) fn parse(inst: &Instruction<'_>) -> Result<Option<Self>> {
                let mut operands = inst.operands();
                Ok(match inst.op() {
                    $(Some(spv::Op::$op) =>
                        Some(Self::$op(operands.parse()?)),)*
                    $(Some(spv::Op::$box_op) =>
                        Some(Self::$box_op(Box::new(operands.parse()?))),)*
                    _ => None,
                })
            }
        }
    }
}

impl_any_node! {
    Source => Source,
    SourceExtension => SourceExtension,
    Name => Name,
    MemberName => MemberName,
    String => SpvString,
    Extension => Extension,
    ExtInstImport => ExtInstImport,
    MemoryModel => MemoryModel,
    EntryPoint => EntryPoint,
    ExecutionMode => ExecutionMode,
    ExecutionModeId => ExecutionMode,
    Capability => Capability,
    TypeVoid => TypeVoid,
    TypeBool => TypeBool,
    TypeInt => TypeInt,
    TypeFloat => TypeFloat,
    TypeVector => TypeVector,
    TypeMatrix => TypeMatrix,
    TypeSampler => TypeSampler,
    TypeSampledImage => TypeSampledImage,
    TypeArray => TypeArray,
    TypeRuntimeArray => TypeRuntimeArray,
    TypeStruct => TypeStruct,
    TypeOpaque => TypeOpaque,
    TypeAccelerationStructureNV => TypeAccelerationStructure,
    TypeRayQueryProvisionalKHR => TypeRayQuery,
    TypePointer => TypePointer,
    TypeForwardPointer => TypeForwardPointer,
    TypeFunction => TypeFunction,
    ConstantTrue => ConstantBool,
    ConstantFalse => ConstantBool,
    Constant => Constant,
    ConstantComposite => ConstantComposite,
    ConstantNull => ConstantOther,
    ConstantSampler => ConstantOther,
    SpecConstantTrue => ConstantBool,
    SpecConstantFalse => ConstantBool,
    SpecConstant => Constant,
    SpecConstantComposite => ConstantComposite,
    SpecConstantOp => ConstantOther,
    Undef => ConstantOther,
    Variable => Variable,
    Function => Function,
    FunctionEnd => FunctionEnd,
    FunctionCall => FunctionCall,
    Decorate => Decorate,
    DecorateId => Decorate,
    MemberDecorate => MemberDecorate,
    DecorationGroup => DecorationGroup,
    GroupDecorate => GroupDecorate,
    GroupMemberDecorate => GroupMemberDecorate,
    @box TypeImage => TypeImage,
}

/// Module-level opcodes that carry nothing reflection needs.
pub(crate) const IGNORED_OPS: &[spv::Op] = &[
    spv::Op::Nop,
    spv::Op::SourceContinued,
    spv::Op::Line,
    spv::Op::NoLine,
    spv::Op::ModuleProcessed,
    // Non-semantic debug info lives in global OpExtInst instructions.
    spv::Op::ExtInst,
];

/// Opcodes whose result Id is their first operand rather than the second.
const RESULT_FIRST_OPS: &[spv::Op] = &[
    spv::Op::Label,
    spv::Op::String,
    spv::Op::ExtInstImport,
    spv::Op::DecorationGroup,
    spv::Op::TypeEvent,
    spv::Op::TypeDeviceEvent,
    spv::Op::TypeReserveId,
    spv::Op::TypeQueue,
    spv::Op::TypePipe,
    spv::Op::TypePipeStorage,
    spv::Op::TypeNamedBarrier,
    spv::Op::TypeCooperativeMatrixNV,
    spv::Op::TypeVmeImageINTEL,
];

/// Intel motion estimation types, 5701 through 5712.
const AVC_TYPE_OPS: std::ops::RangeInclusive<u32> =
    spv::Op::TypeAvcImePayloadINTEL as u32..=spv::Op::TypeAvcSicResultINTEL as u32;

/// Opcodes that produce no result Id.
const NO_RESULT_OPS: &[spv::Op] = &[
    spv::Op::Nop,
    spv::Op::SourceContinued,
    spv::Op::Source,
    spv::Op::SourceExtension,
    spv::Op::Name,
    spv::Op::MemberName,
    spv::Op::Line,
    spv::Op::NoLine,
    spv::Op::ModuleProcessed,
    spv::Op::Extension,
    spv::Op::MemoryModel,
    spv::Op::EntryPoint,
    spv::Op::ExecutionMode,
    spv::Op::ExecutionModeId,
    spv::Op::Capability,
    spv::Op::TypeForwardPointer,
    spv::Op::FunctionEnd,
    spv::Op::Decorate,
    spv::Op::DecorateId,
    spv::Op::DecorateString,
    spv::Op::MemberDecorate,
    spv::Op::MemberDecorateString,
    spv::Op::GroupDecorate,
    spv::Op::GroupMemberDecorate,
    spv::Op::Store,
    spv::Op::CopyMemory,
    spv::Op::CopyMemorySized,
    spv::Op::ImageWrite,
    spv::Op::AtomicStore,
    spv::Op::AtomicFlagClear,
    spv::Op::EmitVertex,
    spv::Op::EndPrimitive,
    spv::Op::EmitStreamVertex,
    spv::Op::EndStreamPrimitive,
    spv::Op::ControlBarrier,
    spv::Op::MemoryBarrier,
    spv::Op::MemoryNamedBarrier,
    spv::Op::LoopMerge,
    spv::Op::SelectionMerge,
    spv::Op::Branch,
    spv::Op::BranchConditional,
    spv::Op::Switch,
    spv::Op::Kill,
    spv::Op::Return,
    spv::Op::ReturnValue,
    spv::Op::Unreachable,
    spv::Op::LifetimeStart,
    spv::Op::LifetimeStop,
    spv::Op::GroupWaitEvents,
    spv::Op::CommitReadPipe,
    spv::Op::CommitWritePipe,
    spv::Op::GroupCommitReadPipe,
    spv::Op::GroupCommitWritePipe,
    spv::Op::RetainEvent,
    spv::Op::ReleaseEvent,
    spv::Op::SetUserEventStatus,
    spv::Op::CaptureEventProfilingInfo,
    spv::Op::RayQueryInitializeKHR,
    spv::Op::RayQueryTerminateKHR,
    spv::Op::RayQueryGenerateIntersectionKHR,
    spv::Op::RayQueryConfirmIntersectionKHR,
    spv::Op::IgnoreIntersectionNV,
    spv::Op::TerminateRayNV,
    spv::Op::TraceNV,
    spv::Op::ExecuteCallableNV,
    spv::Op::WritePackedPrimitiveIndices4x8NV,
    spv::Op::CooperativeMatrixStoreNV,
    spv::Op::BeginInvocationInterlockEXT,
    spv::Op::EndInvocationInterlockEXT,
    spv::Op::DemoteToHelperInvocationEXT,
    spv::Op::SubgroupBlockWriteINTEL,
    spv::Op::SubgroupImageBlockWriteINTEL,
    spv::Op::SubgroupImageMediaBlockWriteINTEL,
];

/// The result Id an instruction defines, if any. Everything not listed
/// above follows the common `<result type> <result>` layout, which is
/// also assumed for opcodes newer than the bundled grammar.
pub(crate) fn result_id(inst: &Instruction<'_>) -> Option<Id> {
    let position = match inst.op() {
        Some(op) if NO_RESULT_OPS.contains(&op) => return None,
        Some(op) if RESULT_FIRST_OPS.contains(&op) => 0,
        _ if AVC_TYPE_OPS.contains(&u32::from(inst.opcode())) => 0,
        _ => 1,
    };
    inst.operand_words().get(position).copied().filter(|&id| id != 0)
}

/// Operand positions of the pointers a function-body instruction reads or
/// writes through. Positions count from the first word after the opcode.
pub(crate) const POINTER_OPERANDS: &[(spv::Op, &[usize])] = &[
    (spv::Op::Load, &[2]),
    (spv::Op::Store, &[0]),
    (spv::Op::CopyMemory, &[0, 1]),
    (spv::Op::CopyMemorySized, &[0, 1]),
    (spv::Op::AccessChain, &[2]),
    (spv::Op::InBoundsAccessChain, &[2]),
    (spv::Op::PtrAccessChain, &[2]),
    (spv::Op::InBoundsPtrAccessChain, &[2]),
    (spv::Op::CopyObject, &[2]),
    (spv::Op::ImageTexelPointer, &[2]),
    (spv::Op::ArrayLength, &[2]),
    (spv::Op::AtomicLoad, &[2]),
    (spv::Op::AtomicStore, &[0]),
    (spv::Op::AtomicExchange, &[2]),
    (spv::Op::AtomicCompareExchange, &[2]),
    (spv::Op::AtomicCompareExchangeWeak, &[2]),
    (spv::Op::AtomicIIncrement, &[2]),
    (spv::Op::AtomicIDecrement, &[2]),
    (spv::Op::AtomicIAdd, &[2]),
    (spv::Op::AtomicISub, &[2]),
    (spv::Op::AtomicSMin, &[2]),
    (spv::Op::AtomicUMin, &[2]),
    (spv::Op::AtomicSMax, &[2]),
    (spv::Op::AtomicUMax, &[2]),
    (spv::Op::AtomicAnd, &[2]),
    (spv::Op::AtomicOr, &[2]),
    (spv::Op::AtomicXor, &[2]),
];

/// Instructions whose result is a pointer derived from operand 2.
pub(crate) const DERIVED_POINTER_OPS: &[spv::Op] = &[
    spv::Op::AccessChain,
    spv::Op::InBoundsAccessChain,
    spv::Op::PtrAccessChain,
    spv::Op::InBoundsPtrAccessChain,
    spv::Op::CopyObject,
];

pub(crate) fn pointer_operands(op: spv::Op) -> &'static [usize] {
    POINTER_OPERANDS.iter()
        .find(|&&(other, _)| other == op)
        .map(|&(_, positions)| positions)
        .unwrap_or(&[])
}

/// Vendor tag of an imported extended instruction set.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
pub enum ExtInstSet {
    #[display(fmt = "GLSL.std.450")]
    GlslStd450,
    #[display(fmt = "OpenCL.std")]
    OpenClStd,
    #[display(fmt = "OpenCL.DebugInfo.100")]
    OpenClDebugInfo100,
    #[display(fmt = "DebugInfo")]
    DebugInfo,
    #[display(fmt = "NonSemantic.Shader.DebugInfo.100")]
    ShaderDebugInfo100,
    #[display(fmt = "NonSemantic.DebugPrintf")]
    DebugPrintf,
    #[display(fmt = "SPV_AMD_shader_ballot")]
    AmdShaderBallot,
    #[display(fmt = "SPV_AMD_shader_explicit_vertex_parameter")]
    AmdShaderExplicitVertexParameter,
    #[display(fmt = "SPV_AMD_shader_trinary_minmax")]
    AmdShaderTrinaryMinmax,
    #[display(fmt = "SPV_AMD_gcn_shader")]
    AmdGcnShader,
    #[display(fmt = "{}", _0)]
    Unknown(String),
}

impl ExtInstSet {
    pub fn from_name(name: &str) -> Self {
        match name {
            "GLSL.std.450" => Self::GlslStd450,
            "OpenCL.std" => Self::OpenClStd,
            "OpenCL.DebugInfo.100" => Self::OpenClDebugInfo100,
            "DebugInfo" => Self::DebugInfo,
            "NonSemantic.Shader.DebugInfo.100" => Self::ShaderDebugInfo100,
            "NonSemantic.DebugPrintf" => Self::DebugPrintf,
            "SPV_AMD_shader_ballot" => Self::AmdShaderBallot,
            "SPV_AMD_shader_explicit_vertex_parameter" =>
                Self::AmdShaderExplicitVertexParameter,
            "SPV_AMD_shader_trinary_minmax" => Self::AmdShaderTrinaryMinmax,
            "SPV_AMD_gcn_shader" => Self::AmdGcnShader,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Non-semantic sets may be ignored without changing the meaning of
    /// the module.
    pub fn is_non_semantic(&self) -> bool {
        self.to_string().starts_with("NonSemantic.")
    }
}
