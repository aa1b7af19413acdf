use std::convert::TryFrom;

use bitflags::bitflags;
use num_traits::FromPrimitive;
use spirv_headers as spv;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct InvalidEnumValue(pub u32);

impl std::fmt::Display for InvalidEnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "invalid enum value: {}", self.0)
    }
}

impl std::error::Error for InvalidEnumValue {}

macro_rules! impl_enum {
    (
        $name:ident {
            $($member:ident = $value:expr => $display:expr,)*
        }
    ) => {
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $($member = $value,)*
        }

        impl $name {
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$member => $display,)*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl From<$name> for u32 {
            fn from(val: $name) -> Self {
                val as _
            }
        }

        impl TryFrom<u32> for $name {
            type Error = InvalidEnumValue;
            fn try_from(val: u32) -> Result<Self, Self::Error> {
                match val {
                    $(x if x == $value => Ok(Self::$member),)*
                    _ => Err(InvalidEnumValue(val)),
                }
            }
        }
    };
}

macro_rules! impl_enums {
    ($($name:ident $body:tt)*) => {
        $(impl_enum! { $name $body })*
    }
}

impl_enums! {
    SourceLanguage {
        Unknown = 0 => "Unknown",
        Essl = 1 => "ESSL",
        Glsl = 2 => "GLSL",
        OpenClC = 3 => "OpenCL_C",
        OpenClCpp = 4 => "OpenCL_CPP",
        Hlsl = 5 => "HLSL",
        CppForOpenCl = 6 => "CPP_for_OpenCL",
        Sycl = 7 => "SYCL",
        HeroC = 8 => "HERO_C",
        Nzsl = 9 => "NZSL",
        Wgsl = 10 => "WGSL",
        Slang = 11 => "Slang",
        Zig = 12 => "Zig",
    }
    // Values follow VkDescriptorType.
    DescriptorType {
        Sampler = 0 => "Sampler",
        CombinedImageSampler = 1 => "CombinedImageSampler",
        SampledImage = 2 => "SampledImage",
        StorageImage = 3 => "StorageImage",
        UniformTexelBuffer = 4 => "UniformTexelBuffer",
        StorageTexelBuffer = 5 => "StorageTexelBuffer",
        UniformBuffer = 6 => "UniformBuffer",
        StorageBuffer = 7 => "StorageBuffer",
        InputAttachment = 10 => "InputAttachment",
        AccelerationStructure = 1000150000 => "AccelerationStructure",
    }
}

impl Default for SourceLanguage {
    fn default() -> Self {
        Self::Unknown
    }
}

impl SourceLanguage {
    /// Unrecognized language values map to `Unknown`.
    pub fn from_raw(val: u32) -> Self {
        Self::try_from(val).unwrap_or(Self::Unknown)
    }
}

impl DescriptorType {
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::UniformBuffer | Self::StorageBuffer)
    }

    pub fn is_image(self) -> bool {
        matches!(
            self,
            Self::CombinedImageSampler
                | Self::SampledImage
                | Self::StorageImage
                | Self::UniformTexelBuffer
                | Self::StorageTexelBuffer
                | Self::InputAttachment
        )
    }
}

bitflags! {
    /// Shader stage bits, numbered like VkShaderStageFlagBits.
    #[derive(Default)]
    pub struct ShaderStage: u32 {
        const VERTEX = 0x0000_0001;
        const TESSELLATION_CONTROL = 0x0000_0002;
        const TESSELLATION_EVALUATION = 0x0000_0004;
        const GEOMETRY = 0x0000_0008;
        const FRAGMENT = 0x0000_0010;
        const COMPUTE = 0x0000_0020;
        const TASK = 0x0000_0040;
        const MESH = 0x0000_0080;
        const RAYGEN = 0x0000_0100;
        const ANY_HIT = 0x0000_0200;
        const CLOSEST_HIT = 0x0000_0400;
        const MISS = 0x0000_0800;
        const INTERSECTION = 0x0000_1000;
        const CALLABLE = 0x0000_2000;
    }
}

// Execution models introduced by vendor extensions, by raw value.
const EXTENSION_STAGES: &[(u32, ShaderStage)] = &[
    (5267, ShaderStage::TASK),
    (5268, ShaderStage::MESH),
    (5313, ShaderStage::RAYGEN),
    (5314, ShaderStage::INTERSECTION),
    (5315, ShaderStage::ANY_HIT),
    (5316, ShaderStage::CLOSEST_HIT),
    (5317, ShaderStage::MISS),
    (5318, ShaderStage::CALLABLE),
    (5364, ShaderStage::TASK),
    (5365, ShaderStage::MESH),
];

impl ShaderStage {
    /// Empty for execution models with no shader stage.
    pub fn from_execution_model(model: u32) -> Self {
        use spv::ExecutionModel as Em;
        match Em::from_u32(model) {
            Some(Em::Vertex) => return Self::VERTEX,
            Some(Em::TessellationControl) => return Self::TESSELLATION_CONTROL,
            Some(Em::TessellationEvaluation) => return Self::TESSELLATION_EVALUATION,
            Some(Em::Geometry) => return Self::GEOMETRY,
            Some(Em::Fragment) => return Self::FRAGMENT,
            Some(Em::GLCompute) | Some(Em::Kernel) => return Self::COMPUTE,
            _ => {},
        }
        EXTENSION_STAGES.iter()
            .find(|&&(raw, _)| raw == model)
            .map_or_else(Self::empty, |&(_, stage)| stage)
    }

    /// Name of a single stage bit.
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::VERTEX => "Vertex",
            Self::TESSELLATION_CONTROL => "TessellationControl",
            Self::TESSELLATION_EVALUATION => "TessellationEvaluation",
            Self::GEOMETRY => "Geometry",
            Self::FRAGMENT => "Fragment",
            Self::COMPUTE => "Compute",
            Self::TASK => "Task",
            Self::MESH => "Mesh",
            Self::RAYGEN => "RayGeneration",
            Self::ANY_HIT => "AnyHit",
            Self::CLOSEST_HIT => "ClosestHit",
            Self::MISS => "Miss",
            Self::INTERSECTION => "Intersection",
            Self::CALLABLE => "Callable",
            _ => return None,
        })
    }
}
