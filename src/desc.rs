//! Shader Interface Description
//!
//! Backend-neutral description of the variables, blocks and images a shader
//! exposes to the pipeline.
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Normalized variable type. The declaration order is significant: vector and
/// matrix types are found by offsetting from their scalar component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
pub enum VariableType {
    Unknown = 0,

    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat2x3,
    Mat2x4,
    Mat3,
    Mat3x2,
    Mat3x4,
    Mat4,
    Mat4x2,
    Mat4x3,

    Int,
    IVec2,
    IVec3,
    IVec4,

    Uint,
    UVec2,
    UVec3,
    UVec4,

    Double,
    DVec2,
    DVec3,
    DVec4,
    DMat2,
    DMat2x3,
    DMat2x4,
    DMat3,
    DMat3x2,
    DMat3x4,
    DMat4,
    DMat4x2,
    DMat4x3,

    Sampler1D,
    Sampler2D,
    Sampler2DMS,
    Sampler3D,
    SamplerCube,
    Sampler1DArray,
    Sampler2DArray,
    Sampler2DMSArray,
    Sampler3DArray,
    SamplerCubeArray,
    SamplerRect,
    SamplerBuffer,

    Image1D,
    Image2D,
    Image2DMS,
    Image3D,
    ImageCube,
    Image1DArray,
    Image2DArray,
    Image2DMSArray,
    Image3DArray,
    ImageCubeArray,
    ImageRect,
    ImageBuffer,

    Struct,
}
impl Default for VariableType {
    fn default() -> VariableType { VariableType::Unknown }
}
impl VariableType {
    /// The type `n` places after this one, or `Unknown` past the end.
    pub fn offset(self, n: u32) -> VariableType {
        VariableType::from_u32(self as u32 + n).unwrap_or(VariableType::Unknown)
    }
}

/// Storage image texel format. Values match SPIR-V image format enumerants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, Serialize, Deserialize)]
pub enum ImageFormat {
    Unknown = 0,
    Rgba32f = 1,
    Rgba16f = 2,
    R32f = 3,
    Rgba8 = 4,
    Rgba8Snorm = 5,
    Rg32f = 6,
    Rg16f = 7,
    R11fG11fB10f = 8,
    R16f = 9,
    Rgba16 = 10,
    Rgb10A2 = 11,
    Rg16 = 12,
    Rg8 = 13,
    R16 = 14,
    R8 = 15,
    Rgba16Snorm = 16,
    Rg16Snorm = 17,
    Rg8Snorm = 18,
    R16Snorm = 19,
    R8Snorm = 20,
    Rgba32i = 21,
    Rgba16i = 22,
    Rgba8i = 23,
    R32i = 24,
    Rg32i = 25,
    Rg16i = 26,
    Rg8i = 27,
    R16i = 28,
    R8i = 29,
    Rgba32ui = 30,
    Rgba16ui = 31,
    Rgba8ui = 32,
    R32ui = 33,
    Rgb10a2ui = 34,
    Rg32ui = 35,
    Rg16ui = 36,
    Rg8ui = 37,
    R16ui = 38,
    R8ui = 39,
}
impl Default for ImageFormat {
    fn default() -> ImageFormat { ImageFormat::Unknown }
}
impl ImageFormat {
    pub fn from_spv_def(fmt: u32) -> ImageFormat {
        ImageFormat::from_u32(fmt).unwrap_or(ImageFormat::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageAccess {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}
impl Default for ImageAccess {
    fn default() -> ImageAccess { ImageAccess::ReadWrite }
}

/// Stage input or output, or an opaque resource bound to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InOutVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VariableType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc_set: Option<u32>,
    /// Storage images only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_fmt: Option<ImageFormat>,
    /// Storage images only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_access: Option<ImageAccess>,
}

/// Member of a uniform, push constant or storage block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VariableType,
    pub offset: u32,
    /// Declared size; 0 if the size is not known.
    pub size: u32,
    /// Outermost dimension first. 0 for a runtime-sized dimension.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub array_dims: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_stride: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_stride: Option<u32>,
    #[serde(default)]
    pub is_row_major: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub struct_members: Vec<BlockVariable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniformBlock {
    pub block_name: String,
    /// Instance name, `_<id>` for anonymous instances.
    pub struct_name: String,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc_set: Option<u32>,
    pub members: Vec<BlockVariable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConstantBlock {
    pub name: String,
    pub size: u32,
    pub members: Vec<BlockVariable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageBlock {
    pub block_name: String,
    pub instance_name: String,
    /// `None` when the block ends with a runtime-sized array or its size
    /// cannot be determined otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc_set: Option<u32>,
    pub members: Vec<BlockVariable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderDescription {
    pub input_vars: Vec<InOutVariable>,
    pub output_vars: Vec<InOutVariable>,
    pub uniform_blocks: Vec<UniformBlock>,
    pub push_constant_blocks: Vec<PushConstantBlock>,
    pub storage_blocks: Vec<StorageBlock>,
    pub combined_image_samplers: Vec<InOutVariable>,
    pub storage_images: Vec<InOutVariable>,
    /// Compute work group size, 0 where not declared.
    pub local_size: [u32; 3],
}
impl ShaderDescription {
    pub fn is_valid(&self) -> bool {
        !self.input_vars.is_empty() || !self.output_vars.is_empty() ||
            !self.uniform_blocks.is_empty() || !self.push_constant_blocks.is_empty() ||
            !self.storage_blocks.is_empty() || !self.combined_image_samplers.is_empty() ||
            !self.storage_images.is_empty() || self.local_size.iter().any(|x| *x != 0)
    }
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
    pub fn from_json(json: &str) -> serde_json::Result<ShaderDescription> {
        serde_json::from_str(json)
    }
}
