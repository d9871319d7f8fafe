use rspirv::spirv::{Dim, ImageFormat, StorageClass};
use super::Id;

/// Fundamental category of a type after pointers and arrays are peeled off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Unknown,
    Void,
    Boolean,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Half,
    Float,
    Double,
    Struct,
    Image,
    SampledImage,
    Sampler,
    AccelerationStructure,
}
impl Default for BaseType {
    fn default() -> BaseType { BaseType::Unknown }
}
impl BaseType {
    pub fn int(nbit: u32, is_signed: bool) -> BaseType {
        match (nbit, is_signed) {
            (8, true) => BaseType::Int8,
            (8, false) => BaseType::UInt8,
            (16, true) => BaseType::Int16,
            (16, false) => BaseType::UInt16,
            (32, true) => BaseType::Int32,
            (32, false) => BaseType::UInt32,
            (64, true) => BaseType::Int64,
            (64, false) => BaseType::UInt64,
            _ => BaseType::Unknown,
        }
    }
    pub fn float(nbit: u32) -> BaseType {
        match nbit {
            16 => BaseType::Half,
            32 => BaseType::Float,
            64 => BaseType::Double,
            _ => BaseType::Unknown,
        }
    }
    /// Opaque types have no size and cannot live in a buffer block.
    pub fn is_opaque(&self) -> bool {
        match self {
            BaseType::Unknown | BaseType::Void | BaseType::Boolean |
            BaseType::Image | BaseType::SampledImage | BaseType::Sampler |
            BaseType::AccelerationStructure => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageType {
    /// Type of the texel components returned by sampling.
    pub sampled_ty: Id,
    pub dim: Dim,
    pub is_depth: bool,
    pub is_array: bool,
    pub is_multisampled: bool,
    /// 1 for images used with a sampler, 2 for storage images, 0 if only
    /// known at runtime.
    pub sampled: u32,
    pub fmt: ImageFormat,
}

/// A resolved view of a type id. Pointers and arrays are folded into the
/// fields below so that a variable's type can be inspected in one place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Type {
    /// The id this type was resolved from.
    pub id: Id,
    /// Id of the innermost non-pointer, non-array type.
    pub base_ty_id: Id,
    pub basetype: BaseType,
    /// Bit-width of the scalar component.
    pub width: u32,
    /// Number of components in a vector, or rows in a matrix.
    pub vecsize: u32,
    /// Number of columns in a matrix; 1 for everything else.
    pub columns: u32,
    /// Array dimensions from the outermost to the innermost. Runtime-sized
    /// dimensions are 0.
    pub array: Vec<u32>,
    pub image: Option<ImageType>,
    pub member_tys: Vec<Id>,
    /// Storage class of the outermost pointer, if this is a pointer type.
    pub store_cls: Option<StorageClass>,
}
impl Type {
    pub fn nmember(&self) -> u32 { self.member_tys.len() as u32 }
    pub fn member_ty(&self, idx: u32) -> Option<Id> { self.member_tys.get(idx as usize).copied() }
    pub fn is_array(&self) -> bool { !self.array.is_empty() }
    pub fn is_runtime_array(&self) -> bool { self.array.first() == Some(&0) }
    pub fn is_matrix(&self) -> bool { self.columns > 1 }
}
