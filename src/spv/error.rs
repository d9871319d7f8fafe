use std::fmt;
use std::error;
use rspirv::spirv::Decoration;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    CorruptedSpirv,
    /// Size was queried on a type with no defined size, like an image or a
    /// sampler.
    OpaqueSize,
    /// Size was queried on a runtime-sized array or a struct ending with one.
    UnsizedType,
    EmptyStruct,
    MissingDecoration(Decoration),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            CorruptedSpirv => write!(f, "spirv binary is corrupted"),
            OpaqueSize => write!(f, "queried size of object with opaque size"),
            UnsizedType => write!(f, "queried size of runtime-sized object"),
            EmptyStruct => write!(f, "declared struct in block cannot be empty"),
            MissingDecoration(deco) => write!(f, "struct member is not decorated with {:?}", deco),
        }
    }
}
impl error::Error for Error { }
