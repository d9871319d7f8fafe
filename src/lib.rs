//! # shaderbake
//!
//! Reflect SPIR-V shaders into backend-neutral interface descriptions,
//! translate them into GLSL, HLSL and MSL through pluggable backends, and
//! strip or remap the binaries for shipping.
pub mod spv;
pub mod desc;
pub mod reflect;
pub mod backend;
pub mod remap;
#[cfg(feature = "spirv_cross")]
pub mod cross;
mod shader;
mod error;
#[cfg(test)]
mod testing;

pub use desc::*;
pub use backend::{Backend, BackendFactory, BackendOptions, Target};
pub use remap::RemapMode;
pub use shader::{GlslFlags, NativeResourceBindingMap, SpirvShader};
pub use error::{Error, Result};
#[cfg(feature = "spirv_cross")]
pub use cross::SpirvCrossFactory;
