//! Code Generation Backends
//!
//! The seam between the engine and whatever turns SPIR-V into source text for
//! a target language. A backend is created per translation request from a
//! freshly parsed module and dropped afterwards.
use crate::spv::{Id, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Glsl,
    Hlsl,
    Msl,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlslOptions {
    pub version: u32,
    pub es: bool,
    /// Rewrite clip space depth from [0, 1] to [-1, 1].
    pub fixup_clip_space: bool,
    /// Default float precision in ES fragment shaders.
    pub es_default_float_precision_highp: bool,
    pub emit_uniform_buffer_as_plain_uniforms: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HlslOptions {
    pub shader_model: u32,
    pub point_size_compat: bool,
    pub point_coord_compat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MslPlatform {
    Ios,
    MacOs,
}
impl Default for MslPlatform {
    fn default() -> MslPlatform { MslPlatform::MacOs }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MslOptions {
    /// Encoded with `make_msl_version`.
    pub version: u32,
    pub platform: MslPlatform,
}

pub const fn make_msl_version(major: u32, minor: u32, patch: u32) -> u32 {
    major * 10000 + minor * 100 + patch
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendOptions {
    Glsl(GlslOptions),
    Hlsl(HlslOptions),
    Msl(MslOptions),
}
impl BackendOptions {
    pub fn target(&self) -> Target {
        match self {
            BackendOptions::Glsl(_) => Target::Glsl,
            BackendOptions::Hlsl(_) => Target::Hlsl,
            BackendOptions::Msl(_) => Target::Msl,
        }
    }
}

pub trait Backend {
    fn target(&self) -> Target;
    /// The module this backend was created from.
    fn module(&self) -> &Module;
    /// Install options. Fails if the options are meant for another target.
    fn set_options(&mut self, opts: &BackendOptions) -> Result<(), String>;
    /// Generate source text, or a diagnostic if the module cannot be
    /// expressed in the target language.
    fn compile(&mut self) -> Result<String, String>;
    /// Native slot assigned to a resource during the last `compile`.
    fn automatic_resource_binding(&self, id: Id) -> Option<u32>;
    /// Secondary native slot, i.e. the sampler half of a combined image
    /// sampler.
    fn automatic_resource_binding_secondary(&self, id: Id) -> Option<u32>;
}

pub trait BackendFactory {
    /// `words` is the binary `module` was parsed from.
    fn create_backend(&self, target: Target, words: &[u32], module: Module) -> Result<Box<dyn Backend>, String>;
}
