//! SPIR-V Shader
//!
//! Hold a SPIR-V binary along with its reflected description, and translate
//! it into other shading languages through a `BackendFactory`.
use std::collections::BTreeMap;
use log::{debug, warn};
use crate::backend::*;
use crate::desc::ShaderDescription;
use crate::error::{Error, Result};
use crate::reflect;
use crate::remap::{RemapMode, ShaderRemapper, SpirvRemapper};
use crate::spv::{self, ResourceType, SpirvBinary};
use crate::spv::spirv::Decoration;

/// Binding number to native slots. The second slot is only used by combined
/// image samplers, for the sampler half; it is 0 for everything else.
pub type NativeResourceBindingMap = BTreeMap<u32, (u32, u32)>;

const GLSL_420PACK_EXT: &str = "#extension GL_ARB_shading_language_420pack : require\n#endif\n";
const GLSL_SEPARATE_SHADER_OBJECTS_EXT: &str = "#ifdef GL_ARB_separate_shader_objects\n\
    #extension GL_ARB_separate_shader_objects : require\n\
    #endif\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlslFlags {
    pub es: bool,
    /// Target clip space depth of [-1, 1] instead of [0, 1].
    pub fix_clip_space: bool,
    /// Default to `mediump` float precision in ES fragment shaders.
    pub frag_default_mediump: bool,
}

/// Enable separate shader objects wherever the 420pack extension is enabled,
/// so that stage interfaces can be matched by location.
fn patch_glsl(mut src: String) -> String {
    if let Some(pos) = src.find(GLSL_420PACK_EXT) {
        src.insert_str(pos + GLSL_420PACK_EXT.len(), GLSL_SEPARATE_SHADER_OBJECTS_EXT);
    }
    src
}

fn fill_native_bindings(backend: &dyn Backend, map: &mut NativeResourceBindingMap) -> spv::Result<()> {
    let module = backend.module();
    let rscs = module.shader_resources()?;
    let rsc_tys = [
        ResourceType::UniformBuffer,
        ResourceType::StorageBuffer,
        ResourceType::SampledImage,
        ResourceType::StorageImage,
    ];
    for rsc_ty in rsc_tys.iter() {
        for rsc in rscs.get(*rsc_ty) {
            let binding = module.decoration(rsc.id, Decoration::Binding).unwrap_or(0);
            // Resources the backend optimized away get no slot.
            let primary = match backend.automatic_resource_binding(rsc.id) {
                Some(x) => x,
                None => continue,
            };
            let secondary = if *rsc_ty == ResourceType::SampledImage {
                backend.automatic_resource_binding_secondary(rsc.id).unwrap_or(0)
            } else { 0 };
            map.insert(binding, (primary, secondary));
        }
    }
    Ok(())
}

pub struct SpirvShader<F> {
    factory: F,
    ir: SpirvBinary,
    desc: ShaderDescription,
    translate_err: String,
    remap_err: String,
}
impl<F: BackendFactory> SpirvShader<F> {
    pub fn new(factory: F) -> SpirvShader<F> {
        SpirvShader {
            factory,
            ir: SpirvBinary::default(),
            desc: ShaderDescription::default(),
            translate_err: String::new(),
            remap_err: String::new(),
        }
    }

    /// Replace the binary and reflect it. The binary is kept even if it
    /// cannot be reflected; the description is empty in that case.
    pub fn set_spirv_binary(&mut self, bytes: &[u8]) -> Result<()> {
        self.ir = SpirvBinary::from_bytes(bytes);
        self.desc = ShaderDescription::default();
        self.translate_err.clear();
        self.remap_err.clear();
        if self.ir.is_empty() { return Ok(()); }
        let desc = self.ir.parse()
            .and_then(|module| reflect::reflect(&module))
            .map_err(|e| {
                warn!("failed to reflect spirv binary: {}", e);
                e
            })?;
        self.desc = desc;
        Ok(())
    }
    pub fn spirv_binary(&self) -> &SpirvBinary { &self.ir }
    pub fn shader_description(&self) -> ShaderDescription { self.desc.clone() }

    /// Diagnostic of the last failed translation, empty if it succeeded.
    pub fn translation_error_message(&self) -> &str { &self.translate_err }
    /// Errors of the last failed remapping, empty if it succeeded.
    pub fn remap_error_message(&self) -> &str { &self.remap_err }

    fn create_backend(&self, opts: BackendOptions) -> Result<Box<dyn Backend>> {
        if self.ir.is_empty() { return Err(Error::NoSpirv); }
        let module = self.ir.parse()?;
        let mut backend = self.factory.create_backend(opts.target(), self.ir.words(), module)
            .map_err(|e| {
                warn!("failed to create {:?} backend: {}", opts.target(), e);
                Error::Backend(e)
            })?;
        backend.set_options(&opts).map_err(Error::Backend)?;
        Ok(backend)
    }
    fn compile(&mut self, backend: &mut dyn Backend) -> Result<String> {
        backend.compile()
            .map_err(|e| {
                self.translate_err = e.clone();
                Error::Translation(e)
            })
    }

    pub fn translate_to_glsl(&mut self, version: u32, flags: GlslFlags) -> Result<String> {
        self.translate_err.clear();
        debug!("translating to glsl {}{}", version, if flags.es { " es" } else { "" });
        let opts = GlslOptions {
            version,
            es: flags.es,
            fixup_clip_space: flags.fix_clip_space,
            es_default_float_precision_highp: !flags.frag_default_mediump,
            emit_uniform_buffer_as_plain_uniforms: true,
        };
        let mut backend = self.create_backend(BackendOptions::Glsl(opts))?;
        let src = self.compile(backend.as_mut())?;
        Ok(patch_glsl(src))
    }
    /// `version` is the shader model, like 50 for 5.0.
    pub fn translate_to_hlsl(&mut self, version: u32) -> Result<String> {
        self.translate_err.clear();
        debug!("translating to hlsl shader model {}", version);
        let opts = HlslOptions {
            shader_model: version,
            point_size_compat: true,
            point_coord_compat: true,
        };
        let mut backend = self.create_backend(BackendOptions::Hlsl(opts))?;
        self.compile(backend.as_mut())
    }
    /// `version` is the Metal version without the dot, like 12 for 1.2. Native
    /// slots are added to `native_bindings` if given.
    pub fn translate_to_msl(
        &mut self,
        version: u32,
        native_bindings: Option<&mut NativeResourceBindingMap>,
    ) -> Result<String> {
        self.translate_err.clear();
        debug!("translating to msl {}.{}", version / 10, version % 10);
        let opts = MslOptions {
            version: make_msl_version(version / 10, version % 10, 0),
            platform: MslPlatform::MacOs,
        };
        let mut backend = self.create_backend(BackendOptions::Msl(opts))?;
        let src = self.compile(backend.as_mut())?;
        if let Some(map) = native_bindings {
            fill_native_bindings(backend.as_ref(), map)?;
        }
        Ok(src)
    }

    pub fn remapped_spirv_binary(&mut self, mode: RemapMode) -> Result<Vec<u8>> {
        let mut remapper = ShaderRemapper::new(SpirvRemapper);
        let words = remapper.remap(self.ir.words(), mode);
        self.remap_err = remapper.error_message().to_owned();
        if !self.remap_err.is_empty() {
            return Err(Error::Remap(self.remap_err.clone()));
        }
        Ok(SpirvBinary::from(words).to_bytes())
    }
}
