//! SPIRV-Cross Backends
//!
//! `BackendFactory` on top of the `spirv_cross` crate. Each backend owns an
//! `Ast` parsed from the words it was created with.
use std::collections::{BTreeMap, HashMap};
use log::debug;
use spirv_cross::{glsl, hlsl, msl, spirv as cross, ErrorCode};
use crate::backend::*;
use crate::spv::{Id, Module, ResourceType};
use crate::spv::spirv::{Decoration, ExecutionModel};

fn error_message(e: ErrorCode) -> String {
    match e {
        ErrorCode::CompilationError(msg) => msg,
        e => format!("{:?}", e),
    }
}

fn glsl_version(version: u32, es: bool) -> Result<glsl::Version, String> {
    use glsl::Version::*;
    let x = match (version, es) {
        (100, true) => V1_00Es,
        (300, true) => V3_00Es,
        (310, true) => V3_10Es,
        (320, true) => V3_20Es,
        (110, false) => V1_10,
        (120, false) => V1_20,
        (130, false) => V1_30,
        (140, false) => V1_40,
        (150, false) => V1_50,
        (330, false) => V3_30,
        (400, false) => V4_00,
        (410, false) => V4_10,
        (420, false) => V4_20,
        (430, false) => V4_30,
        (440, false) => V4_40,
        (450, false) => V4_50,
        (460, false) => V4_60,
        _ => return Err(format!("unsupported glsl version {}{}", version, if es { " es" } else { "" })),
    };
    Ok(x)
}

fn shader_model(version: u32) -> Result<hlsl::ShaderModel, String> {
    use hlsl::ShaderModel::*;
    let x = match version {
        30 => V3_0,
        40 => V4_0,
        41 => V4_1,
        50 => V5_0,
        51 => V5_1,
        60 => V6_0,
        _ => return Err(format!("unsupported shader model {}", version)),
    };
    Ok(x)
}

fn msl_version(version: u32) -> Result<msl::Version, String> {
    use msl::Version::*;
    let x = match (version / 10000, version / 100 % 100) {
        (1, 0) => V1_0,
        (1, 1) => V1_1,
        (1, 2) => V1_2,
        (2, 0) => V2_0,
        (2, 1) => V2_1,
        (2, 2) => V2_2,
        (major, minor) => return Err(format!("unsupported msl version {}.{}", major, minor)),
    };
    Ok(x)
}

fn cross_exec_model(exec_model: ExecutionModel) -> Option<cross::ExecutionModel> {
    let x = match exec_model {
        ExecutionModel::Vertex => cross::ExecutionModel::Vertex,
        ExecutionModel::TessellationControl => cross::ExecutionModel::TessellationControl,
        ExecutionModel::TessellationEvaluation => cross::ExecutionModel::TessellationEvaluation,
        ExecutionModel::Geometry => cross::ExecutionModel::Geometry,
        ExecutionModel::Fragment => cross::ExecutionModel::Fragment,
        ExecutionModel::GLCompute => cross::ExecutionModel::GlCompute,
        ExecutionModel::Kernel => cross::ExecutionModel::Kernel,
        _ => return None,
    };
    Some(x)
}

type MslOverrides = BTreeMap<msl::ResourceBindingLocation, msl::ResourceBinding>;

/// Give every resource Metal slots in declaration order, counting buffers,
/// textures and samplers separately. Combined image samplers take a texture
/// and a sampler slot.
fn assign_msl_slots(module: &Module) -> Result<(HashMap<Id, (u32, u32)>, MslOverrides), String> {
    let stage = module.execution_model()
        .and_then(cross_exec_model)
        .ok_or_else(|| "module has no entry point metal can run".to_owned())?;
    let rscs = module.shader_resources().map_err(|e| e.to_string())?;
    let rsc_tys = [
        ResourceType::UniformBuffer,
        ResourceType::StorageBuffer,
        ResourceType::PushConstant,
        ResourceType::SampledImage,
        ResourceType::StorageImage,
        ResourceType::SeparateImage,
        ResourceType::SeparateSampler,
    ];
    let mut slots = HashMap::new();
    let mut overrides = BTreeMap::new();
    let (mut nbuf, mut ntex, mut nsmp) = (0, 0, 0);
    for rsc_ty in rsc_tys.iter() {
        for rsc in rscs.get(*rsc_ty) {
            let (primary, secondary) = match rsc_ty {
                ResourceType::SampledImage => {
                    ntex += 1;
                    nsmp += 1;
                    (ntex - 1, nsmp - 1)
                },
                ResourceType::StorageImage | ResourceType::SeparateImage => {
                    ntex += 1;
                    (ntex - 1, 0)
                },
                ResourceType::SeparateSampler => {
                    nsmp += 1;
                    (nsmp - 1, 0)
                },
                _ => {
                    nbuf += 1;
                    (nbuf - 1, 0)
                },
            };
            let (desc_set, binding) = if *rsc_ty == ResourceType::PushConstant {
                // Push constants are looked up under a reserved set.
                (!0, 0)
            } else {
                (
                    module.decoration(rsc.id, Decoration::DescriptorSet).unwrap_or(0),
                    module.decoration(rsc.id, Decoration::Binding).unwrap_or(0),
                )
            };
            let loc = msl::ResourceBindingLocation { stage, desc_set, binding };
            let sampler_id = if *rsc_ty == ResourceType::SampledImage { secondary } else { primary };
            let native = msl::ResourceBinding {
                buffer_id: primary,
                texture_id: primary,
                sampler_id,
                count: 0,
            };
            overrides.insert(loc, native);
            slots.insert(rsc.id, (primary, secondary));
        }
    }
    Ok((slots, overrides))
}

enum CrossAst {
    Glsl(cross::Ast<glsl::Target>),
    Hlsl(cross::Ast<hlsl::Target>),
    Msl(cross::Ast<msl::Target>),
}

pub struct CrossBackend {
    module: Module,
    ast: CrossAst,
    /// Native slots of MSL resources, empty for other targets.
    slots: HashMap<Id, (u32, u32)>,
}
impl Backend for CrossBackend {
    fn target(&self) -> Target {
        match self.ast {
            CrossAst::Glsl(_) => Target::Glsl,
            CrossAst::Hlsl(_) => Target::Hlsl,
            CrossAst::Msl(_) => Target::Msl,
        }
    }
    fn module(&self) -> &Module { &self.module }
    fn set_options(&mut self, opts: &BackendOptions) -> Result<(), String> {
        let target = self.target();
        match (&mut self.ast, opts) {
            (CrossAst::Glsl(ast), BackendOptions::Glsl(opts)) => {
                let mut x = glsl::CompilerOptions::default();
                x.version = glsl_version(opts.version, opts.es)?;
                x.vertex.transform_clip_space = opts.fixup_clip_space;
                x.fragment.default_float_precision = if opts.es_default_float_precision_highp {
                    glsl::Precision::High
                } else {
                    glsl::Precision::Medium
                };
                x.emit_uniform_buffer_as_plain_uniforms = opts.emit_uniform_buffer_as_plain_uniforms;
                ast.set_compiler_options(&x).map_err(error_message)
            },
            (CrossAst::Hlsl(ast), BackendOptions::Hlsl(opts)) => {
                let mut x = hlsl::CompilerOptions::default();
                x.shader_model = shader_model(opts.shader_model)?;
                x.point_size_compat = opts.point_size_compat;
                x.point_coord_compat = opts.point_coord_compat;
                ast.set_compiler_options(&x).map_err(error_message)
            },
            (CrossAst::Msl(ast), BackendOptions::Msl(opts)) => {
                let (slots, overrides) = assign_msl_slots(&self.module)?;
                let mut x = msl::CompilerOptions::default();
                x.version = msl_version(opts.version)?;
                x.platform = match opts.platform {
                    MslPlatform::Ios => msl::Platform::iOS,
                    MslPlatform::MacOs => msl::Platform::macOS,
                };
                x.resource_binding_overrides = overrides;
                ast.set_compiler_options(&x).map_err(error_message)?;
                self.slots = slots;
                Ok(())
            },
            (_, opts) => Err(format!("{:?} options cannot be used by a {:?} backend", opts.target(), target)),
        }
    }
    fn compile(&mut self) -> Result<String, String> {
        let src = match &mut self.ast {
            CrossAst::Glsl(ast) => ast.compile(),
            CrossAst::Hlsl(ast) => ast.compile(),
            CrossAst::Msl(ast) => ast.compile(),
        };
        src.map_err(error_message)
    }
    fn automatic_resource_binding(&self, id: Id) -> Option<u32> {
        self.slots.get(&id).map(|x| x.0)
    }
    fn automatic_resource_binding_secondary(&self, id: Id) -> Option<u32> {
        self.slots.get(&id).map(|x| x.1)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpirvCrossFactory;
impl BackendFactory for SpirvCrossFactory {
    fn create_backend(&self, target: Target, words: &[u32], module: Module) -> Result<Box<dyn Backend>, String> {
        let cross_module = cross::Module::from_words(words);
        let ast = match target {
            Target::Glsl => CrossAst::Glsl(cross::Ast::parse(&cross_module).map_err(error_message)?),
            Target::Hlsl => CrossAst::Hlsl(cross::Ast::parse(&cross_module).map_err(error_message)?),
            Target::Msl => CrossAst::Msl(cross::Ast::parse(&cross_module).map_err(error_message)?),
        };
        debug!("parsed {} words for spirv-cross {:?}", words.len(), target);
        let backend = CrossBackend {
            module,
            ast,
            slots: HashMap::new(),
        };
        Ok(Box::new(backend))
    }
}
