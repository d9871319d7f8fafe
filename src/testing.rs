#![cfg(test)]
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use rspirv::spirv::{AddressingModel, BuiltIn, Capability, Decoration, Dim, ExecutionMode,
    ExecutionModel, ImageFormat, MemoryModel, Op, SourceLanguage, StorageClass};
use crate::backend::*;
use crate::desc::*;
use crate::spv::{Id, Module, MAGIC_NUMBER};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn str_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 { bytes.push(0); }
    bytes.chunks(4)
        .map(|x| u32::from_le_bytes([x[0], x[1], x[2], x[3]]))
        .collect()
}

const PREAMBLE: usize = 0;
const ENTRY_POINT: usize = 1;
const EXEC_MODE: usize = 2;
const DEBUG: usize = 3;
const ANNOTATION: usize = 4;
const TYPE: usize = 5;
const FUNCTION: usize = 6;
const NSECTION: usize = 7;

/// Writes SPIR-V words by hand. Instructions are kept per logical section so
/// that they can be emitted in any order.
pub struct Assembler {
    next_id: Id,
    main: Id,
    uint_ty: Option<Id>,
    sections: Vec<Vec<u32>>,
}
impl Assembler {
    pub fn new() -> Assembler {
        let mut asm = Assembler {
            next_id: 1,
            main: 0,
            uint_ty: None,
            sections: vec![Vec::new(); NSECTION],
        };
        asm.main = asm.id();
        asm.emit(PREAMBLE, Op::Capability, &[Capability::Shader as u32]);
        asm.emit(PREAMBLE, Op::MemoryModel, &[AddressingModel::Logical as u32, MemoryModel::GLSL450 as u32]);
        asm
    }
    pub fn main(&self) -> Id { self.main }
    pub fn id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
    fn emit(&mut self, section: usize, op: Op, operands: &[u32]) {
        let words = &mut self.sections[section];
        words.push(((operands.len() as u32 + 1) << 16) | op as u32);
        words.extend_from_slice(operands);
    }
    fn emit_ty(&mut self, op: Op, operands: &[u32]) -> Id {
        let id = self.id();
        let mut ops = vec![id];
        ops.extend_from_slice(operands);
        self.emit(TYPE, op, &ops);
        id
    }

    pub fn source(&mut self, file: &str) {
        let file_id = self.id();
        let mut ops = vec![file_id];
        ops.extend(str_words(file));
        self.emit(DEBUG, Op::String, &ops);
        self.emit(DEBUG, Op::Source, &[SourceLanguage::GLSL as u32, 450, file_id]);
    }
    pub fn module_processed(&mut self, process: &str) {
        self.emit(DEBUG, Op::ModuleProcessed, &str_words(process));
    }
    pub fn name(&mut self, id: Id, name: &str) {
        let mut ops = vec![id];
        ops.extend(str_words(name));
        self.emit(DEBUG, Op::Name, &ops);
    }
    pub fn member_name(&mut self, id: Id, member_idx: u32, name: &str) {
        let mut ops = vec![id, member_idx];
        ops.extend(str_words(name));
        self.emit(DEBUG, Op::MemberName, &ops);
    }
    pub fn decorate(&mut self, id: Id, deco: Decoration, params: &[u32]) {
        let mut ops = vec![id, deco as u32];
        ops.extend_from_slice(params);
        self.emit(ANNOTATION, Op::Decorate, &ops);
    }
    pub fn member_decorate(&mut self, id: Id, member_idx: u32, deco: Decoration, params: &[u32]) {
        let mut ops = vec![id, member_idx, deco as u32];
        ops.extend_from_slice(params);
        self.emit(ANNOTATION, Op::MemberDecorate, &ops);
    }
    pub fn execution_mode(&mut self, mode: ExecutionMode, args: &[u32]) {
        let mut ops = vec![self.main, mode as u32];
        ops.extend_from_slice(args);
        self.emit(EXEC_MODE, Op::ExecutionMode, &ops);
    }
    pub fn execution_mode_id(&mut self, mode: ExecutionMode, ids: &[Id]) {
        let mut ops = vec![self.main, mode as u32];
        ops.extend_from_slice(ids);
        self.emit(EXEC_MODE, Op::ExecutionModeId, &ops);
    }

    pub fn type_void(&mut self) -> Id { self.emit_ty(Op::TypeVoid, &[]) }
    pub fn type_int(&mut self, nbit: u32, is_signed: bool) -> Id {
        if nbit == 32 && !is_signed {
            if let Some(x) = self.uint_ty { return x; }
            let x = self.emit_ty(Op::TypeInt, &[32, 0]);
            self.uint_ty = Some(x);
            x
        } else {
            self.emit_ty(Op::TypeInt, &[nbit, is_signed as u32])
        }
    }
    pub fn type_float(&mut self, nbit: u32) -> Id { self.emit_ty(Op::TypeFloat, &[nbit]) }
    pub fn type_vector(&mut self, elem_ty: Id, nelem: u32) -> Id { self.emit_ty(Op::TypeVector, &[elem_ty, nelem]) }
    pub fn type_matrix(&mut self, col_ty: Id, ncol: u32) -> Id { self.emit_ty(Op::TypeMatrix, &[col_ty, ncol]) }
    pub fn type_image(
        &mut self,
        sampled_ty: Id,
        dim: Dim,
        is_array: bool,
        is_multisampled: bool,
        sampled: u32,
        fmt: ImageFormat,
    ) -> Id {
        let ops = [sampled_ty, dim as u32, 0, is_array as u32, is_multisampled as u32, sampled, fmt as u32];
        self.emit_ty(Op::TypeImage, &ops)
    }
    pub fn type_sampler(&mut self) -> Id { self.emit_ty(Op::TypeSampler, &[]) }
    pub fn type_sampled_image(&mut self, img_ty: Id) -> Id { self.emit_ty(Op::TypeSampledImage, &[img_ty]) }
    pub fn type_array(&mut self, elem_ty: Id, nelem: u32) -> Id {
        let nelem = self.constant_u32(nelem);
        self.emit_ty(Op::TypeArray, &[elem_ty, nelem])
    }
    /// Array sized by an arbitrary constant instruction.
    pub fn type_array_of(&mut self, elem_ty: Id, nelem: Id) -> Id {
        self.emit_ty(Op::TypeArray, &[elem_ty, nelem])
    }
    pub fn type_runtime_array(&mut self, elem_ty: Id) -> Id { self.emit_ty(Op::TypeRuntimeArray, &[elem_ty]) }
    pub fn type_struct(&mut self, member_tys: &[Id]) -> Id { self.emit_ty(Op::TypeStruct, member_tys) }
    pub fn type_pointer(&mut self, store_cls: StorageClass, ty: Id) -> Id {
        self.emit_ty(Op::TypePointer, &[store_cls as u32, ty])
    }
    pub fn constant_u32(&mut self, x: u32) -> Id {
        let uint = self.type_int(32, false);
        let id = self.id();
        self.emit(TYPE, Op::Constant, &[uint, id, x]);
        id
    }
    pub fn spec_constant_u32(&mut self, x: u32) -> Id {
        let uint = self.type_int(32, false);
        let id = self.id();
        self.emit(TYPE, Op::SpecConstant, &[uint, id, x]);
        id
    }
    pub fn spec_constant_op(&mut self, op: Op, args: &[Id]) -> Id {
        let uint = self.type_int(32, false);
        let id = self.id();
        let mut ops = vec![uint, id, op as u32];
        ops.extend_from_slice(args);
        self.emit(TYPE, Op::SpecConstantOp, &ops);
        id
    }
    pub fn variable(&mut self, ptr_ty: Id, store_cls: StorageClass) -> Id {
        let id = self.id();
        self.emit(TYPE, Op::Variable, &[ptr_ty, id, store_cls as u32]);
        id
    }

    fn assemble(mut self, exec_model: ExecutionModel, interface: &[Id]) -> Vec<u32> {
        let void = self.type_void();
        let func_ty = self.emit_ty(Op::TypeFunction, &[void]);
        let main = self.main;
        let label = self.id();
        self.emit(FUNCTION, Op::Function, &[void, main, 0, func_ty]);
        self.emit(FUNCTION, Op::Label, &[label]);
        self.emit(FUNCTION, Op::Return, &[]);
        self.emit(FUNCTION, Op::FunctionEnd, &[]);
        let mut ops = vec![exec_model as u32, main];
        ops.extend(str_words("main"));
        ops.extend_from_slice(interface);
        self.emit(ENTRY_POINT, Op::EntryPoint, &ops);
        if exec_model == ExecutionModel::Fragment {
            self.execution_mode(ExecutionMode::OriginUpperLeft, &[]);
        }
        let mut words = vec![MAGIC_NUMBER, 0x0001_0300, 0, self.next_id, 0];
        for section in self.sections.iter() { words.extend_from_slice(section); }
        words
    }
    pub fn assemble_vertex(self, interface: &[Id]) -> Vec<u32> {
        self.assemble(ExecutionModel::Vertex, interface)
    }
    pub fn assemble_fragment(self, interface: &[Id]) -> Vec<u32> {
        self.assemble(ExecutionModel::Fragment, interface)
    }
    pub fn assemble_compute(self) -> Vec<u32> {
        self.assemble(ExecutionModel::GLCompute, &[])
    }
}

/// A vertex shader taking a position and a color, with one uniform block
/// holding a transform and an opacity.
pub fn color_vert() -> Vec<u32> {
    let mut asm = Assembler::new();
    asm.source("color.vert");
    asm.module_processed("client vulkan100");
    let float = asm.type_float(32);
    let vec3 = asm.type_vector(float, 3);
    let vec4 = asm.type_vector(float, 4);
    let mat4 = asm.type_matrix(vec4, 4);

    let per_vertex = asm.type_struct(&[vec4]);
    asm.name(per_vertex, "gl_PerVertex");
    asm.member_name(per_vertex, 0, "gl_Position");
    asm.member_decorate(per_vertex, 0, Decoration::BuiltIn, &[BuiltIn::Position as u32]);
    asm.decorate(per_vertex, Decoration::Block, &[]);
    let ptr = asm.type_pointer(StorageClass::Output, per_vertex);
    let gl_out = asm.variable(ptr, StorageClass::Output);

    let ptr = asm.type_pointer(StorageClass::Input, vec4);
    let position = asm.variable(ptr, StorageClass::Input);
    asm.name(position, "position");
    asm.decorate(position, Decoration::Location, &[0]);
    let ptr = asm.type_pointer(StorageClass::Input, vec3);
    let color = asm.variable(ptr, StorageClass::Input);
    asm.name(color, "color");
    asm.decorate(color, Decoration::Location, &[1]);
    let ptr = asm.type_pointer(StorageClass::Output, vec3);
    let v_color = asm.variable(ptr, StorageClass::Output);
    asm.name(v_color, "v_color");
    asm.decorate(v_color, Decoration::Location, &[0]);

    let buf = asm.type_struct(&[mat4, float]);
    asm.name(buf, "buf");
    asm.member_name(buf, 0, "mvp");
    asm.member_name(buf, 1, "opacity");
    asm.member_decorate(buf, 0, Decoration::ColMajor, &[]);
    asm.member_decorate(buf, 0, Decoration::Offset, &[0]);
    asm.member_decorate(buf, 0, Decoration::MatrixStride, &[16]);
    asm.member_decorate(buf, 1, Decoration::Offset, &[64]);
    asm.decorate(buf, Decoration::Block, &[]);
    let ptr = asm.type_pointer(StorageClass::Uniform, buf);
    let ubuf = asm.variable(ptr, StorageClass::Uniform);
    asm.name(ubuf, "ubuf");
    asm.decorate(ubuf, Decoration::DescriptorSet, &[0]);
    asm.decorate(ubuf, Decoration::Binding, &[0]);

    asm.assemble_vertex(&[gl_out, position, color, v_color])
}
pub fn color_vert_desc() -> ShaderDescription {
    let in_out = |name: &str, ty, location| InOutVariable {
        name: name.to_owned(),
        ty,
        location: Some(location),
        ..Default::default()
    };
    let members = vec![
        BlockVariable {
            name: "mvp".to_owned(),
            ty: VariableType::Mat4,
            offset: 0,
            size: 64,
            matrix_stride: Some(16),
            ..Default::default()
        },
        BlockVariable {
            name: "opacity".to_owned(),
            ty: VariableType::Float,
            offset: 64,
            size: 4,
            ..Default::default()
        },
    ];
    ShaderDescription {
        input_vars: vec![
            in_out("position", VariableType::Vec4, 0),
            in_out("color", VariableType::Vec3, 1),
        ],
        output_vars: vec![in_out("v_color", VariableType::Vec3, 0)],
        uniform_blocks: vec![UniformBlock {
            block_name: "buf".to_owned(),
            struct_name: "ubuf".to_owned(),
            size: 68,
            binding: Some(0),
            desc_set: Some(0),
            members,
        }],
        ..Default::default()
    }
}

/// A fragment shader sampling two textures, at bindings 1 and 4, tinted by a
/// uniform block at binding 2.
pub fn textured_frag() -> Vec<u32> {
    let mut asm = Assembler::new();
    let float = asm.type_float(32);
    let vec2 = asm.type_vector(float, 2);
    let vec4 = asm.type_vector(float, 4);

    let block = asm.type_struct(&[vec4]);
    asm.name(block, "Tint");
    asm.member_name(block, 0, "tint");
    asm.member_decorate(block, 0, Decoration::Offset, &[0]);
    asm.decorate(block, Decoration::Block, &[]);
    let ptr = asm.type_pointer(StorageClass::Uniform, block);
    let ubuf = asm.variable(ptr, StorageClass::Uniform);
    asm.decorate(ubuf, Decoration::Binding, &[2]);

    let img = asm.type_image(float, Dim::Dim2D, false, false, 1, ImageFormat::Unknown);
    let sampled = asm.type_sampled_image(img);
    let ptr = asm.type_pointer(StorageClass::UniformConstant, sampled);
    let tex0 = asm.variable(ptr, StorageClass::UniformConstant);
    asm.name(tex0, "tex0");
    asm.decorate(tex0, Decoration::Binding, &[1]);
    let tex1 = asm.variable(ptr, StorageClass::UniformConstant);
    asm.name(tex1, "tex1");
    asm.decorate(tex1, Decoration::Binding, &[4]);

    let ptr = asm.type_pointer(StorageClass::Input, vec2);
    let v_uv = asm.variable(ptr, StorageClass::Input);
    asm.decorate(v_uv, Decoration::Location, &[0]);
    let ptr = asm.type_pointer(StorageClass::Output, vec4);
    let frag_color = asm.variable(ptr, StorageClass::Output);
    asm.decorate(frag_color, Decoration::Location, &[0]);

    asm.assemble_fragment(&[v_uv, frag_color])
}

#[derive(Debug, Default)]
struct FakeState {
    ncreated: usize,
    opts: Vec<BackendOptions>,
}

/// Creates backends that print a deterministic summary of the module instead
/// of real source code, and remembers the options they were given.
#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    state: Rc<RefCell<FakeState>>,
    create_err: Option<String>,
    compile_err: Option<String>,
}
impl FakeFactory {
    pub fn failing_create(msg: &str) -> FakeFactory {
        FakeFactory { create_err: Some(msg.to_owned()), ..Default::default() }
    }
    pub fn failing_compile(msg: &str) -> FakeFactory {
        FakeFactory { compile_err: Some(msg.to_owned()), ..Default::default() }
    }
    pub fn ncreated(&self) -> usize { self.state.borrow().ncreated }
    pub fn installed_options(&self) -> Vec<BackendOptions> { self.state.borrow().opts.clone() }
}
impl BackendFactory for FakeFactory {
    fn create_backend(&self, target: Target, _words: &[u32], module: Module) -> Result<Box<dyn Backend>, String> {
        if let Some(msg) = &self.create_err { return Err(msg.clone()); }
        self.state.borrow_mut().ncreated += 1;
        let backend = FakeBackend {
            target,
            module,
            state: self.state.clone(),
            opts: None,
            compile_err: self.compile_err.clone(),
            slots: HashMap::new(),
        };
        Ok(Box::new(backend))
    }
}

struct FakeBackend {
    target: Target,
    module: Module,
    state: Rc<RefCell<FakeState>>,
    opts: Option<BackendOptions>,
    compile_err: Option<String>,
    slots: HashMap<Id, (u32, Option<u32>)>,
}
impl FakeBackend {
    /// Buffers, textures and samplers each count from 0, like Metal argument
    /// tables.
    fn assign_slots(&mut self) -> Result<(), String> {
        let rscs = self.module.shader_resources().map_err(|e| e.to_string())?;
        let mut nbuf = 0;
        for rsc in rscs.uniform_buffers.iter().chain(rscs.storage_buffers.iter()) {
            self.slots.insert(rsc.id, (nbuf, None));
            nbuf += 1;
        }
        let mut ntex = 0;
        for (i, rsc) in rscs.sampled_images.iter().enumerate() {
            self.slots.insert(rsc.id, (ntex, Some(i as u32)));
            ntex += 1;
        }
        for rsc in rscs.storage_images.iter() {
            self.slots.insert(rsc.id, (ntex, None));
            ntex += 1;
        }
        Ok(())
    }
}
impl Backend for FakeBackend {
    fn target(&self) -> Target { self.target }
    fn module(&self) -> &Module { &self.module }
    fn set_options(&mut self, opts: &BackendOptions) -> Result<(), String> {
        if opts.target() != self.target { return Err("options are for another target".to_owned()); }
        self.state.borrow_mut().opts.push(opts.clone());
        self.opts = Some(opts.clone());
        Ok(())
    }
    fn compile(&mut self) -> Result<String, String> {
        if let Some(msg) = &self.compile_err { return Err(msg.clone()); }
        let opts = self.opts.clone();
        let mut src = match &opts {
            Some(BackendOptions::Glsl(opts)) => {
                let mut src = format!("#version {}{}\n", opts.version, if opts.es { " es" } else { "" });
                if !opts.es && opts.version < 420 {
                    src += "#ifdef GL_ARB_shading_language_420pack\n";
                    src += "#extension GL_ARB_shading_language_420pack : require\n#endif\n";
                }
                if opts.es {
                    let precision = if opts.es_default_float_precision_highp { "highp" } else { "mediump" };
                    src += &format!("precision {} float;\n", precision);
                }
                src
            },
            Some(BackendOptions::Hlsl(opts)) => format!("// shader model {}\n", opts.shader_model),
            Some(BackendOptions::Msl(opts)) => {
                self.assign_slots()?;
                format!("// metal {}.{}.{}\n", opts.version / 10000, opts.version / 100 % 100, opts.version % 100)
            },
            None => return Err("no options installed".to_owned()),
        };
        let rscs = self.module.shader_resources().map_err(|e| e.to_string())?;
        for rsc in rscs.stage_inputs.iter() { src += &format!("in {};\n", rsc.name); }
        for rsc in rscs.stage_outputs.iter() { src += &format!("out {};\n", rsc.name); }
        for rsc in rscs.uniform_buffers.iter() { src += &format!("uniform {};\n", rsc.name); }
        src += "void main() {}\n";
        Ok(src)
    }
    fn automatic_resource_binding(&self, id: Id) -> Option<u32> {
        self.slots.get(&id).map(|x| x.0)
    }
    fn automatic_resource_binding_secondary(&self, id: Id) -> Option<u32> {
        self.slots.get(&id).and_then(|x| x.1)
    }
}
