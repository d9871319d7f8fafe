use std::collections::HashMap;
use rspirv::dr::{Instruction, Operand};
use rspirv::spirv::{Decoration, Dim, ExecutionMode, ExecutionModel, Op, StorageClass};
use log::debug;
use super::{BaseType, Error, Id, ImageType, Result, Type};

#[derive(Debug, Clone)]
enum SpvType {
    Void,
    Bool,
    Int { nbit: u32, is_signed: bool },
    Float { nbit: u32 },
    Vector { elem_ty: Id, nelem: u32 },
    Matrix { col_ty: Id, ncol: u32 },
    Image(ImageType),
    Sampler,
    SampledImage { img_ty: Id },
    Array { elem_ty: Id, nelem_id: Id },
    RuntimeArray { elem_ty: Id },
    Struct { member_tys: Vec<Id> },
    Pointer { store_cls: StorageClass, target_ty: Id },
    AccelerationStructure,
    /// Types that never appear in a shader interface, like function types.
    Opaque,
}

#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub exec_model: ExecutionModel,
    pub func: Id,
    pub name: String,
    /// Global variables the entry point declared as its interface.
    pub interface: Vec<Id>,
}

#[derive(Debug, Clone)]
struct Variable {
    id: Id,
    /// Pointer type of the variable.
    ty: Id,
    store_cls: StorageClass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: Id,
    pub ty_id: Id,
    pub base_ty_id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    UniformBuffer,
    StorageBuffer,
    StageInput,
    StageOutput,
    SubpassInput,
    StorageImage,
    SampledImage,
    PushConstant,
    SeparateImage,
    SeparateSampler,
}

/// Global variables of a module sorted into interface categories, each in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct ShaderResources {
    pub uniform_buffers: Vec<Resource>,
    pub storage_buffers: Vec<Resource>,
    pub stage_inputs: Vec<Resource>,
    pub stage_outputs: Vec<Resource>,
    pub subpass_inputs: Vec<Resource>,
    pub storage_images: Vec<Resource>,
    pub sampled_images: Vec<Resource>,
    pub push_constant_buffers: Vec<Resource>,
    pub separate_images: Vec<Resource>,
    pub separate_samplers: Vec<Resource>,
}
impl ShaderResources {
    pub fn get(&self, rsc_ty: ResourceType) -> &[Resource] {
        use ResourceType::*;
        match rsc_ty {
            UniformBuffer => &self.uniform_buffers,
            StorageBuffer => &self.storage_buffers,
            StageInput => &self.stage_inputs,
            StageOutput => &self.stage_outputs,
            SubpassInput => &self.subpass_inputs,
            StorageImage => &self.storage_images,
            SampledImage => &self.sampled_images,
            PushConstant => &self.push_constant_buffers,
            SeparateImage => &self.separate_images,
            SeparateSampler => &self.separate_samplers,
        }
    }
}

fn id_op(op: Option<&Operand>) -> Result<Id> {
    match op {
        Some(Operand::IdRef(x)) => Ok(*x),
        _ => Err(Error::CorruptedSpirv),
    }
}
fn lit_op(op: Option<&Operand>) -> Result<u32> {
    match op {
        Some(Operand::LiteralBit32(x)) => Ok(*x),
        _ => Err(Error::CorruptedSpirv),
    }
}
fn str_op(op: Option<&Operand>) -> Result<&str> {
    match op {
        Some(Operand::LiteralString(x)) => Ok(x.as_str()),
        _ => Err(Error::CorruptedSpirv),
    }
}
fn deco_op(op: Option<&Operand>) -> Result<Decoration> {
    match op {
        Some(Operand::Decoration(x)) => Ok(*x),
        _ => Err(Error::CorruptedSpirv),
    }
}
fn store_cls_op(op: Option<&Operand>) -> Result<StorageClass> {
    match op {
        Some(Operand::StorageClass(x)) => Ok(*x),
        _ => Err(Error::CorruptedSpirv),
    }
}
fn deco_params(ops: &[Operand]) -> Vec<u32> {
    ops.iter()
        .filter_map(|op| match op {
            Operand::LiteralBit32(x) | Operand::IdRef(x) => Some(*x),
            Operand::BuiltIn(x) => Some(*x as u32),
            _ => None,
        })
        .collect()
}

/// Parsed SPIR-V module answering name, decoration, type, layout and resource
/// queries.
#[derive(Debug, Clone, Default)]
pub struct Module {
    entry_points: Vec<EntryPoint>,
    exec_modes: HashMap<(Id, u32), Vec<u32>>,
    name_map: HashMap<(Id, Option<u32>), String>,
    deco_map: HashMap<(Id, Option<u32>, u32), Vec<u32>>,
    ty_map: HashMap<Id, SpvType>,
    const_map: HashMap<Id, u32>,
    vars: Vec<Variable>,
}
impl Module {
    pub fn parse(words: &[u32]) -> Result<Module> {
        let module = super::load_words(words)
            .map_err(|e| {
                debug!("failed to load spirv module: {:?}", e);
                Error::CorruptedSpirv
            })?;
        let mut out = Module::default();
        out.populate_names(&module.debug_names)?;
        out.populate_decos(&module.annotations)?;
        out.populate_defs(&module.types_global_values)?;
        out.populate_entry_points(&module.entry_points)?;
        // Execution modes may refer to constants so definitions go first.
        out.populate_exec_modes(&module.execution_modes)?;
        Ok(out)
    }
    fn populate_names(&mut self, instrs: &[Instruction]) -> Result<()> {
        for instr in instrs {
            let ops = &instr.operands;
            let (key, name) = match instr.class.opcode {
                Op::Name => ((id_op(ops.get(0))?, None), str_op(ops.get(1))?),
                Op::MemberName => {
                    let key = (id_op(ops.get(0))?, Some(lit_op(ops.get(1))?));
                    (key, str_op(ops.get(2))?)
                },
                _ => continue,
            };
            self.name_map.insert(key, name.to_owned());
        }
        Ok(())
    }
    fn populate_decos(&mut self, instrs: &[Instruction]) -> Result<()> {
        for instr in instrs {
            let ops = &instr.operands;
            let (key, params) = match instr.class.opcode {
                Op::Decorate | Op::DecorateId => {
                    let deco = deco_op(ops.get(1))?;
                    ((id_op(ops.get(0))?, None, deco as u32), deco_params(&ops[2..]))
                },
                Op::MemberDecorate => {
                    let deco = deco_op(ops.get(2))?;
                    let key = (id_op(ops.get(0))?, Some(lit_op(ops.get(1))?), deco as u32);
                    (key, deco_params(&ops[3..]))
                },
                _ => continue,
            };
            self.deco_map.insert(key, params);
        }
        Ok(())
    }
    fn populate_defs(&mut self, instrs: &[Instruction]) -> Result<()> {
        for instr in instrs {
            let ops = &instr.operands;
            let ty = match instr.class.opcode {
                Op::TypeVoid => SpvType::Void,
                Op::TypeBool => SpvType::Bool,
                Op::TypeInt => SpvType::Int {
                    nbit: lit_op(ops.get(0))?,
                    is_signed: lit_op(ops.get(1))? != 0,
                },
                Op::TypeFloat => SpvType::Float { nbit: lit_op(ops.get(0))? },
                Op::TypeVector => SpvType::Vector {
                    elem_ty: id_op(ops.get(0))?,
                    nelem: lit_op(ops.get(1))?,
                },
                Op::TypeMatrix => SpvType::Matrix {
                    col_ty: id_op(ops.get(0))?,
                    ncol: lit_op(ops.get(1))?,
                },
                Op::TypeImage => {
                    let dim = match ops.get(1) {
                        Some(Operand::Dim(x)) => *x,
                        _ => return Err(Error::CorruptedSpirv),
                    };
                    let fmt = match ops.get(6) {
                        Some(Operand::ImageFormat(x)) => *x,
                        _ => return Err(Error::CorruptedSpirv),
                    };
                    SpvType::Image(ImageType {
                        sampled_ty: id_op(ops.get(0))?,
                        dim,
                        is_depth: lit_op(ops.get(2))? == 1,
                        is_array: lit_op(ops.get(3))? != 0,
                        is_multisampled: lit_op(ops.get(4))? != 0,
                        sampled: lit_op(ops.get(5))?,
                        fmt,
                    })
                },
                Op::TypeSampler => SpvType::Sampler,
                Op::TypeSampledImage => SpvType::SampledImage { img_ty: id_op(ops.get(0))? },
                Op::TypeArray => SpvType::Array {
                    elem_ty: id_op(ops.get(0))?,
                    nelem_id: id_op(ops.get(1))?,
                },
                Op::TypeRuntimeArray => SpvType::RuntimeArray { elem_ty: id_op(ops.get(0))? },
                Op::TypeStruct => {
                    let member_tys = ops.iter()
                        .map(|op| id_op(Some(op)))
                        .collect::<Result<Vec<_>>>()?;
                    SpvType::Struct { member_tys }
                },
                Op::TypePointer => SpvType::Pointer {
                    store_cls: store_cls_op(ops.get(0))?,
                    target_ty: id_op(ops.get(1))?,
                },
                Op::TypeAccelerationStructureKHR => SpvType::AccelerationStructure,
                Op::Constant | Op::SpecConstant => {
                    // Only 32-bit scalars can size arrays or work groups.
                    if let (Some(id), Some(Operand::LiteralBit32(x))) = (instr.result_id, ops.get(0)) {
                        self.const_map.insert(id, *x);
                    }
                    continue;
                },
                Op::Variable => {
                    let var = Variable {
                        id: instr.result_id.ok_or(Error::CorruptedSpirv)?,
                        ty: instr.result_type.ok_or(Error::CorruptedSpirv)?,
                        store_cls: store_cls_op(ops.get(0))?,
                    };
                    self.vars.push(var);
                    continue;
                },
                // Type declarations are the only untyped results here.
                _ if instr.result_type.is_none() && instr.result_id.is_some() => SpvType::Opaque,
                _ => continue,
            };
            let id = instr.result_id.ok_or(Error::CorruptedSpirv)?;
            self.ty_map.insert(id, ty);
        }
        Ok(())
    }
    fn populate_entry_points(&mut self, instrs: &[Instruction]) -> Result<()> {
        for instr in instrs {
            let ops = &instr.operands;
            let exec_model = match ops.get(0) {
                Some(Operand::ExecutionModel(x)) => *x,
                _ => return Err(Error::CorruptedSpirv),
            };
            let entry_point = EntryPoint {
                exec_model,
                func: id_op(ops.get(1))?,
                name: str_op(ops.get(2))?.to_owned(),
                interface: ops.iter()
                    .skip(3)
                    .map(|op| id_op(Some(op)))
                    .collect::<Result<Vec<_>>>()?,
            };
            self.entry_points.push(entry_point);
        }
        Ok(())
    }
    fn populate_exec_modes(&mut self, instrs: &[Instruction]) -> Result<()> {
        for instr in instrs {
            let ops = &instr.operands;
            let func = id_op(ops.get(0))?;
            let mode = match ops.get(1) {
                Some(Operand::ExecutionMode(x)) => *x,
                _ => return Err(Error::CorruptedSpirv),
            };
            let args = if instr.class.opcode == Op::ExecutionModeId {
                ops.iter()
                    .skip(2)
                    .map(|op| {
                        let id = id_op(Some(op))?;
                        self.const_map.get(&id).copied().ok_or(Error::CorruptedSpirv)
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                deco_params(&ops[2..])
            };
            // `LocalSizeId` only differs from `LocalSize` in how the sizes
            // are given.
            let mode = if mode == ExecutionMode::LocalSizeId { ExecutionMode::LocalSize } else { mode };
            self.exec_modes.insert((func, mode as u32), args);
        }
        Ok(())
    }
}

impl Module {
    pub fn entry_points(&self) -> &[EntryPoint] { &self.entry_points }
    pub fn execution_model(&self) -> Option<ExecutionModel> {
        self.entry_points.first().map(|x| x.exec_model)
    }
    /// Argument `idx` of an execution mode of the first entry point, or 0 if
    /// the mode is absent.
    pub fn execution_mode_argument(&self, mode: ExecutionMode, idx: u32) -> u32 {
        self.entry_points.first()
            .and_then(|entry_point| self.exec_modes.get(&(entry_point.func, mode as u32)))
            .and_then(|args| args.get(idx as usize).copied())
            .unwrap_or(0)
    }

    pub fn name(&self, id: Id) -> &str {
        self.name_map.get(&(id, None)).map(String::as_str).unwrap_or("")
    }
    pub fn member_name(&self, id: Id, member_idx: u32) -> &str {
        self.name_map.get(&(id, Some(member_idx))).map(String::as_str).unwrap_or("")
    }
    pub fn has_decoration(&self, id: Id, deco: Decoration) -> bool {
        self.deco_map.contains_key(&(id, None, deco as u32))
    }
    /// First literal of a decoration, if the decoration is present and has
    /// one.
    pub fn decoration(&self, id: Id, deco: Decoration) -> Option<u32> {
        self.deco_map.get(&(id, None, deco as u32)).and_then(|x| x.first().copied())
    }
    pub fn has_member_decoration(&self, id: Id, member_idx: u32, deco: Decoration) -> bool {
        self.deco_map.contains_key(&(id, Some(member_idx), deco as u32))
    }
    pub fn member_decoration(&self, id: Id, member_idx: u32, deco: Decoration) -> Option<u32> {
        self.deco_map.get(&(id, Some(member_idx), deco as u32)).and_then(|x| x.first().copied())
    }

    fn spv_ty(&self, id: Id) -> Result<&SpvType> {
        self.ty_map.get(&id).ok_or(Error::CorruptedSpirv)
    }
    fn scalar(&self, id: Id) -> Result<(BaseType, u32)> {
        let scalar = match self.spv_ty(id)? {
            SpvType::Bool => (BaseType::Boolean, 1),
            SpvType::Int { nbit, is_signed } => (BaseType::int(*nbit, *is_signed), *nbit),
            SpvType::Float { nbit } => (BaseType::float(*nbit), *nbit),
            _ => return Err(Error::CorruptedSpirv),
        };
        Ok(scalar)
    }
    fn image(&self, id: Id) -> Result<ImageType> {
        match self.spv_ty(id)? {
            SpvType::Image(img_ty) => Ok(img_ty.clone()),
            _ => Err(Error::CorruptedSpirv),
        }
    }
    /// Resolve a type id. Pointer and array wrappers are peeled off and
    /// recorded in the returned type.
    pub fn ty(&self, id: Id) -> Result<Type> {
        let mut ty = Type { id, vecsize: 1, columns: 1, ..Default::default() };
        let mut cur = id;
        loop {
            match self.spv_ty(cur)? {
                SpvType::Pointer { store_cls, target_ty } => {
                    ty.store_cls.get_or_insert(*store_cls);
                    cur = *target_ty;
                },
                SpvType::Array { elem_ty, nelem_id } => {
                    // Lengths computed by `OpSpecConstantOp` are not known
                    // until pipeline creation.
                    let nelem = self.const_map.get(nelem_id).copied().unwrap_or(0);
                    ty.array.push(nelem);
                    cur = *elem_ty;
                },
                SpvType::RuntimeArray { elem_ty } => {
                    ty.array.push(0);
                    cur = *elem_ty;
                },
                _ => break,
            }
        }
        ty.base_ty_id = cur;
        match self.spv_ty(cur)? {
            SpvType::Void => ty.basetype = BaseType::Void,
            SpvType::Bool | SpvType::Int { .. } | SpvType::Float { .. } => {
                let (basetype, width) = self.scalar(cur)?;
                ty.basetype = basetype;
                ty.width = width;
            },
            SpvType::Vector { elem_ty, nelem } => {
                let (basetype, width) = self.scalar(*elem_ty)?;
                ty.basetype = basetype;
                ty.width = width;
                ty.vecsize = *nelem;
            },
            SpvType::Matrix { col_ty, ncol } => {
                if let SpvType::Vector { elem_ty, nelem } = self.spv_ty(*col_ty)? {
                    let (basetype, width) = self.scalar(*elem_ty)?;
                    ty.basetype = basetype;
                    ty.width = width;
                    ty.vecsize = *nelem;
                    ty.columns = *ncol;
                } else { return Err(Error::CorruptedSpirv); }
            },
            SpvType::Image(img_ty) => {
                ty.basetype = BaseType::Image;
                ty.image = Some(img_ty.clone());
            },
            SpvType::SampledImage { img_ty } => {
                ty.basetype = BaseType::SampledImage;
                ty.image = Some(self.image(*img_ty)?);
            },
            SpvType::Sampler => ty.basetype = BaseType::Sampler,
            SpvType::Struct { member_tys } => {
                ty.basetype = BaseType::Struct;
                ty.member_tys = member_tys.clone();
            },
            SpvType::AccelerationStructure => ty.basetype = BaseType::AccelerationStructure,
            SpvType::Opaque => ty.basetype = BaseType::Unknown,
            SpvType::Pointer { .. } | SpvType::Array { .. } | SpvType::RuntimeArray { .. } => unreachable!(),
        }
        Ok(ty)
    }
}

// Explicit layout queries. `ty` is always the resolved type of a struct.
impl Module {
    pub fn member_offset(&self, ty: &Type, member_idx: u32) -> Result<u32> {
        self.member_decoration(ty.base_ty_id, member_idx, Decoration::Offset)
            .ok_or(Error::MissingDecoration(Decoration::Offset))
    }
    pub fn member_matrix_stride(&self, ty: &Type, member_idx: u32) -> Result<u32> {
        self.member_decoration(ty.base_ty_id, member_idx, Decoration::MatrixStride)
            .ok_or(Error::MissingDecoration(Decoration::MatrixStride))
    }
    /// Array stride is decorated on the array type; a member decoration is
    /// accepted as well.
    pub fn member_array_stride(&self, ty: &Type, member_idx: u32) -> Result<u32> {
        let member_ty = ty.member_ty(member_idx).ok_or(Error::CorruptedSpirv)?;
        self.decoration(member_ty, Decoration::ArrayStride)
            .or_else(|| self.member_decoration(ty.base_ty_id, member_idx, Decoration::ArrayStride))
            .ok_or(Error::MissingDecoration(Decoration::ArrayStride))
    }
    pub fn declared_struct_member_size(&self, ty: &Type, member_idx: u32) -> Result<u32> {
        if ty.member_tys.is_empty() { return Err(Error::EmptyStruct); }
        let member_ty = ty.member_ty(member_idx).ok_or(Error::CorruptedSpirv)?;
        let member_ty = self.ty(member_ty)?;
        if member_ty.basetype.is_opaque() { return Err(Error::OpaqueSize); }
        if let Some(&nelem) = member_ty.array.first() {
            if nelem == 0 { return Err(Error::UnsizedType); }
            return Ok(self.member_array_stride(ty, member_idx)? * nelem);
        }
        if member_ty.basetype == BaseType::Struct {
            return self.declared_struct_size(&member_ty);
        }
        if !member_ty.is_matrix() {
            return Ok(member_ty.vecsize * member_ty.width / 8);
        }
        let stride = self.member_matrix_stride(ty, member_idx)?;
        if self.has_member_decoration(ty.base_ty_id, member_idx, Decoration::RowMajor) {
            Ok(stride * member_ty.vecsize)
        } else {
            Ok(stride * member_ty.columns)
        }
    }
    /// Size of a struct as declared, i.e. the end of its member with the
    /// largest offset. No trailing padding is added.
    pub fn declared_struct_size(&self, ty: &Type) -> Result<u32> {
        if ty.member_tys.is_empty() { return Err(Error::EmptyStruct); }
        let mut last_offset = 0;
        let mut last_idx = 0;
        for i in 0..ty.nmember() {
            let offset = self.member_offset(ty, i)?;
            if offset > last_offset {
                last_offset = offset;
                last_idx = i;
            }
        }
        Ok(last_offset + self.declared_struct_member_size(ty, last_idx)?)
    }
}

impl Module {
    fn is_builtin_var(&self, var_id: Id, ty: &Type) -> bool {
        if self.has_decoration(var_id, Decoration::BuiltIn) { return true; }
        ty.basetype == BaseType::Struct && (0..ty.nmember())
            .any(|i| self.has_member_decoration(ty.base_ty_id, i, Decoration::BuiltIn))
    }
    fn is_interface_var(&self, var_id: Id) -> bool {
        self.entry_points.first()
            .map(|entry_point| entry_point.interface.contains(&var_id))
            .unwrap_or(true)
    }
    fn block_name(&self, var_id: Id, ty_id: Id) -> String {
        let ty_name = self.name(ty_id);
        if !ty_name.is_empty() { return ty_name.to_owned(); }
        let var_name = self.name(var_id);
        if !var_name.is_empty() { return var_name.to_owned(); }
        format!("_{}_{}", ty_id, var_id)
    }
    /// Enumerate global variables by the role they play in the shader
    /// interface. Buffer blocks are named after their block type.
    pub fn shader_resources(&self) -> Result<ShaderResources> {
        let mut out = ShaderResources::default();
        for var in self.vars.iter() {
            match var.store_cls {
                StorageClass::Input | StorageClass::Output | StorageClass::Uniform |
                StorageClass::StorageBuffer | StorageClass::PushConstant |
                StorageClass::UniformConstant => {},
                // Workgroup, private and other storage never reach the
                // interface.
                _ => continue,
            }
            let ty = self.ty(var.ty)?;
            let rsc = Resource {
                id: var.id,
                ty_id: var.ty,
                base_ty_id: ty.base_ty_id,
                name: self.name(var.id).to_owned(),
            };
            match var.store_cls {
                StorageClass::Input | StorageClass::Output => {
                    if self.is_builtin_var(var.id, &ty) || !self.is_interface_var(var.id) { continue; }
                    if var.store_cls == StorageClass::Input {
                        out.stage_inputs.push(rsc);
                    } else {
                        out.stage_outputs.push(rsc);
                    }
                },
                StorageClass::Uniform => {
                    let rsc = Resource { name: self.block_name(var.id, ty.base_ty_id), ..rsc };
                    if self.has_decoration(ty.base_ty_id, Decoration::Block) {
                        out.uniform_buffers.push(rsc);
                    } else if self.has_decoration(ty.base_ty_id, Decoration::BufferBlock) {
                        out.storage_buffers.push(rsc);
                    }
                },
                StorageClass::StorageBuffer => {
                    let rsc = Resource { name: self.block_name(var.id, ty.base_ty_id), ..rsc };
                    out.storage_buffers.push(rsc);
                },
                StorageClass::PushConstant => out.push_constant_buffers.push(rsc),
                StorageClass::UniformConstant => match (ty.basetype, &ty.image) {
                    (BaseType::Image, Some(img_ty)) if img_ty.dim == Dim::DimSubpassData => {
                        out.subpass_inputs.push(rsc);
                    },
                    (BaseType::Image, Some(img_ty)) if img_ty.sampled == 2 => {
                        out.storage_images.push(rsc);
                    },
                    (BaseType::Image, _) => out.separate_images.push(rsc),
                    (BaseType::SampledImage, _) => out.sampled_images.push(rsc),
                    (BaseType::Sampler, _) => out.separate_samplers.push(rsc),
                    _ => {},
                },
                _ => {},
            }
        }
        Ok(out)
    }
}
