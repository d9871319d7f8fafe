//! Reflection
//!
//! Build a `ShaderDescription` out of a parsed module.
use log::{debug, trace, warn};
use crate::desc::*;
use crate::spv::{self, BaseType, Module, Resource, ResourceType, Type};
use crate::spv::spirv::{Decoration, Dim, ExecutionMode};

fn vec_var_type(ty: &Type, comp_ty: VariableType) -> VariableType {
    match ty.vecsize {
        1..=4 => comp_ty.offset(ty.vecsize - 1),
        _ => VariableType::Unknown,
    }
}

fn mat_var_type(ty: &Type, comp_ty: VariableType) -> VariableType {
    let offset = match (ty.columns, ty.vecsize) {
        (2, 3) => 5,
        (2, 4) => 6,
        (2, _) => 4,
        (3, 2) => 8,
        (3, 4) => 9,
        (3, _) => 7,
        (4, 2) => 11,
        (4, 3) => 12,
        (4, _) => 10,
        _ => return VariableType::Unknown,
    };
    comp_ty.offset(offset)
}

fn sampled_image_var_type(ty: &Type) -> VariableType {
    let img_ty = match &ty.image { Some(x) => x, None => return VariableType::Unknown };
    use VariableType::*;
    match (img_ty.dim, img_ty.is_array, img_ty.is_multisampled) {
        (Dim::Dim1D, false, _) => Sampler1D,
        (Dim::Dim1D, true, _) => Sampler1DArray,
        (Dim::Dim2D, false, false) => Sampler2D,
        (Dim::Dim2D, false, true) => Sampler2DMS,
        (Dim::Dim2D, true, false) => Sampler2DArray,
        (Dim::Dim2D, true, true) => Sampler2DMSArray,
        (Dim::Dim3D, false, _) => Sampler3D,
        (Dim::Dim3D, true, _) => Sampler3DArray,
        (Dim::DimCube, false, _) => SamplerCube,
        (Dim::DimCube, true, _) => SamplerCubeArray,
        (Dim::DimRect, _, _) => SamplerRect,
        (Dim::DimBuffer, _, _) => SamplerBuffer,
        _ => Unknown,
    }
}

fn image_var_type(ty: &Type) -> VariableType {
    let img_ty = match &ty.image { Some(x) => x, None => return VariableType::Unknown };
    use VariableType::*;
    match (img_ty.dim, img_ty.is_array, img_ty.is_multisampled) {
        (Dim::Dim1D, false, _) => Image1D,
        (Dim::Dim1D, true, _) => Image1DArray,
        (Dim::Dim2D, false, false) => Image2D,
        (Dim::Dim2D, false, true) => Image2DMS,
        (Dim::Dim2D, true, false) => Image2DArray,
        (Dim::Dim2D, true, true) => Image2DMSArray,
        (Dim::Dim3D, false, _) => Image3D,
        (Dim::Dim3D, true, _) => Image3DArray,
        (Dim::DimCube, false, _) => ImageCube,
        (Dim::DimCube, true, _) => ImageCubeArray,
        (Dim::DimRect, _, _) => ImageRect,
        (Dim::DimBuffer, _, _) => ImageBuffer,
        _ => Unknown,
    }
}

/// Classify a resolved type. Types with no counterpart in the description
/// map to `Unknown` so the caller can leave them out.
pub fn var_type(ty: &Type) -> VariableType {
    match ty.basetype {
        BaseType::Float => if ty.is_matrix() {
            mat_var_type(ty, VariableType::Float)
        } else {
            vec_var_type(ty, VariableType::Float)
        },
        BaseType::Double => if ty.is_matrix() {
            mat_var_type(ty, VariableType::Double)
        } else {
            vec_var_type(ty, VariableType::Double)
        },
        BaseType::UInt32 => vec_var_type(ty, VariableType::Uint),
        BaseType::Int32 => vec_var_type(ty, VariableType::Int),
        // No target language takes booleans across the interface.
        BaseType::Boolean => vec_var_type(ty, VariableType::Uint),
        BaseType::SampledImage => sampled_image_var_type(ty),
        BaseType::Image => image_var_type(ty),
        BaseType::Struct => VariableType::Struct,
        basetype => {
            warn!("unsupported base type {:?} of type {}", basetype, ty.id);
            VariableType::Unknown
        },
    }
}

fn in_out_var(module: &Module, rsc: &Resource) -> spv::Result<InOutVariable> {
    let ty = module.ty(rsc.ty_id)?;
    let mut var = InOutVariable {
        name: rsc.name.clone(),
        ty: var_type(&ty),
        location: module.decoration(rsc.id, Decoration::Location),
        binding: module.decoration(rsc.id, Decoration::Binding),
        desc_set: module.decoration(rsc.id, Decoration::DescriptorSet),
        ..Default::default()
    };
    if let (BaseType::Image, Some(img_ty)) = (ty.basetype, &ty.image) {
        var.image_fmt = Some(ImageFormat::from_spv_def(img_ty.fmt as u32));
        // Always reported as read/write regardless of `NonReadable` and
        // `NonWritable` decorations; consumers rely on this.
        var.image_access = Some(ImageAccess::ReadWrite);
    }
    Ok(var)
}

fn block_var(module: &Module, ty: &Type, member_idx: u32) -> spv::Result<BlockVariable> {
    let member_ty = ty.member_ty(member_idx).ok_or(spv::Error::CorruptedSpirv)?;
    let member_ty = module.ty(member_ty)?;
    let mut var = BlockVariable {
        name: module.member_name(ty.base_ty_id, member_idx).to_owned(),
        ty: var_type(&member_ty),
        offset: module.member_offset(ty, member_idx).unwrap_or(0),
        size: module.declared_struct_member_size(ty, member_idx).unwrap_or(0),
        array_dims: member_ty.array.clone(),
        is_row_major: module.has_member_decoration(ty.base_ty_id, member_idx, Decoration::RowMajor),
        ..Default::default()
    };
    if member_ty.is_array() {
        var.array_stride = module.member_array_stride(ty, member_idx).ok();
    }
    if member_ty.is_matrix() {
        var.matrix_stride = module.member_matrix_stride(ty, member_idx).ok();
    }
    if var.ty == VariableType::Struct {
        var.struct_members = block_members(module, &member_ty)?;
    }
    Ok(var)
}

fn block_members(module: &Module, ty: &Type) -> spv::Result<Vec<BlockVariable>> {
    let mut members = Vec::with_capacity(ty.member_tys.len());
    for i in 0..ty.nmember() {
        let member = block_var(module, ty, i)?;
        if member.ty == VariableType::Unknown {
            trace!("dropped member {} of struct {}", i, ty.base_ty_id);
            continue;
        }
        members.push(member);
    }
    Ok(members)
}

/// Resolve a block resource, or `None` if its type cannot be represented.
fn block_ty(module: &Module, rsc: &Resource) -> spv::Result<Option<Type>> {
    let ty = module.ty(rsc.base_ty_id)?;
    if var_type(&ty) == VariableType::Unknown { Ok(None) } else { Ok(Some(ty)) }
}

fn instance_name(module: &Module, rsc: &Resource) -> String {
    let name = module.name(rsc.id);
    if name.is_empty() { format!("_{}", rsc.id) } else { name.to_owned() }
}

fn reflect_in_out_vars(module: &Module, rscs: &[Resource]) -> spv::Result<Vec<InOutVariable>> {
    let mut vars = Vec::with_capacity(rscs.len());
    for rsc in rscs {
        let var = in_out_var(module, rsc)?;
        if var.ty == VariableType::Unknown {
            trace!("dropped resource '{}' ({})", rsc.name, rsc.id);
            continue;
        }
        vars.push(var);
    }
    Ok(vars)
}

/// Walk every interface resource of the module and collect what the
/// pipeline needs to know about it.
pub fn reflect(module: &Module) -> spv::Result<ShaderDescription> {
    let rscs = module.shader_resources()?;
    let mut desc = ShaderDescription::default();
    for (i, x) in desc.local_size.iter_mut().enumerate() {
        *x = module.execution_mode_argument(ExecutionMode::LocalSize, i as u32);
    }

    desc.input_vars = reflect_in_out_vars(module, rscs.get(ResourceType::StageInput))?;
    desc.output_vars = reflect_in_out_vars(module, rscs.get(ResourceType::StageOutput))?;

    for rsc in rscs.get(ResourceType::UniformBuffer) {
        let ty = match block_ty(module, rsc)? { Some(x) => x, None => continue };
        let block = UniformBlock {
            block_name: rsc.name.clone(),
            struct_name: instance_name(module, rsc),
            size: module.declared_struct_size(&ty).unwrap_or(0),
            binding: module.decoration(rsc.id, Decoration::Binding),
            desc_set: module.decoration(rsc.id, Decoration::DescriptorSet),
            members: block_members(module, &ty)?,
        };
        desc.uniform_blocks.push(block);
    }

    for rsc in rscs.get(ResourceType::PushConstant) {
        let ty = match block_ty(module, rsc)? { Some(x) => x, None => continue };
        let block = PushConstantBlock {
            name: rsc.name.clone(),
            size: module.declared_struct_size(&ty).unwrap_or(0),
            members: block_members(module, &ty)?,
        };
        desc.push_constant_blocks.push(block);
    }

    for rsc in rscs.get(ResourceType::StorageBuffer) {
        let ty = match block_ty(module, rsc)? { Some(x) => x, None => continue };
        let block = StorageBlock {
            block_name: rsc.name.clone(),
            instance_name: module.name(rsc.id).to_owned(),
            known_size: module.declared_struct_size(&ty).ok(),
            binding: module.decoration(rsc.id, Decoration::Binding),
            desc_set: module.decoration(rsc.id, Decoration::DescriptorSet),
            members: block_members(module, &ty)?,
        };
        desc.storage_blocks.push(block);
    }

    desc.combined_image_samplers = reflect_in_out_vars(module, rscs.get(ResourceType::SampledImage))?;
    desc.storage_images = reflect_in_out_vars(module, rscs.get(ResourceType::StorageImage))?;

    debug!("reflected {} inputs, {} outputs, {} uniform blocks, {} push constant blocks, \
        {} storage blocks, {} sampled images, {} storage images",
        desc.input_vars.len(), desc.output_vars.len(), desc.uniform_blocks.len(),
        desc.push_constant_blocks.len(), desc.storage_blocks.len(),
        desc.combined_image_samplers.len(), desc.storage_images.len());
    Ok(desc)
}
