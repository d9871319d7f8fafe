//! SPIR-V Stripping and Remapping
//!
//! Remove debug information from a module and optionally renumber its ids so
//! that equivalent modules compress and compare better.
use std::collections::{HashMap, HashSet};
use rspirv::binary::Assemble;
use rspirv::dr::{self, Instruction, Operand};
use rspirv::spirv::{Decoration, Op};
use log::trace;
use crate::spv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemapMode {
    /// Only remove debug information.
    StripOnly,
    /// Remove debug information and renumber ids densely.
    StripAndRemap,
}

/// Transforms a word buffer in place. Problems are reported through `on_err`
/// and progress through `on_log`; a remapper never panics on bad input.
pub trait Remapper {
    fn remap(
        &self,
        words: &mut Vec<u32>,
        mode: RemapMode,
        on_err: &mut dyn FnMut(&str),
        on_log: &mut dyn FnMut(&str),
    );
}

/// Runs a `Remapper` and collects its errors. Log output is discarded.
#[derive(Debug, Default)]
pub struct ShaderRemapper<R> {
    remapper: R,
    err_msg: String,
}
impl<R: Remapper> ShaderRemapper<R> {
    pub fn new(remapper: R) -> ShaderRemapper<R> {
        ShaderRemapper { remapper, err_msg: String::new() }
    }
    /// Returns an empty buffer for empty input or if any error was reported.
    pub fn remap(&mut self, ir: &[u32], mode: RemapMode) -> Vec<u32> {
        self.err_msg.clear();
        if ir.is_empty() { return Vec::new(); }
        let mut words = ir.to_vec();
        let err_msg = &mut self.err_msg;
        let mut on_err = |msg: &str| {
            if !err_msg.is_empty() { err_msg.push('\n'); }
            err_msg.push_str(msg);
        };
        self.remapper.remap(&mut words, mode, &mut on_err, &mut |_| {});
        if self.err_msg.is_empty() { words } else { Vec::new() }
    }
    /// Errors of the last `remap`, one per line.
    pub fn error_message(&self) -> &str { &self.err_msg }
}

fn visit_instrs_mut(module: &mut dr::Module, f: &mut dyn FnMut(&mut Instruction)) {
    let globals = module.capabilities.iter_mut()
        .chain(module.extensions.iter_mut())
        .chain(module.ext_inst_imports.iter_mut())
        .chain(module.memory_model.iter_mut())
        .chain(module.entry_points.iter_mut())
        .chain(module.execution_modes.iter_mut())
        .chain(module.debug_string_source.iter_mut())
        .chain(module.debug_names.iter_mut())
        .chain(module.debug_module_processed.iter_mut())
        .chain(module.annotations.iter_mut())
        .chain(module.types_global_values.iter_mut());
    for instr in globals { f(instr); }
    for func in module.functions.iter_mut() {
        for instr in func.def.iter_mut().chain(func.parameters.iter_mut()) { f(instr); }
        for block in func.blocks.iter_mut() {
            for instr in block.label.iter_mut().chain(block.instructions.iter_mut()) { f(instr); }
        }
        for instr in func.end.iter_mut() { f(instr); }
    }
}
fn count_instrs(module: &mut dr::Module) -> usize {
    let mut n = 0;
    visit_instrs_mut(module, &mut |_| n += 1);
    n
}
fn operand_id_mut(op: &mut Operand) -> Option<&mut u32> {
    match op {
        Operand::IdRef(x) | Operand::IdScope(x) | Operand::IdMemorySemantics(x) => Some(x),
        _ => None,
    }
}

fn is_line(instr: &Instruction) -> bool {
    match instr.class.opcode {
        Op::Line | Op::NoLine => true,
        _ => false,
    }
}
fn is_user_semantic(instr: &Instruction) -> bool {
    match instr.class.opcode {
        Op::DecorateString | Op::MemberDecorateString => instr.operands.iter().any(|op| match op {
            Operand::Decoration(Decoration::UserSemantic) |
            Operand::Decoration(Decoration::UserTypeGOOGLE) => true,
            _ => false,
        }),
        _ => false,
    }
}

/// Remove names, source text, line info and processing records. Strings that
/// are still referenced by the rest of the module are kept.
fn strip(module: &mut dr::Module) {
    module.debug_names.clear();
    module.debug_module_processed.clear();
    module.annotations.retain(|instr| !is_user_semantic(instr));
    module.types_global_values.retain(|instr| !is_line(instr));
    for func in module.functions.iter_mut() {
        for block in func.blocks.iter_mut() {
            block.instructions.retain(|instr| !is_line(instr));
        }
    }
    let debug_string_source = std::mem::replace(&mut module.debug_string_source, Vec::new());
    let mut used_ids = HashSet::new();
    visit_instrs_mut(module, &mut |instr| {
        used_ids.extend(instr.operands.iter_mut().filter_map(|op| operand_id_mut(op).map(|x| *x)));
    });
    module.debug_string_source = debug_string_source.into_iter()
        .filter(|instr| {
            instr.class.opcode == Op::String &&
                instr.result_id.map(|id| used_ids.contains(&id)).unwrap_or(false)
        })
        .collect();
}

/// Renumber ids from 1 in order of first appearance. Returns the new id
/// bound.
fn compact_ids(module: &mut dr::Module) -> u32 {
    let mut id_map = HashMap::<u32, u32>::new();
    let mut remap = |id: &mut u32| {
        let next = id_map.len() as u32 + 1;
        *id = *id_map.entry(*id).or_insert(next);
    };
    visit_instrs_mut(module, &mut |instr| {
        if let Some(id) = instr.result_id.as_mut() { remap(id); }
        if let Some(id) = instr.result_type.as_mut() { remap(id); }
        for op in instr.operands.iter_mut() {
            if let Some(id) = operand_id_mut(op) { remap(id); }
        }
    });
    let bound = id_map.len() as u32 + 1;
    if let Some(header) = module.header.as_mut() { header.bound = bound; }
    bound
}

/// Built-in remapper operating on the module structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpirvRemapper;
impl Remapper for SpirvRemapper {
    fn remap(
        &self,
        words: &mut Vec<u32>,
        mode: RemapMode,
        on_err: &mut dyn FnMut(&str),
        on_log: &mut dyn FnMut(&str),
    ) {
        let mut module = match spv::load_words(&words[..]) {
            Ok(x) => x,
            Err(e) => {
                on_err(&format!("invalid spirv binary: {:?}", e));
                return;
            },
        };
        let ninstr = count_instrs(&mut module);
        strip(&mut module);
        on_log(&format!("stripped {} instructions", ninstr - count_instrs(&mut module)));
        if mode == RemapMode::StripAndRemap {
            let bound = compact_ids(&mut module);
            on_log(&format!("remapped ids, new bound is {}", bound));
        }
        *words = module.assemble();
        trace!("remapped spirv binary has {} words", words.len());
    }
}
