//! SPIR-V Reflection
//!
//! Parse SPIR-V binaries and answer queries about the materials they declare.
mod error;
mod module;
mod ty;

pub use error::Error;
pub use module::*;
pub use ty::*;
pub use rspirv::spirv;
use std::iter::FromIterator;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use rspirv::binary::{Consumer, ParseAction, ParseState};
use rspirv::dr;

pub type Result<T> = std::result::Result<T, Error>;
pub type Id = u32;

pub const MAGIC_NUMBER: u32 = 0x0723_0203;

/// `dr::Loader` rejects `OpExecutionModeId` as an instruction outside of any
/// function, so those are set aside and appended to the execution modes.
struct ModuleLoader {
    loader: dr::Loader,
    exec_mode_ids: Vec<dr::Instruction>,
}
impl Consumer for ModuleLoader {
    fn initialize(&mut self) -> ParseAction { self.loader.initialize() }
    fn finalize(&mut self) -> ParseAction { self.loader.finalize() }
    fn consume_header(&mut self, header: dr::ModuleHeader) -> ParseAction {
        self.loader.consume_header(header)
    }
    fn consume_instruction(&mut self, instr: dr::Instruction) -> ParseAction {
        if instr.class.opcode == spirv::Op::ExecutionModeId {
            self.exec_mode_ids.push(instr);
            ParseAction::Continue
        } else {
            self.loader.consume_instruction(instr)
        }
    }
}

/// Load SPIR-V words into an `rspirv` module.
pub fn load_words(words: &[u32]) -> std::result::Result<dr::Module, ParseState> {
    let mut loader = ModuleLoader {
        loader: dr::Loader::new(),
        exec_mode_ids: Vec::new(),
    };
    rspirv::binary::parse_words(words, &mut loader)?;
    let mut module = loader.loader.module();
    module.execution_modes.extend(loader.exec_mode_ids);
    Ok(module)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpirvBinary(Vec<u32>);
impl From<Vec<u32>> for SpirvBinary {
    fn from(x: Vec<u32>) -> Self { SpirvBinary(x) }
}
impl FromIterator<u32> for SpirvBinary {
    fn from_iter<I: IntoIterator<Item=u32>>(iter: I) -> Self { SpirvBinary(iter.into_iter().collect::<Vec<u32>>()) }
}

impl SpirvBinary {
    /// Decode a byte buffer into words. The byte order is detected from the
    /// magic number; a trailing partial word is dropped.
    pub fn from_bytes(bytes: &[u8]) -> SpirvBinary {
        let nword = bytes.len() / 4;
        let mut words = vec![0; nword];
        let bytes = &bytes[..nword * 4];
        if nword > 0 && BigEndian::read_u32(bytes) == MAGIC_NUMBER {
            BigEndian::read_u32_into(bytes, &mut words);
        } else {
            LittleEndian::read_u32_into(bytes, &mut words);
        }
        SpirvBinary(words)
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.0.len() * 4];
        LittleEndian::write_u32_into(&self.0, &mut bytes);
        bytes
    }
    pub fn words(&self) -> &[u32] { &self.0 }
    pub fn into_words(self) -> Vec<u32> { self.0 }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn parse(&self) -> Result<Module> { Module::parse(&self.0) }
}
