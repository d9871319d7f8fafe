use std::fmt;
use std::error::Error as StdError;
use crate::spv;

#[derive(Debug)]
pub enum Error {
    Spirv(spv::Error),
    NoSpirv,
    Backend(String),
    Translation(String),
    Remap(String),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            Spirv(err) => write!(f, "{}", err),
            NoSpirv => write!(f, "no spirv binary is loaded"),
            Backend(msg) => write!(f, "backend unavailable: {}", msg),
            Translation(msg) => write!(f, "translation failed: {}", msg),
            Remap(msg) => write!(f, "remapping failed: {}", msg),
        }
    }
}
impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Spirv(err) => Some(err),
            _ => None,
        }
    }
}

impl From<spv::Error> for Error {
    fn from(x: spv::Error) -> Error { Error::Spirv(x) }
}

pub type Result<T> = std::result::Result<T, Error>;
