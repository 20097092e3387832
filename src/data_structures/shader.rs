use std::{cell::RefCell, fmt, path::PathBuf};

use crate::data_structures::any::AnySlot;

/// Pipeline stage a shader source is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// A GLSL source file plus the backend module compiled from it.
///
/// Shared between objects as `Rc<Shader>`. The module lives in
/// `backend_data` and is compiled the first time any object using it is bound.
#[derive(Debug)]
pub struct Shader {
    pub path: PathBuf,
    pub stage: ShaderStage,
    pub backend_data: RefCell<AnySlot>,
}

impl Shader {
    pub fn new(path: impl Into<PathBuf>, stage: ShaderStage) -> Self {
        Self {
            path: path.into(),
            stage,
            backend_data: RefCell::new(AnySlot::new()),
        }
    }

    pub fn vertex(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ShaderStage::Vertex)
    }

    pub fn fragment(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ShaderStage::Fragment)
    }

    pub fn is_compiled(&self) -> bool {
        !self.backend_data.borrow().is_empty()
    }
}
