//! Error taxonomy shared by both backends.
//!
//! Every variant is fatal where it is raised. Callers propagate with `?` and
//! the binary turns the result into an `anyhow::Error` on the way out.

use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::{
    data_structures::any::SlotError,
    renderer::{Operation, RendererState},
};

/// Which half of shader processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderPhase {
    Compile,
    Link,
}

impl fmt::Display for ShaderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderPhase::Compile => f.write_str("compile"),
            ShaderPhase::Link => f.write_str("link"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// Missing extension, no usable device or queue, surface or swapchain failure.
    #[error("environment setup failed while {step}: {reason}")]
    EnvironmentSetup { step: &'static str, reason: String },

    /// Buffer, image, pipeline or descriptor allocation failure.
    #[error("failed to create {resource}: {reason}")]
    ResourceCreation { resource: &'static str, reason: String },

    #[error("shader {} failed to {phase}:\n{diagnostics}", .path.display())]
    Shader {
        path: PathBuf,
        phase: ShaderPhase,
        diagnostics: String,
    },

    #[error(transparent)]
    TypeMismatch(#[from] SlotError),

    /// Image acquisition, submission or presentation failed.
    #[error("{operation} failed: {reason}")]
    Synchronization { operation: &'static str, reason: String },

    #[error("cannot {operation} a renderer that is {state}")]
    InvalidState {
        operation: Operation,
        state: RendererState,
    },

    #[error("failed to load model {}: {source}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn setup(step: &'static str, reason: impl fmt::Display) -> Self {
        RenderError::EnvironmentSetup {
            step,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn resource(resource: &'static str, reason: impl fmt::Display) -> Self {
        RenderError::ResourceCreation {
            resource,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn sync(operation: &'static str, reason: impl fmt::Display) -> Self {
        RenderError::Synchronization {
            operation,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
