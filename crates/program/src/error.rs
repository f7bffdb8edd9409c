use hotshade_common::ShaderStage;
use std::path::PathBuf;

/// Errors from building or reloading a shader program.
#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("failed to compile {stage} shader:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("failed to link program:\n{log}")]
    Link { log: String },
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProgramError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error came from the device rather than the file system.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, Self::Compile { .. } | Self::Link { .. })
    }
}
