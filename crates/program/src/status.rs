use hotshade_common::ProgramId;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Point-in-time summary of a program lifecycle for tooling and overlays.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramStatus {
    pub program: ProgramId,
    pub vertex_path: PathBuf,
    pub fragment_path: PathBuf,
    pub vertex_modified: SystemTime,
    pub fragment_modified: SystemTime,
    /// Successful hot swaps since creation.
    pub generation: u64,
    /// Diagnostic of a rejected rebuild still pending a fix.
    pub last_error: Option<String>,
}

impl ProgramStatus {
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }
}

impl fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} generation={} vertex={} fragment={}",
            self.program,
            self.generation,
            self.vertex_path.display(),
            self.fragment_path.display()
        )?;
        if let Some(error) = &self.last_error {
            let first_line = error.lines().next().unwrap_or_default();
            write!(f, " (reload rejected: {first_line})")?;
        }
        Ok(())
    }
}
