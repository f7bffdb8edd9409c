use glam::Mat4;
use hotshade_common::{ProgramId, ShaderId, ShaderStage, UniformLocation};
use std::fmt;

/// Compiler or linker output returned by a device when a build step fails.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticLog(pub String);

impl DiagnosticLog {
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DiagnosticLog {
    fn from(log: String) -> Self {
        Self(log)
    }
}

impl From<&str> for DiagnosticLog {
    fn from(log: &str) -> Self {
        Self(log.to_owned())
    }
}

/// Capability surface of the graphics context that builds and runs programs.
///
/// The context is passed explicitly to every program operation rather than
/// reached through global state, so a recording stub can stand in for a GPU.
/// Implementations must be driven from a single thread.
///
/// Handles are opaque IDs owned by whoever requested them. Deleting a program
/// that is currently bound must leave it usable until another program is
/// bound.
pub trait GraphicsDevice {
    /// Compile one stage. On failure no stage object is left behind.
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, DiagnosticLog>;

    fn delete_shader(&mut self, shader: ShaderId);

    /// Link a vertex and a fragment stage. The stages stay owned by the
    /// caller and may be deleted as soon as this returns.
    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, DiagnosticLog>;

    fn delete_program(&mut self, program: ProgramId);

    /// Make `program` the target of subsequent draw calls.
    fn use_program(&mut self, program: ProgramId);

    /// Location of an active uniform, or `None` if the name does not resolve.
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Upload a column-major 4x4 matrix to a uniform of `program`.
    fn uniform_mat4(&mut self, program: ProgramId, location: UniformLocation, value: &Mat4);
}
