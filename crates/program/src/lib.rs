//! Shader program lifecycle: compile, link, hot reload, uniform upload.
//!
//! A [`ShaderProgram`] owns one linked program built from a vertex and a
//! fragment source file. Polling [`ShaderProgram::check_for_changes`] once per
//! frame rebuilds the program when either file's modification time moves, and
//! swaps the new program in only after it linked.
//!
//! The graphics context is a [`GraphicsDevice`] passed to each call; source
//! files are read through a [`SourceFs`].
//!
//! # Invariants
//! - The live handle is always a successfully linked program.
//! - A failed rebuild leaves handle and watermarks untouched.
//! - The old handle is released only after its replacement linked.

mod device;
mod error;
#[cfg(test)]
mod mock;
mod program;
mod source;
mod status;

pub use device::{DiagnosticLog, GraphicsDevice};
pub use error::ProgramError;
pub use program::{ReloadOutcome, ShaderProgram};
pub use source::{SourceFs, StdFs};
pub use status::ProgramStatus;

pub fn crate_info() -> &'static str {
    "hotshade-program v0.1.0"
}
