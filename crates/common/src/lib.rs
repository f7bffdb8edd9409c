//! Shared types for the hotshade workspace.
//!
//! Device resources are referred to by small integer handles so that no crate
//! ever holds a backend object directly. The program lifecycle crate is the
//! only owner of the handles it creates.

mod types;

pub use types::{ProgramId, ShaderId, ShaderStage, UniformLocation};

pub fn crate_info() -> &'static str {
    "hotshade-common v0.1.0"
}
