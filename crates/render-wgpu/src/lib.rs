//! WGSL graphics devices for the shader program lifecycle.
//!
//! [`NagaDevice`] compiles and links WGSL on the CPU with naga and needs no
//! GPU; the CLI and tests drive it directly. [`WgpuDevice`] layers wgpu
//! render pipelines on top of it for the viewer.
//!
//! # Invariants
//! - A stage compiles only if it parses, validates and has an entry point
//!   for its stage.
//! - A program links only if every fragment input is written by the vertex
//!   stage and every uniform is a `mat4x4<f32>` in bind group 0.
//! - A bound program that is deleted stays drawable until another program
//!   is bound.

mod mesh;
mod naga_device;
mod shaders;
mod wgpu_device;

pub use mesh::{GpuMesh, Vertex, cube_mesh};
pub use naga_device::{LinkedProgram, NagaDevice};
pub use shaders::{WORLD_FRAG_FILE, WORLD_FRAG_WGSL, WORLD_VERT_FILE, WORLD_VERT_WGSL};
pub use wgpu_device::WgpuDevice;

pub fn crate_info() -> &'static str {
    "hotshade-render-wgpu v0.1.0"
}
