//! Recording device and in-memory sources for lifecycle tests.

use crate::device::{DiagnosticLog, GraphicsDevice};
use crate::source::SourceFs;
use glam::Mat4;
use hotshade_common::{ProgramId, ShaderId, ShaderStage, UniformLocation};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime};

/// Marker that makes [`RecordingDevice`] reject a stage at compile time.
pub const COMPILE_ERROR: &str = "syntax error";
/// Marker that makes [`RecordingDevice`] reject a program at link time.
pub const LINK_ERROR: &str = "#link-error";

/// Device stub that counts every call and hands out sequential handles.
///
/// Uniforms are declared with lines of the form `uniform mat4 <name>;`.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: u32,
    sources: HashMap<ShaderId, String>,
    uniforms: HashMap<ProgramId, Vec<String>>,
    pub live_shaders: BTreeSet<ShaderId>,
    pub live_programs: BTreeSet<ProgramId>,
    pub compiles: usize,
    pub links: usize,
    pub lookups: usize,
    pub deleted_programs: Vec<ProgramId>,
    pub binds: usize,
    pub bound: Option<ProgramId>,
    pub uploads: Vec<(ProgramId, UniformLocation, Mat4)>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of calls made through the device trait.
    pub fn calls(&self) -> usize {
        self.compiles
            + self.links
            + self.lookups
            + self.deleted_programs.len()
            + self.uploads.len()
            + self.binds
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsDevice for RecordingDevice {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, DiagnosticLog> {
        self.compiles += 1;
        if source.contains(COMPILE_ERROR) {
            return Err(format!("{stage}: 0:1: {COMPILE_ERROR}").into());
        }
        let id = ShaderId(self.allocate());
        self.live_shaders.insert(id);
        self.sources.insert(id, source.to_owned());
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        assert!(self.live_shaders.remove(&shader), "double delete of {shader}");
        self.sources.remove(&shader);
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, DiagnosticLog> {
        self.links += 1;
        let sources = [&self.sources[&vertex], &self.sources[&fragment]];
        if sources.iter().any(|s| s.contains(LINK_ERROR)) {
            return Err("varying mismatch between stages".into());
        }
        let uniforms = sources
            .iter()
            .flat_map(|s| s.lines())
            .filter_map(|line| line.trim().strip_prefix("uniform "))
            .filter_map(|decl| decl.trim_end_matches(';').split_whitespace().last())
            .map(str::to_owned)
            .collect();
        let id = ProgramId(self.allocate());
        self.live_programs.insert(id);
        self.uniforms.insert(id, uniforms);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        assert!(self.live_programs.remove(&program), "double delete of {program}");
        self.deleted_programs.push(program);
    }

    fn use_program(&mut self, program: ProgramId) {
        self.binds += 1;
        self.bound = Some(program);
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.lookups += 1;
        self.uniforms
            .get(&program)?
            .iter()
            .position(|n| n == name)
            .map(|i| UniformLocation(i as u32))
    }

    fn uniform_mat4(&mut self, program: ProgramId, location: UniformLocation, value: &Mat4) {
        self.uploads.push((program, location, *value));
    }
}

/// Shared in-memory file table. Clones see the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: Rc<RefCell<HashMap<PathBuf, (String, SystemTime)>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, path: impl Into<PathBuf>, source: &str, modified_secs: u64) {
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(modified_secs);
        self.files
            .borrow_mut()
            .insert(path.into(), (source.to_owned(), stamp));
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files.borrow_mut().remove(path.as_ref());
    }
}

impl SourceFs for MemoryFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .borrow()
            .get(path)
            .map(|(source, _)| source.clone())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.files
            .borrow()
            .get(path)
            .map(|(_, stamp)| *stamp)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}
