use crate::device::GraphicsDevice;
use crate::error::ProgramError;
use crate::source::{SourceFs, StdFs};
use crate::status::ProgramStatus;
use glam::Mat4;
use hotshade_common::{ProgramId, ShaderId, ShaderStage, UniformLocation};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Result of a successful [`ShaderProgram::check_for_changes`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Both watermarks match the files; nothing was rebuilt.
    Unchanged,
    /// A rebuild succeeded and the new program replaced the old one.
    Reloaded { previous: ProgramId, current: ProgramId },
    /// The sources still hold exactly the text of a build that already
    /// failed. The previous program stays active until the text changes.
    AwaitingFix,
}

/// Digest of the source pair of a build that failed, with its diagnostic.
#[derive(Debug, Clone)]
struct RejectedBuild {
    digest: [u8; 32],
    message: String,
}

/// Both stage sources, read from disk together.
struct Sources {
    vertex: String,
    fragment: String,
}

impl Sources {
    fn read<F: SourceFs>(
        fs: &F,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<Self, ProgramError> {
        let vertex = fs
            .read_to_string(vertex_path)
            .map_err(|e| ProgramError::io(vertex_path, e))?;
        let fragment = fs
            .read_to_string(fragment_path)
            .map_err(|e| ProgramError::io(fragment_path, e))?;
        Ok(Self { vertex, fragment })
    }

    fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for source in [&self.vertex, &self.fragment] {
            hasher.update((source.len() as u64).to_le_bytes());
            hasher.update(source.as_bytes());
        }
        hasher.finalize().into()
    }
}

/// A linked vertex + fragment program that rebuilds itself when either source
/// file changes on disk.
///
/// The program handle is always a successfully linked program. A rebuild that
/// fails to compile or link leaves the handle, the watermarks and the uniform
/// cache exactly as they were, so a broken edit never interrupts rendering.
/// The handle is released only when a rebuild supersedes it or when the
/// program is explicitly [released](ShaderProgram::release).
///
/// Uniform uploads target this program's handle, but the device is expected
/// to draw with whichever program was last bound with
/// [`use_program`](ShaderProgram::use_program).
#[derive(Debug)]
pub struct ShaderProgram<F: SourceFs = StdFs> {
    id: ProgramId,
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    vertex_modified: SystemTime,
    fragment_modified: SystemTime,
    generation: u64,
    uniform_cache: HashMap<String, Option<UniformLocation>>,
    rejected: Option<RejectedBuild>,
    fs: F,
}

impl ShaderProgram<StdFs> {
    /// Build a program from two source files on disk.
    pub fn create<D>(
        device: &mut D,
        vertex_path: impl Into<PathBuf>,
        fragment_path: impl Into<PathBuf>,
    ) -> Result<Self, ProgramError>
    where
        D: GraphicsDevice + ?Sized,
    {
        Self::create_with_fs(device, StdFs, vertex_path, fragment_path)
    }
}

impl<F: SourceFs> ShaderProgram<F> {
    /// Build a program reading sources through `fs`.
    ///
    /// Both files are stat'ed before they are read, so an edit that lands
    /// between the stat and the read is picked up by the next
    /// [`check_for_changes`](Self::check_for_changes).
    pub fn create_with_fs<D>(
        device: &mut D,
        fs: F,
        vertex_path: impl Into<PathBuf>,
        fragment_path: impl Into<PathBuf>,
    ) -> Result<Self, ProgramError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let vertex_path = vertex_path.into();
        let fragment_path = fragment_path.into();

        let vertex_modified = modified(&fs, &vertex_path)?;
        let fragment_modified = modified(&fs, &fragment_path)?;
        let sources = Sources::read(&fs, &vertex_path, &fragment_path)?;
        let id = build(device, &sources)?;

        tracing::info!(
            "built {id} from {} + {}",
            vertex_path.display(),
            fragment_path.display()
        );

        Ok(Self {
            id,
            vertex_path,
            fragment_path,
            vertex_modified,
            fragment_modified,
            generation: 0,
            uniform_cache: HashMap::new(),
            rejected: None,
            fs,
        })
    }

    /// Handle of the live program. For diagnostics only; the handle stays
    /// owned by this value.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn vertex_path(&self) -> &Path {
        &self.vertex_path
    }

    pub fn fragment_path(&self) -> &Path {
        &self.fragment_path
    }

    /// Modification times of the vertex and fragment sources of the live program.
    pub fn watermarks(&self) -> (SystemTime, SystemTime) {
        (self.vertex_modified, self.fragment_modified)
    }

    /// Number of successful hot swaps since creation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Diagnostic of the last rejected rebuild. Cleared by a successful
    /// rebuild or when both files are back at the running program's mtimes.
    pub fn last_error(&self) -> Option<&str> {
        self.rejected.as_ref().map(|r| r.message.as_str())
    }

    pub fn status(&self) -> ProgramStatus {
        ProgramStatus {
            program: self.id,
            vertex_path: self.vertex_path.clone(),
            fragment_path: self.fragment_path.clone(),
            vertex_modified: self.vertex_modified,
            fragment_modified: self.fragment_modified,
            generation: self.generation,
            last_error: self.last_error().map(str::to_owned),
        }
    }

    /// Bind the program for subsequent draw calls.
    pub fn use_program<D>(&self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        device.use_program(self.id);
    }

    /// Upload a 4x4 matrix to the uniform called `name`.
    ///
    /// Names that do not resolve to an active uniform are ignored. Lookups are
    /// cached until the next hot swap.
    pub fn set_mat4<D>(&mut self, device: &mut D, name: &str, value: &Mat4)
    where
        D: GraphicsDevice + ?Sized,
    {
        let location = match self.uniform_cache.get(name) {
            Some(location) => *location,
            None => {
                let location = device.uniform_location(self.id, name);
                if location.is_none() {
                    tracing::debug!("uniform `{name}` is not active in {}, ignoring uploads", self.id);
                }
                self.uniform_cache.insert(name.to_owned(), location);
                location
            }
        };
        if let Some(location) = location {
            device.uniform_mat4(self.id, location, value);
        }
    }

    /// Rebuild the program if either source file changed since the last
    /// successful build.
    ///
    /// A stat failure returns [`ProgramError::Io`] without touching any state.
    /// A failed rebuild is logged and returned, and the previous program keeps
    /// running with its watermarks unchanged. While the sources still hold the
    /// exact text of the failed build they are read but not rebuilt; any edit
    /// to their contents is rebuilt, whatever its timestamp.
    pub fn check_for_changes<D>(&mut self, device: &mut D) -> Result<ReloadOutcome, ProgramError>
    where
        D: GraphicsDevice + ?Sized,
    {
        let vertex_modified = modified(&self.fs, &self.vertex_path)?;
        let fragment_modified = modified(&self.fs, &self.fragment_path)?;

        if vertex_modified == self.vertex_modified && fragment_modified == self.fragment_modified {
            self.rejected = None;
            return Ok(ReloadOutcome::Unchanged);
        }

        let sources = Sources::read(&self.fs, &self.vertex_path, &self.fragment_path)?;
        let digest = sources.digest();
        if self.rejected.as_ref().is_some_and(|r| r.digest == digest) {
            return Ok(ReloadOutcome::AwaitingFix);
        }

        tracing::debug!("sources of {} changed, rebuilding", self.id);
        match build(device, &sources) {
            Ok(id) => {
                // The replacement is linked before the old program goes away.
                let previous = std::mem::replace(&mut self.id, id);
                device.delete_program(previous);
                self.vertex_modified = vertex_modified;
                self.fragment_modified = fragment_modified;
                self.generation += 1;
                self.uniform_cache.clear();
                self.rejected = None;
                tracing::info!("reloaded {previous} -> {id} (generation {})", self.generation);
                Ok(ReloadOutcome::Reloaded {
                    previous,
                    current: id,
                })
            }
            Err(err) => {
                tracing::warn!("rebuild rejected, keeping {}: {err}", self.id);
                if err.is_build_failure() {
                    self.rejected = Some(RejectedBuild {
                        digest,
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    /// Release the program handle. Consumes the program.
    pub fn release<D>(self, device: &mut D)
    where
        D: GraphicsDevice + ?Sized,
    {
        tracing::debug!("releasing {}", self.id);
        device.delete_program(self.id);
    }
}

fn modified<F: SourceFs>(fs: &F, path: &Path) -> Result<SystemTime, ProgramError> {
    fs.modified(path).map_err(|e| ProgramError::io(path, e))
}

/// Compile and link both stages. Stage objects are released on every path;
/// only a linked program survives.
fn build<D>(device: &mut D, sources: &Sources) -> Result<ProgramId, ProgramError>
where
    D: GraphicsDevice + ?Sized,
{
    let vertex = compile(device, ShaderStage::Vertex, &sources.vertex)?;
    let fragment = match compile(device, ShaderStage::Fragment, &sources.fragment) {
        Ok(fragment) => fragment,
        Err(err) => {
            device.delete_shader(vertex);
            return Err(err);
        }
    };

    let linked = device.link_program(vertex, fragment);
    device.delete_shader(vertex);
    device.delete_shader(fragment);
    linked.map_err(|log| ProgramError::Link {
        log: log.into_string(),
    })
}

fn compile<D>(device: &mut D, stage: ShaderStage, source: &str) -> Result<ShaderId, ProgramError>
where
    D: GraphicsDevice + ?Sized,
{
    device
        .compile_shader(stage, source)
        .map_err(|log| ProgramError::Compile {
            stage,
            log: log.into_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{COMPILE_ERROR, LINK_ERROR, MemoryFs, RecordingDevice};
    use std::time::Duration;

    const VERT: &str = "shaders/basic.vert";
    const FRAG: &str = "shaders/basic.frag";
    const VERT_SRC: &str = "uniform mat4 model;\nuniform mat4 view;\nvoid main() {}";
    const FRAG_SRC: &str = "void main() {}";

    fn secs(s: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(s)
    }

    fn setup() -> (RecordingDevice, MemoryFs, ShaderProgram<MemoryFs>) {
        let mut device = RecordingDevice::new();
        let fs = MemoryFs::new();
        fs.write(VERT, VERT_SRC, 100);
        fs.write(FRAG, FRAG_SRC, 100);
        let program = ShaderProgram::create_with_fs(&mut device, fs.clone(), VERT, FRAG).unwrap();
        (device, fs, program)
    }

    #[test]
    fn create_links_and_releases_stages() {
        let (device, _fs, program) = setup();
        assert_eq!(device.compiles, 2);
        assert_eq!(device.links, 1);
        assert!(device.live_shaders.is_empty());
        assert_eq!(device.live_programs.len(), 1);
        assert!(device.live_programs.contains(&program.id()));
        assert_eq!(program.watermarks(), (secs(100), secs(100)));
        assert_eq!(program.generation(), 0);
    }

    #[test]
    fn create_reports_failing_stage() {
        let mut device = RecordingDevice::new();
        let fs = MemoryFs::new();
        fs.write(VERT, VERT_SRC, 1);
        fs.write(FRAG, COMPILE_ERROR, 1);

        let err = ShaderProgram::create_with_fs(&mut device, fs, VERT, FRAG).unwrap_err();
        match err {
            ProgramError::Compile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains(COMPILE_ERROR));
            }
            other => panic!("expected compile error, got {other:?}"),
        }
        assert!(device.live_shaders.is_empty(), "vertex stage leaked");
        assert!(device.live_programs.is_empty());
    }

    #[test]
    fn create_reports_link_failure_without_leaking_stages() {
        let mut device = RecordingDevice::new();
        let fs = MemoryFs::new();
        fs.write(VERT, LINK_ERROR, 1);
        fs.write(FRAG, FRAG_SRC, 1);

        let err = ShaderProgram::create_with_fs(&mut device, fs, VERT, FRAG).unwrap_err();
        assert!(matches!(err, ProgramError::Link { .. }));
        assert!(device.live_shaders.is_empty());
        assert!(device.live_programs.is_empty());
    }

    #[test]
    fn create_missing_source_is_io_error() {
        let mut device = RecordingDevice::new();
        let fs = MemoryFs::new();
        fs.write(VERT, VERT_SRC, 1);

        let err = ShaderProgram::create_with_fs(&mut device, fs, VERT, FRAG).unwrap_err();
        match err {
            ProgramError::Io { path, .. } => assert_eq!(path, PathBuf::from(FRAG)),
            other => panic!("expected io error, got {other:?}"),
        }
        assert_eq!(device.calls(), 0);
    }

    #[test]
    fn no_change_means_no_device_calls() {
        let (mut device, _fs, mut program) = setup();
        let calls = device.calls();
        let id = program.id();

        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::Unchanged);
        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::Unchanged);

        assert_eq!(device.calls(), calls);
        assert_eq!(program.id(), id);
        assert_eq!(program.watermarks(), (secs(100), secs(100)));
    }

    #[test]
    fn valid_edit_swaps_program_and_releases_old_once() {
        let (mut device, fs, mut program) = setup();
        let original = program.id();

        fs.write(FRAG, "void main() { /* tweaked */ }", 250);
        let outcome = program.check_for_changes(&mut device).unwrap();

        let current = program.id();
        assert_ne!(current, original);
        assert_eq!(outcome, ReloadOutcome::Reloaded { previous: original, current });
        assert_eq!(device.deleted_programs, vec![original]);
        assert_eq!(device.live_programs.len(), 1);
        assert!(device.live_shaders.is_empty());
        assert_eq!(program.watermarks(), (secs(100), secs(250)));
        assert_eq!(program.generation(), 1);

        // A later poll with no further edits is a no-op.
        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::Unchanged);
        assert_eq!(device.deleted_programs, vec![original]);
    }

    #[test]
    fn both_watermarks_follow_a_two_file_edit() {
        let (mut device, fs, mut program) = setup();
        fs.write(VERT, VERT_SRC, 300);
        fs.write(FRAG, FRAG_SRC, 301);

        program.check_for_changes(&mut device).unwrap();
        assert_eq!(program.watermarks(), (secs(300), secs(301)));
    }

    #[test]
    fn bad_edit_keeps_last_known_good() {
        let (mut device, fs, mut program) = setup();
        let original = program.id();

        fs.write(VERT, &format!("{VERT_SRC}\n{COMPILE_ERROR}"), 200);
        let err = program.check_for_changes(&mut device).unwrap_err();
        assert!(matches!(
            err,
            ProgramError::Compile {
                stage: ShaderStage::Vertex,
                ..
            }
        ));

        assert_eq!(program.id(), original);
        assert_eq!(program.watermarks(), (secs(100), secs(100)));
        assert!(device.deleted_programs.is_empty());
        assert!(device.live_shaders.is_empty());
        assert!(program.last_error().is_some());

        program.use_program(&mut device);
        assert_eq!(device.bound, Some(original));
    }

    #[test]
    fn rejected_sources_are_not_rebuilt_until_edited_again() {
        let (mut device, fs, mut program) = setup();
        let original = program.id();

        fs.write(FRAG, LINK_ERROR, 200);
        assert!(matches!(
            program.check_for_changes(&mut device),
            Err(ProgramError::Link { .. })
        ));
        let calls = device.calls();

        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::AwaitingFix);
        assert_eq!(device.calls(), calls);

        fs.write(FRAG, FRAG_SRC, 210);
        let outcome = program.check_for_changes(&mut device).unwrap();
        assert!(matches!(outcome, ReloadOutcome::Reloaded { previous, .. } if previous == original));
        assert_eq!(program.last_error(), None);
        assert_eq!(program.watermarks(), (secs(100), secs(210)));
    }

    #[test]
    fn fix_saved_within_the_same_mtime_tick_is_reloaded() {
        let (mut device, fs, mut program) = setup();
        let original = program.id();

        fs.write(FRAG, COMPILE_ERROR, 200);
        assert!(program.check_for_changes(&mut device).is_err());

        // Coarse timestamps: the fix lands in the same second as the bad edit.
        fs.write(FRAG, "void main() { /* fixed */ }", 200);
        let outcome = program.check_for_changes(&mut device).unwrap();
        assert!(matches!(outcome, ReloadOutcome::Reloaded { previous, .. } if previous == original));
        assert_ne!(program.id(), original);
        assert_eq!(program.last_error(), None);
        assert_eq!(program.watermarks(), (secs(100), secs(200)));
    }

    #[test]
    fn touching_a_rejected_file_without_editing_it_does_not_rebuild() {
        let (mut device, fs, mut program) = setup();
        fs.write(VERT, COMPILE_ERROR, 200);
        assert!(program.check_for_changes(&mut device).is_err());
        let calls = device.calls();

        fs.write(VERT, COMPILE_ERROR, 260);
        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::AwaitingFix);
        assert_eq!(device.calls(), calls);
        assert!(program.last_error().is_some());
    }

    #[test]
    fn reverting_to_original_timestamps_clears_rejection() {
        let (mut device, fs, mut program) = setup();
        fs.write(FRAG, COMPILE_ERROR, 200);
        assert!(program.check_for_changes(&mut device).is_err());

        fs.write(FRAG, FRAG_SRC, 100);
        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::Unchanged);
        assert_eq!(program.last_error(), None);
    }

    #[test]
    fn stat_failure_leaves_state_untouched() {
        let (mut device, fs, mut program) = setup();
        let original = program.id();
        let calls = device.calls();

        fs.remove(VERT);
        let err = program.check_for_changes(&mut device).unwrap_err();
        assert!(matches!(err, ProgramError::Io { .. }));
        assert_eq!(program.id(), original);
        assert_eq!(program.watermarks(), (secs(100), secs(100)));
        assert_eq!(device.calls(), calls);
        assert_eq!(program.last_error(), None);

        // Once the file is back the program rebuilds normally.
        fs.write(VERT, VERT_SRC, 400);
        assert!(matches!(
            program.check_for_changes(&mut device).unwrap(),
            ReloadOutcome::Reloaded { .. }
        ));
    }

    #[test]
    fn uniform_lookups_are_cached_per_program() {
        let (mut device, fs, mut program) = setup();
        let view = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));

        program.use_program(&mut device);
        program.set_mat4(&mut device, "view", &view);
        program.set_mat4(&mut device, "view", &view);
        assert_eq!(device.lookups, 1);
        assert_eq!(device.uploads, vec![
            (program.id(), UniformLocation(1), view),
            (program.id(), UniformLocation(1), view),
        ]);

        fs.write(VERT, VERT_SRC, 500);
        program.check_for_changes(&mut device).unwrap();
        program.set_mat4(&mut device, "view", &view);
        assert_eq!(device.lookups, 2);
        assert_eq!(device.uploads.last().unwrap().0, program.id());
    }

    #[test]
    fn unknown_uniform_is_silently_ignored() {
        let (mut device, _fs, mut program) = setup();
        program.set_mat4(&mut device, "projection", &Mat4::IDENTITY);
        program.set_mat4(&mut device, "projection", &Mat4::IDENTITY);
        assert!(device.uploads.is_empty());
        assert_eq!(device.lookups, 1);
    }

    #[test]
    fn release_deletes_live_handle() {
        let (mut device, _fs, program) = setup();
        let id = program.id();
        program.release(&mut device);
        assert_eq!(device.deleted_programs, vec![id]);
        assert!(device.live_programs.is_empty());
    }

    #[test]
    fn works_with_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let vert = dir.path().join("basic.vert");
        let frag = dir.path().join("basic.frag");
        std::fs::write(&vert, VERT_SRC).unwrap();
        std::fs::write(&frag, FRAG_SRC).unwrap();
        let set_mtime = |path: &Path, s: u64| {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(secs(s))
                .unwrap();
        };
        set_mtime(&vert, 1_000);
        set_mtime(&frag, 1_000);

        let mut device = RecordingDevice::new();
        let mut program = ShaderProgram::create(&mut device, &vert, &frag).unwrap();
        assert_eq!(program.watermarks(), (secs(1_000), secs(1_000)));
        assert_eq!(program.check_for_changes(&mut device).unwrap(), ReloadOutcome::Unchanged);

        std::fs::write(&frag, format!("{FRAG_SRC}\n{COMPILE_ERROR}")).unwrap();
        set_mtime(&frag, 2_000);
        let original = program.id();
        assert!(program.check_for_changes(&mut device).is_err());
        program.use_program(&mut device);
        assert_eq!(device.bound, Some(original));

        std::fs::write(&frag, FRAG_SRC).unwrap();
        set_mtime(&frag, 3_000);
        assert!(matches!(
            program.check_for_changes(&mut device).unwrap(),
            ReloadOutcome::Reloaded { .. }
        ));
        assert_eq!(program.watermarks(), (secs(1_000), secs(3_000)));
    }
}
