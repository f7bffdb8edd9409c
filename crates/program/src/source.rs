use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Read access to shader sources and their modification times.
pub trait SourceFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// [`SourceFs`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl SourceFs for StdFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}
