use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use hotshade_camera::CameraConfig;
use hotshade_program::{ProgramError, ProgramStatus, ReloadOutcome, ShaderProgram};
use hotshade_render_wgpu::{
    NagaDevice, WORLD_FRAG_FILE, WORLD_FRAG_WGSL, WORLD_VERT_FILE, WORLD_VERT_WGSL,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const CAMERA_FILE: &str = "camera.yaml";

#[derive(Parser)]
#[command(name = "hotshade-cli", about = "Check and watch WGSL shader pairs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Write the default shader pair and camera config into a directory
    Init {
        dir: PathBuf,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Compile and link a shader pair once
    Check {
        vertex: PathBuf,
        fragment: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rebuild a shader pair whenever either file changes
    Watch {
        vertex: PathBuf,
        fragment: PathBuf,
        /// Delay between polls
        #[arg(long, default_value = "250")]
        interval_ms: u64,
        /// Stop after this many polls
        #[arg(long)]
        max_polls: Option<u64>,
    },
}

/// Machine-readable result of `check`.
#[derive(Debug, Serialize)]
struct CheckReport {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ProgramStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("hotshade-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", hotshade_common::crate_info());
            println!("camera: {}", hotshade_camera::crate_info());
            println!("program: {}", hotshade_program::crate_info());
            println!("render: {}", hotshade_render_wgpu::crate_info());
        }
        Commands::Init { dir, force } => {
            for path in init(&dir, force)? {
                println!("wrote {}", path.display());
            }
        }
        Commands::Check {
            vertex,
            fragment,
            json,
        } => {
            let report = check(&vertex, &fragment);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(status) = &report.status {
                println!("OK {status}");
            } else if let Some(error) = &report.error {
                eprintln!("{error}");
            }
            if !report.ok {
                bail!("{} + {} failed to build", vertex.display(), fragment.display());
            }
        }
        Commands::Watch {
            vertex,
            fragment,
            interval_ms,
            max_polls,
        } => watch(&vertex, &fragment, Duration::from_millis(interval_ms), max_polls)?,
    }

    Ok(())
}

/// Scaffold a project directory. Returns the files written.
fn init(dir: &Path, force: bool) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let vertex = dir.join(WORLD_VERT_FILE);
    let fragment = dir.join(WORLD_FRAG_FILE);
    let camera = dir.join(CAMERA_FILE);
    if !force {
        if let Some(existing) = [&vertex, &fragment, &camera].into_iter().find(|p| p.exists()) {
            bail!("{} already exists (use --force to overwrite)", existing.display());
        }
    }

    std::fs::write(&vertex, WORLD_VERT_WGSL.trim_start())
        .with_context(|| format!("writing {}", vertex.display()))?;
    std::fs::write(&fragment, WORLD_FRAG_WGSL.trim_start())
        .with_context(|| format!("writing {}", fragment.display()))?;
    CameraConfig::default()
        .save(&camera)
        .with_context(|| format!("writing {}", camera.display()))?;

    tracing::info!("initialized {}", dir.display());
    Ok(vec![vertex, fragment, camera])
}

fn check(vertex: &Path, fragment: &Path) -> CheckReport {
    let mut device = NagaDevice::new();
    match ShaderProgram::create(&mut device, vertex, fragment) {
        Ok(program) => {
            let status = program.status();
            program.release(&mut device);
            CheckReport {
                ok: true,
                status: Some(status),
                error: None,
            }
        }
        Err(err) => CheckReport {
            ok: false,
            status: None,
            error: Some(err.to_string()),
        },
    }
}

fn watch(
    vertex: &Path,
    fragment: &Path,
    interval: Duration,
    max_polls: Option<u64>,
) -> anyhow::Result<()> {
    let mut device = NagaDevice::new();
    let mut program = ShaderProgram::create(&mut device, vertex, fragment)
        .with_context(|| format!("initial build of {} + {}", vertex.display(), fragment.display()))?;
    println!("watching {}", program.status());

    let mut polls = 0u64;
    while max_polls.is_none_or(|max| polls < max) {
        std::thread::sleep(interval);
        polls += 1;
        match program.check_for_changes(&mut device) {
            Ok(ReloadOutcome::Reloaded { previous, current }) => {
                println!("reloaded {previous} -> {current} (generation {})", program.generation());
            }
            Ok(ReloadOutcome::Unchanged | ReloadOutcome::AwaitingFix) => {}
            Err(err @ (ProgramError::Compile { .. } | ProgramError::Link { .. })) => {
                eprintln!("rejected, keeping {}:\n{err}", program.id());
            }
            Err(err) => {
                tracing::warn!("poll {polls} failed: {err}");
            }
        }
    }

    program.release(&mut device);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_a_pair_that_checks_clean() {
        let dir = tempfile::tempdir().unwrap();
        let written = init(dir.path(), false).unwrap();
        assert_eq!(written.len(), 3);

        let report = check(&written[0], &written[1]);
        assert!(report.ok, "{report:?}");
        assert_eq!(report.status.unwrap().generation, 0);

        let camera = CameraConfig::load(&written[2]).unwrap();
        assert_eq!(camera, CameraConfig::default());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path(), false).unwrap();
        let err = init(dir.path(), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(init(dir.path(), true).is_ok());
    }

    #[test]
    fn check_reports_compile_error_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let written = init(dir.path(), false).unwrap();
        std::fs::write(&written[1], "@fragment fn fs_main(").unwrap();

        let report = check(&written[0], &written[1]);
        assert!(!report.ok);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ok"], false);
        assert!(json["error"].as_str().unwrap().contains("fragment"));
        assert!(json.get("status").is_none());
    }

    #[test]
    fn watch_stops_after_max_polls() {
        let dir = tempfile::tempdir().unwrap();
        let written = init(dir.path(), false).unwrap();
        watch(&written[0], &written[1], Duration::from_millis(1), Some(2)).unwrap();
    }

    #[test]
    fn watch_fails_when_initial_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.wgsl");
        let err = watch(&missing, &missing, Duration::from_millis(1), Some(1)).unwrap_err();
        assert!(err.to_string().contains("initial build"));
    }
}
