//! FrameMark command line: replay a scene and write its detection matrix.
//!
//! ```text
//! framemark <scene.json> [--config <config.json>] [--out <prefix>]
//! ```
//!
//! Writes `<prefix>.matrix.json`, `<prefix>.png` and `<prefix>.document.json`.

mod scene;

use framemark_core::{Engine, EngineConfig, EngineError, MatrixPngExporter};
use scene::Scene;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug)]
struct Args {
    scene: PathBuf,
    config: Option<PathBuf>,
    out: PathBuf,
}

const USAGE: &str = "usage: framemark <scene.json> [--config <config.json>] [--out <prefix>]";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, CliError> {
    let mut scene = None;
    let mut config = None;
    let mut out = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().ok_or_else(|| CliError::Usage(USAGE.to_string()))?)),
            "--out" => out = Some(PathBuf::from(args.next().ok_or_else(|| CliError::Usage(USAGE.to_string()))?)),
            "-h" | "--help" => return Err(CliError::Usage(USAGE.to_string())),
            _ if scene.is_none() => scene = Some(PathBuf::from(arg)),
            _ => return Err(CliError::Usage(format!("unexpected argument `{}`\n{}", arg, USAGE))),
        }
    }
    let scene: PathBuf = scene.ok_or_else(|| CliError::Usage(USAGE.to_string()))?;
    let out = out.unwrap_or_else(|| scene.with_extension(""));
    Ok(Args { scene, config, out })
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: PathBuf, bytes: &[u8]) -> Result<(), CliError> {
    std::fs::write(&path, bytes).map_err(|source| CliError::Io { path: path.clone(), source })?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    EngineConfig::from_json(&read(path)?).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn run(args: Args) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let scene = Scene::from_json(&read(&args.scene)?).map_err(|source| CliError::Json {
        path: args.scene.clone(),
        source,
    })?;

    let native = scene.native.unwrap_or(scene.display);
    let mut engine = Engine::new(config, scene.display, native)?;
    let failures = scene.replay(&mut engine);
    if failures > 0 {
        log::warn!("{} scene steps failed", failures);
    }

    let matrix = engine.generate_matrix();
    log::info!(
        "Matrix {}x{} with {} elements, {} cells set",
        matrix.width,
        matrix.height,
        matrix.elements.len(),
        matrix.filled_cells()
    );
    let matrix_json = serde_json::to_vec(&matrix).map_err(|source| CliError::Json {
        path: args.out.clone(),
        source,
    })?;
    write(with_suffix(&args.out, ".matrix.json"), &matrix_json)?;

    let frame = pollster::block_on(engine.export_snapshot(&MatrixPngExporter::new()))?;
    write(with_suffix(&args.out, ".png"), &frame.bytes)?;

    let document = engine.export_document()?;
    write(with_suffix(&args.out, ".document.json"), document.as_bytes())?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = parse_args(std::env::args().skip(1)).and_then(run);
    if let Err(err) = result {
        match err {
            CliError::Usage(message) => eprintln!("{}", message),
            err => log::error!("{}", err),
        }
        std::process::exit(1);
    }
}
