//! Command-line interface implementation
//!
//! Loads a project file, runs the conversion pipeline and reports what was
//! written. Logging goes through `env_logger`; `-v`/`-q` pick the default
//! level and `RUST_LOG` overrides it.

use clap::Parser;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::{self, CONFIG_FILE};
use crate::pipeline::{Pipeline, Project};
use crate::pool::default_jobs;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// Project file written by `--new`.
const TEMPLATE: &str = r#"[[palettes]]
name = "global_palette"
images = "automatic"

[[converts]]
name = "sprites"
palette = "global_palette"
images = ["*.png"]

[[outputs]]
type = "c"
include-file = "gfx.h"
palettes = ["global_palette"]
converts = ["sprites"]
"#;

/// convimg - Convert images to TI-84 Plus CE palettes, sprites and AppVars
#[derive(Parser, Debug)]
#[command(name = "convimg")]
#[command(about = "Convert images to TI-84 Plus CE palettes, sprites, tilesets and AppVars")]
#[command(version)]
pub struct Cli {
    /// Project file (default: convimg.toml in the current directory or a parent)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Number of worker threads (default: available parallelism)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Load and validate the project, then list what would be converted
    #[arg(long)]
    pub dry_run: bool,

    /// Write a starter convimg.toml to the current directory
    #[arg(long, conflicts_with_all = ["input", "dry_run"])]
    pub new: bool,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::Error,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        }
    }
}

fn init_logging(level: LevelFilter) {
    let env = env_logger::Env::default().default_filter_or(level.to_string());
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.level());

    if cli.new {
        return run_new(Path::new(CONFIG_FILE));
    }

    let project = match config::load_project(cli.input.as_deref()) {
        Ok(project) => project,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if cli.dry_run {
        print_plan(&project);
        return ExitCode::from(EXIT_SUCCESS);
    }

    let jobs = cli.jobs.unwrap_or_else(default_jobs);
    match Pipeline::new(project).with_jobs(jobs).run() {
        Ok(result) => {
            log::info!("wrote {} files in {:.2?}", result.files.len(), result.total_duration);
            for (phase, duration) in &result.durations {
                log::debug!("{}: {:.2?}", phase, duration);
            }
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn run_new(path: &Path) -> ExitCode {
    match create_project_file(path) {
        Ok(()) => {
            log::info!("created {}", path.display());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

/// Write the starter project file, refusing to overwrite an existing one.
fn create_project_file(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Err(format!("{} already exists", path.display()));
    }
    fs::write(path, TEMPLATE).map_err(|e| format!("failed to write {}: {}", path.display(), e))
}

fn print_plan(project: &Project) {
    println!("Dry run - would convert:");
    for palette in &project.palettes {
        println!("  palette {} ({} images)", palette.name, palette.images.len());
    }
    for convert in &project.converts {
        let tilesets = convert.tileset_group.as_ref().map_or(0, |g| g.images.len());
        println!(
            "  convert {} ({} images, {} tilesets, {:?} style)",
            convert.name,
            convert.image_paths.len(),
            tilesets,
            convert.settings.style
        );
    }
    for output in &project.outputs {
        println!("  output {} -> {}", output.format.name(), output.directory.display());
    }
}
