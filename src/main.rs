use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imgsim::server::{self, has_allowed_extension};
use imgsim::{Config, SimilarityEngine, Strategy};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "imgsim", version, about = "Perceptual image similarity service")]
struct Cli {
    /// JSON configuration file (default: `<config dir>/imgsim/config.json`)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fingerprint strategy: gradient or icon
    #[arg(short, long, global = true)]
    strategy: Option<Strategy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Compare two images; exits 0 when similar, 1 when distinct
    Compare {
        #[arg(value_name = "IMAGE")]
        first: PathBuf,
        #[arg(value_name = "IMAGE")]
        second: PathBuf,
        /// Hamming distance still counted as similar (gradient strategy)
        #[arg(long)]
        max_distance: Option<u32>,
        /// Mean squared distance below which icons match (icon strategy)
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the full verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the fingerprint of a single image as JSON
    Fingerprint {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
}

#[derive(Serialize)]
struct CompareOutput<'a> {
    first: &'a Path,
    second: &'a Path,
    strategy: Strategy,
    #[serde(flatten)]
    verdict: imgsim::SimilarityVerdict,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config =
        Config::discover(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(strategy) = cli.strategy {
        config.engine.strategy = strategy;
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime
                .block_on(server::serve(&config))
                .with_context(|| format!("Server on {} failed", config.bind))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Compare {
            first,
            second,
            max_distance,
            threshold,
            json,
        } => {
            if let Some(max_distance) = max_distance {
                config.engine.gradient.max_distance = max_distance;
            }
            if let Some(threshold) = threshold {
                config.engine.icon.threshold = threshold;
            }
            let engine = SimilarityEngine::new(config.engine)?;
            let a = read_image(&first)?;
            let b = read_image(&second)?;

            let verdict = benchmark("comparison", || engine.compare(&a, &b))
                .with_context(|| {
                    format!("Failed to compare {} and {}", first.display(), second.display())
                })?;

            if json {
                let output = CompareOutput {
                    first: &first,
                    second: &second,
                    strategy: engine.strategy(),
                    verdict,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if verdict.similar {
                println!("similar ({:?})", verdict.distance);
            } else {
                println!("distinct ({:?})", verdict.distance);
            }

            Ok(if verdict.similar {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Commands::Fingerprint { image } => {
            let engine = SimilarityEngine::new(config.engine)?;
            let bytes = read_image(&image)?;
            let fingerprint = engine
                .fingerprint(&bytes)
                .with_context(|| format!("Failed to fingerprint {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&fingerprint.summary())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Read an image file whole. The extension is only checked to warn early;
/// decoding decides whether the content is usable.
fn read_image(path: &Path) -> Result<Vec<u8>> {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    if !has_allowed_extension(&name) {
        log::warn!(
            "{} does not have a .png/.jpg/.jpeg extension; trying to decode anyway",
            path.display()
        );
    }
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::debug!("{} took {:.2?}", label, start.elapsed());
    result
}
