use crate::config::load_config;
use crate::layout_dump::write_layout_dump;
use crate::scene::{parse_scene, run_scene};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "plumbline",
    version,
    about = "Run a connector scene through the anchor engine and dump the resulting layout"
)]
pub struct Args {
    /// Scene file (.json/.json5) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the layout dump. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Extra step appended after the scene's own steps (repeatable)
    #[arg(short = 's', long = "step")]
    pub steps: Vec<String>,

    /// Log more (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())
        .with_context(|| format!("loading config {:?}", args.config))?;
    let input = read_input(args.input.as_deref())?;
    let mut doc = parse_scene(&input)?;
    doc.steps.extend(args.steps.iter().cloned());
    debug!(
        elements = doc.elements.len(),
        endpoints = doc.endpoints.len(),
        connections = doc.connections.len(),
        steps = doc.steps.len(),
        "scene loaded"
    );

    let run = run_scene(&doc, config.engine)?;
    write_layout_dump(args.output.as_deref(), &run)?;
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
