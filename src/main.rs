//! traversal-machine - command line entry point
//!
//! Compiles and runs JSON bytecode files against the built-in modern graph.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use traversal_machine::{
    config::EngineConfig, structure::MemoryGraph, Bytecode, LongCoefficient, Machine, Registry,
    Structure, StructureRegistry, Value,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "traversal-machine",
    version,
    about = "Compile and run traversal bytecode"
)]
struct Cli {
    /// Engine config file (TOML or JSON); defaults to the platform config dir
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a bytecode file and print the resulting pipeline
    Compile {
        /// Path to the bytecode JSON file
        file: PathBuf,
    },

    /// Execute a bytecode file against the modern graph
    Run {
        /// Path to the bytecode JSON file
        file: PathBuf,

        /// Seed values as a JSON array
        #[arg(short, long)]
        seeds: Option<String>,

        /// Record every step in result paths
        #[arg(long)]
        paths: bool,

        /// Maximum wait for each result, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::load_or_default(),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = dispatch(cli.command, config) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands, mut config: EngineConfig) -> anyhow::Result<()> {
    match command {
        Commands::Compile { file } => {
            let code = read_bytecode(&file)?;
            let machine = build_machine(&config);
            let pipeline = machine.prepare(&code)?;
            println!("{}", pipeline);
            let stats = pipeline.stats();
            println!(
                "steps: {} (nested pipelines: {}), compiled in {}us",
                stats.total_steps, stats.nested_pipelines, stats.compile_time_us
            );
            Ok(())
        }
        Commands::Run {
            file,
            seeds,
            paths,
            timeout_ms,
        } => {
            let code = read_bytecode(&file)?;
            let seeds: Vec<Value> = match seeds {
                Some(json) => serde_json::from_str(&json).context("Invalid --seeds JSON")?,
                None => Vec::new(),
            };
            config.execution.track_paths |= paths;
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.execution.result_timeout());

            let machine = build_machine(&config);
            let mut handle = machine.spawn(&code, seeds)?;
            while let Some(traverser) = handle.next_timeout(timeout)? {
                println!("{}", serde_json::to_string(&traverser)?);
            }
            Ok(())
        }
    }
}

fn read_bytecode(path: &Path) -> anyhow::Result<Bytecode<LongCoefficient>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Bytecode::from_json(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

fn build_machine(config: &EngineConfig) -> Machine<LongCoefficient> {
    let graph: Arc<dyn Structure> = Arc::new(MemoryGraph::modern());
    let mut structures = StructureRegistry::new();
    structures.register("modern", Arc::clone(&graph));
    tracing::debug!("Registered structure `modern`");
    Machine::from_config(config, Registry::standard(), structures).with_default_structure(graph)
}
