//! deeppickle command-line tools

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use deeppickle::encoding::{disassemble, fingerprint, format_fingerprint};
use deeppickle::vm::{Interpreter, Value};
use deeppickle::{check_quine, dumps_with, load_file, make_quine, EncoderConfig, QuineStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod demos;

use demos::Demo;

#[derive(Parser)]
#[command(
    name = "deeppickle",
    version,
    about = "Encode, inspect and replay deeppickle streams",
    long_about = r#"
Encode, inspect and replay deeppickle streams.

Examples:
    deeppickle dump-demo closure inner.pkl     # Encode a closure
    deeppickle load inner.pkl --call 5         # Decode it and call it
    deeppickle dis inner.pkl                   # Instruction listing
    deeppickle quine --golfed q.pkl            # Self-reproducing stream
"#
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Encoder configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a self-reproducing stream
    Quine {
        /// Shortest variant instead of the one with named memo slots
        #[arg(long)]
        golfed: bool,

        /// Output file
        path: PathBuf,
    },

    /// Print the instruction listing of a stream
    Dis {
        /// Stream file
        path: PathBuf,
    },

    /// Encode one of the built-in sample values
    DumpDemo {
        /// Which sample to build
        #[arg(value_enum)]
        demo: Demo,

        /// Output file
        path: PathBuf,
    },

    /// Decode a stream and print the result
    Load {
        /// Stream file
        path: PathBuf,

        /// Call the decoded value with these arguments (ints or strings)
        #[arg(long, num_args = 0.., value_name = "ARG")]
        call: Option<Vec<String>>,
    },

    /// Print the default encoder configuration
    Config,
}

// =============================================================================
// Commands
// =============================================================================

fn load_config(path: Option<&Path>) -> Result<EncoderConfig> {
    match path {
        Some(path) => EncoderConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(EncoderConfig::default()),
    }
}

fn write_stream(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{}: {} bytes, fingerprint {}",
        path.display(),
        bytes.len(),
        format_fingerprint(fingerprint(bytes))
    );
    Ok(())
}

fn cmd_quine(golfed: bool, path: &Path) -> Result<()> {
    let style = if golfed {
        QuineStyle::Golfed
    } else {
        QuineStyle::Readable
    };
    let bytes = make_quine(style);
    let mut interp = Interpreter::new();
    if !check_quine(&mut interp, &bytes)? {
        bail!("generated stream does not reproduce itself");
    }
    write_stream(path, &bytes)
}

fn cmd_dis(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let listing = disassemble(&bytes).with_context(|| format!("Failed to disassemble {}", path.display()))?;
    print!("{listing}");
    Ok(())
}

fn cmd_dump_demo(demo: Demo, path: &Path, config: &EncoderConfig) -> Result<()> {
    let mut interp = Interpreter::new();
    let value = demos::build(&mut interp, demo)?;
    info!(?demo, kind = value.kind_name(), "encoding demo value");
    let bytes = dumps_with(&mut interp, &value, config)?;
    write_stream(path, &bytes)
}

fn cmd_load(path: &Path, call: Option<&[String]>) -> Result<()> {
    let mut interp = Interpreter::new();
    let value = load_file(path, &mut interp)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    println!("{value:?}");

    if let Some(raw) = call {
        let args = demos::parse_args(raw);
        let result: Value = interp
            .call(&value, &args, &[])
            .context("Call on decoded value failed")?;
        println!("{result:?}");
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Quine { golfed, path } => cmd_quine(golfed, &path)?,
        Commands::Dis { path } => cmd_dis(&path)?,
        Commands::DumpDemo { demo, path } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_dump_demo(demo, &path, &config)?;
        }
        Commands::Load { path, call } => cmd_load(&path, call.as_deref())?,
        Commands::Config => print!("{}", EncoderConfig::default_toml()),
    }
    Ok(())
}
