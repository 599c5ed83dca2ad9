//! simdet - Startup script builder entry point
//!
//! Reads device declarations, validates them and writes the generated
//! startup commands and template substitutions.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simdet_core::{DeclarationSet, Descriptor, StartupScript, Variant};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "simdet")]
#[command(about = "Startup script builder for simulated HDF5 detector devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "simdet.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate startup commands from a declaration file (.toml or .xml)
    Render {
        declarations: PathBuf,

        /// Write the script here instead of the configured output
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write template substitutions here
        #[arg(short, long)]
        substitutions: Option<PathBuf>,

        /// Variant for declarations that do not name one
        #[arg(long)]
        variant: Option<Variant>,
    },
    /// Print the static metadata of a variant as JSON
    Describe {
        #[arg(long, default_value = "simple")]
        variant: Variant,
    },
    /// Write a default configuration file
    InitConfig { path: Option<PathBuf> },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Generated text goes to stdout, keep logs off it
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Render {
            declarations,
            output,
            substitutions,
            variant,
        } => {
            let config = config::load_config(&args.config)?;
            let variant = variant.unwrap_or(config.build.variant);
            let output = output.or_else(|| config.build.output.as_ref().map(PathBuf::from));
            let substitutions =
                substitutions.or_else(|| config.build.substitutions.as_ref().map(PathBuf::from));

            let set = DeclarationSet::from_file(&declarations)
                .with_context(|| format!("loading {}", declarations.display()))?;
            info!(
                path = %declarations.display(),
                devices = set.len(),
                variant = %variant,
                "Declarations loaded"
            );

            let script = StartupScript::from_declarations(&set, variant, &config.template)?;
            write_script(&script, output.as_deref())?;

            if let Some(path) = substitutions {
                std::fs::write(&path, script.render_substitutions())
                    .with_context(|| format!("writing {}", path.display()))?;
                info!(path = %path.display(), "Wrote substitutions");
            }
        }
        Command::Describe { variant } => {
            println!("{}", Descriptor::manifest(variant).to_json()?);
        }
        Command::InitConfig { path } => {
            let path = path.unwrap_or(args.config);
            config::save_default_config(&path)?;
            info!(path = %path.display(), "Wrote default configuration");
        }
    }

    Ok(())
}

fn write_script(script: &StartupScript, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            script.write_to(&mut file)?;
            info!(path = %path.display(), devices = script.devices().len(), "Wrote startup script");
        }
        None => {
            let stdout = std::io::stdout();
            script.write_to(&mut stdout.lock())?;
        }
    }
    Ok(())
}
