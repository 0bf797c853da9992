//! SiteStack CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::StackSource;

#[derive(Parser)]
#[command(name = "sitestack")]
#[command(about = "Static site hosting stack: synthesize, validate and deploy", long_about = None)]
struct Cli {
    /// Stack definition file
    #[arg(long, global = true, env = "SITESTACK_CONFIG", default_value = "site.kdl")]
    config: PathBuf,

    /// Use a built-in revision instead of a definition file
    #[arg(long, global = true)]
    revision: Option<String>,

    /// Extra variables for the definition, as NAME=VALUE
    #[arg(long = "var", global = true, value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Directory holding local state and lock files
    #[arg(long, global = true, env = "SITESTACK_STATE_DIR", default_value = ".sitestack")]
    state_dir: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the synthesized template
    Synth {
        /// Output file (stdout if omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Synthesize even when validation reports errors
        #[arg(long)]
        force: bool,
    },
    /// Check the stack and print findings
    Validate,
    /// Show what a deploy would change
    Diff,
    /// Apply the stack to the local state
    Deploy {
        /// Deploy even when validation reports errors
        #[arg(long)]
        force: bool,
    },
    /// Tear the stack down
    Destroy,
    /// List built-in revisions
    Revisions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let source = match &cli.revision {
        Some(name) => StackSource::Revision(name.parse()?),
        None => StackSource::File(cli.config.clone()),
    };

    match cli.command {
        Commands::Synth { out, force } => {
            commands::synth::run(&source, &cli.vars, out.as_deref(), force)?;
        }
        Commands::Validate => {
            commands::validate::run(&source, &cli.vars)?;
        }
        Commands::Diff => {
            commands::deploy::diff(&source, &cli.vars, &cli.state_dir).await?;
        }
        Commands::Deploy { force } => {
            commands::deploy::deploy(&source, &cli.vars, &cli.state_dir, force).await?;
        }
        Commands::Destroy => {
            commands::deploy::destroy(&source, &cli.vars, &cli.state_dir).await?;
        }
        Commands::Revisions => {
            commands::revisions::list();
        }
    }

    Ok(())
}

/// Logs go to stderr so `synth` output can be piped.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
