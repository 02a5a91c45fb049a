use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docweave::{commands, diagnostics, watch};

/// Exit code for fatal errors; 1 is reserved for "diagnostics found".
const FATAL_EXIT: u8 = 2;

#[derive(Parser)]
#[command(
    name = "docweave",
    about = "Resolve references and build section outlines for trees of markdown documents"
)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
    /// Log resolution progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and exit non-zero if any reference is invalid
    Check {
        /// Root directory of the document tree
        dir: PathBuf,
    },
    /// Print every document's title and section outline
    Outline {
        /// Root directory of the document tree
        dir: PathBuf,
    },
    /// Resolve all references and print the diagnostics report
    Resolve {
        /// Root directory of the document tree
        dir: PathBuf,
        /// Emit the resolved tree and diagnostics as JSON
        #[arg(long)]
        json: bool,
        /// Write the result to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Re-run check whenever a file in the tree changes
    Watch {
        /// Root directory of the document tree
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Check { dir } => commands::check(&dir),
        Commands::Outline { dir } => commands::outline(&dir).map(|()| return ExitCode::SUCCESS),
        Commands::Resolve { dir, json, output } => commands::resolve(&dir, json, output.as_deref()),
        Commands::Watch { dir } => watch::run(&dir),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(FATAL_EXIT)
        },
    };
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the default level.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
