use clap::{Parser, Subcommand, ValueEnum};
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docweave::cli::OutputFormat;
use docweave::cli::commands;
use docweave::regen::Resolution;

#[derive(Parser)]
#[command(name = "docweave")]
#[command(
    version,
    about = "Incremental documentation generator that only rewrites what changed"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize docweave in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Generate new documents and regenerate stale ones
    Generate {
        #[arg(long, short, help = "Collection prefix for new documents")]
        collection: Option<String>,
        #[arg(long = "doc-type", help = "Only documents of this type")]
        doc_type: Option<String>,
        #[arg(long, value_name = "ID", help = "Regenerate these documents regardless of changes")]
        force: Vec<String>,
        #[arg(long = "force-all", conflicts_with = "force", help = "Regenerate every document")]
        force_all: bool,
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List registered documents
    Status {
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a document's version history
    History {
        id: String,
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print a stored version of a document
    Show {
        id: String,
        #[arg(long, help = "Version sequence number (default: latest)")]
        seq: Option<i64>,
        #[arg(long, help = "Omit the metadata trailer")]
        body: bool,
    },

    /// Settle a document whose human edit blocked regeneration
    Reconcile {
        id: String,
        #[arg(value_enum)]
        resolution: ResolutionArg,
    },

    /// Remove a document (history keeps a tombstone)
    Remove {
        id: String,
        #[arg(long, help = "Remove even if the file has human edits")]
        force: bool,
    },

    /// Check registry against version history, rebuilding if needed
    Verify {
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolutionArg {
    /// Put the latest generated proposal live
    Accept,
    /// Adopt the edited file as the new baseline
    Keep,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Accept => Resolution::Accept,
            ResolutionArg::Keep => Resolution::Keep,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'g', long, help = "Show global config file only")]
        global: bool,
        #[arg(short = 'f', long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mdocweave encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!("\n\x1b[33mCommitted documents and history are unaffected; rerun to continue.\x1b[0m");
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Generate {
            collection,
            doc_type,
            force,
            force_all,
            format,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(commands::generate::run(commands::generate::GenerateOptions {
                collection,
                doc_type,
                force,
                force_all,
                format,
            }))?;
        }
        Commands::Status { format } => {
            commands::status::run(format)?;
        }
        Commands::History { id, format } => {
            commands::history::history(&id, format)?;
        }
        Commands::Show { id, seq, body } => {
            commands::history::show(&id, seq, body)?;
        }
        Commands::Reconcile { id, resolution } => {
            commands::reconcile::run(&id, resolution.into())?;
        }
        Commands::Remove { id, force } => {
            commands::remove::run(&id, force)?;
        }
        Commands::Verify { format } => {
            commands::verify::run(format)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { global, format } => {
                commands::config::show(global, format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
