#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use demoserve_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "demoserve")]
#[command(author, version, about = "Dev server for the component demo pages", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Start the dev server
    Dev {
        /// Config file (default: auto-discover in the working directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Exit instead of trying the next port when the port is taken
        #[arg(long)]
        strict_port: bool,

        /// Open the browser after startup
        #[arg(long)]
        open: bool,

        /// Use the built-in demo preset, ignoring config files
        #[arg(long, conflicts_with = "config")]
        demo: bool,
    },

    /// Print the resolved dev server config as JSON
    Config {
        /// Config file (default: auto-discover in the working directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print the built-in demo preset
        #[arg(long, conflicts_with = "config")]
        demo: bool,
    },

    /// Show where import specifiers resolve through the configured aliases
    Resolve {
        /// Import specifiers, e.g. `@/components/Button.vue`
        #[arg(required = true)]
        specifiers: Vec<String>,

        /// Config file (default: auto-discover in the working directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let cwd = dunce::canonicalize(&cwd).unwrap_or(cwd);

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(cli.json),
        Some(Commands::Dev {
            config: config_file,
            port,
            host,
            strict_port,
            open,
            demo,
        }) => {
            let span = tracing::info_span!("dev", cmd = "dev", cwd = %cwd.display());
            let _guard = span.enter();
            commands::dev::run(commands::dev::DevAction {
                cwd: config.cwd,
                config: config_file,
                demo,
                port,
                host,
                strict_port,
                open,
                json: cli.json,
            })
        }
        Some(Commands::Config {
            config: config_file,
            demo,
        }) => {
            let span = tracing::info_span!("config", cmd = "config", cwd = %cwd.display());
            let _guard = span.enter();
            commands::config::run(commands::config::ConfigAction {
                cwd: config.cwd,
                config: config_file,
                demo,
                json: cli.json,
            })
        }
        Some(Commands::Resolve {
            specifiers,
            config: config_file,
        }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            commands::resolve::run(commands::resolve::ResolveAction {
                cwd: config.cwd,
                config: config_file,
                specifiers,
                json: cli.json,
            })
        }
    }
}
