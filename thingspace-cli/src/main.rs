//! # thingspace CLI
//!
//! Command-line interface for inspecting thingspace snapshot stores.

mod commands;
mod render;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "thingspace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "thingspace.yml")]
    config: PathBuf,

    /// Snapshot file to inspect (overrides the configured storage path)
    #[arg(long, env = "THINGSPACE_STORE")]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Counts of stored things, holders, actions and invalid flags
    Summary {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List stored things
    Things {
        /// Only things of this type
        #[arg(long = "type")]
        type_name: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print one stored thing in full
    Show {
        /// Identity key, e.g. 'Item{id="a"}'
        key: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List holder associations
    Holders {
        /// Only this holder
        #[arg(long)]
        name: Option<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List pending actions
    Actions {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List things flagged invalid
    Invalid {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Delete the snapshot file
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays machine-readable
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let path = store::resolve_path(&cli.config, cli.store.as_deref())?;

    match cli.command {
        Commands::Summary { json } => commands::summary(&path, json),
        Commands::Things { type_name, json } => {
            commands::list_things(&path, type_name.as_deref(), json)
        }
        Commands::Show { key, json } => commands::show_thing(&path, &key, json),
        Commands::Holders { name, json } => commands::list_holders(&path, name.as_deref(), json),
        Commands::Actions { json } => commands::list_actions(&path, json),
        Commands::Invalid { json } => commands::list_invalid(&path, json),
        Commands::Clear { yes } => commands::clear_store(&path, yes),
    }
}
