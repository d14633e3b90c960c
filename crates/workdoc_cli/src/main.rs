//! WorkDoc CLI
//!
//! Inspect and edit documents held in a snapshot of a row store, going
//! through the same checkout protocol as applications do.
//!
//! # Commands
//!
//! - `init` - Create the document for a key if it does not exist
//! - `show` - Print a document
//! - `set-attr` - Set an attribute on a document's root element
//! - `append` - Append a child element to a document's root element
//! - `list` - List the rows of a location's table

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::Context;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Check out and edit row-stored documents.
#[derive(Parser)]
#[command(name = "workdoc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot file holding the row store (created if missing)
    #[arg(global = true, short, long, default_value = "workdoc.json")]
    store: PathBuf,

    /// JSON file with storage location definitions
    #[arg(global = true, short, long)]
    locations: Option<PathBuf>,

    /// Storage location to use
    #[arg(global = true, short = 'n', long, default_value = commands::DEFAULT_LOCATION)]
    location: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for `show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Indented element tree
    Text,
    /// JSON element tree
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the document for a key if it does not exist
    Init {
        /// Row key
        key: String,
    },

    /// Print a document
    Show {
        /// Row key
        key: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Set an attribute on a document's root element
    SetAttr {
        /// Row key
        key: String,

        /// Attribute name
        name: String,

        /// Attribute value
        value: String,
    },

    /// Append a child element to a document's root element
    Append {
        /// Row key
        key: String,

        /// Element name
        element: String,

        /// Text content of the new element
        #[arg(short, long)]
        text: Option<String>,
    },

    /// List the rows of the location's table
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let ctx = Context::load(cli.store, cli.locations.as_deref(), &cli.location)?;
    let mut out = io::stdout().lock();

    match cli.command {
        Commands::Init { key } => commands::init::run(&ctx, &key, &mut out)?,
        Commands::Show { key, format } => commands::show::run(&ctx, &key, format, &mut out)?,
        Commands::SetAttr { key, name, value } => {
            commands::edit::set_attr(&ctx, &key, &name, &value, &mut out)?;
        }
        Commands::Append { key, element, text } => {
            commands::edit::append(&ctx, &key, &element, text.as_deref(), &mut out)?;
        }
        Commands::List => commands::list::run(&ctx, &mut out)?,
    }

    Ok(())
}
