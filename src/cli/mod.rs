//! CLI module for tianqi
//!
//! Provides command-line interface parsing for the `tianqi` binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tianqi - retrieval-augmented chat server and client
#[derive(Parser, Debug)]
#[command(
    name = "tianqi",
    version,
    about = "tianqi - retrieval-augmented chat server and streaming client",
    long_about = "Serves chat over a personal document store, and talks to a running server.\n\n\
                  Run without arguments to start the server.",
    after_help = "EXAMPLES:\n    \
                  tianqi                          # Start the server (uses tianqi.toml)\n    \
                  tianqi ingest ./docs            # Upload a folder to a running server\n    \
                  tianqi chat \"What is RAG?\" -k 3  # Stream a grounded answer\n    \
                  tianqi store clear              # Empty the vector store"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "tianqi.toml", global = true)]
    pub config: PathBuf,

    /// Server URL for client commands (overrides client.base_url)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Host address (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load, chunk and store every document in a folder
    ///
    /// By default the chunks are uploaded to a running server. With --local
    /// they are written straight into the configured vector store.
    Ingest {
        /// Folder to ingest (defaults to rag.documents_path)
        folder: Option<PathBuf>,

        /// Write into the local store instead of a server
        #[arg(long)]
        local: bool,
    },

    /// Stream a retrieval-augmented answer from a server
    Chat {
        /// Question to ask
        query: String,

        /// Number of chunks to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Stream a plain reply from a server, without retrieval
    Casual {
        /// Message content
        content: String,

        /// Message role
        #[arg(long, default_value = "user")]
        role: String,
    },

    /// Manage the vector store of a running server
    #[command(subcommand)]
    Store(StoreCommands),

    /// Show configuration information
    Config {
        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// Vector store management subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum StoreCommands {
    /// Show store state and entry count
    Status,

    /// List the closest entries to a query with their scores
    Search {
        /// Query text
        query: String,

        /// Number of entries to return
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Delete one entry
    Delete {
        /// Entry index
        index: u64,
    },

    /// Delete every entry
    Clear,

    /// Replace an entry's text; the new text gets a new index
    Update {
        /// Entry index
        index: u64,

        /// Replacement text
        text: String,
    },

    /// Switch the embedding model and re-embed every entry
    Model {
        /// New embedding model name
        name: String,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
