use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use endee_mcp::cli::{self, import::ImportArgs};
use endee_mcp::config::EndeeMcpConfig;
use endee_mcp::embedding::ProviderChoice;
use endee_mcp::import::parse_delimiter;
use endee_mcp::records::FieldMapping;
use endee_mcp::server;

#[derive(Parser)]
#[command(name = "endee-mcp", version, about = "MCP server for the Endee vector database")]
struct Cli {
    /// Config file (defaults to ~/.endee-mcp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server on the configured transport
    Serve {
        /// Override the transport: stdio or sse
        #[arg(long)]
        transport: Option<String>,
    },
    /// Manage local embedding models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Check Endee connectivity and embedding setup
    Doctor,
    /// Import a JSON, JSONL or CSV file into an index
    Import {
        /// Target index
        index: String,
        /// Input file
        file: PathBuf,
        /// Read the file as CSV
        #[arg(long)]
        csv: bool,
        /// CSV delimiter (use "\t" for tabs)
        #[arg(long, default_value = ",")]
        delimiter: String,
        #[arg(long, default_value = "id")]
        id_field: String,
        /// Field holding text to embed
        #[arg(long)]
        text_field: Option<String>,
        /// Field holding a precomputed vector
        #[arg(long)]
        vector_field: Option<String>,
        /// Fields copied into metadata
        #[arg(long, value_delimiter = ',')]
        meta_fields: Vec<String>,
        /// Fields copied into the filter object
        #[arg(long, value_delimiter = ',')]
        filter_fields: Vec<String>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Embedding provider: auto, openai, local or none
        #[arg(long)]
        provider: Option<ProviderChoice>,
    },
    /// Print the effective configuration (secrets hidden)
    Config,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download a local embedding model (defaults to the configured one)
    Download {
        /// Model name, e.g. sentence-transformers/all-MiniLM-L6-v2
        model: Option<String>,
    },
    /// List the supported local models
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EndeeMcpConfig::load_from(path)?,
        None => EndeeMcpConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            if let Some(transport) = transport {
                config.server.transport = transport;
            }
            server::serve(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download { model } => {
                cli::model_download(&config.embedding, model.as_deref()).await?;
            }
            ModelAction::List => cli::model_list(&config.embedding),
        },
        Command::Doctor => cli::doctor::doctor(&config).await?,
        Command::Import {
            index,
            file,
            csv,
            delimiter,
            id_field,
            text_field,
            vector_field,
            meta_fields,
            filter_fields,
            batch_size,
            provider,
        } => {
            let mapping = FieldMapping::columns(
                id_field,
                text_field,
                vector_field,
                Some(meta_fields),
                Some(filter_fields),
            );
            let csv_delimiter = if csv {
                Some(parse_delimiter(&delimiter)?)
            } else {
                None
            };
            let args = ImportArgs {
                index: &index,
                file: &file,
                mapping,
                csv_delimiter,
                batch_size,
                provider,
            };
            cli::import::import(&config, args).await?;
        }
        Command::Config => cli::print_config(&config)?,
    }

    Ok(())
}
