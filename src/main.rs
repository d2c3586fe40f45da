use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbt_column_lineage::sql::Dialect;
use dbt_column_lineage::{artifacts, engine, listing, project};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// dbt project directory (defaults to DBT_PROJECT_DIR or discovery)
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// SQL dialect of the compiled models
    #[arg(long, global = true, default_value = dbt_column_lineage::constants::DEFAULT_DIALECT)]
    dialect: String,

    /// Enable verbose output (info level)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress all non-essential output (error level only)
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Enable debug output (debug level)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List schemas containing project models with declared columns
    Schemas,

    /// List models of a schema, grouped by folder
    Sources {
        /// Schema name
        #[arg(long)]
        schema: String,
    },

    /// List the declared columns of a model
    Columns {
        /// Model alias
        #[arg(long)]
        source: String,

        /// Pin the lookup to one schema
        #[arg(long)]
        schema: Option<String>,
    },

    /// Trace a column upstream through its source tables
    Lineage {
        /// Model name
        #[arg(long)]
        source: String,

        /// Column name
        #[arg(long)]
        column: String,

        /// Maximum traversal depth (-1 for unbounded)
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        depth: i32,
    },

    /// Find the downstream consumers of a column
    Reverse {
        /// Model name
        #[arg(long)]
        source: String,

        /// Column name
        #[arg(long)]
        column: String,
    },

    /// Model-to-model dependency graph
    Table {
        /// Model name
        #[arg(long)]
        source: String,

        /// Walk downstream (children) instead of upstream (parents)
        #[arg(long)]
        reverse: bool,

        /// Maximum traversal depth (-1 for unbounded)
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        depth: i32,
    },

    /// Decompose a model into its CTE dependency graph
    Cte {
        /// Model name
        #[arg(long)]
        source: String,

        /// Comma-separated columns to trace through the CTEs
        #[arg(long)]
        columns: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    initialize_logging(&cli);

    let dialect: Dialect = cli
        .dialect
        .parse()
        .map_err(|message: String| anyhow::anyhow!(message))?;
    let project_dir = project::resolve_project_dir(cli.project_dir.as_deref())?;
    let store = artifacts::shared(&project_dir)
        .with_context(|| format!("loading artifacts from {}", project_dir.display()))?;

    let payload = match &cli.command {
        Commands::Schemas => serde_json::to_string_pretty(&listing::list_schemas(store))?,
        Commands::Sources { schema } => {
            serde_json::to_string_pretty(&listing::list_sources(store, schema))?
        }
        Commands::Columns { source, schema } => {
            serde_json::to_string_pretty(&listing::list_columns(store, schema.as_deref(), source))?
        }
        Commands::Lineage {
            source,
            column,
            depth,
        } => serde_json::to_string_pretty(&engine::forward_lineage(
            store, dialect, source, column, *depth,
        ))?,
        Commands::Reverse { source, column } => {
            serde_json::to_string_pretty(&engine::reverse_lineage(store, dialect, source, column))?
        }
        Commands::Table {
            source,
            reverse,
            depth,
        } => serde_json::to_string_pretty(&engine::table_lineage(store, source, *reverse, *depth))?,
        Commands::Cte { source, columns } => {
            let columns = parse_columns(columns.as_deref());
            let decomposition = engine::cte_dependency(store, dialect, source, &columns)?;
            serde_json::to_string_pretty(&decomposition)?
        }
    };

    println!("{payload}");
    Ok(())
}

/// Split a comma-separated column list; the literal `null` (sent by the
/// front-end when nothing is selected) means no columns.
fn parse_columns(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.is_empty() && raw != "null" => raw
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn initialize_logging(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn" // default level
    };

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };

    fmt().with_env_filter(filter).with_target(false).init();
}
