//! `ftmstore`: load, browse and deduplicate entities in a statement store.
//!
//! # Usage
//!
//! ```
//! ftmstore init
//! ftmstore write -d companies -i companies.ijson
//! ftmstore iterate -d companies,people --schema Company
//! ftmstore search -d companies "Tchibo Holding"
//! ftmstore xref -d companies,people --left companies > edges.ijson
//! ftmstore apply -d companies,people -i edges.ijson --sync
//! ```
//!
//! Entities and edges are read and written as JSON lines; `-` stands for
//! stdin.

mod commands;
mod settings;
#[cfg(test)]
mod tests;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use commands::App;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ftmstore", author, version, about = "Statement store for FollowTheMoney entities")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "ftmstore.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Create the statement and fingerprint tables.
  Init {
    /// Drop existing tables first.
    #[arg(long)]
    recreate: bool,
  },

  /// Write entities into a dataset.
  Write {
    #[arg(short, long)]
    dataset: String,

    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Provenance tag for the written statements.
    #[arg(long)]
    origin: Option<String>,

    /// Log failed batches and keep going.
    #[arg(long)]
    ignore_errors: bool,

    /// Compact the store afterwards.
    #[arg(long)]
    optimize: bool,
  },

  /// Print entities as JSON lines.
  Iterate {
    /// A dataset, a comma-separated list, or `*`.
    #[arg(short, long, default_value = "*")]
    datasets: String,

    #[arg(long)]
    schema: Option<String>,

    #[arg(long)]
    limit: Option<usize>,
  },

  /// Move an entity under a new canonical id.
  Canonize {
    #[arg(short, long)]
    dataset: String,

    entity_id: String,

    canonical_id: String,

    #[arg(long)]
    sync: bool,
  },

  /// Find likely duplicates and print them as edges.
  Xref {
    #[arg(short, long, default_value = "*")]
    datasets: String,

    /// Put entities of this dataset on the left of each pair.
    #[arg(long)]
    left: Option<String>,

    #[arg(long, default_value = "metaphone1")]
    algorithm: String,

    /// Only compare entities matchable with this schema.
    #[arg(long)]
    schema: Option<String>,

    /// Drop pairs scoring at or below this.
    #[arg(long, default_value_t = 0.0)]
    threshold: f64,

    #[arg(long, default_value_t = 1)]
    min_datasets: usize,

    /// Judge pairs scoring at least this as positive.
    #[arg(long)]
    auto_threshold: Option<f64>,
  },

  /// Find entities by name, printed as JSON lines with their score.
  Search {
    #[arg(short, long, default_value = "*")]
    datasets: String,

    q: String,

    #[arg(long, default_value_t = ftmstore_xref::DEFAULT_SEARCH_LIMIT)]
    limit: usize,

    /// Fall back to searching single name tokens.
    #[arg(long)]
    fuzzy: bool,
  },

  /// Canonize the positive edges read from input.
  Apply {
    #[arg(short, long, default_value = "*")]
    datasets: String,

    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Use placeholder canonical ids instead of the longest member id.
    #[arg(long)]
    mint: bool,

    #[arg(long)]
    sync: bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;
  let app = App::open(settings)
    .await
    .context("failed to open store")?;

  let mut out = std::io::stdout().lock();
  match cli.command {
    Command::Init { recreate } => app.init(recreate).await,
    Command::Write {
      dataset,
      input,
      origin,
      ignore_errors,
      optimize,
    } => {
      app
        .write(&dataset, &input, origin, ignore_errors, optimize)
        .await
    }
    Command::Iterate {
      datasets,
      schema,
      limit,
    } => {
      app
        .iterate(&datasets, schema.as_deref(), limit, &mut out)
        .await
    }
    Command::Canonize {
      dataset,
      entity_id,
      canonical_id,
      sync,
    } => app.canonize(&dataset, &entity_id, &canonical_id, sync).await,
    Command::Xref {
      datasets,
      left,
      algorithm,
      schema,
      threshold,
      min_datasets,
      auto_threshold,
    } => {
      app
        .xref(
          commands::XrefArgs {
            datasets,
            left,
            algorithm,
            schema,
            threshold,
            min_datasets,
            auto_threshold,
          },
          &mut out,
        )
        .await
    }
    Command::Search {
      datasets,
      q,
      limit,
      fuzzy,
    } => app.search(&datasets, &q, limit, fuzzy, &mut out).await,
    Command::Apply {
      datasets,
      input,
      mint,
      sync,
    } => app.apply(&datasets, &input, mint, sync).await,
  }
}
