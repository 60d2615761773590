mod commands;
mod error;

use clap::{Args, Parser, Subcommand};
use feedman_feeds::{Delimiter, Feed, MatchStrategy, Role};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Manage supplier stock feed definitions stored in a GitHub repository.
#[derive(Debug, Clone, Parser)]
#[command(about, version, subcommand_help_heading = "Commands")]
struct Cli {
    /// Configuration file layered over the user configuration.
    #[arg(short, long, global = true, value_name = "path")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check the configured token and show who it belongs to.
    Whoami,

    /// List every feed in the repository.
    List,

    /// Show one feed's stored record.
    Show(FeedArg),

    /// List CSV files in the repository that feeds can read from.
    Sources,

    /// Create a new feed.
    Add(AddOptions),

    /// Change an existing feed. Changing the name moves its record.
    Edit(EditOptions),

    /// Delete a feed.
    Delete(DeleteOptions),

    /// Sample a CSV source and suggest column mappings.
    Preview(PreviewOptions),

    /// Assign a CSV header to one of a feed's columns.
    Map(MapOptions),
}

#[derive(Debug, Clone, Args)]
struct FeedArg {
    /// Feed name or storage key.
    #[arg(value_name = "feed")]
    feed: String,
}

/// Feed fields settable from the command line.
#[derive(Debug, Clone, Default, Args)]
struct FeedOptions {
    /// URL of the supplier CSV.
    #[arg(long, value_name = "url")]
    url: Option<String>,

    /// Field separator: `;`, `,` or `tab`.
    #[arg(long, value_name = "delimiter")]
    delimiter: Option<Delimiter>,

    /// CSV header holding the product identifier.
    #[arg(long, value_name = "header")]
    identifier: Option<String>,

    /// CSV header holding the stock quantity.
    #[arg(long, value_name = "header")]
    quantity: Option<String>,

    /// One of `old_shop_sku`, `sku`, `model` or `ean`.
    #[arg(long = "match-by", value_name = "strategy")]
    match_by: Option<MatchStrategy>,

    /// Target warehouse (1, 2 or 3).
    #[arg(long, value_name = "id")]
    warehouse: Option<u32>,

    /// Whether the importer should process this feed.
    #[arg(long, value_name = "bool")]
    enabled: Option<bool>,
}

impl FeedOptions {
    fn apply(self, feed: &mut Feed) {
        if let Some(url) = self.url {
            feed.source_url = url;
        }
        if let Some(delimiter) = self.delimiter {
            feed.delimiter = delimiter;
        }
        if let Some(identifier) = self.identifier {
            feed.columns.assign(Role::Identifier, identifier);
        }
        if let Some(quantity) = self.quantity {
            feed.columns.assign(Role::Quantity, quantity);
        }
        if let Some(strategy) = self.match_by {
            feed.match_strategy = strategy;
        }
        if let Some(warehouse) = self.warehouse {
            feed.warehouse_id = warehouse;
        }
        if let Some(enabled) = self.enabled {
            feed.enabled = enabled;
        }
    }
}

#[derive(Debug, Clone, Args)]
struct AddOptions {
    /// Display name; also determines the storage key.
    #[arg(long, value_name = "name")]
    name: String,

    #[command(flatten)]
    fields: FeedOptions,
}

#[derive(Debug, Clone, Args)]
struct EditOptions {
    #[command(flatten)]
    target: FeedArg,

    /// New display name.
    #[arg(long, value_name = "name")]
    name: Option<String>,

    #[command(flatten)]
    fields: FeedOptions,
}

#[derive(Debug, Clone, Args)]
struct DeleteOptions {
    #[command(flatten)]
    target: FeedArg,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    yes: bool,
}

#[derive(Debug, Clone, Args)]
struct PreviewOptions {
    /// Feed whose source to sample.
    #[arg(value_name = "feed")]
    feed: Option<String>,

    /// Sample this URL instead of a feed's source.
    #[arg(long, value_name = "url", conflicts_with = "feed", required_unless_present = "feed")]
    url: Option<String>,

    /// Override the delimiter used for parsing.
    #[arg(long, value_name = "delimiter")]
    delimiter: Option<Delimiter>,

    /// Number of data rows to show.
    #[arg(long, value_name = "n")]
    rows: Option<usize>,

    /// Save the suggested column mapping to the feed.
    #[arg(long, conflicts_with = "url")]
    apply: bool,
}

#[derive(Debug, Clone, Args)]
struct MapOptions {
    #[command(flatten)]
    target: FeedArg,

    /// CSV header to assign.
    #[arg(value_name = "header")]
    header: String,

    /// `identifier` or `quantity`.
    #[arg(value_name = "role")]
    role: Role,
}

#[tokio::main]
async fn main() -> ExitCode {
    let layer = fmt::layer().compact().with_target(false).without_time().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(layer).with(filter).init();

    match commands::run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}
