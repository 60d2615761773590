use crate::error::{ErrorKind, Result};
use crate::{AddOptions, Cli, Command, DeleteOptions, EditOptions, MapOptions, PreviewOptions};
use exn::{OptionExt, ResultExt};
use feedman_config::Config;
use feedman_feeds::mapping::HeaderMapping;
use feedman_feeds::{Collection, Feed, FeedEntry, Preview, SaveOutcome};
use feedman_sample::Sampler;
use feedman_storage::{BackendHandle, StorageBackend};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let app = App::new(config)?;
    match cli.command {
        Command::Whoami => app.whoami().await,
        Command::List => app.list().await,
        Command::Show(target) => app.show(&target.feed).await,
        Command::Sources => app.sources().await,
        Command::Add(options) => app.add(options).await,
        Command::Edit(options) => app.edit(options).await,
        Command::Delete(options) => app.delete(options).await,
        Command::Preview(options) => app.preview(options).await,
        Command::Map(options) => app.map(options).await,
    }
}

struct App {
    config: Config,
    backend: BackendHandle,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let backend: BackendHandle = Arc::new(config.backend().or_raise(|| ErrorKind::Config)?);
        Ok(Self { config, backend })
    }

    async fn collection(&self) -> Result<Collection> {
        let collection = feedman_feeds::load(&self.backend, &self.config.feeds_path)
            .await
            .or_raise(|| ErrorKind::Feeds)?;
        for failure in &collection.failures {
            warn!("skipped unreadable record: {failure:?}");
        }
        Ok(collection)
    }

    async fn entry(&self, query: &str) -> Result<FeedEntry> {
        let collection = self.collection().await?;
        collection.find(query).cloned().ok_or_raise(|| ErrorKind::UnknownFeed(query.to_string()))
    }

    /// Save `entry` and print the key it now lives under.
    async fn save(&self, entry: &mut FeedEntry) -> Result<()> {
        let outcome = feedman_feeds::save(&self.backend, &self.config.feeds_path, entry)
            .await
            .or_raise(|| ErrorKind::Feeds)?;
        match &outcome {
            SaveOutcome::Created { .. } => info!("created feed"),
            SaveOutcome::Updated { .. } => info!("updated feed"),
            SaveOutcome::Renamed { from, .. } => info!("moved feed from {from}"),
        }
        println!("{}", outcome.key());
        Ok(())
    }

    async fn whoami(&self) -> Result<()> {
        self.config.token().or_raise(|| ErrorKind::Config)?;
        let login = self.backend.identity().await.or_raise(|| ErrorKind::Storage)?;
        let github = &self.config.github;
        println!("{login} ({}/{})", github.owner, github.repo);
        Ok(())
    }

    async fn list(&self) -> Result<()> {
        let collection = self.collection().await?;
        if collection.feeds.is_empty() {
            println!("No feeds in {}/", self.config.feeds_path);
        }
        for entry in &collection.feeds {
            print_summary(entry);
        }
        if !collection.failures.is_empty() {
            println!("\n{} record(s) could not be read", collection.failures.len());
        }
        Ok(())
    }

    async fn show(&self, query: &str) -> Result<()> {
        let entry = self.entry(query).await?;
        let json = entry.feed.to_json().or_raise(|| ErrorKind::Feeds)?;
        println!("# {}", entry.key());
        if let Some(revision) = entry.revision() {
            println!("# revision {}", revision.as_str());
        }
        let strategy = entry.feed.match_strategy;
        println!("# {}", strategy.description());
        println!("# {}", strategy.help());
        println!("# {}: {:?}", strategy.column_label(), entry.feed.columns.identifier);
        print!("{json}");
        Ok(())
    }

    async fn sources(&self) -> Result<()> {
        let sources = feedman_feeds::discover_sources(&self.backend, &self.config.sources_path).await;
        if sources.is_empty() {
            println!("No CSV files found");
        }
        for source in sources {
            let url = source.url.as_deref().unwrap_or("-");
            println!("{:<40} {:>10}  {url}", source.name, source.display_size());
        }
        Ok(())
    }

    async fn add(&self, options: AddOptions) -> Result<()> {
        let mut feed = Feed::named(options.name);
        options.fields.apply(&mut feed);
        let mut entry = FeedEntry::new(feed);
        self.save(&mut entry).await
    }

    async fn edit(&self, options: EditOptions) -> Result<()> {
        let mut entry = self.entry(&options.target.feed).await?;
        if let Some(name) = options.name {
            entry.feed.name = name;
        }
        options.fields.apply(&mut entry.feed);
        self.save(&mut entry).await
    }

    async fn delete(&self, options: DeleteOptions) -> Result<()> {
        let mut entry = self.entry(&options.target.feed).await?;
        if !options.yes && !confirm(&format!("Delete feed \"{}\"? This cannot be undone.", entry.feed.name))? {
            info!("nothing deleted");
            return Ok(());
        }
        let key = entry.key();
        feedman_feeds::delete(&self.backend, &self.config.feeds_path, &mut entry)
            .await
            .or_raise(|| ErrorKind::Feeds)?;
        info!("deleted {key}");
        Ok(())
    }

    async fn preview(&self, options: PreviewOptions) -> Result<()> {
        if options.apply && options.feed.is_none() {
            exn::bail!(ErrorKind::NothingToApply);
        }
        let mut entry = match &options.feed {
            Some(query) => Some(self.entry(query).await?),
            None => None,
        };
        let feed = entry.as_ref().map(|entry| entry.feed.clone()).unwrap_or_default();
        let url = options.url.as_deref().unwrap_or(&feed.source_url);
        let delimiter = options.delimiter.unwrap_or(feed.delimiter);
        let rows = options.rows.unwrap_or(self.config.sample_rows);

        let sampler = Sampler::new()
            .or_raise(|| ErrorKind::Feeds)?
            .with_timeout(self.config.timeout());
        let preview = feedman_feeds::preview(&sampler, url, delimiter, &feed.columns, rows)
            .await
            .or_raise(|| ErrorKind::Feeds)?;
        print_preview(&preview, &feed);

        if options.apply
            && let Some(entry) = entry.as_mut()
        {
            if preview.suggested == entry.feed.columns {
                info!("column mapping already matches the suggestion");
                return Ok(());
            }
            entry.feed.columns = preview.suggested;
            self.save(entry).await?;
        }
        Ok(())
    }

    async fn map(&self, options: MapOptions) -> Result<()> {
        let mut entry = self.entry(&options.target.feed).await?;
        let label = options.role.label(entry.feed.match_strategy);
        entry.feed.columns.assign(options.role, options.header.trim());
        info!("{label} column set to {:?}", entry.feed.columns.get(options.role));
        self.save(&mut entry).await
    }
}

fn print_summary(entry: &FeedEntry) {
    let feed = &entry.feed;
    let badge = if feed.enabled { "enabled " } else { "disabled" };
    println!("[{badge}] {}  ({})", feed.name, entry.key());
    let warehouse = feed.warehouse_label().map_or_else(|| format!("#{}", feed.warehouse_id), str::to_string);
    println!(
        "           CSV: {} | Match by: {} | Warehouse: {warehouse} | Delimiter: {:?}",
        feed.source_name().unwrap_or("-"),
        feed.match_strategy,
        feed.delimiter.as_str(),
    );
}

fn header_cell(mapping: &HeaderMapping, feed: &Feed) -> String {
    if !mapping.is_mapped() {
        return mapping.header.clone();
    }
    let labels: Vec<_> = mapping.roles.iter().map(|role| role.label(feed.match_strategy)).collect();
    format!("{} [{}]", mapping.header, labels.join(", "))
}

fn print_preview(preview: &Preview, feed: &Feed) {
    let sample = &preview.sample;
    let header: Vec<_> = preview.mappings.iter().map(|mapping| header_cell(mapping, feed)).collect();
    println!("{}", header.join(" | "));
    for row in &sample.rows {
        let cells: Vec<_> = sample.headers.iter().map(|name| row.get(name)).collect();
        println!("{}", cells.join(" | "));
    }
    println!(
        "\nShowing {} of {} rows, {} columns",
        sample.rows.len(),
        sample.total_row_count,
        sample.headers.len()
    );
    for role in feedman_feeds::mapping::unresolved(&sample.headers, &feed.columns) {
        warn!("{} column {:?} is not in the CSV", role.label(feed.match_strategy), feed.columns.get(role));
    }
    if preview.suggested != feed.columns {
        println!(
            "Suggested: {} = {:?}, Qty = {:?}",
            feed.match_strategy.column_label(),
            preview.suggested.identifier,
            preview.suggested.quantity,
        );
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().or_raise(|| ErrorKind::Terminal)?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer).or_raise(|| ErrorKind::Terminal)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
