//! Fetches a supplier CSV over HTTP and returns a bounded preview of it.
//!
//! The preview is used to show the operator what a feed's source looks like
//! and to suggest which columns hold the product identifier and the quantity.

pub mod error;

use crate::error::{ErrorKind, Result};
use csv::{ReaderBuilder, StringRecord};
use exn::ResultExt;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

/// Number of data rows a preview holds unless the caller asks otherwise.
pub const DEFAULT_SAMPLE_ROWS: usize = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Field separator of a supplier CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Delimiter {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = ";"))]
    Semicolon,
    #[cfg_attr(feature = "serde", serde(rename = ","))]
    Comma,
    #[cfg_attr(feature = "serde", serde(rename = "\t"))]
    Tab,
}

impl Delimiter {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Semicolon => b';',
            Self::Comma => b',',
            Self::Tab => b'\t',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Semicolon => ";",
            Self::Comma => ",",
            Self::Tab => "\t",
        }
    }

    /// Human label for menus and listings.
    pub fn label(self) -> &'static str {
        match self {
            Self::Semicolon => "semicolon (;)",
            Self::Comma => "comma (,)",
            Self::Tab => "tab",
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Delimiter {
    type Err = ErrorKind;

    /// Accepts the literal character or its name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            ";" | "semicolon" => Ok(Self::Semicolon),
            "," | "comma" => Ok(Self::Comma),
            "\t" | "\\t" | "tab" => Ok(Self::Tab),
            other => Err(ErrorKind::Delimiter(other.to_string())),
        }
    }
}

/// One data row keyed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRow {
    values: HashMap<String, String>,
    /// Fields beyond the last header, in order.
    pub extra: Vec<String>,
}

impl CsvRow {
    fn from_record(headers: &[String], record: &StringRecord) -> Self {
        let mut values = HashMap::with_capacity(headers.len());
        for (header, value) in headers.iter().zip(record.iter()) {
            values.insert(header.clone(), value.to_string());
        }
        let extra = record.iter().skip(headers.len()).map(str::to_string).collect();
        Self { values, extra }
    }

    /// Value under `header`; empty when the row is short or the header unknown.
    pub fn get(&self, header: &str) -> &str {
        self.values.get(header).map(String::as_str).unwrap_or("")
    }
}

/// The result of sampling a CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvSample {
    /// Column names in file order.
    pub headers: Vec<String>,
    /// At most `max_rows` data rows in file order.
    pub rows: Vec<CsvRow>,
    /// Approximate number of data rows in the whole file: newline-delimited
    /// segments minus the header. Counts a trailing empty segment and any
    /// quoted newlines, so it can overstate the true count.
    pub total_row_count: usize,
}

/// Parse `text` and keep the first `max_rows` data rows.
///
/// The first line is the header row. Empty lines are skipped and rows whose
/// field count differs from the header are accepted as-is.
pub fn parse(text: &str, delimiter: Delimiter, max_rows: usize) -> Result<CsvSample> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader.headers().or_raise(|| ErrorKind::Parse)?.iter().map(str::to_string).collect();
    let mut rows = Vec::with_capacity(max_rows.min(DEFAULT_SAMPLE_ROWS));
    for record in reader.records().take(max_rows) {
        let record = record.or_raise(|| ErrorKind::Parse)?;
        rows.push(CsvRow::from_record(&headers, &record));
    }
    Ok(CsvSample { headers, rows, total_row_count: approximate_rows(text) })
}

fn approximate_rows(text: &str) -> usize {
    text.split('\n').count().saturating_sub(1)
}

/// HTTP client for supplier CSVs.
#[derive(Debug, Clone)]
pub struct Sampler {
    client: Client,
    timeout: Duration,
}

impl Sampler {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("feedman/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Client)?;
        Ok(Self { client, timeout: DEFAULT_TIMEOUT })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retrieve the CSV text at `url`.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let unreachable = || ErrorKind::FetchFailure { url: url.to_string(), status: None };
        let response = self.client.get(url).timeout(self.timeout).send().await.or_raise(unreachable)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::FetchFailure { url: url.to_string(), status: Some(status.as_u16()) });
        }
        let text = response.text().await.or_raise(unreachable)?;
        debug!(bytes = text.len(), "fetched CSV");
        Ok(text)
    }

    /// Fetch `url` and parse at most `max_rows` data rows of it.
    #[instrument(skip(self))]
    pub async fn sample(&self, url: &str, delimiter: Delimiter, max_rows: usize) -> Result<CsvSample> {
        let text = self.fetch(url).await?;
        let sample = parse(&text, delimiter, max_rows)?;
        debug!(headers = sample.headers.len(), rows = sample.rows.len(), total = sample.total_row_count, "sampled CSV");
        Ok(sample)
    }
}
