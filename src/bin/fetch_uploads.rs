#![forbid(unsafe_code)]

//! Command-line front end: fetches the uploads of one channel and dumps the
//! selected fields to a JSON file.
//!
//! The API key comes from `GOOGLE_API_KEY` (environment first, then `.env`).

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use ytchannel_tools::api::UreqTransport;
use ytchannel_tools::config::{RuntimeOverrides, resolve_runtime_settings};
use ytchannel_tools::export::{DEFAULT_OUTPUT_PATH, write_export};
use ytchannel_tools::fetch::{DEFAULT_FIELDS, DEFAULT_MAX_RESULTS};
use ytchannel_tools::progress::{ConsoleProgress, Progress, ProgressFile, ProgressSinks};
use ytchannel_tools::{Aggregator, FetchSettings, Fetcher};

const DEFAULT_PEEK: usize = 10;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "fetch_uploads",
    about = "Dump metadata for every video uploaded by a YouTube channel"
)]
struct FetchArgs {
    /// Channel id, e.g. UCupvZG-5ko_eiXAupbDfxWw
    channel_id: String,

    /// Fields to keep for each video (repeat or comma-separate)
    #[arg(
        short,
        long = "field",
        value_delimiter = ',',
        default_values_t = DEFAULT_FIELDS.map(String::from)
    )]
    fields: Vec<String>,

    /// Maximum number of videos to collect
    #[arg(short = 'n', long, default_value_t = DEFAULT_MAX_RESULTS, value_parser = parse_max_results)]
    max_results: usize,

    /// Where to write the JSON document
    #[arg(short, long, default_value = DEFAULT_OUTPUT_PATH)]
    output: PathBuf,

    /// Report progress on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Also write progress reports to this JSON file
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Alternative .env file to read the API key from
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// API key, overriding GOOGLE_API_KEY
    #[arg(long)]
    api_key: Option<String>,

    /// API base URL, overriding YTDATA_API_URL
    #[arg(long)]
    api_url: Option<String>,

    /// Number of titles to print after the dump (0 to disable)
    #[arg(long, default_value_t = DEFAULT_PEEK)]
    peek: usize,
}

fn parse_max_results(value: &str) -> std::result::Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(count) => Ok(count),
        Err(err) => Err(format!("expected a positive integer: {err}")),
    }
}

impl FetchArgs {
    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        let argv = std::iter::once("fetch_uploads").chain(values.iter().copied());
        Ok(Self::try_parse_from(argv)?)
    }

    fn fetch_settings(&self) -> Result<FetchSettings> {
        let channel_id = self.channel_id.trim();
        if channel_id.is_empty() {
            bail!("channel id must not be empty");
        }
        let fields = self
            .fields
            .iter()
            .map(|field| field.trim())
            .filter(|field| !field.is_empty());
        Ok(FetchSettings::new(channel_id, fields, self.max_results)?)
    }

    fn runtime_overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            api_key: self.api_key.clone(),
            api_url: self.api_url.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "ytchannel_tools=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Numbered titles of the first `count` records, newest first.
fn peek_lines(records: &Aggregator, count: usize) -> Vec<String> {
    records
        .ordered_values()
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(index, record)| {
            let label = record
                .get("title")
                .and_then(|title| title.as_str())
                .or_else(|| record.get("videoId").and_then(|id| id.as_str()))
                .unwrap_or("<untitled>");
            format!("  {}. {}", index + 1, label)
        })
        .collect()
}

fn main() -> Result<()> {
    let args = FetchArgs::parse();
    init_tracing(args.verbose);

    let settings = args.fetch_settings()?;
    let runtime = resolve_runtime_settings(args.runtime_overrides())
        .context("loading API credentials")?;

    let mut progress = ProgressSinks::default();
    if args.verbose {
        progress.push(ConsoleProgress::stderr());
    }
    if let Some(path) = &args.progress_file {
        progress.push(ProgressFile::new(path.clone()));
    }

    if args.verbose {
        println!("===================================");
        println!("YouTube Channel Uploads");
        println!("===================================");
        println!("Channel: {}", settings.channel_id());
        println!("Max results: {}", settings.max_results());
        println!();
    }

    let outcome = Fetcher::new(UreqTransport::new(&runtime), settings)
        .with_progress(&mut progress)
        .fetch()
        .map_err(|failure| {
            if !failure.partial.is_empty() {
                eprintln!(
                    "Warning: {} record(s) were collected before the failure and were not written",
                    failure.partial.len()
                );
            }
            anyhow::Error::new(failure)
        })?;

    if !outcome.diagnostics.is_empty() {
        eprintln!(
            "Warning: {} enrichment problem(s); some records may miss fields (see log)",
            outcome.diagnostics.len()
        );
    }

    progress.message(&format!("Dumping JSON into '{}'", args.output.display()));
    write_export(&args.output, &outcome.records)
        .with_context(|| format!("writing {}", args.output.display()))?;

    if args.peek > 0 && !outcome.records.is_empty() {
        println!("Most recent videos:");
        for line in peek_lines(&outcome.records, args.peek) {
            println!("{line}");
        }
        println!();
    }

    Ok(())
}
