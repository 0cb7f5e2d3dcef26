//! Downloads survey instrument files and accumulates them per split

use crate::data::loader::DataLoader;
use crate::data::registry::{Instrument, LEGACY_SLEEP_COLUMNS, SLEEP_HOURS_COLUMN};
use crate::data::{xpt, Frame, Split, SEQN_COLUMN, YEAR_COLUMN};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of raw transport files
#[async_trait]
pub trait XptSource: Send + Sync {
    /// Fetch the raw bytes behind a URL
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET source
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Create source with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl XptSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Server rejected {}", url))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }
}

/// Outcome of one fetch run
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    /// Written instrument tables with their row counts
    pub written: Vec<(Instrument, PathBuf, usize)>,
    /// Source URLs that produced nothing
    pub failed: Vec<String>,
}

/// Fill `SLD_HOURS` from the legacy sleep-duration names, first non-missing wins
pub fn coalesce_sleep_hours(frame: &mut Frame) -> Result<bool> {
    let present: Vec<&[Option<f64>]> = LEGACY_SLEEP_COLUMNS
        .iter()
        .filter_map(|name| frame.column(name))
        .collect();
    if present.is_empty() {
        return Ok(false);
    }
    let values = (0..frame.n_rows())
        .map(|row| present.iter().find_map(|column| column[row]))
        .collect();
    frame.push_column(SLEEP_HOURS_COLUMN, values)?;
    Ok(true)
}

/// Tag, coalesce and filter one decoded table
///
/// Returns `None` when the table carries no subject identifier.
pub fn prepare_table(mut frame: Frame, instrument: Instrument, year: u16) -> Result<Option<Frame>> {
    if !frame.has_column(SEQN_COLUMN) {
        return Ok(None);
    }
    frame.push_column(YEAR_COLUMN, vec![Some(year as f64); frame.n_rows()])?;
    if coalesce_sleep_hours(&mut frame)? {
        debug!("Coalesced sleep duration for {} {}", instrument, year);
    }

    let mut keep = vec![SEQN_COLUMN];
    keep.extend(
        instrument
            .retained_columns()
            .into_iter()
            .filter(|c| *c != SEQN_COLUMN),
    );
    keep.push(YEAR_COLUMN);
    Ok(Some(frame.select(&keep)))
}

/// Downloads every cycle of every instrument, one request at a time
pub struct RawTableFetcher<S: XptSource> {
    source: S,
    base_url: String,
    loader: DataLoader,
}

impl<S: XptSource> RawTableFetcher<S> {
    /// Create fetcher
    pub fn new(source: S, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into(),
            loader: DataLoader::new(),
        }
    }

    async fn fetch_year(&self, instrument: Instrument, year: u16, url: &str) -> Result<Frame> {
        let bytes = self.source.fetch(url).await?;
        let members = xpt::parse(&bytes).with_context(|| format!("Failed to decode {}", url))?;

        let mut accumulated = Frame::new();
        for member in &members {
            let table = member.to_frame()?;
            match prepare_table(table, instrument, year)? {
                Some(table) => accumulated.append(&table),
                None => warn!("Member {} in {} has no {} column, skipped", member.name, url, SEQN_COLUMN),
            }
        }
        Ok(accumulated)
    }

    /// Accumulate one instrument across all cycles of a split
    ///
    /// A cycle that fails to download or decode contributes no rows.
    pub async fn fetch_instrument(
        &self,
        instrument: Instrument,
        split: Split,
        progress: &ProgressBar,
        failed: &mut Vec<String>,
    ) -> Result<Frame> {
        let mut accumulated = Frame::new();
        for source in instrument.sources(split, &self.base_url) {
            progress.set_message(format!("{} {}", instrument.output_name(), source.year));
            match self.fetch_year(instrument, source.year, &source.url).await {
                Ok(table) => {
                    info!(
                        "{} {} ({}): {} rows",
                        instrument.output_name(),
                        source.year,
                        split,
                        table.n_rows()
                    );
                    accumulated.append(&table);
                }
                Err(e) => {
                    warn!("Skipping {} {}: {:#}", instrument.code(), source.year, e);
                    failed.push(source.url.clone());
                }
            }
            progress.inc(1);
        }

        if accumulated.n_cols() == 0 {
            accumulated = Frame::from_columns(vec![
                (SEQN_COLUMN, Vec::new()),
                (YEAR_COLUMN, Vec::new()),
            ])?;
        }
        Ok(accumulated)
    }

    /// Fetch the given instruments for one split and write `{Name}_{SPLIT}.csv` files
    pub async fn fetch_split<P: AsRef<Path>>(
        &self,
        split: Split,
        instruments: &[Instrument],
        raw_dir: P,
    ) -> Result<FetchSummary> {
        let raw_dir = raw_dir.as_ref();
        crate::utils::ensure_dir(raw_dir)?;
        if instruments.is_empty() {
            bail!("No instruments selected");
        }

        let total: usize = instruments
            .iter()
            .map(|i| i.sources(split, &self.base_url).len())
            .sum();
        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        info!("Fetching {} files for the {} split", total, split);
        let mut summary = FetchSummary::default();
        for &instrument in instruments {
            let table = self
                .fetch_instrument(instrument, split, &progress, &mut summary.failed)
                .await?;
            let path = raw_dir.join(instrument.output_file(split));
            self.loader.save(&table, &path)?;
            summary.written.push((instrument, path, table.n_rows()));
        }
        progress.finish_and_clear();

        if !summary.failed.is_empty() {
            warn!("{} of {} files could not be fetched", summary.failed.len(), total);
        }
        Ok(summary)
    }
}
