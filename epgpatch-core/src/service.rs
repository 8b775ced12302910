//! High-level service facade running the fetch, merge and write pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::aggregate::ScheduleAggregator;
use crate::config::GuideConfig;
use crate::model::{ProgramEntry, resolve_window};
use crate::ports::{BaselinePort, ListingsPort, PortError};
use crate::xmltv::{EpgMerger, MergeStats};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of a completed run.
pub struct RunSummary {
    /// Programmes scraped for the injected channel.
    pub programs: usize,
    /// Baseline merge counters.
    pub merge: MergeStats,
    /// Channels written to the guide.
    pub channels: usize,
    /// File the guide was written to.
    pub output_path: PathBuf,
}

/// Public entry point wiring the listing and baseline backends together.
pub struct EpgPatchService {
    aggregator: ScheduleAggregator,
    baseline: Arc<dyn BaselinePort>,
    merger: EpgMerger,
    config: Arc<GuideConfig>,
}

impl EpgPatchService {
    /// Create a new service bound to the given backends and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Selector`] if the listing parser cannot be built and
    /// [`PortError::InvalidConfig`] if the merge rules are out of range.
    pub fn new(
        listings: Arc<dyn ListingsPort>,
        baseline: Arc<dyn BaselinePort>,
        config: Arc<GuideConfig>,
    ) -> Result<Self, PortError> {
        Ok(Self {
            aggregator: ScheduleAggregator::new(listings)?,
            baseline,
            merger: EpgMerger::new(config.merge.clone())?,
            config,
        })
    }

    /// Scrape the listing window starting at `today`, sorted by start time.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the token handshake or any day's fetch fails.
    pub async fn fetch_all_programs(&self, today: NaiveDate) -> Result<Vec<ProgramEntry>, PortError> {
        self.aggregator.fetch_all_programs(&resolve_window(today)).await
    }

    /// Fetch the baseline from `baseline_url`, merge `new_programs` into it and
    /// overwrite `output_path` with the result.
    ///
    /// Nothing is written unless the whole document rendered successfully.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the baseline cannot be fetched or parsed, or the
    /// file cannot be written.
    pub async fn merge_and_write(
        &self,
        baseline_url: &str,
        new_programs: &[ProgramEntry],
        output_path: &Path,
    ) -> Result<(MergeStats, usize), PortError> {
        let baseline = self.baseline.fetch(baseline_url).await?;
        info!(url = baseline_url, bytes = baseline.len(), "fetched baseline guide");

        let (schedule, stats) = self.merger.merge(&baseline, new_programs)?;
        let document = self.merger.render(&schedule)?;
        fs::write(output_path, document)?;

        info!(
            path = %output_path.display(),
            kept = stats.kept,
            dropped = stats.dropped,
            injected = stats.injected,
            "wrote merged guide"
        );
        Ok((stats, schedule.len()))
    }

    /// Run the whole pipeline with the configured baseline and output path.
    ///
    /// # Errors
    ///
    /// Returns the first [`PortError`] raised by any stage.
    pub async fn run(&self, today: NaiveDate) -> Result<RunSummary, PortError> {
        let programs = self.fetch_all_programs(today).await?;
        let merge = &self.config.merge;
        let (stats, channels) = self
            .merge_and_write(&merge.baseline_url, &programs, &merge.output_path)
            .await?;

        Ok(RunSummary {
            programs: programs.len(),
            merge: stats,
            channels,
            output_path: merge.output_path.clone(),
        })
    }
}
