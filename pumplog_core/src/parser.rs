//! End-to-end parse of one device history.
//!
//! Pages are decoded in order, timestamps resolved against the clock
//! changes in the history, and the correlated records handed to a
//! `RecordFactory` sorted by UTC time. Nothing reaches the factory unless
//! every stage succeeds.

use crate::config::ParseConfig;
use crate::correlate::correlate;
use crate::factory::{dispatch, RecordFactory};
use crate::history::HistoryLog;
use crate::settings::CurrentSettings;
use crate::timezone::{DeviceZone, TimezoneResolver};
use crate::Result;
use serde::Serialize;

/// Counts from a completed parse
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub events: usize,
    pub records: usize,
    /// Records dropped under lenient correlation
    pub skipped: usize,
    pub time_changes: usize,
}

pub struct HistoryParser {
    config: ParseConfig,
    settings: Option<CurrentSettings>,
}

impl HistoryParser {
    pub fn new(config: ParseConfig) -> Self {
        Self {
            config,
            settings: None,
        }
    }

    /// Rebuild settings snapshots from the pump's current settings
    pub fn with_settings(mut self, settings: CurrentSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn config(&self) -> &ParseConfig {
        &self.config
    }

    /// Parse pages in recording order
    pub fn parse<I, P, F>(&self, pages: I, factory: &mut F) -> Result<ParseReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
        F: RecordFactory + ?Sized,
    {
        let log = HistoryLog::from_pages(pages)?;
        self.parse_log(&log, factory)
    }

    /// Correlate an already decoded history
    pub fn parse_log<F>(&self, log: &HistoryLog, factory: &mut F) -> Result<ParseReport>
    where
        F: RecordFactory + ?Sized,
    {
        let zone = DeviceZone::new(&self.config.timezone)?;
        let resolver = TimezoneResolver::build(log.events(), zone, self.config.now)?;

        let correlation = correlate(
            log,
            &resolver,
            self.settings.as_ref(),
            self.config.strict_correlation,
        )?;

        let mut records = correlation.records;
        records.sort_by_key(|r| r.time().time);

        let report = ParseReport {
            events: log.len(),
            records: records.len(),
            skipped: correlation.skipped,
            time_changes: resolver.time_changes().len(),
        };

        for record in records {
            dispatch(factory, record)?;
        }

        tracing::info!(
            "Parsed {} events into {} records ({} skipped, {} clock changes)",
            report.events,
            report.records,
            report.skipped,
            report.time_changes
        );
        Ok(report)
    }
}
