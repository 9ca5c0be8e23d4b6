//! Cross-record correlation.
//!
//! Each pass walks the decoded history looking for its trigger events and
//! scans their neighbours by index to assemble one domain record. Passes
//! only read the history; records are buffered until every pass succeeds.

mod basal;
mod bolus;
mod device;
mod glucose;
mod settings;

use crate::history::HistoryLog;
use crate::settings::CurrentSettings;
use crate::timestamp::DeviceTimestamp;
use crate::timezone::TimezoneResolver;
use crate::types::{DomainRecord, RecordTime};
use crate::{Error, Result};

/// Records from a successful correlation, not yet sorted
#[derive(Debug, Default)]
pub struct Correlation {
    pub records: Vec<DomainRecord>,
    /// Records dropped for invariant violations under lenient parsing
    pub skipped: usize,
}

/// Shared state of one correlation run
pub(crate) struct Context<'a> {
    pub log: &'a HistoryLog,
    resolver: &'a TimezoneResolver,
    strict: bool,
    records: Vec<DomainRecord>,
    skipped: usize,
}

impl<'a> Context<'a> {
    fn new(log: &'a HistoryLog, resolver: &'a TimezoneResolver, strict: bool) -> Self {
        Self {
            log,
            resolver,
            strict,
            records: Vec::new(),
            skipped: 0,
        }
    }

    pub fn time(&self, timestamp: DeviceTimestamp) -> Result<RecordTime> {
        self.resolver.resolve(timestamp)
    }

    pub fn emit(&mut self, record: impl Into<DomainRecord>) {
        self.records.push(record.into());
    }

    /// Fatal when strict, otherwise the record is skipped. Only correlation
    /// violations are ever skipped; any other error still aborts the run.
    pub fn violation(&mut self, err: Error) -> Result<()> {
        if self.strict || !err.is_correlation_violation() {
            return Err(err);
        }
        tracing::warn!("Skipping record: {}", err);
        self.skipped += 1;
        Ok(())
    }
}

/// Run every pass over a decoded history
pub fn correlate(
    log: &HistoryLog,
    resolver: &TimezoneResolver,
    current_settings: Option<&CurrentSettings>,
    strict: bool,
) -> Result<Correlation> {
    let mut ctx = Context::new(log, resolver, strict);

    for change in resolver.time_changes() {
        ctx.emit(change.clone());
    }

    if let Some(current) = current_settings {
        settings::build_settings_records(&mut ctx, current)?;
    }

    basal::build_basal_records(&mut ctx)?;
    basal::build_temp_basal_records(&mut ctx)?;
    device::build_suspend_resume_records(&mut ctx)?;

    let mut wizards = bolus::WizardMatcher::default();
    bolus::build_normal_bolus_records(&mut ctx, &mut wizards)?;
    bolus::build_square_bolus_records(&mut ctx, &mut wizards)?;
    bolus::build_dual_bolus_records(&mut ctx, &mut wizards)?;
    bolus::build_wizard_without_bolus_records(&mut ctx, &wizards)?;

    device::build_rewind_records(&mut ctx)?;
    device::build_prime_records(&mut ctx)?;
    glucose::build_cgm_records(&mut ctx)?;
    glucose::build_bg_records(&mut ctx)?;
    glucose::build_calibration_records(&mut ctx)?;
    device::build_alarm_records(&mut ctx)?;

    tracing::info!(
        "Correlated {} events into {} records ({} skipped)",
        log.len(),
        ctx.records.len(),
        ctx.skipped
    );

    Ok(Correlation {
        records: ctx.records,
        skipped: ctx.skipped,
    })
}
