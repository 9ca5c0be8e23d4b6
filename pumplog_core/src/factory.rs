//! Construction interface for domain records.
//!
//! The parser calls exactly one method per correlated record. Every method
//! defaults to `accept`, so a factory only overrides the kinds it cares
//! about.

use crate::types::*;
use crate::Result;

pub trait RecordFactory {
    /// Receives every record not handled by a more specific method
    fn accept(&mut self, record: DomainRecord) -> Result<()>;

    fn normal_bolus(&mut self, record: NormalBolus) -> Result<()> {
        self.accept(DomainRecord::NormalBolus(record))
    }

    fn square_bolus(&mut self, record: SquareBolus) -> Result<()> {
        self.accept(DomainRecord::SquareBolus(record))
    }

    fn dual_bolus(&mut self, record: DualBolus) -> Result<()> {
        self.accept(DomainRecord::DualBolus(record))
    }

    fn wizard(&mut self, record: Wizard) -> Result<()> {
        self.accept(DomainRecord::Wizard(record))
    }

    fn scheduled_basal(&mut self, record: ScheduledBasal) -> Result<()> {
        self.accept(DomainRecord::ScheduledBasal(record))
    }

    fn automated_basal(&mut self, record: AutomatedBasal) -> Result<()> {
        self.accept(DomainRecord::AutomatedBasal(record))
    }

    fn temp_basal(&mut self, record: TempBasal) -> Result<()> {
        self.accept(DomainRecord::TempBasal(record))
    }

    fn suspend_basal(&mut self, record: SuspendBasal) -> Result<()> {
        self.accept(DomainRecord::SuspendBasal(record))
    }

    fn suspend_resume(&mut self, record: SuspendResume) -> Result<()> {
        self.accept(DomainRecord::SuspendResume(record))
    }

    fn cbg(&mut self, record: Cbg) -> Result<()> {
        self.accept(DomainRecord::Cbg(record))
    }

    fn smbg(&mut self, record: Smbg) -> Result<()> {
        self.accept(DomainRecord::Smbg(record))
    }

    fn calibration(&mut self, record: Calibration) -> Result<()> {
        self.accept(DomainRecord::Calibration(record))
    }

    fn alarm(&mut self, record: Alarm) -> Result<()> {
        self.accept(DomainRecord::Alarm(record))
    }

    fn prime(&mut self, record: Prime) -> Result<()> {
        self.accept(DomainRecord::Prime(record))
    }

    fn reservoir_change(&mut self, record: ReservoirChange) -> Result<()> {
        self.accept(DomainRecord::ReservoirChange(record))
    }

    fn time_change(&mut self, record: TimeChange) -> Result<()> {
        self.accept(DomainRecord::TimeChange(record))
    }

    fn pump_settings(&mut self, record: PumpSettingsRecord) -> Result<()> {
        self.accept(DomainRecord::PumpSettings(record))
    }
}

/// Route a record to its kind-specific method
pub fn dispatch<F: RecordFactory + ?Sized>(factory: &mut F, record: DomainRecord) -> Result<()> {
    match record {
        DomainRecord::NormalBolus(r) => factory.normal_bolus(r),
        DomainRecord::SquareBolus(r) => factory.square_bolus(r),
        DomainRecord::DualBolus(r) => factory.dual_bolus(r),
        DomainRecord::Wizard(r) => factory.wizard(r),
        DomainRecord::ScheduledBasal(r) => factory.scheduled_basal(r),
        DomainRecord::AutomatedBasal(r) => factory.automated_basal(r),
        DomainRecord::TempBasal(r) => factory.temp_basal(r),
        DomainRecord::SuspendBasal(r) => factory.suspend_basal(r),
        DomainRecord::SuspendResume(r) => factory.suspend_resume(r),
        DomainRecord::Cbg(r) => factory.cbg(r),
        DomainRecord::Smbg(r) => factory.smbg(r),
        DomainRecord::Calibration(r) => factory.calibration(r),
        DomainRecord::Alarm(r) => factory.alarm(r),
        DomainRecord::Prime(r) => factory.prime(r),
        DomainRecord::ReservoirChange(r) => factory.reservoir_change(r),
        DomainRecord::TimeChange(r) => factory.time_change(r),
        DomainRecord::PumpSettings(r) => factory.pump_settings(r),
    }
}

/// Keeps every record in memory, in emission order
#[derive(Debug, Default)]
pub struct RecordCollector {
    pub records: Vec<DomainRecord>,
}

impl RecordCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one serialized `type`
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a DomainRecord> + 'a {
        self.records.iter().filter(move |r| r.kind() == kind)
    }

    pub fn into_records(self) -> Vec<DomainRecord> {
        self.records
    }
}

impl RecordFactory for RecordCollector {
    fn accept(&mut self, record: DomainRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}
