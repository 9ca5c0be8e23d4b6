//! Domain records produced by a history parse.
//!
//! Each record is built once by the correlator and handed to a
//! `RecordFactory`. Every record carries a `RecordTime`:
//! - `time`: resolved UTC instant
//! - `device_time`: the pump's wall clock, for display
//! - the three offsets that map one onto the other
//! - `index`: the pump's RTC counter, stable across uploads for deduplication

use crate::codes::{BgUnits, CarbUnits, PrimeTarget};
use crate::fields::Insulin;
use crate::settings::PumpSettings;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Time and annotations
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTime {
    pub time: DateTime<Utc>,
    pub device_time: NaiveDateTime,
    /// Minutes
    pub timezone_offset: i64,
    /// Milliseconds
    pub clock_drift_offset: i64,
    /// Milliseconds
    pub conversion_offset: i64,
    pub index: u32,
}

/// Machine-readable note attached to a record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u16>,
}

impl Annotation {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            value: None,
            threshold: None,
        }
    }

    pub fn out_of_range(value: &str, threshold: u16) -> Self {
        Self {
            code: "bg/out-of-range".into(),
            value: Some(value.into()),
            threshold: Some(threshold),
        }
    }
}

// ============================================================================
// Boluses
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalBolus {
    #[serde(flatten)]
    pub time: RecordTime,
    pub normal: Insulin,
    /// Only when delivery differs from what was programmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_normal: Option<Insulin>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SquareBolus {
    #[serde(flatten)]
    pub time: RecordTime,
    pub extended: Insulin,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_extended: Option<Insulin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DualBolus {
    #[serde(flatten)]
    pub time: RecordTime,
    pub normal: Insulin,
    pub extended: Insulin,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_normal: Option<Insulin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_extended: Option<Insulin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_ms: Option<u64>,
}

/// Bolus embedded in a wizard record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum BolusRecord {
    Normal(NormalBolus),
    Square(SquareBolus),
    Dual(DualBolus),
}

impl BolusRecord {
    pub fn time(&self) -> &RecordTime {
        match self {
            BolusRecord::Normal(b) => &b.time,
            BolusRecord::Square(b) => &b.time,
            BolusRecord::Dual(b) => &b.time,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WizardRecommendation {
    pub carb: Insulin,
    pub correction: Insulin,
    pub net: Insulin,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BgTarget {
    pub low: f64,
    pub high: f64,
}

/// Bolus calculator result together with the bolus it produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wizard {
    #[serde(flatten)]
    pub time: RecordTime,
    pub units: BgUnits,
    pub carb_units: CarbUnits,
    pub recommended: WizardRecommendation,
    pub carb_input: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_input: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulin_on_board: Option<Insulin>,
    pub insulin_carb_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insulin_sensitivity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_target: Option<BgTarget>,
    pub bolus: BolusRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

// ============================================================================
// Basals
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScheduledBasal {
    #[serde(flatten)]
    pub time: RecordTime,
    pub rate: Insulin,
    pub schedule_name: String,
}

/// Closed-loop basal delivery
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomatedBasal {
    #[serde(flatten)]
    pub time: RecordTime,
    pub rate: Insulin,
    pub schedule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microbolus_amount: Option<Insulin>,
}

/// The scheduled basal a temp basal or suspend overrides
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuppressedBasal {
    pub rate: Insulin,
    pub schedule_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempBasal {
    #[serde(flatten)]
    pub time: RecordTime,
    pub rate: Insulin,
    /// Fraction of the suppressed rate, e.g. 1.5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    pub duration_ms: u64,
    pub expected_duration_ms: u64,
    pub suppressed: SuppressedBasal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuspendBasal {
    #[serde(flatten)]
    pub time: RecordTime,
    pub duration_ms: u64,
}

// ============================================================================
// Device events
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Manual,
    Automatic,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuspendResume {
    #[serde(flatten)]
    pub time: RecordTime,
    pub duration_ms: u64,
    /// False while the pump is still suspended at capture time
    pub resolved: bool,
    pub suspended_by: Agent,
    pub resumed_by: Agent,
    pub suspend_cause: String,
    pub resume_cause: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmType {
    LowInsulin,
    NoInsulin,
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    #[serde(flatten)]
    pub time: RecordTime,
    pub alarm_type: AlarmType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Insulin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_number: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prime {
    #[serde(flatten)]
    pub time: RecordTime,
    pub prime_target: PrimeTarget,
    pub volume: Insulin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReservoirChange {
    #[serde(flatten)]
    pub time: RecordTime,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeChange {
    #[serde(flatten)]
    pub time: RecordTime,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub agent: Agent,
}

// ============================================================================
// Glucose
// ============================================================================

/// Continuous glucose monitor reading, always mg/dL
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cbg {
    #[serde(flatten)]
    pub time: RecordTime,
    pub value: u16,
    pub units: BgUnits,
    pub interstitial_signal: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmbgSource {
    /// Sent over RF by a linked meter
    Linked,
    Manual,
}

/// Fingerstick reading, always mg/dL
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Smbg {
    #[serde(flatten)]
    pub time: RecordTime,
    pub value: u16,
    pub units: BgUnits,
    pub sub_type: SmbgSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meter_serial: Option<String>,
    /// Context name to device time, closed-loop readings only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bg_contexts: BTreeMap<String, NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(flatten)]
    pub time: RecordTime,
    pub value: u16,
    pub units: BgUnits,
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PumpSettingsRecord {
    #[serde(flatten)]
    pub time: RecordTime,
    #[serde(flatten)]
    pub settings: PumpSettings,
}

// ============================================================================
// Records
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainRecord {
    NormalBolus(NormalBolus),
    SquareBolus(SquareBolus),
    DualBolus(DualBolus),
    Wizard(Wizard),
    ScheduledBasal(ScheduledBasal),
    AutomatedBasal(AutomatedBasal),
    TempBasal(TempBasal),
    SuspendBasal(SuspendBasal),
    SuspendResume(SuspendResume),
    Cbg(Cbg),
    Smbg(Smbg),
    Calibration(Calibration),
    Alarm(Alarm),
    Prime(Prime),
    ReservoirChange(ReservoirChange),
    TimeChange(TimeChange),
    PumpSettings(PumpSettingsRecord),
}

impl DomainRecord {
    pub fn time(&self) -> &RecordTime {
        match self {
            DomainRecord::NormalBolus(r) => &r.time,
            DomainRecord::SquareBolus(r) => &r.time,
            DomainRecord::DualBolus(r) => &r.time,
            DomainRecord::Wizard(r) => &r.time,
            DomainRecord::ScheduledBasal(r) => &r.time,
            DomainRecord::AutomatedBasal(r) => &r.time,
            DomainRecord::TempBasal(r) => &r.time,
            DomainRecord::SuspendBasal(r) => &r.time,
            DomainRecord::SuspendResume(r) => &r.time,
            DomainRecord::Cbg(r) => &r.time,
            DomainRecord::Smbg(r) => &r.time,
            DomainRecord::Calibration(r) => &r.time,
            DomainRecord::Alarm(r) => &r.time,
            DomainRecord::Prime(r) => &r.time,
            DomainRecord::ReservoirChange(r) => &r.time,
            DomainRecord::TimeChange(r) => &r.time,
            DomainRecord::PumpSettings(r) => &r.time,
        }
    }

    /// Serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            DomainRecord::NormalBolus(_) => "normal_bolus",
            DomainRecord::SquareBolus(_) => "square_bolus",
            DomainRecord::DualBolus(_) => "dual_bolus",
            DomainRecord::Wizard(_) => "wizard",
            DomainRecord::ScheduledBasal(_) => "scheduled_basal",
            DomainRecord::AutomatedBasal(_) => "automated_basal",
            DomainRecord::TempBasal(_) => "temp_basal",
            DomainRecord::SuspendBasal(_) => "suspend_basal",
            DomainRecord::SuspendResume(_) => "suspend_resume",
            DomainRecord::Cbg(_) => "cbg",
            DomainRecord::Smbg(_) => "smbg",
            DomainRecord::Calibration(_) => "calibration",
            DomainRecord::Alarm(_) => "alarm",
            DomainRecord::Prime(_) => "prime",
            DomainRecord::ReservoirChange(_) => "reservoir_change",
            DomainRecord::TimeChange(_) => "time_change",
            DomainRecord::PumpSettings(_) => "pump_settings",
        }
    }
}

macro_rules! record_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for DomainRecord {
                fn from(record: $ty) -> Self {
                    DomainRecord::$variant(record)
                }
            }
        )*
    };
}

record_from!(
    NormalBolus(NormalBolus),
    SquareBolus(SquareBolus),
    DualBolus(DualBolus),
    Wizard(Wizard),
    ScheduledBasal(ScheduledBasal),
    AutomatedBasal(AutomatedBasal),
    TempBasal(TempBasal),
    SuspendBasal(SuspendBasal),
    SuspendResume(SuspendResume),
    Cbg(Cbg),
    Smbg(Smbg),
    Calibration(Calibration),
    Alarm(Alarm),
    Prime(Prime),
    ReservoirChange(ReservoirChange),
    TimeChange(TimeChange),
    PumpSettings(PumpSettingsRecord),
);

impl From<BolusRecord> for DomainRecord {
    fn from(bolus: BolusRecord) -> Self {
        match bolus {
            BolusRecord::Normal(b) => DomainRecord::NormalBolus(b),
            BolusRecord::Square(b) => DomainRecord::SquareBolus(b),
            BolusRecord::Dual(b) => DomainRecord::DualBolus(b),
        }
    }
}
