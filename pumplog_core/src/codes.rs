//! Enumerated codes found inside history record fields.
//!
//! Values the pump may add in later firmware map to `Other(u8)` rather
//! than failing the decode.

use serde::{Deserialize, Serialize};

/// Glucose unit a record's values are stored in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BgUnits {
    #[default]
    #[serde(rename = "mg/dL")]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl BgUnits {
    /// Byte value 0 is mg/dL, anything else mmol/L
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            BgUnits::MgDl
        } else {
            BgUnits::MmolL
        }
    }
}

/// Conversion factor between mmol/L and mg/dL
pub const MMOL_TO_MGDL: f64 = 18.01559;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CarbUnits {
    #[default]
    Grams,
    Exchanges,
}

impl CarbUnits {
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            CarbUnits::Grams
        } else {
            CarbUnits::Exchanges
        }
    }
}

/// Where a BG_READING value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BgSource {
    ExternalMeter,
    BolusWizard,
    BgEventMarker,
    SensorCal,
    Other(u8),
}

impl From<u8> for BgSource {
    fn from(code: u8) -> Self {
        match code {
            1 => BgSource::ExternalMeter,
            2 => BgSource::BolusWizard,
            3 => BgSource::BgEventMarker,
            4 => BgSource::SensorCal,
            other => BgSource::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BgOrigin {
    ManuallyEntered,
    ReceivedFromRf,
}

/// Context in which a closed-loop BG reading was logged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BgContext {
    BgReadingReceived,
    UserAcceptedRemoteBg,
    UserRejectedRemoteBg,
    RemoteBgAcceptanceScreenTimeout,
    SignalIntegrityPass,
    SignalIntegrityFail,
    BgSentForCalib,
    UserRejectedSensorCalib,
    EnteredInBgEntry,
    EnteredInMealWizard,
    EnteredInBolusWizard,
    EnteredInSensorCalib,
    EnteredAsBgMarker,
    Other(u8),
}

impl BgContext {
    /// First of the manual-entry contexts
    pub const FIRST_ENTERED: u8 = 8;

    pub fn code(self) -> u8 {
        match self {
            BgContext::BgReadingReceived => 0,
            BgContext::UserAcceptedRemoteBg => 1,
            BgContext::UserRejectedRemoteBg => 2,
            BgContext::RemoteBgAcceptanceScreenTimeout => 3,
            BgContext::SignalIntegrityPass => 4,
            BgContext::SignalIntegrityFail => 5,
            BgContext::BgSentForCalib => 6,
            BgContext::UserRejectedSensorCalib => 7,
            BgContext::EnteredInBgEntry => 8,
            BgContext::EnteredInMealWizard => 9,
            BgContext::EnteredInBolusWizard => 10,
            BgContext::EnteredInSensorCalib => 11,
            BgContext::EnteredAsBgMarker => 12,
            BgContext::Other(code) => code,
        }
    }

    /// Kebab-case name used in annotation codes
    pub fn slug(self) -> String {
        let slug = match self {
            BgContext::BgReadingReceived => "bg-reading-received",
            BgContext::UserAcceptedRemoteBg => "user-accepted-remote-bg",
            BgContext::UserRejectedRemoteBg => "user-rejected-remote-bg",
            BgContext::RemoteBgAcceptanceScreenTimeout => "remote-bg-acceptance-screen-timeout",
            BgContext::SignalIntegrityPass => "bg-si-pass-result-recd-frm-gst",
            BgContext::SignalIntegrityFail => "bg-si-fail-result-recd-frm-gst",
            BgContext::BgSentForCalib => "bg-sent-for-calib",
            BgContext::UserRejectedSensorCalib => "user-rejected-sensor-calib",
            BgContext::EnteredInBgEntry => "entered-in-bg-entry",
            BgContext::EnteredInMealWizard => "entered-in-meal-wizard",
            BgContext::EnteredInBolusWizard => "entered-in-bolus-wizard",
            BgContext::EnteredInSensorCalib => "entered-in-sensor-calib",
            BgContext::EnteredAsBgMarker => "entered-as-bg-marker",
            BgContext::Other(code) => return format!("context-{}", code),
        };
        slug.to_string()
    }

    /// Guardian transmitter signal-integrity results are not annotated
    pub fn is_signal_integrity(self) -> bool {
        matches!(
            self,
            BgContext::SignalIntegrityPass | BgContext::SignalIntegrityFail
        )
    }
}

impl From<u8> for BgContext {
    fn from(code: u8) -> Self {
        match code {
            0 => BgContext::BgReadingReceived,
            1 => BgContext::UserAcceptedRemoteBg,
            2 => BgContext::UserRejectedRemoteBg,
            3 => BgContext::RemoteBgAcceptanceScreenTimeout,
            4 => BgContext::SignalIntegrityPass,
            5 => BgContext::SignalIntegrityFail,
            6 => BgContext::BgSentForCalib,
            7 => BgContext::UserRejectedSensorCalib,
            8 => BgContext::EnteredInBgEntry,
            9 => BgContext::EnteredInMealWizard,
            10 => BgContext::EnteredInBolusWizard,
            11 => BgContext::EnteredInSensorCalib,
            12 => BgContext::EnteredAsBgMarker,
            other => BgContext::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClosedLoopTransition {
    OutOfActive,
    IntoActive,
    Other(u8),
}

impl From<u8> for ClosedLoopTransition {
    fn from(code: u8) -> Self {
        match code {
            0 => ClosedLoopTransition::OutOfActive,
            1 => ClosedLoopTransition::IntoActive,
            other => ClosedLoopTransition::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TempBasalType {
    InsulinUnits,
    Percentage,
}

impl From<u8> for TempBasalType {
    fn from(code: u8) -> Self {
        if code == 1 {
            TempBasalType::Percentage
        } else {
            TempBasalType::InsulinUnits
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BolusSource {
    Manual,
    BolusWizard,
    EasyBolus,
    PresetBolus,
    ClosedLoopMicroBolus,
    ClosedLoopBgCorrection,
    ClosedLoopFoodBolus,
    ClosedLoopBgCorrectionAndFoodBolus,
    Other(u8),
}

impl BolusSource {
    /// Sources whose delivery was computed by a wizard estimate
    pub fn is_wizard(self) -> bool {
        matches!(
            self,
            BolusSource::BolusWizard
                | BolusSource::ClosedLoopBgCorrection
                | BolusSource::ClosedLoopFoodBolus
                | BolusSource::ClosedLoopBgCorrectionAndFoodBolus
        )
    }
}

impl From<u8> for BolusSource {
    fn from(code: u8) -> Self {
        match code {
            0 => BolusSource::Manual,
            1 => BolusSource::BolusWizard,
            2 => BolusSource::EasyBolus,
            4 => BolusSource::PresetBolus,
            5 => BolusSource::ClosedLoopMicroBolus,
            6 => BolusSource::ClosedLoopBgCorrection,
            7 => BolusSource::ClosedLoopFoodBolus,
            8 => BolusSource::ClosedLoopBgCorrectionAndFoodBolus,
            other => BolusSource::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DualBolusPart {
    NormalBolus,
    SquareWave,
    Other(u8),
}

impl From<u8> for DualBolusPart {
    fn from(code: u8) -> Self {
        match code {
            1 => DualBolusPart::NormalBolus,
            2 => DualBolusPart::SquareWave,
            other => DualBolusPart::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrimeTarget {
    Tubing,
    Cannula,
}

impl From<u8> for PrimeTarget {
    fn from(code: u8) -> Self {
        if code == 0 {
            PrimeTarget::Tubing
        } else {
            PrimeTarget::Cannula
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendReason {
    Alarm,
    User,
    Auto,
    LowSg,
    SetChange,
    PredictedLowSg,
    Other(u8),
}

impl SuspendReason {
    /// User and set-change suspends are manual; the rest are automatic
    pub fn is_manual(self) -> bool {
        matches!(self, SuspendReason::User | SuspendReason::SetChange)
    }

    pub fn name(self) -> String {
        match self {
            SuspendReason::Alarm => "Alarm suspend".into(),
            SuspendReason::User => "User suspend".into(),
            SuspendReason::Auto => "Auto suspend".into(),
            SuspendReason::LowSg => "Low glucose suspend".into(),
            SuspendReason::SetChange => "Set change suspend".into(),
            SuspendReason::PredictedLowSg => "Predicted low glucose suspend".into(),
            SuspendReason::Other(code) => format!("Unknown suspend reason {}", code),
        }
    }
}

impl From<u8> for SuspendReason {
    fn from(code: u8) -> Self {
        match code {
            1 => SuspendReason::Alarm,
            2 => SuspendReason::User,
            3 => SuspendReason::Auto,
            4 => SuspendReason::LowSg,
            5 => SuspendReason::SetChange,
            10 => SuspendReason::PredictedLowSg,
            other => SuspendReason::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeReason {
    UserSelectsResume,
    UserClearsAlarm,
    LgmManualResume,
    LgmAutoResumeMaxSuspend,
    LgmAutoResumePresetSg,
    LgmManualResumeViaDisable,
    Other(u8),
}

impl ResumeReason {
    pub fn is_manual(self) -> bool {
        matches!(
            self,
            ResumeReason::UserSelectsResume | ResumeReason::UserClearsAlarm
        )
    }

    pub fn name(self) -> String {
        match self {
            ResumeReason::UserSelectsResume => "User resumed".into(),
            ResumeReason::UserClearsAlarm => "User cleared alarm".into(),
            ResumeReason::LgmManualResume => "Low glucose manual resume".into(),
            ResumeReason::LgmAutoResumeMaxSuspend => {
                "Low glucose auto resume - max suspend period".into()
            }
            ResumeReason::LgmAutoResumePresetSg => {
                "Low glucose auto resume - preset glucose reached".into()
            }
            ResumeReason::LgmManualResumeViaDisable => {
                "Low glucose manual resume via disable".into()
            }
            ResumeReason::Other(code) => format!("Unknown resume reason {}", code),
        }
    }
}

impl From<u8> for ResumeReason {
    fn from(code: u8) -> Self {
        match code {
            1 => ResumeReason::UserSelectsResume,
            2 => ResumeReason::UserClearsAlarm,
            3 => ResumeReason::LgmManualResume,
            4 => ResumeReason::LgmAutoResumeMaxSuspend,
            5 => ResumeReason::LgmAutoResumePresetSg,
            6 => ResumeReason::LgmManualResumeViaDisable,
            other => ResumeReason::Other(other),
        }
    }
}

const BASAL_PATTERN_NAMES: [&str; 8] = [
    "Pattern 1",
    "Pattern 2",
    "Pattern 3",
    "Pattern 4",
    "Pattern 5",
    "Workday",
    "Day Off",
    "Sick Day",
];

const TEMP_BASAL_PRESET_NAMES: [&str; 9] = [
    "Manual",
    "Temp 1",
    "Temp 2",
    "Temp 3",
    "Temp 4",
    "High Activity",
    "Moderate Activity",
    "Low Activity",
    "Sick",
];

/// Basal patterns are numbered from 1
pub fn basal_pattern_name(number: u8) -> String {
    number
        .checked_sub(1)
        .and_then(|i| BASAL_PATTERN_NAMES.get(i as usize))
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Pattern {}", number))
}

/// Temp basal presets are numbered from 0 ("Manual")
pub fn temp_basal_preset_name(number: u8) -> String {
    TEMP_BASAL_PRESET_NAMES
        .get(number as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Temp {}", number))
}
