//! Typed history events.
//!
//! Every record shares an 11-byte header:
//!
//! ```text
//! 0x00  type code
//! 0x01  bit 7: closed loop active, bits 0-6: source
//! 0x02  record size
//! 0x03  u32 RTC counter
//! 0x07  u32 wall-clock offset
//! ```
//!
//! The type code selects a fixed field layout for the rest of the record.
//! Codes without a layout decode to `EventKind::Opaque` so that firmware
//! adding new record types does not break the parse.

use crate::codes::{
    BgContext, BgOrigin, BgSource, BgUnits, BolusSource, CarbUnits, ClosedLoopTransition,
    DualBolusPart, PrimeTarget, ResumeReason, SuspendReason, TempBasalType,
};
use crate::fields::{bg_value, reversed_serial, sign_extend, Fields, Insulin, MIN_TO_MSEC};
use crate::settings::{RateSegment, TargetSegment, TimedValue};
use crate::slicer::RawRecord;
use crate::timestamp::DeviceTimestamp;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Header length shared by every record
pub const HEADER_LEN: usize = 11;

/// Type codes of history records
pub mod code {
    pub const TIME_RESET: u8 = 0x02;
    pub const USER_TIME_DATE_CHANGE: u8 = 0x03;
    pub const SOURCE_ID_CONFIGURATION: u8 = 0x04;
    pub const NETWORK_DEVICE_CONNECTION: u8 = 0x05;
    pub const AIRPLANE_MODE: u8 = 0x06;
    pub const START_OF_DAY_MARKER: u8 = 0x07;
    pub const END_OF_DAY_MARKER: u8 = 0x08;
    pub const PLGM_CONTROLLER_STATE: u8 = 0x0B;
    pub const CLOSED_LOOP_STATUS_DATA: u8 = 0x0C;
    pub const CLOSED_LOOP_PERIODIC_DATA: u8 = 0x0D;
    pub const CLOSED_LOOP_DAILY_DATA: u8 = 0x0E;
    pub const NORMAL_BOLUS_PROGRAMMED: u8 = 0x15;
    pub const SQUARE_BOLUS_PROGRAMMED: u8 = 0x16;
    pub const DUAL_BOLUS_PROGRAMMED: u8 = 0x17;
    pub const CANNULA_FILL_DELIVERED: u8 = 0x1A;
    pub const TEMP_BASAL_PROGRAMMED: u8 = 0x1B;
    pub const BASAL_PATTERN_SELECTED: u8 = 0x1C;
    pub const BASAL_SEGMENT_START: u8 = 0x1D;
    pub const INSULIN_DELIVERY_STOPPED: u8 = 0x1E;
    pub const INSULIN_DELIVERY_RESTARTED: u8 = 0x1F;
    pub const SELF_TEST_REQUESTED: u8 = 0x20;
    pub const SELF_TEST_RESULTS: u8 = 0x21;
    pub const TEMP_BASAL_COMPLETE: u8 = 0x22;
    pub const BOLUS_SUSPENDED: u8 = 0x24;
    pub const SUSPENDED_BOLUS_RESUMED: u8 = 0x25;
    pub const SUSPENDED_BOLUS_CANCELED: u8 = 0x26;
    pub const BOLUS_CANCELED: u8 = 0x27;
    pub const ALARM_NOTIFICATION: u8 = 0x28;
    pub const ALARM_CLEARED: u8 = 0x2A;
    pub const LOW_RESERVOIR: u8 = 0x2B;
    pub const BATTERY_INSERTED: u8 = 0x2C;
    pub const FOOD_EVENT_MARKER: u8 = 0x2E;
    pub const EXERCISE_EVENT_MARKER: u8 = 0x2F;
    pub const INJECTION_EVENT_MARKER: u8 = 0x30;
    pub const OTHER_EVENT_MARKER: u8 = 0x31;
    pub const BG_READING: u8 = 0x32;
    pub const CODE_UPDATE: u8 = 0x33;
    pub const MISSED_MEAL_BOLUS_REMINDER_EXPIRED: u8 = 0x34;
    pub const REWIND: u8 = 0x36;
    pub const BATTERY_REMOVED: u8 = 0x37;
    pub const CALIBRATION_COMPLETE: u8 = 0x38;
    pub const ACTIVE_INSULIN_CLEARED: u8 = 0x39;
    pub const DAILY_TOTALS: u8 = 0x3C;
    pub const BOLUS_WIZARD_ESTIMATE: u8 = 0x3D;
    pub const MEAL_WIZARD_ESTIMATE: u8 = 0x3E;
    pub const CLOSED_LOOP_DAILY_TOTALS: u8 = 0x3F;
    pub const USER_SETTINGS_SAVE: u8 = 0x50;
    pub const USER_SETTINGS_RESET_TO_DEFAULTS: u8 = 0x51;
    pub const OLD_BASAL_PATTERN: u8 = 0x52;
    pub const NEW_BASAL_PATTERN: u8 = 0x53;
    pub const OLD_PRESET_TEMP_BASAL: u8 = 0x54;
    pub const NEW_PRESET_TEMP_BASAL: u8 = 0x55;
    pub const OLD_PRESET_BOLUS: u8 = 0x56;
    pub const NEW_PRESET_BOLUS: u8 = 0x57;
    pub const MAX_BASAL_RATE_CHANGE: u8 = 0x58;
    pub const MAX_BOLUS_CHANGE: u8 = 0x59;
    pub const PERSONAL_REMINDER_CHANGE: u8 = 0x5A;
    pub const MISSED_MEAL_BOLUS_REMINDER_CHANGE: u8 = 0x5B;
    pub const BOLUS_INCREMENT_CHANGE: u8 = 0x5C;
    pub const BOLUS_WIZARD_SETTINGS_CHANGE: u8 = 0x5D;
    pub const OLD_BOLUS_WIZARD_INSULIN_SENSITIVITY: u8 = 0x5E;
    pub const NEW_BOLUS_WIZARD_INSULIN_SENSITIVITY: u8 = 0x5F;
    pub const OLD_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS: u8 = 0x60;
    pub const NEW_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS: u8 = 0x61;
    pub const OLD_BOLUS_WIZARD_BG_TARGETS: u8 = 0x62;
    pub const NEW_BOLUS_WIZARD_BG_TARGETS: u8 = 0x63;
    pub const DUAL_BOLUS_OPTION_CHANGE: u8 = 0x64;
    pub const SQUARE_BOLUS_OPTION_CHANGE: u8 = 0x65;
    pub const EASY_BOLUS_OPTION_CHANGE: u8 = 0x66;
    pub const BG_REMINDER_OPTION_CHANGE: u8 = 0x68;
    pub const BG_REMINDER_TIME: u8 = 0x69;
    pub const AUDIO_VIBRATE_MODE_CHANGE: u8 = 0x6A;
    pub const TIME_FORMAT_CHANGE: u8 = 0x6B;
    pub const LOW_RESERVOIR_WARNING_CHANGE: u8 = 0x6C;
    pub const LANGUAGE_CHANGE: u8 = 0x6D;
    pub const STARTUP_WIZARD_START_END: u8 = 0x6E;
    pub const REMOTE_BOLUS_OPTION_CHANGE: u8 = 0x6F;
    pub const AUTO_SUSPEND_CHANGE: u8 = 0x72;
    pub const BOLUS_DELIVERY_RATE_CHANGE: u8 = 0x73;
    pub const DISPLAY_OPTION_CHANGE: u8 = 0x77;
    pub const SET_CHANGE_REMINDER_CHANGE: u8 = 0x78;
    pub const BLOCK_MODE_CHANGE: u8 = 0x79;
    pub const BOLUS_WIZARD_SETTINGS_SUMMARY: u8 = 0x7B;
    pub const CLOSED_LOOP_BG_READING: u8 = 0x82;
    pub const CLOSED_LOOP_OPTION_CHANGE: u8 = 0x86;
    pub const CLOSED_LOOP_SETTINGS_CHANGED: u8 = 0x87;
    pub const CLOSED_LOOP_TEMP_TARGET_STARTED: u8 = 0x88;
    pub const CLOSED_LOOP_TEMP_TARGET_ENDED: u8 = 0x89;
    pub const CLOSED_LOOP_ALARM_AUTO_CLEARED: u8 = 0x8A;
    pub const SENSOR_SETTINGS_CHANGE: u8 = 0xC8;
    pub const OLD_SENSOR_WARNING_LEVELS: u8 = 0xC9;
    pub const NEW_SENSOR_WARNING_LEVELS: u8 = 0xCA;
    pub const GENERAL_SENSOR_SETTINGS_CHANGE: u8 = 0xCB;
    pub const SENSOR_GLUCOSE_READINGS: u8 = 0xCC;
    pub const SENSOR_GLUCOSE_GAP: u8 = 0xCD;
    pub const GLUCOSE_SENSOR_CHANGE: u8 = 0xCE;
    pub const SENSOR_CALIBRATION_REJECTED: u8 = 0xCF;
    pub const SENSOR_ALERT_SILENCE_STARTED: u8 = 0xD0;
    pub const SENSOR_ALERT_SILENCE_ENDED: u8 = 0xD1;
    pub const OLD_LOW_SENSOR_WARNING_LEVELS: u8 = 0xD2;
    pub const NEW_LOW_SENSOR_WARNING_LEVELS: u8 = 0xD3;
    pub const OLD_HIGH_SENSOR_WARNING_LEVELS: u8 = 0xD4;
    pub const NEW_HIGH_SENSOR_WARNING_LEVELS: u8 = 0xD5;
    pub const SENSOR_GLUCOSE_READINGS_EXTENDED: u8 = 0xD6;
    pub const NORMAL_BOLUS_DELIVERED: u8 = 0xDC;
    pub const SQUARE_BOLUS_DELIVERED: u8 = 0xDD;
    pub const DUAL_BOLUS_PART_DELIVERED: u8 = 0xDE;
    pub const CLOSED_LOOP_TRANSITION: u8 = 0xDF;

    /// Distance between a *_BOLUS_PROGRAMMED code and its *_DELIVERED code
    pub const PROGRAMMED_DELIVERED_GAP: u8 = 199;
}

/// Name and minimum length of one record type
#[derive(Debug)]
pub struct EventLayout {
    pub code: u8,
    pub name: &'static str,
    pub min_len: usize,
}

macro_rules! layouts {
    ($($code:ident => $len:expr),* $(,)?) => {
        &[$(EventLayout { code: code::$code, name: stringify!($code), min_len: $len }),*]
    };
}

/// Every type code the pump is known to log
static EVENT_LAYOUTS: &[EventLayout] = layouts![
    TIME_RESET => 0x13,
    USER_TIME_DATE_CHANGE => 0x13,
    SOURCE_ID_CONFIGURATION => HEADER_LEN,
    NETWORK_DEVICE_CONNECTION => HEADER_LEN,
    AIRPLANE_MODE => HEADER_LEN,
    START_OF_DAY_MARKER => HEADER_LEN,
    END_OF_DAY_MARKER => HEADER_LEN,
    PLGM_CONTROLLER_STATE => HEADER_LEN,
    CLOSED_LOOP_STATUS_DATA => HEADER_LEN,
    CLOSED_LOOP_PERIODIC_DATA => HEADER_LEN,
    CLOSED_LOOP_DAILY_DATA => HEADER_LEN,
    NORMAL_BOLUS_PROGRAMMED => 0x0E,
    SQUARE_BOLUS_PROGRAMMED => 0x0E,
    DUAL_BOLUS_PROGRAMMED => 0x0E,
    CANNULA_FILL_DELIVERED => 0x14,
    TEMP_BASAL_PROGRAMMED => 0x14,
    BASAL_PATTERN_SELECTED => 0x0D,
    BASAL_SEGMENT_START => 0x11,
    INSULIN_DELIVERY_STOPPED => 0x0C,
    INSULIN_DELIVERY_RESTARTED => 0x0C,
    SELF_TEST_REQUESTED => HEADER_LEN,
    SELF_TEST_RESULTS => HEADER_LEN,
    TEMP_BASAL_COMPLETE => 0x15,
    BOLUS_SUSPENDED => HEADER_LEN,
    SUSPENDED_BOLUS_RESUMED => HEADER_LEN,
    SUSPENDED_BOLUS_CANCELED => HEADER_LEN,
    BOLUS_CANCELED => HEADER_LEN,
    ALARM_NOTIFICATION => 0x1C,
    ALARM_CLEARED => HEADER_LEN,
    LOW_RESERVOIR => 0x12,
    BATTERY_INSERTED => HEADER_LEN,
    FOOD_EVENT_MARKER => HEADER_LEN,
    EXERCISE_EVENT_MARKER => HEADER_LEN,
    INJECTION_EVENT_MARKER => HEADER_LEN,
    OTHER_EVENT_MARKER => HEADER_LEN,
    BG_READING => 0x0F,
    CODE_UPDATE => HEADER_LEN,
    MISSED_MEAL_BOLUS_REMINDER_EXPIRED => HEADER_LEN,
    REWIND => HEADER_LEN,
    BATTERY_REMOVED => HEADER_LEN,
    CALIBRATION_COMPLETE => 0x0F,
    ACTIVE_INSULIN_CLEARED => HEADER_LEN,
    DAILY_TOTALS => HEADER_LEN,
    BOLUS_WIZARD_ESTIMATE => 0x35,
    MEAL_WIZARD_ESTIMATE => 0x30,
    CLOSED_LOOP_DAILY_TOTALS => HEADER_LEN,
    USER_SETTINGS_SAVE => HEADER_LEN,
    USER_SETTINGS_RESET_TO_DEFAULTS => HEADER_LEN,
    OLD_BASAL_PATTERN => 0x0D,
    NEW_BASAL_PATTERN => 0x0D,
    OLD_PRESET_TEMP_BASAL => HEADER_LEN,
    NEW_PRESET_TEMP_BASAL => HEADER_LEN,
    OLD_PRESET_BOLUS => HEADER_LEN,
    NEW_PRESET_BOLUS => HEADER_LEN,
    MAX_BASAL_RATE_CHANGE => 0x13,
    MAX_BOLUS_CHANGE => 0x13,
    PERSONAL_REMINDER_CHANGE => HEADER_LEN,
    MISSED_MEAL_BOLUS_REMINDER_CHANGE => HEADER_LEN,
    BOLUS_INCREMENT_CHANGE => HEADER_LEN,
    BOLUS_WIZARD_SETTINGS_CHANGE => 0x13,
    OLD_BOLUS_WIZARD_INSULIN_SENSITIVITY => 0x0D,
    NEW_BOLUS_WIZARD_INSULIN_SENSITIVITY => 0x0D,
    OLD_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS => 0x0D,
    NEW_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS => 0x0D,
    OLD_BOLUS_WIZARD_BG_TARGETS => 0x0D,
    NEW_BOLUS_WIZARD_BG_TARGETS => 0x0D,
    DUAL_BOLUS_OPTION_CHANGE => 0x0D,
    SQUARE_BOLUS_OPTION_CHANGE => 0x0D,
    EASY_BOLUS_OPTION_CHANGE => HEADER_LEN,
    BG_REMINDER_OPTION_CHANGE => HEADER_LEN,
    BG_REMINDER_TIME => HEADER_LEN,
    AUDIO_VIBRATE_MODE_CHANGE => HEADER_LEN,
    TIME_FORMAT_CHANGE => HEADER_LEN,
    LOW_RESERVOIR_WARNING_CHANGE => HEADER_LEN,
    LANGUAGE_CHANGE => HEADER_LEN,
    STARTUP_WIZARD_START_END => HEADER_LEN,
    REMOTE_BOLUS_OPTION_CHANGE => HEADER_LEN,
    AUTO_SUSPEND_CHANGE => HEADER_LEN,
    BOLUS_DELIVERY_RATE_CHANGE => HEADER_LEN,
    DISPLAY_OPTION_CHANGE => HEADER_LEN,
    SET_CHANGE_REMINDER_CHANGE => HEADER_LEN,
    BLOCK_MODE_CHANGE => HEADER_LEN,
    BOLUS_WIZARD_SETTINGS_SUMMARY => HEADER_LEN,
    CLOSED_LOOP_BG_READING => 0x17,
    CLOSED_LOOP_OPTION_CHANGE => HEADER_LEN,
    CLOSED_LOOP_SETTINGS_CHANGED => HEADER_LEN,
    CLOSED_LOOP_TEMP_TARGET_STARTED => HEADER_LEN,
    CLOSED_LOOP_TEMP_TARGET_ENDED => HEADER_LEN,
    CLOSED_LOOP_ALARM_AUTO_CLEARED => HEADER_LEN,
    SENSOR_SETTINGS_CHANGE => HEADER_LEN,
    OLD_SENSOR_WARNING_LEVELS => HEADER_LEN,
    NEW_SENSOR_WARNING_LEVELS => HEADER_LEN,
    GENERAL_SENSOR_SETTINGS_CHANGE => HEADER_LEN,
    SENSOR_GLUCOSE_READINGS => HEADER_LEN,
    SENSOR_GLUCOSE_GAP => HEADER_LEN,
    GLUCOSE_SENSOR_CHANGE => HEADER_LEN,
    SENSOR_CALIBRATION_REJECTED => HEADER_LEN,
    SENSOR_ALERT_SILENCE_STARTED => HEADER_LEN,
    SENSOR_ALERT_SILENCE_ENDED => HEADER_LEN,
    OLD_LOW_SENSOR_WARNING_LEVELS => HEADER_LEN,
    NEW_LOW_SENSOR_WARNING_LEVELS => HEADER_LEN,
    OLD_HIGH_SENSOR_WARNING_LEVELS => HEADER_LEN,
    NEW_HIGH_SENSOR_WARNING_LEVELS => HEADER_LEN,
    SENSOR_GLUCOSE_READINGS_EXTENDED => SENSOR_READINGS_OFFSET,
    NORMAL_BOLUS_DELIVERED => 0x1A,
    SQUARE_BOLUS_DELIVERED => 0x1A,
    DUAL_BOLUS_PART_DELIVERED => 0x23,
    CLOSED_LOOP_TRANSITION => 0x0D,
];

static LAYOUT_INDEX: Lazy<HashMap<u8, &'static EventLayout>> =
    Lazy::new(|| EVENT_LAYOUTS.iter().map(|l| (l.code, l)).collect());

/// Layout for a type code, if the code is known
pub fn layout(code: u8) -> Option<&'static EventLayout> {
    LAYOUT_INDEX.get(&code).copied()
}

// ============================================================================
// Field groups
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BolusHeader {
    pub source: BolusSource,
    pub number: u8,
    pub preset: u8,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalBolusDelivered {
    pub bolus: BolusHeader,
    pub programmed: Insulin,
    pub delivered: Insulin,
    pub iob: Insulin,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareBolusDelivered {
    pub bolus: BolusHeader,
    pub programmed: Insulin,
    pub delivered: Insulin,
    pub programmed_duration_s: u32,
    pub delivered_duration_s: u32,
}

/// One of the two hardware records of a dual (normal + square) bolus
///
/// `delivered` is the normal portion when `part` is `NormalBolus` and the
/// square portion when it is `SquareWave`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualBolusPartDelivered {
    pub bolus: BolusHeader,
    pub normal_programmed: Insulin,
    pub square_programmed: Insulin,
    pub delivered: Insulin,
    pub part: DualBolusPart,
    pub programmed_duration_s: u32,
    pub delivered_duration_s: u32,
    pub iob: Insulin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardKind {
    Bolus,
    Meal,
}

/// Bolus calculator result, from either the bolus or the meal wizard
#[derive(Clone, Debug, PartialEq)]
pub struct WizardEstimate {
    pub kind: WizardKind,
    pub bg_units: BgUnits,
    pub carb_units: CarbUnits,
    pub step_size: u8,
    pub bg_input: f64,
    pub carb_input: f64,
    pub carb_ratio: f64,
    /// Bolus wizard only
    pub isf: Option<f64>,
    /// Bolus wizard only, (low, high)
    pub bg_target: Option<(f64, f64)>,
    pub correction_estimate: Insulin,
    pub food_estimate: Insulin,
    /// Bolus wizard only
    pub iob: Option<Insulin>,
    pub iob_adjustment: Option<Insulin>,
    pub wizard_estimate: Insulin,
    pub final_estimate: Insulin,
    pub estimate_modified_by_user: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TempBasal {
    pub preset: u8,
    pub kind: TempBasalType,
    /// Zero for percentage temp basals
    pub rate: Insulin,
    pub percent: u8,
    pub duration_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BasalSegmentStart {
    pub pattern_number: u8,
    pub segment_number: u8,
    pub rate: Insulin,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorGlucoseReadings {
    pub minutes_between: u8,
    pub count: u8,
    pub predicted_sg: u16,
}

/// One periodic sensor sample packed inside a SENSOR_GLUCOSE_READINGS_EXTENDED record
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub timestamp: DeviceTimestamp,
    pub sg: u16,
    pub predicted_sg: u16,
    pub isig: f64,
    pub vctr: f64,
    pub rate_of_change: f64,
    pub backfilled: bool,
    pub settings_changed: bool,
    pub noisy: bool,
    pub discard: bool,
    pub sensor_error: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BgReading {
    /// Always mg/dL regardless of `units`
    pub value: u16,
    /// Units the pump displays
    pub units: BgUnits,
    pub calibration: bool,
    pub source: BgSource,
    pub meter_serial: String,
}

impl BgReading {
    pub fn is_linked(&self) -> bool {
        !self.meter_serial.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosedLoopBgReading {
    /// Always mg/dL regardless of `units`
    pub value: u16,
    pub units: BgUnits,
    pub origin: BgOrigin,
    pub context: BgContext,
}

impl ClosedLoopBgReading {
    pub fn is_linked(&self) -> bool {
        self.origin == BgOrigin::ReceivedFromRf
    }

    /// The reading that starts a group of same-value context records
    pub fn is_first_reading(&self) -> bool {
        match self.origin {
            BgOrigin::ReceivedFromRf => self.context == BgContext::BgReadingReceived,
            BgOrigin::ManuallyEntered => self.context.code() >= BgContext::FIRST_ENTERED,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LowReservoir {
    pub warning_type: u8,
    pub hours_remaining: u8,
    pub minutes_remaining: u8,
    pub units_remaining: Insulin,
}

impl LowReservoir {
    pub fn ms_remaining(&self) -> u64 {
        (self.hours_remaining as u64 * 60 + self.minutes_remaining as u64) * MIN_TO_MSEC
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlarmNotification {
    pub fault_number: u16,
    pub notification_mode: u8,
    pub extra_data: bool,
    pub alarm_history: bool,
    pub alarm_data: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Revision {
    Old,
    New,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BolusOption {
    Dual,
    Square,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BolusWizardSettingsChange {
    pub old_enabled: bool,
    pub new_enabled: bool,
    pub old_carb_units: CarbUnits,
    pub new_carb_units: CarbUnits,
    pub old_insulin_action_minutes: i16,
    pub new_insulin_action_minutes: i16,
}

// ============================================================================
// Events
// ============================================================================

/// Decoded payload of a history record
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    TimeChange {
        new_timestamp: DeviceTimestamp,
        reset: bool,
    },
    AlarmNotification(AlarmNotification),
    LowReservoir(LowReservoir),
    SensorGlucoseReadings(SensorGlucoseReadings),
    CalibrationComplete {
        bg_value: u16,
        cal_factor: f64,
    },
    BgReading(BgReading),
    ClosedLoopBgReading(ClosedLoopBgReading),
    ClosedLoopTransition {
        transition: ClosedLoopTransition,
        reason: u8,
    },
    BasalSegmentStart(BasalSegmentStart),
    TempBasalProgrammed(TempBasal),
    TempBasalComplete {
        basal: TempBasal,
        canceled: bool,
    },
    Rewind,
    CannulaFill {
        target: PrimeTarget,
        amount: Insulin,
        reservoir_remaining: Insulin,
    },
    BolusProgrammed(BolusHeader),
    NormalBolusDelivered(NormalBolusDelivered),
    SquareBolusDelivered(SquareBolusDelivered),
    DualBolusPartDelivered(DualBolusPartDelivered),
    WizardEstimate(WizardEstimate),
    InsulinDeliveryStopped(SuspendReason),
    InsulinDeliveryRestarted(ResumeReason),
    InsulinSensitivity {
        revision: Revision,
        units: BgUnits,
        segments: Vec<TimedValue>,
    },
    CarbRatios {
        revision: Revision,
        units: CarbUnits,
        segments: Vec<TimedValue>,
    },
    BgTargets {
        revision: Revision,
        units: BgUnits,
        segments: Vec<TargetSegment>,
    },
    BasalPattern {
        revision: Revision,
        pattern_number: u8,
        segments: Vec<RateSegment>,
    },
    BasalPatternSelected {
        old_pattern: u8,
        new_pattern: u8,
    },
    MaxBasalRateChange {
        old: f64,
        new: f64,
    },
    MaxBolusChange {
        old: f64,
        new: f64,
    },
    BolusOptionChange {
        option: BolusOption,
        old: u8,
        new: u8,
    },
    BolusWizardSettingsChange(BolusWizardSettingsChange),
    /// A type code without a specialised layout
    Opaque,
}

/// One decoded record, owning its bytes
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEvent {
    pub raw: RawRecord,
    pub timestamp: DeviceTimestamp,
    pub kind: EventKind,
}

/// Schedule segments start on half-hour boundaries
const SEGMENT_STEP_MS: u64 = 30 * MIN_TO_MSEC;

/// First packed sensor reading
const SENSOR_READINGS_OFFSET: usize = 15;

/// Width of one packed sensor reading
const SENSOR_READING_STRIDE: usize = 9;

/// First segment of a settings table
const SEGMENTS_OFFSET: usize = 13;

impl HistoryEvent {
    /// Decode a sliced record into its typed form
    pub fn decode(raw: RawRecord) -> Result<Self> {
        let fields = Fields::new(&raw.bytes);
        let code = raw.type_code;

        let required = layout(code).map(|l| l.min_len).unwrap_or(HEADER_LEN);
        if raw.bytes.len() < required {
            return Err(Error::TruncatedEvent {
                code,
                len: raw.bytes.len(),
                required,
            });
        }

        let timestamp = DeviceTimestamp::read(&fields, 0x03)?;
        let kind = decode_kind(code, &fields)?;

        Ok(Self {
            raw,
            timestamp,
            kind,
        })
    }

    pub fn code(&self) -> u8 {
        self.raw.type_code
    }

    /// Table name of the type code, `UNKNOWN` for unmapped codes
    pub fn name(&self) -> &'static str {
        layout(self.code()).map(|l| l.name).unwrap_or("UNKNOWN")
    }

    pub fn counter(&self) -> u32 {
        self.timestamp.counter
    }

    pub fn source(&self) -> u8 {
        self.raw.bytes[1] & 0x7f
    }

    pub fn is_closed_loop_active(&self) -> bool {
        self.raw.bytes[1] & 0x80 != 0
    }

    /// Packed sensor samples, newest first
    pub fn sensor_readings(&self) -> Option<SensorReadings<'_>> {
        match self.kind {
            EventKind::SensorGlucoseReadings(header) => Some(SensorReadings {
                fields: Fields::new(&self.raw.bytes),
                header,
                parent: self.timestamp,
                next: 0,
            }),
            _ => None,
        }
    }
}

/// Iterator over the packed readings of one sensor record
pub struct SensorReadings<'a> {
    fields: Fields<'a>,
    header: SensorGlucoseReadings,
    parent: DeviceTimestamp,
    next: usize,
}

impl SensorReadings<'_> {
    fn read(&self, i: usize) -> Result<SensorReading> {
        let f = &self.fields;
        let pos = SENSOR_READINGS_OFFSET + i * SENSOR_READING_STRIDE;
        let lead = f.u8(pos)?;

        let sg = (((lead & 3) as u16) << 8) | f.u8(pos + 1)? as u16;
        let raw_vctr = ((((lead >> 2) & 3) as u32) << 8) | f.u8(pos + 4)? as u32;
        let sensor_status = f.u8(pos + 7)?;
        let reading_status = f.u8(pos + 8)?;
        let interval = i as u32 * self.header.minutes_between as u32 * 60;

        Ok(SensorReading {
            timestamp: self.parent.earlier_by(interval),
            sg,
            predicted_sg: self.header.predicted_sg,
            isig: f.i16(pos + 2)? as f64 / 100.0,
            vctr: sign_extend(raw_vctr, 10) as f64 / 100.0,
            rate_of_change: f.i16(pos + 5)? as f64 / 100.0,
            backfilled: reading_status & 1 == 1,
            // Bit 1; comparing the masked value against 1 could never match
            settings_changed: reading_status & 2 == 2,
            noisy: sensor_status == 1,
            discard: sensor_status == 2,
            sensor_error: sensor_status == 3,
        })
    }
}

impl Iterator for SensorReadings<'_> {
    type Item = SensorReading;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.header.count as usize {
            return None;
        }
        let reading = self.read(self.next).ok()?;
        self.next += 1;
        Some(reading)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.header.count as usize).saturating_sub(self.next);
        (left, Some(left))
    }
}

/// Fails with `TruncatedEvent` unless `count` repeats of `stride` fit from `offset`
fn require_repeats(f: &Fields<'_>, code: u8, offset: usize, count: usize, stride: usize) -> Result<()> {
    let required = offset + count * stride;
    if f.len() < required {
        return Err(Error::TruncatedEvent {
            code,
            len: f.len(),
            required,
        });
    }
    Ok(())
}

fn revision(code: u8, old: u8) -> Revision {
    if code == old {
        Revision::Old
    } else {
        Revision::New
    }
}

fn bolus_header(f: &Fields<'_>) -> Result<BolusHeader> {
    Ok(BolusHeader {
        source: BolusSource::from(f.u8(0x0B)?),
        number: f.u8(0x0C)?,
        preset: f.u8(0x0D)?,
    })
}

fn temp_basal(f: &Fields<'_>, duration_ms: u64) -> Result<TempBasal> {
    Ok(TempBasal {
        preset: f.u8(0x0B)?,
        kind: TempBasalType::from(f.u8(0x0C)?),
        rate: f.insulin(0x0D)?,
        percent: f.u8(0x11)?,
        duration_ms,
    })
}

fn carb_ratio(raw: f64, units: CarbUnits) -> f64 {
    match units {
        CarbUnits::Grams => raw / 10.0,
        CarbUnits::Exchanges => raw / 1000.0,
    }
}

fn carb_input(raw: f64, units: CarbUnits) -> f64 {
    match units {
        CarbUnits::Grams => raw,
        CarbUnits::Exchanges => raw / 10.0,
    }
}

fn bolus_wizard_estimate(f: &Fields<'_>) -> Result<WizardEstimate> {
    let bg_units = BgUnits::from_code(f.u8(0x0B)?);
    let carb_units = CarbUnits::from_code(f.u8(0x0C)?);

    // Each byte is shifted by 8 and OR'd, not 24/16/8: the device's own
    // assembly, kept as is.
    let correction = ((f.u8(0x1B)? as u32) << 8)
        | ((f.u8(0x1C)? as u32) << 8)
        | ((f.u8(0x1D)? as u32) << 8)
        | f.u8(0x1E)? as u32;

    Ok(WizardEstimate {
        kind: WizardKind::Bolus,
        bg_units,
        carb_units,
        step_size: f.u8(0x2F)?,
        bg_input: bg_value(f.u16(0x0D)? as f64, bg_units),
        carb_input: carb_input(f.u16(0x0F)? as f64, carb_units),
        carb_ratio: carb_ratio(f.u32(0x13)? as f64, carb_units),
        isf: Some(bg_value(f.u16(0x11)? as f64, bg_units)),
        bg_target: Some((
            bg_value(f.u16(0x17)? as f64, bg_units),
            bg_value(f.u16(0x19)? as f64, bg_units),
        )),
        correction_estimate: Insulin(correction),
        food_estimate: f.insulin(0x1F)?,
        iob: Some(f.insulin(0x23)?),
        iob_adjustment: Some(f.insulin(0x27)?),
        wizard_estimate: f.insulin(0x2B)?,
        final_estimate: f.insulin(0x31)?,
        estimate_modified_by_user: f.u32(0x30)? & 1 == 1,
    })
}

fn meal_wizard_estimate(f: &Fields<'_>) -> Result<WizardEstimate> {
    let flags = f.u8(0x0B)?;
    let bg_units = BgUnits::from_code(flags & 1);
    let carb_units = CarbUnits::from_code(flags & 2);
    let wizard_estimate = f.insulin(0x18)?;

    Ok(WizardEstimate {
        kind: WizardKind::Meal,
        bg_units,
        carb_units,
        step_size: f.u8(0x2F)?,
        bg_input: bg_value(f.u16(0x0C)? as f64, bg_units),
        carb_input: carb_input(f.u16(0x0E)? as f64, carb_units),
        carb_ratio: carb_ratio(f.u32(0x1C)? as f64, carb_units),
        isf: None,
        bg_target: None,
        correction_estimate: f.insulin(0x10)?,
        food_estimate: f.insulin(0x14)?,
        iob: None,
        iob_adjustment: None,
        wizard_estimate,
        // The meal wizard's estimate cannot be edited before delivery
        final_estimate: wizard_estimate,
        estimate_modified_by_user: false,
    })
}

fn decode_kind(code: u8, f: &Fields<'_>) -> Result<EventKind> {
    let kind = match code {
        code::TIME_RESET | code::USER_TIME_DATE_CHANGE => EventKind::TimeChange {
            new_timestamp: DeviceTimestamp::read(f, 0x0B)?,
            reset: code == code::TIME_RESET,
        },
        code::ALARM_NOTIFICATION => EventKind::AlarmNotification(AlarmNotification {
            fault_number: f.u16(0x0B)?,
            notification_mode: f.u8(0x11)?,
            extra_data: f.u8(0x12)? & 2 != 0,
            alarm_history: f.u8(0x12)? & 4 != 0,
            alarm_data: hex::encode(f.bytes(0x13, 9)?),
        }),
        code::LOW_RESERVOIR => EventKind::LowReservoir(LowReservoir {
            warning_type: f.u8(0x0B)?,
            hours_remaining: f.u8(0x0C)?,
            minutes_remaining: f.u8(0x0D)?,
            units_remaining: f.insulin(0x0E)?,
        }),
        code::SENSOR_GLUCOSE_READINGS_EXTENDED => {
            let header = SensorGlucoseReadings {
                minutes_between: f.u8(0x0B)?,
                count: f.u8(0x0C)?,
                predicted_sg: f.u16(0x0D)?,
            };
            require_repeats(
                f,
                code,
                SENSOR_READINGS_OFFSET,
                header.count as usize,
                SENSOR_READING_STRIDE,
            )?;
            EventKind::SensorGlucoseReadings(header)
        }
        code::CALIBRATION_COMPLETE => EventKind::CalibrationComplete {
            bg_value: f.u16(0x0D)?,
            cal_factor: f.u16(0x0B)? as f64 / 100.0,
        },
        code::BG_READING => {
            let flags = f.u8(0x0B)?;
            EventKind::BgReading(BgReading {
                value: f.u16(0x0C)?,
                // Bit set means mg/dL here, the opposite of the closed-loop reading
                units: if flags & 1 != 0 {
                    BgUnits::MgDl
                } else {
                    BgUnits::MmolL
                },
                calibration: flags & 2 == 2,
                source: BgSource::from(f.u8(0x0E)?),
                meter_serial: reversed_serial(f.tail(0x0F)),
            })
        }
        code::CLOSED_LOOP_BG_READING => {
            let flags = f.u8(0x16)?;
            EventKind::ClosedLoopBgReading(ClosedLoopBgReading {
                value: f.u16(0x0B)?,
                units: if flags & 1 != 0 {
                    BgUnits::MmolL
                } else {
                    BgUnits::MgDl
                },
                origin: if flags & 2 != 0 {
                    BgOrigin::ReceivedFromRf
                } else {
                    BgOrigin::ManuallyEntered
                },
                context: BgContext::from((flags & 0xf8) >> 3),
            })
        }
        code::CLOSED_LOOP_TRANSITION => EventKind::ClosedLoopTransition {
            transition: ClosedLoopTransition::from(f.u8(0x0B)?),
            reason: f.u8(0x0C)?,
        },
        code::BASAL_SEGMENT_START => EventKind::BasalSegmentStart(BasalSegmentStart {
            pattern_number: f.u8(0x0B)?,
            segment_number: f.u8(0x0C)?,
            rate: f.insulin(0x0D)?,
        }),
        code::TEMP_BASAL_PROGRAMMED => {
            EventKind::TempBasalProgrammed(temp_basal(f, f.minutes_ms(0x12)?)?)
        }
        code::TEMP_BASAL_COMPLETE => {
            // Older firmware writes a shorter record with the duration at 0x12
            let duration_ms = if f.len() < 23 {
                f.minutes_ms(0x12)?
            } else {
                f.minutes_ms(0x15)?
            };
            EventKind::TempBasalComplete {
                basal: temp_basal(f, duration_ms)?,
                canceled: f.u8(0x14)? & 1 == 1,
            }
        }
        code::REWIND => EventKind::Rewind,
        code::CANNULA_FILL_DELIVERED => EventKind::CannulaFill {
            target: PrimeTarget::from(f.u8(0x0B)?),
            amount: f.insulin(0x0C)?,
            reservoir_remaining: f.insulin(0x10)?,
        },
        code::NORMAL_BOLUS_PROGRAMMED
        | code::SQUARE_BOLUS_PROGRAMMED
        | code::DUAL_BOLUS_PROGRAMMED => EventKind::BolusProgrammed(bolus_header(f)?),
        code::NORMAL_BOLUS_DELIVERED => EventKind::NormalBolusDelivered(NormalBolusDelivered {
            bolus: bolus_header(f)?,
            programmed: f.insulin(0x0E)?,
            delivered: f.insulin(0x12)?,
            iob: f.insulin(0x16)?,
        }),
        code::SQUARE_BOLUS_DELIVERED => EventKind::SquareBolusDelivered(SquareBolusDelivered {
            bolus: bolus_header(f)?,
            programmed: f.insulin(0x0E)?,
            delivered: f.insulin(0x12)?,
            programmed_duration_s: f.u16(0x16)? as u32 * 60,
            delivered_duration_s: f.u16(0x18)? as u32 * 60,
        }),
        code::DUAL_BOLUS_PART_DELIVERED => {
            EventKind::DualBolusPartDelivered(DualBolusPartDelivered {
                bolus: bolus_header(f)?,
                normal_programmed: f.insulin(0x0E)?,
                square_programmed: f.insulin(0x12)?,
                delivered: f.insulin(0x16)?,
                part: DualBolusPart::from(f.u8(0x1A)?),
                programmed_duration_s: f.u16(0x1B)? as u32 * 60,
                delivered_duration_s: f.u16(0x1D)? as u32 * 60,
                iob: f.insulin(0x1F)?,
            })
        }
        code::BOLUS_WIZARD_ESTIMATE => EventKind::WizardEstimate(bolus_wizard_estimate(f)?),
        code::MEAL_WIZARD_ESTIMATE => EventKind::WizardEstimate(meal_wizard_estimate(f)?),
        code::INSULIN_DELIVERY_STOPPED => {
            EventKind::InsulinDeliveryStopped(SuspendReason::from(f.u8(0x0B)?))
        }
        code::INSULIN_DELIVERY_RESTARTED => {
            EventKind::InsulinDeliveryRestarted(ResumeReason::from(f.u8(0x0B)?))
        }
        code::OLD_BOLUS_WIZARD_INSULIN_SENSITIVITY
        | code::NEW_BOLUS_WIZARD_INSULIN_SENSITIVITY => {
            let units = BgUnits::from_code(f.u8(0x0B)?);
            let count = f.u8(0x0C)? as usize;
            require_repeats(f, code, SEGMENTS_OFFSET, count, 3)?;
            let segments = (0..count)
                .map(|i| {
                    let pos = SEGMENTS_OFFSET + i * 3;
                    Ok(TimedValue {
                        start_ms: f.u8(pos)? as u64 * SEGMENT_STEP_MS,
                        amount: bg_value(f.i16(pos + 1)? as f64, units),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            EventKind::InsulinSensitivity {
                revision: revision(code, code::OLD_BOLUS_WIZARD_INSULIN_SENSITIVITY),
                units,
                segments,
            }
        }
        code::OLD_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS
        | code::NEW_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS => {
            let units = CarbUnits::from_code(f.u8(0x0B)?);
            let count = f.u8(0x0C)? as usize;
            require_repeats(f, code, SEGMENTS_OFFSET, count, 5)?;
            let segments = (0..count)
                .map(|i| {
                    let pos = SEGMENTS_OFFSET + i * 5;
                    Ok(TimedValue {
                        start_ms: f.u8(pos)? as u64 * SEGMENT_STEP_MS,
                        amount: carb_ratio(f.i32(pos + 1)? as f64, units),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            EventKind::CarbRatios {
                revision: revision(code, code::OLD_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS),
                units,
                segments,
            }
        }
        code::OLD_BOLUS_WIZARD_BG_TARGETS | code::NEW_BOLUS_WIZARD_BG_TARGETS => {
            let units = BgUnits::from_code(f.u8(0x0B)?);
            let count = f.u8(0x0C)? as usize;
            require_repeats(f, code, SEGMENTS_OFFSET, count, 5)?;
            let segments = (0..count)
                .map(|i| {
                    let pos = SEGMENTS_OFFSET + i * 5;
                    Ok(TargetSegment {
                        start_ms: f.u8(pos)? as u64 * SEGMENT_STEP_MS,
                        high: bg_value(f.i16(pos + 1)? as f64, units),
                        low: bg_value(f.i16(pos + 3)? as f64, units),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            EventKind::BgTargets {
                revision: revision(code, code::OLD_BOLUS_WIZARD_BG_TARGETS),
                units,
                segments,
            }
        }
        code::OLD_BASAL_PATTERN | code::NEW_BASAL_PATTERN => {
            let pattern_number = f.u8(0x0B)?;
            let count = f.u8(0x0C)? as usize;
            require_repeats(f, code, SEGMENTS_OFFSET, count, 5)?;
            let segments = (0..count)
                .map(|i| {
                    let pos = SEGMENTS_OFFSET + i * 5;
                    Ok(RateSegment {
                        rate: f.insulin(pos)?,
                        start_ms: f.u8(pos + 4)? as u64 * SEGMENT_STEP_MS,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            EventKind::BasalPattern {
                revision: revision(code, code::OLD_BASAL_PATTERN),
                pattern_number,
                segments,
            }
        }
        code::BASAL_PATTERN_SELECTED => EventKind::BasalPatternSelected {
            old_pattern: f.u8(0x0B)?,
            new_pattern: f.u8(0x0C)?,
        },
        code::MAX_BASAL_RATE_CHANGE => EventKind::MaxBasalRateChange {
            old: f.i32(0x0B)? as f64 / 10_000.0,
            new: f.i32(0x0F)? as f64 / 10_000.0,
        },
        code::MAX_BOLUS_CHANGE => EventKind::MaxBolusChange {
            old: f.i32(0x0B)? as f64 / 10_000.0,
            new: f.i32(0x0F)? as f64 / 10_000.0,
        },
        code::DUAL_BOLUS_OPTION_CHANGE | code::SQUARE_BOLUS_OPTION_CHANGE => {
            EventKind::BolusOptionChange {
                option: if code == code::DUAL_BOLUS_OPTION_CHANGE {
                    BolusOption::Dual
                } else {
                    BolusOption::Square
                },
                old: f.u8(0x0B)?,
                new: f.u8(0x0C)?,
            }
        }
        code::BOLUS_WIZARD_SETTINGS_CHANGE => {
            // "Enabled" is the literal value 1, not a bit in a flags byte
            EventKind::BolusWizardSettingsChange(BolusWizardSettingsChange {
                old_enabled: f.u8(0x0B)? == 1,
                new_enabled: f.u8(0x0F)? == 1,
                old_carb_units: CarbUnits::from_code(f.u8(0x0C)?),
                new_carb_units: CarbUnits::from_code(f.u8(0x10)?),
                old_insulin_action_minutes: f.i16(0x0D)?,
                new_insulin_action_minutes: f.i16(0x11)?,
            })
        }
        _ => EventKind::Opaque,
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slicer::slice_page;

    fn decode_hex(data: &str) -> HistoryEvent {
        let page = hex::decode(data).unwrap();
        let mut records = slice_page(&page).unwrap();
        assert_eq!(records.len(), 1);
        HistoryEvent::decode(records.remove(0)).unwrap()
    }

    #[test]
    fn test_layout_table_has_unique_codes() {
        assert_eq!(LAYOUT_INDEX.len(), EVENT_LAYOUTS.len());
        assert_eq!(layout(0xDC).unwrap().name, "NORMAL_BOLUS_DELIVERED");
        assert!(layout(0xFF).is_none());
    }

    #[test]
    fn test_normal_bolus_delivered() {
        let event = decode_hex("dc001a822dff189e029f8e01aa0000014dfc00014dfc000032c8");
        assert_eq!(event.name(), "NORMAL_BOLUS_DELIVERED");
        match event.kind {
            EventKind::NormalBolusDelivered(b) => {
                assert_eq!(b.bolus.source, BolusSource::BolusWizard);
                assert_eq!(b.bolus.number, 0xaa);
                assert_eq!(b.programmed.units(), 8.55);
                assert_eq!(b.delivered.units(), 8.55);
                assert_eq!(b.iob.units(), 1.3);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_bolus_wizard_estimate_mmol() {
        let event = decode_hex(
            "3d0035822dfdd69e029f8e01000000003c002300000046003200370000000000014dfc000032c80000000000014dfc000000014dfc",
        );
        let EventKind::WizardEstimate(w) = event.kind else {
            panic!("not a wizard estimate");
        };
        assert_eq!(w.kind, WizardKind::Bolus);
        assert_eq!(w.bg_units, BgUnits::MmolL);
        assert_eq!(w.carb_units, CarbUnits::Grams);
        assert_eq!(w.bg_input, 0.0);
        assert_eq!(w.carb_input, 60.0);
        assert_eq!(w.isf, Some(3.5));
        assert_eq!(w.carb_ratio, 7.0);
        assert_eq!(w.bg_target, Some((5.0, 5.5)));
        assert_eq!(w.correction_estimate, Insulin::ZERO);
        assert_eq!(w.food_estimate.units(), 8.55);
        assert_eq!(w.iob.unwrap().units(), 1.3);
        assert_eq!(w.final_estimate.units(), 8.55);
    }

    #[test]
    fn test_basal_segment_start() {
        let event = decode_hex("1d001181963895a101dbab020200001482");
        let EventKind::BasalSegmentStart(segment) = event.kind else {
            panic!("not a basal segment");
        };
        assert_eq!(segment.pattern_number, 2);
        assert_eq!(segment.rate.units(), 0.525);
    }

    #[test]
    fn test_temp_basal_programmed_percent() {
        let event = decode_hex("1b00148196614ca101dbab000100000000c800f0");
        let EventKind::TempBasalProgrammed(temp) = event.kind else {
            panic!("not a temp basal");
        };
        assert_eq!(temp.kind, TempBasalType::Percentage);
        assert_eq!(temp.percent, 200);
        assert_eq!(temp.rate, Insulin::ZERO);
        assert_eq!(temp.duration_ms, 14_400_000);
    }

    #[test]
    fn test_suspend_and_resume_reasons() {
        let stopped = decode_hex("1e000c81ee52f6a092886601");
        assert_eq!(
            stopped.kind,
            EventKind::InsulinDeliveryStopped(SuspendReason::Alarm)
        );
        let restarted = decode_hex("1f000c81ee56b5a092886602");
        assert_eq!(
            restarted.kind,
            EventKind::InsulinDeliveryRestarted(ResumeReason::UserClearsAlarm)
        );
    }

    #[test]
    fn test_unknown_code_is_opaque() {
        let event = decode_hex("f1000d81ee52f6a0928866abcd");
        assert_eq!(event.kind, EventKind::Opaque);
        assert_eq!(event.name(), "UNKNOWN");
        assert_eq!(event.counter(), 0x81ee52f6);
        assert_eq!(event.raw.bytes.len(), 13);
    }

    #[test]
    fn test_short_known_record_is_truncated() {
        let raw = RawRecord {
            type_code: code::NORMAL_BOLUS_DELIVERED,
            declared_size: 12,
            bytes: hex::decode("dc000c822dff189e029f8e01").unwrap(),
        };
        assert!(matches!(
            HistoryEvent::decode(raw),
            Err(Error::TruncatedEvent {
                code: 0xdc,
                len: 12,
                required: 0x1a
            })
        ));
    }

    #[test]
    fn test_sensor_readings_newest_first() {
        // Two readings five minutes apart: 120 mg/dL then 0x301 (769, dropped later)
        let mut bytes = hex::decode("d6002181ee52f6a0928866").unwrap();
        bytes.extend([0x05, 0x02, 0x00, 0x7b]);
        bytes.extend([0x00, 0x78, 0x0b, 0xb8, 0x10, 0xff, 0xf6, 0x00, 0x01]);
        bytes.extend([0x03, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00]);
        bytes[2] = bytes.len() as u8;
        let raw = RawRecord {
            type_code: bytes[0],
            declared_size: bytes[2],
            bytes,
        };

        let event = HistoryEvent::decode(raw).unwrap();
        let readings: Vec<_> = event.sensor_readings().unwrap().collect();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].sg, 120);
        assert_eq!(readings[0].predicted_sg, 123);
        assert_eq!(readings[0].isig, 30.0);
        assert_eq!(readings[0].vctr, 0.16);
        assert_eq!(readings[0].rate_of_change, -0.1);
        assert!(readings[0].backfilled);
        assert_eq!(readings[0].timestamp.counter, 0x81ee52f6);
        assert_eq!(readings[1].sg, 769);
        assert!(readings[1].discard);
        assert_eq!(readings[1].timestamp.counter, 0x81ee52f6 - 300);
    }

    #[test]
    fn test_sensor_reading_status_bits() {
        let mut bytes = hex::decode("d6002181ee52f6a0928866").unwrap();
        bytes.extend([0x05, 0x02, 0x00, 0x7b]);
        bytes.extend([0x00, 0x78, 0x0b, 0xb8, 0x10, 0xff, 0xf6, 0x00, 0x02]);
        bytes.extend([0x00, 0x79, 0x0b, 0xb8, 0x10, 0xff, 0xf6, 0x00, 0x03]);
        bytes[2] = bytes.len() as u8;
        let raw = RawRecord {
            type_code: bytes[0],
            declared_size: bytes[2],
            bytes,
        };

        let event = HistoryEvent::decode(raw).unwrap();
        let readings: Vec<_> = event.sensor_readings().unwrap().collect();
        assert!(readings[0].settings_changed);
        assert!(!readings[0].backfilled);
        assert!(readings[1].settings_changed);
        assert!(readings[1].backfilled);
    }

    #[test]
    fn test_sensor_count_past_end_is_truncated() {
        let mut bytes = hex::decode("d6000f81ee52f6a0928866").unwrap();
        bytes.extend([0x05, 0x03, 0x00, 0x7b]);
        let raw = RawRecord {
            type_code: bytes[0],
            declared_size: bytes[2],
            bytes,
        };
        assert!(matches!(
            HistoryEvent::decode(raw),
            Err(Error::TruncatedEvent { required: 42, .. })
        ));
    }

    #[test]
    fn test_bg_reading_serial_and_units() {
        let mut bytes = hex::decode("32000081ee52f6a0928866").unwrap();
        bytes.extend([0x01, 0x00, 0x96, 0x01]);
        bytes.extend(b"  4321CBA");
        bytes[2] = bytes.len() as u8;
        let raw = RawRecord {
            type_code: bytes[0],
            declared_size: bytes[2],
            bytes,
        };
        let EventKind::BgReading(bg) = HistoryEvent::decode(raw).unwrap().kind else {
            panic!("not a bg reading");
        };
        assert_eq!(bg.value, 150);
        assert_eq!(bg.units, BgUnits::MgDl);
        assert!(!bg.calibration);
        assert_eq!(bg.source, BgSource::ExternalMeter);
        assert_eq!(bg.meter_serial, "ABC1234");
        assert!(bg.is_linked());
    }

    #[test]
    fn test_wizard_settings_enabled_is_literal_one() {
        let mut bytes = hex::decode("5d001381ee52f6a0928866").unwrap();
        // old: flags byte 3 (bit 0 set, but not == 1), new: 1
        bytes.extend([0x03, 0x00, 0x00, 0xb4, 0x01, 0x01, 0x00, 0xf0]);
        let raw = RawRecord {
            type_code: bytes[0],
            declared_size: bytes[2],
            bytes,
        };
        let EventKind::BolusWizardSettingsChange(change) =
            HistoryEvent::decode(raw).unwrap().kind
        else {
            panic!("not a wizard settings change");
        };
        assert!(!change.old_enabled);
        assert!(change.new_enabled);
        assert_eq!(change.old_insulin_action_minutes, 180);
        assert_eq!(change.new_carb_units, CarbUnits::Exchanges);
        assert_eq!(change.new_insulin_action_minutes, 240);
    }

    #[test]
    fn test_closed_loop_first_reading() {
        let rf = ClosedLoopBgReading {
            value: 100,
            units: BgUnits::MgDl,
            origin: BgOrigin::ReceivedFromRf,
            context: BgContext::BgReadingReceived,
        };
        assert!(rf.is_first_reading());
        let accepted = ClosedLoopBgReading {
            context: BgContext::UserAcceptedRemoteBg,
            ..rf
        };
        assert!(!accepted.is_first_reading());
        let manual = ClosedLoopBgReading {
            origin: BgOrigin::ManuallyEntered,
            context: BgContext::EnteredInBolusWizard,
            ..rf
        };
        assert!(manual.is_first_reading());
    }
}
