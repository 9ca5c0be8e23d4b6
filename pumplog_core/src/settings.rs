//! Pump therapy settings.
//!
//! The history only records settings *changes*, so a snapshot of the pump's
//! current settings is needed to rebuild earlier ones.

use crate::codes::{BgUnits, CarbUnits};
use crate::fields::Insulin;
use crate::timestamp::DeviceTimestamp;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Schedule name used while the pump runs in closed loop
pub const AUTO_MODE_SCHEDULE: &str = "Auto Mode";

/// Segment of a sensitivity or carb ratio schedule
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    /// Milliseconds after midnight
    pub start_ms: u64,
    pub amount: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetSegment {
    pub start_ms: u64,
    pub low: f64,
    pub high: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateSegment {
    pub start_ms: u64,
    pub rate: Insulin,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUnits {
    pub bg: BgUnits,
    pub carb: CarbUnits,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BolusSettings {
    pub calculator_enabled: bool,
    /// Duration of insulin action, minutes
    pub insulin_action_minutes: i64,
    pub extended_enabled: bool,
    /// Units
    pub amount_maximum: f64,
}

impl Default for BolusSettings {
    fn default() -> Self {
        Self {
            calculator_enabled: true,
            insulin_action_minutes: 240,
            extended_enabled: false,
            amount_maximum: 10.0,
        }
    }
}

/// One complete settings state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpSettings {
    pub model: String,
    pub serial_number: String,
    pub units: SettingsUnits,
    pub display_bg_units: BgUnits,
    pub carb_ratio: Vec<TimedValue>,
    /// Always mg/dL
    pub insulin_sensitivity: Vec<TimedValue>,
    /// Always mg/dL
    pub bg_target: Vec<TargetSegment>,
    pub basal_schedules: BTreeMap<String, Vec<RateSegment>>,
    pub active_schedule: String,
    pub bolus: BolusSettings,
    /// Units per hour
    pub basal_rate_maximum: f64,
}

/// Settings read from the pump when the history was captured
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentSettings {
    /// Pump clock when the settings were read
    pub timestamp: DeviceTimestamp,
    #[serde(flatten)]
    pub settings: PumpSettings,
}

impl CurrentSettings {
    /// Read a JSON settings file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let settings: CurrentSettings = serde_json::from_str(&contents)?;
        tracing::info!("Loaded pump settings from {:?}", path);
        Ok(settings)
    }
}

/// mmol/L settings values are reported in mg/dL, to two decimals
pub fn mmol_to_mgdl(value: f64) -> f64 {
    (value * crate::codes::MMOL_TO_MGDL * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmol_conversion_two_decimals() {
        assert_eq!(mmol_to_mgdl(5.5), 99.09);
        assert_eq!(mmol_to_mgdl(3.5), 63.05);
    }

    #[test]
    fn test_current_settings_from_partial_json() {
        let json = r#"{
            "timestamp": { "counter": 2179879670, "offset": -1601009562 },
            "model": "MMT-1780",
            "active_schedule": "Pattern 1",
            "basal_schedules": {
                "Pattern 1": [{ "start_ms": 0, "rate": 0.85 }]
            }
        }"#;
        let current: CurrentSettings = serde_json::from_str(json).unwrap();
        assert_eq!(current.timestamp.counter, 2_179_879_670);
        assert_eq!(current.settings.model, "MMT-1780");
        assert_eq!(
            current.settings.basal_schedules["Pattern 1"][0].rate,
            Insulin(8_500)
        );
        assert_eq!(current.settings.bolus.insulin_action_minutes, 240);
        assert!(current.settings.carb_ratio.is_empty());
    }
}
