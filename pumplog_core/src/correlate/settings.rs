//! Settings snapshots rebuilt backwards from the pump's current settings.
//!
//! The history holds settings changes only. Walking them newest first, each
//! `New*` table or single change is emitted as the snapshot in force from
//! that moment; `Old*` tables and the old half of single changes then roll
//! the working copy back to what preceded it.

use super::Context;
use crate::codes::{basal_pattern_name, BgUnits};
use crate::event::{code, BolusOption, EventKind, HistoryEvent, Revision};
use crate::settings::{mmol_to_mgdl, CurrentSettings, PumpSettings, AUTO_MODE_SCHEDULE};
use crate::types::PumpSettingsRecord;
use crate::Result;

/// Settings change codes walked by this pass
const SETTINGS_CODES: &[u8] = &[
    code::OLD_BOLUS_WIZARD_BG_TARGETS,
    code::OLD_BOLUS_WIZARD_INSULIN_SENSITIVITY,
    code::OLD_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS,
    code::OLD_BASAL_PATTERN,
    code::NEW_BOLUS_WIZARD_BG_TARGETS,
    code::NEW_BOLUS_WIZARD_INSULIN_SENSITIVITY,
    code::NEW_BOLUS_WIZARD_INSULIN_TO_CARB_RATIOS,
    code::NEW_BASAL_PATTERN,
    code::BASAL_PATTERN_SELECTED,
    code::MAX_BASAL_RATE_CHANGE,
    code::MAX_BOLUS_CHANGE,
    code::DUAL_BOLUS_OPTION_CHANGE,
    code::BOLUS_WIZARD_SETTINGS_CHANGE,
];

fn to_mgdl(value: f64, units: BgUnits) -> f64 {
    match units {
        BgUnits::MmolL => mmol_to_mgdl(value),
        BgUnits::MgDl => value,
    }
}

/// Apply the state an event leaves behind; true when a snapshot is due
fn apply_new(settings: &mut PumpSettings, event: &HistoryEvent) -> bool {
    match &event.kind {
        EventKind::BgTargets {
            revision,
            units,
            segments,
        } => {
            settings.bg_target = segments
                .iter()
                .map(|s| {
                    let mut segment = *s;
                    segment.low = to_mgdl(s.low, *units);
                    segment.high = to_mgdl(s.high, *units);
                    segment
                })
                .collect();
            *revision == Revision::New
        }
        EventKind::InsulinSensitivity {
            revision,
            units,
            segments,
        } => {
            settings.insulin_sensitivity = segments
                .iter()
                .map(|s| {
                    let mut segment = *s;
                    segment.amount = to_mgdl(s.amount, *units);
                    segment
                })
                .collect();
            *revision == Revision::New
        }
        EventKind::CarbRatios {
            revision,
            units,
            segments,
        } => {
            settings.units.carb = *units;
            settings.carb_ratio = segments.clone();
            *revision == Revision::New
        }
        EventKind::BasalPattern {
            revision,
            pattern_number,
            segments,
        } => {
            let name = basal_pattern_name(*pattern_number);
            if segments.is_empty() {
                settings.basal_schedules.remove(&name);
            } else {
                settings.basal_schedules.insert(name, segments.clone());
            }
            *revision == Revision::New
        }
        EventKind::BasalPatternSelected { new_pattern, .. } => {
            settings.active_schedule = basal_pattern_name(*new_pattern);
            true
        }
        EventKind::MaxBasalRateChange { new, .. } => {
            settings.basal_rate_maximum = *new;
            true
        }
        EventKind::MaxBolusChange { new, .. } => {
            settings.bolus.amount_maximum = *new;
            true
        }
        EventKind::BolusOptionChange {
            option: BolusOption::Dual,
            new,
            ..
        } => {
            settings.bolus.extended_enabled = *new != 0;
            true
        }
        EventKind::BolusWizardSettingsChange(change) => {
            settings.bolus.insulin_action_minutes = change.new_insulin_action_minutes as i64;
            settings.bolus.calculator_enabled = change.new_enabled;
            true
        }
        _ => false,
    }
}

/// Roll back the old half of a single-event change
fn apply_old(settings: &mut PumpSettings, event: &HistoryEvent) {
    match &event.kind {
        EventKind::BasalPatternSelected { old_pattern, .. } => {
            settings.active_schedule = basal_pattern_name(*old_pattern);
        }
        EventKind::MaxBasalRateChange { old, .. } => settings.basal_rate_maximum = *old,
        EventKind::MaxBolusChange { old, .. } => settings.bolus.amount_maximum = *old,
        EventKind::BolusOptionChange {
            option: BolusOption::Dual,
            old,
            ..
        } => settings.bolus.extended_enabled = *old != 0,
        EventKind::BolusWizardSettingsChange(change) => {
            settings.bolus.insulin_action_minutes = change.old_insulin_action_minutes as i64;
            settings.bolus.calculator_enabled = change.old_enabled;
        }
        _ => {}
    }
}

pub(crate) fn build_settings_records(ctx: &mut Context<'_>, current: &CurrentSettings) -> Result<()> {
    let log = ctx.log;
    let mut settings = current.settings.clone();

    if log.last().is_some_and(HistoryEvent::is_closed_loop_active) {
        settings
            .basal_schedules
            .insert(AUTO_MODE_SCHEDULE.to_string(), Vec::new());
        settings.active_schedule = AUTO_MODE_SCHEDULE.to_string();
    }

    let current_record = PumpSettingsRecord {
        time: ctx.time(current.timestamp)?,
        settings: settings.clone(),
    };

    let changes: Vec<_> = log.of_type(SETTINGS_CODES).collect();
    let mut snapshots = 0;
    for (_, event) in changes.into_iter().rev() {
        if apply_new(&mut settings, event) {
            ctx.emit(PumpSettingsRecord {
                time: ctx.time(event.timestamp)?,
                settings: settings.clone(),
            });
            snapshots += 1;
        }
        apply_old(&mut settings, event);
    }

    tracing::debug!("Rebuilt {} settings snapshots", snapshots);
    ctx.emit(current_record);
    Ok(())
}
