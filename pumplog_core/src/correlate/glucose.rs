//! Sensor glucose, fingerstick readings and sensor calibrations.

use super::Context;
use crate::codes::BgUnits;
use crate::event::{code, ClosedLoopBgReading, EventKind, HistoryEvent};
use crate::history::Scan;
use crate::types::{Annotation, Calibration, Cbg, Smbg, SmbgSource};
use crate::Result;
use std::collections::BTreeMap;

/// Sensor values from this code up are status codes, not glucose
const SG_STATUS_FIRST: u16 = 769;
const SG_HIGH: u16 = 776;
const SG_LOW: u16 = 777;

/// Follow-up context records arrive within 15 minutes of the first reading
const CONTEXT_WINDOW_SECONDS: u32 = 900;

fn closed_loop_reading(event: &HistoryEvent) -> Option<ClosedLoopBgReading> {
    match event.kind {
        EventKind::ClosedLoopBgReading(reading) => Some(reading),
        _ => None,
    }
}

fn smbg_source(linked: bool) -> SmbgSource {
    if linked {
        SmbgSource::Linked
    } else {
        SmbgSource::Manual
    }
}

pub(crate) fn build_cgm_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (_, event) in log.of_type(&[code::SENSOR_GLUCOSE_READINGS_EXTENDED]) {
        let Some(readings) = event.sensor_readings() else {
            continue;
        };

        for reading in readings {
            let (value, annotations) = match reading.sg {
                SG_HIGH => (401, vec![Annotation::out_of_range("high", 400)]),
                SG_LOW => (39, vec![Annotation::out_of_range("low", 40)]),
                sg if sg < SG_STATUS_FIRST => (sg, Vec::new()),
                _ => continue,
            };

            ctx.emit(Cbg {
                time: ctx.time(reading.timestamp)?,
                value,
                units: BgUnits::MgDl,
                interstitial_signal: reading.isig,
                annotations,
            });
        }
    }

    Ok(())
}

/// Same-value closed-loop readings that follow the first reading at `index`
fn matching_contexts(ctx: &Context<'_>, index: usize, first: &HistoryEvent, value: u16) -> Vec<usize> {
    let log = ctx.log;
    let limit = first.counter().saturating_add(CONTEXT_WINDOW_SECONDS);
    let mut matches = Vec::new();

    for i in index + 1..log.len() {
        let event = &log.events()[i];
        if event.counter() >= limit {
            break;
        }
        if let Some(reading) = closed_loop_reading(event) {
            if reading.is_first_reading() {
                break;
            }
            if reading.value == value {
                matches.push(i);
            }
        }
    }

    matches
}

pub(crate) fn build_bg_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (_, event) in log.of_type(&[code::BG_READING]) {
        let EventKind::BgReading(bg) = &event.kind else {
            continue;
        };
        ctx.emit(Smbg {
            time: ctx.time(event.timestamp)?,
            value: bg.value,
            units: BgUnits::MgDl,
            sub_type: smbg_source(bg.is_linked()),
            meter_serial: bg.is_linked().then(|| bg.meter_serial.clone()),
            bg_contexts: BTreeMap::new(),
            annotations: Vec::new(),
        });
    }

    // One record per group of closed-loop readings; the first reading
    // carries the value, the rest only context
    for (i, event) in log.of_type(&[code::CLOSED_LOOP_BG_READING]) {
        let Some(reading) = closed_loop_reading(event) else {
            continue;
        };
        if !reading.is_first_reading() {
            continue;
        }

        let mut bg_contexts = BTreeMap::new();
        let mut annotations = Vec::new();
        let group = matching_contexts(ctx, i, event, reading.value)
            .into_iter()
            .chain(std::iter::once(i));
        for member in group {
            let member_event = &log.events()[member];
            let Some(context) = closed_loop_reading(member_event).map(|r| r.context) else {
                continue;
            };
            let slug = context.slug();
            if !context.is_signal_integrity() {
                annotations.push(Annotation::new(format!("medtronic600/smbg/{}", slug)));
            }
            bg_contexts.insert(slug, member_event.timestamp.device_time()?);
        }

        ctx.emit(Smbg {
            time: ctx.time(event.timestamp)?,
            value: reading.value,
            units: BgUnits::MgDl,
            sub_type: smbg_source(reading.is_linked()),
            meter_serial: None,
            bg_contexts,
            annotations,
        });
    }

    Ok(())
}

/// Calibrations are stamped with the fingerstick they used
pub(crate) fn build_calibration_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::CALIBRATION_COMPLETE]) {
        let EventKind::CalibrationComplete { bg_value, .. } = event.kind else {
            continue;
        };

        let smbg = log.scan_back(i, |e| {
            let matched = match &e.kind {
                EventKind::BgReading(bg) => bg.value == bg_value,
                EventKind::ClosedLoopBgReading(r) => r.is_first_reading() && r.value == bg_value,
                _ => false,
            };
            Scan::from(matched)
        });
        let Some(smbg) = smbg.and_then(|s| log.get(s)) else {
            tracing::debug!("No fingerstick of {} for calibration at event {}", bg_value, i);
            continue;
        };

        ctx.emit(Calibration {
            time: ctx.time(smbg.timestamp)?,
            value: bg_value,
            units: BgUnits::MgDl,
        });
    }

    Ok(())
}
