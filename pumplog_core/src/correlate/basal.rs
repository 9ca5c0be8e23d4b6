//! Scheduled, automated and temporary basal delivery.

use super::Context;
use crate::codes::{basal_pattern_name, BolusSource, ClosedLoopTransition, TempBasalType};
use crate::event::{code, BasalSegmentStart, EventKind, HistoryEvent, TempBasal as TempBasalEvent};
use crate::fields::Insulin;
use crate::history::Scan;
use crate::types::{Annotation, AutomatedBasal, ScheduledBasal, SuppressedBasal, TempBasal};
use crate::{Error, Result};

const AUTO_BASAL_SCHEDULE: &str = "Auto-Basal";

/// Micro-boluses cover five minutes; twelve make an hourly rate
const MICROBOLUSES_PER_HOUR: u32 = 12;

fn segment(event: &HistoryEvent) -> Option<BasalSegmentStart> {
    match event.kind {
        EventKind::BasalSegmentStart(segment) => Some(segment),
        _ => None,
    }
}

fn is_microbolus(event: &HistoryEvent) -> bool {
    matches!(
        event.kind,
        EventKind::NormalBolusDelivered(ref b) if b.bolus.source == BolusSource::ClosedLoopMicroBolus
    )
}

fn suppressed(segment: &BasalSegmentStart) -> SuppressedBasal {
    SuppressedBasal {
        rate: segment.rate,
        schedule_name: basal_pattern_name(segment.pattern_number),
    }
}

/// Absolute rate and fractional percent of a temp basal over `schedule`
fn temp_rate(temp: &TempBasalEvent, schedule: &BasalSegmentStart) -> (Insulin, Option<f64>) {
    match temp.kind {
        TempBasalType::Percentage => (
            schedule.rate.percent_of(temp.percent),
            Some(temp.percent as f64 / 100.0),
        ),
        TempBasalType::InsulinUnits => (temp.rate, None),
    }
}

pub(crate) fn build_basal_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (_, event) in log.of_type(&[code::BASAL_SEGMENT_START]) {
        let Some(segment) = segment(event) else {
            continue;
        };
        ctx.emit(ScheduledBasal {
            time: ctx.time(event.timestamp)?,
            rate: segment.rate,
            schedule_name: basal_pattern_name(segment.pattern_number),
        });
    }

    // Closed loop starts with no delivery until the first micro-bolus or
    // scheduled segment
    for (i, event) in log.of_type(&[code::CLOSED_LOOP_TRANSITION]) {
        let EventKind::ClosedLoopTransition {
            transition: ClosedLoopTransition::IntoActive,
            ..
        } = event.kind
        else {
            continue;
        };

        let gap_ms = log
            .scan_forward(i, |e| is_microbolus(e) || e.code() == code::BASAL_SEGMENT_START)
            .and_then(|next| log.get(next))
            .map(|next| event.timestamp.elapsed_ms_until(&next.timestamp).max(0) as u64)
            .unwrap_or(0);

        ctx.emit(AutomatedBasal {
            time: ctx.time(event.timestamp)?,
            rate: Insulin::ZERO,
            schedule_name: AUTO_BASAL_SCHEDULE.into(),
            duration_ms: Some(gap_ms),
            microbolus_amount: None,
        });
    }

    for (_, event) in log.of_type(&[code::NORMAL_BOLUS_DELIVERED]) {
        let EventKind::NormalBolusDelivered(bolus) = event.kind else {
            continue;
        };
        if bolus.bolus.source != BolusSource::ClosedLoopMicroBolus {
            continue;
        }
        ctx.emit(AutomatedBasal {
            time: ctx.time(event.timestamp)?,
            rate: bolus.delivered.times(MICROBOLUSES_PER_HOUR),
            schedule_name: AUTO_BASAL_SCHEDULE.into(),
            duration_ms: None,
            microbolus_amount: Some(bolus.delivered),
        });
    }

    Ok(())
}

pub(crate) fn build_temp_basal_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::TEMP_BASAL_COMPLETE]) {
        let EventKind::TempBasalComplete { basal, canceled } = event.kind else {
            continue;
        };

        // The start never lies beyond the previous completion
        let programmed = log.scan_back(i, |e| match e.code() {
            code::TEMP_BASAL_PROGRAMMED => Scan::Match,
            code::TEMP_BASAL_COMPLETE => Scan::Stop,
            _ => Scan::Continue,
        });

        let Some(schedule_index) =
            log.scan_back(programmed.unwrap_or(i), |e| e.code() == code::BASAL_SEGMENT_START)
        else {
            ctx.violation(Error::MissingSuppressedBasal { index: i })?;
            continue;
        };
        let schedule_event = &log.events()[schedule_index];
        let Some(schedule) = segment(schedule_event) else {
            continue;
        };

        let mut annotations = Vec::new();
        let (start, expected_duration_ms) = match programmed.map(|p| &log.events()[p]) {
            Some(start) => {
                let expected = match start.kind {
                    EventKind::TempBasalProgrammed(p) => p.duration_ms,
                    _ => basal.duration_ms,
                };
                (start.timestamp, expected)
            }
            None => {
                tracing::debug!("No programmed event for temp basal ending at {}", event.counter());
                annotations.push(Annotation::new("basal/inferred-start"));
                let start = if canceled {
                    schedule_event.timestamp
                } else {
                    event.timestamp.earlier_by((basal.duration_ms / 1000) as u32)
                };
                (start, basal.duration_ms)
            }
        };

        // A canceled record still holds the programmed duration
        let duration_ms = if canceled {
            start.elapsed_ms_until(&event.timestamp).max(0) as u64
        } else {
            basal.duration_ms
        };

        let (rate, percent) = temp_rate(&basal, &schedule);

        ctx.emit(TempBasal {
            time: ctx.time(start)?,
            rate,
            percent,
            duration_ms,
            expected_duration_ms,
            suppressed: suppressed(&schedule),
            annotations,
        });

        restore_schedule(ctx, i, event)?;
    }

    trailing_temp_basal(ctx)
}

/// Scheduled delivery resumes when a temp basal ends, unless the pump
/// logged a new segment at that moment
fn restore_schedule(ctx: &mut Context<'_>, index: usize, complete: &HistoryEvent) -> Result<()> {
    let log = ctx.log;

    let segment_logged = log
        .of_type(&[code::BASAL_SEGMENT_START])
        .any(|(_, e)| e.counter() == complete.counter());
    if segment_logged {
        return Ok(());
    }

    let Some(schedule) = log
        .scan_back(index, |e| e.code() == code::BASAL_SEGMENT_START)
        .and_then(|s| segment(&log.events()[s]))
    else {
        return Ok(());
    };

    ctx.emit(ScheduledBasal {
        time: ctx.time(complete.timestamp)?,
        rate: schedule.rate,
        schedule_name: basal_pattern_name(schedule.pattern_number),
    });
    Ok(())
}

/// A temp basal still running when the history was read
fn trailing_temp_basal(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    let Some((i, event)) = log
        .of_type(&[code::TEMP_BASAL_PROGRAMMED, code::TEMP_BASAL_COMPLETE])
        .last()
    else {
        return Ok(());
    };
    let EventKind::TempBasalProgrammed(programmed) = event.kind else {
        return Ok(());
    };

    let Some(schedule) = log
        .scan_back(i, |e| e.code() == code::BASAL_SEGMENT_START)
        .and_then(|s| segment(&log.events()[s]))
    else {
        tracing::debug!("No basal schedule before running temp basal at event {}", i);
        return Ok(());
    };

    let (rate, percent) = temp_rate(&programmed, &schedule);

    ctx.emit(TempBasal {
        time: ctx.time(event.timestamp)?,
        rate,
        percent,
        duration_ms: programmed.duration_ms,
        expected_duration_ms: programmed.duration_ms,
        suppressed: suppressed(&schedule),
        annotations: vec![Annotation::new("basal/unknown-duration")],
    });
    Ok(())
}
