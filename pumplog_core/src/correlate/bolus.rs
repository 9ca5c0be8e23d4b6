//! Boluses and the wizard estimates behind them.
//!
//! The pump logs a bolus twice: once when it is programmed and once when
//! delivery finishes. Records are stamped with the programmed time and
//! carry the delivered amounts.

use super::Context;
use crate::codes::{BolusSource, DualBolusPart};
use crate::event::{code, EventKind, HistoryEvent, WizardEstimate, WizardKind};
use crate::fields::Insulin;
use crate::history::HistoryLog;
use crate::timestamp::DeviceTimestamp;
use crate::types::{
    Annotation, BgTarget, BolusRecord, DualBolus, NormalBolus, SquareBolus, Wizard,
    WizardRecommendation,
};
use crate::{Error, Result};
use std::collections::HashSet;

/// The longest a bolus can take to deliver, in seconds
const MAX_BOLUS_SECONDS: u32 = 8 * 60 * 60;

/// Time the bolus delivered at `index` was programmed
fn begin_timestamp(log: &HistoryLog, index: usize, number: u8) -> Option<DeviceTimestamp> {
    let delivered = log.get(index)?;
    let programmed_code = delivered.code() - code::PROGRAMMED_DELIVERED_GAP;
    let earliest = delivered.counter().saturating_sub(MAX_BOLUS_SECONDS);

    log.scan_back(index, |e| {
        e.code() == programmed_code
            && e.counter() > earliest
            && matches!(e.kind, EventKind::BolusProgrammed(header) if header.number == number)
    })
    .and_then(|i| log.get(i))
    .map(|e| e.timestamp)
}

fn estimate(event: &HistoryEvent) -> Option<&WizardEstimate> {
    match &event.kind {
        EventKind::WizardEstimate(estimate) => Some(estimate),
        _ => None,
    }
}

/// Pairs wizard-sourced boluses with the estimate that produced them
#[derive(Debug, Default)]
pub(crate) struct WizardMatcher {
    consumed: HashSet<usize>,
}

impl WizardMatcher {
    /// Nearest unused estimate before `index` whose final amount is `target`
    fn take(&mut self, log: &HistoryLog, index: usize, target: Insulin) -> Option<usize> {
        let found = (0..index.min(log.len())).rev().find(|i| {
            !self.consumed.contains(i)
                && estimate(&log.events()[*i]).is_some_and(|w| w.final_estimate == target)
        })?;
        self.consumed.insert(found);
        Some(found)
    }

    fn is_consumed(&self, index: usize) -> bool {
        self.consumed.contains(&index)
    }

    /// Emit `bolus` wrapped in its wizard record when one matches
    fn emit(
        &mut self,
        ctx: &mut Context<'_>,
        index: usize,
        source: BolusSource,
        target: Insulin,
        bolus: BolusRecord,
    ) -> Result<()> {
        let log = ctx.log;
        if source.is_wizard() {
            if let Some(found) = self.take(log, index, target) {
                let record = wizard_record(ctx, &log.events()[found], bolus)?;
                ctx.emit(record);
                return Ok(());
            }
            tracing::debug!("No wizard estimate of {} for bolus at event {}", target, index);
        }
        ctx.emit(bolus);
        Ok(())
    }
}

fn wizard_record(ctx: &Context<'_>, event: &HistoryEvent, bolus: BolusRecord) -> Result<Wizard> {
    let Some(w) = estimate(event) else {
        return Err(Error::Other(format!("event {} is not a wizard estimate", event.name())));
    };

    let (bg_target, annotations) = match (w.kind, w.bg_target) {
        (WizardKind::Meal, _) => (None, vec![Annotation::new("wizard/target-automated")]),
        (WizardKind::Bolus, target) => (
            target.map(|(low, high)| BgTarget { low, high }),
            Vec::new(),
        ),
    };

    Ok(Wizard {
        time: ctx.time(event.timestamp)?,
        units: w.bg_units,
        carb_units: w.carb_units,
        recommended: WizardRecommendation {
            carb: w.food_estimate,
            correction: w.correction_estimate,
            net: w.wizard_estimate,
        },
        carb_input: w.carb_input,
        bg_input: (w.bg_input > 0.0).then_some(w.bg_input),
        insulin_on_board: w.iob,
        insulin_carb_ratio: w.carb_ratio,
        insulin_sensitivity: w.isf,
        bg_target,
        bolus,
        annotations,
    })
}

fn differs<T: PartialEq + Copy>(expected: T, actual: T) -> Option<T> {
    (expected != actual).then_some(expected)
}

pub(crate) fn build_normal_bolus_records(
    ctx: &mut Context<'_>,
    wizards: &mut WizardMatcher,
) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::NORMAL_BOLUS_DELIVERED]) {
        let EventKind::NormalBolusDelivered(delivered) = event.kind else {
            continue;
        };
        // Micro-boluses are automated basal delivery
        if delivered.bolus.source == BolusSource::ClosedLoopMicroBolus {
            continue;
        }
        let Some(begin) = begin_timestamp(log, i, delivered.bolus.number) else {
            tracing::debug!("Skipping normal bolus at event {} with no programmed event", i);
            continue;
        };

        let bolus = BolusRecord::Normal(NormalBolus {
            time: ctx.time(begin)?,
            normal: delivered.delivered,
            expected_normal: differs(delivered.programmed, delivered.delivered),
        });
        wizards.emit(ctx, i, delivered.bolus.source, delivered.programmed, bolus)?;
    }

    Ok(())
}

pub(crate) fn build_square_bolus_records(
    ctx: &mut Context<'_>,
    wizards: &mut WizardMatcher,
) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::SQUARE_BOLUS_DELIVERED]) {
        let EventKind::SquareBolusDelivered(delivered) = event.kind else {
            continue;
        };
        let Some(begin) = begin_timestamp(log, i, delivered.bolus.number) else {
            tracing::debug!("Skipping square bolus at event {} with no programmed event", i);
            continue;
        };

        let changed = delivered.programmed != delivered.delivered
            || delivered.programmed_duration_s != delivered.delivered_duration_s;

        let bolus = BolusRecord::Square(SquareBolus {
            time: ctx.time(begin)?,
            extended: delivered.delivered,
            duration_ms: delivered.delivered_duration_s as u64 * 1000,
            expected_extended: changed.then_some(delivered.programmed),
            expected_duration_ms: changed.then_some(delivered.programmed_duration_s as u64 * 1000),
        });
        wizards.emit(ctx, i, delivered.bolus.source, delivered.programmed, bolus)?;
    }

    Ok(())
}

/// The normal-wave part triggers; its square-wave part must follow
pub(crate) fn build_dual_bolus_records(
    ctx: &mut Context<'_>,
    wizards: &mut WizardMatcher,
) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::DUAL_BOLUS_PART_DELIVERED]) {
        let EventKind::DualBolusPartDelivered(normal) = event.kind else {
            continue;
        };
        if normal.part != DualBolusPart::NormalBolus {
            continue;
        }
        let number = normal.bolus.number;
        let Some(begin) = begin_timestamp(log, i, number) else {
            tracing::debug!("Skipping dual bolus at event {} with no programmed event", i);
            continue;
        };

        let square = log
            .scan_forward(i, |e| {
                matches!(
                    e.kind,
                    EventKind::DualBolusPartDelivered(part)
                        if part.part == DualBolusPart::SquareWave && part.bolus.number == number
                )
            })
            .and_then(|s| match log.events()[s].kind {
                EventKind::DualBolusPartDelivered(part) => Some(part),
                _ => None,
            });
        let Some(square) = square else {
            ctx.violation(Error::MissingDualBolusPart {
                index: i,
                bolus_number: number,
            })?;
            continue;
        };

        let square_changed = square.square_programmed != square.delivered
            || square.programmed_duration_s != square.delivered_duration_s;

        let bolus = BolusRecord::Dual(DualBolus {
            time: ctx.time(begin)?,
            normal: normal.delivered,
            extended: square.delivered,
            duration_ms: square.delivered_duration_s as u64 * 1000,
            expected_normal: differs(normal.normal_programmed, normal.delivered),
            expected_extended: square_changed.then_some(square.square_programmed),
            expected_duration_ms: square_changed
                .then_some(square.programmed_duration_s as u64 * 1000),
        });
        let target = normal.normal_programmed.plus(normal.square_programmed);
        wizards.emit(ctx, i, normal.bolus.source, target, bolus)?;
    }

    Ok(())
}

/// Estimates the user declined produce a zero bolus
pub(crate) fn build_wizard_without_bolus_records(
    ctx: &mut Context<'_>,
    wizards: &WizardMatcher,
) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::BOLUS_WIZARD_ESTIMATE, code::MEAL_WIZARD_ESTIMATE]) {
        let declined = estimate(event).is_some_and(|w| w.final_estimate.is_zero());
        if !declined || wizards.is_consumed(i) {
            continue;
        }

        let bolus = BolusRecord::Normal(NormalBolus {
            time: ctx.time(event.timestamp)?,
            normal: Insulin::ZERO,
            expected_normal: Some(Insulin::ZERO),
        });
        let record = wizard_record(ctx, event, bolus)?;
        ctx.emit(record);
    }

    Ok(())
}
