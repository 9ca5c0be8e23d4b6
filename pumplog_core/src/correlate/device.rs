//! Suspends, reservoir and cannula handling, alarms.

use super::Context;
use crate::event::{code, EventKind};
use crate::types::{
    Agent, Alarm, AlarmType, Annotation, Prime, ReservoirChange, SuspendBasal, SuspendResume,
};
use crate::{Error, Result};

fn agent(manual: bool) -> Agent {
    if manual {
        Agent::Manual
    } else {
        Agent::Automatic
    }
}

/// One episode per stop; the pump may still be suspended at capture time
pub(crate) fn build_suspend_resume_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::INSULIN_DELIVERY_STOPPED]) {
        let EventKind::InsulinDeliveryStopped(reason) = event.kind else {
            continue;
        };

        let resume = log
            .scan_forward(i, |e| e.code() == code::INSULIN_DELIVERY_RESTARTED)
            .and_then(|r| log.get(r))
            .and_then(|r| match r.kind {
                EventKind::InsulinDeliveryRestarted(resume_reason) => Some((r, resume_reason)),
                _ => None,
            });

        let (duration_ms, resumed_by, resume_cause, annotations) = match resume {
            Some((restarted, resume_reason)) => {
                let elapsed = event.timestamp.elapsed_ms_until(&restarted.timestamp);
                if elapsed < 0 {
                    ctx.violation(Error::NegativeSuspendDuration { index: i })?;
                    continue;
                }
                (
                    elapsed as u64,
                    agent(resume_reason.is_manual()),
                    resume_reason.name(),
                    Vec::new(),
                )
            }
            None => {
                tracing::debug!("Suspend at event {} has no resume", i);
                (
                    0,
                    Agent::Automatic,
                    "not_resumed".to_string(),
                    vec![Annotation::new("status/incomplete-tuple")],
                )
            }
        };

        let time = ctx.time(event.timestamp)?;
        ctx.emit(SuspendResume {
            time: time.clone(),
            duration_ms,
            resolved: resume.is_some(),
            suspended_by: agent(reason.is_manual()),
            resumed_by,
            suspend_cause: reason.name(),
            resume_cause,
            annotations,
        });
        ctx.emit(SuspendBasal { time, duration_ms });
    }

    Ok(())
}

pub(crate) fn build_rewind_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;
    for (_, event) in log.of_type(&[code::REWIND]) {
        ctx.emit(ReservoirChange {
            time: ctx.time(event.timestamp)?,
        });
    }
    Ok(())
}

/// A prime skipped on the pump is still logged, with zero volume
pub(crate) fn build_prime_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (i, event) in log.of_type(&[code::CANNULA_FILL_DELIVERED]) {
        let EventKind::CannulaFill { target, amount, .. } = event.kind else {
            continue;
        };
        if amount.is_zero() {
            tracing::debug!("Skipping zero fill at event {}", i);
            continue;
        }
        ctx.emit(Prime {
            time: ctx.time(event.timestamp)?,
            prime_target: target,
            volume: amount,
        });
    }

    Ok(())
}

pub(crate) fn build_alarm_records(ctx: &mut Context<'_>) -> Result<()> {
    let log = ctx.log;

    for (_, event) in log.of_type(&[code::LOW_RESERVOIR, code::ALARM_NOTIFICATION]) {
        let alarm = match &event.kind {
            EventKind::LowReservoir(low) => Alarm {
                time: ctx.time(event.timestamp)?,
                alarm_type: if low.units_remaining.is_zero() {
                    AlarmType::NoInsulin
                } else {
                    AlarmType::LowInsulin
                },
                amount: Some(low.units_remaining),
                time_remaining_ms: Some(low.ms_remaining()),
                fault_number: None,
                alarm_data: None,
            },
            EventKind::AlarmNotification(notification) => Alarm {
                time: ctx.time(event.timestamp)?,
                alarm_type: AlarmType::Other,
                amount: None,
                time_remaining_ms: None,
                fault_number: Some(notification.fault_number),
                alarm_data: Some(notification.alarm_data.clone()),
            },
            _ => continue,
        };
        ctx.emit(alarm);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{history, of_kind, run, run_with, Rec, T0};
    use crate::codes::PrimeTarget;
    use crate::event::code;
    use crate::types::{Agent, AlarmType, DomainRecord};
    use crate::Error;

    fn stopped(counter: u32, reason: u8) -> Rec {
        Rec::new(code::INSULIN_DELIVERY_STOPPED, counter).u8(0x0B, reason)
    }

    fn restarted(counter: u32, reason: u8) -> Rec {
        Rec::new(code::INSULIN_DELIVERY_RESTARTED, counter).u8(0x0B, reason)
    }

    #[test]
    fn test_real_alarm_suspend_and_resume() {
        let page = hex::decode(concat!(
            "1e000c81ee52f6a092886601",
            "1f000c81ee56b5a092886602",
        ))
        .unwrap();
        let log = crate::history::HistoryLog::from_pages([page]).unwrap();
        let records = run_with(&log, None, true).unwrap().records;

        let DomainRecord::SuspendResume(episode) = &records[0] else {
            panic!("expected a suspend/resume record");
        };
        assert_eq!(episode.duration_ms, 959_000);
        assert!(episode.resolved);
        assert_eq!(episode.suspended_by, Agent::Automatic);
        assert_eq!(episode.resumed_by, Agent::Manual);
        assert_eq!(episode.suspend_cause, "Alarm suspend");
        assert_eq!(episode.resume_cause, "User cleared alarm");

        let DomainRecord::SuspendBasal(basal) = &records[1] else {
            panic!("expected a suspend basal");
        };
        assert_eq!(basal.duration_ms, 959_000);
        assert_eq!(basal.time, episode.time);
    }

    #[test]
    fn test_unresolved_suspend() {
        let records = run(vec![stopped(T0, 2)]);
        let DomainRecord::SuspendResume(episode) = &records[0] else {
            panic!("expected a suspend/resume record");
        };
        assert!(!episode.resolved);
        assert_eq!(episode.duration_ms, 0);
        assert_eq!(episode.suspended_by, Agent::Manual);
        assert_eq!(episode.resumed_by, Agent::Automatic);
        assert_eq!(episode.resume_cause, "not_resumed");
        assert_eq!(episode.annotations[0].code, "status/incomplete-tuple");
        assert_eq!(of_kind(&records, "suspend_basal").len(), 1);
    }

    #[test]
    fn test_resume_before_suspend_is_a_violation() {
        let log = history(vec![stopped(T0, 4), restarted(T0 - 60, 4)]);
        assert!(matches!(
            run_with(&log, None, true),
            Err(Error::NegativeSuspendDuration { index: 0 })
        ));
        let lenient = run_with(&log, None, false).unwrap();
        assert!(lenient.records.is_empty());
        assert_eq!(lenient.skipped, 1);
    }

    #[test]
    fn test_rewind_and_prime() {
        let records = run(vec![
            Rec::new(code::REWIND, T0),
            Rec::new(code::CANNULA_FILL_DELIVERED, T0 + 60)
                .u8(0x0B, 0)
                .units(0x0C, 8.2),
            Rec::new(code::CANNULA_FILL_DELIVERED, T0 + 120).u8(0x0B, 1),
            Rec::new(code::CANNULA_FILL_DELIVERED, T0 + 180)
                .u8(0x0B, 1)
                .units(0x0C, 0.3),
        ]);
        assert_eq!(of_kind(&records, "reservoir_change").len(), 1);

        let primes: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                DomainRecord::Prime(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(primes.len(), 2);
        assert_eq!(primes[0].prime_target, PrimeTarget::Tubing);
        assert_eq!(primes[0].volume.units(), 8.2);
        assert_eq!(primes[1].prime_target, PrimeTarget::Cannula);
    }

    #[test]
    fn test_low_reservoir_alarms() {
        let records = run(vec![
            Rec::new(code::LOW_RESERVOIR, T0)
                .u8(0x0C, 2)
                .u8(0x0D, 30)
                .units(0x0E, 20.0),
            Rec::new(code::LOW_RESERVOIR, T0 + 60),
            Rec::new(code::ALARM_NOTIFICATION, T0 + 120).u16(0x0B, 105),
        ]);
        let alarms: Vec<_> = records
            .iter()
            .filter_map(|r| match r {
                DomainRecord::Alarm(a) => Some(a),
                _ => None,
            })
            .collect();
        assert_eq!(alarms.len(), 3);
        assert_eq!(alarms[0].alarm_type, AlarmType::LowInsulin);
        assert_eq!(alarms[0].amount.unwrap().units(), 20.0);
        assert_eq!(alarms[0].time_remaining_ms, Some(9_000_000));
        assert_eq!(alarms[1].alarm_type, AlarmType::NoInsulin);
        assert_eq!(alarms[2].alarm_type, AlarmType::Other);
        assert_eq!(alarms[2].fault_number, Some(105));
        assert_eq!(alarms[2].alarm_data.as_deref(), Some("000000000000000000"));
    }
}
