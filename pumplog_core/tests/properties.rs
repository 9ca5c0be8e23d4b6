//! Property and end-to-end tests for pumplog_core.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use pumplog_core::event::code;
use pumplog_core::fields::Fields;
use pumplog_core::slicer::{slice_page, SIZE_OFFSET};
use pumplog_core::timestamp::DeviceTimestamp;
use pumplog_core::timezone::{DeviceZone, TimeChangeRecord, TimezoneResolver};
use pumplog_core::*;

const OFFSET: u32 = 0xa101_dbab;
const T0: u32 = 0x8196_0000;

/// Header plus payload, with the size byte filled in
fn record(code: u8, counter: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![code, 0x00, 0x00];
    bytes.extend(counter.to_be_bytes());
    bytes.extend(OFFSET.to_be_bytes());
    bytes.extend(payload);
    bytes[SIZE_OFFSET] = bytes.len() as u8;
    bytes
}

fn units(value: f64) -> [u8; 4] {
    Insulin::from_units(value).0.to_be_bytes()
}

proptest! {
    #[test]
    fn slicing_partitions_the_page(sizes in prop::collection::vec(3u8..=255, 0..40)) {
        let mut page = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            let mut bytes = vec![i as u8; *size as usize];
            bytes[SIZE_OFFSET] = *size;
            page.extend(bytes);
        }

        let records = slice_page(&page).unwrap();
        prop_assert_eq!(records.len(), sizes.len());
        let lengths: Vec<u8> = records.iter().map(|r| r.declared_size).collect();
        prop_assert_eq!(&lengths, &sizes);
        let joined: Vec<u8> = records.into_iter().flat_map(|r| r.bytes).collect();
        prop_assert_eq!(joined, page);
    }

    #[test]
    fn insulin_is_fixed_point_ten_thousandths(raw in any::<u32>()) {
        let bytes = raw.to_be_bytes();
        let amount = Fields::new(&bytes).insulin(0).unwrap();
        prop_assert_eq!(amount, Insulin(raw));
        prop_assert_eq!(amount.units(), raw as f64 / 10_000.0);
    }

    #[test]
    fn offset_windows_cover_every_index_once(
        changes in prop::collection::vec((0x8000_0000u32..0x9000_0000, -48i32..48), 0..8),
        indices in prop::collection::vec(any::<u32>(), 1..32),
    ) {
        let changes: Vec<_> = changes
            .into_iter()
            .map(|(counter, half_hours)| TimeChangeRecord {
                from: DeviceTimestamp::new(counter, OFFSET as i32),
                to: DeviceTimestamp::new(counter, OFFSET as i32 + half_hours * 1800),
            })
            .collect();
        let anchor: DateTime<Utc> = "2018-06-01T00:00:00Z".parse().unwrap();
        let resolver =
            TimezoneResolver::from_changes(changes, DeviceZone::new("UTC").unwrap(), anchor)
                .unwrap();

        for index in indices {
            let hits = resolver.windows().iter().filter(|w| w.contains(index)).count();
            prop_assert_eq!(hits, 1, "index {} in {} windows", index, hits);
        }
    }
}

#[test]
fn test_history_to_jsonl() {
    let page: Vec<u8> = [
        record(code::BASAL_SEGMENT_START, T0, &[&[1, 0][..], &units(0.85)].concat()),
        record(code::NORMAL_BOLUS_PROGRAMMED, T0 + 60, &[0, 7, 0]),
        record(
            code::NORMAL_BOLUS_DELIVERED,
            T0 + 100,
            &[&[0, 7, 0][..], &units(2.5), &units(2.5), &units(1.2)].concat(),
        ),
        record(code::REWIND, T0 + 3600, &[]),
        record(code::CANNULA_FILL_DELIVERED, T0 + 3700, &[&[0][..], &units(9.1), &[0; 4]].concat()),
    ]
    .concat();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/records.jsonl");
    let mut sink = JsonlSink::new(&path);

    let parser = HistoryParser::new(ParseConfig::default().with_timezone("Europe/London"));
    let report = parser.parse([page], &mut sink).unwrap();
    assert_eq!(report.events, 5);
    assert_eq!(report.records, 4);
    assert_eq!(sink.written(), 4);

    let records = read_records(&path).unwrap();
    let kinds: Vec<_> = records.iter().map(DomainRecord::kind).collect();
    assert_eq!(kinds, ["scheduled_basal", "normal_bolus", "reservoir_change", "prime"]);

    let DomainRecord::NormalBolus(bolus) = &records[1] else {
        panic!("expected a normal bolus");
    };
    assert_eq!(bolus.normal, Insulin::from_units(2.5));
    assert_eq!(bolus.expected_normal, None);
    // Stamped with the programming time, BST is UTC+1
    assert_eq!(bolus.time.index, T0 + 60);
    assert_eq!(bolus.time.timezone_offset, 60);
    assert_eq!(
        bolus.time.time,
        bolus.time.device_time.and_utc() - chrono::Duration::hours(1)
    );
}

#[test]
fn test_truncated_known_event_is_fatal() {
    // A basal segment start cut short of its rate field
    let page = record(code::BASAL_SEGMENT_START, T0, &[1, 0, 0]);
    let mut collector = RecordCollector::new();
    let result = HistoryParser::new(ParseConfig::default()).parse([page], &mut collector);
    assert!(matches!(
        result,
        Err(Error::TruncatedEvent {
            code: 0x1D,
            len: 14,
            required: 17
        })
    ));
    assert!(collector.records.is_empty());
}
