//! JSON Lines output for domain records.
//!
//! Records are appended to a JSONL file under an exclusive file lock so
//! concurrent parses can share one output file.

use crate::factory::RecordFactory;
use crate::types::DomainRecord;
use crate::Result;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends each record as one JSON line
pub struct JsonlSink {
    path: PathBuf,
    written: usize,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this sink
    pub fn written(&self) -> usize {
        self.written
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Append a batch under a single lock
    pub fn append_all(&mut self, records: &[DomainRecord]) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let mut writer = BufWriter::new(&file);
        for record in records {
            let line = serde_json::to_string(record)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        self.written += records.len();
        tracing::debug!("Appended {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

impl RecordFactory for JsonlSink {
    fn accept(&mut self, record: DomainRecord) -> Result<()> {
        self.append_all(std::slice::from_ref(&record))
    }
}

/// Read every record from a JSONL file
///
/// Unparsable lines are skipped with a warning.
pub fn read_records(path: &Path) -> Result<Vec<DomainRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<DomainRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse record at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecordTime, ReservoirChange, SuspendBasal};
    use chrono::NaiveDate;

    fn record_time(index: u32) -> RecordTime {
        let device_time = NaiveDate::from_ymd_opt(2018, 5, 5)
            .unwrap()
            .and_hms_opt(21, 15, 8)
            .unwrap();
        RecordTime {
            time: device_time.and_utc(),
            device_time,
            timezone_offset: 0,
            clock_drift_offset: 0,
            conversion_offset: 0,
            index,
        }
    }

    #[test]
    fn test_append_and_read_single_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("records.jsonl");

        let mut sink = JsonlSink::new(&path);
        sink.reservoir_change(ReservoirChange {
            time: record_time(7),
        })
        .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind(), "reservoir_change");
        assert_eq!(records[0].time().index, 7);
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn test_append_batches() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/out.jsonl");

        let mut sink = JsonlSink::new(&path);
        let batch: Vec<_> = (0..5)
            .map(|i| {
                DomainRecord::SuspendBasal(SuspendBasal {
                    time: record_time(i),
                    duration_ms: 1000 * i as u64,
                })
            })
            .collect();
        sink.append_all(&batch).unwrap();
        sink.append_all(&batch[..2]).unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 7);
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let records = read_records(&temp_dir.path().join("nonexistent.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("records.jsonl");

        let mut sink = JsonlSink::new(&path);
        sink.reservoir_change(ReservoirChange {
            time: record_time(1),
        })
        .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{\"type\":\"reservoir_ch\n\n")
            .unwrap();
        sink.reservoir_change(ReservoirChange {
            time: record_time(2),
        })
        .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].time().index, 2);
    }
}
