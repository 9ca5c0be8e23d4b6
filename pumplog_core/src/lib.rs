#![forbid(unsafe_code)]

//! Decoder and correlator for Medtronic 600-series pump history.
//!
//! This crate provides:
//! - Page slicing and per-record decoding into typed history events
//! - Device timestamp resolution against the pump's clock changes
//! - Correlation of related events into boluses, basals, suspends and readings
//! - Settings snapshots rebuilt from the pump's current settings
//! - A factory seam and a JSONL sink for the resulting records

pub mod codes;
pub mod config;
pub mod correlate;
pub mod error;
pub mod event;
pub mod factory;
pub mod fields;
pub mod history;
pub mod logging;
pub mod parser;
pub mod settings;
pub mod sink;
pub mod slicer;
pub mod timestamp;
pub mod timezone;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ParseConfig};
pub use error::{Error, Result};
pub use event::{EventKind, HistoryEvent};
pub use factory::{RecordCollector, RecordFactory};
pub use fields::Insulin;
pub use history::HistoryLog;
pub use parser::{HistoryParser, ParseReport};
pub use settings::{CurrentSettings, PumpSettings};
pub use sink::{read_records, JsonlSink};
pub use timestamp::DeviceTimestamp;
pub use types::*;
