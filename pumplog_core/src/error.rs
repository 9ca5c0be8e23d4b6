//! Error types for the pumplog_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pumplog_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A page file line was not valid hex
    #[error("Hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown IANA zone or a local time the zone cannot represent
    #[error("Timezone error: {0}")]
    Timezone(String),

    /// Record boundaries are lost; nothing after `offset` can be trusted
    #[error(
        "Malformed record at page offset {offset}: declared size {declared}, {remaining} bytes remaining"
    )]
    MalformedRecord {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    /// A known event type whose record is shorter than its field layout
    #[error("Truncated event 0x{code:02X}: {len} bytes, layout needs {required}")]
    TruncatedEvent { code: u8, len: usize, required: usize },

    /// Counter + offset does not land on a representable date
    #[error("Timestamp out of range: counter {counter}, offset {offset}")]
    TimestampOutOfRange { counter: u32, offset: i32 },

    /// A temp basal with no basal segment before it
    #[error("No suppressed basal schedule precedes temp basal at event {index}")]
    MissingSuppressedBasal { index: usize },

    /// The normal-wave half of a dual bolus without its square-wave half
    #[error("Dual bolus {bolus_number} at event {index} has no square-wave part")]
    MissingDualBolusPart { index: usize, bolus_number: u8 },

    /// A resume recorded before its suspend
    #[error("Suspend at event {index} resumes before it starts")]
    NegativeSuspendDuration { index: usize },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Correlation invariant violations, the class that lenient parsing may skip
    pub fn is_correlation_violation(&self) -> bool {
        matches!(
            self,
            Error::MissingSuppressedBasal { .. }
                | Error::MissingDualBolusPart { .. }
                | Error::NegativeSuspendDuration { .. }
        )
    }
}
