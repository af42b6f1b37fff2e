//! Error types for the chan structure engine.

use std::fmt;

use thiserror::Error;

use crate::types::Timeframe;

/// Top-level engine error. Every variant aborts the current load or push call.
#[derive(Error, Debug)]
pub enum ChanError {
    #[error("Invalid bar at {timestamp}: {reason}")]
    InvalidBar { timestamp: i64, reason: String },

    #[error("Bars of level {timeframe} are not strictly increasing: {previous} then {current}")]
    NonMonotonicTime {
        timeframe: Timeframe,
        previous: i64,
        current: i64,
    },

    #[error("Too many parent bars without children on level {timeframe}: {count} (limit {limit})")]
    Misaligned {
        timeframe: Timeframe,
        count: usize,
        limit: usize,
    },

    #[error("Too many parent bars with child bars on another date: {count} (limit {limit})")]
    DateInconsistent { count: usize, limit: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Structural error: {0}")]
    Structure(#[from] StructureError),

    #[error("No data on the coarsest level {0}")]
    NoData(Timeframe),

    #[error("Sub-level {timeframe} unavailable: {source}")]
    SubLevelUnavailable {
        timeframe: Timeframe,
        #[source]
        source: DataError,
    },

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broken structural invariants. These always indicate a defect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("Stroke {begin}->{end} direction {direction} contradicts endpoint values")]
    StrokeDirection {
        begin: usize,
        end: usize,
        direction: String,
    },

    #[error("Stroke cannot start from a merged bar without a fractal (merged bar {0})")]
    StrokeWithoutFractal(usize),

    #[error("Segment {begin}->{end} end value is on the wrong side of its begin value")]
    SegmentEndValue { begin: usize, end: usize },

    #[error("Segment {begin}->{end} covers no lines")]
    SegmentLength { begin: usize, end: usize },

    #[error("Segment {begin}->{end} direction does not match its boundary lines")]
    SegmentDirection { begin: usize, end: usize },

    #[error("Characteristic sequence already holds three elements")]
    SequenceOverflow,

    #[error("Characteristic sequence for {expected} received a line in the same direction")]
    SequenceDirection { expected: String },

    #[error("Ranges cannot be compared: [{low1}, {high1}] vs [{low2}, {high2}]")]
    Uncomparable {
        low1: f64,
        high1: f64,
        low2: f64,
        high2: f64,
    },

    #[error("Merged bar {0} is missing a neighbour required for the fractal check")]
    MissingNeighbour(usize),

    #[error("Signal at bar {bar} relates to type-1 points {existing} and {incoming}")]
    RelatedMismatch {
        bar: usize,
        existing: usize,
        incoming: usize,
    },

    #[error("Metric {metric} is not available on {level}")]
    UnsupportedMetric { metric: String, level: String },

    #[error("Index {index} out of range for {what}")]
    OutOfRange { what: &'static str, index: usize },
}

/// Bar source errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("No data available for the requested level")]
    NoDataAvailable,

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Data source error: {0}")]
    Internal(String),
}

/// Non-fatal conditions accumulated while loading.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A parent bar received no child bar on the finer level.
    Misaligned {
        timeframe: Timeframe,
        parent_time: i64,
    },
    /// Child bars of one parent fall on a different calendar date.
    DateInconsistent {
        timeframe: Timeframe,
        parent_time: i64,
        child_times: Vec<i64>,
    },
    /// A finer level could not be opened and was dropped.
    LevelDropped { timeframe: Timeframe, reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Misaligned {
                timeframe,
                parent_time,
            } => write!(f, "parent bar {} has no {} children", parent_time, timeframe),
            Warning::DateInconsistent {
                timeframe,
                parent_time,
                child_times,
            } => write!(
                f,
                "parent bar {} has {} children on another date: {:?}",
                parent_time, timeframe, child_times
            ),
            Warning::LevelDropped { timeframe, reason } => {
                write!(f, "level {} dropped: {}", timeframe, reason)
            }
        }
    }
}

/// Result type alias for engine operations.
pub type ChanResult<T> = Result<T, ChanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_error_converts() {
        let err: ChanError = StructureError::SequenceOverflow.into();
        assert!(matches!(err, ChanError::Structure(_)));
        assert!(err.to_string().contains("three elements"));
    }

    #[test]
    fn test_warning_display() {
        let w = Warning::Misaligned {
            timeframe: Timeframe::Minute5,
            parent_time: 1000,
        };
        assert_eq!(w.to_string(), "parent bar 1000 has no 5m children");
    }
}
