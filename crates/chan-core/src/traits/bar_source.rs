//! Bar source trait definitions.

use std::collections::VecDeque;

use crate::error::DataError;
use crate::types::{Bar, Timeframe};

/// An ordered, exhaustible sequence of bars for one level.
///
/// Bars must be delivered oldest first. The engine checks the ordering and
/// rejects non-increasing timestamps.
pub trait BarSource: Send {
    /// Pull the next bar, or `None` once the source is exhausted.
    fn next_bar(&mut self) -> Result<Option<Bar>, DataError>;

    /// Get the source name.
    fn name(&self) -> &str;
}

/// Opens one bar source per configured level.
pub trait SourceProvider {
    /// Open the source for `timeframe`.
    fn open(&self, timeframe: Timeframe) -> Result<Box<dyn BarSource>, DataError>;
}

/// In-memory bar source.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    name: String,
    bars: VecDeque<Bar>,
}

impl VecSource {
    /// Create a source over `bars`.
    pub fn new(name: impl Into<String>, bars: impl IntoIterator<Item = Bar>) -> Self {
        Self {
            name: name.into(),
            bars: bars.into_iter().collect(),
        }
    }

    /// Number of bars not yet pulled.
    pub fn remaining(&self) -> usize {
        self.bars.len()
    }
}

impl BarSource for VecSource {
    fn next_bar(&mut self) -> Result<Option<Bar>, DataError> {
        Ok(self.bars.pop_front())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_source_drains_in_order() {
        let mut src = VecSource::new(
            "mem",
            vec![Bar::new(1, 1.0, 2.0, 0.5, 1.5), Bar::new(2, 1.5, 2.5, 1.0, 2.0)],
        );
        assert_eq!(src.name(), "mem");
        assert_eq!(src.next_bar().unwrap().map(|b| b.timestamp), Some(1));
        assert_eq!(src.remaining(), 1);
        assert_eq!(src.next_bar().unwrap().map(|b| b.timestamp), Some(2));
        assert!(src.next_bar().unwrap().is_none());
    }
}
