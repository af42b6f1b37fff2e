//! OHLCV bar types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Timeframe;
use crate::error::{ChanError, ChanResult};

/// Optional trade statistics attached to a bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeMetrics {
    /// Traded volume
    pub volume: Option<f64>,
    /// Traded amount (turnover in quote currency)
    pub turnover: Option<f64>,
    /// Turnover rate
    pub turnover_rate: Option<f64>,
}

/// A bar record as delivered by a bar source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Trade statistics
    #[serde(default)]
    pub trade: TradeMetrics,
}

impl Bar {
    /// Create a new bar without trade statistics.
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            trade: TradeMetrics::default(),
        }
    }

    /// Attach a traded volume.
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.trade.volume = Some(volume);
        self
    }

    /// Calculate the bar's range (high - low).
    #[inline]
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// A validated bar owned by one level, with its position in that level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    /// Sequence index within the level
    pub idx: usize,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Level the bar belongs to
    pub timeframe: Timeframe,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub trade: TradeMetrics,
}

impl RawBar {
    /// Validate a source bar and assign it a sequence index.
    ///
    /// `low` must not exceed any of open/high/close and `high` must not be
    /// below any of them. With `auto_clamp` the bounds are widened instead.
    pub fn from_bar(bar: Bar, idx: usize, timeframe: Timeframe, auto_clamp: bool) -> ChanResult<Self> {
        let mut raw = Self {
            idx,
            timestamp: bar.timestamp,
            timeframe,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            trade: bar.trade,
        };

        let floor = raw.open.min(raw.high).min(raw.close).min(raw.low);
        let ceiling = raw.open.max(raw.low).max(raw.close).max(raw.high);
        if raw.low > floor || raw.low.is_nan() {
            if !auto_clamp || raw.low.is_nan() {
                return Err(ChanError::InvalidBar {
                    timestamp: raw.timestamp,
                    reason: format!(
                        "low {} above min of open/high/close ({}, {}, {})",
                        raw.low, raw.open, raw.high, raw.close
                    ),
                });
            }
            raw.low = floor;
        }
        if raw.high < ceiling || raw.high.is_nan() {
            if !auto_clamp || raw.high.is_nan() {
                return Err(ChanError::InvalidBar {
                    timestamp: raw.timestamp,
                    reason: format!(
                        "high {} below max of open/low/close ({}, {}, {})",
                        raw.high, raw.open, raw.low, raw.close
                    ),
                });
            }
            raw.high = ceiling;
        }
        Ok(raw)
    }

    /// Get the timestamp as a DateTime.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Calendar date of the bar (UTC).
    pub fn date(&self) -> Option<NaiveDate> {
        self.datetime().map(|dt| dt.date_naive())
    }

    /// The price a turning point at this bar is measured with.
    #[inline]
    pub fn extreme(&self, high: bool) -> f64 {
        if high {
            self.high
        } else {
            self.low
        }
    }
}
