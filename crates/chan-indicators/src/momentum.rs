//! Momentum indicators.

use chan_core::traits::StreamingIndicator;
use serde::{Deserialize, Serialize};

/// One MACD observation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdPoint {
    /// Fast EMA
    pub fast_ema: f64,
    /// Slow EMA
    pub slow_ema: f64,
    /// Fast EMA - slow EMA
    pub dif: f64,
    /// EMA of DIF
    pub dea: f64,
    /// 2 * (DIF - DEA)
    pub histogram: f64,
}

/// Streaming MACD.
///
/// The first value seeds both EMAs, so DIF and DEA start at zero and the
/// indicator is ready from the first bar on.
#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
    last: Option<MacdPoint>,
}

impl Macd {
    /// Create a new MACD with default parameters (12, 26, 9).
    pub fn new() -> Self {
        Self::with_periods(12, 26, 9)
    }

    /// Create a MACD with custom periods.
    pub fn with_periods(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast > 0 && slow > 0 && signal > 0);
        assert!(fast < slow, "Fast period must be less than slow period");
        Self {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
            last: None,
        }
    }

    #[inline]
    fn ema(value: f64, prev: f64, period: usize) -> f64 {
        let n = period as f64;
        (2.0 * value + (n - 1.0) * prev) / (n + 1.0)
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingIndicator for Macd {
    type Output = MacdPoint;

    fn update(&mut self, value: f64) -> Option<MacdPoint> {
        let point = match self.last {
            None => MacdPoint {
                fast_ema: value,
                slow_ema: value,
                ..MacdPoint::default()
            },
            Some(prev) => {
                let fast_ema = Self::ema(value, prev.fast_ema, self.fast_period);
                let slow_ema = Self::ema(value, prev.slow_ema, self.slow_period);
                let dif = fast_ema - slow_ema;
                let dea = Self::ema(dif, prev.dea, self.signal_period);
                MacdPoint {
                    fast_ema,
                    slow_ema,
                    dif,
                    dea,
                    histogram: 2.0 * (dif - dea),
                }
            }
        };
        self.last = Some(point);
        self.last
    }

    fn current(&self) -> Option<MacdPoint> {
        self.last
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn is_ready(&self) -> bool {
        self.last.is_some()
    }

    fn period(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        "MACD"
    }
}

/// Streaming Relative Strength Index.
///
/// Until `period` changes have been seen the averages are the plain sums
/// divided by the period; afterwards Wilder's smoothing applies.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    changes: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
    last: Option<f64>,
}

impl Rsi {
    /// Create a new RSI indicator.
    ///
    /// Common periods are 14 (default) or 9.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self {
            period,
            prev_close: None,
            changes: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            last: None,
        }
    }
}

impl Default for Rsi {
    fn default() -> Self {
        Self::new(14)
    }
}

impl StreamingIndicator for Rsi {
    type Output = f64;

    fn update(&mut self, value: f64) -> Option<f64> {
        let Some(prev) = self.prev_close.replace(value) else {
            self.last = Some(50.0);
            return self.last;
        };

        let change = value - prev;
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        let period_f64 = self.period as f64;
        self.changes += 1;
        if self.changes < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            self.avg_gain = self.gain_sum / period_f64;
            self.avg_loss = self.loss_sum / period_f64;
        } else {
            // Wilder's smoothing: avg = (prev_avg * (period-1) + value) / period
            self.avg_gain = (self.avg_gain * (period_f64 - 1.0) + gain) / period_f64;
            self.avg_loss = (self.avg_loss * (period_f64 - 1.0) + loss) / period_f64;
        }

        let rsi = if self.avg_loss == 0.0 {
            if self.avg_gain == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - (100.0 / (1.0 + self.avg_gain / self.avg_loss))
        };
        self.last = Some(rsi);
        self.last
    }

    fn current(&self) -> Option<f64> {
        self.last
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }

    fn is_ready(&self) -> bool {
        self.changes >= self.period
    }

    fn period(&self) -> usize {
        self.period + 1 // Need period+1 data points
    }

    fn name(&self) -> &str {
        "RSI"
    }
}
