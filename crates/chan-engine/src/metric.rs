//! Momentum metrics compared between the entering and exiting lines of a
//! pivot zone.

use std::fmt;

use serde::{Deserialize, Serialize};

use chan_core::{RawBar, StructureError, TradeMetrics};
use chan_indicators::MacdPoint;

use crate::line::Line;

const EPS: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumMetric {
    /// Histogram area from the start (or back from the end) while its sign holds
    Area,
    /// Largest histogram bar in the line's direction
    Peak,
    /// Histogram area in the line's direction
    FullArea,
    /// Histogram range
    Diff,
    /// Relative move per bar
    Slope,
    /// Relative move
    Amp,
    Volume,
    Amount,
    VolumeAvg,
    AmountAvg,
    TurnrateAvg,
    Rsi,
}

impl MomentumMetric {
    /// Metrics that only need the two extremes and so apply to segments.
    pub fn supports_segments(self) -> bool {
        matches!(self, Self::Slope | Self::Amp)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Area => "area",
            Self::Peak => "peak",
            Self::FullArea => "full_area",
            Self::Diff => "diff",
            Self::Slope => "slope",
            Self::Amp => "amp",
            Self::Volume => "volume",
            Self::Amount => "amount",
            Self::VolumeAvg => "volume_avg",
            Self::AmountAvg => "amount_avg",
            Self::TurnrateAvg => "turnrate_avg",
            Self::Rsi => "rsi",
        }
    }
}

impl fmt::Display for MomentumMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-bar inputs of one level.
#[derive(Debug, Clone, Copy)]
pub struct MetricInput<'a> {
    pub bars: &'a [RawBar],
    pub macd: &'a [MacdPoint],
    pub rsi: &'a [f64],
}

impl<'a> MetricInput<'a> {
    fn hist(&self, idx: usize) -> f64 {
        self.macd.get(idx).map_or(0.0, |p| p.histogram)
    }

    /// Metric of `line`.
    ///
    /// `reverse` selects the backward half-area for [`MomentumMetric::Area`],
    /// used on the exiting line. `segment` restricts the choice to metrics
    /// defined on segments.
    pub fn compute(
        &self,
        metric: MomentumMetric,
        line: &Line,
        reverse: bool,
        segment: bool,
    ) -> Result<f64, StructureError> {
        if segment && !metric.supports_segments() {
            return Err(StructureError::UnsupportedMetric {
                metric: metric.to_string(),
                level: "segment".into(),
            });
        }
        let value = match metric {
            MomentumMetric::Area if reverse => self.half_area_reverse(line),
            MomentumMetric::Area => self.half_area(line),
            MomentumMetric::Peak => self.peak(line),
            MomentumMetric::FullArea => self.full_area(line),
            MomentumMetric::Diff => self.diff(line),
            MomentumMetric::Slope => self.slope(line),
            MomentumMetric::Amp => self.amp(line),
            MomentumMetric::Volume => self.trade_sum(line, |t| t.volume, false),
            MomentumMetric::Amount => self.trade_sum(line, |t| t.turnover, false),
            MomentumMetric::VolumeAvg => self.trade_sum(line, |t| t.volume, true),
            MomentumMetric::AmountAvg => self.trade_sum(line, |t| t.turnover, true),
            MomentumMetric::TurnrateAvg => self.trade_sum(line, |t| t.turnover_rate, true),
            MomentumMetric::Rsi => self.rsi(line),
        };
        Ok(value)
    }

    fn span(&self, line: &Line) -> std::ops::RangeInclusive<usize> {
        line.first_bar..=line.last_bar.min(self.bars.len().saturating_sub(1))
    }

    fn half_area(&self, line: &Line) -> f64 {
        let sign = self.hist(line.begin_bar);
        let mut sum = EPS;
        for i in line.begin_bar..=*self.span(line).end() {
            let h = self.hist(i);
            if h * sign > 0.0 {
                sum += h.abs();
            } else {
                break;
            }
        }
        sum
    }

    fn half_area_reverse(&self, line: &Line) -> f64 {
        let sign = self.hist(line.end_bar);
        let mut sum = EPS;
        for i in (line.first_bar..=line.end_bar).rev() {
            let h = self.hist(i);
            if h * sign > 0.0 {
                sum += h.abs();
            } else {
                break;
            }
        }
        sum
    }

    fn full_area(&self, line: &Line) -> f64 {
        (line.begin_bar..=line.end_bar)
            .map(|i| self.hist(i))
            .filter(|h| (line.is_down() && *h < 0.0) || (line.is_up() && *h > 0.0))
            .fold(EPS, |acc, h| acc + h.abs())
    }

    fn peak(&self, line: &Line) -> f64 {
        self.span(line)
            .map(|i| self.hist(i))
            .filter(|h| (line.is_down() && *h < 0.0) || (line.is_up() && *h > 0.0))
            .fold(EPS, |acc, h| acc.max(h.abs()))
    }

    fn diff(&self, line: &Line) -> f64 {
        let (max, min) = self
            .span(line)
            .map(|i| self.hist(i))
            .fold((f64::NEG_INFINITY, f64::INFINITY), |(max, min), h| {
                (max.max(h), min.min(h))
            });
        if max.is_finite() {
            max - min
        } else {
            0.0
        }
    }

    fn slope(&self, line: &Line) -> f64 {
        let begin = &self.bars[line.begin_bar];
        let end = &self.bars[line.end_bar];
        let bars = line.bar_count() as f64;
        if line.is_up() {
            (end.high - begin.low) / end.high / bars
        } else {
            (begin.high - end.low) / begin.high / bars
        }
    }

    fn amp(&self, line: &Line) -> f64 {
        let begin = &self.bars[line.begin_bar];
        let end = &self.bars[line.end_bar];
        if line.is_down() {
            (begin.high - end.low) / begin.high
        } else {
            (end.high - begin.low) / begin.low
        }
    }

    fn trade_sum<F>(&self, line: &Line, field: F, avg: bool) -> f64
    where
        F: Fn(&TradeMetrics) -> Option<f64>,
    {
        let mut sum = 0.0;
        for i in self.span(line) {
            match field(&self.bars[i].trade) {
                Some(v) => sum += v,
                None => return 0.0,
            }
        }
        if avg {
            sum / line.bar_count() as f64
        } else {
            sum
        }
    }

    fn rsi(&self, line: &Line) -> f64 {
        let values = self.span(line).filter_map(|i| self.rsi.get(i).copied());
        if line.is_down() {
            let min = values.fold(f64::INFINITY, f64::min);
            10000.0 / (min + EPS)
        } else {
            values.fold(f64::NEG_INFINITY, f64::max)
        }
    }
}
