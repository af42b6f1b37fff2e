//! Engine configuration.
//!
//! One immutable [`ChanConfig`] is built per driver and each engine receives
//! the section it needs. Every section rejects unknown keys and
//! [`ChanConfig::validate`] rejects malformed values, so a bad configuration
//! fails at construction time.

use serde::{Deserialize, Serialize};

use chan_core::{ChanError, ChanResult};

use crate::metric::MomentumMetric;
use crate::signal::{PointType, Side};

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChanConfig {
    pub bar: BarConfig,
    pub stroke: StrokeConfig,
    pub segment: SegmentConfig,
    pub pivot: PivotConfig,
    pub signal: SignalConfig,
    pub metric: MetricConfig,
    pub alignment: AlignmentConfig,
    pub replay: ReplayConfig,
}

/// Raw bar validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BarConfig {
    /// Widen low/high instead of failing on inconsistent OHLC
    pub auto_clamp: bool,
}

/// How strokes are allowed to form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeMode {
    /// Span, validity and peak checks apply
    #[default]
    Normal,
    /// Any pair of opposite fractals forms a stroke
    FractalOnly,
}

/// How far the end fractal must clear the begin fractal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FractalCheck {
    /// Compare against all three bars of both windows
    #[default]
    Strict,
    /// Compare the two fractal bars only
    Loss,
    /// Compare against the bars facing each other
    Half,
    /// The two windows must not overlap at all
    Totally,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrokeConfig {
    pub mode: StrokeMode,
    /// Require four merged bars between endpoints (three when relaxed)
    pub strict: bool,
    pub fractal_check: FractalCheck,
    /// A price gap between merged bars counts as one extra bar of span
    pub gap_as_bar: bool,
    /// The end fractal must be the extreme of the whole stroke
    pub end_is_peak: bool,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            mode: StrokeMode::Normal,
            strict: true,
            fractal_check: FractalCheck::Strict,
            gap_as_bar: false,
            end_is_peak: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentAlgorithm {
    /// Characteristic-sequence fractals
    #[default]
    Chan,
    /// A line breaking the extreme of the line two back ends the segment
    Break,
    /// Two-situation rule over consecutive same-direction lines
    OnePlusOne,
}

/// How lines after the last confirmed segment are folded into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPolicy {
    /// Split at the most extreme line beyond a three-line buffer
    #[default]
    Peak,
    /// Everything left becomes one segment
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentConfig {
    pub algorithm: SegmentAlgorithm,
    pub trailing: TrailingPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotCombine {
    None,
    /// Merge when the zone bands overlap
    #[default]
    RangeOverlap,
    /// Merge when the peak ranges of the zones overlap
    MemberOverlap,
}

/// Which lines a pivot zone may be built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotAlgo {
    /// Counter-trend lines of one segment at a time
    #[default]
    Normal,
    /// Any three consecutive lines, crossing segment borders
    OverSegment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PivotConfig {
    pub algorithm: PivotAlgo,
    pub combine: PivotCombine,
    /// Keep zones made of a single counter-trend line
    pub single_stroke: bool,
}

/// Turning-point parameters for one polarity on one line level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    /// Type-1 out/in momentum ratio must not exceed this; above 100 always passes
    pub divergence_rate: f64,
    /// Minimum zones of the segment before a type-1 point
    pub min_zone_count: usize,
    /// Only zones with at least three lines count toward `min_zone_count`
    pub t1_multi_stroke_zone_only: bool,
    /// Largest retracement of the type-2 line relative to the break line
    pub max_t2_retrace: f64,
    pub metric: MomentumMetric,
    /// The type-1 point must be the extreme of its last zone
    pub t1_must_be_peak: bool,
    pub targets: Vec<PointType>,
    pub t2_follows_t1: bool,
    pub t3_follows_t1: bool,
    /// The type-3 break line must clear the zone peak, not just its band
    pub t3_must_break_peak: bool,
    pub t2s_follows_t2: bool,
    /// Deepest type-2s chain level, unlimited when absent
    pub max_t2s_depth: Option<usize>,
    /// Type-3 zones must directly follow the type-1 point
    pub strict_t3: bool,
}

impl PointConfig {
    /// Defaults for stroke-level points.
    pub fn stroke_default() -> Self {
        Self {
            divergence_rate: f64::INFINITY,
            min_zone_count: 1,
            t1_multi_stroke_zone_only: true,
            max_t2_retrace: 0.9999,
            metric: MomentumMetric::Peak,
            t1_must_be_peak: true,
            targets: PointType::all().to_vec(),
            t2_follows_t1: true,
            t3_follows_t1: true,
            t3_must_break_peak: false,
            t2s_follows_t2: false,
            max_t2s_depth: None,
            strict_t3: false,
        }
    }

    /// Defaults for segment-level points.
    pub fn segment_default() -> Self {
        Self {
            metric: MomentumMetric::Slope,
            t1_multi_stroke_zone_only: false,
            ..Self::stroke_default()
        }
    }

    pub fn targets(&self, point: PointType) -> bool {
        self.targets.contains(&point)
    }

    fn apply(&mut self, o: &PointOverrides, with_level_specific: bool) {
        if let Some(v) = o.divergence_rate {
            self.divergence_rate = v;
        }
        if let Some(v) = o.min_zone_count {
            self.min_zone_count = v;
        }
        if let Some(v) = o.max_t2_retrace {
            self.max_t2_retrace = v;
        }
        if let Some(v) = o.t1_must_be_peak {
            self.t1_must_be_peak = v;
        }
        if let Some(v) = &o.targets {
            self.targets = v.clone();
        }
        if let Some(v) = o.t2_follows_t1 {
            self.t2_follows_t1 = v;
        }
        if let Some(v) = o.t3_follows_t1 {
            self.t3_follows_t1 = v;
        }
        if let Some(v) = o.t3_must_break_peak {
            self.t3_must_break_peak = v;
        }
        if let Some(v) = o.t2s_follows_t2 {
            self.t2s_follows_t2 = v;
        }
        if let Some(v) = o.max_t2s_depth {
            self.max_t2s_depth = Some(v);
        }
        if let Some(v) = o.strict_t3 {
            self.strict_t3 = v;
        }
        if with_level_specific {
            if let Some(v) = o.metric {
                self.metric = v;
            }
            if let Some(v) = o.t1_multi_stroke_zone_only {
                self.t1_multi_stroke_zone_only = v;
            }
        }
    }

    fn validate(&self, scope: &str) -> ChanResult<()> {
        if self.max_t2_retrace > 1.0 || self.max_t2_retrace.is_nan() {
            return Err(ChanError::Config(format!(
                "{scope}.max_t2_retrace must be <= 1, got {}",
                self.max_t2_retrace
            )));
        }
        if self.divergence_rate.is_nan() || self.divergence_rate < 0.0 {
            return Err(ChanError::Config(format!(
                "{scope}.divergence_rate must be a non-negative number"
            )));
        }
        Ok(())
    }
}

/// Partial point parameters; only the keys present override.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PointOverrides {
    pub divergence_rate: Option<f64>,
    pub min_zone_count: Option<usize>,
    pub t1_multi_stroke_zone_only: Option<bool>,
    pub max_t2_retrace: Option<f64>,
    pub metric: Option<MomentumMetric>,
    pub t1_must_be_peak: Option<bool>,
    pub targets: Option<Vec<PointType>>,
    pub t2_follows_t1: Option<bool>,
    pub t3_follows_t1: Option<bool>,
    pub t3_must_break_peak: Option<bool>,
    pub t2s_follows_t2: Option<bool>,
    pub max_t2s_depth: Option<usize>,
    pub strict_t3: Option<bool>,
}

/// Line level a classifier runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Stroke,
    Segment,
}

/// Turning-point parameters layered from general to specific.
///
/// `common` applies to every level and side, except that the metric and
/// the multi-line zone rule of the segment level keep their own defaults.
/// `buy`/`sell` refine stroke-level points, `segment` refines both sides
/// of the segment level and `segment_buy`/`segment_sell` refine one side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalConfig {
    pub common: PointOverrides,
    pub buy: PointOverrides,
    pub sell: PointOverrides,
    pub segment: PointOverrides,
    pub segment_buy: PointOverrides,
    pub segment_sell: PointOverrides,
}

impl SignalConfig {
    /// Effective parameters for one level and polarity.
    pub fn resolve(&self, level: LineLevel, side: Side) -> PointConfig {
        match level {
            LineLevel::Stroke => {
                let mut conf = PointConfig::stroke_default();
                conf.apply(&self.common, true);
                conf.apply(self.side(side, LineLevel::Stroke), true);
                conf
            }
            LineLevel::Segment => {
                let mut conf = PointConfig::segment_default();
                conf.apply(&self.common, false);
                conf.apply(&self.segment, true);
                conf.apply(self.side(side, LineLevel::Segment), true);
                conf
            }
        }
    }

    fn side(&self, side: Side, level: LineLevel) -> &PointOverrides {
        match (level, side) {
            (LineLevel::Stroke, Side::Buy) => &self.buy,
            (LineLevel::Stroke, Side::Sell) => &self.sell,
            (LineLevel::Segment, Side::Buy) => &self.segment_buy,
            (LineLevel::Segment, Side::Sell) => &self.segment_sell,
        }
    }
}

/// Per-bar indicator parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricConfig {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
        }
    }
}

/// Cross-level ordering and alignment checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlignmentConfig {
    /// Enable misalignment and date-consistency checks
    pub check: bool,
    /// Parent bars without children tolerated before failing
    pub max_misaligned: usize,
    /// Parent bars with children on another date tolerated before failing
    pub max_inconsistent: usize,
    /// Drop a finer level whose source cannot be opened
    pub auto_drop_sub_level: bool,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            check: true,
            max_misaligned: 2,
            max_inconsistent: 5,
            auto_drop_sub_level: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Coarsest-level bars consumed before the first replay snapshot
    pub skip_steps: usize,
}

impl ChanConfig {
    /// Reject malformed values.
    pub fn validate(&self) -> ChanResult<()> {
        let m = &self.metric;
        if m.macd_fast == 0 || m.macd_slow == 0 || m.macd_signal == 0 {
            return Err(ChanError::Config("macd periods must be positive".into()));
        }
        if m.macd_fast >= m.macd_slow {
            return Err(ChanError::Config(format!(
                "metric.macd_fast ({}) must be below metric.macd_slow ({})",
                m.macd_fast, m.macd_slow
            )));
        }
        if m.rsi_period == 0 {
            return Err(ChanError::Config("metric.rsi_period must be positive".into()));
        }
        if self.pivot.algorithm == PivotAlgo::OverSegment && self.pivot.single_stroke {
            return Err(ChanError::Config(
                "pivot.single_stroke is not available with pivot.algorithm = \"over_segment\"".into(),
            ));
        }

        for side in [Side::Buy, Side::Sell] {
            let stroke = self.signal.resolve(LineLevel::Stroke, side);
            stroke.validate(&format!("signal.stroke.{side}"))?;
            let segment = self.signal.resolve(LineLevel::Segment, side);
            segment.validate(&format!("signal.segment.{side}"))?;
            if !segment.metric.supports_segments() {
                return Err(ChanError::Config(format!(
                    "metric {} is not available for segment-level points",
                    segment.metric
                )));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> ChanResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ChanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
