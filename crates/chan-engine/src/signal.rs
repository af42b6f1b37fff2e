//! Turning-point classification.
//!
//! Points are derived for one line level at a time from its lines, segments
//! and pivot zones. Every pass rebuilds the whole list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use chan_core::StructureError;

use crate::combiner::has_overlap;
use crate::config::{LineLevel, PointConfig, SignalConfig};
use crate::line::Line;
use crate::metric::MetricInput;
use crate::pivot::PivotZone;
use crate::segment::{segment_of, Segment};

const EPS: f64 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Buy at the end of a falling line, sell at the end of a rising one.
    pub fn of(line: &Line) -> Self {
        if line.is_down() {
            Self::Buy
        } else {
            Self::Sell
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("buy"),
            Self::Sell => f.write_str("sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointType {
    /// Divergence on leaving the last zone of a trend
    #[serde(rename = "1")]
    T1,
    /// Divergence without a multi-line zone
    #[serde(rename = "1p")]
    T1p,
    /// First pullback after a type-1 point
    #[serde(rename = "2")]
    T2,
    /// Later pullbacks chained to a type-2 point
    #[serde(rename = "2s")]
    T2s,
    /// Retest of the first zone after the type-1 point
    #[serde(rename = "3a")]
    T3a,
    /// Retest of the last zone before the type-1 point
    #[serde(rename = "3b")]
    T3b,
}

impl PointType {
    pub fn all() -> &'static [PointType] {
        &[
            PointType::T1,
            PointType::T1p,
            PointType::T2,
            PointType::T2s,
            PointType::T3a,
            PointType::T3b,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::T1 => "1",
            Self::T1p => "1p",
            Self::T2 => "2",
            Self::T2s => "2s",
            Self::T3a => "3a",
            Self::T3b => "3b",
        }
    }

    fn is_first(self) -> bool {
        matches!(self, Self::T1 | Self::T1p)
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified turning point anchored at the end of one line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub line: usize,
    /// Raw bar of the anchor extreme
    pub bar: usize,
    pub timestamp: i64,
    pub side: Side,
    pub types: Vec<PointType>,
    /// Anchor line of the type-1 point this one follows
    pub related_t1: Option<usize>,
    pub features: BTreeMap<String, f64>,
    finalized: bool,
}

impl Signal {
    pub fn is_final(&self) -> bool {
        self.finalized
    }

    pub fn has_type(&self, point: PointType) -> bool {
        self.types.contains(&point)
    }
}

/// Everything one classifier pass reads.
#[derive(Debug, Clone, Copy)]
pub struct SignalInput<'a> {
    pub level: LineLevel,
    pub lines: &'a [Line],
    pub segments: &'a [Segment],
    pub zones: &'a [PivotZone],
    pub metric: MetricInput<'a>,
}

/// Classify every turning point of one line level.
pub fn classify(input: &SignalInput<'_>, config: &SignalConfig) -> Result<Vec<Signal>, StructureError> {
    let mut pass = Classifier {
        input,
        config,
        points: Vec::new(),
        first: BTreeSet::new(),
    };
    for seg in input.segments {
        pass.first_type(seg)?;
    }
    for seg in input.segments {
        pass.second_type(seg)?;
    }
    for seg in input.segments {
        pass.third_type(seg)?;
    }
    let mut points = pass.points;
    points.sort_by_key(|p| p.line);
    for point in &mut points {
        let line_final = input.lines.get(point.line).map_or(false, |l| l.finalized);
        let seg_final = segment_of(input.segments, point.line)
            .and_then(|s| input.segments.get(s))
            .map_or(false, Segment::is_final);
        point.finalized = line_final && seg_final;
    }
    Ok(points)
}

struct Classifier<'a> {
    input: &'a SignalInput<'a>,
    config: &'a SignalConfig,
    /// Target points
    points: Vec<Signal>,
    /// Anchor lines of every type-1 candidate, target or not
    first: BTreeSet<usize>,
}

impl Classifier<'_> {
    fn conf(&self, seg_is_down: bool) -> PointConfig {
        let side = if seg_is_down { Side::Buy } else { Side::Sell };
        self.config.resolve(self.input.level, side)
    }

    fn segment_level(&self) -> bool {
        self.input.level == LineLevel::Segment
    }

    fn parent(&self, line: usize) -> usize {
        segment_of(self.input.segments, line).unwrap_or(self.input.segments.len())
    }

    fn is_point(&self, line: usize) -> bool {
        self.points.iter().any(|p| p.line == line)
    }

    fn related(&self, line: Option<usize>) -> Option<usize> {
        line.filter(|l| self.first.contains(l))
    }

    fn add(
        &mut self,
        kind: PointType,
        line_idx: usize,
        related_t1: Option<usize>,
        target: bool,
        features: BTreeMap<String, f64>,
    ) -> Result<(), StructureError> {
        let Some(line) = self.input.lines.get(line_idx) else {
            return Err(StructureError::OutOfRange {
                what: "signal line",
                index: line_idx,
            });
        };
        if let Some(existing) = self.points.iter_mut().find(|p| p.line == line_idx) {
            if !existing.types.contains(&kind) {
                existing.types.push(kind);
            }
            match (existing.related_t1, related_t1) {
                (None, incoming) => existing.related_t1 = incoming,
                (Some(a), Some(b)) if a != b => {
                    return Err(StructureError::RelatedMismatch {
                        bar: existing.bar,
                        existing: a,
                        incoming: b,
                    });
                }
                _ => {}
            }
            return Ok(());
        }
        let side = Side::of(line);
        let target = target && self.config.resolve(self.input.level, side).targets(kind);
        if kind.is_first() {
            self.first.insert(line_idx);
        }
        if target {
            self.points.push(Signal {
                line: line_idx,
                bar: line.end_bar,
                timestamp: line.end_time,
                side,
                types: vec![kind],
                related_t1,
                features,
                finalized: false,
            });
        }
        Ok(())
    }

    fn first_type(&mut self, seg: &Segment) -> Result<(), StructureError> {
        let conf = self.conf(seg.dir.is_down());
        let zones = self.input.zones;
        let zone_count = if conf.t1_multi_stroke_zone_only {
            seg.multi_zone_count(zones)
        } else {
            seg.zones.len()
        };
        let target = conf.min_zone_count == 0 || zone_count >= conf.min_zone_count;
        let last_zone = seg.zones.last().and_then(|&i| zones.get(i));
        match last_zone {
            Some(zone)
                if !zone.is_single_line()
                    && (zone.exiting.map_or(false, |x| x >= seg.end) || zone.end >= seg.end)
                    && zone.entering.map_or(false, |e| seg.end > e + 2) =>
            {
                self.zone_divergence(seg, zone, &conf, target)
            }
            _ => self.trend_divergence(seg, &conf, target),
        }
    }

    fn zone_divergence(
        &mut self,
        seg: &Segment,
        zone: &PivotZone,
        conf: &PointConfig,
        mut target: bool,
    ) -> Result<(), StructureError> {
        let lines = self.input.lines;
        let (is_peak, _) = zone.exiting_is_peak(lines, seg.end);
        if conf.t1_must_be_peak && !is_peak {
            target = false;
        }
        let (diverged, rate) =
            zone.divergence(lines, &self.input.metric, conf, &lines[seg.end], self.segment_level())?;
        if !diverged {
            target = false;
        }
        let mut features = BTreeMap::new();
        if let Some(rate) = rate {
            features.insert("divergence_rate".to_string(), rate);
        }
        self.add(PointType::T1, seg.end, None, target, features)
    }

    fn trend_divergence(&mut self, seg: &Segment, conf: &PointConfig, mut target: bool) -> Result<(), StructureError> {
        let lines = self.input.lines;
        let Some(pre_idx) = seg.end.checked_sub(2) else {
            return Ok(());
        };
        let (last, pre) = (&lines[seg.end], &lines[pre_idx]);
        if self.parent(last.idx) != self.parent(pre.idx) || last.dir != seg.dir {
            return Ok(());
        }
        if (last.is_down() && last.low > pre.low) || (last.is_up() && last.high < pre.high) {
            return Ok(());
        }
        let segment_level = self.segment_level();
        let in_metric = self.input.metric.compute(conf.metric, pre, false, segment_level)?;
        let out_metric = self.input.metric.compute(conf.metric, last, true, segment_level)?;
        if out_metric > conf.divergence_rate * in_metric {
            target = false;
        }
        let mut features = BTreeMap::new();
        features.insert("divergence_rate".to_string(), out_metric / (in_metric + EPS));
        self.add(PointType::T1p, last.idx, None, target, features)
    }

    fn second_type(&mut self, seg: &Segment) -> Result<(), StructureError> {
        let lines = self.input.lines;
        let segments = self.input.segments;
        let conf = self.conf(seg.dir.is_down());
        if !conf.targets(PointType::T2) && !conf.targets(PointType::T2s) {
            return Ok(());
        }
        let (conf, first, break_idx, t2_idx) = if segments.len() > 1 {
            let first = seg.end;
            if first + 2 >= lines.len() {
                return Ok(());
            }
            (conf, Some(first), first + 1, first + 2)
        } else {
            if lines.len() < 2 {
                return Ok(());
            }
            (self.conf(seg.dir.is_up()), None, 0, 1)
        };
        if conf.t2_follows_t1 && !first.map_or(false, |f| self.is_point(f)) {
            return Ok(());
        }
        let related = self.related(first);
        let (brk, t2) = (&lines[break_idx], &lines[t2_idx]);
        let retrace = t2.amp() / brk.amp();
        if retrace <= conf.max_t2_retrace {
            self.add(PointType::T2, t2_idx, related, true, BTreeMap::new())?;
        } else if conf.t2s_follows_t2 {
            return Ok(());
        }
        if !self.conf(seg.dir.is_down()).targets(PointType::T2s) {
            return Ok(());
        }
        self.chained_second(t2, brk, related, &conf)
    }

    fn chained_second(
        &mut self,
        t2: &Line,
        brk: &Line,
        related: Option<usize>,
        conf: &PointConfig,
    ) -> Result<(), StructureError> {
        let lines = self.input.lines;
        let segments = self.input.segments;
        let t2_seg = self.parent(t2.idx);
        let t2_seg_sure = segments.get(t2_seg).map_or(false, Segment::is_sure);
        let (mut low, mut high) = (t2.low, t2.high);
        let mut bias = 2;
        while let Some(line) = lines.get(t2.idx + bias) {
            if conf.max_t2s_depth.map_or(false, |depth| bias / 2 > depth) {
                break;
            }
            let seg = self.parent(line.idx);
            if seg != t2_seg && (seg + 1 < segments.len() || seg >= t2_seg + 2 || t2_seg_sure) {
                break;
            }
            if !has_overlap(low, high, line.low, line.high, false) {
                break;
            }
            if bias == 2 {
                low = low.max(line.low);
                high = high.min(line.high);
            }
            if (line.is_down() && line.low < brk.low) || (line.is_up() && line.high > brk.high) {
                break;
            }
            let retrace = (line.end_val - brk.end_val).abs() / brk.amp();
            if retrace > conf.max_t2_retrace {
                break;
            }
            self.add(PointType::T2s, line.idx, related, true, BTreeMap::new())?;
            bias += 2;
        }
        Ok(())
    }

    fn third_type(&mut self, seg: &Segment) -> Result<(), StructureError> {
        let segments = self.input.segments;
        let conf = self.conf(seg.dir.is_down());
        if !conf.targets(PointType::T3a) && !conf.targets(PointType::T3b) {
            return Ok(());
        }
        let (conf, first, next_idx) = if segments.len() > 1 {
            (conf, Some(seg.end), seg.idx + 1)
        } else {
            (self.conf(seg.dir.is_up()), None, seg.idx)
        };
        if conf.t3_follows_t1 && !first.map_or(false, |f| self.is_point(f)) {
            return Ok(());
        }
        let related = self.related(first);
        let next = segments.get(next_idx);
        if let Some(next) = next {
            self.retest_after(next, &conf, first, related)?;
        }
        if let Some(first) = first {
            self.retest_before(seg, next, next_idx, first, &conf, related)?;
        }
        Ok(())
    }

    /// Type 3a: the first line after leaving the next segment's first zone
    /// stays outside it.
    fn retest_after(
        &mut self,
        next: &Segment,
        conf: &PointConfig,
        first: Option<usize>,
        related: Option<usize>,
    ) -> Result<(), StructureError> {
        let lines = self.input.lines;
        let segments = self.input.segments;
        let Some(zone) = next.first_multi_zone(self.input.zones) else {
            return Ok(());
        };
        if conf.strict_t3 && zone.entering != Some(first.map_or(0, |f| f + 1)) {
            return Ok(());
        }
        let Some(exiting) = zone.exiting else {
            return Ok(());
        };
        let Some(t3) = lines.get(exiting + 1) else {
            return Ok(());
        };
        match segment_of(segments, t3.idx).and_then(|s| segments.get(s)) {
            None if next.idx + 1 != segments.len() => return Ok(()),
            Some(parent) if parent.idx != next.idx && parent.line_count() >= 3 => return Ok(()),
            _ => {}
        }
        if t3.dir == next.dir {
            return Ok(());
        }
        if self.parent(t3.idx) != next.idx && next.idx + 2 < segments.len() {
            return Ok(());
        }
        if returns_to(t3, zone) {
            return Ok(());
        }
        let clears_peak =
            (t3.is_down() && t3.high >= zone.peak_high) || (t3.is_up() && t3.low <= zone.peak_low);
        if conf.t3_must_break_peak && !clears_peak {
            return Ok(());
        }
        self.add(PointType::T3a, t3.idx, related, true, BTreeMap::new())
    }

    /// Type 3b: a later line after the type-1 point stays outside the
    /// segment's last zone.
    fn retest_before(
        &mut self,
        seg: &Segment,
        next: Option<&Segment>,
        next_idx: usize,
        first: usize,
        conf: &PointConfig,
        related: Option<usize>,
    ) -> Result<(), StructureError> {
        let lines = self.input.lines;
        let segments = self.input.segments;
        let Some(zone) = seg.last_multi_zone(self.input.zones) else {
            return Ok(());
        };
        if conf.strict_t3 && zone.exiting != Some(first) {
            return Ok(());
        }
        let end = self.retest_end(next);
        for line in lines.iter().skip(first + 2).step_by(2) {
            if end.map_or(false, |e| line.idx > e) {
                break;
            }
            let parent = self.parent(line.idx);
            if parent != next_idx && parent + 1 < segments.len() {
                break;
            }
            if returns_to(line, zone) {
                continue;
            }
            self.add(PointType::T3b, line.idx, related, true, BTreeMap::new())?;
            break;
        }
        Ok(())
    }

    /// Last line a type-3b point may sit on, `None` for no limit.
    fn retest_end(&self, next: Option<&Segment>) -> Option<usize> {
        let next = next?;
        let zones = self.input.zones;
        if next.multi_zone_count(zones) == 0 && next.idx + 1 >= self.input.segments.len() {
            return None;
        }
        let exit = next
            .zones
            .iter()
            .filter_map(|&i| zones.get(i))
            .filter(|z| !z.is_single_line())
            .find_map(|z| z.exiting);
        Some(exit.unwrap_or_else(|| next.end.saturating_sub(1)))
    }
}

/// Whether `line` reaches back into the zone band.
fn returns_to(line: &Line, zone: &PivotZone) -> bool {
    (line.is_down() && line.low < zone.high) || (line.is_up() && line.high > zone.low)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PivotConfig, SegmentConfig};
    use crate::line::testing::zigzag;
    use crate::pivot::build_zones;
    use crate::segment::testing::segment;
    use crate::segment::SegmentList;
    use chan_core::{Bar, RawBar, Timeframe};
    use chan_indicators::MacdPoint;

    struct Fixture {
        lines: Vec<Line>,
        segments: Vec<Segment>,
        zones: Vec<PivotZone>,
        bars: Vec<RawBar>,
        macd: Vec<MacdPoint>,
    }

    impl Fixture {
        /// Segments found by the segment builder.
        fn new(points: &[f64]) -> Self {
            let lines = zigzag(points);
            let mut list = SegmentList::new(SegmentConfig::default());
            list.update(&lines).unwrap();
            Self::build(lines, list.as_slice().to_vec())
        }

        /// Segments given as inclusive line ranges, each running the way its
        /// last line does.
        fn with_segments(points: &[f64], ranges: &[(usize, usize)]) -> Self {
            let lines = zigzag(points);
            let segments = ranges
                .iter()
                .enumerate()
                .map(|(i, &(begin, end))| segment(i, begin, end, lines[end].dir))
                .collect();
            Self::build(lines, segments)
        }

        fn build(lines: Vec<Line>, mut segments: Vec<Segment>) -> Self {
            let zones = build_zones(&lines, &segments, &PivotConfig::default());
            for zone in &zones {
                if let Some(seg) = zone.segment.and_then(|s| segments.get_mut(s)) {
                    seg.zones.push(zone.idx);
                }
            }
            let bars = (0..=lines.len() * 4)
                .map(|i| {
                    RawBar::from_bar(Bar::new(i as i64, 20.0, 21.0, 19.0, 20.0), i, Timeframe::Daily, false)
                        .unwrap()
                })
                .collect();
            Self {
                lines,
                segments,
                zones,
                bars,
                macd: Vec::new(),
            }
        }

        /// Histogram value `h` over the raw bars of `line`.
        fn histogram(&mut self, line: usize, h: f64) {
            self.macd.resize(self.bars.len(), MacdPoint::default());
            let l = self.lines[line];
            for point in &mut self.macd[l.first_bar..=l.last_bar] {
                point.histogram = h;
            }
        }

        fn classify(&self, level: LineLevel, config: &SignalConfig) -> Vec<Signal> {
            let input = SignalInput {
                level,
                lines: &self.lines,
                segments: &self.segments,
                zones: &self.zones,
                metric: MetricInput {
                    bars: &self.bars,
                    macd: &self.macd,
                    rsi: &[],
                },
            };
            classify(&input, config).unwrap()
        }
    }

    fn types_at(signals: &[Signal], line: usize) -> Vec<PointType> {
        signals
            .iter()
            .find(|s| s.line == line)
            .map(|s| s.types.clone())
            .unwrap_or_default()
    }

    fn permissive() -> SignalConfig {
        let mut config = SignalConfig::default();
        config.common.min_zone_count = Some(0);
        config.common.t1_must_be_peak = Some(false);
        config
    }

    const ZIGZAG: [f64; 16] = [
        10.0, 20.0, 15.0, 30.0, 22.0, 26.0, 12.0, 18.0, 14.0, 25.0, 20.0, 40.0, 30.0, 35.0, 28.0,
        32.0,
    ];

    /// A falling segment over lines 0..=4 with a zone at 21..25, left by
    /// line 4, then a rising segment over lines 5..=11:
    ///
    /// - 6 pulls back to 26, above the old zone
    /// - 6..=8 form a zone at 27..30 that line 9 leaves upwards
    /// - 8 pulls back again inside the range of 6
    /// - 10 retests from 31 and holds above 30
    const TURN: [f64; 13] = [
        30.0, 20.0, 26.0, 21.0, 25.0, 12.0, 32.0, 26.0, 30.0, 27.0, 31.0, 30.5, 45.0,
    ];
    const TURN_SEGMENTS: [(usize, usize); 2] = [(0, 4), (5, 11)];

    #[test]
    fn test_point_type_names() {
        assert_eq!(PointType::all().len(), 6);
        assert_eq!(PointType::T2s.to_string(), "2s");
        let parsed: PointType = serde_json::from_str("\"3b\"").unwrap();
        assert_eq!(parsed, PointType::T3b);
        assert_eq!(Side::Sell.to_string(), "sell");
    }

    #[test]
    fn test_first_type_at_segment_ends() {
        let fx = Fixture::new(&ZIGZAG);
        let signals = fx.classify(LineLevel::Stroke, &permissive());
        assert!(!signals.is_empty());
        for pair in signals.windows(2) {
            assert!(pair[0].line < pair[1].line);
        }
        let ends: Vec<usize> = fx.segments.iter().map(|s| s.end).collect();
        for signal in signals.iter().filter(|s| s.has_type(PointType::T1) || s.has_type(PointType::T1p)) {
            assert!(ends.contains(&signal.line));
            assert!(signal.features.contains_key("divergence_rate"));
            assert_eq!(signal.side, Side::of(&fx.lines[signal.line]));
        }
    }

    #[test]
    fn test_targets_filter() {
        let fx = Fixture::new(&ZIGZAG);
        let mut config = permissive();
        config.common.targets = Some(vec![]);
        assert!(fx.classify(LineLevel::Stroke, &config).is_empty());
    }

    #[test]
    fn test_second_type_follows_first() {
        let fx = Fixture::new(&ZIGZAG);
        let signals = fx.classify(LineLevel::Stroke, &permissive());
        for signal in signals.iter().filter(|s| s.has_type(PointType::T2)) {
            let t1 = signal.related_t1;
            assert!(t1.is_some());
            assert_eq!(t1.map(|l| l + 2), Some(signal.line));
            assert!(signals.iter().any(|s| Some(s.line) == t1));
        }
    }

    #[test]
    fn test_signals_in_final_segments_are_final() {
        let fx = Fixture::new(&ZIGZAG);
        let signals = fx.classify(LineLevel::Stroke, &permissive());
        for signal in &signals {
            let seg = segment_of(&fx.segments, signal.line).and_then(|s| fx.segments.get(s));
            assert_eq!(signal.is_final(), seg.map_or(false, Segment::is_final));
        }
    }

    #[test]
    fn test_turn_produces_every_type() {
        let fx = Fixture::with_segments(&TURN, &TURN_SEGMENTS);
        assert_eq!(fx.zones.len(), 2);
        assert_eq!((fx.zones[0].low, fx.zones[0].high), (21.0, 25.0));
        assert_eq!((fx.zones[1].low, fx.zones[1].high), (27.0, 30.0));

        let signals = fx.classify(LineLevel::Stroke, &SignalConfig::default());
        let lines: Vec<usize> = signals.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![4, 6, 8, 10, 11]);

        assert_eq!(types_at(&signals, 4), vec![PointType::T1]);
        assert_eq!(types_at(&signals, 6), vec![PointType::T2, PointType::T3b]);
        assert_eq!(types_at(&signals, 8), vec![PointType::T2s]);
        assert_eq!(types_at(&signals, 10), vec![PointType::T3a]);
        assert_eq!(types_at(&signals, 11), vec![PointType::T1p]);

        for signal in signals.iter().filter(|s| s.line != 4 && s.line != 11) {
            assert_eq!(signal.related_t1, Some(4));
        }
        assert_eq!(signals[0].side, Side::Buy);
        assert_eq!(signals[3].side, Side::Buy);
        assert_eq!(signals[4].side, Side::Sell);
    }

    #[test]
    fn test_chain_depth_limits_second_type() {
        let fx = Fixture::with_segments(&TURN, &TURN_SEGMENTS);
        let mut config = SignalConfig::default();
        config.buy.max_t2s_depth = Some(0);
        let signals = fx.classify(LineLevel::Stroke, &config);
        assert!(types_at(&signals, 8).is_empty());
        assert!(types_at(&signals, 6).contains(&PointType::T2));

        config.buy.max_t2s_depth = Some(1);
        let signals = fx.classify(LineLevel::Stroke, &config);
        assert_eq!(types_at(&signals, 8), vec![PointType::T2s]);
    }

    #[test]
    fn test_third_type_must_break_peak() {
        // line 10 starts at 31, below the 32 top of the zone's first member
        let fx = Fixture::with_segments(&TURN, &TURN_SEGMENTS);
        let mut config = SignalConfig::default();
        config.common.t3_must_break_peak = Some(true);
        let signals = fx.classify(LineLevel::Stroke, &config);
        assert!(types_at(&signals, 10).is_empty());
        assert!(types_at(&signals, 6).contains(&PointType::T3b));
    }

    #[test]
    fn test_strict_third_type_needs_adjacent_zone() {
        // lines 6..=8 do not overlap, so the rising segment's first zone is
        // 8..=10 and does not follow the break line 5
        let points = [
            30.0, 20.0, 26.0, 21.0, 25.0, 12.0, 32.0, 26.0, 38.0, 34.0, 37.0, 35.0, 45.0, 42.0, 50.0,
        ];
        let fx = Fixture::with_segments(&points, &[(0, 4), (5, 13)]);
        assert_eq!(fx.zones[1].entering, Some(7));

        let signals = fx.classify(LineLevel::Stroke, &SignalConfig::default());
        assert_eq!(types_at(&signals, 12), vec![PointType::T3a]);

        let mut config = SignalConfig::default();
        config.common.strict_t3 = Some(true);
        let signals = fx.classify(LineLevel::Stroke, &config);
        assert!(types_at(&signals, 12).is_empty());
        assert!(types_at(&signals, 6).contains(&PointType::T3b));
    }

    #[test]
    fn test_first_type_rejected_above_divergence_rate() {
        let mut fx = Fixture::with_segments(&TURN, &TURN_SEGMENTS);
        let mut config = SignalConfig::default();
        config.buy.divergence_rate = Some(0.9);

        // selling out of the zone is twice as strong as selling into it
        fx.histogram(0, -1.0);
        fx.histogram(4, -2.0);
        let signals = fx.classify(LineLevel::Stroke, &config);
        assert!(types_at(&signals, 4).is_empty());
        // the later points all wait for a type-1 point
        assert!(signals.iter().all(|s| s.side == Side::Sell));

        fx.histogram(4, -0.5);
        let signals = fx.classify(LineLevel::Stroke, &config);
        assert_eq!(types_at(&signals, 4), vec![PointType::T1]);
        let rate = signals[0].features["divergence_rate"];
        assert!((rate - 0.5).abs() < 1e-9);
    }
}
