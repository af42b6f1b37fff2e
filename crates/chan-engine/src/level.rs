//! Per-timeframe pipeline: bars, merged bars, strokes, segments, zones and
//! signals of one level.

use tracing::trace;

use chan_core::{Bar, ChanError, ChanResult, RawBar, StreamingIndicator, Timeframe};
use chan_indicators::{Macd, MacdPoint, Rsi};

use crate::config::{ChanConfig, LineLevel};
use crate::line::{line_at, Line};
use crate::merged::{MergeStep, MergedBar, MergedBars};
use crate::metric::MetricInput;
use crate::pivot::{build_zones, nest_zones, PivotZone};
use crate::segment::{Segment, SegmentList};
use crate::signal::{classify, Signal, SignalInput};
use crate::stroke::{Stroke, StrokeList};

/// Complete structure of one timeframe.
///
/// Bars are absorbed one at a time by [`Level::push_bar`], which keeps merged
/// bars and confirmed strokes current. Everything above strokes is derived by
/// [`Level::recompute`].
#[derive(Debug, Clone)]
pub struct Level {
    timeframe: Timeframe,
    config: ChanConfig,
    bars: Vec<RawBar>,
    macd: Macd,
    rsi: Rsi,
    macd_values: Vec<MacdPoint>,
    rsi_values: Vec<f64>,
    merged: MergedBars,
    strokes: StrokeList,
    stroke_lines: Vec<Line>,
    segments: SegmentList,
    segment_lines: Vec<Line>,
    meta_segments: SegmentList,
    stroke_zones: Vec<PivotZone>,
    segment_zones: Vec<PivotZone>,
    stroke_signals: Vec<Signal>,
    segment_signals: Vec<Signal>,
    /// Bar of the coarser level each bar belongs to
    parents: Vec<Option<usize>>,
    /// Bars of the finer level under each bar
    children: Vec<Vec<usize>>,
    dirty: bool,
}

impl Level {
    pub fn new(timeframe: Timeframe, config: &ChanConfig) -> Self {
        let m = &config.metric;
        Self {
            timeframe,
            config: config.clone(),
            bars: Vec::new(),
            macd: Macd::with_periods(m.macd_fast, m.macd_slow, m.macd_signal),
            rsi: Rsi::new(m.rsi_period),
            macd_values: Vec::new(),
            rsi_values: Vec::new(),
            merged: MergedBars::new(),
            strokes: StrokeList::new(config.stroke),
            stroke_lines: Vec::new(),
            segments: SegmentList::new(config.segment),
            segment_lines: Vec::new(),
            meta_segments: SegmentList::new(config.segment),
            stroke_zones: Vec::new(),
            segment_zones: Vec::new(),
            stroke_signals: Vec::new(),
            segment_signals: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            dirty: false,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Validate and absorb the next bar; returns its index.
    pub fn push_bar(&mut self, bar: Bar) -> ChanResult<usize> {
        if let Some(prev) = self.bars.last() {
            if bar.timestamp <= prev.timestamp {
                return Err(ChanError::NonMonotonicTime {
                    timeframe: self.timeframe,
                    previous: prev.timestamp,
                    current: bar.timestamp,
                });
            }
        }
        let idx = self.bars.len();
        let raw = RawBar::from_bar(bar, idx, self.timeframe, self.config.bar.auto_clamp)?;
        self.macd_values
            .push(self.macd.update(raw.close).unwrap_or_default());
        self.rsi_values.push(self.rsi.update(raw.close).unwrap_or(50.0));
        self.bars.push(raw);
        self.parents.push(None);
        self.children.push(Vec::new());

        if self.merged.push(&raw)? == MergeStep::Opened && self.merged.len() >= 3 {
            let sealed = self.merged.len() - 2;
            self.strokes.update(&self.merged, &self.bars, sealed)?;
        }
        self.dirty = true;
        Ok(idx)
    }

    pub(crate) fn link_parent(&mut self, bar: usize, parent: usize) {
        if let Some(slot) = self.parents.get_mut(bar) {
            *slot = Some(parent);
        }
    }

    pub(crate) fn link_child(&mut self, bar: usize, child: usize) {
        if let Some(children) = self.children.get_mut(bar) {
            children.push(child);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rebuild everything above confirmed strokes. No-op when no bar arrived
    /// since the last call.
    pub fn recompute(&mut self) -> ChanResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(tail) = self.merged.len().checked_sub(1) {
            self.strokes
                .try_add_virtual(&self.merged, &self.bars, tail, true)?;
        }
        self.sync_stroke_lines();

        self.segments.update(&self.stroke_lines)?;
        self.segment_lines = self
            .segments
            .iter()
            .map(|s| Line::from_segment(s, &self.stroke_lines, &self.bars))
            .collect();
        self.meta_segments.update(&self.segment_lines)?;

        let pivot = &self.config.pivot;
        self.stroke_zones = build_zones(&self.stroke_lines, self.segments.as_slice(), pivot);
        self.segments.assign_zones(&self.stroke_zones);
        self.segment_zones = build_zones(&self.segment_lines, self.meta_segments.as_slice(), pivot);
        nest_zones(&mut self.segment_zones, self.segments.as_slice(), &self.stroke_zones);
        self.meta_segments.assign_zones(&self.segment_zones);

        let metric = MetricInput {
            bars: &self.bars,
            macd: &self.macd_values,
            rsi: &self.rsi_values,
        };
        self.stroke_signals = classify(
            &SignalInput {
                level: LineLevel::Stroke,
                lines: &self.stroke_lines,
                segments: self.segments.as_slice(),
                zones: &self.stroke_zones,
                metric,
            },
            &self.config.signal,
        )?;
        self.segment_signals = classify(
            &SignalInput {
                level: LineLevel::Segment,
                lines: &self.segment_lines,
                segments: self.meta_segments.as_slice(),
                zones: &self.segment_zones,
                metric,
            },
            &self.config.signal,
        )?;
        self.link_strokes();
        self.dirty = false;

        trace!(
            timeframe = %self.timeframe,
            bars = self.bars.len(),
            strokes = self.strokes.len(),
            segments = self.segments.len(),
            zones = self.stroke_zones.len(),
            signals = self.stroke_signals.len(),
            "level recomputed"
        );
        Ok(())
    }

    fn sync_stroke_lines(&mut self) {
        let Some(from) = self.strokes.take_changed_from() else {
            return;
        };
        self.stroke_lines.truncate(from);
        for stroke in self.strokes.iter().skip(from) {
            self.stroke_lines
                .push(Line::from_stroke(stroke, &self.merged, &self.bars));
        }
    }

    fn link_strokes(&mut self) {
        for idx in 0..self.strokes.len() {
            let segment = self.segments.parent_of(idx);
            let signal = self
                .stroke_signals
                .binary_search_by_key(&idx, |s| s.line)
                .ok();
            if let Some(stroke) = self.strokes.get_mut(idx) {
                stroke.segment = segment;
                stroke.signal = signal;
            }
        }
    }

    pub fn bars(&self) -> &[RawBar] {
        &self.bars
    }

    pub fn macd(&self) -> &[MacdPoint] {
        &self.macd_values
    }

    pub fn merged(&self) -> &MergedBars {
        &self.merged
    }

    pub fn strokes(&self) -> &[Stroke] {
        self.strokes.as_slice()
    }

    pub fn stroke_lines(&self) -> &[Line] {
        &self.stroke_lines
    }

    pub fn segments(&self) -> &[Segment] {
        self.segments.as_slice()
    }

    pub fn segment_lines(&self) -> &[Line] {
        &self.segment_lines
    }

    /// Segments built over segments.
    pub fn meta_segments(&self) -> &[Segment] {
        self.meta_segments.as_slice()
    }

    pub fn stroke_zones(&self) -> &[PivotZone] {
        &self.stroke_zones
    }

    pub fn segment_zones(&self) -> &[PivotZone] {
        &self.segment_zones
    }

    pub fn stroke_signals(&self) -> &[Signal] {
        &self.stroke_signals
    }

    pub fn segment_signals(&self) -> &[Signal] {
        &self.segment_signals
    }

    /// Coarser-level bar that `bar` was attached to.
    pub fn parent_of(&self, bar: usize) -> Option<usize> {
        self.parents.get(bar).copied().flatten()
    }

    /// Finer-level bars attached to `bar`.
    pub fn children_of(&self, bar: usize) -> &[usize] {
        self.children.get(bar).map_or(&[], Vec::as_slice)
    }

    pub fn bar_at(&self, timestamp: i64) -> Option<&RawBar> {
        self.bars
            .binary_search_by_key(&timestamp, |b| b.timestamp)
            .ok()
            .map(|i| &self.bars[i])
    }

    pub fn merged_at(&self, timestamp: i64) -> Option<&MergedBar> {
        self.merged.at_time(timestamp)
    }

    pub fn stroke_at(&self, timestamp: i64) -> Option<&Stroke> {
        line_at(&self.stroke_lines, timestamp).and_then(|l| self.strokes.get(l.idx))
    }

    pub fn segment_at(&self, timestamp: i64) -> Option<&Segment> {
        line_at(&self.segment_lines, timestamp).and_then(|l| self.segments.get(l.idx))
    }

    pub fn zone_at(&self, timestamp: i64) -> Option<&PivotZone> {
        self.stroke_zones
            .iter()
            .find(|z| z.begin_time <= timestamp && timestamp <= z.end_time)
    }

    pub fn signal_at(&self, timestamp: i64) -> Option<&Signal> {
        self.stroke_signals.iter().find(|s| s.timestamp == timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bars tracing a zigzag through `points`, `step` bars per leg.
    fn zigzag_bars(points: &[f64], step: usize) -> Vec<Bar> {
        let mut bars = Vec::new();
        let mut ts = 0;
        for w in points.windows(2) {
            for i in 0..step {
                let mid = w[0] + (w[1] - w[0]) * i as f64 / step as f64;
                bars.push(Bar::new(ts, mid, mid + 0.5, mid - 0.5, mid));
                ts += 60_000;
            }
        }
        bars
    }

    fn level_with(bars: Vec<Bar>) -> Level {
        let mut level = Level::new(Timeframe::Minute1, &ChanConfig::default());
        for bar in bars {
            level.push_bar(bar).unwrap();
        }
        level.recompute().unwrap();
        level
    }

    #[test]
    fn test_strokes_alternate_and_chain() {
        let level = level_with(zigzag_bars(&[10.0, 20.0, 12.0, 22.0, 14.0, 24.0, 16.0], 6));
        let strokes = level.strokes();
        assert!(strokes.len() >= 4);
        for pair in strokes.windows(2) {
            assert_ne!(pair[0].dir, pair[1].dir);
            assert_eq!(pair[0].end(), pair[1].begin);
        }
        assert_eq!(level.stroke_lines().len(), strokes.len());
        // only the tail can still move
        assert!(strokes[..strokes.len() - 2].iter().all(Stroke::is_final));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut level = level_with(zigzag_bars(&[10.0, 20.0, 12.0, 22.0, 14.0, 24.0, 16.0], 6));
        let strokes = level.strokes().to_vec();
        let lines = level.stroke_lines().to_vec();
        let zones = level.stroke_zones().to_vec();
        level.dirty = true;
        level.recompute().unwrap();
        assert_eq!(level.strokes(), &strokes[..]);
        assert_eq!(level.stroke_lines(), &lines[..]);
        assert_eq!(level.stroke_zones(), &zones[..]);
    }

    #[test]
    fn test_rejects_repeated_timestamp() {
        let mut level = Level::new(Timeframe::Daily, &ChanConfig::default());
        level.push_bar(Bar::new(10, 1.0, 2.0, 0.5, 1.5)).unwrap();
        let err = level.push_bar(Bar::new(10, 1.0, 2.0, 0.5, 1.5)).unwrap_err();
        assert!(matches!(err, ChanError::NonMonotonicTime { previous: 10, current: 10, .. }));
        assert_eq!(level.bars().len(), 1);
    }

    #[test]
    fn test_invalid_bar_rejected() {
        let mut level = Level::new(Timeframe::Daily, &ChanConfig::default());
        let err = level.push_bar(Bar::new(1, 11.0, 10.0, 12.0, 11.0)).unwrap_err();
        assert!(matches!(err, ChanError::InvalidBar { .. }));
        assert!(level.bars().is_empty());
    }

    #[test]
    fn test_time_queries() {
        let level = level_with(zigzag_bars(&[10.0, 20.0, 12.0, 22.0, 14.0], 6));
        let bar = level.bar_at(120_000).unwrap();
        assert_eq!(bar.idx, 2);
        assert!(level.bar_at(120_001).is_none());
        assert!(level.merged_at(120_000).is_some());
        let first = &level.stroke_lines()[0];
        let stroke = level.stroke_at(first.begin_time).unwrap();
        assert_eq!(stroke.idx, 0);
    }

    #[test]
    fn test_strokes_link_back_to_segments() {
        let level = level_with(zigzag_bars(
            &[10.0, 20.0, 15.0, 30.0, 22.0, 26.0, 12.0, 18.0, 14.0, 25.0, 20.0, 40.0, 30.0, 35.0],
            6,
        ));
        for stroke in level.strokes() {
            assert_eq!(
                stroke.segment,
                level.segments().iter().find(|s| s.contains(stroke.idx)).map(|s| s.idx)
            );
        }
    }
}
