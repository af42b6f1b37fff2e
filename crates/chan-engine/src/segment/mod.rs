//! Segment builder over strokes (or over segments for the next level up).

mod eigen;
mod legacy;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use chan_core::{Direction, StructureError};

use crate::config::{SegmentAlgorithm, SegmentConfig, TrailingPolicy};
use crate::line::{final_prefix, find_peak, Line};
use crate::pivot::PivotZone;
use crate::trend_line::{TrendLine, TrendSide};

use eigen::EigenFx;

/// What produced a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentReason {
    /// Confirmed by a characteristic-sequence fractal or a legacy rule
    Normal,
    /// Leading part split off before the first confirmed segment
    SplitFirst,
    /// First confirmed segment after a split
    SplitSecond,
    /// No segment yet: up to the highest line
    FirstHigh,
    /// No segment yet: down to the lowest line
    FirstLow,
    /// No segment yet: everything in one segment
    FirstAll,
    /// Trailing lines up to the highest line
    TrailingHigh,
    /// Trailing lines down to the lowest line
    TrailingLow,
    /// Trailing lines broke the last segment's extreme; up to the highest
    ForcedHigh,
    /// Trailing lines broke the last segment's extreme; down to the lowest
    ForcedLow,
    /// Remaining lines ending against the last segment's direction
    Remainder,
    /// Remaining lines, the last line left out
    RemainderTrimmed,
}

impl fmt::Display for SegmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::SplitFirst => "split_first",
            Self::SplitSecond => "split_second",
            Self::FirstHigh => "first_high",
            Self::FirstLow => "first_low",
            Self::FirstAll => "first_all",
            Self::TrailingHigh => "trailing_high",
            Self::TrailingLow => "trailing_low",
            Self::ForcedHigh => "forced_high",
            Self::ForcedLow => "forced_low",
            Self::Remainder => "remainder",
            Self::RemainderTrimmed => "remainder_trimmed",
        };
        f.write_str(s)
    }
}

/// A run of lines from `begin` to `end` (line indices, both included).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub idx: usize,
    pub begin: usize,
    pub end: usize,
    pub dir: Direction,
    /// Confirmed by its rule (not collected from trailing lines)
    sure: bool,
    finalized: bool,
    /// Everything consulted for it is final
    #[serde(skip)]
    settled: bool,
    pub reason: SegmentReason,
    /// Pivot zones starting inside the segment
    pub zones: Vec<usize>,
    pub support: Option<TrendLine>,
    pub resistance: Option<TrendLine>,
}

impl Segment {
    pub fn is_sure(&self) -> bool {
        self.sure
    }

    pub fn is_final(&self) -> bool {
        self.finalized
    }

    pub fn line_count(&self) -> usize {
        self.end - self.begin + 1
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.begin..=self.end).contains(&line)
    }

    pub fn first_multi_zone<'z>(&self, zones: &'z [PivotZone]) -> Option<&'z PivotZone> {
        self.zones
            .iter()
            .filter_map(|&i| zones.get(i))
            .find(|z| !z.is_single_line())
    }

    pub fn last_multi_zone<'z>(&self, zones: &'z [PivotZone]) -> Option<&'z PivotZone> {
        self.zones
            .iter()
            .rev()
            .filter_map(|&i| zones.get(i))
            .find(|z| !z.is_single_line())
    }

    pub fn multi_zone_count(&self, zones: &[PivotZone]) -> usize {
        self.zones
            .iter()
            .filter_map(|&i| zones.get(i))
            .filter(|z| !z.is_single_line())
            .count()
    }
}

/// Segment of `segments` containing line `line`.
pub fn segment_of(segments: &[Segment], line: usize) -> Option<usize> {
    let pos = segments.partition_point(|s| s.end < line);
    segments.get(pos).filter(|s| s.begin <= line).map(|s| s.idx)
}

/// Segments of one line level.
#[derive(Debug, Clone)]
pub struct SegmentList {
    config: SegmentConfig,
    segments: Vec<Segment>,
    /// Highest line index consulted since the last final segment
    horizon: usize,
    /// Finalized lines available during the current pass
    final_lines: usize,
}

impl SegmentList {
    pub fn new(config: SegmentConfig) -> Self {
        Self {
            config,
            segments: Vec::new(),
            horizon: 0,
            final_lines: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Segment> {
        self.segments.get(idx)
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Number of leading final segments.
    pub fn final_len(&self) -> usize {
        self.segments.iter().take_while(|s| s.finalized).count()
    }

    /// Segment containing line `line`.
    pub fn parent_of(&self, line: usize) -> Option<usize> {
        segment_of(&self.segments, line)
    }

    pub(crate) fn assign_zones(&mut self, zones: &[PivotZone]) {
        for seg in &mut self.segments {
            seg.zones.clear();
        }
        for zone in zones {
            if let Some(seg) = zone.segment.and_then(|s| self.segments.get_mut(s)) {
                seg.zones.push(zone.idx);
            }
        }
    }

    /// Re-derive every non-final segment from `lines`.
    pub fn update(&mut self, lines: &[Line]) -> Result<(), StructureError> {
        self.final_lines = final_prefix(lines);
        match self.config.algorithm {
            SegmentAlgorithm::Chan => {
                self.segments.retain(|s| s.finalized);
                let begin = self.segments.last().map_or(0, |s| s.end + 1);
                self.horizon = begin;
                self.scan(lines, begin)?;
            }
            SegmentAlgorithm::Break => {
                self.segments.clear();
                legacy::scan_break(self, lines)?;
            }
            SegmentAlgorithm::OnePlusOne => {
                self.segments.clear();
                legacy::scan_one_plus_one(self, lines)?;
            }
        }
        self.collect_trailing(lines)?;
        self.settle(lines);
        Ok(())
    }

    /// Seal the prefix up to the last settled segment and fit trend lines.
    fn settle(&mut self, lines: &[Line]) {
        if let Some(last) = self.segments.iter().rposition(|s| s.settled) {
            for seg in &mut self.segments[..=last] {
                if !seg.finalized {
                    seg.finalized = true;
                    debug!(idx = seg.idx, dir = %seg.dir, begin = seg.begin, end = seg.end, "segment final");
                }
            }
        }
        for seg in self.segments.iter_mut().filter(|s| s.support.is_none()) {
            if seg.line_count() >= 3 {
                let members = &lines[seg.begin..=seg.end];
                seg.support = TrendLine::fit(members, TrendSide::Inside);
                seg.resistance = TrendLine::fit(members, TrendSide::Outside);
            }
        }
    }

    fn consult(&mut self, idx: usize) {
        self.horizon = self.horizon.max(idx);
    }

    /// Confirm segments with characteristic-sequence fractals from `begin`.
    fn scan(&mut self, lines: &[Line], mut begin: usize) -> Result<(), StructureError> {
        loop {
            let mut up = EigenFx::new(Direction::Up, true);
            let mut down = EigenFx::new(Direction::Down, true);
            let mut last_dir = self.segments.last().map(|s| s.dir);
            let mut resolved = None;

            for line in lines.iter().skip(begin) {
                self.consult(line.idx);
                let mut hit = None;
                if line.is_down() && last_dir != Some(Direction::Up) {
                    if up.add(lines, line.idx)? {
                        hit = Some(Direction::Up);
                    }
                } else if line.is_up() && last_dir != Some(Direction::Down) {
                    if down.add(lines, line.idx)? {
                        hit = Some(Direction::Down);
                    }
                }
                if self.segments.is_empty() {
                    // first direction goes to whichever side builds a second element
                    if up.has_second() && line.is_down() {
                        last_dir = Some(Direction::Down);
                        down.clear();
                    } else if down.has_second() && line.is_up() {
                        up.clear();
                        last_dir = Some(Direction::Up);
                    }
                    if !up.has_second() && last_dir == Some(Direction::Down) && line.is_down() {
                        last_dir = None;
                    } else if !down.has_second() && last_dir == Some(Direction::Up) && line.is_up()
                    {
                        last_dir = None;
                    }
                }
                if let Some(dir) = hit {
                    resolved = Some(if dir.is_up() { up } else { down });
                    break;
                }
            }

            let Some(mut eigen) = resolved else {
                return Ok(());
            };
            let verdict = eigen.can_be_end(lines)?;
            self.consult(eigen.horizon());
            let end = eigen.peak_line(lines);
            match (verdict, end) {
                (Some(false), _) | (_, None) => {
                    let Some(&restart) = eigen.members().get(1) else {
                        return Ok(());
                    };
                    begin = restart;
                }
                (verdict, Some(end)) => {
                    let sure = verdict.is_some();
                    if !self.add(lines, end, sure, None, true, SegmentReason::Normal)? {
                        begin = end + 1;
                        continue;
                    }
                    if !sure {
                        return Ok(());
                    }
                    begin = end + 1;
                }
            }
        }
    }

    /// Append a segment from after the last one to line `end`.
    ///
    /// Returns false when the very first segment contradicts its values; the
    /// caller then moves on.
    fn add(
        &mut self,
        lines: &[Line],
        end: usize,
        sure: bool,
        dir: Option<Direction>,
        split_first: bool,
        reason: SegmentReason,
    ) -> Result<bool, StructureError> {
        if self.segments.is_empty() && split_first && end >= 3 {
            let is_high = lines[end].is_down();
            let earlier: Vec<Line> = lines[..=end - 3].iter().rev().copied().collect();
            if let Some(peak) = find_peak(&earlier, lines, is_high) {
                let p = &lines[peak];
                let beyond_start = match p.dir {
                    Direction::Down => p.low < lines[0].low || peak == 0,
                    Direction::Up => p.high > lines[0].high || peak == 0,
                };
                if beyond_start {
                    self.add(lines, peak, false, Some(p.dir), true, SegmentReason::SplitFirst)?;
                    self.add(lines, end, false, None, true, SegmentReason::SplitSecond)?;
                    return Ok(true);
                }
            }
        }

        let begin = self.segments.last().map_or(0, |s| s.end + 1);
        if end < begin || end >= lines.len() {
            return Err(StructureError::SegmentLength { begin, end });
        }
        let first = &lines[begin];
        let last = &lines[end];
        let dir = dir.unwrap_or(last.dir);
        let sure = sure && end >= begin + 2;
        if sure {
            let inverted = match dir {
                Direction::Down => first.begin_val < last.end_val,
                Direction::Up => first.begin_val > last.end_val,
            };
            if inverted {
                if self.segments.is_empty() {
                    return Ok(false);
                }
                return Err(StructureError::SegmentEndValue { begin, end });
            }
            if begin > 0 && first.dir != last.dir {
                return Err(StructureError::SegmentDirection { begin, end });
            }
        }
        let idx = self.segments.len();
        let settled = sure && self.horizon < self.final_lines;
        debug!(idx, dir = %dir, begin, end, sure, %reason, "segment added");
        self.segments.push(Segment {
            idx,
            begin,
            end,
            dir,
            sure,
            finalized: false,
            settled,
            reason,
            zones: Vec::new(),
            support: None,
            resistance: None,
        });
        Ok(true)
    }

    /// Fold the lines after the last segment into provisional segments.
    fn collect_trailing(&mut self, lines: &[Line]) -> Result<(), StructureError> {
        if self.segments.is_empty() {
            self.collect_first(lines)
        } else {
            self.collect_after(lines)
        }
    }

    fn collect_first(&mut self, lines: &[Line]) -> Result<(), StructureError> {
        if lines.len() < 3 {
            return Ok(());
        }
        let start = lines[0].begin_val;
        match self.config.trailing {
            TrailingPolicy::Peak => {
                let high = lines.iter().map(|l| l.high).fold(f64::NEG_INFINITY, f64::max);
                let low = lines.iter().map(|l| l.low).fold(f64::INFINITY, f64::min);
                let up = (high - start).abs() >= (low - start).abs();
                if let Some(peak) = find_peak(lines, lines, up) {
                    let (dir, reason) = if up {
                        (Direction::Up, SegmentReason::FirstHigh)
                    } else {
                        (Direction::Down, SegmentReason::FirstLow)
                    };
                    self.add(lines, peak, false, Some(dir), false, reason)?;
                }
                self.collect_remainder(lines)
            }
            TrailingPolicy::All => {
                let Some(last) = lines.last() else {
                    return Ok(());
                };
                let dir = if last.end_val >= start {
                    Direction::Up
                } else {
                    Direction::Down
                };
                self.add(lines, last.idx, false, Some(dir), false, SegmentReason::FirstAll)?;
                Ok(())
            }
        }
    }

    fn collect_after(&mut self, lines: &[Line]) -> Result<(), StructureError> {
        let (Some(last_line), Some(seg)) = (lines.last(), self.segments.last()) else {
            return Ok(());
        };
        let seg_end = &lines[seg.end];
        if last_line.idx < seg_end.idx + 3 {
            return Ok(());
        }
        let tail = &lines[seg_end.idx + 3..];
        if seg_end.is_down() && last_line.end_val <= seg_end.end_val {
            if let Some(peak) = find_peak(tail, lines, true) {
                self.add(lines, peak, false, Some(Direction::Up), true, SegmentReason::ForcedHigh)?;
                return self.collect_trailing(lines);
            }
            Ok(())
        } else if seg_end.is_up() && last_line.end_val >= seg_end.end_val {
            if let Some(peak) = find_peak(tail, lines, false) {
                self.add(lines, peak, false, Some(Direction::Down), true, SegmentReason::ForcedLow)?;
                return self.collect_trailing(lines);
            }
            Ok(())
        } else {
            match self.config.trailing {
                TrailingPolicy::All => self.collect_remainder(lines),
                TrailingPolicy::Peak => {
                    let up = seg_end.is_down();
                    if let Some(peak) = find_peak(tail, lines, up) {
                        if peak >= seg_end.idx + 3 {
                            let (dir, reason) = if up {
                                (Direction::Up, SegmentReason::TrailingHigh)
                            } else {
                                (Direction::Down, SegmentReason::TrailingLow)
                            };
                            self.add(lines, peak, false, Some(dir), true, reason)?;
                        }
                    }
                    self.collect_remainder(lines)
                }
            }
        }
    }

    fn collect_remainder(&mut self, lines: &[Line]) -> Result<(), StructureError> {
        let (Some(last_line), Some(seg)) = (lines.last(), self.segments.last()) else {
            return Ok(());
        };
        if seg.end + 1 >= lines.len() {
            return Ok(());
        }
        if lines[seg.end].dir == last_line.dir {
            self.add(lines, last_line.idx - 1, false, None, true, SegmentReason::RemainderTrimmed)?;
        } else {
            self.add(lines, last_line.idx, false, None, true, SegmentReason::Remainder)?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A final, confirmed segment over lines `begin..=end`.
    pub fn segment(idx: usize, begin: usize, end: usize, dir: Direction) -> Segment {
        Segment {
            idx,
            begin,
            end,
            dir,
            sure: true,
            finalized: true,
            settled: true,
            reason: SegmentReason::Normal,
            zones: Vec::new(),
            support: None,
            resistance: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::testing::zigzag;

    fn build(points: &[f64], config: SegmentConfig) -> SegmentList {
        let lines = zigzag(points);
        let mut list = SegmentList::new(config);
        list.update(&lines).unwrap();
        list
    }

    /// Up to 30, down to 12, up to 40, plus a tail.
    fn three_legs() -> Vec<f64> {
        vec![
            10.0, 20.0, 15.0, 30.0, 22.0, 26.0, 12.0, 18.0, 14.0, 25.0, 20.0, 40.0, 30.0, 35.0,
            28.0, 32.0,
        ]
    }

    #[test]
    fn test_first_segment_confirmed_by_fractal() {
        let list = build(&three_legs(), SegmentConfig::default());
        let first = list.get(0).unwrap();
        assert_eq!((first.begin, first.end), (0, 2));
        assert_eq!(first.dir, Direction::Up);
        assert!(first.is_sure());
        assert!(first.is_final());
        assert_eq!(first.reason, SegmentReason::Normal);
    }

    #[test]
    fn test_segments_chain_and_cover_lines() {
        let points = three_legs();
        let lines = zigzag(&points);
        let list = build(&points, SegmentConfig::default());
        assert!(list.len() >= 2);
        for pair in list.as_slice().windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].begin);
        }
        assert!(list.last().unwrap().end < lines.len());
        assert_eq!(list.parent_of(1), Some(0));
        assert_eq!(list.parent_of(lines.len() + 5), None);
    }

    #[test]
    fn test_provisional_lines_keep_segments_open() {
        let points = three_legs();
        let mut lines = zigzag(&points);
        for line in lines.iter_mut().skip(4) {
            line.finalized = false;
        }
        let mut list = SegmentList::new(SegmentConfig::default());
        list.update(&lines).unwrap();
        assert!(list.get(0).unwrap().is_sure());
        // the fractal of segment 0 was confirmed by line 5
        assert!(!list.get(0).unwrap().is_final());
        assert_eq!(list.final_len(), 0);

        for line in lines.iter_mut() {
            line.finalized = true;
        }
        list.update(&lines).unwrap();
        assert!(list.get(0).unwrap().is_final());
    }

    #[test]
    fn test_update_is_idempotent() {
        let lines = zigzag(&three_legs());
        let mut list = SegmentList::new(SegmentConfig::default());
        list.update(&lines).unwrap();
        let before = list.as_slice().to_vec();
        list.update(&lines).unwrap();
        assert_eq!(list.as_slice(), &before[..]);
    }

    #[test]
    fn test_short_input_collects_nothing() {
        let list = build(&[10.0, 20.0, 15.0], SegmentConfig::default());
        assert!(list.is_empty());
    }

    #[test]
    fn test_collect_all_without_fractal() {
        let config = SegmentConfig {
            trailing: TrailingPolicy::All,
            ..SegmentConfig::default()
        };
        let list = build(&[10.0, 20.0, 15.0, 25.0, 20.0], config);
        assert_eq!(list.len(), 1);
        let seg = list.get(0).unwrap();
        assert_eq!(seg.reason, SegmentReason::FirstAll);
        assert_eq!((seg.begin, seg.end), (0, 3));
        assert_eq!(seg.dir, Direction::Up);
        assert!(!seg.is_final());
    }

    #[test]
    fn test_trend_lines_fitted() {
        let list = build(&three_legs(), SegmentConfig::default());
        let first = list.get(0).unwrap();
        assert_eq!(first.line_count(), 3);
        assert!(first.support.is_some() || first.resistance.is_some());
    }
}
