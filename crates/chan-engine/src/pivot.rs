//! Pivot zones: price bands where consecutive lines keep overlapping.
//!
//! Zones are built segment by segment from the lines running against the
//! segment direction, then over the lines after the last segment. With
//! [`PivotAlgo::OverSegment`] every line takes part and a zone may cross a
//! segment border. The same builder runs on strokes and on segments.

use serde::Serialize;
use tracing::trace;

use chan_core::{Direction, StructureError};

use crate::combiner::has_overlap;
use crate::config::{PivotAlgo, PivotCombine, PivotConfig, PointConfig};
use crate::line::Line;
use crate::metric::MetricInput;
use crate::segment::{segment_of, Segment};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotZone {
    pub idx: usize,
    /// First member line
    pub begin: usize,
    /// Last member line
    pub end: usize,
    pub low: f64,
    pub high: f64,
    pub peak_low: f64,
    pub peak_high: f64,
    pub entering: Option<usize>,
    pub exiting: Option<usize>,
    /// Segment the zone lies in, `None` past the last segment
    pub segment: Option<usize>,
    pub begin_time: i64,
    pub end_time: i64,
    finalized: bool,
    /// Zones merged into this one, oldest first
    pub sub_zones: Vec<PivotZone>,
    /// Stroke zones covered by a segment-level zone
    pub nested: Vec<usize>,
}

impl PivotZone {
    fn new(members: &[&Line], lines: &[Line], segment: Option<usize>, finalized: bool) -> Option<Self> {
        let (first, last) = (members.first()?, members.last()?);
        let (low, high) = band(&lines[first.idx..=last.idx]);
        if high <= low || first.idx == 0 {
            return None;
        }
        let peak_high = members.iter().map(|l| l.high).fold(f64::NEG_INFINITY, f64::max);
        let peak_low = members.iter().map(|l| l.low).fold(f64::INFINITY, f64::min);
        Some(Self {
            idx: 0,
            begin: first.idx,
            end: last.idx,
            low,
            high,
            peak_low,
            peak_high,
            entering: Some(first.idx - 1),
            exiting: lines.get(last.idx + 1).map(|l| l.idx),
            segment,
            begin_time: first.begin_time,
            end_time: last.end_time,
            finalized,
            sub_zones: Vec::new(),
            nested: Vec::new(),
        })
    }

    pub fn is_final(&self) -> bool {
        self.finalized
    }

    pub fn is_single_line(&self) -> bool {
        self.begin == self.end
    }

    pub fn line_count(&self) -> usize {
        self.end - self.begin + 1
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.begin..=self.end).contains(&line)
    }

    fn try_extend(&mut self, line: &Line, lines: &[Line]) -> bool {
        if !has_overlap(self.low, self.high, line.low, line.high, false) {
            return false;
        }
        if self.is_single_line() {
            let (low, high) = band(&lines[self.begin..=line.idx]);
            self.low = low;
            self.high = high;
        }
        self.end = line.idx;
        self.end_time = line.end_time;
        self.exiting = lines.get(line.idx + 1).map(|l| l.idx);
        self.peak_high = self.peak_high.max(line.high);
        self.peak_low = self.peak_low.min(line.low);
        true
    }

    fn try_combine(&mut self, other: &PivotZone, mode: PivotCombine) -> bool {
        if other.is_single_line() || self.segment != other.segment {
            return false;
        }
        let joins = match mode {
            PivotCombine::None => false,
            PivotCombine::RangeOverlap => has_overlap(self.low, self.high, other.low, other.high, true),
            PivotCombine::MemberOverlap => {
                has_overlap(self.peak_low, self.peak_high, other.peak_low, other.peak_high, false)
            }
        };
        if !joins {
            return false;
        }
        if self.sub_zones.is_empty() {
            self.sub_zones.push(self.clone());
        }
        self.sub_zones.push(other.clone());
        self.low = self.low.min(other.low);
        self.high = self.high.max(other.high);
        self.peak_low = self.peak_low.min(other.peak_low);
        self.peak_high = self.peak_high.max(other.peak_high);
        self.end = other.end;
        self.end_time = other.end_time;
        self.exiting = other.exiting;
        true
    }

    /// Whether `line` leaves the zone beyond its band.
    pub fn broken_by(&self, line: &Line) -> bool {
        (line.is_down() && line.low < self.low) || (line.is_up() && line.high > self.high)
    }

    /// Whether the exiting line is the extreme of the members up to
    /// `end_idx`, with the smallest relative gap between a member end and the
    /// exiting end.
    pub fn exiting_is_peak(&self, lines: &[Line], end_idx: usize) -> (bool, Option<f64>) {
        let Some(out) = self.exiting.and_then(|i| lines.get(i)) else {
            return (false, None);
        };
        let mut closest = f64::INFINITY;
        for line in &lines[self.begin..=self.end] {
            if line.idx > end_idx {
                break;
            }
            if (out.is_down() && line.low < out.low) || (out.is_up() && line.high > out.high) {
                return (false, None);
            }
            let rate = (line.end_val - out.end_val).abs() / out.end_val;
            closest = closest.min(rate);
        }
        (true, Some(closest))
    }

    /// Momentum divergence between the entering line and `out`, with the
    /// out/in ratio.
    pub fn divergence(
        &self,
        lines: &[Line],
        input: &MetricInput<'_>,
        conf: &PointConfig,
        out: &Line,
        segment_level: bool,
    ) -> Result<(bool, Option<f64>), StructureError> {
        if !self.broken_by(out) {
            return Ok((false, None));
        }
        let Some(entering) = self.entering.and_then(|i| lines.get(i)) else {
            return Ok((false, None));
        };
        let in_metric = input.compute(conf.metric, entering, false, segment_level)?;
        let out_metric = input.compute(conf.metric, out, true, segment_level)?;
        let ratio = if in_metric == 0.0 {
            f64::INFINITY
        } else {
            out_metric / in_metric
        };
        if conf.divergence_rate > 100.0 {
            return Ok((true, Some(ratio)));
        }
        Ok((out_metric <= conf.divergence_rate * in_metric, Some(ratio)))
    }
}

/// Intersection of the ranges of `lines`.
fn band(lines: &[Line]) -> (f64, f64) {
    let low = lines.iter().map(|l| l.low).fold(f64::NEG_INFINITY, f64::max);
    let high = lines.iter().map(|l| l.high).fold(f64::INFINITY, f64::min);
    (low, high)
}

/// Lines one zone scan runs over.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub segment: Option<usize>,
    pub begin: usize,
    /// Exclusive
    pub end: usize,
    pub dir: Direction,
    pub finalized: bool,
}

/// Incremental zone construction over consecutive spans.
pub(crate) struct ZoneBuilder<'a> {
    config: &'a PivotConfig,
    lines: &'a [Line],
    zones: Vec<PivotZone>,
    free: Vec<&'a Line>,
}

impl<'a> ZoneBuilder<'a> {
    pub fn new(config: &'a PivotConfig, lines: &'a [Line]) -> Self {
        Self {
            config,
            lines,
            zones: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn scan(&mut self, span: Span) {
        self.free.clear();
        let lines = self.lines;
        let end = span.end.min(lines.len());
        if span.begin >= end {
            return;
        }
        let mut seen = false;
        for line in lines[span.begin..end].iter().filter(|l| l.dir != span.dir) {
            if !seen {
                // the first counter line never extends a zone of the previous segment
                self.add_free(line, span);
                seen = true;
            } else if self.free.is_empty() && self.extend_last(line) {
                self.combine();
            } else {
                self.add_free(line, span);
            }
        }
    }

    /// Scan every line once, carrying open lines across segment borders.
    ///
    /// A zone opens on three consecutive overlapping lines whose first runs
    /// against its segment, and grows by each following line that overlaps
    /// it.
    pub fn scan_across(&mut self, segments: &[Segment]) {
        self.free.clear();
        let lines = self.lines;
        for line in lines {
            let adjacent = self.zones.last().map_or(false, |z| z.end + 1 == line.idx);
            if self.free.is_empty() && adjacent && self.extend_last(line) {
                self.combine();
                continue;
            }
            self.free.push(line);
            if self.free.len() > 3 {
                self.free.remove(0);
            }
            self.open_across(segments);
        }
    }

    fn open_across(&mut self, segments: &[Segment]) {
        let [first, _, last] = self.free[..] else {
            return;
        };
        let parent = segment_of(segments, first.idx);
        let seg = parent.and_then(|s| segments.get(s));
        let against = match seg {
            Some(seg) => first.dir != seg.dir,
            // after the last segment the trend is the reverse of it
            None => segments.last().map_or(true, |l| first.dir == l.dir),
        };
        if !against {
            return;
        }
        let finalized = seg.map_or(false, Segment::is_final) && last.finalized;
        if let Some(zone) = PivotZone::new(&self.free, self.lines, parent, finalized) {
            trace!(begin = zone.begin, end = zone.end, low = zone.low, high = zone.high, "zone opened");
            self.zones.push(zone);
            self.free.clear();
            self.combine();
        }
    }

    fn extend_last(&mut self, line: &Line) -> bool {
        let lines = self.lines;
        self.zones
            .last_mut()
            .map_or(false, |z| z.try_extend(line, lines))
    }

    fn add_free(&mut self, line: &'a Line, span: Span) {
        if self.free.last().map_or(false, |l| l.idx == line.idx) {
            self.free.pop();
        }
        self.free.push(line);
        let members: &[&Line] = if self.config.single_stroke {
            &self.free
        } else if self.free.len() < 2 {
            return;
        } else {
            &self.free[self.free.len() - 2..]
        };
        if let Some(zone) = PivotZone::new(members, self.lines, span.segment, span.finalized) {
            trace!(begin = zone.begin, end = zone.end, low = zone.low, high = zone.high, "zone opened");
            self.zones.push(zone);
            self.free.clear();
            self.combine();
        }
    }

    fn combine(&mut self) {
        if self.config.combine == PivotCombine::None {
            return;
        }
        while self.zones.len() >= 2 {
            let n = self.zones.len();
            let (head, tail) = self.zones.split_at_mut(n - 1);
            if !head[n - 2].try_combine(&tail[0], self.config.combine) {
                break;
            }
            self.zones.pop();
        }
    }

    pub fn finish(self) -> Vec<PivotZone> {
        let mut zones = self.zones;
        for (i, zone) in zones.iter_mut().enumerate() {
            zone.idx = i;
        }
        zones
    }
}

/// Zones of one line level, given its segments.
pub fn build_zones(lines: &[Line], segments: &[Segment], config: &PivotConfig) -> Vec<PivotZone> {
    let mut builder = ZoneBuilder::new(config, lines);
    if config.algorithm == PivotAlgo::OverSegment {
        builder.scan_across(segments);
        return builder.finish();
    }
    for seg in segments {
        builder.scan(Span {
            segment: Some(seg.idx),
            begin: seg.begin,
            end: seg.end + 1,
            dir: seg.dir,
            finalized: seg.is_final(),
        });
    }
    if let Some(last) = segments.last() {
        builder.scan(Span {
            segment: None,
            begin: last.end + 1,
            end: lines.len(),
            dir: last.dir.reverse(),
            finalized: false,
        });
    }
    builder.finish()
}

/// Link each segment-level zone to the stroke zones inside the strokes it
/// covers.
pub fn nest_zones(segment_zones: &mut [PivotZone], segments: &[Segment], stroke_zones: &[PivotZone]) {
    for zone in segment_zones {
        let (Some(first), Some(last)) = (segments.get(zone.begin), segments.get(zone.end)) else {
            continue;
        };
        let (from, to) = (first.begin, last.end);
        zone.nested = stroke_zones
            .iter()
            .filter(|z| z.begin >= from && z.end <= to)
            .map(|z| z.idx)
            .collect();
    }
}
