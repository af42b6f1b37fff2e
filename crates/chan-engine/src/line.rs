//! Uniform read-only view over strokes and segments.
//!
//! Segment, pivot and signal builders run unchanged on strokes and on
//! segments. They consume [`Line`] values, which carry the derived prices and
//! bar positions of one stroke or segment. Views are rebuilt from the first
//! changed index whenever endpoints move.

use serde::Serialize;

use chan_core::{Direction, RawBar};

use crate::combiner::Extent;
use crate::merged::MergedBars;
use crate::segment::Segment;
use crate::stroke::Stroke;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Line {
    pub idx: usize,
    pub dir: Direction,
    pub finalized: bool,
    pub begin_val: f64,
    pub end_val: f64,
    pub high: f64,
    pub low: f64,
    /// Raw bar of the starting extreme
    pub begin_bar: usize,
    /// Raw bar of the reached extreme
    pub end_bar: usize,
    /// First raw bar of the merged bars covered
    pub first_bar: usize,
    /// Last raw bar of the merged bars covered
    pub last_bar: usize,
    pub begin_time: i64,
    pub end_time: i64,
}

impl Line {
    pub fn from_stroke(stroke: &Stroke, merged: &MergedBars, bars: &[RawBar]) -> Self {
        let begin = &merged[stroke.begin];
        let end = &merged[stroke.end()];
        let (high, low) = match stroke.dir {
            Direction::Up => (end.high(), begin.low()),
            Direction::Down => (begin.high(), end.low()),
        };
        let begin_bar = stroke.begin_bar(merged, bars);
        let end_bar = stroke.end_bar(merged, bars);
        Self {
            idx: stroke.idx,
            dir: stroke.dir,
            finalized: stroke.is_final(),
            begin_val: stroke.begin_val(merged),
            end_val: stroke.end_val(merged),
            high,
            low,
            begin_bar,
            end_bar,
            first_bar: begin.first_bar(),
            last_bar: end.last_bar(),
            begin_time: bars[begin_bar].timestamp,
            end_time: bars[end_bar].timestamp,
        }
    }

    /// View of a segment built over `lines`.
    pub fn from_segment(segment: &Segment, lines: &[Line], bars: &[RawBar]) -> Self {
        let first = &lines[segment.begin];
        let last = &lines[segment.end];
        let begin = &bars[first.begin_bar];
        let end = &bars[last.end_bar];
        let (high, low) = match segment.dir {
            Direction::Up => (end.high, begin.low),
            Direction::Down => (begin.high, end.low),
        };
        Self {
            idx: segment.idx,
            dir: segment.dir,
            finalized: segment.is_final(),
            begin_val: first.begin_val,
            end_val: last.end_val,
            high,
            low,
            begin_bar: first.begin_bar,
            end_bar: last.end_bar,
            first_bar: first.first_bar,
            last_bar: last.last_bar,
            begin_time: first.begin_time,
            end_time: last.end_time,
        }
    }

    #[inline]
    pub fn is_up(&self) -> bool {
        self.dir.is_up()
    }

    #[inline]
    pub fn is_down(&self) -> bool {
        self.dir.is_down()
    }

    /// Absolute price move.
    pub fn amp(&self) -> f64 {
        (self.end_val - self.begin_val).abs()
    }

    /// Raw bars between the two extremes, both included.
    pub fn bar_count(&self) -> usize {
        self.end_bar.saturating_sub(self.begin_bar) + 1
    }

    /// Inclusion-merge extent of the line as a characteristic-sequence member.
    pub(crate) fn extent(&self) -> Extent {
        Extent {
            high: self.high,
            low: self.low,
            time_begin: self.begin_time,
            time_end: self.end_time,
        }
    }
}

/// Number of leading finalized lines.
pub fn final_prefix(lines: &[Line]) -> usize {
    lines.iter().take_while(|l| l.finalized).count()
}

/// Line whose span covers `timestamp`, by the time of its extremes.
pub fn line_at(lines: &[Line], timestamp: i64) -> Option<&Line> {
    let pos = lines.partition_point(|l| l.end_time < timestamp);
    lines.get(pos).filter(|l| l.begin_time <= timestamp)
}

/// Extreme line of `dir` in `lines`, skipping lines outdone by the
/// same-direction line two back.
pub(crate) fn find_peak(lines: &[Line], all: &[Line], is_high: bool) -> Option<usize> {
    let mut peak_val = if is_high {
        f64::NEG_INFINITY
    } else {
        f64::INFINITY
    };
    let mut peak = None;
    for line in lines {
        let candidate = if is_high {
            line.is_up() && line.end_val >= peak_val
        } else {
            line.is_down() && line.end_val <= peak_val
        };
        if !candidate {
            continue;
        }
        if let Some(back) = line.idx.checked_sub(2).and_then(|i| all.get(i)) {
            let outdone = if is_high {
                back.end_val > line.end_val
            } else {
                back.end_val < line.end_val
            };
            if outdone {
                continue;
            }
        }
        peak_val = line.end_val;
        peak = Some(line.idx);
    }
    peak
}
