//! Simpler segment rules kept for comparison with older charts.
//!
//! Both rebuild every segment on each pass.

use chan_core::StructureError;

use crate::line::Line;

use super::{SegmentList, SegmentReason};

/// A segment ends where a line against it breaks the line two before; the
/// extreme line up to there is the end.
pub(super) fn scan_break(list: &mut SegmentList, lines: &[Line]) -> Result<(), StructureError> {
    list.horizon = 0;
    let mut peak: Option<usize> = None;
    for line in lines.iter().skip(2) {
        list.consult(line.idx);
        if let Some(p) = peak.map(|p| &lines[p]) {
            let extends = p.dir == line.dir
                && ((line.is_up() && line.high >= p.high) || (line.is_down() && line.low <= p.low));
            if extends {
                peak = Some(line.idx);
                continue;
            }
        }
        let pre = &lines[line.idx - 2];
        let broke = (line.is_up() && line.high > pre.high) || (line.is_down() && line.low < pre.low);
        if !broke {
            continue;
        }
        match peak {
            None => {
                if list.segments.last().map_or(true, |s| s.dir != line.dir) {
                    peak = Some(line.idx);
                }
            }
            Some(p) if lines[p].dir != line.dir => {
                if line.idx - p <= 2 {
                    continue;
                }
                list.add(lines, p, true, None, false, SegmentReason::Normal)?;
                peak = Some(line.idx);
            }
            Some(_) => {}
        }
    }
    if let Some(p) = peak {
        list.add(lines, p, false, None, false, SegmentReason::Normal)?;
    }
    Ok(())
}

/// A segment ends when one line against it is followed by a failed
/// continuation (one plus one).
pub(super) fn scan_one_plus_one(
    list: &mut SegmentList,
    lines: &[Line],
) -> Result<(), StructureError> {
    list.horizon = 0;
    let mut next_begin: Option<usize> = None;
    for idx in 2..lines.len().saturating_sub(2) {
        let cur = &lines[idx];
        if let Some(seg) = list.segments.last() {
            if cur.dir != lines[seg.end].dir {
                continue;
            }
        }
        if let Some(nb) = next_begin.map(|i| &lines[i]) {
            let prev = &lines[idx - 1];
            if (cur.is_down() && prev.high < nb.low) || (cur.is_up() && prev.low > nb.high) {
                continue;
            }
        }
        let begin = list.segments.last().map_or(0, |s| s.end + 1);
        if idx < begin + 3 {
            continue;
        }
        let pre = &lines[idx - 2];
        let next = &lines[idx + 2];
        if failed_rebound(cur, next, pre) || broken_rebound(cur, next, pre) {
            list.consult(idx + 2);
            list.add(lines, idx - 1, true, None, false, SegmentReason::Normal)?;
            next_begin = Some(idx);
        }
    }
    // the last confirmed end can still move
    if let Some(last) = list.segments.last_mut() {
        last.settled = false;
    }
    extend_last(list, lines);
    Ok(())
}

/// `cur` stays inside `pre` and `next` continues past it.
fn failed_rebound(cur: &Line, next: &Line, pre: &Line) -> bool {
    if cur.is_down() {
        cur.low > pre.low && next.high < cur.high && next.low < cur.low
    } else {
        cur.high < pre.high && next.low > cur.low && next.high > cur.high
    }
}

/// `cur` breaks `pre` and `next` carries on past `pre`.
fn broken_rebound(cur: &Line, next: &Line, pre: &Line) -> bool {
    if cur.is_down() {
        cur.low < pre.low && next.high < cur.high && next.low < pre.low
    } else {
        cur.high > pre.high && next.low > cur.low && next.high > pre.high
    }
}

/// Move the last segment's end to a later same-direction extreme.
fn extend_last(list: &mut SegmentList, lines: &[Line]) {
    let Some(last) = list.segments.last_mut() else {
        return;
    };
    let mut best = lines[last.end].end_val;
    let mut moved = None;
    for line in lines.iter().skip(last.end + 2).step_by(2) {
        let beyond = if last.dir.is_up() {
            line.end_val > best
        } else {
            line.end_val < best
        };
        if line.dir == last.dir && beyond {
            best = line.end_val;
            moved = Some(line.idx);
        }
    }
    if let Some(end) = moved {
        last.end = end;
        last.sure = false;
        last.settled = false;
    }
}
