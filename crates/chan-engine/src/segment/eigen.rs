//! Characteristic-sequence fractal over lines.
//!
//! Counter-trend lines are merged by inclusion into at most three elements.
//! The sequence moves through an explicit phase table:
//!
//! | phase     | on line                        | next phase              |
//! |-----------|--------------------------------|-------------------------|
//! | `Empty`   | open element 0                 | `First`                 |
//! | `First`   | merge into element 0, or open 1| `First` / `Second` / reset |
//! | `Second`  | merge into element 1, or open 2| `Second` / `Resolved` / reset |
//! | `Resolved`| any                            | overflow error          |
//!
//! A reset drops the oldest line and replays the rest through the table.

use std::collections::VecDeque;

use chan_core::{Direction, Fractal, MergeDir, StructureError};

use crate::combiner::{Bounds, Combiner, EqualTie};
use crate::line::Line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Empty,
    First,
    Second,
    Resolved,
}

/// One element: merged counter-trend lines plus the gap flag.
#[derive(Debug, Clone)]
struct Element {
    unit: Combiner,
    gap: bool,
}

impl Element {
    fn open(line: &Line, dir: Option<Direction>) -> Self {
        Self {
            unit: Combiner::new(line.idx, line.extent(), dir),
            gap: false,
        }
    }

    fn last_member(&self) -> usize {
        self.unit.last()
    }

    /// Line before the member carrying the element's extreme; the candidate
    /// segment end.
    fn peak_line(&self, lines: &[Line]) -> Option<usize> {
        let first = lines.get(self.unit.first())?;
        let member = self.unit.peak_member(first.is_down(), |i| {
            let l = &lines[i];
            Bounds {
                high: l.high,
                low: l.low,
            }
        })?;
        member.checked_sub(1)
    }
}

/// Outcome of feeding one line.
enum Step {
    Pending,
    Fractal,
    Reset,
}

#[derive(Debug, Clone)]
pub(crate) struct EigenFx {
    /// Direction of the segment under test
    dir: Direction,
    exclude_included: bool,
    phase: Phase,
    elements: [Option<Element>; 3],
    members: Vec<usize>,
    /// Highest line index this sequence has looked at
    horizon: usize,
}

impl EigenFx {
    pub fn new(dir: Direction, exclude_included: bool) -> Self {
        Self {
            dir,
            exclude_included,
            phase: Phase::Empty,
            elements: [None, None, None],
            members: Vec::new(),
            horizon: 0,
        }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn has_second(&self) -> bool {
        self.elements[1].is_some()
    }

    pub fn clear(&mut self) {
        self.phase = Phase::Empty;
        self.elements = [None, None, None];
        self.members.clear();
    }

    /// Feed a counter-trend line; true once element 1 is a confirmed
    /// reversal fractal.
    pub fn add(&mut self, lines: &[Line], idx: usize) -> Result<bool, StructureError> {
        let mut queue = VecDeque::from([idx]);
        while let Some(next) = queue.pop_front() {
            match self.step(lines, next)? {
                Step::Pending => {}
                Step::Fractal => return Ok(true),
                Step::Reset => {
                    if self.exclude_included {
                        let replay: Vec<usize> = self.members[1..].to_vec();
                        self.clear();
                        for (i, m) in replay.into_iter().enumerate() {
                            queue.insert(i, m);
                        }
                    } else {
                        self.shift();
                    }
                }
            }
        }
        Ok(false)
    }

    fn step(&mut self, lines: &[Line], idx: usize) -> Result<Step, StructureError> {
        let line = lines.get(idx).ok_or(StructureError::OutOfRange {
            what: "characteristic line",
            index: idx,
        })?;
        if line.dir == self.dir {
            return Err(StructureError::SequenceDirection {
                expected: self.dir.reverse().to_string(),
            });
        }
        self.horizon = self.horizon.max(idx);
        self.members.push(idx);
        match self.phase {
            Phase::Empty => {
                self.elements[0] = Some(Element::open(line, Some(self.dir)));
                self.phase = Phase::First;
                Ok(Step::Pending)
            }
            Phase::First => self.treat_second(line),
            Phase::Second => self.treat_third(lines, line),
            Phase::Resolved => Err(StructureError::SequenceOverflow),
        }
    }

    fn treat_second(&mut self, line: &Line) -> Result<Step, StructureError> {
        let Some(first) = self.elements[0].as_mut() else {
            return Err(StructureError::SequenceOverflow);
        };
        let dir = first
            .unit
            .try_add(line.idx, line.extent(), self.exclude_included, EqualTie::Off)?;
        if dir == MergeDir::Combine {
            return Ok(Step::Pending);
        }
        let second = Element::open(line, Some(self.dir));
        let hopeless = match self.dir {
            Direction::Up => second.unit.high() < first.unit.high(),
            Direction::Down => second.unit.low() > first.unit.low(),
        };
        self.elements[1] = Some(second);
        self.phase = Phase::Second;
        Ok(if hopeless { Step::Reset } else { Step::Pending })
    }

    fn treat_third(&mut self, lines: &[Line], line: &Line) -> Result<Step, StructureError> {
        let tie = if self.exclude_included {
            if line.is_down() {
                EqualTie::High
            } else {
                EqualTie::Low
            }
        } else {
            EqualTie::Off
        };
        let [Some(first), Some(second), _] = &mut self.elements else {
            return Err(StructureError::SequenceOverflow);
        };
        let dir = second.unit.try_add(line.idx, line.extent(), false, tie)?;
        if dir == MergeDir::Combine {
            return Ok(Step::Pending);
        }
        let third = Element::open(line, dir.direction());
        let pre = first.unit.bounds();
        let next = third.unit.bounds();
        self.elements[2] = Some(third);
        self.phase = Phase::Resolved;

        if !self.actual_break(lines) {
            return Ok(Step::Reset);
        }
        let Some(second) = self.elements[1].as_mut() else {
            return Err(StructureError::SequenceOverflow);
        };
        second
            .unit
            .update_fractal(pre, next, self.exclude_included, tie);
        let fractal = second.unit.fractal();
        second.gap = match fractal {
            Fractal::Top => pre.high < second.unit.low(),
            Fractal::Bottom => pre.low > second.unit.high(),
            Fractal::None => false,
        };
        let is_fx = match self.dir {
            Direction::Up => fractal == Fractal::Top,
            Direction::Down => fractal == Fractal::Bottom,
        };
        Ok(if is_fx { Step::Fractal } else { Step::Reset })
    }

    /// The third element must pierce the last member of the second one, or
    /// the line two after it must.
    fn actual_break(&mut self, lines: &[Line]) -> bool {
        if !self.exclude_included {
            return true;
        }
        let (Some(second), Some(third)) = (self.elements[1].as_ref(), self.elements[2].as_ref())
        else {
            return false;
        };
        let last = &lines[second.last_member()];
        let pierced = match self.dir {
            Direction::Up => third.unit.low() < last.low,
            Direction::Down => third.unit.high() > last.high,
        };
        if pierced {
            return true;
        }
        let probe = &lines[third.unit.first()];
        self.horizon = self.horizon.max(probe.idx + 2);
        match lines.get(probe.idx + 2) {
            Some(after) if probe.is_down() => after.low < probe.low,
            Some(after) => after.high > probe.high,
            None => false,
        }
    }

    /// Move elements 1 and 2 down to 0 and 1.
    fn shift(&mut self) {
        let [_, second, third] = std::mem::replace(&mut self.elements, [None, None, None]);
        let keep_from = second
            .as_ref()
            .map_or(usize::MAX, |e| e.unit.first());
        self.phase = if third.is_some() {
            Phase::Second
        } else if second.is_some() {
            Phase::First
        } else {
            Phase::Empty
        };
        self.elements = [second, third, None];
        self.members.retain(|&m| m >= keep_from);
    }

    /// Line the candidate segment ends on.
    pub fn peak_line(&self, lines: &[Line]) -> Option<usize> {
        self.elements[1].as_ref()?.peak_line(lines)
    }

    /// Whether the fractal closes the segment: `Some(true)` yes,
    /// `Some(false)` no, `None` when the data ran out before deciding.
    pub fn can_be_end(&mut self, lines: &[Line]) -> Result<Option<bool>, StructureError> {
        let (Some(first), Some(second)) = (self.elements[0].as_ref(), self.elements[1].as_ref())
        else {
            return Ok(Some(false));
        };
        if !second.gap {
            return Ok(Some(true));
        }
        let Some(end) = second.peak_line(lines) else {
            return Ok(None);
        };
        let thred = lines[end].end_val;
        let break_thred = match self.dir {
            Direction::Up => first.unit.low(),
            Direction::Down => first.unit.high(),
        };
        let (verdict, horizon) = find_revert(lines, end + 2, thred, break_thred)?;
        self.horizon = self.horizon.max(horizon);
        Ok(verdict)
    }
}

/// Look for a reversal fractal from `begin`, scanning every second line.
///
/// Returns the verdict and the highest line index consulted.
fn find_revert(
    lines: &[Line],
    begin: usize,
    thred: f64,
    break_thred: f64,
) -> Result<(Option<bool>, usize), StructureError> {
    let Some(first) = lines.get(begin) else {
        return Ok((None, begin));
    };
    let mut eigen = EigenFx::new(first.dir.reverse(), false);
    for line in lines[begin..].iter().step_by(2) {
        if eigen.add(lines, line.idx)? {
            return Ok((Some(true), line.idx));
        }
        let crossed = (line.is_down() && line.low < thred) || (line.is_up() && line.high > thred);
        if crossed {
            return Ok((Some(false), line.idx));
        }
        if let Some(second) = eigen.elements[1].as_ref() {
            let broke = (line.is_down() && second.unit.high() > break_thred)
                || (line.is_up() && second.unit.low() < break_thred);
            if broke {
                return Ok((Some(true), line.idx));
            }
        }
    }
    Ok((None, lines.len()))
}
