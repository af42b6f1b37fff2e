//! Stroke builder: confirmed opposite fractals joined into strokes.

use serde::Serialize;
use tracing::debug;

use chan_core::{Direction, Fractal, RawBar, StructureError};

use crate::config::{StrokeConfig, StrokeMode};
use crate::merged::{MergedBar, MergedBars};

/// Lifecycle of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StrokeState {
    /// A later confirmed stroke exists; the endpoints are fixed.
    Final,
    /// Confirmed by opposite fractals but still the tail, so its end may
    /// move further in its direction.
    Confirmed,
    /// Speculative. `restore_to` holds the confirmed end to fall back to when
    /// only the end was extended; `None` marks a stroke that is dropped.
    Provisional { restore_to: Option<usize> },
}

/// A directional move between two merged bars carrying opposite fractals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stroke {
    pub idx: usize,
    /// Merged bar the stroke starts on
    pub begin: usize,
    end: usize,
    pub dir: Direction,
    state: StrokeState,
    /// Segment the stroke belongs to, once segmented
    pub segment: Option<usize>,
    /// Signal anchored at the end of this stroke
    pub signal: Option<usize>,
}

impl Stroke {
    fn new(
        idx: usize,
        begin: &MergedBar,
        end: &MergedBar,
        state: StrokeState,
    ) -> Result<Self, StructureError> {
        let dir = begin
            .fractal()
            .start_direction()
            .ok_or(StructureError::StrokeWithoutFractal(begin.idx))?;
        let stroke = Self {
            idx,
            begin: begin.idx,
            end: end.idx,
            dir,
            state,
            segment: None,
            signal: None,
        };
        stroke.check(begin, end)?;
        Ok(stroke)
    }

    fn check(&self, begin: &MergedBar, end: &MergedBar) -> Result<(), StructureError> {
        let consistent = match self.dir {
            Direction::Down => begin.high() > end.low(),
            Direction::Up => begin.low() < end.high(),
        };
        if consistent {
            Ok(())
        } else {
            Err(StructureError::StrokeDirection {
                begin: begin.idx,
                end: end.idx,
                direction: self.dir.to_string(),
            })
        }
    }

    /// Merged bar the stroke currently ends on.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn state(&self) -> StrokeState {
        self.state
    }

    /// Endpoints can no longer change.
    pub fn is_final(&self) -> bool {
        self.state == StrokeState::Final
    }

    /// Backed by two confirmed fractals (final or still extendable).
    pub fn is_confirmed(&self) -> bool {
        matches!(self.state, StrokeState::Final | StrokeState::Confirmed)
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.state, StrokeState::Provisional { .. })
    }

    /// Price the stroke starts from.
    pub fn begin_val(&self, merged: &MergedBars) -> f64 {
        match self.dir {
            Direction::Up => merged[self.begin].low(),
            Direction::Down => merged[self.begin].high(),
        }
    }

    /// Price the stroke reaches.
    pub fn end_val(&self, merged: &MergedBars) -> f64 {
        match self.dir {
            Direction::Up => merged[self.end].high(),
            Direction::Down => merged[self.end].low(),
        }
    }

    /// Raw bar of the starting extreme.
    pub fn begin_bar(&self, merged: &MergedBars, bars: &[RawBar]) -> usize {
        merged[self.begin].peak_bar(self.dir.is_down(), bars)
    }

    /// Raw bar of the reached extreme.
    pub fn end_bar(&self, merged: &MergedBars, bars: &[RawBar]) -> usize {
        merged[self.end].peak_bar(self.dir.is_up(), bars)
    }

    fn set_end(&mut self, merged: &MergedBars, end: usize) -> Result<(), StructureError> {
        self.end = end;
        self.check(&merged[self.begin], &merged[end])
    }
}

/// Builds and maintains the stroke list of one level.
#[derive(Debug, Clone)]
pub struct StrokeList {
    config: StrokeConfig,
    strokes: Vec<Stroke>,
    /// Merged bar the last confirmed stroke ends on
    last_end: Option<usize>,
    /// Fractal bars seen before the first stroke formed
    free: Vec<usize>,
    /// Lowest stroke index touched since the last `take_changed_from`
    changed_from: Option<usize>,
}

impl StrokeList {
    pub fn new(config: StrokeConfig) -> Self {
        Self {
            config,
            strokes: Vec::new(),
            last_end: None,
            free: Vec::new(),
            changed_from: None,
        }
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Stroke> {
        self.strokes.get(idx)
    }

    pub fn last(&self) -> Option<&Stroke> {
        self.strokes.last()
    }

    pub fn as_slice(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter()
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Stroke> {
        self.strokes.get_mut(idx)
    }

    /// Lowest index changed since the previous call, and reset the marker.
    pub fn take_changed_from(&mut self) -> Option<usize> {
        self.changed_from.take()
    }

    fn touch(&mut self, idx: usize) {
        self.changed_from = Some(self.changed_from.map_or(idx, |c| c.min(idx)));
    }

    fn last_end_bar(&self, merged: &MergedBars, bars: &[RawBar]) -> Option<usize> {
        self.strokes.last().map(|s| s.end_bar(merged, bars))
    }

    /// React to a newly sealed merged bar (the one before the tail).
    ///
    /// Returns whether the confirmed strokes changed.
    pub fn update(
        &mut self,
        merged: &MergedBars,
        bars: &[RawBar],
        sealed: usize,
    ) -> Result<bool, StructureError> {
        let before = self.last_end_bar(merged, bars);
        self.delete_virtual(merged)?;
        let klc = &merged[sealed];
        let fractal = klc.fractal();
        if fractal == Fractal::None {
            return Ok(before != self.last_end_bar(merged, bars));
        }

        let Some(last_end) = self.last_end.filter(|_| !self.strokes.is_empty()) else {
            return self.try_create_first(merged, bars, sealed);
        };

        if fractal == merged[last_end].fractal() {
            return self.try_update_end(merged, sealed);
        }
        if self.can_make_stroke(merged, bars, sealed, last_end)? {
            self.add_stroke(merged, last_end, sealed, StrokeState::Confirmed)?;
            self.last_end = Some(sealed);
            return Ok(true);
        }
        Ok(before != self.last_end_bar(merged, bars))
    }

    fn try_create_first(
        &mut self,
        merged: &MergedBars,
        bars: &[RawBar],
        klc: usize,
    ) -> Result<bool, StructureError> {
        let fractal = merged[klc].fractal();
        let free = self.free.clone();
        for candidate in free {
            if merged[candidate].fractal() == fractal {
                continue;
            }
            if self.can_make_stroke(merged, bars, klc, candidate)? {
                self.add_stroke(merged, candidate, klc, StrokeState::Confirmed)?;
                self.last_end = Some(klc);
                return Ok(true);
            }
        }
        self.free.push(klc);
        self.last_end = Some(klc);
        Ok(false)
    }

    fn try_update_end(&mut self, merged: &MergedBars, klc: usize) -> Result<bool, StructureError> {
        let Some(last) = self.strokes.last() else {
            return Ok(false);
        };
        let bar = &merged[klc];
        let extends = match last.dir {
            Direction::Up => bar.fractal() == Fractal::Top && bar.high() >= last.end_val(merged),
            Direction::Down => {
                bar.fractal() == Fractal::Bottom && bar.low() <= last.end_val(merged)
            }
        };
        if !extends {
            return Ok(false);
        }
        let idx = self.strokes.len() - 1;
        self.strokes[idx].set_end(merged, klc)?;
        self.touch(idx);
        self.last_end = Some(klc);
        Ok(true)
    }

    fn add_stroke(
        &mut self,
        merged: &MergedBars,
        begin: usize,
        end: usize,
        state: StrokeState,
    ) -> Result<(), StructureError> {
        let idx = self.strokes.len();
        let stroke = Stroke::new(idx, &merged[begin], &merged[end], state)?;
        debug!(
            idx,
            dir = %stroke.dir,
            begin,
            end,
            provisional = stroke.is_provisional(),
            "stroke added"
        );
        if state == StrokeState::Confirmed {
            if let Some(prev) = self.strokes.last_mut() {
                if prev.state == StrokeState::Confirmed {
                    prev.state = StrokeState::Final;
                    self.touch(idx - 1);
                }
            }
        }
        self.strokes.push(stroke);
        self.touch(idx);
        Ok(())
    }

    /// Undo the speculative tail: restore an extended end or drop the
    /// speculative stroke.
    pub fn delete_virtual(&mut self, merged: &MergedBars) -> Result<(), StructureError> {
        let Some(last) = self.strokes.last_mut() else {
            return Ok(());
        };
        let StrokeState::Provisional { restore_to } = last.state else {
            return Ok(());
        };
        let idx = last.idx;
        match restore_to {
            Some(end) => {
                last.state = StrokeState::Confirmed;
                last.set_end(merged, end)?;
            }
            None => {
                self.strokes.pop();
            }
        }
        self.touch(idx);
        Ok(())
    }

    /// Speculatively extend or add a stroke toward `klc`, which has no
    /// confirmed fractal yet.
    pub fn try_add_virtual(
        &mut self,
        merged: &MergedBars,
        bars: &[RawBar],
        klc: usize,
        need_delete: bool,
    ) -> Result<bool, StructureError> {
        if need_delete {
            self.delete_virtual(merged)?;
        }
        let Some(last) = self.strokes.last() else {
            return Ok(false);
        };
        let last_idx = last.idx;
        let last_end = last.end;
        if klc == last_end {
            return Ok(false);
        }

        let bar = &merged[klc];
        let extends = match last.dir {
            Direction::Up => bar.high() >= merged[last_end].high(),
            Direction::Down => bar.low() <= merged[last_end].low(),
        };
        if extends {
            let stroke = &mut self.strokes[last_idx];
            stroke.state = StrokeState::Provisional {
                restore_to: Some(last_end),
            };
            stroke.set_end(merged, klc)?;
            self.touch(last_idx);
            return Ok(true);
        }

        let last_dir = last.dir;
        let mut tmp = klc;
        while tmp > last_end {
            if !self.satisfy_span(merged, bars, tmp, last_end)? {
                return Ok(false);
            }
            let cand = &merged[tmp];
            let reverses = match last_dir {
                Direction::Down => {
                    cand.dir() == Some(Direction::Up) && cand.low() > merged[last_end].low()
                }
                Direction::Up => {
                    cand.dir() == Some(Direction::Down) && cand.high() < merged[last_end].high()
                }
            };
            if reverses
                && merged.fractal_is_valid(last_end, tmp, self.config.fractal_check, true)?
            {
                let begin = self.last_end.unwrap_or(last_end);
                self.add_stroke(
                    merged,
                    begin,
                    tmp,
                    StrokeState::Provisional { restore_to: None },
                )?;
                return Ok(true);
            }
            tmp -= 1;
        }
        Ok(false)
    }

    fn can_make_stroke(
        &self,
        merged: &MergedBars,
        bars: &[RawBar],
        klc: usize,
        last_end: usize,
    ) -> Result<bool, StructureError> {
        if self.config.mode == StrokeMode::FractalOnly {
            // Still refuse a pair whose values contradict the direction.
            let begin = &merged[last_end];
            let end = &merged[klc];
            return Ok(match begin.fractal() {
                Fractal::Bottom => begin.low() < end.high(),
                Fractal::Top => begin.high() > end.low(),
                Fractal::None => false,
            });
        }
        let valid = merged.fractal_is_valid(last_end, klc, self.config.fractal_check, false)?
            && self.satisfy_span(merged, bars, klc, last_end)?;
        if valid && self.config.end_is_peak {
            return Ok(end_is_peak(merged, last_end, klc));
        }
        Ok(valid)
    }

    fn satisfy_span(
        &self,
        merged: &MergedBars,
        bars: &[RawBar],
        klc: usize,
        last_end: usize,
    ) -> Result<bool, StructureError> {
        let span = self.span(merged, bars, klc, last_end)?;
        if self.config.strict {
            return Ok(span >= 4);
        }
        let mut raw_count = 0;
        let mut tmp = last_end + 1;
        loop {
            let Some(cur) = merged.get(tmp) else {
                return Ok(false);
            };
            raw_count += cur.len();
            // A virtual end may sit right after last_end with no successor.
            if tmp + 1 >= merged.len() {
                return Ok(false);
            }
            if tmp + 1 < klc {
                tmp += 1;
            } else {
                break;
            }
        }
        Ok(span >= 3 && raw_count >= 3)
    }

    fn span(
        &self,
        merged: &MergedBars,
        bars: &[RawBar],
        klc: usize,
        last_end: usize,
    ) -> Result<usize, StructureError> {
        let mut span = klc - last_end;
        if !self.config.gap_as_bar || span >= 4 {
            return Ok(span);
        }
        for i in last_end..klc {
            if merged.has_gap_with_next(i, bars)? {
                span += 1;
            }
        }
        Ok(span)
    }
}

/// No merged bar strictly between the endpoints goes beyond the end.
fn end_is_peak(merged: &MergedBars, last_end: usize, cur_end: usize) -> bool {
    let between = merged.as_slice()[last_end + 1..cur_end].iter();
    match merged[last_end].fractal() {
        Fractal::Bottom => {
            let thred = merged[cur_end].high();
            between.into_iter().all(|m| m.high() <= thred)
        }
        Fractal::Top => {
            let thred = merged[cur_end].low();
            between.into_iter().all(|m| m.low() >= thred)
        }
        Fractal::None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merged::MergeStep;
    use chan_core::{Bar, Timeframe};

    /// Feed (high, low) rows and update strokes the way a level does.
    fn build(rows: &[(f64, f64)], config: StrokeConfig) -> (Vec<RawBar>, MergedBars, StrokeList) {
        let mut bars = Vec::new();
        let mut merged = MergedBars::new();
        let mut strokes = StrokeList::new(config);
        for (i, &(h, l)) in rows.iter().enumerate() {
            let mid = (h + l) / 2.0;
            let bar = RawBar::from_bar(
                Bar::new(i as i64 * 60_000, mid, h, l, mid),
                i,
                Timeframe::Minute1,
                false,
            )
            .unwrap();
            bars.push(bar);
            if merged.push(&bars[i]).unwrap() == MergeStep::Opened && merged.len() >= 3 {
                strokes.update(&merged, &bars, merged.len() - 2).unwrap();
            }
        }
        (bars, merged, strokes)
    }

    /// Rising to a top at 2, falling to a bottom at 7, rising again.
    fn zigzag() -> Vec<(f64, f64)> {
        vec![
            (10.0, 8.0),
            (12.0, 10.0),
            (14.0, 12.0),
            (13.0, 11.0),
            (12.0, 10.0),
            (11.0, 9.0),
            (10.0, 8.0),
            (9.0, 7.0),
            (10.0, 8.0),
            (11.0, 9.0),
            (12.0, 10.0),
            (13.0, 11.0),
            (14.5, 12.5),
            (13.5, 11.5),
        ]
    }

    #[test]
    fn test_down_then_up() {
        let (_, merged, strokes) = build(&zigzag(), StrokeConfig::default());
        assert_eq!(merged[2].fractal(), Fractal::Top);
        assert_eq!(merged[7].fractal(), Fractal::Bottom);
        assert_eq!(merged[12].fractal(), Fractal::Top);
        assert_eq!(strokes.len(), 2);
        let first = &strokes.as_slice()[0];
        let second = &strokes.as_slice()[1];
        assert_eq!(first.dir, Direction::Down);
        assert_eq!((first.begin, first.end()), (2, 7));
        assert_eq!(second.dir, Direction::Up);
        assert_eq!((second.begin, second.end()), (7, 12));
        assert!(first.is_final());
        assert_eq!(second.state(), StrokeState::Confirmed);
    }

    #[test]
    fn test_short_span_rejected() {
        // top at 2 and bottom at 5 are three merged bars apart
        let rows = vec![
            (10.0, 8.0),
            (12.0, 10.0),
            (14.0, 12.0),
            (12.0, 10.0),
            (11.5, 10.5),
            (10.0, 8.0),
            (8.0, 6.0),
            (10.0, 8.0),
        ];
        let (_, _, strokes) = build(&rows, StrokeConfig::default());
        assert!(strokes.is_empty());

        let relaxed = StrokeConfig {
            strict: false,
            ..StrokeConfig::default()
        };
        let (_, _, strokes) = build(&rows, relaxed);
        assert_eq!(strokes.len(), 1);
        assert_eq!(strokes.as_slice()[0].dir, Direction::Down);
    }

    #[test]
    fn test_virtual_extension_restores() {
        let (bars, merged, mut strokes) = build(&zigzag(), StrokeConfig::default());
        let tail = merged.len() - 1;
        // tail (13.5, 11.5) does not exceed the top at 12; no reversal span yet
        assert!(!strokes.try_add_virtual(&merged, &bars, tail, false).unwrap());
        strokes.take_changed_from();

        let mut rows = zigzag();
        rows.push((15.0, 13.0));
        let (bars, merged, mut strokes) = build(&rows, StrokeConfig::default());
        let tail = merged.len() - 1;
        assert!(strokes.try_add_virtual(&merged, &bars, tail, false).unwrap());
        let last = strokes.last().unwrap();
        assert_eq!(last.end(), tail);
        assert_eq!(last.state(), StrokeState::Provisional { restore_to: Some(12) });

        strokes.delete_virtual(&merged).unwrap();
        let last = strokes.last().unwrap();
        assert_eq!(last.end(), 12);
        assert_eq!(last.state(), StrokeState::Confirmed);
    }

    #[test]
    fn test_virtual_new_stroke_dropped() {
        let mut rows = zigzag();
        // falling away from the top at 12
        rows.extend([(12.5, 10.5), (11.5, 9.5), (10.5, 8.5)]);
        let (bars, merged, mut strokes) = build(&rows, StrokeConfig::default());
        let before = strokes.len();
        let tail = merged.len() - 1;
        assert!(strokes.try_add_virtual(&merged, &bars, tail, false).unwrap());
        assert_eq!(strokes.len(), before + 1);
        let last = strokes.last().unwrap();
        assert_eq!(last.dir, Direction::Down);
        assert!(last.is_provisional());
        strokes.take_changed_from();

        strokes.delete_virtual(&merged).unwrap();
        assert_eq!(strokes.len(), before);
        assert_eq!(strokes.take_changed_from(), Some(before));
    }

    #[test]
    fn test_end_extends_on_higher_top() {
        let mut rows = zigzag();
        // dip and new higher top at 15
        rows.extend([(14.8, 12.8), (16.0, 14.0), (15.0, 13.0)]);
        let (_, merged, strokes) = build(&rows, StrokeConfig::default());
        let last = strokes.last().unwrap();
        assert_eq!(last.dir, Direction::Up);
        assert_eq!(merged[last.end()].fractal(), Fractal::Top);
        assert!((merged[last.end()].high() - 16.0).abs() < 0.001);
    }

    #[test]
    fn test_end_is_peak_helper() {
        let (_, merged, _) = build(&zigzag(), StrokeConfig::default());
        assert!(end_is_peak(&merged, 7, 12));
        assert!(end_is_peak(&merged, 2, 7));
        // the bottom at 7 undercuts the low of 8
        assert!(!end_is_peak(&merged, 2, 8));
    }
}
