//! Bar merger: raw bars collapsed into directional merged bars.

use serde::Serialize;

use chan_core::{Direction, Fractal, MergeDir, RawBar, StructureError};

use crate::combiner::{has_overlap, Bounds, Combiner, EqualTie, Extent};
use crate::config::FractalCheck;

/// A run of raw bars merged by containment.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedBar {
    pub idx: usize,
    unit: Combiner,
}

impl MergedBar {
    fn open(idx: usize, bar: &RawBar, dir: Option<Direction>) -> Self {
        Self {
            idx,
            unit: Combiner::new(bar.idx, raw_extent(bar), dir),
        }
    }

    /// Directional high used by containment and fractal rules.
    #[inline]
    pub fn high(&self) -> f64 {
        self.unit.high()
    }

    /// Directional low used by containment and fractal rules.
    #[inline]
    pub fn low(&self) -> f64 {
        self.unit.low()
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        self.unit.bounds()
    }

    /// Direction relative to the previous merged bar; none for the first.
    pub fn dir(&self) -> Option<Direction> {
        self.unit.dir()
    }

    pub fn fractal(&self) -> Fractal {
        self.unit.fractal()
    }

    /// Indices of the member raw bars.
    pub fn members(&self) -> &[usize] {
        self.unit.members()
    }

    pub fn first_bar(&self) -> usize {
        self.unit.first()
    }

    pub fn last_bar(&self) -> usize {
        self.unit.last()
    }

    pub fn len(&self) -> usize {
        self.unit.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unit.is_empty()
    }

    pub fn time_begin(&self) -> i64 {
        self.unit.time_begin()
    }

    pub fn time_end(&self) -> i64 {
        self.unit.time_end()
    }

    /// Highest high among the member raw bars.
    pub fn raw_high(&self, bars: &[RawBar]) -> f64 {
        self.members()
            .iter()
            .map(|&i| bars[i].high)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Lowest low among the member raw bars.
    pub fn raw_low(&self, bars: &[RawBar]) -> f64 {
        self.members()
            .iter()
            .map(|&i| bars[i].low)
            .fold(f64::INFINITY, f64::min)
    }

    /// Raw bar carrying the merged high (or low); the last one on ties.
    pub fn peak_bar(&self, is_high: bool, bars: &[RawBar]) -> usize {
        self.unit
            .peak_member(is_high, |i| Bounds {
                high: bars[i].high,
                low: bars[i].low,
            })
            .unwrap_or_else(|| self.last_bar())
    }
}

fn raw_extent(bar: &RawBar) -> Extent {
    Extent {
        high: bar.high,
        low: bar.low,
        time_begin: bar.timestamp,
        time_end: bar.timestamp,
    }
}

/// What happened to the merged list when a raw bar arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergeStep {
    /// The bar was absorbed by the tail merged bar
    Merged,
    /// The bar opened a new merged bar
    Opened,
}

/// The merged-bar list of one level.
#[derive(Debug, Clone, Default)]
pub struct MergedBars {
    items: Vec<MergedBar>,
}

impl MergedBars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next raw bar of the level.
    ///
    /// When a bar opens a new merged bar, the previous tail is sealed and,
    /// with three bars available, receives its fractal tag. That tag is
    /// never revisited.
    pub fn push(&mut self, bar: &RawBar) -> Result<MergeStep, StructureError> {
        let Some(tail) = self.items.last_mut() else {
            self.items.push(MergedBar::open(0, bar, None));
            return Ok(MergeStep::Opened);
        };

        let dir = tail
            .unit
            .try_add(bar.idx, raw_extent(bar), false, EqualTie::Off)?;
        match dir {
            // Inclusion is never excluded for raw bars, so Included does not occur.
            MergeDir::Combine | MergeDir::Included => Ok(MergeStep::Merged),
            MergeDir::Up | MergeDir::Down => {
                let idx = self.items.len();
                self.items.push(MergedBar::open(idx, bar, dir.direction()));
                if idx >= 2 {
                    let pre = self.items[idx - 2].bounds();
                    let next = self.items[idx].bounds();
                    self.items[idx - 1]
                        .unit
                        .update_fractal(pre, next, false, EqualTie::Off);
                }
                Ok(MergeStep::Opened)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&MergedBar> {
        self.items.get(idx)
    }

    pub fn last(&self) -> Option<&MergedBar> {
        self.items.last()
    }

    pub fn as_slice(&self) -> &[MergedBar] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &MergedBar> {
        self.items.iter()
    }

    /// Merged bar covering `timestamp`, if any.
    pub fn at_time(&self, timestamp: i64) -> Option<&MergedBar> {
        let pos = self.items.partition_point(|m| m.time_end() < timestamp);
        self.items
            .get(pos)
            .filter(|m| m.time_begin() <= timestamp)
    }

    fn neighbour(&self, idx: usize, offset: isize) -> Result<&MergedBar, StructureError> {
        idx.checked_add_signed(offset)
            .and_then(|i| self.items.get(i))
            .ok_or(StructureError::MissingNeighbour(idx))
    }

    /// Whether member extremes of `idx` and its successor leave a gap.
    pub fn has_gap_with_next(&self, idx: usize, bars: &[RawBar]) -> Result<bool, StructureError> {
        let cur = self.neighbour(idx, 0)?;
        let next = self.neighbour(idx, 1)?;
        Ok(!has_overlap(
            cur.raw_low(bars),
            cur.raw_high(bars),
            next.raw_low(bars),
            next.raw_high(bars),
            true,
        ))
    }

    /// Whether the fractal at `end` clears the fractal at `begin` enough to
    /// close a stroke between them.
    ///
    /// `for_virtual` checks a candidate end that has no successor yet.
    pub fn fractal_is_valid(
        &self,
        begin: usize,
        end: usize,
        method: FractalCheck,
        for_virtual: bool,
    ) -> Result<bool, StructureError> {
        let cur = self.neighbour(begin, 0)?;
        let cur_pre = self.neighbour(begin, -1)?;
        let cur_next = self.neighbour(begin, 1)?;
        let item2 = self.neighbour(end, 0)?;
        let item2_pre = self.neighbour(end, -1)?;
        if end <= begin {
            return Err(StructureError::OutOfRange {
                what: "fractal pair",
                index: end,
            });
        }

        match cur.fractal() {
            Fractal::Top => {
                let (item2_high, cur_low) = match method {
                    FractalCheck::Half => (
                        item2_pre.high().max(item2.high()),
                        cur.low().min(cur_next.low()),
                    ),
                    FractalCheck::Loss => (item2.high(), cur.low()),
                    FractalCheck::Strict | FractalCheck::Totally => {
                        let mut h = item2_pre.high().max(item2.high());
                        if !for_virtual {
                            h = h.max(self.neighbour(end, 1)?.high());
                        }
                        (h, cur_pre.low().min(cur.low()).min(cur_next.low()))
                    }
                };
                if method == FractalCheck::Totally {
                    Ok(cur.low() > item2_high)
                } else {
                    Ok(cur.high() > item2_high && item2.low() < cur_low)
                }
            }
            Fractal::Bottom => {
                let (item2_low, cur_high) = match method {
                    FractalCheck::Half => (
                        item2_pre.low().min(item2.low()),
                        cur.high().max(cur_next.high()),
                    ),
                    FractalCheck::Loss => (item2.low(), cur.high()),
                    FractalCheck::Strict | FractalCheck::Totally => {
                        let mut l = item2_pre.low().min(item2.low());
                        if !for_virtual {
                            l = l.min(self.neighbour(end, 1)?.low());
                        }
                        (l, cur_pre.high().max(cur.high()).max(cur_next.high()))
                    }
                };
                if method == FractalCheck::Totally {
                    Ok(cur.high() < item2_low)
                } else {
                    Ok(cur.low() < item2_low && item2.high() > cur_high)
                }
            }
            Fractal::None => Err(StructureError::StrokeWithoutFractal(begin)),
        }
    }
}

impl std::ops::Index<usize> for MergedBars {
    type Output = MergedBar;

    fn index(&self, idx: usize) -> &MergedBar {
        &self.items[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chan_core::{Bar, Timeframe};

    fn raw(idx: usize, high: f64, low: f64) -> RawBar {
        let mid = (high + low) / 2.0;
        RawBar::from_bar(
            Bar::new(idx as i64 * 60_000, mid, high, low, mid),
            idx,
            Timeframe::Minute1,
            false,
        )
        .unwrap()
    }

    fn feed(rows: &[(f64, f64)]) -> (Vec<RawBar>, MergedBars) {
        let bars: Vec<RawBar> = rows
            .iter()
            .enumerate()
            .map(|(i, &(h, l))| raw(i, h, l))
            .collect();
        let mut merged = MergedBars::new();
        for b in &bars {
            merged.push(b).unwrap();
        }
        (bars, merged)
    }

    #[test]
    fn test_inside_bar_merges_into_first() {
        let (bars, merged) = feed(&[(20.0, 10.0), (18.0, 12.0)]);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].high() - 20.0).abs() < 0.001);
        assert!((merged[0].low() - 10.0).abs() < 0.001);
        assert_eq!(merged[0].members(), &[0, 1]);
        assert!((merged[0].raw_low(&bars) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_v_shape_bottom_at_middle() {
        let (_, merged) = feed(&[
            (11.0, 9.0),
            (9.0, 7.0),
            (7.0, 5.0),
            (9.0, 7.0),
            (11.0, 9.0),
        ]);
        assert_eq!(merged.len(), 5);
        assert_eq!(merged[2].fractal(), Fractal::Bottom);
        assert_eq!(merged[1].fractal(), Fractal::None);
        assert_eq!(merged[3].fractal(), Fractal::None);
        assert_eq!(merged[4].dir(), Some(Direction::Up));
    }

    #[test]
    fn test_fractal_stays_once_sealed() {
        let (mut bars, mut merged) = feed(&[(11.0, 9.0), (13.0, 11.0), (12.0, 10.0), (10.0, 8.0)]);
        assert_eq!(merged[1].fractal(), Fractal::Top);
        // contained bar joins the tail, earlier tags unaffected
        let b = raw(4, 9.5, 8.5);
        merged.push(&b).unwrap();
        bars.push(b);
        assert_eq!(merged[1].fractal(), Fractal::Top);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_peak_bar_and_time_lookup() {
        let (bars, merged) = feed(&[(20.0, 10.0), (20.0, 12.0), (25.0, 15.0)]);
        // second bar is inside the first; both carry the 20 high
        assert_eq!(merged[0].peak_bar(true, &bars), 1);
        assert_eq!(merged.at_time(60_000).map(|m| m.idx), Some(0));
        assert_eq!(merged.at_time(120_000).map(|m| m.idx), Some(1));
        assert!(merged.at_time(999_999).is_none());
    }

    #[test]
    fn test_gap_with_next() {
        let (bars, merged) = feed(&[(10.0, 9.0), (12.0, 11.0), (13.0, 12.0)]);
        assert!(merged.has_gap_with_next(0, &bars).unwrap());
        assert!(!merged.has_gap_with_next(1, &bars).unwrap());
        assert!(merged.has_gap_with_next(2, &bars).is_err());
    }

    #[test]
    fn test_fractal_validity_methods() {
        // top at 1, bottom at 5
        let (_, merged) = feed(&[
            (18.0, 14.0),
            (20.0, 16.0),
            (17.0, 13.0),
            (15.0, 11.0),
            (13.0, 9.0),
            (11.0, 7.0),
            (12.0, 8.0),
        ]);
        assert_eq!(merged[1].fractal(), Fractal::Top);
        assert_eq!(merged[5].fractal(), Fractal::Bottom);
        for method in [
            FractalCheck::Strict,
            FractalCheck::Loss,
            FractalCheck::Half,
            FractalCheck::Totally,
        ] {
            assert!(merged.fractal_is_valid(1, 5, method, false).unwrap());
        }
        assert!(merged.fractal_is_valid(2, 5, FractalCheck::Strict, false).is_err());
    }
}
