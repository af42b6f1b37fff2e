//! Inclusion merging shared by merged bars and characteristic elements.
//!
//! A [`Combiner`] is a run of consecutive members (raw bars, strokes or
//! segments, addressed by index) collapsed into one unit because their
//! ranges contain each other. The same containment and fractal rules apply
//! on every level, only the member type differs.

use chan_core::{Direction, Fractal, MergeDir, StructureError};

/// Price range and time span of one member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub high: f64,
    pub low: f64,
    pub time_begin: i64,
    pub time_end: i64,
}

/// Price range of a neighbouring unit in a fractal window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub high: f64,
    pub low: f64,
}

/// Tie-break for ranges sharing an extreme with the tail unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqualTie {
    /// Containment decides
    #[default]
    Off,
    /// An equal high with a lower low opens a new DOWN unit
    High,
    /// An equal low with a higher high opens a new UP unit
    Low,
}

/// Whether `[l1, h1]` and `[l2, h2]` overlap; `touching` counts equal bounds.
#[inline]
pub fn has_overlap(l1: f64, h1: f64, l2: f64, h2: f64, touching: bool) -> bool {
    if touching {
        h2 >= l1 && h1 >= l2
    } else {
        h2 > l1 && h1 > l2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Combiner {
    members: Vec<usize>,
    high: f64,
    low: f64,
    time_begin: i64,
    time_end: i64,
    dir: Option<Direction>,
    fractal: Fractal,
}

impl Combiner {
    /// Open a unit with its first member.
    ///
    /// `dir` is the direction relative to the previous unit; only the very
    /// first unit of a sequence has none.
    pub fn new(member: usize, extent: Extent, dir: Option<Direction>) -> Self {
        Self {
            members: vec![member],
            high: extent.high,
            low: extent.low,
            time_begin: extent.time_begin,
            time_end: extent.time_end,
            dir,
            fractal: Fractal::None,
        }
    }

    #[inline]
    pub fn high(&self) -> f64 {
        self.high
    }

    #[inline]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[inline]
    pub fn bounds(&self) -> Bounds {
        Bounds {
            high: self.high,
            low: self.low,
        }
    }

    pub fn time_begin(&self) -> i64 {
        self.time_begin
    }

    pub fn time_end(&self) -> i64 {
        self.time_end
    }

    pub fn dir(&self) -> Option<Direction> {
        self.dir
    }

    pub fn fractal(&self) -> Fractal {
        self.fractal
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn first(&self) -> usize {
        self.members[0]
    }

    pub fn last(&self) -> usize {
        self.members[self.members.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Classify a range against this unit.
    pub fn test_combine(
        &self,
        high: f64,
        low: f64,
        exclude_included: bool,
        tie: EqualTie,
    ) -> Result<MergeDir, StructureError> {
        if self.high >= high && self.low <= low {
            return Ok(MergeDir::Combine);
        }
        if self.high <= high && self.low >= low {
            if tie == EqualTie::High && self.high == high && self.low > low {
                return Ok(MergeDir::Down);
            }
            if tie == EqualTie::Low && self.low == low && self.high < high {
                return Ok(MergeDir::Up);
            }
            return Ok(if exclude_included {
                MergeDir::Included
            } else {
                MergeDir::Combine
            });
        }
        if self.high > high && self.low > low {
            return Ok(MergeDir::Down);
        }
        if self.high < high && self.low < low {
            return Ok(MergeDir::Up);
        }
        Err(StructureError::Uncomparable {
            low1: self.low,
            high1: self.high,
            low2: low,
            high2: high,
        })
    }

    /// Merge `member` when containment allows it; otherwise report the
    /// direction of the unit it would open.
    pub fn try_add(
        &mut self,
        member: usize,
        extent: Extent,
        exclude_included: bool,
        tie: EqualTie,
    ) -> Result<MergeDir, StructureError> {
        let dir = self.test_combine(extent.high, extent.low, exclude_included, tie)?;
        if dir != MergeDir::Combine {
            return Ok(dir);
        }
        self.members.push(member);
        let flat = extent.high == extent.low;
        match self.dir {
            Some(Direction::Up) => {
                // A flat member sitting on the high would flatten the unit.
                if !flat || extent.high != self.high {
                    self.high = self.high.max(extent.high);
                    self.low = self.low.max(extent.low);
                }
            }
            Some(Direction::Down) => {
                if !flat || extent.low != self.low {
                    self.high = self.high.min(extent.high);
                    self.low = self.low.min(extent.low);
                }
            }
            None => {
                self.high = self.high.max(extent.high);
                self.low = self.low.min(extent.low);
            }
        }
        self.time_end = extent.time_end;
        Ok(dir)
    }

    /// Tag this unit as the middle of a `(pre, self, next)` window.
    ///
    /// The plain rule needs both neighbours strictly below (TOP) or above
    /// (BOTTOM) on both bounds. With `exclude_included` only the facing
    /// bounds are compared and `tie` admits an equal extreme on `next`.
    pub fn update_fractal(&mut self, pre: Bounds, next: Bounds, exclude_included: bool, tie: EqualTie) {
        if exclude_included {
            if pre.high < self.high && next.high <= self.high && next.low < self.low {
                if tie == EqualTie::High || next.high < self.high {
                    self.fractal = Fractal::Top;
                }
            } else if pre.low > self.low && next.low >= self.low && next.high > self.high {
                if tie == EqualTie::Low || next.low > self.low {
                    self.fractal = Fractal::Bottom;
                }
            }
        } else if pre.high < self.high
            && next.high < self.high
            && pre.low < self.low
            && next.low < self.low
        {
            self.fractal = Fractal::Top;
        } else if pre.high > self.high
            && next.high > self.high
            && pre.low > self.low
            && next.low > self.low
        {
            self.fractal = Fractal::Bottom;
        }
    }

    /// Last member whose own high (or low) equals the unit's extreme.
    pub fn peak_member<F>(&self, is_high: bool, extent_of: F) -> Option<usize>
    where
        F: Fn(usize) -> Bounds,
    {
        self.members.iter().rev().copied().find(|&m| {
            let b = extent_of(m);
            if is_high {
                b.high == self.high
            } else {
                b.low == self.low
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(high: f64, low: f64, t: i64) -> Extent {
        Extent {
            high,
            low,
            time_begin: t,
            time_end: t,
        }
    }

    #[test]
    fn test_inside_member_merges() {
        let mut c = Combiner::new(0, ext(20.0, 10.0, 1), Some(Direction::Up));
        let dir = c.try_add(1, ext(18.0, 12.0, 2), false, EqualTie::Off).unwrap();
        assert_eq!(dir, MergeDir::Combine);
        assert_eq!(c.len(), 2);
        // UP keeps the higher low
        assert!((c.high() - 20.0).abs() < 0.001);
        assert!((c.low() - 12.0).abs() < 0.001);
        assert_eq!(c.time_end(), 2);
    }

    #[test]
    fn test_down_merge_takes_lower_bounds() {
        let mut c = Combiner::new(0, ext(18.0, 12.0, 1), Some(Direction::Down));
        c.try_add(1, ext(20.0, 10.0, 2), false, EqualTie::Off).unwrap();
        assert!((c.high() - 18.0).abs() < 0.001);
        assert!((c.low() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_undirected_merge_keeps_envelope() {
        let mut c = Combiner::new(0, ext(20.0, 10.0, 1), None);
        c.try_add(1, ext(18.0, 12.0, 2), false, EqualTie::Off).unwrap();
        assert!((c.high() - 20.0).abs() < 0.001);
        assert!((c.low() - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_flat_member_on_high_ignored() {
        let mut c = Combiner::new(0, ext(20.0, 10.0, 1), Some(Direction::Up));
        c.try_add(1, ext(20.0, 20.0, 2), false, EqualTie::Off).unwrap();
        assert!((c.low() - 10.0).abs() < 0.001);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_directional_outcomes() {
        let c = Combiner::new(0, ext(20.0, 10.0, 1), Some(Direction::Up));
        assert_eq!(c.test_combine(25.0, 15.0, false, EqualTie::Off).unwrap(), MergeDir::Up);
        assert_eq!(c.test_combine(15.0, 5.0, false, EqualTie::Off).unwrap(), MergeDir::Down);
        assert_eq!(c.test_combine(25.0, 5.0, true, EqualTie::Off).unwrap(), MergeDir::Included);
        assert_eq!(c.test_combine(25.0, 5.0, false, EqualTie::Off).unwrap(), MergeDir::Combine);
        assert!(c.test_combine(f64::NAN, 5.0, false, EqualTie::Off).is_err());
    }

    #[test]
    fn test_equal_tie() {
        let c = Combiner::new(0, ext(20.0, 10.0, 1), Some(Direction::Up));
        assert_eq!(c.test_combine(20.0, 5.0, true, EqualTie::High).unwrap(), MergeDir::Down);
        assert_eq!(c.test_combine(25.0, 10.0, true, EqualTie::Low).unwrap(), MergeDir::Up);
    }

    #[test]
    fn test_fractals() {
        let mut top = Combiner::new(1, ext(20.0, 15.0, 1), Some(Direction::Up));
        top.update_fractal(
            Bounds { high: 18.0, low: 12.0 },
            Bounds { high: 17.0, low: 11.0 },
            false,
            EqualTie::Off,
        );
        assert_eq!(top.fractal(), Fractal::Top);

        let mut bottom = Combiner::new(1, ext(10.0, 5.0, 1), Some(Direction::Down));
        bottom.update_fractal(
            Bounds { high: 12.0, low: 8.0 },
            Bounds { high: 11.0, low: 6.0 },
            false,
            EqualTie::Off,
        );
        assert_eq!(bottom.fractal(), Fractal::Bottom);

        let mut none = Combiner::new(1, ext(10.0, 5.0, 1), Some(Direction::Down));
        none.update_fractal(
            Bounds { high: 12.0, low: 8.0 },
            Bounds { high: 9.0, low: 4.0 },
            false,
            EqualTie::Off,
        );
        assert_eq!(none.fractal(), Fractal::None);
    }

    #[test]
    fn test_half_rule_tie() {
        let mut c = Combiner::new(1, ext(20.0, 15.0, 1), Some(Direction::Up));
        let pre = Bounds { high: 18.0, low: 16.0 };
        let next = Bounds { high: 20.0, low: 12.0 };
        c.update_fractal(pre, next, true, EqualTie::Off);
        assert_eq!(c.fractal(), Fractal::None);
        c.update_fractal(pre, next, true, EqualTie::High);
        assert_eq!(c.fractal(), Fractal::Top);
    }

    #[test]
    fn test_peak_member() {
        let highs = [20.0, 19.0, 20.0];
        let mut c = Combiner::new(0, ext(20.0, 10.0, 0), Some(Direction::Down));
        c.try_add(1, ext(19.0, 11.0, 1), false, EqualTie::Off).unwrap();
        c.try_add(2, ext(20.0, 9.0, 2), false, EqualTie::Off).unwrap();
        // DOWN merge: high = min(20, 19, 20) = 19
        let peak = c.peak_member(true, |m| Bounds { high: highs[m], low: 0.0 });
        assert_eq!(peak, Some(1));
    }

    #[test]
    fn test_overlap() {
        assert!(has_overlap(1.0, 2.0, 2.0, 3.0, true));
        assert!(!has_overlap(1.0, 2.0, 2.0, 3.0, false));
        assert!(has_overlap(1.0, 5.0, 2.0, 3.0, false));
    }
}
