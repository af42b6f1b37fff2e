//! Support and resistance lines fitted through the turning points of a
//! segment's lines.

use serde::Serialize;

use chan_core::Direction;

use crate::line::Line;

/// Which turning points a trend line runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendSide {
    /// Starts of the segment-direction lines: support of an up segment
    Inside,
    /// Ends of the segment-direction lines: resistance of an up segment
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendLine {
    pub side: TrendSide,
    /// Raw bar index of the anchor point
    pub anchor_bar: usize,
    pub anchor_price: f64,
    /// Price change per raw bar
    pub slope: f64,
}

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn slope_to(&self, other: &Point) -> f64 {
        if self.x == other.x {
            f64::INFINITY
        } else {
            (self.y - other.y) / (self.x - other.x)
        }
    }
}

impl TrendLine {
    /// Fit a line through every second line counted back from the last.
    ///
    /// Starting from the latest point, the line to the earlier point with
    /// the flattest admissible slope is taken; the search restarts from that
    /// point and the candidate with the smallest summed distance to all
    /// points wins. `None` when no admissible slope exists.
    pub fn fit(lines: &[Line], side: TrendSide) -> Option<Self> {
        let last = lines.last()?;
        let points: Vec<Point> = lines
            .iter()
            .rev()
            .step_by(2)
            .map(|l| match side {
                TrendSide::Inside => Point {
                    x: l.begin_bar as f64,
                    y: l.begin_val,
                },
                TrendSide::Outside => Point {
                    x: l.end_bar as f64,
                    y: l.end_val,
                },
            })
            .collect();

        let rising = (last.dir == Direction::Up) == (side == TrendSide::Inside);
        let mut best: Option<(f64, Point, f64)> = None;
        let mut rest: &[Point] = &points;
        while rest.len() > 1 {
            let (slope, next) = flattest(rest, rising);
            if slope.is_finite() {
                let dist: f64 = points.iter().map(|p| distance(rest[0], slope, p)).sum();
                if best.map_or(true, |(b, _, _)| dist < b) {
                    best = Some((dist, rest[0], slope));
                }
            }
            rest = &rest[next..];
        }
        best.map(|(_, p, slope)| Self {
            side,
            anchor_bar: p.x as usize,
            anchor_price: p.y,
            slope,
        })
    }

    /// Price on the line at raw bar `bar`.
    pub fn value_at(&self, bar: usize) -> f64 {
        self.anchor_price + self.slope * (bar as f64 - self.anchor_bar as f64)
    }
}

/// Flattest slope from the first point to a later one with the admissible
/// sign, and the position of that point. Non-finite slope when none qualifies.
fn flattest(points: &[Point], rising: bool) -> (f64, usize) {
    let origin = points[0];
    let mut peak = if rising {
        f64::INFINITY
    } else {
        f64::NEG_INFINITY
    };
    let mut at = 1;
    for (i, p) in points.iter().enumerate().skip(1) {
        let slope = origin.slope_to(p);
        if rising {
            if slope >= 0.0 && slope < peak {
                peak = slope;
                at = i;
            }
        } else if slope <= 0.0 && slope > peak {
            peak = slope;
            at = i;
        }
    }
    (peak, at)
}

fn distance(anchor: Point, slope: f64, p: &Point) -> f64 {
    (slope * p.x - p.y + (anchor.y - slope * anchor.x)).abs() / (slope * slope + 1.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::testing::zigzag;

    #[test]
    fn test_rising_support() {
        // higher lows: 10, 12, 14
        let lines = zigzag(&[10.0, 20.0, 12.0, 22.0, 14.0, 24.0]);
        let support = TrendLine::fit(&lines, TrendSide::Inside).unwrap();
        assert!(support.slope > 0.0);
        assert!((support.value_at(16) - 14.0).abs() < 1e-9);
        assert!((support.value_at(8) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_resistance_through_falling_tops() {
        // tops at bars 4, 12, 20 fall 24, 22, 20
        let lines = zigzag(&[10.0, 24.0, 12.0, 22.0, 14.0, 20.0]);
        let resistance = TrendLine::fit(&lines, TrendSide::Outside).unwrap();
        assert_eq!(resistance.side, TrendSide::Outside);
        assert!(resistance.slope < 0.0);
        assert!((resistance.value_at(4) - 24.0).abs() < 1e-9);

        // rising tops leave no converging resistance
        let rising = zigzag(&[10.0, 20.0, 12.0, 22.0, 14.0, 24.0]);
        assert!(TrendLine::fit(&rising, TrendSide::Outside).is_none());
    }

    #[test]
    fn test_no_admissible_slope() {
        // falling lows give no rising support line
        let lines = zigzag(&[14.0, 20.0, 12.0, 22.0, 10.0, 24.0]);
        assert!(TrendLine::fit(&lines, TrendSide::Inside).is_none());
        assert!(TrendLine::fit(&[], TrendSide::Inside).is_none());
    }
}
