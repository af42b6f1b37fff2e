//! Cross-level snapshots returned by the driver.

use serde::Serialize;

use chan_core::{RawBar, Timeframe};

use crate::level::Level;
use crate::line::Line;
use crate::pivot::PivotZone;
use crate::signal::Signal;

/// State of every level after one driver call.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Coarsest-level bars consumed
    pub step: usize,
    /// Levels, coarsest first
    pub levels: Vec<LevelSnapshot>,
}

/// Counts and tails of one level.
#[derive(Debug, Clone, Serialize)]
pub struct LevelSnapshot {
    pub timeframe: Timeframe,
    pub bars: usize,
    pub merged: usize,
    pub strokes: usize,
    pub final_strokes: usize,
    pub segments: usize,
    pub final_segments: usize,
    pub zones: usize,
    pub last_bar: Option<RawBar>,
    pub last_stroke: Option<Line>,
    pub last_segment: Option<Line>,
    pub last_zone: Option<PivotZone>,
    pub signals: Vec<Signal>,
    pub segment_signals: Vec<Signal>,
}

impl LevelSnapshot {
    pub fn capture(level: &Level) -> Self {
        Self {
            timeframe: level.timeframe(),
            bars: level.bars().len(),
            merged: level.merged().len(),
            strokes: level.strokes().len(),
            final_strokes: level.strokes().iter().filter(|s| s.is_final()).count(),
            segments: level.segments().len(),
            final_segments: level.segments().iter().filter(|s| s.is_final()).count(),
            zones: level.stroke_zones().len(),
            last_bar: level.bars().last().copied(),
            last_stroke: level.stroke_lines().last().copied(),
            last_segment: level.segment_lines().last().copied(),
            last_zone: level.stroke_zones().last().cloned(),
            signals: level.stroke_signals().to_vec(),
            segment_signals: level.segment_signals().to_vec(),
        }
    }
}

impl Snapshot {
    pub fn capture(step: usize, levels: &[Level]) -> Self {
        Self {
            step,
            levels: levels.iter().map(LevelSnapshot::capture).collect(),
        }
    }

    pub fn level(&self, timeframe: Timeframe) -> Option<&LevelSnapshot> {
        self.levels.iter().find(|l| l.timeframe == timeframe)
    }

    /// Generate a text summary.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("STEP {}\n", self.step));
        for level in &self.levels {
            s.push_str("───────────────────────────────────────────────────────────\n");
            s.push_str(&format!("  Level:               {}\n", level.timeframe));
            s.push_str(&format!("  Bars:                {}\n", level.bars));
            s.push_str(&format!("  Merged Bars:         {}\n", level.merged));
            s.push_str(&format!(
                "  Strokes:             {} ({} final)\n",
                level.strokes, level.final_strokes
            ));
            s.push_str(&format!(
                "  Segments:            {} ({} final)\n",
                level.segments, level.final_segments
            ));
            s.push_str(&format!("  Pivot Zones:         {}\n", level.zones));
            if let Some(zone) = &level.last_zone {
                s.push_str(&format!(
                    "  Last Zone:           [{:.4}, {:.4}] lines {}..={}\n",
                    zone.low, zone.high, zone.begin, zone.end
                ));
            }
            s.push_str(&format!(
                "  Signals:             {} stroke / {} segment\n",
                level.signals.len(),
                level.segment_signals.len()
            ));
            for signal in level.signals.iter().rev().take(5).rev() {
                let types: Vec<&str> = signal.types.iter().map(|t| t.name()).collect();
                s.push_str(&format!(
                    "    {:<4} {:<8} at {}{}\n",
                    signal.side.to_string(),
                    types.join(","),
                    signal.timestamp,
                    if signal.is_final() { "" } else { " (provisional)" }
                ));
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chan_core::Bar;

    use crate::config::ChanConfig;

    #[test]
    fn test_capture_counts() {
        let mut level = Level::new(Timeframe::Daily, &ChanConfig::default());
        for (i, p) in [10.0, 12.0, 11.0].iter().enumerate() {
            level
                .push_bar(Bar::new(i as i64 * 86_400_000, *p, p + 1.0, p - 1.0, *p))
                .unwrap();
        }
        level.recompute().unwrap();
        let snapshot = Snapshot::capture(3, std::slice::from_ref(&level));
        let lv = snapshot.level(Timeframe::Daily).unwrap();
        assert_eq!(lv.bars, 3);
        assert_eq!(lv.last_bar.map(|b| b.idx), Some(2));
        assert!(snapshot.summary().contains("Level:               1d"));
    }
}
