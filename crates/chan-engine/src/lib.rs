//! Structure engine.
//!
//! Turns time-ordered price bars into a layered reading of the market, one
//! complete hierarchy per timeframe:
//! - Merged bars with direction and fractal tags
//! - Strokes between confirmed opposite fractals
//! - Segments from characteristic-sequence fractals, plus segments of segments
//! - Pivot zones with combining and nesting
//! - Typed buy/sell points
//!
//! [`Chan`] drives several levels at once, coarsest first, in batch, stepwise
//! or push mode.

pub mod combiner;
pub mod config;
pub mod driver;
pub mod level;
pub mod line;
pub mod merged;
pub mod metric;
pub mod pivot;
pub mod segment;
pub mod signal;
pub mod snapshot;
pub mod stroke;
pub mod trend_line;

pub use config::{
    AlignmentConfig, BarConfig, ChanConfig, FractalCheck, LineLevel, MetricConfig, PivotAlgo,
    PivotCombine, PivotConfig, PointConfig, PointOverrides, ReplayConfig, SegmentAlgorithm,
    SegmentConfig, SignalConfig, StrokeConfig, StrokeMode, TrailingPolicy,
};
pub use driver::{Chan, Steps};
pub use level::Level;
pub use line::Line;
pub use merged::{MergedBar, MergedBars};
pub use metric::MomentumMetric;
pub use pivot::PivotZone;
pub use segment::{Segment, SegmentReason};
pub use signal::{PointType, Side, Signal};
pub use snapshot::{LevelSnapshot, Snapshot};
pub use stroke::{Stroke, StrokeState};
pub use trend_line::{TrendLine, TrendSide};
