//! Core data types for the chan structure engine.

mod bar;
mod direction;
mod timeframe;

pub use bar::{Bar, RawBar, TradeMetrics};
pub use direction::{Direction, Fractal, MergeDir};
pub use timeframe::Timeframe;
