//! Streaming momentum indicators.
//!
//! The structure engine measures the strength of strokes and segments with a
//! configurable momentum metric. Bar-based metrics read per-bar values that
//! these indicators produce while bars are ingested:
//! - MACD (DIF, DEA and histogram)
//! - RSI (Wilder smoothing)

pub mod momentum;

pub use momentum::{Macd, MacdPoint, Rsi};
