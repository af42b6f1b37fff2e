//! Core types and traits for the chan structure engine.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Bar, RawBar, TradeMetrics, Timeframe)
//! - Direction and fractal tags shared by every structural layer
//! - Error taxonomy and accumulated warnings
//! - Traits for bar sources and streaming indicators

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ChanError, ChanResult, DataError, StructureError, Warning};
pub use traits::*;
pub use types::*;
