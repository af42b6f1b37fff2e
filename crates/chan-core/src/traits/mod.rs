//! Core traits for the chan structure engine.

mod bar_source;
mod indicator;

pub use bar_source::{BarSource, SourceProvider, VecSource};
pub use indicator::StreamingIndicator;
