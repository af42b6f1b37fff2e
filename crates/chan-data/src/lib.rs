//! Bar sources backed by CSV files.

mod csv_source;

pub use csv_source::{CsvBarSource, CsvProvider};

use std::path::Path;

use chan_core::{Bar, BarSource, DataError};

/// Load every bar of a CSV file.
pub fn load_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let mut source = CsvBarSource::open(path)?;
    let mut bars = Vec::new();
    while let Some(bar) = source.next_bar()? {
        bars.push(bar);
    }
    Ok(bars)
}
