//! CSV bar source.

use chrono::{NaiveDate, NaiveDateTime};
use csv::{DeserializeRecordsIntoIter, ReaderBuilder};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use chan_core::{Bar, BarSource, DataError, SourceProvider, Timeframe, TradeMetrics};

/// CSV record format.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(alias = "Date", alias = "timestamp", alias = "Timestamp", alias = "time")]
    date: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", default)]
    volume: Option<f64>,
    #[serde(alias = "Amount", alias = "turnover", default)]
    amount: Option<f64>,
    #[serde(alias = "turnrate", default)]
    turnover_rate: Option<f64>,
}

type Records = DeserializeRecordsIntoIter<Box<dyn Read + Send>, CsvRecord>;

/// Streams bars from CSV in file order.
///
/// Rows must already be sorted oldest first; the engine rejects anything
/// else. Dates without a time of day are stamped 23:59 so that intraday
/// bars of the same day fall under them.
pub struct CsvBarSource {
    name: String,
    records: Records,
}

impl CsvBarSource {
    /// Open a CSV file.
    pub fn open(path: &Path) -> Result<Self, DataError> {
        if !path.exists() {
            return Err(DataError::NotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        Ok(Self::from_reader(path.display().to_string(), file))
    }

    /// Read CSV from any reader.
    pub fn from_reader(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        let reader: Box<dyn Read + Send> = Box::new(reader);
        let records = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader)
            .into_deserialize();
        Self {
            name: name.into(),
            records,
        }
    }
}

impl BarSource for CsvBarSource {
    fn next_bar(&mut self) -> Result<Option<Bar>, DataError> {
        let Some(result) = self.records.next() else {
            return Ok(None);
        };
        let record: CsvRecord = result.map_err(|e| DataError::ParseError(e.to_string()))?;
        let timestamp = parse_timestamp(&record.date)?;
        Ok(Some(Bar {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            trade: TradeMetrics {
                volume: record.volume,
                turnover: record.amount,
                turnover_rate: record.turnover_rate,
            },
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Parse various timestamp formats to Unix milliseconds.
fn parse_timestamp(date_str: &str) -> Result<i64, DataError> {
    let datetime_formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M", "%Y-%m-%dT%H:%M:%S"];
    for format in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }

    let date_formats = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
    for format in date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(date_str, format) {
            if let Some(dt) = d.and_hms_opt(23, 59, 0) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }
    }

    // Unix timestamp, milliseconds when longer than ten digits
    if let Ok(ts) = date_str.parse::<i64>() {
        return Ok(if ts > 10_000_000_000 { ts } else { ts * 1000 });
    }

    Err(DataError::ParseError(format!(
        "Could not parse date: {}",
        date_str
    )))
}

/// Opens one CSV file per timeframe.
#[derive(Debug, Clone, Default)]
pub struct CsvProvider {
    paths: HashMap<Timeframe, PathBuf>,
}

impl CsvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, timeframe: Timeframe, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(timeframe, path.into());
        self
    }
}

impl SourceProvider for CsvProvider {
    fn open(&self, timeframe: Timeframe) -> Result<Box<dyn BarSource>, DataError> {
        let path = self
            .paths
            .get(&timeframe)
            .ok_or_else(|| DataError::NotFound(format!("no file configured for {}", timeframe)))?;
        debug!(%timeframe, path = %path.display(), "opening csv source");
        Ok(Box::new(CsvBarSource::open(path)?))
    }
}
