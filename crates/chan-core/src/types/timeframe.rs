//! Timeframe definitions for bar levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timeframe of a bar level.
///
/// Variants are declared from finest to coarsest, so the derived ordering
/// compares bucket length.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Timeframe {
    /// 1 minute bars
    #[serde(rename = "1m")]
    Minute1,
    /// 3 minute bars
    #[serde(rename = "3m")]
    Minute3,
    /// 5 minute bars
    #[serde(rename = "5m")]
    Minute5,
    /// 15 minute bars
    #[serde(rename = "15m")]
    Minute15,
    /// 30 minute bars
    #[serde(rename = "30m")]
    Minute30,
    /// 1 hour bars
    #[serde(rename = "1h")]
    Hour1,
    /// 4 hour bars
    #[serde(rename = "4h")]
    Hour4,
    /// Daily bars
    #[serde(rename = "1d")]
    #[default]
    Daily,
    /// Weekly bars
    #[serde(rename = "1w")]
    Weekly,
    /// Monthly bars
    #[serde(rename = "1M")]
    Monthly,
    /// Quarterly bars
    #[serde(rename = "1Q")]
    Quarterly,
    /// Yearly bars
    #[serde(rename = "1Y")]
    Yearly,
}

impl Timeframe {
    /// Get the duration of the timeframe in seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            Timeframe::Minute1 => 60,
            Timeframe::Minute3 => 180,
            Timeframe::Minute5 => 300,
            Timeframe::Minute15 => 900,
            Timeframe::Minute30 => 1800,
            Timeframe::Hour1 => 3600,
            Timeframe::Hour4 => 14400,
            Timeframe::Daily => 86400,
            Timeframe::Weekly => 604800,
            Timeframe::Monthly => 2592000, // Approximate (30 days)
            Timeframe::Quarterly => 7776000,
            Timeframe::Yearly => 31536000,
        }
    }

    /// Check if this is an intraday timeframe.
    pub fn is_intraday(&self) -> bool {
        *self < Timeframe::Daily
    }

    /// Bars of this timeframe carry a meaningful calendar date.
    ///
    /// Parent and child bars are only checked for date consistency when both
    /// levels satisfy this.
    pub fn is_daily_or_finer(&self) -> bool {
        *self <= Timeframe::Daily
    }

    /// Get all available timeframes.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Minute1,
            Timeframe::Minute3,
            Timeframe::Minute5,
            Timeframe::Minute15,
            Timeframe::Minute30,
            Timeframe::Hour1,
            Timeframe::Hour4,
            Timeframe::Daily,
            Timeframe::Weekly,
            Timeframe::Monthly,
            Timeframe::Quarterly,
            Timeframe::Yearly,
        ]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute3 => "3m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Daily => "1d",
            Timeframe::Weekly => "1w",
            Timeframe::Monthly => "1M",
            Timeframe::Quarterly => "1Q",
            Timeframe::Yearly => "1Y",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) and "1m" (minute) differ only by case.
        if s == "1M" {
            return Ok(Timeframe::Monthly);
        }
        match s.to_lowercase().as_str() {
            "1m" | "1min" | "minute" => Ok(Timeframe::Minute1),
            "3m" | "3min" => Ok(Timeframe::Minute3),
            "5m" | "5min" => Ok(Timeframe::Minute5),
            "15m" | "15min" => Ok(Timeframe::Minute15),
            "30m" | "30min" => Ok(Timeframe::Minute30),
            "1h" | "60m" | "1hour" | "hour" => Ok(Timeframe::Hour1),
            "4h" | "4hour" => Ok(Timeframe::Hour4),
            "1d" | "day" | "daily" => Ok(Timeframe::Daily),
            "1w" | "week" | "weekly" => Ok(Timeframe::Weekly),
            "month" | "monthly" => Ok(Timeframe::Monthly),
            "1q" | "quarter" | "quarterly" => Ok(Timeframe::Quarterly),
            "1y" | "year" | "yearly" => Ok(Timeframe::Yearly),
            _ => Err(format!("Invalid timeframe: {}", s)),
        }
    }
}
