use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Candle granularities tracked by the engine, ordered finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    OneHour,
    FourHour,
}

impl Timeframe {
    /// Every timeframe in ascending order of duration.
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneMin,
        Timeframe::FiveMin,
        Timeframe::FifteenMin,
        Timeframe::OneHour,
        Timeframe::FourHour,
    ];

    /// Returns the duration of this timeframe in minutes
    pub fn to_minutes(&self) -> u64 {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::OneHour => 60,
            Timeframe::FourHour => 240,
        }
    }

    /// Returns the duration in seconds
    pub fn to_seconds(&self) -> i64 {
        (self.to_minutes() * 60) as i64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.to_minutes() * 60)
    }

    /// Converts to the interval string most exchanges accept ("1m", "4h", ...)
    pub fn to_interval_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
        }
    }

    pub fn is_finest(&self) -> bool {
        *self == Timeframe::OneMin
    }

    /// The timeframe one step coarser, used for consensus checks.
    pub fn next_coarser(&self) -> Option<Timeframe> {
        match self {
            Timeframe::OneMin => Some(Timeframe::FiveMin),
            Timeframe::FiveMin => Some(Timeframe::FifteenMin),
            Timeframe::FifteenMin => Some(Timeframe::OneHour),
            Timeframe::OneHour => Some(Timeframe::FourHour),
            Timeframe::FourHour => None,
        }
    }

    /// Returns the start timestamp (ms) of the period containing `timestamp_ms`.
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        let period_ms = self.to_seconds() * 1000;
        timestamp_ms - timestamp_ms.rem_euclid(period_ms)
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" | "onemin" => Ok(Timeframe::OneMin),
            "5m" | "5min" | "fivemin" => Ok(Timeframe::FiveMin),
            "15m" | "15min" | "fifteenmin" => Ok(Timeframe::FifteenMin),
            "1h" | "1hour" | "onehour" => Ok(Timeframe::OneHour),
            "4h" | "4hour" | "fourhour" => Ok(Timeframe::FourHour),
            _ => Err(anyhow!(
                "Invalid timeframe: '{}'. Valid options: 1m, 5m, 15m, 1h, 4h",
                s
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_interval_string())
    }
}
