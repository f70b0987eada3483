#![forbid(unsafe_code)]

//! Composite key for legacy (per-chart) filter columns.
//!
//! Legacy filter scopes are persisted in maps keyed by `"{chartId}_{column}"`.
//! [`LegacyFilterKey`] is the typed form; [`Display`](fmt::Display) and
//! [`FromStr`] are the only places that know the string encoding. The chart
//! id is the digits before the first `_`; the column is everything after it
//! and may itself contain underscores.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::id::PanelId;

/// `{chartId, column}` pair identifying one legacy filter column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyFilterKey {
    pub chart_id: PanelId,
    pub column: String,
}

impl LegacyFilterKey {
    #[must_use]
    pub fn new(chart_id: PanelId, column: impl Into<String>) -> Self {
        Self {
            chart_id,
            column: column.into(),
        }
    }
}

/// Failure to parse a legacy filter key string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LegacyKeyError {
    #[error("legacy filter key {0:?} has no '_' separator")]
    MissingSeparator(String),
    #[error("legacy filter key {0:?} has a non-numeric chart id")]
    InvalidChartId(String),
    #[error("legacy filter key {0:?} has an empty column")]
    EmptyColumn(String),
}

impl fmt::Display for LegacyFilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.chart_id, self.column)
    }
}

impl FromStr for LegacyFilterKey {
    type Err = LegacyKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chart, column) = s
            .split_once('_')
            .ok_or_else(|| LegacyKeyError::MissingSeparator(s.to_owned()))?;
        if chart.is_empty() || !chart.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LegacyKeyError::InvalidChartId(s.to_owned()));
        }
        let chart_id = chart
            .parse::<u64>()
            .map_err(|_| LegacyKeyError::InvalidChartId(s.to_owned()))?;
        if column.is_empty() {
            return Err(LegacyKeyError::EmptyColumn(s.to_owned()));
        }
        Ok(Self::new(PanelId::new(chart_id), column))
    }
}

impl Serialize for LegacyFilterKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LegacyFilterKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
