//! Feed identifiers.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the independent upstream data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Numerical-model grid files
    Grid,
    /// Per-station forecast packages
    Forecast,
    /// Per-station observation reports
    Report,
}

impl FeedKind {
    /// All feeds, in startup order.
    pub const ALL: [FeedKind; 3] = [FeedKind::Grid, FeedKind::Forecast, FeedKind::Report];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Grid => "grid",
            FeedKind::Forecast => "forecast",
            FeedKind::Report => "report",
        }
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grid" => Ok(FeedKind::Grid),
            "forecast" => Ok(FeedKind::Forecast),
            "report" => Ok(FeedKind::Report),
            other => Err(format!(
                "Unknown feed: {}. Use 'grid', 'forecast' or 'report'.",
                other
            )),
        }
    }
}
