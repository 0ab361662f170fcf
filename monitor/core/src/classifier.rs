//! Congestion Classification
//!
//! Maps a delay in minutes to a [`Severity`]. The thresholds are loaded from
//! configuration; [`Thresholds::default`] gives the stock cut-offs
//! (≤ 2 low, 3–10 moderate, > 10 high).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordered congestion classification
///
/// The derived ordering is `Low < Moderate < High`, which is what
/// [`worst`] relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Traffic flows close to normal
    Low,
    /// Noticeable delay
    Moderate,
    /// Heavy congestion
    High,
}

impl Severity {
    /// Label used in durable logs and snapshots
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MODERATE" => Ok(Self::Moderate),
            "HIGH" => Ok(Self::High),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Delay cut-offs (inclusive upper bounds, in minutes)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Largest delay still classified as [`Severity::Low`]
    pub low_max: u32,
    /// Largest delay still classified as [`Severity::Moderate`]
    pub moderate_max: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_max: 2,
            moderate_max: 10,
        }
    }
}

impl Thresholds {
    /// Create thresholds; callers validate `low_max < moderate_max`
    #[must_use]
    pub fn new(low_max: u32, moderate_max: u32) -> Self {
        Self {
            low_max,
            moderate_max,
        }
    }

    /// Whether the cut-offs are strictly increasing
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.low_max < self.moderate_max
    }

    /// Classify a delay
    #[must_use]
    pub fn classify(&self, delay_minutes: u32) -> Severity {
        if delay_minutes <= self.low_max {
            Severity::Low
        } else if delay_minutes <= self.moderate_max {
            Severity::Moderate
        } else {
            Severity::High
        }
    }
}

/// Classify a delay with the default thresholds
#[must_use]
pub fn classify(delay_minutes: u32) -> Severity {
    Thresholds::default().classify(delay_minutes)
}

/// Worst severity of a set, `None` when the set is empty
pub fn worst<I>(severities: I) -> Option<Severity>
where
    I: IntoIterator<Item = Severity>,
{
    severities.into_iter().max()
}
