//! Accuracy levels and the thresholds that define them.
//!
//! A fix satisfies a level when both its horizontal accuracy and its age are
//! within that level's limits:
//!
//! | level        | max distance | max age |
//! |--------------|--------------|---------|
//! | City         | 5000 m       | 600 s   |
//! | Neighborhood | 1000 m       | 300 s   |
//! | Block        | 100 m        | 60 s    |
//! | House        | 15 m         | 15 s    |
//! | Room         | 5 m          | 5 s     |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How precise and how fresh a location fix is (or has to be).
///
/// Ordered from least to most precise, so `max` picks the stricter level.
/// [`AccuracyLevel::None`] is only meaningful as an *achieved* level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyLevel {
    /// No usable fix.
    #[default]
    None,
    /// Roughly 5 km, up to 10 minutes old.
    City,
    /// Roughly 1 km, up to 5 minutes old.
    Neighborhood,
    /// Roughly 100 m, up to 1 minute old.
    Block,
    /// Roughly 15 m, up to 15 seconds old.
    House,
    /// Roughly 5 m, up to 5 seconds old.
    Room,
}

impl AccuracyLevel {
    /// Every level that can be requested, most precise first.
    pub const REQUESTABLE: [Self; 5] = [
        Self::Room,
        Self::House,
        Self::Block,
        Self::Neighborhood,
        Self::City,
    ];

    /// Whether this level may be used as a desired accuracy.
    #[must_use]
    pub const fn is_requestable(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Thresholds for this level, `None` for [`AccuracyLevel::None`].
    #[must_use]
    pub const fn thresholds(self) -> Option<Thresholds> {
        AccuracyPolicy::thresholds(self)
    }

    /// Lowercase name, matching the serde and `FromStr` representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::City => "city",
            Self::Neighborhood => "neighborhood",
            Self::Block => "block",
            Self::House => "house",
            Self::Room => "room",
        }
    }
}

impl fmt::Display for AccuracyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown accuracy level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown accuracy level: {0}")]
pub struct ParseAccuracyLevelError(pub String);

impl FromStr for AccuracyLevel {
    type Err = ParseAccuracyLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "city" => Ok(Self::City),
            "neighborhood" | "neighbourhood" => Ok(Self::Neighborhood),
            "block" => Ok(Self::Block),
            "house" => Ok(Self::House),
            "room" => Ok(Self::Room),
            _ => Err(ParseAccuracyLevelError(s.to_string())),
        }
    }
}

/// Limits a fix has to respect to satisfy an [`AccuracyLevel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Largest acceptable horizontal accuracy radius, in meters.
    pub max_horizontal_distance: f64,
    /// Oldest acceptable fix.
    pub max_age: Duration,
}

impl Thresholds {
    /// Whether a fix with this horizontal accuracy and age is good enough.
    ///
    /// Negative (invalid) or NaN accuracies never qualify.
    #[must_use]
    pub fn is_met_by(&self, horizontal_accuracy: f64, age: Duration) -> bool {
        horizontal_accuracy >= 0.0
            && horizontal_accuracy <= self.max_horizontal_distance
            && age <= self.max_age
    }
}

/// The fixed accuracy table plus the operations built on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyPolicy;

impl AccuracyPolicy {
    /// Thresholds for `level`, `None` for [`AccuracyLevel::None`].
    #[must_use]
    pub const fn thresholds(level: AccuracyLevel) -> Option<Thresholds> {
        let (meters, seconds) = match level {
            AccuracyLevel::None => return None,
            AccuracyLevel::City => (5000.0, 600),
            AccuracyLevel::Neighborhood => (1000.0, 300),
            AccuracyLevel::Block => (100.0, 60),
            AccuracyLevel::House => (15.0, 15),
            AccuracyLevel::Room => (5.0, 5),
        };
        Some(Thresholds {
            max_horizontal_distance: meters,
            max_age: Duration::from_secs(seconds),
        })
    }

    /// The stricter of two levels.
    #[must_use]
    pub fn best(a: AccuracyLevel, b: AccuracyLevel) -> AccuracyLevel {
        a.max(b)
    }

    /// The most precise level a fix satisfies, [`AccuracyLevel::None`] if it
    /// satisfies none.
    #[must_use]
    pub fn achieved_for(horizontal_accuracy: f64, age: Duration) -> AccuracyLevel {
        AccuracyLevel::REQUESTABLE
            .into_iter()
            .find(|level| {
                Self::thresholds(*level)
                    .is_some_and(|limits| limits.is_met_by(horizontal_accuracy, age))
            })
            .unwrap_or(AccuracyLevel::None)
    }
}
