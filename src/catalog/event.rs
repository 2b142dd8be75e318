//! Event Records
//!
//! The cards of the game: historical events with a year and an optional
//! exact calendar date used for same-year tie breaking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique event identifier.
pub type EventId = Uuid;

/// Card difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Regular cards, available in every mode.
    Normal,
    /// Easier cards for junior mode.
    Easy,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Normal
    }
}

/// A historical event card. Immutable once dealt into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: EventId,
    /// Display title.
    pub title: String,
    /// Year the event happened.
    pub year: i32,
    /// Exact date, when known. Used to break same-year ties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_date: Option<NaiveDate>,
    /// Illustration URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Difficulty tier.
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl EventRecord {
    /// Chronological ordering key: events without an exact date sort
    /// before dated events within the same year.
    pub fn order_key(&self) -> (i32, NaiveDate) {
        (self.year, self.exact_date.unwrap_or(NaiveDate::MIN))
    }

    /// Two events conflict when they cannot be unambiguously ordered:
    /// same year, and at least one of them lacks an exact date.
    pub fn conflicts_with(&self, other: &EventRecord) -> bool {
        self.year == other.year && (self.exact_date.is_none() || other.exact_date.is_none())
    }
}
