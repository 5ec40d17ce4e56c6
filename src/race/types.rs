//! Event / division / entrant records

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Odds written for an entrant with no quote (scratched or not yet priced).
pub const NO_QUOTE_ODDS: f64 = 99.99;

/// Canonical shoe configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Equipment {
    Shod,
    BareFrontShodRear,
    ShodFrontBareRear,
    Barefoot,
    #[default]
    Unknown,
}

impl Equipment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shod => "shod",
            Self::BareFrontShodRear => "bare-front-shod-rear",
            Self::ShodFrontBareRear => "shod-front-bare-rear",
            Self::Barefoot => "barefoot",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }

    /// Combine independent front and rear readings.
    pub fn from_front_rear(front_barefoot: bool, rear_barefoot: bool) -> Self {
        match (front_barefoot, rear_barefoot) {
            (true, true) => Self::Barefoot,
            (true, false) => Self::BareFrontShodRear,
            (false, true) => Self::ShodFrontBareRear,
            (false, false) => Self::Shod,
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One horse-and-driver pairing in one division.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entrant {
    pub number: u32,
    pub track: u32,
    pub name: String,
    pub driver_name: String,
    #[serde(default)]
    pub trainer: String,
    #[serde(default)]
    pub record_time: String,
    #[serde(default)]
    pub prize_money: u64,
    pub v75_percent: f64,
    pub trend_percent: f64,
    pub win_odds: f64,
    pub place_odds: f64,
    #[serde(default)]
    pub equipment: Equipment,
    pub scratched: bool,
}

impl Entrant {
    /// A fresh entrant at display position `position` (1-based), unquoted.
    pub fn new(position: u32, name: impl Into<String>) -> Self {
        Self {
            number: position,
            track: position,
            name: name.into(),
            driver_name: placeholder_driver(position),
            trainer: String::new(),
            record_time: String::new(),
            prize_money: 0,
            v75_percent: 0.0,
            trend_percent: 0.0,
            win_odds: NO_QUOTE_ODDS,
            place_odds: NO_QUOTE_ODDS,
            equipment: Equipment::Unknown,
            scratched: false,
        }
    }

    /// A scratched entrant carries no market data.
    pub fn enforce_scratch_invariant(&mut self) {
        if self.scratched {
            self.v75_percent = 0.0;
            self.trend_percent = 0.0;
            self.win_odds = NO_QUOTE_ODDS;
            self.place_odds = NO_QUOTE_ODDS;
        }
    }

    pub fn satisfies_scratch_invariant(&self) -> bool {
        !self.scratched
            || (self.v75_percent == 0.0
                && self.trend_percent == 0.0
                && self.win_odds == NO_QUOTE_ODDS
                && self.place_odds == NO_QUOTE_ODDS)
    }
}

/// The rendered start list does not expose the driver reliably, so the
/// driver column holds a positional placeholder.
pub fn placeholder_driver(position: u32) -> String {
    format!("Driver {}", position)
}

/// One race within an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Division {
    pub division_number: u32,
    pub title: String,
    pub distance: String,
    pub event_type: String,
    pub entrants: Vec<Entrant>,
}

/// One racing day for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub date: NaiveDate,
    pub track_name: String,
    pub event_type: String,
    pub divisions: Vec<Division>,
}

impl Event {
    pub fn entrant_count(&self) -> usize {
        self.divisions.iter().map(|d| d.entrants.len()).sum()
    }
}
