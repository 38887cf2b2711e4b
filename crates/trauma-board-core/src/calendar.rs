//! Theatre calendar: the bookable AM/PM slots around today.

use std::fmt;

use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::dates::{format_display_date, parse_display_date};

/// First day of the window relative to today (yesterday).
pub const WINDOW_START_OFFSET: i64 = -1;

/// Number of calendar days in the window.
pub const WINDOW_DAYS: i64 = 8;

/// Half-day theatre session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Session {
    Am,
    Pm,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Am => "AM",
            Session::Pm => "PM",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookable theatre slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheatreSlot {
    /// `DD/MM/YYYY-AM`; joins against `Patient::theatre_slot`
    pub key: String,
    /// `Monday AM (DD/MM/YYYY)`
    pub label: String,
    pub date: NaiveDate,
    pub session: Session,
}

impl TheatreSlot {
    pub fn new(date: NaiveDate, session: Session) -> Self {
        let display = format_display_date(date);
        Self {
            key: format!("{}-{}", display, session),
            label: format!("{} {} ({})", date.format("%A"), session, display),
            date,
            session,
        }
    }

    /// Rebuild a slot from its key. Works for keys outside the current window.
    pub fn from_key(key: &str) -> Option<Self> {
        let (date, session) = key.trim().rsplit_once('-')?;
        let session = match session {
            "AM" => Session::Am,
            "PM" => Session::Pm,
            _ => return None,
        };
        parse_display_date(date).map(|date| Self::new(date, session))
    }
}

/// Text inside the first pair of parentheses of a slot label.
///
/// The surgery date recorded on completion is this substring, verbatim.
pub fn label_date(label: &str) -> Option<&str> {
    let start = label.find('(')? + 1;
    let len = label[start..].find(')')?;
    let inner = &label[start..start + len];
    (!inner.is_empty()).then_some(inner)
}

/// The rolling window of theatre slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TheatreCalendar {
    today: NaiveDate,
    slots: Vec<TheatreSlot>,
}

impl TheatreCalendar {
    /// Slots from yesterday through six days ahead, AM before PM.
    pub fn for_date(today: NaiveDate) -> Self {
        let slots = (WINDOW_START_OFFSET..WINDOW_START_OFFSET + WINDOW_DAYS)
            .map(|offset| today + Duration::days(offset))
            .flat_map(|date| {
                [
                    TheatreSlot::new(date, Session::Am),
                    TheatreSlot::new(date, Session::Pm),
                ]
            })
            .collect();
        Self { today, slots }
    }

    /// Calendar for the local date.
    pub fn today() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.today
    }

    pub fn slots(&self) -> &[TheatreSlot] {
        &self.slots
    }

    pub fn find(&self, key: &str) -> Option<&TheatreSlot> {
        self.slots.iter().find(|slot| slot.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Surgery date for a completed slot, read from the slot's label.
    pub fn surgery_date_for(&self, key: &str) -> Option<String> {
        match self.find(key) {
            Some(slot) => label_date(&slot.label).map(str::to_string),
            None => TheatreSlot::from_key(key)
                .and_then(|slot| label_date(&slot.label).map(str::to_string)),
        }
    }
}
