//! Row urgency from the age of a referral.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::dates::parse_display_date;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Visual urgency tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::Warning => "warning",
            Urgency::Critical => "critical",
        }
    }
}

/// Day counts at which a referral escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyThresholds {
    pub warning_days: i64,
    pub critical_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            warning_days: 7,
            critical_days: 14,
        }
    }
}

impl UrgencyThresholds {
    pub fn classify_days(&self, days: i64) -> Urgency {
        if days >= self.critical_days {
            Urgency::Critical
        } else if days >= self.warning_days {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}

/// Whole days since local midnight of the referral date, floored.
pub fn days_since_referral(referral_date: &str, now: NaiveDateTime) -> Option<i64> {
    let referred = parse_display_date(referral_date)?.and_hms_opt(0, 0, 0)?;
    let elapsed = (now - referred).num_milliseconds();
    Some(elapsed.div_euclid(MILLIS_PER_DAY))
}

/// Classify a referral. Unparseable dates are never highlighted.
pub fn classify(referral_date: &str, now: NaiveDateTime, thresholds: &UrgencyThresholds) -> Urgency {
    days_since_referral(referral_date, now)
        .map(|days| thresholds.classify_days(days))
        .unwrap_or(Urgency::Normal)
}

/// Classify against the local clock with default thresholds.
pub fn classify_now(referral_date: &str) -> Urgency {
    classify(
        referral_date,
        Local::now().naive_local(),
        &UrgencyThresholds::default(),
    )
}
