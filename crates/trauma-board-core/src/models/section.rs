//! Workflow sections a patient can occupy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a section label is not one of the known sections.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown section: {0}")]
pub struct UnknownSection(pub String);

/// The closed set of workflow buckets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Section {
    #[default]
    NewCases,
    AwaitingSurgery,
    HipAndKnee,
    FootAndAnkle,
    ShoulderAndElbow,
    Hand,
    Discussion,
    OnwardReferrals,
    /// Post-operative review; entered only by completing a theatre slot
    MetalworkReview,
    /// Terminal
    Archive,
}

/// Board sections in display order.
pub const BOARD_SECTIONS: [Section; 8] = [
    Section::NewCases,
    Section::AwaitingSurgery,
    Section::HipAndKnee,
    Section::FootAndAnkle,
    Section::ShoulderAndElbow,
    Section::Hand,
    Section::Discussion,
    Section::OnwardReferrals,
];

const ALL_SECTIONS: [Section; 10] = [
    Section::NewCases,
    Section::AwaitingSurgery,
    Section::HipAndKnee,
    Section::FootAndAnkle,
    Section::ShoulderAndElbow,
    Section::Hand,
    Section::Discussion,
    Section::OnwardReferrals,
    Section::MetalworkReview,
    Section::Archive,
];

impl Section {
    /// Display label, exactly as shown on the board.
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::NewCases => "New Cases",
            Section::AwaitingSurgery => "Awaiting Surgery",
            Section::HipAndKnee => "Hip & Knee",
            Section::FootAndAnkle => "Foot & Ankle",
            Section::ShoulderAndElbow => "Shoulder & Elbow",
            Section::Hand => "Hand",
            Section::Discussion => "Discussion",
            Section::OnwardReferrals => "Onward Referrals",
            Section::MetalworkReview => "Metalwork Review",
            Section::Archive => "Archive",
        }
    }

    /// True for the eight sections shown on the Trauma Board tab.
    pub fn is_board(&self) -> bool {
        !matches!(self, Section::MetalworkReview | Section::Archive)
    }

    /// Case-insensitive comparison against a label.
    pub fn matches_label(&self, label: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(label.trim())
    }

    pub fn all() -> &'static [Section] {
        &ALL_SECTIONS
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = UnknownSection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_SECTIONS
            .iter()
            .copied()
            .find(|section| section.matches_label(s))
            .ok_or_else(|| UnknownSection(s.to_string()))
    }
}

impl TryFrom<String> for Section {
    type Error = UnknownSection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Section> for String {
    fn from(section: Section) -> Self {
        section.as_str().to_string()
    }
}
