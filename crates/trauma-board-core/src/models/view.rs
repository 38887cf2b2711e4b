//! Tab views and the editing rights each one grants.

use serde::{Deserialize, Serialize};

use std::fmt;

use super::patient::{Patient, PatientField};
use super::section::Section;

/// The four top-level tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabView {
    Theatre,
    Board,
    Completed,
    Archive,
}

/// Row-level affordances offered by a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Reassign to another board section
    Move,
    /// Book into a theatre slot
    Schedule,
    /// Move to a different theatre slot
    Reschedule,
    ReturnToBoard,
    Complete,
    Archive,
    Delete,
}

impl TabView {
    /// The tab a patient is currently shown on. A booked slot wins over section.
    pub fn of(patient: &Patient) -> TabView {
        if patient.is_scheduled() {
            return TabView::Theatre;
        }
        match patient.section {
            Section::MetalworkReview => TabView::Completed,
            Section::Archive => TabView::Archive,
            _ => TabView::Board,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TabView::Theatre => "Theatre List",
            TabView::Board => "Trauma Board",
            TabView::Completed => "Completed Cases",
            TabView::Archive => "Archive",
        }
    }

    /// Whether a field can be edited from this tab.
    pub fn can_edit(&self, field: PatientField) -> bool {
        match self {
            TabView::Archive => field == PatientField::Notes,
            TabView::Completed => field == PatientField::Outcome,
            TabView::Theatre => {
                matches!(field, PatientField::Diagnosis | PatientField::Outcome)
            }
            // Notes only open up once a patient is archived
            TabView::Board => field != PatientField::Notes,
        }
    }

    pub fn editable_fields(&self) -> Vec<PatientField> {
        PatientField::ALL
            .iter()
            .copied()
            .filter(|field| self.can_edit(*field))
            .collect()
    }

    pub fn actions(&self) -> &'static [Action] {
        match self {
            TabView::Board => &[Action::Move, Action::Schedule, Action::Delete],
            TabView::Theatre => &[
                Action::ReturnToBoard,
                Action::Complete,
                Action::Reschedule,
                Action::Delete,
            ],
            TabView::Completed => &[Action::Archive, Action::Delete],
            TabView::Archive => &[Action::Delete],
        }
    }

    pub fn offers(&self, action: Action) -> bool {
        self.actions().contains(&action)
    }

    /// Whether the surgery date column is shown.
    pub fn shows_surgery_date(&self) -> bool {
        matches!(self, TabView::Completed | TabView::Archive)
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Move => "move",
            Action::Schedule => "schedule",
            Action::Reschedule => "reschedule",
            Action::ReturnToBoard => "return_to_board",
            Action::Complete => "complete",
            Action::Archive => "archive",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for TabView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}
