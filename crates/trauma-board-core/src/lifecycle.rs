//! Patient lifecycle: sections, theatre booking and their side effects.
//!
//! ```text
//!   add ──► New Cases ◄──move──► any board section
//!               │                      │
//!               └──────schedule────────┘
//!                          │  ▲
//!                          ▼  │ return
//!                    theatre slot ──reschedule──► other slot
//!                          │
//!                       complete (surgery date := label date)
//!                          ▼
//!                  Metalwork Review ──archive──► Archive
//! ```
//!
//! Planning is pure: each `plan_*` checks the current record and returns the
//! patch to apply. [`Lifecycle`] applies planned patches to a store. A
//! rejected transition leaves the record untouched.

use thiserror::Error;

use crate::calendar::TheatreCalendar;
use crate::dates::input_to_display;
use crate::models::{Patient, PatientField, PatientPatch, Section, TabView};
use crate::store::PatientStore;

/// Lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Patient not found: {0}")]
    NotFound(i64),

    #[error("Patient {0} is already booked into theatre")]
    AlreadyScheduled(i64),

    #[error("Patient {0} is not booked into theatre")]
    NotScheduled(i64),

    #[error("Patient {id} is not on the board (section: {section})")]
    NotOnBoard { id: i64, section: Section },

    #[error("{0} is not a board section")]
    NotBoardSection(Section),

    #[error("Unknown theatre slot: {0}")]
    UnknownSlot(String),

    #[error("Patient {id} must be in Metalwork Review to archive (section: {section})")]
    NotInMetalworkReview { id: i64, section: Section },

    #[error("Patient {id} is not shown on the {view} tab")]
    NotInView { id: i64, view: TabView },

    #[error("{field} cannot be edited from the {view} tab")]
    NotEditable { view: TabView, field: PatientField },
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

fn require_unscheduled_board(patient: &Patient) -> LifecycleResult<()> {
    if patient.is_scheduled() {
        return Err(LifecycleError::AlreadyScheduled(patient.id));
    }
    if !patient.section.is_board() {
        return Err(LifecycleError::NotOnBoard {
            id: patient.id,
            section: patient.section,
        });
    }
    Ok(())
}

fn require_scheduled(patient: &Patient) -> LifecycleResult<&str> {
    patient
        .theatre_slot
        .as_deref()
        .ok_or(LifecycleError::NotScheduled(patient.id))
}

/// Move a board patient to another board section.
pub fn plan_reassign(patient: &Patient, target: Section) -> LifecycleResult<PatientPatch> {
    require_unscheduled_board(patient)?;
    if !target.is_board() {
        return Err(LifecycleError::NotBoardSection(target));
    }
    Ok(PatientPatch::new().section(target))
}

/// Book a board patient into a slot of the current window. Section is kept.
pub fn plan_schedule(
    patient: &Patient,
    slot_key: &str,
    calendar: &TheatreCalendar,
) -> LifecycleResult<PatientPatch> {
    require_unscheduled_board(patient)?;
    if !calendar.contains(slot_key) {
        return Err(LifecycleError::UnknownSlot(slot_key.to_string()));
    }
    Ok(PatientPatch::new().theatre_slot(Some(slot_key.to_string())))
}

/// Move a booked patient to a different slot.
pub fn plan_reschedule(
    patient: &Patient,
    slot_key: &str,
    calendar: &TheatreCalendar,
) -> LifecycleResult<PatientPatch> {
    require_scheduled(patient)?;
    if !calendar.contains(slot_key) {
        return Err(LifecycleError::UnknownSlot(slot_key.to_string()));
    }
    Ok(PatientPatch::new().theatre_slot(Some(slot_key.to_string())))
}

/// Take a patient off the theatre list. The section never changed while
/// booked, so clearing the slot is the whole restore.
pub fn plan_return(patient: &Patient) -> LifecycleResult<PatientPatch> {
    require_scheduled(patient)?;
    Ok(PatientPatch::new().theatre_slot(None))
}

/// Record surgery and move to Metalwork Review.
///
/// The surgery date is the text inside the parentheses of the slot label, not
/// a date recomputed from the key. A label format change breaks this.
pub fn plan_complete(patient: &Patient, calendar: &TheatreCalendar) -> LifecycleResult<PatientPatch> {
    let slot_key = require_scheduled(patient)?;
    let surgery_date = calendar
        .surgery_date_for(slot_key)
        .ok_or_else(|| LifecycleError::UnknownSlot(slot_key.to_string()))?;

    Ok(PatientPatch::new()
        .surgery_date(Some(surgery_date))
        .section(Section::MetalworkReview)
        .theatre_slot(None))
}

/// Archive a post-operative patient. Archive is terminal.
pub fn plan_archive(patient: &Patient) -> LifecycleResult<PatientPatch> {
    if patient.section != Section::MetalworkReview || patient.is_scheduled() {
        return Err(LifecycleError::NotInMetalworkReview {
            id: patient.id,
            section: patient.section,
        });
    }
    Ok(PatientPatch::new().section(Section::Archive))
}

/// Edit one attribute from the tab the patient is shown on.
pub fn plan_edit(
    patient: &Patient,
    view: TabView,
    field: PatientField,
    value: String,
) -> LifecycleResult<PatientPatch> {
    if TabView::of(patient) != view {
        return Err(LifecycleError::NotInView {
            id: patient.id,
            view,
        });
    }
    if !view.can_edit(field) {
        return Err(LifecycleError::NotEditable { view, field });
    }
    Ok(PatientPatch::new().field(field, value))
}

/// Applies lifecycle transitions to a store.
pub struct Lifecycle<'a> {
    store: &'a mut PatientStore,
    calendar: &'a TheatreCalendar,
}

impl<'a> Lifecycle<'a> {
    pub fn new(store: &'a mut PatientStore, calendar: &'a TheatreCalendar) -> Self {
        Self { store, calendar }
    }

    /// Create a blank referral in New Cases.
    pub fn add_patient(&mut self) -> Patient {
        let patient = Patient::new_referral(self.store.next_id());
        self.store.insert(patient.clone());
        tracing::info!(id = patient.id, "added new referral");
        patient
    }

    pub fn reassign_section(&mut self, id: i64, target: Section) -> LifecycleResult<()> {
        self.transition(id, "reassign", |patient, _| plan_reassign(patient, target))
    }

    pub fn schedule(&mut self, id: i64, slot_key: &str) -> LifecycleResult<()> {
        self.transition(id, "schedule", |patient, calendar| {
            plan_schedule(patient, slot_key, calendar)
        })
    }

    pub fn reschedule(&mut self, id: i64, slot_key: &str) -> LifecycleResult<()> {
        self.transition(id, "reschedule", |patient, calendar| {
            plan_reschedule(patient, slot_key, calendar)
        })
    }

    pub fn return_to_board(&mut self, id: i64) -> LifecycleResult<()> {
        self.transition(id, "return", |patient, _| plan_return(patient))
    }

    pub fn complete(&mut self, id: i64) -> LifecycleResult<()> {
        self.transition(id, "complete", plan_complete)
    }

    pub fn archive(&mut self, id: i64) -> LifecycleResult<()> {
        self.transition(id, "archive", |patient, _| plan_archive(patient))
    }

    /// Permanently remove a patient, from any state.
    pub fn delete(&mut self, id: i64) -> LifecycleResult<Patient> {
        let removed = self.store.remove(id).ok_or(LifecycleError::NotFound(id))?;
        tracing::info!(id, section = %removed.section, "deleted patient");
        Ok(removed)
    }

    pub fn edit_field(
        &mut self,
        view: TabView,
        id: i64,
        field: PatientField,
        value: String,
    ) -> LifecycleResult<()> {
        self.transition(id, "edit", |patient, _| plan_edit(patient, view, field, value))
    }

    /// Edit a date field from a widget value (`YYYY-MM-DD`).
    ///
    /// Malformed input is stored as an empty date.
    pub fn edit_date_input(
        &mut self,
        view: TabView,
        id: i64,
        field: PatientField,
        input: &str,
    ) -> LifecycleResult<()> {
        self.edit_field(view, id, field, input_to_display(input))
    }

    fn transition<F>(&mut self, id: i64, name: &'static str, plan: F) -> LifecycleResult<()>
    where
        F: FnOnce(&Patient, &TheatreCalendar) -> LifecycleResult<PatientPatch>,
    {
        let patient = self.store.get(id).ok_or(LifecycleError::NotFound(id))?;
        let patch = match plan(patient, self.calendar) {
            Ok(patch) => patch,
            Err(e) => {
                tracing::warn!(id, transition = name, error = %e, "transition rejected");
                return Err(e);
            }
        };
        self.store.apply_patch(id, &patch);
        tracing::info!(id, transition = name, "transition applied");
        Ok(())
    }
}
