//! Tab projections over the patient store.
//!
//! Every projection is recomputed from the records handed in; nothing here
//! mutates or caches patient state. A patient lands in exactly one group
//! across the four tabs: a booked slot wins, then the section decides.

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::calendar::TheatreCalendar;
use crate::models::{Action, Patient, PatientField, Section, TabView, BOARD_SECTIONS};
use crate::store::{ListenerId, PatientStore, StoreChange};
use crate::urgency::{classify, Urgency, UrgencyThresholds};

/// One table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub patient: Patient,
    pub urgency: Urgency,
}

/// A titled table within a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub title: String,
    pub view: TabView,
    /// Set for theatre slot groups
    pub slot_key: Option<String>,
    pub editable: Vec<PatientField>,
    pub actions: Vec<Action>,
    pub rows: Vec<Row>,
}

impl Group {
    fn new(title: impl Into<String>, view: TabView, slot_key: Option<String>) -> Self {
        Self {
            title: title.into(),
            view,
            slot_key,
            editable: view.editable_fields(),
            actions: view.actions().to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|row| row.patient.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The Theatre List tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TheatreList {
    /// One group per calendar slot, chronological
    pub slots: Vec<Group>,
    /// Booked patients whose slot has left the window
    pub unlisted: Group,
}

/// All four tabs at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardSnapshot {
    pub theatre: TheatreList,
    pub board: Vec<Group>,
    pub completed: Group,
    pub archive: Group,
}

impl BoardSnapshot {
    /// Every group, in tab order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.theatre
            .slots
            .iter()
            .chain(std::iter::once(&self.theatre.unlisted))
            .chain(self.board.iter())
            .chain([&self.completed, &self.archive])
    }

    /// Groups a patient appears in.
    pub fn locate(&self, id: i64) -> Vec<&Group> {
        self.groups()
            .filter(|group| group.rows.iter().any(|row| row.patient.id == id))
            .collect()
    }
}

/// Derives tab views for one calendar window and point in time.
#[derive(Debug, Clone)]
pub struct ViewProjector {
    calendar: TheatreCalendar,
    now: NaiveDateTime,
    thresholds: UrgencyThresholds,
}

impl ViewProjector {
    pub fn new(calendar: TheatreCalendar, now: NaiveDateTime, thresholds: UrgencyThresholds) -> Self {
        Self {
            calendar,
            now,
            thresholds,
        }
    }

    /// Projector for the local clock.
    pub fn now(thresholds: UrgencyThresholds) -> Self {
        Self::new(TheatreCalendar::today(), Local::now().naive_local(), thresholds)
    }

    pub fn calendar(&self) -> &TheatreCalendar {
        &self.calendar
    }

    fn row(&self, patient: &Patient) -> Row {
        Row {
            patient: patient.clone(),
            urgency: classify(&patient.referral_date, self.now, &self.thresholds),
        }
    }

    fn fill<F>(&self, mut group: Group, patients: &[Patient], include: F) -> Group
    where
        F: Fn(&Patient) -> bool,
    {
        group.rows = patients
            .iter()
            .filter(|p| include(*p))
            .map(|p| self.row(p))
            .collect();
        group
    }

    pub fn theatre_list(&self, patients: &[Patient]) -> TheatreList {
        let slots = self
            .calendar
            .slots()
            .iter()
            .map(|slot| {
                self.fill(
                    Group::new(slot.label.clone(), TabView::Theatre, Some(slot.key.clone())),
                    patients,
                    |p| p.theatre_slot.as_deref() == Some(slot.key.as_str()),
                )
            })
            .collect();

        let unlisted = self.fill(
            Group::new("Other theatre slots", TabView::Theatre, None),
            patients,
            |p| {
                p.theatre_slot
                    .as_deref()
                    .is_some_and(|key| !self.calendar.contains(key))
            },
        );

        TheatreList { slots, unlisted }
    }

    /// One group per board section, unbooked patients only.
    ///
    /// Section labels are normalised case-insensitively when records are
    /// parsed, so mixed-case data groups with its canonical section here.
    pub fn trauma_board(&self, patients: &[Patient]) -> Vec<Group> {
        BOARD_SECTIONS
            .iter()
            .map(|section| self.section_group(*section, TabView::Board, patients))
            .collect()
    }

    pub fn completed_cases(&self, patients: &[Patient]) -> Group {
        self.section_group(Section::MetalworkReview, TabView::Completed, patients)
    }

    pub fn archive(&self, patients: &[Patient]) -> Group {
        self.section_group(Section::Archive, TabView::Archive, patients)
    }

    pub fn project_all(&self, patients: &[Patient]) -> BoardSnapshot {
        BoardSnapshot {
            theatre: self.theatre_list(patients),
            board: self.trauma_board(patients),
            completed: self.completed_cases(patients),
            archive: self.archive(patients),
        }
    }

    fn section_group(&self, section: Section, view: TabView, patients: &[Patient]) -> Group {
        self.fill(Group::new(section.as_str(), view, None), patients, |p| {
            p.theatre_slot.is_none() && p.section == section
        })
    }
}

/// A snapshot kept current by a store listener.
#[derive(Debug, Clone)]
pub struct LiveBoard {
    snapshot: Arc<Mutex<BoardSnapshot>>,
    listener: ListenerId,
}

impl LiveBoard {
    /// Project the store now and again after every change.
    pub fn attach(store: &mut PatientStore, thresholds: UrgencyThresholds) -> Self {
        let initial = ViewProjector::now(thresholds).project_all(store.patients());
        let snapshot = Arc::new(Mutex::new(initial));

        let sink = snapshot.clone();
        let listener = store.subscribe(Box::new(
            move |change: &StoreChange, patients: &[Patient]| {
                let projected = ViewProjector::now(thresholds).project_all(patients);
                tracing::trace!(revision = change.revision, "reprojected board");
                *sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = projected;
            },
        ));

        Self { snapshot, listener }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn detach(self, store: &mut PatientStore) -> bool {
        store.unsubscribe(self.listener)
    }
}
