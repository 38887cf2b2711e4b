//! Trauma Board Core Library
//!
//! Patient lifecycle tracking for an orthopaedic trauma board.
//!
//! # Architecture
//!
//! ```text
//!   referral ─► New Cases ─► board sections ─► theatre slot ─► Metalwork Review ─► Archive
//!                                  ▲               │
//!                                  └────return─────┘
//!
//!        Lifecycle (plan + apply)
//!                 │
//!                 ▼
//!   ┌──────────────────────────┐     write-through     ┌──────────────────┐
//!   │       PatientStore       │ ────────────────────► │  PatientBackend  │
//!   │  local-first collection  │ ◄──────────────────── │  SQLite / memory │
//!   └────────────┬─────────────┘     change feed       └──────────────────┘
//!                │ listeners
//!                ▼
//!          ViewProjector ─► Theatre List │ Trauma Board │ Completed │ Archive
//! ```
//!
//! # Core Principle
//!
//! **A patient is shown in exactly one place.** A booked theatre slot wins;
//! otherwise the section decides the tab and group.
//!
//! # Modules
//!
//! - [`models`]: Domain types (Patient, Section, TabView, patches, feed events)
//! - [`calendar`]: Rolling window of theatre slots
//! - [`urgency`]: Referral age highlighting
//! - [`lifecycle`]: Section and theatre transitions
//! - [`store`]: Local-first patient collection with remote merge
//! - [`backend`]: Persistence seam plus in-memory backend
//! - [`db`]: SQLite backend
//! - [`views`]: Tab projections
//! - [`auth`]: Session gate

pub mod auth;
pub mod backend;
pub mod calendar;
pub mod config;
pub mod dates;
pub mod db;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod store;
pub mod urgency;
pub mod views;

// Re-export commonly used types
pub use auth::{AuthError, AuthProvider, MemoryAuth, Session, SessionGate};
pub use backend::{BackendError, MemoryBackend, PatientBackend};
pub use calendar::{TheatreCalendar, TheatreSlot};
pub use config::{BoardConfig, ConfigError};
pub use db::Database;
pub use lifecycle::{Lifecycle, LifecycleError};
pub use logging::init_logging;
pub use models::{
    demo_patients, Action, ChangeEvent, Patient, PatientField, PatientPatch, Section, TabView,
};
pub use store::{PatientStore, PersistenceFailure, StoreChange};
pub use urgency::{Urgency, UrgencyThresholds};
pub use views::{BoardSnapshot, Group, LiveBoard, Row, ViewProjector};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum TraumaBoardError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Not signed in: {0}")]
    Unauthenticated(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for TraumaBoardError {
    fn from(e: db::DbError) -> Self {
        TraumaBoardError::DatabaseError(e.to_string())
    }
}

impl From<BackendError> for TraumaBoardError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(_) => TraumaBoardError::NotFound(e.to_string()),
            BackendError::Database(_) => TraumaBoardError::DatabaseError(e.to_string()),
            BackendError::Duplicate(_) | BackendError::Rejected(_) => {
                TraumaBoardError::Rejected(e.to_string())
            }
        }
    }
}

impl From<LifecycleError> for TraumaBoardError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(_) => TraumaBoardError::NotFound(e.to_string()),
            _ => TraumaBoardError::Rejected(e.to_string()),
        }
    }
}

impl From<AuthError> for TraumaBoardError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated => TraumaBoardError::Unauthenticated(e.to_string()),
            AuthError::Provider(_) => TraumaBoardError::AuthError(e.to_string()),
        }
    }
}

impl From<ConfigError> for TraumaBoardError {
    fn from(e: ConfigError) -> Self {
        TraumaBoardError::ConfigError(e.to_string())
    }
}

impl From<serde_json::Error> for TraumaBoardError {
    fn from(e: serde_json::Error) -> Self {
        TraumaBoardError::SerializationError(e.to_string())
    }
}

impl From<models::UnknownSection> for TraumaBoardError {
    fn from(e: models::UnknownSection) -> Self {
        TraumaBoardError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for TraumaBoardError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        TraumaBoardError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a board backed by the SQLite database at `path`.
#[uniffi::export]
pub fn open_board(path: String) -> Result<Arc<TraumaBoardCore>, TraumaBoardError> {
    let db = Database::open(&path)?;
    let store = PatientStore::open(db)?;
    Ok(TraumaBoardCore::new(store, UrgencyThresholds::default()))
}

/// Create a board on an in-memory database (for testing).
#[uniffi::export]
pub fn open_board_in_memory() -> Result<Arc<TraumaBoardCore>, TraumaBoardError> {
    let db = Database::open_in_memory()?;
    let store = PatientStore::open(db)?;
    Ok(TraumaBoardCore::new(store, UrgencyThresholds::default()))
}

/// Open a board configured from `TRAUMA_BOARD_*` environment variables.
#[uniffi::export]
pub fn open_board_from_env() -> Result<Arc<TraumaBoardCore>, TraumaBoardError> {
    let config = BoardConfig::from_env()?;
    let db = match config.database_path() {
        Some(path) => Database::open(path)?,
        None => Database::open_in_memory()?,
    };
    let store = PatientStore::open(db)?;
    Ok(TraumaBoardCore::new(store, config.urgency()))
}

/// Install the diagnostic log subscriber. Returns false if one already exists.
#[uniffi::export]
pub fn install_logging(filter: String) -> bool {
    logging::init_logging(&filter)
}

/// `DD/MM/YYYY` to the `YYYY-MM-DD` a date widget expects. Empty if malformed.
#[uniffi::export]
pub fn display_date_to_input(value: String) -> String {
    dates::display_to_input(&value)
}

/// Render a stored date for display as `DD/MM/YYYY`. Empty if missing or malformed.
#[uniffi::export]
pub fn format_display(value: Option<String>) -> String {
    dates::format_date_uk(value.as_deref())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe board wrapper for FFI.
#[derive(uniffi::Object)]
pub struct TraumaBoardCore {
    store: Arc<Mutex<PatientStore>>,
    thresholds: UrgencyThresholds,
    gate: SessionGate<Box<dyn AuthProvider + Sync>>,
}

impl TraumaBoardCore {
    /// Board with an in-memory session provider.
    pub fn new(store: PatientStore, thresholds: UrgencyThresholds) -> Arc<Self> {
        Self::with_auth(store, thresholds, Box::new(MemoryAuth::new()))
    }

    /// Board gated by an external identity provider.
    pub fn with_auth(
        store: PatientStore,
        thresholds: UrgencyThresholds,
        provider: Box<dyn AuthProvider + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(Mutex::new(store)),
            thresholds,
            gate: SessionGate::new(provider),
        })
    }

    /// Run a lifecycle operation against today's calendar.
    fn with_lifecycle<T, F>(&self, op: F) -> Result<T, TraumaBoardError>
    where
        F: FnOnce(&mut Lifecycle<'_>) -> lifecycle::LifecycleResult<T>,
    {
        self.gate.require_session()?;
        let mut store = self.store.lock()?;
        let calendar = TheatreCalendar::today();
        let mut lifecycle = Lifecycle::new(&mut *store, &calendar);
        Ok(op(&mut lifecycle)?)
    }

    fn snapshot(&self) -> Result<BoardSnapshot, TraumaBoardError> {
        self.gate.require_session()?;
        let store = self.store.lock()?;
        Ok(ViewProjector::now(self.thresholds).project_all(store.patients()))
    }
}

#[uniffi::export]
impl TraumaBoardCore {
    // =========================================================================
    // Session
    // =========================================================================

    /// Start a session. Fails when the provider signs users in elsewhere.
    pub fn sign_in(&self, user_id: String) -> Result<FfiSession, TraumaBoardError> {
        Ok(self.gate.provider().sign_in(&user_id)?.into())
    }

    pub fn current_session(&self) -> Result<Option<FfiSession>, TraumaBoardError> {
        Ok(self.gate.provider().current_session()?.map(Into::into))
    }

    /// Sign out. On failure the session stays active.
    pub fn sign_out(&self) -> Result<(), TraumaBoardError> {
        Ok(self.gate.sign_out()?)
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Add a blank referral to New Cases.
    pub fn add_patient(&self) -> Result<FfiPatient, TraumaBoardError> {
        self.with_lifecycle(|lifecycle| Ok(lifecycle.add_patient()))
            .map(Into::into)
    }

    pub fn reassign_section(&self, id: i64, section: String) -> Result<(), TraumaBoardError> {
        let target: Section = section.parse()?;
        self.with_lifecycle(|lifecycle| lifecycle.reassign_section(id, target))
    }

    pub fn schedule(&self, id: i64, slot_key: String) -> Result<(), TraumaBoardError> {
        self.with_lifecycle(|lifecycle| lifecycle.schedule(id, &slot_key))
    }

    pub fn reschedule(&self, id: i64, slot_key: String) -> Result<(), TraumaBoardError> {
        self.with_lifecycle(|lifecycle| lifecycle.reschedule(id, &slot_key))
    }

    pub fn return_to_board(&self, id: i64) -> Result<(), TraumaBoardError> {
        self.with_lifecycle(|lifecycle| lifecycle.return_to_board(id))
    }

    pub fn complete(&self, id: i64) -> Result<(), TraumaBoardError> {
        self.with_lifecycle(|lifecycle| lifecycle.complete(id))
    }

    pub fn archive(&self, id: i64) -> Result<(), TraumaBoardError> {
        self.with_lifecycle(|lifecycle| lifecycle.archive(id))
    }

    pub fn delete(&self, id: i64) -> Result<FfiPatient, TraumaBoardError> {
        self.with_lifecycle(|lifecycle| lifecycle.delete(id))
            .map(Into::into)
    }

    /// Edit a text field from the given tab.
    pub fn edit_field(
        &self,
        tab: FfiTab,
        id: i64,
        field: String,
        value: String,
    ) -> Result<(), TraumaBoardError> {
        let field: PatientField = field.parse().map_err(TraumaBoardError::InvalidInput)?;
        self.with_lifecycle(|lifecycle| lifecycle.edit_field(tab.into(), id, field, value))
    }

    /// Edit a date field from a `YYYY-MM-DD` widget value.
    pub fn edit_date_input(
        &self,
        tab: FfiTab,
        id: i64,
        field: String,
        input: String,
    ) -> Result<(), TraumaBoardError> {
        let field: PatientField = field.parse().map_err(TraumaBoardError::InvalidInput)?;
        if !field.is_date() {
            return Err(TraumaBoardError::InvalidInput(format!(
                "{} is not a date field",
                field
            )));
        }
        self.with_lifecycle(|lifecycle| lifecycle.edit_date_input(tab.into(), id, field, &input))
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Bookable slots for today's window.
    pub fn theatre_slots(&self) -> Vec<FfiSlot> {
        TheatreCalendar::today()
            .slots()
            .iter()
            .cloned()
            .map(Into::into)
            .collect()
    }

    /// The groups shown on one tab.
    pub fn tab_groups(&self, tab: FfiTab) -> Result<Vec<FfiGroup>, TraumaBoardError> {
        let snapshot = self.snapshot()?;
        let groups = match tab {
            FfiTab::Theatre => {
                let mut groups = snapshot.theatre.slots;
                if !snapshot.theatre.unlisted.is_empty() {
                    groups.push(snapshot.theatre.unlisted);
                }
                groups
            }
            FfiTab::Board => snapshot.board,
            FfiTab::Completed => vec![snapshot.completed],
            FfiTab::Archive => vec![snapshot.archive],
        };
        Ok(groups.into_iter().map(Into::into).collect())
    }

    /// All four tabs as JSON.
    pub fn snapshot_json(&self) -> Result<String, TraumaBoardError> {
        Ok(serde_json::to_string(&self.snapshot()?)?)
    }

    pub fn get_patient(&self, id: i64) -> Result<Option<FfiPatient>, TraumaBoardError> {
        self.gate.require_session()?;
        let store = self.store.lock()?;
        Ok(store.get(id).cloned().map(Into::into))
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Merge pending change-feed events. Returns how many changed the board.
    pub fn poll_remote(&self) -> Result<u32, TraumaBoardError> {
        let mut store = self.store.lock()?;
        Ok(store.poll_remote() as u32)
    }

    /// Reload every record from the backend.
    pub fn refresh(&self) -> Result<(), TraumaBoardError> {
        let mut store = self.store.lock()?;
        Ok(store.refresh()?)
    }

    /// Drain writes the backend rejected since the last call.
    pub fn take_failures(&self) -> Result<Vec<FfiFailure>, TraumaBoardError> {
        let mut store = self.store.lock()?;
        Ok(store.take_failures().into_iter().map(Into::into).collect())
    }

    /// Load the sample referrals into an empty board. Returns how many were added.
    ///
    /// Seeded records take fresh ids, so retired ids stay retired.
    pub fn seed_demo_data(&self) -> Result<u32, TraumaBoardError> {
        self.gate.require_session()?;
        let mut store = self.store.lock()?;
        if !store.is_empty() {
            return Ok(0);
        }
        let patients = demo_patients();
        let count = patients.len() as u32;
        for mut patient in patients {
            patient.id = store.next_id();
            store.insert(patient);
        }
        tracing::info!(count, "seeded demo referrals");
        Ok(count)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe tab selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiTab {
    Theatre,
    Board,
    Completed,
    Archive,
}

impl From<FfiTab> for TabView {
    fn from(tab: FfiTab) -> Self {
        match tab {
            FfiTab::Theatre => TabView::Theatre,
            FfiTab::Board => TabView::Board,
            FfiTab::Completed => TabView::Completed,
            FfiTab::Archive => TabView::Archive,
        }
    }
}

/// FFI-safe session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSession {
    pub session_id: String,
    pub user_id: String,
}

impl From<Session> for FfiSession {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            user_id: session.user_id,
        }
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: i64,
    pub referral_date: String,
    pub hospital_number: String,
    pub name: String,
    pub gender: String,
    pub dob: String,
    pub age: String,
    pub ward: String,
    pub consultant: String,
    pub doi: String,
    pub diagnosis: String,
    pub history: String,
    pub outcome: String,
    pub section: String,
    pub theatre_slot: Option<String>,
    pub surgery_date: Option<String>,
    pub notes: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            referral_date: patient.referral_date,
            hospital_number: patient.hospital_number,
            name: patient.name,
            gender: patient.gender,
            dob: patient.dob,
            age: patient.age,
            ward: patient.ward,
            consultant: patient.consultant,
            doi: patient.doi,
            diagnosis: patient.diagnosis,
            history: patient.history,
            outcome: patient.outcome,
            section: patient.section.as_str().to_string(),
            theatre_slot: patient.theatre_slot,
            surgery_date: patient.surgery_date,
            notes: patient.notes,
        }
    }
}

/// FFI-safe theatre slot.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSlot {
    pub key: String,
    pub label: String,
}

impl From<TheatreSlot> for FfiSlot {
    fn from(slot: TheatreSlot) -> Self {
        Self {
            key: slot.key,
            label: slot.label,
        }
    }
}

/// FFI-safe table row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRow {
    pub patient: FfiPatient,
    pub urgency: String,
}

impl From<Row> for FfiRow {
    fn from(row: Row) -> Self {
        Self {
            patient: row.patient.into(),
            urgency: row.urgency.as_str().to_string(),
        }
    }
}

/// FFI-safe group of rows.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiGroup {
    pub title: String,
    pub slot_key: Option<String>,
    pub editable_fields: Vec<String>,
    pub actions: Vec<String>,
    pub show_surgery_date: bool,
    pub rows: Vec<FfiRow>,
}

impl From<Group> for FfiGroup {
    fn from(group: Group) -> Self {
        Self {
            title: group.title,
            slot_key: group.slot_key,
            editable_fields: group
                .editable
                .iter()
                .map(|f| f.as_str().to_string())
                .collect(),
            actions: group
                .actions
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
            show_surgery_date: group.view.shows_surgery_date(),
            rows: group.rows.into_iter().map(Into::into).collect(),
        }
    }
}

/// FFI-safe persistence failure.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFailure {
    pub op: String,
    pub id: i64,
    pub message: String,
    pub occurred_at: String,
}

impl From<PersistenceFailure> for FfiFailure {
    fn from(failure: PersistenceFailure) -> Self {
        Self {
            op: failure.op.to_string(),
            id: failure.id,
            message: failure.message,
            occurred_at: failure.occurred_at,
        }
    }
}
