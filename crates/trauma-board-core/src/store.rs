//! In-memory patient collection backed by a pluggable persistence backend.
//!
//! Local mutations are applied first and then written through. A failed write
//! is recorded and logged but never rolled back; the next fetch or feed event
//! brings the collection back in line with the backend.
//!
//! Remote change events merge last-write-wins by id: inserts and updates
//! replace the whole record, deletes remove it if present. The feed also
//! carries this client's own writes, recognised by sequence number. An own
//! echo is skipped while a later write to the same record is still in flight,
//! so stale copies never replay over newer local state. The last echo merges
//! like any other event and is a no-op unless another client wrote in between.

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{Receiver, TryRecvError};

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendResult, FeedEvent, PatientBackend};
use crate::models::{ChangeEvent, Patient, PatientPatch};

/// What happened to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
    /// Whole collection replaced from a fetch
    Reloaded,
}

/// Whether a change came from this client or the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// Notification handed to listeners after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// Affected record; `None` for reloads
    pub id: Option<i64>,
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
    /// Monotonic counter bumped on every change
    pub revision: u64,
}

/// Write operation sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteOp::Insert => "insert",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        })
    }
}

/// A rejected write, kept for the operator until drained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceFailure {
    pub op: WriteOp,
    pub id: i64,
    pub message: String,
    /// RFC 3339 timestamp
    pub occurred_at: String,
}

/// Handle returned by [`PatientStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Callback run after each change with the current records.
pub type Listener = Box<dyn FnMut(&StoreChange, &[Patient]) + Send>;

/// The single source of truth every view reads from.
pub struct PatientStore {
    backend: Box<dyn PatientBackend>,
    feed: Receiver<FeedEvent>,
    /// Own writes not yet seen on the feed, by sequence number
    own_writes: HashMap<u64, i64>,
    patients: Vec<Patient>,
    /// Highest id ever held here or stored by the backend
    high_water: i64,
    failures: Vec<PersistenceFailure>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
    revision: u64,
}

impl PatientStore {
    /// Subscribe to the backend's feed and load every record.
    pub fn open<B>(backend: B) -> BackendResult<Self>
    where
        B: PatientBackend + 'static,
    {
        Self::with_backend(Box::new(backend))
    }

    pub fn with_backend(backend: Box<dyn PatientBackend>) -> BackendResult<Self> {
        // Subscribe before fetching so nothing committed in between is missed
        let feed = backend.subscribe();
        let patients = backend.fetch_all()?;
        let loaded = patients.iter().map(|p| p.id).max().unwrap_or(0);
        let high_water = loaded.max(backend.high_water()?);
        tracing::info!(count = patients.len(), high_water, "loaded patient records");

        Ok(Self {
            backend,
            feed,
            own_writes: HashMap::new(),
            patients,
            high_water,
            failures: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
            revision: 0,
        })
    }

    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn get(&self, id: i64) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Next id to hand out: one past the highest id ever seen.
    pub fn next_id(&self) -> i64 {
        let current = self.patients.iter().map(|p| p.id).max().unwrap_or(0);
        current.max(self.high_water) + 1
    }

    // =========================================================================
    // Local mutations
    // =========================================================================

    /// Add a record locally and write it through.
    pub fn insert(&mut self, patient: Patient) {
        let id = patient.id;
        let kind = self.upsert_local(patient.clone());
        let result = self.backend.insert(&patient);
        self.record_write(WriteOp::Insert, id, result);
        self.notify(Some(id), kind, ChangeOrigin::Local);
    }

    /// Patch a record locally and write the patch through.
    ///
    /// Returns false (and writes nothing) if the id is unknown.
    pub fn apply_patch(&mut self, id: i64, patch: &PatientPatch) -> bool {
        let Some(patient) = self.patients.iter_mut().find(|p| p.id == id) else {
            return false;
        };
        patch.apply_to(patient);
        let result = self.backend.update(id, patch);
        self.record_write(WriteOp::Update, id, result);
        self.notify(Some(id), ChangeKind::Updated, ChangeOrigin::Local);
        true
    }

    /// Remove a record locally and delete it from the backend.
    pub fn remove(&mut self, id: i64) -> Option<Patient> {
        let index = self.patients.iter().position(|p| p.id == id)?;
        let removed = self.patients.remove(index);
        let result = self.backend.delete(id);
        self.record_write(WriteOp::Delete, id, result);
        self.notify(Some(id), ChangeKind::Removed, ChangeOrigin::Local);
        Some(removed)
    }

    // =========================================================================
    // Remote merge
    // =========================================================================

    /// Merge one feed event. Returns true if the collection changed.
    pub fn apply_remote(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::Insert(patient) | ChangeEvent::Update(patient) => {
                let id = patient.id;
                if self.get(id) == Some(&patient) {
                    return false;
                }
                let kind = self.upsert_local(patient);
                tracing::debug!(id, ?kind, "merged remote change");
                self.notify(Some(id), kind, ChangeOrigin::Remote);
                true
            }
            ChangeEvent::Delete { id } => {
                let Some(index) = self.patients.iter().position(|p| p.id == id) else {
                    return false;
                };
                self.patients.remove(index);
                tracing::debug!(id, "merged remote delete");
                self.notify(Some(id), ChangeKind::Removed, ChangeOrigin::Remote);
                true
            }
        }
    }

    /// Drain the change feed. Returns how many events changed the collection.
    ///
    /// Superseded echoes of this store's own writes are dropped unseen.
    pub fn poll_remote(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.feed.try_recv() {
                Ok(FeedEvent { seq, event }) => {
                    if let Some(id) = self.own_writes.remove(&seq) {
                        if self.own_writes.values().any(|pending| *pending == id) {
                            tracing::trace!(seq, id, "skipped superseded own echo");
                            continue;
                        }
                    }
                    if self.apply_remote(event) {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("change feed disconnected");
                    break;
                }
            }
        }
        applied
    }

    /// Replace the collection with a fresh fetch.
    pub fn refresh(&mut self) -> BackendResult<()> {
        let patients = self.backend.fetch_all()?;
        if let Some(max) = patients.iter().map(|p| p.id).max() {
            self.high_water = self.high_water.max(max);
        }
        self.high_water = self.high_water.max(self.backend.high_water()?);
        self.patients = patients;
        self.notify(None, ChangeKind::Reloaded, ChangeOrigin::Remote);
        Ok(())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn failures(&self) -> &[PersistenceFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<PersistenceFailure> {
        std::mem::take(&mut self.failures)
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn upsert_local(&mut self, patient: Patient) -> ChangeKind {
        self.high_water = self.high_water.max(patient.id);
        match self.patients.iter_mut().find(|p| p.id == patient.id) {
            Some(existing) => {
                *existing = patient;
                ChangeKind::Updated
            }
            None => {
                self.patients.push(patient);
                ChangeKind::Inserted
            }
        }
    }

    fn record_write(&mut self, op: WriteOp, id: i64, result: Result<u64, BackendError>) {
        match result {
            Ok(seq) => {
                self.own_writes.insert(seq, id);
            }
            Err(e) => {
                tracing::error!(%op, id, error = %e, "persistence write failed");
                self.failures.push(PersistenceFailure {
                    op,
                    id,
                    message: e.to_string(),
                    occurred_at: chrono::Utc::now().to_rfc3339(),
                });
            }
        }
    }

    fn notify(&mut self, id: Option<i64>, kind: ChangeKind, origin: ChangeOrigin) {
        self.revision += 1;
        let change = StoreChange {
            id,
            kind,
            origin,
            revision: self.revision,
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change, &self.patients);
        }
    }
}

impl fmt::Debug for PatientStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatientStore")
            .field("patients", &self.patients.len())
            .field("high_water", &self.high_water)
            .field("pending_echoes", &self.own_writes.len())
            .field("failures", &self.failures.len())
            .field("listeners", &self.listeners.len())
            .field("revision", &self.revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, PatientBackend};
    use crate::models::{PatientField, Section};
    use std::sync::{Arc, Mutex};

    fn named(id: i64, name: &str) -> Patient {
        let mut patient = Patient::new_referral(id);
        patient.name = name.into();
        patient
    }

    fn setup_store() -> (Arc<MemoryBackend>, PatientStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = PatientStore::open(backend.clone()).unwrap();
        (backend, store)
    }

    #[test]
    fn test_open_loads_existing_records() {
        let backend = MemoryBackend::with_records([named(1, "A"), named(4, "B")]);
        let store = PatientStore::open(backend).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.next_id(), 5);
    }

    #[test]
    fn test_next_id_empty_store() {
        let (_, store) = setup_store();
        assert_eq!(store.next_id(), 1);
    }

    #[test]
    fn test_insert_writes_through() {
        let (backend, mut store) = setup_store();
        store.insert(named(1, "Ada"));
        assert_eq!(store.get(1).unwrap().name, "Ada");
        assert_eq!(backend.get(1).unwrap().name, "Ada");
        assert!(store.failures().is_empty());
    }

    #[test]
    fn test_ids_are_not_reused_after_deleting_highest() {
        let (_, mut store) = setup_store();
        store.insert(named(1, "A"));
        store.insert(named(2, "B"));
        store.remove(2);
        assert_eq!(store.next_id(), 3);
    }

    #[test]
    fn test_failed_write_is_recorded_not_rolled_back() {
        let (backend, mut store) = setup_store();
        store.insert(named(1, "A"));
        backend.fail_writes(true);

        let patch = PatientPatch::new().section(Section::Hand);
        assert!(store.apply_patch(1, &patch));

        assert_eq!(store.get(1).unwrap().section, Section::Hand);
        assert_eq!(backend.get(1).unwrap().section, Section::NewCases);

        let failures = store.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].op, WriteOp::Update);
        assert_eq!(failures[0].id, 1);
        assert!(store.failures().is_empty());
    }

    #[test]
    fn test_apply_patch_unknown_id() {
        let (_, mut store) = setup_store();
        let patch = PatientPatch::new().field(PatientField::Name, "X");
        assert!(!store.apply_patch(42, &patch));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_remote_update_replaces_whole_record() {
        let (_, mut store) = setup_store();
        let mut local = named(1, "Local");
        local.ward = "Trauma A".into();
        store.insert(local);

        let remote = named(1, "Remote");
        assert!(store.apply_remote(ChangeEvent::Update(remote.clone())));
        assert_eq!(store.get(1), Some(&remote));
        assert_eq!(store.get(1).unwrap().ward, "");
    }

    #[test]
    fn test_remote_insert_and_duplicate_insert() {
        let (_, mut store) = setup_store();
        assert!(store.apply_remote(ChangeEvent::Insert(named(7, "New"))));
        assert_eq!(store.len(), 1);

        // Duplicate notification acts as an update
        assert!(store.apply_remote(ChangeEvent::Insert(named(7, "Renamed"))));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(7).unwrap().name, "Renamed");

        // Identical record is a no-op
        assert!(!store.apply_remote(ChangeEvent::Insert(named(7, "Renamed"))));
        assert_eq!(store.next_id(), 8);
    }

    #[test]
    fn test_remote_delete() {
        let (_, mut store) = setup_store();
        store.insert(named(1, "A"));
        assert!(store.apply_remote(ChangeEvent::Delete { id: 1 }));
        assert!(store.is_empty());
        assert!(!store.apply_remote(ChangeEvent::Delete { id: 1 }));
    }

    #[test]
    fn test_poll_remote_merges_other_clients() {
        let backend = Arc::new(MemoryBackend::new());
        let mut ours = PatientStore::open(backend.clone()).unwrap();
        let mut theirs = PatientStore::open(backend.clone()).unwrap();

        theirs.insert(named(1, "From elsewhere"));
        assert_eq!(ours.poll_remote(), 1);
        assert_eq!(ours.get(1).unwrap().name, "From elsewhere");

        // Our own echo is skipped
        assert_eq!(theirs.poll_remote(), 0);
        assert_eq!(theirs.len(), 1);
    }

    #[test]
    fn test_stale_own_echoes_do_not_replay() {
        let (_, mut store) = setup_store();
        store.insert(named(1, "A"));
        store.apply_patch(1, &PatientPatch::new().field(PatientField::Ward, "T&O"));
        store.insert(named(2, "B"));
        store.remove(2);
        let revision = store.revision();

        let seen: Arc<Mutex<Vec<StoreChange>>> = Arc::default();
        let sink = seen.clone();
        store.subscribe(Box::new(move |change: &StoreChange, _: &[Patient]| {
            sink.lock().unwrap().push(change.clone());
        }));

        // The Insert(1) echo predates the patch and Insert(2) predates the delete
        assert_eq!(store.poll_remote(), 0);
        assert_eq!(store.revision(), revision);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(store.get(1).unwrap().ward, "T&O");
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_failed_writes_leave_no_pending_echo() {
        let (backend, mut store) = setup_store();
        backend.fail_writes(true);
        store.insert(named(1, "A"));
        backend.fail_writes(false);

        backend.insert(&named(1, "Elsewhere")).unwrap();

        assert_eq!(store.poll_remote(), 1);
        assert_eq!(store.get(1).unwrap().name, "Elsewhere");
    }

    #[test]
    fn test_open_uses_backend_high_water() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(&named(6, "Gone")).unwrap();
        backend.delete(6).unwrap();

        let store = PatientStore::open(backend).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.next_id(), 7);
    }

    #[test]
    fn test_listeners_see_every_change() {
        let (_, mut store) = setup_store();
        let seen: Arc<Mutex<Vec<(StoreChange, usize)>>> = Arc::default();
        let sink = seen.clone();
        let id = store.subscribe(Box::new(move |change: &StoreChange, patients: &[Patient]| {
            sink.lock().unwrap().push((change.clone(), patients.len()));
        }));

        store.insert(named(1, "A"));
        store.apply_remote(ChangeEvent::Insert(named(2, "B")));
        store.remove(1);
        assert!(store.unsubscribe(id));
        store.insert(named(3, "C"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0.kind, ChangeKind::Inserted);
        assert_eq!(seen[0].0.origin, ChangeOrigin::Local);
        assert_eq!(seen[1].0.origin, ChangeOrigin::Remote);
        assert_eq!(seen[2].0.kind, ChangeKind::Removed);
        assert_eq!(seen[2].1, 1);
        assert_eq!(seen[2].0.revision, 3);
    }

    #[test]
    fn test_refresh_resyncs_after_failure() {
        let (backend, mut store) = setup_store();
        store.insert(named(1, "A"));
        backend.fail_writes(true);
        store.apply_patch(1, &PatientPatch::new().field(PatientField::Name, "Unsaved"));
        backend.fail_writes(false);

        store.refresh().unwrap();
        assert_eq!(store.get(1).unwrap().name, "A");
    }
}
