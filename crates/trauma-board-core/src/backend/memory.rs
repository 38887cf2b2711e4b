//! In-memory backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Mutex;

use super::{BackendError, BackendResult, ChangeFeed, FeedEvent, PatientBackend};
use crate::models::{ChangeEvent, Patient, PatientPatch};

/// Volatile record store. Shares well behind an `Arc` to model several
/// clients writing to one hosted table.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<i64, Patient>>,
    feed: ChangeFeed,
    fail_writes: AtomicBool,
    high_water: AtomicI64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with records already present (no events are emitted for them).
    pub fn with_records(patients: impl IntoIterator<Item = Patient>) -> Self {
        let backend = Self::new();
        {
            let mut records = backend.lock();
            records.extend(patients.into_iter().map(|p| (p.id, p)));
            let max = records.keys().next_back().copied().unwrap_or(0);
            backend.high_water.store(max, Ordering::SeqCst);
        }
        backend
    }

    /// Reject every subsequent write until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, id: i64) -> Option<Patient> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, Patient>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> BackendResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("backend is refusing writes".into()));
        }
        Ok(())
    }
}

impl PatientBackend for MemoryBackend {
    fn fetch_all(&self) -> BackendResult<Vec<Patient>> {
        Ok(self.lock().values().cloned().collect())
    }

    fn insert(&self, patient: &Patient) -> BackendResult<u64> {
        self.check_writable()?;
        {
            let mut records = self.lock();
            if records.contains_key(&patient.id) {
                return Err(BackendError::Duplicate(patient.id));
            }
            records.insert(patient.id, patient.clone());
            self.high_water.fetch_max(patient.id, Ordering::SeqCst);
        }
        Ok(self.feed.publish(ChangeEvent::Insert(patient.clone())))
    }

    fn update(&self, id: i64, patch: &PatientPatch) -> BackendResult<u64> {
        self.check_writable()?;
        let updated = {
            let mut records = self.lock();
            let record = records.get_mut(&id).ok_or(BackendError::NotFound(id))?;
            patch.apply_to(record);
            record.clone()
        };
        Ok(self.feed.publish(ChangeEvent::Update(updated)))
    }

    fn delete(&self, id: i64) -> BackendResult<u64> {
        self.check_writable()?;
        if self.lock().remove(&id).is_none() {
            return Err(BackendError::NotFound(id));
        }
        Ok(self.feed.publish(ChangeEvent::Delete { id }))
    }

    fn subscribe(&self) -> Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    fn high_water(&self) -> BackendResult<i64> {
        Ok(self.high_water.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PatientField, Section};

    #[test]
    fn test_insert_update_delete_emit_events() {
        let backend = MemoryBackend::new();
        let feed = backend.subscribe();

        let inserted = backend.insert(&Patient::new_referral(1)).unwrap();
        backend
            .update(1, &PatientPatch::new().field(PatientField::Name, "Ada"))
            .unwrap();
        let deleted = backend.delete(1).unwrap();

        let first = feed.try_recv().unwrap();
        assert_eq!(first.seq, inserted);
        assert!(matches!(first.event, ChangeEvent::Insert(p) if p.id == 1));
        assert!(
            matches!(feed.try_recv().unwrap().event, ChangeEvent::Update(p) if p.name == "Ada")
        );
        assert_eq!(
            feed.try_recv().unwrap(),
            FeedEvent {
                seq: deleted,
                event: ChangeEvent::Delete { id: 1 },
            }
        );
        assert!(backend.is_empty());
    }

    #[test]
    fn test_high_water_survives_delete() {
        let backend = MemoryBackend::with_records([Patient::new_referral(3)]);
        assert_eq!(backend.high_water().unwrap(), 3);

        backend.insert(&Patient::new_referral(8)).unwrap();
        backend.delete(8).unwrap();
        assert_eq!(backend.high_water().unwrap(), 8);
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn test_duplicate_and_missing() {
        let backend = MemoryBackend::with_records([Patient::new_referral(1)]);
        assert!(matches!(
            backend.insert(&Patient::new_referral(1)),
            Err(BackendError::Duplicate(1))
        ));
        assert!(matches!(
            backend.update(2, &PatientPatch::new().section(Section::Hand)),
            Err(BackendError::NotFound(2))
        ));
        assert!(matches!(backend.delete(2), Err(BackendError::NotFound(2))));
    }

    #[test]
    fn test_fail_writes() {
        let backend = MemoryBackend::new();
        backend.fail_writes(true);
        assert!(matches!(
            backend.insert(&Patient::new_referral(1)),
            Err(BackendError::Rejected(_))
        ));
        backend.fail_writes(false);
        assert!(backend.insert(&Patient::new_referral(1)).is_ok());
        assert_eq!(backend.len(), 1);
    }
}
