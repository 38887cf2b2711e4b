//! Patient database operations.

use std::sync::mpsc::Receiver;

use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::backend::{BackendError, BackendResult, FeedEvent, PatientBackend};
use crate::models::{ChangeEvent, FieldChange, Patient, PatientField, PatientPatch, Section};

const HIGH_WATER_KEY: &str = "high_water";

const PATIENT_COLUMNS: &str = r#"
    id, referral_date, hospital_number, name, gender, dob, age, ward,
    consultant, doi, diagnosis, history, outcome, section, theatre_slot,
    surgery_date, notes
"#;

/// Column backing an editable field.
fn field_column(field: PatientField) -> &'static str {
    match field {
        PatientField::ReferralDate => "referral_date",
        PatientField::HospitalNumber => "hospital_number",
        PatientField::Name => "name",
        PatientField::Gender => "gender",
        PatientField::Dob => "dob",
        PatientField::Age => "age",
        PatientField::Ward => "ward",
        PatientField::Consultant => "consultant",
        PatientField::Doi => "doi",
        PatientField::Diagnosis => "diagnosis",
        PatientField::History => "history",
        PatientField::Outcome => "outcome",
        PatientField::Notes => "notes",
    }
}

fn change_assignment(change: &FieldChange) -> (&'static str, Value) {
    match change {
        FieldChange::Field(field, value) => (field_column(*field), Value::Text(value.clone())),
        FieldChange::Section(section) => ("section", Value::Text(section.as_str().to_string())),
        FieldChange::TheatreSlot(slot) => ("theatre_slot", optional_text(slot)),
        FieldChange::SurgeryDate(date) => ("surgery_date", optional_text(date)),
    }
}

fn optional_text(value: &Option<String>) -> Value {
    value.clone().map(Value::Text).unwrap_or(Value::Null)
}

fn row_to_patient(row: &Row<'_>) -> rusqlite::Result<Patient> {
    let section: String = row.get(13)?;
    let section = section
        .parse::<Section>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(13, Type::Text, Box::new(e)))?;

    Ok(Patient {
        id: row.get(0)?,
        referral_date: row.get(1)?,
        hospital_number: row.get(2)?,
        name: row.get(3)?,
        gender: row.get(4)?,
        dob: row.get(5)?,
        age: row.get(6)?,
        ward: row.get(7)?,
        consultant: row.get(8)?,
        doi: row.get(9)?,
        diagnosis: row.get(10)?,
        history: row.get(11)?,
        outcome: row.get(12)?,
        section,
        theatre_slot: row.get(14)?,
        surgery_date: row.get(15)?,
        notes: row.get(16)?,
    })
}

impl Database {
    /// Insert a new patient with its assigned id.
    ///
    /// Raises the stored high-water mark in the same transaction.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        if self.get_patient(patient.id)?.is_some() {
            return Err(DbError::Constraint(format!(
                "patient {} already exists",
                patient.id
            )));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO patients (
                id, referral_date, hospital_number, name, gender, dob, age, ward,
                consultant, doi, diagnosis, history, outcome, section, theatre_slot,
                surgery_date, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
            params![
                patient.id,
                patient.referral_date,
                patient.hospital_number,
                patient.name,
                patient.gender,
                patient.dob,
                patient.age,
                patient.ward,
                patient.consultant,
                patient.doi,
                patient.diagnosis,
                patient.history,
                patient.outcome,
                patient.section.as_str(),
                patient.theatre_slot,
                patient.surgery_date,
                patient.notes,
            ],
        )?;
        tx.execute(
            r#"
            INSERT INTO board_meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE
                SET value = MAX(value, excluded.value), updated_at = datetime('now')
            "#,
            params![HIGH_WATER_KEY, patient.id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Highest id ever inserted, including since-deleted patients.
    pub fn high_water_mark(&self) -> DbResult<i64> {
        let stored: Option<i64> = self
            .conn
            .query_row(
                "SELECT value FROM board_meta WHERE key = ?",
                [HIGH_WATER_KEY],
                |row| row.get(0),
            )
            .optional()?;
        // Rows written outside insert_patient still count
        let present: Option<i64> =
            self.conn
                .query_row("SELECT MAX(id) FROM patients", [], |row| row.get(0))?;
        Ok(stored.unwrap_or(0).max(present.unwrap_or(0)))
    }

    /// Apply a field-level patch. Returns false if no such patient.
    pub fn patch_patient(&self, id: i64, patch: &PatientPatch) -> DbResult<bool> {
        if patch.is_empty() {
            return Ok(self.get_patient(id)?.is_some());
        }

        let mut assignments = Vec::with_capacity(patch.changes.len() + 1);
        let mut values = Vec::with_capacity(patch.changes.len() + 1);
        for (index, change) in patch.changes.iter().enumerate() {
            let (column, value) = change_assignment(change);
            assignments.push(format!("{} = ?{}", column, index + 1));
            values.push(value);
        }
        values.push(Value::Integer(id));

        let sql = format!(
            "UPDATE patients SET {}, updated_at = datetime('now') WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );
        let rows_affected = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by id.
    pub fn get_patient(&self, id: i64) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS),
                [id],
                row_to_patient,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all patients in id order.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM patients ORDER BY id", PATIENT_COLUMNS))?;
        let rows = stmt.query_map([], row_to_patient)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a patient.
    pub fn delete_patient(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

impl PatientBackend for Database {
    fn fetch_all(&self) -> BackendResult<Vec<Patient>> {
        Ok(self.list_patients()?)
    }

    fn insert(&self, patient: &Patient) -> BackendResult<u64> {
        match self.insert_patient(patient) {
            Err(DbError::Constraint(_)) => return Err(BackendError::Duplicate(patient.id)),
            other => other?,
        }
        Ok(self.feed.publish(ChangeEvent::Insert(patient.clone())))
    }

    fn update(&self, id: i64, patch: &PatientPatch) -> BackendResult<u64> {
        if !self.patch_patient(id, patch)? {
            return Err(BackendError::NotFound(id));
        }
        let record = self
            .get_patient(id)?
            .ok_or(BackendError::NotFound(id))?;
        Ok(self.feed.publish(ChangeEvent::Update(record)))
    }

    fn delete(&self, id: i64) -> BackendResult<u64> {
        if !self.delete_patient(id)? {
            return Err(BackendError::NotFound(id));
        }
        Ok(self.feed.publish(ChangeEvent::Delete { id }))
    }

    fn subscribe(&self) -> Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    fn high_water(&self) -> BackendResult<i64> {
        Ok(self.high_water_mark()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut patient = Patient::new_referral(1);
        patient.name = "John Doe".into();
        patient.section = Section::HipAndKnee;
        patient.age = "45".into();

        db.insert_patient(&patient).unwrap();

        let retrieved = db.get_patient(1).unwrap().unwrap();
        assert_eq!(retrieved, patient);
    }

    #[test]
    fn test_duplicate_insert_is_constraint() {
        let db = setup_db();
        db.insert_patient(&Patient::new_referral(1)).unwrap();
        assert!(matches!(
            db.insert_patient(&Patient::new_referral(1)),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_patch_patient() {
        let db = setup_db();
        db.insert_patient(&Patient::new_referral(1)).unwrap();

        let patch = PatientPatch::new()
            .field(PatientField::Diagnosis, "Femur fracture")
            .theatre_slot(Some("03/06/2025-AM".into()))
            .field(PatientField::Notes, "Bring films");
        assert!(db.patch_patient(1, &patch).unwrap());

        let retrieved = db.get_patient(1).unwrap().unwrap();
        assert_eq!(retrieved.diagnosis, "Femur fracture");
        assert_eq!(retrieved.theatre_slot.as_deref(), Some("03/06/2025-AM"));
        assert_eq!(retrieved.notes.as_deref(), Some("Bring films"));

        let clear = PatientPatch::new().theatre_slot(None);
        assert!(db.patch_patient(1, &clear).unwrap());
        assert_eq!(db.get_patient(1).unwrap().unwrap().theatre_slot, None);

        assert!(!db.patch_patient(99, &clear).unwrap());
    }

    #[test]
    fn test_mixed_case_section_reads_back() {
        let db = setup_db();
        db.conn()
            .execute(
                "INSERT INTO patients (id, section) VALUES (1, 'awaiting surgery')",
                [],
            )
            .unwrap();
        let patient = db.get_patient(1).unwrap().unwrap();
        assert_eq!(patient.section, Section::AwaitingSurgery);
    }

    #[test]
    fn test_unknown_section_is_an_error() {
        let db = setup_db();
        db.conn()
            .execute("INSERT INTO patients (id, section) VALUES (1, 'Lost')", [])
            .unwrap();
        assert!(db.get_patient(1).is_err());
    }

    #[test]
    fn test_backend_emits_full_record_on_update() {
        let db = setup_db();
        let feed = db.subscribe();

        PatientBackend::insert(&db, &Patient::new_referral(5)).unwrap();
        PatientBackend::update(
            &db,
            5,
            &PatientPatch::new().field(PatientField::Ward, "Trauma A"),
        )
        .unwrap();
        PatientBackend::delete(&db, 5).unwrap();

        assert!(matches!(feed.try_recv().unwrap().event, ChangeEvent::Insert(p) if p.id == 5));
        match feed.try_recv().unwrap().event {
            ChangeEvent::Update(record) => {
                assert_eq!(record.ward, "Trauma A");
                assert_eq!(record.section, Section::NewCases);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(feed.try_recv().unwrap().event, ChangeEvent::Delete { id: 5 });
    }

    #[test]
    fn test_high_water_mark_outlives_deleted_rows() {
        let db = setup_db();
        assert_eq!(db.high_water_mark().unwrap(), 0);

        db.insert_patient(&Patient::new_referral(1)).unwrap();
        db.insert_patient(&Patient::new_referral(2)).unwrap();
        db.delete_patient(2).unwrap();
        assert_eq!(db.high_water_mark().unwrap(), 2);

        // A lower explicit id never lowers the mark
        db.delete_patient(1).unwrap();
        db.insert_patient(&Patient::new_referral(1)).unwrap();
        assert_eq!(db.high_water_mark().unwrap(), 2);
    }

    #[test]
    fn test_failed_insert_leaves_high_water_alone() {
        let db = setup_db();
        db.insert_patient(&Patient::new_referral(1)).unwrap();
        assert!(db.insert_patient(&Patient::new_referral(1)).is_err());
        assert_eq!(db.high_water_mark().unwrap(), 1);
    }

    #[test]
    fn test_backend_errors() {
        let db = setup_db();
        PatientBackend::insert(&db, &Patient::new_referral(1)).unwrap();
        assert!(matches!(
            PatientBackend::insert(&db, &Patient::new_referral(1)),
            Err(BackendError::Duplicate(1))
        ));
        assert!(matches!(
            PatientBackend::delete(&db, 2),
            Err(BackendError::NotFound(2))
        ));
        assert!(matches!(
            PatientBackend::update(&db, 2, &PatientPatch::new().section(Section::Hand)),
            Err(BackendError::NotFound(2))
        ));
    }

    #[test]
    fn test_list_patients_ordered() {
        let db = setup_db();
        for id in [3, 1, 2] {
            db.insert_patient(&Patient::new_referral(id)).unwrap();
        }
        let ids: Vec<i64> = db.list_patients().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
