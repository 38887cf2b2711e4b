//! Patient models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::section::Section;

/// A trauma referral tracked on the board.
///
/// Dates are kept in `DD/MM/YYYY` display form. `age` is free text because the
/// board lets clinicians type it independently of `dob`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    /// Unique integer ID, assigned on creation
    pub id: i64,
    /// Referral date (DD/MM/YYYY)
    #[serde(default)]
    pub referral_date: String,
    /// Hospital number
    #[serde(default)]
    pub hospital_number: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: String,
    /// Date of birth (DD/MM/YYYY)
    #[serde(default)]
    pub dob: String,
    /// Age as entered; numbers from the hosted store are stringified
    #[serde(default, deserialize_with = "deserialize_age")]
    pub age: String,
    #[serde(default)]
    pub ward: String,
    #[serde(default)]
    pub consultant: String,
    /// Date of injury (DD/MM/YYYY)
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub outcome: String,
    /// Workflow bucket
    #[serde(default)]
    pub section: Section,
    /// Theatre slot key; set means the patient is on the theatre list
    #[serde(default)]
    pub theatre_slot: Option<String>,
    /// Date taken from the completed slot's label; never cleared
    #[serde(default)]
    pub surgery_date: Option<String>,
    /// Archive notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Where a patient currently shows up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveState<'a> {
    /// On the theatre list under this slot key
    Scheduled(&'a str),
    /// In a section group
    Section(Section),
}

impl Patient {
    /// Blank referral landing in New Cases.
    pub fn new_referral(id: i64) -> Self {
        Self {
            id,
            referral_date: String::new(),
            hospital_number: String::new(),
            name: String::new(),
            gender: String::new(),
            dob: String::new(),
            age: String::new(),
            ward: String::new(),
            consultant: String::new(),
            doi: String::new(),
            diagnosis: String::new(),
            history: String::new(),
            outcome: String::new(),
            section: Section::NewCases,
            theatre_slot: None,
            surgery_date: None,
            notes: None,
        }
    }

    /// Check if this patient is booked into a theatre slot.
    pub fn is_scheduled(&self) -> bool {
        self.theatre_slot.is_some()
    }

    pub fn effective_state(&self) -> EffectiveState<'_> {
        match &self.theatre_slot {
            Some(key) => EffectiveState::Scheduled(key),
            None => EffectiveState::Section(self.section),
        }
    }

    /// Read a free-text attribute for display. Null optionals read as empty.
    pub fn field(&self, field: PatientField) -> &str {
        match field {
            PatientField::ReferralDate => &self.referral_date,
            PatientField::HospitalNumber => &self.hospital_number,
            PatientField::Name => &self.name,
            PatientField::Gender => &self.gender,
            PatientField::Dob => &self.dob,
            PatientField::Age => &self.age,
            PatientField::Ward => &self.ward,
            PatientField::Consultant => &self.consultant,
            PatientField::Doi => &self.doi,
            PatientField::Diagnosis => &self.diagnosis,
            PatientField::History => &self.history,
            PatientField::Outcome => &self.outcome,
            PatientField::Notes => self.notes.as_deref().unwrap_or_default(),
        }
    }

    /// Overwrite a free-text attribute.
    pub fn set_field(&mut self, field: PatientField, value: String) {
        match field {
            PatientField::ReferralDate => self.referral_date = value,
            PatientField::HospitalNumber => self.hospital_number = value,
            PatientField::Name => self.name = value,
            PatientField::Gender => self.gender = value,
            PatientField::Dob => self.dob = value,
            PatientField::Age => self.age = value,
            PatientField::Ward => self.ward = value,
            PatientField::Consultant => self.consultant = value,
            PatientField::Doi => self.doi = value,
            PatientField::Diagnosis => self.diagnosis = value,
            PatientField::History => self.history = value,
            PatientField::Outcome => self.outcome = value,
            PatientField::Notes => self.notes = Some(value),
        }
    }
}

fn deserialize_age<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAge {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<RawAge>::deserialize(deserializer)? {
        Some(RawAge::Int(n)) => n.to_string(),
        Some(RawAge::Float(n)) => n.to_string(),
        Some(RawAge::Text(s)) => s,
        None => String::new(),
    })
}

/// Editable patient attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatientField {
    ReferralDate,
    HospitalNumber,
    Name,
    Gender,
    Dob,
    Age,
    Ward,
    Consultant,
    Doi,
    Diagnosis,
    History,
    Outcome,
    Notes,
}

impl PatientField {
    pub const ALL: [PatientField; 13] = [
        PatientField::ReferralDate,
        PatientField::HospitalNumber,
        PatientField::Name,
        PatientField::Gender,
        PatientField::Dob,
        PatientField::Age,
        PatientField::Ward,
        PatientField::Consultant,
        PatientField::Doi,
        PatientField::Diagnosis,
        PatientField::History,
        PatientField::Outcome,
        PatientField::Notes,
    ];

    /// Record key, as used by the hosted store.
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientField::ReferralDate => "referralDate",
            PatientField::HospitalNumber => "hospitalNumber",
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

    /// Fields edited through a date widget.
    pub fn is_date(&self) -> bool {
        matches!(
            self,
            PatientField::ReferralDate | PatientField::Dob | PatientField::Doi
        )
    }
}

impl fmt::Display for PatientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatientField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("Unknown field: {}", s))
    }
}

/// A single attribute change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    Field(PatientField, String),
    Section(Section),
    TheatreSlot(Option<String>),
    SurgeryDate(Option<String>),
}

/// Field-level update for one patient, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientPatch {
    pub changes: Vec<FieldChange>,
}

impl PatientPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: PatientField, value: impl Into<String>) -> Self {
        self.changes.push(FieldChange::Field(field, value.into()));
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.changes.push(FieldChange::Section(section));
        self
    }

    pub fn theatre_slot(mut self, slot: Option<String>) -> Self {
        self.changes.push(FieldChange::TheatreSlot(slot));
        self
    }

    pub fn surgery_date(mut self, date: Option<String>) -> Self {
        self.changes.push(FieldChange::SurgeryDate(date));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Apply every change to a record in place.
    pub fn apply_to(&self, patient: &mut Patient) {
        for change in &self.changes {
            match change {
                FieldChange::Field(field, value) => patient.set_field(*field, value.clone()),
                FieldChange::Section(section) => patient.section = *section,
                FieldChange::TheatreSlot(slot) => patient.theatre_slot = slot.clone(),
                FieldChange::SurgeryDate(date) => patient.surgery_date = date.clone(),
            }
        }
    }
}

/// Realtime notification from the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "lowercase")]
pub enum ChangeEvent {
    Insert(Patient),
    Update(Patient),
    Delete { id: i64 },
}

impl ChangeEvent {
    pub fn id(&self) -> i64 {
        match self {
            ChangeEvent::Insert(patient) | ChangeEvent::Update(patient) => patient.id,
            ChangeEvent::Delete { id } => *id,
        }
    }
}

/// Sample referrals the board is seeded with on a fresh install.
pub fn demo_patients() -> Vec<Patient> {
    vec![
        Patient {
            id: 1,
            referral_date: "10/04/2025".into(),
            hospital_number: "HN123456".into(),
            name: "John Doe".into(),
            gender: "Male".into(),
            dob: "15/04/1980".into(),
            age: "45".into(),
            ward: "Trauma A".into(),
            consultant: "Dr. Smith".into(),
            doi: "09/05/2025".into(),
            diagnosis: "Femur fracture".into(),
            history: "Fall from height".into(),
            outcome: "Pending Surgery".into(),
            section: Section::AwaitingSurgery,
            theatre_slot: None,
            surgery_date: None,
            notes: None,
        },
        Patient {
            id: 2,
            referral_date: "08/05/2025".into(),
            hospital_number: "HN654321".into(),
            name: "Jane Smith".into(),
            gender: "Female".into(),
            dob: "22/06/1993".into(),
            age: "32".into(),
            ward: "Ortho B".into(),
            consultant: "Dr. Lee".into(),
            doi: "10/05/2025".into(),
            diagnosis: "Tibial plateau fracture".into(),
            history: "Motor vehicle accident".into(),
            outcome: "Post-Op".into(),
            section: Section::HipAndKnee,
            theatre_slot: None,
            surgery_date: None,
            notes: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_referral() {
        let patient = Patient::new_referral(7);
        assert_eq!(patient.id, 7);
        assert_eq!(patient.section, Section::NewCases);
        assert!(!patient.is_scheduled());
        assert!(patient.name.is_empty());
        assert_eq!(patient.surgery_date, None);
        assert_eq!(patient.notes, None);
    }

    #[test]
    fn test_deserialize_hosted_record() {
        let json = r#"{
            "id": 3,
            "referralDate": "01/06/2025",
            "name": "Sam Roe",
            "age": 61,
            "section": "hand",
            "theatreSlot": null
        }"#;
        let patient: Patient = serde_json::from_str(json).unwrap();
        assert_eq!(patient.id, 3);
        assert_eq!(patient.age, "61");
        assert_eq!(patient.section, Section::Hand);
        assert_eq!(patient.ward, "");
        assert_eq!(patient.surgery_date, None);
    }

    #[test]
    fn test_age_accepts_string_and_null() {
        let p: Patient = serde_json::from_str(r#"{"id": 1, "age": "40s"}"#).unwrap();
        assert_eq!(p.age, "40s");
        let p: Patient = serde_json::from_str(r#"{"id": 1, "age": null}"#).unwrap();
        assert_eq!(p.age, "");
    }

    #[test]
    fn test_serialize_uses_camel_case() {
        let json = serde_json::to_value(Patient::new_referral(1)).unwrap();
        assert_eq!(json["section"], "New Cases");
        assert!(json.get("hospitalNumber").is_some());
        assert!(json["theatreSlot"].is_null());
    }

    #[test]
    fn test_effective_state() {
        let mut patient = Patient::new_referral(1);
        assert_eq!(
            patient.effective_state(),
            EffectiveState::Section(Section::NewCases)
        );
        patient.theatre_slot = Some("03/06/2025-AM".into());
        assert_eq!(
            patient.effective_state(),
            EffectiveState::Scheduled("03/06/2025-AM")
        );
    }

    #[test]
    fn test_patch_apply_in_order() {
        let mut patient = Patient::new_referral(1);
        PatientPatch::new()
            .field(PatientField::Name, "First")
            .field(PatientField::Name, "Second")
            .field(PatientField::Notes, "Check wound")
            .section(Section::Hand)
            .apply_to(&mut patient);

        assert_eq!(patient.name, "Second");
        assert_eq!(patient.notes.as_deref(), Some("Check wound"));
        assert_eq!(patient.section, Section::Hand);
        assert_eq!(patient.field(PatientField::Notes), "Check wound");
    }

    #[test]
    fn test_change_event_wire_format() {
        let event = ChangeEvent::Delete { id: 9 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "delete");
        assert_eq!(json["record"]["id"], 9);

        let parsed: ChangeEvent = serde_json::from_str(
            r#"{"type": "update", "record": {"id": 4, "section": "Archive"}}"#,
        )
        .unwrap();
        assert_eq!(parsed.id(), 4);
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in PatientField::ALL {
            assert_eq!(field.as_str().parse::<PatientField>().unwrap(), field);
        }
        assert!("section".parse::<PatientField>().is_err());
    }
}
