//! SQLite schema definition.

/// Complete database schema for the trauma board.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id INTEGER PRIMARY KEY,
    referral_date TEXT NOT NULL DEFAULT '',      -- DD/MM/YYYY
    hospital_number TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    gender TEXT NOT NULL DEFAULT '',
    dob TEXT NOT NULL DEFAULT '',                -- DD/MM/YYYY
    age TEXT NOT NULL DEFAULT '',
    ward TEXT NOT NULL DEFAULT '',
    consultant TEXT NOT NULL DEFAULT '',
    doi TEXT NOT NULL DEFAULT '',                -- DD/MM/YYYY
    diagnosis TEXT NOT NULL DEFAULT '',
    history TEXT NOT NULL DEFAULT '',
    outcome TEXT NOT NULL DEFAULT '',
    section TEXT NOT NULL DEFAULT 'New Cases',   -- section label
    theatre_slot TEXT,                           -- NULL unless booked
    surgery_date TEXT,                           -- set on completion
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_section ON patients(section);
CREATE INDEX IF NOT EXISTS idx_patients_theatre_slot ON patients(theatre_slot);

-- ============================================================================
-- Board metadata
-- ============================================================================

-- Counters that must outlive the rows they describe.
-- 'high_water': highest patient id ever inserted
CREATE TABLE IF NOT EXISTS board_meta (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
