//! SQLite schema definition.

/// Complete database schema for the pharmacy.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Medication Catalogue (reference data)
-- ============================================================================

CREATE TABLE IF NOT EXISTS medications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name_en TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name_he TEXT,
    description_en TEXT,
    description_he TEXT,
    price REAL CHECK (price IS NULL OR price >= 0),
    requires_prescription INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_medications_name_he ON medications(name_he COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS ingredients (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name_en TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name_he TEXT
);

CREATE TABLE IF NOT EXISTS medication_ingredients (
    medication_id INTEGER NOT NULL REFERENCES medications(id),
    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
    PRIMARY KEY (medication_id, ingredient_id)
);

CREATE TABLE IF NOT EXISTS dosage_instructions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    medication_id INTEGER NOT NULL REFERENCES medications(id),
    dosage TEXT NOT NULL,
    adult_dose TEXT,
    child_dose TEXT,
    frequency TEXT,
    max_daily TEXT,
    instructions TEXT,
    warnings TEXT,
    UNIQUE (medication_id, dosage)
);

-- ============================================================================
-- Customers
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pin TEXT NOT NULL UNIQUE CHECK (length(pin) = 4),
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- ============================================================================
-- Prescriptions (months_fulfilled mutated only by reservations)
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    medication_id INTEGER NOT NULL REFERENCES medications(id),
    dosage TEXT,
    months_supply INTEGER NOT NULL CHECK (months_supply > 0),
    months_fulfilled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT,
    CHECK (months_fulfilled >= 0 AND months_fulfilled <= months_supply)
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_user_med ON prescriptions(user_id, medication_id);

-- ============================================================================
-- Stock (quantity mutated only by reservations)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    medication_id INTEGER NOT NULL REFERENCES medications(id),
    dosage TEXT NOT NULL,
    quantity INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0),
    updated_at TEXT NOT NULL,
    UNIQUE (medication_id, dosage)
);
"#;
