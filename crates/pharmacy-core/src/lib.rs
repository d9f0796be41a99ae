//! Pharmacy Core Library
//!
//! Validates and commits medication reservations for pharmacy customers
//! against their prescriptions and the warehouse stock.
//!
//! # Architecture
//!
//! ```text
//!  ReservationRequest (PIN + lines)
//!             │
//!             ▼
//!      ReservationEngine
//!             │
//!             ├──▶ Validator ──▶ catalogue ─▶ prescription ─▶ dosage equivalence ─▶ stock
//!             │        (read-only, every line checked, errors collected)
//!             │
//!             └──▶ Committer ──▶ one IMMEDIATE transaction
//!                      guarded stock decrement + prescription increment per line
//!                      all lines applied, or none
//! ```
//!
//! # Core Principle
//!
//! **A batch is all or nothing.** A single failing line rejects the whole
//! reservation and nothing is written.
//!
//! # Modules
//!
//! - [`config`]: TOML and environment configuration
//! - [`db`]: SQLite store for medications, customers, prescriptions and stock
//! - [`dosage`]: Strength parsing and cross-dosage equivalence
//! - [`models`]: Domain types (Medication, Prescription, Stock, reservation types)
//! - [`reservation`]: Validation and atomic commit of reservation batches

pub mod config;
pub mod db;
pub mod dosage;
pub mod models;
pub mod reservation;

// Re-export commonly used types
pub use config::{ConfigError, PharmacyConfig};
pub use db::{Database, DbError};
pub use dosage::{parse_strength, EquivalenceCalculator, DEFAULT_TOLERANCE};
pub use models::{
    DosageInstruction, Medication, Prescription, ReservationLineRequest, ReservationReceipt,
    ReservationRequest, ReservationResponse, Stock, StockAvailability, User,
};
pub use reservation::{ReservationEngine, ReservationError, ReservationOutcome};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use tracing::info;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PharmacyError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for PharmacyError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => PharmacyError::NotFound(what),
            other => PharmacyError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PharmacyError {
    fn from(e: serde_json::Error) -> Self {
        PharmacyError::SerializationError(e.to_string())
    }
}

impl From<config::ConfigError> for PharmacyError {
    fn from(e: config::ConfigError) -> Self {
        PharmacyError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for PharmacyError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PharmacyError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path, with default settings.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<PharmacyCore>, PharmacyError> {
    let db = Database::open(&path)?;
    Ok(PharmacyCore::wrap(db, ReservationEngine::default()))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<PharmacyCore>, PharmacyError> {
    let db = Database::open_in_memory()?;
    Ok(PharmacyCore::wrap(db, ReservationEngine::default()))
}

/// Load configuration (optional TOML file, then environment) and open its database.
#[uniffi::export]
pub fn open_database_with_config(
    config_path: Option<String>,
) -> Result<Arc<PharmacyCore>, PharmacyError> {
    let config = PharmacyConfig::load(config_path.as_deref().map(std::path::Path::new))?;
    let db = Database::open_with_config(&config.database)?;
    info!(
        path = ?config.database.path,
        tolerance = config.equivalence.tolerance,
        "Opened pharmacy database"
    );
    Ok(PharmacyCore::wrap(
        db,
        ReservationEngine::from_config(&config.equivalence),
    ))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct PharmacyCore {
    db: Arc<Mutex<Database>>,
    engine: ReservationEngine,
}

impl PharmacyCore {
    fn wrap(db: Database, engine: ReservationEngine) -> Arc<Self> {
        Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            engine,
        })
    }

    fn require_medication(db: &Database, name: &str) -> Result<Medication, PharmacyError> {
        db.find_medication_by_name(name)?
            .ok_or_else(|| PharmacyError::NotFound(format!("medication '{}'", name)))
    }
}

#[uniffi::export]
impl PharmacyCore {
    // =========================================================================
    // Reservations
    // =========================================================================

    /// Validate and atomically commit a reservation batch.
    pub fn reserve_medications(
        &self,
        request: FfiReservationRequest,
    ) -> Result<FfiReservationResponse, PharmacyError> {
        let mut db = self.db.lock()?;
        let outcome = self.engine.reserve(&mut db, &request.into())?;
        Ok(outcome.into_response().into())
    }

    /// JSON in, JSON out form of [`PharmacyCore::reserve_medications`].
    pub fn reserve_medications_json(&self, request_json: String) -> Result<String, PharmacyError> {
        let request = ReservationRequest::from_json(&request_json)
            .map_err(|e| PharmacyError::InvalidInput(e.to_string()))?;
        let mut db = self.db.lock()?;
        let outcome = self.engine.reserve(&mut db, &request)?;
        Ok(outcome.into_response().to_json()?)
    }

    // =========================================================================
    // Catalogue and Stock
    // =========================================================================

    /// Search medications by English or Hebrew name.
    pub fn search_medications(&self, query: String) -> Result<Vec<FfiMedication>, PharmacyError> {
        let db = self.db.lock()?;
        let meds = db.search_medications(&query)?;
        Ok(meds.into_iter().map(|m| m.into()).collect())
    }

    /// Medications containing an active ingredient.
    pub fn find_medications_by_ingredient(
        &self,
        ingredient: String,
    ) -> Result<Vec<FfiMedication>, PharmacyError> {
        let db = self.db.lock()?;
        let meds = db.find_medications_by_ingredient(&ingredient)?;
        Ok(meds.into_iter().map(|m| m.into()).collect())
    }

    /// Stock of a medication, for one strength or all of them.
    pub fn check_availability(
        &self,
        medication_name: String,
        dosage: Option<String>,
    ) -> Result<FfiStockAvailability, PharmacyError> {
        let db = self.db.lock()?;
        let med = Self::require_medication(&db, &medication_name)?;
        let availability = db.check_availability(med.id, dosage.as_deref())?;
        Ok(FfiStockAvailability::new(med.name_en, availability))
    }

    /// Dosing guidance for a medication.
    pub fn get_dosage_instructions(
        &self,
        medication_name: String,
        dosage: Option<String>,
    ) -> Result<Vec<FfiDosageInstruction>, PharmacyError> {
        let db = self.db.lock()?;
        let med = Self::require_medication(&db, &medication_name)?;
        let instructions = db.dosage_instructions(med.id, dosage.as_deref())?;
        Ok(instructions.into_iter().map(|i| i.into()).collect())
    }

    // =========================================================================
    // Prescriptions
    // =========================================================================

    /// Prescriptions of the customer holding `pin`, newest first.
    pub fn list_prescriptions(
        &self,
        pin: String,
        active_only: bool,
    ) -> Result<Vec<FfiPrescription>, PharmacyError> {
        let db = self.db.lock()?;
        let user = db
            .find_user_by_pin(&pin)?
            .ok_or_else(|| PharmacyError::NotFound("no customer matches the given PIN".into()))?;
        let prescriptions =
            db.list_prescriptions_for_user(user.id, active_only, &chrono::Utc::now())?;

        let mut result = Vec::with_capacity(prescriptions.len());
        for rx in prescriptions {
            let medication_name = db
                .get_medication(rx.medication_id, false)?
                .map(|m| m.name_en)
                .unwrap_or_default();
            result.push(FfiPrescription::new(rx, medication_name));
        }
        Ok(result)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe reservation line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReservationLine {
    pub medication_name: String,
    pub dosage: String,
    pub quantity: i64,
}

/// FFI-safe reservation request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReservationRequest {
    pub user_identity: String,
    pub lines: Vec<FfiReservationLine>,
}

impl From<FfiReservationRequest> for ReservationRequest {
    fn from(req: FfiReservationRequest) -> Self {
        ReservationRequest::new(
            req.user_identity,
            req.lines
                .into_iter()
                .map(|l| ReservationLineRequest::new(l.medication_name, l.dosage, l.quantity))
                .collect(),
        )
    }
}

/// FFI-safe committed line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReservationLineResult {
    pub medication_name: String,
    pub dosage: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
    pub prescription_id: Option<i64>,
    pub months_remaining: Option<i64>,
    pub usage_note: Option<String>,
}

impl From<models::ReservationLineResult> for FfiReservationLineResult {
    fn from(line: models::ReservationLineResult) -> Self {
        Self {
            medication_name: line.medication_name,
            dosage: line.dosage,
            quantity: line.quantity,
            unit_price: line.unit_price,
            total_price: line.total_price,
            prescription_id: line.prescription_id,
            months_remaining: line.months_remaining,
            usage_note: line.usage_note,
        }
    }
}

/// FFI-safe reservation response.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiReservationResponse {
    pub success: bool,
    pub total_price: Option<f64>,
    pub lines: Vec<FfiReservationLineResult>,
    pub errors: Vec<String>,
}

impl From<ReservationResponse> for FfiReservationResponse {
    fn from(response: ReservationResponse) -> Self {
        Self {
            success: response.success,
            total_price: response.total_price,
            lines: response.lines.into_iter().map(|l| l.into()).collect(),
            errors: response.errors,
        }
    }
}

/// FFI-safe medication.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedication {
    pub id: i64,
    pub name_en: String,
    pub name_he: Option<String>,
    pub description_en: Option<String>,
    pub price: Option<f64>,
    pub requires_prescription: bool,
    pub ingredients: Vec<String>,
}

impl From<Medication> for FfiMedication {
    fn from(med: Medication) -> Self {
        Self {
            id: med.id,
            name_en: med.name_en,
            name_he: med.name_he,
            description_en: med.description_en,
            price: med.price,
            requires_prescription: med.requires_prescription,
            ingredients: med.ingredients.into_iter().map(|i| i.name_en).collect(),
        }
    }
}

/// FFI-safe stock row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStock {
    pub dosage: String,
    pub quantity: i64,
}

impl From<Stock> for FfiStock {
    fn from(stock: Stock) -> Self {
        Self {
            dosage: stock.dosage,
            quantity: stock.quantity,
        }
    }
}

/// FFI-safe availability summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockAvailability {
    pub medication_name: String,
    pub requested_dosage: Option<String>,
    pub in_stock: bool,
    pub available_quantity: i64,
    pub exact_match: Option<FfiStock>,
    pub alternatives: Vec<FfiStock>,
}

impl FfiStockAvailability {
    fn new(medication_name: String, availability: StockAvailability) -> Self {
        Self {
            medication_name,
            in_stock: availability.has_exact_match()
                || (availability.requested_dosage.is_none() && availability.available_quantity > 0),
            requested_dosage: availability.requested_dosage,
            available_quantity: availability.available_quantity,
            exact_match: availability.exact_match.map(|s| s.into()),
            alternatives: availability.alternatives.into_iter().map(|s| s.into()).collect(),
        }
    }
}

/// FFI-safe dosage instruction.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDosageInstruction {
    pub dosage: String,
    pub adult_dose: Option<String>,
    pub child_dose: Option<String>,
    pub frequency: Option<String>,
    pub max_daily: Option<String>,
    pub instructions: Option<String>,
    pub warnings: Option<String>,
    pub usage_note: Option<String>,
}

impl From<DosageInstruction> for FfiDosageInstruction {
    fn from(instr: DosageInstruction) -> Self {
        let usage_note = instr.usage_note();
        Self {
            dosage: instr.dosage,
            adult_dose: instr.adult_dose,
            child_dose: instr.child_dose,
            frequency: instr.frequency,
            max_daily: instr.max_daily,
            instructions: instr.instructions,
            warnings: instr.warnings,
            usage_note,
        }
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub id: i64,
    pub medication_name: String,
    pub dosage: Option<String>,
    pub months_supply: i64,
    pub months_fulfilled: i64,
    pub months_remaining: i64,
    pub expires_at: Option<String>,
}

impl FfiPrescription {
    fn new(rx: Prescription, medication_name: String) -> Self {
        Self {
            id: rx.id,
            medication_name,
            months_remaining: rx.months_remaining(),
            dosage: rx.dosage,
            months_supply: rx.months_supply,
            months_fulfilled: rx.months_fulfilled,
            expires_at: rx.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_core() -> Arc<PharmacyCore> {
        let core = open_database_in_memory().unwrap();
        {
            let db = core.db.lock().unwrap();
            let user_id = db.insert_user(&User::new("1234", "Dana")).unwrap();
            let mut med = Medication::new("Atorvastatin");
            med.price = Some(30.0);
            med.requires_prescription = true;
            let med_id = db.insert_medication(&med).unwrap();
            db.insert_stock(&Stock::new(med_id, "10mg", 20)).unwrap();
            db.insert_stock(&Stock::new(med_id, "20mg", 5)).unwrap();
            db.insert_prescription(&Prescription::new(user_id, med_id, Some("20mg".into()), 6))
                .unwrap();
        }
        core
    }

    #[test]
    fn test_reserve_over_ffi() {
        let core = seeded_core();
        let response = core
            .reserve_medications(FfiReservationRequest {
                user_identity: "1234".into(),
                lines: vec![FfiReservationLine {
                    medication_name: "Atorvastatin".into(),
                    dosage: "10mg".into(),
                    quantity: 4,
                }],
            })
            .unwrap();

        assert!(response.success);
        assert_eq!(response.total_price, Some(120.0));
        assert_eq!(response.lines[0].months_remaining, Some(4));
    }

    #[test]
    fn test_reserve_json() {
        let core = seeded_core();
        let json = core
            .reserve_medications_json(
                r#"{"user_identity":"1234","lines":[{"medication_name":"Atorvastatin","dosage":"20mg","quantity":9}]}"#
                    .into(),
            )
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);

        assert!(matches!(
            core.reserve_medications_json("not json".into()),
            Err(PharmacyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_availability_and_prescriptions() {
        let core = seeded_core();

        let avail = core
            .check_availability("atorvastatin".into(), Some("20mg".into()))
            .unwrap();
        assert!(avail.in_stock);
        assert_eq!(avail.available_quantity, 5);
        assert_eq!(avail.alternatives.len(), 1);

        assert!(matches!(
            core.check_availability("Nope".into(), None),
            Err(PharmacyError::NotFound(_))
        ));

        let rxs = core.list_prescriptions("1234".into(), true).unwrap();
        assert_eq!(rxs.len(), 1);
        assert_eq!(rxs[0].medication_name, "Atorvastatin");
        assert!(core.list_prescriptions("0000".into(), true).is_err());
    }
}
