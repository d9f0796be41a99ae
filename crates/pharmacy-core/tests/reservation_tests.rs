//! End-to-end reservation tests against a seeded SQLite store.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use pharmacy_core::config::DatabaseConfig;
use pharmacy_core::models::{DosageInstruction, ReservationLineRequest};
use pharmacy_core::reservation::Committer;
use pharmacy_core::{
    Database, EquivalenceCalculator, Medication, Prescription, ReservationEngine,
    ReservationError, ReservationOutcome, ReservationRequest, Stock, User,
};

const PIN: &str = "4321";

/// IDs of the seeded rows.
struct Seed {
    user_id: i64,
    atorvastatin: i64,
    atorvastatin_rx: i64,
    atorvastatin_10mg: i64,
    paracetamol_500mg: i64,
}

fn medication(db: &Database, name: &str, price: f64, requires_prescription: bool) -> i64 {
    let mut med = Medication::new(name);
    med.price = Some(price);
    med.requires_prescription = requires_prescription;
    db.insert_medication(&med).unwrap()
}

/// Atorvastatin (prescription only, 20mg for 6 months) and over-the-counter Paracetamol.
fn seed(db: &Database) -> Seed {
    let user_id = db.insert_user(&User::new(PIN, "Noa Cohen")).unwrap();

    let atorvastatin = medication(db, "Atorvastatin", 30.0, true);
    let atorvastatin_10mg = db.insert_stock(&Stock::new(atorvastatin, "10mg", 40)).unwrap();
    db.insert_stock(&Stock::new(atorvastatin, "20mg", 5)).unwrap();
    let atorvastatin_rx = db
        .insert_prescription(&Prescription::new(user_id, atorvastatin, Some("20mg".into()), 6))
        .unwrap();

    let paracetamol = medication(db, "Paracetamol", 4.5, false);
    let paracetamol_500mg = db.insert_stock(&Stock::new(paracetamol, "500mg", 10)).unwrap();

    Seed {
        user_id,
        atorvastatin,
        atorvastatin_rx,
        atorvastatin_10mg,
        paracetamol_500mg,
    }
}

fn setup() -> (Database, Seed) {
    let db = Database::open_in_memory().unwrap();
    let seed = seed(&db);
    (db, seed)
}

fn request(lines: &[(&str, &str, i64)]) -> ReservationRequest {
    ReservationRequest::new(
        PIN,
        lines
            .iter()
            .map(|(name, dosage, qty)| ReservationLineRequest::new(*name, *dosage, *qty))
            .collect(),
    )
}

fn reserve(db: &mut Database, lines: &[(&str, &str, i64)]) -> ReservationOutcome {
    ReservationEngine::default().reserve(db, &request(lines)).unwrap()
}

fn stock_of(db: &Database, id: i64) -> i64 {
    db.get_stock(id).unwrap().unwrap().quantity
}

fn fulfilled_of(db: &Database, id: i64) -> i64 {
    db.get_prescription(id).unwrap().unwrap().months_fulfilled
}

// =========================================================================
// Equivalence scenarios
// =========================================================================

#[test]
fn test_equivalence_scenarios() {
    let calc = EquivalenceCalculator::default();

    // A: 5 x 100mg against 10 x 50mg is exactly 500mg
    assert!(calc.is_equivalent("50mg", 10, "100mg", 5));
    // B: 600mg is 120% of 500mg, inside the band
    assert!(calc.is_equivalent("50mg", 10, "100mg", 6));
    // C: 700mg is 140%
    assert!(!calc.is_equivalent("50mg", 10, "100mg", 7));
}

#[test]
fn test_scenario_d_exceeds_remaining_months() {
    let (mut db, seed) = setup();

    // 16 x 10mg = 160mg = 8 months of 20mg, only 6 prescribed
    let outcome = reserve(&mut db, &[("Atorvastatin", "10mg", 16)]);

    assert_eq!(
        outcome.errors(),
        &[ReservationError::InsufficientPrescriptionEntitlement {
            medication: "Atorvastatin".into(),
            needed_months: 8,
            remaining_months: 6,
        }]
    );
    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 40);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 0);
}

#[test]
fn test_scenario_e_rounds_up_within_tolerance() {
    let (mut db, seed) = setup();
    let rx_id = db
        .insert_prescription(&Prescription::new(
            seed.user_id,
            seed.atorvastatin,
            Some("20mg".into()),
            8,
        ))
        .unwrap();

    // 13 x 10mg = 6.5 months, rounded up to 7 (7 / 6.5 is about 1.077)
    let outcome = reserve(&mut db, &[("Atorvastatin", "10mg", 13)]);

    let ReservationOutcome::Reserved(receipt) = outcome else {
        panic!("expected a reservation, got {:?}", outcome);
    };
    assert_eq!(receipt.lines[0].prescription_id, Some(rx_id));
    assert_eq!(receipt.lines[0].months_remaining, Some(1));
    assert_eq!(fulfilled_of(&db, rx_id), 7);
    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 27);
}

#[test]
fn test_dosage_incompatible_when_rounding_overshoots() {
    let (mut db, seed) = setup();
    let med = medication(&db, "Metformin", 12.0, true);
    db.insert_stock(&Stock::new(med, "10mg", 10)).unwrap();
    db.insert_prescription(&Prescription::new(seed.user_id, med, Some("30mg".into()), 6))
        .unwrap();

    // 10mg is a third of a month; rounding to 1 month overshoots by 200%
    let outcome = reserve(&mut db, &[("Metformin", "10mg", 1)]);

    assert_eq!(
        outcome.errors(),
        &[ReservationError::DosageIncompatible {
            medication: "Metformin".into(),
            requested_dosage: "10mg".into(),
            requested_quantity: 1,
            prescribed_dosage: "30mg".into(),
        }]
    );
}

// =========================================================================
// Successful reservations
// =========================================================================

#[test]
fn test_mixed_batch_commits_and_prices() {
    let (mut db, seed) = setup();

    let outcome = reserve(
        &mut db,
        &[("Atorvastatin", "10mg", 4), ("Paracetamol", "500mg", 2)],
    );

    let ReservationOutcome::Reserved(receipt) = outcome else {
        panic!("expected a reservation, got {:?}", outcome);
    };
    assert_eq!(receipt.lines.len(), 2);
    assert_eq!(receipt.lines[0].total_price, 120.0);
    assert_eq!(receipt.lines[0].months_remaining, Some(4));
    assert_eq!(receipt.lines[1].total_price, 9.0);
    assert_eq!(receipt.lines[1].prescription_id, None);
    assert_eq!(receipt.total_price, 129.0);

    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 36);
    assert_eq!(stock_of(&db, seed.paracetamol_500mg), 8);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 2);
}

#[test]
fn test_usage_note_attached() {
    let (mut db, seed) = setup();
    let mut instr = DosageInstruction::new(seed.atorvastatin, "10mg");
    instr.adult_dose = Some("1 tablet".into());
    instr.frequency = Some("once daily in the evening".into());
    db.insert_dosage_instruction(&instr).unwrap();

    let outcome = reserve(&mut db, &[("Atorvastatin", "10MG", 2)]);

    let ReservationOutcome::Reserved(receipt) = outcome else {
        panic!("expected a reservation, got {:?}", outcome);
    };
    assert_eq!(
        receipt.lines[0].usage_note.as_deref(),
        Some("Adults: 1 tablet; once daily in the evening")
    );
}

#[test]
fn test_newest_prescription_is_used() {
    let (mut db, seed) = setup();
    let mut newer = Prescription::new(seed.user_id, seed.atorvastatin, Some("10mg".into()), 12);
    newer.created_at = (Utc::now() + Duration::seconds(5)).to_rfc3339();
    let newer_id = db.insert_prescription(&newer).unwrap();

    let outcome = reserve(&mut db, &[("Atorvastatin", "10mg", 3)]);

    assert!(outcome.is_reserved());
    assert_eq!(fulfilled_of(&db, newer_id), 3);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 0);
}

// =========================================================================
// Rejections and atomicity
// =========================================================================

#[test]
fn test_one_bad_line_rejects_whole_batch() {
    let (mut db, seed) = setup();

    let outcome = reserve(
        &mut db,
        &[
            ("Paracetamol", "500mg", 2),
            ("Atorvastatin", "10mg", 4),
            ("Atorvastatn", "10mg", 1),
            ("Paracetamol", "1000mg", 1),
        ],
    );

    let errors = outcome.errors();
    assert_eq!(errors.len(), 2, "errors: {:?}", errors);
    assert!(
        matches!(&errors[0], ReservationError::NotFound(msg) if msg.contains("did you mean 'Atorvastatin'")),
        "got {:?}",
        errors[0]
    );
    assert!(
        matches!(&errors[1], ReservationError::NotFound(msg) if msg.contains("500mg")),
        "got {:?}",
        errors[1]
    );

    assert_eq!(stock_of(&db, seed.paracetamol_500mg), 10);
    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 40);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 0);
}

#[test]
fn test_expired_prescription_is_not_used() {
    let (mut db, seed) = setup();
    db.conn()
        .execute(
            "UPDATE prescriptions SET expires_at = ?1 WHERE id = ?2",
            rusqlite::params![(Utc::now() - Duration::days(1)).to_rfc3339(), seed.atorvastatin_rx],
        )
        .unwrap();

    let outcome = reserve(&mut db, &[("Atorvastatin", "20mg", 1)]);

    assert!(matches!(
        outcome.errors(),
        [ReservationError::PrescriptionRequired { .. }]
    ));
}

#[test]
fn test_commit_rolls_back_when_stock_moved_after_validation() {
    let (mut db, seed) = setup();
    let engine = ReservationEngine::default();

    let lines = engine
        .validate(
            &db,
            &request(&[("Atorvastatin", "10mg", 4), ("Paracetamol", "500mg", 2)]),
        )
        .unwrap()
        .unwrap();

    // Someone else empties the Paracetamol shelf in between
    db.set_stock_quantity(seed.paracetamol_500mg, 1).unwrap();

    let result = Committer::new(&mut db).commit(&lines);

    assert_eq!(
        result,
        Err(ReservationError::InsufficientStock {
            medication: "Paracetamol".into(),
            dosage: "500mg".into(),
            requested: 2,
            available: 1,
        })
    );
    // The Atorvastatin line applied first and was rolled back with the batch
    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 40);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 0);
    assert_eq!(stock_of(&db, seed.paracetamol_500mg), 1);
}

#[test]
fn test_commit_rolls_back_when_prescription_filled_after_validation() {
    let (mut db, seed) = setup();
    let engine = ReservationEngine::default();

    let lines = engine
        .validate(
            &db,
            &request(&[("Paracetamol", "500mg", 2), ("Atorvastatin", "10mg", 4)]),
        )
        .unwrap()
        .unwrap();

    // Another counter dispenses 5 of the 6 months in between
    db.conn()
        .execute(
            "UPDATE prescriptions SET months_fulfilled = 5 WHERE id = ?1",
            [seed.atorvastatin_rx],
        )
        .unwrap();

    let result = Committer::new(&mut db).commit(&lines);

    assert_eq!(
        result,
        Err(ReservationError::InsufficientPrescriptionEntitlement {
            medication: "Atorvastatin".into(),
            needed_months: 2,
            remaining_months: 1,
        })
    );
    // Both stock decrements applied before the guard tripped and were rolled back
    assert_eq!(stock_of(&db, seed.paracetamol_500mg), 10);
    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 40);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 5);
}

#[test]
fn test_locked_store_reports_commit_failed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pharmacy.db");
    let config = DatabaseConfig {
        path: Some(path.clone()),
        busy_timeout_ms: 0,
    };

    let mut db = Database::open_with_config(&config).unwrap();
    let seed = seed(&db);

    // A second writer holds the write lock for the whole attempt
    let blocker = rusqlite::Connection::open(&path).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

    let outcome = reserve(
        &mut db,
        &[("Paracetamol", "500mg", 2), ("Atorvastatin", "10mg", 4)],
    );

    assert!(
        matches!(outcome.errors(), [ReservationError::CommitFailed(_)]),
        "got {:?}",
        outcome
    );

    blocker.execute_batch("ROLLBACK").unwrap();
    assert_eq!(stock_of(&db, seed.paracetamol_500mg), 10);
    assert_eq!(stock_of(&db, seed.atorvastatin_10mg), 40);
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 0);
}

#[test]
fn test_validation_is_repeatable() {
    let (mut db, _) = setup();
    let engine = ReservationEngine::default();
    let req = request(&[("Atorvastatin", "20mg", 7), ("Ibuprofen", "200mg", 1)]);

    let first = engine.validate(&db, &req).unwrap();
    let second = engine.validate(&db, &req).unwrap();
    assert_eq!(first, second);

    // A rejected reservation changes nothing, so retrying gives the same answer
    let once = engine.reserve(&mut db, &req).unwrap();
    let twice = engine.reserve(&mut db, &req).unwrap();
    assert_eq!(once, twice);
    assert!(!once.is_reserved());
}

#[test]
fn test_months_claimed_by_earlier_lines_count() {
    let (mut db, seed) = setup();

    // 4 months then 3 months against 6 remaining
    let outcome = reserve(
        &mut db,
        &[("Atorvastatin", "20mg", 4), ("Atorvastatin", "10mg", 6)],
    );

    assert_eq!(
        outcome.errors(),
        &[ReservationError::InsufficientPrescriptionEntitlement {
            medication: "Atorvastatin".into(),
            needed_months: 3,
            remaining_months: 2,
        }]
    );
    assert_eq!(fulfilled_of(&db, seed.atorvastatin_rx), 0);
}

// =========================================================================
// Concurrency
// =========================================================================

#[test]
fn test_concurrent_reservations_for_last_unit() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        path: Some(dir.path().join("pharmacy.db")),
        busy_timeout_ms: 10_000,
    };

    let last_unit = {
        let db = Database::open_with_config(&config).unwrap();
        let seed = seed(&db);
        db.set_stock_quantity(seed.paracetamol_500mg, 1).unwrap();
        seed.paracetamol_500mg
    };

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let config = config.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut db = Database::open_with_config(&config).unwrap();
                barrier.wait();
                ReservationEngine::default()
                    .reserve(&mut db, &request(&[("Paracetamol", "500mg", 1)]))
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<ReservationOutcome> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let reserved = outcomes.iter().filter(|o| o.is_reserved()).count();
    assert_eq!(reserved, 1, "outcomes: {:?}", outcomes);

    let loser = outcomes.iter().find(|o| !o.is_reserved()).unwrap();
    assert!(
        matches!(
            loser.errors(),
            [ReservationError::InsufficientStock { available: 0, .. }]
        ),
        "got {:?}",
        loser
    );

    let db = Database::open_with_config(&config).unwrap();
    assert_eq!(stock_of(&db, last_unit), 0);
}
