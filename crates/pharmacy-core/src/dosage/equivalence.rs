//! Cross-dosage equivalence arithmetic.
//!
//! A purchase in one strength may be set against a prescription written for
//! another as long as the milligram totals agree within a tolerance band.
//! Rounding is always upward so that a partial pack or month is never
//! under-billed, and the tolerance bounds how far that rounding may overshoot.

use super::parser::parse_strength;

/// Default fractional overage accepted when rounding up (25%).
pub const DEFAULT_TOLERANCE: f64 = 0.25;

/// Relative distance under which a ratio is treated as the integer it sits on.
/// Absorbs binary floating-point noise such as `0.1 * 3 = 0.30000000000000004`.
const INTEGER_SNAP: f64 = 1e-9;

/// Equivalence calculator with an explicit tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquivalenceCalculator {
    tolerance: f64,
}

impl Default for EquivalenceCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl EquivalenceCalculator {
    /// Create a calculator. `tolerance` is a fraction, e.g. `0.25` for 25%.
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Check whether `requested_qty` packs of `requested_dose` may stand in for
    /// `prescribed_qty` packs of `prescribed_dose`.
    ///
    /// The requested milligram total must cover the prescribed total and may
    /// exceed it by at most the tolerance. Unparseable labels are never
    /// equivalent.
    pub fn is_equivalent(
        &self,
        prescribed_dose: &str,
        prescribed_qty: i64,
        requested_dose: &str,
        requested_qty: i64,
    ) -> bool {
        let (Some(prescribed_mg), Some(requested_mg)) =
            (parse_strength(prescribed_dose), parse_strength(requested_dose))
        else {
            return false;
        };

        let total_prescribed = prescribed_mg * prescribed_qty as f64;
        let total_requested = requested_mg * requested_qty as f64;
        let max_allowed = total_prescribed * (1.0 + self.tolerance);

        total_prescribed <= total_requested && total_requested <= max_allowed
    }

    /// Number of `stock_dose` packs needed to cover `prescribed_qty` packs of
    /// `prescribed_dose`, rounded up.
    ///
    /// Returns `None` for unparseable labels, a zero stock strength or a
    /// negative quantity.
    pub fn equivalent_unit_count(
        &self,
        prescribed_dose: &str,
        prescribed_qty: i64,
        stock_dose: &str,
    ) -> Option<i64> {
        let prescribed_mg = parse_strength(prescribed_dose)?;
        let stock_mg = parse_strength(stock_dose)?;

        if stock_mg <= 0.0 || prescribed_qty < 0 {
            return None;
        }

        let total_prescribed = prescribed_mg * prescribed_qty as f64;
        Some(ceil_snapped(total_prescribed / stock_mg) as i64)
    }

    /// Prescription months consumed by `requested_qty` packs of
    /// `requested_dose` against a prescription of one `prescribed_dose` pack
    /// per month.
    ///
    /// The exact month count is rounded up. Returns `None` when the labels do
    /// not parse, the prescribed strength is zero, the quantity is negative,
    /// or rounding up overstates the exact count by more than the tolerance.
    pub fn equivalent_months(
        &self,
        requested_dose: &str,
        requested_qty: i64,
        prescribed_dose: &str,
    ) -> Option<i64> {
        let requested_mg = parse_strength(requested_dose)?;
        let prescribed_mg = parse_strength(prescribed_dose)?;

        if prescribed_mg <= 0.0 || requested_qty < 0 {
            return None;
        }

        let exact = requested_mg * requested_qty as f64 / prescribed_mg;
        let rounded = ceil_snapped(exact);

        if exact > 0.0 && rounded / exact > 1.0 + self.tolerance {
            return None;
        }

        Some(rounded as i64)
    }
}

/// Mathematical ceiling, except that values within floating-point noise of a
/// non-zero integer resolve to that integer. Small positive values always
/// round up to 1.
fn ceil_snapped(value: f64) -> f64 {
    let nearest = value.round();
    if nearest != 0.0 && (value - nearest).abs() <= INTEGER_SNAP * nearest.abs() {
        nearest
    } else {
        value.ceil()
    }
}
