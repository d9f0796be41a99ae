//! Dosage label parser.
//!
//! Extracts a milligram strength from labels such as `"500mg"`, `"0.5 g"`,
//! `"250 mcg"` or `"25mg/5ml"`. Only the leading `<number><unit>` is read;
//! anything after the unit (a suspension volume, a form name) is ignored.

use std::sync::LazyLock;

use regex::Regex;

/// Leading number followed by a mass unit. Longer unit spellings come first
/// so that alternation picks `mcg` over `mg` and `grams` over `g`.
static STRENGTH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:\.\d*)?|\.\d+)\s*(micrograms?|mcg|ug|µg|μg|milligrams?|mg|grams?|g)")
        .expect("valid strength regex")
});

/// Mass unit recognised in a dosage label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MassUnit {
    Microgram,
    Milligram,
    Gram,
}

impl MassUnit {
    /// Convert a value in this unit to milligrams.
    pub fn to_mg(self, value: f64) -> f64 {
        match self {
            MassUnit::Microgram => value / 1000.0,
            MassUnit::Milligram => value,
            MassUnit::Gram => value * 1000.0,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token.to_lowercase().as_str() {
            "mcg" | "ug" | "µg" | "μg" | "microgram" | "micrograms" => Some(MassUnit::Microgram),
            "mg" | "milligram" | "milligrams" => Some(MassUnit::Milligram),
            "g" | "gram" | "grams" => Some(MassUnit::Gram),
            _ => None,
        }
    }
}

/// Parse a dosage label into milligrams.
///
/// Returns `None` for empty or unrecognised labels.
pub fn parse_strength(label: &str) -> Option<f64> {
    let caps = STRENGTH_PATTERN.captures(label)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = MassUnit::from_token(caps.get(2)?.as_str())?;

    let mg = unit.to_mg(value);
    mg.is_finite().then_some(mg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milligrams_pass_through() {
        assert_eq!(parse_strength("500mg"), Some(500.0));
        assert_eq!(parse_strength("500 mg"), Some(500.0));
        assert_eq!(parse_strength("  12.5MG "), Some(12.5));
        assert_eq!(parse_strength("20 milligrams"), Some(20.0));
    }

    #[test]
    fn test_grams_convert() {
        assert_eq!(parse_strength("0.5g"), Some(500.0));
        assert_eq!(parse_strength("1 gram"), Some(1000.0));
        assert_eq!(parse_strength("2 Grams"), Some(2000.0));
    }

    #[test]
    fn test_micrograms_convert() {
        assert_eq!(parse_strength("250mcg"), Some(0.25));
        assert_eq!(parse_strength("100 ug"), Some(0.1));
        assert_eq!(parse_strength("50µg"), Some(0.05));
    }

    #[test]
    fn test_trailing_text_ignored() {
        assert_eq!(parse_strength("25mg/5ml"), Some(25.0));
        assert_eq!(parse_strength("10mg tablets"), Some(10.0));
    }

    #[test]
    fn test_unparseable() {
        assert_eq!(parse_strength(""), None);
        assert_eq!(parse_strength("   "), None);
        assert_eq!(parse_strength("mg"), None);
        assert_eq!(parse_strength("500"), None);
        assert_eq!(parse_strength("5ml"), None);
        assert_eq!(parse_strength("strong"), None);
        assert_eq!(parse_strength("tablet 20mg"), None);
    }

    #[test]
    fn test_unit_consistency() {
        assert_eq!(parse_strength("0.5g"), parse_strength("500mg"));
        assert_eq!(parse_strength("1000mcg"), parse_strength("1mg"));
    }

    #[test]
    fn test_micro_sign_and_greek_mu() {
        // U+00B5 MICRO SIGN and U+03BC GREEK SMALL LETTER MU
        assert_eq!(parse_strength("250\u{b5}g"), Some(0.25));
        assert_eq!(parse_strength("250\u{3bc}g"), Some(0.25));
    }
}
