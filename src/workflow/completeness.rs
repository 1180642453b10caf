//! Completeness rules
//!
//! Derives the ordered list of missing fields from the current record. A
//! `Cleared` field is resolved ("no filter") and never missing.

use tracing::info;

use super::fields::{ExtractedInfo, Field, FieldValue};

pub const REQUIRED: [Field; 2] = [Field::Geography, Field::Industry];
pub const RECOMMENDED: [Field; 2] = [Field::Title, Field::EmployeeSize];

/// Industry keywords that make square footage relevant
const SQUARE_FOOTAGE_KEYWORDS: [&str; 5] = [
    "pest control",
    "cleaning",
    "construction",
    "builder",
    "builders",
];

fn is_missing(value: &FieldValue) -> bool {
    matches!(value, FieldValue::Unset)
}

/// Whether the industry text calls for a square-footage filter
pub fn requires_square_footage(industry: &str) -> bool {
    let lower = industry.to_lowercase();
    SQUARE_FOOTAGE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Missing fields: required, then recommended, then conditional
///
/// Recommended and conditional fields are only asked for on new requests.
pub fn missing_fields(info: &ExtractedInfo, is_update: bool) -> Vec<Field> {
    let mut missing: Vec<Field> = REQUIRED
        .into_iter()
        .filter(|f| is_missing(info.get(*f)))
        .collect();

    if !is_update {
        missing.extend(RECOMMENDED.into_iter().filter(|f| is_missing(info.get(*f))));

        let needs_sqft = info.value(Field::Industry).is_some_and(requires_square_footage);
        if needs_sqft && is_missing(&info.square_footage) {
            missing.push(Field::SquareFootage);
        }
    }

    info!(?missing, is_update, "Completeness check");
    missing
}

/// Required fields among `missing`
pub fn required_missing(missing: &[Field]) -> Vec<Field> {
    missing
        .iter()
        .copied()
        .filter(|f| REQUIRED.contains(f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(pairs: &[(Field, FieldValue)]) -> ExtractedInfo {
        let mut info = ExtractedInfo::default();
        for (f, v) in pairs {
            info.set(*f, v.clone());
        }
        info
    }

    fn val(s: &str) -> FieldValue {
        FieldValue::Value(s.to_string())
    }

    #[test]
    fn test_cleaning_requires_square_footage() {
        let info = with(&[
            (Field::Geography, val("Texas")),
            (Field::Industry, val("commercial cleaning services")),
        ]);
        assert_eq!(
            missing_fields(&info, false),
            vec![Field::Title, Field::EmployeeSize, Field::SquareFootage]
        );
    }

    #[test]
    fn test_cleared_fields_are_not_missing() {
        let info = with(&[
            (Field::Geography, FieldValue::Cleared),
            (Field::Industry, val("restaurants")),
            (Field::Title, FieldValue::Cleared),
        ]);
        assert_eq!(missing_fields(&info, false), vec![Field::EmployeeSize]);
    }

    #[test]
    fn test_update_only_checks_required() {
        let info = with(&[(Field::Industry, val("pest control"))]);
        assert_eq!(missing_fields(&info, true), vec![Field::Geography]);
    }

    #[test]
    fn test_required_first_order() {
        let missing = missing_fields(&ExtractedInfo::default(), false);
        assert_eq!(
            missing,
            vec![Field::Geography, Field::Industry, Field::Title, Field::EmployeeSize]
        );
        assert_eq!(
            required_missing(&missing),
            vec![Field::Geography, Field::Industry]
        );
    }

    #[test]
    fn test_builder_keyword() {
        assert!(requires_square_footage("Home Builders"));
        assert!(!requires_square_footage("restaurants"));
    }
}
