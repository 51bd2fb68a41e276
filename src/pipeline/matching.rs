//! Match evaluator: field-by-field comparison of canonical bags.

use std::collections::BTreeMap;

use super::sanitize::CanonicalFieldBag;
use super::schema::DocumentSchema;
use crate::models::FieldMismatch;

/// Result of comparing declared against extracted data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchReport {
    /// True iff every schema field is equal on both sides.
    pub ocr_match: bool,
    /// One entry per mismatched field, keyed by field name.
    pub mismatches: BTreeMap<String, FieldMismatch>,
}

impl MismatchReport {
    pub fn mismatched_fields(&self) -> impl Iterator<Item = &str> {
        self.mismatches.keys().map(String::as_str)
    }
}

/// Compare every schema field. A field the extracted side lacks is a
/// mismatch with an empty extracted value.
pub fn evaluate(
    schema: &DocumentSchema,
    declared: &CanonicalFieldBag,
    extracted: &CanonicalFieldBag,
) -> MismatchReport {
    let mut mismatches = BTreeMap::new();

    for field in &schema.fields {
        let declared_value = declared.get(&field.name);
        let extracted_value = extracted.get(&field.name);
        if declared_value.is_some() && declared_value == extracted_value {
            continue;
        }
        mismatches.insert(
            field.name.clone(),
            FieldMismatch {
                declared_value: declared_value.map(ToString::to_string).unwrap_or_default(),
                extracted_value: extracted_value.map(ToString::to_string).unwrap_or_default(),
                is_match: false,
            },
        );
    }

    MismatchReport {
        ocr_match: mismatches.is_empty(),
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use crate::pipeline::sanitize::CanonicalValue;
    use crate::pipeline::schema::SchemaRegistry;
    use chrono::NaiveDate;

    fn passport() -> DocumentSchema {
        SchemaRegistry::with_defaults()
            .get(&DocumentType::passport())
            .unwrap()
            .clone()
    }

    fn full_bag() -> CanonicalFieldBag {
        let mut bag = CanonicalFieldBag::new();
        bag.insert("documentNumber".into(), CanonicalValue::Text("P1234567".into()));
        bag.insert("name".into(), CanonicalValue::Text("jane roe".into()));
        bag.insert(
            "dateOfBirth".into(),
            CanonicalValue::Date(NaiveDate::from_ymd_opt(1985, 3, 2).unwrap()),
        );
        bag.insert(
            "dateOfExpiry".into(),
            CanonicalValue::Date(NaiveDate::from_ymd_opt(2030, 3, 1).unwrap()),
        );
        bag.insert("issuingCountry".into(), CanonicalValue::Text("gb".into()));
        bag
    }

    #[test]
    fn identical_bags_match() {
        let report = evaluate(&passport(), &full_bag(), &full_bag());
        assert!(report.ocr_match);
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn one_differing_field_yields_one_mismatch() {
        let mut extracted = full_bag();
        extracted.insert("documentNumber".into(), CanonicalValue::Text("P7654321".into()));

        let report = evaluate(&passport(), &full_bag(), &extracted);
        assert!(!report.ocr_match);
        assert_eq!(report.mismatched_fields().collect::<Vec<_>>(), vec!["documentNumber"]);
        assert_eq!(
            report.mismatches["documentNumber"],
            FieldMismatch {
                declared_value: "P1234567".into(),
                extracted_value: "P7654321".into(),
                is_match: false,
            }
        );
    }

    #[test]
    fn missing_extracted_field_is_empty_mismatch() {
        let mut extracted = full_bag();
        extracted.remove("dateOfExpiry");

        let report = evaluate(&passport(), &full_bag(), &extracted);
        assert!(!report.ocr_match);
        let entry = &report.mismatches["dateOfExpiry"];
        assert_eq!(entry.declared_value, "2030-03-01");
        assert_eq!(entry.extracted_value, "");
    }

    #[test]
    fn fields_outside_schema_are_ignored() {
        let mut extracted = full_bag();
        extracted.insert("nationality".into(), CanonicalValue::Text("fr".into()));
        assert!(evaluate(&passport(), &full_bag(), &extracted).ocr_match);
    }
}
