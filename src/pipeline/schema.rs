//! Per-document-type comparison schemas.
//!
//! Which fields are compared, which of them are dates, and whether the
//! address is composed from declared sub-fields is data, not code: a new
//! document type is one more entry in the registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::FieldError;
use crate::models::DocumentType;

/// How a field is normalized and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Document numbers: trimmed, case-sensitive.
    Identifier,
    /// Person names: noise characters stripped, case-insensitive.
    Name,
    Date,
    /// Noise characters stripped, case-insensitive, composed on the declared side.
    Address,
    /// Other free text (countries): case-insensitive.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSchema {
    pub document_type: DocumentType,
    pub fields: Vec<FieldSpec>,
    /// Declared address = line1, line2, city, state, zip joined; otherwise line1 only.
    pub composite_address: bool,
}

impl DocumentSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn date_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Date)
            .map(|f| f.name.as_str())
    }
}

type SchemaRow = (&'static str, &'static [(&'static str, FieldKind)], bool);

const DEFAULT_SCHEMAS: &[SchemaRow] = &[
    (
        DocumentType::NATIONAL_ID,
        &[
            ("documentNumber", FieldKind::Identifier),
            ("name", FieldKind::Name),
            ("dateOfBirth", FieldKind::Date),
            ("dateOfIssue", FieldKind::Date),
            ("address", FieldKind::Address),
        ],
        true,
    ),
    (
        DocumentType::PASSPORT,
        &[
            ("documentNumber", FieldKind::Identifier),
            ("name", FieldKind::Name),
            ("dateOfBirth", FieldKind::Date),
            ("dateOfExpiry", FieldKind::Date),
            ("issuingCountry", FieldKind::Text),
        ],
        false,
    ),
    (
        DocumentType::DRIVING_LICENSE,
        &[
            ("documentNumber", FieldKind::Identifier),
            ("name", FieldKind::Name),
            ("dateOfBirth", FieldKind::Date),
            ("dateOfExpiry", FieldKind::Date),
            ("address", FieldKind::Address),
        ],
        true,
    ),
];

/// Registry of comparison schemas keyed by document type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<DocumentType, DocumentSchema>,
}

impl SchemaRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// National ID, passport and driving licence schemas.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (doc_type, fields, composite_address) in DEFAULT_SCHEMAS {
            registry.register(DocumentSchema {
                document_type: DocumentType::new(*doc_type),
                fields: fields
                    .iter()
                    .map(|(name, kind)| FieldSpec::new(*name, *kind))
                    .collect(),
                composite_address: *composite_address,
            });
        }
        registry
    }

    /// Add or replace the schema for a document type.
    pub fn register(&mut self, schema: DocumentSchema) {
        self.schemas.insert(schema.document_type.clone(), schema);
    }

    pub fn get(&self, document_type: &DocumentType) -> Result<&DocumentSchema, FieldError> {
        self.schemas
            .get(document_type)
            .ok_or_else(|| FieldError::UnknownDocumentType(document_type.to_string()))
    }

    pub fn contains(&self, document_type: &DocumentType) -> bool {
        self.schemas.contains_key(document_type)
    }

    pub fn document_types(&self) -> impl Iterator<Item = &DocumentType> {
        self.schemas.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_three_document_types() {
        let registry = SchemaRegistry::with_defaults();
        assert!(registry.contains(&DocumentType::national_id()));
        assert!(registry.contains(&DocumentType::passport()));
        assert!(registry.contains(&DocumentType::driving_license()));
        assert_eq!(registry.document_types().count(), 3);
    }

    #[test]
    fn passport_has_no_address() {
        let registry = SchemaRegistry::with_defaults();
        let passport = registry.get(&DocumentType::passport()).unwrap();
        assert!(passport.field("address").is_none());
        assert!(!passport.composite_address);
        assert_eq!(passport.date_fields().collect::<Vec<_>>(), vec!["dateOfBirth", "dateOfExpiry"]);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = SchemaRegistry::with_defaults();
        let err = registry.get(&DocumentType::new("residence_permit")).unwrap_err();
        assert_eq!(err, FieldError::UnknownDocumentType("residence_permit".into()));
    }

    #[test]
    fn new_types_register_without_code_changes() {
        let mut registry = SchemaRegistry::with_defaults();
        registry.register(DocumentSchema {
            document_type: DocumentType::new("residence_permit"),
            fields: vec![
                FieldSpec::new("documentNumber", FieldKind::Identifier),
                FieldSpec::new("name", FieldKind::Name),
                FieldSpec::new("dateOfExpiry", FieldKind::Date),
            ],
            composite_address: false,
        });
        let schema = registry.get(&DocumentType::new("Residence_Permit")).unwrap();
        assert_eq!(schema.fields.len(), 3);
    }
}
