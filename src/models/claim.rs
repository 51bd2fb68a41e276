use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RawFieldBag;

/// Document type discriminator. Open-ended: new types only need a schema
/// registered in `pipeline::schema::SchemaRegistry`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentType(String);

impl DocumentType {
    pub const NATIONAL_ID: &'static str = "national_id";
    pub const PASSPORT: &'static str = "passport";
    pub const DRIVING_LICENSE: &'static str = "driving_license";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_lowercase())
    }

    pub fn national_id() -> Self {
        Self::new(Self::NATIONAL_ID)
    }

    pub fn passport() -> Self {
        Self::new(Self::PASSPORT)
    }

    pub fn driving_license() -> Self {
        Self::new(Self::DRIVING_LICENSE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// User-declared identity record. Dates are kept exactly as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityClaim {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    #[serde(default)]
    pub nationality: Option<String>,
    pub document_type: DocumentType,
    pub document_number: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub issuing_country: Option<String>,
    #[serde(default)]
    pub country_of_residence: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl IdentityClaim {
    /// Project the claim into the raw field bag consumed by the sanitizer.
    ///
    /// Address parts are exposed individually (`address.line1` ...) so the
    /// sanitizer can compose them according to the document schema.
    pub fn raw_fields(&self) -> RawFieldBag {
        let mut bag = BTreeMap::new();
        bag.insert("documentNumber".to_string(), self.document_number.clone());
        bag.insert("name".to_string(), self.full_name.clone());
        bag.insert("dateOfBirth".to_string(), self.date_of_birth.clone());

        let optional = [
            ("dateOfIssue", &self.issue_date),
            ("dateOfExpiry", &self.expiry_date),
            ("issuingCountry", &self.issuing_country),
            ("nationality", &self.nationality),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                bag.insert(key.to_string(), v.clone());
            }
        }

        if let Some(addr) = &self.address {
            bag.insert("address.line1".to_string(), addr.line1.clone());
            if let Some(line2) = &addr.line2 {
                bag.insert("address.line2".to_string(), line2.clone());
            }
            bag.insert("address.city".to_string(), addr.city.clone());
            bag.insert("address.state".to_string(), addr.state.clone());
            bag.insert("address.zip".to_string(), addr.zip.clone());
        }

        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> IdentityClaim {
        IdentityClaim {
            id: "kyc-1".into(),
            user_id: "user-1".into(),
            full_name: "John Doe".into(),
            nationality: Some("IN".into()),
            document_type: DocumentType::national_id(),
            document_number: "1234 5678 9012".into(),
            date_of_birth: "1990-01-15".into(),
            issue_date: Some("2015-06-01".into()),
            expiry_date: None,
            issuing_country: None,
            country_of_residence: Some("IN".into()),
            address: Some(Address {
                line1: "12 MG Road".into(),
                line2: None,
                city: "Pune".into(),
                state: "MH".into(),
                zip: "411001".into(),
            }),
            created_at: None,
        }
    }

    #[test]
    fn raw_fields_expose_address_parts() {
        let bag = claim().raw_fields();
        assert_eq!(bag["address.line1"], "12 MG Road");
        assert_eq!(bag["address.zip"], "411001");
        assert!(!bag.contains_key("address.line2"));
        assert!(!bag.contains_key("address"));
    }

    #[test]
    fn raw_fields_skip_absent_optionals() {
        let bag = claim().raw_fields();
        assert_eq!(bag["dateOfIssue"], "2015-06-01");
        assert!(!bag.contains_key("dateOfExpiry"));
        assert!(!bag.contains_key("issuingCountry"));
    }

    #[test]
    fn document_type_is_normalized() {
        assert_eq!(DocumentType::new("  Passport "), DocumentType::passport());
    }

    #[test]
    fn claim_deserializes_from_camel_case_json() {
        let json = r#"{
            "id": "kyc-9", "userId": "u-9", "fullName": "Jane Roe",
            "documentType": "passport", "documentNumber": "P1234567",
            "dateOfBirth": "1985-03-02", "expiryDate": "2030-03-01",
            "issuingCountry": "GB"
        }"#;
        let claim: IdentityClaim = serde_json::from_str(json).unwrap();
        assert_eq!(claim.document_type.as_str(), "passport");
        assert_eq!(claim.expiry_date.as_deref(), Some("2030-03-01"));
        assert!(claim.address.is_none());
    }
}
