//! Field sanitizer: raw declared or OCR field bags → canonical, comparable form.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

use super::schema::{DocumentSchema, FieldKind};
use super::FieldError;
use crate::models::RawFieldBag;

/// Caret and MRZ filler marks emitted by document OCR encodings.
static NOISE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\^<]+").expect("valid regex"));

static COMMA_SPACING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*,\s*").expect("valid regex"));

/// Year-first formats come first so `1990/01/02` is never read day-first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Fixed order and separator for composing a declared address.
const ADDRESS_PARTS: &[&str] = &["line1", "line2", "city", "state", "zip"];
const ADDRESS_SEPARATOR: &str = ", ";

/// Which side of the comparison a raw bag comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// User-declared claim: every schema field is required.
    Declared,
    /// Provider OCR output: missing fields are left out, not errors.
    Extracted,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum CanonicalValue {
    Text(String),
    Date(NaiveDate),
}

impl std::fmt::Display for CanonicalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

pub type CanonicalFieldBag = BTreeMap<String, CanonicalValue>;

/// Canonicalize a raw field bag against a document schema.
///
/// The output holds only schema fields. Declared bags must provide every
/// field; extracted bags may omit fields. Any present date must parse.
pub fn sanitize_fields(
    schema: &DocumentSchema,
    raw: &RawFieldBag,
    source: FieldSource,
) -> Result<CanonicalFieldBag, FieldError> {
    let mut canonical = CanonicalFieldBag::new();

    for field in &schema.fields {
        let value = match field.kind {
            FieldKind::Address => raw_address(schema, &field.name, raw, source),
            _ => raw.get(&field.name).cloned(),
        };

        let normalized = value
            .map(|v| normalize(&field.name, field.kind, &v))
            .transpose()?
            .flatten();

        match (normalized, source) {
            (Some(v), _) => {
                canonical.insert(field.name.clone(), v);
            }
            (None, FieldSource::Declared) => {
                return Err(FieldError::Malformed {
                    field: field.name.clone(),
                    reason: "missing or blank in declared data".into(),
                });
            }
            (None, FieldSource::Extracted) => {}
        }
    }

    Ok(canonical)
}

/// Normalize one value. `Ok(None)` means the value is blank.
fn normalize(field: &str, kind: FieldKind, raw: &str) -> Result<Option<CanonicalValue>, FieldError> {
    let value = match kind {
        FieldKind::Identifier => collapse_whitespace(raw),
        FieldKind::Name => collapse_whitespace(&strip_noise(raw)).to_lowercase(),
        FieldKind::Address => {
            let cleaned = collapse_whitespace(&strip_noise(raw));
            COMMA_SPACING
                .replace_all(&cleaned, ADDRESS_SEPARATOR)
                .trim_matches(|c: char| c == ',' || c.is_whitespace())
                .to_lowercase()
        }
        FieldKind::Text => collapse_whitespace(raw).to_lowercase(),
        FieldKind::Date => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            return parse_date(trimmed)
                .map(|d| Some(CanonicalValue::Date(d)))
                .ok_or_else(|| FieldError::DateParse {
                    field: field.to_string(),
                    value: trimmed.to_string(),
                });
        }
    };

    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(CanonicalValue::Text(value)))
    }
}

/// Address source per side: OCR gives one string under the field name;
/// declared data is composed from `<name>.<part>` sub-fields when the schema
/// says so.
fn raw_address(
    schema: &DocumentSchema,
    name: &str,
    raw: &RawFieldBag,
    source: FieldSource,
) -> Option<String> {
    if source == FieldSource::Extracted {
        return raw.get(name).cloned();
    }

    let parts: &[&str] = if schema.composite_address {
        ADDRESS_PARTS
    } else {
        &ADDRESS_PARTS[..1]
    };

    let composed: Vec<&str> = parts
        .iter()
        .filter_map(|part| raw.get(&format!("{name}.{part}")))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    if composed.is_empty() {
        raw.get(name).cloned()
    } else {
        Some(composed.join(ADDRESS_SEPARATOR))
    }
}

fn strip_noise(value: &str) -> String {
    NOISE_CHARS.replace_all(value, " ").into_owned()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse provider or declared date strings into a calendar date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}
