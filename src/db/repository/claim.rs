use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::{Address, DocumentType, IdentityClaim};

pub fn insert_claim(conn: &Connection, claim: &IdentityClaim) -> Result<(), DatabaseError> {
    let created_at = claim
        .created_at
        .clone()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
    let address = claim.address.as_ref();

    conn.execute(
        "INSERT INTO identity_claims (id, user_id, full_name, nationality, document_type,
         document_number, date_of_birth, issue_date, expiry_date, issuing_country,
         country_of_residence, address_line1, address_line2, city, state, zip_code, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            claim.id,
            claim.user_id,
            claim.full_name,
            claim.nationality,
            claim.document_type.as_str(),
            claim.document_number,
            claim.date_of_birth,
            claim.issue_date,
            claim.expiry_date,
            claim.issuing_country,
            claim.country_of_residence,
            address.map(|a| a.line1.as_str()),
            address.and_then(|a| a.line2.as_deref()),
            address.map(|a| a.city.as_str()),
            address.map(|a| a.state.as_str()),
            address.map(|a| a.zip.as_str()),
            created_at,
        ],
    )?;
    Ok(())
}

pub fn get_claim(conn: &Connection, id: &str) -> Result<Option<IdentityClaim>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, full_name, nationality, document_type, document_number,
         date_of_birth, issue_date, expiry_date, issuing_country, country_of_residence,
         address_line1, address_line2, city, state, zip_code, created_at
         FROM identity_claims WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], |row| {
        let line1: Option<String> = row.get(11)?;
        let address = match line1 {
            Some(line1) => Some(Address {
                line1,
                line2: row.get(12)?,
                city: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
                state: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                zip: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
            }),
            None => None,
        };

        Ok(IdentityClaim {
            id: row.get(0)?,
            user_id: row.get(1)?,
            full_name: row.get(2)?,
            nationality: row.get(3)?,
            document_type: DocumentType::new(row.get::<_, String>(4)?),
            document_number: row.get(5)?,
            date_of_birth: row.get(6)?,
            issue_date: row.get(7)?,
            expiry_date: row.get(8)?,
            issuing_country: row.get(9)?,
            country_of_residence: row.get(10)?,
            address,
            created_at: row.get(16)?,
        })
    });

    match result {
        Ok(claim) => Ok(Some(claim)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn claim() -> IdentityClaim {
        IdentityClaim {
            id: "kyc-1".into(),
            user_id: "user-1".into(),
            full_name: "John Doe".into(),
            nationality: None,
            document_type: DocumentType::national_id(),
            document_number: "123456789012".into(),
            date_of_birth: "1990-01-15".into(),
            issue_date: Some("2015-06-01".into()),
            expiry_date: None,
            issuing_country: None,
            country_of_residence: Some("IN".into()),
            address: Some(Address {
                line1: "12 MG Road".into(),
                line2: Some("Flat 4".into()),
                city: "Pune".into(),
                state: "MH".into(),
                zip: "411001".into(),
            }),
            created_at: Some("2026-01-01T00:00:00+00:00".into()),
        }
    }

    #[test]
    fn insert_and_get_claim() {
        let conn = open_memory_database().unwrap();
        insert_claim(&conn, &claim()).unwrap();
        let loaded = get_claim(&conn, "kyc-1").unwrap().unwrap();
        assert_eq!(loaded, claim());
    }

    #[test]
    fn missing_claim_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_claim(&conn, "kyc-404").unwrap().is_none());
    }

    #[test]
    fn claim_without_address_round_trips() {
        let conn = open_memory_database().unwrap();
        let mut c = claim();
        c.address = None;
        insert_claim(&conn, &c).unwrap();
        let loaded = get_claim(&conn, "kyc-1").unwrap().unwrap();
        assert!(loaded.address.is_none());
    }

    #[test]
    fn duplicate_claim_id_fails() {
        let conn = open_memory_database().unwrap();
        insert_claim(&conn, &claim()).unwrap();
        assert!(insert_claim(&conn, &claim()).is_err());
    }
}
