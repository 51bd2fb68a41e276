//! Store traits consumed by the moderation pipeline, with SQLite implementations.
//!
//! The moderation store is create-once, read-many, single terminal update:
//! - `create_pending`: duplicate check + Pending insert in one transaction
//! - `finalize`: the only write after creation, guarded on `status = 'pending'`

use std::sync::Arc;

use chrono::Utc;

use super::repository;
use super::{Database, DatabaseError};
use crate::error::ModerationError;
use crate::models::*;

/// Read access to declared identity data.
pub trait ClaimStore: Send + Sync {
    fn get_claim(&self, claim_id: &str) -> Result<Option<IdentityClaim>, ModerationError>;
}

/// Persistence for moderation records.
pub trait ModerationStore: Send + Sync {
    /// Insert a Pending record unless the asset pair already has a Pending
    /// record or, when `allow_after_completed` is false, a Completed one.
    fn create_pending(
        &self,
        seed: &NewModeration,
        allow_after_completed: bool,
    ) -> Result<ModerationRecord, ModerationError>;

    /// Single terminal write. Fails with `AlreadyModerated` if the record
    /// has already left Pending.
    fn finalize(
        &self,
        id: &str,
        outcome: &ModerationOutcome,
    ) -> Result<ModerationRecord, ModerationError>;

    fn get(&self, id: &str) -> Result<Option<ModerationRecord>, ModerationError>;

    fn find_active_for_asset_pair(
        &self,
        asset_pair_id: &str,
    ) -> Result<Option<ModerationRecord>, ModerationError>;

    fn list_for_claim(&self, claim_id: &str) -> Result<Vec<ModerationRecord>, ModerationError>;

    /// Records left Pending, oldest first.
    fn list_pending(&self) -> Result<Vec<ModerationRecord>, ModerationError>;
}

/// SQLite-backed claim store.
pub struct SqliteClaimStore {
    db: Arc<Database>,
}

impl SqliteClaimStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Seed a claim (claims are owned by the surrounding system; used by the
    /// binary and tests).
    pub fn insert_claim(&self, claim: &IdentityClaim) -> Result<(), ModerationError> {
        Ok(self.db.with_conn(|conn| repository::insert_claim(conn, claim))?)
    }
}

impl ClaimStore for SqliteClaimStore {
    fn get_claim(&self, claim_id: &str) -> Result<Option<IdentityClaim>, ModerationError> {
        Ok(self.db.with_conn(|conn| repository::get_claim(conn, claim_id))?)
    }
}

/// SQLite-backed moderation record store.
pub struct SqliteModerationStore {
    db: Arc<Database>,
}

impl SqliteModerationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

/// Outcome of the transactional duplicate check.
enum CreateResult {
    Created(ModerationRecord),
    Blocked(ModerationRecord),
}

impl ModerationStore for SqliteModerationStore {
    fn create_pending(
        &self,
        seed: &NewModeration,
        allow_after_completed: bool,
    ) -> Result<ModerationRecord, ModerationError> {
        let result = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            if let Some(existing) = repository::find_blocking_moderation(
                &tx,
                &seed.assets.id,
                !allow_after_completed,
            )? {
                return Ok(CreateResult::Blocked(existing));
            }

            match repository::insert_moderation(&tx, seed, Utc::now()) {
                Ok(record) => {
                    tx.commit()?;
                    Ok(CreateResult::Created(record))
                }
                Err(DatabaseError::Sqlite(e)) if is_unique_violation(&e) => {
                    // Another writer holds the pending slot for this pair
                    let existing = repository::find_blocking_moderation(&tx, &seed.assets.id, false)?;
                    match existing {
                        Some(existing) => Ok(CreateResult::Blocked(existing)),
                        None => Err(DatabaseError::ConstraintViolation(e.to_string())),
                    }
                }
                Err(e) => Err(e),
            }
        })?;

        match result {
            CreateResult::Created(record) => {
                tracing::info!(
                    moderation_id = %record.id,
                    claim_id = %record.claim_id,
                    asset_pair_id = %record.assets.id,
                    supersedes = ?record.supersedes,
                    "Moderation record created (pending)"
                );
                Ok(record)
            }
            CreateResult::Blocked(existing) => Err(ModerationError::DuplicateModeration {
                asset_pair_id: seed.assets.id.clone(),
                existing: existing.id,
                status: existing.status,
            }),
        }
    }

    fn finalize(
        &self,
        id: &str,
        outcome: &ModerationOutcome,
    ) -> Result<ModerationRecord, ModerationError> {
        let record = self.db.with_conn(|conn| {
            let rows = repository::finalize_moderation(conn, id, outcome, Utc::now())?;
            let record = repository::get_moderation(conn, id)?;
            Ok((rows, record))
        })?;

        match record {
            (1, Some(record)) => Ok(record),
            (_, Some(existing)) => Err(ModerationError::AlreadyModerated {
                id: existing.id,
                status: existing.status,
            }),
            (_, None) => Err(ModerationError::NotFound(id.to_string())),
        }
    }

    fn get(&self, id: &str) -> Result<Option<ModerationRecord>, ModerationError> {
        Ok(self.db.with_conn(|conn| repository::get_moderation(conn, id))?)
    }

    fn find_active_for_asset_pair(
        &self,
        asset_pair_id: &str,
    ) -> Result<Option<ModerationRecord>, ModerationError> {
        Ok(self
            .db
            .with_conn(|conn| repository::find_blocking_moderation(conn, asset_pair_id, true))?)
    }

    fn list_for_claim(&self, claim_id: &str) -> Result<Vec<ModerationRecord>, ModerationError> {
        Ok(self
            .db
            .with_conn(|conn| repository::list_moderations_for_claim(conn, claim_id))?)
    }

    fn list_pending(&self) -> Result<Vec<ModerationRecord>, ModerationError> {
        Ok(self.db.with_conn(repository::list_pending_moderations)?)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SqliteClaimStore, SqliteModerationStore) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let claims = SqliteClaimStore::new(db.clone());
        claims
            .insert_claim(&IdentityClaim {
                id: "kyc-1".into(),
                user_id: "user-1".into(),
                full_name: "John Doe".into(),
                nationality: None,
                document_type: DocumentType::passport(),
                document_number: "P123".into(),
                date_of_birth: "1990-01-15".into(),
                issue_date: None,
                expiry_date: Some("2030-01-01".into()),
                issuing_country: Some("GB".into()),
                country_of_residence: None,
                address: None,
                created_at: None,
            })
            .unwrap();
        (claims, SqliteModerationStore::new(db))
    }

    fn seed() -> NewModeration {
        NewModeration::new("kyc-1", AssetPair::new("up-1", "/tmp/s.jpg", "/tmp/d.jpg"))
    }

    fn outcome(status: ModerationStatus) -> ModerationOutcome {
        ModerationOutcome {
            status,
            id_recog_data: None,
            face_recog_data: None,
            face_live_data: None,
            error_logs: vec![],
            timings: StageTimings::default(),
        }
    }

    #[test]
    fn claim_store_reads_seeded_claim() {
        let (claims, _) = setup();
        assert_eq!(claims.get_claim("kyc-1").unwrap().unwrap().full_name, "John Doe");
        assert!(claims.get_claim("kyc-2").unwrap().is_none());
    }

    #[test]
    fn pending_record_blocks_second_create() {
        let (_, store) = setup();
        let first = store.create_pending(&seed(), false).unwrap();
        let err = store.create_pending(&seed(), false).unwrap_err();
        match err {
            ModerationError::DuplicateModeration { existing, status, .. } => {
                assert_eq!(existing, first.id);
                assert_eq!(status, ModerationStatus::Pending);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pending_blocks_even_when_completed_allowed() {
        let (_, store) = setup();
        store.create_pending(&seed(), false).unwrap();
        let err = store.create_pending(&seed(), true).unwrap_err();
        assert!(matches!(err, ModerationError::DuplicateModeration { .. }));
    }

    #[test]
    fn completed_record_blocks_unless_allowed() {
        let (_, store) = setup();
        let first = store.create_pending(&seed(), false).unwrap();
        store.finalize(&first.id, &outcome(ModerationStatus::Completed)).unwrap();

        let err = store.create_pending(&seed(), false).unwrap_err();
        assert!(matches!(
            err,
            ModerationError::DuplicateModeration { status: ModerationStatus::Completed, .. }
        ));
        let again = store.create_pending(&seed().superseding(first.id.clone()), true).unwrap();
        assert_eq!(again.supersedes.as_deref(), Some(first.id.as_str()));
    }

    #[test]
    fn failed_record_does_not_block() {
        let (_, store) = setup();
        let first = store.create_pending(&seed(), false).unwrap();
        store.finalize(&first.id, &outcome(ModerationStatus::Failed)).unwrap();
        assert!(store.create_pending(&seed(), false).is_ok());
    }

    #[test]
    fn finalize_twice_is_already_moderated() {
        let (_, store) = setup();
        let record = store.create_pending(&seed(), false).unwrap();
        let done = store.finalize(&record.id, &outcome(ModerationStatus::Failed)).unwrap();
        assert_eq!(done.status, ModerationStatus::Failed);

        let err = store.finalize(&record.id, &outcome(ModerationStatus::Completed)).unwrap_err();
        assert!(matches!(
            err,
            ModerationError::AlreadyModerated { status: ModerationStatus::Failed, .. }
        ));
        assert_eq!(store.get(&record.id).unwrap().unwrap().status, ModerationStatus::Failed);
    }

    #[test]
    fn finalize_unknown_is_not_found() {
        let (_, store) = setup();
        let err = store.finalize("mod-missing", &outcome(ModerationStatus::Failed)).unwrap_err();
        assert!(matches!(err, ModerationError::NotFound(_)));
    }

    #[test]
    fn pending_list_tracks_finalize() {
        let (_, store) = setup();
        let record = store.create_pending(&seed(), false).unwrap();
        assert_eq!(store.list_pending().unwrap().len(), 1);

        store.finalize(&record.id, &outcome(ModerationStatus::Completed)).unwrap();
        assert!(store.list_pending().unwrap().is_empty());
    }

    #[test]
    fn concurrent_creates_yield_exactly_one_record() {
        let (_, store) = setup();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.create_pending(&seed(), false))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(ModerationError::DuplicateModeration { .. })))
            .count();
        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(store.list_for_claim("kyc-1").unwrap().len(), 1);
    }
}
