//! Caller-facing moderation operations.
//!
//! Pre-flight checks run here and are the only errors a caller sees for a
//! new run; everything after the Pending insert happens on the worker pool
//! and ends up on the record.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ModerationConfig, WorkerConfig};
use crate::db::{ClaimStore, Database, ModerationStore, SqliteClaimStore, SqliteModerationStore};
use crate::error::ModerationError;
use crate::models::*;
use crate::pipeline::recognition::{RecognitionAdapter, RecognitionProvider};
use crate::pipeline::{ModerationJob, ModerationOrchestrator, ModerationWorkerPool, SchemaRegistry};

pub struct ModerationService {
    claims: Arc<dyn ClaimStore>,
    store: Arc<dyn ModerationStore>,
    schemas: Arc<SchemaRegistry>,
    workers: ModerationWorkerPool,
}

impl ModerationService {
    /// Start the worker pool. Must be called from within a Tokio runtime.
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        store: Arc<dyn ModerationStore>,
        orchestrator: Arc<ModerationOrchestrator>,
        workers: &WorkerConfig,
    ) -> Self {
        let schemas = orchestrator.schemas().clone();
        Self {
            claims,
            store,
            schemas,
            workers: ModerationWorkerPool::start(orchestrator, workers),
        }
    }

    /// Wire SQLite stores, default schemas and the given provider together.
    pub fn from_config(
        config: &ModerationConfig,
        db: Arc<Database>,
        provider: Arc<dyn RecognitionProvider>,
    ) -> Self {
        let store: Arc<dyn ModerationStore> = Arc::new(SqliteModerationStore::new(db.clone()));
        let orchestrator = Arc::new(ModerationOrchestrator::new(
            RecognitionAdapter::new(provider, config.retry.clone()),
            Arc::new(SchemaRegistry::with_defaults()),
            store.clone(),
            config.face_match_threshold,
        ));
        Self::new(
            Arc::new(SqliteClaimStore::new(db)),
            store,
            orchestrator,
            &config.workers,
        )
    }

    /// Create a Pending record for the asset pair and queue its run.
    pub async fn start_moderation(
        &self,
        claim_id: &str,
        assets: AssetPair,
    ) -> Result<ModerationId, ModerationError> {
        let claim = self.load_claim(claim_id).await?;
        self.preflight(&claim, &assets)?;
        self.enqueue(NewModeration::new(claim_id, assets), claim, false)
            .await
    }

    /// Second attempt on an existing record.
    ///
    /// Only an explicit request on a terminal record proceeds; it creates a
    /// new record linked to the old one, which stays untouched.
    pub async fn reevaluate(
        &self,
        record_id: &str,
        explicit: bool,
    ) -> Result<ModerationId, ModerationError> {
        let previous = self.get_moderation_result(record_id).await?;

        if !previous.is_terminal() {
            return Err(ModerationError::DuplicateModeration {
                asset_pair_id: previous.assets.id,
                existing: previous.id,
                status: previous.status,
            });
        }
        if !explicit {
            return Err(ModerationError::AlreadyModerated {
                id: previous.id,
                status: previous.status,
            });
        }

        let claim = self.load_claim(&previous.claim_id).await?;
        self.preflight(&claim, &previous.assets)?;

        tracing::info!(
            previous_id = %previous.id,
            previous_status = %previous.status,
            "Re-evaluation requested"
        );
        let seed = NewModeration::new(previous.claim_id, previous.assets).superseding(previous.id);
        self.enqueue(seed, claim, true).await
    }

    /// Queue every record left Pending by a previous process (crash or
    /// abort) so it reaches a terminal status. Call once at start-up, before
    /// new work is queued. Records whose claim has gone are skipped.
    pub async fn resume_pending(&self) -> Result<usize, ModerationError> {
        let store = self.store.clone();
        let pending = blocking(move || store.list_pending()).await?;

        let mut resumed = 0;
        for record in pending {
            let claim = match self.load_claim(&record.claim_id).await {
                Ok(claim) => claim,
                Err(ModerationError::ClaimNotFound(claim_id)) => {
                    tracing::warn!(moderation_id = %record.id, claim_id = %claim_id, "Pending moderation has no claim; not resumed");
                    continue;
                }
                Err(e) => return Err(e),
            };
            tracing::info!(moderation_id = %record.id, asset_pair_id = %record.assets.id, "Resuming pending moderation");
            self.workers.submit(ModerationJob { record, claim }).await?;
            resumed += 1;
        }
        Ok(resumed)
    }

    /// Current state of a record; may still be Pending.
    pub async fn get_moderation_result(&self, id: &str) -> Result<ModerationRecord, ModerationError> {
        let store = self.store.clone();
        let key = id.to_string();
        blocking(move || store.get(&key))
            .await?
            .ok_or_else(|| ModerationError::NotFound(id.to_string()))
    }

    /// Every record for a claim, newest first.
    pub async fn moderation_history(&self, claim_id: &str) -> Result<Vec<ModerationRecord>, ModerationError> {
        let store = self.store.clone();
        let claim_id = claim_id.to_string();
        blocking(move || store.list_for_claim(&claim_id)).await
    }

    /// Poll a record until it is terminal or `timeout` elapses. Returns the
    /// last observed state either way.
    pub async fn wait_for_terminal(
        &self,
        id: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<ModerationRecord, ModerationError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let record = self.get_moderation_result(id).await?;
            if record.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(record);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Finish queued runs, then stop.
    pub async fn shutdown(self) -> Result<(), ModerationError> {
        self.workers.shutdown().await
    }

    /// Stop without finishing; unfinished records stay Pending.
    pub async fn abort(self) {
        self.workers.abort().await
    }

    async fn load_claim(&self, claim_id: &str) -> Result<IdentityClaim, ModerationError> {
        let claims = self.claims.clone();
        let key = claim_id.to_string();
        blocking(move || claims.get_claim(&key))
            .await?
            .ok_or_else(|| ModerationError::ClaimNotFound(claim_id.to_string()))
    }

    fn preflight(&self, claim: &IdentityClaim, assets: &AssetPair) -> Result<(), ModerationError> {
        assets.validate()?;
        if !self.schemas.contains(&claim.document_type) {
            return Err(ModerationError::UnsupportedDocumentType(
                claim.document_type.to_string(),
            ));
        }
        Ok(())
    }

    async fn enqueue(
        &self,
        seed: NewModeration,
        claim: IdentityClaim,
        allow_after_completed: bool,
    ) -> Result<ModerationId, ModerationError> {
        let store = self.store.clone();
        let record = blocking(move || store.create_pending(&seed, allow_after_completed)).await?;
        let id = record.id.clone();

        if let Err(e) = self.workers.submit(ModerationJob { record, claim }).await {
            tracing::warn!(moderation_id = %id, "Worker queue closed; record left pending");
            return Err(e);
        }
        Ok(id)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ModerationError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ModerationError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
