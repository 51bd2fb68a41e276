//! `kyc-moderation <claim.json> <selfie> <document> [document_back]`
//!
//! Seeds the claim, runs one moderation against the configured provider and
//! prints the finished record as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use kyc_moderation::config::{self, ModerationConfig};
use kyc_moderation::db::{Database, SqliteClaimStore};
use kyc_moderation::models::{AssetPair, IdentityClaim};
use kyc_moderation::pipeline::recognition::HttpRecognitionClient;
use kyc_moderation::ModerationService;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Args {
    claim: PathBuf,
    selfie: PathBuf,
    document: PathBuf,
    document_back: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let parsed = Args {
        claim: args.next()?,
        selfie: args.next()?,
        document: args.next()?,
        document_back: args.next(),
    };
    args.next().is_none().then_some(parsed)
}

#[tokio::main]
async fn main() -> ExitCode {
    kyc_moderation::init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let Some(args) = parse_args() else {
        eprintln!("usage: {} <claim.json> <selfie> <document> [document_back]", config::APP_NAME);
        return ExitCode::from(2);
    };

    let config = match ModerationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let client = match HttpRecognitionClient::connect(&config.provider).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(base_url = %config.provider.base_url, error = %e, "Cannot connect to recognition provider");
            std::process::exit(1);
        }
    };

    let result = run(&config, &client, &args).await;
    client.shutdown();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Moderation run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config: &ModerationConfig,
    client: &HttpRecognitionClient,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(Database::open(&config.database_path)?);
    tracing::info!(path = %config.database_path.display(), "Database ready");

    let claim = read_claim(&args.claim)?;
    SqliteClaimStore::new(db.clone()).insert_claim(&claim)?;

    let service = ModerationService::from_config(config, db, Arc::new(client.clone()));
    let resumed = service.resume_pending().await?;
    if resumed > 0 {
        tracing::info!(resumed, "Re-queued moderations left pending by an earlier run");
    }

    let mut assets = AssetPair::new(
        uuid::Uuid::new_v4().to_string(),
        args.selfie.clone(),
        args.document.clone(),
    );
    if let Some(back) = &args.document_back {
        assets = assets.with_document_back(back.clone());
    }

    let id = service.start_moderation(&claim.id, assets).await?;
    // The three provider operations run concurrently; one extra call
    // deadline covers queueing and sanitizing.
    let timeout = config.retry.worst_case().saturating_add(config.retry.call_timeout);
    let record = service.wait_for_terminal(&id, POLL_INTERVAL, timeout).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    service.shutdown().await?;
    Ok(())
}

fn read_claim(path: &Path) -> Result<IdentityClaim, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
