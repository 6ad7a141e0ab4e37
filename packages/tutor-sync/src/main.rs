use std::process::ExitCode;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use tutor_sync::auth::{AuthHandle, UserId, GUEST_USER_ID};
use tutor_sync::config::SyncConfig;
use tutor_sync::local::{LocalStore, LocalStoreError};
use tutor_sync::logging::{init_tracing, LogSettings};
use tutor_sync::remote::{FirestoreRestStore, RemoteError};
use tutor_sync::{SyncCoordinator, SyncError};

const USAGE: &str = "usage: tutor-sync [migrate|progress|stats|status]";

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Local(#[from] LocalStoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("remote store setup failed: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("unknown command `{0}`; {USAGE}")]
    UnknownCommand(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_tracing(&LogSettings::from_env(&config.log_level));

    let command = std::env::args().nth(1).unwrap_or_else(|| "progress".to_string());
    match run(&config, &command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, command = %command, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &SyncConfig, command: &str) -> Result<String, CliError> {
    let local = LocalStore::open(&config.local.path)?;
    if let Some(pages) = config.local.max_pages {
        local.limit_pages(pages)?;
    }
    if command == "migrate" {
        let output = json!({
            "path": config.local.path.display().to_string(),
            "schemaVersion": local.schema_version()?,
        });
        return Ok(serde_json::to_string_pretty(&output)?);
    }

    let auth = Arc::new(auth_from_env());
    let mut coordinator = SyncCoordinator::new(local, auth.clone(), &config.remote);
    if let Some(project_id) = config.remote.firestore_project_id.as_deref() {
        let store = FirestoreRestStore::new(config.remote.firestore_base_url.as_str(), project_id, auth)?;
        coordinator = coordinator.with_remote(Arc::new(store));
    } else {
        tracing::info!("no remote project configured, running local-only");
    }

    let output = match command {
        "progress" => json!({
            "today": coordinator.get_daily_progress().await?,
            "goals": coordinator.get_user_goals().await?,
        }),
        "stats" => json!({
            "totals": coordinator.get_user_stats().await?,
            "lastSevenDays": coordinator.get_vocab_stats(None).await?,
            "recentResults": coordinator.get_recent_results().await?,
        }),
        "status" => serde_json::to_value(coordinator.remote_status())?,
        other => return Err(CliError::UnknownCommand(other.to_string())),
    };

    Ok(serde_json::to_string_pretty(&output)?)
}

fn auth_from_env() -> AuthHandle {
    match std::env::var("TUTOR_USER_ID") {
        Ok(id) if id == GUEST_USER_ID => {
            let handle = AuthHandle::signed_out();
            handle.sign_in_guest();
            handle
        }
        Ok(id) if !id.trim().is_empty() => {
            AuthHandle::signed_in(UserId::new(id), std::env::var("TUTOR_ID_TOKEN").ok())
        }
        _ => AuthHandle::signed_out(),
    }
}
