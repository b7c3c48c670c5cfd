use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::infra::app_state::AppState;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState) -> Result<()>;
}

/// Provisions the guest account and starts periodic cleanup of expired
/// sessions and finished jobs.
#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState) -> Result<()> {
        let guest = state
            .auth_service
            .ensure_guest_account(&state.config.guest_password)
            .await
            .context("failed to provision the guest account")?;
        info!(user = %guest.id, "guest account ready");

        let cleanup_state = state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            loop {
                interval.tick().await;
                run_maintenance(&cleanup_state).await;
            }
        });

        Ok(())
    }
}

pub async fn run_maintenance(state: &AppState) {
    if let Err(err) = state.auth_service.prune_expired_sessions().await {
        warn!(error = %err, "failed to prune expired sessions");
    }

    let retain = chrono::Duration::hours(state.config.thumbnails.job_retention_hours);
    let pruned = state.jobs.prune_finished(Utc::now(), retain);
    if pruned > 0 {
        info!(pruned, "forgot finished jobs");
    }
}

#[derive(Debug, Default)]
pub struct NoopStartupHooks;

#[async_trait]
impl StartupHooks for NoopStartupHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        Ok(())
    }
}
