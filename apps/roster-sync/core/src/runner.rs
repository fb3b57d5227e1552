//! Run entry points: scheduled (periodic) and ad-hoc (user-triggered)
//!
//! Both take a sync context, bind the engine to its job row, drive the ten
//! phases, and finalize the row. The IdP client is built from
//! configuration here so the engine itself stays transport-free.

use crate::jobs::JobProgressWriter;
use crate::service::SyncService;
use crate::sync::{SyncEngine, SyncReport, SyncRuntime, SyncSelection};
use keycloak_admin::{BackoffPolicy, KeycloakAdminClient};
use std::sync::Arc;
use std::time::Duration;
use sync_common::{ErrorDetail, JobStatus, SyncDirection, SyncError, SyncPhase, SyncResult};

/// What a runner needs to know about one run
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub sync_id: String,
    pub direction: SyncDirection,
    pub actor_id: i64,
    pub selection: SyncSelection,
}

/// Build the admin client from configuration
pub fn build_idp_client(config: &crate::config::SyncConfig) -> SyncResult<KeycloakAdminClient> {
    let client = KeycloakAdminClient::new(
        config.idp_url.clone(),
        config.idp_realm.clone(),
        config.idp_client_id.clone(),
        config.idp_client_secret.clone(),
        Some(Duration::from_secs(config.request_timeout_secs)),
    )?;
    Ok(client.with_backoff(BackoffPolicy {
        wait_budget: Duration::from_secs(config.rate_limit_budget_secs),
        ..BackoffPolicy::default()
    }))
}

/// Execute one sync against its job row.
///
/// The job transitions `Pending → Processing` here, then to a terminal
/// status when the engine returns. A job cancelled before this call is a
/// no-op.
pub async fn run_sync(runtime: &SyncRuntime, ctx: SyncContext) -> SyncResult<SyncReport> {
    let mut job = runtime
        .job_store
        .get(&ctx.sync_id)
        .await?
        .ok_or_else(|| SyncError::validation(format!("unknown sync '{}'", ctx.sync_id)))?;

    if job.status == JobStatus::Cancelled {
        log::info!("sync {} was cancelled before it started", ctx.sync_id);
        return Ok(SyncReport {
            stats: job.stats,
            warnings: Vec::new(),
            cancelled: true,
        });
    }

    if !job.transition(JobStatus::Processing) {
        return Err(SyncError::validation(format!(
            "sync '{}' is not startable from {:?}",
            ctx.sync_id, job.status
        )));
    }
    runtime.job_store.update(&job).await?;

    let progress = Arc::new(JobProgressWriter::new(
        runtime.job_store.clone(),
        ctx.sync_id.clone(),
    ));
    let mut engine = SyncEngine::new(runtime.deps.clone(), runtime.config.clone(), progress)?
        .with_selection(ctx.selection);

    match engine.run().await {
        Ok(report) => {
            let mut job = runtime
                .job_store
                .get(&ctx.sync_id)
                .await?
                .ok_or_else(|| SyncError::store("job row disappeared during run"))?;

            job.stats = report.stats;
            job.created = report.stats.total_created();
            job.updated = report.stats.total_updated();
            job.deleted = report.stats.total_removed();
            if !report.cancelled {
                job.transition(JobStatus::Completed);
                job.progress = 100;
            }
            runtime.job_store.update(&job).await?;
            Ok(report)
        }
        Err(err) => {
            if let Ok(Some(mut job)) = runtime.job_store.get(&ctx.sync_id).await {
                job.record_error(ErrorDetail {
                    phase: job.phase.unwrap_or(SyncPhase::FetchUsers),
                    kind: err.kind().to_string(),
                    identifier: "sync".to_string(),
                    message: err.to_string(),
                });
                job.transition(JobStatus::Failed);
                let _ = runtime.job_store.update(&job).await;
            }
            log::error!("sync {} failed: {}", ctx.sync_id, err);
            Err(err)
        }
    }
}

/// Periodic entry point. Does nothing unless `sync_enabled` is set; an
/// already-running sync is skipped rather than treated as a failure.
pub async fn run_scheduled(
    service: &SyncService,
    runtime: &SyncRuntime,
    actor_id: i64,
) -> SyncResult<Option<SyncReport>> {
    if !runtime.config.sync_enabled {
        log::debug!("scheduled sync is disabled");
        return Ok(None);
    }

    let receipt = match service.start(actor_id, SyncDirection::IdpToLms).await {
        Ok(receipt) => receipt,
        Err(SyncError::Conflict(reason)) => {
            log::info!("skipping scheduled sync: {}", reason);
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let report = run_sync(
        runtime,
        SyncContext {
            sync_id: receipt.sync_id,
            direction: SyncDirection::IdpToLms,
            actor_id,
            selection: SyncSelection::all(),
        },
    )
    .await?;
    Ok(Some(report))
}
