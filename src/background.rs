use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use crate::domain::models::job::Job;
use crate::error::AppError;
use crate::state::AppState;

const JOB_BATCH: i32 = 10;

/// Counts from one pass of the worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub failed: usize,
    pub expired_requests: usize,
    pub purged_keys: u64,
    pub reconciled: usize,
}

pub async fn start_background_worker(state: Arc<AppState>) {
    info!("Starting background job worker...");
    let interval = Duration::from_secs(state.config.worker_interval_secs.max(1));

    loop {
        run_once(&state).await;
        sleep(interval).await;
    }
}

/// One pass: expire stale requests, reconcile unbooked approvals, drain the
/// outbox and drop idempotency records past their TTL. Failures are logged and
/// left for the next pass.
pub async fn run_once(state: &Arc<AppState>) -> TickReport {
    let mut report = TickReport::default();

    match state.linking_service.expire_stale_requests().await {
        Ok(expired) => report.expired_requests = expired.len(),
        Err(e) => error!("Failed to expire stale linking requests: {:?}", e),
    }

    match state.validation_gate.reconcile_validated().await {
        Ok(count) => report.reconciled = count,
        Err(e) => error!("Failed to reconcile validated requests: {:?}", e),
    }

    loop {
        let jobs = match state.job_repo.find_pending(JOB_BATCH).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Failed to fetch pending jobs: {:?}", e);
                break;
            }
        };
        let claimed = jobs.len();

        for job in jobs {
            let span = info_span!(
                "background_job",
                job_id = %job.id,
                job_type = job.job_type.as_str(),
                recipient_id = %job.payload.recipient_id
            );

            let delivered = async {
                info!("Processing job");
                match dispatch(state, &job).await {
                    Ok(_) => {
                        info!("Job completed successfully");
                        if let Err(e) = state.job_repo.update_status(&job.id, "COMPLETED", None).await {
                            error!("Failed to mark job as completed: {:?}", e);
                        }
                        true
                    }
                    Err(e) => {
                        let err_msg = format!("{}", e);
                        error!("Job failed with error: {}", err_msg);
                        if let Err(up_err) = state.job_repo.update_status(&job.id, "FAILED", Some(err_msg)).await {
                            error!("Failed to mark job as failed: {:?}", up_err);
                        }
                        false
                    }
                }
            }
                .instrument(span)
                .await;

            if delivered { report.dispatched += 1 } else { report.failed += 1 }
        }

        if claimed < JOB_BATCH as usize {
            break;
        }
    }

    match state.booking_workflow.purge_expired_idempotency().await {
        Ok(purged) => report.purged_keys = purged,
        Err(e) => error!("Failed to purge idempotency records: {:?}", e),
    }

    report
}

async fn dispatch(state: &AppState, job: &Job) -> Result<(), AppError> {
    state.notifier
        .notify(job.job_type.as_str(), &job.payload.recipient_id, &job.payload.data)
        .await
}
