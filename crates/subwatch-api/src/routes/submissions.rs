//! Submission routes

use super::with_state;
use crate::auth::admin;
use crate::dto::{OverviewBody, PublicStatus, RetryTaskSummary, SubmissionSummary};
use crate::error::reject;
use crate::params::{Listing, ListingParams, OverviewParams, RetryListParams};
use crate::rate_limit;
use crate::state::AppState;
use subwatch_core::{MonitorError, RetryKey, Stage, SubmissionId};
use warp::{Filter, Rejection, Reply};

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let admin = admin(state.auth.clone());

    let overview_route = warp::path!("submissions" / "overview")
        .and(warp::get())
        .and(admin.clone())
        .and(warp::query::<OverviewParams>())
        .and(with_state(state.clone()))
        .and_then(overview);

    let listing = warp::path("recent")
        .map(|| Listing::Recent)
        .or(warp::path("failed").map(|| Listing::Failed))
        .unify()
        .or(warp::path("by-status").map(|| Listing::ByStatus))
        .unify();
    let listing_route = warp::path("submissions")
        .and(listing)
        .and(warp::path::end())
        .and(warp::get())
        .and(admin.clone())
        .and(warp::query::<ListingParams>())
        .and(with_state(state.clone()))
        .and_then(list_submissions);

    let retries_route = warp::path!("submissions" / "retries")
        .and(warp::get())
        .and(admin.clone())
        .and(warp::query::<RetryListParams>())
        .and(with_state(state.clone()))
        .and_then(list_retries);

    let requeue_route = warp::path!("submissions" / SubmissionId / "retries" / String / "requeue")
        .and(warp::post())
        .and(admin)
        .and(with_state(state.clone()))
        .and_then(requeue);

    let status_route = warp::path!("submissions" / SubmissionId / "status")
        .and(warp::get())
        .and(rate_limit::client())
        .and(with_state(state))
        .and_then(public_status);

    overview_route
        .or(listing_route)
        .or(retries_route)
        .or(requeue_route)
        .or(status_route)
}

async fn overview(params: OverviewParams, state: AppState) -> Result<impl Reply, Rejection> {
    let (project_id, range) = params.parse().map_err(reject)?;
    let overview = state
        .monitor
        .overview(project_id, range)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&OverviewBody::from(overview)))
}

async fn list_submissions(
    listing: Listing,
    params: ListingParams,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let query = params.query(listing).map_err(reject)?;
    let page = state
        .monitor
        .list_submissions(&query)
        .await
        .map_err(reject)?
        .map(SubmissionSummary::from);
    Ok(warp::reply::json(&page))
}

async fn list_retries(params: RetryListParams, state: AppState) -> Result<impl Reply, Rejection> {
    let (status, page) = params.parse().map_err(reject)?;
    let page = state
        .monitor
        .retries
        .queue()
        .list(status, page)
        .await
        .map_err(reject)?
        .map(RetryTaskSummary::from);
    Ok(warp::reply::json(&page))
}

async fn requeue(
    submission_id: SubmissionId,
    stage: String,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    let stage: Stage = stage
        .parse()
        .map_err(|e| reject(MonitorError::from(e)))?;
    let task = state
        .monitor
        .retries
        .queue()
        .requeue(RetryKey::new(submission_id, stage))
        .await
        .map_err(reject)?;
    tracing::info!("Admin requeued {} at {}", submission_id, stage);
    Ok(warp::reply::json(&RetryTaskSummary::from(task)))
}

/// Public status never fails on monitor-internal problems: it falls back to
/// the last answer served for the submission, or a degraded empty payload.
async fn public_status(
    submission_id: SubmissionId,
    client: String,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    state.limiter.check(&client).map_err(reject)?;

    let body = match state.monitor.tracker.get_status(submission_id).await {
        Ok(view) => {
            state.last_known.insert(submission_id, view.clone()).await;
            PublicStatus::live(view)
        }
        Err(e) if e.is_not_found() => return Err(reject(e)),
        Err(e) => {
            tracing::warn!("Serving degraded status for {}: {}", submission_id, e);
            match state.last_known.get(&submission_id).await {
                Some(view) => PublicStatus::cached(view),
                None => PublicStatus::unavailable(submission_id),
            }
        }
    };
    Ok(warp::reply::json(&body))
}
