//! Admin analytics routes, served from the TTL caches

use super::with_state;
use crate::auth::admin;
use crate::error::reject;
use crate::params::{OverviewParams, ProjectParams};
use crate::state::AppState;
use warp::{Filter, Rejection, Reply};

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let admin = admin(state.auth.clone());

    let stats = warp::path!("analytics" / "stats")
        .and(warp::get())
        .and(admin.clone())
        .and(warp::query::<OverviewParams>())
        .and(with_state(state.clone()))
        .and_then(stats);

    let pathways = warp::path!("analytics" / "pathways")
        .and(warp::get())
        .and(admin.clone())
        .and(warp::query::<ProjectParams>())
        .and(with_state(state.clone()))
        .and_then(pathways);

    let errors = warp::path!("analytics" / "errors")
        .and(warp::get())
        .and(admin.clone())
        .and(with_state(state.clone()))
        .and_then(errors);

    let integrations = warp::path!("analytics" / "integrations")
        .and(warp::get())
        .and(admin)
        .and(with_state(state))
        .and_then(integrations);

    stats.or(pathways).or(errors).or(integrations)
}

async fn stats(params: OverviewParams, state: AppState) -> Result<impl Reply, Rejection> {
    let (project_id, range) = params.parse().map_err(reject)?;
    let stats = state
        .monitor
        .analytics
        .submission_stats(project_id, range)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&*stats))
}

async fn pathways(params: ProjectParams, state: AppState) -> Result<impl Reply, Rejection> {
    let project_id = params.parse().map_err(reject)?;
    let breakdown = state
        .monitor
        .analytics
        .pathway_breakdown(project_id)
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&*breakdown))
}

async fn errors(state: AppState) -> Result<impl Reply, Rejection> {
    let analysis = state.monitor.analytics.error_analysis().await.map_err(reject)?;
    Ok(warp::reply::json(&*analysis))
}

async fn integrations(state: AppState) -> Result<impl Reply, Rejection> {
    let metrics = state
        .monitor
        .analytics
        .integration_metrics()
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&*metrics))
}
