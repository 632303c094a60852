//! Health routes

use super::with_state;
use crate::auth::admin;
use crate::dto::HealthRecordBody;
use crate::error::reject;
use crate::params::HealthHistoryParams;
use crate::state::AppState;
use subwatch_core::ComponentKind;
use warp::{Filter, Rejection, Reply};

pub(super) fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let system = warp::path!("health" / "system")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(system);

    let by_kind = warp::path("health")
        .and(
            warp::path("integrations")
                .map(|| ComponentKind::Integration)
                .or(warp::path("ai-providers").map(|| ComponentKind::AiProvider))
                .unify(),
        )
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(components);

    let detailed = warp::path!("health" / "detailed")
        .and(warp::get())
        .and(admin(state.auth.clone()))
        .and(warp::query::<HealthHistoryParams>())
        .and(with_state(state))
        .and_then(history);

    system.or(by_kind).or(detailed)
}

async fn system(state: AppState) -> Result<impl Reply, Rejection> {
    let health = state.monitor.health.system_status().await.map_err(reject)?;
    Ok(warp::reply::json(&health))
}

async fn components(kind: ComponentKind, state: AppState) -> Result<impl Reply, Rejection> {
    let components = state
        .monitor
        .health
        .current(Some(kind))
        .await
        .map_err(reject)?;
    Ok(warp::reply::json(&components))
}

async fn history(params: HealthHistoryParams, state: AppState) -> Result<impl Reply, Rejection> {
    let (since, page) = params.parse().map_err(reject)?;
    let records = state
        .monitor
        .health
        .history(since, page)
        .await
        .map_err(reject)?
        .map(HealthRecordBody::from);
    Ok(warp::reply::json(&records))
}
