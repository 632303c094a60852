//! Route table
//!
//! | route | access |
//! |---|---|
//! | `GET /submissions/overview` | admin |
//! | `GET /submissions/{recent,failed,by-status}` | admin |
//! | `GET /submissions/retries` | admin |
//! | `POST /submissions/{id}/retries/{stage}/requeue` | admin |
//! | `GET /submissions/{id}/status` | public, rate limited |
//! | `GET /health/{system,integrations,ai-providers}` | public |
//! | `GET /health/detailed` | admin |
//! | `GET /analytics/{stats,pathways,errors,integrations}` | admin |

mod analytics;
mod health;
mod submissions;

use crate::error::handle_rejection;
use crate::state::AppState;
use std::convert::Infallible;
use warp::{Filter, Reply};

/// Every route, with rejection handling and request tracing
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    submissions::routes(state.clone())
        .or(health::routes(state.clone()))
        .or(analytics::routes(state))
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
