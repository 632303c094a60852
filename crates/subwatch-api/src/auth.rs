//! Admin authentication
//!
//! Admin routes require `Authorization: Bearer <token>` matching one of the
//! configured tokens. With no tokens configured every admin request is
//! refused.

use crate::error::ApiError;
use std::collections::HashSet;
use std::sync::Arc;
use warp::{Filter, Rejection};

/// Configured admin bearer tokens
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    tokens: HashSet<String>,
}

impl AdminAuth {
    /// Create from configured tokens
    #[must_use]
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// Whether any token is configured
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Check an `Authorization` header value
    ///
    /// # Errors
    /// `ApiError::Unauthorized` for a missing, malformed or unknown token
    pub fn verify(&self, header: Option<&str>) -> Result<(), ApiError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError::Unauthorized)?;
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Filter passing only requests carrying a valid admin token
pub fn admin(auth: Arc<AdminAuth>) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and_then(move |header: Option<String>| {
            let auth = auth.clone();
            async move {
                auth.verify(header.as_deref()).map_err(|e| {
                    tracing::debug!("Rejected admin request: {}", e);
                    warp::reject::custom(e)
                })
            }
        })
        .untuple_one()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_tokens() {
        let auth = AdminAuth::new(["s3cret".to_string()]);
        assert!(auth.is_enabled());
        assert!(auth.verify(Some("Bearer s3cret")).is_ok());
        assert!(auth.verify(Some("Bearer wrong")).is_err());
        assert!(auth.verify(Some("s3cret")).is_err());
        assert!(auth.verify(None).is_err());
    }

    #[test]
    fn no_tokens_refuses_everything() {
        let auth = AdminAuth::default();
        assert!(!auth.is_enabled());
        assert!(auth.verify(Some("Bearer ")).is_err());
    }
}
