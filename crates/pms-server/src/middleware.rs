use std::time::Instant;

use axum::extract::{FromRequestParts, State};
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pms_api::ApiError;
use pms_auth::AccessTokenClaims;
use uuid::Uuid;

use crate::metrics::record_http_request;
use crate::server::AppState;

// =============================================================================
// Authentication
// =============================================================================

/// Validates the Bearer token and stores its claims in the request
/// extensions. Requests without a valid token get 401.
pub async fn authenticate(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let claims = match bearer_token(req.headers())
        .and_then(|token| state.tokens.validate(token).map_err(ApiError::from))
    {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(path = %req.uri().path(), error = %e, "authentication failed");
            return e.into_response();
        }
    };

    tracing::debug!(subject = %claims.sub, "token validated");
    req.extensions_mut().insert(claims);
    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(ApiError::unauthorized("Invalid Authorization header format")),
    }
}

/// Claims of the authenticated caller.
///
/// Only available behind [`authenticate`]; elsewhere extraction fails with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AccessTokenClaims);

impl CurrentUser {
    pub fn require(&self, permission: &str) -> Result<(), ApiError> {
        if self.0.has_permission(permission) {
            Ok(())
        } else {
            tracing::debug!(subject = %self.0.sub, permission, "permission denied");
            Err(ApiError::forbidden(format!("Missing permission '{permission}'")))
        }
    }

    pub fn id(&self) -> Result<Uuid, ApiError> {
        Ok(self.0.user_id()?)
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessTokenClaims>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

// =============================================================================
// Other Middleware
// =============================================================================

pub const REQUEST_ID_HEADER: &str = "x-request-id";

// Ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let req_id_value = req.headers().get(&header_name).cloned().unwrap_or_else(|| {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
    });

    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

/// Records request metrics and warns about slow requests.
pub async fn request_timing(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let res = next.run(req).await;

    let elapsed = started.elapsed();
    if elapsed > state.slow_request {
        tracing::warn!(
            http.method = %method,
            http.target = %path,
            elapsed_ms = elapsed.as_millis() as u64,
            "long running request"
        );
    }
    record_http_request(method.as_str(), &path, res.status().as_u16(), elapsed);
    res
}
