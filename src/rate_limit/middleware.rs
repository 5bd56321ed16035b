//! axum integration
//!
//! [`rate_limit_middleware`] serves two roles depending on its state:
//!
//! - global (`RateLimitState::global`): skips excluded prefixes and picks the
//!   endpoint class from the request path
//! - per-route (`RateLimitState::for_class`): always applies the given class
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/tools/{slug}", get(tool_detail))
//!     .route_layer(middleware::from_fn_with_state(
//!         RateLimitState::for_class(limiter.clone(), EndpointClass::View),
//!         rate_limit_middleware,
//!     ));
//! ```

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::SocketAddr;

use super::identity::{RequestDescriptor, UserDescriptor};
use super::limiter::{RateLimitDecision, RateLimitInfo, RateLimiter};
use super::tier::EndpointClass;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";
pub const X_RATELIMIT_BURST_LIMIT: &str = "x-ratelimit-burst-limit";
pub const X_RATELIMIT_BURST_REMAINING: &str = "x-ratelimit-burst-remaining";

/// Middleware state
#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,

    /// Fixed endpoint class, `None` for path-based classification
    pub endpoint_class: Option<EndpointClass>,
}

impl RateLimitState {
    pub fn global(limiter: RateLimiter) -> Self {
        Self {
            limiter,
            endpoint_class: None,
        }
    }

    pub fn for_class(limiter: RateLimiter, endpoint_class: EndpointClass) -> Self {
        Self {
            limiter,
            endpoint_class: Some(endpoint_class),
        }
    }
}

/// A rejected request, rendered as 429 with the quota headers
#[derive(Debug, Clone)]
pub struct Throttled(pub RateLimitDecision);

impl Throttled {
    /// Seconds for the `Retry-After` header, at least 1
    pub fn retry_after(&self) -> u64 {
        self.0.retry_after.unwrap_or(1).max(1)
    }
}

impl IntoResponse for Throttled {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after();
        let body = json!({
            "error": "Rate limit exceeded",
            "message": format!(
                "Too many requests. Please try again in {} seconds.",
                retry_after
            ),
            "retry_after": retry_after,
        });

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        apply_headers(headers, &self.0.info);
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

impl RateLimiter {
    /// Check and convert a rejection into [`Throttled`], for handlers that
    /// throttle themselves
    pub async fn throttle(
        &self,
        request: &RequestDescriptor,
        class: EndpointClass,
    ) -> Result<RateLimitDecision, Throttled> {
        let decision = self.is_rate_limited(request, class).await;
        if decision.limited {
            Err(Throttled(decision))
        } else {
            Ok(decision)
        }
    }
}

/// Write the `X-RateLimit-*` headers for `info`
pub fn apply_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_LIMIT),
        HeaderValue::from(info.rate_limit),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(info.rate_remaining),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_RESET),
        HeaderValue::from(info.rate_reset),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_BURST_LIMIT),
        HeaderValue::from(info.burst_limit),
    );
    headers.insert(
        HeaderName::from_static(X_RATELIMIT_BURST_REMAINING),
        HeaderValue::from(info.burst_remaining),
    );
}

/// Identity inputs from an axum request.
///
/// The user comes from a [`UserDescriptor`] extension inserted by an
/// upstream auth layer; the peer address needs
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn request_descriptor(request: &Request) -> RequestDescriptor {
    RequestDescriptor {
        user: request.extensions().get::<UserDescriptor>().cloned(),
        forwarded_for: request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        remote_addr: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    mut request: Request,
    next: Next,
) -> Response {
    let class = match state.endpoint_class {
        Some(class) => class,
        None => {
            let path = request.uri().path();
            if state.limiter.config().is_excluded(path) {
                return next.run(request).await;
            }
            EndpointClass::from_path(path)
        }
    };

    let descriptor = request_descriptor(&request);
    let decision = match state.limiter.throttle(&descriptor, class).await {
        Ok(decision) => decision,
        Err(throttled) => return throttled.into_response(),
    };

    let info = decision.info;
    request.extensions_mut().insert(decision);

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &info);
    response
}
