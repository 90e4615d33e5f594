// Copyright (c) 2026, Anthony DeDominic <adedomin@gmail.com>
//
// Permission to use, copy, modify, and/or distribute this software for any
// purpose with or without fee is hereby granted, provided that the above
// copyright notice and this permission notice appear in all copies.
//
// THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
// WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
// MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
// ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
// WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
// ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
// OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.

//! The fixed per-request pipeline (spec §4.6):
//! `IPResolver -> (health bypass) -> PolicyGate -> ReputationGate -> RateLimiter -> next`.
//!
//! Every stage here needs to await the shared store, so the decision can't
//! be made synchronously inside `call()`. The future is a plain boxed async
//! block instead; see [`PipelineFut`].

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::ConnectInfo;
use axum::response::{IntoResponse, Response};
use axum::body::Body;
use http::Request;
use tower::{Layer, Service};

use crate::auth::user_id_from_request;
use crate::errors::GatewayError;
use crate::geo::GeoLookup;
use crate::ip::{self, TrustedProxies};
use crate::policy::{PolicyCache, gate as policy_gate};
use crate::ratelimit::config_store::RateLimitConfigStore;
use crate::ratelimit::token_bucket::TokenBucketStrategy;
use crate::reputation::{Decision as ReputationDecision, ReputationGate};

/// spec §4.5.1 `getId`: API key, then authenticated user id, then client IP.
/// Only the `api-key` scope consults the config store for capacity/refillRate
/// (spec §4.5.4); the other two arms use the configured defaults.
const API_KEY_HEADER: &str = "x-api-key";

async fn resolve_rate_limit_params(
    request: &Request<Body>,
    client_ip: Option<std::net::IpAddr>,
    rl_config: &RateLimitConfigStore,
    default_capacity: f64,
    default_refill_rate: f64,
) -> (String, f64, f64) {
    if let Some(api_key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
    {
        let cfg = rl_config.get(api_key).await.unwrap_or_else(|e| {
            log::warn!("rate-limit config lookup failed for api key, using defaults: {e}");
            crate::ratelimit::config_store::RateLimitConfig {
                capacity: default_capacity,
                refill_rate: default_refill_rate,
                is_default: true,
            }
        });
        return (api_key.to_owned(), cfg.capacity, cfg.refill_rate);
    }

    if let Some(user_id) = user_id_from_request(request) {
        return (user_id, default_capacity, default_refill_rate);
    }

    let id = client_ip.map(|ip| ip.to_string()).unwrap_or_default();
    (id, default_capacity, default_refill_rate)
}

fn apply_headers(resp: &mut Response, headers: &[(String, String)]) {
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            resp.headers_mut().insert(name, value);
        }
    }
}

fn is_health_path(path: &str) -> bool {
    path == "/healthz" || path == "/health" || path.starts_with("/health/") || path.starts_with("/healthz/")
}

#[derive(Clone)]
pub struct PipelineState {
    pub trusted_proxies: Arc<TrustedProxies>,
    pub policy_cache: Arc<PolicyCache>,
    pub reputation_gate: Arc<ReputationGate>,
    pub geo: Arc<dyn GeoLookup>,
    pub rate_limiter: Arc<TokenBucketStrategy>,
    pub rl_config: Arc<RateLimitConfigStore>,
    pub default_capacity: f64,
    pub default_refill_rate: f64,
}

#[derive(Clone)]
pub struct Pipeline {
    state: PipelineState,
}

impl Pipeline {
    pub fn new(state: PipelineState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for Pipeline {
    type Service = PipelineMiddle<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineMiddle {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PipelineMiddle<S> {
    inner: S,
    state: PipelineState,
}

pub type PipelineFut = Pin<Box<dyn Future<Output = Result<Response, std::convert::Infallible>> + Send>>;

impl<S> Service<Request<Body>> for PipelineMiddle<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = PipelineFut;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if is_health_path(request.uri().path()) {
            let mut inner = self.inner.clone();
            return Box::pin(async move {
                match inner.call(request).await {
                    Ok(resp) => Ok(resp),
                    Err(_) => Ok(GatewayError::Misconfig("downstream service error".to_owned()).into_response()),
                }
            });
        }

        let state = self.state.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let remote = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0);
            let client_ip = ip::resolve(remote, request.headers(), &state.trusted_proxies);

            match policy_gate::decide(client_ip, &state.policy_cache, state.geo.as_ref()) {
                policy_gate::Decision::RejectInvalidClient => {
                    return Ok(GatewayError::InvalidClient.into_response());
                }
                policy_gate::Decision::RejectPolicy => {
                    return Ok(GatewayError::PolicyBlock("denylisted").into_response());
                }
                policy_gate::Decision::Pass => {}
            }

            // spec §4.4: missing IP passes the reputation stage (PolicyGate
            // already rejected it above, so this is unreachable in practice).
            if let Some(ip) = client_ip
                && state.reputation_gate.evaluate(ip).await == ReputationDecision::Reject
            {
                return Ok(GatewayError::ReputationBlock.into_response());
            }

            let (id, capacity, refill_rate) = resolve_rate_limit_params(
                &request,
                client_ip,
                &state.rl_config,
                state.default_capacity,
                state.default_refill_rate,
            )
            .await;
            let rate_headers = match state.rate_limiter.check(&id, capacity, refill_rate).await {
                Ok(verdict) if verdict.admitted => verdict.headers,
                Ok(verdict) => {
                    let mut resp = GatewayError::RateLimited.into_response();
                    apply_headers(&mut resp, &verdict.headers);
                    return Ok(resp);
                }
                Err(e) => {
                    return Ok(GatewayError::Misconfig(e.to_string()).into_response());
                }
            };

            match inner.call(request).await {
                Ok(mut resp) => {
                    apply_headers(&mut resp, &rate_headers);
                    Ok(resp)
                }
                Err(_) => Ok(GatewayError::Misconfig("downstream service error".to_owned()).into_response()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::config_store::RateLimitConfig;
    use crate::store::memory::MemoryStore;

    #[test]
    fn health_paths_match_exactly_and_as_prefix() {
        assert!(is_health_path("/health"));
        assert!(is_health_path("/healthz"));
        assert!(is_health_path("/health/live"));
        assert!(is_health_path("/healthz/ready"));
        assert!(!is_health_path("/healthcheck"));
        assert!(!is_health_path("/v1/health"));
    }

    fn req(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn api_key_present_consults_config_store() {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemoryStore::new());
        let rl_config = RateLimitConfigStore::new(store, RateLimitConfig {
            capacity: 60.0,
            refill_rate: 1.0,
            is_default: true,
        });
        rl_config.update("K", 2.0, 1.0).await.unwrap();

        let request = req(&[("x-api-key", "K")]);
        let (id, capacity, refill_rate) = resolve_rate_limit_params(&request, None, &rl_config, 60.0, 1.0).await;

        assert_eq!(id, "K");
        assert_eq!(capacity, 2.0);
        assert_eq!(refill_rate, 1.0);
    }

    #[tokio::test]
    async fn no_api_key_falls_back_to_user_id_then_defaults() {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemoryStore::new());
        let rl_config = RateLimitConfigStore::new(store, RateLimitConfig {
            capacity: 60.0,
            refill_rate: 1.0,
            is_default: true,
        });

        let request = req(&[("x-user-id", "u1")]);
        let (id, capacity, refill_rate) = resolve_rate_limit_params(&request, None, &rl_config, 60.0, 1.0).await;
        assert_eq!(id, "u1");
        assert_eq!(capacity, 60.0);
        assert_eq!(refill_rate, 1.0);
    }

    #[tokio::test]
    async fn no_api_key_or_user_id_falls_back_to_client_ip() {
        let store: Arc<dyn crate::store::Store> = Arc::new(MemoryStore::new());
        let rl_config = RateLimitConfigStore::new(store, RateLimitConfig {
            capacity: 60.0,
            refill_rate: 1.0,
            is_default: true,
        });

        let request = req(&[]);
        let ip = "203.0.113.9".parse().unwrap();
        let (id, ..) = resolve_rate_limit_params(&request, Some(ip), &rl_config, 60.0, 1.0).await;
        assert_eq!(id, "203.0.113.9");
    }
}
