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

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::Router;
use axum::response::IntoResponse;
use axum::routing::any;
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;

use crate::config::Config;
use crate::geo::GeoLookup;
use crate::ip::TrustedProxies;
use crate::middleware::pipeline::{Pipeline, PipelineState};
use crate::policy::{PolicyAdmin, PolicyCache};
use crate::ratelimit::config_store::RateLimitConfigStore;
use crate::ratelimit::fixed_window::FixedWindowStrategy;
use crate::ratelimit::token_bucket::TokenBucketStrategy;
use crate::reputation::ReputationGate;
use crate::reputation::adapters::AdapterSet;
use crate::store::Store;

mod admin;
mod health;
pub(crate) mod uds;

#[derive(Clone)]
pub struct AppState {
    pub policy_admin: Arc<PolicyAdmin>,
    pub rl_config: Arc<RateLimitConfigStore>,
    pub admin_rate_limiter: Arc<FixedWindowStrategy>,
    pub admin_rate_limit: i64,
    pub admin_rate_window: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum WebErr {
    #[error("could not listen on: {0} -- reason: {1}")]
    InetFail(String, std::io::Error),
    #[error(transparent)]
    Uds(#[from] uds::UdsErr),
    #[error("unknown I/O error: {0}")]
    GenericIO(#[from] std::io::Error),
}

/// Placeholder for the actual reverse-proxy hop to the protected origin.
/// Request/response rewriting to a real upstream is out of scope; a request
/// reaching this handler has cleared the entire pipeline.
async fn proxy_placeholder() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "success": true, "upstream": "not configured" }))
}

pub fn start_web(
    config: Config,
    store: Arc<dyn Store>,
    policy_cache: Arc<PolicyCache>,
    geo: Arc<dyn GeoLookup>,
    adapters: Arc<AdapterSet>,
) -> Result<JoinHandle<Result<(), WebErr>>, crate::config::ConfigError> {
    let bind_addr = config.get_bind_addr();
    let trusted_proxies = Arc::new(TrustedProxies::new(config.trusted_proxy_networks()?));

    let reputation_gate = Arc::new(ReputationGate::new(
        store.clone(),
        adapters,
        config.reputation.cache_ttl(),
        config.reputation.lock_ttl(),
        config.reputation.block_threshold,
    ));
    let rate_limiter = Arc::new(TokenBucketStrategy::new(
        store.clone(),
        "rate-limit:bucket:",
        "X-RateLimit",
    ));
    let admin_rate_limiter = Arc::new(FixedWindowStrategy::new(
        store.clone(),
        "admin-rate-limit:",
        "X-Admin-RateLimit",
    ));
    let rl_config = Arc::new(RateLimitConfigStore::new(
        store.clone(),
        crate::ratelimit::config_store::RateLimitConfig {
            capacity: config.default_capacity,
            refill_rate: config.default_refill_rate(),
            is_default: true,
        },
    ));
    let policy_admin = Arc::new(PolicyAdmin::new(store.clone()));

    let pipeline_state = PipelineState {
        trusted_proxies,
        policy_cache,
        reputation_gate,
        geo,
        rate_limiter,
        rl_config: rl_config.clone(),
        default_capacity: config.default_capacity,
        default_refill_rate: config.default_refill_rate(),
    };

    let app_state = AppState {
        policy_admin,
        rl_config,
        admin_rate_limiter,
        admin_rate_limit: config.admin_rate_limit,
        admin_rate_window: config.admin_rate_window,
    };

    let app = Router::new()
        .merge(health::routes())
        .merge(admin::routes())
        .route("/{*path}", any(proxy_placeholder))
        .layer(ServiceBuilder::new().layer(Pipeline::new(pipeline_state)))
        .with_state(app_state);

    Ok(tokio::spawn(async move {
        let shutdown_h = crate::shutdown::shutdown();
        if let Some(unix) = bind_addr.strip_prefix("unix:").map(PathBuf::from) {
            let listener = uds::unix::listen_uds(&unix).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_h)
                .await
                .map_err(WebErr::from)
        } else {
            let inet = TcpListener::bind(&bind_addr)
                .await
                .map_err(|e| WebErr::InetFail(bind_addr, e))?;
            axum::serve(inet, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown_h)
                .await
                .map_err(WebErr::from)
        }
    }))
}
