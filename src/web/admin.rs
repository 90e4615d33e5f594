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

//! Admin CRUD surface (spec §6: "writes to the policy-list keys ... and
//! publishes `invalidation`\"reload\" on success"). Mutations require an
//! authenticated admin and are themselves fixed-window rate limited by
//! `req.user.id` (spec §4.5.1, §4.5.3).

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::auth::{AuthenticatedUser, Role};
use crate::errors::{ApiError, GatewayError};
use crate::ratelimit::config_store::RateLimitConfig;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/policy/allow-ips/{ip}", post(allow_ip).delete(unallow_ip))
        .route("/admin/policy/deny-ips/{ip}", post(deny_ip).delete(undeny_ip))
        .route("/admin/policy/deny-cidrs/{cidr}", post(deny_cidr).delete(undeny_cidr))
        .route(
            "/admin/policy/deny-countries/{country}",
            post(deny_country).delete(undeny_country),
        )
        .route(
            "/admin/ratelimit/config/{api_key}",
            get(get_rl_config).post(update_rl_config).delete(delete_rl_config),
        )
        .route("/admin/ratelimit/config", get(list_rl_config))
}

/// Admin routes consult the fixed-window strategy with `req.user.id` before
/// running the handler body; a non-admin caller never reaches the body.
async fn admin_guard(state: &AppState, user: &AuthenticatedUser) -> Result<(), GatewayError> {
    if user.role != Role::Admin {
        return Err(GatewayError::PolicyBlock("admin role required"));
    }
    let verdict = state
        .admin_rate_limiter
        .check(&user.id, state.admin_rate_limit, state.admin_rate_window)
        .await
        .map_err(|e| GatewayError::Misconfig(e.to_string()))?;
    if !verdict.admitted {
        return Err(GatewayError::RateLimited);
    }
    Ok(())
}

#[derive(Serialize)]
struct Ack {
    success: bool,
}

async fn allow_ip(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.allow_ip(&ip).await?;
    Ok(Json(Ack { success: true }))
}

async fn unallow_ip(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.unallow_ip(&ip).await?;
    Ok(Json(Ack { success: true }))
}

async fn deny_ip(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.deny_ip(&ip).await?;
    Ok(Json(Ack { success: true }))
}

async fn undeny_ip(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.undeny_ip(&ip).await?;
    Ok(Json(Ack { success: true }))
}

async fn deny_cidr(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cidr): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.deny_cidr(&cidr).await?;
    Ok(Json(Ack { success: true }))
}

async fn undeny_cidr(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(cidr): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.undeny_cidr(&cidr).await?;
    Ok(Json(Ack { success: true }))
}

async fn deny_country(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(country): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.deny_country(&country).await?;
    Ok(Json(Ack { success: true }))
}

async fn undeny_country(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(country): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    admin_guard(&state, &user).await?;
    state.policy_admin.undeny_country(&country).await?;
    Ok(Json(Ack { success: true }))
}

#[derive(Deserialize)]
pub struct RateLimitUpdateBody {
    pub capacity: f64,
    pub refill_rate: f64,
}

async fn get_rl_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(api_key): Path<String>,
) -> Result<Json<RateLimitConfig>, GatewayError> {
    admin_guard(&state, &user).await?;
    let cfg = state.rl_config.get(&api_key).await?;
    Ok(Json(cfg))
}

async fn update_rl_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(api_key): Path<String>,
    Json(body): Json<RateLimitUpdateBody>,
) -> Result<impl IntoResponse, ApiError> {
    admin_guard(&state, &user)
        .await
        .map_err(|e| ApiError::new_with_status(e.status(), e))?;
    state
        .rl_config
        .update(&api_key, body.capacity, body.refill_rate)
        .await
        .map_err(|e| ApiError::new_with_status(StatusCode::BAD_REQUEST, e))?;
    Ok(Json(Ack { success: true }))
}

async fn delete_rl_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(api_key): Path<String>,
) -> Result<Json<Ack>, GatewayError> {
    admin_guard(&state, &user).await?;
    let removed = state.rl_config.delete(&api_key).await?;
    Ok(Json(Ack { success: removed }))
}

async fn list_rl_config(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<(String, RateLimitConfig)>>, GatewayError> {
    admin_guard(&state, &user).await?;
    Ok(Json(state.rl_config.list().await?))
}
