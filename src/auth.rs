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

//! Authentication external collaborator seam (spec §6: "provides
//! `req.user = {id, role}` on authenticated paths"). JWT verification and
//! user/role persistence are out of scope; this stub trusts a pair of
//! headers so the admin fixed-window limiter (spec §4.5.1) has a concrete
//! `req.user.id` to consume.

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub role: Role,
}

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (http::StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .ok_or((http::StatusCode::UNAUTHORIZED, "missing authenticated user"))?
            .to_owned();
        let role = match parts.headers.get(USER_ROLE_HEADER).and_then(|v| v.to_str().ok()) {
            Some("admin") => Role::Admin,
            _ => Role::User,
        };
        Ok(AuthenticatedUser { id, role })
    }
}

/// Best-effort extraction for tower middleware (not an axum handler), which
/// cannot use `FromRequestParts`. Returns `None` rather than rejecting so the
/// caller decides fail-open/fail-closed behavior. Supplies the rate limiter's
/// `getId` user-id arm when no API key header is present.
pub fn user_id_from_request(req: &Request) -> Option<String> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
