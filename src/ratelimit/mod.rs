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

//! Per-request admission control (spec §4.5). Two independent strategies
//! share an identifier-resolution contract (§4.5.1) but have unrelated store
//! shapes and header semantics.

pub mod config_store;
pub mod fixed_window;
pub mod token_bucket;

/// A resolved rate-limit outcome, carrying the headers the caller must set
/// on the response regardless of admit/reject.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub admitted: bool,
    pub headers: Vec<(String, String)>,
}

impl Verdict {
    fn header(prefix: &str, suffix: &str, value: impl std::fmt::Display) -> (String, String) {
        (format!("{prefix}-{suffix}"), value.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("missing rate-limit identifier")]
    MissingIdentifier,
    #[error("invalid rate-limit configuration: {0}")]
    Misconfigured(String),
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}
