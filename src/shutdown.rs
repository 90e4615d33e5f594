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

//! Graceful termination (spec §5: "stop accepting new requests, close the
//! shared-store command connection last, let in-flight requests complete
//! within a bounded window").

#[cfg(unix)]
pub async fn shutdown() {
    use tokio::signal::{
        ctrl_c,
        unix::{self, SignalKind},
    };

    let mut sigterm = unix::signal(SignalKind::terminate()).unwrap();
    tokio::select! {
        _ = ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    log::warn!("shutdown signal received, draining in-flight requests");
}

#[cfg(not(unix))]
pub async fn shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    log::warn!("shutdown signal received, draining in-flight requests");
}
