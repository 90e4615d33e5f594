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

//! Subscriber on the shared-store `invalidation` pub/sub channel (spec §4.2).
//! Runs on the dedicated pub/sub connection the [`crate::store::Store`] trait
//! hands out via `subscribe()`; never shares it with command traffic (§5).

use std::sync::Arc;

use log::{info, warn};

use super::{INVALIDATION_CHANNEL, INVALIDATION_PAYLOAD, PolicyCache};
use crate::store::Store;

/// Spawns a background task that reloads `cache` whenever a `"reload"`
/// message arrives on the `invalidation` channel. Returns the task handle so
/// callers can await it during shutdown if desired.
pub fn spawn(store: Arc<dyn Store>, cache: Arc<PolicyCache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let cache = cache.clone();
            let result = store
                .subscribe(
                    INVALIDATION_CHANNEL,
                    Box::new(move |payload| {
                        if payload == INVALIDATION_PAYLOAD {
                            let cache = cache.clone();
                            tokio::spawn(async move {
                                if let Err(e) = cache.reload().await {
                                    warn!("invalidation-triggered reload failed: {e}");
                                }
                            });
                        }
                    }),
                )
                .await;
            if let Err(e) = result {
                warn!("invalidation subscriber disconnected, retrying: {e}");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            }
            info!("invalidation subscriber ended without error; restarting");
        }
    })
}
