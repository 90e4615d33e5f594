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
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use crate::config::get_config;
use crate::geo::NoopGeoLookup;
use crate::policy::PolicyCache;
use crate::reputation::adapters::{
    AbuseIpDbAdapter, AbuseIpDbConfig, AdapterSet, IpQualityScoreAdapter, IpQualityScoreConfig, ReputationAdapter,
};
use crate::store::redis_store::RedisStore;

mod auth;
mod config;
mod errors;
mod geo;
mod ip;
mod middleware;
mod policy;
mod ratelimit;
mod reputation;
mod shutdown;
mod store;
mod web;

const ADAPTER_TIMEOUT: Duration = Duration::from_secs(3);

fn build_adapters(settings: &config::ReputationSettings) -> AdapterSet {
    let mut adapters: Vec<Box<dyn ReputationAdapter>> = Vec::new();
    if let Some(a) = &settings.abuseipdb {
        adapters.push(Box::new(AbuseIpDbAdapter::new(AbuseIpDbConfig {
            base_url: a
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.abuseipdb.com/api/v2".to_owned()),
            api_key: a.api_key.clone(),
            max_age_in_days: a.max_age_in_days.unwrap_or(90),
            timeout: ADAPTER_TIMEOUT,
        })));
    }
    if let Some(a) = &settings.ipqualityscore {
        adapters.push(Box::new(IpQualityScoreAdapter::new(IpQualityScoreConfig {
            base_url: a
                .base_url
                .clone()
                .unwrap_or_else(|| "https://ipqualityscore.com/api/json/ip".to_owned()),
            api_key: a.api_key.clone(),
            timeout: ADAPTER_TIMEOUT,
        })));
    }
    AdapterSet::new(adapters)
}

fn main() {
    env_logger::init();

    let config = match get_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}\n\nusage: {} [ config.json ]", env!("CARGO_PKG_NAME"));
            exit(1);
        }
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let result = rt.block_on(async {
        let store: Arc<dyn store::Store> =
            Arc::new(RedisStore::connect(&config.store.url, config.store.key_prefix.clone()).await?);

        let policy_cache = Arc::new(PolicyCache::new(store.clone()));
        policy_cache.bootstrap().await?;
        policy::invalidation::spawn(store.clone(), policy_cache.clone());

        let adapters = Arc::new(build_adapters(&config.reputation));
        let geo = Arc::new(NoopGeoLookup);

        web::start_web(config, store, policy_cache, geo, adapters)?
            .await
            .unwrap()
            .map_err(AppError::from)
    });

    if let Err(e) = result {
        log::error!("{e}");
        exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Web(#[from] web::WebErr),
}
