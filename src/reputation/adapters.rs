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

//! Third-party reputation adapters (spec §4.4). Adapters never throw outside
//! their own failure conversion; a transport/parse failure becomes an empty
//! [`ReputationResult`], logged, not propagated.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::Deserialize;

use super::ReputationResult;

#[async_trait]
pub trait ReputationAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check(&self, ip: IpAddr) -> ReputationResult;
}

/// Fan out a request to every configured adapter concurrently (spec §4.4:
/// "Adapters are invoked concurrently").
pub struct AdapterSet {
    adapters: Vec<Box<dyn ReputationAdapter>>,
}

impl AdapterSet {
    pub fn new(adapters: Vec<Box<dyn ReputationAdapter>>) -> Self {
        Self { adapters }
    }

    pub async fn check_all(&self, ip: IpAddr) -> Vec<ReputationResult> {
        let futures = self.adapters.iter().map(|a| a.check(ip));
        futures::future::join_all(futures).await
    }
}

pub struct AbuseIpDbConfig {
    pub base_url: String,
    pub api_key: String,
    pub max_age_in_days: u32,
    pub timeout: Duration,
}

pub struct AbuseIpDbAdapter {
    client: reqwest::Client,
    config: AbuseIpDbConfig,
}

impl AbuseIpDbAdapter {
    pub fn new(config: AbuseIpDbConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct AbuseIpDbEnvelope {
    data: AbuseIpDbData,
}

#[derive(Deserialize)]
struct AbuseIpDbData {
    #[serde(rename = "abuseConfidenceScore")]
    abuse_confidence_score: Option<u8>,
    #[serde(rename = "isTor")]
    is_tor: Option<bool>,
}

#[async_trait]
impl ReputationAdapter for AbuseIpDbAdapter {
    fn name(&self) -> &'static str {
        "abuseipdb"
    }

    async fn check(&self, ip: IpAddr) -> ReputationResult {
        let url = format!("{}/check", self.config.base_url);
        let resp = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .header("Key", &self.config.api_key)
            .query(&[
                ("ipAddress", ip.to_string()),
                ("maxAgeInDays", self.config.max_age_in_days.to_string()),
                ("verbose", "true".to_owned()),
            ])
            .send()
            .await;

        match resp {
            Ok(resp) => match resp.json::<AbuseIpDbEnvelope>().await {
                Ok(envelope) => ReputationResult {
                    score: envelope.data.abuse_confidence_score,
                    categories: None,
                    last_seen: None,
                    is_proxy: None,
                    is_tor: envelope.data.is_tor,
                    is_vpn: None,
                },
                Err(e) => {
                    warn!("abuseipdb: failed to decode response for {ip}: {e}");
                    ReputationResult::default()
                }
            },
            Err(e) => {
                warn!("abuseipdb: request failed for {ip}: {e}");
                ReputationResult::default()
            }
        }
    }
}

pub struct IpQualityScoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

pub struct IpQualityScoreAdapter {
    client: reqwest::Client,
    config: IpQualityScoreConfig,
}

impl IpQualityScoreAdapter {
    pub fn new(config: IpQualityScoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct IpqsResponse {
    fraud_score: Option<u8>,
    recent_abuse: Option<bool>,
    bot_status: Option<bool>,
    is_crawler: Option<bool>,
    proxy: Option<bool>,
    vpn: Option<bool>,
    tor: Option<bool>,
}

#[async_trait]
impl ReputationAdapter for IpQualityScoreAdapter {
    fn name(&self) -> &'static str {
        "ipqualityscore"
    }

    async fn check(&self, ip: IpAddr) -> ReputationResult {
        let url = format!("{}/{}/{}", self.config.base_url, self.config.api_key, ip);
        let resp = self
            .client
            .get(url)
            .timeout(self.config.timeout)
            .query(&[
                ("strictness", "1"),
                ("fast", "true"),
                ("allow_public_access_points", "true"),
            ])
            .send()
            .await;

        match resp {
            Ok(resp) => match resp.json::<IpqsResponse>().await {
                Ok(body) => {
                    let mut categories = Vec::new();
                    if body.recent_abuse.unwrap_or(false) {
                        categories.push("abuse".to_owned());
                    }
                    if body.bot_status.unwrap_or(false) || body.is_crawler.unwrap_or(false) {
                        categories.push("bot".to_owned());
                    }
                    if body.proxy.unwrap_or(false) {
                        categories.push("proxy".to_owned());
                    } else if body.vpn.unwrap_or(false) {
                        categories.push("vpn".to_owned());
                    } else if body.tor.unwrap_or(false) {
                        categories.push("tor".to_owned());
                    }

                    ReputationResult {
                        score: body.fraud_score,
                        categories: (!categories.is_empty()).then_some(categories),
                        last_seen: None,
                        is_proxy: body.proxy,
                        is_tor: body.tor,
                        is_vpn: body.vpn,
                    }
                }
                Err(e) => {
                    warn!("ipqualityscore: failed to decode response for {ip}: {e}");
                    ReputationResult::default()
                }
            },
            Err(e) => {
                warn!("ipqualityscore: request failed for {ip}: {e}");
                ReputationResult::default()
            }
        }
    }
}

#[cfg(test)]
pub struct FakeAdapter {
    pub score: Option<u8>,
}

#[cfg(test)]
#[async_trait]
impl ReputationAdapter for FakeAdapter {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn check(&self, _ip: IpAddr) -> ReputationResult {
        ReputationResult {
            score: self.score,
            ..Default::default()
        }
    }
}
