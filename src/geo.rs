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

//! Geo-lookup external collaborator seam (spec §6: "synchronous `lookup(ip)
//! -> {country} | null`"). A real deployment plugs in a MaxMind GeoIP2 (or
//! similar) database reader here; that integration is out of scope.

use std::net::IpAddr;

pub struct GeoInfo {
    pub country: Option<String>,
}

pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Option<GeoInfo>;
}

/// Default collaborator: always "no geo data", matching spec §4.3's
/// "`lookup`'s failure is non-fatal and behaves as 'no geo data'."
pub struct NoopGeoLookup;

impl GeoLookup for NoopGeoLookup {
    fn lookup(&self, _ip: IpAddr) -> Option<GeoInfo> {
        None
    }
}

#[cfg(test)]
pub struct StaticGeoLookup {
    ip: IpAddr,
    info: GeoInfo,
}

#[cfg(test)]
impl StaticGeoLookup {
    pub fn new(ip: IpAddr, info: GeoInfo) -> Self {
        Self { ip, info }
    }
}

#[cfg(test)]
impl GeoLookup for StaticGeoLookup {
    fn lookup(&self, ip: IpAddr) -> Option<GeoInfo> {
        (ip == self.ip).then(|| GeoInfo {
            country: self.info.country.clone(),
        })
    }
}
