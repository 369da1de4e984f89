//! Host matcher variants.
//!
//! `HostMatcher` is a closed sum; each variant carries only the state its
//! predicate needs, and dispatch is a plain `match` on the tag. All
//! variants are immutable once built and evaluate purely on the query's
//! `HostInfo`.

mod domain;
mod geoip;
mod geosite;
mod ip;
mod trie;

pub use domain::{DomainMatcher, DomainMode};
pub use geoip::GeoIpMatcher;
pub use geosite::GeoSiteMatcher;
pub use ip::{CidrMatcher, IpMatcher};
pub use trie::DomainTrie;

use crate::types::HostInfo;

/// One compiled host predicate.
#[derive(Debug)]
pub enum HostMatcher {
    /// Matches every query, including an all-empty `HostInfo`.
    All,
    Ip(IpMatcher),
    Cidr(CidrMatcher),
    Domain(DomainMatcher),
    GeoIp(GeoIpMatcher),
    GeoSite(GeoSiteMatcher),
}

impl HostMatcher {
    pub fn matches(&self, host: &HostInfo) -> bool {
        match self {
            HostMatcher::All => true,
            HostMatcher::Ip(m) => m.matches(host),
            HostMatcher::Cidr(m) => m.matches(host),
            HostMatcher::Domain(m) => m.matches(host),
            HostMatcher::GeoIp(m) => m.matches(host),
            HostMatcher::GeoSite(m) => m.matches(host),
        }
    }
}
