use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::geo::GeoIp;
use crate::types::HostInfo;

/// Country matcher over per-family CIDR lists sorted by network address.
///
/// Lookup is a binary search that tests containment at every visited
/// midpoint and otherwise steers by the midpoint's network address.
/// Published geo databases carry disjoint prefixes per country, for which
/// this search is exact.
#[derive(Debug, Clone)]
pub struct GeoIpMatcher {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
    inverse: bool,
}

impl GeoIpMatcher {
    pub fn new(geo: &GeoIp) -> Self {
        let mut v4 = Vec::new();
        let mut v6 = Vec::new();
        for net in &geo.cidrs {
            match net {
                IpNet::V4(n) => v4.push(*n),
                IpNet::V6(n) => v6.push(*n),
            }
        }
        v4.sort_by_key(|n| n.network());
        v6.sort_by_key(|n| n.network());
        Self {
            v4,
            v6,
            inverse: geo.inverse_match,
        }
    }

    pub fn matches(&self, host: &HostInfo) -> bool {
        if let Some(ip) = host.ipv4 {
            if probe(&self.v4, ip, |n| n.network(), |n, ip| n.contains(&ip)) {
                return !self.inverse;
            }
        }
        if let Some(ip) = host.ipv6 {
            if probe(&self.v6, ip, |n| n.network(), |n, ip| n.contains(&ip)) {
                return !self.inverse;
            }
        }
        self.inverse
    }
}

fn probe<N, A>(
    nets: &[N],
    ip: A,
    network: impl Fn(&N) -> A,
    contains: impl Fn(&N, A) -> bool,
) -> bool
where
    A: Ord + Copy,
{
    let mut lo = 0isize;
    let mut hi = nets.len() as isize - 1;
    while lo <= hi {
        let mid = ((lo + hi) / 2) as usize;
        let net = &nets[mid];
        if contains(net, ip) {
            return true;
        }
        if network(net) < ip {
            lo = mid as isize + 1;
        } else {
            hi = mid as isize - 1;
        }
    }
    false
}
