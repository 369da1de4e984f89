use std::net::IpAddr;

use ipnet::IpNet;

use crate::types::HostInfo;

/// Matches one literal address against the query's same-family field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpMatcher {
    ip: IpAddr,
}

impl IpMatcher {
    pub fn new(ip: IpAddr) -> Self {
        Self { ip }
    }

    pub fn matches(&self, host: &HostInfo) -> bool {
        match self.ip {
            IpAddr::V4(v4) => host.ipv4 == Some(v4),
            IpAddr::V6(v6) => host.ipv6 == Some(v6),
        }
    }
}

/// Matches a single CIDR range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrMatcher {
    net: IpNet,
}

impl CidrMatcher {
    pub fn new(net: IpNet) -> Self {
        Self { net }
    }

    pub fn matches(&self, host: &HostInfo) -> bool {
        match self.net {
            IpNet::V4(net) => host.ipv4.is_some_and(|ip| net.contains(&ip)),
            IpNet::V6(net) => host.ipv6.is_some_and(|ip| net.contains(&ip)),
        }
    }
}
