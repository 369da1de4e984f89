use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Transport protocol selector.
///
/// `Both` appears on either side of a match: a rule with `Both` matches
/// any query protocol, and a query with `Both` matches any rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Both,
    Tcp,
    Udp,
}

/// The host half of a query: an optional domain name plus the resolved
/// addresses, if any. An all-empty `HostInfo` is legal and simply matches
/// no host rule (a catch-all rule can still pick it up).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HostInfo {
    /// Domain name, lowercase. Empty when the query is address-only.
    pub name: String,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl HostInfo {
    pub fn new(name: impl Into<String>, ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            ipv4,
            ipv6,
        }
    }

    pub fn from_name(name: impl Into<String>) -> Self {
        Self::new(name, None, None)
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self {
                name: String::new(),
                ipv4: Some(v4),
                ipv6: None,
            },
            IpAddr::V6(v6) => Self {
                name: String::new(),
                ipv4: None,
                ipv6: Some(v6),
            },
        }
    }
}

/// One rule as it appears in the rulebook, before compilation.
///
/// Only `outbound` and `address` are mandatory; the parser stores the
/// other fields verbatim for the compiler to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRule {
    pub outbound: String,
    pub address: String,
    pub proto_port: Option<String>,
    pub hijack_address: Option<String>,
    /// 1-based line number in the source text, for diagnostics.
    pub line: usize,
}

/// Protocol/port half of a compiled rule.
///
/// `start == end == 0` means "any port".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMatcher {
    pub proto: Protocol,
    pub start: u16,
    pub end: u16,
}

impl PortMatcher {
    pub fn any() -> Self {
        Self {
            proto: Protocol::Both,
            start: 0,
            end: 0,
        }
    }

    pub fn matches(&self, proto: Protocol, port: u16) -> bool {
        let proto_ok = self.proto == Protocol::Both || proto == Protocol::Both || self.proto == proto;
        let port_ok = (self.start == 0 && self.end == 0) || (self.start <= port && port <= self.end);
        proto_ok && port_ok
    }
}

/// Decision returned by a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult<O> {
    pub outbound: O,
    /// Address the caller should substitute for the original destination.
    pub hijack_ip: Option<IpAddr>,
}
