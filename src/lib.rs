//! aclkit - a rule-based ACL engine for outbound traffic classification.
//!
//! A rulebook is plain text, one rule per line, compiled into an
//! immutable ruleset that answers `(host, protocol, port)` queries with
//! the first matching rule's outbound and an optional hijack address:
//!
//! - IP and CIDR matching
//! - domain matching (exact, `*.wildcard`, `suffix:`)
//! - GeoIP country matching (DAT, MMDB, MetaDB databases)
//! - GeoSite category matching (DAT, sing-geosite databases) with
//!   `@attribute` filtering, backed by a succinct reverse-domain trie
//! - protocol/port filtering and an LRU decision cache
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use aclkit::{compile, parse_text_rules, HostInfo, Protocol};
//! use aclkit::geo::NilGeoLoader;
//!
//! let text = "
//! direct(192.168.0.0/16)   # stay local
//! proxy(*.google.com)
//! reject(all, udp/443)     # no QUIC
//! proxy(all)
//! ";
//!
//! let rules = parse_text_rules(text).unwrap();
//!
//! let mut outbounds = HashMap::new();
//! outbounds.insert("direct".to_string(), "DIRECT");
//! outbounds.insert("proxy".to_string(), "PROXY");
//! outbounds.insert("reject".to_string(), "REJECT");
//!
//! let ruleset = compile(&rules, &outbounds, 1024, &NilGeoLoader).unwrap();
//!
//! let host = HostInfo::from_name("www.google.com");
//! let decision = ruleset.match_host(&host, Protocol::Tcp, 443).unwrap();
//! assert_eq!(decision.outbound, "PROXY");
//! ```
//!
//! # Rule syntax
//!
//! ```text
//! outbound(address[, protoPort[, hijackAddress]])
//! ```
//!
//! | Address | Meaning |
//! |---|---|
//! | `1.2.3.4` | single IP |
//! | `192.168.0.0/16` | CIDR range |
//! | `example.com` | exact domain |
//! | `*.example.com` | domain and all subdomains |
//! | `suffix:example.com` | same as the wildcard form |
//! | `geoip:cn` | country by IP |
//! | `geosite:google@cn` | domain category, optionally attribute-filtered |
//! | `all` / `*` | everything |
//!
//! protoPort: `tcp`, `udp`, `*`, `tcp/443`, `udp/6881-6889`, `*/53`.

pub mod compile;
pub mod error;
pub mod geo;
pub mod matcher;
pub mod parser;
pub mod types;

pub use compile::{compile, CompiledRule, CompiledRuleSet};
pub use error::{AclError, Result};
pub use geo::{
    AutoGeoLoader, FileGeoLoader, GeoIpFormat, GeoLoader, GeoSiteFormat, NilGeoLoader,
    StaticGeoLoader, DEFAULT_UPDATE_INTERVAL,
};
pub use matcher::HostMatcher;
pub use parser::{parse_geosite_name, parse_proto_port, parse_text_rules, parse_text_rules_from_file};
pub use types::{HostInfo, MatchResult, PortMatcher, Protocol, TextRule};
