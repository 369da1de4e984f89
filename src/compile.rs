//! Rule compiler and the compiled, immutable ruleset.

use std::collections::HashMap;
use std::net::IpAddr;
use std::num::NonZeroUsize;

use ipnet::IpNet;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{AclError, Result};
use crate::geo::GeoLoader;
use crate::matcher::{
    CidrMatcher, DomainMatcher, DomainMode, GeoIpMatcher, GeoSiteMatcher, HostMatcher, IpMatcher,
};
use crate::parser::{parse_geosite_name, parse_proto_port};
use crate::types::{HostInfo, MatchResult, PortMatcher, Protocol, TextRule};

/// One rule bound to its outbound, in source position.
#[derive(Debug)]
pub struct CompiledRule<O> {
    pub outbound: O,
    pub host: HostMatcher,
    pub port: PortMatcher,
    pub hijack_ip: Option<IpAddr>,
}

impl<O> CompiledRule<O> {
    fn matches(&self, host: &HostInfo, proto: Protocol, port: u16) -> bool {
        self.port.matches(proto, port) && self.host.matches(host)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    host: HostInfo,
    proto: Protocol,
    port: u16,
}

type CachedDecision<O> = Option<(O, Option<IpAddr>)>;

/// Ordered rules plus a bounded LRU over complete query decisions.
///
/// All matcher state is frozen at compile time; concurrent `match_host`
/// calls only contend on the cache lock. The cache is advisory: flushing
/// it never changes an answer.
#[derive(Debug)]
pub struct CompiledRuleSet<O: Clone> {
    rules: Vec<CompiledRule<O>>,
    cache: Mutex<LruCache<CacheKey, CachedDecision<O>>>,
}

impl<O: Clone> CompiledRuleSet<O> {
    fn new(rules: Vec<CompiledRule<O>>, cache_size: usize) -> Self {
        let capacity =
            NonZeroUsize::new(cache_size).unwrap_or_else(|| NonZeroUsize::new(1).expect("1 != 0"));
        Self {
            rules,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// First matching rule's decision, or `None` when nothing matches
    /// (callers treat that as their default).
    pub fn match_host(&self, host: &HostInfo, proto: Protocol, port: u16) -> Option<MatchResult<O>> {
        // Constructors guarantee a lowercase name, but a directly built
        // HostInfo may not. Only allocate when needed.
        let normalized;
        let host = if host.name.bytes().any(|b| b.is_ascii_uppercase()) {
            normalized = HostInfo {
                name: host.name.to_lowercase(),
                ipv4: host.ipv4,
                ipv6: host.ipv6,
            };
            &normalized
        } else {
            host
        };

        let key = CacheKey {
            host: host.clone(),
            proto,
            port,
        };

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(&key) {
            return cached
                .clone()
                .map(|(outbound, hijack_ip)| MatchResult { outbound, hijack_ip });
        }

        // Computing under the lock keeps concurrent identical queries
        // from all walking the rules; matching is CPU-only.
        let decision = self.scan(host, proto, port);
        cache.put(
            key,
            decision.as_ref().map(|r| (r.outbound.clone(), r.hijack_ip)),
        );
        decision
    }

    fn scan(&self, host: &HostInfo, proto: Protocol, port: u16) -> Option<MatchResult<O>> {
        self.rules
            .iter()
            .find(|rule| rule.matches(host, proto, port))
            .map(|rule| MatchResult {
                outbound: rule.outbound.clone(),
                hijack_ip: rule.hijack_ip,
            })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn flush_cache(&self) {
        self.cache.lock().clear();
    }
}

/// Compile parsed rules against an outbound table and a geo loader.
///
/// `outbounds` is keyed by lowercase label; rule labels are lowercased
/// before lookup. Geo data is pulled from the loader only when a
/// `geoip:`/`geosite:` rule needs it.
pub fn compile<O: Clone>(
    rules: &[TextRule],
    outbounds: &HashMap<String, O>,
    cache_size: usize,
    loader: &dyn GeoLoader,
) -> Result<CompiledRuleSet<O>> {
    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        compiled.push(compile_rule(rule, outbounds, loader)?);
    }
    Ok(CompiledRuleSet::new(compiled, cache_size))
}

fn compile_rule<O: Clone>(
    rule: &TextRule,
    outbounds: &HashMap<String, O>,
    loader: &dyn GeoLoader,
) -> Result<CompiledRule<O>> {
    let outbound = outbounds
        .get(&rule.outbound.to_lowercase())
        .cloned()
        .ok_or_else(|| AclError::UnknownOutbound(rule.outbound.clone()))?;

    let host = compile_address(&rule.address, loader)?;

    let port = match &rule.proto_port {
        None => PortMatcher::any(),
        Some(spec) => {
            let (proto, start, end) = parse_proto_port(spec).ok_or_else(|| AclError::Parse {
                line: rule.line,
                reason: format!("invalid protocol/port {spec:?}"),
            })?;
            PortMatcher { proto, start, end }
        }
    };

    let hijack_ip = match &rule.hijack_address {
        None => None,
        Some(addr) => Some(addr.parse::<IpAddr>().map_err(|_| AclError::InvalidAddress {
            addr: addr.clone(),
            reason: "hijack address is not an IP address".to_string(),
        })?),
    };

    Ok(CompiledRule {
        outbound,
        host,
        port,
        hijack_ip,
    })
}

/// Dispatch an address to its matcher by syntactic form.
fn compile_address(address: &str, loader: &dyn GeoLoader) -> Result<HostMatcher> {
    let address = address.trim().to_lowercase();

    if address == "all" || address == "*" {
        return Ok(HostMatcher::All);
    }
    if let Ok(net) = address.parse::<IpNet>() {
        return Ok(HostMatcher::Cidr(CidrMatcher::new(net)));
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(HostMatcher::Ip(IpMatcher::new(ip)));
    }
    if let Some(code) = address.strip_prefix("geoip:") {
        let code = code.trim();
        let map = loader.load_geoip()?;
        let geo = map
            .get(code)
            .ok_or_else(|| AclError::UnknownGeoCode(code.to_string()))?;
        return Ok(HostMatcher::GeoIp(GeoIpMatcher::new(geo)));
    }
    if let Some(rest) = address.strip_prefix("geosite:") {
        let (name, attrs) = parse_geosite_name(rest);
        let map = loader.load_geosite()?;
        let site = map
            .get(&name)
            .ok_or_else(|| AclError::UnknownGeoCode(name.clone()))?;
        return Ok(HostMatcher::GeoSite(GeoSiteMatcher::new(site, attrs)?));
    }
    if let Some(suffix) = address.strip_prefix("*.") {
        return Ok(HostMatcher::Domain(DomainMatcher::new(
            suffix,
            DomainMode::Wildcard,
        )));
    }
    if let Some(suffix) = address.strip_prefix("suffix:") {
        return Ok(HostMatcher::Domain(DomainMatcher::new(
            suffix.trim(),
            DomainMode::Suffix,
        )));
    }
    Ok(HostMatcher::Domain(DomainMatcher::new(
        &address,
        DomainMode::Exact,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoDomainKind, GeoIp, GeoSite, GeoSiteDomain, NilGeoLoader, StaticGeoLoader};
    use crate::parser::parse_text_rules;

    fn outbounds(labels: &[(&str, &'static str)]) -> HashMap<String, &'static str> {
        labels.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn compile_text(text: &str, outs: &[(&str, &'static str)]) -> CompiledRuleSet<&'static str> {
        let rules = parse_text_rules(text).unwrap();
        compile(&rules, &outbounds(outs), 64, &NilGeoLoader).unwrap()
    }

    #[test]
    fn compiles_and_counts_rules() {
        let rs = compile_text(
            "direct(192.168.0.0/16)\nproxy(*.google.com)\nproxy(all)",
            &[("direct", "D"), ("proxy", "P")],
        );
        assert_eq!(rs.rule_count(), 3);
    }

    #[test]
    fn unknown_outbound_fails() {
        let rules = parse_text_rules("nosuch(all)").unwrap();
        let err = compile(&rules, &outbounds(&[("direct", "D")]), 16, &NilGeoLoader).unwrap_err();
        assert_eq!(err, AclError::UnknownOutbound("nosuch".to_string()));
    }

    #[test]
    fn outbound_lookup_is_case_insensitive() {
        let rs = compile_text("DiReCt(all)", &[("direct", "D")]);
        let got = rs.match_host(&HostInfo::from_name("x.example"), Protocol::Tcp, 80);
        assert_eq!(got.unwrap().outbound, "D");
    }

    #[test]
    fn first_matching_rule_wins() {
        let rs = compile_text(
            "first(example.com)\nsecond(example.com)\nthird(all)",
            &[("first", "1"), ("second", "2"), ("third", "3")],
        );
        let got = rs.match_host(&HostInfo::from_name("example.com"), Protocol::Tcp, 80);
        assert_eq!(got.unwrap().outbound, "1");
    }

    #[test]
    fn cidr_and_fallthrough() {
        let rs = compile_text(
            "direct(192.168.0.0/16)\nproxy(all)",
            &[("direct", "D"), ("proxy", "P")],
        );
        let inside = HostInfo::new("", Some("192.168.1.5".parse().unwrap()), None);
        assert_eq!(rs.match_host(&inside, Protocol::Tcp, 22).unwrap().outbound, "D");
        let outside = HostInfo::new("", Some("8.8.8.8".parse().unwrap()), None);
        assert_eq!(rs.match_host(&outside, Protocol::Tcp, 22).unwrap().outbound, "P");
    }

    #[test]
    fn bare_ip_rule() {
        let rs = compile_text("direct(1.2.3.4)\nproxy(all)", &[("direct", "D"), ("proxy", "P")]);
        let hit = HostInfo::new("", Some("1.2.3.4".parse().unwrap()), None);
        assert_eq!(rs.match_host(&hit, Protocol::Tcp, 80).unwrap().outbound, "D");
        let miss = HostInfo::new("", Some("1.2.3.5".parse().unwrap()), None);
        assert_eq!(rs.match_host(&miss, Protocol::Tcp, 80).unwrap().outbound, "P");
    }

    #[test]
    fn domain_forms() {
        let rs = compile_text(
            "a(example.com)\nb(*.google.com)\nc(suffix:youtube.com)\nd(all)",
            &[("a", "A"), ("b", "B"), ("c", "C"), ("d", "D")],
        );
        let m = |name: &str| {
            rs.match_host(&HostInfo::from_name(name), Protocol::Tcp, 443)
                .unwrap()
                .outbound
        };
        assert_eq!(m("example.com"), "A");
        assert_eq!(m("www.example.com"), "D");
        assert_eq!(m("google.com"), "B"); // wildcard covers the base domain
        assert_eq!(m("maps.google.com"), "B");
        assert_eq!(m("youtube.com"), "C");
        assert_eq!(m("www.youtube.com"), "C");
        assert_eq!(m("fakeyoutube.com"), "D");
    }

    #[test]
    fn proto_port_filtering() {
        let rs = compile_text(
            "block(all, udp/443)\ndirect(all, tcp/80-90)\nplain(all, tcp)\nproxy(all)",
            &[("block", "B"), ("direct", "D"), ("plain", "T"), ("proxy", "P")],
        );
        let host = HostInfo::from_name("example.com");
        assert_eq!(rs.match_host(&host, Protocol::Udp, 443).unwrap().outbound, "B");
        assert_eq!(rs.match_host(&host, Protocol::Tcp, 85).unwrap().outbound, "D");
        assert_eq!(rs.match_host(&host, Protocol::Tcp, 443).unwrap().outbound, "T");
        assert_eq!(rs.match_host(&host, Protocol::Udp, 53).unwrap().outbound, "P");
    }

    #[test]
    fn invalid_proto_port_fails_with_line() {
        let rules = parse_text_rules("ok(all)\nbad(all, icmp/1)").unwrap();
        let err = compile(&rules, &outbounds(&[("ok", "O"), ("bad", "B")]), 16, &NilGeoLoader)
            .unwrap_err();
        assert_eq!(
            err,
            AclError::Parse {
                line: 2,
                reason: "invalid protocol/port \"icmp/1\"".to_string()
            }
        );
    }

    #[test]
    fn hijack_address_parsed() {
        let rs = compile_text("direct(all, udp/53, 127.0.0.1)", &[("direct", "D")]);
        let got = rs
            .match_host(&HostInfo::from_name("dns.example"), Protocol::Udp, 53)
            .unwrap();
        assert_eq!(got.outbound, "D");
        assert_eq!(got.hijack_ip, Some("127.0.0.1".parse().unwrap()));

        // TCP/53 falls through the UDP-only rule.
        assert!(rs
            .match_host(&HostInfo::from_name("dns.example"), Protocol::Tcp, 53)
            .is_none());
    }

    #[test]
    fn bad_hijack_address_fails() {
        let rules = parse_text_rules("direct(all, udp/53, not-an-ip)").unwrap();
        let err = compile(&rules, &outbounds(&[("direct", "D")]), 16, &NilGeoLoader).unwrap_err();
        assert!(matches!(err, AclError::InvalidAddress { .. }));
    }

    #[test]
    fn geoip_rule_against_static_loader() {
        let loader = StaticGeoLoader::new().with_geoip(GeoIp {
            country_code: "CN".to_string(),
            cidrs: vec!["223.0.0.0/8".parse().unwrap()],
            inverse_match: false,
        });
        let rules = parse_text_rules("reject(geoip:cn, udp/443)\nproxy(all)").unwrap();
        let rs = compile(
            &rules,
            &outbounds(&[("reject", "R"), ("proxy", "P")]),
            16,
            &loader,
        )
        .unwrap();

        let cn = HostInfo::new("", Some("223.5.5.5".parse().unwrap()), None);
        assert_eq!(rs.match_host(&cn, Protocol::Udp, 443).unwrap().outbound, "R");
        assert_eq!(rs.match_host(&cn, Protocol::Tcp, 443).unwrap().outbound, "P");
        let us = HostInfo::new("", Some("8.8.8.8".parse().unwrap()), None);
        assert_eq!(rs.match_host(&us, Protocol::Udp, 443).unwrap().outbound, "P");
    }

    #[test]
    fn geoip_code_lookup_is_case_insensitive() {
        let loader = StaticGeoLoader::new().with_geoip(GeoIp {
            country_code: "CN".to_string(),
            cidrs: vec!["223.0.0.0/8".parse().unwrap()],
            inverse_match: false,
        });
        let rules = parse_text_rules("reject(geoip:CN)").unwrap();
        assert!(compile(&rules, &outbounds(&[("reject", "R")]), 16, &loader).is_ok());
    }

    #[test]
    fn unknown_geoip_code_fails() {
        let rules = parse_text_rules("reject(geoip:zz)").unwrap();
        let err = compile(&rules, &outbounds(&[("reject", "R")]), 16, &NilGeoLoader).unwrap_err();
        assert_eq!(err, AclError::UnknownGeoCode("zz".to_string()));
    }

    #[test]
    fn geosite_rule_with_attributes() {
        let loader = StaticGeoLoader::new().with_geosite(GeoSite {
            country_code: "GOOGLE".to_string(),
            domains: vec![
                GeoSiteDomain {
                    kind: GeoDomainKind::RootDomain,
                    value: "google.com".to_string(),
                    attrs: vec!["cn".to_string()],
                },
                GeoSiteDomain {
                    kind: GeoDomainKind::RootDomain,
                    value: "google.cn".to_string(),
                    attrs: vec![],
                },
            ],
        });
        let rules = parse_text_rules("proxy(geosite:google@cn)\ndirect(all)").unwrap();
        let rs = compile(
            &rules,
            &outbounds(&[("proxy", "P"), ("direct", "D")]),
            16,
            &loader,
        )
        .unwrap();

        let m = |name: &str| {
            rs.match_host(&HostInfo::from_name(name), Protocol::Tcp, 443)
                .unwrap()
                .outbound
        };
        assert_eq!(m("www.google.com"), "P");
        assert_eq!(m("google.cn"), "D"); // lacks the @cn attribute
    }

    #[test]
    fn unknown_geosite_code_fails() {
        let rules = parse_text_rules("proxy(geosite:nosuch)").unwrap();
        let err = compile(&rules, &outbounds(&[("proxy", "P")]), 16, &NilGeoLoader).unwrap_err();
        assert_eq!(err, AclError::UnknownGeoCode("nosuch".to_string()));
    }

    #[test]
    fn no_rule_matches_returns_none() {
        let rs = compile_text("proxy(example.com)", &[("proxy", "P")]);
        assert!(rs
            .match_host(&HostInfo::from_name("other.com"), Protocol::Tcp, 80)
            .is_none());
        // Negative results are cached and replayed.
        assert!(rs
            .match_host(&HostInfo::from_name("other.com"), Protocol::Tcp, 80)
            .is_none());
    }

    #[test]
    fn mixed_case_direct_construction_still_matches() {
        let rs = compile_text("proxy(*.google.com)\nblock(all)", &[("proxy", "P"), ("block", "B")]);
        let host = HostInfo {
            name: "WWW.GOOGLE.COM".to_string(),
            ipv4: None,
            ipv6: None,
        };
        assert_eq!(rs.match_host(&host, Protocol::Tcp, 443).unwrap().outbound, "P");
    }

    #[test]
    fn cache_flush_preserves_answers() {
        let rs = compile_text(
            "direct(10.0.0.0/8)\nproxy(all)",
            &[("direct", "D"), ("proxy", "P")],
        );
        let host = HostInfo::new("a.example", Some("10.1.2.3".parse().unwrap()), None);
        let before = rs.match_host(&host, Protocol::Tcp, 80).unwrap().outbound;
        rs.flush_cache();
        let after = rs.match_host(&host, Protocol::Tcp, 80).unwrap().outbound;
        assert_eq!(before, after);
    }

    #[test]
    fn tiny_cache_evicts_without_changing_answers() {
        let rules = parse_text_rules("direct(host0.example)\nproxy(all)").unwrap();
        let rs = compile(
            &rules,
            &outbounds(&[("direct", "D"), ("proxy", "P")]),
            1,
            &NilGeoLoader,
        )
        .unwrap();
        let first = HostInfo::from_name("host0.example");
        assert_eq!(rs.match_host(&first, Protocol::Tcp, 80).unwrap().outbound, "D");
        for i in 1..16 {
            let host = HostInfo::from_name(format!("host{i}.example"));
            assert_eq!(rs.match_host(&host, Protocol::Tcp, 80).unwrap().outbound, "P");
        }
        // host0 was evicted from the single-slot cache long ago.
        assert_eq!(rs.match_host(&first, Protocol::Tcp, 80).unwrap().outbound, "D");
    }

    #[test]
    fn zero_cache_size_is_clamped() {
        let rules = parse_text_rules("proxy(all)").unwrap();
        let rs = compile(&rules, &outbounds(&[("proxy", "P")]), 0, &NilGeoLoader).unwrap();
        let host = HostInfo::from_name("example.com");
        assert_eq!(rs.match_host(&host, Protocol::Tcp, 80).unwrap().outbound, "P");
    }

    #[test]
    fn query_protocol_both_matches_specific_rules() {
        let rs = compile_text("block(all, tcp/443)\nproxy(all)", &[("block", "B"), ("proxy", "P")]);
        let host = HostInfo::from_name("example.com");
        assert_eq!(rs.match_host(&host, Protocol::Both, 443).unwrap().outbound, "B");
    }
}
