use regex::Regex;

use super::trie::DomainTrie;
use crate::error::{AclError, Result};
use crate::geo::{GeoDomainKind, GeoSite};
use crate::types::HostInfo;

/// Domain-category matcher built from one GeoSite entry.
///
/// Attribute-free Full/RootDomain entries go into the succinct trie;
/// keyword, regex and attribute-carrying entries stay on linear scan
/// lists consulted only after a trie miss.
#[derive(Debug)]
pub struct GeoSiteMatcher {
    trie: DomainTrie,
    plain: Vec<ScanEntry>,
    regexes: Vec<RegexEntry>,
    attr_scan: Vec<ScanEntry>,
    /// Required attributes, AND-combined.
    required_attrs: Vec<String>,
}

#[derive(Debug, Clone)]
struct ScanEntry {
    kind: GeoDomainKind,
    value: String,
    attrs: Vec<String>,
}

#[derive(Debug)]
struct RegexEntry {
    regex: Regex,
    attrs: Vec<String>,
}

impl GeoSiteMatcher {
    pub fn new(site: &GeoSite, required_attrs: Vec<String>) -> Result<Self> {
        let needs_attrs = !required_attrs.is_empty();

        let mut full = Vec::new();
        let mut roots = Vec::new();
        let mut plain = Vec::new();
        let mut regexes = Vec::new();
        let mut attr_scan = Vec::new();

        for domain in &site.domains {
            let attrs_match = !needs_attrs
                || (!domain.attrs.is_empty()
                    && required_attrs.iter().all(|a| domain.attrs.contains(a)));

            match domain.kind {
                GeoDomainKind::Plain => plain.push(ScanEntry {
                    kind: GeoDomainKind::Plain,
                    value: domain.value.to_lowercase(),
                    attrs: domain.attrs.clone(),
                }),
                GeoDomainKind::Regex => {
                    let regex =
                        Regex::new(&domain.value).map_err(|e| AclError::InvalidAddress {
                            addr: domain.value.clone(),
                            reason: format!("regex does not compile: {e}"),
                        })?;
                    regexes.push(RegexEntry {
                        regex,
                        attrs: domain.attrs.clone(),
                    });
                }
                GeoDomainKind::Full | GeoDomainKind::RootDomain => {
                    let value = domain.value.to_lowercase();
                    if attrs_match && (domain.attrs.is_empty() || !needs_attrs) {
                        if domain.kind == GeoDomainKind::Full {
                            full.push(value);
                        } else {
                            roots.push(value);
                        }
                    } else {
                        attr_scan.push(ScanEntry {
                            kind: domain.kind,
                            value,
                            attrs: domain.attrs.clone(),
                        });
                    }
                }
            }
        }

        Ok(Self {
            trie: DomainTrie::new(&full, &roots),
            plain,
            regexes,
            attr_scan,
            required_attrs,
        })
    }

    pub fn matches(&self, host: &HostInfo) -> bool {
        if host.name.is_empty() {
            return false;
        }
        let name = host.name.as_str();

        if !self.trie.is_empty() && self.trie.matches(name) {
            return true;
        }

        for entry in &self.plain {
            if self.attrs_allow(&entry.attrs) && name.contains(entry.value.as_str()) {
                return true;
            }
        }
        for entry in &self.regexes {
            if self.attrs_allow(&entry.attrs) && entry.regex.is_match(name) {
                return true;
            }
        }
        for entry in &self.attr_scan {
            if !self.attrs_allow(&entry.attrs) {
                continue;
            }
            let hit = match entry.kind {
                GeoDomainKind::Full => name == entry.value,
                GeoDomainKind::RootDomain => {
                    name == entry.value
                        || name
                            .strip_suffix(entry.value.as_str())
                            .is_some_and(|head| head.ends_with('.'))
                }
                _ => false,
            };
            if hit {
                return true;
            }
        }
        false
    }

    fn attrs_allow(&self, attrs: &[String]) -> bool {
        if self.required_attrs.is_empty() {
            return true;
        }
        if attrs.is_empty() {
            return false;
        }
        self.required_attrs.iter().all(|a| attrs.contains(a))
    }
}
