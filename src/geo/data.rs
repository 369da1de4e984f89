//! Common in-memory representation all geo database formats load into.

use ipnet::IpNet;

/// IP ranges for one country code.
#[derive(Debug, Clone, Default)]
pub struct GeoIp {
    /// Uppercase ISO code (`"CN"`).
    pub country_code: String,
    pub cidrs: Vec<IpNet>,
    /// When set, the matcher's decision is flipped.
    pub inverse_match: bool,
}

/// Kind of one GeoSite domain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoDomainKind {
    /// Substring containment on the query name.
    Plain,
    /// Regular expression over the query name.
    Regex,
    /// The domain itself or any subdomain. No leading dot.
    RootDomain,
    /// Exact equality.
    Full,
}

/// One GeoSite domain entry with its attribute tags (`@cn` style).
#[derive(Debug, Clone)]
pub struct GeoSiteDomain {
    pub kind: GeoDomainKind,
    pub value: String,
    pub attrs: Vec<String>,
}

/// Domain patterns for one site category.
#[derive(Debug, Clone, Default)]
pub struct GeoSite {
    pub country_code: String,
    pub domains: Vec<GeoSiteDomain>,
}
