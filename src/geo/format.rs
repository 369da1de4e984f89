use std::path::Path;

/// On-disk format of a GeoIP database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoIpFormat {
    /// v2ray protobuf (`.dat`).
    Dat,
    /// MaxMind (`.mmdb`).
    Mmdb,
    /// Clash-Meta MaxMind variant (`.metadb`).
    MetaDb,
}

impl GeoIpFormat {
    /// Detect from the file extension; `None` when unrecognised.
    pub fn detect(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dat" => Some(GeoIpFormat::Dat),
            "mmdb" => Some(GeoIpFormat::Mmdb),
            "metadb" => Some(GeoIpFormat::MetaDb),
            _ => None,
        }
    }

    pub fn default_filename(self) -> &'static str {
        match self {
            GeoIpFormat::Dat => "geoip.dat",
            GeoIpFormat::Mmdb => "geoip.mmdb",
            GeoIpFormat::MetaDb => "geoip.metadb",
        }
    }

    /// MetaCubeX CDN location for this format.
    pub fn default_url(self) -> &'static str {
        match self {
            GeoIpFormat::Dat => {
                "https://cdn.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geoip.dat"
            }
            GeoIpFormat::Mmdb => {
                "https://cdn.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/country.mmdb"
            }
            GeoIpFormat::MetaDb => {
                "https://cdn.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geoip.metadb"
            }
        }
    }
}

/// On-disk format of a GeoSite database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoSiteFormat {
    /// v2ray protobuf (`.dat`).
    Dat,
    /// sing-geosite binary (`.db`).
    Sing,
}

impl GeoSiteFormat {
    pub fn detect(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "dat" => Some(GeoSiteFormat::Dat),
            "db" => Some(GeoSiteFormat::Sing),
            _ => None,
        }
    }

    pub fn default_filename(self) -> &'static str {
        match self {
            GeoSiteFormat::Dat => "geosite.dat",
            GeoSiteFormat::Sing => "geosite.db",
        }
    }

    pub fn default_url(self) -> &'static str {
        match self {
            GeoSiteFormat::Dat => {
                "https://cdn.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geosite.dat"
            }
            GeoSiteFormat::Sing => {
                "https://cdn.jsdelivr.net/gh/MetaCubeX/meta-rules-dat@release/geosite.db"
            }
        }
    }
}
