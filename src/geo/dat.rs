//! v2ray DAT (protobuf) database loader.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use ipnet::IpNet;
use prost::Message;

use crate::error::{AclError, Result};

use super::data::{GeoDomainKind, GeoIp, GeoSite, GeoSiteDomain};

/// Generated protobuf types for the geodat wire schema.
pub mod geodat {
    include!(concat!(env!("OUT_DIR"), "/geodat.rs"));
}

/// Load a `geoip.dat` file into the common per-country map.
/// Keys are lowercase country codes.
pub fn load_geoip(path: impl AsRef<Path>) -> Result<HashMap<String, GeoIp>> {
    let bytes = fs::read(path.as_ref())
        .map_err(|e| AclError::Loader(format!("cannot read geoip dat: {e}")))?;
    let list = geodat::GeoIpList::decode(&bytes[..])
        .map_err(|e| AclError::Loader(format!("cannot decode geoip dat: {e}")))?;

    let mut map = HashMap::with_capacity(list.entry.len());
    for entry in list.entry {
        let mut cidrs = Vec::with_capacity(entry.cidr.len());
        for cidr in &entry.cidr {
            let net = cidr_to_net(cidr).ok_or_else(|| {
                AclError::Loader(format!(
                    "invalid CIDR ({} bytes, /{}) in geoip entry {}",
                    cidr.ip.len(),
                    cidr.prefix,
                    entry.country_code
                ))
            })?;
            cidrs.push(net);
        }
        map.insert(
            entry.country_code.to_lowercase(),
            GeoIp {
                country_code: entry.country_code.to_uppercase(),
                cidrs,
                inverse_match: entry.inverse_match,
            },
        );
    }
    Ok(map)
}

/// Load a `geosite.dat` file into the common per-category map.
/// Keys are lowercase category codes.
pub fn load_geosite(path: impl AsRef<Path>) -> Result<HashMap<String, GeoSite>> {
    let bytes = fs::read(path.as_ref())
        .map_err(|e| AclError::Loader(format!("cannot read geosite dat: {e}")))?;
    let list = geodat::GeoSiteList::decode(&bytes[..])
        .map_err(|e| AclError::Loader(format!("cannot decode geosite dat: {e}")))?;

    let mut map = HashMap::with_capacity(list.entry.len());
    for entry in list.entry {
        let mut domains = Vec::with_capacity(entry.domain.len());
        for domain in &entry.domain {
            let kind = match geodat::domain::Type::try_from(domain.r#type) {
                Ok(geodat::domain::Type::Plain) => GeoDomainKind::Plain,
                Ok(geodat::domain::Type::Regex) => GeoDomainKind::Regex,
                Ok(geodat::domain::Type::RootDomain) => GeoDomainKind::RootDomain,
                Ok(geodat::domain::Type::Full) => GeoDomainKind::Full,
                Err(_) => continue,
            };
            // Attribute values are unused in published databases; the key
            // alone is the tag.
            let attrs = domain.attribute.iter().map(|a| a.key.clone()).collect();
            domains.push(GeoSiteDomain {
                kind,
                value: domain.value.clone(),
                attrs,
            });
        }
        map.insert(
            entry.country_code.to_lowercase(),
            GeoSite {
                country_code: entry.country_code.to_uppercase(),
                domains,
            },
        );
    }
    Ok(map)
}

pub fn verify_geoip(path: impl AsRef<Path>) -> Result<()> {
    load_geoip(path).map(|_| ())
}

pub fn verify_geosite(path: impl AsRef<Path>) -> Result<()> {
    load_geosite(path).map(|_| ())
}

fn cidr_to_net(cidr: &geodat::Cidr) -> Option<IpNet> {
    let addr = match cidr.ip.len() {
        4 => {
            let mut b = [0u8; 4];
            b.copy_from_slice(&cidr.ip);
            IpAddr::V4(Ipv4Addr::from(b))
        }
        16 => {
            let mut b = [0u8; 16];
            b.copy_from_slice(&cidr.ip);
            IpAddr::V6(Ipv6Addr::from(b))
        }
        _ => return None,
    };
    IpNet::new(addr, u8::try_from(cidr.prefix).ok()?).ok()
}
