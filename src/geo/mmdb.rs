//! MaxMind MMDB database loader.
//!
//! MMDB is optimised for point lookups, but the engine wants the whole
//! database as per-country CIDR lists, so the loader walks every network
//! in the search tree once and folds the records into the common
//! representation. The reader does not outlive the load.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use ipnet::IpNet;
use ipnetwork::IpNetwork;
use maxminddb::Reader;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{AclError, Result};

use super::data::GeoIp;

/// MaxMind country record: `{ country: { iso_code: "CN" } }`.
#[derive(Deserialize)]
pub(super) struct CountryRecord {
    pub(super) country: Option<CountryField>,
}

#[derive(Deserialize)]
pub(super) struct CountryField {
    pub(super) iso_code: Option<String>,
}

pub fn load_geoip(path: impl AsRef<Path>) -> Result<HashMap<String, GeoIp>> {
    let reader = open(path.as_ref())?;
    let by_code = walk_networks::<CountryRecord>(&reader, |record| {
        record.country.and_then(|c| c.iso_code).into_iter().collect()
    })?;
    Ok(into_geoip_map(by_code))
}

pub fn verify(path: impl AsRef<Path>) -> Result<()> {
    open(path.as_ref()).map(|_| ())
}

pub(super) fn open(path: &Path) -> Result<Reader<Vec<u8>>> {
    Reader::open_readfile(path)
        .map_err(|e| AclError::Loader(format!("cannot open mmdb '{}': {e}", path.display())))
}

/// Enumerate every network in the database and collect its country codes.
/// Codes come back lowercased.
pub(super) fn walk_networks<T: DeserializeOwned>(
    reader: &Reader<Vec<u8>>,
    codes_of: impl Fn(T) -> Vec<String>,
) -> Result<HashMap<String, Vec<IpNet>>> {
    let whole: IpNetwork = if reader.metadata.ip_version == 4 {
        "0.0.0.0/0".parse().expect("valid literal network")
    } else {
        "::/0".parse().expect("valid literal network")
    };

    let mut by_code: HashMap<String, Vec<IpNet>> = HashMap::new();
    let networks = reader
        .within::<T>(whole)
        .map_err(|e| AclError::Loader(format!("cannot walk mmdb networks: {e}")))?;
    for item in networks {
        let item = item.map_err(|e| AclError::Loader(format!("mmdb network walk failed: {e}")))?;
        let Some(net) = canonical_net(item.ip_net) else {
            continue;
        };
        for code in codes_of(item.info) {
            if code.is_empty() {
                continue;
            }
            by_code.entry(code.to_lowercase()).or_default().push(net);
        }
    }
    Ok(by_code)
}

pub(super) fn into_geoip_map(by_code: HashMap<String, Vec<IpNet>>) -> HashMap<String, GeoIp> {
    by_code
        .into_iter()
        .map(|(code, cidrs)| {
            let geo = GeoIp {
                country_code: code.to_uppercase(),
                cidrs,
                inverse_match: false,
            };
            (code, geo)
        })
        .collect()
}

/// Convert the walker's network type, folding v4-in-v6 prefixes back to
/// plain v4 so matching sees the 4-byte form. IPv6 trees carry IPv4 data
/// both at `::/96` and behind the `::ffff:0:0/96` alias.
fn canonical_net(net: IpNetwork) -> Option<IpNet> {
    match net {
        IpNetwork::V4(n) => IpNet::new(IpAddr::V4(n.ip()), n.prefix()).ok(),
        IpNetwork::V6(n) => {
            if n.prefix() >= 96 {
                if let Some(v4) = n.ip().to_ipv4_mapped() {
                    return IpNet::new(IpAddr::V4(v4), n.prefix() - 96).ok();
                }
                let seg = n.ip().segments();
                if seg[..6] == [0, 0, 0, 0, 0, 0] {
                    let [.., a, b, c, d] = n.ip().octets();
                    let v4 = std::net::Ipv4Addr::new(a, b, c, d);
                    return IpNet::new(IpAddr::V4(v4), n.prefix() - 96).ok();
                }
            }
            IpNet::new(IpAddr::V6(n.ip()), n.prefix()).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_loader_error() {
        let err = load_geoip("/nonexistent/country.mmdb").unwrap_err();
        assert!(matches!(err, AclError::Loader(_)));
    }

    #[test]
    fn garbage_file_is_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("country.mmdb");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not an mmdb").unwrap();
        drop(f);
        assert!(verify(&path).is_err());
        assert!(load_geoip(&path).is_err());
    }

    #[test]
    fn canonicalises_embedded_v4() {
        let mapped: IpNetwork = "::ffff:10.0.0.0/104".parse().unwrap();
        assert_eq!(
            canonical_net(mapped),
            Some("10.0.0.0/8".parse::<IpNet>().unwrap())
        );

        let compatible: IpNetwork = "::c000:200/120".parse().unwrap();
        assert_eq!(
            canonical_net(compatible),
            Some("192.0.2.0/24".parse::<IpNet>().unwrap())
        );

        let plain_v6: IpNetwork = "2001:db8::/32".parse().unwrap();
        assert_eq!(
            canonical_net(plain_v6),
            Some("2001:db8::/32".parse::<IpNet>().unwrap())
        );

        let v4: IpNetwork = "192.168.0.0/16".parse().unwrap();
        assert_eq!(
            canonical_net(v4),
            Some("192.168.0.0/16".parse::<IpNet>().unwrap())
        );
    }
}
