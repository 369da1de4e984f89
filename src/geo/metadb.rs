//! Clash-Meta MetaDB loader.
//!
//! MetaDB files are MaxMind containers whose record shape depends on the
//! database type declared in the metadata: classic MaxMind country maps,
//! sing-geoip bare strings, or Meta-geoip0 records that may be a single
//! string or an array of strings.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

use super::data::GeoIp;
use super::mmdb::{self, CountryRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaDbKind {
    MaxMind,
    Sing,
    MetaV0,
}

impl MetaDbKind {
    fn detect(database_type: &str) -> Self {
        match database_type {
            "sing-geoip" => MetaDbKind::Sing,
            "Meta-geoip0" => MetaDbKind::MetaV0,
            _ => MetaDbKind::MaxMind,
        }
    }
}

/// Meta-geoip0 record: a country code or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum MetaRecord {
    One(String),
    Many(Vec<String>),
}

pub fn load_geoip(path: impl AsRef<Path>) -> Result<HashMap<String, GeoIp>> {
    let reader = mmdb::open(path.as_ref())?;
    let kind = MetaDbKind::detect(&reader.metadata.database_type);

    let by_code = match kind {
        MetaDbKind::MaxMind => mmdb::walk_networks::<CountryRecord>(&reader, |record| {
            record.country.and_then(|c| c.iso_code).into_iter().collect()
        })?,
        MetaDbKind::Sing => mmdb::walk_networks::<String>(&reader, |code| vec![code])?,
        MetaDbKind::MetaV0 => mmdb::walk_networks::<MetaRecord>(&reader, |record| match record {
            MetaRecord::One(code) => vec![code],
            MetaRecord::Many(codes) => codes,
        })?,
    };

    Ok(mmdb::into_geoip_map(by_code))
}

pub fn verify(path: impl AsRef<Path>) -> Result<()> {
    mmdb::open(path.as_ref()).map(|_| ())
}
