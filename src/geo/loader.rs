use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{AclError, Result};

use super::data::{GeoIp, GeoSite};
use super::format::{GeoIpFormat, GeoSiteFormat};
use super::{dat, metadb, mmdb, singsite};

pub type GeoIpMap = HashMap<String, GeoIp>;
pub type GeoSiteMap = HashMap<String, GeoSite>;

/// Source of geo data for the compiler.
///
/// Both methods return the complete database keyed by lowercase code; the
/// compiler looks codes up itself so a missing code surfaces as
/// `UnknownGeoCode` rather than being invisible inside the loader.
/// Implementations load at most once and replay the cached outcome.
pub trait GeoLoader: Send + Sync {
    fn load_geoip(&self) -> Result<Arc<GeoIpMap>>;
    fn load_geosite(&self) -> Result<Arc<GeoSiteMap>>;
}

/// Loader with no data. `geoip:`/`geosite:` rules fail to compile with
/// `UnknownGeoCode`.
pub struct NilGeoLoader;

impl GeoLoader for NilGeoLoader {
    fn load_geoip(&self) -> Result<Arc<GeoIpMap>> {
        Ok(Arc::new(GeoIpMap::new()))
    }

    fn load_geosite(&self) -> Result<Arc<GeoSiteMap>> {
        Ok(Arc::new(GeoSiteMap::new()))
    }
}

/// Loads geo databases from disk exactly once and caches the outcome,
/// success or failure, for the lifetime of the loader.
///
/// Formats are detected from the file extension unless set explicitly.
/// An unconfigured path behaves like an empty database.
pub struct FileGeoLoader {
    geoip_path: Option<PathBuf>,
    geosite_path: Option<PathBuf>,
    geoip_format: Option<GeoIpFormat>,
    geosite_format: Option<GeoSiteFormat>,
    geoip_cache: OnceCell<Result<Arc<GeoIpMap>>>,
    geosite_cache: OnceCell<Result<Arc<GeoSiteMap>>>,
}

impl FileGeoLoader {
    pub fn new() -> Self {
        Self {
            geoip_path: None,
            geosite_path: None,
            geoip_format: None,
            geosite_format: None,
            geoip_cache: OnceCell::new(),
            geosite_cache: OnceCell::new(),
        }
    }

    pub fn with_geoip_path(mut self, path: impl AsRef<Path>) -> Self {
        self.geoip_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_geosite_path(mut self, path: impl AsRef<Path>) -> Self {
        self.geosite_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Override extension-based GeoIP format detection.
    pub fn with_geoip_format(mut self, format: GeoIpFormat) -> Self {
        self.geoip_format = Some(format);
        self
    }

    /// Override extension-based GeoSite format detection.
    pub fn with_geosite_format(mut self, format: GeoSiteFormat) -> Self {
        self.geosite_format = Some(format);
        self
    }

    fn load_geoip_once(&self) -> Result<Arc<GeoIpMap>> {
        let Some(path) = &self.geoip_path else {
            return Ok(Arc::new(GeoIpMap::new()));
        };
        let format = self
            .geoip_format
            .or_else(|| GeoIpFormat::detect(path))
            .ok_or(AclError::FormatNotSet("GeoIP"))?;
        let map = load_geoip_file(path, format)?;
        debug!(path = %path.display(), countries = map.len(), "loaded GeoIP database");
        Ok(Arc::new(map))
    }

    fn load_geosite_once(&self) -> Result<Arc<GeoSiteMap>> {
        let Some(path) = &self.geosite_path else {
            return Ok(Arc::new(GeoSiteMap::new()));
        };
        let format = self
            .geosite_format
            .or_else(|| GeoSiteFormat::detect(path))
            .ok_or(AclError::FormatNotSet("GeoSite"))?;
        let map = load_geosite_file(path, format)?;
        debug!(path = %path.display(), categories = map.len(), "loaded GeoSite database");
        Ok(Arc::new(map))
    }
}

impl Default for FileGeoLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoLoader for FileGeoLoader {
    fn load_geoip(&self) -> Result<Arc<GeoIpMap>> {
        self.geoip_cache
            .get_or_init(|| self.load_geoip_once())
            .clone()
    }

    fn load_geosite(&self) -> Result<Arc<GeoSiteMap>> {
        self.geosite_cache
            .get_or_init(|| self.load_geosite_once())
            .clone()
    }
}

/// In-memory loader for tests and embedders that ship their own tables.
#[derive(Default)]
pub struct StaticGeoLoader {
    geoip: GeoIpMap,
    geosite: GeoSiteMap,
    geoip_cache: OnceCell<Arc<GeoIpMap>>,
    geosite_cache: OnceCell<Arc<GeoSiteMap>>,
}

impl StaticGeoLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a country entry, keyed by its lowercased code.
    pub fn with_geoip(mut self, entry: GeoIp) -> Self {
        self.geoip.insert(entry.country_code.to_lowercase(), entry);
        self
    }

    /// Add a site entry, keyed by its lowercased code.
    pub fn with_geosite(mut self, entry: GeoSite) -> Self {
        self.geosite
            .insert(entry.country_code.to_lowercase(), entry);
        self
    }
}

impl GeoLoader for StaticGeoLoader {
    fn load_geoip(&self) -> Result<Arc<GeoIpMap>> {
        Ok(self
            .geoip_cache
            .get_or_init(|| Arc::new(self.geoip.clone()))
            .clone())
    }

    fn load_geosite(&self) -> Result<Arc<GeoSiteMap>> {
        Ok(self
            .geosite_cache
            .get_or_init(|| Arc::new(self.geosite.clone()))
            .clone())
    }
}

// Format dispatch shared with the auto loader.

pub(super) fn load_geoip_file(path: &Path, format: GeoIpFormat) -> Result<GeoIpMap> {
    match format {
        GeoIpFormat::Dat => dat::load_geoip(path),
        GeoIpFormat::Mmdb => mmdb::load_geoip(path),
        GeoIpFormat::MetaDb => metadb::load_geoip(path),
    }
}

pub(super) fn load_geosite_file(path: &Path, format: GeoSiteFormat) -> Result<GeoSiteMap> {
    match format {
        GeoSiteFormat::Dat => dat::load_geosite(path),
        GeoSiteFormat::Sing => singsite::load_geosite(path),
    }
}

pub(super) fn verify_geoip_file(path: &Path, format: GeoIpFormat) -> Result<()> {
    match format {
        GeoIpFormat::Dat => dat::verify_geoip(path),
        GeoIpFormat::Mmdb => mmdb::verify(path),
        GeoIpFormat::MetaDb => metadb::verify(path),
    }
}

pub(super) fn verify_geosite_file(path: &Path, format: GeoSiteFormat) -> Result<()> {
    match format {
        GeoSiteFormat::Dat => dat::verify_geosite(path),
        GeoSiteFormat::Sing => singsite::verify(path),
    }
}
