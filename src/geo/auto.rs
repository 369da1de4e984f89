use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{AclError, Result};

use super::format::{GeoIpFormat, GeoSiteFormat};
use super::loader::{
    load_geoip_file, load_geosite_file, verify_geoip_file, verify_geosite_file, GeoIpMap,
    GeoLoader, GeoSiteMap,
};

/// How old an on-disk database may get before a refresh is attempted.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Loader that keeps its databases fresh from a CDN.
///
/// Before the one-shot load, a file that is missing, empty or older than
/// the update interval is re-downloaded: fetched to a `tmp` sibling,
/// parse-verified, then renamed into place. If the download fails but a
/// usable file exists, the stale file is used and the error only logged.
/// The parsed maps are cached in memory forever; a mutex per database
/// kind guarantees a single download even under concurrent first calls.
pub struct AutoGeoLoader {
    geoip_path: Option<PathBuf>,
    geosite_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    geoip_format: Option<GeoIpFormat>,
    geosite_format: Option<GeoSiteFormat>,
    geoip_url: Option<String>,
    geosite_url: Option<String>,
    update_interval: Duration,

    geoip_state: Mutex<Option<Arc<GeoIpMap>>>,
    geosite_state: Mutex<Option<Arc<GeoSiteMap>>>,
}

impl AutoGeoLoader {
    pub fn new() -> Self {
        Self {
            geoip_path: None,
            geosite_path: None,
            data_dir: None,
            geoip_format: None,
            geosite_format: None,
            geoip_url: None,
            geosite_url: None,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            geoip_state: Mutex::new(None),
            geosite_state: Mutex::new(None),
        }
    }

    /// Directory for downloaded databases (combined with each format's
    /// default filename unless an explicit path is set).
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Select the GeoIP format and its default CDN URL.
    pub fn with_geoip(mut self, format: GeoIpFormat) -> Self {
        self.geoip_format = Some(format);
        self
    }

    /// Select the GeoSite format and its default CDN URL.
    pub fn with_geosite(mut self, format: GeoSiteFormat) -> Self {
        self.geosite_format = Some(format);
        self
    }

    /// Explicit GeoIP file location (format still detected from the
    /// extension unless set).
    pub fn with_geoip_path(mut self, path: impl AsRef<Path>) -> Self {
        self.geoip_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_geosite_path(mut self, path: impl AsRef<Path>) -> Self {
        self.geosite_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_geoip_url(mut self, url: impl Into<String>) -> Self {
        self.geoip_url = Some(url.into());
        self
    }

    pub fn with_geosite_url(mut self, url: impl Into<String>) -> Self {
        self.geosite_url = Some(url.into());
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    fn geoip_format(&self) -> Option<GeoIpFormat> {
        self.geoip_format
            .or_else(|| self.geoip_path.as_ref().and_then(GeoIpFormat::detect))
    }

    fn geosite_format(&self) -> Option<GeoSiteFormat> {
        self.geosite_format
            .or_else(|| self.geosite_path.as_ref().and_then(GeoSiteFormat::detect))
    }

    fn geoip_file(&self, format: GeoIpFormat) -> PathBuf {
        match (&self.geoip_path, &self.data_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(format.default_filename()),
            (None, None) => PathBuf::from(format.default_filename()),
        }
    }

    fn geosite_file(&self, format: GeoSiteFormat) -> PathBuf {
        match (&self.geosite_path, &self.data_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.join(format.default_filename()),
            (None, None) => PathBuf::from(format.default_filename()),
        }
    }

    /// Missing, empty or past the update interval.
    fn is_stale(&self, path: &Path) -> bool {
        let Ok(meta) = fs::metadata(path) else {
            return true;
        };
        if meta.len() == 0 {
            return true;
        }
        match meta.modified() {
            Ok(mtime) => SystemTime::now()
                .duration_since(mtime)
                .map(|age| age > self.update_interval)
                .unwrap_or(true),
            Err(_) => true,
        }
    }

    fn refresh(&self, path: &Path, url: &str, verify: impl Fn(&Path) -> Result<()>) -> Result<()> {
        info!(url, path = %path.display(), "downloading geo database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| AclError::Loader(format!("cannot create data dir: {e}")))?;
            }
        }

        let staging = path.with_extension("tmp");
        let result = (|| -> Result<()> {
            let response = ureq::get(url)
                .call()
                .map_err(|e| AclError::Loader(format!("download failed: {e}")))?;
            let mut file = fs::File::create(&staging)
                .map_err(|e| AclError::Loader(format!("cannot create staging file: {e}")))?;
            io::copy(&mut response.into_reader(), &mut file)
                .map_err(|e| AclError::Loader(format!("download write failed: {e}")))?;
            drop(file);

            verify(&staging)
                .map_err(|e| AclError::Loader(format!("integrity check failed: {e}")))?;
            fs::rename(&staging, path)
                .map_err(|e| AclError::Loader(format!("rename into place failed: {e}")))?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&staging);
        } else {
            info!(path = %path.display(), "geo database updated");
        }
        result
    }

    /// Download when stale; on failure fall back to an existing file,
    /// otherwise surface the error.
    fn ensure_fresh(
        &self,
        path: &Path,
        url: &str,
        verify: impl Fn(&Path) -> Result<()>,
    ) -> Result<()> {
        if !self.is_stale(path) {
            return Ok(());
        }
        if let Err(e) = self.refresh(path, url, verify) {
            if path.exists() {
                warn!(error = %e, path = %path.display(), "update failed, keeping existing file");
            } else {
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for AutoGeoLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GeoLoader for AutoGeoLoader {
    fn load_geoip(&self) -> Result<Arc<GeoIpMap>> {
        let mut state = self.geoip_state.lock();
        if let Some(map) = state.as_ref() {
            return Ok(map.clone());
        }

        let format = self.geoip_format().ok_or(AclError::FormatNotSet("GeoIP"))?;
        let path = self.geoip_file(format);
        let url = self
            .geoip_url
            .clone()
            .unwrap_or_else(|| format.default_url().to_string());
        self.ensure_fresh(&path, &url, |p| verify_geoip_file(p, format))?;

        let map = Arc::new(load_geoip_file(&path, format)?);
        info!(path = %path.display(), countries = map.len(), "GeoIP database ready");
        *state = Some(map.clone());
        Ok(map)
    }

    fn load_geosite(&self) -> Result<Arc<GeoSiteMap>> {
        let mut state = self.geosite_state.lock();
        if let Some(map) = state.as_ref() {
            return Ok(map.clone());
        }

        let format = self
            .geosite_format()
            .ok_or(AclError::FormatNotSet("GeoSite"))?;
        let path = self.geosite_file(format);
        let url = self
            .geosite_url
            .clone()
            .unwrap_or_else(|| format.default_url().to_string());
        self.ensure_fresh(&path, &url, |p| verify_geosite_file(p, format))?;

        let map = Arc::new(load_geosite_file(&path, format)?);
        info!(path = %path.display(), categories = map.len(), "GeoSite database ready");
        *state = Some(map.clone());
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::dat;
    use prost::Message;
    use std::io::Write;

    fn write_geoip_dat(path: &Path) {
        let list = dat::geodat::GeoIpList {
            entry: vec![dat::geodat::GeoIp {
                country_code: "CN".to_string(),
                cidr: vec![dat::geodat::Cidr {
                    ip: vec![223, 0, 0, 0],
                    prefix: 8,
                }],
                inverse_match: false,
            }],
        };
        fs::File::create(path)
            .unwrap()
            .write_all(&list.encode_to_vec())
            .unwrap();
    }

    #[test]
    fn builder_defaults() {
        let loader = AutoGeoLoader::new();
        assert_eq!(loader.update_interval, DEFAULT_UPDATE_INTERVAL);
        assert!(loader.geoip_format().is_none());
    }

    #[test]
    fn format_not_set_without_configuration() {
        let loader = AutoGeoLoader::new();
        assert_eq!(
            loader.load_geoip().unwrap_err(),
            AclError::FormatNotSet("GeoIP")
        );
        assert_eq!(
            loader.load_geosite().unwrap_err(),
            AclError::FormatNotSet("GeoSite")
        );
    }

    #[test]
    fn format_detected_from_explicit_path() {
        let loader = AutoGeoLoader::new().with_geoip_path("/data/geoip.mmdb");
        assert_eq!(loader.geoip_format(), Some(GeoIpFormat::Mmdb));
    }

    #[test]
    fn fresh_file_loads_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoip.dat");
        write_geoip_dat(&path);

        // Unreachable URL: a download attempt would fail loudly.
        let loader = AutoGeoLoader::new()
            .with_data_dir(dir.path())
            .with_geoip(GeoIpFormat::Dat)
            .with_geoip_url("http://127.0.0.1:1/geoip.dat");
        let map = loader.load_geoip().unwrap();
        assert!(map.contains_key("cn"));
    }

    #[test]
    fn stale_file_survives_failed_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoip.dat");
        write_geoip_dat(&path);

        // Zero interval: the file is always considered stale, forcing a
        // download attempt against an unreachable URL.
        let loader = AutoGeoLoader::new()
            .with_data_dir(dir.path())
            .with_geoip(GeoIpFormat::Dat)
            .with_geoip_url("http://127.0.0.1:1/geoip.dat")
            .with_update_interval(Duration::ZERO);
        let map = loader.load_geoip().unwrap();
        assert!(map.contains_key("cn"));
    }

    #[test]
    fn missing_file_and_failed_download_errors() {
        let dir = tempfile::tempdir().unwrap();
        let loader = AutoGeoLoader::new()
            .with_data_dir(dir.path())
            .with_geoip(GeoIpFormat::Dat)
            .with_geoip_url("http://127.0.0.1:1/geoip.dat");
        assert!(matches!(
            loader.load_geoip().unwrap_err(),
            AclError::Loader(_)
        ));
    }

    #[test]
    fn loads_once_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geoip.dat");
        write_geoip_dat(&path);

        let loader = AutoGeoLoader::new()
            .with_data_dir(dir.path())
            .with_geoip(GeoIpFormat::Dat)
            .with_geoip_url("http://127.0.0.1:1/geoip.dat");
        let first = loader.load_geoip().unwrap();

        // Even with the file gone, later calls serve the cached map.
        fs::remove_file(&path).unwrap();
        let second = loader.load_geoip().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn staleness_check() {
        let dir = tempfile::tempdir().unwrap();
        let loader = AutoGeoLoader::new();

        let missing = dir.path().join("missing.dat");
        assert!(loader.is_stale(&missing));

        let empty = dir.path().join("empty.dat");
        fs::File::create(&empty).unwrap();
        assert!(loader.is_stale(&empty));

        let fresh = dir.path().join("fresh.dat");
        fs::File::create(&fresh).unwrap().write_all(b"x").unwrap();
        assert!(!loader.is_stale(&fresh));

        let always_stale = AutoGeoLoader::new().with_update_interval(Duration::ZERO);
        assert!(always_stale.is_stale(&fresh));
    }
}
