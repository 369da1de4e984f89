//! Geo database loading: common representation, format detection and the
//! loader implementations the compiler pulls from.

mod auto;
mod data;
mod format;
mod loader;

pub mod dat;
pub mod metadb;
pub mod mmdb;
pub mod singsite;

pub use auto::{AutoGeoLoader, DEFAULT_UPDATE_INTERVAL};
pub use data::{GeoDomainKind, GeoIp, GeoSite, GeoSiteDomain};
pub use format::{GeoIpFormat, GeoSiteFormat};
pub use loader::{FileGeoLoader, GeoIpMap, GeoLoader, GeoSiteMap, NilGeoLoader, StaticGeoLoader};
