use thiserror::Error;

/// Errors surfaced at the compilation boundary.
///
/// Once `compile` succeeds, matching is total and never fails; everything
/// that can go wrong goes wrong here. The enum is `Clone` so loaders can
/// cache a failed load and replay it on later calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AclError {
    /// Syntactic failure in rule text.
    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// Rule references an outbound label missing from the outbounds map.
    #[error("unknown outbound: {0}")]
    UnknownOutbound(String),

    /// Rule names a country/site code absent from the loaded geo data.
    #[error("unknown geo code: {0}")]
    UnknownGeoCode(String),

    /// Address is well-formed but semantically invalid (bad CIDR, bad
    /// hijack IP, uncompilable regex).
    #[error("invalid address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Geo database unavailable or corrupt.
    #[error("geo data load failed: {0}")]
    Loader(String),

    /// Loader cannot determine the database format and none was given.
    #[error("{0} format not set and cannot be detected from file path")]
    FormatNotSet(&'static str),
}

pub type Result<T> = std::result::Result<T, AclError>;
