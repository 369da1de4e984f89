//! sing-geosite binary database loader.
//!
//! Layout: a version byte (0), a uvarint entry count, then per entry the
//! code as a length-prefixed string, a uvarint data offset and a uvarint
//! item count. The data section follows with the codes' items in metadata
//! order, each item a type byte plus a length-prefixed value, so a single
//! sequential pass reads everything.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{AclError, Result};

use super::data::{GeoDomainKind, GeoSite, GeoSiteDomain};

const ITEM_DOMAIN: u8 = 0;
const ITEM_DOMAIN_SUFFIX: u8 = 1;
const ITEM_DOMAIN_KEYWORD: u8 = 2;
const ITEM_DOMAIN_REGEX: u8 = 3;

/// Cap on a single length-prefixed string. A corrupt varint must not
/// translate into an arbitrarily large allocation.
const MAX_STRING_LEN: usize = 8 * 1024 * 1024;

/// Load a sing-geosite `.db` file into the common per-category map.
/// Keys are lowercase category codes.
pub fn load_geosite(path: impl AsRef<Path>) -> Result<HashMap<String, GeoSite>> {
    let file = File::open(path.as_ref())
        .map_err(|e| AclError::Loader(format!("cannot open sing-geosite db: {e}")))?;
    let mut reader = BufReader::new(file);

    let version = read_byte(&mut reader)?;
    if version != 0 {
        return Err(AclError::Loader(format!(
            "unsupported sing-geosite version {version}"
        )));
    }

    let entry_count = read_uvarint(&mut reader)? as usize;
    let mut metadata = Vec::with_capacity(entry_count.min(4096));
    for _ in 0..entry_count {
        let code = read_string(&mut reader)?;
        let _offset = read_uvarint(&mut reader)?;
        let item_count = read_uvarint(&mut reader)? as usize;
        metadata.push((code, item_count));
    }

    let mut map = HashMap::with_capacity(metadata.len());
    for (code, item_count) in metadata {
        let mut domains = Vec::with_capacity(item_count.min(65536));
        for _ in 0..item_count {
            let item_type = read_byte(&mut reader)?;
            let value = read_string(&mut reader)?;
            let (kind, value) = match item_type {
                ITEM_DOMAIN => (GeoDomainKind::Full, value),
                // Suffix values carry a leading dot on the wire; exactly
                // one is stripped so the entry keys as `google.com`, not
                // `.google.com`.
                ITEM_DOMAIN_SUFFIX => (
                    GeoDomainKind::RootDomain,
                    value.strip_prefix('.').unwrap_or(&value).to_string(),
                ),
                ITEM_DOMAIN_KEYWORD => (GeoDomainKind::Plain, value),
                ITEM_DOMAIN_REGEX => (GeoDomainKind::Regex, value),
                _ => continue,
            };
            domains.push(GeoSiteDomain {
                kind,
                value,
                attrs: Vec::new(),
            });
        }
        map.insert(
            code.to_lowercase(),
            GeoSite {
                country_code: code,
                domains,
            },
        );
    }
    Ok(map)
}

pub fn verify(path: impl AsRef<Path>) -> Result<()> {
    load_geosite(path).map(|_| ())
}

fn read_byte(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .map_err(|e| AclError::Loader(format!("sing-geosite read failed: {e}")))?;
    Ok(buf[0])
}

fn read_uvarint(reader: &mut impl Read) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = read_byte(reader)?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(AclError::Loader("sing-geosite varint overflow".to_string()));
        }
    }
}

fn read_string(reader: &mut impl Read) -> Result<String> {
    let len = read_uvarint(reader)? as usize;
    if len > MAX_STRING_LEN {
        return Err(AclError::Loader(format!(
            "sing-geosite string length {len} exceeds {MAX_STRING_LEN} byte limit"
        )));
    }
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| AclError::Loader(format!("sing-geosite read failed: {e}")))?;
    String::from_utf8(buf)
        .map_err(|e| AclError::Loader(format!("sing-geosite string is not UTF-8: {e}")))
}

/// Encode a database in the same layout. Counterpart of the reader, used
/// to synthesise fixtures in this crate's tests.
#[cfg(test)]
pub(crate) fn encode_geosite(entries: &[(&str, Vec<(u8, &str)>)]) -> Vec<u8> {
    fn push_uvarint(out: &mut Vec<u8>, mut v: u64) {
        while v >= 0x80 {
            out.push((v as u8) | 0x80);
            v >>= 7;
        }
        out.push(v as u8);
    }
    fn push_string(out: &mut Vec<u8>, s: &str) {
        push_uvarint(out, s.len() as u64);
        out.extend_from_slice(s.as_bytes());
    }

    // Data section first so the metadata offsets can be real.
    let mut data_chunks = Vec::with_capacity(entries.len());
    for (_, items) in entries {
        let mut chunk = Vec::new();
        for (item_type, value) in items {
            chunk.push(*item_type);
            push_string(&mut chunk, value);
        }
        data_chunks.push(chunk);
    }

    let mut out = vec![0u8]; // version
    push_uvarint(&mut out, entries.len() as u64);
    let mut offset = 0u64;
    for ((code, items), chunk) in entries.iter().zip(&data_chunks) {
        push_string(&mut out, code);
        push_uvarint(&mut out, offset);
        push_uvarint(&mut out, items.len() as u64);
        offset += chunk.len() as u64;
    }
    for chunk in &data_chunks {
        out.extend_from_slice(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn write_db(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geosite.db");
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_all_item_types() {
        let bytes = encode_geosite(&[(
            "google",
            vec![
                (ITEM_DOMAIN, "googleapis.com"),
                (ITEM_DOMAIN_SUFFIX, ".google.com"),
                (ITEM_DOMAIN_KEYWORD, "gstatic"),
                (ITEM_DOMAIN_REGEX, r"^ads\d+\.google\.[a-z]+$"),
            ],
        )]);
        let (_dir, path) = write_db(&bytes);

        let map = load_geosite(&path).unwrap();
        let google = map.get("google").expect("google entry");
        assert_eq!(google.domains.len(), 4);
        assert_eq!(google.domains[0].kind, GeoDomainKind::Full);
        assert_eq!(google.domains[1].kind, GeoDomainKind::RootDomain);
        assert_eq!(google.domains[2].kind, GeoDomainKind::Plain);
        assert_eq!(google.domains[3].kind, GeoDomainKind::Regex);
    }

    #[test]
    fn suffix_strips_exactly_one_leading_dot() {
        let bytes = encode_geosite(&[(
            "test",
            vec![
                (ITEM_DOMAIN_SUFFIX, ".google.com"),
                (ITEM_DOMAIN_SUFFIX, "nodot.com"),
            ],
        )]);
        let (_dir, path) = write_db(&bytes);

        let map = load_geosite(&path).unwrap();
        let values: Vec<_> = map["test"].domains.iter().map(|d| d.value.as_str()).collect();
        assert_eq!(values, ["google.com", "nodot.com"]);
    }

    #[test]
    fn codes_are_lowercased_in_keys() {
        let bytes = encode_geosite(&[("CN", vec![(ITEM_DOMAIN, "baidu.com")])]);
        let (_dir, path) = write_db(&bytes);

        let map = load_geosite(&path).unwrap();
        assert!(map.contains_key("cn"));
        assert_eq!(map["cn"].country_code, "CN");
    }

    #[test]
    fn multiple_codes_sequential_layout() {
        let bytes = encode_geosite(&[
            ("alpha", vec![(ITEM_DOMAIN, "a.example")]),
            ("beta", vec![(ITEM_DOMAIN_SUFFIX, ".b.example"), (ITEM_DOMAIN, "beta.example")]),
        ]);
        let (_dir, path) = write_db(&bytes);

        let map = load_geosite(&path).unwrap();
        assert_eq!(map["alpha"].domains.len(), 1);
        assert_eq!(map["beta"].domains.len(), 2);
        assert_eq!(map["beta"].domains[0].value, "b.example");
    }

    #[test]
    fn unknown_item_types_are_skipped() {
        let bytes = encode_geosite(&[(
            "mixed",
            vec![(ITEM_DOMAIN, "keep.example"), (42u8, "dropped")],
        )]);
        let (_dir, path) = write_db(&bytes);

        let map = load_geosite(&path).unwrap();
        assert_eq!(map["mixed"].domains.len(), 1);
        assert_eq!(map["mixed"].domains[0].value, "keep.example");
    }

    #[test]
    fn rejects_unknown_version() {
        let (_dir, path) = write_db(&[7u8]);
        let err = load_geosite(&path).unwrap_err();
        assert!(err.to_string().contains("version"), "got: {err}");
    }

    #[test]
    fn truncated_file_is_loader_error() {
        let mut bytes = encode_geosite(&[("cn", vec![(ITEM_DOMAIN, "baidu.com")])]);
        bytes.truncate(bytes.len() - 4);
        let (_dir, path) = write_db(&bytes);
        assert!(load_geosite(&path).is_err());
        assert!(verify(&path).is_err());
    }

    #[test]
    fn oversized_string_length_rejected_before_allocation() {
        // A varint claiming a 100 MiB string with only a few real bytes.
        let mut cursor_data = Vec::new();
        let mut v = 100u64 * 1024 * 1024;
        while v >= 0x80 {
            cursor_data.push((v as u8) | 0x80);
            v >>= 7;
        }
        cursor_data.push(v as u8);
        cursor_data.extend_from_slice(b"short");

        let err = read_string(&mut Cursor::new(cursor_data)).unwrap_err();
        assert!(err.to_string().contains("limit"), "got: {err}");
    }

    #[test]
    fn varint_overflow_rejected() {
        let data = [0xffu8; 11];
        assert!(read_uvarint(&mut Cursor::new(data)).is_err());
    }
}
